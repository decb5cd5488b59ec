// Copyright (c) 2013-2015 Sandstorm Development Group, Inc. and contributors
// Licensed under the MIT License:
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN
// THE SOFTWARE.

//! Traits that typed struct façades implement, plus list iteration.

use core::marker::PhantomData;

use crate::any_struct::{StructBuilder, StructReader};
use crate::private::layout::StructSize;

/// Schema metadata of a struct type: its 64-bit id, its display name, and
/// the size of its sections.
pub trait StructMeta {
    const TYPE_ID: u64;
    const DISPLAY_NAME: &'static str;
    const STRUCT_SIZE: StructSize;
}

pub trait FromStructReader<'a> {
    fn new(reader: StructReader<'a>) -> Self;
}

pub trait FromStructBuilder<'a> {
    fn new(builder: StructBuilder<'a>) -> Self;
}

/// Associated types that allow us to reason about struct types without
/// needing to give them a lifetime `'a`.
///
/// If `Foo` is a struct type, then `foo::Reader<'a>` is to `foo::Owned` as
/// `&'a Bar` is to `Bar`, and `foo::Builder<'a>` is to `foo::Owned` as
/// `&'a mut Bar` is to `Bar`.
pub trait Owned {
    type Reader<'a>: FromStructReader<'a>;
    type Builder<'a>: FromStructBuilder<'a>;
}

impl<'a> FromStructReader<'a> for StructReader<'a> {
    fn new(reader: StructReader<'a>) -> Self {
        reader
    }
}

impl<'a> FromStructBuilder<'a> for StructBuilder<'a> {
    fn new(builder: StructBuilder<'a>) -> Self {
        builder
    }
}

pub trait IndexMove<I, T> {
    fn index_move(&self, index: I) -> T;
}

pub struct ListIter<T, U> {
    marker: PhantomData<U>,
    list: T,
    index: u32,
    size: u32,
}

impl<T, U> ListIter<T, U> {
    pub fn new(list: T, size: u32) -> ListIter<T, U> {
        ListIter {
            list,
            index: 0,
            size,
            marker: PhantomData,
        }
    }
}

impl<U, T: IndexMove<u32, U>> Iterator for ListIter<T, U> {
    type Item = U;

    fn next(&mut self) -> Option<U> {
        if self.index < self.size {
            let result = self.list.index_move(self.index);
            self.index += 1;
            Some(result)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.size - self.index) as usize;
        (remaining, Some(remaining))
    }

    fn nth(&mut self, n: usize) -> Option<U> {
        let remaining = (self.size - self.index) as usize;
        if n < remaining {
            self.index += n as u32;
            self.next()
        } else {
            self.index = self.size;
            None
        }
    }
}

impl<U, T: IndexMove<u32, U>> ExactSizeIterator for ListIter<T, U> {}

impl<U, T: IndexMove<u32, U>> DoubleEndedIterator for ListIter<T, U> {
    fn next_back(&mut self) -> Option<U> {
        if self.size > self.index {
            self.size -= 1;
            Some(self.list.index_move(self.size))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexMove, ListIter};

    struct Squares;

    impl IndexMove<u32, u32> for Squares {
        fn index_move(&self, index: u32) -> u32 {
            index * index
        }
    }

    #[test]
    fn iterates_from_both_ends() {
        let mut iter = ListIter::new(Squares, 5);
        assert_eq!(iter.len(), 5);
        assert_eq!(iter.next(), Some(0));
        assert_eq!(iter.next_back(), Some(16));
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.nth(1), Some(4));
        assert_eq!(iter.collect::<Vec<_>>(), vec![9]);
    }

    #[test]
    fn nth_past_the_end_exhausts() {
        let mut iter = ListIter::new(Squares, 3);
        assert_eq!(iter.nth(3), None);
        assert_eq!(iter.next(), None);
    }
}
