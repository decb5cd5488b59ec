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

//! List of primitives.

use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::any_list::{ListBuilder, ListReader, PrimitiveElement};
use crate::pointer::{PointerBuilder, PointerReader};
use crate::traits::{IndexMove, ListIter};
use crate::Result;

#[derive(Clone, Copy)]
pub struct Reader<'a, T>
where
    T: PrimitiveElement,
{
    marker: PhantomData<T>,
    reader: ListReader<'a>,
}

impl<'a, T: PrimitiveElement> Reader<'a, T> {
    pub fn new(reader: ListReader<'a>) -> Reader<'a, T> {
        Reader {
            reader,
            marker: PhantomData,
        }
    }

    /// Reads the list a pointer refers to. A null pointer reads as
    /// `default`, or as an empty list.
    pub fn get_from_pointer(
        pointer: &PointerReader<'a>,
        default: Option<PointerReader<'a>>,
    ) -> Result<Reader<'a, T>> {
        Ok(Reader::new(pointer.get_list(T::ELEMENT_SIZE, default)?))
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(self) -> ListIter<Reader<'a, T>, T> {
        let l = self.len();
        ListIter::new(self, l)
    }

    /// Gets the `T` at position `index`. Panics if `index` is greater than or
    /// equal to `len()`.
    pub fn get(&self, index: u32) -> T {
        assert!(index < self.len());
        self.reader.get(index)
    }

    /// Gets the `T` at position `index`. Returns `None` if `index`
    /// is greater than or equal to `len()`.
    pub fn try_get(&self, index: u32) -> Option<T> {
        if index < self.len() {
            Some(self.reader.get(index))
        } else {
            None
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.iter().collect()
    }

    pub fn as_list_reader(&self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a, T: PrimitiveElement> IndexMove<u32, T> for Reader<'a, T> {
    fn index_move(&self, index: u32) -> T {
        self.get(index)
    }
}

impl<'a, T: PrimitiveElement> IntoIterator for Reader<'a, T> {
    type Item = T;
    type IntoIter = ListIter<Reader<'a, T>, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PrimitiveElement + core::fmt::Debug> core::fmt::Debug for Reader<'_, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct Builder<'a, T>
where
    T: PrimitiveElement,
{
    marker: PhantomData<T>,
    builder: ListBuilder<'a>,
}

impl<'a, T> Builder<'a, T>
where
    T: PrimitiveElement,
{
    pub fn new(builder: ListBuilder<'a>) -> Builder<'a, T> {
        Builder {
            builder,
            marker: PhantomData,
        }
    }

    /// Allocates a zeroed list of `size` elements in the slot.
    pub fn init_pointer(pointer: PointerBuilder<'a>, size: u32) -> Result<Builder<'a, T>> {
        Ok(Builder::new(pointer.init_list(T::ELEMENT_SIZE, size)?))
    }

    pub fn get_from_pointer(
        pointer: PointerBuilder<'a>,
        default: Option<PointerReader<'_>>,
    ) -> Result<Builder<'a, T>> {
        Ok(Builder::new(pointer.get_list(T::ELEMENT_SIZE, default)?))
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_reader(self) -> Reader<'a, T> {
        Reader::new(self.builder.into_reader())
    }

    pub fn reborrow(&mut self) -> Builder<'_, T> {
        Builder::new(self.builder.reborrow())
    }

    pub fn set(&mut self, index: u32, value: T) {
        assert!(index < self.len());
        self.builder.set(index, value);
    }

    /// Gets the `T` at position `index`. Panics if `index` is greater than or
    /// equal to `len()`.
    pub fn get(&self, index: u32) -> T {
        assert!(index < self.len());
        self.builder.get(index)
    }

    /// Gets the `T` at position `index`. Returns `None` if `index`
    /// is greater than or equal to `len()`.
    pub fn try_get(&self, index: u32) -> Option<T> {
        if index < self.len() {
            Some(self.builder.get(index))
        } else {
            None
        }
    }

    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).map(|i| self.builder.get(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Builder, Reader};
    use crate::message::Message;
    use crate::StructSize;

    #[test]
    fn set_then_iterate() {
        let mut message = Message::new_default();
        {
            let root = message.init_root(StructSize::new(0, 1)).unwrap();
            let pointer = root.get_pointer_field(0).unwrap();
            let mut list = Builder::<i16>::init_pointer(pointer, 4).unwrap();
            for (i, v) in [3i16, -1, 400, 0].into_iter().enumerate() {
                list.set(i as u32, v);
            }
            assert_eq!(list.get(2), 400);
            assert_eq!(list.try_get(4), None);
        }

        let root = message.get_root_as_reader().unwrap();
        let list = Reader::<i16>::get_from_pointer(&root.get_pointer_field(0), None).unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list.to_vec(), vec![3, -1, 400, 0]);
        assert_eq!(list.iter().rev().collect::<Vec<_>>(), vec![0, 400, -1, 3]);
        assert_eq!(list.iter().filter(|v| *v > 0).count(), 2);
        assert_eq!(list.iter().skip(1).take(2).collect::<Vec<_>>(), vec![-1, 400]);
        assert_eq!(format!("{list:?}"), "[3, -1, 400, 0]");
    }

    #[test]
    fn bool_list() {
        let mut message = Message::new_default();
        let root = message.init_root(StructSize::new(0, 1)).unwrap();
        let pointer = root.get_pointer_field(0).unwrap();
        let mut list = Builder::<bool>::init_pointer(pointer, 10).unwrap();
        list.set(0, true);
        list.set(9, true);
        list.set(0, false);
        let list = list.into_reader();
        assert_eq!(
            list.iter().map(|b| b as u8).collect::<Vec<_>>(),
            vec![0, 0, 0, 0, 0, 0, 0, 0, 0, 1]
        );
    }

    #[test]
    fn null_pointer_reads_as_empty() {
        let message = Message::new_default();
        let root = message.get_root_as_reader().unwrap();
        let list = Reader::<u64>::get_from_pointer(&root.get_pointer_field(0), None).unwrap();
        assert!(list.is_empty());
        assert_eq!(list.try_get(0), None);
    }
}
