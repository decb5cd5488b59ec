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

//! List of structs.

use alloc::vec::Vec;
use core::marker::PhantomData;

use crate::any_list::{ListBuilder, ListReader};
use crate::any_struct::StructReader;
use crate::pointer::{PointerBuilder, PointerReader};
use crate::private::layout::{ElementSize, StructSize};
use crate::traits::{FromStructBuilder, FromStructReader, IndexMove, ListIter, Owned};
use crate::Result;

pub struct Reader<'a, T> {
    marker: PhantomData<T>,
    reader: ListReader<'a>,
}

impl<T> Clone for Reader<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Reader<'_, T> {}

impl<'a, T: Owned> Reader<'a, T> {
    pub fn new(reader: ListReader<'a>) -> Reader<'a, T> {
        Reader {
            reader,
            marker: PhantomData,
        }
    }

    /// Reads the struct list a pointer refers to. Lists of primitives and
    /// pointers are accepted too; each element then reads as a struct whose
    /// only field is the element.
    pub fn get_from_pointer(
        pointer: &PointerReader<'a>,
        default: Option<PointerReader<'a>>,
    ) -> Result<Reader<'a, T>> {
        Ok(Reader::new(
            pointer.get_list(ElementSize::InlineComposite, default)?,
        ))
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(self) -> ListIter<Reader<'a, T>, T::Reader<'a>> {
        ListIter::new(self, self.len())
    }

    /// Gets the element at position `index`. Panics if `index` is greater than or
    /// equal to `len()`.
    pub fn get(self, index: u32) -> T::Reader<'a> {
        assert!(index < self.len());
        FromStructReader::new(self.reader.get_struct_element(index))
    }

    /// Gets the element at position `index`. Returns `None` if `index`
    /// is greater than or equal to `len()`.
    pub fn try_get(self, index: u32) -> Option<T::Reader<'a>> {
        if index < self.len() {
            Some(FromStructReader::new(self.reader.get_struct_element(index)))
        } else {
            None
        }
    }

    pub fn to_vec(self) -> Vec<T::Reader<'a>> {
        self.iter().collect()
    }

    pub fn as_list_reader(&self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a, T: Owned> IndexMove<u32, T::Reader<'a>> for Reader<'a, T> {
    fn index_move(&self, index: u32) -> T::Reader<'a> {
        self.get(index)
    }
}

impl<'a, T: Owned> IntoIterator for Reader<'a, T> {
    type Item = T::Reader<'a>;
    type IntoIter = ListIter<Reader<'a, T>, T::Reader<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Builder<'a, T> {
    marker: PhantomData<T>,
    builder: ListBuilder<'a>,
}

impl<'a, T: Owned> Builder<'a, T> {
    pub fn new(builder: ListBuilder<'a>) -> Builder<'a, T> {
        Builder {
            builder,
            marker: PhantomData,
        }
    }

    /// Allocates `count` zeroed elements of `size` in the slot.
    pub fn init_pointer(
        pointer: PointerBuilder<'a>,
        size: StructSize,
        count: u32,
    ) -> Result<Builder<'a, T>> {
        Ok(Builder::new(pointer.init_struct_list(size, count)?))
    }

    /// Gets the list in the slot, upgrading it in place when its elements
    /// are smaller than `size`.
    pub fn get_from_pointer(
        pointer: PointerBuilder<'a>,
        size: StructSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<Builder<'a, T>> {
        Ok(Builder::new(pointer.get_struct_list(size, default)?))
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reborrow(&mut self) -> Builder<'_, T> {
        Builder::new(self.builder.reborrow())
    }

    pub fn into_reader(self) -> Reader<'a, T> {
        Reader::new(self.builder.into_reader())
    }

    /// Gets the element at position `index`. Panics if `index` is greater than or
    /// equal to `len()`.
    pub fn get(self, index: u32) -> T::Builder<'a> {
        assert!(index < self.len());
        FromStructBuilder::new(self.builder.get_struct_element(index))
    }

    /// Gets the element at position `index`. Returns `None` if `index`
    /// is greater than or equal to `len()`.
    pub fn try_get(self, index: u32) -> Option<T::Builder<'a>> {
        if index < self.len() {
            Some(FromStructBuilder::new(self.builder.get_struct_element(index)))
        } else {
            None
        }
    }

    /// Copies `value` over the element at `index`. Fields that do not fit the
    /// list's element size are dropped. Panics if `index` is out of range.
    pub fn set_with_caveats(&mut self, index: u32, value: StructReader<'_>) -> Result<()> {
        assert!(index < self.len());
        self.builder.set_struct_element(index, value)
    }
}
