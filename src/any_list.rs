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

//! Untyped list views.
//!
//! Element access here does not bounds-check the index against the list
//! length; the typed lists in [`crate::primitive_list`] and
//! [`crate::struct_list`] do.

use crate::any_struct::{Origin, StructBuilder, StructReader};
use crate::pointer::{PointerBuilder, PointerReader};
use crate::private::arena::{Arena, SegmentId};
use crate::private::layout::{wire_helpers, ElementSize, StructSize};
use crate::private::primitive::Primitive;
use crate::private::units::*;
use crate::{MessageSize, Result};

#[derive(Clone, Copy)]
pub struct ListReader<'a> {
    pub(crate) arena: &'a Arena,
    pub(crate) segment_id: SegmentId,
    /// First element. For inline-composite lists this is the word after the
    /// tag.
    pub(crate) byte_offset: ByteCount,
    pub(crate) element_count: ElementCount32,
    /// Distance between elements, in bits.
    pub(crate) step: BitCount32,
    pub(crate) struct_size: StructSize,
    pub(crate) element_size: ElementSize,
    pub(crate) nesting_limit: i32,
}

impl<'a> ListReader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        arena: &'a Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        element_count: ElementCount32,
        element_size: ElementSize,
        step: BitCount32,
        struct_size: StructSize,
        nesting_limit: i32,
    ) -> ListReader<'a> {
        ListReader {
            arena,
            segment_id,
            byte_offset,
            element_count,
            step,
            struct_size,
            element_size,
            nesting_limit,
        }
    }

    /// An empty list of the given element size.
    pub fn new_default(arena: &'a Arena, element_size: ElementSize) -> ListReader<'a> {
        ListReader {
            arena,
            segment_id: 0,
            byte_offset: 0,
            element_count: 0,
            step: element_size.step_bits(),
            struct_size: StructSize::default(),
            element_size,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    pub fn element_size(&self) -> ElementSize {
        self.element_size
    }

    /// Per-element sizes of an inline-composite list.
    pub fn struct_size(&self) -> StructSize {
        self.struct_size
    }

    fn element_offset(&self, index: ElementCount32) -> ByteCount {
        self.byte_offset + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }

    /// Views element `index` as a struct.
    ///
    /// Lists of primitives or pointers are also readable this way, as
    /// structs whose only field is the element. This lets a list written
    /// with an older schema be read as a list of structs.
    pub fn get_struct_element(&self, index: ElementCount32) -> StructReader<'a> {
        let (data_size, pointer_count) = element_sections(self.element_size, self.step, self.struct_size);
        StructReader {
            arena: self.arena,
            segment_id: self.segment_id,
            data_offset: self.element_offset(index),
            data_size,
            pointer_count,
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn get_pointer_element(&self, index: ElementCount32) -> PointerReader<'a> {
        PointerReader::new(
            self.arena,
            self.segment_id,
            self.element_offset(index),
            self.nesting_limit,
        )
    }

    pub fn get<T: PrimitiveElement>(&self, index: ElementCount32) -> T {
        T::get(self, index)
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: words_for_bits(u64::from(self.element_count) * u64::from(self.step)),
            cap_count: 0,
        };
        match self.element_size {
            ElementSize::InlineComposite => {
                result.word_count += POINTER_SIZE_IN_WORDS as u64;
                for i in 0..self.element_count {
                    let element = self.get_struct_element(i);
                    for j in 0..element.pointer_count {
                        result.plus_eq(element.get_pointer_field(j).total_size()?);
                    }
                }
            }
            ElementSize::Pointer => {
                for i in 0..self.element_count {
                    result.plus_eq(self.get_pointer_element(i).total_size()?);
                }
            }
            _ => {}
        }
        Ok(result)
    }
}

impl core::fmt::Debug for ListReader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListReader")
            .field("segment_id", &self.segment_id)
            .field("byte_offset", &self.byte_offset)
            .field("element_count", &self.element_count)
            .field("element_size", &self.element_size)
            .finish()
    }
}

/// Data bytes and pointer count of one element viewed as a struct.
fn element_sections(
    element_size: ElementSize,
    step: BitCount32,
    struct_size: StructSize,
) -> (ByteCount32, WirePointerCount16) {
    match element_size {
        ElementSize::InlineComposite => (struct_size.data_byte_length(), struct_size.pointers),
        ElementSize::Pointer => (0, 1),
        ElementSize::Void | ElementSize::Bit => (0, 0),
        _ => (step / BITS_PER_BYTE as u32, 0),
    }
}

pub struct ListBuilder<'a> {
    pub(crate) arena: &'a mut Arena,
    pub(crate) segment_id: SegmentId,
    pub(crate) byte_offset: ByteCount,
    pub(crate) element_count: ElementCount32,
    pub(crate) step: BitCount32,
    pub(crate) struct_size: StructSize,
    pub(crate) element_size: ElementSize,
    pub(crate) nesting_limit: i32,
}

impl<'a> ListBuilder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        element_count: ElementCount32,
        element_size: ElementSize,
        step: BitCount32,
        struct_size: StructSize,
        nesting_limit: i32,
    ) -> ListBuilder<'a> {
        ListBuilder {
            arena,
            segment_id,
            byte_offset,
            element_count,
            step,
            struct_size,
            element_size,
            nesting_limit,
        }
    }

    pub fn new_default(arena: &'a mut Arena, element_size: ElementSize) -> ListBuilder<'a> {
        ListBuilder {
            arena,
            segment_id: 0,
            byte_offset: 0,
            element_count: 0,
            step: element_size.step_bits(),
            struct_size: StructSize::default(),
            element_size,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn reborrow(&mut self) -> ListBuilder<'_> {
        ListBuilder {
            arena: &mut *self.arena,
            ..*self
        }
    }

    pub fn as_reader(&self) -> ListReader<'_> {
        ListReader {
            arena: &*self.arena,
            segment_id: self.segment_id,
            byte_offset: self.byte_offset,
            element_count: self.element_count,
            step: self.step,
            struct_size: self.struct_size,
            element_size: self.element_size,
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn into_reader(self) -> ListReader<'a> {
        ListReader {
            arena: self.arena,
            segment_id: self.segment_id,
            byte_offset: self.byte_offset,
            element_count: self.element_count,
            step: self.step,
            struct_size: self.struct_size,
            element_size: self.element_size,
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    pub fn element_size(&self) -> ElementSize {
        self.element_size
    }

    pub fn struct_size(&self) -> StructSize {
        self.struct_size
    }

    fn element_offset(&self, index: ElementCount32) -> ByteCount {
        self.byte_offset + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }

    /// A builder over element `index` of a struct list. Its size is fixed by
    /// the list's tag word, so it cannot be resized on its own.
    pub fn get_struct_element(self, index: ElementCount32) -> StructBuilder<'a> {
        let (data_size, pointer_count) =
            element_sections(self.element_size, self.step, self.struct_size);
        let data_offset = self.element_offset(index);
        StructBuilder {
            arena: self.arena,
            segment_id: self.segment_id,
            data_offset,
            data_size,
            pointer_count,
            nesting_limit: self.nesting_limit,
            origin: Origin::ListElement { index },
        }
    }

    pub fn get_pointer_element(self, index: ElementCount32) -> PointerBuilder<'a> {
        let offset = self.element_offset(index);
        PointerBuilder::new(self.arena, self.segment_id, offset, self.nesting_limit)
    }

    pub fn get<T: PrimitiveElement>(&self, index: ElementCount32) -> T {
        T::get(&self.as_reader(), index)
    }

    pub fn set<T: PrimitiveElement>(&mut self, index: ElementCount32, value: T) {
        T::set(self, index, value)
    }

    /// Copies `value` over element `index` of a struct list. Fields the
    /// element has no room for are dropped; pointers are deep-copied.
    pub fn set_struct_element(&mut self, index: ElementCount32, value: StructReader<'_>) -> Result<()> {
        let element = self.reborrow().get_struct_element(index);
        let data_len = core::cmp::min(element.data_size, value.data_size) as ByteCount;
        if data_len > 0 {
            let src = value
                .arena
                .segment(value.segment_id)?
                .bytes(value.data_offset, data_len);
            element
                .arena
                .segment_mut(element.segment_id)?
                .bytes_mut(element.data_offset, data_len)
                .copy_from_slice(src);
        }
        let pointer_count = core::cmp::min(element.pointer_count, value.pointer_count);
        let pointer_section = element.data_offset + element.data_size as ByteCount;
        for i in 0..pointer_count {
            wire_helpers::copy_pointer(
                element.arena,
                element.segment_id,
                pointer_section + i as ByteCount * BYTES_PER_WORD,
                value.arena,
                value.segment_id,
                value.pointer_offset(i),
                value.nesting_limit,
            )?;
        }
        Ok(())
    }
}

/// An element type that a list stores inline, without a pointer.
pub trait PrimitiveElement: Copy {
    const ELEMENT_SIZE: ElementSize;

    fn get(list: &ListReader<'_>, index: ElementCount32) -> Self;
    fn set(list: &mut ListBuilder<'_>, index: ElementCount32, value: Self);
}

macro_rules! primitive_element_impl {
    ($($typ:ty),*) => {
        $(
            impl PrimitiveElement for $typ {
                const ELEMENT_SIZE: ElementSize = <$typ as Primitive>::ELEMENT_SIZE;

                #[inline]
                fn get(list: &ListReader<'_>, index: ElementCount32) -> Self {
                    let offset = list.element_offset(index);
                    list.arena
                        .segment(list.segment_id)
                        .map(|segment| segment.get::<$typ>(offset))
                        .unwrap_or_default()
                }

                #[inline]
                fn set(list: &mut ListBuilder<'_>, index: ElementCount32, value: Self) {
                    let offset = list.element_offset(index);
                    if let Ok(segment) = list.arena.segment_mut(list.segment_id) {
                        segment.set::<$typ>(offset, value);
                    }
                }
            }
        )*
    };
}

primitive_element_impl!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

impl PrimitiveElement for bool {
    const ELEMENT_SIZE: ElementSize = ElementSize::Bit;

    #[inline]
    fn get(list: &ListReader<'_>, index: ElementCount32) -> bool {
        let byte_offset = list.byte_offset + index as ByteCount / BITS_PER_BYTE;
        let bit = 1u8 << (index as ByteCount % BITS_PER_BYTE);
        list.arena
            .segment(list.segment_id)
            .map(|segment| segment.get::<u8>(byte_offset) & bit != 0)
            .unwrap_or(false)
    }

    #[inline]
    fn set(list: &mut ListBuilder<'_>, index: ElementCount32, value: bool) {
        let byte_offset = list.byte_offset + index as ByteCount / BITS_PER_BYTE;
        let bit = 1u8 << (index as ByteCount % BITS_PER_BYTE);
        if let Ok(segment) = list.arena.segment_mut(list.segment_id) {
            let old = segment.get::<u8>(byte_offset);
            segment.set::<u8>(byte_offset, if value { old | bit } else { old & !bit });
        }
    }
}

impl PrimitiveElement for () {
    const ELEMENT_SIZE: ElementSize = ElementSize::Void;

    #[inline]
    fn get(_list: &ListReader<'_>, _index: ElementCount32) {}

    #[inline]
    fn set(_list: &mut ListBuilder<'_>, _index: ElementCount32, _value: ()) {}
}
