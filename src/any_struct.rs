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

//! Untyped struct views.
//!
//! A struct is a data section of primitive fields followed by a pointer
//! section. [`StructReader`] treats anything past the end of either section
//! as holding its default, which is how a reader compiled against a newer
//! schema sees data written with an older one. [`StructBuilder`] checks
//! every offset and index strictly, and grows undersized structs when they
//! are fetched with [`StructBuilder::get_struct`].

use alloc::boxed::Box;

use crate::any_list::{ListBuilder, ListReader};
use crate::capability::ClientHook;
use crate::pointer::{PointerBuilder, PointerReader};
use crate::private::arena::{Arena, SegmentId};
use crate::private::layout::{wire_helpers, ElementSize, Orphan, StructSize};
use crate::private::mask::Mask;
use crate::private::primitive::Primitive;
use crate::private::units::*;
use crate::{text, Error, ErrorKind, MessageSize, Result};

/// What refers to a struct builder's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Origin {
    /// A pointer slot; the struct can be moved by re-pointing the slot.
    Pointer {
        segment_id: SegmentId,
        byte_offset: ByteCount,
    },
    /// An element of an inline-composite list, whose size is fixed by the
    /// list's tag word.
    ListElement { index: ElementCount32 },
    /// An orphan or other object not reachable from a slot.
    Detached,
}

#[derive(Clone, Copy)]
pub struct StructReader<'a> {
    pub(crate) arena: &'a Arena,
    pub(crate) segment_id: SegmentId,
    pub(crate) data_offset: ByteCount,
    pub(crate) data_size: ByteCount32,
    pub(crate) pointer_count: WirePointerCount16,
    pub(crate) nesting_limit: i32,
}

impl<'a> StructReader<'a> {
    pub(crate) fn new(
        arena: &'a Arena,
        segment_id: SegmentId,
        data_offset: ByteCount,
        size: StructSize,
        nesting_limit: i32,
    ) -> StructReader<'a> {
        StructReader {
            arena,
            segment_id,
            data_offset,
            data_size: size.data_byte_length(),
            pointer_count: size.pointers,
            nesting_limit,
        }
    }

    /// A struct with empty sections: every field reads as its default.
    pub fn new_default(arena: &'a Arena) -> StructReader<'a> {
        StructReader {
            arena,
            segment_id: 0,
            data_offset: 0,
            data_size: 0,
            pointer_count: 0,
            nesting_limit: 0x7fffffff,
        }
    }

    /// Section sizes in whole words. An element of a primitive list read
    /// as a struct has a data section shorter than a word; it rounds up.
    pub fn size(&self) -> StructSize {
        StructSize::new(
            words_for_bytes(self.data_size as ByteCount) as WordCount16,
            self.pointer_count,
        )
    }

    pub fn get_data_section_size(&self) -> ByteCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    pub fn get_data_section_as_blob(&self) -> &'a [u8] {
        if self.data_size == 0 {
            return &[];
        }
        match self.arena.segment(self.segment_id) {
            Ok(segment) => segment.bytes(self.data_offset, self.data_size as usize),
            Err(_) => &[],
        }
    }

    pub(crate) fn pointer_offset(&self, index: WirePointerCount16) -> ByteCount {
        self.data_offset + self.data_size as usize + index as usize * BYTES_PER_WORD
    }

    /// Reads the primitive at `byte_offset` in the data section, or the
    /// type's zero value if the section is too short to hold it.
    #[inline]
    pub fn get_data_field<T: Primitive>(&self, byte_offset: ByteCount) -> T {
        if byte_offset + T::BYTES <= self.data_size as usize {
            match self.arena.segment(self.segment_id) {
                Ok(segment) => segment.get::<T>(self.data_offset + byte_offset),
                Err(_) => T::default(),
            }
        } else {
            T::default()
        }
    }

    #[inline]
    pub fn get_data_field_mask<T: Primitive>(&self, byte_offset: ByteCount, default: T) -> T {
        self.get_data_field::<T>(byte_offset).mask(default)
    }

    #[inline]
    pub fn get_bool_field(&self, bit_offset: BitCount) -> bool {
        if bit_offset < self.data_size as usize * BITS_PER_BYTE {
            let byte: u8 = self.get_data_field(bit_offset / BITS_PER_BYTE);
            (byte & (1u8 << (bit_offset % BITS_PER_BYTE))) != 0
        } else {
            false
        }
    }

    #[inline]
    pub fn get_bool_field_mask(&self, bit_offset: BitCount, default: bool) -> bool {
        self.get_bool_field(bit_offset).mask(default)
    }

    /// The union discriminant stored at `discriminant_offset` (in units of
    /// 16 bits).
    pub fn which(&self, discriminant_offset: usize) -> u16 {
        self.get_data_field::<u16>(discriminant_offset * 2)
    }

    pub fn test_which(&self, discriminant_offset: usize, wanted: u16) -> Result<()> {
        check_discriminant(self.which(discriminant_offset), wanted)
    }

    /// The pointer at `index`, or a null pointer if the section is too
    /// short to hold it.
    pub fn get_pointer_field(&self, index: WirePointerCount16) -> PointerReader<'a> {
        if index < self.pointer_count {
            PointerReader::new(
                self.arena,
                self.segment_id,
                self.pointer_offset(index),
                self.nesting_limit,
            )
        } else {
            PointerReader::new_default(self.arena)
        }
    }

    pub fn get_struct(
        &self,
        index: WirePointerCount16,
        default: Option<PointerReader<'a>>,
    ) -> Result<StructReader<'a>> {
        self.get_pointer_field(index).get_struct(default)
    }

    pub fn get_list(
        &self,
        index: WirePointerCount16,
        element_size: ElementSize,
        default: Option<PointerReader<'a>>,
    ) -> Result<ListReader<'a>> {
        self.get_pointer_field(index).get_list(element_size, default)
    }

    pub fn get_text(
        &self,
        index: WirePointerCount16,
        default: Option<&'a str>,
    ) -> Result<text::Reader<'a>> {
        self.get_pointer_field(index).get_text(default)
    }

    pub fn get_data(
        &self,
        index: WirePointerCount16,
        default: Option<&'a [u8]>,
    ) -> Result<&'a [u8]> {
        self.get_pointer_field(index).get_data(default)
    }

    pub fn get_capability(&self, index: WirePointerCount16) -> Result<Box<dyn ClientHook>> {
        self.get_pointer_field(index).get_capability()
    }

    /// Words and capabilities reachable from this struct, including its own
    /// sections.
    pub fn total_size(&self) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: u64::from(self.size().total()),
            cap_count: 0,
        };
        for i in 0..self.pointer_count {
            result.plus_eq(self.get_pointer_field(i).total_size()?);
        }
        Ok(result)
    }
}

impl core::fmt::Debug for StructReader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StructReader")
            .field("segment_id", &self.segment_id)
            .field("data_offset", &self.data_offset)
            .field("size", &self.size())
            .finish()
    }
}

fn check_discriminant(found: u16, wanted: u16) -> Result<()> {
    if found == wanted {
        Ok(())
    } else {
        Err(Error::detailed(
            ErrorKind::InvalidUnionAccess,
            alloc::format!("union member {wanted} is not active; {found} is"),
        ))
    }
}

pub struct StructBuilder<'a> {
    pub(crate) arena: &'a mut Arena,
    pub(crate) segment_id: SegmentId,
    pub(crate) data_offset: ByteCount,
    pub(crate) data_size: ByteCount32,
    pub(crate) pointer_count: WirePointerCount16,
    pub(crate) nesting_limit: i32,
    pub(crate) origin: Origin,
}

impl<'a> StructBuilder<'a> {
    pub(crate) fn new(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        data_offset: ByteCount,
        size: StructSize,
        nesting_limit: i32,
        origin: Origin,
    ) -> StructBuilder<'a> {
        StructBuilder {
            arena,
            segment_id,
            data_offset,
            data_size: size.data_byte_length(),
            pointer_count: size.pointers,
            nesting_limit,
            origin,
        }
    }

    pub fn reborrow(&mut self) -> StructBuilder<'_> {
        StructBuilder {
            arena: &mut *self.arena,
            ..*self
        }
    }

    pub fn as_reader(&self) -> StructReader<'_> {
        StructReader {
            arena: &*self.arena,
            segment_id: self.segment_id,
            data_offset: self.data_offset,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn into_reader(self) -> StructReader<'a> {
        StructReader {
            arena: self.arena,
            segment_id: self.segment_id,
            data_offset: self.data_offset,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn size(&self) -> StructSize {
        self.as_reader().size()
    }

    fn check_data(&self, byte_offset: ByteCount, len: ByteCount) -> Result<()> {
        match byte_offset.checked_add(len) {
            Some(end) if end <= self.data_size as usize => Ok(()),
            _ => Err(Error::detailed(
                ErrorKind::DataOutOfBounds,
                alloc::format!(
                    "{len} bytes at offset {byte_offset} in a {}-byte data section",
                    self.data_size
                ),
            )),
        }
    }

    #[inline]
    pub fn get_data_field<T: Primitive>(&self, byte_offset: ByteCount) -> Result<T> {
        self.check_data(byte_offset, T::BYTES)?;
        Ok(self
            .arena
            .segment(self.segment_id)?
            .get::<T>(self.data_offset + byte_offset))
    }

    #[inline]
    pub fn get_data_field_mask<T: Primitive>(&self, byte_offset: ByteCount, default: T) -> Result<T> {
        Ok(self.get_data_field::<T>(byte_offset)?.mask(default))
    }

    #[inline]
    pub fn set_data_field<T: Primitive>(&mut self, byte_offset: ByteCount, value: T) -> Result<()> {
        self.check_data(byte_offset, T::BYTES)?;
        self.arena
            .segment_mut(self.segment_id)?
            .set::<T>(self.data_offset + byte_offset, value);
        Ok(())
    }

    #[inline]
    pub fn set_data_field_mask<T: Primitive>(
        &mut self,
        byte_offset: ByteCount,
        value: T,
        default: T,
    ) -> Result<()> {
        self.set_data_field::<T>(byte_offset, value.mask(default))
    }

    #[inline]
    pub fn get_bool_field(&self, bit_offset: BitCount) -> Result<bool> {
        let byte: u8 = self.get_data_field(bit_offset / BITS_PER_BYTE)?;
        Ok((byte & (1u8 << (bit_offset % BITS_PER_BYTE))) != 0)
    }

    #[inline]
    pub fn get_bool_field_mask(&self, bit_offset: BitCount, default: bool) -> Result<bool> {
        Ok(self.get_bool_field(bit_offset)?.mask(default))
    }

    #[inline]
    pub fn set_bool_field(&mut self, bit_offset: BitCount, value: bool) -> Result<()> {
        let byte_offset = bit_offset / BITS_PER_BYTE;
        let bit = 1u8 << (bit_offset % BITS_PER_BYTE);
        let old: u8 = self.get_data_field(byte_offset)?;
        let new = if value { old | bit } else { old & !bit };
        self.set_data_field::<u8>(byte_offset, new)
    }

    #[inline]
    pub fn set_bool_field_mask(
        &mut self,
        bit_offset: BitCount,
        value: bool,
        default: bool,
    ) -> Result<()> {
        self.set_bool_field(bit_offset, value.mask(default))
    }

    pub fn which(&self, discriminant_offset: usize) -> Result<u16> {
        self.get_data_field::<u16>(discriminant_offset * 2)
    }

    pub fn test_which(&self, discriminant_offset: usize, wanted: u16) -> Result<()> {
        check_discriminant(self.which(discriminant_offset)?, wanted)
    }

    pub fn set_which(&mut self, discriminant_offset: usize, value: u16) -> Result<()> {
        self.set_data_field::<u16>(discriminant_offset * 2, value)
    }

    fn pointer_offset(&self, index: WirePointerCount16) -> Result<ByteCount> {
        if index < self.pointer_count {
            Ok(self.data_offset + self.data_size as usize + index as usize * BYTES_PER_WORD)
        } else {
            Err(Error::detailed(
                ErrorKind::PointerOutOfBounds,
                alloc::format!(
                    "pointer {index} in a section of {} pointers",
                    self.pointer_count
                ),
            ))
        }
    }

    pub fn get_pointer_field(self, index: WirePointerCount16) -> Result<PointerBuilder<'a>> {
        let offset = self.pointer_offset(index)?;
        Ok(PointerBuilder::new(
            self.arena,
            self.segment_id,
            offset,
            self.nesting_limit,
        ))
    }

    pub fn get_struct(
        self,
        index: WirePointerCount16,
        size: StructSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<StructBuilder<'a>> {
        self.get_pointer_field(index)?.get_struct(size, default)
    }

    pub fn init_struct(self, index: WirePointerCount16, size: StructSize) -> Result<StructBuilder<'a>> {
        self.get_pointer_field(index)?.init_struct(size)
    }

    pub fn get_list(
        self,
        index: WirePointerCount16,
        element_size: ElementSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<ListBuilder<'a>> {
        self.get_pointer_field(index)?.get_list(element_size, default)
    }

    pub fn get_struct_list(
        self,
        index: WirePointerCount16,
        element_size: StructSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<ListBuilder<'a>> {
        self.get_pointer_field(index)?
            .get_struct_list(element_size, default)
    }

    pub fn init_list(
        self,
        index: WirePointerCount16,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Result<ListBuilder<'a>> {
        self.get_pointer_field(index)?
            .init_list(element_size, element_count)
    }

    pub fn init_struct_list(
        self,
        index: WirePointerCount16,
        element_size: StructSize,
        element_count: ElementCount32,
    ) -> Result<ListBuilder<'a>> {
        self.get_pointer_field(index)?
            .init_struct_list(element_size, element_count)
    }

    pub fn get_text(
        self,
        index: WirePointerCount16,
        default: Option<&str>,
    ) -> Result<text::Builder<'a>> {
        self.get_pointer_field(index)?.get_text(default)
    }

    pub fn init_text(self, index: WirePointerCount16, size: ByteCount) -> Result<text::Builder<'a>> {
        self.get_pointer_field(index)?.init_text(size)
    }

    pub fn set_text(&mut self, index: WirePointerCount16, value: &str) -> Result<()> {
        self.reborrow().get_pointer_field(index)?.set_text(value)
    }

    pub fn get_data(self, index: WirePointerCount16, default: Option<&[u8]>) -> Result<&'a mut [u8]> {
        self.get_pointer_field(index)?.get_data(default)
    }

    pub fn init_data(self, index: WirePointerCount16, size: ByteCount) -> Result<&'a mut [u8]> {
        self.get_pointer_field(index)?.init_data(size)
    }

    pub fn set_data(&mut self, index: WirePointerCount16, value: &[u8]) -> Result<()> {
        self.reborrow().get_pointer_field(index)?.set_data(value)
    }

    /// Deep-copies `value` into the pointer at `index`.
    pub fn set_struct(&mut self, index: WirePointerCount16, value: StructReader<'_>) -> Result<()> {
        self.reborrow().get_pointer_field(index)?.set_struct(value)
    }

    /// Deep-copies `value` into the pointer at `index`.
    pub fn set_list(&mut self, index: WirePointerCount16, value: ListReader<'_>) -> Result<()> {
        self.reborrow().get_pointer_field(index)?.set_list(value)
    }

    pub fn set_capability(
        &mut self,
        index: WirePointerCount16,
        hook: Box<dyn ClientHook>,
    ) -> Result<()> {
        self.reborrow()
            .get_pointer_field(index)?
            .set_capability(hook)
    }

    pub fn adopt(&mut self, index: WirePointerCount16, orphan: Orphan) -> Result<()> {
        self.reborrow().get_pointer_field(index)?.adopt(orphan)
    }

    pub fn disown(&mut self, index: WirePointerCount16) -> Result<Orphan> {
        self.reborrow().get_pointer_field(index)?.disown()
    }

    /// Grows this struct to at least `size`, moving it if necessary.
    ///
    /// Structs never shrink, and elements of a struct list cannot be
    /// resized on their own; both requests fail with
    /// [`ErrorKind::InitCompositeStruct`].
    pub fn resize(self, size: StructSize) -> Result<StructBuilder<'a>> {
        let current = self.size();
        if let Origin::ListElement { index } = self.origin {
            return Err(Error::detailed(
                ErrorKind::InitCompositeStruct,
                alloc::format!("element {index} of a struct list"),
            ));
        }
        if !size.covers(current) {
            return Err(Error::detailed(
                ErrorKind::InitCompositeStruct,
                alloc::format!("cannot shrink {current:?} to {size:?}"),
            ));
        }
        if current == size {
            return Ok(self);
        }
        match self.origin {
            Origin::Pointer {
                segment_id,
                byte_offset,
            } => wire_helpers::get_writable_struct_pointer(
                self.arena,
                segment_id,
                byte_offset,
                size,
                None,
                self.nesting_limit + 1,
            ),
            _ => Err(Error::failed(
                "cannot resize a struct that no pointer refers to".into(),
            )),
        }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        self.as_reader().total_size()
    }
}

/// The untyped struct family: readers and builders are the raw views.
#[derive(Clone, Copy)]
pub struct Owned;

impl crate::traits::Owned for Owned {
    type Reader<'a> = StructReader<'a>;
    type Builder<'a> = StructBuilder<'a>;
}
