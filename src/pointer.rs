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

//! Views over a single pointer slot, whatever it points to.

use alloc::boxed::Box;

use crate::any_list::{ListBuilder, ListReader};
use crate::any_struct::{StructBuilder, StructReader};
use crate::capability::ClientHook;
use crate::message::Message;
use crate::private::arena::{Arena, SegmentId};
use crate::private::layout::{wire_helpers, ElementSize, Orphan, StructSize, WirePointerKind};
use crate::private::units::*;
use crate::{text, Error, ErrorKind, MessageSize, Result};

/// What a pointer slot currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerType {
    Null,
    Struct,
    List,
    Capability,
}

#[derive(Clone, Copy)]
pub struct PointerReader<'a> {
    pub(crate) arena: &'a Arena,
    /// `None` for the synthetic null pointer of a missing field.
    pub(crate) location: Option<(SegmentId, ByteCount)>,
    pub(crate) nesting_limit: i32,
}

impl<'a> PointerReader<'a> {
    pub(crate) fn new(
        arena: &'a Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        nesting_limit: i32,
    ) -> PointerReader<'a> {
        PointerReader {
            arena,
            location: Some((segment_id, byte_offset)),
            nesting_limit,
        }
    }

    /// A null pointer.
    pub fn new_default(arena: &'a Arena) -> PointerReader<'a> {
        PointerReader {
            arena,
            location: None,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn is_null(&self) -> bool {
        match self.location {
            None => true,
            Some((segment_id, offset)) => wire_helpers::read_pointer(self.arena, segment_id, offset)
                .map(|p| p.is_null())
                .unwrap_or(true),
        }
    }

    pub fn pointer_type(&self) -> Result<PointerType> {
        let Some((segment_id, offset)) = self.location else {
            return Ok(PointerType::Null);
        };
        if wire_helpers::read_pointer(self.arena, segment_id, offset)?.is_null() {
            return Ok(PointerType::Null);
        }
        let resolved = wire_helpers::follow_fars(self.arena, segment_id, offset)?;
        match resolved.tag.kind() {
            WirePointerKind::Struct => Ok(PointerType::Struct),
            WirePointerKind::List => Ok(PointerType::List),
            WirePointerKind::Other if resolved.tag.is_capability() => Ok(PointerType::Capability),
            _ => Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "unknown pointer kind",
            )),
        }
    }

    pub fn get_struct(&self, default: Option<PointerReader<'a>>) -> Result<StructReader<'a>> {
        match self.location {
            Some((segment_id, offset)) => wire_helpers::read_struct_pointer(
                self.arena,
                segment_id,
                offset,
                default,
                self.nesting_limit,
            ),
            None => match default {
                Some(d) if !d.is_null() => d.get_struct(None),
                _ => Ok(StructReader::new_default(self.arena)),
            },
        }
    }

    pub fn get_list(
        &self,
        element_size: ElementSize,
        default: Option<PointerReader<'a>>,
    ) -> Result<ListReader<'a>> {
        match self.location {
            Some((segment_id, offset)) => wire_helpers::read_list_pointer(
                self.arena,
                segment_id,
                offset,
                Some(element_size),
                default,
                self.nesting_limit,
            ),
            None => match default {
                Some(d) if !d.is_null() => d.get_list(element_size, None),
                _ => Ok(ListReader::new_default(self.arena, element_size)),
            },
        }
    }

    /// Reads a list of any element size.
    pub fn get_list_any(&self, expected: Option<ElementSize>) -> Result<ListReader<'a>> {
        match self.location {
            Some((segment_id, offset)) => wire_helpers::read_list_pointer(
                self.arena,
                segment_id,
                offset,
                expected,
                None,
                self.nesting_limit,
            ),
            None => Ok(ListReader::new_default(
                self.arena,
                expected.unwrap_or(ElementSize::Void),
            )),
        }
    }

    pub fn get_text(&self, default: Option<&'a str>) -> Result<text::Reader<'a>> {
        match self.location {
            Some((segment_id, offset)) => {
                wire_helpers::read_text_pointer(self.arena, segment_id, offset, default)
            }
            None => Ok(text::Reader::from(default.unwrap_or(""))),
        }
    }

    pub fn get_data(&self, default: Option<&'a [u8]>) -> Result<&'a [u8]> {
        match self.location {
            Some((segment_id, offset)) => {
                wire_helpers::read_data_pointer(self.arena, segment_id, offset, default)
            }
            None => Ok(default.unwrap_or(&[])),
        }
    }

    pub fn get_capability(&self) -> Result<Box<dyn ClientHook>> {
        match self.location {
            Some((segment_id, offset)) => {
                wire_helpers::read_capability_pointer(self.arena, segment_id, offset)
            }
            None => Err(Error::detailed(
                ErrorKind::InvalidCapabilityPointer,
                "null capability pointer",
            )),
        }
    }

    /// Words and capabilities reachable through this pointer.
    pub fn total_size(&self) -> Result<MessageSize> {
        match self.location {
            Some((segment_id, offset)) => {
                wire_helpers::total_size(self.arena, segment_id, offset, self.nesting_limit)
            }
            None => Ok(MessageSize::default()),
        }
    }

    /// Deep-copies the target of this pointer into the slot at
    /// `(segment_id, byte_offset)` of `dst`, replacing what was there.
    pub(crate) fn copy_into(
        &self,
        dst: &mut Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
    ) -> Result<()> {
        match self.location {
            Some((src_segment, src_offset)) => wire_helpers::copy_pointer(
                dst,
                segment_id,
                byte_offset,
                self.arena,
                src_segment,
                src_offset,
                self.nesting_limit,
            ),
            None => {
                if !wire_helpers::read_pointer(dst, segment_id, byte_offset)?.is_null() {
                    let limit = dst.nesting_limit();
                    wire_helpers::zero_object(dst, segment_id, byte_offset, limit)?;
                }
                dst.write_word(segment_id, byte_offset, 0)
            }
        }
    }
}

impl core::fmt::Debug for PointerReader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PointerReader")
            .field("location", &self.location)
            .field("nesting_limit", &self.nesting_limit)
            .finish()
    }
}

pub struct PointerBuilder<'a> {
    pub(crate) arena: &'a mut Arena,
    pub(crate) segment_id: SegmentId,
    pub(crate) byte_offset: ByteCount,
    pub(crate) nesting_limit: i32,
}

impl<'a> PointerBuilder<'a> {
    pub(crate) fn new(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        nesting_limit: i32,
    ) -> PointerBuilder<'a> {
        PointerBuilder {
            arena,
            segment_id,
            byte_offset,
            nesting_limit,
        }
    }

    pub fn reborrow(&mut self) -> PointerBuilder<'_> {
        PointerBuilder {
            arena: &mut *self.arena,
            ..*self
        }
    }

    pub fn as_reader(&self) -> PointerReader<'_> {
        PointerReader::new(
            &*self.arena,
            self.segment_id,
            self.byte_offset,
            self.nesting_limit,
        )
    }

    pub fn into_reader(self) -> PointerReader<'a> {
        PointerReader::new(
            self.arena,
            self.segment_id,
            self.byte_offset,
            self.nesting_limit,
        )
    }

    pub fn is_null(&self) -> bool {
        self.as_reader().is_null()
    }

    /// Returns the struct at this slot, upgrading it in place if it is
    /// smaller than `size`. A null slot receives a copy of `default`, or a
    /// zeroed struct of `size`.
    pub fn get_struct(
        self,
        size: StructSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<StructBuilder<'a>> {
        wire_helpers::get_writable_struct_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            size,
            default,
            self.nesting_limit,
        )
    }

    pub fn init_struct(self, size: StructSize) -> Result<StructBuilder<'a>> {
        wire_helpers::init_struct_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            size,
            self.nesting_limit,
        )
    }

    pub fn get_list(
        self,
        element_size: ElementSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_list_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            element_size,
            default,
            self.nesting_limit,
        )
    }

    pub fn get_struct_list(
        self,
        element_size: StructSize,
        default: Option<PointerReader<'_>>,
    ) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_struct_list_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            element_size,
            default,
            self.nesting_limit,
        )
    }

    pub fn init_list(
        self,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Result<ListBuilder<'a>> {
        wire_helpers::init_list_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            element_count,
            element_size,
            self.nesting_limit,
        )
    }

    pub fn init_struct_list(
        self,
        element_size: StructSize,
        element_count: ElementCount32,
    ) -> Result<ListBuilder<'a>> {
        wire_helpers::init_struct_list_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            element_count,
            element_size,
            self.nesting_limit,
        )
    }

    pub fn get_text(self, default: Option<&str>) -> Result<text::Builder<'a>> {
        wire_helpers::get_writable_text_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            default,
        )
    }

    pub fn init_text(self, size: ByteCount) -> Result<text::Builder<'a>> {
        wire_helpers::init_text_pointer(self.arena, self.segment_id, self.byte_offset, size)
    }

    pub fn set_text(self, value: &str) -> Result<()> {
        wire_helpers::set_text_pointer(self.arena, self.segment_id, self.byte_offset, value)?;
        Ok(())
    }

    pub fn get_data(self, default: Option<&[u8]>) -> Result<&'a mut [u8]> {
        wire_helpers::get_writable_data_pointer(
            self.arena,
            self.segment_id,
            self.byte_offset,
            default,
        )
    }

    pub fn init_data(self, size: ByteCount) -> Result<&'a mut [u8]> {
        wire_helpers::init_data_pointer(self.arena, self.segment_id, self.byte_offset, size)
    }

    pub fn set_data(self, value: &[u8]) -> Result<()> {
        wire_helpers::set_data_pointer(self.arena, self.segment_id, self.byte_offset, value)?;
        Ok(())
    }

    /// Deep-copies a struct from another message into this slot.
    pub fn set_struct(self, value: StructReader<'_>) -> Result<()> {
        wire_helpers::set_struct_pointer(self.arena, self.segment_id, self.byte_offset, value)
    }

    /// Deep-copies a list from another message into this slot.
    pub fn set_list(self, value: ListReader<'_>) -> Result<()> {
        wire_helpers::set_list_pointer(self.arena, self.segment_id, self.byte_offset, value)
    }

    /// Deep-copies whatever `other` points to into this slot.
    pub fn copy_from(self, other: PointerReader<'_>) -> Result<()> {
        other.copy_into(self.arena, self.segment_id, self.byte_offset)
    }

    pub fn set_capability(self, hook: Box<dyn ClientHook>) -> Result<()> {
        wire_helpers::set_capability_pointer(self.arena, self.segment_id, self.byte_offset, hook)
    }

    pub fn get_capability(&self) -> Result<Box<dyn ClientHook>> {
        self.as_reader().get_capability()
    }

    pub fn adopt(self, orphan: Orphan) -> Result<()> {
        wire_helpers::adopt(self.arena, self.segment_id, self.byte_offset, orphan)
    }

    pub fn disown(self) -> Result<Orphan> {
        wire_helpers::disown(self.arena, self.segment_id, self.byte_offset)
    }

    /// Zeroes the target and then the slot.
    pub fn clear(self) -> Result<()> {
        if wire_helpers::read_pointer(self.arena, self.segment_id, self.byte_offset)?.is_null() {
            return Ok(());
        }
        let limit = self.arena.nesting_limit();
        wire_helpers::zero_object(self.arena, self.segment_id, self.byte_offset, limit)?;
        self.arena.write_word(self.segment_id, self.byte_offset, 0)
    }
}

impl Orphan {
    /// A builder over the orphaned struct. The orphan must have been
    /// created by, or disowned from, `message`.
    pub fn as_struct<'a>(&self, message: &'a mut Message) -> Result<StructBuilder<'a>> {
        wire_helpers::orphan_struct_builder(message.arena_mut(), self)
    }

    pub fn as_list<'a>(&self, message: &'a mut Message) -> Result<ListBuilder<'a>> {
        wire_helpers::orphan_list_builder(message.arena_mut(), self)
    }

    pub fn as_struct_reader<'a>(&self, message: &'a Message) -> Result<StructReader<'a>> {
        let arena = message.arena();
        if self.tag.kind() != WirePointerKind::Struct || self.is_null() {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "orphan is not a struct",
            ));
        }
        let size = self.tag.struct_size();
        arena.check_bounds(self.segment_id, self.byte_offset, size.byte_length())?;
        Ok(StructReader::new(
            arena,
            self.segment_id,
            self.byte_offset,
            size,
            arena.nesting_limit(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::capability::test_util::LocalHook;
    use crate::message::Message;
    use crate::{ElementSize, ErrorKind, PointerType, StructSize};

    #[test]
    fn pointer_types() {
        let mut message = Message::new_default();
        let mut root = message.init_root(StructSize::new(0, 4)).unwrap();
        root.reborrow().init_struct(0, StructSize::new(1, 0)).unwrap();
        root.reborrow().init_list(1, ElementSize::Byte, 3).unwrap();
        root.set_capability(2, Box::new(LocalHook(5))).unwrap();

        let root = message.get_root_as_reader().unwrap();
        assert_eq!(root.get_pointer_field(0).pointer_type().unwrap(), PointerType::Struct);
        assert_eq!(root.get_pointer_field(1).pointer_type().unwrap(), PointerType::List);
        assert_eq!(
            root.get_pointer_field(2).pointer_type().unwrap(),
            PointerType::Capability
        );
        assert_eq!(root.get_pointer_field(3).pointer_type().unwrap(), PointerType::Null);
        assert_eq!(root.get_pointer_field(9).pointer_type().unwrap(), PointerType::Null);
        assert_eq!(root.get_capability(2).unwrap().get_ptr(), 5);
        assert_eq!(
            root.get_struct(1, None).unwrap_err().kind,
            ErrorKind::InvalidPointerType
        );
    }

    #[test]
    fn null_struct_reads_as_default() {
        let mut message = Message::new_default();
        message.init_root(StructSize::new(0, 1)).unwrap();
        let root = message.get_root_as_reader().unwrap();
        let child = root.get_struct(0, None).unwrap();
        assert_eq!(child.size(), StructSize::new(0, 0));
        assert_eq!(child.get_data_field::<u64>(0), 0);
        assert!(child.get_pointer_field(0).is_null());
    }

    #[test]
    fn default_pointer_is_copied_on_first_write() {
        let mut defaults = Message::new_default();
        {
            let mut root = defaults.init_root(StructSize::new(1, 1)).unwrap();
            root.set_data_field::<u32>(0, 42).unwrap();
            root.set_text(0, "seed").unwrap();
        }

        let mut message = Message::new_default();
        message.init_root(StructSize::new(0, 1)).unwrap();
        {
            let default = defaults.root_pointer_reader().unwrap();
            let reader = message.get_root_as_reader().unwrap();
            let child = reader.get_struct(0, Some(default)).unwrap();
            assert_eq!(child.get_data_field::<u32>(0), 42);
            assert!(reader.get_pointer_field(0).is_null());
        }

        let default = defaults.root_pointer_reader().unwrap();
        let root = message.get_root(StructSize::new(0, 1)).unwrap();
        let mut child = root
            .get_struct(0, StructSize::new(1, 1), Some(default))
            .unwrap();
        child.set_data_field::<u32>(0, 43).unwrap();
        assert_eq!(child.as_reader().get_text(0, None).unwrap(), "seed");

        let reader = message.get_root_as_reader().unwrap();
        assert_eq!(
            reader.get_struct(0, None).unwrap().get_data_field::<u32>(0),
            43
        );
    }

    #[test]
    fn clear_zeroes_target() {
        let mut message = Message::new_default();
        let mut root = message.init_root(StructSize::new(0, 1)).unwrap();
        root.set_text(0, "gone soon").unwrap();
        root.reborrow().get_pointer_field(0).unwrap().clear().unwrap();
        assert!(root.as_reader().get_pointer_field(0).is_null());
        let segments = message.segments_for_output();
        assert!(segments[0][16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn disown_then_adopt_elsewhere() {
        let mut message = Message::new_default();
        let mut root = message.init_root(StructSize::new(0, 2)).unwrap();
        {
            let mut child = root.reborrow().init_struct(0, StructSize::new(1, 0)).unwrap();
            child.set_data_field::<u64>(0, 0x1122_3344).unwrap();
        }
        let orphan = root.disown(0).unwrap();
        assert!(root.as_reader().get_pointer_field(0).is_null());
        root.adopt(1, orphan).unwrap();

        let reader = message.get_root_as_reader().unwrap();
        assert_eq!(
            reader.get_struct(1, None).unwrap().get_data_field::<u64>(0),
            0x1122_3344
        );
        assert!(reader.get_pointer_field(0).is_null());
    }

    #[test]
    fn orphan_builder() {
        let mut message = Message::new_default();
        message.init_root(StructSize::new(0, 1)).unwrap();
        let orphan = message.new_orphan_struct(StructSize::new(1, 0)).unwrap();
        orphan
            .as_struct(&mut message)
            .unwrap()
            .set_data_field::<u16>(0, 77)
            .unwrap();
        assert_eq!(
            orphan
                .as_struct_reader(&message)
                .unwrap()
                .get_data_field::<u16>(0),
            77
        );
        let mut root = message.get_root(StructSize::new(0, 1)).unwrap();
        root.adopt(0, orphan).unwrap();
        let reader = message.get_root_as_reader().unwrap();
        assert_eq!(
            reader.get_struct(0, None).unwrap().get_data_field::<u16>(0),
            77
        );
    }
}
