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

//! Messages: the arena that owns every segment, plus the root pointer and
//! the capability table.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::any_struct::{StructBuilder, StructReader};
use crate::capability::{CapTable, ClientHook};
use crate::pointer::{PointerBuilder, PointerReader};
use crate::private::arena::{Arena, Segment, SegmentId};
use crate::private::layout::{wire_helpers, ElementSize, Orphan, StructSize};
use crate::private::units::*;
use crate::traits::{FromStructBuilder, FromStructReader, Owned, StructMeta};
use crate::{serialize, serialize_packed, Error, ErrorKind, MessageSize, OutputSegments, Result};

/// Options controlling how data is read.
#[derive(Clone, Copy, Debug)]
pub struct ReaderOptions {
    /// Limits how many total words of data are allowed to be traversed. Traversal is counted when
    /// a new struct or list reader is obtained, e.g. from a get() accessor. This means that calling
    /// the getter for the same sub-struct multiple times will cause it to be double-counted. Once
    /// the traversal limit is reached, an error will be reported.
    ///
    /// This limit exists for security reasons. It is possible for an attacker to construct a message
    /// in which multiple pointers point at the same location. This is technically invalid, but hard
    /// to detect. Using such a message, an attacker could cause a message which is small on the wire
    /// to appear much larger when actually traversed, possibly exhausting server resources leading to
    /// denial-of-service.
    ///
    /// `None` disables the limit.
    pub traversal_limit_in_words: Option<usize>,

    /// Limits how deeply nested a message structure can be, e.g. structs containing other structs or
    /// lists of structs.
    ///
    /// Like the traversal limit, this limit exists for security reasons. Since it is common to use
    /// recursive code to traverse recursive data structures, an attacker could easily cause a stack
    /// overflow by sending a very-deeply-nested message, without the message even being very large.
    pub nesting_limit: i32,
}

pub const DEFAULT_READER_OPTIONS: ReaderOptions = ReaderOptions {
    traversal_limit_in_words: Some(8 * 1024 * 1024),
    nesting_limit: 64,
};

impl Default for ReaderOptions {
    fn default() -> ReaderOptions {
        DEFAULT_READER_OPTIONS
    }
}

impl ReaderOptions {
    pub fn new() -> ReaderOptions {
        DEFAULT_READER_OPTIONS
    }

    pub fn nesting_limit(&mut self, value: i32) -> &mut ReaderOptions {
        self.nesting_limit = value;
        self
    }

    pub fn traversal_limit_in_words(&mut self, value: Option<usize>) -> &mut ReaderOptions {
        self.traversal_limit_in_words = value;
        self
    }

    /// Options for input that comes from a trusted source: no traversal
    /// limit and effectively no nesting limit. Bounds are still checked.
    pub fn trusted() -> ReaderOptions {
        ReaderOptions {
            traversal_limit_in_words: None,
            nesting_limit: i32::MAX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationStrategy {
    FixedSize,
    GrowHeuristically,
}

pub const SUGGESTED_FIRST_SEGMENT_WORDS: u32 = 1024;
pub const SUGGESTED_ALLOCATION_STRATEGY: AllocationStrategy = AllocationStrategy::GrowHeuristically;

/// Hands out zeroed buffers for new segments.
#[derive(Debug)]
pub struct HeapAllocator {
    next_size: u32,
    allocation_strategy: AllocationStrategy,
}

impl Default for HeapAllocator {
    fn default() -> HeapAllocator {
        HeapAllocator::new()
    }
}

impl HeapAllocator {
    pub fn new() -> HeapAllocator {
        HeapAllocator {
            next_size: SUGGESTED_FIRST_SEGMENT_WORDS,
            allocation_strategy: SUGGESTED_ALLOCATION_STRATEGY,
        }
    }

    pub fn first_segment_words(mut self, value: u32) -> HeapAllocator {
        self.next_size = value;
        self
    }

    pub fn allocation_strategy(mut self, value: AllocationStrategy) -> HeapAllocator {
        self.allocation_strategy = value;
        self
    }

    /// A zero-filled buffer of at least `minimum_size` words.
    pub fn allocate_segment(&mut self, minimum_size: u32) -> Vec<u8> {
        let max = MAX_SEGMENT_WORDS as u32;
        let size = core::cmp::min(core::cmp::max(minimum_size, self.next_size), max);
        if let AllocationStrategy::GrowHeuristically = self.allocation_strategy {
            self.next_size = core::cmp::min(self.next_size.saturating_add(size), max);
        }
        alloc::vec![0; size as usize * BYTES_PER_WORD]
    }
}

/// A Cap'n Proto message, for building or for reading.
///
/// The root pointer is the first word of segment 0.
pub struct Message {
    arena: Arena,
}

impl Message {
    pub fn new(allocator: HeapAllocator) -> Message {
        Message::with_options(allocator, ReaderOptions::new())
    }

    pub fn new_default() -> Message {
        Message::new(HeapAllocator::new())
    }

    pub fn with_options(allocator: HeapAllocator, options: ReaderOptions) -> Message {
        Message {
            arena: Arena::new(allocator, options),
        }
    }

    /// Wraps segments received from elsewhere. The segments are considered
    /// full, so anything built on top of them goes to new segments.
    pub fn from_segments(segments: Vec<Vec<u8>>, options: ReaderOptions) -> Result<Message> {
        if segments.is_empty() {
            return Err(Error::from_kind(ErrorKind::TooFewSegments));
        }
        Ok(Message {
            arena: Arena::from_segments(segments, options)?,
        })
    }

    pub fn from_single_segment(segment: Vec<u8>, options: ReaderOptions) -> Result<Message> {
        Message::from_segments(alloc::vec![segment], options)
    }

    /// Parses a framed message: a segment table followed by the segments.
    pub fn from_bytes(bytes: &[u8], options: ReaderOptions) -> Result<Message> {
        let mut slice = bytes;
        serialize::read_message_from_flat_slice(&mut slice, options)
    }

    /// Parses a framed message that was compressed with the packing codec.
    pub fn from_packed_bytes(bytes: &[u8], options: ReaderOptions) -> Result<Message> {
        serialize_packed::read_message(bytes, options)
    }

    pub(crate) fn arena(&self) -> &Arena {
        &self.arena
    }

    pub(crate) fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Makes sure the root pointer word exists at the start of segment 0.
    fn ensure_root(&mut self) -> Result<()> {
        if self.arena.is_empty() {
            self.arena.allocate_segment(POINTER_SIZE_IN_WORDS)?;
        }
        if self.arena.segment(0)?.byte_length() > 0 {
            return Ok(());
        }
        match self.arena.allocate(0, POINTER_SIZE_IN_WORDS) {
            Some(0) => Ok(()),
            _ => Err(Error::failed(
                "first segment has no room for the root pointer".into(),
            )),
        }
    }

    pub fn root_pointer(&mut self) -> Result<PointerBuilder<'_>> {
        self.ensure_root()?;
        let nesting_limit = self.arena.nesting_limit();
        Ok(PointerBuilder::new(&mut self.arena, 0, 0, nesting_limit))
    }

    pub fn root_pointer_reader(&self) -> Result<PointerReader<'_>> {
        if self.arena.is_empty() {
            return Ok(PointerReader::new_default(&self.arena));
        }
        self.arena.check_bounds(0, 0, BYTES_PER_WORD)?;
        Ok(PointerReader::new(
            &self.arena,
            0,
            0,
            self.arena.nesting_limit(),
        ))
    }

    /// Allocates a fresh root struct, discarding any previous root.
    pub fn init_root(&mut self, size: StructSize) -> Result<StructBuilder<'_>> {
        self.root_pointer()?.init_struct(size)
    }

    /// Gets the root struct for writing, upgrading it if it is smaller than
    /// `size`.
    pub fn get_root(&mut self, size: StructSize) -> Result<StructBuilder<'_>> {
        self.root_pointer()?.get_struct(size, None)
    }

    pub fn get_root_as_reader(&self) -> Result<StructReader<'_>> {
        self.root_pointer_reader()?.get_struct(None)
    }

    /// Deep-copies `value` into the root.
    pub fn set_root(&mut self, value: StructReader<'_>) -> Result<()> {
        self.root_pointer()?.set_struct(value)
    }

    pub fn init_root_as<T: Owned + StructMeta>(&mut self) -> Result<T::Builder<'_>> {
        Ok(FromStructBuilder::new(
            self.init_root(T::STRUCT_SIZE)?,
        ))
    }

    pub fn get_root_as<T: Owned + StructMeta>(&mut self) -> Result<T::Builder<'_>> {
        Ok(FromStructBuilder::new(
            self.get_root(T::STRUCT_SIZE)?,
        ))
    }

    pub fn read_root_as<T: Owned>(&self) -> Result<T::Reader<'_>> {
        Ok(FromStructReader::new(
            self.get_root_as_reader()?,
        ))
    }

    /// Adds a capability to the table and returns its index.
    pub fn add_capability(&mut self, hook: Box<dyn ClientHook>) -> u32 {
        self.arena.cap_table_mut().inject_cap(hook)
    }

    pub fn get_capability(&self, index: u32) -> Option<Box<dyn ClientHook>> {
        self.arena.cap_table().extract_cap(index)
    }

    pub fn cap_table(&self) -> &CapTable {
        self.arena.cap_table()
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.arena.segment(id)
    }

    pub fn segment_count(&self) -> usize {
        self.arena.len()
    }

    /// Creates a new, empty segment able to hold at least `minimum_words`.
    pub fn allocate_segment(&mut self, minimum_words: WordCount) -> Result<SegmentId> {
        self.arena.allocate_segment(minimum_words)
    }

    /// Reserves `byte_length` zeroed bytes, rounded up to whole words, in the
    /// last segment or wherever there is room.
    pub fn allocate(&mut self, byte_length: ByteCount) -> Result<(SegmentId, ByteCount)> {
        self.ensure_root()?;
        let preferred = (self.arena.len() - 1) as SegmentId;
        self.arena.allocate_bytes(preferred, byte_length)
    }

    /// Swaps in a larger buffer for segment `id`, keeping its content.
    pub fn replace_segment_buffer(&mut self, id: SegmentId, buffer: Vec<u8>) -> Result<()> {
        self.arena.segment_mut(id)?.replace_buffer(buffer)
    }

    pub fn segments_for_output(&self) -> OutputSegments<'_> {
        self.arena.segments_for_output()
    }

    /// Words in use across all segments.
    pub fn size_in_words(&self) -> WordCount {
        self.arena.size_in_words()
    }

    /// Words and capabilities reachable from the root.
    pub fn total_size(&self) -> Result<MessageSize> {
        self.root_pointer_reader()?.total_size()
    }

    /// The message framed with its segment table.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialize::write_message_to_bytes(self)
    }

    /// The framed message, compressed with the packing codec.
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        serialize_packed::write_message_to_bytes(self)
    }

    pub fn new_orphan_struct(&mut self, size: StructSize) -> Result<Orphan> {
        self.ensure_root()?;
        wire_helpers::new_orphan_struct(&mut self.arena, size)
    }

    pub fn new_orphan_list(
        &mut self,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Result<Orphan> {
        self.ensure_root()?;
        wire_helpers::new_orphan_list(&mut self.arena, element_size, element_count)
    }

    pub fn new_orphan_struct_list(
        &mut self,
        element_size: StructSize,
        element_count: ElementCount32,
    ) -> Result<Orphan> {
        self.ensure_root()?;
        wire_helpers::new_orphan_struct_list(&mut self.arena, element_size, element_count)
    }

    pub fn new_orphan_text(&mut self, value: &str) -> Result<Orphan> {
        self.ensure_root()?;
        wire_helpers::new_orphan_bytes(&mut self.arena, value.as_bytes(), true)
    }

    pub fn new_orphan_data(&mut self, value: &[u8]) -> Result<Orphan> {
        self.ensure_root()?;
        wire_helpers::new_orphan_bytes(&mut self.arena, value, false)
    }
}

impl core::fmt::Debug for Message {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Message")
            .field("segments", &self.arena.len())
            .field("words", &self.arena.size_in_words())
            .field("capabilities", &self.arena.cap_table().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocationStrategy, HeapAllocator, Message, ReaderOptions};
    use crate::capability::test_util::LocalHook;
    use crate::{ElementSize, ErrorKind, StructSize};

    #[test]
    fn heap_allocator_grows() {
        let mut allocator = HeapAllocator::new().first_segment_words(4);
        assert_eq!(allocator.allocate_segment(1).len(), 32);
        assert_eq!(allocator.allocate_segment(1).len(), 64);
        assert_eq!(allocator.allocate_segment(100).len(), 800);

        let mut fixed = HeapAllocator::new()
            .first_segment_words(4)
            .allocation_strategy(AllocationStrategy::FixedSize);
        assert_eq!(fixed.allocate_segment(1).len(), 32);
        assert_eq!(fixed.allocate_segment(1).len(), 32);
        assert!(fixed.allocate_segment(2).iter().all(|b| *b == 0));
    }

    #[test]
    fn root_lives_at_start_of_first_segment() {
        let mut message = Message::new_default();
        assert!(message.get_root_as_reader().unwrap().get_pointer_field(0).is_null());
        message.init_root(StructSize::new(1, 0)).unwrap();
        let segments = message.segments_for_output();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].len(), 16);
        // Struct pointer, offset 0, one data word.
        assert_eq!(&segments[0][..8], &[0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn orphan_before_root_keeps_root_in_place() {
        let mut message = Message::new_default();
        let orphan = message.new_orphan_text("early").unwrap();
        let mut root = message.init_root(StructSize::new(0, 1)).unwrap();
        root.adopt(0, orphan).unwrap();
        let root = message.get_root_as_reader().unwrap();
        assert_eq!(root.get_text(0, None).unwrap(), "early");
    }

    #[test]
    fn set_root_deep_copies() {
        let mut source = Message::new_default();
        {
            let mut root = source.init_root(StructSize::new(1, 2)).unwrap();
            root.set_data_field::<i64>(0, -5).unwrap();
            root.set_text(0, "copied").unwrap();
            let mut list = root.init_list(1, ElementSize::TwoBytes, 3).unwrap();
            list.set::<u16>(2, 300);
        }
        let mut copy = Message::new_default();
        copy.set_root(source.get_root_as_reader().unwrap()).unwrap();
        drop(source);

        let root = copy.get_root_as_reader().unwrap();
        assert_eq!(root.get_data_field::<i64>(0), -5);
        assert_eq!(root.get_text(0, None).unwrap(), "copied");
        let list = root.get_list(1, ElementSize::TwoBytes, None).unwrap();
        assert_eq!(list.get::<u16>(2), 300);
        assert_eq!(copy.total_size().unwrap().word_count, 3 + 1 + 1);
    }

    #[test]
    fn capabilities_travel_with_copies() {
        let mut source = Message::new_default();
        source
            .init_root(StructSize::new(0, 1))
            .unwrap()
            .set_capability(0, Box::new(LocalHook(11)))
            .unwrap();
        let mut copy = Message::new_default();
        copy.set_root(source.get_root_as_reader().unwrap()).unwrap();
        assert_eq!(copy.cap_table().len(), 1);
        assert_eq!(copy.get_capability(0).unwrap().get_ptr(), 11);
        assert_eq!(copy.total_size().unwrap().cap_count, 1);
    }

    #[test]
    fn replace_segment_buffer_keeps_content() {
        let mut message = Message::new(HeapAllocator::new().first_segment_words(2));
        message
            .init_root(StructSize::new(1, 0))
            .unwrap()
            .set_data_field::<u32>(0, 9)
            .unwrap();
        let err = message.replace_segment_buffer(0, vec![0; 8]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BufferTooSmall);
        message.replace_segment_buffer(0, vec![0xff; 64]).unwrap();
        assert_eq!(message.segment(0).unwrap().capacity(), 64);
        let root = message.get_root_as_reader().unwrap();
        assert_eq!(root.get_data_field::<u32>(0), 9);
    }

    #[test]
    fn from_segments_rejects_empty_list() {
        let err = Message::from_segments(Vec::new(), ReaderOptions::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TooFewSegments);
    }

    #[test]
    fn trusted_options_disable_limits() {
        let options = ReaderOptions::trusted();
        assert!(options.traversal_limit_in_words.is_none());
        let mut options = ReaderOptions::new();
        options.nesting_limit(3).traversal_limit_in_words(Some(10));
        assert_eq!(options.nesting_limit, 3);
        assert_eq!(options.traversal_limit_in_words, Some(10));
    }
}
