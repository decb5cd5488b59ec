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

//! Segment storage for a message.
//!
//! A message is a sequence of segments, each a word-aligned byte buffer
//! with a bump-allocation cursor. Every view into the message is an index
//! pair (segment id, byte offset) resolved against the [`Arena`], so all
//! addressing goes through the bounds checks here.

use alloc::vec::Vec;

use crate::capability::CapTable;
use crate::message::{HeapAllocator, ReaderOptions};
use crate::private::primitive::Primitive;
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::{Error, ErrorKind, Result};

pub type SegmentId = u32;

/// One contiguous region of a message.
pub struct Segment {
    id: SegmentId,
    buffer: Vec<u8>,
    /// Bytes in use. Always a multiple of eight and never past `buffer.len()`.
    byte_length: ByteCount,
}

impl Segment {
    pub fn new(id: SegmentId, buffer: Vec<u8>, byte_length: ByteCount) -> Segment {
        debug_assert!(byte_length <= buffer.len());
        debug_assert_eq!(byte_length % BYTES_PER_WORD, 0);
        Segment {
            id,
            buffer,
            byte_length,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn byte_length(&self) -> ByteCount {
        self.byte_length
    }

    pub fn word_length(&self) -> WordCount {
        self.byte_length / BYTES_PER_WORD
    }

    pub fn capacity(&self) -> ByteCount {
        self.buffer.len()
    }

    pub fn has_capacity(&self, byte_length: ByteCount) -> bool {
        self.byte_length + byte_length <= self.buffer.len()
    }

    /// The used prefix of the segment, as it goes on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.byte_length]
    }

    /// Swaps in a larger backing buffer, carrying over the used prefix.
    pub fn replace_buffer(&mut self, mut buffer: Vec<u8>) -> Result<()> {
        if buffer.len() < self.byte_length {
            return Err(Error::from_kind(ErrorKind::BufferTooSmall));
        }
        buffer[..self.byte_length].copy_from_slice(&self.buffer[..self.byte_length]);
        buffer[self.byte_length..].fill(0);
        self.buffer = buffer;
        Ok(())
    }

    /// Bumps the cursor by `byte_length` (already word-padded) and returns
    /// the offset of the new region, or `None` if the buffer is full.
    pub(crate) fn try_allocate(&mut self, byte_length: ByteCount) -> Option<ByteCount> {
        if self.has_capacity(byte_length) {
            let result = self.byte_length;
            self.byte_length += byte_length;
            Some(result)
        } else {
            None
        }
    }

    #[inline]
    pub fn get<T: Primitive>(&self, byte_offset: ByteCount) -> T {
        T::load(&self.buffer[byte_offset..byte_offset + T::BYTES])
    }

    #[inline]
    pub fn set<T: Primitive>(&mut self, byte_offset: ByteCount, value: T) {
        T::store(&mut self.buffer[byte_offset..byte_offset + T::BYTES], value)
    }

    #[inline]
    pub fn get_word(&self, byte_offset: ByteCount) -> u64 {
        self.get::<u64>(byte_offset)
    }

    #[inline]
    pub fn set_word(&mut self, byte_offset: ByteCount, value: u64) {
        self.set::<u64>(byte_offset, value)
    }

    pub fn is_word_zero(&self, byte_offset: ByteCount) -> bool {
        self.get_word(byte_offset) == 0
    }

    pub fn bytes(&self, byte_offset: ByteCount, byte_length: ByteCount) -> &[u8] {
        &self.buffer[byte_offset..byte_offset + byte_length]
    }

    pub fn bytes_mut(&mut self, byte_offset: ByteCount, byte_length: ByteCount) -> &mut [u8] {
        &mut self.buffer[byte_offset..byte_offset + byte_length]
    }

    pub fn fill_zero_words(&mut self, byte_offset: ByteCount, word_length: WordCount) {
        self.buffer[byte_offset..byte_offset + word_length * BYTES_PER_WORD].fill(0);
    }

    pub fn copy_word(&mut self, dst_offset: ByteCount, src: &Segment, src_offset: ByteCount) {
        self.set_word(dst_offset, src.get_word(src_offset));
    }

    pub fn copy_words(
        &mut self,
        dst_offset: ByteCount,
        src: &Segment,
        src_offset: ByteCount,
        word_length: WordCount,
    ) {
        let len = word_length * BYTES_PER_WORD;
        self.buffer[dst_offset..dst_offset + len]
            .copy_from_slice(&src.buffer[src_offset..src_offset + len]);
    }
}

impl core::fmt::Debug for Segment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Segment")
            .field("id", &self.id)
            .field("byte_length", &self.byte_length)
            .field("capacity", &self.buffer.len())
            .finish()
    }
}

/// Owns the segments of one message, together with the resources every
/// view needs: the allocator for new segments, the capability table, and
/// the limits applied to untrusted input.
#[derive(Debug)]
pub struct Arena {
    segments: Vec<Segment>,
    allocator: HeapAllocator,
    cap_table: CapTable,
    read_limiter: ReadLimiter,
    nesting_limit: i32,
}

impl Arena {
    /// An empty arena for building a new message.
    pub fn new(allocator: HeapAllocator, options: ReaderOptions) -> Arena {
        Arena {
            segments: Vec::new(),
            allocator,
            cap_table: CapTable::new(),
            read_limiter: ReadLimiter::new(options.traversal_limit_in_words),
            nesting_limit: options.nesting_limit,
        }
    }

    /// An arena over segments received from elsewhere. Every segment is
    /// considered full; further allocation goes to fresh segments.
    pub fn from_segments(buffers: Vec<Vec<u8>>, options: ReaderOptions) -> Result<Arena> {
        let mut segments = Vec::with_capacity(buffers.len());
        for (id, buffer) in buffers.into_iter().enumerate() {
            if buffer.len() % BYTES_PER_WORD != 0 {
                return Err(Error::from_kind(ErrorKind::MessageNotWordAligned));
            }
            if buffer.len() / BYTES_PER_WORD > MAX_SEGMENT_WORDS {
                return Err(Error::from_kind(ErrorKind::SizeOverflow));
            }
            let len = buffer.len();
            segments.push(Segment::new(id as SegmentId, buffer, len));
        }
        Ok(Arena {
            segments,
            allocator: HeapAllocator::new(),
            cap_table: CapTable::new(),
            read_limiter: ReadLimiter::new(options.traversal_limit_in_words),
            nesting_limit: options.nesting_limit,
        })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.segments
            .get(id as usize)
            .ok_or_else(|| invalid_segment_id(id))
    }

    pub fn segment_mut(&mut self, id: SegmentId) -> Result<&mut Segment> {
        self.segments
            .get_mut(id as usize)
            .ok_or_else(|| invalid_segment_id(id))
    }

    pub fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }

    pub fn cap_table(&self) -> &CapTable {
        &self.cap_table
    }

    pub fn cap_table_mut(&mut self) -> &mut CapTable {
        &mut self.cap_table
    }

    /// Charges `words` against the traversal limit.
    #[inline]
    pub fn can_read(&self, words: WordCount) -> Result<()> {
        self.read_limiter.can_read(words)
    }

    /// Checks that `[byte_offset, byte_offset + byte_length)` lies inside
    /// the used part of the segment.
    pub fn check_bounds(
        &self,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        byte_length: ByteCount,
    ) -> Result<()> {
        let segment = self.segment(segment_id)?;
        match byte_offset.checked_add(byte_length) {
            Some(end) if end <= segment.byte_length => Ok(()),
            _ => Err(Error::from_kind(ErrorKind::BoundsError)),
        }
    }

    /// Creates a new segment able to hold at least `minimum_words`.
    pub fn allocate_segment(&mut self, minimum_words: WordCount) -> Result<SegmentId> {
        if minimum_words > MAX_SEGMENT_WORDS {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let buffer = self.allocator.allocate_segment(minimum_words as WordCount32);
        let id = self.segments.len() as SegmentId;
        tracing::debug!(
            segment_id = id,
            words = buffer.len() / BYTES_PER_WORD,
            "allocated segment"
        );
        self.segments.push(Segment::new(id, buffer, 0));
        Ok(id)
    }

    /// Allocates `words` in the given segment, if it has room.
    pub fn allocate(&mut self, segment_id: SegmentId, words: WordCount) -> Option<ByteCount> {
        self.segments
            .get_mut(segment_id as usize)?
            .try_allocate(words * BYTES_PER_WORD)
    }

    /// Allocates `words` in whichever segment has room, creating a new
    /// segment if none does.
    pub fn allocate_anywhere(&mut self, words: WordCount) -> Result<(SegmentId, ByteCount)> {
        if words > MAX_SEGMENT_WORDS - POINTER_SIZE_IN_WORDS {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        for id in 0..self.segments.len() as SegmentId {
            if let Some(offset) = self.allocate(id, words) {
                return Ok((id, offset));
            }
        }
        let id = self.allocate_segment(words)?;
        match self.allocate(id, words) {
            Some(offset) => Ok((id, offset)),
            None => Err(Error::from_kind(ErrorKind::SizeOverflow)),
        }
    }

    /// Allocates `byte_length` bytes, rounded up to whole words, preferring
    /// `segment_id` and falling back to any segment with room.
    pub fn allocate_bytes(
        &mut self,
        segment_id: SegmentId,
        byte_length: ByteCount,
    ) -> Result<(SegmentId, ByteCount)> {
        let words = words_for_bytes(byte_length);
        if words > MAX_SEGMENT_WORDS - POINTER_SIZE_IN_WORDS {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        match self.allocate(segment_id, words) {
            Some(offset) => Ok((segment_id, offset)),
            None => self.allocate_anywhere(words),
        }
    }

    pub fn read_word(&self, segment_id: SegmentId, byte_offset: ByteCount) -> Result<u64> {
        Ok(self.segment(segment_id)?.get_word(byte_offset))
    }

    pub fn write_word(
        &mut self,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        value: u64,
    ) -> Result<()> {
        self.segment_mut(segment_id)?.set_word(byte_offset, value);
        Ok(())
    }

    pub fn fill_zero_words(
        &mut self,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        words: WordCount,
    ) -> Result<()> {
        self.segment_mut(segment_id)?
            .fill_zero_words(byte_offset, words);
        Ok(())
    }

    /// Copies `words` words between two locations of this arena. The two
    /// ranges may live in the same segment but must not overlap.
    pub fn copy_words(
        &mut self,
        dst_segment: SegmentId,
        dst_offset: ByteCount,
        src_segment: SegmentId,
        src_offset: ByteCount,
        words: WordCount,
    ) -> Result<()> {
        let (dst, src) = (dst_segment as usize, src_segment as usize);
        if dst >= self.segments.len() {
            return Err(invalid_segment_id(dst_segment));
        }
        if src >= self.segments.len() {
            return Err(invalid_segment_id(src_segment));
        }
        let len = words * BYTES_PER_WORD;
        if dst == src {
            self.segments[dst]
                .buffer
                .copy_within(src_offset..src_offset + len, dst_offset);
        } else if dst < src {
            let (lo, hi) = self.segments.split_at_mut(src);
            lo[dst].copy_words(dst_offset, &hi[0], src_offset, words);
        } else {
            let (lo, hi) = self.segments.split_at_mut(dst);
            hi[0].copy_words(dst_offset, &lo[src], src_offset, words);
        }
        Ok(())
    }

    /// The used prefix of every segment, in id order.
    pub fn segments_for_output(&self) -> Vec<&[u8]> {
        self.segments.iter().map(Segment::as_bytes).collect()
    }

    pub fn size_in_words(&self) -> WordCount {
        self.segments.iter().map(Segment::word_length).sum()
    }
}

fn invalid_segment_id(id: SegmentId) -> Error {
    Error {
        kind: ErrorKind::InvalidSegmentId,
        extra: alloc::format!("segment {id}"),
    }
}
