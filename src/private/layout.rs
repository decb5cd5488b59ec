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

//! The pointer model of the wire format.
//!
//! [`WirePointer`] is the 64-bit pointer word. [`wire_helpers`] holds the
//! free functions that follow, allocate, copy, upgrade, and zero the objects
//! those words refer to. Every function addresses the message through the
//! [`Arena`] with a `(segment id, byte offset)` pair and validates wire-derived
//! offsets before touching the segment buffers.

use core::fmt;

use crate::private::arena::SegmentId;
use crate::private::units::*;
use crate::{Error, ErrorKind, Result};

/// Element-size class of a list, as stored in the low three bits of a list
/// pointer's upper half.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    pub fn from(val: u8) -> ElementSize {
        match val & 7 {
            0 => ElementSize::Void,
            1 => ElementSize::Bit,
            2 => ElementSize::Byte,
            3 => ElementSize::TwoBytes,
            4 => ElementSize::FourBytes,
            5 => ElementSize::EightBytes,
            6 => ElementSize::Pointer,
            _ => ElementSize::InlineComposite,
        }
    }

    /// Bits of data per element. Zero for pointer and composite lists.
    pub fn data_bits_per_element(self) -> BitCount32 {
        match self {
            ElementSize::Void => 0,
            ElementSize::Bit => 1,
            ElementSize::Byte => 8,
            ElementSize::TwoBytes => 16,
            ElementSize::FourBytes => 32,
            ElementSize::EightBytes => 64,
            ElementSize::Pointer => 0,
            ElementSize::InlineComposite => 0,
        }
    }

    pub fn pointers_per_element(self) -> WirePointerCount16 {
        match self {
            ElementSize::Pointer => 1,
            _ => 0,
        }
    }

    /// Distance between consecutive elements, in bits. Composite lists take
    /// their step from the tag word instead.
    pub fn step_bits(self) -> BitCount32 {
        self.data_bits_per_element() + self.pointers_per_element() as u32 * BITS_PER_POINTER as u32
    }
}

/// Section sizes of a struct: data words and pointer count.
///
/// Used both for struct allocation and for the tag word of an
/// inline-composite list.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub struct StructSize {
    pub data: WordCount16,
    pub pointers: WirePointerCount16,
}

impl StructSize {
    pub const fn new(data: WordCount16, pointers: WirePointerCount16) -> StructSize {
        StructSize { data, pointers }
    }

    /// Builds a size from a data section measured in bytes, padding it up to
    /// whole words.
    pub fn from_byte_length(
        data_byte_length: ByteCount,
        pointers: WirePointerCount16,
    ) -> Result<StructSize> {
        let words = words_for_bytes(data_byte_length);
        if words > u16::MAX as usize {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        Ok(StructSize::new(words as u16, pointers))
    }

    pub fn total(&self) -> WordCount32 {
        u32::from(self.data) + u32::from(self.pointers)
    }

    pub fn data_byte_length(&self) -> ByteCount32 {
        u32::from(self.data) * BYTES_PER_WORD as u32
    }

    pub fn byte_length(&self) -> ByteCount {
        self.total() as usize * BYTES_PER_WORD
    }

    /// True if both sections of `self` are at least as large as `other`'s.
    pub fn covers(&self, other: StructSize) -> bool {
        self.data >= other.data && self.pointers >= other.pointers
    }

    /// The per-section maximum of two sizes.
    pub fn max(self, other: StructSize) -> StructSize {
        StructSize::new(
            core::cmp::max(self.data, other.data),
            core::cmp::max(self.pointers, other.pointers),
        )
    }
}

#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

/// One pointer word.
///
/// The low half holds the kind and a kind-specific offset; the high half
/// holds section sizes, list sizing, a far segment id, or a capability
/// index.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct WirePointer {
    offset_and_kind: u32,
    upper32bits: u32,
}

impl WirePointer {
    pub const NULL: WirePointer = WirePointer {
        offset_and_kind: 0,
        upper32bits: 0,
    };

    /// A pointer of the given kind with a zero offset and empty upper half.
    pub const fn new(kind: WirePointerKind) -> WirePointer {
        WirePointer {
            offset_and_kind: kind as u32,
            upper32bits: 0,
        }
    }

    #[inline]
    pub fn from_word(word: u64) -> WirePointer {
        WirePointer {
            offset_and_kind: word as u32,
            upper32bits: (word >> 32) as u32,
        }
    }

    #[inline]
    pub fn to_word(self) -> u64 {
        u64::from(self.offset_and_kind) | (u64::from(self.upper32bits) << 32)
    }

    #[inline]
    pub fn kind(self) -> WirePointerKind {
        match self.offset_and_kind & 3 {
            0 => WirePointerKind::Struct,
            1 => WirePointerKind::List,
            2 => WirePointerKind::Far,
            _ => WirePointerKind::Other,
        }
    }

    #[inline]
    pub fn is_positional(self) -> bool {
        (self.offset_and_kind & 2) == 0 // match Struct and List but not Far and Other.
    }

    #[inline]
    pub fn is_capability(self) -> bool {
        self.offset_and_kind == WirePointerKind::Other as u32
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.offset_and_kind == 0 && self.upper32bits == 0
    }

    /// Signed offset in words from the end of the pointer to its target.
    #[inline]
    pub fn offset(self) -> i32 {
        (self.offset_and_kind as i32) >> 2
    }

    /// Byte offset of the target of a positional pointer stored at
    /// `pointer_offset`. May be negative or past the segment for malformed
    /// input; callers bounds-check.
    #[inline]
    pub fn target_offset(self, pointer_offset: ByteCount) -> i64 {
        pointer_offset as i64
            + BYTES_PER_WORD as i64
            + i64::from(self.offset()) * BYTES_PER_WORD as i64
    }

    /// Points a pointer stored at `pointer_offset` at `target_offset` in the
    /// same segment.
    #[inline]
    pub fn set_kind_and_target(
        &mut self,
        kind: WirePointerKind,
        pointer_offset: ByteCount,
        target_offset: ByteCount,
    ) {
        let words =
            (target_offset as i64 - pointer_offset as i64 - BYTES_PER_WORD as i64) / BYTES_PER_WORD as i64;
        self.offset_and_kind = ((words as i32 as u32) << 2) | kind as u32;
    }

    #[inline]
    pub fn set_kind_with_zero_offset(&mut self, kind: WirePointerKind) {
        self.offset_and_kind = kind as u32;
    }

    /// A zero-sized struct is encoded with an offset of -1 so that the word
    /// is distinguishable from null.
    #[inline]
    pub fn set_kind_and_target_for_empty_struct(&mut self) {
        self.offset_and_kind = 0xfffffffc;
        self.upper32bits = 0;
    }

    #[inline]
    pub fn inline_composite_list_element_count(self) -> ElementCount32 {
        self.offset_and_kind >> 2
    }

    #[inline]
    pub fn set_kind_and_inline_composite_list_element_count(
        &mut self,
        kind: WirePointerKind,
        element_count: ElementCount32,
    ) {
        self.offset_and_kind = (element_count << 2) | kind as u32;
    }

    #[inline]
    pub fn far_position_in_segment(self) -> WordCount32 {
        self.offset_and_kind >> 3
    }

    #[inline]
    pub fn is_double_far(self) -> bool {
        ((self.offset_and_kind >> 2) & 1) != 0
    }

    #[inline]
    pub fn set_far(&mut self, is_double_far: bool, pos: WordCount32, segment_id: SegmentId) {
        self.offset_and_kind =
            (pos << 3) | (u32::from(is_double_far) << 2) | WirePointerKind::Far as u32;
        self.upper32bits = segment_id;
    }

    #[inline]
    pub fn far_segment_id(self) -> SegmentId {
        self.upper32bits
    }

    #[inline]
    pub fn set_cap(&mut self, index: u32) {
        self.offset_and_kind = WirePointerKind::Other as u32;
        self.upper32bits = index;
    }

    #[inline]
    pub fn cap_index(self) -> u32 {
        self.upper32bits
    }

    #[inline]
    pub fn struct_data_size(self) -> WordCount16 {
        self.upper32bits as WordCount16
    }

    #[inline]
    pub fn struct_ptr_count(self) -> WirePointerCount16 {
        (self.upper32bits >> 16) as WirePointerCount16
    }

    #[inline]
    pub fn struct_word_size(self) -> WordCount32 {
        self.struct_size().total()
    }

    #[inline]
    pub fn struct_size(self) -> StructSize {
        StructSize::new(self.struct_data_size(), self.struct_ptr_count())
    }

    #[inline]
    pub fn set_struct_size(&mut self, size: StructSize) {
        self.upper32bits = u32::from(size.data) | (u32::from(size.pointers) << 16)
    }

    #[inline]
    pub fn list_element_size(self) -> ElementSize {
        ElementSize::from(self.upper32bits as u8)
    }

    #[inline]
    pub fn list_element_count(self) -> ElementCount32 {
        self.upper32bits >> 3
    }

    #[inline]
    pub fn list_inline_composite_word_count(self) -> WordCount32 {
        self.list_element_count()
    }

    #[inline]
    pub fn set_list_size_and_count(&mut self, es: ElementSize, ec: ElementCount32) {
        debug_assert!(ec <= MAX_LIST_ELEMENTS);
        self.upper32bits = (ec << 3) | es as u32;
    }

    #[inline]
    pub fn set_list_inline_composite(&mut self, wc: WordCount32) {
        debug_assert!(wc <= MAX_LIST_ELEMENTS);
        self.upper32bits = (wc << 3) | ElementSize::InlineComposite as u32;
    }
}

impl fmt::Debug for WirePointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "WirePointer(null)");
        }
        match self.kind() {
            WirePointerKind::Struct => write!(
                f,
                "WirePointer(struct offset={} data={} pointers={})",
                self.offset(),
                self.struct_data_size(),
                self.struct_ptr_count()
            ),
            WirePointerKind::List => write!(
                f,
                "WirePointer(list offset={} size={:?} count={})",
                self.offset(),
                self.list_element_size(),
                self.list_element_count()
            ),
            WirePointerKind::Far => write!(
                f,
                "WirePointer(far double={} segment={} position={})",
                self.is_double_far(),
                self.far_segment_id(),
                self.far_position_in_segment()
            ),
            WirePointerKind::Other => write!(f, "WirePointer(other index={})", self.cap_index()),
        }
    }
}

/// Where an object lives once any far pointers have been followed.
#[derive(Clone, Copy, Debug)]
pub struct Resolved {
    /// The pointer that describes the object's kind and sizes. For a
    /// double-far pointer this is the tag word of the landing pad, whose
    /// offset bits are meaningless.
    pub tag: WirePointer,
    pub segment_id: SegmentId,
    /// First word of the object. For an inline-composite list this is the
    /// element tag word.
    pub byte_offset: ByteCount,
}

/// An object that is not referenced by any pointer slot. Adopting it into a
/// slot rewrites only that slot's pointer word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Orphan {
    pub(crate) tag: WirePointer,
    pub(crate) segment_id: SegmentId,
    pub(crate) byte_offset: ByteCount,
}

impl Orphan {
    pub fn null() -> Orphan {
        Orphan {
            tag: WirePointer::NULL,
            segment_id: 0,
            byte_offset: 0,
        }
    }

    pub fn is_null(&self) -> bool {
        self.tag.is_null()
    }
}

pub(crate) mod wire_helpers {
    use alloc::boxed::Box;

    use super::{ElementSize, Orphan, Resolved, StructSize, WirePointer, WirePointerKind};
    use crate::any_list::{ListBuilder, ListReader};
    use crate::any_struct::{Origin, StructBuilder, StructReader};
    use crate::capability::ClientHook;
    use crate::pointer::PointerReader;
    use crate::private::arena::{Arena, SegmentId};
    use crate::private::units::*;
    use crate::{text, Error, ErrorKind, MessageSize, Result};

    #[inline]
    pub fn read_pointer(
        arena: &Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
    ) -> Result<WirePointer> {
        arena.check_bounds(segment_id, byte_offset, BYTES_PER_WORD)?;
        Ok(WirePointer::from_word(arena.read_word(segment_id, byte_offset)?))
    }

    #[inline]
    pub fn write_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        value: WirePointer,
    ) -> Result<()> {
        arena.write_word(segment_id, byte_offset, value.to_word())
    }

    /// Absolute offset of a positional pointer's target, which must lie
    /// within the used part of its segment.
    fn target_of(
        arena: &Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        reff: WirePointer,
    ) -> Result<ByteCount> {
        let target = reff.target_offset(pointer_offset);
        let len = arena.segment(segment_id)?.byte_length() as i64;
        if target < 0 || target > len {
            return Err(Error::detailed(
                ErrorKind::BoundsError,
                "pointer target lies outside its segment",
            ));
        }
        Ok(target as ByteCount)
    }

    fn invalid_far_pointer(what: &str) -> Error {
        Error::detailed(ErrorKind::InvalidFarPointer, what)
    }

    fn check_nesting(nesting_limit: i32) -> Result<()> {
        if nesting_limit <= 0 {
            Err(Error::from_kind(ErrorKind::DepthLimitExceeded))
        } else {
            Ok(())
        }
    }

    /// Follows at most two levels of far indirection from the pointer at
    /// `(segment_id, pointer_offset)`.
    pub fn follow_fars(
        arena: &Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
    ) -> Result<Resolved> {
        let reff = read_pointer(arena, segment_id, pointer_offset)?;
        match reff.kind() {
            WirePointerKind::Struct | WirePointerKind::List => Ok(Resolved {
                tag: reff,
                segment_id,
                byte_offset: target_of(arena, segment_id, pointer_offset, reff)?,
            }),
            WirePointerKind::Other => Ok(Resolved {
                tag: reff,
                segment_id,
                byte_offset: pointer_offset,
            }),
            WirePointerKind::Far => {
                let pad_segment = reff.far_segment_id();
                let pad_offset = reff.far_position_in_segment() as ByteCount * BYTES_PER_WORD;
                let pad_words = if reff.is_double_far() { 2 } else { 1 };
                arena.check_bounds(pad_segment, pad_offset, pad_words * BYTES_PER_WORD)?;
                let pad = read_pointer(arena, pad_segment, pad_offset)?;

                if !reff.is_double_far() {
                    if pad.kind() == WirePointerKind::Far {
                        return Err(invalid_far_pointer(
                            "far pointer lands on another far pointer",
                        ));
                    }
                    let byte_offset = if pad.is_positional() {
                        target_of(arena, pad_segment, pad_offset, pad)?
                    } else {
                        pad_offset
                    };
                    Ok(Resolved {
                        tag: pad,
                        segment_id: pad_segment,
                        byte_offset,
                    })
                } else {
                    if pad.kind() != WirePointerKind::Far || pad.is_double_far() {
                        return Err(invalid_far_pointer(
                            "double-far landing pad is not a plain far pointer",
                        ));
                    }
                    let tag = read_pointer(arena, pad_segment, pad_offset + BYTES_PER_WORD)?;
                    if !tag.is_positional() {
                        return Err(invalid_far_pointer(
                            "double-far tag word is not a struct or list pointer",
                        ));
                    }
                    let content_segment = pad.far_segment_id();
                    let content_offset =
                        pad.far_position_in_segment() as ByteCount * BYTES_PER_WORD;
                    arena.check_bounds(content_segment, content_offset, 0)?;
                    Ok(Resolved {
                        tag,
                        segment_id: content_segment,
                        byte_offset: content_offset,
                    })
                }
            }
        }
    }

    /// Where `allocate` placed a new object and the word holding its tag.
    pub struct Allocation {
        pub segment_id: SegmentId,
        pub byte_offset: ByteCount,
    }

    /// Allocates `amount` words for the object described by `tag` and points
    /// the slot at `(segment_id, pointer_offset)` at it. Any previous
    /// occupant of the slot is zeroed first. If the slot's segment is full,
    /// the object goes elsewhere behind a single far pointer, with a landing
    /// pad immediately before it.
    pub fn allocate(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        amount: WordCount,
        tag: WirePointer,
    ) -> Result<Allocation> {
        let old = read_pointer(arena, segment_id, pointer_offset)?;
        if !old.is_null() {
            let nesting_limit = arena.nesting_limit();
            zero_object(arena, segment_id, pointer_offset, nesting_limit)?;
        }

        let kind = tag.kind();
        if amount == 0 && kind == WirePointerKind::Struct {
            let mut reff = WirePointer::NULL;
            reff.set_kind_and_target_for_empty_struct();
            write_pointer(arena, segment_id, pointer_offset, reff)?;
            return Ok(Allocation {
                segment_id,
                byte_offset: pointer_offset,
            });
        }

        match arena.allocate(segment_id, amount) {
            Some(content) => {
                let mut reff = tag;
                reff.set_kind_and_target(kind, pointer_offset, content);
                write_pointer(arena, segment_id, pointer_offset, reff)?;
                Ok(Allocation {
                    segment_id,
                    byte_offset: content,
                })
            }
            None => {
                let (far_segment, pad) = arena.allocate_anywhere(amount + POINTER_SIZE_IN_WORDS)?;
                let content = pad + BYTES_PER_WORD;

                let mut far = WirePointer::NULL;
                far.set_far(false, (pad / BYTES_PER_WORD) as u32, far_segment);
                write_pointer(arena, segment_id, pointer_offset, far)?;

                let mut landing = tag;
                landing.set_kind_and_target(kind, pad, content);
                write_pointer(arena, far_segment, pad, landing)?;

                tracing::trace!(
                    from_segment = segment_id,
                    to_segment = far_segment,
                    words = amount,
                    "allocated behind far pointer"
                );
                Ok(Allocation {
                    segment_id: far_segment,
                    byte_offset: content,
                })
            }
        }
    }

    /// Zeroes the object referenced by the pointer at the given slot,
    /// recursively, along with any far-pointer landing pads. The slot itself
    /// is left alone.
    pub fn zero_object(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        nesting_limit: i32,
    ) -> Result<()> {
        let reff = read_pointer(arena, segment_id, pointer_offset)?;
        match reff.kind() {
            WirePointerKind::Struct | WirePointerKind::List => {
                let target = target_of(arena, segment_id, pointer_offset, reff)?;
                zero_object_helper(arena, reff, segment_id, target, nesting_limit)
            }
            WirePointerKind::Far => {
                // Validates the pad the same way reads do, so a far pointer
                // landing on another far pointer fails instead of looping.
                let resolved = follow_fars(arena, segment_id, pointer_offset)?;
                zero_object_helper(
                    arena,
                    resolved.tag,
                    resolved.segment_id,
                    resolved.byte_offset,
                    nesting_limit,
                )?;
                let pad_offset = reff.far_position_in_segment() as ByteCount * BYTES_PER_WORD;
                let pad_words = if reff.is_double_far() { 2 } else { 1 };
                arena.fill_zero_words(reff.far_segment_id(), pad_offset, pad_words)
            }
            WirePointerKind::Other => Ok(()),
        }
    }

    fn zero_object_helper(
        arena: &mut Arena,
        tag: WirePointer,
        segment_id: SegmentId,
        content: ByteCount,
        nesting_limit: i32,
    ) -> Result<()> {
        check_nesting(nesting_limit)?;
        match tag.kind() {
            WirePointerKind::Other => Ok(()),
            WirePointerKind::Far => Err(invalid_far_pointer("unexpected far pointer tag")),
            WirePointerKind::Struct => {
                let size = tag.struct_size();
                arena.check_bounds(segment_id, content, size.byte_length())?;
                let pointer_section = content + size.data_byte_length() as ByteCount;
                for i in 0..size.pointers as ByteCount {
                    zero_pointee(
                        arena,
                        segment_id,
                        pointer_section + i * BYTES_PER_WORD,
                        nesting_limit - 1,
                    )?;
                }
                arena.fill_zero_words(segment_id, content, size.total() as WordCount)
            }
            WirePointerKind::List => match tag.list_element_size() {
                ElementSize::Void => Ok(()),
                ElementSize::Pointer => {
                    let count = tag.list_element_count() as ByteCount;
                    arena.check_bounds(segment_id, content, count * BYTES_PER_WORD)?;
                    for i in 0..count {
                        zero_pointee(
                            arena,
                            segment_id,
                            content + i * BYTES_PER_WORD,
                            nesting_limit - 1,
                        )?;
                    }
                    arena.fill_zero_words(segment_id, content, count)
                }
                ElementSize::InlineComposite => {
                    let word_count = tag.list_inline_composite_word_count() as WordCount;
                    arena.check_bounds(
                        segment_id,
                        content,
                        (word_count + POINTER_SIZE_IN_WORDS) * BYTES_PER_WORD,
                    )?;
                    let element_tag = read_pointer(arena, segment_id, content)?;
                    if element_tag.kind() != WirePointerKind::Struct {
                        return Err(Error::detailed(
                            ErrorKind::InvalidPointerType,
                            "inline-composite list of non-struct elements",
                        ));
                    }
                    let size = element_tag.struct_size();
                    let count = element_tag.inline_composite_list_element_count() as WordCount;
                    if count * size.total() as WordCount > word_count {
                        return Err(Error::detailed(
                            ErrorKind::BoundsError,
                            "inline-composite list elements overrun its word count",
                        ));
                    }
                    if size.pointers > 0 {
                        let mut pos = content + BYTES_PER_WORD;
                        for _ in 0..count {
                            pos += size.data_byte_length() as ByteCount;
                            for _ in 0..size.pointers {
                                zero_pointee(arena, segment_id, pos, nesting_limit - 1)?;
                                pos += BYTES_PER_WORD;
                            }
                        }
                    }
                    arena.fill_zero_words(segment_id, content, word_count + POINTER_SIZE_IN_WORDS)
                }
                es => {
                    let bits = u64::from(tag.list_element_count()) * u64::from(es.data_bits_per_element());
                    let words = words_for_bits(bits) as WordCount;
                    arena.check_bounds(segment_id, content, words * BYTES_PER_WORD)?;
                    arena.fill_zero_words(segment_id, content, words)
                }
            },
        }
    }

    fn zero_pointee(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        nesting_limit: i32,
    ) -> Result<()> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            Ok(())
        } else {
            zero_object(arena, segment_id, pointer_offset, nesting_limit)
        }
    }

    /// Zeroes the pointer at the slot and any landing pad it uses, leaving
    /// the object itself in place.
    pub fn zero_pointer_and_fars(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
    ) -> Result<()> {
        let reff = read_pointer(arena, segment_id, pointer_offset)?;
        if reff.kind() == WirePointerKind::Far {
            let pad_segment = reff.far_segment_id();
            let pad_offset = reff.far_position_in_segment() as ByteCount * BYTES_PER_WORD;
            let pad_words = if reff.is_double_far() { 2 } else { 1 };
            arena.check_bounds(pad_segment, pad_offset, pad_words * BYTES_PER_WORD)?;
            arena.fill_zero_words(pad_segment, pad_offset, pad_words)?;
        }
        arena.write_word(segment_id, pointer_offset, 0)
    }

    /// Moves the pointer at `src` into `dst` without touching the object it
    /// refers to. Positional pointers are re-encoded relative to `dst`;
    /// far and capability pointers are position independent and are copied
    /// as they are.
    pub fn transfer_pointer(
        arena: &mut Arena,
        dst_segment_id: SegmentId,
        dst_offset: ByteCount,
        src_segment_id: SegmentId,
        src_offset: ByteCount,
    ) -> Result<()> {
        let src = read_pointer(arena, src_segment_id, src_offset)?;
        if src.is_null() {
            arena.write_word(dst_segment_id, dst_offset, 0)
        } else if src.is_positional() {
            let target = target_of(arena, src_segment_id, src_offset, src)?;
            transfer_pointer_split(arena, dst_segment_id, dst_offset, src, src_segment_id, target)
        } else {
            write_pointer(arena, dst_segment_id, dst_offset, src)
        }
    }

    /// Points `dst` at an object whose kind and sizes are given by
    /// `src_tag` and whose first word is at `(src_segment_id, src_content)`.
    ///
    /// Across segments this needs a landing pad: one word in the object's
    /// own segment if it has room, otherwise a two-word double-far pad in
    /// whichever segment does.
    pub fn transfer_pointer_split(
        arena: &mut Arena,
        dst_segment_id: SegmentId,
        dst_offset: ByteCount,
        src_tag: WirePointer,
        src_segment_id: SegmentId,
        src_content: ByteCount,
    ) -> Result<()> {
        let kind = src_tag.kind();
        if dst_segment_id == src_segment_id {
            let mut reff = src_tag;
            if kind == WirePointerKind::Struct && src_tag.struct_word_size() == 0 {
                reff.set_kind_and_target_for_empty_struct();
            } else {
                reff.set_kind_and_target(kind, dst_offset, src_content);
            }
            return write_pointer(arena, dst_segment_id, dst_offset, reff);
        }

        match arena.allocate(src_segment_id, POINTER_SIZE_IN_WORDS) {
            Some(pad) => {
                let mut landing = src_tag;
                landing.set_kind_and_target(kind, pad, src_content);
                write_pointer(arena, src_segment_id, pad, landing)?;

                let mut far = WirePointer::NULL;
                far.set_far(false, (pad / BYTES_PER_WORD) as u32, src_segment_id);
                tracing::trace!(
                    segment_id = src_segment_id,
                    pad,
                    "emitted single-far landing pad"
                );
                write_pointer(arena, dst_segment_id, dst_offset, far)
            }
            None => {
                let (pad_segment, pad) = arena.allocate_anywhere(2)?;

                let mut landing = WirePointer::NULL;
                landing.set_far(
                    false,
                    (src_content / BYTES_PER_WORD) as u32,
                    src_segment_id,
                );
                write_pointer(arena, pad_segment, pad, landing)?;

                let mut tag = src_tag;
                tag.set_kind_with_zero_offset(kind);
                write_pointer(arena, pad_segment, pad + BYTES_PER_WORD, tag)?;

                let mut far = WirePointer::NULL;
                far.set_far(true, (pad / BYTES_PER_WORD) as u32, pad_segment);
                tracing::trace!(
                    segment_id = pad_segment,
                    pad,
                    "emitted double-far landing pad"
                );
                write_pointer(arena, dst_segment_id, dst_offset, far)
            }
        }
    }

    pub fn init_struct_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        size: StructSize,
        nesting_limit: i32,
    ) -> Result<StructBuilder<'_>> {
        check_nesting(nesting_limit)?;
        let mut tag = WirePointer::new(WirePointerKind::Struct);
        tag.set_struct_size(size);
        let allocation = allocate(arena, segment_id, pointer_offset, size.total() as WordCount, tag)?;
        Ok(StructBuilder::new(
            arena,
            allocation.segment_id,
            allocation.byte_offset,
            size,
            nesting_limit - 1,
            Origin::Pointer {
                segment_id,
                byte_offset: pointer_offset,
            },
        ))
    }

    /// Returns a builder over the struct at the slot, copying `default` in
    /// (or allocating a zeroed struct) if the slot is null, and moving the
    /// struct to larger storage if either of its sections is smaller than
    /// `size`.
    pub fn get_writable_struct_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        size: StructSize,
        default: Option<PointerReader<'_>>,
        nesting_limit: i32,
    ) -> Result<StructBuilder<'a>> {
        let reff = read_pointer(arena, segment_id, pointer_offset)?;
        if reff.is_null() {
            match default {
                Some(d) if !d.is_null() => {
                    d.copy_into(arena, segment_id, pointer_offset)?;
                }
                _ => {
                    return init_struct_pointer(
                        arena,
                        segment_id,
                        pointer_offset,
                        size,
                        nesting_limit,
                    )
                }
            }
        }
        check_nesting(nesting_limit)?;

        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        if resolved.tag.kind() != WirePointerKind::Struct {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "expected a struct pointer",
            ));
        }
        let old_size = resolved.tag.struct_size();
        arena.check_bounds(resolved.segment_id, resolved.byte_offset, old_size.byte_length())?;
        let origin = Origin::Pointer {
            segment_id,
            byte_offset: pointer_offset,
        };

        if old_size.covers(size) {
            return Ok(StructBuilder::new(
                arena,
                resolved.segment_id,
                resolved.byte_offset,
                old_size,
                nesting_limit - 1,
                origin,
            ));
        }

        let new_size = old_size.max(size);
        tracing::debug!(
            old_data = old_size.data,
            old_pointers = old_size.pointers,
            new_data = new_size.data,
            new_pointers = new_size.pointers,
            "upgrading struct"
        );
        let (new_segment, new_offset) = upgrade_struct(
            arena,
            segment_id,
            pointer_offset,
            resolved.segment_id,
            resolved.byte_offset,
            old_size,
            new_size,
        )?;
        Ok(StructBuilder::new(
            arena,
            new_segment,
            new_offset,
            new_size,
            nesting_limit - 1,
            origin,
        ))
    }

    /// Moves a struct to freshly allocated storage of `new_size`: the data
    /// section is copied, each pointer is transferred, and the old sections
    /// are zeroed.
    fn upgrade_struct(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        old_segment: SegmentId,
        old_offset: ByteCount,
        old_size: StructSize,
        new_size: StructSize,
    ) -> Result<(SegmentId, ByteCount)> {
        zero_pointer_and_fars(arena, segment_id, pointer_offset)?;
        let mut tag = WirePointer::new(WirePointerKind::Struct);
        tag.set_struct_size(new_size);
        let allocation = allocate(
            arena,
            segment_id,
            pointer_offset,
            new_size.total() as WordCount,
            tag,
        )?;
        move_struct_sections(
            arena,
            allocation.segment_id,
            allocation.byte_offset,
            new_size,
            old_segment,
            old_offset,
            old_size,
        )?;
        Ok((allocation.segment_id, allocation.byte_offset))
    }

    fn move_struct_sections(
        arena: &mut Arena,
        dst_segment: SegmentId,
        dst_offset: ByteCount,
        dst_size: StructSize,
        src_segment: SegmentId,
        src_offset: ByteCount,
        src_size: StructSize,
    ) -> Result<()> {
        arena.copy_words(
            dst_segment,
            dst_offset,
            src_segment,
            src_offset,
            src_size.data as WordCount,
        )?;
        let dst_pointers = dst_offset + dst_size.data_byte_length() as ByteCount;
        let src_pointers = src_offset + src_size.data_byte_length() as ByteCount;
        for i in 0..src_size.pointers as ByteCount {
            transfer_pointer(
                arena,
                dst_segment,
                dst_pointers + i * BYTES_PER_WORD,
                src_segment,
                src_pointers + i * BYTES_PER_WORD,
            )?;
        }
        arena.fill_zero_words(src_segment, src_offset, src_size.total() as WordCount)
    }

    pub fn init_list_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        element_count: ElementCount32,
        element_size: ElementSize,
        nesting_limit: i32,
    ) -> Result<ListBuilder<'_>> {
        if element_size == ElementSize::InlineComposite {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "struct lists need an element size; use init_struct_list",
            ));
        }
        check_nesting(nesting_limit)?;
        if element_count > MAX_LIST_ELEMENTS {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let step = element_size.step_bits();
        let words = words_for_bits(u64::from(element_count) * u64::from(step)) as WordCount;
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_size_and_count(element_size, element_count);
        let allocation = allocate(arena, segment_id, pointer_offset, words, tag)?;
        Ok(ListBuilder::new(
            arena,
            allocation.segment_id,
            allocation.byte_offset,
            element_count,
            element_size,
            step,
            StructSize::default(),
            nesting_limit - 1,
        ))
    }

    pub fn init_struct_list_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        element_count: ElementCount32,
        element_size: StructSize,
        nesting_limit: i32,
    ) -> Result<ListBuilder<'_>> {
        check_nesting(nesting_limit)?;
        if element_count > MAX_LIST_ELEMENTS {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let words_per_element = element_size.total() as u64;
        let word_count = u64::from(element_count) * words_per_element;
        if word_count > MAX_LIST_ELEMENTS as u64 {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_inline_composite(word_count as WordCount32);
        let allocation = allocate(
            arena,
            segment_id,
            pointer_offset,
            word_count as WordCount + POINTER_SIZE_IN_WORDS,
            tag,
        )?;
        write_composite_tag(
            arena,
            allocation.segment_id,
            allocation.byte_offset,
            element_count,
            element_size,
        )?;
        Ok(ListBuilder::new(
            arena,
            allocation.segment_id,
            allocation.byte_offset + BYTES_PER_WORD,
            element_count,
            ElementSize::InlineComposite,
            (words_per_element as u32) * BITS_PER_WORD as u32,
            element_size,
            nesting_limit - 1,
        ))
    }

    fn write_composite_tag(
        arena: &mut Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> Result<()> {
        let mut element_tag = WirePointer::NULL;
        element_tag.set_kind_and_inline_composite_list_element_count(
            WirePointerKind::Struct,
            element_count,
        );
        element_tag.set_struct_size(element_size);
        write_pointer(arena, segment_id, byte_offset, element_tag)
    }

    /// Validated geometry of a list, shared by the read and write paths.
    struct ListShape {
        segment_id: SegmentId,
        byte_offset: ByteCount,
        element_count: ElementCount32,
        element_size: ElementSize,
        step: BitCount32,
        struct_size: StructSize,
        word_count: WordCount,
    }

    fn list_shape(arena: &Arena, resolved: Resolved) -> Result<ListShape> {
        let tag = resolved.tag;
        if tag.kind() != WirePointerKind::List {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "expected a list pointer",
            ));
        }
        match tag.list_element_size() {
            ElementSize::InlineComposite => {
                let word_count = tag.list_inline_composite_word_count() as WordCount;
                arena.check_bounds(
                    resolved.segment_id,
                    resolved.byte_offset,
                    (word_count + POINTER_SIZE_IN_WORDS) * BYTES_PER_WORD,
                )?;
                let element_tag =
                    read_pointer(arena, resolved.segment_id, resolved.byte_offset)?;
                if element_tag.kind() != WirePointerKind::Struct {
                    return Err(Error::detailed(
                        ErrorKind::InvalidPointerType,
                        "inline-composite list of non-struct elements",
                    ));
                }
                let element_count = element_tag.inline_composite_list_element_count();
                let struct_size = element_tag.struct_size();
                let words_per_element = struct_size.total() as WordCount;
                if element_count as WordCount * words_per_element > word_count {
                    return Err(Error::detailed(
                        ErrorKind::BoundsError,
                        "inline-composite list elements overrun its word count",
                    ));
                }
                Ok(ListShape {
                    segment_id: resolved.segment_id,
                    byte_offset: resolved.byte_offset + BYTES_PER_WORD,
                    element_count,
                    element_size: ElementSize::InlineComposite,
                    step: words_per_element as u32 * BITS_PER_WORD as u32,
                    struct_size,
                    word_count: word_count + POINTER_SIZE_IN_WORDS,
                })
            }
            element_size => {
                let element_count = tag.list_element_count();
                let step = element_size.step_bits();
                let word_count =
                    words_for_bits(u64::from(element_count) * u64::from(step)) as WordCount;
                arena.check_bounds(
                    resolved.segment_id,
                    resolved.byte_offset,
                    word_count * BYTES_PER_WORD,
                )?;
                Ok(ListShape {
                    segment_id: resolved.segment_id,
                    byte_offset: resolved.byte_offset,
                    element_count,
                    element_size,
                    step,
                    struct_size: StructSize::default(),
                    word_count,
                })
            }
        }
    }

    fn check_element_size(found: ElementSize, expected: Option<ElementSize>) -> Result<()> {
        match expected {
            Some(expected) if expected != found => Err(Error {
                kind: ErrorKind::InvalidPointerType,
                extra: alloc::format!("expected a list of {expected:?}, found {found:?}"),
            }),
            _ => Ok(()),
        }
    }

    pub fn get_writable_list_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        element_size: ElementSize,
        default: Option<PointerReader<'_>>,
        nesting_limit: i32,
    ) -> Result<ListBuilder<'a>> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            match default {
                Some(d) if !d.is_null() => d.copy_into(arena, segment_id, pointer_offset)?,
                _ => return Ok(ListBuilder::new_default(arena, element_size)),
            }
        }
        check_nesting(nesting_limit)?;
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        let shape = list_shape(arena, resolved)?;
        check_element_size(shape.element_size, Some(element_size))?;
        Ok(ListBuilder::new(
            arena,
            shape.segment_id,
            shape.byte_offset,
            shape.element_count,
            shape.element_size,
            shape.step,
            shape.struct_size,
            nesting_limit - 1,
        ))
    }

    /// Like [`get_writable_list_pointer`] for lists of structs, moving the
    /// whole list to larger storage if its elements are smaller than
    /// `element_size`.
    pub fn get_writable_struct_list_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        element_size: StructSize,
        default: Option<PointerReader<'_>>,
        nesting_limit: i32,
    ) -> Result<ListBuilder<'a>> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            match default {
                Some(d) if !d.is_null() => d.copy_into(arena, segment_id, pointer_offset)?,
                _ => {
                    let mut list = ListBuilder::new_default(arena, ElementSize::InlineComposite);
                    list.struct_size = element_size;
                    list.step = element_size.total() * BITS_PER_WORD as u32;
                    return Ok(list);
                }
            }
        }
        check_nesting(nesting_limit)?;
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        let shape = list_shape(arena, resolved)?;
        check_element_size(shape.element_size, Some(ElementSize::InlineComposite))?;

        if shape.struct_size.covers(element_size) {
            return Ok(ListBuilder::new(
                arena,
                shape.segment_id,
                shape.byte_offset,
                shape.element_count,
                shape.element_size,
                shape.step,
                shape.struct_size,
                nesting_limit - 1,
            ));
        }

        let old_size = shape.struct_size;
        let new_size = old_size.max(element_size);
        let count = shape.element_count;
        let new_word_count = u64::from(count) * u64::from(new_size.total());
        if new_word_count > MAX_LIST_ELEMENTS as u64 {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        tracing::debug!(
            elements = count,
            old_data = old_size.data,
            old_pointers = old_size.pointers,
            new_data = new_size.data,
            new_pointers = new_size.pointers,
            "upgrading struct list"
        );

        zero_pointer_and_fars(arena, segment_id, pointer_offset)?;
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_inline_composite(new_word_count as WordCount32);
        let allocation = allocate(
            arena,
            segment_id,
            pointer_offset,
            new_word_count as WordCount + POINTER_SIZE_IN_WORDS,
            tag,
        )?;
        write_composite_tag(
            arena,
            allocation.segment_id,
            allocation.byte_offset,
            count,
            new_size,
        )?;

        let old_stride = old_size.byte_length();
        let new_stride = new_size.byte_length();
        let new_first = allocation.byte_offset + BYTES_PER_WORD;
        for i in 0..count as ByteCount {
            move_struct_sections(
                arena,
                allocation.segment_id,
                new_first + i * new_stride,
                new_size,
                shape.segment_id,
                shape.byte_offset + i * old_stride,
                old_size,
            )?;
        }
        // The element sections are zeroed by now; only the old tag remains.
        arena.fill_zero_words(shape.segment_id, shape.byte_offset - BYTES_PER_WORD, 1)?;

        Ok(ListBuilder::new(
            arena,
            allocation.segment_id,
            new_first,
            count,
            ElementSize::InlineComposite,
            new_size.total() * BITS_PER_WORD as u32,
            new_size,
            nesting_limit - 1,
        ))
    }

    pub fn read_struct_pointer<'a>(
        arena: &'a Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        default: Option<PointerReader<'a>>,
        nesting_limit: i32,
    ) -> Result<StructReader<'a>> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return match default {
                Some(d) if !d.is_null() => d.get_struct(None),
                _ => Ok(StructReader::new_default(arena)),
            };
        }
        check_nesting(nesting_limit)?;
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        if resolved.tag.kind() != WirePointerKind::Struct {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "expected a struct pointer",
            ));
        }
        let size = resolved.tag.struct_size();
        arena.check_bounds(resolved.segment_id, resolved.byte_offset, size.byte_length())?;
        arena.can_read(size.total() as WordCount)?;
        Ok(StructReader::new(
            arena,
            resolved.segment_id,
            resolved.byte_offset,
            size,
            nesting_limit - 1,
        ))
    }

    pub fn read_list_pointer<'a>(
        arena: &'a Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        expected: Option<ElementSize>,
        default: Option<PointerReader<'a>>,
        nesting_limit: i32,
    ) -> Result<ListReader<'a>> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return match default {
                Some(d) if !d.is_null() => d.get_list_any(expected),
                _ => Ok(ListReader::new_default(
                    arena,
                    expected.unwrap_or(ElementSize::Void),
                )),
            };
        }
        check_nesting(nesting_limit)?;
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        let shape = list_shape(arena, resolved)?;
        match expected {
            // Any list but a bit list can be read as a list of structs whose
            // only field is the element.
            Some(ElementSize::InlineComposite) if shape.element_size != ElementSize::Bit => {}
            _ => check_element_size(shape.element_size, expected)?,
        }
        arena.can_read(shape.word_count)?;
        if shape.step == 0 {
            // Zero-sized elements cost nothing on the wire, so charge the
            // traversal limit per element instead.
            arena.can_read(shape.element_count as WordCount)?;
        }
        Ok(ListReader::new(
            arena,
            shape.segment_id,
            shape.byte_offset,
            shape.element_count,
            shape.element_size,
            shape.step,
            shape.struct_size,
            nesting_limit - 1,
        ))
    }

    /// Resolves a byte list, returning its segment, first byte, and length.
    fn resolve_byte_list(
        arena: &Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
    ) -> Result<(SegmentId, ByteCount, ByteCount)> {
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        let tag = resolved.tag;
        if tag.kind() != WirePointerKind::List || tag.list_element_size() != ElementSize::Byte {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "expected a list of bytes",
            ));
        }
        let len = tag.list_element_count() as ByteCount;
        arena.check_bounds(resolved.segment_id, resolved.byte_offset, len)?;
        Ok((resolved.segment_id, resolved.byte_offset, len))
    }

    pub fn read_text_pointer<'a>(
        arena: &'a Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        default: Option<&'a str>,
    ) -> Result<text::Reader<'a>> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return Ok(default.unwrap_or("").into());
        }
        let (segment_id, offset, len) = resolve_byte_list(arena, segment_id, pointer_offset)?;
        arena.can_read(words_for_bytes(len))?;
        if len == 0 {
            return Err(Error::from_kind(ErrorKind::TextIsNotNulTerminated));
        }
        let bytes = arena.segment(segment_id)?.bytes(offset, len);
        if bytes[len - 1] != 0 {
            return Err(Error::from_kind(ErrorKind::TextIsNotNulTerminated));
        }
        Ok(text::Reader::new(&bytes[..len - 1]))
    }

    pub fn read_data_pointer<'a>(
        arena: &'a Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        default: Option<&'a [u8]>,
    ) -> Result<&'a [u8]> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return Ok(default.unwrap_or(&[]));
        }
        let (segment_id, offset, len) = resolve_byte_list(arena, segment_id, pointer_offset)?;
        arena.can_read(words_for_bytes(len))?;
        Ok(arena.segment(segment_id)?.bytes(offset, len))
    }

    fn init_byte_list(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        byte_count: ByteCount,
    ) -> Result<Allocation> {
        if byte_count > MAX_LIST_ELEMENTS as ByteCount {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_size_and_count(ElementSize::Byte, byte_count as ElementCount32);
        allocate(
            arena,
            segment_id,
            pointer_offset,
            words_for_bytes(byte_count),
            tag,
        )
    }

    /// Allocates text of `size` bytes plus the NUL terminator.
    pub fn init_text_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        size: ByteCount,
    ) -> Result<text::Builder<'_>> {
        let allocation = init_byte_list(arena, segment_id, pointer_offset, size + 1)?;
        let bytes = arena
            .segment_mut(allocation.segment_id)?
            .bytes_mut(allocation.byte_offset, size);
        Ok(text::Builder::new(bytes))
    }

    pub fn set_text_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        value: &str,
    ) -> Result<text::Builder<'a>> {
        let mut builder = init_text_pointer(arena, segment_id, pointer_offset, value.len())?;
        builder.push_str(value)?;
        Ok(builder)
    }

    pub fn get_writable_text_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        default: Option<&str>,
    ) -> Result<text::Builder<'a>> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return match default {
                Some(d) => set_text_pointer(arena, segment_id, pointer_offset, d),
                None => Ok(text::Builder::new(&mut [])),
            };
        }
        let (segment_id, offset, len) = resolve_byte_list(arena, segment_id, pointer_offset)?;
        if len == 0 {
            return Err(Error::from_kind(ErrorKind::TextIsNotNulTerminated));
        }
        let bytes = arena.segment_mut(segment_id)?.bytes_mut(offset, len);
        if bytes[len - 1] != 0 {
            return Err(Error::from_kind(ErrorKind::TextIsNotNulTerminated));
        }
        Ok(text::Builder::with_pos(&mut bytes[..len - 1], len - 1))
    }

    pub fn init_data_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        size: ByteCount,
    ) -> Result<&mut [u8]> {
        let allocation = init_byte_list(arena, segment_id, pointer_offset, size)?;
        Ok(arena
            .segment_mut(allocation.segment_id)?
            .bytes_mut(allocation.byte_offset, size))
    }

    pub fn set_data_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        value: &[u8],
    ) -> Result<&'a mut [u8]> {
        let bytes = init_data_pointer(arena, segment_id, pointer_offset, value.len())?;
        bytes.copy_from_slice(value);
        Ok(bytes)
    }

    pub fn get_writable_data_pointer<'a>(
        arena: &'a mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        default: Option<&[u8]>,
    ) -> Result<&'a mut [u8]> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return match default {
                Some(d) => set_data_pointer(arena, segment_id, pointer_offset, d),
                None => Ok(&mut []),
            };
        }
        let (segment_id, offset, len) = resolve_byte_list(arena, segment_id, pointer_offset)?;
        Ok(arena.segment_mut(segment_id)?.bytes_mut(offset, len))
    }

    pub fn set_capability_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        hook: Box<dyn ClientHook>,
    ) -> Result<()> {
        let old = read_pointer(arena, segment_id, pointer_offset)?;
        if !old.is_null() {
            let nesting_limit = arena.nesting_limit();
            zero_object(arena, segment_id, pointer_offset, nesting_limit)?;
        }
        let index = arena.cap_table_mut().inject_cap(hook);
        let mut reff = WirePointer::NULL;
        reff.set_cap(index);
        write_pointer(arena, segment_id, pointer_offset, reff)
    }

    pub fn read_capability_pointer(
        arena: &Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
    ) -> Result<Box<dyn ClientHook>> {
        let reff = read_pointer(arena, segment_id, pointer_offset)?;
        if reff.is_null() {
            return Err(Error::detailed(
                ErrorKind::InvalidCapabilityPointer,
                "null capability pointer",
            ));
        }
        if !reff.is_capability() {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "expected a capability pointer",
            ));
        }
        arena
            .cap_table()
            .extract_cap(reff.cap_index())
            .ok_or_else(|| Error {
                kind: ErrorKind::InvalidCapabilityPointer,
                extra: alloc::format!("no capability at index {}", reff.cap_index()),
            })
    }

    /// Deep-copies a struct into the slot. `value` usually belongs to a
    /// different message.
    pub fn set_struct_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        value: StructReader<'_>,
    ) -> Result<()> {
        let size = value.size();
        let mut tag = WirePointer::new(WirePointerKind::Struct);
        tag.set_struct_size(size);
        let allocation = allocate(arena, segment_id, pointer_offset, size.total() as WordCount, tag)?;
        copy_struct_content(
            arena,
            allocation.segment_id,
            allocation.byte_offset,
            size,
            value,
        )
    }

    fn copy_struct_content(
        arena: &mut Arena,
        segment_id: SegmentId,
        byte_offset: ByteCount,
        size: StructSize,
        value: StructReader<'_>,
    ) -> Result<()> {
        let data_len = core::cmp::min(
            value.data_size as ByteCount,
            size.data_byte_length() as ByteCount,
        );
        if data_len > 0 {
            let src = value
                .arena
                .segment(value.segment_id)?
                .bytes(value.data_offset, data_len);
            arena
                .segment_mut(segment_id)?
                .bytes_mut(byte_offset, data_len)
                .copy_from_slice(src);
        }
        let pointer_section = byte_offset + size.data_byte_length() as ByteCount;
        for i in 0..value.pointer_count as ByteCount {
            copy_pointer(
                arena,
                segment_id,
                pointer_section + i * BYTES_PER_WORD,
                value.arena,
                value.segment_id,
                value.pointer_offset(i as u16),
                value.nesting_limit,
            )?;
        }
        Ok(())
    }

    /// Deep-copies a list into the slot.
    pub fn set_list_pointer(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        value: ListReader<'_>,
    ) -> Result<()> {
        let count = value.element_count;
        match value.element_size {
            ElementSize::InlineComposite => {
                let size = value.struct_size;
                let word_count = count as WordCount * size.total() as WordCount;
                let mut tag = WirePointer::new(WirePointerKind::List);
                tag.set_list_inline_composite(word_count as WordCount32);
                let allocation = allocate(
                    arena,
                    segment_id,
                    pointer_offset,
                    word_count + POINTER_SIZE_IN_WORDS,
                    tag,
                )?;
                write_composite_tag(
                    arena,
                    allocation.segment_id,
                    allocation.byte_offset,
                    count,
                    size,
                )?;
                let first = allocation.byte_offset + BYTES_PER_WORD;
                for i in 0..count {
                    copy_struct_content(
                        arena,
                        allocation.segment_id,
                        first + i as ByteCount * size.byte_length(),
                        size,
                        value.get_struct_element(i),
                    )?;
                }
                Ok(())
            }
            ElementSize::Pointer => {
                let mut tag = WirePointer::new(WirePointerKind::List);
                tag.set_list_size_and_count(ElementSize::Pointer, count);
                let allocation =
                    allocate(arena, segment_id, pointer_offset, count as WordCount, tag)?;
                for i in 0..count as ByteCount {
                    copy_pointer(
                        arena,
                        allocation.segment_id,
                        allocation.byte_offset + i * BYTES_PER_WORD,
                        value.arena,
                        value.segment_id,
                        value.byte_offset + i * BYTES_PER_WORD,
                        value.nesting_limit,
                    )?;
                }
                Ok(())
            }
            element_size => {
                let words = words_for_bits(u64::from(count) * u64::from(value.step)) as WordCount;
                let mut tag = WirePointer::new(WirePointerKind::List);
                tag.set_list_size_and_count(element_size, count);
                let allocation = allocate(arena, segment_id, pointer_offset, words, tag)?;
                if words > 0 {
                    let len = words * BYTES_PER_WORD;
                    let src = value
                        .arena
                        .segment(value.segment_id)?
                        .bytes(value.byte_offset, len);
                    arena
                        .segment_mut(allocation.segment_id)?
                        .bytes_mut(allocation.byte_offset, len)
                        .copy_from_slice(src);
                }
                Ok(())
            }
        }
    }

    /// Deep-copies whatever the source slot refers to into the destination
    /// slot, carrying capabilities across to the destination's table.
    pub fn copy_pointer(
        dst_arena: &mut Arena,
        dst_segment_id: SegmentId,
        dst_offset: ByteCount,
        src_arena: &Arena,
        src_segment_id: SegmentId,
        src_offset: ByteCount,
        nesting_limit: i32,
    ) -> Result<()> {
        let src = read_pointer(src_arena, src_segment_id, src_offset)?;
        if src.is_null() {
            if !read_pointer(dst_arena, dst_segment_id, dst_offset)?.is_null() {
                let limit = dst_arena.nesting_limit();
                zero_object(dst_arena, dst_segment_id, dst_offset, limit)?;
            }
            return dst_arena.write_word(dst_segment_id, dst_offset, 0);
        }
        check_nesting(nesting_limit)?;
        let resolved = follow_fars(src_arena, src_segment_id, src_offset)?;
        match resolved.tag.kind() {
            WirePointerKind::Struct => {
                let value = read_struct_pointer(
                    src_arena,
                    src_segment_id,
                    src_offset,
                    None,
                    nesting_limit,
                )?;
                set_struct_pointer(dst_arena, dst_segment_id, dst_offset, value)
            }
            WirePointerKind::List => {
                let value = read_list_pointer(
                    src_arena,
                    src_segment_id,
                    src_offset,
                    None,
                    None,
                    nesting_limit,
                )?;
                set_list_pointer(dst_arena, dst_segment_id, dst_offset, value)
            }
            WirePointerKind::Other => {
                let hook = read_capability_pointer(src_arena, src_segment_id, src_offset)?;
                set_capability_pointer(dst_arena, dst_segment_id, dst_offset, hook)
            }
            WirePointerKind::Far => Err(invalid_far_pointer("unexpected far pointer tag")),
        }
    }

    /// Words and capabilities reachable from the slot, counting the object
    /// but not the pointer itself.
    pub fn total_size(
        arena: &Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        nesting_limit: i32,
    ) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: 0,
            cap_count: 0,
        };
        let reff = read_pointer(arena, segment_id, pointer_offset)?;
        if reff.is_null() {
            return Ok(result);
        }
        check_nesting(nesting_limit)?;
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        match resolved.tag.kind() {
            WirePointerKind::Struct => {
                let value =
                    read_struct_pointer(arena, segment_id, pointer_offset, None, nesting_limit)?;
                result.word_count += u64::from(value.size().total());
                for i in 0..value.pointer_count {
                    result.plus_eq(total_size(
                        arena,
                        value.segment_id,
                        value.pointer_offset(i),
                        value.nesting_limit,
                    )?);
                }
            }
            WirePointerKind::List => {
                let shape = list_shape(arena, resolved)?;
                result.word_count += shape.word_count as u64;
                let value = read_list_pointer(
                    arena,
                    segment_id,
                    pointer_offset,
                    None,
                    None,
                    nesting_limit,
                )?;
                match value.element_size {
                    ElementSize::Pointer => {
                        for i in 0..value.element_count as ByteCount {
                            result.plus_eq(total_size(
                                arena,
                                value.segment_id,
                                value.byte_offset + i * BYTES_PER_WORD,
                                value.nesting_limit,
                            )?);
                        }
                    }
                    ElementSize::InlineComposite => {
                        for i in 0..value.element_count {
                            let element = value.get_struct_element(i);
                            for j in 0..element.pointer_count {
                                result.plus_eq(total_size(
                                    arena,
                                    element.segment_id,
                                    element.pointer_offset(j),
                                    element.nesting_limit,
                                )?);
                            }
                        }
                    }
                    _ => {}
                }
            }
            WirePointerKind::Other => {
                result.cap_count += 1;
            }
            WirePointerKind::Far => return Err(invalid_far_pointer("unexpected far pointer tag")),
        }
        Ok(result)
    }

    /// Detaches the object at the slot, leaving the slot null.
    pub fn disown(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
    ) -> Result<Orphan> {
        if read_pointer(arena, segment_id, pointer_offset)?.is_null() {
            return Ok(Orphan::null());
        }
        let resolved = follow_fars(arena, segment_id, pointer_offset)?;
        zero_pointer_and_fars(arena, segment_id, pointer_offset)?;
        Ok(Orphan {
            tag: resolved.tag,
            segment_id: resolved.segment_id,
            byte_offset: resolved.byte_offset,
        })
    }

    /// Points the slot at an orphan. The previous occupant's pointer word is
    /// cleared; its content is left behind unreferenced.
    pub fn adopt(
        arena: &mut Arena,
        segment_id: SegmentId,
        pointer_offset: ByteCount,
        orphan: Orphan,
    ) -> Result<()> {
        zero_pointer_and_fars(arena, segment_id, pointer_offset)?;
        if orphan.is_null() {
            Ok(())
        } else if orphan.tag.is_positional() {
            transfer_pointer_split(
                arena,
                segment_id,
                pointer_offset,
                orphan.tag,
                orphan.segment_id,
                orphan.byte_offset,
            )
        } else {
            write_pointer(arena, segment_id, pointer_offset, orphan.tag)
        }
    }

    /// Allocates an unreferenced object of `words` words described by `tag`.
    pub fn new_orphan(arena: &mut Arena, words: WordCount, mut tag: WirePointer) -> Result<Orphan> {
        let preferred = arena.len().saturating_sub(1) as SegmentId;
        let (segment_id, byte_offset) =
            arena.allocate_bytes(preferred, words * BYTES_PER_WORD)?;
        if tag.kind() == WirePointerKind::Struct && words == 0 {
            tag.set_kind_and_target_for_empty_struct();
        }
        Ok(Orphan {
            tag,
            segment_id,
            byte_offset,
        })
    }

    pub fn new_orphan_struct(arena: &mut Arena, size: StructSize) -> Result<Orphan> {
        let mut tag = WirePointer::new(WirePointerKind::Struct);
        tag.set_struct_size(size);
        new_orphan(arena, size.total() as WordCount, tag)
    }

    pub fn new_orphan_list(
        arena: &mut Arena,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> Result<Orphan> {
        if element_size == ElementSize::InlineComposite {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "struct lists need an element size; use new_orphan_struct_list",
            ));
        }
        if element_count > MAX_LIST_ELEMENTS {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_size_and_count(element_size, element_count);
        let bits = u64::from(element_count) * u64::from(element_size.step_bits());
        new_orphan(arena, words_for_bits(bits) as WordCount, tag)
    }

    pub fn new_orphan_struct_list(
        arena: &mut Arena,
        element_size: StructSize,
        element_count: ElementCount32,
    ) -> Result<Orphan> {
        let word_count = u64::from(element_count) * u64::from(element_size.total());
        if element_count > MAX_LIST_ELEMENTS || word_count > MAX_LIST_ELEMENTS as u64 {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_inline_composite(word_count as WordCount32);
        let orphan = new_orphan(arena, word_count as WordCount + POINTER_SIZE_IN_WORDS, tag)?;
        write_composite_tag(
            arena,
            orphan.segment_id,
            orphan.byte_offset,
            element_count,
            element_size,
        )?;
        Ok(orphan)
    }

    pub fn new_orphan_bytes(arena: &mut Arena, value: &[u8], nul_terminated: bool) -> Result<Orphan> {
        let byte_count = value.len() + usize::from(nul_terminated);
        if byte_count > MAX_LIST_ELEMENTS as ByteCount {
            return Err(Error::from_kind(ErrorKind::SizeOverflow));
        }
        let mut tag = WirePointer::new(WirePointerKind::List);
        tag.set_list_size_and_count(ElementSize::Byte, byte_count as ElementCount32);
        let orphan = new_orphan(arena, words_for_bytes(byte_count), tag)?;
        arena
            .segment_mut(orphan.segment_id)?
            .bytes_mut(orphan.byte_offset, value.len())
            .copy_from_slice(value);
        Ok(orphan)
    }

    pub fn orphan_struct_builder<'a>(
        arena: &'a mut Arena,
        orphan: &Orphan,
    ) -> Result<StructBuilder<'a>> {
        if orphan.tag.kind() != WirePointerKind::Struct || orphan.is_null() {
            return Err(Error::detailed(
                ErrorKind::InvalidPointerType,
                "orphan is not a struct",
            ));
        }
        let size = orphan.tag.struct_size();
        arena.check_bounds(orphan.segment_id, orphan.byte_offset, size.byte_length())?;
        let nesting_limit = arena.nesting_limit();
        Ok(StructBuilder::new(
            arena,
            orphan.segment_id,
            orphan.byte_offset,
            size,
            nesting_limit,
            Origin::Detached,
        ))
    }

    pub fn orphan_list_builder<'a>(
        arena: &'a mut Arena,
        orphan: &Orphan,
    ) -> Result<ListBuilder<'a>> {
        let resolved = Resolved {
            tag: orphan.tag,
            segment_id: orphan.segment_id,
            byte_offset: orphan.byte_offset,
        };
        let shape = list_shape(arena, resolved)?;
        let nesting_limit = arena.nesting_limit();
        Ok(ListBuilder::new(
            arena,
            shape.segment_id,
            shape.byte_offset,
            shape.element_count,
            shape.element_size,
            shape.step,
            shape.struct_size,
            nesting_limit,
        ))
    }
}
