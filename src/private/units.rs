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

//! Unit aliases for the quantities that appear in the wire format.

pub type BitCount = usize;
pub type BitCount32 = u32;

pub type ByteCount = usize;
pub type ByteCount32 = u32;

pub type WordCount = usize;
pub type WordCount16 = u16;
pub type WordCount32 = u32;

pub type ElementCount32 = u32;

pub type WirePointerCount16 = u16;

pub const BITS_PER_BYTE: BitCount = 8;
pub const BITS_PER_WORD: BitCount = 64;
pub const BYTES_PER_WORD: ByteCount = 8;
pub const BITS_PER_POINTER: BitCount = 64;
pub const POINTER_SIZE_IN_WORDS: WordCount = 1;

/// Largest segment the arena will create. Far-pointer landing-pad positions
/// and list element counts are 29-bit fields, so no segment may hold more
/// words than that.
pub const MAX_SEGMENT_WORDS: WordCount = (1 << 29) - 1;

/// Largest element count a list pointer can carry.
pub const MAX_LIST_ELEMENTS: ElementCount32 = (1 << 29) - 1;

/// Rounds `bytes` up to the next word boundary.
#[inline]
pub fn pad_to_word(bytes: ByteCount) -> ByteCount {
    (bytes + 7) & !7
}

/// Number of whole words needed to hold `bytes`.
#[inline]
pub fn words_for_bytes(bytes: ByteCount) -> WordCount {
    bytes.div_ceil(BYTES_PER_WORD)
}

/// Number of whole words needed to hold `bits`.
#[inline]
pub fn words_for_bits(bits: u64) -> u64 {
    bits.div_ceil(BITS_PER_WORD as u64)
}
