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

//! UTF-8 encoded text.
//!
//! On the wire, text is a list of bytes whose last element is a NUL
//! terminator that is not part of the value.

use alloc::string::String;
use core::str;

use crate::{Error, ErrorKind, Result};

/// Text read from a message. UTF-8 validity is checked lazily by
/// [`Reader::to_str`], so that reading a field never fails on content alone.
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct Reader<'a>(&'a [u8]);

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Reader<'a> {
        Reader(bytes)
    }

    /// The text bytes, without the NUL terminator.
    pub fn as_bytes(self) -> &'a [u8] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_str(self) -> Result<&'a str> {
        Ok(str::from_utf8(self.0)?)
    }

    pub fn to_string(self) -> Result<String> {
        Ok(String::from(self.to_str()?))
    }
}

impl<'a> From<&'a str> for Reader<'a> {
    fn from(value: &'a str) -> Reader<'a> {
        Reader(value.as_bytes())
    }
}

impl PartialEq<&str> for Reader<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl core::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match str::from_utf8(self.0) {
            Ok(s) => write!(f, "{s:?}"),
            Err(_) => write!(f, "<invalid utf-8: {:?}>", self.0),
        }
    }
}

/// Text being written into a message. The buffer was sized when the text
/// was allocated; `push_str` appends into the remaining room.
pub struct Builder<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> Builder<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Builder<'a> {
        Builder { bytes, pos: 0 }
    }

    pub fn with_pos(bytes: &'a mut [u8], pos: usize) -> Builder<'a> {
        debug_assert!(pos <= bytes.len());
        Builder { bytes, pos }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn push_str(&mut self, string: &str) -> Result<()> {
        let bytes = string.as_bytes();
        let end = self.pos + bytes.len();
        if end > self.bytes.len() {
            return Err(Error::detailed(
                ErrorKind::BufferTooSmall,
                alloc::format!(
                    "text has room for {} more bytes, got {}",
                    self.bytes.len() - self.pos,
                    bytes.len()
                ),
            ));
        }
        self.bytes[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.bytes[..self.pos].fill(0);
        self.pos = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.pos]
    }

    pub fn to_str(&self) -> Result<&str> {
        Ok(str::from_utf8(self.as_bytes())?)
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            bytes: &mut *self.bytes,
            pos: self.pos,
        }
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader(&self.bytes[..self.pos])
    }
}
