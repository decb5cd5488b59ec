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

//! Sequence of bytes.

pub type Reader<'a> = &'a [u8];

pub type Builder<'a> = &'a mut [u8];

/// Copies `src` into `dst`. Extra source bytes are ignored; if `src` is
/// shorter, the rest of `dst` is zeroed.
pub fn copy_buffer(dst: Builder<'_>, src: Reader<'_>) {
    let n = core::cmp::min(dst.len(), src.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0);
}

#[cfg(test)]
mod tests {
    use super::copy_buffer;

    #[test]
    fn copy_buffer_truncates_and_zero_fills() {
        let mut dst = [9u8; 4];
        copy_buffer(&mut dst, &[1, 2]);
        assert_eq!(dst, [1, 2, 0, 0]);
        copy_buffer(&mut dst, &[5, 6, 7, 8, 9]);
        assert_eq!(dst, [5, 6, 7, 8]);
    }
}
