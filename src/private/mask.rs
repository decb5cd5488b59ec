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

//! Default-value masking.
//!
//! A field with a non-zero default is stored XORed with the default's bit
//! pattern, so that an all-zero data section decodes to the declared
//! defaults. The mask always has the same width as the field.

pub trait Mask: Copy {
    fn mask(self, default: Self) -> Self;
}

macro_rules! int_mask(
    ($t:ident) => (
        impl Mask for $t {
            #[inline]
            fn mask(self, default: $t) -> $t {
                self ^ default
            }
        }
    )
);

int_mask!(i8);
int_mask!(i16);
int_mask!(i32);
int_mask!(i64);
int_mask!(u8);
int_mask!(u16);
int_mask!(u32);
int_mask!(u64);

impl Mask for f32 {
    #[inline]
    fn mask(self, default: f32) -> f32 {
        f32::from_bits(self.to_bits() ^ default.to_bits())
    }
}

impl Mask for f64 {
    #[inline]
    fn mask(self, default: f64) -> f64 {
        f64::from_bits(self.to_bits() ^ default.to_bits())
    }
}

impl Mask for bool {
    #[inline]
    fn mask(self, default: bool) -> bool {
        self ^ default
    }
}

#[cfg(test)]
mod tests {
    use super::Mask;

    #[test]
    fn masking_is_an_involution() {
        assert_eq!(0i32.mask(-123456), -123456);
        assert_eq!((-123456i32).mask(-123456), 0);
        assert_eq!(0u16.mask(0xbeef), 0xbeef);
        assert_eq!(0f32.mask(1.5).mask(1.5).to_bits(), 0);
        assert_eq!(0f64.mask(-2.25), -2.25);
        assert!(false.mask(true));
        assert!(!true.mask(true));
    }

    #[test]
    fn i32_mask_covers_the_high_half() {
        // The stored bits of a default of 0x12345678 must round-trip through
        // the full 32-bit width.
        let stored = 0x7fff_0001i32.mask(0x1234_5678);
        assert_eq!(stored.mask(0x1234_5678), 0x7fff_0001);
        assert_ne!(stored >> 16, 0x7fff);
    }
}
