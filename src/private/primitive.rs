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

//! Little-endian loads and stores of the fixed-width primitives that can
//! live in a data section or a primitive list.

use byteorder::{ByteOrder, LittleEndian};

use crate::private::layout::ElementSize;
use crate::private::mask::Mask;

pub trait Primitive: Mask + Default + PartialEq + core::fmt::Debug {
    /// Width of the value on the wire, in bytes.
    const BYTES: usize;

    /// Element-size class of a list of this primitive.
    const ELEMENT_SIZE: ElementSize;

    /// Reads a value from the first `BYTES` bytes of `bytes`.
    fn load(bytes: &[u8]) -> Self;

    /// Writes a value into the first `BYTES` bytes of `bytes`.
    fn store(bytes: &mut [u8], value: Self);
}

impl Primitive for u8 {
    const BYTES: usize = 1;
    const ELEMENT_SIZE: ElementSize = ElementSize::Byte;
    #[inline]
    fn load(bytes: &[u8]) -> u8 {
        bytes[0]
    }
    #[inline]
    fn store(bytes: &mut [u8], value: u8) {
        bytes[0] = value;
    }
}

impl Primitive for i8 {
    const BYTES: usize = 1;
    const ELEMENT_SIZE: ElementSize = ElementSize::Byte;
    #[inline]
    fn load(bytes: &[u8]) -> i8 {
        bytes[0] as i8
    }
    #[inline]
    fn store(bytes: &mut [u8], value: i8) {
        bytes[0] = value as u8;
    }
}

macro_rules! primitive_impl(
    ($typ:ty, $n:expr, $size:ident, $read:ident, $write:ident) => (
        impl Primitive for $typ {
            const BYTES: usize = $n;
            const ELEMENT_SIZE: ElementSize = ElementSize::$size;

            #[inline]
            fn load(bytes: &[u8]) -> $typ {
                <LittleEndian as ByteOrder>::$read(&bytes[..$n])
            }

            #[inline]
            fn store(bytes: &mut [u8], value: $typ) {
                <LittleEndian as ByteOrder>::$write(&mut bytes[..$n], value)
            }
        }
    );
);

primitive_impl!(u16, 2, TwoBytes, read_u16, write_u16);
primitive_impl!(i16, 2, TwoBytes, read_i16, write_i16);
primitive_impl!(u32, 4, FourBytes, read_u32, write_u32);
primitive_impl!(i32, 4, FourBytes, read_i32, write_i32);
primitive_impl!(u64, 8, EightBytes, read_u64, write_u64);
primitive_impl!(i64, 8, EightBytes, read_i64, write_i64);
primitive_impl!(f32, 4, FourBytes, read_f32, write_f32);
primitive_impl!(f64, 8, EightBytes, read_f64, write_f64);

#[cfg(test)]
mod tests {
    use super::Primitive;

    #[test]
    fn little_endian_layout() {
        let mut buf = [0u8; 8];
        <u32 as Primitive>::store(&mut buf, 0x0403_0201);
        assert_eq!(buf, [1, 2, 3, 4, 0, 0, 0, 0]);
        assert_eq!(<u16 as Primitive>::load(&buf[1..]), 0x0302);
        <i8 as Primitive>::store(&mut buf[7..], -1);
        assert_eq!(buf[7], 0xff);
        <f64 as Primitive>::store(&mut buf, -0.5);
        assert_eq!(<f64 as Primitive>::load(&buf), -0.5);
    }
}
