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

//! Reads and writes over hand-assembled words.

use crate::message::{Message, ReaderOptions};
use crate::primitive_list;
use crate::private::layout::ElementSize;
use crate::serialize::test::words_to_segments;
use crate::{ErrorKind, Result, StructSize};

fn from_words(segments: &[Vec<u64>]) -> Message {
    Message::from_segments(words_to_segments(segments), ReaderOptions::new()).unwrap()
}

fn kind_of<T>(result: Result<T>) -> ErrorKind {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.kind,
    }
}

#[test]
fn simple_raw_data_struct() {
    let message = from_words(&[vec![0x0000_0001_0000_0000, 0xefcd_ab89_6745_2301]]);
    let reader = message.get_root_as_reader().unwrap();

    assert_eq!(0xefcdab8967452301u64, reader.get_data_field::<u64>(0));
    assert_eq!(0, reader.get_data_field::<u64>(8));
    assert_eq!(0x67452301u32, reader.get_data_field::<u32>(0));
    assert_eq!(0xefcdab89u32, reader.get_data_field::<u32>(4));
    assert_eq!(0, reader.get_data_field::<u32>(8));
    assert_eq!(0x2301u16, reader.get_data_field::<u16>(0));
    assert_eq!(0x6745u16, reader.get_data_field::<u16>(2));
    assert_eq!(0xab89u16, reader.get_data_field::<u16>(4));
    assert_eq!(0xefcdu16, reader.get_data_field::<u16>(6));
    assert_eq!(0, reader.get_data_field::<u16>(8));

    // Bits.
    assert!(reader.get_bool_field(0));
    assert!(!reader.get_bool_field(1));
    assert!(!reader.get_bool_field(2));
    assert!(!reader.get_bool_field(3));
    assert!(!reader.get_bool_field(4));
    assert!(!reader.get_bool_field(5));
    assert!(!reader.get_bool_field(6));
    assert!(!reader.get_bool_field(7));

    assert!(reader.get_bool_field(8));
    assert!(reader.get_bool_field(9));
    assert!(!reader.get_bool_field(10));
    assert!(!reader.get_bool_field(11));
    assert!(!reader.get_bool_field(12));
    assert!(reader.get_bool_field(13));
    assert!(!reader.get_bool_field(14));
    assert!(!reader.get_bool_field(15));

    assert!(reader.get_bool_field(63));
    assert!(!reader.get_bool_field(64));
}

#[test]
fn bool_list() {
    // [true, false, true, false,
    //  true, true, true, false,
    //  false, true]
    let message = from_words(&[vec![0x0000_0051_0000_0001, 0x0275]]);
    let pointer_reader = message.root_pointer_reader().unwrap();

    let reader = pointer_reader.get_list(ElementSize::Bit, None).unwrap();
    assert_eq!(reader.len(), 10);
    assert!(reader.get::<bool>(0));
    assert!(!reader.get::<bool>(1));
    assert!(reader.get::<bool>(2));
    assert!(!reader.get::<bool>(3));
    assert!(reader.get::<bool>(4));
    assert!(reader.get::<bool>(5));
    assert!(reader.get::<bool>(6));
    assert!(!reader.get::<bool>(7));
    assert!(!reader.get::<bool>(8));
    assert!(reader.get::<bool>(9));

    let reader = primitive_list::Reader::<bool>::get_from_pointer(&pointer_reader, None).unwrap();
    assert_eq!(
        reader.to_vec(),
        vec![true, false, true, false, true, true, true, false, false, true]
    );

    // A bit list is not a list of structs.
    assert_eq!(
        pointer_reader
            .get_list(ElementSize::InlineComposite, None)
            .unwrap_err()
            .kind,
        ErrorKind::InvalidPointerType
    );
}

#[test]
fn empty_struct_uses_offset_minus_one() {
    let mut message = Message::new_default();
    message.init_root(StructSize::new(0, 0)).unwrap();
    assert_eq!(
        message.segments_for_output()[0],
        &[0xfc, 0xff, 0xff, 0xff, 0, 0, 0, 0][..]
    );

    let message = from_words(&[vec![0x0000_0000_ffff_fffc]]);
    let reader = message.get_root_as_reader().unwrap();
    assert_eq!(reader.size(), StructSize::new(0, 0));
}

#[test]
fn single_far_pointer() {
    let message = from_words(&[
        vec![0x0000_0001_0000_0002],
        vec![0x0000_0001_0000_0000, 42],
    ]);
    let reader = message.get_root_as_reader().unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 42);
}

#[test]
fn double_far_pointer() {
    let message = from_words(&[
        vec![0x0000_0001_0000_0006],
        vec![0x0000_0002_0000_0002, 0x0000_0001_0000_0000],
        vec![7],
    ]);
    let reader = message.get_root_as_reader().unwrap();
    assert_eq!(reader.get_data_field::<u64>(0), 7);
    assert_eq!(reader.total_size().unwrap().word_count, 1);
}

#[test]
fn far_pointer_to_missing_segment() {
    let message = from_words(&[vec![0x0000_0005_0000_0002]]);
    assert!(message.get_root_as_reader().is_err());
}

#[test]
fn far_pointer_chain_is_rejected() {
    // The landing pad is itself a single far pointer.
    let message = from_words(&[
        vec![0x0000_0001_0000_0002],
        vec![0x0000_0000_0000_0002],
    ]);
    assert_eq!(
        message.get_root_as_reader().unwrap_err().kind,
        ErrorKind::InvalidFarPointer
    );
}

#[test]
fn struct_out_of_bounds() {
    // One data word claimed, none present.
    let message = from_words(&[vec![0x0000_0001_0000_0000]]);
    assert_eq!(
        message.get_root_as_reader().unwrap_err().kind,
        ErrorKind::BoundsError
    );
}

#[test]
fn wrong_pointer_kind() {
    let message = from_words(&[vec![0x0000_0051_0000_0001, 0x0275]]);
    assert_eq!(
        message.get_root_as_reader().unwrap_err().kind,
        ErrorKind::InvalidPointerType
    );
}

#[test]
fn cyclic_struct_hits_depth_limit() {
    // The root's only pointer refers back to the root itself.
    let message = from_words(&[vec![0x0001_0000_0000_0000, 0x0001_0000_ffff_fffc]]);
    let mut reader = message.get_root_as_reader().unwrap();
    let mut depth = 0;
    let err = loop {
        match reader.get_struct(0, None) {
            Ok(next) => {
                reader = next;
                depth += 1;
            }
            Err(e) => break e,
        }
        assert!(depth <= 64);
    };
    assert_eq!(err.kind, ErrorKind::DepthLimitExceeded);
    assert_eq!(
        message.total_size().unwrap_err().kind,
        ErrorKind::DepthLimitExceeded
    );
}

#[test]
fn inline_composite_list() {
    let message = from_words(&[vec![
        0x0000_0027_0000_0001,
        0x0001_0001_0000_0008,
        0x11,
        0,
        0x22,
        0,
    ]]);
    let pointer = message.root_pointer_reader().unwrap();
    let list = pointer.get_list(ElementSize::InlineComposite, None).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.struct_size(), StructSize::new(1, 1));
    assert_eq!(list.get_struct_element(0).get_data_field::<u64>(0), 0x11);
    assert_eq!(list.get_struct_element(1).get_data_field::<u64>(0), 0x22);
    assert!(list.get_struct_element(1).get_pointer_field(0).is_null());
}

#[test]
fn inline_composite_tag_larger_than_list() {
    // The tag claims two elements of two words in a list of two words.
    let message = from_words(&[vec![
        0x0000_0017_0000_0001,
        0x0001_0001_0000_0008,
        0,
        0,
    ]]);
    let pointer = message.root_pointer_reader().unwrap();
    assert!(pointer.get_list(ElementSize::InlineComposite, None).is_err());
}

#[test]
fn traversal_limit() {
    let segments = words_to_segments(&[vec![0x0000_0001_0000_0000, 1]]);
    let mut options = ReaderOptions::new();
    options.traversal_limit_in_words(Some(2));
    let message = Message::from_segments(segments, options).unwrap();
    assert!(message.get_root_as_reader().is_ok());
    assert!(message.get_root_as_reader().is_ok());
    assert_eq!(
        message.get_root_as_reader().unwrap_err().kind,
        ErrorKind::ReadLimitExceeded
    );
}

// Writes over malformed received words. Replacing a root zeroes the old
// object first, so these walk the same pointers reads do.

#[test]
fn far_pointer_onto_itself_on_write() {
    // A single far pointer whose pad is the root word itself.
    let mut message = from_words(&[vec![0x0000_0000_0000_0002]]);
    assert_eq!(
        kind_of(message.get_root_as_reader()),
        ErrorKind::InvalidFarPointer
    );
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::InvalidFarPointer
    );
    assert_eq!(
        kind_of(message.get_root(StructSize::new(1, 0))),
        ErrorKind::InvalidFarPointer
    );
    assert_eq!(
        kind_of(message.root_pointer().unwrap().set_text("x")),
        ErrorKind::InvalidFarPointer
    );
}

#[test]
fn far_pointer_to_missing_segment_on_write() {
    let mut message = from_words(&[vec![0x0000_0005_0000_0002]]);
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::InvalidSegmentId
    );
    assert_eq!(
        kind_of(message.get_root(StructSize::new(1, 0))),
        ErrorKind::InvalidSegmentId
    );
    assert_eq!(
        kind_of(message.root_pointer().unwrap().disown()),
        ErrorKind::InvalidSegmentId
    );
    let orphan = message.new_orphan_struct(StructSize::new(1, 0)).unwrap();
    assert_eq!(
        kind_of(message.root_pointer().unwrap().adopt(orphan)),
        ErrorKind::InvalidSegmentId
    );
}

#[test]
fn far_pointer_chain_on_write() {
    // The pad in segment 1 is itself a far pointer back to segment 0.
    let mut message = from_words(&[vec![0x0000_0001_0000_0002], vec![0x0000_0000_0000_0002]]);
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::InvalidFarPointer
    );
    assert_eq!(
        kind_of(message.get_root(StructSize::new(1, 0))),
        ErrorKind::InvalidFarPointer
    );
    assert_eq!(
        kind_of(message.root_pointer().unwrap().disown()),
        ErrorKind::InvalidFarPointer
    );
}

#[test]
fn double_far_with_plain_pad_on_write() {
    // A double far whose pad starts with a struct pointer, not a far one.
    let mut message = from_words(&[
        vec![0x0000_0001_0000_0006],
        vec![0x0000_0001_0000_0000, 0],
    ]);
    assert_eq!(
        kind_of(message.get_root_as_reader()),
        ErrorKind::InvalidFarPointer
    );
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::InvalidFarPointer
    );
}

#[test]
fn struct_out_of_bounds_on_write() {
    // One data word is claimed but the segment ends at the pointer.
    let mut message = from_words(&[vec![0x0000_0001_0000_0000]]);
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::BoundsError
    );
    assert_eq!(
        kind_of(message.get_root(StructSize::new(2, 0))),
        ErrorKind::BoundsError
    );

    // The target offset itself lies past the end of the segment.
    let mut message = from_words(&[vec![0x0000_0001_0000_0100]]);
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::BoundsError
    );
}

#[test]
fn upgrade_with_child_out_of_bounds() {
    // The root's pointer field refers far past the end of the segment.
    let words = [vec![0x0001_0000_0000_0000, 0x0000_0001_0000_0400]];

    let mut message = from_words(&words);
    assert_eq!(
        kind_of(message.get_root(StructSize::new(1, 1))),
        ErrorKind::BoundsError
    );

    let mut message = from_words(&words);
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::BoundsError
    );
}

#[test]
fn cyclic_struct_on_write() {
    let mut message = from_words(&[vec![0x0001_0000_0000_0000, 0x0001_0000_ffff_fffc]]);
    assert_eq!(
        kind_of(message.init_root(StructSize::new(1, 0))),
        ErrorKind::DepthLimitExceeded
    );
}
