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

//! Reading and writing of messages using the
//! [standard stream framing](https://capnproto.org/encoding.html#serialization-over-a-stream),
//! where each message is preceded by a segment table indicating the size of its segments.

use alloc::vec::Vec;
use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::message::{Message, ReaderOptions};
use crate::private::units::BYTES_PER_WORD;
use crate::{Error, ErrorKind, Result};

/// Segment tables with this many entries or more are rejected.
pub const SEGMENTS_COUNT_LIMIT: usize = 512;

/// Reads a framed message from `read`.
///
/// For optimal performance, `read` should be a buffered reader type.
pub fn read_message<R>(mut read: R, options: ReaderOptions) -> Result<Message>
where
    R: Read,
{
    let (total_words, segment_slices) = read_segment_table(&mut read, options)?;
    let mut body = alloc::vec![0; total_words * BYTES_PER_WORD];
    read.read_exact(&mut body)?;
    split_segments(&body, &segment_slices, options)
}

/// Reads a framed message from the front of `slice`, advancing it past the
/// message.
pub fn read_message_from_flat_slice(slice: &mut &[u8], options: ReaderOptions) -> Result<Message> {
    let (total_words, segment_slices) = read_segment_table(slice, options)?;
    let body_len = total_words * BYTES_PER_WORD;
    if slice.len() < body_len {
        return Err(Error::detailed(
            ErrorKind::MessageEndsPrematurely,
            alloc::format!(
                "header claimed {} words, but message only has {} words",
                total_words,
                slice.len() / BYTES_PER_WORD
            ),
        ));
    }
    let (body, rest) = slice.split_at(body_len);
    *slice = rest;
    split_segments(body, &segment_slices, options)
}

/// Reads a segment table from `read` and returns the total number of words across all
/// segments, as well as the segment offsets.
///
/// The segment table format for streams is defined in the Cap'n Proto
/// [encoding documentation](https://capnproto.org/encoding.html)
fn read_segment_table<R>(
    read: &mut R,
    options: ReaderOptions,
) -> Result<(usize, Vec<(usize, usize)>)>
where
    R: Read,
{
    let mut buf: [u8; 8] = [0; 8];

    // read the first word, which contains segment_count and the 1st segment length
    read.read_exact(&mut buf)?;
    let segment_count = <LittleEndian as ByteOrder>::read_u32(&buf[0..4]).wrapping_add(1) as usize;

    if segment_count >= SEGMENTS_COUNT_LIMIT {
        return Err(Error::detailed(
            ErrorKind::TooManySegments,
            alloc::format!("{segment_count} segments"),
        ));
    } else if segment_count == 0 {
        return Err(Error::from_kind(ErrorKind::TooFewSegments));
    }

    let mut segment_slices = Vec::with_capacity(segment_count);
    let mut total_words = <LittleEndian as ByteOrder>::read_u32(&buf[4..8]) as usize;
    segment_slices.push((0, total_words));

    if segment_count > 1 {
        let mut segment_sizes = alloc::vec![0u8; (segment_count & !1) * 4];
        read.read_exact(&mut segment_sizes[..])?;
        for idx in 0..(segment_count - 1) {
            let segment_len =
                <LittleEndian as ByteOrder>::read_u32(&segment_sizes[(idx * 4)..(idx + 1) * 4])
                    as usize;
            segment_slices.push((total_words, total_words + segment_len));
            total_words += segment_len;
        }
    }

    // Don't accept a message which the receiver couldn't possibly traverse without hitting the
    // traversal limit. Without this check, a malicious client could transmit a very large segment
    // size to make the receiver allocate excessive space and possibly crash.
    if let Some(limit) = options.traversal_limit_in_words {
        if total_words > limit {
            return Err(Error::detailed(
                ErrorKind::MessageTooLarge,
                alloc::format!("{total_words} words exceeds the traversal limit of {limit}"),
            ));
        }
    }

    Ok((total_words, segment_slices))
}

fn split_segments(
    body: &[u8],
    segment_slices: &[(usize, usize)],
    options: ReaderOptions,
) -> Result<Message> {
    let segments = segment_slices
        .iter()
        .map(|&(start, end)| body[start * BYTES_PER_WORD..end * BYTES_PER_WORD].to_vec())
        .collect::<Vec<_>>();
    tracing::debug!(
        segments = segments.len(),
        words = body.len() / BYTES_PER_WORD,
        "decoded message"
    );
    Message::from_segments(segments, options)
}

/// The segment table for `segments`, padded to a whole word.
///
/// `segments` must contain at least one segment.
fn segment_table(segments: &[&[u8]]) -> Vec<u8> {
    let segment_count = segments.len();
    let mut buf = alloc::vec![0u8; ((segment_count + 2) & !1) * 4];
    <LittleEndian as ByteOrder>::write_u32(&mut buf[0..4], segment_count as u32 - 1);
    for (idx, segment) in segments.iter().enumerate() {
        <LittleEndian as ByteOrder>::write_u32(
            &mut buf[(idx + 1) * 4..(idx + 2) * 4],
            (segment.len() / BYTES_PER_WORD) as u32,
        );
    }
    buf
}

fn write_segment_table<W>(write: &mut W, segments: &[&[u8]]) -> Result<()>
where
    W: Write,
{
    write.write_all(&segment_table(segments))?;
    Ok(())
}

fn write_segments<W>(write: &mut W, segments: &[&[u8]]) -> Result<()>
where
    W: Write,
{
    for segment in segments {
        write.write_all(segment)?;
    }
    Ok(())
}

/// Constructs a flat vector containing the entire message, including the segment table.
pub fn write_message_to_bytes(message: &Message) -> Vec<u8> {
    let segments = message.segments_for_output();
    flatten_segments(&segments)
}

fn flatten_segments(segments: &[&[u8]]) -> Vec<u8> {
    let mut result = Vec::with_capacity(compute_serialized_size(segments) * BYTES_PER_WORD);
    result.extend_from_slice(&segment_table(segments));
    for segment in segments {
        result.extend_from_slice(segment);
    }
    result
}

/// Writes the provided message to `write`.
///
/// For optimal performance, `write` should be a buffered writer. `flush` will not be called on
/// the writer.
pub fn write_message<W>(mut write: W, message: &Message) -> Result<()>
where
    W: Write,
{
    let segments = message.segments_for_output();
    write_segment_table(&mut write, &segments)?;
    write_segments(&mut write, &segments)
}

fn compute_serialized_size(segments: &[&[u8]]) -> usize {
    // Table size
    let len = segments.len();
    let mut size = (len / 2) + 1;
    for segment in segments {
        size += segment.len() / BYTES_PER_WORD;
    }
    size
}

/// Returns the number of words required to serialize the message.
pub fn compute_serialized_size_in_words(message: &Message) -> usize {
    compute_serialized_size(&message.segments_for_output())
}
