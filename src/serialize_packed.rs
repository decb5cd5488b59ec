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
//! [packed stream encoding](https://capnproto.org/encoding.html#packing).
//!
//! Each word is written as a tag byte whose bit `i` is set when byte `i`
//! of the word is non-zero, followed by the non-zero bytes. A zero tag is
//! followed by the number of further all-zero words (up to 255). A `0xff`
//! tag is followed by the number of further words copied verbatim (up to
//! 255); the verbatim run stops early at the first word with at least
//! [`PACK_SPAN_THRESHOLD`] zero bytes.

use alloc::vec::Vec;
use std::io::{BufRead, Read, Write};

use crate::message::{Message, ReaderOptions};
use crate::private::units::BYTES_PER_WORD;
use crate::{serialize, Error, ErrorKind, Result};

/// A word with this many zero bytes or more ends a verbatim run.
pub const PACK_SPAN_THRESHOLD: usize = 2;

const MAX_RUN_WORDS: usize = 255;

fn premature_end() -> Error {
    Error::from_kind(ErrorKind::PrematureEndOfPackedInput)
}

/// Packs `input`, which must be a whole number of words.
pub fn pack(input: &[u8]) -> Result<Vec<u8>> {
    if input.len() % BYTES_PER_WORD != 0 {
        return Err(Error::detailed(
            ErrorKind::PackNotWordAligned,
            alloc::format!("{} bytes", input.len()),
        ));
    }
    let mut output = Vec::with_capacity(input.len() + input.len() / BYTES_PER_WORD + 2);
    pack_words(input, &mut output);
    Ok(output)
}

/// Appends the packed form of `input` to `output`. `input.len()` is a
/// multiple of eight.
fn pack_words(input: &[u8], output: &mut Vec<u8>) {
    let mut words = input.chunks_exact(BYTES_PER_WORD).peekable();
    while let Some(word) = words.next() {
        let tag_pos = output.len();
        output.push(0);
        let mut tag = 0u8;
        for (i, &byte) in word.iter().enumerate() {
            if byte != 0 {
                tag |= 1 << i;
                output.push(byte);
            }
        }
        output[tag_pos] = tag;

        if tag == 0 {
            //# An all-zero word is followed by a count of
            //# consecutive zero words (not including the first
            //# one).
            let mut count = 0;
            while count < MAX_RUN_WORDS && words.next_if(|w| w.iter().all(|b| *b == 0)).is_some() {
                count += 1;
            }
            output.push(count as u8);
        } else if tag == 0xff {
            //# An all-nonzero word is followed by a count of
            //# consecutive uncompressed words, followed by the
            //# uncompressed words themselves.
            let count_pos = output.len();
            output.push(0);
            let mut count = 0;
            while count < MAX_RUN_WORDS {
                let sparse = |w: &&[u8]| w.iter().filter(|b| **b == 0).count() < PACK_SPAN_THRESHOLD;
                match words.next_if(sparse) {
                    Some(w) => {
                        output.extend_from_slice(w);
                        count += 1;
                    }
                    None => break,
                }
            }
            output[count_pos] = count as u8;
        }
    }
}

/// Walks the packed stream and returns the length it unpacks to, without
/// unpacking it.
pub fn get_unpacked_byte_length(packed: &[u8]) -> Result<usize> {
    let mut pos = 0;
    let mut total = 0;
    while pos < packed.len() {
        let tag = packed[pos];
        pos += 1 + tag.count_ones() as usize;
        if pos > packed.len() {
            return Err(premature_end());
        }
        total += BYTES_PER_WORD;
        if tag == 0 || tag == 0xff {
            let count = *packed.get(pos).ok_or_else(premature_end)? as usize * BYTES_PER_WORD;
            pos += 1;
            total += count;
            if tag == 0xff {
                pos += count;
                if pos > packed.len() {
                    return Err(premature_end());
                }
            }
        }
    }
    Ok(total)
}

/// Reverses [`pack`]. The output buffer is sized once, up front.
pub fn unpack(packed: &[u8]) -> Result<Vec<u8>> {
    let mut output = alloc::vec![0u8; get_unpacked_byte_length(packed)?];
    let mut out = 0;
    let mut pos = 0;
    // The length pass has already validated every run and word.
    while pos < packed.len() {
        let tag = packed[pos];
        pos += 1;
        for i in 0..BYTES_PER_WORD {
            if tag & (1 << i) != 0 {
                output[out + i] = packed[pos];
                pos += 1;
            }
        }
        out += BYTES_PER_WORD;
        if tag == 0 {
            // The output is already zeroed.
            out += packed[pos] as usize * BYTES_PER_WORD;
            pos += 1;
        } else if tag == 0xff {
            let count = packed[pos] as usize * BYTES_PER_WORD;
            pos += 1;
            output[out..out + count].copy_from_slice(&packed[pos..pos + count]);
            out += count;
            pos += count;
        }
    }
    Ok(output)
}

/// A `Read` adapter that unpacks a packed stream as it is read.
///
/// Reads return whole words, except that a verbatim or zero run may be
/// split across calls.
pub struct PackedRead<R>
where
    R: BufRead,
{
    inner: R,
    zeros_pending: usize,
    verbatim_pending: usize,
}

impl<R> PackedRead<R>
where
    R: BufRead,
{
    pub fn new(inner: R) -> PackedRead<R> {
        PackedRead {
            inner,
            zeros_pending: 0,
            verbatim_pending: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn next_byte(&mut self) -> Result<Option<u8>> {
        let byte = match self.inner.fill_buf()?.first() {
            Some(&byte) => byte,
            None => return Ok(None),
        };
        self.inner.consume(1);
        Ok(Some(byte))
    }

    fn require_byte(&mut self) -> Result<u8> {
        self.next_byte()?.ok_or_else(premature_end)
    }

    fn read_packed(&mut self, out: &mut [u8]) -> Result<usize> {
        let mut n = 0;
        while n < out.len() {
            if self.zeros_pending > 0 {
                let k = core::cmp::min(self.zeros_pending, out.len() - n);
                out[n..n + k].fill(0);
                n += k;
                self.zeros_pending -= k;
                continue;
            }
            if self.verbatim_pending > 0 {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    return Err(premature_end());
                }
                let k = core::cmp::min(
                    core::cmp::min(self.verbatim_pending, out.len() - n),
                    buf.len(),
                );
                out[n..n + k].copy_from_slice(&buf[..k]);
                self.inner.consume(k);
                n += k;
                self.verbatim_pending -= k;
                continue;
            }
            if out.len() - n < BYTES_PER_WORD {
                if n > 0 {
                    break;
                }
                return Err(Error::failed(
                    "packed reads must be a whole number of words".into(),
                ));
            }
            let tag = match self.next_byte()? {
                Some(tag) => tag,
                None if n == 0 => break,
                None => return Err(premature_end()),
            };
            for i in 0..BYTES_PER_WORD {
                out[n + i] = if tag & (1 << i) != 0 {
                    self.require_byte()?
                } else {
                    0
                };
            }
            n += BYTES_PER_WORD;
            if tag == 0 {
                self.zeros_pending = self.require_byte()? as usize * BYTES_PER_WORD;
            } else if tag == 0xff {
                self.verbatim_pending = self.require_byte()? as usize * BYTES_PER_WORD;
            }
        }
        Ok(n)
    }
}

impl<R> Read for PackedRead<R>
where
    R: BufRead,
{
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        Ok(self.read_packed(out)?)
    }
}

/// Writes a packed message to a stream.
///
/// The only source of errors from this function are `write.write_all()` calls. If you pass in
/// a writer that never returns an error, then this function will never return an error.
pub fn write_message<W>(mut write: W, message: &Message) -> Result<()>
where
    W: Write,
{
    write.write_all(&write_message_to_bytes(message))?;
    Ok(())
}

/// The framed message, packed.
pub fn write_message_to_bytes(message: &Message) -> Vec<u8> {
    let framed = serialize::write_message_to_bytes(message);
    let mut output = Vec::with_capacity(framed.len() / 2);
    pack_words(&framed, &mut output);
    output
}

/// Reads a packed message from a stream, consuming exactly the bytes that
/// make up the message.
pub fn read_message<R>(read: R, options: ReaderOptions) -> Result<Message>
where
    R: BufRead,
{
    serialize::read_message(PackedRead::new(read), options)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use quickcheck::{quickcheck, TestResult};

    use super::{get_unpacked_byte_length, pack, read_message, unpack, PackedRead};
    use crate::message::ReaderOptions;
    use crate::serialize::test::words_to_segments;
    use crate::ErrorKind;

    pub fn check_unpacks_to(packed: &[u8], unpacked: &[u8]) {
        assert_eq!(get_unpacked_byte_length(packed).unwrap(), unpacked.len());
        assert_eq!(unpack(packed).unwrap(), unpacked);

        let mut packed_read = PackedRead::new(packed);
        let mut bytes: Vec<u8> = vec![0; unpacked.len()];
        packed_read.read_exact(&mut bytes[..]).unwrap();
        assert!(packed_read.into_inner().is_empty()); // nothing left to read
        assert_eq!(bytes, unpacked);
    }

    pub fn check_packing(unpacked: &[u8], packed: &[u8]) {
        assert_eq!(pack(unpacked).unwrap(), packed);
        check_unpacks_to(packed, unpacked);
    }

    #[test]
    pub fn simple_packing() {
        check_packing(&[], &[]);
        check_packing(&[0; 8], &[0, 0]);
        check_packing(&[0, 0, 12, 0, 0, 34, 0, 0], &[0x24, 12, 34]);
        check_packing(
            &[1, 3, 2, 4, 5, 7, 6, 8],
            &[0xff, 1, 3, 2, 4, 5, 7, 6, 8, 0],
        );
        check_packing(
            &[0, 0, 0, 0, 0, 0, 0, 0, 1, 3, 2, 4, 5, 7, 6, 8],
            &[0, 0, 0xff, 1, 3, 2, 4, 5, 7, 6, 8, 0],
        );
        check_packing(
            &[0, 0, 12, 0, 0, 34, 0, 0, 1, 3, 2, 4, 5, 7, 6, 8],
            &[0x24, 12, 34, 0xff, 1, 3, 2, 4, 5, 7, 6, 8, 0],
        );
        check_packing(
            &[1, 3, 2, 4, 5, 7, 6, 8, 8, 6, 7, 4, 5, 2, 3, 1],
            &[0xff, 1, 3, 2, 4, 5, 7, 6, 8, 1, 8, 6, 7, 4, 5, 2, 3, 1],
        );

        check_packing(
            &[
                1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4,
                5, 6, 7, 8, 0, 2, 4, 0, 9, 0, 5, 1,
            ],
            &[
                0xff, 1, 2, 3, 4, 5, 6, 7, 8, 3, 1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4, 5, 6, 7, 8, 1,
                2, 3, 4, 5, 6, 7, 8, 0xd6, 2, 4, 9, 5, 1,
            ],
        );
        check_packing(
            &[
                1, 2, 3, 4, 5, 6, 7, 8, 1, 2, 3, 4, 5, 6, 7, 8, 6, 2, 4, 3, 9, 0, 5, 1, 1, 2, 3, 4,
                5, 6, 7, 8, 0, 2, 4, 0, 9, 0, 5, 1,
            ],
            &[
                0xff, 1, 2, 3, 4, 5, 6, 7, 8, 3, 1, 2, 3, 4, 5, 6, 7, 8, 6, 2, 4, 3, 9, 0, 5, 1, 1,
                2, 3, 4, 5, 6, 7, 8, 0xd6, 2, 4, 9, 5, 1,
            ],
        );

        check_packing(
            &[
                8, 0, 100, 6, 0, 1, 1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 0, 0, 0, 0, 0, 1, 0, 2, 0, 3, 1,
            ],
            &[0xed, 8, 100, 6, 1, 1, 2, 0, 2, 0xd4, 1, 2, 3, 1],
        );

        check_packing(&[0; 16], &[0, 1]);
        check_packing(
            &[
                0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            ],
            &[0, 2],
        );
    }

    #[test]
    fn zero_runs_are_capped() {
        let unpacked = vec![0u8; 300 * 8];
        check_packing(&unpacked, &[0, 255, 0, 43]);
    }

    #[test]
    fn verbatim_runs_are_capped() {
        let unpacked: Vec<u8> = (0..300 * 8).map(|i| (i % 251) as u8 + 1).collect();
        let packed = pack(&unpacked).unwrap();
        assert_eq!(packed.len(), (1 + 8 + 1 + 255 * 8) + (1 + 8 + 1 + 43 * 8));
        assert_eq!(packed[9], 255);
        assert_eq!(packed[10 + 255 * 8], 0xff);
        assert_eq!(packed[10 + 255 * 8 + 9], 43);
        check_unpacks_to(&packed, &unpacked);
    }

    #[test]
    fn verbatim_run_stops_at_sparse_word() {
        let mut unpacked = vec![7u8; 8 * 3];
        // One zero byte keeps the word in the run; two end it.
        unpacked[9] = 0;
        unpacked[16] = 0;
        unpacked[17] = 0;
        let packed = pack(&unpacked).unwrap();
        assert_eq!(packed[..9], [0xff, 7, 7, 7, 7, 7, 7, 7, 7]);
        assert_eq!(packed[9], 1);
        assert_eq!(packed[18], 0xfc);
        check_unpacks_to(&packed, &unpacked);
    }

    #[test]
    fn pack_requires_whole_words() {
        assert_eq!(pack(&[1, 2, 3]).unwrap_err().kind, ErrorKind::PackNotWordAligned);
    }

    #[test]
    fn premature_eof() {
        let input_bytes: &[u8] = &[];
        let mut packed_read = PackedRead::new(input_bytes);

        let mut output_bytes: Vec<u8> = vec![0; 8];
        assert!(packed_read.read_exact(&mut output_bytes[..]).is_err());
    }

    #[test]
    fn premature_end_of_packed_input() {
        fn helper(packed: &[u8]) {
            let mut packed_read = PackedRead::new(packed);

            let mut bytes: Vec<u8> = vec![0; 200];
            let err = crate::Error::from(packed_read.read_exact(&mut bytes[..]).unwrap_err());
            assert_eq!(err.kind, ErrorKind::PrematureEndOfPackedInput);
        }

        helper(&[0xf0, 1, 2]);
        helper(&[0]);
        helper(&[0xff, 1, 2, 3, 4, 5, 6, 7, 8]);
        helper(&[0xff, 1, 2, 3, 4, 5, 6, 7, 8, 37, 1, 2]);

        // In this case, the error is only due to the fact that the unpacked data does not
        // fill up the given output buffer.
        helper(&[1, 1]);

        for packed in [&[0xf0, 1, 2][..], &[0], &[0xff, 1, 2, 3, 4, 5, 6, 7, 8, 2, 0]] {
            assert_eq!(
                unpack(packed).unwrap_err().kind,
                ErrorKind::PrematureEndOfPackedInput
            );
        }
    }

    #[test]
    fn packed_segment_table() {
        let packed_buf = &[0x11, 4, 1, 0, 1, 0, 0];

        check_unpacks_to(
            packed_buf,
            &[
                4, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
                0, 0, 0, 0,
            ],
        );

        // The segment table is read across several reads of the packed stream.
        let message = read_message(&packed_buf[..], Default::default()).unwrap();
        assert_eq!(message.segment_count(), 5);
    }

    quickcheck! {
        fn test_round_trip(words: Vec<u64>) -> bool {
            let unpacked: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
            let packed = pack(&unpacked).unwrap();
            get_unpacked_byte_length(&packed).unwrap() == unpacked.len()
                && unpack(&packed).unwrap() == unpacked
        }

        fn test_round_trip_sparse(words: Vec<(u8, u8, bool)>) -> bool {
            let unpacked: Vec<u8> = words
                .iter()
                .flat_map(|&(a, b, zero)| if zero { [0; 8] } else { [a, 0, b, 0, 0, a, 0, b] })
                .collect();
            let packed = pack(&unpacked).unwrap();
            unpack(&packed).unwrap() == unpacked
        }

        fn test_message_round_trip(segments: Vec<Vec<u64>>) -> TestResult {
            if segments.is_empty() || segments.len() >= 512 {
                return TestResult::discard();
            }
            let segments = words_to_segments(&segments);
            let message = crate::message::Message::from_segments(
                segments.clone(),
                ReaderOptions::new(),
            )
            .unwrap();
            let packed = message.to_packed_bytes();
            let read = read_message(&packed[..], ReaderOptions::new()).unwrap();
            TestResult::from_bool(read.segments_for_output() == message.segments_for_output())
        }

        fn test_unpack(packed: Vec<u8>) -> bool {
            // Arbitrary input must fail cleanly or unpack to whole words.
            match unpack(&packed) {
                Ok(bytes) => bytes.len() % 8 == 0,
                Err(e) => e.kind == ErrorKind::PrematureEndOfPackedInput,
            }
        }
    }
}
