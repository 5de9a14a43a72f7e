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
//! [standard stream framing](https://capnproto.org/encoding.html#serialization-over-a-stream).

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::message;
use crate::private::units::BYTES_PER_WORD;
use crate::{Error, ErrorKind, Result};

/// Segment tables with this many entries or more are rejected.
pub const SEGMENTS_COUNT_LIMIT: usize = 512;

/// Segments read from a single flat slice of bytes.
pub struct SliceSegments<'a> {
    bytes: &'a [u8],
    segment_slices: Vec<(usize, usize)>,
}

impl message::ReaderSegments for SliceSegments<'_> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        let (a, b) = *self.segment_slices.get(id as usize)?;
        Some(&self.bytes[a * BYTES_PER_WORD..b * BYTES_PER_WORD])
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads a serialized message from a slice of bytes, advancing `slice` past the end of
/// the message. The segments are borrowed, not copied.
pub fn read_message_from_flat_slice<'a>(
    slice: &mut &'a [u8],
    options: message::ReaderOptions,
) -> Result<message::Reader<SliceSegments<'a>>> {
    let all_bytes = *slice;
    let mut bytes = *slice;
    let (total_words, segment_slices) = read_segment_table(&mut bytes, options)?;
    let table_len = all_bytes.len() - bytes.len();
    let body_len = total_words * BYTES_PER_WORD;
    if bytes.len() < body_len {
        return Err(Error::from_kind(ErrorKind::MessageEndsPrematurely(
            total_words,
            bytes.len() / BYTES_PER_WORD,
        )));
    }
    *slice = &all_bytes[table_len + body_len..];
    Ok(message::Reader::new(
        SliceSegments {
            bytes: &all_bytes[table_len..table_len + body_len],
            segment_slices,
        },
        options,
    ))
}

/// Segments read from a stream into a single owned buffer.
pub struct OwnedSegments {
    segment_slices: Vec<(usize, usize)>,
    owned_space: Vec<u8>,
}

impl message::ReaderSegments for OwnedSegments {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        let (a, b) = *self.segment_slices.get(id as usize)?;
        Some(&self.owned_space[a * BYTES_PER_WORD..b * BYTES_PER_WORD])
    }

    fn len(&self) -> usize {
        self.segment_slices.len()
    }
}

/// Reads a serialized message from a stream with the provided options.
///
/// For optimal performance, `read` should be a buffered reader type.
pub fn read_message<R>(
    mut read: R,
    options: message::ReaderOptions,
) -> Result<message::Reader<OwnedSegments>>
where
    R: Read,
{
    let (total_words, segment_slices) = read_segment_table(&mut read, options)?;
    let mut owned_space = vec![0; total_words * BYTES_PER_WORD];
    read.read_exact(&mut owned_space)?;
    Ok(message::Reader::new(
        OwnedSegments {
            segment_slices,
            owned_space,
        },
        options,
    ))
}

/// Reads a segment table from `read` and returns the total number of words across all
/// segments, as well as the segment offsets.
///
/// The segment table format for streams is defined in the Cap'n Proto
/// [encoding spec](https://capnproto.org/encoding.html)
fn read_segment_table<R>(
    read: &mut R,
    options: message::ReaderOptions,
) -> Result<(usize, Vec<(usize, usize)>)>
where
    R: Read,
{
    let mut buf: [u8; 8] = [0; 8];

    // read the first Word, which contains segment_count and the 1st segment length
    read.read_exact(&mut buf)?;
    let segment_count = LittleEndian::read_u32(&buf[0..4]).wrapping_add(1) as usize;

    if segment_count >= SEGMENTS_COUNT_LIMIT {
        return Err(Error::from_kind(ErrorKind::MessageHasTooManySegments(
            segment_count,
        )));
    } else if segment_count == 0 {
        return Err(Error::from_kind(ErrorKind::InvalidNumberOfSegments(
            segment_count,
        )));
    }

    let mut segment_slices = Vec::with_capacity(segment_count);
    let mut total_words = LittleEndian::read_u32(&buf[4..8]) as usize;
    segment_slices.push((0, total_words));

    if segment_count > 1 {
        // The rest of the table is padded to a whole number of words.
        let mut segment_sizes = vec![0u8; (segment_count & !1) * 4];
        read.read_exact(&mut segment_sizes[..])?;
        for idx in 0..(segment_count - 1) {
            let segment_len =
                LittleEndian::read_u32(&segment_sizes[(idx * 4)..(idx + 1) * 4]) as usize;

            segment_slices.push((total_words, total_words + segment_len));
            total_words += segment_len;
        }
    }

    // Don't accept a message which the receiver couldn't possibly traverse without hitting the
    // traversal limit. Without this check, a malicious client could transmit a very large segment
    // size to make the receiver allocate excessive space and possibly crash.
    if let Some(limit) = options.traversal_limit_in_words {
        if total_words > limit {
            return Err(Error::from_kind(ErrorKind::ReadLimitExceeded).context(format!(
                "message has {total_words} words; see message::ReaderOptions to raise the limit"
            )));
        }
    }

    Ok((total_words, segment_slices))
}

/// Writes the provided message to `write`.
///
/// For optimal performance, `write` should be a buffered writer. `flush` will not be called on
/// the writer.
pub fn write_message<W, A>(write: W, message: &message::Builder<A>) -> Result<()>
where
    W: Write,
    A: message::Allocator,
{
    let segments = message.get_segments_for_output();
    write_message_segments(write, &segments)
}

pub fn write_message_segments<W, R>(mut write: W, segments: &R) -> Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    write_segment_table(&mut write, segments)?;
    write_segments(&mut write, segments)
}

/// Writes a segment table to `write`.
///
/// `segments` must contain at least one segment.
fn write_segment_table<W, R>(write: &mut W, segments: &R) -> Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    let segment_count = segments.len();
    let mut table = vec![0u8; (segment_count / 2 + 1) * BYTES_PER_WORD];
    LittleEndian::write_u32(&mut table[0..4], segment_count as u32 - 1);
    for idx in 0..segment_count {
        let len = segments.get_segment(idx as u32).map_or(0, |s| s.len() / BYTES_PER_WORD);
        LittleEndian::write_u32(&mut table[(idx + 1) * 4..(idx + 2) * 4], len as u32);
    }
    write.write_all(&table)?;
    Ok(())
}

/// Writes segments to `write`.
fn write_segments<W, R>(write: &mut W, segments: &R) -> Result<()>
where
    W: Write,
    R: message::ReaderSegments + ?Sized,
{
    for i in 0.. {
        if let Some(segment) = segments.get_segment(i) {
            write.write_all(segment)?;
        } else {
            break;
        }
    }
    Ok(())
}

/// Returns the number of words required to serialize the message.
pub fn compute_serialized_size_in_words<A>(message: &message::Builder<A>) -> usize
where
    A: message::Allocator,
{
    let segments = message.get_segments_for_output();
    let len = message::ReaderSegments::len(&segments);
    let mut size = (len / 2) + 1;
    for i in 0..len {
        if let Some(segment) = message::ReaderSegments::get_segment(&segments, i as u32) {
            size += segment.len() / BYTES_PER_WORD;
        }
    }
    size
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use quickcheck::{quickcheck, TestResult};

    use super::{read_message, read_message_from_flat_slice, read_segment_table, write_message_segments};
    use crate::message;
    use crate::message::ReaderSegments;

    #[test]
    fn read_segment_table_sizes() {
        let mut buf = vec![];

        buf.extend([
            0, 0, 0, 0, // 1 segments
            1, 0, 0, 0, // 1 length
        ]);
        let (words, segment_slices) =
            read_segment_table(&mut Cursor::new(&buf[..]), message::ReaderOptions::new()).unwrap();
        assert_eq!(1, words);
        assert_eq!(vec![(0, 1)], segment_slices);
        buf.clear();

        buf.extend([
            2, 0, 0, 0, // 3 segments
            1, 0, 0, 0, // 1 length
            1, 0, 0, 0, // 1 length
            0, 1, 0, 0, // 256 length
        ]);
        let (words, segment_slices) =
            read_segment_table(&mut Cursor::new(&buf[..]), message::ReaderOptions::new()).unwrap();
        assert_eq!(258, words);
        assert_eq!(vec![(0, 1), (1, 2), (2, 258)], segment_slices);
        buf.clear();

        buf.extend([
            3, 0, 0, 0, // 4 segments
            77, 0, 0, 0, // 77 length
            23, 0, 0, 0, // 23 length
            1, 0, 0, 0, // 1 length
            99, 0, 0, 0, // 99 length
            0, 0, 0, 0, // padding
        ]);
        let (words, segment_slices) =
            read_segment_table(&mut Cursor::new(&buf[..]), message::ReaderOptions::new()).unwrap();
        assert_eq!(200, words);
        assert_eq!(
            vec![(0, 77), (77, 100), (100, 101), (101, 200)],
            segment_slices
        );
    }

    #[test]
    fn read_invalid_segment_table() {
        let mut buf = vec![];

        buf.extend([0, 2, 0, 0]); // 513 segments
        buf.extend([0; 513 * 4]);
        assert!(
            read_segment_table(&mut Cursor::new(&buf[..]), message::ReaderOptions::new()).is_err()
        );
        buf.clear();

        buf.extend([0, 0, 0, 0]); // 1 segments
        assert!(
            read_segment_table(&mut Cursor::new(&buf[..]), message::ReaderOptions::new()).is_err()
        );
        buf.clear();

        buf.extend([255, 255, 255, 255, 0, 0, 0, 0]); // 0 segments
        assert!(
            read_segment_table(&mut Cursor::new(&buf[..]), message::ReaderOptions::new()).is_err()
        );
    }

    #[test]
    fn flat_slice_advances_past_message() {
        let segment = [7u8; 16];
        let segments: &[&[u8]] = &[&segment];
        let mut buf = Vec::new();
        write_message_segments(&mut buf, segments).unwrap();
        write_message_segments(&mut buf, segments).unwrap();
        assert_eq!(buf.len(), 2 * (8 + 16));

        let mut slice = &buf[..];
        let first = read_message_from_flat_slice(&mut slice, message::ReaderOptions::new()).unwrap();
        assert_eq!(slice.len(), 8 + 16);
        assert_eq!(first.into_segments().get_segment(0), Some(&segment[..]));

        let mut truncated = &buf[..20];
        assert!(read_message_from_flat_slice(&mut truncated, message::ReaderOptions::new()).is_err());
    }

    #[test]
    fn check_round_trip() {
        fn round_trip(segments: Vec<Vec<u64>>) -> TestResult {
            if segments.is_empty() {
                return TestResult::discard();
            }
            let segments: Vec<Vec<u8>> = segments
                .iter()
                .map(|words| words.iter().flat_map(|w| w.to_le_bytes()).collect())
                .collect();
            let mut cursor = Cursor::new(Vec::new());
            write_message_segments(&mut cursor, &segments).unwrap();
            cursor.set_position(0);

            let message = read_message(&mut cursor, message::ReaderOptions::new()).unwrap();
            let result_segments = message.into_segments();

            TestResult::from_bool(segments.iter().enumerate().all(|(i, segment)| {
                Some(&segment[..]) == result_segments.get_segment(i as u32)
            }))
        }

        quickcheck(round_trip as fn(Vec<Vec<u64>>) -> TestResult);
    }
}
