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

mod common;

use anyptr::message::{self, ReaderOptions};
use anyptr::{any_pointer, serialize, text, ErrorKind};

use crate::common::{node, point};

fn words(ws: &[u64]) -> Vec<u8> {
    ws.iter().flat_map(|w| w.to_le_bytes()).collect()
}

/// A two-segment message whose root is a far pointer to a `point` in the second segment.
fn two_segment_stream() -> Vec<u8> {
    let mut bytes = words(&[
        // segment count minus one, then the size of each segment
        1 | (1 << 32),
        4,
    ]);
    // segment 0: single far pointer to word 0 of segment 1
    bytes.extend(words(&[2 | (1 << 32)]));
    // segment 1: landing pad, data word, label pointer, label bytes
    bytes.extend(words(&[
        (1 << 32) | (1 << 48),
        5 | (6 << 32),
        1 | (((3 << 3) | 2) << 32),
        0x00_69_68,
    ]));
    bytes
}

#[test]
fn follows_far_pointer_across_segments() {
    let stream = two_segment_stream();
    let mut slice = &stream[..];
    let reader = serialize::read_message_from_flat_slice(&mut slice, ReaderOptions::new()).unwrap();
    assert!(slice.is_empty());

    let p: point::Reader = reader.get_root().unwrap();
    assert_eq!(p.get_x(), 5);
    assert_eq!(p.get_y(), 6);
    assert_eq!(p.get_label().unwrap(), "hi");

    let root: any_pointer::Reader = reader.get_root().unwrap();
    assert!(root.is_struct());
    assert_eq!(root.target_size().unwrap().word_count, 3);

    // Copying into a builder flattens the message into a single segment.
    let mut copy = message::Builder::new_default();
    copy.set_root(p).unwrap();
    let copied: point::Reader = copy.get_root_as_reader().unwrap();
    assert_eq!(copied.get_label().unwrap(), "hi");
    assert_eq!(copy.size_in_words(), 4);
}

#[test]
fn stream_and_flat_slice_agree() {
    let stream = two_segment_stream();
    let from_stream = serialize::read_message(&stream[..], ReaderOptions::new()).unwrap();
    let p: point::Reader = from_stream.get_root().unwrap();
    assert_eq!(p.get_label().unwrap(), "hi");
}

#[test]
fn truncated_stream() {
    let stream = two_segment_stream();
    let err = serialize::read_message(&stream[..stream.len() - 1], ReaderOptions::new())
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::PrematureEndOfFile);

    let mut slice = &stream[..stream.len() - 8];
    let err = serialize::read_message_from_flat_slice(&mut slice, ReaderOptions::new())
        .err()
        .unwrap();
    assert_eq!(err.kind, ErrorKind::MessageEndsPrematurely(5, 4));
}

#[test]
fn traversal_limit() {
    let stream = two_segment_stream();
    let mut options = ReaderOptions::new();
    options.traversal_limit_in_words(Some(3));
    let err = serialize::read_message(&stream[..], options).err().unwrap();
    assert_eq!(err.kind, ErrorKind::ReadLimitExceeded);
}

#[test]
fn nesting_limit() {
    let mut message = message::Builder::new_default();
    {
        let mut n: node::Builder = message.init_root();
        for value in 0..10 {
            n.set_value(value);
            n = n.init_next();
        }
    }
    let mut bytes = Vec::new();
    serialize::write_message(&mut bytes, &message).unwrap();

    let mut options = ReaderOptions::new();
    options.nesting_limit(4);
    let reader = serialize::read_message(&bytes[..], options).unwrap();
    let mut n: node::Reader = reader.get_root().unwrap();
    for _ in 0..3 {
        n = n.get_next().unwrap();
    }
    let err = n.get_next().err().unwrap();
    assert_eq!(err.kind, ErrorKind::MessageIsTooDeeplyNested);
}

#[test]
fn write_then_read_text_root() {
    let mut message = message::Builder::new_default();
    message.set_root("serialized").unwrap();
    let mut bytes = Vec::new();
    serialize::write_message(&mut bytes, &message).unwrap();
    // header, root pointer, two words of text
    assert_eq!(bytes.len(), 8 * 4);

    let reader = serialize::read_message(&bytes[..], ReaderOptions::new()).unwrap();
    let t: text::Reader = reader.get_root().unwrap();
    assert_eq!(t, "serialized");
}
