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

use anyptr::any_pointer::PointerType;
use anyptr::message::{self, ReaderOptions};
use anyptr::{any_pointer, any_struct, data, primitive_list, serialize, struct_list, text};

use crate::common::point;

#[test]
fn null_root() {
    let mut message = message::Builder::new_default();
    let root: any_pointer::Builder = message.get_root().unwrap();
    assert!(root.is_null());
    assert_eq!(root.get_pointer_type().unwrap(), PointerType::Null);
    assert!(!root.is_struct());
    assert!(!root.is_list());
    assert!(!root.is_capability());
    assert_eq!(root.target_size().unwrap().word_count, 0);

    let reader = message.get_root_as_reader::<any_pointer::Reader>().unwrap();
    assert!(reader.is_null());
    // A null pointer reads as the default value of any type.
    let p: point::Reader = reader.get_as().unwrap();
    assert_eq!(p.get_x(), 0);
    assert!(!p.has_label());
    assert_eq!(reader.get_as::<text::Reader>().unwrap(), "");
    assert!(reader.get_as::<data::Reader>().unwrap().is_empty());
}

#[test]
fn set_and_reinterpret() {
    let mut message = message::Builder::new_default();
    {
        let mut root: any_pointer::Builder = message.init_root();
        let mut p = root.reborrow().init_as::<point::Builder>();
        p.set_x(-3);
        p.set_y(4);
        p.set_label("origin");
        assert!(root.is_struct());
        assert_eq!(root.target_size().unwrap().word_count, 3);
    }

    let root = message.get_root_as_reader::<any_pointer::Reader>().unwrap();
    assert_eq!(root.get_pointer_type().unwrap(), PointerType::Struct);
    let p: point::Reader = root.get_as().unwrap();
    assert_eq!(p.get_x(), -3);
    assert_eq!(p.get_y(), 4);
    assert_eq!(p.get_label().unwrap(), "origin");

    // The same target viewed without a schema.
    let any: any_struct::Reader = root.get_as().unwrap();
    assert_eq!(any.get_data_section().len(), 8);
    assert_eq!(any.get_pointer_section().len(), 1);
    let label: text::Reader = any.get_pointer_section().get(0).get_as().unwrap();
    assert_eq!(label.to_str().unwrap(), "origin");

    // Asking for a list gives the empty default.
    let list: primitive_list::Reader<u32> = root.get_as().unwrap();
    assert!(list.is_empty());
}

#[test]
fn mismatched_builder_reinitializes() {
    let mut message = message::Builder::new_default();
    message.set_root("just text").unwrap();
    {
        let root: any_pointer::Builder = message.get_root().unwrap();
        assert!(root.is_list());
        let mut p: point::Builder = root.get_as().unwrap();
        assert_eq!(p.get_x(), 0);
        p.set_x(9);
    }
    let p: point::Reader = message.get_root_as_reader().unwrap();
    assert_eq!(p.get_x(), 9);
}

#[test]
fn set_copies_across_messages() {
    let mut source = message::Builder::new_default();
    {
        let mut p: point::Builder = source.init_root();
        p.set_x(1);
        p.set_label("copied");
    }

    let mut dest = message::Builder::new_default();
    {
        let mut root: any_pointer::Builder = dest.init_root();
        let from = source.get_root_as_reader::<any_pointer::Reader>().unwrap();
        root.set(from).unwrap();
    }

    // Changing the source afterwards leaves the copy alone.
    {
        let mut p: point::Builder = source.get_root().unwrap();
        p.set_x(2);
        p.reborrow().get_label().unwrap().clear();
    }

    let copy: point::Reader = dest.get_root_as_reader().unwrap();
    assert_eq!(copy.get_x(), 1);
    assert_eq!(copy.get_label().unwrap(), "copied");
    let original: point::Reader = source.get_root_as_reader().unwrap();
    assert_eq!(original.get_x(), 2);
}

#[test]
fn clear_releases_target() {
    let mut message = message::Builder::new_default();
    {
        let mut root: any_pointer::Builder = message.init_root();
        root.reborrow().set_as(&[1u8, 2, 3, 4, 5, 6, 7, 8, 9][..]).unwrap();
        assert!(root.is_list());
        root.clear();
        assert!(root.is_null());
        assert_eq!(root.get_pointer_type().unwrap(), PointerType::Null);
    }
    let segments = message.get_segments_for_output();
    let bytes = anyptr::message::ReaderSegments::get_segment(&segments, 0).unwrap();
    assert!(bytes.iter().all(|b| *b == 0));
}

#[test]
fn any_struct_and_list_initializers() {
    let mut message = message::Builder::new_default();
    {
        let root: any_pointer::Builder = message.init_root();
        let list = root.init_as_list_of_any_struct(1, 1, 3);
        assert_eq!(list.len(), 3);
        let element = list.get(2);
        let mut data = element.get_data_section();
        data.set(0, 0xab);
    }
    let root = message.get_root_as_reader::<any_pointer::Reader>().unwrap();
    let points: struct_list::Reader<point::Owned> = root.get_as().unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points.get(2).get_x(), 0xab);
    assert!(!points.get(2).has_label());

    {
        let root: any_pointer::Builder = message.init_root();
        let list = root.init_as_any_list(anyptr::any_list::ElementSize::TwoBytes, 4);
        assert_eq!(list.len(), 4);
        let mut words: primitive_list::Builder<u16> = list.downcast();
        words.set(3, 7);
    }
    let root = message.get_root_as_reader::<any_pointer::Reader>().unwrap();
    let halves: primitive_list::Reader<u16> = root.get_as().unwrap();
    assert_eq!(halves.iter().collect::<Vec<_>>(), vec![0, 0, 0, 7]);
}

#[test]
fn survives_serialization() {
    let mut message = message::Builder::new_default();
    {
        let root: any_pointer::Builder = message.init_root();
        let mut p = root.init_as::<point::Builder>();
        p.set_y(12);
        p.set_label("on the wire");
    }
    let mut bytes = Vec::new();
    serialize::write_message(&mut bytes, &message).unwrap();
    assert_eq!(
        bytes.len(),
        8 * serialize::compute_serialized_size_in_words(&message)
    );

    let reader = serialize::read_message(&bytes[..], ReaderOptions::new()).unwrap();
    let root: any_pointer::Reader = reader.get_root().unwrap();
    assert!(root.is_struct());
    let p: point::Reader = root.get_as().unwrap();
    assert_eq!(p.get_y(), 12);
    assert_eq!(p.get_label().unwrap(), "on the wire");
    assert_eq!(
        root.target_size().unwrap(),
        p.total_size().unwrap()
    );
}

#[test]
fn smaller_struct_grows_when_fetched_as_a_bigger_one() {
    let mut message = message::Builder::new_default();
    {
        let s = message.get_root_as_any().init_as_any_struct(1, 0);
        s.get_data_section().copy_from_slice(&[7, 0, 0, 0, 0, 0, 0, 0]);
    }
    {
        let mut p: point::Builder = message.get_root_as_any().get_as().unwrap();
        assert_eq!(p.get_x(), 7);
        p.set_label("grown");
    }

    let p: point::Reader = message.get_root_as_reader().unwrap();
    assert_eq!(p.get_x(), 7);
    assert_eq!(p.get_label().unwrap(), "grown");
    let any = any_struct::Reader::from(p);
    assert_eq!(any.get_pointer_section().len(), 1);
    assert_eq!(any.total_size().unwrap().word_count, 3);
}
