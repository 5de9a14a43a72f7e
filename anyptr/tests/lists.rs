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

use anyptr::message;
use anyptr::{any_pointer, any_pointer_list, primitive_list, struct_list, text};

use crate::common::point;

#[test]
fn independent_iterators() {
    let mut message = message::Builder::new_default();
    {
        let mut list: primitive_list::Builder<u32> = message.initn_root(5);
        for i in 0..5 {
            list.set(i, i * i);
        }
    }
    let list: primitive_list::Reader<u32> = message.get_root_as_reader().unwrap();

    let mut forward = list.iter();
    let mut backward = list.iter().rev();
    assert_eq!(forward.next(), Some(0));
    assert_eq!(backward.next(), Some(16));
    assert_eq!(forward.next(), Some(1));
    assert_eq!(forward.len(), 3);
    assert_eq!(backward.collect::<Vec<_>>(), vec![9, 4, 1, 0]);
    assert_eq!(forward.nth(1), Some(9));
    assert_eq!(forward.next(), Some(16));
    assert_eq!(forward.next(), None);
}

#[test]
fn bool_list() {
    let mut message = message::Builder::new_default();
    {
        let mut bits: primitive_list::Builder<bool> = message.initn_root(10);
        bits.set(0, true);
        bits.set(9, true);
        assert!(bits.get(9));
        bits.set(9, false);
        bits.set(8, true);
    }
    let bits: primitive_list::Reader<bool> = message.get_root_as_reader().unwrap();
    let expected = [true, false, false, false, false, false, false, false, true, false];
    assert_eq!(bits.iter().collect::<Vec<_>>(), expected);

    // A bit list has no room for anything wider.
    let bytes: primitive_list::Reader<u8> = message.get_root_as_reader().unwrap();
    assert!(bytes.is_empty());
}

#[test]
fn try_get_past_the_end() {
    let mut message = message::Builder::new_default();
    {
        let points: struct_list::Builder<point::Owned> = message.initn_root(2);
        assert!(points.try_get(2).is_none());
    }
    let points: struct_list::Reader<point::Owned> = message.get_root_as_reader().unwrap();
    assert!(points.try_get(1).is_some());
    assert!(points.try_get(2).is_none());
    let words: primitive_list::Reader<u64> = message.get_root_as_reader().unwrap();
    assert_eq!(words.try_get(1), Some(0));
    assert_eq!(words.try_get(2), None);
}

#[test]
#[should_panic(expected = "index 3 out of bounds for list of length 3")]
fn primitive_index_out_of_bounds() {
    let mut message = message::Builder::new_default();
    let list: primitive_list::Builder<i16> = message.initn_root(3);
    list.into_reader().get(3);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn struct_index_out_of_bounds() {
    let mut message = message::Builder::new_default();
    let list: struct_list::Builder<point::Owned> = message.initn_root(1);
    list.get(1);
}

#[test]
#[should_panic(expected = "out of bounds")]
fn pointer_index_out_of_bounds() {
    let mut message = message::Builder::new_default();
    let list: any_pointer_list::Builder = message.initn_root(0);
    list.into_reader().get(0);
}

#[test]
fn pointer_list_of_mixed_targets() {
    let mut message = message::Builder::new_default();
    {
        let mut list: any_pointer_list::Builder = message.initn_root(4);
        list.reborrow().get(0).set_as("text").unwrap();
        list.reborrow()
            .get(1)
            .init_as::<point::Builder>()
            .set_x(11);
        list.reborrow()
            .get(2)
            .initn_as::<primitive_list::Builder<u8>>(3);
    }

    let list: any_pointer_list::Reader = message.get_root_as_reader().unwrap();
    let kinds: Vec<_> = list
        .iter()
        .map(|element| element.get_pointer_type().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec![
            any_pointer::PointerType::List,
            any_pointer::PointerType::Struct,
            any_pointer::PointerType::List,
            any_pointer::PointerType::Null,
        ]
    );
    assert_eq!(list.get(0).get_as::<text::Reader>().unwrap(), "text");
    assert_eq!(list.get(1).get_as::<point::Reader>().unwrap().get_x(), 11);
    assert_eq!(
        list.get(2)
            .get_as::<primitive_list::Reader<u8>>()
            .unwrap()
            .len(),
        3
    );

    // Text is a byte list.
    let as_bytes: primitive_list::Reader<u8> = list.get(0).get_as().unwrap();
    assert_eq!(as_bytes.len(), 5);
}

#[test]
fn list_of_lists_through_any_pointer() {
    let mut message = message::Builder::new_default();
    {
        let mut outer: any_pointer_list::Builder = message.initn_root(2);
        for (i, len) in [2u32, 5].iter().enumerate() {
            let mut inner = outer
                .reborrow()
                .get(i as u32)
                .initn_as::<primitive_list::Builder<i64>>(*len);
            inner.set(len - 1, -(*len as i64));
        }
    }
    let outer: any_pointer_list::Reader = message.get_root_as_reader().unwrap();
    let lasts: Vec<i64> = outer
        .iter()
        .map(|inner| {
            let inner: primitive_list::Reader<i64> = inner.get_as().unwrap();
            inner.get(inner.len() - 1)
        })
        .collect();
    assert_eq!(lasts, vec![-2, -5]);
}
