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

use crate::message::{HeapAllocator, ReaderOptions};
use crate::private::arena::{BuilderArena, BuilderArenaImpl, ReaderArenaImpl};
use crate::private::layout::{
    ElementSize, ListReader, PointerBuilder, PointerReader, PointerType, PrimitiveElement,
    StructSize, WirePointer, WirePointerKind,
};
use crate::ErrorKind;

fn struct_pointer(location: u32, target: u32, data: u16, pointers: u16) -> u64 {
    let mut p = WirePointer::default();
    p.set_kind_and_target(WirePointerKind::Struct, location, target);
    p.set_struct_size(StructSize { data, pointers });
    p.to_word()
}

fn list_pointer(location: u32, target: u32, size: ElementSize, count: u32) -> u64 {
    let mut p = WirePointer::default();
    p.set_kind_and_target(WirePointerKind::List, location, target);
    p.set_list_size_and_count(size, count);
    p.to_word()
}

fn far_pointer(double: bool, segment: u32, position: u32) -> u64 {
    let mut p = WirePointer::default();
    p.set_far(double, position);
    p.set_far_segment_id(segment);
    p.to_word()
}

fn segment(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn reader_arena(segments: Vec<Vec<u8>>) -> ReaderArenaImpl<Vec<Vec<u8>>> {
    ReaderArenaImpl::new(segments, ReaderOptions::new())
}

fn root(arena: &ReaderArenaImpl<Vec<Vec<u8>>>) -> PointerReader<'_> {
    PointerReader::get_root(arena, 0, 0, 64).unwrap()
}

fn u32_at(list: &ListReader, index: u32) -> u32 {
    <u32 as PrimitiveElement>::get(list, index)
}

#[test]
fn single_far_pointer() {
    let arena = reader_arena(vec![
        segment(&[far_pointer(false, 1, 1)]),
        segment(&[0, struct_pointer(1, 2, 1, 0), 0x1234]),
    ]);
    let s = root(&arena).get_struct().unwrap();
    assert_eq!(s.get_data_field::<u64>(0), 0x1234);
    assert_eq!(root(&arena).get_pointer_type().unwrap(), PointerType::Struct);
}

#[test]
fn double_far_pointer() {
    let mut tag = WirePointer::default();
    tag.set_kind_with_zero_offset(WirePointerKind::Struct);
    tag.set_struct_size(StructSize {
        data: 1,
        pointers: 0,
    });
    let arena = reader_arena(vec![
        segment(&[far_pointer(true, 1, 0)]),
        segment(&[far_pointer(false, 2, 0), tag.to_word()]),
        segment(&[42]),
    ]);
    let s = root(&arena).get_struct().unwrap();
    assert_eq!(s.get_data_field::<u64>(0), 42);
}

#[test]
fn far_pointer_landing_on_far_pointer() {
    let arena = reader_arena(vec![
        segment(&[far_pointer(false, 1, 0)]),
        segment(&[far_pointer(false, 0, 0)]),
    ]);
    let err = root(&arena).get_struct().err().unwrap();
    assert_eq!(err.kind, ErrorKind::UnexpectedFarPointer);
}

#[test]
fn far_pointer_to_missing_segment() {
    let arena = reader_arena(vec![segment(&[far_pointer(false, 7, 0)])]);
    let err = root(&arena).get_struct().err().unwrap();
    assert_eq!(err.kind, ErrorKind::InvalidSegmentId(7));
}

#[test]
fn out_of_bounds_struct() {
    let arena = reader_arena(vec![segment(&[struct_pointer(0, 6, 1, 0)])]);
    let err = root(&arena).get_struct().err().unwrap();
    assert_eq!(err.kind, ErrorKind::MessageContainsOutOfBoundsPointer);
}

#[test]
fn empty_struct_marker_is_not_null() {
    let arena = reader_arena(vec![segment(&[0xffff_fffc])]);
    let r = root(&arena);
    assert!(!r.is_null());
    assert_eq!(r.get_pointer_type().unwrap(), PointerType::Struct);
    let s = r.get_struct().unwrap();
    assert_eq!(s.get_data_section_size(), 0);
    assert_eq!(s.get_pointer_section_size(), 0);
}

#[test]
fn bit_list_read_as_byte_list() {
    let arena = reader_arena(vec![segment(&[
        list_pointer(0, 1, ElementSize::Bit, 10),
        0b11_1111_1010,
    ])]);
    assert!(root(&arena).get_list(ElementSize::Byte).unwrap().is_empty());

    let bits = root(&arena).get_list(ElementSize::Bit).unwrap();
    assert_eq!(bits.len(), 10);
    assert!(!<bool as PrimitiveElement>::get(&bits, 0));
    assert!(<bool as PrimitiveElement>::get(&bits, 1));
    assert!(<bool as PrimitiveElement>::get(&bits, 9));
}

#[test]
fn struct_list_read_as_primitive_list() {
    let mut tag = WirePointer::default();
    tag.set_kind_and_inline_composite_list_element_count(WirePointerKind::Struct, 2);
    tag.set_struct_size(StructSize {
        data: 1,
        pointers: 0,
    });
    let mut list = WirePointer::default();
    list.set_kind_and_target(WirePointerKind::List, 0, 1);
    list.set_list_inline_composite(2);
    let arena = reader_arena(vec![segment(&[
        list.to_word(),
        tag.to_word(),
        0xaaaa_0000_0007,
        9,
    ])]);

    let words = root(&arena).get_list(ElementSize::FourBytes).unwrap();
    assert_eq!(words.len(), 2);
    assert_eq!(u32_at(&words, 0), 7);
    assert_eq!(u32_at(&words, 1), 9);

    // No pointer section, so it can't be viewed as a list of pointers.
    assert!(root(&arena).get_list(ElementSize::Pointer).unwrap().is_empty());
    assert!(root(&arena).get_list(ElementSize::Bit).unwrap().is_empty());
}

#[test]
fn primitive_list_read_as_struct_list() {
    let arena = reader_arena(vec![segment(&[
        list_pointer(0, 1, ElementSize::FourBytes, 2),
        5 | (6 << 32),
    ])]);
    let list = root(&arena)
        .get_list(ElementSize::InlineComposite)
        .unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list.get_element_struct_size(), (32, 0));
    let second = list.get_struct_element(1);
    assert_eq!(second.get_data_field::<u32>(0), 6);
    // Reads past the element's data section yield zero.
    assert_eq!(second.get_data_field::<u32>(1), 0);
    assert!(second.get_pointer_field(0).is_null());
}

#[test]
fn capability_pointer_read_as_struct() {
    let mut cap = WirePointer::default();
    cap.set_cap(0);
    let arena = reader_arena(vec![segment(&[cap.to_word()])]);
    let r = root(&arena);
    assert_eq!(r.get_pointer_type().unwrap(), PointerType::Capability);
    let s = r.get_struct().unwrap();
    assert_eq!(s.get_data_section_size(), 0);
    assert!(r.get_list_any_size().unwrap().is_empty());
    assert_eq!(r.get_text().unwrap().len(), 0);
    // The message has no capability table.
    assert!(r.get_capability().is_err());
}

#[test]
fn struct_read_as_list_and_list_as_struct() {
    let arena = reader_arena(vec![segment(&[struct_pointer(0, 1, 1, 0), 77])]);
    assert!(root(&arena).get_list_any_size().unwrap().is_empty());
    assert!(root(&arena).get_data().unwrap().is_empty());

    let arena = reader_arena(vec![segment(&[
        list_pointer(0, 1, ElementSize::Byte, 3),
        0x00_63_62_61,
    ])]);
    assert_eq!(root(&arena).get_struct().unwrap().get_data_section_size(), 0);
    assert_eq!(&root(&arena).get_data().unwrap()[..], b"abc");
}

#[test]
fn nesting_limit_exhausted() {
    let arena = reader_arena(vec![segment(&[struct_pointer(0, 1, 0, 1), 0xffff_fffc])]);
    let r = PointerReader::get_root(&arena, 0, 0, 1).unwrap();
    let outer = r.get_struct().unwrap();
    let err = outer.get_pointer_field(0).get_struct().err().unwrap();
    assert_eq!(err.kind, ErrorKind::MessageIsTooDeeplyNested);
}

fn builder_arena() -> BuilderArenaImpl<HeapAllocator> {
    let arena = BuilderArenaImpl::new(HeapAllocator::new());
    arena.allocate(1);
    arena
}

#[test]
fn struct_upgrade_moves_fields() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);

    let mut small = root.reborrow().init_struct(StructSize {
        data: 1,
        pointers: 1,
    });
    small.set_data_field::<u64>(0, 11);
    small.get_pointer_field_mut(0).set_text("hi");
    let old_len = arena.len();

    let big = root
        .reborrow()
        .get_struct(StructSize {
            data: 2,
            pointers: 2,
        })
        .unwrap();
    assert_eq!(big.get_data_section_size(), 128);
    assert_eq!(big.get_pointer_section_size(), 2);
    assert_eq!(big.get_data_field::<u64>(0), 11);
    assert_eq!(big.get_data_field::<u64>(1), 0);
    assert_eq!(big.as_reader().get_pointer_field(0).get_text().unwrap(), "hi");
    assert!(big.get_pointer_field(1).is_null());

    // The old struct (words 1 and 2) has been zeroed. Its text stays where it was.
    assert_eq!(arena.get_word(1), 0);
    assert_eq!(arena.get_word(2), 0);
    assert_eq!(arena.len(), old_len + 4);

    // A smaller request returns the existing struct unchanged.
    let again = root
        .get_struct(StructSize {
            data: 1,
            pointers: 0,
        })
        .unwrap();
    assert_eq!(again.get_data_section_size(), 128);
    assert_eq!(arena.len(), old_len + 4);
}

#[test]
fn builder_reinitializes_mismatched_struct() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    root.set_text("not a struct");
    let s = root
        .reborrow()
        .get_struct(StructSize {
            data: 1,
            pointers: 0,
        })
        .unwrap();
    assert_eq!(s.get_data_field::<u64>(0), 0);
    assert_eq!(
        root.as_reader().get_pointer_type().unwrap(),
        PointerType::Struct
    );
}

#[test]
fn builder_list_mismatch_gives_unattached_list() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    root.reborrow().init_struct(StructSize {
        data: 1,
        pointers: 0,
    });
    let list = root.reborrow().get_list(ElementSize::FourBytes).unwrap();
    assert!(list.is_empty());
    // The struct is still there.
    assert_eq!(
        root.as_reader().get_pointer_type().unwrap(),
        PointerType::Struct
    );
}

#[test]
fn primitive_list_upgrades_to_struct_list() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    let words = root.reborrow().init_list(ElementSize::FourBytes, 3);
    for i in 0..3 {
        <u32 as PrimitiveElement>::set(&words, i, 100 + i);
    }

    let structs = root
        .reborrow()
        .get_struct_list(StructSize {
            data: 1,
            pointers: 1,
        })
        .unwrap();
    assert_eq!(structs.len(), 3);
    assert_eq!(structs.get_element_size(), ElementSize::InlineComposite);
    for i in 0..3 {
        let element = structs.get_struct_element(i);
        assert_eq!(element.get_data_field::<u32>(0), 100 + i);
        assert_eq!(element.get_data_field::<u32>(1), 0);
    }

    // The upgraded list still reads as a list of u32.
    let reader = root.as_reader().get_list(ElementSize::FourBytes).unwrap();
    assert_eq!(reader.len(), 3);
    assert_eq!(u32_at(&reader, 2), 102);
}

#[test]
fn pointer_list_upgrades_to_struct_list() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    let pointers = root.reborrow().init_list(ElementSize::Pointer, 2);
    pointers.get_pointer_element(0).set_text("zero");
    pointers.get_pointer_element(1).set_data(&[1, 2, 3]);

    let structs = root
        .reborrow()
        .get_struct_list(StructSize {
            data: 0,
            pointers: 1,
        })
        .unwrap();
    assert_eq!(structs.len(), 2);
    let reader = structs.into_reader();
    let first = reader.get_struct_element(0).get_pointer_field(0);
    assert_eq!(first.get_text().unwrap(), "zero");
    let second = reader.get_struct_element(1).get_pointer_field(0);
    assert_eq!(&second.get_data().unwrap()[..], &[1, 2, 3]);
}

#[test]
fn struct_list_grows_elements() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    let list = root.reborrow().init_struct_list(
        2,
        StructSize {
            data: 1,
            pointers: 0,
        },
    );
    list.get_struct_element(0).set_data_field::<u64>(0, 1);
    list.get_struct_element(1).set_data_field::<u64>(0, 2);

    let grown = root
        .reborrow()
        .get_struct_list(StructSize {
            data: 2,
            pointers: 1,
        })
        .unwrap();
    assert_eq!(grown.len(), 2);
    for i in 0..2 {
        let element = grown.get_struct_element(i);
        assert_eq!(element.get_data_section_size(), 128);
        assert_eq!(element.get_pointer_section_size(), 1);
        assert_eq!(element.get_data_field::<u64>(0), u64::from(i) + 1);
    }
    // Old tag and elements are zeroed.
    for word in 1..4 {
        assert_eq!(arena.get_word(word), 0);
    }
}

#[test]
fn bit_list_is_not_upgraded() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    let bits = root.reborrow().init_list(ElementSize::Bit, 5);
    <bool as PrimitiveElement>::set(&bits, 3, true);

    let structs = root
        .reborrow()
        .get_struct_list(StructSize {
            data: 1,
            pointers: 0,
        })
        .unwrap();
    assert!(structs.is_empty());

    let reader = root.as_reader().get_list(ElementSize::Bit).unwrap();
    assert_eq!(reader.len(), 5);
    assert!(<bool as PrimitiveElement>::get(&reader, 3));
}

#[test]
fn disown_and_adopt_move_the_object() {
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    let s = root.reborrow().init_struct(StructSize {
        data: 0,
        pointers: 2,
    });
    s.get_pointer_field(0).set_text("moved");

    let mut orphan = s.get_pointer_field(0).disown();
    assert!(s.get_pointer_field(0).is_null());
    assert!(!orphan.is_null());
    assert_eq!(orphan.as_pointer_reader().get_text().unwrap(), "moved");
    assert_eq!(
        orphan.as_pointer_builder().get_text().unwrap().len(),
        5
    );

    s.get_pointer_field(1).adopt(orphan);
    assert_eq!(
        s.into_reader().get_pointer_field(1).get_text().unwrap(),
        "moved"
    );
}

#[test]
fn copy_follows_far_pointers() {
    let reader = reader_arena(vec![
        segment(&[far_pointer(false, 1, 0)]),
        segment(&[list_pointer(0, 1, ElementSize::Byte, 3), 0x6968]),
    ]);
    let arena = builder_arena();
    let mut root = PointerBuilder::get_root(&arena, 0);
    root.copy_from(self::root(&reader)).unwrap();
    assert_eq!(root.as_reader().get_text().unwrap(), "hi");
    assert_eq!(root.as_reader().total_size().unwrap().word_count, 1);
}
