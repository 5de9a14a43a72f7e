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

//! The byte-level encoding of pointers, structs and lists.
//!
//! Builders address everything by word index into the single segment of a
//! `BuilderArena`; readers address words by segment id and word index so that
//! they can follow far pointers in messages that were built elsewhere.

use std::borrow::Cow;

use crate::data;
use crate::private::arena::{same_arena, BuilderArena, ReaderArena, SegmentId, NULL_ARENA};
use crate::private::capability::ClientHook;
use crate::private::primitive::Primitive;
use crate::private::units::*;
use crate::text;
use crate::{Error, ErrorKind, MessageSize, Result};

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementSize {
    Void = 0,
    Bit = 1,
    Byte = 2,
    TwoBytes = 3,
    FourBytes = 4,
    EightBytes = 5,
    Pointer = 6,
    InlineComposite = 7,
}

impl ElementSize {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Void,
            1 => Self::Bit,
            2 => Self::Byte,
            3 => Self::TwoBytes,
            4 => Self::FourBytes,
            5 => Self::EightBytes,
            6 => Self::Pointer,
            7 => Self::InlineComposite,
            _ => panic!("illegal element size: {val}"),
        }
    }
}

pub fn data_bits_per_element(size: ElementSize) -> BitCount32 {
    match size {
        ElementSize::Void => 0,
        ElementSize::Bit => 1,
        ElementSize::Byte => 8,
        ElementSize::TwoBytes => 16,
        ElementSize::FourBytes => 32,
        ElementSize::EightBytes => 64,
        ElementSize::Pointer => 0,
        ElementSize::InlineComposite => 0,
    }
}

pub fn pointers_per_element(size: ElementSize) -> WirePointerCount32 {
    match size {
        ElementSize::Pointer => 1,
        _ => 0,
    }
}

/// Shape of a struct: the number of words in its data section and the
/// number of pointers in its pointer section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StructSize {
    pub data: WordCount16,
    pub pointers: WirePointerCount16,
}

impl StructSize {
    pub fn total(&self) -> WordCount32 {
        u32::from(self.data) + u32::from(self.pointers) * WORDS_PER_POINTER as WordCount32
    }
}

const WORDS_PER_POINTER: WordCount = POINTER_SIZE_IN_WORDS;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WirePointerKind {
    Struct = 0,
    List = 1,
    Far = 2,
    Other = 3,
}

/// What a pointer slot refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerType {
    Null,
    Struct,
    List,
    Capability,
}

impl WirePointerKind {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Struct,
            1 => Self::List,
            2 => Self::Far,
            3 => Self::Other,
            _ => panic!("illegal wire pointer kind: {val}"),
        }
    }
}

/// One pointer, as it appears on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WirePointer {
    offset_and_kind: u32,
    upper32bits: u32,
}

impl WirePointer {
    #[inline]
    pub fn from_word(word: u64) -> Self {
        Self {
            offset_and_kind: word as u32,
            upper32bits: (word >> 32) as u32,
        }
    }

    #[inline]
    pub fn to_word(self) -> u64 {
        u64::from(self.offset_and_kind) | (u64::from(self.upper32bits) << 32)
    }

    #[inline]
    pub fn kind(&self) -> WirePointerKind {
        WirePointerKind::from(self.offset_and_kind as u8 & 3)
    }

    #[inline]
    pub fn is_positional(&self) -> bool {
        (self.offset_and_kind & 2) == 0 // match Struct and List but not Far and Other.
    }

    #[inline]
    pub fn is_capability(&self) -> bool {
        self.offset_and_kind == WirePointerKind::Other as u32
    }

    /// Signed distance in words from the end of the pointer to its target.
    #[inline]
    pub fn offset(&self) -> i32 {
        (self.offset_and_kind as i32) >> 2
    }

    /// Index of the target, for a positional pointer stored at `location`.
    #[inline]
    pub fn target(&self, location: WordIndex) -> i64 {
        i64::from(location) + 1 + i64::from(self.offset())
    }

    #[inline]
    pub fn set_kind_and_target(
        &mut self,
        kind: WirePointerKind,
        location: WordIndex,
        target: WordIndex,
    ) {
        let offset = (i64::from(target) - (i64::from(location) + 1)) as i32;
        self.offset_and_kind = ((offset << 2) as u32) | (kind as u32);
    }

    #[inline]
    pub fn set_kind_with_zero_offset(&mut self, kind: WirePointerKind) {
        self.offset_and_kind = kind as u32
    }

    #[inline]
    pub fn set_kind_and_target_for_empty_struct(&mut self) {
        //# This pointer points at an empty struct. Assuming the
        //# WirePointer itself is in-bounds, we can set the target to
        //# point either at the WirePointer itself or immediately after
        //# it. The latter would cause the WirePointer to be "null"
        //# (since for an empty struct the upper 32 bits are going to
        //# be zero). So we set an offset of -1, as if the struct were
        //# allocated immediately before this pointer, to distinguish
        //# it from null.

        self.offset_and_kind = 0xfffffffc;
    }

    #[inline]
    pub fn inline_composite_list_element_count(&self) -> ElementCount32 {
        self.offset_and_kind >> 2
    }

    #[inline]
    pub fn set_kind_and_inline_composite_list_element_count(
        &mut self,
        kind: WirePointerKind,
        element_count: ElementCount32,
    ) {
        self.offset_and_kind = (element_count << 2) | (kind as u32)
    }

    #[inline]
    pub fn far_position_in_segment(&self) -> WordIndex {
        self.offset_and_kind >> 3
    }

    #[inline]
    pub fn is_double_far(&self) -> bool {
        ((self.offset_and_kind >> 2) & 1) != 0
    }

    #[inline]
    pub fn set_far(&mut self, is_double_far: bool, pos: WordIndex) {
        self.offset_and_kind =
            (pos << 3) | (u32::from(is_double_far) << 2) | WirePointerKind::Far as u32;
    }

    #[inline]
    pub fn set_cap(&mut self, index: u32) {
        self.offset_and_kind = WirePointerKind::Other as u32;
        self.upper32bits = index;
    }

    #[inline]
    pub fn struct_data_size(&self) -> WordCount16 {
        self.upper32bits as WordCount16
    }

    #[inline]
    pub fn struct_ptr_count(&self) -> WirePointerCount16 {
        (self.upper32bits >> 16) as WirePointerCount16
    }

    #[inline]
    pub fn struct_word_size(&self) -> WordCount32 {
        u32::from(self.struct_data_size())
            + u32::from(self.struct_ptr_count()) * WORDS_PER_POINTER as u32
    }

    #[inline]
    pub fn set_struct_size(&mut self, size: StructSize) {
        self.upper32bits = u32::from(size.data) | (u32::from(size.pointers) << 16)
    }

    #[inline]
    pub fn set_struct_size_from_pieces(&mut self, ds: WordCount16, rc: WirePointerCount16) {
        self.set_struct_size(StructSize {
            data: ds,
            pointers: rc,
        })
    }

    #[inline]
    pub fn list_element_size(&self) -> ElementSize {
        ElementSize::from(self.upper32bits as u8 & 7)
    }

    #[inline]
    pub fn list_element_count(&self) -> ElementCount32 {
        self.upper32bits >> 3
    }

    #[inline]
    pub fn list_inline_composite_word_count(&self) -> WordCount32 {
        self.list_element_count()
    }

    #[inline]
    pub fn set_list_size_and_count(&mut self, es: ElementSize, ec: ElementCount32) {
        assert!(ec < (1 << 29), "Lists are limited to 2**29 elements");
        self.upper32bits = (ec << 3) | (es as u32);
    }

    #[inline]
    pub fn set_list_inline_composite(&mut self, wc: WordCount32) {
        assert!(
            wc < (1 << 29),
            "Inline composite lists are limited to 2**29 words"
        );
        self.upper32bits = (wc << 3) | (ElementSize::InlineComposite as u32);
    }

    #[inline]
    pub fn far_segment_id(&self) -> SegmentId {
        self.upper32bits as SegmentId
    }

    #[inline]
    pub fn set_far_segment_id(&mut self, si: SegmentId) {
        self.upper32bits = si
    }

    #[inline]
    pub fn cap_index(&self) -> u32 {
        self.upper32bits
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.offset_and_kind == 0 && self.upper32bits == 0
    }
}

mod wire_helpers {
    use std::borrow::Cow;

    use crate::data;
    use crate::private::arena::{BuilderArena, ReaderArena, SegmentId};
    use crate::private::capability::ClientHook;
    use crate::private::layout::{
        data_bits_per_element, pointers_per_element, ElementSize, ListBuilder, ListReader,
        StructBuilder, StructReader, StructSize, WirePointer, WirePointerKind,
    };
    use crate::private::units::*;
    use crate::text;
    use crate::{Error, ErrorKind, MessageSize, Result};

    #[inline]
    pub fn round_bytes_up_to_words(bytes: ByteCount32) -> WordCount32 {
        //# This code assumes 64-bit words.
        (bytes + 7) / BYTES_PER_WORD as u32
    }

    //# The maximum object size is 4GB - 1 byte. If measured in bits,
    //# this would overflow a 32-bit counter, so we need to accept
    //# BitCount64. However, 32 bits is enough for the returned
    //# ByteCounts and WordCounts.
    #[inline]
    pub fn round_bits_up_to_words(bits: BitCount64) -> WordCount32 {
        //# This code assumes 64-bit words.
        ((bits + 63) / (BITS_PER_WORD as u64)) as WordCount32
    }

    #[inline]
    pub fn round_bits_up_to_bytes(bits: BitCount64) -> ByteCount32 {
        ((bits + 7) / (BITS_PER_BYTE as u64)) as ByteCount32
    }

    #[inline]
    pub fn read_pointer(arena: &dyn BuilderArena, location: WordIndex) -> WirePointer {
        WirePointer::from_word(arena.get_word(location))
    }

    #[inline]
    pub fn write_pointer(arena: &dyn BuilderArena, location: WordIndex, pointer: WirePointer) {
        arena.set_word(location, pointer.to_word())
    }

    /// Rewrites the size half of the pointer at `location`.
    #[inline]
    fn update_pointer(
        arena: &dyn BuilderArena,
        location: WordIndex,
        f: impl FnOnce(&mut WirePointer),
    ) {
        let mut pointer = read_pointer(arena, location);
        f(&mut pointer);
        write_pointer(arena, location, pointer);
    }

    #[inline]
    fn read_wire_pointer(
        arena: &dyn ReaderArena,
        segment_id: SegmentId,
        location: WordIndex,
    ) -> Result<WirePointer> {
        Ok(WirePointer::from_word(arena.read_word(segment_id, location)?))
    }

    #[inline]
    fn target_index(pointer: &WirePointer, location: WordIndex) -> Result<WordIndex> {
        let target = pointer.target(location);
        if target < 0 || target > i64::from(u32::MAX) {
            Err(Error::from_kind(
                ErrorKind::MessageContainsOutOfBoundsPointer,
            ))
        } else {
            Ok(target as WordIndex)
        }
    }

    /// Allocates `amount` words and points the pointer at `reff` at them, first releasing
    /// whatever it used to point to. The size half of the pointer is left zeroed.
    pub fn allocate(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        amount: WordCount32,
        kind: WirePointerKind,
    ) -> WordIndex {
        if !read_pointer(arena, reff).is_null() {
            zero_object(arena, reff);
        }

        let mut pointer = WirePointer::default();
        if amount == 0 && kind == WirePointerKind::Struct {
            pointer.set_kind_and_target_for_empty_struct();
            write_pointer(arena, reff, pointer);
            return reff;
        }

        let target = arena.allocate(amount);
        pointer.set_kind_and_target(kind, reff, target);
        write_pointer(arena, reff, pointer);
        target
    }

    /// Zeroes the object that the pointer at `reff` points to, recursively. The pointer itself
    /// is left alone.
    pub fn zero_object(arena: &dyn BuilderArena, reff: WordIndex) {
        let pointer = read_pointer(arena, reff);
        match pointer.kind() {
            WirePointerKind::Struct | WirePointerKind::List => {
                let target = pointer.target(reff) as WordIndex;
                zero_object_helper(arena, pointer, target)
            }
            WirePointerKind::Far => {
                // Builders never emit far pointers; there is nothing of ours to release.
            }
            WirePointerKind::Other => {
                if pointer.is_capability() {
                    arena.drop_cap(pointer.cap_index());
                }
            }
        }
    }

    pub fn zero_object_helper(arena: &dyn BuilderArena, tag: WirePointer, ptr: WordIndex) {
        match tag.kind() {
            WirePointerKind::Other => {
                panic!("Don't know how to handle OTHER")
            }
            WirePointerKind::Struct => {
                let pointer_section = ptr + u32::from(tag.struct_data_size());
                let count = u32::from(tag.struct_ptr_count());
                for i in 0..count {
                    zero_object(arena, pointer_section + i);
                }
                arena.zero_words(ptr, tag.struct_word_size());
            }
            WirePointerKind::List => match tag.list_element_size() {
                ElementSize::Void => {}
                ElementSize::Bit
                | ElementSize::Byte
                | ElementSize::TwoBytes
                | ElementSize::FourBytes
                | ElementSize::EightBytes => arena.zero_words(
                    ptr,
                    round_bits_up_to_words(
                        u64::from(tag.list_element_count())
                            * u64::from(data_bits_per_element(tag.list_element_size())),
                    ),
                ),
                ElementSize::Pointer => {
                    let count = tag.list_element_count();
                    for i in 0..count {
                        zero_object(arena, ptr + i);
                    }
                    arena.zero_words(ptr, count);
                }
                ElementSize::InlineComposite => {
                    let element_tag = read_pointer(arena, ptr);

                    assert!(
                        element_tag.kind() == WirePointerKind::Struct,
                        "Don't know how to handle non-STRUCT inline composite"
                    );

                    let data_size = u32::from(element_tag.struct_data_size());
                    let pointer_count = u32::from(element_tag.struct_ptr_count());
                    let count = element_tag.inline_composite_list_element_count();

                    if pointer_count > 0 {
                        let mut pos = ptr + 1;
                        for _ in 0..count {
                            pos += data_size;
                            for _ in 0..pointer_count {
                                zero_object(arena, pos);
                                pos += 1;
                            }
                        }
                    }
                    arena.zero_words(ptr, element_tag.struct_word_size() * count + 1);
                }
            },
            WirePointerKind::Far => {
                panic!("Unexpected FAR pointer")
            }
        }
    }

    #[inline]
    pub fn zero_pointer(arena: &dyn BuilderArena, reff: WordIndex) {
        arena.set_word(reff, 0);
    }

    /// Resolves far pointers. Returns the pointer that describes the object (the tag), the
    /// index of the object's first word, and the segment it lives in.
    pub fn follow_fars(
        arena: &dyn ReaderArena,
        reff: WirePointer,
        location: WordIndex,
        segment_id: SegmentId,
    ) -> Result<(WirePointer, WordIndex, SegmentId)> {
        if reff.kind() != WirePointerKind::Far {
            return Ok((reff, target_index(&reff, location)?, segment_id));
        }

        let far_segment_id = reff.far_segment_id();
        let pad_words: usize = if reff.is_double_far() { 2 } else { 1 };
        let pad = reff.far_position_in_segment();
        arena.contains_interval(far_segment_id, pad, pad_words)?;
        let pad_pointer = read_wire_pointer(arena, far_segment_id, pad)?;

        if !reff.is_double_far() {
            if pad_pointer.kind() == WirePointerKind::Far {
                return Err(Error::from_kind(ErrorKind::UnexpectedFarPointer));
            }
            Ok((pad_pointer, target_index(&pad_pointer, pad)?, far_segment_id))
        } else {
            //# Landing pad is another far pointer. It is followed by a
            //# tag describing the pointed-to object.
            if pad_pointer.kind() != WirePointerKind::Far {
                return Err(Error::from_kind(
                    ErrorKind::DoubleFarPointersNotSupported,
                ));
            }
            let tag = read_wire_pointer(arena, far_segment_id, pad + 1)?;
            Ok((
                tag,
                pad_pointer.far_position_in_segment(),
                pad_pointer.far_segment_id(),
            ))
        }
    }

    pub fn total_size(
        arena: &dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
        nesting_limit: i32,
    ) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: 0,
            cap_count: 0,
        };

        let pointer = read_wire_pointer(arena, segment_id, reff)?;
        if pointer.is_null() {
            return Ok(result);
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
        }
        let nesting_limit = nesting_limit - 1;

        if pointer.kind() == WirePointerKind::Other {
            if pointer.is_capability() {
                result.cap_count += 1;
                return Ok(result);
            }
            return Err(Error::from_kind(ErrorKind::UnknownPointerType));
        }

        let (tag, ptr, segment_id) = follow_fars(arena, pointer, reff, segment_id)?;

        match tag.kind() {
            WirePointerKind::Struct => {
                arena.check_interval(segment_id, ptr, tag.struct_word_size() as usize)?;
                result.word_count += u64::from(tag.struct_word_size());

                let pointer_section = ptr + u32::from(tag.struct_data_size());
                for i in 0..u32::from(tag.struct_ptr_count()) {
                    result.plus_eq(total_size(
                        arena,
                        segment_id,
                        pointer_section + i,
                        nesting_limit,
                    )?);
                }
            }
            WirePointerKind::List => match tag.list_element_size() {
                ElementSize::Void => {}
                ElementSize::Bit
                | ElementSize::Byte
                | ElementSize::TwoBytes
                | ElementSize::FourBytes
                | ElementSize::EightBytes => {
                    let total_words = round_bits_up_to_words(
                        u64::from(tag.list_element_count())
                            * u64::from(data_bits_per_element(tag.list_element_size())),
                    );
                    arena.check_interval(segment_id, ptr, total_words as usize)?;
                    result.word_count += u64::from(total_words);
                }
                ElementSize::Pointer => {
                    let count = tag.list_element_count();
                    arena.check_interval(segment_id, ptr, count as usize)?;
                    result.word_count += u64::from(count);

                    for i in 0..count {
                        result.plus_eq(total_size(arena, segment_id, ptr + i, nesting_limit)?);
                    }
                }
                ElementSize::InlineComposite => {
                    let word_count = tag.list_inline_composite_word_count();
                    arena.check_interval(segment_id, ptr, word_count as usize + 1)?;

                    let element_tag = read_wire_pointer(arena, segment_id, ptr)?;
                    let count = element_tag.inline_composite_list_element_count();

                    if element_tag.kind() != WirePointerKind::Struct {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                        ));
                    }

                    let actual_size =
                        u64::from(element_tag.struct_word_size()) * u64::from(count);
                    if actual_size > u64::from(word_count) {
                        return Err(Error::from_kind(
                            ErrorKind::InlineCompositeListOverrunsItsWordCount,
                        ));
                    }

                    // Count the actual size rather than the claimed word count because
                    // that's what we end up with if we make a copy.
                    result.word_count += actual_size + POINTER_SIZE_IN_WORDS as u64;

                    let data_size = u32::from(element_tag.struct_data_size());
                    let pointer_count = u32::from(element_tag.struct_ptr_count());

                    if pointer_count > 0 {
                        let mut pos = ptr + POINTER_SIZE_IN_WORDS as u32;
                        for _ in 0..count {
                            pos += data_size;

                            for _ in 0..pointer_count {
                                result.plus_eq(total_size(arena, segment_id, pos, nesting_limit)?);
                                pos += 1;
                            }
                        }
                    }
                }
            },
            WirePointerKind::Far => {
                return Err(Error::from_kind(ErrorKind::UnexpectedFarPointer));
            }
            WirePointerKind::Other => {
                return Err(Error::from_kind(ErrorKind::UnknownPointerType));
            }
        }

        Ok(result)
    }

    /// Moves the pointer at `src` to `dst`. The object itself stays where it is. `src` is
    /// left untouched; the caller is responsible for zeroing it.
    pub fn transfer_pointer(arena: &dyn BuilderArena, dst: WordIndex, src: WordIndex) {
        //# Make *dst point to the same object as *src. Both must
        //# reside in the same message, but can be in different
        //# segments. Not always-inline because this is rarely used.
        //
        //# Caller MUST zero out the source pointer after calling this,
        //# to make sure no later code mistakenly thinks the source
        //# location still owns the object. transferPointer() doesn't
        //# do this zeroing itself because many callers transfer
        //# several pointers in a loop then zero out the whole section.

        let src_pointer = read_pointer(arena, src);
        if src_pointer.is_null() {
            zero_pointer(arena, dst);
        } else if src_pointer.is_positional() {
            let mut dst_pointer = src_pointer;
            if src_pointer.kind() == WirePointerKind::Struct && src_pointer.struct_word_size() == 0
            {
                dst_pointer.set_kind_and_target_for_empty_struct();
            } else {
                let target = src_pointer.target(src) as WordIndex;
                dst_pointer.set_kind_and_target(src_pointer.kind(), dst, target);
            }
            write_pointer(arena, dst, dst_pointer);
        } else {
            // Capabilities do not refer to a location and can be copied verbatim.
            write_pointer(arena, dst, src_pointer);
        }
    }

    pub fn init_struct_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        size: StructSize,
    ) -> StructBuilder<'_> {
        let ptr = allocate(arena, reff, size.total(), WirePointerKind::Struct);
        update_pointer(arena, reff, |p| p.set_struct_size(size));

        StructBuilder {
            arena,
            data: ptr as usize * BYTES_PER_WORD,
            pointers: ptr + u32::from(size.data),
            data_size: u32::from(size.data) * BITS_PER_WORD as u32,
            pointer_count: size.pointers,
        }
    }

    pub fn get_writable_struct_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        size: StructSize,
    ) -> Result<StructBuilder<'_>> {
        let pointer = read_pointer(arena, reff);
        if pointer.is_null() {
            return Ok(init_struct_pointer(arena, reff, size));
        }

        if pointer.kind() != WirePointerKind::Struct {
            log::debug!(
                "found {:?} pointer where struct pointer was expected; reinitializing",
                pointer.kind()
            );
            return Ok(init_struct_pointer(arena, reff, size));
        }

        let old_ptr = pointer.target(reff) as WordIndex;
        let old_data_size = pointer.struct_data_size();
        let old_pointer_count = pointer.struct_ptr_count();
        let old_pointer_section = old_ptr + u32::from(old_data_size);

        if old_data_size < size.data || old_pointer_count < size.pointers {
            //# The space allocated for this struct is too small.
            //# Unlike with readers, we can't just run with it and do
            //# bounds checks at access time, because how would we
            //# handle writes? Instead we have to copy the struct to a
            //# new space now.

            let new_data_size = core::cmp::max(old_data_size, size.data);
            let new_pointer_count = core::cmp::max(old_pointer_count, size.pointers);
            let total_size =
                u32::from(new_data_size)
                    + u32::from(new_pointer_count) * POINTER_SIZE_IN_WORDS as u32;

            //# Don't let allocate() zero out the object just yet.
            zero_pointer(arena, reff);

            let ptr = allocate(arena, reff, total_size, WirePointerKind::Struct);
            update_pointer(arena, reff, |p| {
                p.set_struct_size_from_pieces(new_data_size, new_pointer_count)
            });

            // Copy data section.
            arena.copy_words(old_ptr, ptr, u32::from(old_data_size));

            //# Copy pointer section.
            let new_pointer_section = ptr + u32::from(new_data_size);
            for i in 0..u32::from(old_pointer_count) {
                transfer_pointer(arena, new_pointer_section + i, old_pointer_section + i);
            }

            arena.zero_words(
                old_ptr,
                u32::from(old_data_size) + u32::from(old_pointer_count),
            );

            log::debug!(
                "upgraded struct from ({old_data_size}, {old_pointer_count}) to ({new_data_size}, {new_pointer_count})"
            );

            Ok(StructBuilder {
                arena,
                data: ptr as usize * BYTES_PER_WORD,
                pointers: new_pointer_section,
                data_size: u32::from(new_data_size) * BITS_PER_WORD as u32,
                pointer_count: new_pointer_count,
            })
        } else {
            Ok(StructBuilder {
                arena,
                data: old_ptr as usize * BYTES_PER_WORD,
                pointers: old_pointer_section,
                data_size: u32::from(old_data_size) * BITS_PER_WORD as u32,
                pointer_count: old_pointer_count,
            })
        }
    }

    pub fn init_list_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        element_count: ElementCount32,
        element_size: ElementSize,
    ) -> ListBuilder<'_> {
        assert!(
            element_size != ElementSize::InlineComposite,
            "Should have called init_struct_list_pointer() instead"
        );

        let data_size = data_bits_per_element(element_size);
        let pointer_count = pointers_per_element(element_size);
        let step = data_size + pointer_count * BITS_PER_POINTER as u32;
        let word_count = round_bits_up_to_words(u64::from(element_count) * u64::from(step));
        let ptr = allocate(arena, reff, word_count, WirePointerKind::List);

        update_pointer(arena, reff, |p| {
            p.set_list_size_and_count(element_size, element_count)
        });

        ListBuilder {
            arena,
            ptr: ptr as usize * BYTES_PER_WORD,
            step,
            element_count,
            element_size,
            struct_data_size: data_size,
            struct_pointer_count: pointer_count as u16,
        }
    }

    pub fn init_struct_list_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> ListBuilder<'_> {
        let words_per_element = element_size.total();

        //# Allocate the list, prefixed by a single WirePointer.
        let word_count: WordCount32 = element_count * words_per_element;
        let ptr = allocate(
            arena,
            reff,
            POINTER_SIZE_IN_WORDS as u32 + word_count,
            WirePointerKind::List,
        );

        //# Initialize the pointer.
        update_pointer(arena, reff, |p| p.set_list_inline_composite(word_count));

        let mut tag = WirePointer::default();
        tag.set_kind_and_inline_composite_list_element_count(
            WirePointerKind::Struct,
            element_count,
        );
        tag.set_struct_size(element_size);
        write_pointer(arena, ptr, tag);

        ListBuilder {
            arena,
            ptr: (ptr as usize + 1) * BYTES_PER_WORD,
            step: words_per_element * BITS_PER_WORD as u32,
            element_count,
            element_size: ElementSize::InlineComposite,
            struct_data_size: u32::from(element_size.data) * (BITS_PER_WORD as u32),
            struct_pointer_count: element_size.pointers,
        }
    }

    /// Builds a `ListBuilder` over the list the pointer at `reff` already points to.
    fn existing_list(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        pointer: WirePointer,
    ) -> Result<ListBuilder<'_>> {
        let ptr = pointer.target(reff) as WordIndex;
        let old_size = pointer.list_element_size();
        if old_size == ElementSize::InlineComposite {
            let tag = read_pointer(arena, ptr);
            if tag.kind() != WirePointerKind::Struct {
                return Err(Error::from_kind(
                    ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                ));
            }
            Ok(ListBuilder {
                arena,
                ptr: (ptr as usize + 1) * BYTES_PER_WORD,
                element_count: tag.inline_composite_list_element_count(),
                step: tag.struct_word_size() * BITS_PER_WORD as u32,
                struct_data_size: u32::from(tag.struct_data_size()) * BITS_PER_WORD as u32,
                struct_pointer_count: tag.struct_ptr_count(),
                element_size: ElementSize::InlineComposite,
            })
        } else {
            let data_size = data_bits_per_element(old_size);
            let pointer_count = pointers_per_element(old_size);
            Ok(ListBuilder {
                arena,
                ptr: ptr as usize * BYTES_PER_WORD,
                element_count: pointer.list_element_count(),
                step: data_size + pointer_count * BITS_PER_POINTER as u32,
                struct_data_size: data_size,
                struct_pointer_count: pointer_count as u16,
                element_size: old_size,
            })
        }
    }

    pub fn get_writable_list_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        element_size: ElementSize,
    ) -> Result<ListBuilder<'_>> {
        assert!(
            element_size != ElementSize::InlineComposite,
            "Use get_writable_struct_list_pointer() for struct lists"
        );

        let pointer = read_pointer(arena, reff);
        if pointer.is_null() {
            return Ok(ListBuilder::new_default(arena));
        }

        if pointer.kind() != WirePointerKind::List {
            log::debug!(
                "found {:?} pointer where list pointer was expected; using an empty list",
                pointer.kind()
            );
            return Ok(ListBuilder::new_default(arena));
        }

        let list = existing_list(arena, reff, pointer)?;
        let old_size = list.element_size;

        let compatible = if old_size == ElementSize::InlineComposite {
            //# The existing element size is InlineComposite, which
            //# means that it is at least two words, which makes it
            //# bigger than the expected element size. Since fields can
            //# only grow when upgraded, the existing data must have
            //# been written with a newer version of the protocol. We
            //# therefore never need to upgrade the data in this case,
            //# but we do need to validate that it is a valid upgrade
            //# from what we expected.
            match element_size {
                ElementSize::Void => true,
                ElementSize::Bit => false,
                ElementSize::Byte
                | ElementSize::TwoBytes
                | ElementSize::FourBytes
                | ElementSize::EightBytes => list.struct_data_size > 0,
                ElementSize::Pointer => list.struct_pointer_count > 0,
                ElementSize::InlineComposite => unreachable!(),
            }
        } else if element_size == ElementSize::Bit || old_size == ElementSize::Bit {
            element_size == old_size
        } else {
            list.struct_data_size >= data_bits_per_element(element_size)
                && u32::from(list.struct_pointer_count) >= pointers_per_element(element_size)
        };

        if compatible {
            Ok(list)
        } else {
            log::debug!(
                "existing list of {old_size:?} is incompatible with expected {element_size:?}; using an empty list"
            );
            Ok(ListBuilder::new_default(arena))
        }
    }

    pub fn get_writable_list_pointer_any_size(
        arena: &dyn BuilderArena,
        reff: WordIndex,
    ) -> Result<ListBuilder<'_>> {
        let pointer = read_pointer(arena, reff);
        if pointer.is_null() {
            return Ok(ListBuilder::new_default(arena));
        }

        if pointer.kind() != WirePointerKind::List {
            log::debug!(
                "found {:?} pointer where list pointer was expected; using an empty list",
                pointer.kind()
            );
            return Ok(ListBuilder::new_default(arena));
        }

        existing_list(arena, reff, pointer)
    }

    pub fn get_writable_struct_list_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        element_size: StructSize,
    ) -> Result<ListBuilder<'_>> {
        let pointer = read_pointer(arena, reff);
        if pointer.is_null() {
            let mut list = ListBuilder::new_default(arena);
            list.element_size = ElementSize::InlineComposite;
            return Ok(list);
        }

        if pointer.kind() != WirePointerKind::List {
            log::debug!(
                "found {:?} pointer where struct list pointer was expected; using an empty list",
                pointer.kind()
            );
            return Ok(ListBuilder::new_default(arena));
        }

        let old_ptr = pointer.target(reff) as WordIndex;
        let old_size = pointer.list_element_size();

        if old_size == ElementSize::InlineComposite {
            //# Existing list is InlineComposite, but we need to verify that the sizes match.

            let old_tag = read_pointer(arena, old_ptr);
            if old_tag.kind() != WirePointerKind::Struct {
                return Err(Error::from_kind(
                    ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                ));
            }

            let old_data_size = old_tag.struct_data_size();
            let old_pointer_count = old_tag.struct_ptr_count();
            let old_step = u32::from(old_data_size) + u32::from(old_pointer_count);
            let element_count = old_tag.inline_composite_list_element_count();

            if old_data_size >= element_size.data && old_pointer_count >= element_size.pointers {
                //# Old size is at least as large as we need. Ship it.
                return existing_list(arena, reff, pointer);
            }

            //# The structs in this list are smaller than expected,
            //# probably written using an older version of the
            //# protocol. We need to make a copy and expand them.

            let new_data_size = core::cmp::max(old_data_size, element_size.data);
            let new_pointer_count = core::cmp::max(old_pointer_count, element_size.pointers);
            let new_step = u32::from(new_data_size) + u32::from(new_pointer_count);
            let total_size = new_step * element_count;

            //# Don't let allocate() zero out the object just yet.
            zero_pointer(arena, reff);

            let new_ptr = allocate(arena, reff, total_size + 1, WirePointerKind::List);
            update_pointer(arena, reff, |p| p.set_list_inline_composite(total_size));

            let mut new_tag = WirePointer::default();
            new_tag.set_kind_and_inline_composite_list_element_count(
                WirePointerKind::Struct,
                element_count,
            );
            new_tag.set_struct_size_from_pieces(new_data_size, new_pointer_count);
            write_pointer(arena, new_ptr, new_tag);

            let mut src = old_ptr + 1;
            let mut dst = new_ptr + 1;
            for _ in 0..element_count {
                // Copy data section.
                arena.copy_words(src, dst, u32::from(old_data_size));

                // Copy pointer section.
                let new_pointer_section = dst + u32::from(new_data_size);
                let old_pointer_section = src + u32::from(old_data_size);
                for i in 0..u32::from(old_pointer_count) {
                    transfer_pointer(arena, new_pointer_section + i, old_pointer_section + i);
                }

                dst += new_step;
                src += old_step;
            }

            arena.zero_words(old_ptr, 1 + old_step * element_count);

            log::debug!(
                "upgraded struct list elements from ({old_data_size}, {old_pointer_count}) to ({new_data_size}, {new_pointer_count})"
            );

            return existing_list(arena, reff, read_pointer(arena, reff));
        }

        //# We're upgrading from a non-struct list.

        let old_data_size = data_bits_per_element(old_size);
        let old_pointer_count = pointers_per_element(old_size);
        let old_step = old_data_size + old_pointer_count * BITS_PER_POINTER as u32;
        let element_count = pointer.list_element_count();

        if old_size == ElementSize::Void {
            //# Nothing to copy, just allocate a new list.
            return Ok(init_struct_list_pointer(
                arena,
                reff,
                element_count,
                element_size,
            ));
        }

        if old_size == ElementSize::Bit {
            log::debug!(
                "found bit list where struct list was expected; upgrading boolean lists to structs is not supported"
            );
            return Ok(ListBuilder::new_default(arena));
        }

        let mut new_data_size = element_size.data;
        let mut new_pointer_count = element_size.pointers;

        if old_size == ElementSize::Pointer {
            new_pointer_count = core::cmp::max(new_pointer_count, 1);
        } else {
            //# Old list contains data elements, so we need at least one word of data.
            new_data_size = core::cmp::max(new_data_size, 1);
        }

        let new_step = u32::from(new_data_size) + u32::from(new_pointer_count);
        let total_words = element_count * new_step;

        //# Don't let allocate() zero out the object just yet.
        zero_pointer(arena, reff);

        let new_ptr = allocate(arena, reff, total_words + 1, WirePointerKind::List);
        update_pointer(arena, reff, |p| p.set_list_inline_composite(total_words));

        let mut tag = WirePointer::default();
        tag.set_kind_and_inline_composite_list_element_count(
            WirePointerKind::Struct,
            element_count,
        );
        tag.set_struct_size_from_pieces(new_data_size, new_pointer_count);
        write_pointer(arena, new_ptr, tag);

        let mut dst = new_ptr + 1;

        if old_size == ElementSize::Pointer {
            let mut src = old_ptr;
            for _ in 0..element_count {
                transfer_pointer(arena, dst + u32::from(new_data_size), src);
                dst += new_step;
                src += 1;
            }
        } else {
            let bytes_per_element = (old_data_size as usize) / BITS_PER_BYTE;
            let mut buf = [0u8; 8];
            for i in 0..element_count as usize {
                let src = old_ptr as usize * BYTES_PER_WORD + i * bytes_per_element;
                arena.read_into(src, &mut buf[..bytes_per_element]);
                arena.write_bytes(dst as usize * BYTES_PER_WORD, &buf[..bytes_per_element]);
                dst += new_step;
            }
        }

        //# Zero out old location.
        arena.zero_words(
            old_ptr,
            round_bits_up_to_words(u64::from(old_step) * u64::from(element_count)),
        );

        log::debug!("upgraded list of {old_size:?} to a struct list");

        existing_list(arena, reff, read_pointer(arena, reff))
    }

    pub fn init_text_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        size: ByteCount32,
    ) -> text::Builder<'_> {
        //# The byte list must include a NUL terminator.
        let byte_size = size + 1;

        //# Allocate the space.
        let ptr = allocate(
            arena,
            reff,
            round_bytes_up_to_words(byte_size),
            WirePointerKind::List,
        );

        //# Initialize the pointer.
        update_pointer(arena, reff, |p| {
            p.set_list_size_and_count(ElementSize::Byte, byte_size)
        });

        text::Builder::new(arena, ptr as usize * BYTES_PER_WORD, size, 0)
    }

    pub fn set_text_pointer(arena: &dyn BuilderArena, reff: WordIndex, value: &[u8]) {
        let mut builder = init_text_pointer(arena, reff, value.len() as u32);
        builder.push_bytes(value);
    }

    pub fn get_writable_text_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
    ) -> Result<text::Builder<'_>> {
        let pointer = read_pointer(arena, reff);
        if pointer.is_null() {
            return Ok(text::Builder::new(arena, 0, 0, 0));
        }

        if pointer.kind() != WirePointerKind::List
            || pointer.list_element_size() != ElementSize::Byte
        {
            log::debug!("found non-text pointer where text pointer was expected; using empty text");
            return Ok(text::Builder::new(arena, 0, 0, 0));
        }

        let ptr = pointer.target(reff) as WordIndex;
        let count = pointer.list_element_count();
        if count == 0 {
            return Err(Error::from_kind(ErrorKind::TextBlobMissingNULTerminator));
        }
        let start = ptr as usize * BYTES_PER_WORD;
        let mut last = [0u8];
        arena.read_into(start + count as usize - 1, &mut last);
        if last[0] != 0 {
            return Err(Error::from_kind(ErrorKind::TextBlobMissingNULTerminator));
        }

        //# Subtract 1 from the size for the NUL terminator.
        Ok(text::Builder::new(arena, start, count - 1, count - 1))
    }

    pub fn init_data_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        size: ByteCount32,
    ) -> data::Builder<'_> {
        //# Allocate the space.
        let ptr = allocate(
            arena,
            reff,
            round_bytes_up_to_words(size),
            WirePointerKind::List,
        );

        //# Initialize the pointer.
        update_pointer(arena, reff, |p| p.set_list_size_and_count(ElementSize::Byte, size));

        data::Builder::new(arena, ptr as usize * BYTES_PER_WORD, size)
    }

    pub fn set_data_pointer(arena: &dyn BuilderArena, reff: WordIndex, value: &[u8]) {
        let mut builder = init_data_pointer(arena, reff, value.len() as u32);
        builder.copy_from_slice(value);
    }

    pub fn get_writable_data_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
    ) -> Result<data::Builder<'_>> {
        let pointer = read_pointer(arena, reff);
        if pointer.is_null() {
            return Ok(data::Builder::new(arena, 0, 0));
        }

        if pointer.kind() != WirePointerKind::List
            || pointer.list_element_size() != ElementSize::Byte
        {
            log::debug!("found non-data pointer where data pointer was expected; using empty data");
            return Ok(data::Builder::new(arena, 0, 0));
        }

        let ptr = pointer.target(reff) as WordIndex;
        Ok(data::Builder::new(
            arena,
            ptr as usize * BYTES_PER_WORD,
            pointer.list_element_count(),
        ))
    }

    /// Deep-copies `value`, which may live in any message, into the pointer at `reff`.
    pub fn set_struct_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        value: &StructReader,
    ) -> Result<()> {
        let data_size: WordCount32 = round_bits_up_to_words(u64::from(value.data_size));
        let total_size: WordCount32 = data_size + u32::from(value.pointer_count);

        let ptr = allocate(arena, reff, total_size, WirePointerKind::Struct);
        update_pointer(arena, reff, |p| {
            p.set_struct_size_from_pieces(data_size as u16, value.pointer_count)
        });

        if value.data_size == 1 {
            arena.write_bytes(
                ptr as usize * BYTES_PER_WORD,
                &[u8::from(value.get_bool_field(0))],
            );
        } else {
            let bytes = value.data_size as usize / BITS_PER_BYTE;
            let mut src = vec![0u8; bytes];
            value.arena.read_exact(value.segment_id, value.data, &mut src)?;
            arena.write_bytes(ptr as usize * BYTES_PER_WORD, &src);
        }

        let pointer_section = ptr + data_size;
        for i in 0..u32::from(value.pointer_count) {
            copy_pointer(
                arena,
                pointer_section + i,
                &value.get_pointer_field(i as usize),
            )?;
        }

        Ok(())
    }

    pub fn set_capability_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        cap: Box<dyn ClientHook>,
    ) {
        if !read_pointer(arena, reff).is_null() {
            zero_object(arena, reff);
        }
        let mut pointer = WirePointer::default();
        pointer.set_cap(arena.inject_cap(cap));
        write_pointer(arena, reff, pointer);
    }

    /// Deep-copies `value`, which may live in any message, into the pointer at `reff`.
    pub fn set_list_pointer(
        arena: &dyn BuilderArena,
        reff: WordIndex,
        value: &ListReader,
    ) -> Result<()> {
        let total_size =
            round_bits_up_to_words(u64::from(value.element_count) * u64::from(value.step));

        match value.element_size {
            ElementSize::InlineComposite => {
                //# List of structs.
                let decl_data_size = value.struct_data_size / BITS_PER_WORD as u32;
                let decl_pointer_count = value.struct_pointer_count;
                let words_per_element = decl_data_size + u32::from(decl_pointer_count);
                let total_size = words_per_element * value.element_count;

                let ptr = allocate(arena, reff, total_size + 1, WirePointerKind::List);
                update_pointer(arena, reff, |p| p.set_list_inline_composite(total_size));

                let mut tag = WirePointer::default();
                tag.set_kind_and_inline_composite_list_element_count(
                    WirePointerKind::Struct,
                    value.element_count,
                );
                tag.set_struct_size_from_pieces(decl_data_size as u16, decl_pointer_count);
                write_pointer(arena, ptr, tag);

                let mut dst = ptr + 1;
                let mut src = vec![0u8; decl_data_size as usize * BYTES_PER_WORD];
                for i in 0..value.element_count {
                    let element = value.get_struct_element(i);
                    element
                        .arena
                        .read_exact(element.segment_id, element.data, &mut src)?;
                    arena.write_bytes(dst as usize * BYTES_PER_WORD, &src);
                    dst += decl_data_size;

                    for j in 0..decl_pointer_count {
                        copy_pointer(arena, dst, &element.get_pointer_field(j as usize))?;
                        dst += 1;
                    }
                }
            }
            ElementSize::Pointer => {
                //# List of pointers.
                let ptr = allocate(arena, reff, total_size, WirePointerKind::List);
                update_pointer(arena, reff, |p| {
                    p.set_list_size_and_count(ElementSize::Pointer, value.element_count)
                });
                for i in 0..value.element_count {
                    copy_pointer(arena, ptr + i, &value.get_pointer_element(i))?;
                }
            }
            element_size => {
                //# List of data.
                let ptr = allocate(arena, reff, total_size, WirePointerKind::List);
                update_pointer(arena, reff, |p| {
                    p.set_list_size_and_count(element_size, value.element_count)
                });
                let byte_count = round_bits_up_to_bytes(
                    u64::from(value.element_count) * u64::from(value.step),
                );
                let mut src = vec![0u8; byte_count as usize];
                value
                    .arena
                    .read_exact(value.segment_id, value.ptr, &mut src)?;
                arena.write_bytes(ptr as usize * BYTES_PER_WORD, &src);
            }
        }
        Ok(())
    }

    /// Deep-copies whatever `src` points to into the pointer at `dst`.
    pub fn copy_pointer(
        arena: &dyn BuilderArena,
        dst: WordIndex,
        src: &crate::private::layout::PointerReader,
    ) -> Result<()> {
        use crate::private::layout::PointerType;
        match src.get_pointer_type()? {
            PointerType::Null => {
                if !read_pointer(arena, dst).is_null() {
                    zero_object(arena, dst);
                }
                zero_pointer(arena, dst);
                Ok(())
            }
            PointerType::Struct => set_struct_pointer(arena, dst, &src.get_struct()?),
            PointerType::List => set_list_pointer(arena, dst, &src.get_list_any_size()?),
            PointerType::Capability => {
                set_capability_pointer(arena, dst, src.get_capability()?);
                Ok(())
            }
        }
    }

    pub fn read_struct_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
        nesting_limit: i32,
    ) -> Result<StructReader<'a>> {
        let pointer = read_wire_pointer(arena, segment_id, reff)?;
        if pointer.is_null() {
            return Ok(StructReader::new_default());
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
        }

        if pointer.kind() == WirePointerKind::Other {
            log::debug!("found capability pointer where struct pointer was expected; using default");
            return Ok(StructReader::new_default());
        }

        let (tag, ptr, segment_id) = follow_fars(arena, pointer, reff, segment_id)?;

        if tag.kind() != WirePointerKind::Struct {
            log::debug!(
                "found {:?} pointer where struct pointer was expected; using default",
                tag.kind()
            );
            return Ok(StructReader::new_default());
        }

        arena.contains_interval(segment_id, ptr, tag.struct_word_size() as usize)?;

        let data_size_words = u32::from(tag.struct_data_size());
        Ok(StructReader {
            arena,
            segment_id,
            data: ptr as usize * BYTES_PER_WORD,
            pointers: ptr + data_size_words,
            data_size: data_size_words * BITS_PER_WORD as u32,
            pointer_count: tag.struct_ptr_count(),
            nesting_limit: nesting_limit - 1,
        })
    }

    pub fn read_capability_pointer(
        arena: &dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
    ) -> Result<Box<dyn ClientHook>> {
        let pointer = read_wire_pointer(arena, segment_id, reff)?;
        if pointer.is_null() {
            Err(Error::from_kind(
                ErrorKind::MessageContainsNullCapabilityPointer,
            ))
        } else if !pointer.is_capability() {
            Err(Error::from_kind(
                ErrorKind::MessageContainsNonCapabilityPointerWhereCapabilityPointerWasExpected,
            ))
        } else {
            match arena.extract_cap(pointer.cap_index()) {
                Some(client_hook) => Ok(client_hook),
                None => Err(Error::from_kind(
                    ErrorKind::MessageContainsInvalidCapabilityPointer,
                )),
            }
        }
    }

    /// Reads a list. If `expected_element_size` is given and the list's actual encoding
    /// cannot be viewed as a list of that element size, the default (empty) list is returned.
    pub fn read_list_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
        expected_element_size: Option<ElementSize>,
        nesting_limit: i32,
    ) -> Result<ListReader<'a>> {
        let pointer = read_wire_pointer(arena, segment_id, reff)?;
        if pointer.is_null() {
            return Ok(ListReader::new_default());
        }

        if nesting_limit <= 0 {
            return Err(Error::from_kind(ErrorKind::MessageIsTooDeeplyNested));
        }

        if pointer.kind() == WirePointerKind::Other {
            log::debug!("found capability pointer where list pointer was expected; using default");
            return Ok(ListReader::new_default());
        }

        let (tag, ptr, segment_id) = follow_fars(arena, pointer, reff, segment_id)?;

        if tag.kind() != WirePointerKind::List {
            log::debug!(
                "found {:?} pointer where list pointer was expected; using default",
                tag.kind()
            );
            return Ok(ListReader::new_default());
        }

        match tag.list_element_size() {
            ElementSize::InlineComposite => {
                let word_count = tag.list_inline_composite_word_count();

                arena.contains_interval(segment_id, ptr, word_count as usize + 1)?;

                let element_tag = read_wire_pointer(arena, segment_id, ptr)?;
                if element_tag.kind() != WirePointerKind::Struct {
                    return Err(Error::from_kind(
                        ErrorKind::InlineCompositeListsOfNonStructTypeAreNotSupported,
                    ));
                }

                let size = element_tag.inline_composite_list_element_count();
                let data_size = element_tag.struct_data_size();
                let pointer_count = element_tag.struct_ptr_count();
                let words_per_element = element_tag.struct_word_size();

                if u64::from(size) * u64::from(words_per_element) > u64::from(word_count) {
                    return Err(Error::from_kind(
                        ErrorKind::InlineCompositeListOverrunsItsWordCount,
                    ));
                }

                if words_per_element == 0 {
                    //# Watch out for lists of zero-sized structs, which can claim to be
                    //# arbitrarily large without having sent actual data.
                    arena.amplified_read(u64::from(size))?;
                }

                //# If a struct list was not expected, then presumably
                //# a non-struct list was upgraded to a struct list.
                //# We need to manipulate the pointer to point at the
                //# first field of the struct. Together with the
                //# `step` field, this will allow the struct list to be
                //# accessed as if it were a primitive list without
                //# branching.

                //# Check whether the size is compatible.
                let compatible = match expected_element_size {
                    None | Some(ElementSize::Void) | Some(ElementSize::InlineComposite) => true,
                    Some(ElementSize::Bit) => false,
                    Some(ElementSize::Byte)
                    | Some(ElementSize::TwoBytes)
                    | Some(ElementSize::FourBytes)
                    | Some(ElementSize::EightBytes) => data_size > 0,
                    Some(ElementSize::Pointer) => pointer_count > 0,
                };

                if !compatible {
                    log::debug!(
                        "found struct list where {expected_element_size:?} list was expected; using default"
                    );
                    return Ok(ListReader::new_default());
                }

                Ok(ListReader {
                    arena,
                    segment_id,
                    ptr: (ptr as usize + 1) * BYTES_PER_WORD,
                    element_count: size,
                    element_size: ElementSize::InlineComposite,
                    step: words_per_element * BITS_PER_WORD as u32,
                    struct_data_size: u32::from(data_size) * BITS_PER_WORD as u32,
                    struct_pointer_count: pointer_count,
                    nesting_limit: nesting_limit - 1,
                })
            }
            element_size => {
                //# This is a primitive or pointer list, but all such
                //# lists can also be interpreted as struct lists. We
                //# need to compute the data size and pointer count for
                //# such structs.
                let data_size = data_bits_per_element(element_size);
                let pointer_count = pointers_per_element(element_size);
                let element_count = tag.list_element_count();
                let step = data_size + pointer_count * BITS_PER_POINTER as u32;

                let word_count =
                    round_bits_up_to_words(u64::from(element_count) * u64::from(step));
                arena.contains_interval(segment_id, ptr, word_count as usize)?;

                if element_size == ElementSize::Void {
                    //# Watch out for lists of void, which can claim to be arbitrarily large
                    //# without having sent actual data.
                    arena.amplified_read(u64::from(element_count))?;
                }

                if let Some(expected_element_size) = expected_element_size {
                    if element_size == ElementSize::Bit
                        && expected_element_size != ElementSize::Bit
                    {
                        log::debug!(
                            "found bit list where {expected_element_size:?} list was expected; using default"
                        );
                        return Ok(ListReader::new_default());
                    }

                    //# Verify that the elements are at least as large as
                    //# the expected type. Note that if we expected
                    //# InlineComposite, the expected sizes here will be
                    //# zero, because bounds checking will be performed at
                    //# field access time. So this check here is for the
                    //# case where we expected a list of some primitive or
                    //# pointer type.

                    let expected_data_bits_per_element =
                        data_bits_per_element(expected_element_size);
                    let expected_pointers_per_element =
                        pointers_per_element(expected_element_size);

                    if expected_data_bits_per_element > data_size
                        || expected_pointers_per_element > pointer_count
                    {
                        log::debug!(
                            "found {element_size:?} list where {expected_element_size:?} list was expected; using default"
                        );
                        return Ok(ListReader::new_default());
                    }
                }

                Ok(ListReader {
                    arena,
                    segment_id,
                    ptr: ptr as usize * BYTES_PER_WORD,
                    element_count,
                    element_size,
                    step,
                    struct_data_size: data_size,
                    struct_pointer_count: pointer_count as u16,
                    nesting_limit: nesting_limit - 1,
                })
            }
        }
    }

    /// Finds the bytes of a byte list, or returns `None` (after logging) if the pointer
    /// refers to something else.
    fn read_byte_list(
        arena: &dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
        what: &str,
    ) -> Result<Option<(SegmentId, WordIndex, ElementCount32)>> {
        let pointer = read_wire_pointer(arena, segment_id, reff)?;
        if pointer.is_null() {
            return Ok(None);
        }
        if pointer.kind() == WirePointerKind::Other {
            log::debug!("found capability pointer where {what} was expected; using default");
            return Ok(None);
        }

        let (tag, ptr, segment_id) = follow_fars(arena, pointer, reff, segment_id)?;

        if tag.kind() != WirePointerKind::List || tag.list_element_size() != ElementSize::Byte {
            log::debug!("found non-byte-list pointer where {what} was expected; using default");
            return Ok(None);
        }

        let size = tag.list_element_count();
        arena.contains_interval(segment_id, ptr, round_bytes_up_to_words(size) as usize)?;
        Ok(Some((segment_id, ptr, size)))
    }

    pub fn read_text_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
    ) -> Result<text::Reader<'a>> {
        let Some((segment_id, ptr, size)) = read_byte_list(arena, segment_id, reff, "text")?
        else {
            return Ok(text::Reader::default());
        };

        if size == 0 {
            return Err(Error::from_kind(ErrorKind::TextBlobMissingNULTerminator));
        }

        let bytes = arena.read_bytes(segment_id, ptr as usize * BYTES_PER_WORD, size as usize)?;
        if bytes[size as usize - 1] != 0 {
            return Err(Error::from_kind(ErrorKind::TextBlobMissingNULTerminator));
        }

        //# Subtract 1 from the size for the NUL terminator.
        let len = size as usize - 1;
        let bytes = match bytes {
            Cow::Borrowed(b) => Cow::Borrowed(&b[..len]),
            Cow::Owned(mut v) => {
                v.truncate(len);
                Cow::Owned(v)
            }
        };
        Ok(text::Reader::from_bytes(bytes))
    }

    pub fn read_data_pointer<'a>(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        reff: WordIndex,
    ) -> Result<data::Reader<'a>> {
        let Some((segment_id, ptr, size)) = read_byte_list(arena, segment_id, reff, "data")?
        else {
            return Ok(Cow::Borrowed(&[]));
        };

        arena.read_bytes(segment_id, ptr as usize * BYTES_PER_WORD, size as usize)
    }
}

#[derive(Clone, Copy)]
pub struct PointerReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    pointer: Option<WordIndex>,
    nesting_limit: i32,
}

impl<'a> PointerReader<'a> {
    pub fn new_default<'b>() -> PointerReader<'b> {
        PointerReader {
            arena: &NULL_ARENA,
            segment_id: 0,
            pointer: None,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn get_root(
        arena: &'a dyn ReaderArena,
        segment_id: SegmentId,
        location: WordIndex,
        nesting_limit: i32,
    ) -> Result<Self> {
        arena.contains_interval(segment_id, location, POINTER_SIZE_IN_WORDS)?;
        Ok(PointerReader {
            arena,
            segment_id,
            pointer: Some(location),
            nesting_limit,
        })
    }

    fn wire_pointer(&self) -> Result<Option<(WordIndex, WirePointer)>> {
        match self.pointer {
            None => Ok(None),
            Some(location) => {
                let word = self.arena.read_word(self.segment_id, location)?;
                Ok(Some((location, WirePointer::from_word(word))))
            }
        }
    }

    pub fn is_null(&self) -> bool {
        match self.wire_pointer() {
            Ok(Some((_, pointer))) => pointer.is_null(),
            _ => true,
        }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        match self.pointer {
            None => Ok(MessageSize {
                word_count: 0,
                cap_count: 0,
            }),
            Some(location) => wire_helpers::total_size(
                self.arena,
                self.segment_id,
                location,
                self.nesting_limit,
            ),
        }
    }

    pub fn get_pointer_type(&self) -> Result<PointerType> {
        let Some((location, pointer)) = self.wire_pointer()? else {
            return Ok(PointerType::Null);
        };
        if pointer.is_null() {
            return Ok(PointerType::Null);
        }
        let tag = match pointer.kind() {
            WirePointerKind::Far => {
                wire_helpers::follow_fars(self.arena, pointer, location, self.segment_id)?.0
            }
            _ => pointer,
        };
        match tag.kind() {
            WirePointerKind::Struct => Ok(PointerType::Struct),
            WirePointerKind::List => Ok(PointerType::List),
            WirePointerKind::Other if tag.is_capability() => Ok(PointerType::Capability),
            _ => Err(Error::from_kind(ErrorKind::UnknownPointerType)),
        }
    }

    pub fn get_struct(&self) -> Result<StructReader<'a>> {
        match self.pointer {
            None => Ok(StructReader::new_default()),
            Some(location) => wire_helpers::read_struct_pointer(
                self.arena,
                self.segment_id,
                location,
                self.nesting_limit,
            ),
        }
    }

    pub fn get_list(&self, expected_element_size: ElementSize) -> Result<ListReader<'a>> {
        self.read_list(Some(expected_element_size))
    }

    pub fn get_list_any_size(&self) -> Result<ListReader<'a>> {
        self.read_list(None)
    }

    fn read_list(&self, expected_element_size: Option<ElementSize>) -> Result<ListReader<'a>> {
        match self.pointer {
            None => Ok(ListReader::new_default()),
            Some(location) => wire_helpers::read_list_pointer(
                self.arena,
                self.segment_id,
                location,
                expected_element_size,
                self.nesting_limit,
            ),
        }
    }

    pub fn get_text(&self) -> Result<text::Reader<'a>> {
        match self.pointer {
            None => Ok(text::Reader::default()),
            Some(location) => {
                wire_helpers::read_text_pointer(self.arena, self.segment_id, location)
            }
        }
    }

    pub fn get_data(&self) -> Result<data::Reader<'a>> {
        match self.pointer {
            None => Ok(Cow::Borrowed(&[])),
            Some(location) => {
                wire_helpers::read_data_pointer(self.arena, self.segment_id, location)
            }
        }
    }

    pub fn get_capability(&self) -> Result<Box<dyn ClientHook>> {
        match self.pointer {
            None => Err(Error::from_kind(
                ErrorKind::MessageContainsNullCapabilityPointer,
            )),
            Some(location) => {
                wire_helpers::read_capability_pointer(self.arena, self.segment_id, location)
            }
        }
    }
}

pub struct PointerBuilder<'a> {
    arena: &'a dyn BuilderArena,
    pointer: WordIndex,
}

impl<'a> PointerBuilder<'a> {
    #[inline]
    pub fn get_root(arena: &'a dyn BuilderArena, location: WordIndex) -> Self {
        PointerBuilder {
            arena,
            pointer: location,
        }
    }

    #[inline]
    pub fn reborrow(&mut self) -> PointerBuilder<'_> {
        PointerBuilder {
            arena: self.arena,
            pointer: self.pointer,
        }
    }

    pub fn arena(&self) -> &'a dyn BuilderArena {
        self.arena
    }

    pub fn is_null(&self) -> bool {
        self.arena.get_word(self.pointer) == 0
    }

    pub fn get_struct(self, size: StructSize) -> Result<StructBuilder<'a>> {
        wire_helpers::get_writable_struct_pointer(self.arena, self.pointer, size)
    }

    pub fn get_list(self, element_size: ElementSize) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_list_pointer(self.arena, self.pointer, element_size)
    }

    pub fn get_list_any_size(self) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_list_pointer_any_size(self.arena, self.pointer)
    }

    pub fn get_struct_list(self, element_size: StructSize) -> Result<ListBuilder<'a>> {
        wire_helpers::get_writable_struct_list_pointer(self.arena, self.pointer, element_size)
    }

    pub fn get_text(self) -> Result<text::Builder<'a>> {
        wire_helpers::get_writable_text_pointer(self.arena, self.pointer)
    }

    pub fn get_data(self) -> Result<data::Builder<'a>> {
        wire_helpers::get_writable_data_pointer(self.arena, self.pointer)
    }

    pub fn get_capability(&self) -> Result<Box<dyn ClientHook>> {
        wire_helpers::read_capability_pointer(self.arena.as_reader(), 0, self.pointer)
    }

    pub fn init_struct(self, size: StructSize) -> StructBuilder<'a> {
        wire_helpers::init_struct_pointer(self.arena, self.pointer, size)
    }

    pub fn init_list(
        self,
        element_size: ElementSize,
        element_count: ElementCount32,
    ) -> ListBuilder<'a> {
        wire_helpers::init_list_pointer(self.arena, self.pointer, element_count, element_size)
    }

    pub fn init_struct_list(
        self,
        element_count: ElementCount32,
        element_size: StructSize,
    ) -> ListBuilder<'a> {
        wire_helpers::init_struct_list_pointer(
            self.arena,
            self.pointer,
            element_count,
            element_size,
        )
    }

    pub fn init_text(self, size: ByteCount32) -> text::Builder<'a> {
        wire_helpers::init_text_pointer(self.arena, self.pointer, size)
    }

    pub fn init_data(self, size: ByteCount32) -> data::Builder<'a> {
        wire_helpers::init_data_pointer(self.arena, self.pointer, size)
    }

    pub fn set_struct(&mut self, value: &StructReader) -> Result<()> {
        wire_helpers::set_struct_pointer(self.arena, self.pointer, value)
    }

    pub fn set_list(&mut self, value: &ListReader) -> Result<()> {
        wire_helpers::set_list_pointer(self.arena, self.pointer, value)
    }

    pub fn set_text(&mut self, value: &str) {
        wire_helpers::set_text_pointer(self.arena, self.pointer, value.as_bytes())
    }

    pub fn set_data(&mut self, value: &[u8]) {
        wire_helpers::set_data_pointer(self.arena, self.pointer, value)
    }

    pub fn set_capability(&mut self, cap: Box<dyn ClientHook>) {
        wire_helpers::set_capability_pointer(self.arena, self.pointer, cap)
    }

    /// Deep-copies whatever `other` points to, replacing the current value.
    pub fn copy_from(&mut self, other: PointerReader) -> Result<()> {
        wire_helpers::copy_pointer(self.arena, self.pointer, &other)
    }

    pub fn clear(&mut self) {
        wire_helpers::zero_object(self.arena, self.pointer);
        wire_helpers::zero_pointer(self.arena, self.pointer);
    }

    /// Detaches the object from this pointer, leaving the pointer null. The object's
    /// storage stays where it is.
    pub fn disown(&mut self) -> OrphanBuilder<'a> {
        let anchor = self.arena.allocate_anchor();
        wire_helpers::transfer_pointer(self.arena, anchor, self.pointer);
        wire_helpers::zero_pointer(self.arena, self.pointer);
        log::trace!("disowned object at word {} into anchor {anchor}", self.pointer);
        OrphanBuilder {
            arena: self.arena,
            anchor,
        }
    }

    /// Makes this pointer refer to the orphan's object, releasing whatever it used to
    /// point to.
    ///
    /// # Panics
    ///
    /// If the orphan was created by a different message.
    pub fn adopt(&mut self, orphan: OrphanBuilder<'a>) {
        assert!(
            same_arena(self.arena, orphan.arena),
            "tried to adopt an orphan that belongs to a different message"
        );
        let anchor = orphan.into_anchor();
        if !wire_helpers::read_pointer(self.arena, self.pointer).is_null() {
            wire_helpers::zero_object(self.arena, self.pointer);
        }
        wire_helpers::transfer_pointer(self.arena, self.pointer, anchor);
        self.arena.release_anchor(anchor);
        log::trace!("adopted anchor {anchor} into word {}", self.pointer);
    }

    pub fn into_reader(self) -> PointerReader<'a> {
        PointerReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            pointer: Some(self.pointer),
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn as_reader(&self) -> PointerReader<'_> {
        PointerReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            pointer: Some(self.pointer),
            nesting_limit: 0x7fffffff,
        }
    }
}

/// Owner of an object that is not reachable from the message root.
///
/// The object is referred to by a one-word anchor taken from the arena. Dropping the
/// `OrphanBuilder` zeroes the object and returns the anchor.
pub struct OrphanBuilder<'a> {
    arena: &'a dyn BuilderArena,
    anchor: WordIndex,
}

impl<'a> OrphanBuilder<'a> {
    /// Creates a null orphan.
    pub fn new(arena: &'a dyn BuilderArena) -> Self {
        OrphanBuilder {
            arena,
            anchor: arena.allocate_anchor(),
        }
    }

    pub fn arena(&self) -> &'a dyn BuilderArena {
        self.arena
    }

    pub fn is_null(&self) -> bool {
        self.arena.get_word(self.anchor) == 0
    }

    pub fn as_pointer_builder(&mut self) -> PointerBuilder<'_> {
        PointerBuilder {
            arena: self.arena,
            pointer: self.anchor,
        }
    }

    pub fn as_pointer_reader(&self) -> PointerReader<'_> {
        PointerReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            pointer: Some(self.anchor),
            nesting_limit: 0x7fffffff,
        }
    }

    /// Gives up ownership without releasing anything.
    fn into_anchor(self) -> WordIndex {
        let anchor = self.anchor;
        core::mem::forget(self);
        anchor
    }
}

impl Drop for OrphanBuilder<'_> {
    fn drop(&mut self) {
        if !self.is_null() {
            wire_helpers::zero_object(self.arena, self.anchor);
            log::trace!("released unadopted orphan at anchor {}", self.anchor);
        }
        self.arena.release_anchor(self.anchor);
    }
}

#[derive(Clone, Copy)]
pub struct StructReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    data: ByteCount,
    pointers: WordIndex,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
    nesting_limit: i32,
}

impl<'a> StructReader<'a> {
    pub fn new_default<'b>() -> StructReader<'b> {
        StructReader {
            arena: &NULL_ARENA,
            segment_id: 0,
            data: 0,
            pointers: 0,
            data_size: 0,
            pointer_count: 0,
            nesting_limit: 0x7fffffff,
        }
    }

    /// Size of the data section, in bits.
    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    pub fn get_data_section_as_blob(&self) -> Cow<'a, [u8]> {
        let len = wire_helpers::round_bits_up_to_bytes(u64::from(self.data_size)) as usize;
        self.arena
            .read_bytes(self.segment_id, self.data, len)
            .unwrap_or(Cow::Borrowed(&[]))
    }

    /// Reads the `offset`th value of type `T` in the data section. Values past the end of
    /// the section read as zero.
    #[inline]
    pub fn get_data_field<T: Primitive>(&self, offset: ElementCount) -> T {
        let zero = T::read(&[0; 8][..T::SIZE]);
        if (offset + 1) * T::SIZE * BITS_PER_BYTE > self.data_size as usize {
            return zero;
        }
        let mut bytes = [0u8; 8];
        match self.arena.read_exact(
            self.segment_id,
            self.data + offset * T::SIZE,
            &mut bytes[..T::SIZE],
        ) {
            Ok(()) => T::read(&bytes[..T::SIZE]),
            Err(_) => zero,
        }
    }

    #[inline]
    pub fn get_bool_field(&self, offset: ElementCount) -> bool {
        if offset >= self.data_size as usize {
            return false;
        }
        let mut byte = [0u8];
        match self
            .arena
            .read_exact(self.segment_id, self.data + offset / BITS_PER_BYTE, &mut byte)
        {
            Ok(()) => (byte[0] & (1u8 << (offset % BITS_PER_BYTE))) != 0,
            Err(_) => false,
        }
    }

    pub fn get_pointer_field(&self, ptr_index: WirePointerCount) -> PointerReader<'a> {
        if ptr_index < self.pointer_count as usize {
            PointerReader {
                arena: self.arena,
                segment_id: self.segment_id,
                pointer: Some(self.pointers + ptr_index as u32),
                nesting_limit: self.nesting_limit,
            }
        } else {
            PointerReader::new_default()
        }
    }

    /// Views the pointer section as a list of pointers.
    pub fn get_pointer_section_as_list(&self) -> ListReader<'a> {
        ListReader {
            arena: self.arena,
            segment_id: self.segment_id,
            ptr: self.pointers as usize * BYTES_PER_WORD,
            element_count: u32::from(self.pointer_count),
            element_size: ElementSize::Pointer,
            step: BITS_PER_POINTER as u32,
            struct_data_size: 0,
            struct_pointer_count: 1,
            nesting_limit: self.nesting_limit,
        }
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        let mut result = MessageSize {
            word_count: u64::from(wire_helpers::round_bits_up_to_words(u64::from(
                self.data_size,
            ))) + u64::from(self.pointer_count) * POINTER_SIZE_IN_WORDS as u64,
            cap_count: 0,
        };

        for i in 0..u32::from(self.pointer_count) {
            result.plus_eq(wire_helpers::total_size(
                self.arena,
                self.segment_id,
                self.pointers + i,
                self.nesting_limit,
            )?);
        }

        Ok(result)
    }
}

#[derive(Clone, Copy)]
pub struct StructBuilder<'a> {
    arena: &'a dyn BuilderArena,
    data: ByteCount,
    pointers: WordIndex,
    data_size: BitCount32,
    pointer_count: WirePointerCount16,
}

impl<'a> StructBuilder<'a> {
    #[inline]
    pub fn reborrow(&mut self) -> StructBuilder<'_> {
        StructBuilder {
            arena: self.arena,
            ..*self
        }
    }

    pub fn as_reader(&self) -> StructReader<'_> {
        StructReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            data: self.data,
            pointers: self.pointers,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn into_reader(self) -> StructReader<'a> {
        StructReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            data: self.data,
            pointers: self.pointers,
            data_size: self.data_size,
            pointer_count: self.pointer_count,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn get_data_section_size(&self) -> BitCount32 {
        self.data_size
    }

    pub fn get_pointer_section_size(&self) -> WirePointerCount16 {
        self.pointer_count
    }

    /// Writes are dropped if `offset` lies past the end of the data section.
    #[inline]
    pub fn set_data_field<T: Primitive>(&mut self, offset: ElementCount, value: T) {
        if (offset + 1) * T::SIZE * BITS_PER_BYTE > self.data_size as usize {
            debug_assert!(false, "data field {offset} is out of bounds");
            return;
        }
        let mut buf = [0u8; 8];
        T::write(&mut buf[..T::SIZE], value);
        self.arena
            .write_bytes(self.data + offset * T::SIZE, &buf[..T::SIZE]);
    }

    #[inline]
    pub fn get_data_field<T: Primitive>(&self, offset: ElementCount) -> T {
        let mut buf = [0u8; 8];
        if (offset + 1) * T::SIZE * BITS_PER_BYTE <= self.data_size as usize {
            self.arena
                .read_into(self.data + offset * T::SIZE, &mut buf[..T::SIZE]);
        }
        T::read(&buf[..T::SIZE])
    }

    #[inline]
    pub fn set_bool_field(&mut self, offset: ElementCount, value: bool) {
        if offset >= self.data_size as usize {
            debug_assert!(false, "bool field {offset} is out of bounds");
            return;
        }
        let byte_index = self.data + offset / BITS_PER_BYTE;
        let bitnum = offset % BITS_PER_BYTE;
        let mut byte = [0u8];
        self.arena.read_into(byte_index, &mut byte);
        byte[0] = (byte[0] & !(1 << bitnum)) | (u8::from(value) << bitnum);
        self.arena.write_bytes(byte_index, &byte);
    }

    #[inline]
    pub fn get_bool_field(&self, offset: ElementCount) -> bool {
        if offset >= self.data_size as usize {
            return false;
        }
        let mut byte = [0u8];
        self.arena
            .read_into(self.data + offset / BITS_PER_BYTE, &mut byte);
        (byte[0] & (1 << (offset % BITS_PER_BYTE))) != 0
    }

    /// # Panics
    ///
    /// If `ptr_index` is not less than the size of the pointer section.
    #[inline]
    pub fn get_pointer_field(self, ptr_index: WirePointerCount) -> PointerBuilder<'a> {
        assert!(
            ptr_index < self.pointer_count as usize,
            "pointer field {ptr_index} is out of bounds for a struct with {} pointers",
            self.pointer_count
        );
        PointerBuilder {
            arena: self.arena,
            pointer: self.pointers + ptr_index as u32,
        }
    }

    #[inline]
    pub fn get_pointer_field_mut(&mut self, ptr_index: WirePointerCount) -> PointerBuilder<'_> {
        self.reborrow().get_pointer_field(ptr_index)
    }

    pub fn get_data_section_as_blob(self) -> data::Builder<'a> {
        data::Builder::new(
            self.arena,
            self.data,
            wire_helpers::round_bits_up_to_bytes(u64::from(self.data_size)),
        )
    }

    pub fn get_pointer_section_as_list(self) -> ListBuilder<'a> {
        ListBuilder {
            arena: self.arena,
            ptr: self.pointers as usize * BYTES_PER_WORD,
            element_count: u32::from(self.pointer_count),
            element_size: ElementSize::Pointer,
            step: BITS_PER_POINTER as u32,
            struct_data_size: 0,
            struct_pointer_count: 1,
        }
    }
}

#[derive(Clone, Copy)]
pub struct ListReader<'a> {
    arena: &'a dyn ReaderArena,
    segment_id: SegmentId,
    ptr: ByteCount,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
    nesting_limit: i32,
}

impl<'a> ListReader<'a> {
    pub fn new_default<'b>() -> ListReader<'b> {
        ListReader {
            arena: &NULL_ARENA,
            segment_id: 0,
            ptr: 0,
            element_count: 0,
            step: 0,
            struct_data_size: 0,
            struct_pointer_count: 0,
            element_size: ElementSize::Void,
            nesting_limit: 0x7fffffff,
        }
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element size actually used on the wire.
    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    /// Data and pointer section sizes of each element, when viewed as a struct.
    pub fn get_element_struct_size(&self) -> (BitCount32, WirePointerCount16) {
        (self.struct_data_size, self.struct_pointer_count)
    }

    #[inline]
    fn element_byte(&self, index: ElementCount32) -> ByteCount {
        self.ptr + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }

    pub fn get_struct_element(&self, index: ElementCount32) -> StructReader<'a> {
        let index_byte = self.element_byte(index);
        let struct_pointers =
            (index_byte + self.struct_data_size as usize / BITS_PER_BYTE) / BYTES_PER_WORD;

        StructReader {
            arena: self.arena,
            segment_id: self.segment_id,
            data: index_byte,
            pointers: struct_pointers as WordIndex,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
            nesting_limit: self.nesting_limit - 1,
        }
    }

    /// Returns a null pointer if the elements have no pointer section.
    pub fn get_pointer_element(&self, index: ElementCount32) -> PointerReader<'a> {
        if self.struct_pointer_count == 0 {
            return PointerReader::new_default();
        }
        let offset = self.element_byte(index) + self.struct_data_size as usize / BITS_PER_BYTE;
        PointerReader {
            arena: self.arena,
            segment_id: self.segment_id,
            pointer: Some((offset / BYTES_PER_WORD) as WordIndex),
            nesting_limit: self.nesting_limit,
        }
    }
}

#[derive(Clone, Copy)]
pub struct ListBuilder<'a> {
    arena: &'a dyn BuilderArena,
    ptr: ByteCount,
    element_count: ElementCount32,
    step: BitCount32,
    struct_data_size: BitCount32,
    struct_pointer_count: WirePointerCount16,
    element_size: ElementSize,
}

impl<'a> ListBuilder<'a> {
    /// An empty list that is not attached to any pointer.
    #[inline]
    pub fn new_default(arena: &dyn BuilderArena) -> ListBuilder<'_> {
        ListBuilder {
            arena,
            ptr: 0,
            element_count: 0,
            step: 0,
            struct_data_size: 0,
            struct_pointer_count: 0,
            element_size: ElementSize::Void,
        }
    }

    pub fn into_reader(self) -> ListReader<'a> {
        ListReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            ptr: self.ptr,
            element_count: self.element_count,
            step: self.step,
            struct_data_size: self.struct_data_size,
            struct_pointer_count: self.struct_pointer_count,
            element_size: self.element_size,
            nesting_limit: 0x7fffffff,
        }
    }

    pub fn as_reader(&self) -> ListReader<'_> {
        ListReader {
            arena: self.arena.as_reader(),
            segment_id: 0,
            ptr: self.ptr,
            element_count: self.element_count,
            step: self.step,
            struct_data_size: self.struct_data_size,
            struct_pointer_count: self.struct_pointer_count,
            element_size: self.element_size,
            nesting_limit: 0x7fffffff,
        }
    }

    #[inline]
    pub fn reborrow(&mut self) -> ListBuilder<'_> {
        ListBuilder {
            arena: self.arena,
            ..*self
        }
    }

    #[inline]
    pub fn len(&self) -> ElementCount32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.element_size
    }

    #[inline]
    fn element_byte(&self, index: ElementCount32) -> ByteCount {
        self.ptr + (u64::from(index) * u64::from(self.step) / BITS_PER_BYTE as u64) as usize
    }

    pub fn get_struct_element(self, index: ElementCount32) -> StructBuilder<'a> {
        let index_byte = self.element_byte(index);
        let struct_pointers =
            (index_byte + self.struct_data_size as usize / BITS_PER_BYTE) / BYTES_PER_WORD;
        StructBuilder {
            arena: self.arena,
            data: index_byte,
            pointers: struct_pointers as WordIndex,
            data_size: self.struct_data_size,
            pointer_count: self.struct_pointer_count,
        }
    }

    /// # Panics
    ///
    /// If the elements have no pointer section.
    pub fn get_pointer_element(self, index: ElementCount32) -> PointerBuilder<'a> {
        assert!(
            self.struct_pointer_count > 0,
            "list of {:?} has no pointer elements",
            self.element_size
        );
        let offset = self.element_byte(index) + self.struct_data_size as usize / BITS_PER_BYTE;
        PointerBuilder {
            arena: self.arena,
            pointer: (offset / BYTES_PER_WORD) as WordIndex,
        }
    }
}

/// An element type of a list whose elements are stored directly in the list body.
pub trait PrimitiveElement {
    fn get(list_reader: &ListReader, index: ElementCount32) -> Self;
    fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Self;
    fn set(list_builder: &ListBuilder, index: ElementCount32, value: Self);
    fn element_size() -> ElementSize;
}

macro_rules! primitive_element_impl(
    ($typ:ty, $size:ident) => (
        impl PrimitiveElement for $typ {
            #[inline]
            fn get(list_reader: &ListReader, index: ElementCount32) -> Self {
                let offset = list_reader.element_byte(index);
                let mut bytes = [0u8; <$typ as Primitive>::SIZE];
                match list_reader
                    .arena
                    .read_exact(list_reader.segment_id, offset, &mut bytes)
                {
                    Ok(()) => <$typ as Primitive>::read(&bytes),
                    Err(_) => <$typ>::default(),
                }
            }

            #[inline]
            fn get_from_builder(list_builder: &ListBuilder, index: ElementCount32) -> Self {
                let mut buf = [0u8; <$typ as Primitive>::SIZE];
                list_builder
                    .arena
                    .read_into(list_builder.element_byte(index), &mut buf);
                <$typ as Primitive>::read(&buf)
            }

            #[inline]
            fn set(list_builder: &ListBuilder, index: ElementCount32, value: Self) {
                let mut buf = [0u8; <$typ as Primitive>::SIZE];
                <$typ as Primitive>::write(&mut buf, value);
                list_builder
                    .arena
                    .write_bytes(list_builder.element_byte(index), &buf);
            }

            fn element_size() -> ElementSize {
                ElementSize::$size
            }
        }
    );
);

primitive_element_impl!(u8, Byte);
primitive_element_impl!(i8, Byte);
primitive_element_impl!(u16, TwoBytes);
primitive_element_impl!(i16, TwoBytes);
primitive_element_impl!(u32, FourBytes);
primitive_element_impl!(i32, FourBytes);
primitive_element_impl!(u64, EightBytes);
primitive_element_impl!(i64, EightBytes);
primitive_element_impl!(f32, FourBytes);
primitive_element_impl!(f64, EightBytes);

impl PrimitiveElement for bool {
    #[inline]
    fn get(list: &ListReader, index: ElementCount32) -> Self {
        let bindex = u64::from(index) * u64::from(list.step);
        let byte_index = list.ptr + (bindex / BITS_PER_BYTE as u64) as usize;
        let mut byte = [0u8];
        match list.arena.read_exact(list.segment_id, byte_index, &mut byte) {
            Ok(()) => (byte[0] & (1 << (bindex % BITS_PER_BYTE as u64))) != 0,
            Err(_) => false,
        }
    }

    #[inline]
    fn get_from_builder(list: &ListBuilder, index: ElementCount32) -> Self {
        let bindex = u64::from(index) * u64::from(list.step);
        let mut byte = [0u8];
        list.arena
            .read_into(list.ptr + (bindex / BITS_PER_BYTE as u64) as usize, &mut byte);
        (byte[0] & (1 << (bindex % BITS_PER_BYTE as u64))) != 0
    }

    #[inline]
    fn set(list: &ListBuilder, index: ElementCount32, value: Self) {
        let bindex = u64::from(index) * u64::from(list.step);
        let byte_index = list.ptr + (bindex / BITS_PER_BYTE as u64) as usize;
        let bitnum = bindex % BITS_PER_BYTE as u64;
        let mut byte = [0u8];
        list.arena.read_into(byte_index, &mut byte);
        byte[0] = (byte[0] & !(1 << bitnum)) | (u8::from(value) << bitnum);
        list.arena.write_bytes(byte_index, &byte);
    }

    fn element_size() -> ElementSize {
        ElementSize::Bit
    }
}

impl PrimitiveElement for () {
    #[inline]
    fn get(_list: &ListReader, _index: ElementCount32) {}

    #[inline]
    fn get_from_builder(_list: &ListBuilder, _index: ElementCount32) {}

    #[inline]
    fn set(_list: &ListBuilder, _index: ElementCount32, _value: ()) {}

    fn element_size() -> ElementSize {
        ElementSize::Void
    }
}
