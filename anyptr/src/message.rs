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

//! Untyped root container for a Cap'n Proto value.
//!
//! ## Notes about type specialization
//! This module provides [`Reader`] and [`Builder`], which are untyped views of a message. The
//! root pointer of a message can be reinterpreted as any type through `get_root()` and
//! friends, exactly like any other [`any_pointer`](crate::any_pointer) slot.

use std::cell::Ref;

use crate::any_pointer;
use crate::orphan::Orphanage;
use crate::private::arena::{BuilderArena, BuilderArenaImpl, ReaderArena, ReaderArenaImpl};
use crate::private::layout;
use crate::traits::{FromPointerBuilder, FromPointerReader, SetPointerBuilder};
use crate::Result;

/// Options controlling how data is read.
#[derive(Clone, Copy, Debug)]
pub struct ReaderOptions {
    /// Limits how many total words of data are allowed to be traversed. Traversal is counted when
    /// a new struct or list builder is obtained, e.g. from a get() accessor. This means that calling
    /// the getter for the same sub-struct multiple times will cause it to be double-counted. Once
    /// the traversal limit is reached, an error will be reported.
    ///
    /// This limit exists for security reasons. It is possible for an attacker to construct a message
    /// in which multiple pointers point at the same location. This is technically invalid, but hard
    /// to detect. Using such a message, an attacker could cause a message which is small on the wire
    /// to appear much larger when actually traversed, possibly exhausting server resources leading to
    /// denial-of-service.
    ///
    /// A value of `None` disables the limit.
    pub traversal_limit_in_words: Option<usize>,

    /// Limits how deeply nested a message structure can be, e.g. structs containing other structs or
    /// lists of structs.
    ///
    /// Like the traversal limit, this limit exists for security reasons. Since it is common to use
    /// recursive code to traverse recursive data structures, an attacker could easily cause a stack
    /// overflow by sending a very-deeply-nested (or even cyclic) message, without the message even
    /// being very large. The default limit of 64 is probably low enough to prevent any chance of
    /// stack overflow, yet high enough that it is never a problem in practice.
    pub nesting_limit: i32,
}

pub const DEFAULT_READER_OPTIONS: ReaderOptions = ReaderOptions {
    traversal_limit_in_words: Some(8 * 1024 * 1024),
    nesting_limit: 64,
};

impl Default for ReaderOptions {
    fn default() -> Self {
        DEFAULT_READER_OPTIONS
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        DEFAULT_READER_OPTIONS
    }

    pub fn nesting_limit(&mut self, value: i32) -> &mut Self {
        self.nesting_limit = value;
        self
    }

    pub fn traversal_limit_in_words(&mut self, value: Option<usize>) -> &mut Self {
        self.traversal_limit_in_words = value;
        self
    }
}

/// An object that manages the buffers underlying a Cap'n Proto message reader.
pub trait ReaderSegments {
    /// Gets the segment with index `idx`. Returns `None` if `idx` is out of range.
    ///
    /// The segment length must be a multiple of 8; trailing bytes are ignored.
    fn get_segment(&self, idx: u32) -> Option<&[u8]>;

    /// Gets the number of segments.
    fn len(&self) -> usize {
        for i in 0.. {
            if self.get_segment(i as u32).is_none() {
                return i;
            }
        }
        unreachable!()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<S> ReaderSegments for &S
where
    S: ReaderSegments + ?Sized,
{
    fn get_segment(&self, idx: u32) -> Option<&[u8]> {
        (**self).get_segment(idx)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// An array of segments.
pub struct SegmentArray<'a> {
    segments: &'a [&'a [u8]],
}

impl<'a> SegmentArray<'a> {
    pub fn new(segments: &'a [&'a [u8]]) -> SegmentArray<'a> {
        SegmentArray { segments }
    }
}

impl<'b> ReaderSegments for SegmentArray<'b> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.segments.get(id as usize).copied()
    }

    fn len(&self) -> usize {
        self.segments.len()
    }
}

impl<'b> ReaderSegments for [&'b [u8]] {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.get(id as usize).copied()
    }

    fn len(&self) -> usize {
        <[&[u8]]>::len(self)
    }
}

/// A container used to read a message.
pub struct Reader<S>
where
    S: ReaderSegments,
{
    arena: ReaderArenaImpl<S>,
}

impl<S> Reader<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: ReaderOptions) -> Self {
        Self {
            arena: ReaderArenaImpl::new(segments, options),
        }
    }

    fn get_root_internal(&self) -> Result<any_pointer::Reader<'_>> {
        let pointer_reader = layout::PointerReader::get_root(
            &self.arena,
            0,
            0,
            self.arena.nesting_limit(),
        )?;
        Ok(any_pointer::Reader::new(pointer_reader))
    }

    /// Gets the root of the message, interpreting it as the given type.
    pub fn get_root<'a, T: FromPointerReader<'a>>(&'a self) -> Result<T> {
        self.get_root_internal()?.get_as()
    }

    pub fn into_segments(self) -> S {
        self.arena.into_segments()
    }
}

/// The segment of a message under construction, borrowed for output.
pub struct OutputSegments<'a> {
    segment: Ref<'a, [u8]>,
}

impl<'a> ReaderSegments for OutputSegments<'a> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        if id == 0 {
            Some(&self.segment)
        } else {
            None
        }
    }

    fn len(&self) -> usize {
        1
    }
}

/// Decides how much room the segment of a message under construction gets
/// whenever it runs out.
pub trait Allocator {
    /// Returns the capacity, in words, to grow a segment that currently holds
    /// `current_capacity` words so that it can hold at least `minimum_capacity` words.
    fn next_capacity(&mut self, current_capacity: u32, minimum_capacity: u32) -> u32;
}

/// A container used to build a message.
pub struct Builder<A>
where
    A: Allocator,
{
    arena: BuilderArenaImpl<A>,
}

impl<A> Builder<A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Self {
        let arena = BuilderArenaImpl::new(allocator);
        // The root pointer always occupies the first word of the segment.
        arena.allocate(1);
        Self { arena }
    }

    fn get_root_internal(&mut self) -> any_pointer::Builder<'_> {
        any_pointer::Builder::new(layout::PointerBuilder::get_root(&self.arena, 0))
    }

    /// Initializes the root as a value of the given type.
    pub fn init_root<'a, T: FromPointerBuilder<'a>>(&'a mut self) -> T {
        let root = self.get_root_internal();
        root.init_as()
    }

    /// Initializes the root as a value of the given list type, with the given length.
    pub fn initn_root<'a, T: FromPointerBuilder<'a>>(&'a mut self, length: u32) -> T {
        let root = self.get_root_internal();
        root.initn_as(length)
    }

    /// The root pointer, without interpreting it.
    pub fn get_root_as_any(&mut self) -> any_pointer::Builder<'_> {
        self.get_root_internal()
    }

    /// Gets the root, interpreting it as the given type.
    pub fn get_root<'a, T: FromPointerBuilder<'a>>(&'a mut self) -> Result<T> {
        let root = self.get_root_internal();
        root.get_as()
    }

    pub fn get_root_as_reader<'a, T: FromPointerReader<'a>>(&'a self) -> Result<T> {
        let pointer_reader = layout::PointerReader::get_root(
            self.arena.as_reader(),
            0,
            0,
            0x7fffffff,
        )?;
        any_pointer::Reader::new(pointer_reader).get_as()
    }

    /// Sets the root to a deep copy of the given value.
    pub fn set_root<From: SetPointerBuilder>(&mut self, value: From) -> Result<()> {
        let root = self.get_root_internal();
        root.set_as(value)
    }

    /// Returns a factory for objects that live in this message but are not yet
    /// attached to it.
    pub fn get_orphanage(&self) -> Orphanage<'_> {
        Orphanage::new(&self.arena)
    }

    pub fn get_segments_for_output(&self) -> OutputSegments<'_> {
        OutputSegments {
            segment: self.arena.segment(),
        }
    }

    /// Total number of words allocated so far, including space released by
    /// `clear()`, `disown()` and dropped orphans.
    pub fn size_in_words(&self) -> usize {
        BuilderArena::len(&self.arena) as usize
    }

    /// Number of capabilities that have been stored in this message, including
    /// ones that were later released.
    pub fn cap_table_len(&self) -> usize {
        self.arena.cap_table_len()
    }

    /// Copies the contents of this message into a standalone reader.
    /// Capabilities are not carried over.
    pub fn into_reader(self) -> Reader<Vec<Vec<u8>>> {
        let segment = self.get_segments_for_output().segment.to_vec();
        Reader::new(
            vec![segment],
            ReaderOptions {
                traversal_limit_in_words: None,
                nesting_limit: 0x7fffffff,
            },
        )
    }

    pub fn into_allocator(self) -> A {
        self.arena.into_allocator()
    }
}

impl ReaderSegments for Vec<Vec<u8>> {
    fn get_segment(&self, id: u32) -> Option<&[u8]> {
        self.get(id as usize).map(|v| &v[..])
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}

/// Standard segment allocator for message builders.
#[derive(Debug)]
pub struct HeapAllocator {
    // Minimum number of words in the segment.
    first_segment_words: u32,

    // How the segment grows once it is full.
    allocation_strategy: AllocationStrategy,

    // Maximum number of words in the segment.
    max_segment_words: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// Grow the segment by `first_segment_words` each time it fills up.
    FixedSize,

    /// Double the segment each time it fills up.
    GrowHeuristically,
}

pub const SUGGESTED_FIRST_SEGMENT_WORDS: u32 = 1024;
pub const SUGGESTED_ALLOCATION_STRATEGY: AllocationStrategy = AllocationStrategy::GrowHeuristically;

impl Default for HeapAllocator {
    fn default() -> Self {
        Self {
            first_segment_words: SUGGESTED_FIRST_SEGMENT_WORDS,
            allocation_strategy: SUGGESTED_ALLOCATION_STRATEGY,
            max_segment_words: 1 << 29,
        }
    }
}

impl HeapAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size of the initial segment in words, where 1 word = 8 bytes.
    pub fn first_segment_words(mut self, value: u32) -> Self {
        assert!(value <= self.max_segment_words);
        self.first_segment_words = value.max(1);
        self
    }

    /// Sets the allocation strategy for growing the segment.
    pub fn allocation_strategy(mut self, value: AllocationStrategy) -> Self {
        self.allocation_strategy = value;
        self
    }

    /// Sets the maximum number of words allowed in the segment.
    pub fn max_segment_words(mut self, value: u32) -> Self {
        assert!(self.first_segment_words <= value);
        self.max_segment_words = value;
        self
    }
}

impl Allocator for HeapAllocator {
    fn next_capacity(&mut self, current_capacity: u32, minimum_capacity: u32) -> u32 {
        let proposed = if current_capacity == 0 {
            self.first_segment_words
        } else {
            match self.allocation_strategy {
                AllocationStrategy::FixedSize => {
                    current_capacity.saturating_add(self.first_segment_words)
                }
                AllocationStrategy::GrowHeuristically => current_capacity.saturating_mul(2),
            }
        };
        let capacity = proposed.min(self.max_segment_words).max(minimum_capacity);
        log::trace!("growing message segment from {current_capacity} to {capacity} words");
        capacity
    }
}

impl Builder<HeapAllocator> {
    /// Constructs a new `message::Builder<HeapAllocator>` whose first segment has length
    /// `SUGGESTED_FIRST_SEGMENT_WORDS`.
    pub fn new_default() -> Self {
        Self::new(HeapAllocator::new())
    }
}

impl Default for Builder<HeapAllocator> {
    fn default() -> Self {
        Self::new_default()
    }
}

#[cfg(test)]
mod tests {
    use super::{AllocationStrategy, Allocator, HeapAllocator};

    #[test]
    fn heap_allocator_growth() {
        let mut fixed = HeapAllocator::new()
            .first_segment_words(16)
            .allocation_strategy(AllocationStrategy::FixedSize);
        assert_eq!(fixed.next_capacity(0, 1), 16);
        assert_eq!(fixed.next_capacity(16, 17), 32);
        assert_eq!(fixed.next_capacity(16, 100), 100);

        let mut grow = HeapAllocator::new().first_segment_words(16);
        assert_eq!(grow.next_capacity(16, 17), 32);
        assert_eq!(grow.next_capacity(32, 33), 64);
    }
}
