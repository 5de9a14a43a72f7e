// Copyright (c) 2013-2017 Sandstorm Development Group, Inc. and contributors
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

use std::borrow::Cow;
use std::cell::{Cell, Ref, RefCell};

use byteorder::{ByteOrder, LittleEndian};

use crate::message::{self, Allocator, ReaderSegments};
use crate::private::capability::ClientHook;
use crate::private::read_limiter::ReadLimiter;
use crate::private::units::*;
use crate::{Error, ErrorKind, Result};

pub type SegmentId = u32;

pub trait ReaderArena {
    /// Returns the number of words in the segment.
    fn segment_len(&self, id: SegmentId) -> Result<WordCount32>;

    fn read_bytes(&self, id: SegmentId, start: ByteCount, len: ByteCount) -> Result<Cow<'_, [u8]>>;

    /// Copies `dst.len()` bytes starting at byte offset `start` into `dst`.
    fn read_exact(&self, id: SegmentId, start: ByteCount, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(&self.read_bytes(id, start, dst.len())?);
        Ok(())
    }

    fn read_word(&self, id: SegmentId, index: WordIndex) -> Result<u64> {
        let mut bytes = [0u8; BYTES_PER_WORD];
        self.read_exact(id, index as usize * BYTES_PER_WORD, &mut bytes)?;
        Ok(LittleEndian::read_u64(&bytes))
    }

    /// Checks that `[start, start + size)` lies within the segment, without charging the
    /// read limiter.
    fn check_interval(&self, id: SegmentId, start: WordIndex, size_in_words: usize) -> Result<()> {
        let len = self.segment_len(id)?;
        if start as usize + size_in_words > len as usize {
            Err(Error::from_kind(ErrorKind::MessageContainsOutOfBoundsPointer))
        } else {
            Ok(())
        }
    }

    /// Like `check_interval()`, but also counts the words against the traversal limit.
    fn contains_interval(&self, id: SegmentId, start: WordIndex, size_in_words: usize)
        -> Result<()>;
    fn amplified_read(&self, virtual_amount: u64) -> Result<()>;

    fn nesting_limit(&self) -> i32;

    /// Looks up a capability in the message's capability table.
    fn extract_cap(&self, _index: u32) -> Option<Box<dyn ClientHook>> {
        None
    }
}

pub struct ReaderArenaImpl<S> {
    segments: S,
    read_limiter: ReadLimiter,
    nesting_limit: i32,
}

#[cfg(feature = "sync_reader")]
fn _assert_sync() {
    fn _assert_sync<T: Sync>() {}
    fn _assert_reader<S: ReaderSegments + Sync>() {
        _assert_sync::<ReaderArenaImpl<S>>();
    }
}

impl<S> ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    pub fn new(segments: S, options: message::ReaderOptions) -> Self {
        let limiter = ReadLimiter::new(options.traversal_limit_in_words);
        Self {
            segments,
            read_limiter: limiter,
            nesting_limit: options.nesting_limit,
        }
    }

    pub fn into_segments(self) -> S {
        self.segments
    }

    fn get_segment(&self, id: SegmentId) -> Result<&[u8]> {
        self.segments
            .get_segment(id)
            .ok_or_else(|| Error::from_kind(ErrorKind::InvalidSegmentId(id)))
    }
}

impl<S> ReaderArena for ReaderArenaImpl<S>
where
    S: ReaderSegments,
{
    fn segment_len(&self, id: SegmentId) -> Result<WordCount32> {
        Ok((self.get_segment(id)?.len() / BYTES_PER_WORD) as u32)
    }

    fn read_bytes(&self, id: SegmentId, start: ByteCount, len: ByteCount) -> Result<Cow<'_, [u8]>> {
        let seg = self.get_segment(id)?;
        match seg.get(start..start + len) {
            Some(bytes) => Ok(Cow::Borrowed(bytes)),
            None => Err(Error::from_kind(
                ErrorKind::MessageContainsOutOfBoundsPointer,
            )),
        }
    }

    fn contains_interval(
        &self,
        id: SegmentId,
        start: WordIndex,
        size_in_words: usize,
    ) -> Result<()> {
        self.check_interval(id, start, size_in_words)?;
        self.read_limiter.can_read(size_in_words)
    }

    fn amplified_read(&self, virtual_amount: u64) -> Result<()> {
        self.read_limiter.can_read(virtual_amount as usize)
    }

    fn nesting_limit(&self) -> i32 {
        self.nesting_limit
    }
}

/// Storage for a message under construction.
///
/// Everything is addressed by word index into a single segment that grows as
/// needed, so builders never hold pointers into the segment itself and the
/// arena never has to emit far pointers. Each method takes `&self`; builders
/// share the arena and the message guarantees a single writer.
///
/// Reader views over the arena borrow the segment buffer directly. Once a
/// buffer has been lent out it is frozen: the next write or growth moves the
/// arena onto a fresh copy, and the frozen buffer stays alive until the arena
/// is dropped.
pub trait BuilderArena: ReaderArena {
    /// Appends `amount` zeroed words to the segment and returns the index of the first.
    fn allocate(&self, amount: WordCount32) -> WordIndex;

    /// Number of words allocated so far.
    fn len(&self) -> WordCount32;

    fn get_word(&self, index: WordIndex) -> u64;
    fn set_word(&self, index: WordIndex, value: u64);

    /// Fills `dst` with the bytes starting at byte offset `start`.
    fn read_into(&self, start: ByteCount, dst: &mut [u8]);
    fn write_bytes(&self, start: ByteCount, src: &[u8]);

    fn copy_words(&self, from: WordIndex, to: WordIndex, count: WordCount32);
    fn zero_words(&self, start: WordIndex, count: WordCount32);

    /// Adds a capability to the cap table, returning its index.
    fn inject_cap(&self, cap: Box<dyn ClientHook>) -> u32;

    /// Releases the capability at the given index. The slot is not reused.
    fn drop_cap(&self, index: u32);

    /// Hands out a word to hold the root pointer of an orphan.
    fn allocate_anchor(&self) -> WordIndex;

    /// Zeroes an anchor word and makes it available for reuse.
    fn release_anchor(&self, index: WordIndex);

    fn segment(&self) -> Ref<'_, [u8]>;

    fn as_reader(&self) -> &dyn ReaderArena;
}

/// True if both references point at the same arena.
pub fn same_arena(a: &dyn BuilderArena, b: &dyn BuilderArena) -> bool {
    core::ptr::eq(
        a as *const dyn BuilderArena as *const u8,
        b as *const dyn BuilderArena as *const u8,
    )
}

pub struct BuilderArenaImplInner<A>
where
    A: Allocator,
{
    allocator: A,
    segment: Vec<u8>,
    // Buffers that were lent to readers before being replaced.
    frozen: Vec<Vec<u8>>,
    cap_table: Vec<Option<Box<dyn ClientHook>>>,
    free_anchors: Vec<WordIndex>,
}

pub struct BuilderArenaImpl<A>
where
    A: Allocator,
{
    inner: RefCell<BuilderArenaImplInner<A>>,

    // Set while some reader may hold a slice of `inner.segment`.
    lent: Cell<bool>,
}

impl<A> BuilderArenaImpl<A>
where
    A: Allocator,
{
    pub fn new(allocator: A) -> Self {
        Self {
            inner: RefCell::new(BuilderArenaImplInner {
                allocator,
                segment: Vec::new(),
                frozen: Vec::new(),
                cap_table: Vec::new(),
                free_anchors: Vec::new(),
            }),
            lent: Cell::new(false),
        }
    }

    /// Borrows the segment for writing, first moving off a buffer that readers may still see.
    fn writable(&self) -> core::cell::RefMut<'_, BuilderArenaImplInner<A>> {
        let mut inner = self.inner.borrow_mut();
        if self.lent.replace(false) {
            let capacity = inner.segment.capacity();
            inner.freeze(capacity);
        }
        inner
    }

    /// Number of buffers that were lent to readers and then replaced.
    pub fn frozen_buffers(&self) -> usize {
        self.inner.borrow().frozen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().segment.is_empty()
    }

    /// Number of capability table entries, including released ones.
    pub fn cap_table_len(&self) -> usize {
        self.inner.borrow().cap_table.len()
    }

    pub fn into_allocator(self) -> A {
        self.inner.into_inner().allocator
    }
}

impl<A> BuilderArenaImplInner<A>
where
    A: Allocator,
{
    /// Moves the segment into a new buffer of at least `capacity` bytes, keeping the old one
    /// alive.
    fn freeze(&mut self, capacity: usize) {
        let mut fresh = Vec::with_capacity(capacity.max(self.segment.len()));
        fresh.extend_from_slice(&self.segment);
        let old = core::mem::replace(&mut self.segment, fresh);
        log::trace!("froze a lent segment buffer of {} bytes", old.len());
        self.frozen.push(old);
    }

    /// Appends `amount` zeroed words. With `lent` set, growth never reallocates the current
    /// buffer in place.
    fn allocate(&mut self, amount: WordCount32, lent: &Cell<bool>) -> WordIndex {
        let current = (self.segment.len() / BYTES_PER_WORD) as u32;
        let needed = current
            .checked_add(amount)
            .filter(|n| *n < (1 << 29))
            .unwrap_or_else(|| panic!("message segment cannot hold {amount} more words"));
        let capacity = (self.segment.capacity() / BYTES_PER_WORD) as u32;
        if needed > capacity {
            let target = self.allocator.next_capacity(capacity, needed).max(needed);
            if lent.replace(false) {
                self.freeze(target as usize * BYTES_PER_WORD);
            } else {
                self.segment
                    .reserve_exact(target as usize * BYTES_PER_WORD - self.segment.len());
            }
        }
        // Within capacity: only the unlent tail is written.
        self.segment.resize(needed as usize * BYTES_PER_WORD, 0);
        current
    }

    fn word_range(index: WordIndex, count: WordCount32) -> core::ops::Range<usize> {
        let start = index as usize * BYTES_PER_WORD;
        start..start + count as usize * BYTES_PER_WORD
    }
}

impl<A> ReaderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn segment_len(&self, id: SegmentId) -> Result<WordCount32> {
        if id != 0 {
            return Err(Error::from_kind(ErrorKind::InvalidSegmentId(id)));
        }
        Ok(BuilderArena::len(self))
    }

    fn read_bytes(&self, id: SegmentId, start: ByteCount, len: ByteCount) -> Result<Cow<'_, [u8]>> {
        if id != 0 {
            return Err(Error::from_kind(ErrorKind::InvalidSegmentId(id)));
        }
        let inner = self.inner.borrow();
        match start.checked_add(len) {
            Some(end) if end <= inner.segment.len() => {
                self.lent.set(true);
                let ptr = inner.segment.as_ptr();
                // SAFETY: `start..end` is in bounds. While `lent` is set nothing writes to or
                // reallocates this buffer, and once replaced it moves to `frozen`, which lives
                // as long as the arena.
                Ok(Cow::Borrowed(unsafe {
                    core::slice::from_raw_parts(ptr.add(start), len)
                }))
            }
            _ => Err(Error::from_kind(
                ErrorKind::MessageContainsOutOfBoundsPointer,
            )),
        }
    }

    fn read_exact(&self, id: SegmentId, start: ByteCount, dst: &mut [u8]) -> Result<()> {
        if id != 0 {
            return Err(Error::from_kind(ErrorKind::InvalidSegmentId(id)));
        }
        let inner = self.inner.borrow();
        match start
            .checked_add(dst.len())
            .and_then(|end| inner.segment.get(start..end))
        {
            Some(bytes) => {
                dst.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(Error::from_kind(
                ErrorKind::MessageContainsOutOfBoundsPointer,
            )),
        }
    }

    fn contains_interval(
        &self,
        id: SegmentId,
        start: WordIndex,
        size_in_words: usize,
    ) -> Result<()> {
        self.check_interval(id, start, size_in_words)
    }

    fn amplified_read(&self, _virtual_amount: u64) -> Result<()> {
        Ok(())
    }

    fn nesting_limit(&self) -> i32 {
        0x7fffffff
    }

    fn extract_cap(&self, index: u32) -> Option<Box<dyn ClientHook>> {
        match self.inner.borrow().cap_table.get(index as usize) {
            Some(Some(hook)) => Some(hook.add_ref()),
            _ => None,
        }
    }
}

impl<A> BuilderArena for BuilderArenaImpl<A>
where
    A: Allocator,
{
    fn allocate(&self, amount: WordCount32) -> WordIndex {
        self.inner.borrow_mut().allocate(amount, &self.lent)
    }

    fn len(&self) -> WordCount32 {
        (self.inner.borrow().segment.len() / BYTES_PER_WORD) as u32
    }

    fn get_word(&self, index: WordIndex) -> u64 {
        let inner = self.inner.borrow();
        LittleEndian::read_u64(&inner.segment[BuilderArenaImplInner::<A>::word_range(index, 1)])
    }

    fn set_word(&self, index: WordIndex, value: u64) {
        let mut inner = self.writable();
        LittleEndian::write_u64(
            &mut inner.segment[BuilderArenaImplInner::<A>::word_range(index, 1)],
            value,
        );
    }

    fn read_into(&self, start: ByteCount, dst: &mut [u8]) {
        let inner = self.inner.borrow();
        dst.copy_from_slice(&inner.segment[start..start + dst.len()]);
    }

    fn write_bytes(&self, start: ByteCount, src: &[u8]) {
        let mut inner = self.writable();
        inner.segment[start..start + src.len()].copy_from_slice(src);
    }

    fn copy_words(&self, from: WordIndex, to: WordIndex, count: WordCount32) {
        let mut inner = self.writable();
        let src = BuilderArenaImplInner::<A>::word_range(from, count);
        inner
            .segment
            .copy_within(src, to as usize * BYTES_PER_WORD);
    }

    fn zero_words(&self, start: WordIndex, count: WordCount32) {
        let mut inner = self.writable();
        inner.segment[BuilderArenaImplInner::<A>::word_range(start, count)].fill(0);
    }

    fn inject_cap(&self, cap: Box<dyn ClientHook>) -> u32 {
        let mut inner = self.inner.borrow_mut();
        inner.cap_table.push(Some(cap));
        inner.cap_table.len() as u32 - 1
    }

    fn drop_cap(&self, index: u32) {
        // Take the hook out first so that its destructor runs without the arena borrowed.
        let dropped = {
            let mut inner = self.inner.borrow_mut();
            inner
                .cap_table
                .get_mut(index as usize)
                .and_then(|slot| slot.take())
        };
        drop(dropped);
    }

    fn allocate_anchor(&self) -> WordIndex {
        let mut inner = self.inner.borrow_mut();
        match inner.free_anchors.pop() {
            Some(index) => index,
            None => inner.allocate(1, &self.lent),
        }
    }

    fn release_anchor(&self, index: WordIndex) {
        let mut inner = self.writable();
        inner.segment[BuilderArenaImplInner::<A>::word_range(index, 1)].fill(0);
        inner.free_anchors.push(index);
    }

    fn segment(&self) -> Ref<'_, [u8]> {
        Ref::map(self.inner.borrow(), |inner| &inner.segment[..])
    }

    fn as_reader(&self) -> &dyn ReaderArena {
        self
    }
}

pub struct NullArena;

impl ReaderArena for NullArena {
    fn segment_len(&self, _id: SegmentId) -> Result<WordCount32> {
        Err(Error::from_kind(ErrorKind::TriedToReadFromNullArena))
    }

    fn read_bytes(&self, _id: SegmentId, _start: ByteCount, len: ByteCount) -> Result<Cow<'_, [u8]>> {
        if len == 0 {
            Ok(Cow::Borrowed(&[]))
        } else {
            Err(Error::from_kind(ErrorKind::TriedToReadFromNullArena))
        }
    }

    fn contains_interval(
        &self,
        _id: SegmentId,
        _start: WordIndex,
        _size_in_words: usize,
    ) -> Result<()> {
        Ok(())
    }

    fn amplified_read(&self, _virtual_amount: u64) -> Result<()> {
        Ok(())
    }

    fn nesting_limit(&self) -> i32 {
        0x7fffffff
    }
}

pub static NULL_ARENA: NullArena = NullArena;

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::{BuilderArena, BuilderArenaImpl, ReaderArena};
    use crate::message::HeapAllocator;

    #[test]
    fn anchors_are_recycled() {
        let arena = BuilderArenaImpl::new(HeapAllocator::new());
        arena.allocate(1);
        let a = arena.allocate_anchor();
        let b = arena.allocate_anchor();
        assert_ne!(a, b);
        arena.set_word(a, 0xdead_beef);
        arena.release_anchor(a);
        assert_eq!(arena.get_word(a), 0);
        assert_eq!(arena.allocate_anchor(), a);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn reads_through_reader_view() {
        let arena = BuilderArenaImpl::new(HeapAllocator::new().first_segment_words(1));
        let start = arena.allocate(4);
        assert_eq!(start, 0);
        arena.set_word(2, 0x0807_0605_0403_0201);
        let reader = arena.as_reader();
        assert_eq!(reader.read_word(0, 2).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(&reader.read_bytes(0, 16, 2).unwrap()[..], &[1, 2]);
        assert!(reader.read_word(0, 4).is_err());
        assert!(reader.contains_interval(0, 1, 4).is_err());
        assert!(reader.segment_len(1).is_err());
    }

    #[test]
    fn lent_bytes_outlive_later_writes() {
        let arena = BuilderArenaImpl::new(HeapAllocator::new().first_segment_words(2));
        arena.allocate(2);
        arena.set_word(0, 0x0807_0605_0403_0201);
        let reader = arena.as_reader();

        // Word reads copy; nothing is lent yet.
        assert_eq!(reader.read_word(0, 0).unwrap(), 0x0807_0605_0403_0201);
        arena.set_word(1, 7);
        assert_eq!(arena.frozen_buffers(), 0);

        let lent = reader.read_bytes(0, 0, 8).unwrap();
        assert!(matches!(lent, Cow::Borrowed(_)));
        arena.set_word(0, 0);
        arena.allocate(64);
        arena.set_word(65, 1);
        assert_eq!(&lent[..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(arena.frozen_buffers(), 1);
        assert_eq!(reader.read_word(0, 0).unwrap(), 0);
        assert_eq!(reader.read_word(0, 1).unwrap(), 7);
    }

    #[test]
    fn growth_while_lent_keeps_the_old_buffer() {
        let arena = BuilderArenaImpl::new(HeapAllocator::new().first_segment_words(1));
        arena.allocate(1);
        arena.set_word(0, u64::MAX);
        let lent = arena.as_reader().read_bytes(0, 0, 8).unwrap();
        arena.allocate(1024);
        assert_eq!(arena.frozen_buffers(), 1);
        assert_eq!(&lent[..], &[0xff; 8]);
        assert_eq!(arena.len(), 1025);

        // The new buffer has not been lent, so writing to it copies nothing.
        arena.set_word(0, 0);
        assert_eq!(arena.frozen_buffers(), 1);
        assert_eq!(&lent[..], &[0xff; 8]);
    }
}
