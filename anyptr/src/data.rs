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

//! Sequence of bytes.

use std::borrow::Cow;

use crate::private::arena::BuilderArena;
use crate::private::layout::{PointerBuilder, PointerReader};
use crate::private::units::ByteCount;
use crate::Result;

#[derive(Copy, Clone)]
pub struct Owned(());

impl crate::traits::Owned for Owned {
    type Reader<'a> = Reader<'a>;
    type Builder<'a> = Builder<'a>;
}

/// Always borrowed from the message's segments, including a message that is still being built.
pub type Reader<'a> = Cow<'a, [u8]>;

impl<'a> crate::traits::FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        reader.get_data()
    }
}

impl crate::traits::SetPointerBuilder for Reader<'_> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_data(&value);
        Ok(())
    }
}

impl crate::traits::SetPointerBuilder for &[u8] {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_data(value);
        Ok(())
    }
}

/// A fixed-length byte blob inside a message under construction.
pub struct Builder<'a> {
    arena: &'a dyn BuilderArena,
    start: ByteCount,
    len: u32,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(arena: &'a dyn BuilderArena, start: ByteCount, len: u32) -> Self {
        Builder { arena, start, len }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn get(&self, index: usize) -> u8 {
        assert!(index < self.len(), "index {index} out of bounds for data of length {}", self.len);
        let mut byte = [0u8];
        self.arena.read_into(self.start + index, &mut byte);
        byte[0]
    }

    /// # Panics
    ///
    /// If `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: u8) {
        assert!(index < self.len(), "index {index} out of bounds for data of length {}", self.len);
        self.arena.write_bytes(self.start + index, &[value]);
    }

    /// # Panics
    ///
    /// If `src` does not have the same length as the blob.
    pub fn copy_from_slice(&mut self, src: &[u8]) {
        assert_eq!(src.len(), self.len(), "source slice has the wrong length");
        self.arena.write_bytes(self.start, src);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut result = vec![0; self.len()];
        self.arena.read_into(self.start, &mut result);
        result
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            arena: self.arena,
            start: self.start,
            len: self.len,
        }
    }

    pub fn into_reader(self) -> Reader<'a> {
        self.arena
            .as_reader()
            .read_bytes(0, self.start, self.len as usize)
            .unwrap_or(Cow::Borrowed(&[]))
    }
}

impl<'a> crate::traits::FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Builder<'a> {
        builder.init_data(size)
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        builder.get_data()
    }
}

impl core::fmt::Debug for Builder<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_tuple("Builder").field(&self.to_vec()).finish()
    }
}
