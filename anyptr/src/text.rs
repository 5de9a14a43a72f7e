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

//! UTF-8 encoded text.

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

/// Wrapper around utf-8 encoded text.
/// This is defined as a tuple struct to allow pattern matching
/// on it via byte literals (for example `text::Reader(b"hello")`).
///
/// The bytes are not guaranteed to be valid utf-8; use `to_str()` to check.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Reader<'a>(pub Cow<'a, [u8]>);

impl<'a> Reader<'a> {
    pub(crate) fn from_bytes(bytes: Cow<'a, [u8]>) -> Self {
        Reader(bytes)
    }

    /// The string's length, in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Converts to a `str`, returning an error if the contents are not valid utf-8.
    pub fn to_str(&self) -> Result<&str> {
        Ok(core::str::from_utf8(&self.0)?)
    }

    /// Converts to a `String`, returning an error if the contents are not valid utf-8.
    pub fn to_string(&self) -> Result<String> {
        Ok(self.to_str()?.into())
    }
}

impl<'a> From<&'a str> for Reader<'a> {
    fn from(value: &'a str) -> Self {
        Reader(Cow::Borrowed(value.as_bytes()))
    }
}

impl<'a> From<&'a [u8]> for Reader<'a> {
    fn from(value: &'a [u8]) -> Self {
        Reader(Cow::Borrowed(value))
    }
}

impl PartialEq<&str> for Reader<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl core::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.to_str() {
            Ok(s) => write!(f, "{:?}", s),
            Err(_) => write!(f, "<invalid utf-8: {:?}>", self.as_bytes()),
        }
    }
}

impl<'a> crate::traits::FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        reader.get_text()
    }
}

impl crate::traits::SetPointerBuilder for Reader<'_> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_text(value.to_str()?);
        Ok(())
    }
}

impl crate::traits::SetPointerBuilder for &str {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_text(value);
        Ok(())
    }
}

/// Text inside a message under construction. Has a fixed capacity, chosen when the text was
/// initialized, and a current length.
pub struct Builder<'a> {
    arena: &'a dyn BuilderArena,
    start: ByteCount,
    capacity: u32,
    pos: u32,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(arena: &'a dyn BuilderArena, start: ByteCount, capacity: u32, pos: u32) -> Self {
        Builder {
            arena,
            start,
            capacity,
            pos,
        }
    }

    /// The current length, in bytes.
    pub fn len(&self) -> usize {
        self.pos as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// # Panics
    ///
    /// If the string does not fit in the remaining capacity.
    pub fn push_str(&mut self, string: &str) {
        self.push_bytes(string.as_bytes())
    }

    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        assert!(
            self.pos as usize + bytes.len() <= self.capacity as usize,
            "text of capacity {} cannot hold {} more bytes",
            self.capacity,
            bytes.len()
        );
        self.arena.write_bytes(self.start + self.pos as usize, bytes);
        self.pos += bytes.len() as u32;
    }

    pub fn clear(&mut self) {
        let zeroes = vec![0; self.pos as usize];
        self.arena.write_bytes(self.start, &zeroes);
        self.pos = 0;
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.pos as usize];
        self.arena.read_into(self.start, &mut bytes);
        bytes
    }

    /// Copies out the current contents, returning an error if they are not valid utf-8.
    pub fn to_string(&self) -> Result<String> {
        Ok(String::from_utf8(self.to_bytes()).map_err(|e| e.utf8_error())?)
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            arena: self.arena,
            start: self.start,
            capacity: self.capacity,
            pos: self.pos,
        }
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader(
            self.arena
                .as_reader()
                .read_bytes(0, self.start, self.pos as usize)
                .unwrap_or(Cow::Borrowed(&[])),
        )
    }
}

impl<'a> crate::traits::FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Builder<'a> {
        builder.init_text(size)
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        builder.get_text()
    }
}
