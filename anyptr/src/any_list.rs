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

//! List whose element type is not known statically.

use crate::private::layout::{ListBuilder, ListReader, PointerBuilder, PointerReader};
use crate::traits::{
    FromListBuilder, FromListReader, FromPointerBuilder, FromPointerReader,
    IntoInternalListReader,
};
use crate::Result;

pub use crate::private::layout::ElementSize;

#[derive(Clone, Copy)]
pub struct Owned;

impl crate::traits::Owned for Owned {
    type Reader<'a> = Reader<'a>;
    type Builder<'a> = Builder<'a>;
}

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: ListReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: ListReader<'a>) -> Self {
        Self { reader }
    }

    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How the elements are encoded in the message.
    pub fn get_element_size(&self) -> ElementSize {
        self.reader.get_element_size()
    }

    /// Reinterprets the list as a `T` without checking that the element sizes agree.
    /// Elements of a mismatched view read as garbage, but never from outside the message.
    pub fn downcast<T: FromListReader<'a>>(self) -> T {
        T::new(self.reader)
    }
}

impl<'a, T> From<T> for Reader<'a>
where
    T: IntoInternalListReader<'a>,
{
    fn from(value: T) -> Self {
        Reader::new(value.into_internal_list_reader())
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        Ok(Reader::new(reader.get_list_any_size()?))
    }
}

impl crate::traits::SetPointerBuilder for Reader<'_> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_list(&value.reader)
    }
}

impl core::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("any_list::Reader")
            .field("element_size", &self.get_element_size())
            .field("len", &self.len())
            .finish()
    }
}

pub struct Builder<'a> {
    builder: ListBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(builder: ListBuilder<'a>) -> Self {
        Self { builder }
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_element_size(&self) -> ElementSize {
        self.builder.get_element_size()
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            builder: self.builder.reborrow(),
        }
    }

    pub fn as_reader(&self) -> Reader<'_> {
        Reader {
            reader: self.builder.as_reader(),
        }
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader {
            reader: self.builder.into_reader(),
        }
    }

    /// Reinterprets the list as a `T` without checking that the element sizes agree.
    pub fn downcast<T: FromListBuilder<'a>>(self) -> T {
        T::new(self.builder)
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    /// Initializes a list of `len` void elements. Use
    /// `any_pointer::Builder::init_as_any_list()` to pick the element size.
    fn init_pointer(builder: PointerBuilder<'a>, len: u32) -> Builder<'a> {
        Builder::new(builder.init_list(ElementSize::Void, len))
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        Ok(Builder::new(builder.get_list_any_size()?))
    }
}
