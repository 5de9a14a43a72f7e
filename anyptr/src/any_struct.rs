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

//! Struct whose layout is not known statically.
//!
//! An `any_struct` exposes the two sections every struct has: a blob of data
//! words and a list of pointers.

use crate::private::layout::{PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize};
use crate::traits::{
    FromPointerBuilder, FromPointerReader, FromStructBuilder, FromStructReader,
    IntoInternalStructBuilder, IntoInternalStructReader,
};
use crate::{any_pointer, any_pointer_list, data, MessageSize, Result};

#[derive(Copy, Clone)]
pub struct Owned(());

impl crate::traits::Owned for Owned {
    type Reader<'a> = Reader<'a>;
    type Builder<'a> = Builder<'a>;
}

impl crate::traits::Pipelined for Owned {
    type Pipeline = Pipeline;
}

#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: StructReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: StructReader<'a>) -> Self {
        Self { reader }
    }

    /// The data section. Its length is always a multiple of eight bytes, except for a
    /// struct that was read out of a list of booleans.
    pub fn get_data_section(&self) -> data::Reader<'a> {
        self.reader.get_data_section_as_blob()
    }

    pub fn get_pointer_section(&self) -> any_pointer_list::Reader<'a> {
        any_pointer_list::Reader::new(self.reader.get_pointer_section_as_list())
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        self.reader.total_size()
    }

    /// Reinterprets the struct as a `T`. Fields that lie outside of the struct's
    /// sections read as their defaults.
    pub fn downcast<T: FromStructReader<'a>>(self) -> T {
        T::new(self.reader)
    }
}

impl<'a, T> From<T> for Reader<'a>
where
    T: IntoInternalStructReader<'a>,
{
    fn from(value: T) -> Self {
        Reader::new(value.into_internal_struct_reader())
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        Ok(Reader::new(reader.get_struct()?))
    }
}

impl crate::traits::SetPointerBuilder for Reader<'_> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_struct(&value.reader)
    }
}

impl core::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("any_struct::Reader")
            .field("data_bits", &self.reader.get_data_section_size())
            .field("pointers", &self.reader.get_pointer_section_size())
            .finish()
    }
}

pub struct Builder<'a> {
    builder: StructBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(builder: StructBuilder<'a>) -> Self {
        Self { builder }
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

    pub fn get_data_section(self) -> data::Builder<'a> {
        self.builder.get_data_section_as_blob()
    }

    pub fn get_pointer_section(self) -> any_pointer_list::Builder<'a> {
        any_pointer_list::Builder::new(self.builder.get_pointer_section_as_list())
    }

    pub fn total_size(&self) -> Result<MessageSize> {
        self.builder.as_reader().total_size()
    }

    pub fn downcast<T: FromStructBuilder<'a>>(self) -> T {
        T::new(self.builder)
    }
}

impl<'a, T> From<T> for Builder<'a>
where
    T: IntoInternalStructBuilder<'a>,
{
    fn from(value: T) -> Self {
        Builder::new(value.into_internal_struct_builder())
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(builder: PointerBuilder<'a>, _len: u32) -> Builder<'a> {
        Builder::new(builder.init_struct(StructSize {
            data: 0,
            pointers: 0,
        }))
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        Ok(Builder::new(builder.get_struct(StructSize {
            data: 0,
            pointers: 0,
        })?))
    }
}

pub struct Pipeline {
    typeless: any_pointer::Pipeline,
}

impl Pipeline {
    pub fn new(typeless: any_pointer::Pipeline) -> Self {
        Self { typeless }
    }

    /// The field is assumed to hold another struct, so calls chain.
    pub fn get_pointer_field(&self, pointer_index: u16) -> Self {
        Self {
            typeless: self.typeless.get_pointer_field(pointer_index),
        }
    }

    pub fn get_typeless(&self) -> &any_pointer::Pipeline {
        &self.typeless
    }

    pub fn into_typeless(self) -> any_pointer::Pipeline {
        self.typeless
    }
}

impl crate::capability::FromTypelessPipeline for Pipeline {
    fn new(typeless: any_pointer::Pipeline) -> Self {
        Self { typeless }
    }
}

#[cfg(test)]
mod tests {
    use crate::message;

    #[test]
    fn sections_follow_descriptor() {
        let mut message = message::Builder::new_default();
        let root: crate::any_pointer::Builder = message.init_root();
        let mut s = root.init_as_any_struct(2, 3);
        assert_eq!(s.reborrow().get_data_section().len(), 16);
        assert_eq!(s.reborrow().get_pointer_section().len(), 3);

        let reader = s.into_reader();
        assert_eq!(reader.get_data_section().len(), 16);
        assert_eq!(reader.get_pointer_section().len(), 3);
        assert_eq!(reader.total_size().unwrap().word_count, 5);
    }

    #[test]
    fn default_struct_is_empty() {
        let message = message::Builder::new_default();
        let s: super::Reader = message.get_root_as_reader().unwrap();
        assert!(s.get_data_section().is_empty());
        assert!(s.get_pointer_section().is_empty());
    }
}
