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

//! List of structs whose layout is not known statically.

use crate::private::layout::{
    ElementSize, ListBuilder, ListReader, PointerBuilder, PointerReader, StructSize,
};
use crate::traits::{FromPointerBuilder, FromPointerReader, IndexMove, ListIter};
use crate::{any_struct, Result};

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
    pub fn len(&self) -> u32 {
        self.reader.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(self) -> ListIter<Reader<'a>, any_struct::Reader<'a>> {
        let l = self.len();
        ListIter::new(self, l)
    }

    /// Gets the element at position `index`. Panics if `index` is greater than or
    /// equal to `len()`.
    pub fn get(self, index: u32) -> any_struct::Reader<'a> {
        assert!(
            index < self.len(),
            "index {index} out of bounds for list of length {}",
            self.len()
        );
        any_struct::Reader::new(self.reader.get_struct_element(index))
    }

    /// Gets the element at position `index`. Returns `None` if `index`
    /// is greater than or equal to `len()`.
    pub fn try_get(self, index: u32) -> Option<any_struct::Reader<'a>> {
        if index < self.len() {
            Some(any_struct::Reader::new(self.reader.get_struct_element(index)))
        } else {
            None
        }
    }
}

impl<'a> IndexMove<u32, any_struct::Reader<'a>> for Reader<'a> {
    fn index_move(&self, index: u32) -> any_struct::Reader<'a> {
        self.get(index)
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        Ok(Reader {
            reader: reader.get_list(ElementSize::InlineComposite)?,
        })
    }
}

impl<'a> crate::traits::IntoInternalListReader<'a> for Reader<'a> {
    fn into_internal_list_reader(self) -> ListReader<'a> {
        self.reader
    }
}

impl<'a> crate::traits::FromListReader<'a> for Reader<'a> {
    fn new(reader: ListReader<'a>) -> Self {
        Reader { reader }
    }
}

impl crate::traits::SetPointerBuilder for Reader<'_> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.set_list(&value.reader)
    }
}

impl<'a> core::iter::IntoIterator for Reader<'a> {
    type Item = any_struct::Reader<'a>;
    type IntoIter = ListIter<Reader<'a>, Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Builder<'a> {
    builder: ListBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(builder: ListBuilder<'a>) -> Self {
        Builder { builder }
    }

    pub fn len(&self) -> u32 {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader {
            reader: self.builder.into_reader(),
        }
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            builder: self.builder.reborrow(),
        }
    }

    /// Gets the element at position `index`. Panics if `index` is greater than or
    /// equal to `len()`.
    pub fn get(self, index: u32) -> any_struct::Builder<'a> {
        assert!(
            index < self.len(),
            "index {index} out of bounds for list of length {}",
            self.len()
        );
        any_struct::Builder::new(self.builder.get_struct_element(index))
    }

    /// Gets the element at position `index`. Returns `None` if `index`
    /// is greater than or equal to `len()`.
    pub fn try_get(self, index: u32) -> Option<any_struct::Builder<'a>> {
        if index < self.len() {
            Some(any_struct::Builder::new(
                self.builder.get_struct_element(index),
            ))
        } else {
            None
        }
    }
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    /// Elements of a list initialized this way are empty structs.
    fn init_pointer(builder: PointerBuilder<'a>, size: u32) -> Builder<'a> {
        Builder {
            builder: builder.init_struct_list(
                size,
                StructSize {
                    data: 0,
                    pointers: 0,
                },
            ),
        }
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        Ok(Builder {
            builder: builder.get_struct_list(StructSize {
                data: 0,
                pointers: 0,
            })?,
        })
    }
}

impl<'a> crate::traits::FromListBuilder<'a> for Builder<'a> {
    fn new(builder: ListBuilder<'a>) -> Self {
        Builder { builder }
    }
}
