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

//! Objects that live in a message but are not reachable from its root.
//!
//! An [`Orphan`] is created by an [`Orphanage`] or by disowning a pointer, and is either
//! adopted into exactly one pointer of the same message or dropped. Moving an object
//! between the two never copies it.

use core::marker::PhantomData;

use crate::private::arena::BuilderArena;
use crate::private::layout::{ElementSize, OrphanBuilder, StructSize};
use crate::traits::{FromPointerBuilder, FromPointerReader, Owned, SetPointerBuilder};
use crate::{any_list, any_pointer, any_struct, any_struct_list, MessageSize, Result};

/// A detached object of type `T`. Dropping an orphan that was never adopted releases
/// the object.
pub struct Orphan<'a, T>
where
    T: Owned,
{
    builder: OrphanBuilder<'a>,
    marker: PhantomData<T>,
}

impl<'a, T> Orphan<'a, T>
where
    T: Owned,
{
    pub(crate) fn new(builder: OrphanBuilder<'a>) -> Self {
        Self {
            builder,
            marker: PhantomData,
        }
    }

    pub(crate) fn into_builder(self) -> OrphanBuilder<'a> {
        self.builder
    }

    /// True if the orphan owns nothing, e.g. because it was disowned from a null pointer.
    pub fn is_null(&self) -> bool {
        self.builder.is_null()
    }

    pub fn get(&mut self) -> Result<T::Builder<'_>> {
        FromPointerBuilder::get_from_pointer(self.builder.as_pointer_builder())
    }

    pub fn get_reader(&self) -> Result<T::Reader<'_>> {
        FromPointerReader::get_from_pointer(&self.builder.as_pointer_reader())
    }

    pub fn target_size(&self) -> Result<MessageSize> {
        self.builder.as_pointer_reader().total_size()
    }

    /// Forgets the static type of the object.
    pub fn into_any(self) -> Orphan<'a, any_pointer::Owned> {
        Orphan::new(self.builder)
    }
}

impl<'a> Orphan<'a, any_pointer::Owned> {
    pub fn get_as<U: Owned>(&mut self) -> Result<U::Builder<'_>> {
        FromPointerBuilder::get_from_pointer(self.builder.as_pointer_builder())
    }

    pub fn get_as_reader<U: Owned>(&self) -> Result<U::Reader<'_>> {
        FromPointerReader::get_from_pointer(&self.builder.as_pointer_reader())
    }

    /// Gives the object a static type. Ownership moves to the returned orphan.
    pub fn release_as<U: Owned>(self) -> Orphan<'a, U> {
        Orphan::new(self.builder)
    }
}

/// Creates orphans inside one particular message.
#[derive(Clone, Copy)]
pub struct Orphanage<'a> {
    arena: &'a dyn BuilderArena,
}

impl<'a> Orphanage<'a> {
    pub(crate) fn new(arena: &'a dyn BuilderArena) -> Self {
        Self { arena }
    }

    /// Creates an orphan holding a freshly initialized `T`. Lists are empty.
    pub fn new_orphan<T: Owned>(&self) -> Orphan<'a, T> {
        self.new_orphan_sized::<T>(0)
    }

    /// Creates an orphan holding a freshly initialized `T`. For list types, `len` is the
    /// number of elements; it is ignored for everything else.
    pub fn new_orphan_sized<T: Owned>(&self, len: u32) -> Orphan<'a, T> {
        let mut builder = OrphanBuilder::new(self.arena);
        let _: T::Builder<'_> = FromPointerBuilder::init_pointer(builder.as_pointer_builder(), len);
        Orphan::new(builder)
    }

    pub fn new_any_struct_orphan(
        &self,
        data_words: u16,
        pointers: u16,
    ) -> Orphan<'a, any_struct::Owned> {
        let mut builder = OrphanBuilder::new(self.arena);
        builder.as_pointer_builder().init_struct(StructSize {
            data: data_words,
            pointers,
        });
        Orphan::new(builder)
    }

    /// # Panics
    ///
    /// If `element_size` is `InlineComposite`; use `new_struct_list_orphan()` for those.
    pub fn new_any_list_orphan(
        &self,
        element_size: ElementSize,
        len: u32,
    ) -> Orphan<'a, any_list::Owned> {
        let mut builder = OrphanBuilder::new(self.arena);
        builder.as_pointer_builder().init_list(element_size, len);
        Orphan::new(builder)
    }

    pub fn new_struct_list_orphan(
        &self,
        data_words: u16,
        pointers: u16,
        len: u32,
    ) -> Orphan<'a, any_struct_list::Owned> {
        let mut builder = OrphanBuilder::new(self.arena);
        builder.as_pointer_builder().init_struct_list(
            len,
            StructSize {
                data: data_words,
                pointers,
            },
        );
        Orphan::new(builder)
    }

    /// Creates an orphan holding a deep copy of `value`, which may come from any message.
    pub fn new_orphan_copy<T: Owned>(&self, value: T::Reader<'_>) -> Result<Orphan<'a, T>> {
        let mut builder = OrphanBuilder::new(self.arena);
        SetPointerBuilder::set_pointer_builder(builder.as_pointer_builder(), value)?;
        Ok(Orphan::new(builder))
    }
}
