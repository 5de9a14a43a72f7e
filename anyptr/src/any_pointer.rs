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

//! Dynamically typed value.

use crate::capability::FromClientHook;
use crate::orphan::{Orphan, Orphanage};
use crate::private::capability::{ClientHook, PipelineHook, PipelineOp};
use crate::private::layout::{ElementSize, PointerBuilder, PointerReader, StructSize};
use crate::traits::{FromPointerBuilder, FromPointerReader, SetPointerBuilder};
use crate::{any_list, any_struct, any_struct_list, Result};

pub use crate::private::layout::PointerType;

#[derive(Copy, Clone)]
pub struct Owned(());

impl crate::traits::Owned for Owned {
    type Reader<'a> = Reader<'a>;
    type Builder<'a> = Builder<'a>;
}

impl crate::traits::Pipelined for Owned {
    type Pipeline = Pipeline;
}

#[derive(Copy, Clone)]
pub struct Reader<'a> {
    reader: PointerReader<'a>,
}

impl<'a> Reader<'a> {
    pub fn new(reader: PointerReader<'_>) -> Reader<'_> {
        Reader { reader }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.reader.is_null()
    }

    pub fn get_pointer_type(&self) -> Result<PointerType> {
        self.reader.get_pointer_type()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.get_pointer_type(), Ok(PointerType::Struct))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.get_pointer_type(), Ok(PointerType::List))
    }

    pub fn is_capability(&self) -> bool {
        matches!(self.get_pointer_type(), Ok(PointerType::Capability))
    }

    /// Gets the total size of the target and all of its children. Does not count far pointer overhead.
    pub fn target_size(&self) -> Result<crate::MessageSize> {
        self.reader.total_size()
    }

    /// Interprets the target as a `T`. If the target has some other shape, the default
    /// value of `T` is returned.
    #[inline]
    pub fn get_as<T: FromPointerReader<'a>>(&self) -> Result<T> {
        T::get_from_pointer(&self.reader)
    }

    pub fn get_as_capability<T: FromClientHook>(&self) -> Result<T> {
        Ok(FromClientHook::new(self.reader.get_capability()?))
    }

    //# Used by RPC system to implement pipelining. Applications
    //# generally shouldn't use this directly.
    pub fn get_pipelined_cap(&self, ops: &[PipelineOp]) -> Result<Box<dyn ClientHook>> {
        let mut pointer = self.reader;

        for op in ops {
            match *op {
                PipelineOp::Noop => {}
                PipelineOp::GetPointerField(idx) => {
                    pointer = pointer.get_struct()?.get_pointer_field(idx as usize);
                }
            }
        }

        pointer.get_capability()
    }
}

impl<'a> FromPointerReader<'a> for Reader<'a> {
    fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Reader<'a>> {
        Ok(Reader { reader: *reader })
    }
}

impl crate::traits::SetPointerBuilder for Reader<'_> {
    fn set_pointer_builder(mut pointer: PointerBuilder<'_>, value: Self) -> Result<()> {
        pointer.copy_from(value.reader)
    }
}

impl core::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self.get_pointer_type() {
            Ok(pointer_type) => write!(f, "any_pointer::Reader({pointer_type:?})"),
            Err(e) => write!(f, "any_pointer::Reader(<{e}>)"),
        }
    }
}

pub struct Builder<'a> {
    builder: PointerBuilder<'a>,
}

impl<'a> Builder<'a> {
    pub fn new(builder: PointerBuilder<'a>) -> Builder<'a> {
        Builder { builder }
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            builder: self.builder.reborrow(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.builder.is_null()
    }

    pub fn get_pointer_type(&self) -> Result<PointerType> {
        self.builder.as_reader().get_pointer_type()
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.get_pointer_type(), Ok(PointerType::Struct))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.get_pointer_type(), Ok(PointerType::List))
    }

    pub fn is_capability(&self) -> bool {
        matches!(self.get_pointer_type(), Ok(PointerType::Capability))
    }

    /// Gets the total size of the target and all of its children. Does not count far pointer overhead.
    pub fn target_size(&self) -> Result<crate::MessageSize> {
        self.builder.as_reader().total_size()
    }

    /// Interprets the target as a `T`. A struct that is smaller than `T` expects is
    /// reallocated at the larger size.
    pub fn get_as<T: FromPointerBuilder<'a>>(self) -> Result<T> {
        FromPointerBuilder::get_from_pointer(self.builder)
    }

    pub fn init_as<T: FromPointerBuilder<'a>>(self) -> T {
        FromPointerBuilder::init_pointer(self.builder, 0)
    }

    pub fn initn_as<T: FromPointerBuilder<'a>>(self, size: u32) -> T {
        FromPointerBuilder::init_pointer(self.builder, size)
    }

    /// Initializes the target as a struct with the given section sizes.
    pub fn init_as_any_struct(self, data_words: u16, pointers: u16) -> any_struct::Builder<'a> {
        any_struct::Builder::new(self.builder.init_struct(StructSize {
            data: data_words,
            pointers,
        }))
    }

    /// Initializes the target as a list of `len` elements of the given size.
    ///
    /// # Panics
    ///
    /// If `element_size` is `InlineComposite`; use `init_as_list_of_any_struct()` for those.
    pub fn init_as_any_list(self, element_size: ElementSize, len: u32) -> any_list::Builder<'a> {
        any_list::Builder::new(self.builder.init_list(element_size, len))
    }

    /// Initializes the target as a list of `len` structs with the given section sizes.
    pub fn init_as_list_of_any_struct(
        self,
        data_words: u16,
        pointers: u16,
        len: u32,
    ) -> any_struct_list::Builder<'a> {
        any_struct_list::Builder::new(self.builder.init_struct_list(
            len,
            StructSize {
                data: data_words,
                pointers,
            },
        ))
    }

    /// Sets the target to a deep copy of `value`.
    pub fn set_as<From: SetPointerBuilder>(self, value: From) -> Result<()> {
        SetPointerBuilder::set_pointer_builder(self.builder, value)
    }

    /// Sets the target to a deep copy of whatever `value` points to.
    pub fn set(&mut self, value: Reader) -> Result<()> {
        self.builder.copy_from(value.reader)
    }

    pub fn set_as_capability(&mut self, value: Box<dyn ClientHook>) {
        self.builder.set_capability(value);
    }

    pub fn get_as_capability<T: FromClientHook>(&self) -> Result<T> {
        Ok(FromClientHook::new(self.builder.get_capability()?))
    }

    #[inline]
    pub fn clear(&mut self) {
        self.builder.clear()
    }

    /// Makes the target the orphan's object, without copying it. Whatever the target used to
    /// be is released.
    ///
    /// # Panics
    ///
    /// If the orphan belongs to a different message.
    pub fn adopt<T: crate::traits::Owned>(&mut self, orphan: Orphan<'a, T>) {
        self.builder.adopt(orphan.into_builder());
    }

    /// Detaches the target, which is left null, without copying it.
    pub fn disown_as<T: crate::traits::Owned>(&mut self) -> Orphan<'a, T> {
        Orphan::new(self.builder.disown())
    }

    pub fn disown(&mut self) -> Orphan<'a, Owned> {
        self.disown_as::<Owned>()
    }

    /// Returns a factory for objects in the message that contains this pointer.
    pub fn get_orphanage(&self) -> Orphanage<'a> {
        Orphanage::new(self.builder.arena())
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
}

impl<'a> FromPointerBuilder<'a> for Builder<'a> {
    fn init_pointer(mut builder: PointerBuilder<'a>, _len: u32) -> Builder<'a> {
        if !builder.is_null() {
            builder.clear();
        }
        Builder { builder }
    }

    fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Builder<'a>> {
        Ok(Builder { builder })
    }
}

/// A reference to a value inside the results of a call that may not have returned yet.
pub struct Pipeline {
    hook: Box<dyn PipelineHook>,
    ops: Vec<PipelineOp>,
}

impl Pipeline {
    pub fn new(hook: Box<dyn PipelineHook>) -> Self {
        Self {
            hook,
            ops: Vec::new(),
        }
    }

    /// A second reference to the same value.
    pub fn noop(&self) -> Self {
        Self {
            hook: self.hook.add_ref(),
            ops: self.ops.clone(),
        }
    }

    pub fn ops(&self) -> &[PipelineOp] {
        &self.ops
    }

    pub fn get_pointer_field(&self, pointer_index: u16) -> Self {
        let mut new_ops = Vec::with_capacity(self.ops.len() + 1);
        new_ops.extend_from_slice(&self.ops);
        new_ops.push(PipelineOp::GetPointerField(pointer_index));
        Self {
            hook: self.hook.add_ref(),
            ops: new_ops,
        }
    }

    /// Like `get_pointer_field()`, but reuses this pipeline's path.
    pub fn into_pointer_field(mut self, pointer_index: u16) -> Self {
        self.ops.push(PipelineOp::GetPointerField(pointer_index));
        self
    }

    pub fn as_cap(&self) -> Box<dyn ClientHook> {
        self.hook.get_pipelined_cap(&self.ops)
    }

    pub fn into_cap(self) -> Box<dyn ClientHook> {
        self.hook.get_pipelined_cap_move(self.ops)
    }

    /// Views the value as a struct whose fields are not known statically.
    pub fn as_any_struct(&self) -> any_struct::Pipeline {
        any_struct::Pipeline::new(self.noop())
    }

    /// Gives up the path, returning the underlying hook.
    pub fn release_pipeline_hook(self) -> Box<dyn PipelineHook> {
        self.hook
    }
}

impl crate::capability::FromTypelessPipeline for Pipeline {
    fn new(typeless: Pipeline) -> Self {
        typeless
    }
}
