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

//! Struct types written out by hand in the shape the code generator produces.

#![allow(dead_code)]

pub mod point {
    use anyptr::private::layout::{PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize};
    use anyptr::traits::{
        FromPointerBuilder, FromPointerReader, FromStructBuilder, FromStructReader, HasStructSize,
        IntoInternalStructBuilder, IntoInternalStructReader, SetPointerBuilder,
    };
    use anyptr::{text, Result};

    #[derive(Copy, Clone)]
    pub struct Owned(());
    impl anyptr::traits::Owned for Owned {
        type Reader<'a> = Reader<'a>;
        type Builder<'a> = Builder<'a>;
    }
    impl anyptr::traits::OwnedStruct for Owned {
        type Reader<'a> = Reader<'a>;
        type Builder<'a> = Builder<'a>;
    }

    #[derive(Clone, Copy)]
    pub struct Reader<'a> {
        reader: StructReader<'a>,
    }

    impl<'a> FromStructReader<'a> for Reader<'a> {
        fn new(reader: StructReader<'a>) -> Self {
            Self { reader }
        }
    }

    impl<'a> FromPointerReader<'a> for Reader<'a> {
        fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Self> {
            Ok(FromStructReader::new(reader.get_struct()?))
        }
    }

    impl<'a> IntoInternalStructReader<'a> for Reader<'a> {
        fn into_internal_struct_reader(self) -> StructReader<'a> {
            self.reader
        }
    }

    impl SetPointerBuilder for Reader<'_> {
        fn set_pointer_builder(mut builder: PointerBuilder<'_>, value: Self) -> Result<()> {
            builder.set_struct(&value.reader)
        }
    }

    impl<'a> Reader<'a> {
        pub fn total_size(&self) -> Result<anyptr::MessageSize> {
            self.reader.total_size()
        }
        #[inline]
        pub fn get_x(self) -> i32 {
            self.reader.get_data_field::<i32>(0)
        }
        #[inline]
        pub fn get_y(self) -> i32 {
            self.reader.get_data_field::<i32>(1)
        }
        #[inline]
        pub fn get_label(self) -> Result<text::Reader<'a>> {
            FromPointerReader::get_from_pointer(&self.reader.get_pointer_field(0))
        }
        pub fn has_label(&self) -> bool {
            !self.reader.get_pointer_field(0).is_null()
        }
    }

    pub struct Builder<'a> {
        builder: StructBuilder<'a>,
    }

    impl HasStructSize for Builder<'_> {
        const STRUCT_SIZE: StructSize = StructSize {
            data: 1,
            pointers: 1,
        };
    }

    impl<'a> FromStructBuilder<'a> for Builder<'a> {
        fn new(builder: StructBuilder<'a>) -> Self {
            Self { builder }
        }
    }

    impl<'a> IntoInternalStructBuilder<'a> for Builder<'a> {
        fn into_internal_struct_builder(self) -> StructBuilder<'a> {
            self.builder
        }
    }

    impl<'a> FromPointerBuilder<'a> for Builder<'a> {
        fn init_pointer(builder: PointerBuilder<'a>, _size: u32) -> Self {
            FromStructBuilder::new(builder.init_struct(<Self as HasStructSize>::STRUCT_SIZE))
        }
        fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Self> {
            Ok(FromStructBuilder::new(
                builder.get_struct(<Self as HasStructSize>::STRUCT_SIZE)?,
            ))
        }
    }

    impl<'a> Builder<'a> {
        pub fn into_reader(self) -> Reader<'a> {
            FromStructReader::new(self.builder.into_reader())
        }
        pub fn reborrow(&mut self) -> Builder<'_> {
            Builder {
                builder: self.builder.reborrow(),
            }
        }
        pub fn reborrow_as_reader(&self) -> Reader<'_> {
            FromStructReader::new(self.builder.as_reader())
        }
        #[inline]
        pub fn get_x(&self) -> i32 {
            self.builder.get_data_field::<i32>(0)
        }
        #[inline]
        pub fn set_x(&mut self, value: i32) {
            self.builder.set_data_field::<i32>(0, value);
        }
        #[inline]
        pub fn get_y(&self) -> i32 {
            self.builder.get_data_field::<i32>(1)
        }
        #[inline]
        pub fn set_y(&mut self, value: i32) {
            self.builder.set_data_field::<i32>(1, value);
        }
        #[inline]
        pub fn get_label(self) -> Result<text::Builder<'a>> {
            FromPointerBuilder::get_from_pointer(self.builder.get_pointer_field(0))
        }
        #[inline]
        pub fn set_label(&mut self, value: &str) {
            self.builder.get_pointer_field_mut(0).set_text(value);
        }
        pub fn has_label(&self) -> bool {
            !self.builder.as_reader().get_pointer_field(0).is_null()
        }
    }
}

pub mod node {
    use anyptr::private::layout::{PointerBuilder, PointerReader, StructBuilder, StructReader, StructSize};
    use anyptr::traits::{
        FromPointerBuilder, FromPointerReader, FromStructBuilder, FromStructReader, HasStructSize,
        IntoInternalStructBuilder, IntoInternalStructReader, SetPointerBuilder,
    };
    use anyptr::orphan::Orphan;
    use anyptr::{any_pointer, Result};

    #[derive(Copy, Clone)]
    pub struct Owned(());
    impl anyptr::traits::Owned for Owned {
        type Reader<'a> = Reader<'a>;
        type Builder<'a> = Builder<'a>;
    }
    impl anyptr::traits::OwnedStruct for Owned {
        type Reader<'a> = Reader<'a>;
        type Builder<'a> = Builder<'a>;
    }
    impl anyptr::traits::Pipelined for Owned {
        type Pipeline = Pipeline;
    }

    #[derive(Clone, Copy)]
    pub struct Reader<'a> {
        reader: StructReader<'a>,
    }

    impl<'a> FromStructReader<'a> for Reader<'a> {
        fn new(reader: StructReader<'a>) -> Self {
            Self { reader }
        }
    }

    impl<'a> FromPointerReader<'a> for Reader<'a> {
        fn get_from_pointer(reader: &PointerReader<'a>) -> Result<Self> {
            Ok(FromStructReader::new(reader.get_struct()?))
        }
    }

    impl<'a> IntoInternalStructReader<'a> for Reader<'a> {
        fn into_internal_struct_reader(self) -> StructReader<'a> {
            self.reader
        }
    }

    impl SetPointerBuilder for Reader<'_> {
        fn set_pointer_builder(mut builder: PointerBuilder<'_>, value: Self) -> Result<()> {
            builder.set_struct(&value.reader)
        }
    }

    impl<'a> Reader<'a> {
        #[inline]
        pub fn get_value(self) -> u64 {
            self.reader.get_data_field::<u64>(0)
        }
        #[inline]
        pub fn get_next(self) -> Result<Reader<'a>> {
            FromPointerReader::get_from_pointer(&self.reader.get_pointer_field(0))
        }
        #[inline]
        pub fn get_payload(self) -> any_pointer::Reader<'a> {
            any_pointer::Reader::new(self.reader.get_pointer_field(1))
        }
    }

    pub struct Builder<'a> {
        builder: StructBuilder<'a>,
    }

    impl HasStructSize for Builder<'_> {
        const STRUCT_SIZE: StructSize = StructSize {
            data: 1,
            pointers: 2,
        };
    }

    impl<'a> FromStructBuilder<'a> for Builder<'a> {
        fn new(builder: StructBuilder<'a>) -> Self {
            Self { builder }
        }
    }

    impl<'a> IntoInternalStructBuilder<'a> for Builder<'a> {
        fn into_internal_struct_builder(self) -> StructBuilder<'a> {
            self.builder
        }
    }

    impl<'a> FromPointerBuilder<'a> for Builder<'a> {
        fn init_pointer(builder: PointerBuilder<'a>, _size: u32) -> Self {
            FromStructBuilder::new(builder.init_struct(<Self as HasStructSize>::STRUCT_SIZE))
        }
        fn get_from_pointer(builder: PointerBuilder<'a>) -> Result<Self> {
            Ok(FromStructBuilder::new(
                builder.get_struct(<Self as HasStructSize>::STRUCT_SIZE)?,
            ))
        }
    }

    impl<'a> Builder<'a> {
        pub fn into_reader(self) -> Reader<'a> {
            FromStructReader::new(self.builder.into_reader())
        }
        pub fn reborrow(&mut self) -> Builder<'_> {
            Builder {
                builder: self.builder.reborrow(),
            }
        }
        #[inline]
        pub fn get_value(&self) -> u64 {
            self.builder.get_data_field::<u64>(0)
        }
        #[inline]
        pub fn set_value(&mut self, value: u64) {
            self.builder.set_data_field::<u64>(0, value);
        }
        #[inline]
        pub fn init_next(self) -> Builder<'a> {
            FromPointerBuilder::init_pointer(self.builder.get_pointer_field(0), 0)
        }
        #[inline]
        pub fn get_next(self) -> Result<Builder<'a>> {
            FromPointerBuilder::get_from_pointer(self.builder.get_pointer_field(0))
        }
        #[inline]
        pub fn get_payload(self) -> any_pointer::Builder<'a> {
            any_pointer::Builder::new(self.builder.get_pointer_field(1))
        }
        pub fn has_payload(&self) -> bool {
            !self.builder.as_reader().get_pointer_field(1).is_null()
        }
        pub fn disown_payload(&mut self) -> Orphan<'a, any_pointer::Owned> {
            any_pointer::Builder::new(self.builder.get_pointer_field(1)).disown()
        }
        pub fn adopt_payload<T: anyptr::traits::Owned>(&mut self, orphan: Orphan<'a, T>) {
            any_pointer::Builder::new(self.builder.get_pointer_field(1)).adopt(orphan)
        }
    }

    pub struct Pipeline {
        typeless: any_pointer::Pipeline,
    }

    impl anyptr::capability::FromTypelessPipeline for Pipeline {
        fn new(typeless: any_pointer::Pipeline) -> Self {
            Self { typeless }
        }
    }

    impl Pipeline {
        pub fn get_next(&self) -> Pipeline {
            anyptr::capability::FromTypelessPipeline::new(self.typeless.get_pointer_field(0))
        }
        pub fn get_payload(&self) -> any_pointer::Pipeline {
            self.typeless.get_pointer_field(1)
        }
    }
}
