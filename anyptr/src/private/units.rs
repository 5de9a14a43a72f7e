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

pub type BitCount32 = u32;
pub type BitCount64 = u64;

pub type ByteCount = usize;
pub type ByteCount32 = u32;

pub type WordCount = usize;
pub type WordCount16 = u16;
pub type WordCount32 = u32;

pub type ElementCount = usize;
pub type ElementCount32 = u32;

pub type WirePointerCount = usize;
pub type WirePointerCount16 = u16;
pub type WirePointerCount32 = u32;

/// Position of a word within a segment.
pub type WordIndex = u32;

pub const BITS_PER_BYTE: usize = 8;
pub const BITS_PER_WORD: usize = 64;
pub const BYTES_PER_WORD: ByteCount = 8;

pub const BITS_PER_POINTER: usize = 64;
pub const POINTER_SIZE_IN_WORDS: WordCount = 1;

pub fn bits_per_element<T>() -> usize {
    8 * core::mem::size_of::<T>()
}
