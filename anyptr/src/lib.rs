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

//! # anyptr
//!
//! Type-erased access to the pointers of a Cap'n Proto-style message.
//!
//! A pointer slot may hold a struct, a list, a capability, or nothing at all.
//! [`any_pointer`] lets you look at such a slot without knowing its shape up
//! front, reinterpret it as a concrete type, copy into it, or detach its
//! referent into an [`orphan::Orphan`] and reattach it somewhere else
//! without copying any bytes. [`any_struct`] and [`any_list`] expose the raw
//! sections of structs and lists whose layout is not known statically, and
//! [`any_pointer::Pipeline`] lets an RPC caller name a sub-object of a call
//! result that has not arrived yet.

pub mod any_list;
pub mod any_pointer;
pub mod any_pointer_list;
pub mod any_struct;
pub mod any_struct_list;
pub mod capability;
pub mod data;
pub mod message;
pub mod orphan;
pub mod primitive_list;
pub mod serialize;
pub mod struct_list;
pub mod text;
pub mod traits;

#[doc(hidden)]
pub mod private;

/// Size of a message. Every generated struct has a method `.total_size()` that returns this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MessageSize {
    pub word_count: u64,

    /// Size of the capability table.
    pub cap_count: u32,
}

impl MessageSize {
    pub fn plus_eq(&mut self, other: MessageSize) {
        self.word_count += other.word_count;
        self.cap_count += other.cap_count;
    }
}

impl core::ops::AddAssign for MessageSize {
    fn add_assign(&mut self, rhs: Self) {
        self.plus_eq(rhs);
    }
}

/// Because messages are lazily validated, the return type of any method that reads a pointer field
/// must be wrapped in a Result.
pub type Result<T> = core::result::Result<T, Error>;

/// Describes an arbitrary error that prevented an operation from completing.
#[derive(Debug, Clone)]
pub struct Error {
    /// The general kind of the error. Code that decides how to respond to an error
    /// should read only this field in making its decision.
    pub kind: ErrorKind,

    /// Extra context about the error.
    pub extra: String,
}

/// The general nature of an error. The purpose of this enum is not to describe the error itself,
/// but rather to describe how the client might want to respond to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Something went wrong
    Failed,

    /// The call failed because of a temporary lack of resources. This could be space resources
    /// (out of memory, out of disk space) or time resources (request queue overflow, operation
    /// timed out).
    ///
    /// The operation might work if tried again, but it should NOT be repeated immediately as this
    /// may simply exacerbate the problem.
    Overloaded,

    /// The call required communication over a connection that has been lost. The callee will need
    /// to re-establish connections and try again.
    Disconnected,

    /// The requested method is not implemented. The caller may wish to revert to a fallback
    /// approach based on other methods.
    Unimplemented,

    /// Message ends prematurely. Header claims {} words, but message only has {} words.
    MessageEndsPrematurely(usize, usize),

    /// Message is too deeply nested.
    MessageIsTooDeeplyNested,

    /// Message contains a pointer that is out of bounds.
    MessageContainsOutOfBoundsPointer,

    /// Message contains too many segments: {}.
    MessageHasTooManySegments(usize),

    /// Read limit exceeded.
    ReadLimitExceeded,

    /// InlineComposite list with a non-STRUCT element tag.
    InlineCompositeListsOfNonStructTypeAreNotSupported,

    /// InlineComposite list's elements overrun its word count.
    InlineCompositeListOverrunsItsWordCount,

    /// Message contains a far pointer whose landing pad is not itself a far pointer.
    DoubleFarPointersNotSupported,

    /// Message contains non-capability pointer where capability pointer was expected.
    MessageContainsNonCapabilityPointerWhereCapabilityPointerWasExpected,

    /// Message contains a capability pointer whose index is not in the capability table.
    MessageContainsInvalidCapabilityPointer,

    /// Message contains null capability pointer.
    MessageContainsNullCapabilityPointer,

    /// Message contains a pointer of an unknown kind.
    UnknownPointerType,

    /// Message contains text that is not NUL-terminated.
    TextBlobMissingNULTerminator,

    /// Text contains non-utf8 data.
    TextContainsNonUtf8Data(core::str::Utf8Error),

    /// Message segment table is too large.
    SegmentTableTooLarge,

    /// Too few segments were returned for the given segment count.
    InvalidNumberOfSegments(usize),

    /// Premature end of file.
    PrematureEndOfFile,

    /// Message contains a far pointer where a struct or list pointer was expected.
    UnexpectedFarPointer,

    /// Invalid segment id: {}.
    InvalidSegmentId(u32),

    /// Tried to read from null arena.
    TriedToReadFromNullArena,
}

impl Error {
    /// Creates a new error with the given kind and no extra context.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            kind,
            extra: String::new(),
        }
    }

    pub fn failed(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Failed,
        }
    }

    pub fn overloaded(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Overloaded,
        }
    }

    pub fn disconnected(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Disconnected,
        }
    }

    pub fn unimplemented(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Unimplemented,
        }
    }

    /// Appends context to the error.
    pub fn context(mut self, context: String) -> Self {
        if self.extra.is_empty() {
            self.extra = context;
        } else {
            self.extra = format!("{context}: {}", self.extra);
        }
        self
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Failed => write!(fmt, "Failed"),
            Self::Overloaded => write!(fmt, "Overloaded"),
            Self::Disconnected => write!(fmt, "Disconnected"),
            Self::Unimplemented => write!(fmt, "Unimplemented"),
            Self::MessageEndsPrematurely(header, body) => write!(
                fmt,
                "Message ends prematurely. Header claimed {header} words, but message only has {body} words"
            ),
            Self::MessageIsTooDeeplyNested => write!(fmt, "Message is too deeply nested."),
            Self::MessageContainsOutOfBoundsPointer => {
                write!(fmt, "Message contains out-of-bounds pointer")
            }
            Self::MessageHasTooManySegments(count) => {
                write!(fmt, "Message has too many segments: {count}")
            }
            Self::ReadLimitExceeded => write!(fmt, "Read limit exceeded"),
            Self::InlineCompositeListsOfNonStructTypeAreNotSupported => write!(
                fmt,
                "InlineComposite lists of non-STRUCT type are not supported."
            ),
            Self::InlineCompositeListOverrunsItsWordCount => {
                write!(fmt, "InlineComposite list's elements overrun its word count.")
            }
            Self::DoubleFarPointersNotSupported => {
                write!(fmt, "Second word of double-far pad must be far pointer.")
            }
            Self::MessageContainsNonCapabilityPointerWhereCapabilityPointerWasExpected => write!(
                fmt,
                "Message contains non-capability pointer where capability pointer was expected."
            ),
            Self::MessageContainsInvalidCapabilityPointer => {
                write!(fmt, "Message contains invalid capability pointer.")
            }
            Self::MessageContainsNullCapabilityPointer => {
                write!(fmt, "Message contains null capability pointer.")
            }
            Self::UnknownPointerType => write!(fmt, "Unknown pointer type."),
            Self::TextBlobMissingNULTerminator => {
                write!(fmt, "Message contains text that is not NUL-terminated.")
            }
            Self::TextContainsNonUtf8Data(e) => write!(fmt, "Text contains non-utf8 data: {e}"),
            Self::SegmentTableTooLarge => write!(fmt, "Segment table is too large."),
            Self::InvalidNumberOfSegments(count) => {
                write!(fmt, "Too few segments: {count}")
            }
            Self::PrematureEndOfFile => write!(fmt, "Premature end of file"),
            Self::UnexpectedFarPointer => write!(fmt, "Unexpected FAR pointer."),
            Self::InvalidSegmentId(id) => write!(fmt, "Invalid segment id: {id}"),
            Self::TriedToReadFromNullArena => write!(fmt, "Tried to read from null arena"),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        if self.extra.is_empty() {
            write!(fmt, "{}", self.kind)
        } else {
            write!(fmt, "{}: {}", self.kind, self.extra)
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io;
        let kind = match err.kind() {
            io::ErrorKind::TimedOut => ErrorKind::Overloaded,
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected => ErrorKind::Disconnected,
            io::ErrorKind::UnexpectedEof => ErrorKind::PrematureEndOfFile,
            _ => ErrorKind::Failed,
        };
        Self {
            extra: format!("{err}"),
            kind,
        }
    }
}

impl From<core::str::Utf8Error> for Error {
    fn from(err: core::str::Utf8Error) -> Self {
        Self::from_kind(ErrorKind::TextContainsNonUtf8Data(err))
    }
}
