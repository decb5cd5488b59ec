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

//! # Cap'n Proto message arena
//!
//! Runtime support for the [Cap'n Proto](https://capnproto.org) wire format:
//! a segmented arena that owns the message bytes, the pointer codec that
//! addresses objects inside it, reader and builder views over structs and
//! lists, stream framing, and the packing codec.
//!
//! Views never own data. A [`StructReader`] or [`ListBuilder`] is a
//! `(segment id, byte offset)` pair plus sizes, resolved against the
//! [`Message`]'s arena on every access.
//!
//! ```
//! use capnp_arena::{message::Message, StructSize};
//!
//! let mut message = Message::new_default();
//! let mut root = message.init_root(StructSize::new(1, 1)).unwrap();
//! root.set_data_field::<u16>(0, 7).unwrap();
//! root.reborrow().set_text(0, "hello").unwrap();
//!
//! let bytes = message.to_bytes();
//! let read = Message::from_bytes(&bytes, Default::default()).unwrap();
//! let root = read.get_root_as_reader().unwrap();
//! assert_eq!(root.get_data_field::<u16>(0), 7);
//! assert_eq!(root.get_text(0, None).unwrap().to_str().unwrap(), "hello");
//! ```

extern crate alloc;

use alloc::string::String;

pub mod any_list;
pub mod any_struct;
pub mod capability;
pub mod data;
pub mod dynamic_struct;
pub mod dynamic_value;
pub mod message;
pub mod pointer;
pub mod primitive_list;
pub mod schema;
pub mod serialize;
pub mod serialize_packed;
pub mod struct_list;
pub mod text;
pub mod traits;

#[doc(hidden)]
pub mod private;

pub use any_list::{ListBuilder, ListReader, PrimitiveElement};
pub use any_struct::{StructBuilder, StructReader};
pub use message::Message;
pub use pointer::{PointerBuilder, PointerReader, PointerType};
pub use private::layout::{ElementSize, Orphan, StructSize};

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

/// The used bytes of each segment of a message, in segment id order.
pub type OutputSegments<'a> = alloc::vec::Vec<&'a [u8]>;

/// Because messages are lazily validated, the return type of any method that reads a pointer field
/// must be wrapped in a Result.
pub type Result<T> = ::core::result::Result<T, Error>;

/// Describes an arbitrary error that prevented an operation from completing.
#[derive(Debug, Clone)]
pub struct Error {
    /// The general kind of the error. Code that decides how to respond to an error
    /// should read only this field in making its decision.
    pub kind: ErrorKind,

    /// Extra context about error
    pub extra: String,
}

/// The general nature of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Something went wrong
    Failed,

    /// A pointer or byte offset lies outside its segment.
    BoundsError,

    /// A data field offset lies outside the struct's data section.
    DataOutOfBounds,

    /// A pointer field index lies outside the struct's pointer section.
    PointerOutOfBounds,

    /// A pointer is not of the kind, or list element size, the reader expected.
    InvalidPointerType,

    /// A union member was read while a different member was active.
    InvalidUnionAccess,

    /// A far pointer is malformed or chains through too many landing pads.
    InvalidFarPointer,

    /// Pointers are nested more deeply than the configured nesting limit.
    DepthLimitExceeded,

    /// An allocation is larger than a segment can hold.
    SizeOverflow,

    /// A replacement buffer is smaller than the data it must hold.
    BufferTooSmall,

    /// A struct that is an element of a struct list was asked to change size.
    InitCompositeStruct,

    /// A far pointer names a segment that does not exist.
    InvalidSegmentId,

    /// A capability pointer is null or names an empty capability-table slot.
    InvalidCapabilityPointer,

    /// Reading more words than the traversal limit allows.
    ReadLimitExceeded,

    /// Text is not valid UTF-8.
    TextContainsNonUtf8Data,

    /// Text is missing its NUL terminator.
    TextIsNotNulTerminated,

    /// The input to pack is not a whole number of words.
    PackNotWordAligned,

    /// Packed input ends in the middle of a word or run.
    PrematureEndOfPackedInput,

    /// A segment is not a whole number of words.
    MessageNotWordAligned,

    /// The segment table declares too many segments.
    TooManySegments,

    /// The segment table declares zero segments.
    TooFewSegments,

    /// The input ends before the segments its table declares.
    MessageEndsPrematurely,

    /// The message is larger than the traversal limit allows.
    MessageTooLarge,

    /// No schema with the requested id or name has been loaded.
    SchemaNotFound,

    /// A schema node does not describe a struct.
    NotAStruct,

    /// A struct schema has no field with the requested name.
    FieldNotFound,

    /// A value does not match the type of the field it was assigned to.
    TypeMismatch,
}

impl Error {
    /// Creates a new `Failed` error with the given description.
    pub fn failed(description: String) -> Self {
        Self {
            extra: description,
            kind: ErrorKind::Failed,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self {
            extra: String::new(),
            kind,
        }
    }

    /// Creates an error of the given kind with extra context.
    pub fn detailed(kind: ErrorKind, extra: impl Into<String>) -> Self {
        Self {
            kind,
            extra: extra.into(),
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        let description = match self {
            Self::Failed => "Failed",
            Self::BoundsError => "Message contains out-of-bounds pointer",
            Self::DataOutOfBounds => "Data field offset is outside the struct's data section",
            Self::PointerOutOfBounds => "Pointer field index is outside the struct's pointer section",
            Self::InvalidPointerType => "Message contains a pointer of unexpected type",
            Self::InvalidUnionAccess => "Read of an inactive union member",
            Self::InvalidFarPointer => "Message contains invalid far pointer",
            Self::DepthLimitExceeded => "Message is too deeply nested",
            Self::SizeOverflow => "Allocation exceeds the maximum segment size",
            Self::BufferTooSmall => "Replacement buffer is smaller than the segment's contents",
            Self::InitCompositeStruct => "Cannot resize a struct that is an element of a struct list",
            Self::InvalidSegmentId => "Message contains a pointer to a nonexistent segment",
            Self::InvalidCapabilityPointer => "Message contains invalid capability pointer",
            Self::ReadLimitExceeded => "Read limit exceeded",
            Self::TextContainsNonUtf8Data => "Text contains non-utf8 data",
            Self::TextIsNotNulTerminated => "Message contains text that is not NUL-terminated",
            Self::PackNotWordAligned => "Packing input is not a whole number of words",
            Self::PrematureEndOfPackedInput => "Premature end of packed input",
            Self::MessageNotWordAligned => "Message segment is not a whole number of words",
            Self::TooManySegments => "Too many segments",
            Self::TooFewSegments => "Too few segments",
            Self::MessageEndsPrematurely => "Message ends prematurely",
            Self::MessageTooLarge => "Message is too large",
            Self::SchemaNotFound => "Schema not found",
            Self::NotAStruct => "Schema node is not a struct",
            Self::FieldNotFound => "Field not found",
            Self::TypeMismatch => "Value does not match the field type",
        };
        write!(fmt, "{description}")
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

impl From<core::str::Utf8Error> for Error {
    fn from(err: core::str::Utf8Error) -> Self {
        Self::detailed(ErrorKind::TextContainsNonUtf8Data, alloc::format!("{err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = err.kind();
        let description = alloc::format!("{err}");
        // Errors raised by our own `Read` adapters travel inside the io error.
        if let Some(inner) = err.into_inner() {
            if let Ok(error) = inner.downcast::<Error>() {
                return *error;
            }
        }
        match kind {
            std::io::ErrorKind::UnexpectedEof => {
                Self::detailed(ErrorKind::MessageEndsPrematurely, description)
            }
            _ => Self::failed(description),
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, err)
    }
}

#[allow(dead_code)]
fn _assert_kinds() {
    fn _assert_send<T: Send>() {}
    fn _assert_sync<T: Sync>() {}
    _assert_send::<Message>();
    _assert_sync::<Message>();
    _assert_send::<Error>();
    _assert_sync::<Error>();
}
