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

//! Owned values produced and consumed by the schema-driven accessors in
//! [`dynamic_struct`](crate::dynamic_struct).

use alloc::string::String;
use alloc::vec::Vec;

use crate::pointer::PointerType;
use crate::{Error, ErrorKind, Result};

/// A field value, detached from any message.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    Enum(u16),
    Text(String),
    Data(Vec<u8>),
    List(Vec<Value>),
    Struct(StructValue),

    /// What an untyped pointer field holds. Only the pointer's kind is
    /// reported.
    AnyPointer(PointerType),

    /// Writing this to a pointer field clears it.
    Null,
}

impl Value {
    /// The variant name, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "Void",
            Value::Bool(_) => "Bool",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Enum(_) => "Enum",
            Value::Text(_) => "Text",
            Value::Data(_) => "Data",
            Value::List(_) => "List",
            Value::Struct(_) => "Struct",
            Value::AnyPointer(_) => "AnyPointer",
            Value::Null => "Null",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }
}

pub(crate) fn type_mismatch(expected: &str, found: &Value) -> Error {
    Error::detailed(
        ErrorKind::TypeMismatch,
        alloc::format!("expected {expected}, found {}", found.type_name()),
    )
}

macro_rules! primitive_value {
    ($($typ:ty => $variant:ident),*) => {
        $(
            impl From<$typ> for Value {
                fn from(value: $typ) -> Value {
                    Value::$variant(value)
                }
            }

            impl TryFrom<&Value> for $typ {
                type Error = Error;

                fn try_from(value: &Value) -> Result<$typ> {
                    match value {
                        Value::$variant(v) => Ok(*v),
                        other => Err(type_mismatch(stringify!($variant), other)),
                    }
                }
            }
        )*
    };
}

primitive_value!(
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64
);

impl From<&str> for Value {
    fn from(value: &str) -> Value {
        Value::Text(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Value {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Value {
        Value::List(value)
    }
}

impl From<StructValue> for Value {
    fn from(value: StructValue) -> Value {
        Value::Struct(value)
    }
}

/// The fields of a struct, in schema order. Inactive union members are
/// absent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructValue {
    pub type_id: u64,
    pub fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn new(type_id: u64) -> StructValue {
        StructValue {
            type_id,
            fields: Vec::new(),
        }
    }

    /// Appends a field. Builder-style, for assembling values to write.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> StructValue {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}
