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

//! Schema-driven struct access.
//!
//! [`Reader`] and [`Builder`] pair a struct view with a [`StructSchema`]
//! and look fields up by name. Every access goes through one `match` on
//! the field's [`FieldType`].

use alloc::vec::Vec;

use crate::any_list::{ListBuilder, ListReader};
use crate::any_struct::{StructBuilder, StructReader};
use crate::dynamic_value::{type_mismatch, StructValue, Value};
use crate::pointer::{PointerBuilder, PointerReader};
use crate::private::layout::ElementSize;
use crate::schema::{FieldDescriptor, FieldType, SchemaLoader, StructSchema};
use crate::{text, Error, ErrorKind, Result};

fn field_mismatch(expected: &FieldType, found: &Value) -> Error {
    type_mismatch(&alloc::format!("{expected:?}"), found)
}

fn default_of<T>(field: &FieldDescriptor) -> Result<T>
where
    T: Default + for<'v> TryFrom<&'v Value, Error = Error>,
{
    match &field.default {
        Some(value) => T::try_from(value),
        None => Ok(T::default()),
    }
}

fn enum_default(field: &FieldDescriptor) -> Result<u16> {
    match &field.default {
        Some(Value::Enum(v)) => Ok(*v),
        Some(other) => Err(type_mismatch("Enum", other)),
        None => Ok(0),
    }
}

fn pointer_index(field: &FieldDescriptor) -> Result<u16> {
    u16::try_from(field.offset).map_err(|_| {
        Error::detailed(
            ErrorKind::PointerOutOfBounds,
            alloc::format!("field {} at pointer {}", field.name, field.offset),
        )
    })
}

fn element_size(element_type: &FieldType) -> ElementSize {
    match element_type {
        FieldType::Void => ElementSize::Void,
        FieldType::Bool => ElementSize::Bit,
        FieldType::Int8 | FieldType::UInt8 => ElementSize::Byte,
        FieldType::Int16 | FieldType::UInt16 | FieldType::Enum => ElementSize::TwoBytes,
        FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => ElementSize::FourBytes,
        FieldType::Int64 | FieldType::UInt64 | FieldType::Float64 => ElementSize::EightBytes,
        FieldType::Struct(_) => ElementSize::InlineComposite,
        FieldType::Text | FieldType::Data | FieldType::List(_) | FieldType::AnyPointer => {
            ElementSize::Pointer
        }
    }
}

fn read_field(
    reader: StructReader<'_>,
    field: &FieldDescriptor,
    loader: &SchemaLoader,
) -> Result<Value> {
    let offset = field.offset;
    macro_rules! masked {
        ($typ:ty, $variant:ident) => {
            Value::$variant(reader.get_data_field_mask::<$typ>(offset, default_of(field)?))
        };
    }
    Ok(match &field.field_type {
        FieldType::Void => Value::Void,
        FieldType::Bool => Value::Bool(reader.get_bool_field_mask(offset, default_of(field)?)),
        FieldType::Int8 => masked!(i8, Int8),
        FieldType::Int16 => masked!(i16, Int16),
        FieldType::Int32 => masked!(i32, Int32),
        FieldType::Int64 => masked!(i64, Int64),
        FieldType::UInt8 => masked!(u8, UInt8),
        FieldType::UInt16 => masked!(u16, UInt16),
        FieldType::UInt32 => masked!(u32, UInt32),
        FieldType::UInt64 => masked!(u64, UInt64),
        FieldType::Float32 => masked!(f32, Float32),
        FieldType::Float64 => masked!(f64, Float64),
        FieldType::Enum => {
            Value::Enum(reader.get_data_field_mask::<u16>(offset, enum_default(field)?))
        }
        pointer_type => read_pointer(
            reader.get_pointer_field(pointer_index(field)?),
            pointer_type,
            field.default.as_ref(),
            loader,
        )?,
    })
}

fn read_pointer(
    pointer: PointerReader<'_>,
    field_type: &FieldType,
    default: Option<&Value>,
    loader: &SchemaLoader,
) -> Result<Value> {
    match field_type {
        FieldType::Text => {
            if pointer.is_null() {
                return Ok(Value::Text(
                    default.and_then(Value::as_text).unwrap_or_default().into(),
                ));
            }
            Ok(Value::Text(pointer.get_text(None)?.to_string()?))
        }
        FieldType::Data => {
            if pointer.is_null() {
                return Ok(match default {
                    Some(Value::Data(bytes)) => Value::Data(bytes.clone()),
                    _ => Value::Data(Vec::new()),
                });
            }
            Ok(Value::Data(pointer.get_data(None)?.to_vec()))
        }
        FieldType::Struct(id) => {
            let schema = loader.get(*id)?;
            Reader::new(pointer.get_struct(None)?, schema, loader).to_value()
        }
        FieldType::List(element_type) => {
            let list = pointer.get_list(element_size(element_type), None)?;
            let values = (0..list.len())
                .map(|i| read_element(&list, i, element_type, loader))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::List(values))
        }
        FieldType::AnyPointer => Ok(Value::AnyPointer(pointer.pointer_type()?)),
        data_type => Err(Error::detailed(
            ErrorKind::TypeMismatch,
            alloc::format!("{data_type:?} is not a pointer type"),
        )),
    }
}

fn read_element(
    list: &ListReader<'_>,
    index: u32,
    element_type: &FieldType,
    loader: &SchemaLoader,
) -> Result<Value> {
    Ok(match element_type {
        FieldType::Void => Value::Void,
        FieldType::Bool => Value::Bool(list.get(index)),
        FieldType::Int8 => Value::Int8(list.get(index)),
        FieldType::Int16 => Value::Int16(list.get(index)),
        FieldType::Int32 => Value::Int32(list.get(index)),
        FieldType::Int64 => Value::Int64(list.get(index)),
        FieldType::UInt8 => Value::UInt8(list.get(index)),
        FieldType::UInt16 => Value::UInt16(list.get(index)),
        FieldType::UInt32 => Value::UInt32(list.get(index)),
        FieldType::UInt64 => Value::UInt64(list.get(index)),
        FieldType::Float32 => Value::Float32(list.get(index)),
        FieldType::Float64 => Value::Float64(list.get(index)),
        FieldType::Enum => Value::Enum(list.get(index)),
        FieldType::Struct(id) => {
            let schema = loader.get(*id)?;
            Reader::new(list.get_struct_element(index), schema, loader).to_value()?
        }
        pointer_type => read_pointer(list.get_pointer_element(index), pointer_type, None, loader)?,
    })
}

fn write_field(
    mut builder: StructBuilder<'_>,
    field: &FieldDescriptor,
    value: Value,
    loader: &SchemaLoader,
) -> Result<()> {
    let offset = field.offset;
    macro_rules! masked {
        ($typ:ty) => {
            builder.set_data_field_mask::<$typ>(offset, <$typ>::try_from(&value)?, default_of(field)?)
        };
    }
    match &field.field_type {
        FieldType::Void => match value {
            Value::Void => Ok(()),
            other => Err(type_mismatch("Void", &other)),
        },
        FieldType::Bool => {
            builder.set_bool_field_mask(offset, bool::try_from(&value)?, default_of(field)?)
        }
        FieldType::Int8 => masked!(i8),
        FieldType::Int16 => masked!(i16),
        FieldType::Int32 => masked!(i32),
        FieldType::Int64 => masked!(i64),
        FieldType::UInt8 => masked!(u8),
        FieldType::UInt16 => masked!(u16),
        FieldType::UInt32 => masked!(u32),
        FieldType::UInt64 => masked!(u64),
        FieldType::Float32 => masked!(f32),
        FieldType::Float64 => masked!(f64),
        FieldType::Enum => match value {
            Value::Enum(v) => builder.set_data_field_mask::<u16>(offset, v, enum_default(field)?),
            other => Err(type_mismatch("Enum", &other)),
        },
        pointer_type => write_pointer(
            builder.get_pointer_field(pointer_index(field)?)?,
            pointer_type,
            value,
            loader,
        ),
    }
}

fn write_pointer(
    pointer: PointerBuilder<'_>,
    field_type: &FieldType,
    value: Value,
    loader: &SchemaLoader,
) -> Result<()> {
    match (field_type, value) {
        (_, Value::Null) => pointer.clear(),
        (FieldType::Text, Value::Text(s)) => pointer.set_text(&s),
        (FieldType::Data, Value::Data(bytes)) => pointer.set_data(&bytes),
        (FieldType::Struct(id), Value::Struct(value)) => {
            let schema = loader.get(*id)?;
            let builder = pointer.init_struct(schema.size)?;
            Builder::new(builder, schema, loader).set_all(value)
        }
        (FieldType::List(element_type), Value::List(items)) => {
            write_list(pointer, element_type, items, loader)
        }
        (field_type, value) => Err(field_mismatch(field_type, &value)),
    }
}

fn write_list(
    pointer: PointerBuilder<'_>,
    element_type: &FieldType,
    items: Vec<Value>,
    loader: &SchemaLoader,
) -> Result<()> {
    let len = u32::try_from(items.len()).map_err(|_| Error::from_kind(ErrorKind::SizeOverflow))?;
    if let FieldType::Struct(id) = element_type {
        let schema = loader.get(*id)?;
        let mut list = pointer.init_struct_list(schema.size, len)?;
        for (i, item) in items.into_iter().enumerate() {
            let Value::Struct(value) = item else {
                return Err(field_mismatch(element_type, &item));
            };
            let element = list.reborrow().get_struct_element(i as u32);
            Builder::new(element, schema, loader).set_all(value)?;
        }
        return Ok(());
    }

    let mut list = pointer.init_list(element_size(element_type), len)?;
    for (i, item) in items.into_iter().enumerate() {
        write_element(list.reborrow(), i as u32, element_type, item, loader)?;
    }
    Ok(())
}

fn write_element(
    mut list: ListBuilder<'_>,
    index: u32,
    element_type: &FieldType,
    item: Value,
    loader: &SchemaLoader,
) -> Result<()> {
    macro_rules! put {
        ($typ:ty) => {
            list.set::<$typ>(index, <$typ>::try_from(&item)?)
        };
    }
    match element_type {
        FieldType::Void => {
            if item != Value::Void {
                return Err(type_mismatch("Void", &item));
            }
        }
        FieldType::Bool => put!(bool),
        FieldType::Int8 => put!(i8),
        FieldType::Int16 => put!(i16),
        FieldType::Int32 => put!(i32),
        FieldType::Int64 => put!(i64),
        FieldType::UInt8 => put!(u8),
        FieldType::UInt16 => put!(u16),
        FieldType::UInt32 => put!(u32),
        FieldType::UInt64 => put!(u64),
        FieldType::Float32 => put!(f32),
        FieldType::Float64 => put!(f64),
        FieldType::Enum => match item {
            Value::Enum(v) => list.set::<u16>(index, v),
            other => return Err(type_mismatch("Enum", &other)),
        },
        pointer_type => {
            return write_pointer(list.get_pointer_element(index), pointer_type, item, loader)
        }
    }
    Ok(())
}

/// A struct read through a loaded schema.
#[derive(Clone, Copy)]
pub struct Reader<'a> {
    reader: StructReader<'a>,
    schema: &'a StructSchema,
    loader: &'a SchemaLoader,
}

impl<'a> Reader<'a> {
    pub fn new(
        reader: StructReader<'a>,
        schema: &'a StructSchema,
        loader: &'a SchemaLoader,
    ) -> Reader<'a> {
        Reader {
            reader,
            schema,
            loader,
        }
    }

    pub fn schema(&self) -> &'a StructSchema {
        self.schema
    }

    pub fn as_struct_reader(&self) -> StructReader<'a> {
        self.reader
    }

    fn check_active(&self, field: &FieldDescriptor) -> Result<()> {
        if let (Some(value), Some(offset)) = (field.discriminant_value, self.schema.discriminant_offset) {
            self.reader.test_which(offset, value)?;
        }
        Ok(())
    }

    /// Reads a field. Union members other than the active one fail with
    /// `InvalidUnionAccess`.
    pub fn get(&self, name: &str) -> Result<Value> {
        let field = self.schema.field(name)?;
        self.check_active(field)?;
        read_field(self.reader, field, self.loader)
    }

    /// Whether a pointer field is non-null. Data fields are always present.
    pub fn has(&self, name: &str) -> Result<bool> {
        let field = self.schema.field(name)?;
        if !field.field_type.is_pointer() {
            return Ok(true);
        }
        Ok(!self.reader.get_pointer_field(pointer_index(field)?).is_null())
    }

    /// Descends into a struct field.
    pub fn get_struct(&self, name: &str) -> Result<Reader<'a>> {
        let field = self.schema.field(name)?;
        let FieldType::Struct(id) = field.field_type else {
            return Err(Error::detailed(
                ErrorKind::TypeMismatch,
                alloc::format!("{name} is {:?}, not a struct", field.field_type),
            ));
        };
        self.check_active(field)?;
        let schema = self.loader.get(id)?;
        let reader = self
            .reader
            .get_pointer_field(pointer_index(field)?)
            .get_struct(None)?;
        Ok(Reader::new(reader, schema, self.loader))
    }

    /// The active union member, or `None` if the struct has no union or the
    /// discriminant names a member this schema does not know.
    pub fn which(&self) -> Option<&'a FieldDescriptor> {
        let offset = self.schema.discriminant_offset?;
        self.schema.union_member(self.reader.which(offset))
    }

    /// Projects every field into an owned value, skipping inactive union
    /// members.
    pub fn to_value(&self) -> Result<Value> {
        let active = self
            .schema
            .discriminant_offset
            .map(|offset| self.reader.which(offset));
        let mut value = StructValue::new(self.schema.id);
        for field in &self.schema.fields {
            if field.discriminant_value.is_some() && field.discriminant_value != active {
                continue;
            }
            let field_value = read_field(self.reader, field, self.loader)?;
            value.fields.push((field.name.clone(), field_value));
        }
        Ok(Value::Struct(value))
    }
}

impl core::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.to_value() {
            Ok(value) => write!(f, "{}{:?}", self.schema.display_name, value),
            Err(e) => write!(f, "{}(<{e}>)", self.schema.display_name),
        }
    }
}

/// What [`Builder::init`] allocated.
pub enum Init<'a> {
    Struct(Builder<'a>),
    List(ListBuilder<'a>),
    Text(text::Builder<'a>),
    Data(&'a mut [u8]),
}

/// A struct built through a loaded schema.
pub struct Builder<'a> {
    builder: StructBuilder<'a>,
    schema: &'a StructSchema,
    loader: &'a SchemaLoader,
}

impl<'a> Builder<'a> {
    pub fn new(
        builder: StructBuilder<'a>,
        schema: &'a StructSchema,
        loader: &'a SchemaLoader,
    ) -> Builder<'a> {
        Builder {
            builder,
            schema,
            loader,
        }
    }

    pub fn schema(&self) -> &'a StructSchema {
        self.schema
    }

    pub fn reborrow(&mut self) -> Builder<'_> {
        Builder {
            builder: self.builder.reborrow(),
            schema: self.schema,
            loader: self.loader,
        }
    }

    pub fn as_reader(&self) -> Reader<'_> {
        Reader::new(self.builder.as_reader(), self.schema, self.loader)
    }

    pub fn into_reader(self) -> Reader<'a> {
        Reader::new(self.builder.into_reader(), self.schema, self.loader)
    }

    pub fn into_struct_builder(self) -> StructBuilder<'a> {
        self.builder
    }

    /// Makes `field` the active union member, if it is one.
    fn activate(&mut self, field: &FieldDescriptor) -> Result<()> {
        if let (Some(value), Some(offset)) = (field.discriminant_value, self.schema.discriminant_offset) {
            self.builder.set_which(offset, value)?;
        }
        Ok(())
    }

    fn lookup(&self, name: &str, pointer_only: bool) -> Result<&'a FieldDescriptor> {
        let schema: &'a StructSchema = self.schema;
        let field = schema.field(name)?;
        if pointer_only && !field.field_type.is_pointer() {
            return Err(Error::detailed(
                ErrorKind::TypeMismatch,
                alloc::format!("{name} is {:?}, not a pointer", field.field_type),
            ));
        }
        Ok(field)
    }

    pub fn get(&self, name: &str) -> Result<Value> {
        self.as_reader().get(name)
    }

    pub fn which(&self) -> Result<Option<&'a FieldDescriptor>> {
        let Some(offset) = self.schema.discriminant_offset else {
            return Ok(None);
        };
        Ok(self.schema.union_member(self.builder.which(offset)?))
    }

    /// Writes a field. Setting a union member makes it the active one.
    /// Writing [`Value::Null`] to a pointer field clears it.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self.lookup(name, false)?;
        self.activate(field)?;
        write_field(self.builder.reborrow(), field, value, self.loader)
    }

    fn set_all(mut self, value: StructValue) -> Result<()> {
        for (name, field_value) in value.fields {
            self.set(&name, field_value)?;
        }
        Ok(())
    }

    /// Allocates a fresh object in a pointer field. `len` is the element
    /// count for lists and the byte length for text and data; structs
    /// ignore it.
    pub fn init(mut self, name: &str, len: u32) -> Result<Init<'a>> {
        let field = self.lookup(name, true)?;
        self.activate(field)?;
        let loader = self.loader;
        let pointer = self.builder.get_pointer_field(pointer_index(field)?)?;
        match &field.field_type {
            FieldType::Text => Ok(Init::Text(pointer.init_text(len as usize)?)),
            FieldType::Data => Ok(Init::Data(pointer.init_data(len as usize)?)),
            FieldType::Struct(id) => {
                let schema = loader.get(*id)?;
                Ok(Init::Struct(Builder::new(
                    pointer.init_struct(schema.size)?,
                    schema,
                    loader,
                )))
            }
            FieldType::List(element_type) => match &**element_type {
                FieldType::Struct(id) => {
                    let schema = loader.get(*id)?;
                    Ok(Init::List(pointer.init_struct_list(schema.size, len)?))
                }
                other => Ok(Init::List(pointer.init_list(element_size(other), len)?)),
            },
            other => Err(Error::detailed(
                ErrorKind::TypeMismatch,
                alloc::format!("cannot init {other:?}"),
            )),
        }
    }

    /// Descends into a struct field, allocating it if null and upgrading it
    /// if it is smaller than its schema.
    pub fn get_struct(self, name: &str) -> Result<Builder<'a>> {
        let field = self.lookup(name, true)?;
        let FieldType::Struct(id) = field.field_type else {
            return Err(Error::detailed(
                ErrorKind::TypeMismatch,
                alloc::format!("{name} is {:?}, not a struct", field.field_type),
            ));
        };
        if let (Some(value), Some(offset)) = (field.discriminant_value, self.schema.discriminant_offset) {
            self.builder.test_which(offset, value)?;
        }
        let loader = self.loader;
        let schema = loader.get(id)?;
        let builder = self
            .builder
            .get_pointer_field(pointer_index(field)?)?
            .get_struct(schema.size, None)?;
        Ok(Builder::new(builder, schema, loader))
    }

    pub fn to_value(&self) -> Result<Value> {
        self.as_reader().to_value()
    }
}

/// Reads the root of `message` as the struct type `schema`.
pub fn read_root<'a>(
    message: &'a crate::message::Message,
    schema: &'a StructSchema,
    loader: &'a SchemaLoader,
) -> Result<Reader<'a>> {
    Ok(Reader::new(message.get_root_as_reader()?, schema, loader))
}

/// Allocates a fresh root of the struct type `schema`.
pub fn init_root<'a>(
    message: &'a mut crate::message::Message,
    schema: &'a StructSchema,
    loader: &'a SchemaLoader,
) -> Result<Builder<'a>> {
    Ok(Builder::new(message.init_root(schema.size)?, schema, loader))
}
