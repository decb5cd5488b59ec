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

//! Struct schemas loaded at run time.
//!
//! A [`SchemaLoader`] turns already-parsed schema nodes into
//! [`StructSchema`]s: a flat table of [`FieldDescriptor`]s whose offsets
//! have been converted to the units the struct accessors take. The
//! accessors in [`dynamic_struct`](crate::dynamic_struct) interpret the
//! table; nothing is generated.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use std::collections::HashMap;

use crate::dynamic_value::Value;
use crate::private::layout::StructSize;
use crate::{Error, ErrorKind, Result};

/// The type of a field, as declared in a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Void,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    /// Stored as a `u16`.
    Enum,
    Text,
    Data,
    /// A struct, by type id.
    Struct(u64),
    List(Box<FieldType>),
    AnyPointer,
}

impl FieldType {
    /// Width of a data-section field in bytes. `None` for `Void`, `Bool`
    /// (bit-addressed) and pointer fields.
    pub fn data_bytes(&self) -> Option<usize> {
        match self {
            FieldType::Int8 | FieldType::UInt8 => Some(1),
            FieldType::Int16 | FieldType::UInt16 | FieldType::Enum => Some(2),
            FieldType::Int32 | FieldType::UInt32 | FieldType::Float32 => Some(4),
            FieldType::Int64 | FieldType::UInt64 | FieldType::Float64 => Some(8),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            FieldType::Text
                | FieldType::Data
                | FieldType::Struct(_)
                | FieldType::List(_)
                | FieldType::AnyPointer
        )
    }
}

/// A schema node, as produced by a schema parser.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: u64,
    /// Fully qualified, e.g. `"addressbook.capnp:Person"`.
    pub display_name: String,
    pub kind: NodeKind,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    File,
    Struct(StructNode),
    Enum,
    Interface,
    Const,
    Annotation,
}

/// The struct-specific part of a [`Node`].
#[derive(Clone, Debug, Default)]
pub struct StructNode {
    pub data_word_count: u16,
    pub pointer_count: u16,
    /// Number of union members. Zero when the struct has no union.
    pub discriminant_count: u16,
    /// In units of 16 bits.
    pub discriminant_offset: u32,
    pub fields: Vec<Field>,
}

/// A field of a [`StructNode`].
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    /// Set for union members.
    pub discriminant_value: Option<u16>,
    pub kind: FieldKind,
}

#[derive(Clone, Debug)]
pub enum FieldKind {
    /// A field stored directly in the struct. `offset` is in units of the
    /// field's own width: bits for `Bool`, bytes times the width for the
    /// other data fields, pointer slots for pointer fields.
    Slot {
        offset: u32,
        field_type: FieldType,
        default: Option<Value>,
    },
    /// A group, stored as a separate struct node sharing this struct's
    /// sections.
    Group { type_id: u64 },
}

/// A loaded field: where it lives and how to interpret it.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Byte offset into the data section, bit offset for `Bool`, or
    /// pointer index for pointer fields.
    pub offset: usize,
    pub field_type: FieldType,
    pub discriminant_value: Option<u16>,
    pub default: Option<Value>,
}

/// A loaded struct type.
#[derive(Clone, Debug, PartialEq)]
pub struct StructSchema {
    pub id: u64,
    /// The name after the last `:` of the node's display name.
    pub display_name: String,
    pub size: StructSize,
    /// In units of 16 bits, like [`StructReader::which`]. `None` when the
    /// struct has no union.
    ///
    /// [`StructReader::which`]: crate::StructReader::which
    pub discriminant_offset: Option<usize>,
    pub fields: Vec<FieldDescriptor>,
}

impl StructSchema {
    pub fn field(&self, name: &str) -> Result<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| {
                Error::detailed(
                    ErrorKind::FieldNotFound,
                    alloc::format!("{}.{name}", self.display_name),
                )
            })
    }

    /// The union member whose discriminant value is `value`.
    pub fn union_member(&self, value: u16) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.discriminant_value == Some(value))
    }
}

fn load_field(field: &Field) -> Option<FieldDescriptor> {
    let FieldKind::Slot {
        offset,
        field_type,
        default,
    } = &field.kind
    else {
        tracing::debug!(field = %field.name, "skipping group field");
        return None;
    };
    let offset = *offset as usize;
    let offset = match field_type.data_bytes() {
        Some(width) => offset * width,
        None => offset,
    };
    Some(FieldDescriptor {
        name: field.name.clone(),
        offset,
        field_type: field_type.clone(),
        discriminant_value: field.discriminant_value,
        default: default.clone(),
    })
}

/// Registry of loaded struct schemas, keyed by type id.
#[derive(Default)]
pub struct SchemaLoader {
    schemas: HashMap<u64, StructSchema>,
}

impl SchemaLoader {
    pub fn new() -> SchemaLoader {
        SchemaLoader::default()
    }

    /// Loads a struct node, replacing any schema previously loaded under the
    /// same id.
    pub fn load_dynamic(&mut self, node: &Node) -> Result<&StructSchema> {
        let display_name = node
            .display_name
            .rsplit(':')
            .next()
            .unwrap_or(&node.display_name);
        let NodeKind::Struct(struct_node) = &node.kind else {
            return Err(Error::detailed(
                ErrorKind::NotAStruct,
                alloc::format!("{display_name} ({:#x})", node.id),
            ));
        };

        let schema = StructSchema {
            id: node.id,
            display_name: display_name.into(),
            size: StructSize::new(struct_node.data_word_count, struct_node.pointer_count),
            discriminant_offset: if struct_node.discriminant_count > 0 {
                Some(struct_node.discriminant_offset as usize)
            } else {
                None
            },
            fields: struct_node.fields.iter().filter_map(load_field).collect(),
        };
        tracing::debug!(
            id = node.id,
            name = %schema.display_name,
            fields = schema.fields.len(),
            "loaded struct schema"
        );
        self.schemas.insert(node.id, schema);
        self.get(node.id)
    }

    pub fn get(&self, id: u64) -> Result<&StructSchema> {
        self.schemas.get(&id).ok_or_else(|| {
            Error::detailed(ErrorKind::SchemaNotFound, alloc::format!("{id:#x}"))
        })
    }

    pub fn get_by_name(&self, name: &str) -> Option<&StructSchema> {
        self.schemas.values().find(|s| s.display_name == name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::{Field, FieldKind, FieldType, Node, NodeKind, StructNode};
    use crate::dynamic_value::Value;

    pub fn slot(name: &str, offset: u32, field_type: FieldType) -> Field {
        Field {
            name: name.into(),
            discriminant_value: None,
            kind: FieldKind::Slot {
                offset,
                field_type,
                default: None,
            },
        }
    }

    pub fn slot_with_default(name: &str, offset: u32, field_type: FieldType, default: Value) -> Field {
        Field {
            name: name.into(),
            discriminant_value: None,
            kind: FieldKind::Slot {
                offset,
                field_type,
                default: Some(default),
            },
        }
    }

    pub fn member(discriminant: u16, mut field: Field) -> Field {
        field.discriminant_value = Some(discriminant);
        field
    }

    pub fn struct_node(id: u64, name: &str, data: u16, pointers: u16, fields: Vec<Field>) -> Node {
        Node {
            id,
            display_name: name.into(),
            kind: NodeKind::Struct(StructNode {
                data_word_count: data,
                pointer_count: pointers,
                discriminant_count: 0,
                discriminant_offset: 0,
                fields,
            }),
        }
    }

    pub fn with_union(mut node: Node, discriminant_count: u16, discriminant_offset: u32) -> Node {
        if let NodeKind::Struct(s) = &mut node.kind {
            s.discriminant_count = discriminant_count;
            s.discriminant_offset = discriminant_offset;
        }
        node
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::{Field, FieldKind, FieldType, Node, NodeKind, SchemaLoader};
    use crate::{ErrorKind, StructSize};

    #[test]
    fn offsets_are_scaled_to_bytes() {
        let mut loader = SchemaLoader::new();
        let node = struct_node(
            0x10,
            "test.capnp:Sample",
            2,
            1,
            vec![
                slot("flag", 3, FieldType::Bool),
                slot("small", 1, FieldType::UInt16),
                slot("big", 1, FieldType::Float64),
                slot("kind", 3, FieldType::Enum),
                slot("name", 0, FieldType::Text),
            ],
        );
        let schema = loader.load_dynamic(&node).unwrap();
        assert_eq!(schema.display_name, "Sample");
        assert_eq!(schema.size, StructSize::new(2, 1));
        assert_eq!(schema.discriminant_offset, None);
        let offsets: Vec<usize> = schema.fields.iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![3, 2, 8, 6, 0]);
    }

    #[test]
    fn groups_are_skipped() {
        let mut loader = SchemaLoader::new();
        let mut fields = vec![slot("a", 0, FieldType::UInt8)];
        fields.push(Field {
            name: "g".into(),
            discriminant_value: None,
            kind: FieldKind::Group { type_id: 99 },
        });
        let schema = loader.load_dynamic(&struct_node(1, "X", 1, 0, fields)).unwrap();
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.field("g").unwrap_err().kind, ErrorKind::FieldNotFound);
    }

    #[test]
    fn lookup() {
        let mut loader = SchemaLoader::new();
        loader
            .load_dynamic(&with_union(struct_node(7, "a.capnp:Outer.Inner", 1, 0, vec![]), 2, 1))
            .unwrap();
        assert_eq!(loader.get(7).unwrap().discriminant_offset, Some(1));
        assert_eq!(loader.get_by_name("Outer.Inner").unwrap().id, 7);
        assert!(loader.get_by_name("Missing").is_none());
        assert_eq!(loader.get(8).unwrap_err().kind, ErrorKind::SchemaNotFound);
    }

    #[test]
    fn non_struct_nodes_are_rejected() {
        let mut loader = SchemaLoader::new();
        let node = Node {
            id: 3,
            display_name: "a.capnp:Color".into(),
            kind: NodeKind::Enum,
        };
        assert_eq!(loader.load_dynamic(&node).unwrap_err().kind, ErrorKind::NotAStruct);
        assert!(loader.is_empty());
    }
}
