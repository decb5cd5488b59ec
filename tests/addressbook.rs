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

//! An address book written and read through a hand-written typed façade,
//! the way generated code sits on top of the struct and list views.

use capnp_arena::dynamic_struct;
use capnp_arena::dynamic_value::Value;
use capnp_arena::message::{Message, ReaderOptions};
use capnp_arena::schema::{Field, FieldKind, FieldType, Node, NodeKind, SchemaLoader, StructNode};
use capnp_arena::serialize_packed;
use capnp_arena::traits::StructMeta;
use capnp_arena::{serialize, ErrorKind};

pub mod addressbook {
    pub mod phone_number {
        use capnp_arena::traits::{self, FromStructBuilder, FromStructReader, StructMeta};
        use capnp_arena::{Result, StructBuilder, StructReader, StructSize};

        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub enum Type {
            Mobile = 0,
            Home = 1,
            Work = 2,
        }

        impl Type {
            fn from_u16(value: u16) -> Option<Type> {
                match value {
                    0 => Some(Type::Mobile),
                    1 => Some(Type::Home),
                    2 => Some(Type::Work),
                    _ => None,
                }
            }
        }

        pub struct Owned;

        impl StructMeta for Owned {
            const TYPE_ID: u64 = 0x814e90b29c9e8ad0;
            const DISPLAY_NAME: &'static str = "Person.PhoneNumber";
            const STRUCT_SIZE: StructSize = StructSize::new(1, 1);
        }

        impl traits::Owned for Owned {
            type Reader<'a> = Reader<'a>;
            type Builder<'a> = Builder<'a>;
        }

        pub struct Reader<'a> {
            reader: StructReader<'a>,
        }

        impl<'a> FromStructReader<'a> for Reader<'a> {
            fn new(reader: StructReader<'a>) -> Self {
                Reader { reader }
            }
        }

        impl<'a> Reader<'a> {
            pub fn get_number(&self) -> Result<&'a str> {
                self.reader.get_text(0, None)?.to_str()
            }

            pub fn get_type(&self) -> Option<Type> {
                Type::from_u16(self.reader.get_data_field::<u16>(0))
            }
        }

        pub struct Builder<'a> {
            builder: StructBuilder<'a>,
        }

        impl<'a> FromStructBuilder<'a> for Builder<'a> {
            fn new(builder: StructBuilder<'a>) -> Self {
                Builder { builder }
            }
        }

        impl<'a> Builder<'a> {
            pub fn set_number(&mut self, value: &str) -> Result<()> {
                self.builder.set_text(0, value)
            }

            pub fn set_type(&mut self, value: Type) -> Result<()> {
                self.builder.set_data_field::<u16>(0, value as u16)
            }
        }
    }

    pub mod person {
        use capnp_arena::traits::{self, FromStructBuilder, FromStructReader, StructMeta};
        use capnp_arena::{struct_list, Result, StructBuilder, StructReader, StructSize};

        use super::phone_number;

        const DISCRIMINANT: usize = 2;

        pub enum Employment<'a> {
            Unemployed,
            Employer(&'a str),
            School(&'a str),
            SelfEmployed,
        }

        pub struct Owned;

        impl StructMeta for Owned {
            const TYPE_ID: u64 = 0x98808e9832e8bc18;
            const DISPLAY_NAME: &'static str = "Person";
            const STRUCT_SIZE: StructSize = StructSize::new(1, 4);
        }

        impl traits::Owned for Owned {
            type Reader<'a> = Reader<'a>;
            type Builder<'a> = Builder<'a>;
        }

        pub struct Reader<'a> {
            reader: StructReader<'a>,
        }

        impl<'a> FromStructReader<'a> for Reader<'a> {
            fn new(reader: StructReader<'a>) -> Self {
                Reader { reader }
            }
        }

        impl<'a> Reader<'a> {
            pub fn get_id(&self) -> u32 {
                self.reader.get_data_field::<u32>(0)
            }

            pub fn get_name(&self) -> Result<&'a str> {
                self.reader.get_text(0, None)?.to_str()
            }

            pub fn get_email(&self) -> Result<&'a str> {
                self.reader.get_text(1, None)?.to_str()
            }

            pub fn get_phones(&self) -> Result<struct_list::Reader<'a, phone_number::Owned>> {
                struct_list::Reader::get_from_pointer(&self.reader.get_pointer_field(2), None)
            }

            pub fn get_employer(&self) -> Result<&'a str> {
                self.reader.test_which(DISCRIMINANT, 1)?;
                self.reader.get_text(3, None)?.to_str()
            }

            pub fn which(&self) -> Result<Employment<'a>> {
                match self.reader.which(DISCRIMINANT) {
                    0 => Ok(Employment::Unemployed),
                    1 => Ok(Employment::Employer(self.reader.get_text(3, None)?.to_str()?)),
                    2 => Ok(Employment::School(self.reader.get_text(3, None)?.to_str()?)),
                    3 => Ok(Employment::SelfEmployed),
                    n => Err(capnp_arena::Error::detailed(
                        capnp_arena::ErrorKind::InvalidUnionAccess,
                        format!("unknown employment {n}"),
                    )),
                }
            }
        }

        pub struct Builder<'a> {
            builder: StructBuilder<'a>,
        }

        impl<'a> FromStructBuilder<'a> for Builder<'a> {
            fn new(builder: StructBuilder<'a>) -> Self {
                Builder { builder }
            }
        }

        impl<'a> Builder<'a> {
            pub fn reborrow(&mut self) -> Builder<'_> {
                Builder {
                    builder: self.builder.reborrow(),
                }
            }

            pub fn set_id(&mut self, value: u32) -> Result<()> {
                self.builder.set_data_field::<u32>(0, value)
            }

            pub fn set_name(&mut self, value: &str) -> Result<()> {
                self.builder.set_text(0, value)
            }

            pub fn set_email(&mut self, value: &str) -> Result<()> {
                self.builder.set_text(1, value)
            }

            pub fn init_phones(self, count: u32) -> Result<struct_list::Builder<'a, phone_number::Owned>> {
                struct_list::Builder::init_pointer(
                    self.builder.get_pointer_field(2)?,
                    <phone_number::Owned as StructMeta>::STRUCT_SIZE,
                    count,
                )
            }

            pub fn set_unemployed(&mut self) -> Result<()> {
                self.builder.set_which(DISCRIMINANT, 0)
            }

            pub fn set_employer(&mut self, value: &str) -> Result<()> {
                self.builder.set_which(DISCRIMINANT, 1)?;
                self.builder.set_text(3, value)
            }

            pub fn set_school(&mut self, value: &str) -> Result<()> {
                self.builder.set_which(DISCRIMINANT, 2)?;
                self.builder.set_text(3, value)
            }

            pub fn set_self_employed(&mut self) -> Result<()> {
                self.builder.set_which(DISCRIMINANT, 3)
            }
        }
    }

    pub mod address_book {
        use capnp_arena::traits::{self, FromStructBuilder, FromStructReader, StructMeta};
        use capnp_arena::{struct_list, Result, StructBuilder, StructReader, StructSize};

        use super::person;

        pub struct Owned;

        impl StructMeta for Owned {
            const TYPE_ID: u64 = 0xf934d9b354a8a134;
            const DISPLAY_NAME: &'static str = "AddressBook";
            const STRUCT_SIZE: StructSize = StructSize::new(0, 1);
        }

        impl traits::Owned for Owned {
            type Reader<'a> = Reader<'a>;
            type Builder<'a> = Builder<'a>;
        }

        pub struct Reader<'a> {
            reader: StructReader<'a>,
        }

        impl<'a> FromStructReader<'a> for Reader<'a> {
            fn new(reader: StructReader<'a>) -> Self {
                Reader { reader }
            }
        }

        impl<'a> Reader<'a> {
            pub fn get_people(&self) -> Result<struct_list::Reader<'a, person::Owned>> {
                struct_list::Reader::get_from_pointer(&self.reader.get_pointer_field(0), None)
            }
        }

        pub struct Builder<'a> {
            builder: StructBuilder<'a>,
        }

        impl<'a> FromStructBuilder<'a> for Builder<'a> {
            fn new(builder: StructBuilder<'a>) -> Self {
                Builder { builder }
            }
        }

        impl<'a> Builder<'a> {
            pub fn init_people(self, count: u32) -> Result<struct_list::Builder<'a, person::Owned>> {
                struct_list::Builder::init_pointer(
                    self.builder.get_pointer_field(0)?,
                    <person::Owned as StructMeta>::STRUCT_SIZE,
                    count,
                )
            }
        }
    }
}

use addressbook::person::Employment;
use addressbook::phone_number::Type;
use addressbook::{address_book, person};

fn write_address_book(message: &mut Message) {
    let address_book = message.init_root_as::<address_book::Owned>().unwrap();
    let mut people = address_book.init_people(2).unwrap();

    {
        let mut alice = people.reborrow().get(0);
        alice.set_id(123).unwrap();
        alice.set_name("Alice").unwrap();
        alice.set_email("alice@example.com").unwrap();
        alice.set_school("MIT").unwrap();
        let mut phones = alice.reborrow().init_phones(1).unwrap();
        let mut phone = phones.reborrow().get(0);
        phone.set_number("555-1212").unwrap();
        phone.set_type(Type::Mobile).unwrap();
    }

    {
        let mut bob = people.reborrow().get(1);
        bob.set_id(456).unwrap();
        bob.set_name("Bob").unwrap();
        bob.set_email("bob@example.com").unwrap();
        bob.set_employer("Acme").unwrap();
        let mut phones = bob.reborrow().init_phones(2).unwrap();
        {
            let mut phone = phones.reborrow().get(0);
            phone.set_number("555-4567").unwrap();
            phone.set_type(Type::Home).unwrap();
        }
        let mut phone = phones.reborrow().get(1);
        phone.set_number("555-7654").unwrap();
        phone.set_type(Type::Work).unwrap();
    }
}

fn check_address_book(message: &Message) {
    let address_book = message.read_root_as::<address_book::Owned>().unwrap();
    let people = address_book.get_people().unwrap();
    assert_eq!(people.len(), 2);

    let alice = people.get(0);
    assert_eq!(alice.get_id(), 123);
    assert_eq!(alice.get_name().unwrap(), "Alice");
    assert_eq!(alice.get_email().unwrap(), "alice@example.com");
    assert!(matches!(alice.which().unwrap(), Employment::School("MIT")));
    assert_eq!(
        alice.get_employer().unwrap_err().kind,
        ErrorKind::InvalidUnionAccess
    );
    let phones = alice.get_phones().unwrap();
    assert_eq!(phones.len(), 1);
    assert_eq!(phones.get(0).get_number().unwrap(), "555-1212");
    assert_eq!(phones.get(0).get_type(), Some(Type::Mobile));

    let bob = people.get(1);
    assert_eq!(bob.get_id(), 456);
    assert_eq!(bob.get_employer().unwrap(), "Acme");
    let numbers: Vec<&str> = bob
        .get_phones()
        .unwrap()
        .iter()
        .map(|p| p.get_number().unwrap())
        .collect();
    assert_eq!(numbers, ["555-4567", "555-7654"]);
    let types: Vec<Option<Type>> = bob.get_phones().unwrap().iter().map(|p| p.get_type()).collect();
    assert_eq!(types, [Some(Type::Home), Some(Type::Work)]);
}

#[test]
fn unpacked_round_trip() {
    let mut message = Message::new_default();
    write_address_book(&mut message);
    check_address_book(&message);

    let bytes = message.to_bytes();
    assert_eq!(bytes.len(), serialize::compute_serialized_size_in_words(&message) * 8);
    let read = Message::from_bytes(&bytes, ReaderOptions::new()).unwrap();
    check_address_book(&read);

    let mut stream = Vec::new();
    serialize::write_message(&mut stream, &message).unwrap();
    assert_eq!(stream, bytes);
    let read = serialize::read_message(&stream[..], ReaderOptions::new()).unwrap();
    check_address_book(&read);
}

#[test]
fn packed_round_trip() {
    let mut message = Message::new_default();
    write_address_book(&mut message);

    let packed = message.to_packed_bytes();
    assert!(packed.len() < message.to_bytes().len());
    let read = Message::from_packed_bytes(&packed, ReaderOptions::new()).unwrap();
    check_address_book(&read);

    let mut stream = Vec::new();
    serialize_packed::write_message(&mut stream, &message).unwrap();
    assert_eq!(stream, packed);
    let read = serialize_packed::read_message(&stream[..], ReaderOptions::new()).unwrap();
    check_address_book(&read);
}

#[test]
fn two_messages_on_one_stream() {
    let mut first = Message::new_default();
    write_address_book(&mut first);
    let mut second = Message::new_default();
    second
        .init_root_as::<person::Owned>()
        .unwrap()
        .set_name("Carol")
        .unwrap();

    let mut stream = Vec::new();
    serialize_packed::write_message(&mut stream, &first).unwrap();
    serialize_packed::write_message(&mut stream, &second).unwrap();

    let mut input = &stream[..];
    let read = serialize_packed::read_message(&mut input, ReaderOptions::new()).unwrap();
    check_address_book(&read);
    let read = serialize_packed::read_message(&mut input, ReaderOptions::new()).unwrap();
    assert_eq!(
        read.read_root_as::<person::Owned>().unwrap().get_name().unwrap(),
        "Carol"
    );
    assert!(input.is_empty());
}

#[test]
fn single_phone_number() {
    let mut message = Message::new_default();
    {
        let person = message.init_root_as::<person::Owned>().unwrap();
        let mut phones = person.init_phones(1).unwrap();
        let mut phone = phones.reborrow().get(0);
        phone.set_number("123-456-7890").unwrap();
        phone.set_type(Type::Home).unwrap();
    }
    let unpacked = Message::from_bytes(&message.to_bytes(), ReaderOptions::new()).unwrap();
    let packed = Message::from_packed_bytes(&message.to_packed_bytes(), ReaderOptions::new()).unwrap();
    for read in [&unpacked, &packed] {
        let person = read.read_root_as::<person::Owned>().unwrap();
        let phone = person.get_phones().unwrap().get(0);
        assert_eq!(phone.get_number().unwrap(), "123-456-7890");
        assert_eq!(phone.get_type().map(|t| t as u16), Some(1));
        assert!(matches!(person.which().unwrap(), Employment::Unemployed));
    }
}

fn slot(name: &str, offset: u32, field_type: FieldType) -> Field {
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

fn member(discriminant: u16, name: &str, offset: u32, field_type: FieldType) -> Field {
    Field {
        discriminant_value: Some(discriminant),
        ..slot(name, offset, field_type)
    }
}

fn struct_node<T: StructMeta>(discriminant_count: u16, discriminant_offset: u32, fields: Vec<Field>) -> Node {
    Node {
        id: T::TYPE_ID,
        display_name: format!("addressbook.capnp:{}", T::DISPLAY_NAME),
        kind: NodeKind::Struct(StructNode {
            data_word_count: T::STRUCT_SIZE.data,
            pointer_count: T::STRUCT_SIZE.pointers,
            discriminant_count,
            discriminant_offset,
            fields,
        }),
    }
}

#[test]
fn read_through_loaded_schema() {
    let mut loader = SchemaLoader::new();
    let phone_id = <addressbook::phone_number::Owned as StructMeta>::TYPE_ID;
    let person_id = <person::Owned as StructMeta>::TYPE_ID;
    loader
        .load_dynamic(&struct_node::<addressbook::phone_number::Owned>(
            0,
            0,
            vec![slot("number", 0, FieldType::Text), slot("type", 0, FieldType::Enum)],
        ))
        .unwrap();
    loader
        .load_dynamic(&struct_node::<person::Owned>(
            4,
            2,
            vec![
                slot("id", 0, FieldType::UInt32),
                slot("name", 0, FieldType::Text),
                slot("email", 1, FieldType::Text),
                slot("phones", 2, FieldType::List(Box::new(FieldType::Struct(phone_id)))),
                member(0, "unemployed", 0, FieldType::Void),
                member(1, "employer", 3, FieldType::Text),
                member(2, "school", 3, FieldType::Text),
                member(3, "selfEmployed", 0, FieldType::Void),
            ],
        ))
        .unwrap();
    loader
        .load_dynamic(&struct_node::<address_book::Owned>(
            0,
            0,
            vec![slot(
                "people",
                0,
                FieldType::List(Box::new(FieldType::Struct(person_id))),
            )],
        ))
        .unwrap();

    let mut message = Message::new_default();
    write_address_book(&mut message);

    let schema = loader.get_by_name("AddressBook").unwrap();
    let root = dynamic_struct::read_root(&message, schema, &loader).unwrap();
    let people = root.get("people").unwrap();
    let people = people.as_list().unwrap();
    assert_eq!(people.len(), 2);

    let alice = people[0].as_struct().unwrap();
    assert_eq!(alice.type_id, person_id);
    assert_eq!(alice.get("name"), Some(&Value::Text("Alice".into())));
    assert_eq!(alice.get("school"), Some(&Value::Text("MIT".into())));
    assert_eq!(alice.get("employer"), None);

    let bob = people[1].as_struct().unwrap();
    assert_eq!(bob.get("id"), Some(&Value::UInt32(456)));
    let phones = bob.get("phones").unwrap().as_list().unwrap();
    assert_eq!(
        phones[1].as_struct().unwrap().get("type"),
        Some(&Value::Enum(Type::Work as u16))
    );
}
