use std::io::{Read, Write};
use std::ops::Deref;

use crate::compound::NbtCompound;
use crate::reader::ReadAdaptor;
use crate::writer::WriteAdaptor;
use crate::*;

#[derive(Clone, Debug, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum NbtTag {
    End = END_ID,
    Byte(i8) = BYTE_ID,
    Short(i16) = SHORT_ID,
    Int(i32) = INT_ID,
    Long(i64) = LONG_ID,
    Float(f32) = FLOAT_ID,
    Double(f64) = DOUBLE_ID,
    ByteArray(Box<[u8]>) = BYTE_ARRAY_ID,
    String(String) = STRING_ID,
    List(NbtList) = LIST_ID,
    Compound(NbtCompound) = COMPOUND_ID,
    IntArray(Box<[i32]>) = INT_ARRAY_ID,
    LongArray(Box<[i64]>) = LONG_ARRAY_ID,
}

/// A homogeneous list. The element tag is kept even when the list is empty so that a decoded
/// list encodes back to the same bytes.
#[derive(Clone, Debug, PartialEq, PartialOrd)]
pub struct NbtList {
    element_id: u8,
    values: Vec<NbtTag>,
}

impl NbtList {
    pub fn new(element_id: u8) -> Self {
        Self {
            element_id,
            values: Vec::new(),
        }
    }

    /// Builds a list from values, taking the element tag from the first value.
    pub fn from_values(values: Vec<NbtTag>) -> Result<Self> {
        let mut list = Self::new(values.first().map_or(END_ID, NbtTag::get_type_id));
        list.values.reserve(values.len());
        for value in values {
            list.push(value)?;
        }
        Ok(list)
    }

    pub fn element_id(&self) -> u8 {
        self.element_id
    }

    pub fn push(&mut self, value: impl Into<NbtTag>) -> Result<()> {
        let value = value.into();
        let found = value.get_type_id();
        if self.values.is_empty() && self.element_id == END_ID {
            self.element_id = found;
        } else if found != self.element_id {
            return Err(Error::HeterogeneousList {
                expected: self.element_id,
                found,
            });
        }
        self.values.push(value);
        Ok(())
    }

    pub fn into_values(self) -> Vec<NbtTag> {
        self.values
    }
}

impl Deref for NbtList {
    type Target = [NbtTag];

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl<'a> IntoIterator for &'a NbtList {
    type Item = &'a NbtTag;
    type IntoIter = std::slice::Iter<'a, NbtTag>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl NbtTag {
    /// Returns the numeric id associated with the data type.
    pub const fn get_type_id(&self) -> u8 {
        // See https://doc.rust-lang.org/reference/items/enumerations.html#pointer-casting
        unsafe { *(self as *const Self as *const u8) }
    }

    pub const fn type_name(&self) -> &'static str {
        tag_name(self.get_type_id())
    }

    pub fn serialize<W>(&self, w: &mut WriteAdaptor<W>) -> Result<()>
    where
        W: Write,
    {
        w.write_u8_be(self.get_type_id())?;
        self.serialize_data(w)?;
        Ok(())
    }

    pub fn serialize_data<W>(&self, w: &mut WriteAdaptor<W>) -> Result<()>
    where
        W: Write,
    {
        match self {
            NbtTag::End => {}
            NbtTag::Byte(byte) => w.write_i8_be(*byte)?,
            NbtTag::Short(short) => w.write_i16_be(*short)?,
            NbtTag::Int(int) => w.write_i32_be(*int)?,
            NbtTag::Long(long) => w.write_i64_be(*long)?,
            NbtTag::Float(float) => w.write_f32_be(*float)?,
            NbtTag::Double(double) => w.write_f64_be(*double)?,
            NbtTag::ByteArray(byte_array) => {
                w.write_len(byte_array.len())?;
                w.write_slice(byte_array)?;
            }
            NbtTag::String(string) => write_nbt_string(w, string)?,
            NbtTag::List(list) => {
                w.write_u8_be(list.element_id)?;
                w.write_len(list.len())?;
                for nbt_tag in list {
                    if nbt_tag.get_type_id() != list.element_id {
                        return Err(Error::HeterogeneousList {
                            expected: list.element_id,
                            found: nbt_tag.get_type_id(),
                        });
                    }
                    nbt_tag.serialize_data(w)?;
                }
            }
            NbtTag::Compound(compound) => {
                compound.serialize_content(w)?;
            }
            NbtTag::IntArray(int_array) => {
                w.write_len(int_array.len())?;
                for int in int_array {
                    w.write_i32_be(*int)?;
                }
            }
            NbtTag::LongArray(long_array) => {
                w.write_len(long_array.len())?;
                for long in long_array {
                    w.write_i64_be(*long)?;
                }
            }
        };
        Ok(())
    }

    pub fn deserialize<R>(reader: &mut ReadAdaptor<R>) -> Result<NbtTag>
    where
        R: Read,
    {
        let tag_id = reader.get_u8_be()?;
        Self::deserialize_data(reader, tag_id)
    }

    pub fn skip_data<R>(reader: &mut ReadAdaptor<R>, tag_id: u8) -> Result<()>
    where
        R: Read,
    {
        match tag_id {
            END_ID => Ok(()),
            BYTE_ID => reader.skip_bytes(1),
            SHORT_ID => reader.skip_bytes(2),
            INT_ID => reader.skip_bytes(4),
            LONG_ID => reader.skip_bytes(8),
            FLOAT_ID => reader.skip_bytes(4),
            DOUBLE_ID => reader.skip_bytes(8),
            BYTE_ARRAY_ID => {
                let len = read_len(reader)?;
                reader.skip_bytes(len as u64)
            }
            STRING_ID => {
                let len = reader.get_u16_be()?;
                reader.skip_bytes(len as u64)
            }
            LIST_ID => {
                let tag_type_id = reader.get_u8_be()?;
                let len = read_len(reader)?;
                if tag_type_id == END_ID && len > 0 {
                    return Err(Error::InvalidListType(len as i32));
                }

                reader.enter()?;
                for _ in 0..len {
                    Self::skip_data(reader, tag_type_id)?;
                }
                reader.leave();

                Ok(())
            }
            COMPOUND_ID => NbtCompound::skip_content(reader),
            INT_ARRAY_ID => {
                let len = read_len(reader)?;
                reader.skip_bytes(len as u64 * 4)
            }
            LONG_ARRAY_ID => {
                let len = read_len(reader)?;
                reader.skip_bytes(len as u64 * 8)
            }
            _ => Err(Error::UnknownTagId(tag_id)),
        }
    }

    pub fn deserialize_data<R>(reader: &mut ReadAdaptor<R>, tag_id: u8) -> Result<NbtTag>
    where
        R: Read,
    {
        match tag_id {
            END_ID => Ok(NbtTag::End),
            BYTE_ID => {
                let byte = reader.get_i8_be()?;
                Ok(NbtTag::Byte(byte))
            }
            SHORT_ID => {
                let short = reader.get_i16_be()?;
                Ok(NbtTag::Short(short))
            }
            INT_ID => {
                let int = reader.get_i32_be()?;
                Ok(NbtTag::Int(int))
            }
            LONG_ID => {
                let long = reader.get_i64_be()?;
                Ok(NbtTag::Long(long))
            }
            FLOAT_ID => {
                let float = reader.get_f32_be()?;
                Ok(NbtTag::Float(float))
            }
            DOUBLE_ID => {
                let double = reader.get_f64_be()?;
                Ok(NbtTag::Double(double))
            }
            BYTE_ARRAY_ID => {
                let len = read_len(reader)?;
                let byte_array = reader.read_boxed_slice(len)?;
                Ok(NbtTag::ByteArray(byte_array))
            }
            STRING_ID => Ok(NbtTag::String(get_nbt_string(reader)?)),
            LIST_ID => {
                let tag_type_id = reader.get_u8_be()?;
                let len = read_len(reader)?;
                if tag_type_id == END_ID && len > 0 {
                    return Err(Error::InvalidListType(len as i32));
                }

                reader.enter()?;
                let mut values = Vec::with_capacity(ReadAdaptor::<R>::capacity_hint(len));
                for _ in 0..len {
                    values.push(NbtTag::deserialize_data(reader, tag_type_id)?);
                }
                reader.leave();

                Ok(NbtTag::List(NbtList {
                    element_id: tag_type_id,
                    values,
                }))
            }
            COMPOUND_ID => Ok(NbtTag::Compound(NbtCompound::deserialize_content(reader)?)),
            INT_ARRAY_ID => {
                let len = read_len(reader)?;
                let mut int_array = Vec::with_capacity(ReadAdaptor::<R>::capacity_hint(len));
                for _ in 0..len {
                    int_array.push(reader.get_i32_be()?);
                }
                Ok(NbtTag::IntArray(int_array.into_boxed_slice()))
            }
            LONG_ARRAY_ID => {
                let len = read_len(reader)?;
                let mut long_array = Vec::with_capacity(ReadAdaptor::<R>::capacity_hint(len));
                for _ in 0..len {
                    long_array.push(reader.get_i64_be()?);
                }
                Ok(NbtTag::LongArray(long_array.into_boxed_slice()))
            }
            _ => Err(Error::UnknownTagId(tag_id)),
        }
    }

    pub fn extract_byte(&self) -> Option<i8> {
        match self {
            NbtTag::Byte(byte) => Some(*byte),
            _ => None,
        }
    }

    pub fn extract_short(&self) -> Option<i16> {
        match self {
            NbtTag::Short(short) => Some(*short),
            _ => None,
        }
    }

    pub fn extract_int(&self) -> Option<i32> {
        match self {
            NbtTag::Int(int) => Some(*int),
            _ => None,
        }
    }

    pub fn extract_long(&self) -> Option<i64> {
        match self {
            NbtTag::Long(long) => Some(*long),
            _ => None,
        }
    }

    pub fn extract_float(&self) -> Option<f32> {
        match self {
            NbtTag::Float(float) => Some(*float),
            _ => None,
        }
    }

    pub fn extract_double(&self) -> Option<f64> {
        match self {
            NbtTag::Double(double) => Some(*double),
            _ => None,
        }
    }

    pub fn extract_bool(&self) -> Option<bool> {
        match self {
            NbtTag::Byte(byte) => Some(*byte != 0),
            _ => None,
        }
    }

    pub fn extract_byte_array(&self) -> Option<&[u8]> {
        match self {
            NbtTag::ByteArray(byte_array) => Some(byte_array),
            _ => None,
        }
    }

    pub fn extract_string(&self) -> Option<&str> {
        match self {
            NbtTag::String(string) => Some(string),
            _ => None,
        }
    }

    pub fn extract_list(&self) -> Option<&NbtList> {
        match self {
            NbtTag::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn extract_compound(&self) -> Option<&NbtCompound> {
        match self {
            NbtTag::Compound(compound) => Some(compound),
            _ => None,
        }
    }

    pub fn extract_int_array(&self) -> Option<&[i32]> {
        match self {
            NbtTag::IntArray(int_array) => Some(int_array),
            _ => None,
        }
    }

    pub fn extract_long_array(&self) -> Option<&[i64]> {
        match self {
            NbtTag::LongArray(long_array) => Some(long_array),
            _ => None,
        }
    }
}

fn read_len<R: Read>(reader: &mut ReadAdaptor<R>) -> Result<usize> {
    let len = reader.get_i32_be()?;
    if len < 0 {
        return Err(Error::NegativeLength(len));
    }
    Ok(len as usize)
}

/// Payload types that can be pulled out of a tag with [`NbtCompound::try_get`].
pub trait FromNbtTag<'a>: Sized {
    const TAG_ID: u8;

    fn from_nbt_tag(tag: &'a NbtTag) -> Option<Self>;
}

macro_rules! impl_from_nbt_tag {
    ($($ty:ty => $id:expr, $extract:ident;)*) => {
        $(
            impl<'a> FromNbtTag<'a> for $ty {
                const TAG_ID: u8 = $id;

                fn from_nbt_tag(tag: &'a NbtTag) -> Option<Self> {
                    tag.$extract()
                }
            }
        )*
    };
}

impl_from_nbt_tag! {
    i8 => BYTE_ID, extract_byte;
    bool => BYTE_ID, extract_bool;
    i16 => SHORT_ID, extract_short;
    i32 => INT_ID, extract_int;
    i64 => LONG_ID, extract_long;
    f32 => FLOAT_ID, extract_float;
    f64 => DOUBLE_ID, extract_double;
    &'a [u8] => BYTE_ARRAY_ID, extract_byte_array;
    &'a str => STRING_ID, extract_string;
    &'a NbtList => LIST_ID, extract_list;
    &'a NbtCompound => COMPOUND_ID, extract_compound;
    &'a [i32] => INT_ARRAY_ID, extract_int_array;
    &'a [i64] => LONG_ARRAY_ID, extract_long_array;
}

impl From<&str> for NbtTag {
    fn from(value: &str) -> Self {
        NbtTag::String(value.to_string())
    }
}

impl From<String> for NbtTag {
    fn from(value: String) -> Self {
        NbtTag::String(value)
    }
}

impl From<&[u8]> for NbtTag {
    fn from(value: &[u8]) -> Self {
        NbtTag::ByteArray(value.into())
    }
}

impl From<i8> for NbtTag {
    fn from(value: i8) -> Self {
        NbtTag::Byte(value)
    }
}

impl From<i16> for NbtTag {
    fn from(value: i16) -> Self {
        NbtTag::Short(value)
    }
}

impl From<i32> for NbtTag {
    fn from(value: i32) -> Self {
        NbtTag::Int(value)
    }
}

impl From<i64> for NbtTag {
    fn from(value: i64) -> Self {
        NbtTag::Long(value)
    }
}

impl From<f32> for NbtTag {
    fn from(value: f32) -> Self {
        NbtTag::Float(value)
    }
}

impl From<f64> for NbtTag {
    fn from(value: f64) -> Self {
        NbtTag::Double(value)
    }
}

impl From<bool> for NbtTag {
    fn from(value: bool) -> Self {
        NbtTag::Byte(value as i8)
    }
}

impl From<NbtList> for NbtTag {
    fn from(value: NbtList) -> Self {
        NbtTag::List(value)
    }
}

impl From<NbtCompound> for NbtTag {
    fn from(value: NbtCompound) -> Self {
        NbtTag::Compound(value)
    }
}
