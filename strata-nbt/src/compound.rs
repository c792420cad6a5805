use std::io::{Read, Write};

use crate::reader::ReadAdaptor;
use crate::tag::{FromNbtTag, NbtList, NbtTag};
use crate::writer::WriteAdaptor;
use crate::{END_ID, Error, Result, get_nbt_string, tag_name, write_nbt_string};

/// An ordered collection of named tags.
///
/// Keys are kept in the order they were read or inserted. Decoding keeps every entry, even
/// repeated keys, so that a decoded tree writes back byte for byte; lookups see the last entry
/// with a given key.
#[derive(Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct NbtCompound {
    pub child_tags: Vec<(String, NbtTag)>,
}

impl NbtCompound {
    pub fn new() -> NbtCompound {
        NbtCompound {
            child_tags: Vec::new(),
        }
    }

    pub fn skip_content<R>(reader: &mut ReadAdaptor<R>) -> Result<()>
    where
        R: Read,
    {
        reader.enter()?;
        loop {
            let tag_id = reader.get_u8_be()?;
            if tag_id == END_ID {
                break;
            }

            let len = reader.get_u16_be()?;
            reader.skip_bytes(len as u64)?;

            NbtTag::skip_data(reader, tag_id)?;
        }
        reader.leave();

        Ok(())
    }

    pub fn deserialize_content<R>(reader: &mut ReadAdaptor<R>) -> Result<NbtCompound>
    where
        R: Read,
    {
        let mut compound = NbtCompound::new();

        reader.enter()?;
        loop {
            // A compound that runs out of bytes before its End tag is truncated, not finished
            let tag_id = reader.get_u8_be()?;
            if tag_id == END_ID {
                break;
            }

            let name = get_nbt_string(reader)?;
            let tag = NbtTag::deserialize_data(reader, tag_id)?;
            compound.push(name, tag);
        }
        reader.leave();

        Ok(compound)
    }

    pub fn serialize_content<W>(&self, w: &mut WriteAdaptor<W>) -> Result<()>
    where
        W: Write,
    {
        for (name, tag) in &self.child_tags {
            w.write_u8_be(tag.get_type_id())?;
            write_nbt_string(w, name)?;
            tag.serialize_data(w)?;
        }
        w.write_u8_be(END_ID)?;
        Ok(())
    }

    /// Appends an entry without looking for an existing one with the same key.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<NbtTag>) {
        self.child_tags.push((name.into(), value.into()));
    }

    /// Sets `name` to `value`, replacing the entry lookups currently see or appending a new one.
    pub fn put(&mut self, name: &str, value: impl Into<NbtTag>) {
        let value = value.into();
        match self.child_tags.iter_mut().rev().find(|(key, _)| key == name) {
            Some((_, slot)) => *slot = value,
            None => self.child_tags.push((name.to_string(), value)),
        }
    }

    pub fn put_byte(&mut self, name: &str, value: i8) {
        self.put(name, NbtTag::Byte(value));
    }

    pub fn put_bool(&mut self, name: &str, value: bool) {
        self.put(name, NbtTag::Byte(if value { 1 } else { 0 }));
    }

    pub fn put_short(&mut self, name: &str, value: i16) {
        self.put(name, NbtTag::Short(value));
    }

    pub fn put_int(&mut self, name: &str, value: i32) {
        self.put(name, NbtTag::Int(value));
    }

    pub fn put_long(&mut self, name: &str, value: i64) {
        self.put(name, NbtTag::Long(value));
    }

    pub fn put_float(&mut self, name: &str, value: f32) {
        self.put(name, NbtTag::Float(value));
    }

    pub fn put_double(&mut self, name: &str, value: f64) {
        self.put(name, NbtTag::Double(value));
    }

    pub fn put_string(&mut self, name: &str, value: impl Into<String>) {
        self.put(name, NbtTag::String(value.into()));
    }

    pub fn put_list(&mut self, name: &str, value: NbtList) {
        self.put(name, NbtTag::List(value));
    }

    pub fn put_component(&mut self, name: &str, value: NbtCompound) {
        self.put(name, NbtTag::Compound(value));
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&NbtTag> {
        self.child_tags
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut NbtTag> {
        self.child_tags
            .iter_mut()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Removes every entry with the given key, returning the one lookups used to see.
    pub fn remove(&mut self, name: &str) -> Option<NbtTag> {
        let mut removed = None;
        self.child_tags.retain_mut(|(key, value)| {
            if key == name {
                removed = Some(std::mem::replace(value, NbtTag::End));
                false
            } else {
                true
            }
        });
        removed
    }

    /// Typed lookup that tells a missing key apart from a key holding another tag type.
    pub fn try_get<'a, T: FromNbtTag<'a>>(&'a self, name: &str) -> Result<T> {
        let tag = self
            .get(name)
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        T::from_nbt_tag(tag).ok_or_else(|| Error::TypeMismatch {
            key: name.to_string(),
            expected: tag_name(T::TAG_ID),
            found: tag.type_name(),
        })
    }

    pub fn get_byte(&self, name: &str) -> Option<i8> {
        self.get(name).and_then(|tag| tag.extract_byte())
    }

    pub fn get_short(&self, name: &str) -> Option<i16> {
        self.get(name).and_then(|tag| tag.extract_short())
    }

    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|tag| tag.extract_int())
    }

    pub fn get_long(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|tag| tag.extract_long())
    }

    pub fn get_float(&self, name: &str) -> Option<f32> {
        self.get(name).and_then(|tag| tag.extract_float())
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|tag| tag.extract_double())
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|tag| tag.extract_bool())
    }

    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|tag| tag.extract_string())
    }

    pub fn get_list(&self, name: &str) -> Option<&NbtList> {
        self.get(name).and_then(|tag| tag.extract_list())
    }

    pub fn get_compound(&self, name: &str) -> Option<&NbtCompound> {
        self.get(name).and_then(|tag| tag.extract_compound())
    }

    pub fn get_byte_array(&self, name: &str) -> Option<&[u8]> {
        self.get(name).and_then(|tag| tag.extract_byte_array())
    }

    pub fn get_int_array(&self, name: &str) -> Option<&[i32]> {
        self.get(name).and_then(|tag| tag.extract_int_array())
    }

    pub fn get_long_array(&self, name: &str) -> Option<&[i64]> {
        self.get(name).and_then(|tag| tag.extract_long_array())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &NbtTag)> {
        self.child_tags
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.child_tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.child_tags.is_empty()
    }
}

impl FromIterator<(String, NbtTag)> for NbtCompound {
    fn from_iter<T: IntoIterator<Item = (String, NbtTag)>>(iter: T) -> Self {
        let mut compound = NbtCompound::new();
        for (key, value) in iter {
            compound.put(&key, value);
        }
        compound
    }
}

impl IntoIterator for NbtCompound {
    type Item = (String, NbtTag);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.child_tags.into_iter()
    }
}
