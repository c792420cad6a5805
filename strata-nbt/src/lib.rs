use std::{
    io::{self, Read, Write},
    ops::Deref,
};

use bytes::Bytes;
use thiserror::Error;

pub mod compound;
pub mod nbt_compress;
pub mod reader;
pub mod tag;
pub mod writer;

pub use compound::NbtCompound;
pub use reader::ReadAdaptor;
pub use tag::{FromNbtTag, NbtList, NbtTag};
pub use writer::WriteAdaptor;

pub const END_ID: u8 = 0x00;
pub const BYTE_ID: u8 = 0x01;
pub const SHORT_ID: u8 = 0x02;
pub const INT_ID: u8 = 0x03;
pub const LONG_ID: u8 = 0x04;
pub const FLOAT_ID: u8 = 0x05;
pub const DOUBLE_ID: u8 = 0x06;
pub const BYTE_ARRAY_ID: u8 = 0x07;
pub const STRING_ID: u8 = 0x08;
pub const LIST_ID: u8 = 0x09;
pub const COMPOUND_ID: u8 = 0x0A;
pub const INT_ARRAY_ID: u8 = 0x0B;
pub const LONG_ARRAY_ID: u8 = 0x0C;

/// Human readable name of a tag id, used in error messages.
pub const fn tag_name(id: u8) -> &'static str {
    match id {
        END_ID => "End",
        BYTE_ID => "Byte",
        SHORT_ID => "Short",
        INT_ID => "Int",
        LONG_ID => "Long",
        FLOAT_ID => "Float",
        DOUBLE_ID => "Double",
        BYTE_ARRAY_ID => "ByteArray",
        STRING_ID => "String",
        LIST_ID => "List",
        COMPOUND_ID => "Compound",
        INT_ARRAY_ID => "IntArray",
        LONG_ARRAY_ID => "LongArray",
        _ => "Unknown",
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("The root tag of the NBT file is not a compound tag. Received tag id: {0}")]
    NoRootCompound(u8),
    #[error("Encountered an unknown NBT tag id {0}.")]
    UnknownTagId(u8),
    #[error("Failed to Cesu 8 Decode")]
    Cesu8DecodingError,
    #[error("NBT reading was cut short {0}")]
    Incomplete(io::Error),
    #[error("Negative list length {0}")]
    NegativeLength(i32),
    #[error("Length too large {0}")]
    LargeLength(usize),
    #[error("List of End tags cannot hold {0} elements")]
    InvalidListType(i32),
    #[error("List values must all be of tag {expected}, found tag {found}")]
    HeterogeneousList { expected: u8, found: u8 },
    #[error("NBT nesting is deeper than {0} levels")]
    DepthLimit(usize),
    #[error("No tag named {0:?} in compound")]
    KeyNotFound(String),
    #[error("Tag {key:?} is {found} but {expected} was expected")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl Error {
    /// Whether this error means the input bytes are not a well formed tree, as opposed to a
    /// lookup on a well formed tree going wrong.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Error::KeyNotFound(_) | Error::TypeMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A root tree: a named compound.
#[derive(Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Nbt {
    pub name: String,
    pub root_tag: NbtCompound,
}

impl Nbt {
    pub fn new(name: String, tag: NbtCompound) -> Self {
        Nbt {
            name,
            root_tag: tag,
        }
    }

    pub fn read<R>(reader: &mut ReadAdaptor<R>) -> Result<Nbt>
    where
        R: Read,
    {
        let tag_type_id = reader.get_u8_be()?;

        if tag_type_id != COMPOUND_ID {
            return Err(Error::NoRootCompound(tag_type_id));
        }

        Ok(Nbt {
            name: get_nbt_string(reader)?,
            root_tag: NbtCompound::deserialize_content(reader)?,
        })
    }

    /// Reads NBT tag, that doesn't contain the name of root compound.
    pub fn read_unnamed<R>(reader: &mut ReadAdaptor<R>) -> Result<Nbt>
    where
        R: Read,
    {
        let tag_type_id = reader.get_u8_be()?;

        if tag_type_id != COMPOUND_ID {
            return Err(Error::NoRootCompound(tag_type_id));
        }

        Ok(Nbt {
            name: String::new(),
            root_tag: NbtCompound::deserialize_content(reader)?,
        })
    }

    pub fn write(&self) -> Result<Bytes> {
        let mut bytes = Vec::new();
        self.write_to_writer(&mut bytes)?;
        Ok(bytes.into())
    }

    pub fn write_to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = WriteAdaptor::new(writer);
        writer.write_u8_be(COMPOUND_ID)?;
        write_nbt_string(&mut writer, &self.name)?;
        self.root_tag.serialize_content(&mut writer)
    }

    /// Writes NBT tag, without name of root compound.
    pub fn write_unnamed(&self) -> Result<Bytes> {
        let mut bytes = Vec::new();
        let mut writer = WriteAdaptor::new(&mut bytes);

        writer.write_u8_be(COMPOUND_ID)?;
        self.root_tag.serialize_content(&mut writer)?;

        Ok(bytes.into())
    }
}

impl Deref for Nbt {
    type Target = NbtCompound;

    fn deref(&self) -> &Self::Target {
        &self.root_tag
    }
}

impl From<NbtCompound> for Nbt {
    fn from(value: NbtCompound) -> Self {
        Nbt::new(String::new(), value)
    }
}

impl AsMut<NbtCompound> for Nbt {
    fn as_mut(&mut self) -> &mut NbtCompound {
        &mut self.root_tag
    }
}

/// Decodes a named root compound from a byte slice.
pub fn from_bytes(bytes: &[u8]) -> Result<Nbt> {
    Nbt::read(&mut ReadAdaptor::new(bytes))
}

/// Encodes a named root compound.
pub fn to_bytes(nbt: &Nbt) -> Result<Bytes> {
    nbt.write()
}

pub fn get_nbt_string<R: Read>(bytes: &mut ReadAdaptor<R>) -> Result<String> {
    let len = bytes.get_u16_be()? as usize;
    let string_bytes = bytes.read_boxed_slice(len)?;
    let string = cesu8::from_java_cesu8(&string_bytes).map_err(|_| Error::Cesu8DecodingError)?;
    Ok(string.to_string())
}

pub fn write_nbt_string<W: Write>(w: &mut WriteAdaptor<W>, string: &str) -> Result<()> {
    let java_string = cesu8::to_java_cesu8(string);
    let len = java_string.len();
    if len > u16::MAX as usize {
        return Err(Error::LargeLength(len));
    }

    w.write_u16_be(len as u16)?;
    w.write_slice(&java_string)
}

#[cfg(test)]
mod test {
    use crate::{
        COMPOUND_ID, END_ID, Error, INT_ID, Nbt, NbtCompound, NbtList, NbtTag, from_bytes,
        to_bytes,
    };

    fn sample_tree() -> Nbt {
        let mut level = NbtCompound::new();
        level.put_int("xPos", -3);
        level.put_int("zPos", 17);
        level.put_long("LastUpdate", 1_234_567_890_123);
        level.put_byte("isLightOn", 1);
        level.put_short("short", -1342);
        level.put_float("float", -69.42);
        level.put_double("double", 123456.789);
        level.put("Status", "full");
        level.put("Biomes", NbtTag::IntArray(vec![1, 2, 3].into_boxed_slice()));
        level.put(
            "BlockStates",
            NbtTag::LongArray(vec![i64::MIN, -1, 0, i64::MAX].into_boxed_slice()),
        );
        level.put("Blocks", NbtTag::ByteArray(vec![0, 7, 255].into_boxed_slice()));
        level.put("Entities", NbtList::new(COMPOUND_ID));

        let mut section = NbtCompound::new();
        section.put_byte("Y", 0);
        let strings = NbtList::from_values(vec!["a".into(), "".into(), "ünïcødé\0".into()])
            .expect("homogeneous list");
        section.put("Strings", strings);
        let sections =
            NbtList::from_values(vec![NbtTag::Compound(section)]).expect("homogeneous list");
        level.put("Sections", sections);

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 1976);
        root.put_component("Level", level);
        Nbt::new(String::new(), root)
    }

    #[test]
    fn test_round_trip() {
        let nbt = sample_tree();
        let bytes = to_bytes(&nbt).unwrap();
        let decoded = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, nbt);

        // Re-encoding the decoded tree must give back the very same bytes
        assert_eq!(to_bytes(&decoded).unwrap(), bytes);
    }

    #[test]
    fn test_named_root() {
        let mut nbt = sample_tree();
        nbt.name = "hello world".to_string();
        let bytes = nbt.write().unwrap();
        assert_eq!(&bytes[..3], &[COMPOUND_ID, 0x00, 0x0B]);
        assert_eq!(from_bytes(&bytes).unwrap().name, "hello world");
    }

    #[test]
    fn test_nbt_arrays() {
        let mut compound = NbtCompound::new();
        compound.put("l", NbtTag::LongArray(vec![0].into_boxed_slice()));
        compound.put("i", NbtTag::IntArray(vec![0].into_boxed_slice()));
        compound.put("b", NbtTag::ByteArray(vec![0].into_boxed_slice()));

        let expected_bytes = [
            0x0A, // Component Tag
            0x00, 0x00, // Empty root name
            0x0C, // Long Array Type
            0x00, 0x01, // Key length
            0x6C, // Key (l)
            0x00, 0x00, 0x00, 0x01, // Array Length
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // Value(s)
            0x0B, // Int Array Tag
            0x00, 0x01, // Key length
            0x69, // Key (i)
            0x00, 0x00, 0x00, 0x01, // Array Length
            0x00, 0x00, 0x00, 0x00, // Value(s)
            0x07, // Byte Array Tag
            0x00, 0x01, // Key length
            0x62, // Key (b)
            0x00, 0x00, 0x00, 0x01, // Array Length
            0x00, // Value(s)
            0x00, // End Tag
        ];

        let bytes = Nbt::from(compound).write().unwrap();
        assert_eq!(&bytes[..], expected_bytes);
    }

    #[test]
    fn test_empty_list_keeps_element_type() {
        let mut compound = NbtCompound::new();
        compound.put("TileEntities", NbtList::new(COMPOUND_ID));
        let bytes = Nbt::from(compound).write().unwrap();

        let expected_bytes = [
            0x0A, 0x00, 0x00, // Root
            0x09, 0x00, 0x0C, // List named "TileEntities"
            b'T', b'i', b'l', b'e', b'E', b'n', b't', b'i', b't', b'i', b'e', b's',
            0x0A, // Element type: compound
            0x00, 0x00, 0x00, 0x00, // Length
            0x00, // End Tag
        ];
        assert_eq!(&bytes[..], expected_bytes);

        let decoded = from_bytes(&bytes).unwrap();
        let list = decoded.get_list("TileEntities").unwrap();
        assert_eq!(list.element_id(), COMPOUND_ID);
        assert!(list.is_empty());
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let bytes = [
            0x0A, 0x00, 0x00, // Root
            0x03, 0x00, 0x01, b'a', 0x00, 0x00, 0x00, 0x01, // a = 1
            0x03, 0x00, 0x01, b'a', 0x00, 0x00, 0x00, 0x02, // a = 2
            0x00,
        ];
        let decoded = from_bytes(&bytes).unwrap();
        assert_eq!(decoded.get_int("a"), Some(2));
        assert_eq!(decoded.child_tags.len(), 2);
        assert_eq!(&decoded.write().unwrap()[..], bytes);
    }

    #[test]
    fn test_unknown_tag() {
        let bytes = [0x0A, 0x00, 0x00, 0x0D, 0x00, 0x01, b'a', 0x00];
        match from_bytes(&bytes) {
            Err(Error::UnknownTagId(0x0D)) => (),
            other => panic!("Expected unknown tag error, got {:?}", other),
        }
    }

    #[test]
    fn test_not_a_compound_root() {
        let bytes = [INT_ID, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(from_bytes(&bytes), Err(Error::NoRootCompound(INT_ID))));
    }

    #[test]
    fn test_truncated_input() {
        let bytes = to_bytes(&sample_tree()).unwrap();
        for cut in [1, 3, 10, bytes.len() / 2, bytes.len() - 1] {
            match from_bytes(&bytes[..cut]) {
                Err(Error::Incomplete(_)) => (),
                other => panic!("Expected incomplete error at {}, got {:?}", cut, other),
            }
        }
    }

    #[test]
    fn test_missing_end_tag() {
        let bytes = [0x0A, 0x00, 0x00, 0x01, 0x00, 0x01, b'b', 0x05];
        assert!(matches!(from_bytes(&bytes), Err(Error::Incomplete(_))));
    }

    #[test]
    fn test_negative_length() {
        let bytes = [
            0x0A, 0x00, 0x00, 0x07, 0x00, 0x01, b'b', 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
        ];
        assert!(matches!(from_bytes(&bytes), Err(Error::NegativeLength(-1))));
    }

    #[test]
    fn test_list_of_end_tags() {
        let bytes = [
            0x0A, 0x00, 0x00, 0x09, 0x00, 0x01, b'l', END_ID, 0x00, 0x00, 0x00, 0x02, 0x00,
        ];
        assert!(matches!(from_bytes(&bytes), Err(Error::InvalidListType(2))));
    }

    #[test]
    fn test_huge_length_is_not_preallocated() {
        let bytes = [
            0x0A, 0x00, 0x00, 0x0C, 0x00, 0x01, b'l', 0x7F, 0xFF, 0xFF, 0xFF, 0x00,
        ];
        assert!(matches!(from_bytes(&bytes), Err(Error::Incomplete(_))));
    }

    #[test]
    fn test_depth_limit() {
        let mut bytes = vec![0x0A, 0x00, 0x00];
        for _ in 0..1000 {
            bytes.extend_from_slice(&[0x0A, 0x00, 0x00]);
        }
        assert!(matches!(from_bytes(&bytes), Err(Error::DepthLimit(_))));
    }
}
