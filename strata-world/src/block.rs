use std::collections::BTreeMap;
use std::fmt;

use derive_getters::Getters;
use strata_nbt::{NbtCompound, NbtTag};

use crate::chunk::{ChunkError, required};

pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// A block state as it appears in a section palette.
///
/// Two blocks are equal when namespace, name and every property match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Getters)]
pub struct Block {
    namespace: String,
    name: String,
    properties: BTreeMap<String, String>,
}

impl Block {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_properties<K, V>(
        namespace: impl Into<String>,
        name: impl Into<String>,
        properties: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            properties: properties
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Parses `namespace:name`. A name without a namespace lands in `minecraft`.
    pub fn from_name(full_name: &str) -> Self {
        match full_name.split_once(':') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::new(DEFAULT_NAMESPACE, full_name),
        }
    }

    pub fn air() -> Self {
        Self::new(DEFAULT_NAMESPACE, "air")
    }

    pub fn is_air(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE && self.name == "air" && self.properties.is_empty()
    }

    pub fn full_name(&self) -> String {
        format!("{}:{}", self.namespace, self.name)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Reads a palette entry: a compound with a `Name` string and an optional `Properties`
    /// compound of strings.
    pub fn from_palette(tag: &NbtCompound) -> Result<Self, ChunkError> {
        let full_name: &str = required(tag, "Name")?;
        let mut block = Self::from_name(full_name);

        if let Some(properties) = tag.get_compound("Properties") {
            for (key, value) in properties.iter() {
                match value {
                    NbtTag::String(value) => {
                        block.properties.insert(key.to_string(), value.clone());
                    }
                    other => log::warn!(
                        "Ignoring {} property {:?} of {} in palette",
                        other.type_name(),
                        key,
                        full_name
                    ),
                }
            }
        }

        Ok(block)
    }

    pub fn to_palette(&self) -> NbtCompound {
        let mut tag = NbtCompound::new();
        tag.put_string("Name", self.full_name());
        if !self.properties.is_empty() {
            let mut properties = NbtCompound::new();
            for (key, value) in &self.properties {
                properties.put_string(key, value.as_str());
            }
            tag.put_component("Properties", properties);
        }
        tag
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)?;
        if !self.properties.is_empty() {
            let properties = self
                .properties
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<_>>();
            write!(f, "[{}]", properties.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_nbt::NbtCompound;

    use crate::block::Block;
    use crate::chunk::ChunkError;

    #[test]
    fn test_from_name() {
        let block = Block::from_name("minecraft:stone");
        assert_eq!(block.namespace(), "minecraft");
        assert_eq!(block.name(), "stone");
        assert_eq!(Block::from_name("dirt"), Block::new("minecraft", "dirt"));
        assert_eq!(Block::from_name("mod:thing").full_name(), "mod:thing");
    }

    #[test]
    fn test_structural_equality() {
        let a = Block::with_properties("minecraft", "oak_log", [("axis", "y")]);
        let b = Block::with_properties("minecraft", "oak_log", [("axis", "y")]);
        let c = Block::with_properties("minecraft", "oak_log", [("axis", "x")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Block::new("minecraft", "oak_log"));
        assert_eq!(c.to_string(), "minecraft:oak_log[axis=x]");
        assert!(Block::air().is_air());
    }

    #[test]
    fn test_palette_entry() {
        let block = Block::with_properties(
            "minecraft",
            "furnace",
            [("facing", "north"), ("lit", "false")],
        );
        let tag = block.to_palette();
        assert_eq!(tag.get_string("Name"), Some("minecraft:furnace"));
        assert_eq!(
            tag.get_compound("Properties")
                .and_then(|properties| properties.get_string("lit")),
            Some("false")
        );
        assert_eq!(Block::from_palette(&tag).unwrap(), block);

        // No Properties compound for blocks without properties
        assert!(Block::air().to_palette().get("Properties").is_none());
    }

    #[test]
    fn test_palette_entry_without_name() {
        let mut tag = NbtCompound::new();
        tag.put_int("Name", 1);
        assert!(matches!(
            Block::from_palette(&tag),
            Err(ChunkError::Nbt(strata_nbt::Error::TypeMismatch { .. }))
        ));
        assert!(matches!(
            Block::from_palette(&NbtCompound::new()),
            Err(ChunkError::MissingField("Name"))
        ));
    }
}
