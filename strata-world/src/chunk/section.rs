use std::collections::HashMap;

use strata_nbt::{COMPOUND_ID, NbtCompound, NbtList, tag_name};

use crate::SECTION_VOLUME;
use crate::block::Block;
use crate::chunk::ChunkError;
use crate::chunk::version::ChunkLayout;

/// A block from before the flattening: a numeric id plus a 4 bit data value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyBlock {
    pub id: u16,
    pub data: u8,
}

impl LegacyBlock {
    pub const AIR: LegacyBlock = LegacyBlock { id: 0, data: 0 };

    pub const fn new(id: u16, data: u8) -> Self {
        Self { id, data }
    }
}

/// Maps numeric block ids to block states. Chunks written before the flattening need one to
/// answer block lookups.
pub trait LegacyIdTable {
    fn resolve(&self, block: LegacyBlock) -> Option<Block>;
}

impl<F> LegacyIdTable for F
where
    F: Fn(LegacyBlock) -> Option<Block>,
{
    fn resolve(&self, block: LegacyBlock) -> Option<Block> {
        self(block)
    }
}

impl LegacyIdTable for HashMap<LegacyBlock, Block> {
    /// Falls back to data value 0 when the exact variant is unknown.
    fn resolve(&self, block: LegacyBlock) -> Option<Block> {
        self.get(&block)
            .or_else(|| self.get(&LegacyBlock::new(block.id, 0)))
            .cloned()
    }
}

/// Read access to one section compound of a decoded chunk.
#[derive(Clone, Copy)]
pub(crate) struct SectionView<'a> {
    tag: &'a NbtCompound,
    layout: ChunkLayout,
}

impl<'a> SectionView<'a> {
    pub fn new(tag: &'a NbtCompound, layout: ChunkLayout) -> Self {
        Self { tag, layout }
    }

    fn block_states(&self) -> Option<&'a NbtCompound> {
        if self.layout.level_wrapper {
            Some(self.tag)
        } else {
            self.tag.get_compound("block_states")
        }
    }

    fn palette_list(&self) -> Option<&'a NbtList> {
        let key = if self.layout.level_wrapper { "Palette" } else { "palette" };
        self.block_states().and_then(|states| states.get_list(key))
    }

    fn states_key(&self) -> &'static str {
        if self.layout.level_wrapper { "BlockStates" } else { "data" }
    }

    /// The packed palette indices, absent when every block is the same.
    pub fn states(&self) -> Option<&'a [i64]> {
        self.block_states()
            .and_then(|states| states.get_long_array(self.states_key()))
    }

    /// The packed indices into a palette of `palette_len` entries. Only a palette of at most
    /// one block may leave them out.
    pub fn packed_states(&self, palette_len: usize) -> Result<Option<&'a [i64]>, ChunkError> {
        if palette_len <= 1 {
            return Ok(None);
        }
        self.states()
            .map(Some)
            .ok_or(ChunkError::MissingField(self.states_key()))
    }

    pub fn decode_palette(&self) -> Result<Box<[Block]>, ChunkError> {
        let Some(list) = self.palette_list() else {
            return Ok(Box::new([]));
        };

        list.iter()
            .map(|entry| {
                entry.extract_compound().ok_or_else(|| {
                    ChunkError::Nbt(strata_nbt::Error::TypeMismatch {
                        key: "Palette".to_string(),
                        expected: tag_name(COMPOUND_ID),
                        found: entry.type_name(),
                    })
                })
            })
            .map(|entry| Block::from_palette(entry?))
            .collect()
    }

    fn legacy_array(
        &self,
        key: &'static str,
        expected: usize,
    ) -> Result<Option<&'a [u8]>, ChunkError> {
        match self.tag.get_byte_array(key) {
            Some(array) if array.len() < expected => Err(ChunkError::InvalidLength {
                field: key,
                expected,
                found: array.len(),
            }),
            array => Ok(array),
        }
    }

    pub fn legacy_block(&self, index: usize) -> Result<LegacyBlock, ChunkError> {
        let blocks = self
            .legacy_array("Blocks", SECTION_VOLUME)?
            .ok_or(ChunkError::MissingField("Blocks"))?;
        let add = self.legacy_array("Add", SECTION_VOLUME / 2)?;
        let data = self.legacy_array("Data", SECTION_VOLUME / 2)?;

        let high = add.map_or(0, |add| nibble(add, index));
        Ok(LegacyBlock {
            id: blocks[index] as u16 | (high as u16) << 8,
            data: data.map_or(0, |data| nibble(data, index)),
        })
    }

    pub fn legacy_blocks(&self) -> Result<Vec<LegacyBlock>, ChunkError> {
        (0..SECTION_VOLUME)
            .map(|index| self.legacy_block(index))
            .collect()
    }
}

/// Even indices live in the low half of a byte, odd ones in the high half.
fn nibble(array: &[u8], index: usize) -> u8 {
    let byte = array[index / 2];
    if index % 2 == 0 { byte & 0x0F } else { byte >> 4 }
}
