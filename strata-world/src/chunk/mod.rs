use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::iter;
use std::sync::Arc;

use itertools::Either;
use log::warn;
use strata_config::VersionConfig;
use strata_nbt::{COMPOUND_ID, FromNbtTag, Nbt, NbtCompound, tag_name};
use thiserror::Error;

use crate::SECTION_VOLUME;
use crate::block::Block;

pub mod empty;
pub mod packed;
pub mod section;
pub mod version;

pub use empty::{EmptyChunk, EmptySection, RawSection, SectionBuilder};
pub use packed::{PackedArrayError, PackingPolicy};
pub use section::{LegacyBlock, LegacyIdTable};
pub use version::{ChunkLayout, SectionEncoding};

use packed::{bits_for_palette, unpack, unpack_all};
use section::SectionView;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Section {0} does not exist in this chunk")]
    SectionNotFound(i32),
    #[error("Data version {0} is not supported")]
    UnsupportedVersion(i32),
    #[error("Chunk is missing the {0:?} tag")]
    MissingField(&'static str),
    #[error("Malformed chunk tree: {0}")]
    Nbt(#[from] strata_nbt::Error),
    #[error("Block states are corrupt: {0}")]
    PackedArray(#[from] PackedArrayError),
    #[error("Palette index {index} is out of bounds for a palette of {len}")]
    PaletteIndexOutOfBounds { index: usize, len: usize },
    #[error("No block known for legacy id {id}:{data}")]
    UnknownLegacyId { id: u16, data: u8 },
    #[error("Block {x} {y} {z} is out of bounds")]
    OutOfBounds { x: i32, y: i32, z: i32 },
    #[error("Section {0} is outside the height of this chunk")]
    SectionOutOfRange(i32),
    #[error("Section {0} already exists")]
    SectionAlreadyExists(i32),
    #[error("Section {0} stores numeric block ids and has no palette")]
    LegacySection(i32),
    #[error("{field} holds {found} entries but at least {expected} are needed")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Reads a tag that has to be present, keeping the key in the error.
pub(crate) fn required<'a, T: FromNbtTag<'a>>(
    compound: &'a NbtCompound,
    key: &'static str,
) -> Result<T, ChunkError> {
    compound.try_get(key).map_err(|err| match err {
        strata_nbt::Error::KeyNotFound(_) => ChunkError::MissingField(key),
        err => ChunkError::Nbt(err),
    })
}

/// Index of a block inside its section. Sections are stored YZX.
pub const fn block_index(x: usize, y: usize, z: usize) -> usize {
    y * 256 + z * 16 + x
}

struct SectionSlot {
    /// Position inside the sections list of the tree.
    position: usize,
    palette: OnceCell<Box<[Block]>>,
}

/// A chunk decoded from its tree.
///
/// Sections are decoded lazily: the tree is kept as is, and the palette of a section is only
/// turned into [`Block`]s the first time that section is looked at.
pub struct Chunk {
    nbt: Nbt,
    data_version: Option<i32>,
    layout: ChunkLayout,
    x: i32,
    z: i32,
    sections: BTreeMap<i32, SectionSlot>,
    legacy_table: Option<Arc<dyn LegacyIdTable + Send + Sync>>,
}

impl Chunk {
    pub fn from_nbt(nbt: Nbt) -> Result<Self, ChunkError> {
        Self::with_config(nbt, &VersionConfig::default())
    }

    pub fn with_config(nbt: Nbt, versions: &VersionConfig) -> Result<Self, ChunkError> {
        let data_version = match nbt.try_get::<i32>("DataVersion") {
            Ok(version) => Some(version),
            Err(strata_nbt::Error::KeyNotFound(_)) => None,
            Err(err) => return Err(err.into()),
        };
        let layout = ChunkLayout::for_version(data_version, versions)?;

        let level: &NbtCompound = if layout.level_wrapper {
            required(&nbt, "Level")?
        } else {
            &nbt.root_tag
        };
        let x = required::<i32>(level, "xPos")?;
        let z = required::<i32>(level, "zPos")?;

        let mut sections = BTreeMap::new();
        if let Some(list) = level.get_list(layout.sections_key()) {
            for (position, tag) in list.iter().enumerate() {
                let section = tag.extract_compound().ok_or_else(|| {
                    strata_nbt::Error::TypeMismatch {
                        key: layout.sections_key().to_string(),
                        expected: tag_name(COMPOUND_ID),
                        found: tag.type_name(),
                    }
                })?;
                let y = required::<i8>(section, "Y")? as i32;
                let slot = SectionSlot {
                    position,
                    palette: OnceCell::new(),
                };
                if sections.insert(y, slot).is_some() {
                    warn!("Chunk {x} {z} lists section {y} twice, keeping the last one");
                }
            }
        }

        Ok(Self {
            nbt,
            data_version,
            layout,
            x,
            z,
            sections,
            legacy_table: None,
        })
    }

    /// Sets the table used to turn numeric ids of pre-flattening sections into blocks.
    pub fn with_legacy_table(mut self, table: Arc<dyn LegacyIdTable + Send + Sync>) -> Self {
        self.legacy_table = Some(table);
        self
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn data_version(&self) -> Option<i32> {
        self.data_version
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn nbt(&self) -> &Nbt {
        &self.nbt
    }

    pub fn into_nbt(self) -> Nbt {
        self.nbt
    }

    pub fn has_section(&self, section_y: i32) -> bool {
        self.sections.contains_key(&section_y)
    }

    /// Y of every section present, lowest first.
    pub fn section_ys(&self) -> impl Iterator<Item = i32> + '_ {
        self.sections.keys().copied()
    }

    fn level(&self) -> &NbtCompound {
        if self.layout.level_wrapper {
            // Presence was checked when the chunk was built
            self.nbt.get_compound("Level").unwrap_or(&self.nbt.root_tag)
        } else {
            &self.nbt.root_tag
        }
    }

    fn slot(&self, section_y: i32) -> Result<&SectionSlot, ChunkError> {
        self.sections
            .get(&section_y)
            .ok_or(ChunkError::SectionNotFound(section_y))
    }

    fn view(&self, slot: &SectionSlot) -> Result<SectionView<'_>, ChunkError> {
        let key = self.layout.sections_key();
        self.level()
            .get_list(key)
            .and_then(|list| list.get(slot.position))
            .and_then(|tag| tag.extract_compound())
            .map(|tag| SectionView::new(tag, self.layout))
            .ok_or(ChunkError::MissingField(key))
    }

    fn palette_of<'a>(&'a self, slot: &'a SectionSlot) -> Result<&'a [Block], ChunkError> {
        if let Some(palette) = slot.palette.get() {
            return Ok(palette);
        }
        let decoded = self.view(slot)?.decode_palette()?;
        Ok(slot.palette.get_or_init(|| decoded))
    }

    /// The palette of a section, decoded on first use.
    pub fn get_palette(&self, section_y: i32) -> Result<&[Block], ChunkError> {
        let slot = self.slot(section_y)?;
        if self.layout.encoding == SectionEncoding::Legacy {
            return Err(ChunkError::LegacySection(section_y));
        }
        self.palette_of(slot)
    }

    /// Block at chunk relative `x` and `z` and absolute `y`. `x` and `z` are reduced into the
    /// chunk, so absolute coordinates work as well.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<Block, ChunkError> {
        self.get_block_in_section(x, y.rem_euclid(16), z, y.div_euclid(16))
    }

    /// Block at `y` inside section `section_y`.
    pub fn get_block_in_section(
        &self,
        x: i32,
        y: i32,
        z: i32,
        section_y: i32,
    ) -> Result<Block, ChunkError> {
        if !(0..16).contains(&y) {
            return Err(ChunkError::OutOfBounds { x, y, z });
        }
        let index = block_index(
            x.rem_euclid(16) as usize,
            y as usize,
            z.rem_euclid(16) as usize,
        );

        let slot = self.slot(section_y)?;
        let view = self.view(slot)?;
        let SectionEncoding::Palette(policy) = self.layout.encoding else {
            return self.resolve_legacy(view.legacy_block(index)?);
        };

        let palette = self.palette_of(slot)?;
        let Some(states) = view.packed_states(palette.len())? else {
            return Ok(sole_block(palette));
        };
        let palette_index = unpack(states, index, bits_for_palette(palette.len()), policy)?;
        palette
            .get(palette_index as usize)
            .cloned()
            .ok_or(ChunkError::PaletteIndexOutOfBounds {
                index: palette_index as usize,
                len: palette.len(),
            })
    }

    /// Numeric id of a block in a pre-flattening chunk.
    pub fn get_legacy_block(&self, x: i32, y: i32, z: i32) -> Result<LegacyBlock, ChunkError> {
        let section_y = y.div_euclid(16);
        let slot = self.slot(section_y)?;
        if self.layout.encoding != SectionEncoding::Legacy {
            return Err(ChunkError::UnsupportedVersion(self.data_version.unwrap_or_default()));
        }
        let index = block_index(
            x.rem_euclid(16) as usize,
            y.rem_euclid(16) as usize,
            z.rem_euclid(16) as usize,
        );
        self.view(slot)?.legacy_block(index)
    }

    fn resolve_legacy(&self, block: LegacyBlock) -> Result<Block, ChunkError> {
        if block == LegacyBlock::AIR {
            return Ok(Block::air());
        }
        self.legacy_table
            .as_ref()
            .and_then(|table| table.resolve(block))
            .ok_or(ChunkError::UnknownLegacyId {
                id: block.id,
                data: block.data,
            })
    }

    /// All 4096 blocks of a section in YZX order.
    fn section_blocks(&self, section_y: i32) -> Result<Vec<Block>, ChunkError> {
        let slot = self.slot(section_y)?;
        let view = self.view(slot)?;

        let SectionEncoding::Palette(policy) = self.layout.encoding else {
            let mut resolved = HashMap::new();
            return view
                .legacy_blocks()?
                .into_iter()
                .map(|legacy| match resolved.get(&legacy) {
                    Some(block) => Ok(Block::clone(block)),
                    None => {
                        let block = self.resolve_legacy(legacy)?;
                        resolved.insert(legacy, block.clone());
                        Ok(block)
                    }
                })
                .collect();
        };

        let palette = self.palette_of(slot)?;
        let Some(states) = view.packed_states(palette.len())? else {
            return Ok(vec![sole_block(palette); SECTION_VOLUME]);
        };
        unpack_all(states, SECTION_VOLUME, bits_for_palette(palette.len()), policy)?
            .iter()
            .map(|&index| {
                palette
                    .get(index as usize)
                    .cloned()
                    .ok_or(ChunkError::PaletteIndexOutOfBounds {
                        index: index as usize,
                        len: palette.len(),
                    })
            })
            .collect()
    }

    /// Blocks of one section in YZX order, starting at index `start`.
    ///
    /// The whole section is validated before the first block is handed out.
    pub fn stream_blocks(
        &self,
        section_y: i32,
        start: usize,
    ) -> Result<impl Iterator<Item = Block>, ChunkError> {
        Ok(self.section_blocks(section_y)?.into_iter().skip(start))
    }

    /// Blocks of every section from `start_section` up to the highest section present.
    /// Sections missing in between yield air.
    pub fn stream_chunk(
        &self,
        start_section: i32,
    ) -> impl Iterator<Item = Result<Block, ChunkError>> + '_ {
        let highest = self
            .sections
            .keys()
            .next_back()
            .copied()
            .filter(|highest| *highest >= start_section);

        highest
            .into_iter()
            .flat_map(move |highest| start_section..=highest)
            .flat_map(move |section_y| {
                let blocks = match self.section_blocks(section_y) {
                    Err(ChunkError::SectionNotFound(_)) => {
                        Ok(vec![Block::air(); SECTION_VOLUME])
                    }
                    blocks => blocks,
                };
                match blocks {
                    Ok(blocks) => Either::Left(blocks.into_iter().map(Ok)),
                    Err(err) => Either::Right(iter::once(Err(err))),
                }
            })
    }
}

/// A section of at most one palette entry holds that entry everywhere, or air when the palette
/// is empty.
fn sole_block(palette: &[Block]) -> Block {
    palette.first().cloned().unwrap_or_else(Block::air)
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("x", &self.x)
            .field("z", &self.z)
            .field("data_version", &self.data_version)
            .field("layout", &self.layout)
            .field("sections", &self.sections.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use strata_nbt::{COMPOUND_ID, Nbt, NbtCompound, NbtList, NbtTag};

    use crate::SECTION_VOLUME;
    use crate::block::Block;
    use crate::chunk::packed::{PackingPolicy, pack};
    use crate::chunk::{Chunk, ChunkError, LegacyBlock, block_index};

    fn stone() -> Block {
        Block::from_name("minecraft:stone")
    }

    fn palette(blocks: &[Block]) -> NbtList {
        let mut list = NbtList::new(COMPOUND_ID);
        for block in blocks {
            list.push(block.to_palette()).unwrap();
        }
        list
    }

    /// A 1.16 style chunk with one section whose block at `index` is stone.
    fn level_chunk(data_version: i32, index: usize, policy: PackingPolicy) -> Nbt {
        let mut indices = vec![0u16; SECTION_VOLUME];
        indices[index] = 1;
        let mut section = NbtCompound::new();
        section.put_byte("Y", 1);
        section.put_list("Palette", palette(&[Block::air(), stone()]));
        section.put(
            "BlockStates",
            NbtTag::LongArray(pack(&indices, 4, policy).unwrap()),
        );

        let mut level = NbtCompound::new();
        level.put_int("xPos", 3);
        level.put_int("zPos", -2);
        level.put_list("Sections", NbtList::from_values(vec![section.into()]).unwrap());

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", data_version);
        root.put_component("Level", level);
        root.into()
    }

    #[test]
    fn test_level_chunk() {
        let index = block_index(5, 2, 7);
        let chunk = Chunk::from_nbt(level_chunk(2230, index, PackingPolicy::Packed)).unwrap();
        assert_eq!((chunk.x(), chunk.z()), (3, -2));
        assert_eq!(chunk.data_version(), Some(2230));

        assert_eq!(chunk.get_block(5, 18, 7).unwrap(), stone());
        assert_eq!(chunk.get_block(4, 18, 7).unwrap(), Block::air());
        // Absolute coordinates reduce into the chunk
        assert_eq!(chunk.get_block(3 * 16 + 5, 18, -2 * 16 + 7).unwrap(), stone());
        assert_eq!(chunk.get_block_in_section(5, 2, 7, 1).unwrap(), stone());
        assert!(matches!(
            chunk.get_block_in_section(5, 16, 7, 1),
            Err(ChunkError::OutOfBounds { .. })
        ));
        assert!(matches!(
            chunk.get_block(0, 0, 0),
            Err(ChunkError::SectionNotFound(0))
        ));
        assert_eq!(chunk.get_palette(1).unwrap().len(), 2);
    }

    #[test]
    fn test_padded_chunk() {
        let index = block_index(15, 15, 15);
        let chunk = Chunk::from_nbt(level_chunk(2586, index, PackingPolicy::Padded)).unwrap();
        assert_eq!(chunk.get_block(15, 31, 15).unwrap(), stone());
        assert_eq!(chunk.get_block(14, 31, 15).unwrap(), Block::air());
    }

    #[test]
    fn test_modern_chunk() {
        let mut states = NbtCompound::new();
        states.put_list("palette", palette(&[stone()]));
        let mut section = NbtCompound::new();
        section.put_byte("Y", -4);
        section.put_component("block_states", states);

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 3465);
        root.put_int("xPos", 0);
        root.put_int("zPos", 0);
        root.put_list("sections", NbtList::from_values(vec![section.into()]).unwrap());
        let chunk = Chunk::from_nbt(root.into()).unwrap();

        // No data array, the single palette entry fills the section
        assert_eq!(chunk.get_block(9, -64, 2).unwrap(), stone());
        assert_eq!(chunk.get_block(0, -49, 0).unwrap(), stone());
        assert_eq!(chunk.section_ys().collect::<Vec<_>>(), [-4]);

        let blocks = chunk.stream_chunk(-5).collect::<Result<Vec<_>, _>>().unwrap();
        assert_eq!(blocks.len(), 2 * SECTION_VOLUME);
        assert!(blocks[..SECTION_VOLUME].iter().all(Block::is_air));
        assert!(blocks[SECTION_VOLUME..].iter().all(|block| *block == stone()));
    }

    #[test]
    fn test_missing_states() {
        let mut section = NbtCompound::new();
        section.put_byte("Y", 0);
        section.put_list("Palette", palette(&[Block::air(), stone()]));
        let mut level = NbtCompound::new();
        level.put_int("xPos", 0);
        level.put_int("zPos", 0);
        level.put_list("Sections", NbtList::from_values(vec![section.into()]).unwrap());
        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 2230);
        root.put_component("Level", level);
        let chunk = Chunk::from_nbt(root.into()).unwrap();

        assert!(matches!(
            chunk.get_block(0, 0, 0),
            Err(ChunkError::MissingField("BlockStates"))
        ));
        assert!(matches!(
            chunk.stream_blocks(0, 0),
            Err(ChunkError::MissingField("BlockStates"))
        ));

        let mut states = NbtCompound::new();
        states.put_list("palette", palette(&[Block::air(), stone()]));
        let mut section = NbtCompound::new();
        section.put_byte("Y", 0);
        section.put_component("block_states", states);
        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 3465);
        root.put_int("xPos", 0);
        root.put_int("zPos", 0);
        root.put_list("sections", NbtList::from_values(vec![section.into()]).unwrap());
        let chunk = Chunk::from_nbt(root.into()).unwrap();
        assert!(matches!(
            chunk.get_block(3, 4, 5),
            Err(ChunkError::MissingField("data"))
        ));
        assert!(matches!(
            chunk.stream_chunk(0).next(),
            Some(Err(ChunkError::MissingField("data")))
        ));
    }

    #[test]
    fn test_stream_blocks() {
        let index = block_index(1, 0, 0);
        let chunk = Chunk::from_nbt(level_chunk(2230, index, PackingPolicy::Packed)).unwrap();
        let blocks = chunk.stream_blocks(1, 0).unwrap().collect::<Vec<_>>();
        assert_eq!(blocks.len(), SECTION_VOLUME);
        assert_eq!(blocks[index], stone());
        assert_eq!(blocks.iter().filter(|block| **block == stone()).count(), 1);

        let mut rest = chunk.stream_blocks(1, index).unwrap();
        assert_eq!(rest.next(), Some(stone()));
        assert_eq!(rest.count(), SECTION_VOLUME - index - 1);

        assert!(chunk.stream_blocks(2, 0).is_err());
        // Sections 0 is missing and streams as air, section 1 is the last one
        assert_eq!(chunk.stream_chunk(0).count(), 2 * SECTION_VOLUME);
        assert_eq!(chunk.stream_chunk(2).count(), 0);
    }

    #[test]
    fn test_corrupt_palette_index() {
        let mut section = NbtCompound::new();
        section.put_byte("Y", 0);
        section.put_list("Palette", palette(&[Block::air(), stone()]));
        // Index 5 in a palette of two
        section.put("BlockStates", NbtTag::LongArray(vec![5; 256].into_boxed_slice()));
        let mut level = NbtCompound::new();
        level.put_int("xPos", 0);
        level.put_int("zPos", 0);
        level.put_list("Sections", NbtList::from_values(vec![section.into()]).unwrap());
        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 2230);
        root.put_component("Level", level);
        let chunk = Chunk::from_nbt(root.into()).unwrap();

        assert!(matches!(
            chunk.get_block(0, 0, 0),
            Err(ChunkError::PaletteIndexOutOfBounds { index: 5, len: 2 })
        ));
        assert!(chunk.stream_chunk(0).any(|block| block.is_err()));
    }

    #[test]
    fn test_missing_fields() {
        let mut root = NbtCompound::new();
        root.put_int("DataVersion", 2230);
        assert!(matches!(
            Chunk::from_nbt(root.clone().into()),
            Err(ChunkError::MissingField("Level"))
        ));

        root.put_component("Level", NbtCompound::new());
        assert!(matches!(
            Chunk::from_nbt(root.into()),
            Err(ChunkError::MissingField("xPos"))
        ));

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", -3);
        assert!(matches!(
            Chunk::from_nbt(root.into()),
            Err(ChunkError::UnsupportedVersion(-3))
        ));
    }

    #[test]
    fn test_legacy_chunk() {
        let mut blocks = vec![0u8; SECTION_VOLUME];
        blocks[block_index(0, 0, 1)] = 1;
        let mut section = NbtCompound::new();
        section.put_byte("Y", 0);
        section.put("Blocks", NbtTag::ByteArray(blocks.into_boxed_slice()));
        section.put("Data", NbtTag::ByteArray(vec![0; 2048].into_boxed_slice()));
        let mut level = NbtCompound::new();
        level.put_int("xPos", 0);
        level.put_int("zPos", 0);
        level.put_list("Sections", NbtList::from_values(vec![section.into()]).unwrap());
        let mut root = NbtCompound::new();
        root.put_component("Level", level);

        let chunk = Chunk::from_nbt(root.into()).unwrap();
        assert_eq!(chunk.data_version(), None);
        assert_eq!(chunk.get_legacy_block(0, 0, 1).unwrap(), LegacyBlock::new(1, 0));
        assert!(matches!(
            chunk.get_palette(0),
            Err(ChunkError::LegacySection(0))
        ));
        assert!(matches!(
            chunk.get_block(0, 0, 1),
            Err(ChunkError::UnknownLegacyId { id: 1, data: 0 })
        ));
        assert_eq!(chunk.get_block(0, 0, 0).unwrap(), Block::air());

        let mut table = HashMap::new();
        table.insert(LegacyBlock::new(1, 0), stone());
        let chunk = chunk.with_legacy_table(Arc::new(table));
        assert_eq!(chunk.get_block(0, 0, 1).unwrap(), stone());
        let blocks = chunk.stream_blocks(0, 0).unwrap().collect::<Vec<_>>();
        assert_eq!(blocks.iter().filter(|block| **block == stone()).count(), 1);
    }
}
