//! Sections and chunks built from scratch.

use std::cell::OnceCell;
use std::collections::BTreeMap;

use indexmap::IndexSet;
use log::debug;
use strata_config::{DEFAULT_DATA_VERSION, StorageConfiguration};
use strata_nbt::{COMPOUND_ID, Nbt, NbtCompound, NbtList, NbtTag};

use crate::SECTION_VOLUME;
use crate::block::Block;
use crate::chunk::packed::{PackedArrayError, bits_for_palette, pack};
use crate::chunk::version::{ChunkLayout, SectionEncoding};
use crate::chunk::{ChunkError, block_index};

fn local_index(x: i32, y: i32, z: i32) -> Result<usize, ChunkError> {
    let inside = |value: i32| (0..16).contains(&value);
    if !(inside(x) && inside(y) && inside(z)) {
        return Err(ChunkError::OutOfBounds { x, y, z });
    }
    Ok(block_index(x as usize, y as usize, z as usize))
}

#[derive(Debug, Clone)]
struct Derived {
    palette: Box<[Block]>,
    indices: Box<[u16]>,
}

/// A section that starts out as air and is edited block by block.
#[derive(Debug, Clone)]
pub struct EmptySection {
    y: i8,
    /// Every block ever set; `cube` points into it. Air is always entry 0.
    states: IndexSet<Block>,
    cube: Box<[u16; SECTION_VOLUME]>,
    derived: OnceCell<Derived>,
}

impl EmptySection {
    pub fn new(y: i8) -> Self {
        let mut states = IndexSet::new();
        states.insert(Block::air());
        Self {
            y,
            states,
            cube: Box::new([0; SECTION_VOLUME]),
            derived: OnceCell::new(),
        }
    }

    pub fn y(&self) -> i8 {
        self.y
    }

    pub fn set_block(&mut self, block: Block, x: i32, y: i32, z: i32) -> Result<(), ChunkError> {
        let index = local_index(x, y, z)?;
        if self.states.len() > u16::MAX as usize {
            self.compact();
        }
        let (state, _) = self.states.insert_full(block);
        self.cube[index] = state as u16;
        self.derived.take();
        Ok(())
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&Block, ChunkError> {
        let index = local_index(x, y, z)?;
        Ok(&self.states[self.cube[index] as usize])
    }

    /// Distinct blocks in the order they first appear in YZX order.
    pub fn palette(&self) -> &[Block] {
        &self.derived().palette
    }

    /// Palette index of every block, YZX order.
    pub fn indices(&self) -> &[u16] {
        &self.derived().indices
    }

    /// Whether every block is air.
    pub fn is_empty(&self) -> bool {
        self.cube.iter().all(|state| *state == 0)
    }

    fn derived(&self) -> &Derived {
        self.derived.get_or_init(|| {
            let mut remap = vec![None::<u16>; self.states.len()];
            let mut palette = Vec::new();
            let indices = self
                .cube
                .iter()
                .map(|&state| {
                    *remap[state as usize].get_or_insert_with(|| {
                        palette.push(self.states[state as usize].clone());
                        (palette.len() - 1) as u16
                    })
                })
                .collect();
            Derived {
                palette: palette.into_boxed_slice(),
                indices,
            }
        })
    }

    /// Drops states no block refers to anymore.
    fn compact(&mut self) {
        let palette = self.palette().to_vec();
        let indices = self.indices().to_vec();
        self.states = IndexSet::with_capacity(palette.len() + 1);
        self.states.insert(Block::air());
        let remap = palette
            .into_iter()
            .map(|block| self.states.insert_full(block).0 as u16)
            .collect::<Vec<_>>();
        for (state, index) in self.cube.iter_mut().zip(indices) {
            *state = remap[index as usize];
        }
        self.derived.take();
    }

    pub fn to_nbt(&self, layout: ChunkLayout) -> Result<NbtCompound, ChunkError> {
        write_section(self.y, self.palette(), self.indices(), layout)
    }
}

impl From<&RawSection> for EmptySection {
    fn from(raw: &RawSection) -> Self {
        let mut section = Self::new(raw.y);
        let remap = raw
            .palette
            .iter()
            .map(|block| section.states.insert_full(block.clone()).0 as u16)
            .collect::<Vec<_>>();
        for (state, index) in section.cube.iter_mut().zip(raw.indices.iter()) {
            *state = remap[*index as usize];
        }
        section
    }
}

/// A section given as ready made palette indices and palette.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSection {
    y: i8,
    indices: Box<[u16]>,
    palette: Box<[Block]>,
}

impl RawSection {
    /// `indices` holds one palette index per block in YZX order.
    pub fn new(
        y: i8,
        indices: impl Into<Box<[u16]>>,
        palette: impl Into<Box<[Block]>>,
    ) -> Result<Self, ChunkError> {
        let indices = indices.into();
        let palette = palette.into();
        if indices.len() != SECTION_VOLUME {
            return Err(PackedArrayError::WrongLength {
                expected: SECTION_VOLUME,
                found: indices.len(),
            }
            .into());
        }
        if let Some(index) = indices.iter().find(|index| **index as usize >= palette.len()) {
            return Err(ChunkError::PaletteIndexOutOfBounds {
                index: *index as usize,
                len: palette.len(),
            });
        }
        Ok(Self {
            y,
            indices,
            palette,
        })
    }

    pub fn y(&self) -> i8 {
        self.y
    }

    pub fn palette(&self) -> &[Block] {
        &self.palette
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&Block, ChunkError> {
        let index = local_index(x, y, z)?;
        Ok(&self.palette[self.indices[index] as usize])
    }

    pub fn to_nbt(&self, layout: ChunkLayout) -> Result<NbtCompound, ChunkError> {
        write_section(self.y, &self.palette, &self.indices, layout)
    }
}

/// Writes one section. A palette of one entry gets no state array.
fn write_section(
    y: i8,
    palette: &[Block],
    indices: &[u16],
    layout: ChunkLayout,
) -> Result<NbtCompound, ChunkError> {
    let SectionEncoding::Palette(policy) = layout.encoding else {
        return Err(ChunkError::LegacySection(y as i32));
    };

    let mut palette_list = NbtList::new(COMPOUND_ID);
    for block in palette {
        palette_list.push(block.to_palette())?;
    }
    let states = if palette.len() > 1 {
        Some(pack(indices, bits_for_palette(palette.len()), policy)?)
    } else {
        None
    };

    let mut section = NbtCompound::new();
    section.put_byte("Y", y);
    if layout.level_wrapper {
        section.put_list("Palette", palette_list);
        if let Some(states) = states {
            section.put("BlockStates", NbtTag::LongArray(states));
        }
    } else {
        let mut block_states = NbtCompound::new();
        block_states.put_list("palette", palette_list);
        if let Some(states) = states {
            block_states.put("data", NbtTag::LongArray(states));
        }
        section.put_component("block_states", block_states);
    }
    Ok(section)
}

#[derive(Debug, Clone)]
pub enum SectionBuilder {
    Empty(EmptySection),
    Raw(RawSection),
}

impl SectionBuilder {
    pub fn y(&self) -> i8 {
        match self {
            Self::Empty(section) => section.y(),
            Self::Raw(section) => section.y(),
        }
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&Block, ChunkError> {
        match self {
            Self::Empty(section) => section.get_block(x, y, z),
            Self::Raw(section) => section.get_block(x, y, z),
        }
    }

    pub fn palette(&self) -> &[Block] {
        match self {
            Self::Empty(section) => section.palette(),
            Self::Raw(section) => section.palette(),
        }
    }

    fn is_air_only(&self) -> bool {
        match self {
            Self::Empty(section) => section.is_empty(),
            Self::Raw(section) => section.palette.iter().all(Block::is_air),
        }
    }

    pub fn to_nbt(&self, layout: ChunkLayout) -> Result<NbtCompound, ChunkError> {
        match self {
            Self::Empty(section) => section.to_nbt(layout),
            Self::Raw(section) => section.to_nbt(layout),
        }
    }
}

impl From<EmptySection> for SectionBuilder {
    fn from(section: EmptySection) -> Self {
        Self::Empty(section)
    }
}

impl From<RawSection> for SectionBuilder {
    fn from(section: RawSection) -> Self {
        Self::Raw(section)
    }
}

/// A chunk built from scratch and written out as a tree.
#[derive(Debug, Clone)]
pub struct EmptyChunk {
    x: i32,
    z: i32,
    data_version: i32,
    layout: ChunkLayout,
    sections: BTreeMap<i8, SectionBuilder>,
}

impl EmptyChunk {
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            data_version: DEFAULT_DATA_VERSION,
            layout: ChunkLayout::DEFAULT,
            sections: BTreeMap::new(),
        }
    }

    /// Builds chunks stamped with the configured data version. Versions before the flattening
    /// cannot be written.
    pub fn with_config(x: i32, z: i32, config: &StorageConfiguration) -> Result<Self, ChunkError> {
        let data_version = config.chunk.data_version;
        let layout = ChunkLayout::for_version(Some(data_version), &config.versions)?;
        if layout.encoding == SectionEncoding::Legacy {
            return Err(ChunkError::UnsupportedVersion(data_version));
        }
        Ok(Self {
            x,
            z,
            data_version,
            layout,
            sections: BTreeMap::new(),
        })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    pub fn get_section(&self, y: i8) -> Option<&SectionBuilder> {
        self.sections.get(&y)
    }

    pub fn add_section(
        &mut self,
        section: impl Into<SectionBuilder>,
        replace: bool,
    ) -> Result<(), ChunkError> {
        let section = section.into();
        let y = section.y();
        if !self.layout.section_range().contains(&(y as i32)) {
            return Err(ChunkError::SectionOutOfRange(y as i32));
        }
        if !replace && self.sections.contains_key(&y) {
            return Err(ChunkError::SectionAlreadyExists(y as i32));
        }
        self.sections.insert(y, section);
        Ok(())
    }

    /// Section Y for a block, after checking the block lies inside the chunk.
    fn section_y(&self, x: i32, y: i32, z: i32) -> Result<i8, ChunkError> {
        let inside = |value: i32| (0..16).contains(&value);
        if !(inside(x) && inside(z) && self.layout.block_y_range().contains(&y)) {
            return Err(ChunkError::OutOfBounds { x, y, z });
        }
        Ok(y.div_euclid(16) as i8)
    }

    /// Block at chunk relative `x` and `z`. `None` when its section was never created.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<Option<&Block>, ChunkError> {
        let section_y = self.section_y(x, y, z)?;
        match self.sections.get(&section_y) {
            Some(section) => section.get_block(x, y.rem_euclid(16), z).map(Some),
            None => Ok(None),
        }
    }

    pub fn set_block(&mut self, block: Block, x: i32, y: i32, z: i32) -> Result<(), ChunkError> {
        let section_y = self.section_y(x, y, z)?;
        // Raw sections become editable on their first change
        let mut section = match self.sections.remove(&section_y) {
            Some(SectionBuilder::Empty(section)) => section,
            Some(SectionBuilder::Raw(raw)) => EmptySection::from(&raw),
            None => EmptySection::new(section_y),
        };
        let result = section.set_block(block, x, y.rem_euclid(16), z);
        self.sections.insert(section_y, section.into());
        result
    }

    /// Writes the chunk. Sections holding nothing but air are left out.
    pub fn to_nbt(&self) -> Result<Nbt, ChunkError> {
        let mut sections = NbtList::new(COMPOUND_ID);
        for section in self.sections.values() {
            if section.is_air_only() {
                debug!(
                    "Skipping air only section {} of chunk {} {}",
                    section.y(),
                    self.x,
                    self.z
                );
                continue;
            }
            sections.push(section.to_nbt(self.layout)?)?;
        }

        let mut root = NbtCompound::new();
        root.put_int("DataVersion", self.data_version);
        if self.layout.level_wrapper {
            let mut level = NbtCompound::new();
            level.put_list("Entities", NbtList::new(COMPOUND_ID));
            level.put_list("TileEntities", NbtList::new(COMPOUND_ID));
            level.put_list("LiquidTicks", NbtList::new(COMPOUND_ID));
            self.put_position(&mut level);
            level.put_list("Sections", sections);
            root.put_component("Level", level);
        } else {
            self.put_position(&mut root);
            root.put_int("yPos", *self.layout.section_range().start());
            root.put_list("block_entities", NbtList::new(COMPOUND_ID));
            root.put_list("sections", sections);
        }
        Ok(root.into())
    }

    fn put_position(&self, compound: &mut NbtCompound) {
        compound.put_int("xPos", self.x);
        compound.put_int("zPos", self.z);
        compound.put_long("LastUpdate", 0);
        compound.put_long("InhabitedTime", 0);
        compound.put_bool("isLightOn", true);
        compound.put_string("Status", "full");
    }
}
