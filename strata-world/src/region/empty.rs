//! A region assembled in memory and written out in one go.

use std::fs;
use std::io::Cursor;
use std::ops::RangeInclusive;
use std::path::Path;

use log::debug;
use strata_config::StorageConfiguration;
use strata_nbt::Nbt;

use crate::block::Block;
use crate::chunk::version::ChunkLayout;
use crate::chunk::{Chunk, EmptyChunk};
use crate::region::{CHUNK_COUNT, REGION_SIZE, RegionError, RegionFile, chunk_index};

const REGION_BLOCKS: i32 = REGION_SIZE as i32 * 16;

/// A chunk held by an [`EmptyRegion`].
#[derive(Debug)]
pub enum RegionChunk {
    /// Built from scratch, editable.
    Empty(EmptyChunk),
    /// Decoded from a tree, written back as is.
    Decoded(Chunk),
}

impl RegionChunk {
    pub fn x(&self) -> i32 {
        match self {
            Self::Empty(chunk) => chunk.x(),
            Self::Decoded(chunk) => chunk.x(),
        }
    }

    pub fn z(&self) -> i32 {
        match self {
            Self::Empty(chunk) => chunk.z(),
            Self::Decoded(chunk) => chunk.z(),
        }
    }

    pub fn to_nbt(&self) -> Result<Nbt, RegionError> {
        match self {
            Self::Empty(chunk) => Ok(chunk.to_nbt()?),
            Self::Decoded(chunk) => Ok(chunk.nbt().clone()),
        }
    }
}

impl From<EmptyChunk> for RegionChunk {
    fn from(chunk: EmptyChunk) -> Self {
        Self::Empty(chunk)
    }
}

impl From<Chunk> for RegionChunk {
    fn from(chunk: Chunk) -> Self {
        Self::Decoded(chunk)
    }
}

/// A region of 32x32 chunks built in memory. Block coordinates are absolute.
#[derive(Debug)]
pub struct EmptyRegion {
    x: i32,
    z: i32,
    chunks: Vec<Option<RegionChunk>>,
    block_y: RangeInclusive<i32>,
    config: StorageConfiguration,
}

impl EmptyRegion {
    pub fn new(x: i32, z: i32) -> Self {
        Self {
            x,
            z,
            chunks: (0..CHUNK_COUNT).map(|_| None).collect(),
            block_y: ChunkLayout::DEFAULT.block_y_range(),
            config: StorageConfiguration::default(),
        }
    }

    /// New chunks are built with the configured data version, which has to be writable.
    pub fn with_config(x: i32, z: i32, config: StorageConfiguration) -> Result<Self, RegionError> {
        let layout = EmptyChunk::with_config(0, 0, &config)?.layout();
        Ok(Self {
            x,
            z,
            chunks: (0..CHUNK_COUNT).map(|_| None).collect(),
            block_y: layout.block_y_range(),
            config,
        })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    /// Whether a block lies inside this region and inside the buildable height.
    pub fn inside(&self, x: i32, y: i32, z: i32) -> bool {
        x.div_euclid(REGION_BLOCKS) == self.x
            && z.div_euclid(REGION_BLOCKS) == self.z
            && self.block_y.contains(&y)
    }

    pub fn contains_chunk(&self, chunk_x: i32, chunk_z: i32) -> bool {
        chunk_x.div_euclid(REGION_SIZE as i32) == self.x
            && chunk_z.div_euclid(REGION_SIZE as i32) == self.z
    }

    fn slot_index(&self, chunk_x: i32, chunk_z: i32) -> Result<usize, RegionError> {
        if !self.contains_chunk(chunk_x, chunk_z) {
            return Err(RegionError::OutOfBounds(chunk_x, chunk_z));
        }
        Ok(chunk_index(chunk_x, chunk_z))
    }

    pub fn get_chunk(&self, chunk_x: i32, chunk_z: i32) -> Result<&RegionChunk, RegionError> {
        self.chunks[self.slot_index(chunk_x, chunk_z)?]
            .as_ref()
            .ok_or(RegionError::ChunkNotFound(chunk_x, chunk_z))
    }

    pub fn get_chunk_mut(
        &mut self,
        chunk_x: i32,
        chunk_z: i32,
    ) -> Result<&mut RegionChunk, RegionError> {
        let index = self.slot_index(chunk_x, chunk_z)?;
        self.chunks[index]
            .as_mut()
            .ok_or(RegionError::ChunkNotFound(chunk_x, chunk_z))
    }

    /// Puts a chunk in its slot, replacing whatever was there.
    pub fn add_chunk(&mut self, chunk: impl Into<RegionChunk>) -> Result<(), RegionError> {
        let chunk = chunk.into();
        let index = self.slot_index(chunk.x(), chunk.z())?;
        self.chunks[index] = Some(chunk);
        Ok(())
    }

    /// Sets a block, creating its chunk when needed.
    pub fn set_block(&mut self, block: Block, x: i32, y: i32, z: i32) -> Result<(), RegionError> {
        if !self.inside(x, y, z) {
            return Err(RegionError::OutOfBounds(x, z));
        }
        let (chunk_x, chunk_z) = (x.div_euclid(16), z.div_euclid(16));
        let index = chunk_index(chunk_x, chunk_z);
        let chunk = match &mut self.chunks[index] {
            Some(chunk) => chunk,
            slot => slot.insert(EmptyChunk::with_config(chunk_x, chunk_z, &self.config)?.into()),
        };
        match chunk {
            RegionChunk::Empty(chunk) => {
                Ok(chunk.set_block(block, x.rem_euclid(16), y, z.rem_euclid(16))?)
            }
            RegionChunk::Decoded(_) => Err(RegionError::ReadOnlyChunk(chunk_x, chunk_z)),
        }
    }

    /// Sets a block when it lies inside the region, returns whether it did.
    pub fn set_if_inside(
        &mut self,
        block: Block,
        x: i32,
        y: i32,
        z: i32,
    ) -> Result<bool, RegionError> {
        if !self.inside(x, y, z) {
            return Ok(false);
        }
        self.set_block(block, x, y, z)?;
        Ok(true)
    }

    /// Fills the box between two corners, both included. Corners may be given in any order.
    /// With `ignore_outside` blocks outside the region are skipped, otherwise the first one
    /// fails the fill.
    pub fn fill(
        &mut self,
        block: &Block,
        from: (i32, i32, i32),
        to: (i32, i32, i32),
        ignore_outside: bool,
    ) -> Result<(), RegionError> {
        let span = |a: i32, b: i32| a.min(b)..=a.max(b);
        for y in span(from.1, to.1) {
            for z in span(from.2, to.2) {
                for x in span(from.0, to.0) {
                    if ignore_outside {
                        self.set_if_inside(block.clone(), x, y, z)?;
                    } else {
                        self.set_block(block.clone(), x, y, z)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Encodes the whole region in the container format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RegionError> {
        let mut region = RegionFile::with_config(Cursor::new(Vec::new()), self.config.clone())?;
        for chunk in self.chunks.iter().flatten() {
            region.write_chunk(chunk.x(), chunk.z(), &chunk.to_nbt()?)?;
        }
        region.save()?;
        Ok(region.into_inner().into_inner())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RegionError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        debug!("Writing region {} {} to {:?}", self.x, self.z, path);
        fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_config::StorageConfiguration;
    use temp_dir::TempDir;

    use crate::block::Block;
    use crate::chunk::{Chunk, ChunkError, EmptyChunk};
    use crate::region::empty::{EmptyRegion, RegionChunk};
    use crate::region::{RegionError, RegionFile, SECTOR_BYTES};

    fn stone() -> Block {
        Block::from_name("minecraft:stone")
    }

    #[test]
    fn test_bounds() {
        let region = EmptyRegion::new(-1, 2);
        assert!(region.inside(-1, 0, 1024));
        assert!(region.inside(-512, 255, 1535));
        assert!(!region.inside(0, 0, 1024));
        assert!(!region.inside(-1, 256, 1024));
        assert!(region.contains_chunk(-32, 64));
        assert!(!region.contains_chunk(-33, 64));
    }

    #[test]
    fn test_fresh_region_is_empty() {
        let region = EmptyRegion::new(0, 0);
        for x in 0..32 {
            for z in 0..32 {
                assert!(matches!(
                    region.get_chunk(x, z),
                    Err(RegionError::ChunkNotFound(..))
                ));
            }
        }
        assert!(matches!(
            region.get_chunk(32, 0),
            Err(RegionError::OutOfBounds(32, 0))
        ));

        let mut file = RegionFile::from_bytes(region.to_bytes().unwrap()).unwrap();
        assert_eq!(file.chunks().count(), 0);
        assert!(matches!(
            file.chunk_data(0, 0),
            Err(RegionError::ChunkNotFound(0, 0))
        ));
    }

    #[test]
    fn test_set_block() {
        let mut region = EmptyRegion::new(1, 0);
        region.set_block(stone(), 520, 64, 3).unwrap();
        assert!(matches!(
            region.set_block(stone(), 3, 64, 3),
            Err(RegionError::OutOfBounds(3, 3))
        ));
        assert!(!region.set_if_inside(stone(), 3, 64, 3).unwrap());

        let RegionChunk::Empty(chunk) = region.get_chunk(32, 0).unwrap() else {
            panic!("expected a built chunk");
        };
        assert_eq!(chunk.get_block(8, 64, 3).unwrap(), Some(&stone()));
    }

    #[test]
    fn test_checkerboard_fill() {
        let mut region = EmptyRegion::new(0, 0);
        let dirt = Block::from_name("minecraft:dirt");
        region.fill(&stone(), (0, 0, 0), (15, 15, 15), false).unwrap();
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    if (x + y + z) % 2 == 1 {
                        region.set_block(dirt.clone(), x, y, z).unwrap();
                    }
                }
            }
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        region.save(&path).unwrap();

        let mut file = RegionFile::from_file(&path).unwrap();
        let chunk = file.get_chunk(0, 0).unwrap();
        assert_eq!(chunk.get_palette(0).unwrap().len(), 2);
        let stone = stone();
        for y in 0..16 {
            for z in 0..16 {
                for x in 0..16 {
                    let expected = if (x + y + z) % 2 == 1 { &dirt } else { &stone };
                    assert_eq!(&chunk.get_block(x, y, z).unwrap(), expected);
                }
            }
        }
    }

    #[test]
    fn test_single_block_volume() {
        let mut region = EmptyRegion::new(0, 0);
        region.fill(&stone(), (15, 15, 15), (0, 0, 0), false).unwrap();

        let mut file = RegionFile::from_bytes(region.to_bytes().unwrap()).unwrap();
        let nbt = file.chunk_data(0, 0).unwrap();
        let section = nbt
            .get_compound("Level")
            .and_then(|level| level.get_list("Sections"))
            .and_then(|sections| sections.first())
            .and_then(|section| section.extract_compound())
            .unwrap();
        assert_eq!(section.get_list("Palette").map(|palette| palette.len()), Some(1));
        assert!(section.get("BlockStates").is_none());

        let chunk = file.get_chunk(0, 0).unwrap();
        let blocks = chunk.stream_blocks(0, 0).unwrap().collect::<Vec<_>>();
        assert_eq!(blocks.len(), 4096);
        assert!(blocks.iter().all(|block| *block == stone()));
        assert_eq!(chunk.get_block(15, 15, 15).unwrap(), stone());
    }

    #[test]
    fn test_fill_outside() {
        let mut region = EmptyRegion::new(0, 0);
        assert!(region
            .fill(&stone(), (510, 0, 0), (513, 0, 0), false)
            .is_err());
        region.fill(&stone(), (510, 0, 0), (513, 0, 0), true).unwrap();
        let RegionChunk::Empty(chunk) = region.get_chunk(31, 0).unwrap() else {
            panic!("expected a built chunk");
        };
        assert_eq!(chunk.get_block(15, 0, 0).unwrap(), Some(&stone()));
        assert!(region.get_chunk(32, 0).is_err());
    }

    #[test]
    fn test_mixed_chunks() {
        let _ = env_logger::try_init();
        let mut built = EmptyChunk::new(0, 0);
        built.set_block(stone(), 0, 0, 0).unwrap();
        let decoded = Chunk::from_nbt(built.to_nbt().unwrap()).unwrap();

        let mut region = EmptyRegion::new(0, 0);
        region.add_chunk(decoded).unwrap();
        let mut other = EmptyChunk::new(1, 0);
        other
            .set_block(Block::from_name("minecraft:dirt"), 1, 0, 0)
            .unwrap();
        region.add_chunk(other).unwrap();
        assert!(matches!(
            region.set_block(stone(), 1, 1, 1),
            Err(RegionError::ReadOnlyChunk(0, 0))
        ));
        assert!(region.add_chunk(EmptyChunk::new(40, 0)).is_err());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        region.save(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len() % SECTOR_BYTES as u64, 0);

        let mut file = RegionFile::from_file(&path).unwrap();
        for x in 0..2 {
            let chunk = file.get_chunk(x, 0).unwrap();
            assert_eq!(chunk.x(), x);
            assert!(!chunk.get_block(x, 0, 0).unwrap().is_air());
        }
    }

    #[test]
    fn test_modern_region() {
        let mut config = StorageConfiguration::default();
        config.chunk.data_version = 3465;
        let mut region = EmptyRegion::with_config(0, 0, config.clone()).unwrap();
        region.set_block(stone(), 0, -64, 0).unwrap();
        assert!(region.set_block(stone(), 0, 320, 0).is_err());

        let mut file = RegionFile::from_bytes(region.to_bytes().unwrap()).unwrap();
        let chunk = file.get_chunk(0, 0).unwrap();
        assert_eq!(chunk.data_version(), Some(3465));
        assert_eq!(chunk.get_block(0, -64, 0).unwrap(), stone());

        config.chunk.data_version = 100;
        assert!(matches!(
            EmptyRegion::with_config(0, 0, config),
            Err(RegionError::Chunk(ChunkError::UnsupportedVersion(100)))
        ));
    }
}
