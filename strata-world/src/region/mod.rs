use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, trace};
use strata_config::StorageConfiguration;
use strata_nbt::Nbt;
use thiserror::Error;

use crate::chunk::{Chunk, ChunkError};

pub mod allocator;
pub mod compression;
pub mod empty;

pub use allocator::{SectorAllocator, SectorRange};
pub use compression::{Compression, CompressionError};
pub use empty::{EmptyRegion, RegionChunk};

/// The side size of a region in chunks (one region is 32x32 chunks)
pub const REGION_SIZE: usize = 32;

/// The number of chunks in a region
pub const CHUNK_COUNT: usize = REGION_SIZE * REGION_SIZE;

/// The number of bytes in a sector (4 KiB)
pub const SECTOR_BYTES: usize = 4096;

/// Location table and timestamp table take one sector each.
pub const HEADER_SECTORS: u32 = 2;

const HEADER_BYTES: usize = SECTOR_BYTES * HEADER_SECTORS as usize;

/// A chunk can span at most this many sectors, the count is a single byte.
pub const MAX_CHUNK_SECTORS: usize = u8::MAX as usize;

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Region of {0} bytes is too short to hold its header")]
    InvalidHeader(u64),
    #[error("Region is malformed: {0}")]
    MalformedContainer(String),
    #[error("Chunk {0} {1} does not exist")]
    ChunkNotFound(i32, i32),
    #[error("Chunk needs {0} sectors but at most 255 fit")]
    ChunkTooLarge(usize),
    #[error("{0} {1} is outside of this region")]
    OutOfBounds(i32, i32),
    #[error("No sectors left in the region")]
    RegionFull,
    #[error("Chunk {0} {1} was decoded from a tree and cannot be edited")]
    ReadOnlyChunk(i32, i32),
    #[error("Io error: {0}")]
    Io(#[from] io::Error),
    #[error("Compression error {0}")]
    Compression(#[from] CompressionError),
    #[error("Chunk tree could not be coded: {0}")]
    Nbt(#[from] strata_nbt::Error),
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),
}

/// Region holding a chunk.
pub const fn region_coords(chunk_x: i32, chunk_z: i32) -> (i32, i32) {
    (chunk_x >> 5, chunk_z >> 5)
}

/// Slot of a chunk in the location and timestamp tables.
pub const fn chunk_index(chunk_x: i32, chunk_z: i32) -> usize {
    let local_x = chunk_x & (REGION_SIZE as i32 - 1);
    let local_z = chunk_z & (REGION_SIZE as i32 - 1);
    (local_z as usize) * REGION_SIZE + local_x as usize
}

/// File name of the region holding a chunk.
pub fn region_file_name(chunk_x: i32, chunk_z: i32) -> String {
    let (region_x, region_z) = region_coords(chunk_x, chunk_z);
    format!("r.{}.{}.mca", region_x, region_z)
}

/// Backing store of a region.
pub trait RegionStorage: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl RegionStorage for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl RegionStorage for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

/// One chunk as stored in a region: a compression byte and the compressed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkBlob {
    compression: Compression,
    // Length is always the length of this + compression byte (1) so we dont need to save a length
    compressed_data: Bytes,
}

impl ChunkBlob {
    pub fn new(compression: Compression, compressed_data: impl Into<Bytes>) -> Self {
        Self {
            compression,
            compressed_data: compressed_data.into(),
        }
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn compressed_data(&self) -> &Bytes {
        &self.compressed_data
    }

    /// Raw size of serialized chunk
    #[inline]
    fn raw_write_size(&self) -> usize {
        // 4 bytes for the *length* and 1 byte for the *compression* method
        self.compressed_data.len() + 4 + 1
    }

    #[inline]
    pub fn sector_count(&self) -> usize {
        self.raw_write_size().div_ceil(SECTOR_BYTES)
    }

    /// Parses a blob from the sectors it occupies; padding after the payload is dropped.
    pub fn from_bytes(mut bytes: Bytes) -> Result<Self, RegionError> {
        if bytes.len() < 5 {
            return Err(RegionError::MalformedContainer(format!(
                "chunk blob of {} bytes is too short",
                bytes.len()
            )));
        }
        let length = bytes.get_u32() as usize;
        if length == 0 {
            return Err(RegionError::MalformedContainer(
                "chunk blob has a length of 0".to_string(),
            ));
        }
        // Minus one for the compression byte
        let length = length - 1;
        if length > bytes.len() - 1 {
            return Err(RegionError::MalformedContainer(format!(
                "Chunk length is greater than available bytes ({} vs {})",
                length,
                bytes.len() - 1
            )));
        }

        let compression = Compression::from_byte(bytes.get_u8())?;
        Ok(Self {
            compression,
            compressed_data: bytes.slice(..length),
        })
    }

    /// Writes the blob padded with zeros up to a whole number of sectors.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        let padded_size = self.sector_count() * SECTOR_BYTES;
        let mut buf = BytesMut::with_capacity(padded_size);
        buf.put_u32((self.compressed_data.len() + 1) as u32);
        buf.put_u8(self.compression.id());
        buf.put_slice(&self.compressed_data);
        buf.put_bytes(0, padded_size - self.raw_write_size());
        w.write_all(&buf)
    }

    pub fn from_nbt(nbt: &Nbt, compression: Compression, level: u32) -> Result<Self, RegionError> {
        let raw_bytes = strata_nbt::to_bytes(nbt)?;
        let compressed_data = compression.compress_data(&raw_bytes, level)?;
        Ok(Self::new(compression, compressed_data))
    }

    pub fn to_nbt(&self) -> Result<Nbt, RegionError> {
        let raw_bytes = self.compression.decompress_data(&self.compressed_data)?;
        Ok(strata_nbt::from_bytes(&raw_bytes)?)
    }
}

#[derive(Debug, Clone)]
enum PendingWrite {
    Write(ChunkBlob),
    Remove,
}

/// A region container over a file or any other [`RegionStorage`].
///
/// Chunk writes are staged in memory and only reach the storage on [`RegionFile::save`].
/// Reads see staged writes.
pub struct RegionFile<S: RegionStorage = File> {
    storage: S,
    locations: Box<[SectorRange]>,
    timestamps: Box<[u32]>,
    allocator: SectorAllocator,
    pending: BTreeMap<usize, PendingWrite>,
    header_on_disk: bool,
    config: StorageConfiguration,
}

impl RegionFile<File> {
    /// Opens an existing region file for reading and writing. A file that cannot be written is
    /// opened read only and [`RegionFile::save`] fails on it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RegionError> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => {
                debug!("Region file {:?} is not writable, opening it read only", path);
                File::open(path)?
            }
            file => file?,
        };
        Self::new(file)
    }

    /// Opens a region file, creating an empty one when it does not exist.
    pub fn create(
        path: impl AsRef<Path>,
        config: StorageConfiguration,
    ) -> Result<Self, RegionError> {
        let path = path.as_ref();
        trace!("Opening region file {:?}", path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::with_config(file, config)
    }
}

impl RegionFile<Cursor<Vec<u8>>> {
    /// Reads a region held in memory. Empty input starts a new region.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, RegionError> {
        Self::new(Cursor::new(bytes.into()))
    }
}

impl<S: RegionStorage> RegionFile<S> {
    pub fn new(storage: S) -> Result<Self, RegionError> {
        Self::with_config(storage, StorageConfiguration::default())
    }

    /// Reads the header of `storage`. Empty storage is a new region with no chunks.
    pub fn with_config(mut storage: S, config: StorageConfiguration) -> Result<Self, RegionError> {
        let len = storage.seek(SeekFrom::End(0))?;
        let mut region = Self {
            storage,
            locations: vec![SectorRange::EMPTY; CHUNK_COUNT].into_boxed_slice(),
            timestamps: vec![0; CHUNK_COUNT].into_boxed_slice(),
            allocator: SectorAllocator::new(),
            pending: BTreeMap::new(),
            header_on_disk: false,
            config,
        };
        if len == 0 {
            trace!("Region storage is empty, starting a new region");
            return Ok(region);
        }
        if len < HEADER_BYTES as u64 {
            return Err(RegionError::InvalidHeader(len));
        }

        let mut header = vec![0; HEADER_BYTES];
        region.storage.seek(SeekFrom::Start(0))?;
        region.storage.read_exact(&mut header)?;
        let (mut location_bytes, mut timestamp_bytes) = header.split_at(SECTOR_BYTES);

        let file_sectors = len.div_ceil(SECTOR_BYTES as u64);
        for index in 0..CHUNK_COUNT {
            let range = SectorRange::from_location(location_bytes.get_u32());
            let timestamp = timestamp_bytes.get_u32();

            // If the sector offset or count is 0, the chunk is not present
            if range.is_empty() {
                continue;
            }
            if range.offset as u64 >= file_sectors {
                return Err(RegionError::MalformedContainer(format!(
                    "chunk {} starts at sector {} but the region only has {} sectors",
                    index, range.offset, file_sectors
                )));
            }
            region.allocator.occupy(range)?;
            region.locations[index] = range;
            region.timestamps[index] = timestamp;
        }

        region.header_on_disk = true;
        Ok(region)
    }

    pub fn config(&self) -> &StorageConfiguration {
        &self.config
    }

    /// Where a chunk is stored on the storage, ignoring staged writes.
    pub fn chunk_location(&self, chunk_x: i32, chunk_z: i32) -> SectorRange {
        self.locations[chunk_index(chunk_x, chunk_z)]
    }

    /// Seconds since the epoch when a chunk was last saved, 0 when absent.
    pub fn chunk_timestamp(&self, chunk_x: i32, chunk_z: i32) -> u32 {
        self.timestamps[chunk_index(chunk_x, chunk_z)]
    }

    pub fn has_chunk(&self, chunk_x: i32, chunk_z: i32) -> bool {
        let index = chunk_index(chunk_x, chunk_z);
        match self.pending.get(&index) {
            Some(PendingWrite::Write(_)) => true,
            Some(PendingWrite::Remove) => false,
            None => !self.locations[index].is_empty(),
        }
    }

    /// Region relative coordinates of every chunk present.
    pub fn chunks(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..CHUNK_COUNT as i32)
            .map(|index| (index % REGION_SIZE as i32, index / REGION_SIZE as i32))
            .filter(|(x, z)| self.has_chunk(*x, *z))
    }

    /// The stored blob of a chunk. Coordinates are reduced into the region.
    pub fn chunk_blob(&mut self, chunk_x: i32, chunk_z: i32) -> Result<ChunkBlob, RegionError> {
        let index = chunk_index(chunk_x, chunk_z);
        match self.pending.get(&index) {
            Some(PendingWrite::Write(blob)) => return Ok(blob.clone()),
            Some(PendingWrite::Remove) => return Err(RegionError::ChunkNotFound(chunk_x, chunk_z)),
            None => {}
        }

        let range = self.locations[index];
        if range.is_empty() {
            return Err(RegionError::ChunkNotFound(chunk_x, chunk_z));
        }

        self.storage.seek(SeekFrom::Start(range.byte_offset()))?;
        let mut bytes = Vec::with_capacity(range.byte_len() as usize);
        (&mut self.storage)
            .take(range.byte_len())
            .read_to_end(&mut bytes)?;
        ChunkBlob::from_bytes(bytes.into())
    }

    /// The decompressed tree of a chunk.
    pub fn chunk_data(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Nbt, RegionError> {
        self.chunk_blob(chunk_x, chunk_z)?.to_nbt()
    }

    pub fn get_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<Chunk, RegionError> {
        let nbt = self.chunk_data(chunk_x, chunk_z)?;
        Ok(Chunk::with_config(nbt, &self.config.versions)?)
    }

    /// Stages a chunk tree, compressed as configured.
    pub fn write_chunk(&mut self, chunk_x: i32, chunk_z: i32, nbt: &Nbt) -> Result<(), RegionError> {
        let compression = &self.config.chunk.compression;
        let blob = ChunkBlob::from_nbt(nbt, compression.algorithm.into(), compression.level)?;
        self.write_blob(chunk_x, chunk_z, blob)
    }

    pub fn write_blob(
        &mut self,
        chunk_x: i32,
        chunk_z: i32,
        blob: ChunkBlob,
    ) -> Result<(), RegionError> {
        let sectors = blob.sector_count();
        if sectors > MAX_CHUNK_SECTORS {
            return Err(RegionError::ChunkTooLarge(sectors));
        }
        self.pending
            .insert(chunk_index(chunk_x, chunk_z), PendingWrite::Write(blob));
        Ok(())
    }

    pub fn remove_chunk(&mut self, chunk_x: i32, chunk_z: i32) {
        self.pending
            .insert(chunk_index(chunk_x, chunk_z), PendingWrite::Remove);
    }

    /// Writes staged chunks and the header, then truncates the storage after the last used
    /// sector.
    ///
    /// A staged chunk that still fits the sectors it had is rewritten at the same offset and
    /// gives back its trailing sectors. Other staged chunks take the first gap large enough for
    /// them, but never sectors another chunk held before this save: those are only released
    /// once the header pointing away from them is written. The handle is left untouched when
    /// this fails.
    pub fn save(&mut self) -> Result<(), RegionError> {
        if self.pending.is_empty() && self.header_on_disk {
            debug!("Skipping write as there were no dirty chunks");
            return Ok(());
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or_default();

        // Placement runs against the current sectors, the committed map is what the new
        // header describes.
        let mut allocator = self.allocator.clone();
        let mut committed = self.allocator.clone();
        let mut placements = Vec::with_capacity(self.pending.len());
        for (index, write) in &self.pending {
            let previous = self.locations[*index];
            committed.free(previous);
            let PendingWrite::Write(blob) = write else {
                placements.push((*index, None));
                continue;
            };
            let count = blob.sector_count() as u8;
            let range = if !previous.is_empty() && count <= previous.count {
                SectorRange::new(previous.offset, count)
            } else {
                allocator.allocate(count)?
            };
            placements.push((*index, Some((range, blob))));
        }
        for (_, placement) in &placements {
            if let Some((range, _)) = placement {
                committed.occupy(*range)?;
            }
        }

        let mut locations = self.locations.clone();
        let mut timestamps = self.timestamps.clone();
        for (index, placement) in placements {
            let Some((range, blob)) = placement else {
                trace!("Removing chunk {}", index);
                locations[index] = SectorRange::EMPTY;
                timestamps[index] = 0;
                continue;
            };
            trace!("Writing chunk {} - {}:{}", index, range.offset, range.count);
            self.storage.seek(SeekFrom::Start(range.byte_offset()))?;
            blob.write(&mut self.storage)?;
            locations[index] = range;
            timestamps[index] = timestamp;
        }

        let mut header = BytesMut::with_capacity(HEADER_BYTES);
        for range in locations.iter() {
            header.put_u32(range.to_location());
        }
        for timestamp in timestamps.iter() {
            header.put_u32(*timestamp);
        }
        self.storage.seek(SeekFrom::Start(0))?;
        self.storage.write_all(&header)?;
        self.storage
            .set_len(committed.end() as u64 * SECTOR_BYTES as u64)?;
        self.storage.flush()?;

        self.allocator = committed;
        self.locations = locations;
        self.timestamps = timestamps;
        self.pending.clear();
        self.header_on_disk = true;
        Ok(())
    }

    /// Gives back the storage. Staged writes not saved yet are dropped.
    pub fn into_inner(self) -> S {
        self.storage
    }
}
