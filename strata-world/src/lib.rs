pub mod block;
pub mod chunk;
pub mod region;

pub use block::Block;
pub use chunk::{Chunk, ChunkError, EmptyChunk, EmptySection, RawSection};
pub use region::{EmptyRegion, RegionError, RegionFile};

/// Side length of a chunk and of a section, in blocks.
pub const CHUNK_WIDTH: i32 = 16;
/// Number of blocks in one 16x16x16 section.
pub const SECTION_VOLUME: usize = 16 * 16 * 16;
