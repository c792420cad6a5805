use std::ops::RangeInclusive;

use strata_config::VersionConfig;

use crate::chunk::ChunkError;
use crate::chunk::packed::PackingPolicy;

/// How a section stores its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionEncoding {
    /// `Blocks`, `Add` and `Data` byte arrays of numeric ids.
    Legacy,
    /// A palette of block states plus packed palette indices.
    Palette(PackingPolicy),
}

/// Where a chunk keeps its data for a given `DataVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    pub encoding: SectionEncoding,
    /// Older chunks nest everything inside a `Level` compound.
    pub level_wrapper: bool,
}

impl ChunkLayout {
    /// Layout of [`strata_config::DEFAULT_DATA_VERSION`] under the default thresholds.
    pub const DEFAULT: ChunkLayout = ChunkLayout {
        encoding: SectionEncoding::Palette(PackingPolicy::Packed),
        level_wrapper: true,
    };

    /// Picks the layout for a chunk. A chunk without `DataVersion` predates the field and is
    /// read as legacy.
    pub fn for_version(
        data_version: Option<i32>,
        config: &VersionConfig,
    ) -> Result<Self, ChunkError> {
        let Some(version) = data_version else {
            return Ok(Self {
                encoding: SectionEncoding::Legacy,
                level_wrapper: true,
            });
        };

        if version < 0 || config.max_data_version.is_some_and(|max| version > max) {
            return Err(ChunkError::UnsupportedVersion(version));
        }

        let encoding = if version < config.flattening {
            SectionEncoding::Legacy
        } else if version < config.unstretched_block_states {
            SectionEncoding::Palette(PackingPolicy::Packed)
        } else {
            SectionEncoding::Palette(PackingPolicy::Padded)
        };

        Ok(Self {
            encoding,
            level_wrapper: version < config.level_removed,
        })
    }

    pub fn sections_key(&self) -> &'static str {
        if self.level_wrapper { "Sections" } else { "sections" }
    }

    /// Section Y values a chunk of this layout can hold.
    pub fn section_range(&self) -> RangeInclusive<i32> {
        if self.level_wrapper { 0..=15 } else { -4..=19 }
    }

    /// Block Y values a chunk of this layout can hold.
    pub fn block_y_range(&self) -> RangeInclusive<i32> {
        let sections = self.section_range();
        sections.start() * 16..=sections.end() * 16 + 15
    }
}
