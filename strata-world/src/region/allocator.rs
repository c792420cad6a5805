use std::collections::BTreeMap;

use log::warn;

use crate::region::{HEADER_SECTORS, RegionError, SECTOR_BYTES};

/// Highest sector a location entry can point at (24 bits).
pub const MAX_SECTOR_OFFSET: u32 = 0x00FF_FFFF;

/// A run of sectors as stored in the location table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectorRange {
    pub offset: u32,
    pub count: u8,
}

impl SectorRange {
    pub const EMPTY: SectorRange = SectorRange {
        offset: 0,
        count: 0,
    };

    pub const fn new(offset: u32, count: u8) -> Self {
        Self { offset, count }
    }

    pub const fn from_location(location: u32) -> Self {
        Self {
            offset: location >> 8,
            count: (location & 0xFF) as u8,
        }
    }

    pub const fn to_location(self) -> u32 {
        (self.offset << 8) | self.count as u32
    }

    /// A zero offset or a zero count both mean the chunk is not present.
    pub const fn is_empty(self) -> bool {
        self.offset == 0 || self.count == 0
    }

    /// First sector after the range.
    pub const fn end(self) -> u32 {
        self.offset + self.count as u32
    }

    pub const fn byte_offset(self) -> u64 {
        self.offset as u64 * SECTOR_BYTES as u64
    }

    pub const fn byte_len(self) -> u64 {
        self.count as u64 * SECTOR_BYTES as u64
    }
}

/// Tracks which sectors of a region hold chunk data.
#[derive(Debug, Clone, Default)]
pub struct SectorAllocator {
    /// Start sector to sector count, never overlapping.
    used: BTreeMap<u32, u8>,
}

impl SectorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a range read from the location table as used.
    pub fn occupy(&mut self, range: SectorRange) -> Result<(), RegionError> {
        if range.is_empty() {
            return Ok(());
        }
        if range.offset < HEADER_SECTORS {
            return Err(RegionError::MalformedContainer(format!(
                "sectors {}..{} overlap the header",
                range.offset,
                range.end()
            )));
        }

        let before = self.used.range(..range.offset).next_back();
        let after = self.used.range(range.offset..).next();
        let overlapping = before
            .map(|(start, count)| SectorRange::new(*start, *count))
            .filter(|before| before.end() > range.offset)
            .or_else(|| {
                after
                    .map(|(start, count)| SectorRange::new(*start, *count))
                    .filter(|after| after.offset < range.end())
            });
        if let Some(other) = overlapping {
            return Err(RegionError::MalformedContainer(format!(
                "sectors {}..{} overlap sectors {}..{}",
                range.offset,
                range.end(),
                other.offset,
                other.end()
            )));
        }

        self.used.insert(range.offset, range.count);
        Ok(())
    }

    pub fn free(&mut self, range: SectorRange) {
        if range.is_empty() {
            return;
        }
        match self.used.get(&range.offset) {
            Some(count) if *count == range.count => {
                self.used.remove(&range.offset);
            }
            _ => warn!(
                "Freeing sectors {}..{} which were not allocated",
                range.offset,
                range.end()
            ),
        }
    }

    /// Finds the first gap of `count` free sectors, or appends at the end.
    pub fn allocate(&mut self, count: u8) -> Result<SectorRange, RegionError> {
        let mut cursor = HEADER_SECTORS;
        for (start, used) in &self.used {
            if start.saturating_sub(cursor) >= count as u32 {
                break;
            }
            cursor = cursor.max(start + *used as u32);
        }

        let range = SectorRange::new(cursor, count);
        if range.end() > MAX_SECTOR_OFFSET {
            return Err(RegionError::RegionFull);
        }
        self.used.insert(range.offset, range.count);
        Ok(range)
    }

    /// First sector after all used ones. Never inside the header.
    pub fn end(&self) -> u32 {
        self.used
            .last_key_value()
            .map_or(HEADER_SECTORS, |(start, count)| start + *count as u32)
            .max(HEADER_SECTORS)
    }

    pub fn used_sectors(&self) -> u32 {
        self.used.values().map(|count| *count as u32).sum()
    }
}
