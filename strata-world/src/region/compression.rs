use std::io::Read;

use flate2::read::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressionError {
    #[error("Compression scheme {0} not recognised")]
    UnknownCompression(u8),
    #[error("Error while working with zlib compression: {0}")]
    ZlibError(std::io::Error),
    #[error("Error while working with Gzip compression: {0}")]
    GZipError(std::io::Error),
}

/// Compression of a chunk blob, stored as the byte after the blob length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    /// GZip Compression
    GZip = Self::GZIP_ID,
    /// ZLib Compression
    ZLib = Self::ZLIB_ID,
    /// Stored as is (since a version before 1.15.1)
    Uncompressed = Self::NO_COMPRESSION_ID,
}

impl Compression {
    const GZIP_ID: u8 = 1;
    const ZLIB_ID: u8 = 2;
    const NO_COMPRESSION_ID: u8 = 3;

    pub fn from_byte(byte: u8) -> Result<Self, CompressionError> {
        match byte {
            Self::GZIP_ID => Ok(Self::GZip),
            Self::ZLIB_ID => Ok(Self::ZLib),
            Self::NO_COMPRESSION_ID => Ok(Self::Uncompressed),
            // LZ4 (4) and custom (127) schemes are not handled
            _ => Err(CompressionError::UnknownCompression(byte)),
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn decompress_data(&self, compressed_data: &[u8]) -> Result<Box<[u8]>, CompressionError> {
        match self {
            Compression::GZip => {
                let mut decoder = GzDecoder::new(compressed_data);
                let mut chunk_data = Vec::new();
                decoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::GZipError)?;
                Ok(chunk_data.into_boxed_slice())
            }
            Compression::ZLib => {
                let mut decoder = ZlibDecoder::new(compressed_data);
                let mut chunk_data = Vec::new();
                decoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::ZlibError)?;
                Ok(chunk_data.into_boxed_slice())
            }
            Compression::Uncompressed => Ok(compressed_data.into()),
        }
    }

    /// `compression_level` goes from 0 (none) to 9 (best).
    pub fn compress_data(
        &self,
        uncompressed_data: &[u8],
        compression_level: u32,
    ) -> Result<Vec<u8>, CompressionError> {
        match self {
            Compression::GZip => {
                let mut encoder = GzEncoder::new(
                    uncompressed_data,
                    flate2::Compression::new(compression_level),
                );
                let mut chunk_data = Vec::new();
                encoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::GZipError)?;
                Ok(chunk_data)
            }
            Compression::ZLib => {
                let mut encoder = ZlibEncoder::new(
                    uncompressed_data,
                    flate2::Compression::new(compression_level),
                );
                let mut chunk_data = Vec::new();
                encoder
                    .read_to_end(&mut chunk_data)
                    .map_err(CompressionError::ZlibError)?;
                Ok(chunk_data)
            }
            Compression::Uncompressed => Ok(uncompressed_data.to_vec()),
        }
    }
}

impl From<strata_config::Compression> for Compression {
    fn from(value: strata_config::Compression) -> Self {
        match value {
            strata_config::Compression::GZip => Self::GZip,
            strata_config::Compression::ZLib => Self::ZLib,
            strata_config::Compression::Uncompressed => Self::Uncompressed,
        }
    }
}
