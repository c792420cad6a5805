use std::io::{self, Read};

use crate::{Error, Result};

/// Trees nested deeper than this are rejected instead of recursing further.
pub const MAX_DEPTH: usize = 512;

/// Upper bound on what a length prefix may preallocate before the data is actually read.
const PREALLOCATION_LIMIT: usize = 64 * 1024;

/// Thin big-endian reader over any [`Read`], tracking how deep the decoder has recursed.
#[derive(Debug)]
pub struct ReadAdaptor<R: Read> {
    reader: R,
    depth: usize,
}

macro_rules! read_be {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty> {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                self.reader
                    .read_exact(&mut buf)
                    .map_err(Error::Incomplete)?;

                Ok(<$ty>::from_be_bytes(buf))
            }
        )*
    };
}

impl<R: Read> ReadAdaptor<R> {
    pub fn new(r: R) -> Self {
        Self { reader: r, depth: 0 }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    read_be! {
        get_u8_be => u8,
        get_i8_be => i8,
        get_i16_be => i16,
        get_u16_be => u16,
        get_i32_be => i32,
        get_i64_be => i64,
        get_f32_be => f32,
        get_f64_be => f64,
    }

    pub fn skip_bytes(&mut self, count: u64) -> Result<()> {
        let skipped = io::copy(&mut self.reader.by_ref().take(count), &mut io::sink())
            .map_err(Error::Incomplete)?;
        if skipped != count {
            return Err(unexpected_eof(count, skipped));
        }
        Ok(())
    }

    pub fn read_boxed_slice(&mut self, count: usize) -> Result<Box<[u8]>> {
        let mut buf = Vec::with_capacity(count.min(PREALLOCATION_LIMIT));
        let read = self
            .reader
            .by_ref()
            .take(count as u64)
            .read_to_end(&mut buf)
            .map_err(Error::Incomplete)?;
        if read != count {
            return Err(unexpected_eof(count as u64, read as u64));
        }

        Ok(buf.into())
    }

    /// Capacity to reserve for a collection announced with `len` elements.
    pub(crate) fn capacity_hint(len: usize) -> usize {
        len.min(PREALLOCATION_LIMIT)
    }

    pub(crate) fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::DepthLimit(MAX_DEPTH));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

fn unexpected_eof(wanted: u64, got: u64) -> Error {
    Error::Incomplete(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("wanted {} bytes but only {} were left", wanted, got),
    ))
}
