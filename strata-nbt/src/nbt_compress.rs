use std::io::{Read, Write};

use flate2::{
    Compression,
    read::{GzDecoder, ZlibDecoder},
    write::{GzEncoder, ZlibEncoder},
};

use crate::{Error, Nbt, NbtCompound, ReadAdaptor, Result};

/// Reads a GZipped NBT compound tag from any reader.
///
/// This is how standalone files such as `level.dat` are stored.
pub fn read_gzip_compound_tag(input: impl Read) -> Result<NbtCompound> {
    let mut reader = ReadAdaptor::new(GzDecoder::new(input));
    let nbt = Nbt::read(&mut reader)?;
    Ok(nbt.root_tag)
}

/// Writes an NBT compound tag with GZip compression.
pub fn write_gzip_compound_tag(compound: &NbtCompound, output: impl Write) -> Result<()> {
    let mut encoder = GzEncoder::new(output, Compression::default());

    let nbt = Nbt::new(String::new(), compound.clone());
    nbt.write_to_writer(&mut encoder)?;

    encoder.finish().map_err(Error::Incomplete)?;
    Ok(())
}

pub fn write_gzip_compound_tag_to_bytes(compound: &NbtCompound) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_gzip_compound_tag(compound, &mut buffer)?;
    Ok(buffer)
}

/// Reads a zlib wrapped NBT compound tag, the encoding region files use for chunk payloads.
pub fn read_zlib_compound_tag(input: impl Read) -> Result<NbtCompound> {
    let mut reader = ReadAdaptor::new(ZlibDecoder::new(input));
    let nbt = Nbt::read(&mut reader)?;
    Ok(nbt.root_tag)
}

pub fn write_zlib_compound_tag(compound: &NbtCompound, output: impl Write) -> Result<()> {
    let mut encoder = ZlibEncoder::new(output, Compression::default());

    let nbt = Nbt::new(String::new(), compound.clone());
    nbt.write_to_writer(&mut encoder)?;

    encoder.finish().map_err(Error::Incomplete)?;
    Ok(())
}

pub fn write_zlib_compound_tag_to_bytes(compound: &NbtCompound) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_zlib_compound_tag(compound, &mut buffer)?;
    Ok(buffer)
}
