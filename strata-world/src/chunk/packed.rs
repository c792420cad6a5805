//! Palette indices packed into 64 bit words.
//!
//! A section stores one palette index per block. Every index uses the same number of bits, and
//! the indices are laid out one after the other starting at the least significant bit of the
//! first word. Two layouts exist:
//!
//! - [`PackingPolicy::Packed`]: the bit stream runs straight across word boundaries, so an index
//!   may start in the high bits of one word and end in the low bits of the next.
//! - [`PackingPolicy::Padded`]: each word holds `64 / bits` whole indices and the remaining high
//!   bits are left as zero.

use thiserror::Error;

/// Indices never use fewer bits than this once a palette has more than one entry.
pub const MIN_BITS: u8 = 4;
/// Widest index the codec handles.
pub const MAX_BITS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackingPolicy {
    /// Whole indices per word, unused high bits.
    Padded,
    /// Contiguous bit stream, indices may span two words.
    Packed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackedArrayError {
    #[error("Word {word} is out of bounds for an array of {len} words")]
    WordOutOfBounds { word: usize, len: usize },
    #[error("Bit width {0} is not supported")]
    InvalidBitWidth(u8),
    #[error("Value {value} does not fit in {bits} bits")]
    ValueTooLarge { value: u16, bits: u8 },
    #[error("Expected {expected} values but found {found}")]
    WrongLength { expected: usize, found: usize },
}

/// Bits needed to index a palette of `len` entries.
///
/// A palette of one entry needs no index array at all.
pub const fn bits_for_palette(len: usize) -> u8 {
    if len <= 1 {
        return 0;
    }
    let bits = encompassing_bits(len);
    if bits < MIN_BITS { MIN_BITS } else { bits }
}

/// Smallest bit count able to represent every value in `0..count`.
const fn encompassing_bits(count: usize) -> u8 {
    if count <= 1 {
        1
    } else {
        count.ilog2() as u8 + if count.is_power_of_two() { 0 } else { 1 }
    }
}

/// Values stored in one word. Zero bit values take no words.
pub const fn values_per_word(bits: u8) -> usize {
    if bits == 0 {
        return 0;
    }
    64 / bits as usize
}

/// Number of words needed to hold `count` values.
pub const fn word_count(count: usize, bits: u8, policy: PackingPolicy) -> usize {
    if bits == 0 {
        return 0;
    }
    match policy {
        PackingPolicy::Padded => count.div_ceil(values_per_word(bits)),
        PackingPolicy::Packed => (count * bits as usize).div_ceil(64),
    }
}

fn check_bits(bits: u8) -> Result<u64, PackedArrayError> {
    if bits == 0 || bits > MAX_BITS {
        return Err(PackedArrayError::InvalidBitWidth(bits));
    }
    Ok((1u64 << bits) - 1)
}

fn word_at(words: &[i64], word: usize) -> Result<u64, PackedArrayError> {
    words
        .get(word)
        .map(|word| *word as u64)
        .ok_or(PackedArrayError::WordOutOfBounds {
            word,
            len: words.len(),
        })
}

/// Reads the value at `index`.
pub fn unpack(
    words: &[i64],
    index: usize,
    bits: u8,
    policy: PackingPolicy,
) -> Result<u16, PackedArrayError> {
    let mask = check_bits(bits)?;
    let bits = bits as usize;

    let value = match policy {
        PackingPolicy::Padded => {
            let per_word = 64 / bits;
            let offset = (index % per_word) * bits;
            word_at(words, index / per_word)? >> offset
        }
        PackingPolicy::Packed => {
            let bit = index * bits;
            let word = bit / 64;
            let offset = bit % 64;
            let low = word_at(words, word)? >> offset;
            if offset + bits > 64 {
                // The remaining high bits sit at the bottom of the next word
                low | (word_at(words, word + 1)? << (64 - offset))
            } else {
                low
            }
        }
    };

    Ok((value & mask) as u16)
}

/// Reads the first `count` values.
pub fn unpack_all(
    words: &[i64],
    count: usize,
    bits: u8,
    policy: PackingPolicy,
) -> Result<Box<[u16]>, PackedArrayError> {
    let mask = check_bits(bits)?;
    let needed = word_count(count, bits, policy);
    if words.len() < needed {
        return Err(PackedArrayError::WordOutOfBounds {
            word: needed - 1,
            len: words.len(),
        });
    }
    if words.len() > needed {
        log::warn!(
            "Packed array has {} words but {} values only need {}, ignoring the rest",
            words.len(),
            count,
            needed
        );
    }

    let values: Box<[u16]> = match policy {
        PackingPolicy::Padded => words
            .iter()
            .flat_map(|word| {
                let word = *word as u64;
                (0..values_per_word(bits))
                    .map(move |i| ((word >> (i * bits as usize)) & mask) as u16)
            })
            .take(count)
            .collect(),
        PackingPolicy::Packed => (0..count)
            .map(|index| unpack(words, index, bits, policy))
            .collect::<Result<_, _>>()?,
    };

    Ok(values)
}

/// Packs `values` with `bits` bits each.
pub fn pack(
    values: &[u16],
    bits: u8,
    policy: PackingPolicy,
) -> Result<Box<[i64]>, PackedArrayError> {
    let mask = check_bits(bits)?;
    let mut words = vec![0u64; word_count(values.len(), bits, policy)];
    let bits_usize = bits as usize;

    for (index, value) in values.iter().enumerate() {
        let value = *value as u64;
        if value > mask {
            return Err(PackedArrayError::ValueTooLarge {
                value: value as u16,
                bits,
            });
        }

        match policy {
            PackingPolicy::Padded => {
                let per_word = 64 / bits_usize;
                words[index / per_word] |= value << ((index % per_word) * bits_usize);
            }
            PackingPolicy::Packed => {
                let bit = index * bits_usize;
                let word = bit / 64;
                let offset = bit % 64;
                words[word] |= value << offset;
                if offset + bits_usize > 64 {
                    words[word + 1] |= value >> (64 - offset);
                }
            }
        }
    }

    Ok(words.into_iter().map(|word| word as i64).collect())
}
