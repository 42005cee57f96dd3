//! Minimal SSZ reading primitives: little-endian integers at byte offsets,
//! hex rendering, and list splitting via embedded offset tables.

use thiserror::Error;

/// Size of an SSZ length offset.
pub const BYTES_PER_LENGTH_OFFSET: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SszError {
    #[error("need {needed} bytes at offset {offset}, container holds {len}")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("offset table prefix of {0} bytes is not a multiple of 4")]
    MisalignedOffsetTable(usize),

    #[error("offset {value} (index {index}) points past the container of {len} bytes")]
    OffsetOutOfRange {
        index: usize,
        value: usize,
        len: usize,
    },

    #[error("offset {value} (index {index}) decreases from previous offset {previous}")]
    NonMonotonicOffset {
        index: usize,
        value: usize,
        previous: usize,
    },

    #[error("container of {len} bytes is not a multiple of fixed item size {item_size}")]
    UnevenFixedList { len: usize, item_size: usize },
}

pub type Result<T> = std::result::Result<T, SszError>;

/// How a list item is framed on the wire: a known fixed size, or
/// variable bytes delimited by the list's own offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemLayout {
    Fixed(usize),
    Variable,
}

fn bounds_check(data: &[u8], offset: usize, needed: usize) -> Result<()> {
    if offset.checked_add(needed).is_none_or(|end| end > data.len()) {
        return Err(SszError::OutOfBounds {
            offset,
            needed,
            len: data.len(),
        });
    }
    Ok(())
}

pub fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
    bounds_check(data, offset, 1)?;
    Ok(data[offset])
}

pub fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    bounds_check(data, offset, 4)?;
    let bytes: [u8; 4] = data[offset..offset + 4].try_into().expect("4-byte slice");
    Ok(u32::from_le_bytes(bytes))
}

pub fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    bounds_check(data, offset, 8)?;
    let bytes: [u8; 8] = data[offset..offset + 8].try_into().expect("8-byte slice");
    Ok(u64::from_le_bytes(bytes))
}

/// Reads an SSZ length offset (u32 LE) widened to usize.
pub fn read_offset(data: &[u8], offset: usize) -> Result<usize> {
    Ok(read_u32(data, offset)? as usize)
}

pub fn read_bytes<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    bounds_check(data, offset, len)?;
    Ok(&data[offset..offset + len])
}

pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    let slice = read_bytes(data, offset, N)?;
    Ok(slice.try_into().expect("length checked"))
}

/// `0x`-prefixed lowercase hex.
pub fn hex_str(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Renders a little-endian unsigned integer of arbitrary width as a decimal
/// string. Used for 256-bit quantities that do not fit u64 losslessly.
pub fn le_to_decimal(bytes: &[u8]) -> String {
    // big-endian working copy, repeated div-mod 10
    let mut digits: Vec<u8> = bytes.iter().rev().copied().skip_while(|b| *b == 0).collect();
    if digits.is_empty() {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while !digits.is_empty() {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(digits.len());
        for byte in &digits {
            let acc = remainder * 256 + *byte as u32;
            quotient.push((acc / 10) as u8);
            remainder = acc % 10;
        }
        out.push(b'0' + remainder as u8);
        while quotient.first() == Some(&0) {
            quotient.remove(0);
        }
        digits = quotient;
    }
    out.reverse();
    String::from_utf8(out).expect("decimal digits")
}

/// Splits a list blob into item slices according to `layout`.
///
/// Variable lists start with a table of 4-byte offsets into the same blob;
/// the first offset divided by 4 is the item count, item `i` occupies
/// `[offset_i, offset_{i+1})` and the last item ends at the blob's length.
/// Fixed lists are plain concatenations of `item_size`-byte entries.
pub fn split_list(blob: &[u8], layout: ItemLayout) -> Result<Vec<&[u8]>> {
    match layout {
        ItemLayout::Fixed(item_size) => split_fixed(blob, item_size),
        ItemLayout::Variable => split_variable(blob),
    }
}

fn split_fixed(blob: &[u8], item_size: usize) -> Result<Vec<&[u8]>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    if item_size == 0 || blob.len() % item_size != 0 {
        return Err(SszError::UnevenFixedList {
            len: blob.len(),
            item_size,
        });
    }
    Ok(blob.chunks_exact(item_size).collect())
}

fn split_variable(blob: &[u8]) -> Result<Vec<&[u8]>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    let first = read_offset(blob, 0)?;
    if first % BYTES_PER_LENGTH_OFFSET != 0 {
        return Err(SszError::MisalignedOffsetTable(first));
    }
    let count = first / BYTES_PER_LENGTH_OFFSET;
    let mut offsets = Vec::with_capacity(count + 1);
    for index in 0..count {
        let value = read_offset(blob, index * BYTES_PER_LENGTH_OFFSET)?;
        if value > blob.len() {
            return Err(SszError::OffsetOutOfRange {
                index,
                value,
                len: blob.len(),
            });
        }
        if let Some(&previous) = offsets.last() {
            if value < previous {
                return Err(SszError::NonMonotonicOffset {
                    index,
                    value,
                    previous,
                });
            }
        }
        offsets.push(value);
    }
    offsets.push(blob.len());
    Ok(offsets.windows(2).map(|pair| &blob[pair[0]..pair[1]]).collect())
}

/// Splits a blob of packed u64s (SSZ `List[uint64, N]`).
pub fn split_u64_list(blob: &[u8]) -> Result<Vec<u64>> {
    split_fixed(blob, 8)?
        .into_iter()
        .map(|item| read_u64(item, 0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable_blob(items: &[&[u8]]) -> Vec<u8> {
        let mut blob = Vec::new();
        let mut data_offset = items.len() * BYTES_PER_LENGTH_OFFSET;
        for item in items {
            blob.extend_from_slice(&(data_offset as u32).to_le_bytes());
            data_offset += item.len();
        }
        for item in items {
            blob.extend_from_slice(item);
        }
        blob
    }

    #[test]
    fn reads_little_endian_integers() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u32(&data, 0).unwrap(), 0x04030201);
        assert_eq!(read_u64(&data, 0).unwrap(), 0x0807060504030201);
        assert_eq!(read_u8(&data, 7).unwrap(), 0x08);
    }

    #[test]
    fn read_past_end_is_out_of_bounds() {
        let data = [0u8; 4];
        assert_eq!(
            read_u64(&data, 0),
            Err(SszError::OutOfBounds {
                offset: 0,
                needed: 8,
                len: 4
            })
        );
        assert!(read_bytes(&data, 2, 3).is_err());
    }

    #[test]
    fn hex_has_prefix() {
        assert_eq!(hex_str(&[0xde, 0xad]), "0xdead");
        assert_eq!(hex_str(&[]), "0x");
    }

    #[test]
    fn decimal_rendering_of_le_integers() {
        assert_eq!(le_to_decimal(&[0; 32]), "0");
        assert_eq!(le_to_decimal(&7u64.to_le_bytes()), "7");
        assert_eq!(le_to_decimal(&1_000_000_007u64.to_le_bytes()), "1000000007");
        // 2^64 = 18446744073709551616 needs the 9th byte
        let mut two_pow_64 = [0u8; 32];
        two_pow_64[8] = 1;
        assert_eq!(le_to_decimal(&two_pow_64), "18446744073709551616");
        let max = [0xffu8; 32];
        assert_eq!(
            le_to_decimal(&max),
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
        );
    }

    #[test]
    fn variable_split_round_trips() {
        let items: Vec<&[u8]> = vec![b"alpha", b"", b"gamma-gamma"];
        let blob = variable_blob(&items);
        let split = split_list(&blob, ItemLayout::Variable).unwrap();
        assert_eq!(split, items);
    }

    #[test]
    fn variable_split_of_empty_blob_is_empty() {
        assert!(split_list(&[], ItemLayout::Variable).unwrap().is_empty());
    }

    #[test]
    fn variable_split_rejects_misaligned_table() {
        let mut blob = variable_blob(&[b"x"]);
        blob[0] = 5; // first offset no longer a multiple of 4
        assert_eq!(
            split_list(&blob, ItemLayout::Variable),
            Err(SszError::MisalignedOffsetTable(5))
        );
    }

    #[test]
    fn variable_split_rejects_offset_past_end() {
        let mut blob = variable_blob(&[b"x"]);
        blob[0] = 200;
        assert!(matches!(
            split_list(&blob, ItemLayout::Variable),
            Err(SszError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn variable_split_rejects_decreasing_offsets() {
        let mut blob = variable_blob(&[b"ab", b"cd"]);
        // second offset smaller than the first
        blob[4..8].copy_from_slice(&4u32.to_le_bytes());
        assert!(matches!(
            split_list(&blob, ItemLayout::Variable),
            Err(SszError::NonMonotonicOffset { .. })
        ));
    }

    #[test]
    fn fixed_split_divides_by_item_size() {
        let blob = [1u8, 2, 3, 4, 5, 6];
        let split = split_list(&blob, ItemLayout::Fixed(2)).unwrap();
        assert_eq!(split, vec![&[1u8, 2][..], &[3, 4], &[5, 6]]);
        assert!(matches!(
            split_list(&blob, ItemLayout::Fixed(4)),
            Err(SszError::UnevenFixedList { .. })
        ));
    }

    #[test]
    fn u64_list_splits() {
        let mut blob = Vec::new();
        for v in [10u64, 20, 30] {
            blob.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(split_u64_list(&blob).unwrap(), vec![10, 20, 30]);
    }
}
