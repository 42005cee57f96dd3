//! e2store container parsing for era archives.
//!
//! An era file is a sequence of framed records
//! `type(2) | length(4, LE) | reserved(2) | payload`. Block payloads are
//! snappy-framed compressed SSZ; the trailing slot index maps each block
//! record back to its absolute slot.

use std::io::Read;
use std::ops::Range;
use std::path::Path;

use thiserror::Error;

/// Record type tags, stored as their two on-disk bytes.
pub const VERSION: [u8; 2] = [0x65, 0x32];
pub const COMPRESSED_SIGNED_BEACON_BLOCK: [u8; 2] = [0x01, 0x00];
pub const COMPRESSED_BEACON_STATE: [u8; 2] = [0x02, 0x00];
pub const SLOT_INDEX: [u8; 2] = [0x69, 0x32];

pub const RECORD_HEADER_SIZE: usize = 8;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error reading archive: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive does not start with a version record")]
    MissingVersion,

    #[error("record header at offset {offset} overruns the archive of {len} bytes")]
    TruncatedHeader { offset: usize, len: usize },

    #[error("record payload at offset {offset} ({payload_len} bytes) overruns the archive of {len} bytes")]
    TruncatedPayload {
        offset: usize,
        payload_len: usize,
        len: usize,
    },

    #[error("archive contains block records but no block slot index")]
    MissingSlotIndex,

    #[error("slot index payload of {0} bytes is malformed")]
    MalformedSlotIndex(usize),

    #[error("block record at offset {0} is not referenced by the slot index")]
    UnindexedBlock(usize),
}

struct RawRecord {
    kind: [u8; 2],
    /// Offset of the record header within the archive.
    offset: usize,
    payload: Range<usize>,
}

struct SlotIndex {
    record_offset: usize,
    starting_slot: u64,
    /// Signed offsets relative to the start of the index record; zero marks
    /// an empty slot.
    offsets: Vec<i64>,
}

impl SlotIndex {
    fn parse(record: &RawRecord, data: &[u8]) -> Result<Self, ArchiveError> {
        let payload = &data[record.payload.clone()];
        // starting-slot(8) | offset(8) * count | count(8)
        if payload.len() < 24 || payload.len() % 8 != 0 {
            return Err(ArchiveError::MalformedSlotIndex(payload.len()));
        }
        let count = (payload.len() - 16) / 8;
        let declared =
            u64::from_le_bytes(payload[payload.len() - 8..].try_into().expect("8-byte slice"));
        if declared as usize != count {
            return Err(ArchiveError::MalformedSlotIndex(payload.len()));
        }
        let starting_slot = u64::from_le_bytes(payload[..8].try_into().expect("8-byte slice"));
        let offsets = (0..count)
            .map(|i| {
                let at = 8 + i * 8;
                i64::from_le_bytes(payload[at..at + 8].try_into().expect("8-byte slice"))
            })
            .collect();
        Ok(Self {
            record_offset: record.offset,
            starting_slot,
            offsets,
        })
    }

    /// Slots of the non-empty entries, paired with the archive offset of the
    /// record they point at.
    fn entries(&self) -> impl Iterator<Item = (u64, usize)> + '_ {
        self.offsets.iter().enumerate().filter_map(|(i, &rel)| {
            if rel == 0 {
                return None;
            }
            let absolute = self.record_offset as i64 + rel;
            Some((self.starting_slot + i as u64, absolute as usize))
        })
    }
}

/// A parsed era archive holding the raw bytes plus the location and slot of
/// every compressed block record.
pub struct EraFile {
    data: Vec<u8>,
    blocks: Vec<(u64, Range<usize>)>,
    start_slot: u64,
}

impl EraFile {
    pub fn read(path: &Path) -> Result<Self, ArchiveError> {
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self, ArchiveError> {
        let records = scan_records(&data)?;
        tracing::debug!(records = records.len(), bytes = data.len(), "Scanned archive");
        match records.first() {
            Some(first) if first.kind == VERSION => {}
            _ => return Err(ArchiveError::MissingVersion),
        }

        let block_records: Vec<&RawRecord> = records
            .iter()
            .filter(|r| r.kind == COMPRESSED_SIGNED_BEACON_BLOCK)
            .collect();

        let slot_indexes: Vec<SlotIndex> = records
            .iter()
            .filter(|r| r.kind == SLOT_INDEX)
            .map(|r| SlotIndex::parse(r, &data))
            .collect::<Result<_, _>>()?;

        if block_records.is_empty() {
            let start_slot = slot_indexes.first().map(|i| i.starting_slot).unwrap_or(0);
            return Ok(Self {
                data,
                blocks: Vec::new(),
                start_slot,
            });
        }

        // The block index precedes the state index when both are present.
        let block_index = match slot_indexes.len() {
            0 => return Err(ArchiveError::MissingSlotIndex),
            1 => &slot_indexes[0],
            n => &slot_indexes[n - 2],
        };

        let slot_by_offset: std::collections::HashMap<usize, u64> =
            block_index.entries().map(|(slot, off)| (off, slot)).collect();

        let mut blocks = Vec::with_capacity(block_records.len());
        for record in block_records {
            let slot = slot_by_offset
                .get(&record.offset)
                .copied()
                .ok_or(ArchiveError::UnindexedBlock(record.offset))?;
            blocks.push((slot, record.payload.clone()));
        }

        Ok(Self {
            data,
            blocks,
            start_slot: block_index.starting_slot,
        })
    }

    /// Starting slot declared by the block slot index.
    pub fn start_slot(&self) -> u64 {
        self.start_slot
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Ordered `(slot, compressed_bytes)` pairs for every block record.
    pub fn blocks(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.blocks
            .iter()
            .map(|(slot, range)| (*slot, &self.data[range.clone()]))
    }
}

/// Fully drains one snappy frame into the decompressed block bytes.
pub fn decompress_block(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = snap::read::FrameDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn scan_records(data: &[u8]) -> Result<Vec<RawRecord>, ArchiveError> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        if offset + RECORD_HEADER_SIZE > data.len() {
            return Err(ArchiveError::TruncatedHeader {
                offset,
                len: data.len(),
            });
        }
        let kind = [data[offset], data[offset + 1]];
        let payload_len =
            u32::from_le_bytes(data[offset + 2..offset + 6].try_into().expect("4-byte slice"))
                as usize;
        let payload_start = offset + RECORD_HEADER_SIZE;
        let payload_end = payload_start
            .checked_add(payload_len)
            .filter(|end| *end <= data.len())
            .ok_or(ArchiveError::TruncatedPayload {
                offset,
                payload_len,
                len: data.len(),
            })?;
        records.push(RawRecord {
            kind,
            offset,
            payload: payload_start..payload_end,
        });
        offset = payload_end;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn record(kind: [u8; 2], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&kind);
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(payload);
        out
    }

    fn compress(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = snap::write::FrameEncoder::new(Vec::new());
        encoder.write_all(bytes).unwrap();
        encoder.into_inner().unwrap()
    }

    /// Builds `version | block-records | slot-index` with the index laid out
    /// the way era archives do it: offsets relative to the index record.
    fn era_bytes(start_slot: u64, blocks: &[(u64, Vec<u8>)], slot_count: usize) -> Vec<u8> {
        let mut out = record(VERSION, &[]);
        let mut positions = Vec::new();
        for (slot, compressed) in blocks {
            positions.push((*slot, out.len()));
            out.extend_from_slice(&record(COMPRESSED_SIGNED_BEACON_BLOCK, compressed));
        }
        let index_offset = out.len();
        let mut payload = Vec::new();
        payload.extend_from_slice(&start_slot.to_le_bytes());
        for i in 0..slot_count {
            let slot = start_slot + i as u64;
            let rel = positions
                .iter()
                .find(|(s, _)| *s == slot)
                .map(|(_, pos)| *pos as i64 - index_offset as i64)
                .unwrap_or(0);
            payload.extend_from_slice(&rel.to_le_bytes());
        }
        payload.extend_from_slice(&(slot_count as u64).to_le_bytes());
        out.extend_from_slice(&record(SLOT_INDEX, &payload));
        out
    }

    #[test]
    fn parses_blocks_with_slots_from_index() {
        let blocks = vec![
            (100, compress(b"block-at-100")),
            (101, compress(b"block-at-101")),
            (103, compress(b"block-at-103")),
        ];
        let era = EraFile::parse(era_bytes(100, &blocks, 8)).unwrap();
        assert_eq!(era.start_slot(), 100);
        assert_eq!(era.block_count(), 3);
        let decoded: Vec<(u64, Vec<u8>)> = era
            .blocks()
            .map(|(slot, compressed)| (slot, decompress_block(compressed).unwrap()))
            .collect();
        assert_eq!(decoded[0], (100, b"block-at-100".to_vec()));
        assert_eq!(decoded[1], (101, b"block-at-101".to_vec()));
        assert_eq!(decoded[2], (103, b"block-at-103".to_vec()));
    }

    #[test]
    fn tolerates_unknown_record_types() {
        let mut bytes = record(VERSION, &[]);
        bytes.extend_from_slice(&record([0xaa, 0xbb], b"mystery"));
        let mut payload = Vec::new();
        payload.extend_from_slice(&0u64.to_le_bytes());
        payload.extend_from_slice(&0i64.to_le_bytes());
        payload.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&record(SLOT_INDEX, &payload));
        let era = EraFile::parse(bytes).unwrap();
        assert_eq!(era.block_count(), 0);
    }

    #[test]
    fn rejects_archive_without_version() {
        let bytes = record(COMPRESSED_SIGNED_BEACON_BLOCK, b"zzz");
        assert!(matches!(
            EraFile::parse(bytes),
            Err(ArchiveError::MissingVersion)
        ));
    }

    #[test]
    fn rejects_blocks_without_slot_index() {
        let mut bytes = record(VERSION, &[]);
        bytes.extend_from_slice(&record(COMPRESSED_SIGNED_BEACON_BLOCK, &compress(b"x")));
        assert!(matches!(
            EraFile::parse(bytes),
            Err(ArchiveError::MissingSlotIndex)
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut bytes = record(VERSION, &[]);
        bytes.extend_from_slice(&[0x01, 0x00, 0xff, 0x00, 0x00, 0x00, 0, 0]); // claims 255 bytes
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(matches!(
            EraFile::parse(bytes),
            Err(ArchiveError::TruncatedPayload { .. })
        ));
    }

    #[test]
    fn uses_penultimate_index_when_state_index_present() {
        let blocks = vec![(16, compress(b"b"))];
        let mut bytes = era_bytes(16, &blocks, 4);
        // trailing state index with a single entry
        let mut state_payload = Vec::new();
        state_payload.extend_from_slice(&20u64.to_le_bytes());
        state_payload.extend_from_slice(&0i64.to_le_bytes());
        state_payload.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&record(SLOT_INDEX, &state_payload));
        let era = EraFile::parse(bytes).unwrap();
        assert_eq!(era.start_slot(), 16);
        assert_eq!(era.block_count(), 1);
    }

    #[test]
    fn truncated_snappy_frame_fails_decompression_only() {
        let mut frame = compress(b"a block payload that is long enough to matter");
        frame.truncate(frame.len() / 2);
        let era = EraFile::parse(era_bytes(0, &[(0, frame)], 1)).unwrap();
        assert_eq!(era.block_count(), 1);
        let (_, compressed) = era.blocks().next().unwrap();
        assert!(decompress_block(compressed).is_err());
    }
}
