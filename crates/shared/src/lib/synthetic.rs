//! Synthetic block and era-file builders for tests and local experiments.
//!
//! Encoders here mirror the wire layouts the decoder consumes. They produce
//! deterministic filler for fields whose content does not matter to a test.

use std::io::Write;

use crate::decode::schema::{self, FieldKind};
use crate::e2store;
use crate::networks::{Fork, SLOTS_PER_HISTORICAL_ROOT};

fn filler(byte: u8, len: usize) -> Vec<u8> {
    vec![byte; len]
}

pub fn encode_variable_list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut blob = Vec::new();
    let mut data_offset = items.len() * 4;
    for item in items {
        blob.extend_from_slice(&(data_offset as u32).to_le_bytes());
        data_offset += item.len();
    }
    for item in items {
        blob.extend_from_slice(item);
    }
    blob
}

#[derive(Debug, Clone)]
pub struct AttesterSlashingSpec {
    pub indices_1: Vec<u64>,
    pub indices_2: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct PayloadSpec {
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub base_fee_per_gas: u64,
    pub block_hash: [u8; 32],
    pub fee_recipient: [u8; 20],
    pub extra_data: Vec<u8>,
    pub transactions: Vec<Vec<u8>>,
    /// `(index, validator_index, amount)` triples; encoded Capella onward.
    pub withdrawals: Vec<(u64, u64, u64)>,
    /// Encoded Deneb onward.
    pub blob_gas_used: u64,
    pub excess_blob_gas: u64,
}

impl Default for PayloadSpec {
    fn default() -> Self {
        Self {
            block_number: 1,
            gas_limit: 30_000_000,
            gas_used: 12_345_678,
            timestamp: 0,
            base_fee_per_gas: 7,
            block_hash: [0x0c; 32],
            fee_recipient: [0x0d; 20],
            extra_data: Vec::new(),
            transactions: Vec::new(),
            withdrawals: Vec::new(),
            blob_gas_used: 0,
            excess_blob_gas: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestsSpec {
    pub deposit_count: usize,
    pub withdrawal_count: usize,
    pub consolidation_count: usize,
}

/// Everything needed to encode one signed block.
#[derive(Debug, Clone)]
pub struct BlockSpec {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: [u8; 32],
    pub state_root: [u8; 32],
    pub graffiti: [u8; 32],
    pub fork: Fork,
    /// One attestation per entry, with `data.slot` set to the entry.
    pub attestation_slots: Vec<u64>,
    pub attester_slashings: Vec<AttesterSlashingSpec>,
    pub proposer_slashing_count: usize,
    pub deposit_count: usize,
    /// `(epoch, validator_index)` pairs.
    pub voluntary_exits: Vec<(u64, u64)>,
    pub bls_change_indices: Vec<u64>,
    pub blob_commitment_count: usize,
    pub payload: Option<PayloadSpec>,
    pub requests: Option<RequestsSpec>,
}

impl BlockSpec {
    pub fn new(slot: u64, fork: Fork) -> Self {
        Self {
            slot,
            proposer_index: 42,
            parent_root: [0x01; 32],
            state_root: [0x02; 32],
            graffiti: [0x03; 32],
            fork,
            attestation_slots: Vec::new(),
            attester_slashings: Vec::new(),
            proposer_slashing_count: 0,
            deposit_count: 0,
            voluntary_exits: Vec::new(),
            bls_change_indices: Vec::new(),
            blob_commitment_count: 0,
            payload: if fork >= Fork::Bellatrix {
                Some(PayloadSpec::default())
            } else {
                None
            },
            requests: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut message = Vec::new();
        message.extend_from_slice(&self.slot.to_le_bytes());
        message.extend_from_slice(&self.proposer_index.to_le_bytes());
        message.extend_from_slice(&self.parent_root);
        message.extend_from_slice(&self.state_root);
        message.extend_from_slice(&84u32.to_le_bytes());
        message.extend_from_slice(&body);

        let mut out = Vec::new();
        out.extend_from_slice(&100u32.to_le_bytes());
        out.extend_from_slice(&filler(0x0b, 96));
        out.extend_from_slice(&message);
        out
    }

    fn encode_body(&self) -> Vec<u8> {
        let fields = schema::body_schema(self.fork);
        let mut fixed = Vec::new();
        let mut variable: Vec<Vec<u8>> = Vec::new();
        let mut offset_slots = Vec::new();

        for field in fields {
            match field.kind {
                FieldKind::Fixed(size) => fixed.extend_from_slice(&self.fixed_section(field.name, size)),
                FieldKind::Offset => {
                    offset_slots.push(fixed.len());
                    fixed.extend_from_slice(&[0u8; 4]);
                    variable.push(self.variable_section(field.name));
                }
            }
        }

        let mut offset = fixed.len();
        for (slot, section) in offset_slots.iter().zip(&variable) {
            fixed[*slot..*slot + 4].copy_from_slice(&(offset as u32).to_le_bytes());
            offset += section.len();
        }
        for section in variable {
            fixed.extend_from_slice(&section);
        }
        fixed
    }

    fn fixed_section(&self, name: &str, size: usize) -> Vec<u8> {
        match name {
            "randao_reveal" => filler(0x0a, size),
            "eth1_data" => {
                let mut out = filler(0x04, 32);
                out.extend_from_slice(&1000u64.to_le_bytes());
                out.extend_from_slice(&filler(0x05, 32));
                out
            }
            "graffiti" => self.graffiti.to_vec(),
            "sync_aggregate" => {
                let mut out = filler(0xff, 64);
                out.extend_from_slice(&filler(0x06, 96));
                out
            }
            other => unreachable!("unknown fixed body field {other}"),
        }
    }

    fn variable_section(&self, name: &str) -> Vec<u8> {
        match name {
            "proposer_slashings" => {
                let items: Vec<Vec<u8>> = (0..self.proposer_slashing_count)
                    .map(|i| {
                        let mut item = Vec::new();
                        for _ in 0..2 {
                            item.extend_from_slice(&(self.slot - 1).to_le_bytes());
                            item.extend_from_slice(&(900 + i as u64).to_le_bytes());
                            item.extend_from_slice(&filler(0x11, 96));
                            item.extend_from_slice(&filler(0x12, 96));
                        }
                        item
                    })
                    .collect();
                encode_variable_list(&items)
            }
            "attester_slashings" => {
                let items: Vec<Vec<u8>> = self
                    .attester_slashings
                    .iter()
                    .map(|spec| {
                        let att_1 = encode_indexed_attestation(self.slot, &spec.indices_1);
                        let att_2 = encode_indexed_attestation(self.slot, &spec.indices_2);
                        let mut item = Vec::new();
                        item.extend_from_slice(&8u32.to_le_bytes());
                        item.extend_from_slice(&((8 + att_1.len()) as u32).to_le_bytes());
                        item.extend_from_slice(&att_1);
                        item.extend_from_slice(&att_2);
                        item
                    })
                    .collect();
                encode_variable_list(&items)
            }
            "attestations" => {
                let items: Vec<Vec<u8>> = self
                    .attestation_slots
                    .iter()
                    .enumerate()
                    .map(|(i, data_slot)| {
                        let mut item = Vec::new();
                        item.extend_from_slice(&228u32.to_le_bytes());
                        item.extend_from_slice(&encode_attestation_data(*data_slot, i as u64));
                        item.extend_from_slice(&filler(0x13, 96));
                        item.extend_from_slice(&[0xff, 0x01]); // aggregation bits
                        item
                    })
                    .collect();
                encode_variable_list(&items)
            }
            "deposits" => {
                let mut out = Vec::new();
                for i in 0..self.deposit_count {
                    out.extend_from_slice(&filler(0x14, 33 * 32));
                    out.extend_from_slice(&filler(0x20 + i as u8, 48));
                    out.extend_from_slice(&filler(0x15, 32));
                    out.extend_from_slice(&32_000_000_000u64.to_le_bytes());
                    out.extend_from_slice(&filler(0x16, 96));
                }
                out
            }
            "voluntary_exits" => {
                let mut out = Vec::new();
                for (epoch, validator_index) in &self.voluntary_exits {
                    out.extend_from_slice(&epoch.to_le_bytes());
                    out.extend_from_slice(&validator_index.to_le_bytes());
                    out.extend_from_slice(&filler(0x17, 96));
                }
                out
            }
            "execution_payload" => self
                .payload
                .as_ref()
                .map(|payload| encode_payload(payload, self.fork))
                .unwrap_or_default(),
            "bls_to_execution_changes" => {
                let mut out = Vec::new();
                for validator_index in &self.bls_change_indices {
                    out.extend_from_slice(&validator_index.to_le_bytes());
                    out.extend_from_slice(&filler(0x18, 48));
                    out.extend_from_slice(&filler(0x19, 20));
                    out.extend_from_slice(&filler(0x1a, 96));
                }
                out
            }
            "blob_kzg_commitments" => filler(0x1b, self.blob_commitment_count * 48),
            "execution_requests" => self
                .requests
                .as_ref()
                .map(encode_requests)
                .unwrap_or_else(|| encode_requests(&RequestsSpec {
                    deposit_count: 0,
                    withdrawal_count: 0,
                    consolidation_count: 0,
                })),
            other => unreachable!("unknown variable body field {other}"),
        }
    }
}

fn encode_attestation_data(slot: u64, committee_index: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&slot.to_le_bytes());
    out.extend_from_slice(&committee_index.to_le_bytes());
    out.extend_from_slice(&filler(0x21, 32));
    out.extend_from_slice(&(slot / 32).to_le_bytes());
    out.extend_from_slice(&filler(0x22, 32));
    out.extend_from_slice(&(slot / 32 + 1).to_le_bytes());
    out.extend_from_slice(&filler(0x23, 32));
    out
}

fn encode_indexed_attestation(slot: u64, indices: &[u64]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&228u32.to_le_bytes());
    out.extend_from_slice(&encode_attestation_data(slot, 0));
    out.extend_from_slice(&filler(0x24, 96));
    for index in indices {
        out.extend_from_slice(&index.to_le_bytes());
    }
    out
}

fn encode_payload(payload: &PayloadSpec, fork: Fork) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&filler(0x31, 32)); // parent_hash
    out.extend_from_slice(&payload.fee_recipient);
    out.extend_from_slice(&filler(0x32, 32)); // state_root
    out.extend_from_slice(&filler(0x33, 32)); // receipts_root
    out.extend_from_slice(&filler(0x00, 256)); // logs_bloom
    out.extend_from_slice(&filler(0x34, 32)); // prev_randao
    out.extend_from_slice(&payload.block_number.to_le_bytes());
    out.extend_from_slice(&payload.gas_limit.to_le_bytes());
    out.extend_from_slice(&payload.gas_used.to_le_bytes());
    out.extend_from_slice(&payload.timestamp.to_le_bytes());

    let tx_blob = encode_variable_list(&payload.transactions);
    let mut withdrawals_blob = Vec::new();
    for (index, validator_index, amount) in &payload.withdrawals {
        withdrawals_blob.extend_from_slice(&index.to_le_bytes());
        withdrawals_blob.extend_from_slice(&validator_index.to_le_bytes());
        withdrawals_blob.extend_from_slice(&filler(0x35, 20));
        withdrawals_blob.extend_from_slice(&amount.to_le_bytes());
    }

    let mut fixed_end = 436 + 4 + 32 + 32 + 4;
    if fork >= Fork::Capella {
        fixed_end += 4;
    }
    if fork >= Fork::Deneb {
        fixed_end += 16;
    }

    let extra_data_offset = fixed_end;
    let transactions_offset = extra_data_offset + payload.extra_data.len();
    let withdrawals_offset = transactions_offset + tx_blob.len();

    out.extend_from_slice(&(extra_data_offset as u32).to_le_bytes());
    let mut base_fee = [0u8; 32];
    base_fee[..8].copy_from_slice(&payload.base_fee_per_gas.to_le_bytes());
    out.extend_from_slice(&base_fee);
    out.extend_from_slice(&payload.block_hash);
    out.extend_from_slice(&(transactions_offset as u32).to_le_bytes());
    if fork >= Fork::Capella {
        out.extend_from_slice(&(withdrawals_offset as u32).to_le_bytes());
    }
    if fork >= Fork::Deneb {
        out.extend_from_slice(&payload.blob_gas_used.to_le_bytes());
        out.extend_from_slice(&payload.excess_blob_gas.to_le_bytes());
    }
    out.extend_from_slice(&payload.extra_data);
    out.extend_from_slice(&tx_blob);
    if fork >= Fork::Capella {
        out.extend_from_slice(&withdrawals_blob);
    }
    out
}

fn encode_requests(spec: &RequestsSpec) -> Vec<u8> {
    let deposits: Vec<u8> = (0..spec.deposit_count)
        .flat_map(|i| {
            let mut item = filler(0x41, 48);
            item.extend_from_slice(&filler(0x42, 32));
            item.extend_from_slice(&32_000_000_000u64.to_le_bytes());
            item.extend_from_slice(&filler(0x43, 96));
            item.extend_from_slice(&(i as u64).to_le_bytes());
            item
        })
        .collect();
    let withdrawals: Vec<u8> = (0..spec.withdrawal_count)
        .flat_map(|_| {
            let mut item = filler(0x44, 20);
            item.extend_from_slice(&filler(0x45, 48));
            item.extend_from_slice(&1u64.to_le_bytes());
            item
        })
        .collect();
    let consolidations: Vec<u8> = (0..spec.consolidation_count)
        .flat_map(|_| {
            let mut item = filler(0x46, 20);
            item.extend_from_slice(&filler(0x47, 48));
            item.extend_from_slice(&filler(0x48, 48));
            item
        })
        .collect();

    let mut out = Vec::new();
    out.extend_from_slice(&12u32.to_le_bytes());
    out.extend_from_slice(&((12 + deposits.len()) as u32).to_le_bytes());
    out.extend_from_slice(&((12 + deposits.len() + withdrawals.len()) as u32).to_le_bytes());
    out.extend_from_slice(&deposits);
    out.extend_from_slice(&withdrawals);
    out.extend_from_slice(&consolidations);
    out
}

pub fn compress_snappy(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = snap::write::FrameEncoder::new(Vec::new());
    encoder.write_all(bytes).expect("in-memory write");
    encoder.into_inner().expect("in-memory flush")
}

fn e2store_record(kind: [u8; 2], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&kind);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(payload);
    out
}

/// Assembles a complete era archive from already-encoded block bytes.
/// `blocks` pairs each absolute slot with its uncompressed SSZ; slots must
/// lie inside the era and ascend.
pub fn encode_era_file(era_number: u64, blocks: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let frames: Vec<(u64, Vec<u8>)> = blocks
        .iter()
        .map(|(slot, encoded)| (*slot, compress_snappy(encoded)))
        .collect();
    encode_era_file_raw(era_number, &frames)
}

/// Same as [`encode_era_file`] but with the given raw (already compressed or
/// deliberately corrupted) frame for each block.
pub fn encode_era_file_raw(era_number: u64, blocks: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let start_slot = era_number * SLOTS_PER_HISTORICAL_ROOT;
    let mut out = e2store_record(e2store::VERSION, &[]);
    let mut positions = Vec::new();
    for (slot, frame) in blocks {
        positions.push((*slot, out.len()));
        out.extend_from_slice(&e2store_record(e2store::COMPRESSED_SIGNED_BEACON_BLOCK, frame));
    }
    let index_offset = out.len() as i64;
    let mut payload = Vec::new();
    payload.extend_from_slice(&start_slot.to_le_bytes());
    for i in 0..SLOTS_PER_HISTORICAL_ROOT {
        let slot = start_slot + i;
        let rel = positions
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, pos)| *pos as i64 - index_offset)
            .unwrap_or(0);
        payload.extend_from_slice(&rel.to_le_bytes());
    }
    payload.extend_from_slice(&SLOTS_PER_HISTORICAL_ROOT.to_le_bytes());
    out.extend_from_slice(&e2store_record(e2store::SLOT_INDEX, &payload));
    out
}
