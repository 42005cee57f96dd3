//! Fork-layered decoding of signed beacon blocks.
//!
//! Each fork's body layout is a declarative ordered schema ([`schema`]); one
//! walk function consumes the fixed region and offset table and hands every
//! named section to its item parser. New forks are a schema change, not a new
//! decoder.

use thiserror::Error;

use crate::networks::Fork;
use crate::ssz::SszError;

mod block;
mod execution;
mod operations;
pub mod schema;

pub use block::decode_signed_block;

#[derive(Debug, Error)]
#[error("block at slot {slot} failed to decode: {reason}")]
pub struct BlockDecodeError {
    pub slot: u64,
    pub reason: DecodeReason,
}

#[derive(Debug, Error)]
pub enum DecodeReason {
    #[error(transparent)]
    Ssz(#[from] SszError),

    #[error("{section}: need {needed} bytes, {available} available")]
    ShortFixedRegion {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{section}: offset {offset} points outside its container of {len} bytes")]
    OffsetOutsideContainer {
        section: &'static str,
        offset: usize,
        len: usize,
    },

    #[error("{section}: offset {next} decreases from {previous}")]
    NonMonotonicSection {
        section: &'static str,
        previous: usize,
        next: usize,
    },

    #[error("snappy frame could not be decompressed: {0}")]
    Decompression(String),
}

/// The canonical nested record for one decoded block.
#[derive(Debug, Clone)]
pub struct SignedBeaconBlock {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: [u8; 32],
    pub state_root: [u8; 32],
    pub signature: Vec<u8>,
    pub fork: Fork,
    pub body: BlockBody,
}

#[derive(Debug, Clone)]
pub struct BlockBody {
    pub randao_reveal: Vec<u8>,
    pub eth1_data: Eth1Data,
    pub graffiti: [u8; 32],
    pub proposer_slashings: Vec<ProposerSlashing>,
    pub attester_slashings: Vec<AttesterSlashing>,
    pub attestations: Vec<Attestation>,
    pub deposits: Vec<Deposit>,
    pub voluntary_exits: Vec<SignedVoluntaryExit>,
    pub sync_aggregate: Option<SyncAggregate>,
    pub execution_payload: Option<ExecutionPayload>,
    pub bls_to_execution_changes: Vec<SignedBlsToExecutionChange>,
    pub blob_kzg_commitments: Vec<[u8; 48]>,
    pub execution_requests: Option<ExecutionRequests>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eth1Data {
    pub deposit_root: [u8; 32],
    pub deposit_count: u64,
    pub block_hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconBlockHeader {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: [u8; 32],
    pub state_root: [u8; 32],
    pub body_root: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBeaconBlockHeader {
    pub message: BeaconBlockHeader,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposerSlashing {
    pub signed_header_1: SignedBeaconBlockHeader,
    pub signed_header_2: SignedBeaconBlockHeader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub epoch: u64,
    pub root: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationData {
    pub slot: u64,
    pub committee_index: u64,
    pub beacon_block_root: [u8; 32],
    pub source: Checkpoint,
    pub target: Checkpoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attestation {
    pub aggregation_bits: Vec<u8>,
    pub data: AttestationData,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedAttestation {
    pub attesting_indices: Vec<u64>,
    pub data: AttestationData,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttesterSlashing {
    pub attestation_1: IndexedAttestation,
    pub attestation_2: IndexedAttestation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositData {
    pub pubkey: [u8; 48],
    pub withdrawal_credentials: [u8; 32],
    pub amount: u64,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub proof: Vec<[u8; 32]>,
    pub data: DepositData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoluntaryExit {
    pub epoch: u64,
    pub validator_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedVoluntaryExit {
    pub message: VoluntaryExit,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAggregate {
    pub sync_committee_bits: Vec<u8>,
    pub sync_committee_signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlsToExecutionChange {
    pub validator_index: u64,
    pub from_bls_pubkey: [u8; 48],
    pub to_execution_address: [u8; 20],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedBlsToExecutionChange {
    pub message: BlsToExecutionChange,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Withdrawal {
    pub index: u64,
    pub validator_index: u64,
    pub address: [u8; 20],
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct ExecutionPayload {
    pub parent_hash: [u8; 32],
    pub fee_recipient: [u8; 20],
    pub state_root: [u8; 32],
    pub receipts_root: [u8; 32],
    pub logs_bloom: Vec<u8>,
    pub prev_randao: [u8; 32],
    pub block_number: u64,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: Vec<u8>,
    /// 256-bit quantity rendered as a decimal string.
    pub base_fee_per_gas: String,
    pub block_hash: [u8; 32],
    /// Keccak hashes of the opaque transaction payloads, in on-wire order.
    pub transaction_hashes: Vec<[u8; 32]>,
    pub withdrawals: Vec<Withdrawal>,
    pub blob_gas_used: Option<u64>,
    pub excess_blob_gas: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRequest {
    pub pubkey: [u8; 48],
    pub withdrawal_credentials: [u8; 32],
    pub amount: u64,
    pub signature: Vec<u8>,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub source_address: [u8; 20],
    pub validator_pubkey: [u8; 48],
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationRequest {
    pub source_address: [u8; 20],
    pub source_pubkey: [u8; 48],
    pub target_pubkey: [u8; 48],
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionRequests {
    pub deposits: Vec<DepositRequest>,
    pub withdrawals: Vec<WithdrawalRequest>,
    pub consolidations: Vec<ConsolidationRequest>,
}
