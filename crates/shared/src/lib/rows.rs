//! Serializable row shapes, one struct per warehouse table.
//!
//! Every row carries `slot` and `timestamp_utc` (Unix seconds - the
//! warehouse's DateTime columns accept the integer form). Byte fields are
//! `0x`-prefixed hex strings; 256-bit quantities are decimal strings.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BlockRow {
    pub slot: u64,
    pub proposer_index: u64,
    pub parent_root: String,
    pub state_root: String,
    pub signature: String,
    pub fork: String,
    pub randao_reveal: String,
    pub graffiti: String,
    pub eth1_deposit_root: String,
    pub eth1_deposit_count: u64,
    pub eth1_block_hash: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncAggregateRow {
    pub slot: u64,
    pub sync_committee_bits: String,
    pub sync_committee_signature: String,
    pub participation_count: u64,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPayloadRow {
    pub slot: u64,
    pub block_number: u64,
    pub block_hash: String,
    pub parent_hash: String,
    pub fee_recipient: String,
    pub state_root: String,
    pub receipts_root: String,
    pub logs_bloom: String,
    pub prev_randao: String,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub timestamp: u64,
    pub extra_data: String,
    pub base_fee_per_gas: String,
    pub transactions_count: u64,
    pub withdrawals_count: u64,
    pub blob_gas_used: Option<u64>,
    pub excess_blob_gas: Option<u64>,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionRow {
    pub slot: u64,
    pub block_number: u64,
    pub block_hash: String,
    pub transaction_index: u64,
    pub transaction_hash: String,
    pub fee_recipient: String,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalRow {
    pub slot: u64,
    pub block_number: u64,
    pub withdrawal_index: u64,
    pub validator_index: u64,
    pub address: String,
    pub amount: u64,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttestationRow {
    pub slot: u64,
    pub attestation_index: u64,
    pub attestation_slot: u64,
    pub committee_index: u64,
    pub beacon_block_root: String,
    pub source_epoch: u64,
    pub source_root: String,
    pub target_epoch: u64,
    pub target_root: String,
    pub aggregation_bits: String,
    pub signature: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositRow {
    pub slot: u64,
    pub deposit_index: u64,
    pub pubkey: String,
    pub withdrawal_credentials: String,
    pub amount: u64,
    pub signature: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoluntaryExitRow {
    pub slot: u64,
    pub exit_index: u64,
    pub epoch: u64,
    pub validator_index: u64,
    pub signature: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProposerSlashingRow {
    pub slot: u64,
    pub slashing_index: u64,
    pub header_1_slot: u64,
    pub header_1_proposer_index: u64,
    pub header_1_parent_root: String,
    pub header_1_state_root: String,
    pub header_1_body_root: String,
    pub header_1_signature: String,
    pub header_2_slot: u64,
    pub header_2_proposer_index: u64,
    pub header_2_parent_root: String,
    pub header_2_state_root: String,
    pub header_2_body_root: String,
    pub header_2_signature: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttesterSlashingRow {
    pub slot: u64,
    pub slashing_index: u64,
    pub att_1_slot: u64,
    pub att_1_committee_index: u64,
    pub att_1_beacon_block_root: String,
    pub att_1_source_epoch: u64,
    pub att_1_target_epoch: u64,
    pub att_1_signature: String,
    /// JSON array of u64s rendered as strings.
    pub att_1_attesting_indices: String,
    pub att_1_validator_count: u64,
    pub att_2_slot: u64,
    pub att_2_committee_index: u64,
    pub att_2_beacon_block_root: String,
    pub att_2_source_epoch: u64,
    pub att_2_target_epoch: u64,
    pub att_2_signature: String,
    pub att_2_attesting_indices: String,
    pub att_2_validator_count: u64,
    /// Cardinality of the union of both index sets.
    pub total_slashed_validators: u64,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlsChangeRow {
    pub slot: u64,
    pub change_index: u64,
    pub validator_index: u64,
    pub from_bls_pubkey: String,
    pub to_execution_address: String,
    pub signature: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlobCommitmentRow {
    pub slot: u64,
    pub commitment_index: u64,
    pub commitment: String,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositRequestRow {
    pub slot: u64,
    pub request_index: u64,
    pub pubkey: String,
    pub withdrawal_credentials: String,
    pub amount: u64,
    pub signature: String,
    pub index: u64,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalRequestRow {
    pub slot: u64,
    pub request_index: u64,
    pub source_address: String,
    pub validator_pubkey: String,
    pub amount: u64,
    pub timestamp_utc: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationRequestRow {
    pub slot: u64,
    pub request_index: u64,
    pub source_address: String,
    pub source_pubkey: String,
    pub target_pubkey: String,
    pub timestamp_utc: u64,
}
