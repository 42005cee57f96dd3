//! Flattens one decoded block into dataset rows.

use itertools::Itertools;

use crate::datasets::Dataset;
use crate::decode::SignedBeaconBlock;
use crate::networks::Network;
use crate::rows::*;
use crate::ssz::hex_str;

/// Accumulated rows for one era, one vector per dataset.
#[derive(Debug, Default)]
pub struct EraRows {
    pub blocks: Vec<BlockRow>,
    pub sync_aggregates: Vec<SyncAggregateRow>,
    pub execution_payloads: Vec<ExecutionPayloadRow>,
    pub transactions: Vec<TransactionRow>,
    pub withdrawals: Vec<WithdrawalRow>,
    pub attestations: Vec<AttestationRow>,
    pub deposits: Vec<DepositRow>,
    pub voluntary_exits: Vec<VoluntaryExitRow>,
    pub proposer_slashings: Vec<ProposerSlashingRow>,
    pub attester_slashings: Vec<AttesterSlashingRow>,
    pub bls_changes: Vec<BlsChangeRow>,
    pub blob_commitments: Vec<BlobCommitmentRow>,
    pub deposit_requests: Vec<DepositRequestRow>,
    pub withdrawal_requests: Vec<WithdrawalRequestRow>,
    pub consolidation_requests: Vec<ConsolidationRequestRow>,
}

impl EraRows {
    pub fn append(&mut self, mut other: EraRows) {
        self.blocks.append(&mut other.blocks);
        self.sync_aggregates.append(&mut other.sync_aggregates);
        self.execution_payloads.append(&mut other.execution_payloads);
        self.transactions.append(&mut other.transactions);
        self.withdrawals.append(&mut other.withdrawals);
        self.attestations.append(&mut other.attestations);
        self.deposits.append(&mut other.deposits);
        self.voluntary_exits.append(&mut other.voluntary_exits);
        self.proposer_slashings.append(&mut other.proposer_slashings);
        self.attester_slashings.append(&mut other.attester_slashings);
        self.bls_changes.append(&mut other.bls_changes);
        self.blob_commitments.append(&mut other.blob_commitments);
        self.deposit_requests.append(&mut other.deposit_requests);
        self.withdrawal_requests.append(&mut other.withdrawal_requests);
        self.consolidation_requests.append(&mut other.consolidation_requests);
    }

    pub fn count(&self, dataset: Dataset) -> usize {
        match dataset {
            Dataset::Blocks => self.blocks.len(),
            Dataset::SyncAggregates => self.sync_aggregates.len(),
            Dataset::ExecutionPayloads => self.execution_payloads.len(),
            Dataset::Transactions => self.transactions.len(),
            Dataset::Withdrawals => self.withdrawals.len(),
            Dataset::Attestations => self.attestations.len(),
            Dataset::Deposits => self.deposits.len(),
            Dataset::VoluntaryExits => self.voluntary_exits.len(),
            Dataset::ProposerSlashings => self.proposer_slashings.len(),
            Dataset::AttesterSlashings => self.attester_slashings.len(),
            Dataset::BlsChanges => self.bls_changes.len(),
            Dataset::BlobCommitments => self.blob_commitments.len(),
            Dataset::DepositRequests => self.deposit_requests.len(),
            Dataset::WithdrawalRequests => self.withdrawal_requests.len(),
            Dataset::ConsolidationRequests => self.consolidation_requests.len(),
        }
    }

    pub fn total_rows(&self) -> u64 {
        Dataset::ALL
            .into_iter()
            .map(|dataset| self.count(dataset) as u64)
            .sum()
    }

    pub fn to_json(&self, dataset: Dataset) -> serde_json::Result<Vec<serde_json::Value>> {
        fn values<T: serde::Serialize>(rows: &[T]) -> serde_json::Result<Vec<serde_json::Value>> {
            rows.iter().map(serde_json::to_value).collect()
        }
        match dataset {
            Dataset::Blocks => values(&self.blocks),
            Dataset::SyncAggregates => values(&self.sync_aggregates),
            Dataset::ExecutionPayloads => values(&self.execution_payloads),
            Dataset::Transactions => values(&self.transactions),
            Dataset::Withdrawals => values(&self.withdrawals),
            Dataset::Attestations => values(&self.attestations),
            Dataset::Deposits => values(&self.deposits),
            Dataset::VoluntaryExits => values(&self.voluntary_exits),
            Dataset::ProposerSlashings => values(&self.proposer_slashings),
            Dataset::AttesterSlashings => values(&self.attester_slashings),
            Dataset::BlsChanges => values(&self.bls_changes),
            Dataset::BlobCommitments => values(&self.blob_commitments),
            Dataset::DepositRequests => values(&self.deposit_requests),
            Dataset::WithdrawalRequests => values(&self.withdrawal_requests),
            Dataset::ConsolidationRequests => values(&self.consolidation_requests),
        }
    }
}

/// The single timestamp every row from this block carries: the execution
/// payload's when present and non-zero, otherwise derived from slot timing.
pub fn canonical_timestamp(block: &SignedBeaconBlock, network: Network) -> u64 {
    match &block.body.execution_payload {
        Some(payload) if payload.timestamp != 0 => payload.timestamp,
        _ => network.timestamp_for(block.slot),
    }
}

fn indices_json(indices: &[u64]) -> String {
    let as_strings: Vec<String> = indices.iter().map(|i| i.to_string()).collect();
    serde_json::to_string(&as_strings).expect("string arrays always serialize")
}

fn count_set_bits(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| b.count_ones() as u64).sum()
}

/// Emits this block's rows for every dataset, all stamped with
/// `timestamp_utc`.
pub fn extract_block(block: &SignedBeaconBlock, timestamp_utc: u64) -> EraRows {
    let mut rows = EraRows::default();
    let slot = block.slot;
    let body = &block.body;

    rows.blocks.push(BlockRow {
        slot,
        proposer_index: block.proposer_index,
        parent_root: hex_str(&block.parent_root),
        state_root: hex_str(&block.state_root),
        signature: hex_str(&block.signature),
        fork: block.fork.as_str().to_string(),
        randao_reveal: hex_str(&body.randao_reveal),
        graffiti: hex_str(&body.graffiti),
        eth1_deposit_root: hex_str(&body.eth1_data.deposit_root),
        eth1_deposit_count: body.eth1_data.deposit_count,
        eth1_block_hash: hex_str(&body.eth1_data.block_hash),
        timestamp_utc,
    });

    if let Some(aggregate) = &body.sync_aggregate {
        rows.sync_aggregates.push(SyncAggregateRow {
            slot,
            sync_committee_bits: hex_str(&aggregate.sync_committee_bits),
            sync_committee_signature: hex_str(&aggregate.sync_committee_signature),
            participation_count: count_set_bits(&aggregate.sync_committee_bits),
            timestamp_utc,
        });
    }

    if let Some(payload) = &body.execution_payload {
        rows.execution_payloads.push(ExecutionPayloadRow {
            slot,
            block_number: payload.block_number,
            block_hash: hex_str(&payload.block_hash),
            parent_hash: hex_str(&payload.parent_hash),
            fee_recipient: hex_str(&payload.fee_recipient),
            state_root: hex_str(&payload.state_root),
            receipts_root: hex_str(&payload.receipts_root),
            logs_bloom: hex_str(&payload.logs_bloom),
            prev_randao: hex_str(&payload.prev_randao),
            gas_limit: payload.gas_limit,
            gas_used: payload.gas_used,
            timestamp: payload.timestamp,
            extra_data: hex_str(&payload.extra_data),
            base_fee_per_gas: payload.base_fee_per_gas.clone(),
            transactions_count: payload.transaction_hashes.len() as u64,
            withdrawals_count: payload.withdrawals.len() as u64,
            blob_gas_used: payload.blob_gas_used,
            excess_blob_gas: payload.excess_blob_gas,
            timestamp_utc,
        });

        for (index, hash) in payload.transaction_hashes.iter().enumerate() {
            rows.transactions.push(TransactionRow {
                slot,
                block_number: payload.block_number,
                block_hash: hex_str(&payload.block_hash),
                transaction_index: index as u64,
                transaction_hash: hex_str(hash),
                fee_recipient: hex_str(&payload.fee_recipient),
                gas_limit: payload.gas_limit,
                gas_used: payload.gas_used,
                base_fee_per_gas: payload.base_fee_per_gas.clone(),
                timestamp_utc,
            });
        }

        for withdrawal in &payload.withdrawals {
            rows.withdrawals.push(WithdrawalRow {
                slot,
                block_number: payload.block_number,
                withdrawal_index: withdrawal.index,
                validator_index: withdrawal.validator_index,
                address: hex_str(&withdrawal.address),
                amount: withdrawal.amount,
                timestamp_utc,
            });
        }
    }

    for (index, attestation) in body.attestations.iter().enumerate() {
        rows.attestations.push(AttestationRow {
            slot,
            attestation_index: index as u64,
            attestation_slot: attestation.data.slot,
            committee_index: attestation.data.committee_index,
            beacon_block_root: hex_str(&attestation.data.beacon_block_root),
            source_epoch: attestation.data.source.epoch,
            source_root: hex_str(&attestation.data.source.root),
            target_epoch: attestation.data.target.epoch,
            target_root: hex_str(&attestation.data.target.root),
            aggregation_bits: hex_str(&attestation.aggregation_bits),
            signature: hex_str(&attestation.signature),
            timestamp_utc,
        });
    }

    for (index, deposit) in body.deposits.iter().enumerate() {
        rows.deposits.push(DepositRow {
            slot,
            deposit_index: index as u64,
            pubkey: hex_str(&deposit.data.pubkey),
            withdrawal_credentials: hex_str(&deposit.data.withdrawal_credentials),
            amount: deposit.data.amount,
            signature: hex_str(&deposit.data.signature),
            timestamp_utc,
        });
    }

    for (index, exit) in body.voluntary_exits.iter().enumerate() {
        rows.voluntary_exits.push(VoluntaryExitRow {
            slot,
            exit_index: index as u64,
            epoch: exit.message.epoch,
            validator_index: exit.message.validator_index,
            signature: hex_str(&exit.signature),
            timestamp_utc,
        });
    }

    for (index, slashing) in body.proposer_slashings.iter().enumerate() {
        let header_1 = &slashing.signed_header_1;
        let header_2 = &slashing.signed_header_2;
        rows.proposer_slashings.push(ProposerSlashingRow {
            slot,
            slashing_index: index as u64,
            header_1_slot: header_1.message.slot,
            header_1_proposer_index: header_1.message.proposer_index,
            header_1_parent_root: hex_str(&header_1.message.parent_root),
            header_1_state_root: hex_str(&header_1.message.state_root),
            header_1_body_root: hex_str(&header_1.message.body_root),
            header_1_signature: hex_str(&header_1.signature),
            header_2_slot: header_2.message.slot,
            header_2_proposer_index: header_2.message.proposer_index,
            header_2_parent_root: hex_str(&header_2.message.parent_root),
            header_2_state_root: hex_str(&header_2.message.state_root),
            header_2_body_root: hex_str(&header_2.message.body_root),
            header_2_signature: hex_str(&header_2.signature),
            timestamp_utc,
        });
    }

    for (index, slashing) in body.attester_slashings.iter().enumerate() {
        let att_1 = &slashing.attestation_1;
        let att_2 = &slashing.attestation_2;
        let total_slashed = att_1
            .attesting_indices
            .iter()
            .chain(att_2.attesting_indices.iter())
            .unique()
            .count() as u64;
        rows.attester_slashings.push(AttesterSlashingRow {
            slot,
            slashing_index: index as u64,
            att_1_slot: att_1.data.slot,
            att_1_committee_index: att_1.data.committee_index,
            att_1_beacon_block_root: hex_str(&att_1.data.beacon_block_root),
            att_1_source_epoch: att_1.data.source.epoch,
            att_1_target_epoch: att_1.data.target.epoch,
            att_1_signature: hex_str(&att_1.signature),
            att_1_attesting_indices: indices_json(&att_1.attesting_indices),
            att_1_validator_count: att_1.attesting_indices.len() as u64,
            att_2_slot: att_2.data.slot,
            att_2_committee_index: att_2.data.committee_index,
            att_2_beacon_block_root: hex_str(&att_2.data.beacon_block_root),
            att_2_source_epoch: att_2.data.source.epoch,
            att_2_target_epoch: att_2.data.target.epoch,
            att_2_signature: hex_str(&att_2.signature),
            att_2_attesting_indices: indices_json(&att_2.attesting_indices),
            att_2_validator_count: att_2.attesting_indices.len() as u64,
            total_slashed_validators: total_slashed,
            timestamp_utc,
        });
    }

    for (index, change) in body.bls_to_execution_changes.iter().enumerate() {
        rows.bls_changes.push(BlsChangeRow {
            slot,
            change_index: index as u64,
            validator_index: change.message.validator_index,
            from_bls_pubkey: hex_str(&change.message.from_bls_pubkey),
            to_execution_address: hex_str(&change.message.to_execution_address),
            signature: hex_str(&change.signature),
            timestamp_utc,
        });
    }

    for (index, commitment) in body.blob_kzg_commitments.iter().enumerate() {
        rows.blob_commitments.push(BlobCommitmentRow {
            slot,
            commitment_index: index as u64,
            commitment: hex_str(commitment),
            timestamp_utc,
        });
    }

    if let Some(requests) = &body.execution_requests {
        for (index, request) in requests.deposits.iter().enumerate() {
            rows.deposit_requests.push(DepositRequestRow {
                slot,
                request_index: index as u64,
                pubkey: hex_str(&request.pubkey),
                withdrawal_credentials: hex_str(&request.withdrawal_credentials),
                amount: request.amount,
                signature: hex_str(&request.signature),
                index: request.index,
                timestamp_utc,
            });
        }
        for (index, request) in requests.withdrawals.iter().enumerate() {
            rows.withdrawal_requests.push(WithdrawalRequestRow {
                slot,
                request_index: index as u64,
                source_address: hex_str(&request.source_address),
                validator_pubkey: hex_str(&request.validator_pubkey),
                amount: request.amount,
                timestamp_utc,
            });
        }
        for (index, request) in requests.consolidations.iter().enumerate() {
            rows.consolidation_requests.push(ConsolidationRequestRow {
                slot,
                request_index: index as u64,
                source_address: hex_str(&request.source_address),
                source_pubkey: hex_str(&request.source_pubkey),
                target_pubkey: hex_str(&request.target_pubkey),
                timestamp_utc,
            });
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_signed_block;
    use crate::networks::Fork;
    use crate::synthetic::{AttesterSlashingSpec, BlockSpec, PayloadSpec};

    fn decoded(spec: &BlockSpec) -> SignedBeaconBlock {
        decode_signed_block(&spec.encode(), spec.fork, spec.slot).unwrap()
    }

    #[test]
    fn canonical_timestamp_prefers_nonzero_payload_time() {
        let mut spec = BlockSpec::new(8_871_936, Fork::Bellatrix);
        spec.payload = Some(PayloadSpec {
            timestamp: 1_700_000_000,
            ..PayloadSpec::default()
        });
        let block = decoded(&spec);
        assert_eq!(canonical_timestamp(&block, Network::Gnosis), 1_700_000_000);

        spec.payload = Some(PayloadSpec {
            timestamp: 0,
            ..PayloadSpec::default()
        });
        let block = decoded(&spec);
        assert_eq!(
            canonical_timestamp(&block, Network::Gnosis),
            1_638_993_340 + 8_871_936 * 5
        );
    }

    #[test]
    fn every_row_shares_the_block_timestamp() {
        let mut spec = BlockSpec::new(500, Fork::Capella);
        spec.attestation_slots = vec![498, 499];
        spec.voluntary_exits = vec![(1, 2)];
        spec.deposit_count = 1;
        spec.bls_change_indices = vec![9];
        spec.payload = Some(PayloadSpec {
            transactions: vec![vec![1, 2, 3]],
            withdrawals: vec![(0, 5, 10)],
            ..PayloadSpec::default()
        });
        let block = decoded(&spec);
        let stamp = 1_234_567_890;
        let rows = extract_block(&block, stamp);

        for dataset in Dataset::ALL {
            for value in rows.to_json(dataset).unwrap() {
                assert_eq!(
                    value.get("timestamp_utc").and_then(|v| v.as_u64()),
                    Some(stamp),
                    "{dataset}"
                );
                assert_eq!(value.get("slot").and_then(|v| v.as_u64()), Some(500), "{dataset}");
            }
        }
    }

    #[test]
    fn blocks_row_omits_payload_and_sync_data() {
        let spec = BlockSpec::new(600, Fork::Deneb);
        let rows = extract_block(&decoded(&spec), 1);
        let block_row = &rows.to_json(Dataset::Blocks).unwrap()[0];
        assert!(block_row.get("block_number").is_none());
        assert!(block_row.get("sync_committee_bits").is_none());
        assert!(block_row.get("fork").is_some());
    }

    #[test]
    fn transaction_rows_carry_payload_context() {
        let mut spec = BlockSpec::new(700, Fork::Bellatrix);
        spec.payload = Some(PayloadSpec {
            block_number: 99,
            base_fee_per_gas: 1_000_000_007,
            transactions: vec![vec![0xaa], vec![0xbb, 0xcc]],
            ..PayloadSpec::default()
        });
        let rows = extract_block(&decoded(&spec), 1);
        assert_eq!(rows.transactions.len(), 2);
        assert_eq!(rows.transactions[0].transaction_index, 0);
        assert_eq!(rows.transactions[1].transaction_index, 1);
        assert_eq!(rows.transactions[0].block_number, 99);
        assert_eq!(rows.transactions[0].base_fee_per_gas, "1000000007");
        assert_eq!(rows.execution_payloads[0].transactions_count, 2);
    }

    #[test]
    fn attester_slashing_union_count() {
        let mut spec = BlockSpec::new(800, Fork::Altair);
        spec.attester_slashings = vec![AttesterSlashingSpec {
            indices_1: vec![10, 20, 30],
            indices_2: vec![20, 30, 40],
        }];
        let rows = extract_block(&decoded(&spec), 1);
        let row = &rows.attester_slashings[0];
        assert_eq!(row.att_1_validator_count, 3);
        assert_eq!(row.att_2_validator_count, 3);
        assert_eq!(row.total_slashed_validators, 4);
        assert_eq!(row.att_1_attesting_indices, r#"["10","20","30"]"#);
        let parsed: Vec<String> = serde_json::from_str(&row.att_2_attesting_indices).unwrap();
        assert_eq!(parsed, vec!["20", "30", "40"]);
    }

    #[test]
    fn fork_absent_fields_produce_empty_datasets() {
        let spec = BlockSpec::new(900, Fork::Phase0);
        let rows = extract_block(&decoded(&spec), 1);
        assert!(rows.sync_aggregates.is_empty());
        assert!(rows.execution_payloads.is_empty());
        assert!(rows.blob_commitments.is_empty());
        assert!(rows.deposit_requests.is_empty());
        // every dataset still enumerable
        for dataset in Dataset::ALL {
            let _ = rows.to_json(dataset).unwrap();
        }
        assert_eq!(rows.total_rows(), 1); // just the blocks row
    }
}
