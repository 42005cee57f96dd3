//! Item parsers for the operation lists carried in a block body.

use super::schema::{
    ATTESTATION_DATA_SIZE, SIGNATURE_SIZE, SIGNED_HEADER_SIZE, SYNC_AGGREGATE_SIZE,
};
use super::{
    Attestation, AttestationData, AttesterSlashing, BeaconBlockHeader, BlsToExecutionChange,
    Checkpoint, DecodeReason, Deposit, DepositData, Eth1Data, IndexedAttestation, ProposerSlashing,
    SignedBeaconBlockHeader, SignedBlsToExecutionChange, SignedVoluntaryExit, SyncAggregate,
    VoluntaryExit,
};
use crate::ssz;

fn require(section: &'static str, data: &[u8], needed: usize) -> Result<(), DecodeReason> {
    if data.len() < needed {
        return Err(DecodeReason::ShortFixedRegion {
            section,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

pub fn parse_eth1_data(data: &[u8]) -> Result<Eth1Data, DecodeReason> {
    require("eth1_data", data, 72)?;
    Ok(Eth1Data {
        deposit_root: ssz::read_fixed(data, 0)?,
        deposit_count: ssz::read_u64(data, 32)?,
        block_hash: ssz::read_fixed(data, 40)?,
    })
}

fn parse_header(data: &[u8], at: usize) -> Result<BeaconBlockHeader, DecodeReason> {
    Ok(BeaconBlockHeader {
        slot: ssz::read_u64(data, at)?,
        proposer_index: ssz::read_u64(data, at + 8)?,
        parent_root: ssz::read_fixed(data, at + 16)?,
        state_root: ssz::read_fixed(data, at + 48)?,
        body_root: ssz::read_fixed(data, at + 80)?,
    })
}

fn parse_signed_header(data: &[u8], at: usize) -> Result<SignedBeaconBlockHeader, DecodeReason> {
    Ok(SignedBeaconBlockHeader {
        message: parse_header(data, at)?,
        signature: ssz::read_bytes(data, at + 112, SIGNATURE_SIZE)?.to_vec(),
    })
}

pub fn parse_proposer_slashing(item: &[u8]) -> Result<ProposerSlashing, DecodeReason> {
    require("proposer_slashing", item, 2 * SIGNED_HEADER_SIZE)?;
    Ok(ProposerSlashing {
        signed_header_1: parse_signed_header(item, 0)?,
        signed_header_2: parse_signed_header(item, SIGNED_HEADER_SIZE)?,
    })
}

fn parse_checkpoint(data: &[u8], at: usize) -> Result<Checkpoint, DecodeReason> {
    Ok(Checkpoint {
        epoch: ssz::read_u64(data, at)?,
        root: ssz::read_fixed(data, at + 8)?,
    })
}

pub fn parse_attestation_data(data: &[u8], at: usize) -> Result<AttestationData, DecodeReason> {
    require("attestation_data", data, at + ATTESTATION_DATA_SIZE)?;
    Ok(AttestationData {
        slot: ssz::read_u64(data, at)?,
        committee_index: ssz::read_u64(data, at + 8)?,
        beacon_block_root: ssz::read_fixed(data, at + 16)?,
        source: parse_checkpoint(data, at + 48)?,
        target: parse_checkpoint(data, at + 88)?,
    })
}

/// Attestation: `bits_offset(4) | data(128) | signature(96) | ... | bits`.
/// Anything between the signature and the bits offset (e.g. later forks'
/// committee bits) is tolerated.
pub fn parse_attestation(item: &[u8]) -> Result<Attestation, DecodeReason> {
    let bits_offset = ssz::read_offset(item, 0)?;
    if bits_offset > item.len() || bits_offset < 4 + ATTESTATION_DATA_SIZE + SIGNATURE_SIZE {
        return Err(DecodeReason::OffsetOutsideContainer {
            section: "attestation.aggregation_bits",
            offset: bits_offset,
            len: item.len(),
        });
    }
    Ok(Attestation {
        aggregation_bits: item[bits_offset..].to_vec(),
        data: parse_attestation_data(item, 4)?,
        signature: ssz::read_bytes(item, 4 + ATTESTATION_DATA_SIZE, SIGNATURE_SIZE)?.to_vec(),
    })
}

/// IndexedAttestation: `indices_offset(4) | data(128) | signature(96) | indices`.
pub fn parse_indexed_attestation(item: &[u8]) -> Result<IndexedAttestation, DecodeReason> {
    let indices_offset = ssz::read_offset(item, 0)?;
    if indices_offset > item.len() || indices_offset < 4 + ATTESTATION_DATA_SIZE + SIGNATURE_SIZE {
        return Err(DecodeReason::OffsetOutsideContainer {
            section: "indexed_attestation.attesting_indices",
            offset: indices_offset,
            len: item.len(),
        });
    }
    Ok(IndexedAttestation {
        attesting_indices: ssz::split_u64_list(&item[indices_offset..])?,
        data: parse_attestation_data(item, 4)?,
        signature: ssz::read_bytes(item, 4 + ATTESTATION_DATA_SIZE, SIGNATURE_SIZE)?.to_vec(),
    })
}

/// AttesterSlashing: two offsets, then the two indexed attestations.
pub fn parse_attester_slashing(item: &[u8]) -> Result<AttesterSlashing, DecodeReason> {
    let offset_1 = ssz::read_offset(item, 0)?;
    let offset_2 = ssz::read_offset(item, 4)?;
    if offset_1 > item.len() || offset_2 > item.len() || offset_1 < 8 {
        return Err(DecodeReason::OffsetOutsideContainer {
            section: "attester_slashing",
            offset: offset_1.max(offset_2),
            len: item.len(),
        });
    }
    if offset_2 < offset_1 {
        return Err(DecodeReason::NonMonotonicSection {
            section: "attester_slashing",
            previous: offset_1,
            next: offset_2,
        });
    }
    Ok(AttesterSlashing {
        attestation_1: parse_indexed_attestation(&item[offset_1..offset_2])?,
        attestation_2: parse_indexed_attestation(&item[offset_2..])?,
    })
}

pub fn parse_deposit(item: &[u8]) -> Result<Deposit, DecodeReason> {
    // 33 proof hashes, then the deposit data
    let proof = (0..33)
        .map(|i| ssz::read_fixed(item, i * 32))
        .collect::<Result<Vec<[u8; 32]>, _>>()?;
    let data_at = 33 * 32;
    Ok(Deposit {
        proof,
        data: DepositData {
            pubkey: ssz::read_fixed(item, data_at)?,
            withdrawal_credentials: ssz::read_fixed(item, data_at + 48)?,
            amount: ssz::read_u64(item, data_at + 80)?,
            signature: ssz::read_bytes(item, data_at + 88, SIGNATURE_SIZE)?.to_vec(),
        },
    })
}

pub fn parse_voluntary_exit(item: &[u8]) -> Result<SignedVoluntaryExit, DecodeReason> {
    Ok(SignedVoluntaryExit {
        message: VoluntaryExit {
            epoch: ssz::read_u64(item, 0)?,
            validator_index: ssz::read_u64(item, 8)?,
        },
        signature: ssz::read_bytes(item, 16, SIGNATURE_SIZE)?.to_vec(),
    })
}

pub fn parse_sync_aggregate(data: &[u8]) -> Result<SyncAggregate, DecodeReason> {
    require("sync_aggregate", data, SYNC_AGGREGATE_SIZE)?;
    Ok(SyncAggregate {
        sync_committee_bits: data[..64].to_vec(),
        sync_committee_signature: data[64..160].to_vec(),
    })
}

pub fn parse_bls_change(item: &[u8]) -> Result<SignedBlsToExecutionChange, DecodeReason> {
    Ok(SignedBlsToExecutionChange {
        message: BlsToExecutionChange {
            validator_index: ssz::read_u64(item, 0)?,
            from_bls_pubkey: ssz::read_fixed(item, 8)?,
            to_execution_address: ssz::read_fixed(item, 56)?,
        },
        signature: ssz::read_bytes(item, 76, SIGNATURE_SIZE)?.to_vec(),
    })
}
