//! Execution payload and execution-request decoding.

use alloy_primitives::keccak256;

use super::schema::{
    CONSOLIDATION_REQUEST_SIZE, DEPOSIT_REQUEST_SIZE, SIGNATURE_SIZE, WITHDRAWAL_REQUEST_SIZE,
    WITHDRAWAL_SIZE,
};
use super::{
    ConsolidationRequest, DecodeReason, DepositRequest, ExecutionPayload, ExecutionRequests,
    Withdrawal, WithdrawalRequest,
};
use crate::networks::Fork;
use crate::ssz::{self, ItemLayout};

/// Byte position where the payload's variable-field offsets begin.
const PAYLOAD_HEAD_SIZE: usize = 436;

pub fn decode_execution_payload(
    data: &[u8],
    fork: Fork,
) -> Result<ExecutionPayload, DecodeReason> {
    if data.len() < PAYLOAD_HEAD_SIZE {
        return Err(DecodeReason::ShortFixedRegion {
            section: "execution_payload",
            needed: PAYLOAD_HEAD_SIZE,
            available: data.len(),
        });
    }

    let parent_hash = ssz::read_fixed(data, 0)?;
    let fee_recipient = ssz::read_fixed(data, 32)?;
    let state_root = ssz::read_fixed(data, 52)?;
    let receipts_root = ssz::read_fixed(data, 84)?;
    let logs_bloom = ssz::read_bytes(data, 116, 256)?.to_vec();
    let prev_randao = ssz::read_fixed(data, 372)?;
    let block_number = ssz::read_u64(data, 404)?;
    let gas_limit = ssz::read_u64(data, 412)?;
    let gas_used = ssz::read_u64(data, 420)?;
    let timestamp = ssz::read_u64(data, 428)?;

    let mut pos = PAYLOAD_HEAD_SIZE;
    let extra_data_offset = ssz::read_offset(data, pos)?;
    pos += 4;
    let base_fee_bytes: [u8; 32] = ssz::read_fixed(data, pos)?;
    pos += 32;
    let block_hash = ssz::read_fixed(data, pos)?;
    pos += 32;
    let transactions_offset = ssz::read_offset(data, pos)?;
    pos += 4;
    let withdrawals_offset = if fork >= Fork::Capella {
        let offset = ssz::read_offset(data, pos)?;
        pos += 4;
        Some(offset)
    } else {
        None
    };
    let (blob_gas_used, excess_blob_gas) = if fork >= Fork::Deneb {
        let used = ssz::read_u64(data, pos)?;
        let excess = ssz::read_u64(data, pos + 8)?;
        pos += 16;
        (Some(used), Some(excess))
    } else {
        (None, None)
    };
    let fixed_end = pos;

    let mut boundaries: Vec<(&'static str, usize)> = vec![
        ("extra_data", extra_data_offset),
        ("transactions", transactions_offset),
    ];
    if let Some(offset) = withdrawals_offset {
        boundaries.push(("withdrawals", offset));
    }
    let mut previous = fixed_end;
    for (section, offset) in boundaries.iter().copied() {
        if offset > data.len() || offset < fixed_end {
            return Err(DecodeReason::OffsetOutsideContainer {
                section,
                offset,
                len: data.len(),
            });
        }
        if offset < previous {
            return Err(DecodeReason::NonMonotonicSection {
                section,
                previous,
                next: offset,
            });
        }
        previous = offset;
    }

    let section_end = |index: usize| -> usize {
        boundaries
            .get(index + 1)
            .map(|(_, offset)| *offset)
            .unwrap_or(data.len())
    };

    let extra_data = data[boundaries[0].1..section_end(0)].to_vec();
    let transactions_blob = &data[boundaries[1].1..section_end(1)];
    let transaction_hashes = ssz::split_list(transactions_blob, ItemLayout::Variable)?
        .into_iter()
        .map(|tx| keccak256(tx).0)
        .collect();
    let withdrawals = match withdrawals_offset {
        Some(_) => ssz::split_list(&data[boundaries[2].1..section_end(2)], ItemLayout::Fixed(WITHDRAWAL_SIZE))?
            .into_iter()
            .map(parse_withdrawal)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(ExecutionPayload {
        parent_hash,
        fee_recipient,
        state_root,
        receipts_root,
        logs_bloom,
        prev_randao,
        block_number,
        gas_limit,
        gas_used,
        timestamp,
        extra_data,
        base_fee_per_gas: ssz::le_to_decimal(&base_fee_bytes),
        block_hash,
        transaction_hashes,
        withdrawals,
        blob_gas_used,
        excess_blob_gas,
    })
}

fn parse_withdrawal(item: &[u8]) -> Result<Withdrawal, DecodeReason> {
    Ok(Withdrawal {
        index: ssz::read_u64(item, 0)?,
        validator_index: ssz::read_u64(item, 8)?,
        address: ssz::read_fixed(item, 16)?,
        amount: ssz::read_u64(item, 36)?,
    })
}

/// ExecutionRequests: a three-offset container of three fixed-item lists.
pub fn decode_execution_requests(data: &[u8]) -> Result<ExecutionRequests, DecodeReason> {
    if data.is_empty() {
        return Ok(ExecutionRequests::default());
    }
    let offsets = [
        ssz::read_offset(data, 0)?,
        ssz::read_offset(data, 4)?,
        ssz::read_offset(data, 8)?,
    ];
    let mut previous = 12;
    for offset in offsets {
        if offset > data.len() || offset < 12 {
            return Err(DecodeReason::OffsetOutsideContainer {
                section: "execution_requests",
                offset,
                len: data.len(),
            });
        }
        if offset < previous {
            return Err(DecodeReason::NonMonotonicSection {
                section: "execution_requests",
                previous,
                next: offset,
            });
        }
        previous = offset;
    }

    let deposits = ssz::split_list(&data[offsets[0]..offsets[1]], ItemLayout::Fixed(DEPOSIT_REQUEST_SIZE))?
        .into_iter()
        .map(parse_deposit_request)
        .collect::<Result<Vec<_>, _>>()?;
    let withdrawals = ssz::split_list(&data[offsets[1]..offsets[2]], ItemLayout::Fixed(WITHDRAWAL_REQUEST_SIZE))?
        .into_iter()
        .map(parse_withdrawal_request)
        .collect::<Result<Vec<_>, _>>()?;
    let consolidations = ssz::split_list(&data[offsets[2]..], ItemLayout::Fixed(CONSOLIDATION_REQUEST_SIZE))?
        .into_iter()
        .map(parse_consolidation_request)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExecutionRequests {
        deposits,
        withdrawals,
        consolidations,
    })
}

fn parse_deposit_request(item: &[u8]) -> Result<DepositRequest, DecodeReason> {
    Ok(DepositRequest {
        pubkey: ssz::read_fixed(item, 0)?,
        withdrawal_credentials: ssz::read_fixed(item, 48)?,
        amount: ssz::read_u64(item, 80)?,
        signature: ssz::read_bytes(item, 88, SIGNATURE_SIZE)?.to_vec(),
        index: ssz::read_u64(item, 184)?,
    })
}

fn parse_withdrawal_request(item: &[u8]) -> Result<WithdrawalRequest, DecodeReason> {
    Ok(WithdrawalRequest {
        source_address: ssz::read_fixed(item, 0)?,
        validator_pubkey: ssz::read_fixed(item, 20)?,
        amount: ssz::read_u64(item, 68)?,
    })
}

fn parse_consolidation_request(item: &[u8]) -> Result<ConsolidationRequest, DecodeReason> {
    Ok(ConsolidationRequest {
        source_address: ssz::read_fixed(item, 0)?,
        source_pubkey: ssz::read_fixed(item, 20)?,
        target_pubkey: ssz::read_fixed(item, 68)?,
    })
}
