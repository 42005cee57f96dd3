//! Schema-driven decoding of a `SignedBeaconBlock`.

use super::execution::{decode_execution_payload, decode_execution_requests};
use super::operations::{
    parse_attestation, parse_attester_slashing, parse_bls_change, parse_deposit, parse_eth1_data,
    parse_proposer_slashing, parse_sync_aggregate, parse_voluntary_exit,
};
use super::schema::{
    self, BLS_CHANGE_SIZE, DEPOSIT_SIZE, FieldKind, KZG_COMMITMENT_SIZE, SIGNATURE_SIZE,
    VOLUNTARY_EXIT_SIZE,
};
use super::{BlockBody, BlockDecodeError, DecodeReason, SignedBeaconBlock};
use crate::networks::Fork;
use crate::ssz::{self, ItemLayout};

/// Fixed prefix of the signed envelope: message offset + signature.
const ENVELOPE_FIXED_SIZE: usize = 4 + SIGNATURE_SIZE;
/// Fixed prefix of the message: slot, proposer, two roots, body offset.
const MESSAGE_FIXED_SIZE: usize = 8 + 8 + 32 + 32 + 4;

/// Decodes one uncompressed block for the given fork. `slot` labels errors;
/// the block's own slot field is authoritative for the result.
pub fn decode_signed_block(
    data: &[u8],
    fork: Fork,
    slot: u64,
) -> Result<SignedBeaconBlock, BlockDecodeError> {
    decode_inner(data, fork).map_err(|reason| BlockDecodeError { slot, reason })
}

fn decode_inner(data: &[u8], fork: Fork) -> Result<SignedBeaconBlock, DecodeReason> {
    let message_offset = ssz::read_offset(data, 0)?;
    let signature = ssz::read_bytes(data, 4, SIGNATURE_SIZE)?.to_vec();
    if message_offset > data.len() || message_offset < ENVELOPE_FIXED_SIZE {
        return Err(DecodeReason::OffsetOutsideContainer {
            section: "signed_block.message",
            offset: message_offset,
            len: data.len(),
        });
    }
    let message = &data[message_offset..];

    let slot = ssz::read_u64(message, 0)?;
    let proposer_index = ssz::read_u64(message, 8)?;
    let parent_root = ssz::read_fixed(message, 16)?;
    let state_root = ssz::read_fixed(message, 48)?;
    let body_offset = ssz::read_offset(message, 80)?;
    if body_offset > message.len() || body_offset < MESSAGE_FIXED_SIZE {
        return Err(DecodeReason::OffsetOutsideContainer {
            section: "block.body",
            offset: body_offset,
            len: message.len(),
        });
    }

    let body = decode_body(&message[body_offset..], fork)?;
    Ok(SignedBeaconBlock {
        slot,
        proposer_index,
        parent_root,
        state_root,
        signature,
        fork,
        body,
    })
}

/// Named byte sections of a body, fixed and variable alike.
struct Sections<'a> {
    entries: Vec<(&'static str, &'a [u8])>,
}

impl<'a> Sections<'a> {
    fn find(&self, name: &str) -> Option<&'a [u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, bytes)| *bytes)
    }

    /// Missing sections read as empty: a fork that lacks the field yields an
    /// empty list downstream, not an error.
    fn get(&self, name: &str) -> &'a [u8] {
        self.find(name).unwrap_or(&[])
    }
}

fn split_body_sections<'a>(body: &'a [u8], fork: Fork) -> Result<Sections<'a>, DecodeReason> {
    let fields = schema::body_schema(fork);

    let mut entries = Vec::with_capacity(fields.len());
    let mut offsets: Vec<(&'static str, usize)> = Vec::new();
    let mut pos = 0;
    for field in fields {
        match field.kind {
            FieldKind::Fixed(size) => {
                if pos + size > body.len() {
                    return Err(DecodeReason::ShortFixedRegion {
                        section: field.name,
                        needed: size,
                        available: body.len().saturating_sub(pos),
                    });
                }
                entries.push((field.name, &body[pos..pos + size]));
                pos += size;
            }
            FieldKind::Offset => {
                offsets.push((field.name, ssz::read_offset(body, pos)?));
                pos += 4;
            }
        }
    }

    let fixed_end = pos;
    let mut previous = fixed_end;
    for (section, offset) in offsets.iter().copied() {
        if offset > body.len() || offset < fixed_end {
            return Err(DecodeReason::OffsetOutsideContainer {
                section,
                offset,
                len: body.len(),
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

    for (index, (name, start)) in offsets.iter().enumerate() {
        // Trailing bytes past the last declared offset belong to the last
        // section; unknown content there is the parser's concern.
        let end = offsets
            .get(index + 1)
            .map(|(_, offset)| *offset)
            .unwrap_or(body.len());
        entries.push((name, &body[*start..end]));
    }

    Ok(Sections { entries })
}

fn decode_body(body: &[u8], fork: Fork) -> Result<BlockBody, DecodeReason> {
    let sections = split_body_sections(body, fork)?;

    let graffiti: [u8; 32] = ssz::read_fixed(sections.get("graffiti"), 0)?;

    let proposer_slashings = ssz::split_list(sections.get("proposer_slashings"), ItemLayout::Variable)?
        .into_iter()
        .map(parse_proposer_slashing)
        .collect::<Result<Vec<_>, _>>()?;
    let attester_slashings = ssz::split_list(sections.get("attester_slashings"), ItemLayout::Variable)?
        .into_iter()
        .map(parse_attester_slashing)
        .collect::<Result<Vec<_>, _>>()?;
    let attestations = ssz::split_list(sections.get("attestations"), ItemLayout::Variable)?
        .into_iter()
        .map(parse_attestation)
        .collect::<Result<Vec<_>, _>>()?;
    let deposits = ssz::split_list(sections.get("deposits"), ItemLayout::Fixed(DEPOSIT_SIZE))?
        .into_iter()
        .map(parse_deposit)
        .collect::<Result<Vec<_>, _>>()?;
    let voluntary_exits =
        ssz::split_list(sections.get("voluntary_exits"), ItemLayout::Fixed(VOLUNTARY_EXIT_SIZE))?
            .into_iter()
            .map(parse_voluntary_exit)
            .collect::<Result<Vec<_>, _>>()?;

    let sync_aggregate = sections
        .find("sync_aggregate")
        .map(parse_sync_aggregate)
        .transpose()?;
    let execution_payload = sections
        .find("execution_payload")
        .map(|section| decode_execution_payload(section, fork))
        .transpose()?;
    let bls_to_execution_changes = ssz::split_list(
        sections.get("bls_to_execution_changes"),
        ItemLayout::Fixed(BLS_CHANGE_SIZE),
    )?
    .into_iter()
    .map(parse_bls_change)
    .collect::<Result<Vec<_>, _>>()?;
    let blob_kzg_commitments = ssz::split_list(
        sections.get("blob_kzg_commitments"),
        ItemLayout::Fixed(KZG_COMMITMENT_SIZE),
    )?
    .into_iter()
    .map(|item| ssz::read_fixed::<48>(item, 0))
    .collect::<Result<Vec<_>, _>>()?;
    let execution_requests = sections
        .find("execution_requests")
        .map(decode_execution_requests)
        .transpose()?;

    Ok(BlockBody {
        randao_reveal: sections.get("randao_reveal").to_vec(),
        eth1_data: parse_eth1_data(sections.get("eth1_data"))?,
        graffiti,
        proposer_slashings,
        attester_slashings,
        attestations,
        deposits,
        voluntary_exits,
        sync_aggregate,
        execution_payload,
        bls_to_execution_changes,
        blob_kzg_commitments,
        execution_requests,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{AttesterSlashingSpec, BlockSpec, PayloadSpec, RequestsSpec};

    #[test]
    fn decodes_minimal_phase0_block() {
        let spec = BlockSpec::new(8_871_936, Fork::Phase0);
        let block = decode_signed_block(&spec.encode(), Fork::Phase0, spec.slot).unwrap();
        assert_eq!(block.slot, 8_871_936);
        assert_eq!(block.fork, Fork::Phase0);
        assert!(block.body.sync_aggregate.is_none());
        assert!(block.body.execution_payload.is_none());
        assert!(block.body.attestations.is_empty());
    }

    #[test]
    fn decodes_operations_in_wire_order() {
        let mut spec = BlockSpec::new(100, Fork::Phase0);
        spec.attestation_slots = vec![98, 99];
        spec.voluntary_exits = vec![(3, 77), (4, 78)];
        spec.proposer_slashing_count = 1;
        spec.deposit_count = 2;
        let block = decode_signed_block(&spec.encode(), Fork::Phase0, 100).unwrap();
        assert_eq!(
            block.body.attestations.iter().map(|a| a.data.slot).collect::<Vec<_>>(),
            vec![98, 99]
        );
        assert_eq!(block.body.voluntary_exits.len(), 2);
        assert_eq!(block.body.voluntary_exits[0].message.epoch, 3);
        assert_eq!(block.body.voluntary_exits[1].message.validator_index, 78);
        assert_eq!(block.body.proposer_slashings.len(), 1);
        assert_eq!(block.body.deposits.len(), 2);
    }

    #[test]
    fn altair_carries_sync_aggregate_inline() {
        let spec = BlockSpec::new(200, Fork::Altair);
        let block = decode_signed_block(&spec.encode(), Fork::Altair, 200).unwrap();
        let aggregate = block.body.sync_aggregate.expect("altair block");
        assert_eq!(aggregate.sync_committee_bits.len(), 64);
        assert_eq!(aggregate.sync_committee_signature.len(), 96);
    }

    #[test]
    fn attester_slashing_preserves_index_arrays() {
        let mut spec = BlockSpec::new(300, Fork::Altair);
        spec.attester_slashings = vec![AttesterSlashingSpec {
            indices_1: vec![10, 20, 30],
            indices_2: vec![20, 30, 40],
        }];
        let block = decode_signed_block(&spec.encode(), Fork::Altair, 300).unwrap();
        let slashing = &block.body.attester_slashings[0];
        assert_eq!(slashing.attestation_1.attesting_indices, vec![10, 20, 30]);
        assert_eq!(slashing.attestation_2.attesting_indices, vec![20, 30, 40]);
    }

    #[test]
    fn bellatrix_payload_decodes_transactions_and_base_fee() {
        let mut spec = BlockSpec::new(400, Fork::Bellatrix);
        spec.payload = Some(PayloadSpec {
            block_number: 15_537_394,
            timestamp: 1_663_224_179,
            base_fee_per_gas: 48_102_362_455,
            transactions: vec![vec![0x02, 0xf8, 0x71], vec![0xf8, 0x6b, 0x80]],
            ..PayloadSpec::default()
        });
        let block = decode_signed_block(&spec.encode(), Fork::Bellatrix, 400).unwrap();
        let payload = block.body.execution_payload.expect("bellatrix block");
        assert_eq!(payload.block_number, 15_537_394);
        assert_eq!(payload.base_fee_per_gas, "48102362455");
        assert_eq!(payload.transaction_hashes.len(), 2);
        assert_eq!(
            payload.transaction_hashes[0],
            alloy_primitives::keccak256([0x02u8, 0xf8, 0x71]).0
        );
        assert!(payload.withdrawals.is_empty());
        assert!(payload.blob_gas_used.is_none());
    }

    #[test]
    fn capella_payload_carries_withdrawals() {
        let mut spec = BlockSpec::new(500, Fork::Capella);
        spec.payload = Some(PayloadSpec {
            withdrawals: vec![(7, 1001, 32_000_000_000), (8, 1002, 17)],
            ..PayloadSpec::default()
        });
        spec.bls_change_indices = vec![42];
        let block = decode_signed_block(&spec.encode(), Fork::Capella, 500).unwrap();
        let payload = block.body.execution_payload.expect("capella block");
        assert_eq!(payload.withdrawals.len(), 2);
        assert_eq!(payload.withdrawals[0].index, 7);
        assert_eq!(payload.withdrawals[1].amount, 17);
        assert_eq!(block.body.bls_to_execution_changes[0].message.validator_index, 42);
    }

    #[test]
    fn deneb_payload_carries_blob_gas_fields() {
        let mut spec = BlockSpec::new(600, Fork::Deneb);
        spec.payload = Some(PayloadSpec {
            blob_gas_used: 131_072,
            excess_blob_gas: 393_216,
            ..PayloadSpec::default()
        });
        spec.blob_commitment_count = 3;
        let block = decode_signed_block(&spec.encode(), Fork::Deneb, 600).unwrap();
        let payload = block.body.execution_payload.expect("deneb block");
        assert_eq!(payload.blob_gas_used, Some(131_072));
        assert_eq!(payload.excess_blob_gas, Some(393_216));
        assert_eq!(block.body.blob_kzg_commitments.len(), 3);
    }

    #[test]
    fn electra_requests_split_into_three_lists() {
        let mut spec = BlockSpec::new(700, Fork::Electra);
        spec.payload = Some(PayloadSpec::default());
        spec.requests = Some(RequestsSpec {
            deposit_count: 2,
            withdrawal_count: 1,
            consolidation_count: 3,
        });
        let block = decode_signed_block(&spec.encode(), Fork::Electra, 700).unwrap();
        let requests = block.body.execution_requests.expect("electra block");
        assert_eq!(requests.deposits.len(), 2);
        assert_eq!(requests.withdrawals.len(), 1);
        assert_eq!(requests.consolidations.len(), 3);
    }

    #[test]
    fn graffiti_and_roots_survive_the_round_trip() {
        use hex_literal::hex;
        let mut spec = BlockSpec::new(1000, Fork::Phase0);
        spec.graffiti = hex!("636c69656e742f76312e322e33000000000000000000000000000000000000ff");
        spec.parent_root = hex!("d8ea171f3c94aea21ebc42a1ed61052acf3f9209c00e4efbaaddac09ed9b8078");
        let block = decode_signed_block(&spec.encode(), Fork::Phase0, 1000).unwrap();
        assert_eq!(block.body.graffiti, spec.graffiti);
        assert_eq!(block.parent_root, spec.parent_root);
        assert_eq!(block.proposer_index, spec.proposer_index);
    }

    #[test]
    fn tolerates_unknown_bytes_beyond_the_declared_schema() {
        // An altair body read with the phase0 schema: the inline sync
        // aggregate sits between the declared fixed region and the first
        // offset target and must be skipped, not rejected.
        let mut spec = BlockSpec::new(800, Fork::Altair);
        spec.attestation_slots = vec![799];
        let block = decode_signed_block(&spec.encode(), Fork::Phase0, 800).unwrap();
        assert!(block.body.sync_aggregate.is_none());
        assert_eq!(block.body.attestations.len(), 1);
    }

    #[test]
    fn short_fixed_region_is_an_error() {
        let spec = BlockSpec::new(900, Fork::Phase0);
        let bytes = spec.encode();
        let truncated = &bytes[..ENVELOPE_FIXED_SIZE + 100];
        let err = decode_signed_block(truncated, Fork::Phase0, 900).unwrap_err();
        assert_eq!(err.slot, 900);
    }

    #[test]
    fn offset_outside_body_is_an_error() {
        let spec = BlockSpec::new(901, Fork::Phase0);
        let mut bytes = spec.encode();
        // first body offset (proposer_slashings) sits after the envelope,
        // message prefix and 200 fixed body bytes
        let at = ENVELOPE_FIXED_SIZE + MESSAGE_FIXED_SIZE + 200;
        bytes[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = decode_signed_block(&bytes, Fork::Phase0, 901).unwrap_err();
        assert!(matches!(
            err.reason,
            DecodeReason::OffsetOutsideContainer { .. }
        ));
    }
}
