//! Declarative body layouts, one ordered field list per fork.
//!
//! Every fork is a strict superset of the previous one: the common 220-byte
//! prefix (randao + eth1_data + graffiti + five operation offsets), then the
//! fields that fork introduced, in activation order.

use crate::networks::Fork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Inline field consuming exactly this many bytes of the fixed region.
    Fixed(usize),
    /// 4-byte offset into the body's variable region.
    Offset,
}

#[derive(Debug, Clone, Copy)]
pub struct BodyField {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn fixed(name: &'static str, size: usize) -> BodyField {
    BodyField {
        name,
        kind: FieldKind::Fixed(size),
    }
}

const fn offset(name: &'static str) -> BodyField {
    BodyField {
        name,
        kind: FieldKind::Offset,
    }
}

pub const RANDAO_REVEAL_SIZE: usize = 96;
pub const ETH1_DATA_SIZE: usize = 72;
pub const GRAFFITI_SIZE: usize = 32;
pub const SYNC_AGGREGATE_SIZE: usize = 160;

/// Fixed item sizes for the self-describing list splitter.
pub const WITHDRAWAL_SIZE: usize = 44;
pub const DEPOSIT_SIZE: usize = 1240;
pub const VOLUNTARY_EXIT_SIZE: usize = 112;
pub const BLS_CHANGE_SIZE: usize = 172;
pub const KZG_COMMITMENT_SIZE: usize = 48;
pub const DEPOSIT_REQUEST_SIZE: usize = 192;
pub const WITHDRAWAL_REQUEST_SIZE: usize = 76;
pub const CONSOLIDATION_REQUEST_SIZE: usize = 116;

pub const SIGNED_HEADER_SIZE: usize = 208;
pub const PROPOSER_SLASHING_SIZE: usize = 2 * SIGNED_HEADER_SIZE;
pub const ATTESTATION_DATA_SIZE: usize = 128;
pub const SIGNATURE_SIZE: usize = 96;

const PHASE0_BODY: &[BodyField] = &[
    fixed("randao_reveal", RANDAO_REVEAL_SIZE),
    fixed("eth1_data", ETH1_DATA_SIZE),
    fixed("graffiti", GRAFFITI_SIZE),
    offset("proposer_slashings"),
    offset("attester_slashings"),
    offset("attestations"),
    offset("deposits"),
    offset("voluntary_exits"),
];

const ALTAIR_BODY: &[BodyField] = &[
    fixed("randao_reveal", RANDAO_REVEAL_SIZE),
    fixed("eth1_data", ETH1_DATA_SIZE),
    fixed("graffiti", GRAFFITI_SIZE),
    offset("proposer_slashings"),
    offset("attester_slashings"),
    offset("attestations"),
    offset("deposits"),
    offset("voluntary_exits"),
    fixed("sync_aggregate", SYNC_AGGREGATE_SIZE),
];

const BELLATRIX_BODY: &[BodyField] = &[
    fixed("randao_reveal", RANDAO_REVEAL_SIZE),
    fixed("eth1_data", ETH1_DATA_SIZE),
    fixed("graffiti", GRAFFITI_SIZE),
    offset("proposer_slashings"),
    offset("attester_slashings"),
    offset("attestations"),
    offset("deposits"),
    offset("voluntary_exits"),
    fixed("sync_aggregate", SYNC_AGGREGATE_SIZE),
    offset("execution_payload"),
];

const CAPELLA_BODY: &[BodyField] = &[
    fixed("randao_reveal", RANDAO_REVEAL_SIZE),
    fixed("eth1_data", ETH1_DATA_SIZE),
    fixed("graffiti", GRAFFITI_SIZE),
    offset("proposer_slashings"),
    offset("attester_slashings"),
    offset("attestations"),
    offset("deposits"),
    offset("voluntary_exits"),
    fixed("sync_aggregate", SYNC_AGGREGATE_SIZE),
    offset("execution_payload"),
    offset("bls_to_execution_changes"),
];

const DENEB_BODY: &[BodyField] = &[
    fixed("randao_reveal", RANDAO_REVEAL_SIZE),
    fixed("eth1_data", ETH1_DATA_SIZE),
    fixed("graffiti", GRAFFITI_SIZE),
    offset("proposer_slashings"),
    offset("attester_slashings"),
    offset("attestations"),
    offset("deposits"),
    offset("voluntary_exits"),
    fixed("sync_aggregate", SYNC_AGGREGATE_SIZE),
    offset("execution_payload"),
    offset("bls_to_execution_changes"),
    offset("blob_kzg_commitments"),
];

const ELECTRA_BODY: &[BodyField] = &[
    fixed("randao_reveal", RANDAO_REVEAL_SIZE),
    fixed("eth1_data", ETH1_DATA_SIZE),
    fixed("graffiti", GRAFFITI_SIZE),
    offset("proposer_slashings"),
    offset("attester_slashings"),
    offset("attestations"),
    offset("deposits"),
    offset("voluntary_exits"),
    fixed("sync_aggregate", SYNC_AGGREGATE_SIZE),
    offset("execution_payload"),
    offset("bls_to_execution_changes"),
    offset("blob_kzg_commitments"),
    offset("execution_requests"),
];

pub fn body_schema(fork: Fork) -> &'static [BodyField] {
    match fork {
        Fork::Phase0 => PHASE0_BODY,
        Fork::Altair => ALTAIR_BODY,
        Fork::Bellatrix => BELLATRIX_BODY,
        Fork::Capella => CAPELLA_BODY,
        Fork::Deneb => DENEB_BODY,
        Fork::Electra => ELECTRA_BODY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemas_extend_by_strict_superset() {
        let forks = [
            Fork::Phase0,
            Fork::Altair,
            Fork::Bellatrix,
            Fork::Capella,
            Fork::Deneb,
            Fork::Electra,
        ];
        for pair in forks.windows(2) {
            let earlier = body_schema(pair[0]);
            let later = body_schema(pair[1]);
            assert!(later.len() > earlier.len());
            for (a, b) in earlier.iter().zip(later.iter()) {
                assert_eq!(a.name, b.name);
                assert_eq!(a.kind, b.kind);
            }
        }
    }

    #[test]
    fn common_prefix_is_220_bytes() {
        let fixed_bytes: usize = body_schema(Fork::Phase0)
            .iter()
            .map(|f| match f.kind {
                FieldKind::Fixed(size) => size,
                FieldKind::Offset => 4,
            })
            .sum();
        assert_eq!(fixed_bytes, 220);
    }
}
