//! The relational datasets a decoded block fans out into.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown dataset {0}")]
pub struct UnknownDataset(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Blocks,
    SyncAggregates,
    ExecutionPayloads,
    Transactions,
    Withdrawals,
    Attestations,
    Deposits,
    VoluntaryExits,
    ProposerSlashings,
    AttesterSlashings,
    BlsChanges,
    BlobCommitments,
    DepositRequests,
    WithdrawalRequests,
    ConsolidationRequests,
}

impl Dataset {
    pub const ALL: [Dataset; 15] = [
        Dataset::Blocks,
        Dataset::SyncAggregates,
        Dataset::ExecutionPayloads,
        Dataset::Transactions,
        Dataset::Withdrawals,
        Dataset::Attestations,
        Dataset::Deposits,
        Dataset::VoluntaryExits,
        Dataset::ProposerSlashings,
        Dataset::AttesterSlashings,
        Dataset::BlsChanges,
        Dataset::BlobCommitments,
        Dataset::DepositRequests,
        Dataset::WithdrawalRequests,
        Dataset::ConsolidationRequests,
    ];

    /// Warehouse table name; doubles as the operator-facing identifier.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::SyncAggregates => "sync_aggregates",
            Self::ExecutionPayloads => "execution_payloads",
            Self::Transactions => "transactions",
            Self::Withdrawals => "withdrawals",
            Self::Attestations => "attestations",
            Self::Deposits => "deposits",
            Self::VoluntaryExits => "voluntary_exits",
            Self::ProposerSlashings => "proposer_slashings",
            Self::AttesterSlashings => "attester_slashings",
            Self::BlsChanges => "bls_changes",
            Self::BlobCommitments => "blob_commitments",
            Self::DepositRequests => "deposit_requests",
            Self::WithdrawalRequests => "withdrawal_requests",
            Self::ConsolidationRequests => "consolidation_requests",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for Dataset {
    type Err = UnknownDataset;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dataset| dataset.table_name() == value)
            .ok_or_else(|| UnknownDataset(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for dataset in Dataset::ALL {
            assert_eq!(dataset.table_name().parse::<Dataset>().unwrap(), dataset);
        }
        assert!("no_such_table".parse::<Dataset>().is_err());
    }
}
