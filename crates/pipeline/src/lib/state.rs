//! Completion-state bookkeeping: the single source of truth for which eras
//! are done, keyed `(network, era_number)` with last-write-wins versioning.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use era_ingest_shared::datasets::Dataset;
use era_ingest_shared::networks::{era_slot_range, Network};

use crate::warehouse::{Warehouse, WarehouseError};

pub const COMPLETION_TABLE: &str = "era_completion";
/// View resolving the current record per key (max `insert_version`).
pub const COMPLETION_VIEW: &str = "era_completion_current";

pub const DEFAULT_STATE_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EraStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraCompletion {
    pub network: String,
    pub era_number: u64,
    pub status: EraStatus,
    pub slot_start: u64,
    pub slot_end: u64,
    pub total_records: u64,
    /// JSON array of dataset names actually loaded.
    pub datasets_processed: String,
    pub processing_started_at: u64,
    pub completed_at: Option<u64>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    /// Monotonic tag; the max per key wins.
    pub insert_version: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionStats {
    pub completed_count: u64,
    pub failed_count: u64,
    pub last_completion_at: Option<u64>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("completion record serialization failed: {0}")]
    BadRecord(#[from] serde_json::Error),
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

static LAST_INSERT_VERSION: AtomicU64 = AtomicU64::new(0);

/// Epoch milliseconds, bumped past the previous value so records written in
/// the same millisecond still order deterministically.
fn next_insert_version() -> u64 {
    let now = now_millis();
    let previous = LAST_INSERT_VERSION
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .expect("closure always returns Some");
    now.max(previous + 1)
}

pub struct StateManager<W> {
    warehouse: Arc<W>,
    network: Network,
    query_timeout: Duration,
}

impl<W: Warehouse> StateManager<W> {
    pub fn new(warehouse: Arc<W>, network: Network) -> Self {
        Self {
            warehouse,
            network,
            query_timeout: DEFAULT_STATE_QUERY_TIMEOUT,
        }
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Decides which candidates to run. Force mode cleans every candidate
    /// first and keeps all of them; normal mode subtracts the completed set.
    /// A slow or failing completion-set query degrades to processing all
    /// candidates rather than blocking - inserts are last-write-wins-safe.
    pub async fn eras_to_process<T>(
        &self,
        candidates: Vec<(u64, T)>,
        force: bool,
    ) -> Result<Vec<(u64, T)>, StateError> {
        if force {
            for (era_number, _) in &candidates {
                self.clean_slot_range(*era_number).await?;
            }
            return Ok(candidates);
        }

        let completed = tokio::time::timeout(
            self.query_timeout,
            self.warehouse.completed_eras(self.network.as_str()),
        )
        .await;

        let completed: std::collections::HashSet<u64> = match completed {
            Ok(Ok(eras)) => eras.into_iter().collect(),
            Ok(Err(e)) => {
                tracing::warn!("Completion-set query failed, processing all candidates: {e}");
                return Ok(candidates);
            }
            Err(_elapsed) => {
                tracing::warn!(
                    timeout = ?self.query_timeout,
                    "Completion-set query timed out, processing all candidates"
                );
                return Ok(candidates);
            }
        };

        Ok(candidates
            .into_iter()
            .filter(|(era_number, _)| !completed.contains(era_number))
            .collect())
    }

    pub async fn mark_processing(&self, era_number: u64) -> Result<(), StateError> {
        let retry_count = self.previous_retry_count(era_number).await;
        let record = self.base_record(era_number, EraStatus::Processing, retry_count);
        self.insert_record(record).await
    }

    pub async fn mark_completed(
        &self,
        era_number: u64,
        datasets: &[Dataset],
        total_records: u64,
    ) -> Result<(), StateError> {
        let retry_count = self.previous_retry_count(era_number).await;
        let names: Vec<&str> = datasets.iter().map(|d| d.table_name()).collect();
        let mut record = self.base_record(era_number, EraStatus::Completed, retry_count);
        record.total_records = total_records;
        record.datasets_processed = serde_json::to_string(&names)?;
        record.completed_at = Some(now_secs());
        self.insert_record(record).await
    }

    pub async fn mark_failed(&self, era_number: u64, message: &str) -> Result<(), StateError> {
        let retry_count = self.previous_retry_count(era_number).await;
        let mut record = self.base_record(era_number, EraStatus::Failed, retry_count + 1);
        record.error_message = Some(message.to_string());
        self.insert_record(record).await
    }

    /// Deletes every dataset row in the era's slot range, then the
    /// completion record. Safe to repeat.
    pub async fn clean_slot_range(&self, era_number: u64) -> Result<(), StateError> {
        let range = era_slot_range(era_number);
        tracing::info!(
            era = era_number,
            slot_start = *range.start(),
            slot_end = *range.end(),
            "Cleaning era slot range"
        );
        for dataset in Dataset::ALL {
            self.warehouse
                .delete_slot_range(dataset.table_name(), *range.start(), *range.end())
                .await?;
        }
        self.warehouse
            .delete_completion(self.network.as_str(), era_number)
            .await?;
        Ok(())
    }

    pub async fn current_completion(&self, era_number: u64) -> Result<Option<EraCompletion>, StateError> {
        Ok(self
            .warehouse
            .current_completion(self.network.as_str(), era_number)
            .await?)
    }

    pub async fn status(&self) -> Result<CompletionStats, StateError> {
        Ok(self.warehouse.completion_stats(self.network.as_str()).await?)
    }

    fn base_record(&self, era_number: u64, status: EraStatus, retry_count: u32) -> EraCompletion {
        let range = era_slot_range(era_number);
        EraCompletion {
            network: self.network.as_str().to_string(),
            era_number,
            status,
            slot_start: *range.start(),
            slot_end: *range.end(),
            total_records: 0,
            datasets_processed: "[]".to_string(),
            processing_started_at: now_secs(),
            completed_at: None,
            error_message: None,
            retry_count,
            insert_version: next_insert_version(),
        }
    }

    async fn insert_record(&self, record: EraCompletion) -> Result<(), StateError> {
        let value = serde_json::to_value(&record)?;
        self.warehouse.insert_rows(COMPLETION_TABLE, &[value]).await?;
        Ok(())
    }

    /// Retry count of the current record, tolerating lookup failures -
    /// an unknown history reads as zero.
    async fn previous_retry_count(&self, era_number: u64) -> u32 {
        match self
            .warehouse
            .current_completion(self.network.as_str(), era_number)
            .await
        {
            Ok(Some(record)) => record.retry_count,
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(era = era_number, "Could not read prior completion record: {e}");
                0
            }
        }
    }
}
