//! Per-era orchestration: download -> archive open -> decode/extract ->
//! load -> completion record, with every failure path ending in a terminal
//! state record.

use std::path::Path;
use std::time::Instant;

use era_ingest_shared::datasets::Dataset;
use era_ingest_shared::decode::{decode_signed_block, BlockDecodeError, DecodeReason};
use era_ingest_shared::e2store::{decompress_block, ArchiveError, EraFile};
use era_ingest_shared::extract::{canonical_timestamp, extract_block, EraRows};
use era_ingest_shared::networks::{era_slot_range, Network};

use crate::download::{DownloadError, DownloadedEra};
use crate::prometheus_metrics::{outcome, Metrics};
use crate::state::StateManager;
use crate::warehouse::{EraLoader, Warehouse};

pub const DEFAULT_BLOCK_ERROR_TOLERANCE_PERCENT: u8 = 50;

#[derive(Debug, Clone)]
pub struct ProcessorSettings {
    pub force: bool,
    pub cleanup_after_process: bool,
    pub datasets: Vec<Dataset>,
    /// Maximum percentage of undecodable blocks before the era fails.
    pub block_error_tolerance_percent: u8,
    pub batch_size: usize,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            force: false,
            cleanup_after_process: true,
            datasets: Dataset::ALL.to_vec(),
            block_error_tolerance_percent: DEFAULT_BLOCK_ERROR_TOLERANCE_PERCENT,
            batch_size: crate::warehouse::DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug)]
pub enum EraOutcome {
    Completed {
        era_number: u64,
        total_records: u64,
        datasets_loaded: Vec<Dataset>,
        blocks_decoded: usize,
        blocks_failed: usize,
    },
    Failed {
        era_number: u64,
        error: String,
    },
}

impl EraOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn era_number(&self) -> u64 {
        match self {
            Self::Completed { era_number, .. } | Self::Failed { era_number, .. } => *era_number,
        }
    }

    pub fn total_records(&self) -> u64 {
        match self {
            Self::Completed { total_records, .. } => *total_records,
            Self::Failed { .. } => 0,
        }
    }
}

struct DecodedEra {
    rows: EraRows,
    blocks_total: usize,
    blocks_failed: usize,
}

pub struct EraProcessor<'a, W> {
    state: &'a StateManager<W>,
    warehouse: &'a W,
    network: Network,
    settings: &'a ProcessorSettings,
    metrics: &'a Metrics,
}

impl<'a, W: Warehouse + 'static> EraProcessor<'a, W> {
    pub fn new(
        state: &'a StateManager<W>,
        warehouse: &'a W,
        network: Network,
        settings: &'a ProcessorSettings,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            state,
            warehouse,
            network,
            settings,
            metrics,
        }
    }

    /// Runs one era to a terminal state. Every exit path leaves either a
    /// `completed` record with all rows visible, or a cleaned range and a
    /// `failed` record.
    pub async fn process_era(
        &self,
        era_number: u64,
        fetched: Result<DownloadedEra, DownloadError>,
    ) -> EraOutcome {
        let started = Instant::now();
        let timer = self.metrics.pipeline.era_processing_seconds.start_timer();

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                // Nothing was written for this era yet; a failure record is
                // the only cleanup needed.
                let message = e.to_string();
                tracing::error!(era = era_number, "Download failed: {message}");
                self.try_mark_failed(era_number, &message).await;
                timer.observe_duration();
                self.metrics
                    .pipeline
                    .eras_processed
                    .with_label_values(&[outcome::FAILED])
                    .inc();
                return EraOutcome::Failed {
                    era_number,
                    error: message,
                };
            }
        };

        let range = era_slot_range(era_number);
        tracing::info!(
            era = era_number,
            size_bytes = fetched.size_bytes,
            slot_start = *range.start(),
            slot_end = *range.end(),
            fork_start = %self.network.fork_for(*range.start()),
            fork_end = %self.network.fork_for(*range.end()),
            "Processing era"
        );

        let result = self.run_attempt(era_number, &fetched).await;

        if self.settings.cleanup_after_process {
            if let Err(e) = tokio::fs::remove_file(&fetched.path).await {
                tracing::warn!(
                    era = era_number,
                    path = %fetched.path.display(),
                    "Could not delete era file: {e}"
                );
            }
        }
        timer.observe_duration();

        let elapsed = started.elapsed();
        match &result {
            EraOutcome::Completed {
                total_records,
                blocks_decoded,
                blocks_failed,
                ..
            } => {
                self.metrics
                    .pipeline
                    .eras_processed
                    .with_label_values(&[outcome::COMPLETED])
                    .inc();
                self.metrics.pipeline.last_completed_era.set(era_number);
                tracing::info!(
                    era = era_number,
                    total_records,
                    blocks_decoded,
                    blocks_failed,
                    elapsed = ?elapsed,
                    "Era completed"
                );
            }
            EraOutcome::Failed { error, .. } => {
                self.metrics
                    .pipeline
                    .eras_processed
                    .with_label_values(&[outcome::FAILED])
                    .inc();
                tracing::error!(era = era_number, elapsed = ?elapsed, "Era failed: {error}");
            }
        }
        result
    }

    async fn run_attempt(&self, era_number: u64, fetched: &DownloadedEra) -> EraOutcome {
        // The state manager may have cleaned already when force applied to
        // the whole range; cleaning is idempotent.
        if self.settings.force {
            if let Err(e) = self.state.clean_slot_range(era_number).await {
                return self.fail(era_number, format!("force-clean failed: {e}"), false).await;
            }
        }
        if let Err(e) = self.state.mark_processing(era_number).await {
            return self
                .fail(era_number, format!("could not mark era as processing: {e}"), false)
                .await;
        }

        let decoded = {
            let network = self.network;
            let path = fetched.path.clone();
            let handle =
                tokio::task::spawn_blocking(move || decode_era_archive(&path, network, era_number));
            match handle.await {
                Ok(Ok(decoded)) => decoded,
                Ok(Err(e)) => {
                    return self.fail(era_number, format!("malformed archive: {e}"), true).await;
                }
                Err(join_error) => {
                    return self
                        .fail(era_number, format!("decode task aborted: {join_error}"), true)
                        .await;
                }
            }
        };

        self.metrics
            .pipeline
            .block_decode_errors
            .inc_by(decoded.blocks_failed as u64);

        let tolerance = self.settings.block_error_tolerance_percent as usize;
        if decoded.blocks_total > 0 && decoded.blocks_failed * 100 > decoded.blocks_total * tolerance {
            let message = format!(
                "{} of {} blocks failed to decode (tolerance {}%)",
                decoded.blocks_failed, decoded.blocks_total, tolerance
            );
            return self.fail(era_number, message, true).await;
        }

        let loader = EraLoader::new(self.warehouse, self.settings.batch_size);
        let loaded = match loader.load_era(&decoded.rows, &self.settings.datasets).await {
            Ok(loaded) => loaded,
            Err(e) => {
                // Leave the range clean so the next attempt starts fresh.
                return self.fail(era_number, e.to_string(), true).await;
            }
        };
        for dataset in &loaded.datasets_loaded {
            self.metrics
                .pipeline
                .rows_inserted
                .with_label_values(&[dataset.table_name()])
                .inc_by(decoded.rows.count(*dataset) as u64);
        }

        if let Err(e) = self
            .state
            .mark_completed(era_number, &loaded.datasets_loaded, loaded.total_rows)
            .await
        {
            return self
                .fail(era_number, format!("could not record completion: {e}"), true)
                .await;
        }

        EraOutcome::Completed {
            era_number,
            total_records: loaded.total_rows,
            datasets_loaded: loaded.datasets_loaded,
            blocks_decoded: decoded.blocks_total - decoded.blocks_failed,
            blocks_failed: decoded.blocks_failed,
        }
    }

    async fn fail(&self, era_number: u64, message: String, clean: bool) -> EraOutcome {
        if clean {
            if let Err(e) = self.state.clean_slot_range(era_number).await {
                tracing::error!(era = era_number, "Cleanup after failure also failed: {e}");
            }
        }
        self.try_mark_failed(era_number, &message).await;
        EraOutcome::Failed {
            era_number,
            error: message,
        }
    }

    async fn try_mark_failed(&self, era_number: u64, message: &str) {
        if let Err(e) = self.state.mark_failed(era_number, message).await {
            tracing::error!(era = era_number, "Could not record failure: {e}");
        }
    }
}

/// CPU-bound phase: read the archive, decompress and decode every block,
/// flatten into rows. Individual block failures are tolerated and counted.
fn decode_era_archive(
    path: &Path,
    network: Network,
    era_number: u64,
) -> Result<DecodedEra, ArchiveError> {
    let era = EraFile::read(path)?;
    let expected_start = *era_slot_range(era_number).start();
    if era.block_count() > 0 && era.start_slot() != expected_start {
        tracing::warn!(
            era = era_number,
            index_start = era.start_slot(),
            expected_start,
            "Slot index start does not match the filename era"
        );
    }

    let mut rows = EraRows::default();
    let mut blocks_failed = 0usize;
    for (slot, compressed) in era.blocks() {
        let fork = network.fork_for(slot);
        let decoded = decompress_block(compressed)
            .map_err(|e| BlockDecodeError {
                slot,
                reason: DecodeReason::Decompression(e.to_string()),
            })
            .and_then(|bytes| decode_signed_block(&bytes, fork, slot));
        match decoded {
            Ok(block) => {
                let timestamp_utc = canonical_timestamp(&block, network);
                rows.append(extract_block(&block, timestamp_utc));
            }
            Err(e) => {
                blocks_failed += 1;
                tracing::warn!(era = era_number, "Skipping block: {e}");
            }
        }
    }

    Ok(DecodedEra {
        rows,
        blocks_total: era.block_count(),
        blocks_failed,
    })
}
