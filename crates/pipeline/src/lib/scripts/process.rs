//! The range operation: discover candidates, subtract or clean completed
//! eras, then run each surviving era to a terminal state.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use era_ingest_shared::datasets::Dataset;

use crate::catalog::{DiscoveryError, EraRange};
use crate::download::{prefetch_stream, DownloadError};
use crate::processor::{EraProcessor, ProcessorSettings};
use crate::prometheus_metrics::outcome;
use crate::scripts::prelude::PipelineRuntime;
use crate::state::StateError;

#[derive(Debug, Clone)]
pub struct Flags {
    pub start_era: u64,
    pub end_era: Option<u64>,
    /// Empty selects every dataset.
    pub datasets: Vec<Dataset>,
    pub force: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub processed: u64,
    pub failed: u64,
    pub total_records: u64,
}

/// Only configuration and discovery problems abort the range; per-era
/// failures land in the summary.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub async fn run(
    runtime: &PipelineRuntime,
    flags: &Flags,
    cancel: CancellationToken,
) -> Result<Summary, Error> {
    let range = EraRange::new(flags.start_era, flags.end_era);
    tracing::info!(
        network = %runtime.network,
        start = range.start,
        end = ?range.end,
        force = flags.force,
        "Starting range operation"
    );

    let candidates = runtime.remote.catalog.discover(range).await?;
    let discovered = candidates.len();

    let state = runtime.state_manager();
    let targets = state.eras_to_process(candidates, flags.force).await?;
    let skipped = discovered - targets.len();
    runtime
        .metrics
        .pipeline
        .eras_processed
        .with_label_values(&[outcome::SKIPPED])
        .inc_by(skipped as u64);
    tracing::info!(
        discovered,
        to_process = targets.len(),
        skipped,
        "Selected eras"
    );

    let settings = ProcessorSettings {
        force: flags.force,
        cleanup_after_process: runtime.settings.cleanup_after_process,
        datasets: if flags.datasets.is_empty() {
            Dataset::ALL.to_vec()
        } else {
            flags.datasets.clone()
        },
        block_error_tolerance_percent: runtime.settings.block_error_tolerance_percent,
        batch_size: runtime.settings.batch_size,
    };
    let processor = EraProcessor::new(
        &state,
        runtime.warehouse.client.as_ref(),
        runtime.network,
        &settings,
        &runtime.metrics,
    );

    let mut summary = Summary::default();
    let downloads = prefetch_stream(
        Arc::clone(&runtime.remote.downloader),
        targets,
        runtime.settings.max_concurrent_downloads,
        cancel.clone(),
    );
    futures::pin_mut!(downloads);

    while let Some((era_number, fetched)) = downloads.next().await {
        if matches!(fetched, Err(DownloadError::Cancelled { .. })) {
            tracing::info!(era = era_number, "Cancelled before download completed");
            break;
        }
        // The in-flight era always reaches a terminal record; cancellation
        // only stops new eras from starting.
        let outcome = processor.process_era(era_number, fetched).await;
        if outcome.is_completed() {
            summary.processed += 1;
            summary.total_records += outcome.total_records();
        } else {
            summary.failed += 1;
        }
        if cancel.is_cancelled() {
            tracing::info!("Cancellation requested, no further eras will start");
            break;
        }
    }

    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        total_records = summary.total_records,
        "Range operation finished"
    );
    Ok(summary)
}
