//! End-to-end era processing against the in-memory warehouse: completion
//! records, idempotent reprocessing, force mode, and failure cleanup.

mod test_utils;

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use reqwest::Url;
use tokio_util::sync::CancellationToken;

use era_ingest_pipeline::download::{prefetch_stream, DownloadError, DownloadedEra};
use era_ingest_pipeline::processor::{EraProcessor, ProcessorSettings};
use era_ingest_pipeline::prometheus_metrics::Metrics;
use era_ingest_pipeline::state::{EraStatus, StateManager};
use era_ingest_shared::datasets::Dataset;
use era_ingest_shared::networks::{era_slot_range, Fork};
use era_ingest_shared::synthetic::{compress_snappy, BlockSpec};

use test_utils::{temp_dir, write_era_file, write_era_file_raw, InMemoryWarehouse, LocalFetcher, NETWORK};

const ERA: u64 = 1082;
const GNOSIS_GENESIS: u64 = 1_638_993_340;

fn bellatrix_blocks(count: usize) -> Vec<(u64, Vec<u8>)> {
    let start = *era_slot_range(ERA).start();
    (0..count as u64)
        .map(|i| {
            let slot = start + i;
            (slot, BlockSpec::new(slot, Fork::Bellatrix).encode())
        })
        .collect()
}

fn settings() -> ProcessorSettings {
    ProcessorSettings {
        cleanup_after_process: false,
        ..ProcessorSettings::default()
    }
}

fn downloaded(path: &Path, era_number: u64) -> DownloadedEra {
    DownloadedEra {
        era_number,
        path: path.to_path_buf(),
        size_bytes: std::fs::metadata(path).expect("era file exists").len(),
    }
}

#[tokio::test]
async fn completes_era_and_records_state() {
    let dir = temp_dir("complete");
    let path = write_era_file(&dir, ERA, &bellatrix_blocks(3));

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed(), "{outcome:?}");

    // one blocks + sync_aggregates + execution_payloads row per block
    assert_eq!(warehouse.row_count("blocks"), 3);
    assert_eq!(warehouse.row_count("sync_aggregates"), 3);
    assert_eq!(warehouse.row_count("execution_payloads"), 3);
    assert_eq!(warehouse.row_count("transactions"), 0);

    let first_block = &warehouse.rows("blocks")[0];
    let start_slot = *era_slot_range(ERA).start();
    assert_eq!(
        first_block.get("timestamp_utc").and_then(|v| v.as_u64()),
        Some(GNOSIS_GENESIS + start_slot * 5)
    );

    // exactly one current record, status completed
    let current = warehouse.current_completions(NETWORK.as_str());
    assert_eq!(current.len(), 1);
    let record = &current[0];
    assert_eq!(record.status, EraStatus::Completed);
    assert_eq!(record.era_number, ERA);
    assert_eq!(record.slot_start, start_slot);
    assert_eq!(record.slot_end, start_slot + 8191);
    assert_eq!(record.total_records, 9);
    assert!(record.completed_at.is_some());
    let datasets: Vec<String> = serde_json::from_str(&record.datasets_processed).unwrap();
    assert!(datasets.contains(&"blocks".to_string()));
}

#[tokio::test]
async fn normal_mode_skips_completed_eras() {
    let dir = temp_dir("skip");
    let path = write_era_file(&dir, ERA, &bellatrix_blocks(2));

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed());
    let counts_before = warehouse.row_count("blocks");

    let remaining = state
        .eras_to_process(vec![(ERA, ()), (ERA + 1, ())], false)
        .await
        .unwrap();
    assert_eq!(remaining.iter().map(|(e, _)| *e).collect::<Vec<_>>(), vec![ERA + 1]);
    assert_eq!(warehouse.row_count("blocks"), counts_before);
}

#[tokio::test]
async fn force_mode_cleans_then_reproduces_identical_rows() {
    let dir = temp_dir("force");
    let path = write_era_file(&dir, ERA, &bellatrix_blocks(4));

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let normal = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &normal, &metrics);
    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed());

    let range = era_slot_range(ERA);
    let rows_before = warehouse.rows_in_slot_range(*range.start(), *range.end());
    assert!(rows_before > 0);

    // force selection cleans everything for the candidate first
    let targets = state.eras_to_process(vec![(ERA, ())], true).await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(warehouse.rows_in_slot_range(*range.start(), *range.end()), 0);
    assert!(warehouse.current_completion_of(NETWORK.as_str(), ERA).is_none());

    let force = ProcessorSettings {
        force: true,
        ..settings()
    };
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &force, &metrics);
    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed());

    assert_eq!(
        warehouse.rows_in_slot_range(*range.start(), *range.end()),
        rows_before
    );
    let record = warehouse
        .current_completion_of(NETWORK.as_str(), ERA)
        .expect("completion record");
    assert_eq!(record.status, EraStatus::Completed);
}

#[tokio::test]
async fn insert_failure_cleans_range_and_marks_failed() {
    let dir = temp_dir("insert-fail");
    let start = *era_slot_range(ERA).start();
    let mut spec = BlockSpec::new(start, Fork::Bellatrix);
    spec.attestation_slots = vec![start - 1, start - 2];
    let path = write_era_file(&dir, ERA, &[(start, spec.encode())]);

    let warehouse = Arc::new(InMemoryWarehouse::new());
    warehouse.fail_inserts_into("attestations");
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(!outcome.is_completed());

    let range = era_slot_range(ERA);
    assert_eq!(warehouse.rows_in_slot_range(*range.start(), *range.end()), 0);
    let record = warehouse
        .current_completion_of(NETWORK.as_str(), ERA)
        .expect("failure record");
    assert_eq!(record.status, EraStatus::Failed);
    assert_eq!(record.retry_count, 1);
    assert!(record.error_message.as_deref().unwrap().contains("attestations"));
}

#[tokio::test]
async fn corrupt_block_within_tolerance_still_completes() {
    let dir = temp_dir("tolerance");
    let start = *era_slot_range(ERA).start();
    let mut frames: Vec<(u64, Vec<u8>)> = bellatrix_blocks(3)
        .into_iter()
        .map(|(slot, encoded)| (slot, compress_snappy(&encoded)))
        .collect();
    let mut corrupt = compress_snappy(&BlockSpec::new(start + 3, Fork::Bellatrix).encode());
    corrupt.truncate(corrupt.len() / 2);
    frames.push((start + 3, corrupt));
    let path = write_era_file_raw(&dir, ERA, &frames);

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed(), "{outcome:?}");
    assert_eq!(warehouse.row_count("blocks"), 3);
    let record = warehouse
        .current_completion_of(NETWORK.as_str(), ERA)
        .expect("completion record");
    assert_eq!(record.status, EraStatus::Completed);
}

#[tokio::test]
async fn era_fails_when_most_blocks_are_corrupt() {
    let dir = temp_dir("over-tolerance");
    let start = *era_slot_range(ERA).start();
    let good = BlockSpec::new(start, Fork::Bellatrix).encode();
    let mut frames = vec![(start, compress_snappy(&good))];
    for i in 1..4u64 {
        let mut corrupt = compress_snappy(&BlockSpec::new(start + i, Fork::Bellatrix).encode());
        corrupt.truncate(10);
        frames.push((start + i, corrupt));
    }
    let path = write_era_file_raw(&dir, ERA, &frames);

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(!outcome.is_completed());

    let record = warehouse
        .current_completion_of(NETWORK.as_str(), ERA)
        .expect("failure record");
    assert_eq!(record.status, EraStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("3 of 4"));
    let range = era_slot_range(ERA);
    assert_eq!(warehouse.rows_in_slot_range(*range.start(), *range.end()), 0);
}

#[tokio::test]
async fn download_failure_marks_era_failed() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = settings();
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let error = DownloadError::RetriesExhausted {
        era_number: ERA,
        attempts: 3,
        last_error: "connection refused".to_string(),
    };
    let outcome = processor.process_era(ERA, Err(error)).await;
    assert!(!outcome.is_completed());

    let record = warehouse
        .current_completion_of(NETWORK.as_str(), ERA)
        .expect("failure record");
    assert_eq!(record.status, EraStatus::Failed);
    assert!(record.error_message.as_deref().unwrap().contains("3 attempts"));
}

#[tokio::test]
async fn cleanup_after_process_deletes_the_archive() {
    let dir = temp_dir("cleanup");
    let path = write_era_file(&dir, ERA, &bellatrix_blocks(1));

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = ProcessorSettings::default(); // cleanup_after_process: true
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed());
    assert!(!path.exists());
}

#[tokio::test]
async fn dataset_selection_limits_what_loads() {
    let dir = temp_dir("datasets");
    let path = write_era_file(&dir, ERA, &bellatrix_blocks(2));

    let warehouse = Arc::new(InMemoryWarehouse::new());
    let state = StateManager::new(Arc::clone(&warehouse), NETWORK);
    let metrics = Metrics::new("test");
    let settings = ProcessorSettings {
        cleanup_after_process: false,
        datasets: vec![Dataset::Blocks],
        ..ProcessorSettings::default()
    };
    let processor = EraProcessor::new(&state, warehouse.as_ref(), NETWORK, &settings, &metrics);

    let outcome = processor.process_era(ERA, Ok(downloaded(&path, ERA))).await;
    assert!(outcome.is_completed());
    assert_eq!(warehouse.row_count("blocks"), 2);
    assert_eq!(warehouse.row_count("execution_payloads"), 0);

    let record = warehouse
        .current_completion_of(NETWORK.as_str(), ERA)
        .expect("completion record");
    assert_eq!(record.total_records, 2);
    let datasets: Vec<String> = serde_json::from_str(&record.datasets_processed).unwrap();
    assert_eq!(datasets, vec!["blocks"]);
}

#[tokio::test]
async fn prefetch_yields_results_in_era_order() {
    let dir = temp_dir("prefetch");
    let path_a = write_era_file(&dir, ERA, &bellatrix_blocks(1));
    let start_b = *era_slot_range(ERA + 1).start();
    let path_b = write_era_file(
        &dir,
        ERA + 1,
        &[(start_b, BlockSpec::new(start_b, Fork::Bellatrix).encode())],
    );

    let fetcher = Arc::new(
        LocalFetcher::new()
            .with_file(ERA, path_a)
            .with_file(ERA + 1, path_b),
    );
    let url: Url = "http://origin.test/file.era".parse().unwrap();
    let targets = vec![(ERA, url.clone()), (ERA + 1, url)];

    let stream = prefetch_stream(fetcher, targets, 4, CancellationToken::new());
    let results: Vec<_> = stream.collect().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, ERA);
    assert_eq!(results[1].0, ERA + 1);
    assert!(results.iter().all(|(_, fetched)| fetched.is_ok()));
}
