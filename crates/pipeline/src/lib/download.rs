//! Era file fetching: bounded retries with exponential backoff, plus an
//! order-preserving prefetch stream ahead of the sequential processor.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::{Client, ClientBuilder, Url};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::prometheus_metrics::Service;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(300);

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Delay before retry number `attempt` (0-based): base 1s, factor 2, cap 30s.
pub fn backoff_delay(attempt: u32) -> Duration {
    BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(BACKOFF_CAP)
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("era {era_number}: download failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        era_number: u64,
        attempts: u32,
        last_error: String,
    },

    #[error("era {era_number}: download cancelled")]
    Cancelled { era_number: u64 },
}

impl DownloadError {
    pub fn era_number(&self) -> u64 {
        match self {
            Self::RetriesExhausted { era_number, .. } | Self::Cancelled { era_number } => *era_number,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloadedEra {
    pub era_number: u64,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Seam between the processor and the transport; tests substitute a local
/// file source.
pub trait EraFetcher: Send + Sync {
    fn fetch(
        &self,
        era_number: u64,
        url: &Url,
    ) -> impl Future<Output = Result<DownloadedEra, DownloadError>> + Send;
}

pub struct HttpDownloader {
    http: Client,
    download_dir: PathBuf,
    max_retries: u32,
    metrics: Service,
}

impl HttpDownloader {
    pub fn new(download_dir: PathBuf, max_retries: u32, metrics: Service) -> std::io::Result<Self> {
        std::fs::create_dir_all(&download_dir)?;
        let http = ClientBuilder::new()
            .timeout(DEFAULT_ATTEMPT_TIMEOUT)
            .build()
            .expect("Failed to create http client");
        Ok(Self {
            http,
            download_dir,
            max_retries: max_retries.max(1),
            metrics,
        })
    }

    pub fn download_dir(&self) -> &PathBuf {
        &self.download_dir
    }

    async fn attempt(&self, url: &Url, dest: &PathBuf) -> Result<u64, String> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("request to {url} failed: {e}"))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| format!("could not create {}: {e}", dest.display()))?;
        let mut size_bytes = 0u64;
        let mut response = response;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| format!("read from {url} failed: {e}"))?
        {
            size_bytes += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write to {} failed: {e}", dest.display()))?;
        }
        file.flush()
            .await
            .map_err(|e| format!("flush of {} failed: {e}", dest.display()))?;
        Ok(size_bytes)
    }
}

impl EraFetcher for HttpDownloader {
    async fn fetch(&self, era_number: u64, url: &Url) -> Result<DownloadedEra, DownloadError> {
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{era_number:05}.era"));
        let dest = self.download_dir.join(file_name);

        self.metrics.call_count.with_label_values(&["fetch"]).inc();
        let timer = self
            .metrics
            .execution_time_seconds
            .with_label_values(&["fetch"])
            .start_timer();

        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            if attempt > 0 {
                self.metrics
                    .retry_count
                    .with_label_values(&["fetch"])
                    .set(attempt as u64);
                tokio::time::sleep(backoff_delay(attempt - 1)).await;
            }
            match self.attempt(url, &dest).await {
                Ok(size_bytes) => {
                    timer.observe_duration();
                    tracing::debug!(era = era_number, size_bytes, "Downloaded era file");
                    return Ok(DownloadedEra {
                        era_number,
                        path: dest,
                        size_bytes,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        era = era_number,
                        attempt = attempt + 1,
                        max = self.max_retries,
                        "Download attempt failed: {e}"
                    );
                    last_error = e;
                }
            }
        }
        timer.observe_duration();
        Err(DownloadError::RetriesExhausted {
            era_number,
            attempts: self.max_retries,
            last_error,
        })
    }
}

/// Downloads up to `concurrency` eras ahead while yielding results in input
/// order. Fetches run as spawned tasks so they keep progressing while the
/// consumer is busy processing an earlier era. Cancellation aborts in-flight
/// fetches; queued ones surface as `Cancelled`.
pub fn prefetch_stream<F: EraFetcher + 'static>(
    fetcher: Arc<F>,
    targets: Vec<(u64, Url)>,
    concurrency: usize,
    cancel: CancellationToken,
) -> impl Stream<Item = (u64, Result<DownloadedEra, DownloadError>)> {
    futures::stream::iter(targets)
        .map(move |(era_number, url)| {
            let fetcher = Arc::clone(&fetcher);
            let cancel = cancel.clone();
            let task = tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => Err(DownloadError::Cancelled { era_number }),
                    fetched = fetcher.fetch(era_number, &url) => fetched,
                }
            });
            async move {
                let result = task
                    .await
                    .unwrap_or(Err(DownloadError::Cancelled { era_number }));
                (era_number, result)
            }
        })
        .buffered(concurrency.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
        assert_eq!(backoff_delay(5), Duration::from_secs(30));
        assert_eq!(backoff_delay(30), Duration::from_secs(30));
    }
}
