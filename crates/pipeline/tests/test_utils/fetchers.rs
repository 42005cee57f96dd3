use std::collections::HashMap;
use std::path::PathBuf;

use reqwest::Url;

use era_ingest_pipeline::download::{DownloadError, DownloadedEra, EraFetcher};

/// Serves pre-built era files from disk, keyed by era number.
#[derive(Default)]
pub struct LocalFetcher {
    files: HashMap<u64, PathBuf>,
}

impl LocalFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, era_number: u64, path: PathBuf) -> Self {
        self.files.insert(era_number, path);
        self
    }
}

impl EraFetcher for LocalFetcher {
    async fn fetch(&self, era_number: u64, _url: &Url) -> Result<DownloadedEra, DownloadError> {
        let Some(path) = self.files.get(&era_number) else {
            return Err(DownloadError::RetriesExhausted {
                era_number,
                attempts: 1,
                last_error: "no local file registered".to_string(),
            });
        };
        let size_bytes = std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| DownloadError::RetriesExhausted {
                era_number,
                attempts: 1,
                last_error: e.to_string(),
            })?;
        Ok(DownloadedEra {
            era_number,
            path: path.clone(),
            size_bytes,
        })
    }
}

/// Always exhausts its retries.
pub struct FailingFetcher;

impl EraFetcher for FailingFetcher {
    async fn fetch(&self, era_number: u64, url: &Url) -> Result<DownloadedEra, DownloadError> {
        Err(DownloadError::RetriesExhausted {
            era_number,
            attempts: 3,
            last_error: format!("connection to {url} refused"),
        })
    }
}
