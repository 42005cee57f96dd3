//! Warehouse access: a small trait over the storage primitives the pipeline
//! needs, its ClickHouse-over-HTTP implementation, and the batched era
//! loader.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use thiserror::Error;

use era_ingest_shared::datasets::Dataset;
use era_ingest_shared::extract::EraRows;

use crate::state::{CompletionStats, EraCompletion, COMPLETION_TABLE, COMPLETION_VIEW};

pub const DEFAULT_BATCH_SIZE: usize = 100_000;
pub const DEFAULT_INSERT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("warehouse returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("row serialization failed: {0}")]
    BadRow(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    BadResponse(String),
}

/// Storage primitives. Policy (what to clean, when to mark) lives in the
/// state manager; tests substitute an in-memory implementation.
pub trait Warehouse: Send + Sync {
    fn insert_rows(
        &self,
        table: &str,
        rows: &[serde_json::Value],
    ) -> impl Future<Output = Result<(), WarehouseError>> + Send;

    fn delete_slot_range(
        &self,
        table: &str,
        slot_start: u64,
        slot_end: u64,
    ) -> impl Future<Output = Result<(), WarehouseError>> + Send;

    fn delete_completion(
        &self,
        network: &str,
        era_number: u64,
    ) -> impl Future<Output = Result<(), WarehouseError>> + Send;

    /// Era numbers whose current completion record is `completed`.
    fn completed_eras(
        &self,
        network: &str,
    ) -> impl Future<Output = Result<Vec<u64>, WarehouseError>> + Send;

    /// The current (max `insert_version`) completion record for one era.
    fn current_completion(
        &self,
        network: &str,
        era_number: u64,
    ) -> impl Future<Output = Result<Option<EraCompletion>, WarehouseError>> + Send;

    fn completion_stats(
        &self,
        network: &str,
    ) -> impl Future<Output = Result<CompletionStats, WarehouseError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ClickhouseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub secure: bool,
    pub request_timeout: Duration,
}

impl ClickhouseConfig {
    fn endpoint(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

pub struct ClickhouseWarehouse {
    http: Client,
    config: ClickhouseConfig,
}

impl ClickhouseWarehouse {
    pub fn new(config: ClickhouseConfig) -> Result<Self, WarehouseError> {
        let http = ClientBuilder::new().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    fn request(&self, query: &str) -> reqwest::RequestBuilder {
        self.http
            .post(self.config.endpoint())
            .query(&[("database", self.config.database.as_str()), ("query", query)])
            .header("X-ClickHouse-User", &self.config.user)
            .header("X-ClickHouse-Key", &self.config.password)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, WarehouseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(WarehouseError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Runs a statement that returns no rows.
    pub async fn execute(&self, sql: &str) -> Result<(), WarehouseError> {
        tracing::trace!(sql, "warehouse execute");
        let response = self.request(sql).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Runs a SELECT and parses the `JSONEachRow` response lines.
    pub async fn select_json(&self, sql: &str) -> Result<Vec<serde_json::Value>, WarehouseError> {
        let full = format!("{sql} FORMAT JSONEachRow");
        tracing::trace!(sql = %full, "warehouse select");
        let response = self.request(&full).send().await?;
        let body = Self::check(response).await?.text().await?;
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(WarehouseError::from))
            .collect()
    }
}

impl Warehouse for ClickhouseWarehouse {
    async fn insert_rows(&self, table: &str, rows: &[serde_json::Value]) -> Result<(), WarehouseError> {
        if rows.is_empty() {
            return Ok(());
        }
        let query = format!(
            "INSERT INTO {}.{} FORMAT JSONEachRow",
            self.config.database, table
        );
        let mut body = String::new();
        for row in rows {
            body.push_str(&serde_json::to_string(row)?);
            body.push('\n');
        }
        let response = self.request(&query).body(body).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_slot_range(&self, table: &str, slot_start: u64, slot_end: u64) -> Result<(), WarehouseError> {
        self.execute(&format!(
            "DELETE FROM {}.{} WHERE slot >= {} AND slot <= {}",
            self.config.database, table, slot_start, slot_end
        ))
        .await
    }

    async fn delete_completion(&self, network: &str, era_number: u64) -> Result<(), WarehouseError> {
        self.execute(&format!(
            "DELETE FROM {}.{} WHERE network = '{}' AND era_number = {}",
            self.config.database, COMPLETION_TABLE, network, era_number
        ))
        .await
    }

    async fn completed_eras(&self, network: &str) -> Result<Vec<u64>, WarehouseError> {
        let rows = self
            .select_json(&format!(
                "SELECT era_number FROM {}.{} WHERE network = '{}' AND status = 'completed'",
                self.config.database, COMPLETION_VIEW, network
            ))
            .await?;
        rows.into_iter()
            .map(|row| {
                row.get("era_number")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| WarehouseError::BadResponse(format!("era_number missing in {row}")))
            })
            .collect()
    }

    async fn current_completion(
        &self,
        network: &str,
        era_number: u64,
    ) -> Result<Option<EraCompletion>, WarehouseError> {
        let rows = self
            .select_json(&format!(
                "SELECT * FROM {}.{} WHERE network = '{}' AND era_number = {}",
                self.config.database, COMPLETION_VIEW, network, era_number
            ))
            .await?;
        rows.into_iter()
            .next()
            .map(|row| serde_json::from_value(row).map_err(WarehouseError::from))
            .transpose()
    }

    async fn completion_stats(&self, network: &str) -> Result<CompletionStats, WarehouseError> {
        let rows = self
            .select_json(&format!(
                "SELECT countIf(status = 'completed') AS completed_count, \
                 countIf(status = 'failed') AS failed_count, \
                 maxOrNull(completed_at) AS last_completion_at \
                 FROM {}.{} WHERE network = '{}'",
                self.config.database, COMPLETION_VIEW, network
            ))
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| WarehouseError::BadResponse("empty aggregate result".to_string()))?;
        serde_json::from_value(row).map_err(WarehouseError::from)
    }
}

#[derive(Debug, Error)]
#[error("failed to load dataset {dataset}: {source}")]
pub struct LoadError {
    pub dataset: Dataset,
    #[source]
    pub source: WarehouseError,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub datasets_loaded: Vec<Dataset>,
    pub total_rows: u64,
}

/// Column-oriented batched inserts: one insert per dataset when it fits the
/// batch size, windows of `batch_size` rows otherwise.
pub struct EraLoader<'a, W> {
    warehouse: &'a W,
    batch_size: usize,
}

impl<'a, W: Warehouse> EraLoader<'a, W> {
    pub fn new(warehouse: &'a W, batch_size: usize) -> Self {
        Self {
            warehouse,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn load_era(&self, rows: &EraRows, datasets: &[Dataset]) -> Result<LoadOutcome, LoadError> {
        let mut outcome = LoadOutcome::default();
        for dataset in datasets {
            let values = rows.to_json(*dataset).map_err(|e| LoadError {
                dataset: *dataset,
                source: WarehouseError::from(e),
            })?;
            if values.is_empty() {
                continue;
            }
            for window in values.chunks(self.batch_size) {
                self.warehouse
                    .insert_rows(dataset.table_name(), window)
                    .await
                    .map_err(|source| LoadError {
                        dataset: *dataset,
                        source,
                    })?;
                tracing::debug!(
                    dataset = %dataset,
                    rows = window.len(),
                    "inserted batch"
                );
            }
            outcome.total_rows += values.len() as u64;
            outcome.datasets_loaded.push(*dataset);
        }
        Ok(outcome)
    }
}
