//! Runtime construction: env vars in, wired infrastructure out. The single
//! place where clients are built; everything downstream receives handles.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Url;
use thiserror::Error;

use era_ingest_shared::networks::Network;

use crate::catalog::EraCatalog;
use crate::download::{HttpDownloader, DEFAULT_MAX_RETRIES};
use crate::env::EnvVarValue;
use crate::processor::DEFAULT_BLOCK_ERROR_TOLERANCE_PERCENT;
use crate::prometheus_metrics::Metrics;
use crate::state::StateManager;
use crate::tracing::LogFormat;
use crate::warehouse::{
    ClickhouseConfig, ClickhouseWarehouse, WarehouseError, DEFAULT_BATCH_SIZE,
    DEFAULT_INSERT_TIMEOUT,
};

const DEFAULT_PROMETHEUS_NAMESPACE: &str = "era_ingest";
const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 10;

#[derive(Debug, Error)]
pub enum Error {
    #[error("ERA_BASE_URL is required for remote processing")]
    MissingOriginUrl,

    #[error("failed to prepare download directory {path}: {source}")]
    DownloadDir {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to create warehouse client: {0}")]
    Warehouse(#[from] WarehouseError),
}

#[derive(Debug, Clone)]
pub struct EnvVars {
    pub log_format: EnvVarValue<LogFormat>,
    pub prometheus_namespace: EnvVarValue<String>,

    pub era_base_url: EnvVarValue<Option<Url>>,
    pub era_download_dir: EnvVarValue<String>,
    pub era_cleanup_after_process: EnvVarValue<bool>,
    pub era_max_retries: EnvVarValue<u32>,
    pub era_max_concurrent_downloads: EnvVarValue<usize>,
    pub era_block_error_tolerance: EnvVarValue<u8>,
    pub batch_size: EnvVarValue<usize>,

    pub clickhouse_host: EnvVarValue<String>,
    pub clickhouse_port: EnvVarValue<u16>,
    pub clickhouse_user: EnvVarValue<String>,
    pub clickhouse_password: EnvVarValue<String>,
    pub clickhouse_database: EnvVarValue<String>,
    pub clickhouse_secure: EnvVarValue<bool>,
}

impl EnvVars {
    pub fn init_from_env_or_crash() -> Self {
        Self {
            log_format: crate::env::LOG_FORMAT.default(LogFormat::Plain),
            prometheus_namespace: crate::env::PROMETHEUS_NAMESPACE
                .default(DEFAULT_PROMETHEUS_NAMESPACE.to_owned()),
            era_base_url: crate::env::ERA_BASE_URL.optional(),
            era_download_dir: crate::env::ERA_DOWNLOAD_DIR
                .default(std::env::temp_dir().join("era-ingest").display().to_string()),
            era_cleanup_after_process: crate::env::ERA_CLEANUP_AFTER_PROCESS.default(true),
            era_max_retries: crate::env::ERA_MAX_RETRIES.default(DEFAULT_MAX_RETRIES),
            era_max_concurrent_downloads: crate::env::ERA_MAX_CONCURRENT_DOWNLOADS
                .default(DEFAULT_MAX_CONCURRENT_DOWNLOADS),
            era_block_error_tolerance: crate::env::ERA_BLOCK_ERROR_TOLERANCE
                .default(DEFAULT_BLOCK_ERROR_TOLERANCE_PERCENT),
            batch_size: crate::env::BATCH_SIZE.default(DEFAULT_BATCH_SIZE),
            clickhouse_host: crate::env::CLICKHOUSE_HOST.required(),
            clickhouse_port: crate::env::CLICKHOUSE_PORT.default(8123),
            clickhouse_user: crate::env::CLICKHOUSE_USER.default("default".to_owned()),
            clickhouse_password: crate::env::CLICKHOUSE_PASSWORD.default(String::new()),
            clickhouse_database: crate::env::CLICKHOUSE_DATABASE.required(),
            clickhouse_secure: crate::env::CLICKHOUSE_SECURE.default(false),
        }
    }

    pub fn for_logging(&self, only_important: bool) -> HashMap<&'static str, String> {
        let mut result = HashMap::new();

        result.insert("era_base_url", format!("{:?}", self.era_base_url.value));
        result.insert("clickhouse_host", self.clickhouse_host.value.clone());
        result.insert("clickhouse_database", self.clickhouse_database.value.clone());

        if !only_important {
            result.insert("log_format", format!("{:?}", self.log_format.value));
            result.insert("prometheus_namespace", self.prometheus_namespace.value.clone());
            result.insert("era_download_dir", self.era_download_dir.value.clone());
            result.insert(
                "era_cleanup_after_process",
                self.era_cleanup_after_process.value.to_string(),
            );
            result.insert("era_max_retries", self.era_max_retries.value.to_string());
            result.insert(
                "era_max_concurrent_downloads",
                self.era_max_concurrent_downloads.value.to_string(),
            );
            result.insert(
                "era_block_error_tolerance",
                self.era_block_error_tolerance.value.to_string(),
            );
            result.insert("batch_size", self.batch_size.value.to_string());
            result.insert("clickhouse_port", self.clickhouse_port.value.to_string());
            result.insert("clickhouse_user", self.clickhouse_user.value.clone());
            result.insert("clickhouse_password", "<sensitive>".to_string());
            result.insert("clickhouse_secure", self.clickhouse_secure.value.to_string());
        }

        result
    }
}

pub struct RemoteInfrastructure {
    pub catalog: EraCatalog,
    pub downloader: Arc<HttpDownloader>,
}

pub struct WarehouseInfrastructure {
    pub client: Arc<ClickhouseWarehouse>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cleanup_after_process: bool,
    pub max_retries: u32,
    pub max_concurrent_downloads: usize,
    pub block_error_tolerance_percent: u8,
    pub batch_size: usize,
}

pub struct PipelineRuntime {
    pub network: Network,
    pub remote: RemoteInfrastructure,
    pub warehouse: WarehouseInfrastructure,
    pub settings: PipelineSettings,
    pub metrics: Metrics,
}

impl PipelineRuntime {
    pub fn init_from_env(network: Network) -> Result<Self, Error> {
        let env_vars = EnvVars::init_from_env_or_crash();
        Self::init(network, &env_vars)
    }

    pub fn init(network: Network, env_vars: &EnvVars) -> Result<Self, Error> {
        let metrics = Metrics::new(&env_vars.prometheus_namespace.value);

        let origin = env_vars
            .era_base_url
            .value
            .clone()
            .ok_or(Error::MissingOriginUrl)?;
        let catalog = EraCatalog::new(
            origin,
            network,
            env_vars.era_max_retries.value,
            metrics.services.discovery.clone(),
        );

        let download_dir = PathBuf::from(&env_vars.era_download_dir.value).join(network.as_str());
        let downloader = HttpDownloader::new(
            download_dir.clone(),
            env_vars.era_max_retries.value,
            metrics.services.download.clone(),
        )
        .map_err(|source| Error::DownloadDir {
            path: download_dir.display().to_string(),
            source,
        })?;

        // No service-metrics bundle here: warehouse inserts are not retried
        // and their volume shows up in the pipeline row counters instead.
        let warehouse = ClickhouseWarehouse::new(ClickhouseConfig {
            host: env_vars.clickhouse_host.value.clone(),
            port: env_vars.clickhouse_port.value,
            user: env_vars.clickhouse_user.value.clone(),
            password: env_vars.clickhouse_password.value.clone(),
            database: env_vars.clickhouse_database.value.clone(),
            secure: env_vars.clickhouse_secure.value,
            request_timeout: DEFAULT_INSERT_TIMEOUT,
        })?;

        Ok(Self {
            network,
            remote: RemoteInfrastructure {
                catalog,
                downloader: Arc::new(downloader),
            },
            warehouse: WarehouseInfrastructure {
                client: Arc::new(warehouse),
            },
            settings: PipelineSettings {
                cleanup_after_process: env_vars.era_cleanup_after_process.value,
                max_retries: env_vars.era_max_retries.value,
                max_concurrent_downloads: env_vars.era_max_concurrent_downloads.value,
                block_error_tolerance_percent: env_vars.era_block_error_tolerance.value,
                batch_size: env_vars.batch_size.value,
            },
            metrics,
        })
    }

    pub fn state_manager(&self) -> StateManager<ClickhouseWarehouse> {
        StateManager::new(Arc::clone(&self.warehouse.client), self.network)
    }
}
