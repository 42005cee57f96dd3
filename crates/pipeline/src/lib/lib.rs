pub mod catalog;
pub mod download;
pub mod env;
pub mod processor;
pub mod prometheus_metrics;
pub mod scripts;
pub mod state;
pub mod tracing;
pub mod utils;
pub mod warehouse;
