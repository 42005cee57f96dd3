#![allow(dead_code)]

use std::path::{Path, PathBuf};

use era_ingest_shared::networks::Network;
use era_ingest_shared::synthetic;

pub mod fetchers;
pub mod memory_warehouse;

pub use fetchers::{FailingFetcher, LocalFetcher};
pub use memory_warehouse::InMemoryWarehouse;

pub const NETWORK: Network = Network::Gnosis;

/// Unique per-test scratch directory under the system temp dir.
pub fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("era-ingest-test-{label}-{:08x}", rand::random::<u32>()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// Writes a synthetic era archive with the canonical filename and returns
/// its path.
pub fn write_era_file(dir: &Path, era_number: u64, blocks: &[(u64, Vec<u8>)]) -> PathBuf {
    let path = dir.join(format!("{}-{:05}-aabbccdd.era", NETWORK.as_str(), era_number));
    std::fs::write(&path, synthetic::encode_era_file(era_number, blocks)).expect("write era file");
    path
}

/// Same, but the block frames are used verbatim (e.g. corrupted ones).
pub fn write_era_file_raw(dir: &Path, era_number: u64, blocks: &[(u64, Vec<u8>)]) -> PathBuf {
    let path = dir.join(format!("{}-{:05}-aabbccdd.era", NETWORK.as_str(), era_number));
    std::fs::write(&path, synthetic::encode_era_file_raw(era_number, blocks)).expect("write era file");
    path
}
