//! In-memory [`Warehouse`] with the same observable semantics as the
//! ClickHouse client: append-only tables, last-write-wins completion view.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use era_ingest_pipeline::state::{CompletionStats, EraCompletion, EraStatus, COMPLETION_TABLE};
use era_ingest_pipeline::warehouse::{Warehouse, WarehouseError};

#[derive(Default)]
pub struct InMemoryWarehouse {
    tables: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    fail_inserts_into: Mutex<HashSet<String>>,
    insert_calls: Mutex<Vec<(String, usize)>>,
    completed_eras_delay: Mutex<Option<Duration>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes inserts into `table` fail with a synthetic server error.
    pub fn fail_inserts_into(&self, table: &str) {
        self.fail_inserts_into.lock().unwrap().insert(table.to_string());
    }

    /// Delays the completion-set query, for timeout-fallback tests.
    pub fn delay_completed_eras(&self, delay: Duration) {
        *self.completed_eras_delay.lock().unwrap() = Some(delay);
    }

    pub fn rows(&self, table: &str) -> Vec<serde_json::Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Each `(table, row_count)` insert call, in order.
    pub fn insert_calls(&self) -> Vec<(String, usize)> {
        self.insert_calls.lock().unwrap().clone()
    }

    pub fn rows_in_slot_range(&self, slot_start: u64, slot_end: u64) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .iter()
            .filter(|(name, _)| *name != COMPLETION_TABLE)
            .flat_map(|(_, rows)| rows.iter())
            .filter(|row| {
                row.get("slot")
                    .and_then(|v| v.as_u64())
                    .is_some_and(|slot| slot >= slot_start && slot <= slot_end)
            })
            .count()
    }

    pub fn completion_records(&self) -> Vec<EraCompletion> {
        self.rows(COMPLETION_TABLE)
            .into_iter()
            .map(|row| serde_json::from_value(row).expect("completion record shape"))
            .collect()
    }

    /// The view: current record per `(network, era)` by max insert_version.
    pub fn current_completions(&self, network: &str) -> Vec<EraCompletion> {
        let mut by_era: HashMap<u64, EraCompletion> = HashMap::new();
        for record in self.completion_records() {
            if record.network != network {
                continue;
            }
            match by_era.get(&record.era_number) {
                Some(existing) if existing.insert_version >= record.insert_version => {}
                _ => {
                    by_era.insert(record.era_number, record);
                }
            }
        }
        let mut records: Vec<EraCompletion> = by_era.into_values().collect();
        records.sort_by_key(|record| record.era_number);
        records
    }

    pub fn current_completion_of(&self, network: &str, era_number: u64) -> Option<EraCompletion> {
        self.current_completions(network)
            .into_iter()
            .find(|record| record.era_number == era_number)
    }
}

impl Warehouse for InMemoryWarehouse {
    async fn insert_rows(&self, table: &str, rows: &[serde_json::Value]) -> Result<(), WarehouseError> {
        if self.fail_inserts_into.lock().unwrap().contains(table) {
            return Err(WarehouseError::Status {
                status: 500,
                body: format!("injected failure for {table}"),
            });
        }
        self.insert_calls
            .lock()
            .unwrap()
            .push((table.to_string(), rows.len()));
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_slot_range(&self, table: &str, slot_start: u64, slot_end: u64) -> Result<(), WarehouseError> {
        if let Some(rows) = self.tables.lock().unwrap().get_mut(table) {
            rows.retain(|row| {
                row.get("slot")
                    .and_then(|v| v.as_u64())
                    .is_none_or(|slot| slot < slot_start || slot > slot_end)
            });
        }
        Ok(())
    }

    async fn delete_completion(&self, network: &str, era_number: u64) -> Result<(), WarehouseError> {
        if let Some(rows) = self.tables.lock().unwrap().get_mut(COMPLETION_TABLE) {
            rows.retain(|row| {
                let same_network = row.get("network").and_then(|v| v.as_str()) == Some(network);
                let same_era = row.get("era_number").and_then(|v| v.as_u64()) == Some(era_number);
                !(same_network && same_era)
            });
        }
        Ok(())
    }

    async fn completed_eras(&self, network: &str) -> Result<Vec<u64>, WarehouseError> {
        let delay = *self.completed_eras_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self
            .current_completions(network)
            .into_iter()
            .filter(|record| record.status == EraStatus::Completed)
            .map(|record| record.era_number)
            .collect())
    }

    async fn current_completion(
        &self,
        network: &str,
        era_number: u64,
    ) -> Result<Option<EraCompletion>, WarehouseError> {
        Ok(self.current_completion_of(network, era_number))
    }

    async fn completion_stats(&self, network: &str) -> Result<CompletionStats, WarehouseError> {
        let current = self.current_completions(network);
        Ok(CompletionStats {
            completed_count: current
                .iter()
                .filter(|r| r.status == EraStatus::Completed)
                .count() as u64,
            failed_count: current.iter().filter(|r| r.status == EraStatus::Failed).count() as u64,
            last_completion_at: current.iter().filter_map(|r| r.completed_at).max(),
        })
    }
}
