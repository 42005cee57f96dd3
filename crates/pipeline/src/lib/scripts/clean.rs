use thiserror::Error;

use crate::scripts::prelude::PipelineRuntime;
use crate::state::StateError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("era range {start}..{end} is empty")]
    EmptyRange { start: u64, end: u64 },

    #[error(transparent)]
    State(#[from] StateError),
}

/// Force-cleans every era in `[start_era, end_era)`: all dataset rows in
/// each era's slot range plus its completion record.
pub async fn run(runtime: &PipelineRuntime, start_era: u64, end_era: u64) -> Result<u64, Error> {
    if end_era <= start_era {
        return Err(Error::EmptyRange {
            start: start_era,
            end: end_era,
        });
    }
    let state = runtime.state_manager();
    for era_number in start_era..end_era {
        state.clean_slot_range(era_number).await?;
    }
    let cleaned = end_era - start_era;
    tracing::info!(network = %runtime.network, start_era, end_era, cleaned, "Cleaned era range");
    Ok(cleaned)
}
