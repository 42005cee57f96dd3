use crate::scripts::prelude::PipelineRuntime;
use crate::state::{CompletionStats, StateError};

pub async fn run(runtime: &PipelineRuntime) -> Result<CompletionStats, StateError> {
    let stats = runtime.state_manager().status().await?;
    tracing::info!(
        network = %runtime.network,
        completed = stats.completed_count,
        failed = stats.failed_count,
        last_completion_at = ?stats.last_completion_at,
        "Completion status"
    );
    Ok(stats)
}
