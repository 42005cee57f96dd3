use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use era_ingest_pipeline::scripts;
use era_ingest_pipeline::tracing as tracing_config;
use era_ingest_pipeline::utils::read_env;
use era_ingest_shared::datasets::Dataset;
use era_ingest_shared::networks::Network;

// cargo run --bin process --release -- --network gnosis --start-era 1082 --end-era 1083

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct ProcessArgs {
    #[clap(long, env = "NETWORK")]
    network: Network,
    #[clap(long)]
    start_era: u64,
    /// Exclusive; omit for an open-ended range.
    #[clap(long, required = false)]
    end_era: Option<u64>,
    /// Comma-separated dataset names; omit for all datasets.
    #[clap(long, required = false, value_delimiter = ',')]
    datasets: Vec<Dataset>,
    #[clap(long, required = false, default_value = "false")]
    force: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default()
            .with_thread_names(true)
            .use_format(read_env("LOG_FORMAT", tracing_config::LogFormat::Plain)),
    );

    let args = ProcessArgs::parse();
    tracing::debug!("Args: {:?}", args);

    let runtime = scripts::prelude::PipelineRuntime::init_from_env(args.network)
        .expect("Failed to initialize pipeline runtime");

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing the current era");
            signal_token.cancel();
        }
    });

    let flags = scripts::process::Flags {
        start_era: args.start_era,
        end_era: args.end_era,
        datasets: args.datasets,
        force: args.force,
    };

    let summary = scripts::process::run(&runtime, &flags, cancel).await?;
    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        total_records = summary.total_records,
        "Done"
    );
    if summary.failed > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
