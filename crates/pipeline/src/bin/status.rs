use clap::Parser;

use era_ingest_pipeline::scripts;
use era_ingest_pipeline::tracing as tracing_config;
use era_ingest_pipeline::utils::read_env;
use era_ingest_shared::networks::Network;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct StatusArgs {
    #[clap(long, env = "NETWORK")]
    network: Network,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default()
            .use_format(read_env("LOG_FORMAT", tracing_config::LogFormat::Plain)),
    );

    let args = StatusArgs::parse();
    let runtime = scripts::prelude::PipelineRuntime::init_from_env(args.network)
        .expect("Failed to initialize pipeline runtime");

    let stats = scripts::status::run(&runtime).await?;
    println!(
        "network={} completed={} failed={} last_completion_at={}",
        args.network,
        stats.completed_count,
        stats.failed_count,
        stats
            .last_completion_at
            .map(|t| t.to_string())
            .unwrap_or_else(|| "never".to_string()),
    );
    Ok(())
}
