use clap::Parser;

use era_ingest_pipeline::scripts;
use era_ingest_pipeline::tracing as tracing_config;
use era_ingest_pipeline::utils::read_env;
use era_ingest_shared::networks::Network;

// cargo run --bin clean -- --network gnosis --start-era 1082 --end-era 1083

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct CleanArgs {
    #[clap(long, env = "NETWORK")]
    network: Network,
    #[clap(long)]
    start_era: u64,
    /// Exclusive.
    #[clap(long)]
    end_era: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_config::setup_logger(
        tracing_config::LoggingConfig::default()
            .use_format(read_env("LOG_FORMAT", tracing_config::LogFormat::Plain)),
    );

    let args = CleanArgs::parse();
    let runtime = scripts::prelude::PipelineRuntime::init_from_env(args.network)
        .expect("Failed to initialize pipeline runtime");

    let cleaned = scripts::clean::run(&runtime, args.start_era, args.end_era).await?;
    tracing::info!(cleaned, "Clean finished");
    Ok(())
}
