use clap::Parser;
use tracing_subscriber::EnvFilter;

use parastate_exporter::config::{Args, RunConfig};
use parastate_exporter::snapshot::pipeline::SnapshotPipeline;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for more output)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Parastate exporter starting");

    let args = Args::parse();
    let config = RunConfig::from_args(args, chrono::Utc::now())?;
    tracing::info!(
        chain = %config.profile.chain_name,
        para_id = config.profile.para_id,
        start = %config.window.start,
        end = %config.window.end,
        out = %config.out_root.display(),
        "Configuration resolved"
    );

    let pipeline = SnapshotPipeline::init(config).await?;
    let summary = pipeline.run().await?;

    tracing::info!(
        days = summary.days,
        hours_written = summary.hours_written,
        hours_skipped = summary.hours_skipped,
        records = summary.records,
        "Export complete"
    );
    Ok(())
}
