mod cli;

use clap::Parser;
use cli::Cli;
use proxy_https_hunter::engine::Engine;
use proxy_https_hunter::input::stream_targets;
use proxy_https_hunter::output::OutputChannel;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let cfg = cli.into_config()?;

    info!(
        proxy = %cfg.proxy,
        network = %cfg.targets.network,
        ports = cfg.targets.ports.len(),
        output = %cfg.probe.output_base.display(),
        "starting scan"
    );

    let mut engine = Engine::new(&cfg)?;
    let output = match cfg.output.format {
        Some(format) => Some(OutputChannel::new(format)?),
        None => None,
    };
    if let Some(output) = &output {
        engine = engine.with_output(output.clone());
    }

    engine.run(stream_targets(&cfg.targets)).await?;

    if let Some(output) = output {
        output.shutdown().await?;
    }
    Ok(())
}
