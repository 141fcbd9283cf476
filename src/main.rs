//! logship - tail log files, join multi-line events and ship them to sinks.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use logship::config::ConfigLoader;
use logship::engine::{Engine, EngineError, EngineOptions};
use logship::sink::build_sinks;

#[derive(Parser)]
#[command(
    name = "logship",
    about = "Tail log files and ship events to stdout or Redis",
    version
)]
struct Cli {
    /// Path to the JSON (or .toml) configuration file.
    config: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // stdout belongs to the stdout sink
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Fatal");
            ExitCode::FAILURE
        }
    }
}

async fn run(config_path: PathBuf) -> Result<(), EngineError> {
    let config = ConfigLoader::with_path(config_path).load()?;

    let sinks = build_sinks(&config.output).await;
    let options = EngineOptions::from(&config);
    let mut engine = Engine::new(&config.input, sinks, &options).await?;

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    engine.run(cancel).await;
    engine.shutdown();
    Ok(())
}

fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
