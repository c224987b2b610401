//! pulsecheck - background health checks with backoff
//!
//! Usage:
//!     pulsecheck --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use pulsecheck::config::{load_config, Config, ConfigWatcher, SharedConfig};
use pulsecheck::health::{registrations_from_config, Engine};
use pulsecheck::metrics::{MetricsCollector, StatusServer};
use pulsecheck::state::AppState;
use pulsecheck::util::init_logging;

/// Runs health checks in the background and reports their latest results.
#[derive(Parser, Debug)]
#[command(name = "pulsecheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Checks: {}", config.checks.len());
        for check in &config.checks {
            println!("    - {} {:?}", check.name, check.probe);
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        checks = config.checks.len(),
        "pulsecheck starting"
    );

    for check in &config.checks {
        info!(
            name = %check.name,
            probe = ?check.probe,
            tags = ?check.tags,
            "configured check"
        );
    }

    run(cli.config, config)
}

/// Run the engine with the given configuration.
fn run(config_path: PathBuf, config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config_path, config).await })
}

async fn run_async(config_path: PathBuf, config: Config) -> Result<()> {
    let registrations = registrations_from_config(&config);
    let server_config = config.global.server.clone();
    let shared_config = SharedConfig::new(config);
    let metrics = MetricsCollector::new();

    let engine = Engine::new(registrations, Arc::new(shared_config.clone()))
        .context("invalid check configuration")?
        .with_metrics(metrics.clone());

    let state = AppState::new(shared_config, engine.health_service(), metrics);
    let mut handles = Vec::new();

    if server_config.enabled {
        let server = StatusServer::new(
            &server_config,
            state.health().clone(),
            state.metrics().clone(),
        )
        .bind()
        .await
        .with_context(|| {
            format!(
                "failed to bind status server on {}",
                server_config.address
            )
        })?;
        handles.push(tokio::spawn(server.run(state.shutdown().clone())));
    }

    let reload_state = state.clone();
    let watcher = ConfigWatcher::new(
        config_path,
        Box::new(move |config| reload_state.apply_reload(config)),
    );
    handles.push(tokio::spawn(watcher.run(state.shutdown().clone())));

    let engine_handle = tokio::spawn(engine.start(state.shutdown().clone()));

    info!("pulsecheck is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    state.trigger_shutdown();

    if let Err(e) = engine_handle.await {
        error!(error = %e, "engine task failed");
    }
    for handle in handles {
        let _ = handle.await;
    }

    info!("pulsecheck shut down complete");
    Ok(())
}
