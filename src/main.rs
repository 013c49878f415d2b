use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use pulsedeck::config::{AppConfig, PanelConfig};
use pulsedeck::core::UpdateManager;
use pulsedeck_core::SourceRegistry;
use pulsedeck_sources::{detect_gpus, GpuDetectConfig, SystemPrimer};
use pulsedeck_types::{PanelId, PanelSettings};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// PulseDeck - polling and caching update engine for telemetry panels
#[derive(Parser, Debug, Clone)]
#[command(name = "pulsedeck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long = "duration", value_name = "SECONDS")]
    duration: Option<f64>,

    /// List detected GPUs and exit
    #[arg(long = "list-gpus")]
    list_gpus: bool,

    /// Layout file to load instead of the default config
    #[arg(value_name = "LAYOUT_FILE")]
    layout_file: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Level 0 (default): warn only, so "===" milestones still show
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Allow RUST_LOG to override CLI setting
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    warn!("Starting PulseDeck v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.layout_file {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };

    let gpus = Arc::new(detect_gpus(&GpuDetectConfig::from(&config.gpu)));

    if cli.list_gpus {
        print_gpus(&gpus);
        return Ok(());
    }

    let mut registry = SourceRegistry::new();
    pulsedeck_sources::register_all(&mut registry);

    let panels = if config.panels.is_empty() {
        info!("No panels configured, using defaults");
        default_panels(gpus.device_count())
    } else {
        config.panels.clone()
    };

    let (manager, delivery) = UpdateManager::new(config.engine.clone(), Arc::clone(&gpus));
    manager.add_primer(Box::new(SystemPrimer::new()));

    for panel in &panels {
        match registry.create_source(&panel.source, &panel.settings) {
            Ok(source) => {
                manager.register(panel.id.clone(), source);
            }
            Err(e) => warn!("Skipping panel {}: {:#}", panel.id, e),
        }
    }
    warn!("=== Starting engine with {} panel(s) ===", manager.panel_ids().len());

    manager.start().context("Failed to start update manager")?;

    // The current-thread runtime is the presentation context: every update
    // callback runs here
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build presentation runtime")?;

    runtime.block_on(async {
        let wait = async {
            match cli.duration {
                Some(secs) if secs.is_finite() && secs > 0.0 => {
                    tokio::time::sleep(Duration::from_secs_f64(secs)).await
                }
                _ => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                    }
                }
            }
        };

        tokio::select! {
            _ = delivery.run(print_update) => {}
            _ = wait => info!("Shutdown requested"),
        }
    });

    if !manager.stop() {
        warn!("Engine did not shut down cleanly");
    }
    Ok(())
}

fn print_update(panel_id: &PanelId, value: Option<&Value>) {
    match value {
        Some(value) => println!("{}: {}", panel_id, value),
        None => println!("{}: -", panel_id),
    }
}

fn print_gpus(gpus: &pulsedeck_core::GpuAggregator) {
    let names = gpus.gpu_names();
    println!("Detected GPUs ({}):", names.len());
    for (index, name) in names {
        let vendor = gpus
            .resolve(index)
            .map(|(vendor, local)| format!("{:?} #{}", vendor, local))
            .unwrap_or_default();
        println!("  {} - {} ({})", index, name, vendor);
    }
}

fn default_panels(gpu_count: usize) -> Vec<PanelConfig> {
    let mut panels: Vec<PanelConfig> = ["cpu", "memory", "system_temp", "fan_speed"]
        .into_iter()
        .map(|source| PanelConfig {
            id: PanelId::new(source),
            source: source.to_string(),
            settings: PanelSettings::new(),
        })
        .collect();

    panels.extend((0..gpu_count).map(|index| PanelConfig {
        id: PanelId::new(format!("gpu-{}", index)),
        source: "gpu".to_string(),
        settings: PanelSettings::new().with("gpu_index", index as u64),
    }));
    panels
}
