use anyhow::Context;
use clap::Parser;
use easypad::config::MappingStore;
use easypad::daemon::Options;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

const EXAMPLE_CONFIG: &str = include_str!("../config.example.toml");

/// Map a 12-pad MIDI controller to desktop actions
#[derive(Parser)]
#[command(name = "easypad", version, about)]
struct Cli {
    /// Path to the config file (TOML).
    #[arg(short, long, default_value = "easypad.toml")]
    config: PathBuf,

    /// Enable JSON log output.
    #[arg(long)]
    json: bool,

    /// Print notifications as JSON lines on stdout.
    #[arg(long)]
    events_json: bool,

    /// Port to connect to: index or name fragment.
    #[arg(short, long)]
    device: Option<String>,

    /// Validate config and exit.
    #[arg(long)]
    check: bool,

    /// List MIDI input ports and exit.
    #[arg(long)]
    list_devices: bool,

    /// Write an example config to --config if none exists, then exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries notifications.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("easypad=info"));

    if cli.json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if cli.list_devices {
        let names = easypad::device::enumerate()?;
        if names.is_empty() {
            println!("no MIDI inputs found");
        }
        for (i, name) in names.iter().enumerate() {
            println!("{i}: {name}");
        }
        return Ok(());
    }

    if cli.init {
        if cli.config.exists() {
            anyhow::bail!("{} already exists", cli.config.display());
        }
        std::fs::write(&cli.config, EXAMPLE_CONFIG)
            .with_context(|| format!("writing {}", cli.config.display()))?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    info!("easypad v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config
        .canonicalize()
        .unwrap_or_else(|_| cli.config.clone());
    let store = MappingStore::open(&config_path)?;

    if cli.check {
        let config = store.current();
        println!(
            "config OK: {} mappings, {} backends, slider {:?}",
            config.buttons.len(),
            config.backends.len(),
            config.slider,
        );
        return Ok(());
    }

    info!("loaded config from {}", config_path.display());

    let options = Options {
        device: cli.device,
        events_json: cli.events_json,
    };
    easypad::daemon::run(Arc::new(store), options).await?;

    Ok(())
}
