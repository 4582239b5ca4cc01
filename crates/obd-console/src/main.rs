//! OBD-II Diagnostic Console - Main Entry Point

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use obd_console::commands::{self, MonitorOptions};
use obd_console::config::{ConsoleConfig, Overrides};
use obd_console::init_logging;
use obd_console::output::Output;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "obd-console")]
#[command(author, version, about = "ELM327 OBD-II diagnostic console")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, env = "OBD_CONFIG")]
    config: Option<PathBuf>,

    /// Adapter host for TCP (Wi-Fi) adapters
    #[arg(long)]
    host: Option<String>,

    /// Adapter TCP port
    #[arg(long)]
    port: Option<u16>,

    /// Serial device for USB/Bluetooth adapters
    #[arg(long, conflicts_with_all = ["host", "port"])]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long, requires = "serial")]
    baud: Option<u32>,

    /// Use the built-in simulated adapter
    #[arg(long, conflicts_with_all = ["host", "port", "serial"])]
    mock: bool,

    /// Vehicle profile name (see `profiles`)
    #[arg(short, long)]
    profile: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Verbose logging (repeat for more)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll live data until Ctrl-C
    Monitor {
        /// Stop after this many snapshots
        #[arg(short = 'n', long)]
        cycles: Option<u64>,

        /// Delay between poll cycles in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Write captured snapshots to this CSV file on exit
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Read stored trouble codes
    Codes,

    /// Clear stored trouble codes
    ClearCodes,

    /// List vehicle profiles
    Profiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    info!("=== OBD Console v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config =
        ConsoleConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let interval_ms = match &cli.command {
        Commands::Monitor { interval_ms, .. } => *interval_ms,
        _ => None,
    };
    Overrides {
        host: cli.host,
        port: cli.port,
        serial: cli.serial,
        baud_rate: cli.baud,
        mock: cli.mock,
        profile: cli.profile,
        poll_interval_ms: interval_ms,
    }
    .apply(&mut config);

    let mut out = Output::new(std::io::stdout().lock(), cli.json);

    match cli.command {
        Commands::Monitor { cycles, export, .. } => {
            let options = MonitorOptions { cycles, export };
            let captured = commands::monitor(&config, &options, &mut out).await?;
            info!("Captured {} snapshots", captured);
        }
        Commands::Codes => {
            commands::codes(&config, &mut out).await?;
        }
        Commands::ClearCodes => {
            commands::clear_codes(&config, &mut out).await?;
        }
        Commands::Profiles => {
            commands::profiles(&config, &mut out)?;
        }
    }

    Ok(())
}
