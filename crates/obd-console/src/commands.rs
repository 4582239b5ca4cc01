//! Console subcommands

use crate::config::ConsoleConfig;
use crate::output::Output;
use anyhow::{bail, Context, Result};
use obd_protocol::{ObdClient, TroubleCode};
use obd_scheduler::{event_channel, EventReceiver, LinkController, LinkEvent, PollConfig};
use snapshot_log::SnapshotLog;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    /// Stop after this many snapshots
    pub cycles: Option<u64>,
    /// Write the captured snapshots as CSV on exit
    pub export: Option<PathBuf>,
}

fn controller(config: &ConsoleConfig, poll: PollConfig) -> Result<(LinkController, EventReceiver)> {
    let profile = config.resolve_profile()?;
    if let Some(profile) = &profile {
        info!("Using vehicle profile {}", profile.name);
    }
    let client = Arc::new(ObdClient::new(config.link.clone(), profile));
    let (tx, rx) = event_channel();
    Ok((LinkController::from_client(client, poll, tx), rx))
}

/// Connect and echo the status event
async fn connect<W: Write>(
    controller: &LinkController,
    events: &mut EventReceiver,
    out: &mut Output<W>,
) -> Result<()> {
    let connected = controller.connect().await;
    while let Ok(event) = events.try_recv() {
        out.event(&event)?;
    }
    connected.with_context(|| {
        format!("Failed to connect to {}", controller.client().config().transport)
    })
}

/// Poll until interrupted or `cycles` snapshots were captured
pub async fn monitor<W: Write>(
    config: &ConsoleConfig,
    options: &MonitorOptions,
    out: &mut Output<W>,
) -> Result<u64> {
    let poll = PollConfig {
        max_cycles: options.cycles,
        ..PollConfig::from(&config.link)
    };
    let (controller, mut events) = controller(config, poll)?;
    let log = SnapshotLog::with_retention(config.retention);

    connect(&controller, &mut events, out).await?;
    if !controller.start_polling().await {
        bail!("Link is not ready for polling");
    }

    let mut captured = 0u64;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                out.event(&event)?;
                match event {
                    LinkEvent::SnapshotProduced(snapshot) => {
                        log.insert(snapshot)?;
                        captured += 1;
                        if options.cycles.is_some_and(|max| captured >= max) {
                            break;
                        }
                    }
                    LinkEvent::ConnectionStatusChanged { success: false, .. } => break,
                    _ => {}
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping monitor");
                break;
            }
        }
    }

    controller.disconnect().await;

    if let Some(path) = &options.export {
        let rows = log
            .export_csv(path)
            .with_context(|| format!("Failed to export snapshots to {}", path.display()))?;
        out.message(&format!("Exported {} snapshots to {}", rows, path.display()))?;
    }

    Ok(captured)
}

pub async fn codes<W: Write>(
    config: &ConsoleConfig,
    out: &mut Output<W>,
) -> Result<Vec<TroubleCode>> {
    let (controller, mut events) = controller(config, PollConfig::from(&config.link))?;
    connect(&controller, &mut events, out).await?;

    let codes = controller.read_trouble_codes().await;
    controller.disconnect().await;
    let codes = codes.context("Failed to read trouble codes")?;

    out.trouble_codes(&codes)?;
    Ok(codes)
}

pub async fn clear_codes<W: Write>(config: &ConsoleConfig, out: &mut Output<W>) -> Result<()> {
    let (controller, mut events) = controller(config, PollConfig::from(&config.link))?;
    connect(&controller, &mut events, out).await?;

    let cleared = controller.clear_trouble_codes().await;
    controller.disconnect().await;
    cleared.context("Failed to clear trouble codes")?;

    out.message("Trouble codes cleared")?;
    Ok(())
}

pub fn profiles<W: Write>(config: &ConsoleConfig, out: &mut Output<W>) -> Result<()> {
    out.profiles(&config.all_profiles())?;
    Ok(())
}
