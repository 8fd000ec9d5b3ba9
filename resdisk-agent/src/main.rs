// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resdisk_sys::{
    DEFAULT_CONFIG_PATH, DeviceLocator, EventDirSink, EventSink, MultiSink, ResourceDiskHandler,
    StaticDeviceLocator, SystemRunner, TracingEventSink, VmbusDeviceLocator, load_config,
    require_tool,
};
use resdisk_types::ResourceDiskConfig;
use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

/// Activates the VM resource disk and its swap file
#[derive(Parser)]
#[command(name = "resdisk-agent")]
#[command(about = "Mount the ephemeral resource disk and provision swap", long_about = None)]
struct Cli {
    /// Agent configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Block device to use instead of vmbus discovery (e.g. `sdb`)
    #[arg(long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition, format and mount the resource disk, then enable swap
    Activate,
    /// Provision swap on the already mounted resource disk
    Swap,
    /// Report the current disk, mount and swap state as JSON
    Inspect,
    /// Check that the required system tools are installed
    Preflight,
}

#[derive(Debug, Serialize)]
struct ToolStatus {
    name: String,
    path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PreflightOutput {
    tools: Vec<ToolStatus>,
    missing: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so JSON on stdout stays parseable
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("resdisk_agent=info,resdisk_sys=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Activate => {
            require_root()?;
            tracing::info!(
                "Starting resource disk activation v{}",
                env!("CARGO_PKG_VERSION")
            );
            let handler = build_handler(config, cli.device);
            let summary = tokio::task::spawn_blocking(move || handler.run())
                .await
                .context("Resource disk activation task failed")?;
            print_json(&summary)?;
        }
        Commands::Swap => {
            require_root()?;
            let handler = build_handler(config, cli.device);
            let mount_point = handler.config().mount_point.clone();
            if !mount_point.is_dir() {
                anyhow::bail!(
                    "Mount point {} does not exist, activate the resource disk first",
                    mount_point.display()
                );
            }
            let outcome = tokio::task::spawn_blocking(move || handler.enable_swap(&mount_point))
                .await
                .context("Swap provisioning task failed")?;
            print_json(&outcome)?;
        }
        Commands::Inspect => {
            let handler = build_handler(config, cli.device);
            let report = tokio::task::spawn_blocking(move || handler.inspect())
                .await
                .context("Inspect task failed")??;
            print_json(&report)?;
        }
        Commands::Preflight => {
            let output = preflight(&config);
            if !output.missing.is_empty() {
                tracing::warn!("Missing tools: {}", output.missing.join(", "));
            }
            print_json(&output)?;
        }
    }

    Ok(())
}

fn require_root() -> Result<()> {
    if unsafe { libc::geteuid() } != 0 {
        tracing::error!("Resource disk activation must run as root");
        anyhow::bail!("Agent must run with root privileges");
    }
    Ok(())
}

fn build_handler(config: ResourceDiskConfig, device: Option<String>) -> ResourceDiskHandler {
    let locator: Arc<dyn DeviceLocator> = match device.or_else(|| config.device_override.clone()) {
        Some(name) => {
            tracing::info!("Using configured resource disk device {}", name);
            Arc::new(StaticDeviceLocator(Some(name)))
        }
        None => Arc::new(VmbusDeviceLocator::default()),
    };

    let log_sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let mut events = MultiSink::new(vec![log_sink]);
    if let Some(dir) = &config.event_dir {
        events.push(Arc::new(EventDirSink::new(dir)));
    }

    ResourceDiskHandler::new(config, Arc::new(SystemRunner), locator, Arc::new(events))
}

fn preflight(config: &ResourceDiskConfig) -> PreflightOutput {
    let mkfs = config.filesystem_type.mkfs_command();
    let names = [
        "parted",
        "sfdisk",
        "blockdev",
        "mount",
        mkfs.as_str(),
        "mkswap",
        "swapon",
        "swapoff",
        "fallocate",
        "dd",
    ];

    let tools: Vec<ToolStatus> = names
        .iter()
        .map(|name| ToolStatus {
            name: name.to_string(),
            path: require_tool(name),
        })
        .collect();
    let missing = tools
        .iter()
        .filter(|tool| tool.path.is_none())
        .map(|tool| tool.name.clone())
        .collect();

    PreflightOutput { tools, missing }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
