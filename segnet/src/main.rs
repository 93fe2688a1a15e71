//! `segnet` command line.
//!
//! ```bash
//! segnet -c network.toml check
//! segnet -c network.toml plan --device Switch57
//! segnet -c network.toml apply --concurrency 4
//! ```
//!
//! Set `RUST_LOG=debug` for command traffic.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use segnet::audit::AuditLog;
use segnet::config::NetworkConfig;
use segnet::coordinator::RunCoordinator;
use segnet::model::DeviceDescriptor;
use segnet::orchestrator::DeviceOrchestrator;
use segnet::plan::build_plan;

#[derive(Parser, Debug)]
#[command(name = "segnet", version, about = "Configure and verify a VLAN-segmented network over SSH")]
struct Cli {
    /// Network intent file
    #[arg(short, long, global = true, default_value = "network.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply the plan to every device and verify the result
    Apply {
        /// Audit log file (overrides run.audit_log)
        #[arg(long)]
        audit_log: Option<PathBuf>,

        /// Devices configured at once (overrides run.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Only configure these devices
        #[arg(long = "device")]
        devices: Vec<String>,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the commands each device would receive
    Plan {
        /// Only plan these devices
        #[arg(long = "device")]
        devices: Vec<String>,

        /// Print plans as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the intent file
    Check,
}

/// Keep only the named devices; all of them when no name is given.
fn select(devices: &[DeviceDescriptor], names: &[String]) -> Vec<DeviceDescriptor> {
    devices
        .iter()
        .filter(|d| names.is_empty() || names.contains(&d.name))
        .cloned()
        .collect()
}

fn unknown_devices(config: &NetworkConfig, names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|n| !config.devices().any(|d| &d.name == *n))
        .cloned()
        .collect()
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = NetworkConfig::load(&cli.config)?;

    match cli.command {
        Command::Check => {
            println!("{}: OK", cli.config.display());
            println!("  VLANs:    {}", config.intent().vlans.len());
            println!("  trunk:    {} allows {}", config.intent().trunk.interface, config.intent().trunk.allowed_list());
            for device in config.devices() {
                let steps = build_plan(device, config.intent()).len();
                println!("  {device} {} [{}]: {steps} steps", device.role, device.dialect);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Plan { devices, json } => {
            let unknown = unknown_devices(&config, &devices);
            if !unknown.is_empty() {
                return Err(format!("unknown device(s): {}", unknown.join(", ")).into());
            }

            let selected: Vec<_> = config
                .devices()
                .filter(|d| devices.is_empty() || devices.contains(&d.name))
                .collect();

            if json {
                let plans: Vec<_> = selected
                    .iter()
                    .map(|d| serde_json::json!({ "device": d, "steps": build_plan(d, config.intent()) }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&plans)?);
            } else {
                for device in selected {
                    println!("=== {device} ===");
                    for step in build_plan(device, config.intent()) {
                        println!("# {}", step.label());
                        for command in step.commands() {
                            println!("{command}");
                        }
                    }
                    println!();
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Apply {
            audit_log,
            concurrency,
            devices,
            json,
        } => {
            let unknown = unknown_devices(&config, &devices);
            if !unknown.is_empty() {
                return Err(format!("unknown device(s): {}", unknown.join(", ")).into());
            }

            let audit_path = audit_log.unwrap_or_else(|| config.run.audit_log.clone());
            let audit = Arc::new(AuditLog::open(&audit_path).await?);
            info!("audit log: {}", audit.path().display());

            let cancel = CancellationToken::new();
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupted, finishing the current steps");
                        cancel.cancel();
                    }
                });
            }

            let orchestrator =
                DeviceOrchestrator::new(config.connector(), config.intent().clone(), audit)
                    .with_markers(config.marker_sets())
                    .with_timeouts(config.timeouts.command(), config.timeouts.session())
                    .with_cancellation(cancel);
            let coordinator = RunCoordinator::new(orchestrator)
                .with_concurrency(concurrency.unwrap_or(config.run.concurrency));

            let switches = select(config.switches(), &devices);
            let routers = select(config.routers(), &devices);
            let reports = coordinator.run(&switches, &routers).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    println!("{report}");
                }
            }

            if reports.iter().any(|r| r.has_errors() || r.cancelled) {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
