//! # segnet
//!
//! Async configuration and verification of a VLAN-segmented network over
//! SSH CLI sessions.
//!
//! For every device segnet builds an ordered plan of command steps from the
//! static network intent, applies it best-effort over a live session,
//! classifies each step as applied, rejected or session error, and keeps a
//! durable audit log of everything that happened.
//!
//! ## Layers
//!
//! - [`plan`]: pure plan builders, one per device role
//! - [`executor`]: sends one step and classifies the response
//! - [`orchestrator`]: session lifecycle and the per-device ledger
//! - [`coordinator`]: whole-run sequencing with bounded concurrency
//! - [`audit`]: append-only `[YYYY-MM-DD HH:MM:SS] event` log
//! - [`session`]: the device session traits and the SSH implementation
//! - [`driver`], [`channel`], [`transport`], [`platform`]: prompt-driven
//!   SSH CLI driving for Cisco IOS and MikroTik RouterOS
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use segnet::audit::AuditLog;
//! use segnet::config::NetworkConfig;
//! use segnet::coordinator::RunCoordinator;
//! use segnet::orchestrator::DeviceOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), segnet::Error> {
//!     let config = NetworkConfig::load("network.toml")?;
//!     let audit = Arc::new(AuditLog::open(&config.run.audit_log).await?);
//!
//!     let orchestrator = DeviceOrchestrator::new(config.connector(), config.intent().clone(), audit)
//!         .with_markers(config.marker_sets())
//!         .with_timeouts(config.timeouts.command(), config.timeouts.session());
//!     let reports = RunCoordinator::new(orchestrator)
//!         .run(config.switches(), config.routers())
//!         .await;
//!
//!     for report in &reports {
//!         println!("{report}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod executor;
pub mod model;
pub mod orchestrator;
pub mod plan;
pub mod platform;
pub mod report;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use config::NetworkConfig;
pub use coordinator::RunCoordinator;
pub use driver::{Driver, DriverBuilder, GenericDriver, Response};
pub use error::Error;
pub use executor::{CommandExecutor, ResponseClassifier};
pub use model::{CommandStep, DeviceDescriptor, DeviceRole, NetworkIntent};
pub use orchestrator::DeviceOrchestrator;
pub use platform::{Dialect, PlatformDefinition, PrivilegeLevel};
pub use report::{Classification, DeviceReport, StepOutcome};
pub use session::{DeviceSession, SessionConnector, SshConnector};
pub use transport::{AuthMethod, SshConfig};
