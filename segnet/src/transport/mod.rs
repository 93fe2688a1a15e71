//! SSH transport layer wrapping russh.
//!
//! Connection setup, authentication, host key checks and channel creation.
//! Algorithm negotiation (including the legacy set old switches need) lives
//! here and nowhere else.

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
pub use ssh::SshTransport;
