//! Device sessions.
//!
//! The orchestration core talks to devices only through [`SessionConnector`]
//! and [`DeviceSession`]. Transport details (ciphers, key exchange, prompts)
//! stay behind these traits. [`SshConnector`] is the production
//! implementation, built on [`GenericDriver`].

use std::collections::HashMap;
use std::future::Future;

use log::debug;
use secrecy::ExposeSecret;

use crate::config::{Credentials, SshOptions, Timeouts};
use crate::driver::{Driver, DriverBuilder, GenericDriver};
use crate::error::{DriverError, Result};
use crate::model::DeviceDescriptor;
use crate::platform::Dialect;

/// An open, authenticated CLI session to one device.
pub trait DeviceSession: Send {
    /// Apply a group of configuration commands as one transaction.
    ///
    /// Returns the combined device response for the whole group.
    fn send_config(&mut self, commands: &[String]) -> impl Future<Output = Result<String>> + Send;

    /// Run one read-only command from the privileged level and return its
    /// output.
    fn send_read(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Escalate to the dialect's privileged level. No-op where none exists.
    fn elevate(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Release the session.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the underlying connection is still usable.
    fn is_alive(&self) -> bool;
}

/// Opens sessions to devices.
pub trait SessionConnector: Send + Sync {
    /// Session type produced by this connector.
    type Session: DeviceSession;

    /// Open an authenticated session to a device.
    fn open(&self, device: &DeviceDescriptor) -> impl Future<Output = Result<Self::Session>> + Send;
}

/// SSH connector: one [`GenericDriver`] per device, credentials per dialect.
#[derive(Debug)]
pub struct SshConnector {
    credentials: HashMap<Dialect, Credentials>,
    ssh: SshOptions,
    timeouts: Timeouts,
}

impl SshConnector {
    /// Create a connector.
    pub fn new(credentials: HashMap<Dialect, Credentials>, ssh: SshOptions, timeouts: Timeouts) -> Self {
        Self {
            credentials,
            ssh,
            timeouts,
        }
    }

    /// Build (without connecting) the driver for a device.
    fn driver_for(&self, device: &DeviceDescriptor) -> Result<GenericDriver> {
        let creds = self
            .credentials
            .get(&device.dialect)
            .ok_or_else(|| DriverError::InvalidConfig {
                message: format!("no credentials for dialect '{}'", device.dialect),
            })?;

        let mut builder = DriverBuilder::new(device.address.clone())
            .port(device.port)
            .username(creds.username.clone())
            .dialect(device.dialect)
            .timeout(self.timeouts.connect())
            .host_key_verification(self.ssh.host_key_verification)
            .legacy_algorithms(self.ssh.legacy_algorithms);

        if let Some(ref path) = self.ssh.known_hosts {
            builder = builder.known_hosts_path(path.clone());
        }

        let password = creds
            .password
            .as_ref()
            .map(|p| p.expose_secret().to_string());
        builder = match (&creds.private_key, password) {
            (Some(key), passphrase) => builder.private_key(key.clone(), passphrase),
            (None, Some(password)) => builder.password(password),
            (None, None) => builder,
        };

        if let Some(ref secret) = creds.secret {
            builder = builder.enable_secret(secret.expose_secret());
        }

        builder.build()
    }
}

impl SessionConnector for SshConnector {
    type Session = SshSession;

    async fn open(&self, device: &DeviceDescriptor) -> Result<SshSession> {
        let mut driver = self.driver_for(device)?;
        driver.open().await?;
        driver.set_timeout(self.timeouts.command());
        debug!(
            "{}: session open at privilege {:?}",
            device.address,
            driver.current_privilege()
        );
        Ok(SshSession { driver })
    }
}

/// A [`DeviceSession`] over an SSH shell.
pub struct SshSession {
    driver: GenericDriver,
}

impl SshSession {
    /// The underlying driver.
    pub fn driver(&self) -> &GenericDriver {
        &self.driver
    }
}

impl DeviceSession for SshSession {
    async fn send_config(&mut self, commands: &[String]) -> Result<String> {
        let commands: Vec<&str> = commands.iter().map(String::as_str).collect();
        let responses = self.driver.send_config(&commands).await?;

        Ok(responses
            .iter()
            .map(|r| r.result.trim_end())
            .filter(|r| !r.is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }

    async fn send_read(&mut self, command: &str) -> Result<String> {
        // show commands are not accepted from configuration mode
        self.elevate().await?;
        Ok(self.driver.send_command(command).await?.result)
    }

    async fn elevate(&mut self) -> Result<()> {
        match self.driver.platform().privileged_level.clone() {
            Some(level) => self.driver.acquire_privilege(&level).await,
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.driver.close().await
    }

    fn is_alive(&self) -> bool {
        self.driver.is_alive()
    }
}
