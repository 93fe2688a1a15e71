//! High-level driver for device interaction.
//!
//! The driver layer provides prompt-aware command execution and privilege
//! navigation on top of a raw SSH shell.

mod builder;
mod generic;
mod privilege;
pub(crate) mod response;

pub use builder::DriverBuilder;
pub use generic::GenericDriver;
pub use privilege::{PrivilegeManager, TransitionInfo};
pub use response::Response;

use std::future::Future;

use crate::error::Result;

/// Trait for device drivers.
pub trait Driver: Send {
    /// Open the connection to the device.
    fn open(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Send a command and wait for the prompt.
    fn send_command(&mut self, command: &str) -> impl Future<Output = Result<Response>> + Send;

    /// Send commands in configuration mode.
    ///
    /// This method:
    /// 1. Acquires the platform's configuration privilege level, if it has one
    /// 2. Sends all the provided commands
    /// 3. Returns to the platform's privileged level, also when a command
    ///    failed part way through
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use segnet::driver::Driver;
    ///
    /// # async fn example(driver: &mut impl Driver) -> Result<(), segnet::Error> {
    /// let responses = driver.send_config(&[
    ///     "interface e0/1",
    ///     "switchport mode access",
    ///     "switchport access vlan 250",
    ///     "no shutdown",
    /// ]).await?;
    /// # Ok(())
    /// # }
    /// ```
    fn send_config(
        &mut self,
        commands: &[&str],
    ) -> impl Future<Output = Result<Vec<Response>>> + Send;

    /// Acquire a specific privilege level.
    fn acquire_privilege(&mut self, privilege: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check if the driver is connected.
    fn is_open(&self) -> bool;

    /// Check if the underlying SSH session and shell are still alive.
    ///
    /// Returns `false` if the driver is not connected, the server sent a
    /// disconnect or EOF, or an I/O error killed the session.
    fn is_alive(&self) -> bool;

    /// Get the current privilege level name.
    fn current_privilege(&self) -> Option<&str>;
}
