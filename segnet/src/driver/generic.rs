//! Generic driver implementation that works with any platform.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, trace};
use regex::bytes::Regex;

use super::Driver;
use super::privilege::PrivilegeManager;
use super::response::Response;
use crate::channel::{DEFAULT_SEARCH_DEPTH, PtyChannel};
use crate::error::{ChannelError, DriverError, PlatformError, Result};
use crate::platform::{DefaultBehavior, PlatformDefinition, VendorBehavior};
use crate::transport::{AuthMethod, SshConfig, SshTransport};

/// How long the shell must stay silent before a resync sends a fresh line.
const RESYNC_QUIET: Duration = Duration::from_millis(500);

/// Tracks whether the last prompt exchange ran to completion.
///
/// A read cut short (an error, or the future dropped by an outer timeout)
/// leaves the shell holding that command's late output and prompt. The next
/// exchange has to discard it first or every response lands one command
/// behind.
#[derive(Debug, Default)]
struct Exchange {
    interrupted: bool,
}

impl Exchange {
    /// Mark an exchange as started. Returns whether the previous one was
    /// interrupted.
    fn begin(&mut self) -> bool {
        std::mem::replace(&mut self.interrupted, true)
    }

    fn complete(&mut self) {
        self.interrupted = false;
    }
}

/// Level to return to after a configuration group.
///
/// Always the platform's privileged level when it has one, so a group that
/// failed inside configuration mode never becomes the new baseline.
fn restore_level(platform: &PlatformDefinition, original: Option<&str>) -> Option<String> {
    platform
        .privileged_level
        .clone()
        .or_else(|| original.map(str::to_string))
}

/// Generic driver that works with any platform definition.
///
/// Handles:
/// - SSH transport and shell channel management
/// - Command execution with prompt detection
/// - Privilege level navigation (including enable secrets)
/// - Dialect output normalization and failure pattern detection
pub struct GenericDriver {
    /// SSH configuration.
    ssh_config: SshConfig,

    /// Platform definition.
    platform: PlatformDefinition,

    /// Vendor behavior implementation.
    behavior: Arc<dyn VendorBehavior>,

    /// SSH transport (None when disconnected).
    transport: Option<SshTransport>,

    /// Interactive shell on the transport.
    channel: Option<PtyChannel>,

    /// Privilege level manager.
    privilege_manager: PrivilegeManager,

    /// Timeout for each prompt wait.
    timeout: Duration,

    /// Combined prompt pattern for all privilege levels.
    prompt_pattern: Regex,

    /// Secret for password-protected escalation (`enable`).
    enable_secret: Option<String>,

    /// Completion state of the last prompt exchange.
    exchange: Exchange,
}

impl GenericDriver {
    /// Create a new generic driver. Does not connect.
    pub fn new(
        ssh_config: SshConfig,
        platform: PlatformDefinition,
        enable_secret: Option<String>,
    ) -> Result<Self> {
        let timeout = ssh_config.timeout;
        let privilege_manager = PrivilegeManager::new(platform.privilege_levels.clone());
        let behavior = platform
            .behavior
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultBehavior));
        let prompt_pattern = Self::build_combined_pattern(&platform)?;

        Ok(Self {
            ssh_config,
            platform,
            behavior,
            transport: None,
            channel: None,
            privilege_manager,
            timeout,
            prompt_pattern,
            enable_secret,
            exchange: Exchange::default(),
        })
    }

    /// Build a combined regex pattern that matches any privilege level's prompt.
    fn build_combined_pattern(platform: &PlatformDefinition) -> Result<Regex> {
        if platform.privilege_levels.is_empty() {
            return Err(PlatformError::InvalidDefinition {
                message: format!("platform '{}' has no privilege levels", platform.name),
            }
            .into());
        }

        let combined = platform
            .privilege_levels
            .values()
            .map(|level| format!("(?:{})", level.pattern.as_str()))
            .collect::<Vec<_>>()
            .join("|");

        Ok(Regex::new(&combined).map_err(ChannelError::from)?)
    }

    /// Get the SSH configuration.
    pub fn ssh_config(&self) -> &SshConfig {
        &self.ssh_config
    }

    /// Get a reference to the platform definition.
    pub fn platform(&self) -> &PlatformDefinition {
        &self.platform
    }

    /// Get the privilege manager.
    pub fn privilege_manager(&self) -> &PrivilegeManager {
        &self.privilege_manager
    }

    /// Get the combined prompt pattern.
    pub fn prompt_pattern(&self) -> &Regex {
        &self.prompt_pattern
    }

    /// Set the prompt timeout.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Secret sent when an escalation asks for a password.
    ///
    /// Falls back to the login password, as IOS devices are often set up
    /// with the same value for both.
    fn escalation_secret(&self) -> Option<String> {
        self.enable_secret.clone().or_else(|| match &self.ssh_config.auth {
            AuthMethod::Password(password) => Some(password.clone()),
            _ => None,
        })
    }

    /// Start a prompt exchange, first resyncing if the previous one was cut
    /// short.
    async fn begin_exchange(&mut self) -> Result<()> {
        if self.exchange.begin() {
            self.resync().await?;
        }
        Ok(())
    }

    /// Throw away late output, then send an empty line and re-learn the
    /// current privilege level from the fresh prompt.
    async fn resync(&mut self) -> Result<()> {
        debug!("{}: resyncing after an interrupted command", self.ssh_config.host);
        let timeout = self.timeout;
        let channel = self.channel.as_mut().ok_or(DriverError::NotConnected)?;
        channel.drain(RESYNC_QUIET, timeout).await?;
        channel.send("").await?;

        let (_, prompt) = self.read_until_prompt().await?;
        let level = self.privilege_manager.track_prompt(&prompt);
        debug!("{}: resynced at '{}' (privilege {:?})", self.ssh_config.host, prompt, level);
        Ok(())
    }

    /// Send the commands of one configuration group.
    async fn send_each(&mut self, commands: &[&str]) -> Result<Vec<Response>> {
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            responses.push(self.send_command(cmd).await?);
        }
        Ok(responses)
    }

    /// Read until any prompt is matched. Returns (output, prompt line).
    async fn read_until_prompt(&mut self) -> Result<(String, String)> {
        let channel = self.channel.as_mut().ok_or(DriverError::NotConnected)?;

        let data = channel
            .read_until_pattern(&self.prompt_pattern, self.timeout)
            .await?;

        let output = String::from_utf8_lossy(&data).into_owned();
        let prompt = last_line(&output).to_string();
        Ok((output, prompt))
    }
}

/// Last line of some output, trimmed.
fn last_line(output: &str) -> &str {
    output.rsplit('\n').next().unwrap_or_default().trim()
}

impl Driver for GenericDriver {
    async fn open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Err(DriverError::AlreadyConnected.into());
        }

        let transport = SshTransport::connect(self.ssh_config.clone()).await?;
        let channel = transport.open_channel().await?;
        self.transport = Some(transport);
        self.channel = Some(PtyChannel::new(channel, DEFAULT_SEARCH_DEPTH));

        let (_, prompt) = self.read_until_prompt().await?;
        let level = self.privilege_manager.track_prompt(&prompt);
        debug!(
            "{}: initial prompt '{}' (privilege {:?})",
            self.ssh_config.host, prompt, level
        );

        for cmd in self.platform.on_open_commands.clone() {
            self.send_command(&cmd).await?;
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close().await {
                debug!("{}: channel close failed: {}", self.ssh_config.host, e);
            }
        }
        if let Some(transport) = self.transport.take() {
            transport.close().await?;
        }
        Ok(())
    }

    async fn send_command(&mut self, command: &str) -> Result<Response> {
        if self.channel.is_none() {
            return Err(DriverError::NotConnected.into());
        }
        self.begin_exchange().await?;

        trace!("{} <- {}", self.ssh_config.host, command);
        let start = Instant::now();
        let channel = self.channel.as_mut().ok_or(DriverError::NotConnected)?;
        channel.send(command).await?;

        let (raw_result, prompt) = self.read_until_prompt().await?;
        let elapsed = start.elapsed();
        self.exchange.complete();

        self.privilege_manager.track_prompt(&prompt);

        let normalized = self.behavior.normalize_output(&raw_result, command);
        let result = self.behavior.post_process_output(&normalized);

        Ok(Response::new(command, result, raw_result, prompt, elapsed))
    }

    async fn send_config(&mut self, commands: &[&str]) -> Result<Vec<Response>> {
        let config_level = self.platform.config_level.clone();
        let Some(level) = config_level else {
            return self.send_each(commands).await;
        };

        let restore = restore_level(&self.platform, self.privilege_manager.current_name());
        self.acquire_privilege(&level).await?;

        let sent = self.send_each(commands).await;

        if let Some(restore) = restore {
            let restored = self.acquire_privilege(&restore).await;
            match (&sent, restored) {
                (Ok(_), Err(e)) => return Err(e),
                (Err(_), Err(e)) => debug!("{}: leaving {} failed: {}", self.ssh_config.host, level, e),
                (_, Ok(())) => {}
            }
        }

        sent
    }

    async fn acquire_privilege(&mut self, target: &str) -> Result<()> {
        if self.channel.is_some() {
            self.begin_exchange().await?;
            self.exchange.complete();
        }

        let current = self
            .privilege_manager
            .current_name()
            .unwrap_or_default()
            .to_string();

        if current == target {
            return Ok(());
        }

        let path = self.privilege_manager.find_path(&current, target)?;

        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);

            let transition = self
                .privilege_manager
                .get_transition(from, to)
                .ok_or_else(|| DriverError::NoPrivilegePath {
                    from: from.clone(),
                    to: to.clone(),
                })?;

            debug!("{}: {} -> {} via '{}'", self.ssh_config.host, from, to, transition.command);

            let secret = self.escalation_secret();
            let timeout = self.timeout;
            self.exchange.begin();
            let channel = self.channel.as_mut().ok_or(DriverError::NotConnected)?;
            channel.send(&transition.command).await?;

            let prompt = match transition.auth_prompt {
                Some(auth_prompt) => {
                    // Devices without an enable password go straight to the new prompt
                    let either = Regex::new(&format!(
                        "(?:{})|(?:{})",
                        auth_prompt.as_str(),
                        self.prompt_pattern.as_str()
                    ))
                    .map_err(ChannelError::from)?;

                    let data = channel.read_until_pattern(&either, timeout).await?;
                    if auth_prompt.is_match(&data) {
                        let secret = secret.ok_or_else(|| DriverError::PrivilegeAcquisitionFailed {
                            target: to.clone(),
                        })?;
                        channel.send(&secret).await?;
                        self.read_until_prompt().await?.1
                    } else {
                        last_line(&String::from_utf8_lossy(&data)).to_string()
                    }
                }
                None => self.read_until_prompt().await?.1,
            };

            self.exchange.complete();
            let reached = self.privilege_manager.track_prompt(&prompt);
            if reached != Some(to.as_str()) {
                return Err(DriverError::PrivilegeAcquisitionFailed { target: to.clone() }.into());
            }
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    fn is_alive(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| !t.is_closed())
            && self.channel.as_ref().is_some_and(PtyChannel::is_open)
    }

    fn current_privilege(&self) -> Option<&str> {
        self.privilege_manager.current_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::platform::Dialect;

    #[test]
    fn test_exchange_interrupted_until_completed() {
        let mut exchange = Exchange::default();
        assert!(!exchange.begin());

        // dropped before the prompt came back
        assert!(exchange.begin());
        assert!(exchange.begin());

        exchange.complete();
        assert!(!exchange.begin());
    }

    #[test]
    fn test_restore_level_ignores_config_baseline() {
        let ios = Dialect::CiscoIos.definition();
        assert_eq!(
            restore_level(&ios, Some("configuration")).as_deref(),
            Some("privilege_exec")
        );
        assert_eq!(restore_level(&ios, Some("exec")).as_deref(), Some("privilege_exec"));
        assert_eq!(restore_level(&ios, None).as_deref(), Some("privilege_exec"));
    }

    #[test]
    fn test_restore_level_without_privileged_level() {
        let routeros = Dialect::MikrotikRouteros.definition();
        assert_eq!(routeros.privileged_level, None);
        assert_eq!(restore_level(&routeros, Some("exec")).as_deref(), Some("exec"));
    }

    #[tokio::test]
    async fn test_send_command_requires_connection() {
        let mut driver = crate::driver::DriverBuilder::new("10.10.14.2")
            .username("admin")
            .password("admin")
            .dialect(Dialect::CiscoIos)
            .build()
            .unwrap();
        assert!(driver.send_command("show vlan brief").await.is_err());
        assert!(!driver.exchange.interrupted);
    }

    #[test]
    fn test_last_line() {
        assert_eq!(last_line("enable\r\nSwitch57#"), "Switch57#");
        assert_eq!(last_line("Switch57> "), "Switch57>");
        assert_eq!(last_line(""), "");
    }
}
