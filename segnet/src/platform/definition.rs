//! Platform definition for dialect-specific configuration.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::VendorBehavior;
use super::privilege_level::PrivilegeLevel;

/// Platform definition containing everything dialect-specific.
#[derive(Clone)]
pub struct PlatformDefinition {
    /// Platform name (e.g., "cisco_ios", "mikrotik_routeros").
    pub name: String,

    /// Privilege levels for this platform.
    pub privilege_levels: IndexMap<String, PrivilegeLevel>,

    /// Level to reach when the session is elevated (None if the CLI is flat).
    pub privileged_level: Option<String>,

    /// Level configuration commands are sent from (None sends them as-is).
    pub config_level: Option<String>,

    /// Substrings in a response that mark a command as rejected.
    pub failed_when_contains: Vec<String>,

    /// Read-only commands run after a plan to verify the result.
    pub verification_commands: Vec<String>,

    /// Commands to run when connection is established.
    pub on_open_commands: Vec<String>,

    /// Appended to the login name (RouterOS console options).
    pub username_suffix: Option<String>,

    /// Terminal width for PTY.
    pub terminal_width: u32,

    /// Terminal height for PTY.
    pub terminal_height: u32,

    /// Optional dialect-specific output handling.
    pub behavior: Option<Arc<dyn VendorBehavior>>,
}

impl PlatformDefinition {
    /// Create a new platform definition with minimal required fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege_levels: IndexMap::new(),
            privileged_level: None,
            config_level: None,
            failed_when_contains: vec![],
            verification_commands: vec![],
            on_open_commands: vec![],
            username_suffix: None,
            terminal_width: 511,
            terminal_height: 24,
            behavior: None,
        }
    }

    /// Add a privilege level.
    pub fn with_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_levels.insert(level.name.clone(), level);
        self
    }

    /// Set the level reached by elevating the session.
    pub fn with_privileged_level(mut self, name: impl Into<String>) -> Self {
        self.privileged_level = Some(name.into());
        self
    }

    /// Set the configuration level.
    pub fn with_config_level(mut self, name: impl Into<String>) -> Self {
        self.config_level = Some(name.into());
        self
    }

    /// Add a failure pattern.
    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    /// Add a verification read command.
    pub fn with_verification_command(mut self, command: impl Into<String>) -> Self {
        self.verification_commands.push(command.into());
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Set the login name suffix.
    pub fn with_username_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.username_suffix = Some(suffix.into());
        self
    }

    /// Set terminal dimensions.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    /// Set vendor behavior.
    pub fn with_behavior(mut self, behavior: Arc<dyn VendorBehavior>) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Get a privilege level by name.
    pub fn get_privilege(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels.get(name)
    }
}

impl fmt::Debug for PlatformDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformDefinition")
            .field("name", &self.name)
            .field("privilege_levels", &self.privilege_levels)
            .field("privileged_level", &self.privileged_level)
            .field("config_level", &self.config_level)
            .field("failed_when_contains", &self.failed_when_contains)
            .field("verification_commands", &self.verification_commands)
            .field("on_open_commands", &self.on_open_commands)
            .field("username_suffix", &self.username_suffix)
            .field("terminal_width", &self.terminal_width)
            .field("terminal_height", &self.terminal_height)
            .field(
                "behavior",
                &self.behavior.as_ref().map(|_| "<VendorBehavior>"),
            )
            .finish()
    }
}
