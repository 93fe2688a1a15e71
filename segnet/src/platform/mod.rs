//! Platform definitions for the supported CLI dialects.
//!
//! A [`Dialect`] names one of the closed set of device operating systems
//! segnet can drive. Each dialect resolves to a [`PlatformDefinition`]
//! carrying its prompt patterns, privilege graph, rejection markers and
//! verification reads.

mod definition;
mod privilege_level;
pub mod vendors;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use definition::PlatformDefinition;
pub use privilege_level::PrivilegeLevel;

use crate::error::PlatformError;

/// Trait for dialect-specific output handling.
pub trait VendorBehavior: Send + Sync {
    /// Normalize command output: strip the command echo and the trailing prompt.
    fn normalize_output(&self, raw: &str, command: &str) -> String {
        let output = raw.replace('\r', "");
        let output = output.trim_start_matches('\n');
        let output = output
            .strip_prefix(command)
            .unwrap_or(output)
            .trim_start_matches('\n');

        // The last line is the prompt the read stopped at
        match memchr::memrchr(b'\n', output.as_bytes()) {
            Some(pos) => output[..pos].to_string(),
            None => String::new(),
        }
    }

    /// Dialect-specific cleanup applied after normalization.
    fn post_process_output(&self, output: &str) -> String {
        output.to_string()
    }
}

/// Default vendor behavior implementation.
pub struct DefaultBehavior;

impl VendorBehavior for DefaultBehavior {}

/// Supported CLI dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Cisco IOS / IOS-XE switches.
    CiscoIos,
    /// MikroTik RouterOS routers.
    MikrotikRouteros,
}

impl Dialect {
    /// All supported dialects.
    pub const ALL: [Dialect; 2] = [Dialect::CiscoIos, Dialect::MikrotikRouteros];

    /// Platform name as used in config files.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::CiscoIos => vendors::cisco_ios::PLATFORM_NAME,
            Dialect::MikrotikRouteros => vendors::mikrotik_routeros::PLATFORM_NAME,
        }
    }

    /// Build the platform definition for this dialect.
    pub fn definition(&self) -> PlatformDefinition {
        match self {
            Dialect::CiscoIos => vendors::cisco_ios::platform(),
            Dialect::MikrotikRouteros => vendors::mikrotik_routeros::platform(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dialect::ALL
            .into_iter()
            .find(|d| d.name() == s)
            .ok_or_else(|| PlatformError::UnknownPlatform {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_normalize_strips_echo_and_prompt() {
        let raw = "show vlan brief\r\nVLAN Name\r\n250  Ventas\r\nSwitch57#";
        let out = DefaultBehavior.normalize_output(raw, "show vlan brief");
        assert_eq!(out, "VLAN Name\n250  Ventas");
    }

    #[test]
    fn test_default_normalize_prompt_only() {
        let out = DefaultBehavior.normalize_output("vlan 250\r\nSwitch57(config-vlan)#", "vlan 250");
        assert_eq!(out, "");
    }

    #[test]
    fn test_dialect_names_round_trip() {
        for dialect in Dialect::ALL {
            assert_eq!(dialect.name().parse::<Dialect>().unwrap(), dialect);
            assert_eq!(dialect.definition().name, dialect.name());
        }
        assert!("juniper_junos".parse::<Dialect>().is_err());
    }
}
