//! MikroTik RouterOS platform definition.
//!
//! RouterOS has a flat CLI: every command is entered at the same prompt and
//! applied immediately, so there is a single `exec` level and no
//! configuration mode to enter.
//!
//! # Prompt Examples
//!
//! ```text
//! [admin@MikroTik] >                 # root menu
//! [admin@Router-Principal] /ip address>   # inside a sub-menu
//! ```
//!
//! The login name gets the `+ct511w4098` suffix: `c` disables colours, `t`
//! disables terminal auto-detection (which otherwise waits for a reply to a
//! cursor query), and `511w4098` fixes the console size.

use std::sync::Arc;

use crate::platform::{PlatformDefinition, PrivilegeLevel, VendorBehavior};

/// Platform name for MikroTik RouterOS.
pub const PLATFORM_NAME: &str = "mikrotik_routeros";

/// Create the MikroTik RouterOS platform definition.
pub fn platform() -> PlatformDefinition {
    let exec = PrivilegeLevel::new("exec", r"(?m)^\[[^\]\r\n]{1,63}\]\s?[^\r\n>]{0,63}>\s?$")
        .expect("exec prompt pattern");

    PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_failure_pattern("failure:")
        .with_failure_pattern("bad command name")
        .with_failure_pattern("syntax error")
        .with_failure_pattern("expected end of command")
        .with_failure_pattern("input does not match any value")
        .with_failure_pattern("invalid value")
        .with_verification_command("/interface vlan print")
        .with_verification_command("/ip address print")
        .with_verification_command("/ip route print")
        .with_username_suffix("+ct511w4098")
        .with_terminal_size(511, 4098)
        .with_behavior(Arc::new(RouterOsBehavior))
}

/// RouterOS-specific output handling.
pub struct RouterOsBehavior;

impl VendorBehavior for RouterOsBehavior {
    fn post_process_output(&self, output: &str) -> String {
        // RouterOS pads print output with blank lines on both ends
        output
            .lines()
            .skip_while(|line| line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    }
}
