//! Cisco IOS platform definition.
//!
//! Used for the access switches. Privilege levels:
//! - `exec` - User EXEC mode with `>` prompt
//! - `privilege_exec` - Privileged EXEC mode with `#` prompt
//! - `configuration` - Global and sub-mode configuration, `(config*)#` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! Switch57>                          # exec mode
//! Switch57#                          # privilege_exec mode
//! Switch57(config)#                  # configuration mode
//! Switch57(config-if)#               # config sub-mode (interface)
//! Switch57(config-vlan)#             # config sub-mode (vlan)
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  enable     ┌────────────────┐  configure terminal  ┌───────────────┐
//! │ exec ├──────────────► privilege_exec ├──────────────────────► configuration │
//! │  >   │   disable   │       #        │        end           │  (config*)#   │
//! └──────┘◄────────────┴────────────────┘◄─────────────────────┴───────────────┘
//! ```

use crate::platform::{PlatformDefinition, PrivilegeLevel};

/// Platform name for Cisco IOS.
pub const PLATFORM_NAME: &str = "cisco_ios";

/// Create the Cisco IOS platform definition.
pub fn platform() -> PlatformDefinition {
    let exec = PrivilegeLevel::new("exec", r"(?mi)^[\w.\-@/:]{1,63}>\s?$")
        .expect("exec prompt pattern");

    let privilege_exec = PrivilegeLevel::new("privilege_exec", r"(?mi)^[\w.\-@/:]{1,63}#\s?$")
        .expect("privilege_exec prompt pattern")
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable")
        .with_auth(r"(?mi)^password:\s?$")
        .expect("enable password pattern")
        .with_not_contains("(conf");

    let configuration = PrivilegeLevel::new(
        "configuration",
        r"(?mi)^[\w.\-@/:]{1,63}\(conf[\w.\-@/:+]{0,63}\)#\s?$",
    )
    .expect("configuration prompt pattern")
    .with_parent("privilege_exec")
    .with_escalate("configure terminal")
    .with_deescalate("end");

    PlatformDefinition::new(PLATFORM_NAME)
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_privileged_level("privilege_exec")
        .with_config_level("configuration")
        .with_failure_pattern("Invalid input")
        .with_failure_pattern("Incomplete command")
        .with_failure_pattern("Ambiguous command")
        .with_failure_pattern("Error")
        .with_verification_command("show vlan brief")
        .with_verification_command("show interfaces trunk")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 511")
        .with_terminal_size(511, 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cisco_platform() {
        let platform = platform();
        assert_eq!(platform.name, "cisco_ios");
        assert_eq!(platform.privilege_levels.len(), 3);
        assert_eq!(platform.privileged_level.as_deref(), Some("privilege_exec"));
        assert_eq!(platform.config_level.as_deref(), Some("configuration"));
    }

    #[test]
    fn test_exec_prompt_match() {
        let platform = platform();
        let exec = platform.get_privilege("exec").unwrap();

        assert!(exec.matches("Switch57>"));
        assert!(exec.matches("sw-access.lab>"));
        assert!(!exec.matches("Switch57#"));
        assert!(!exec.matches("Switch57(config)#"));
    }

    #[test]
    fn test_privilege_exec_prompt_match() {
        let platform = platform();
        let priv_exec = platform.get_privilege("privilege_exec").unwrap();

        assert!(priv_exec.matches("Switch57#"));
        assert!(priv_exec.matches("Switch57# "));
        assert!(!priv_exec.matches("Switch57(config)#"));
        assert!(!priv_exec.matches("Switch57(config-if)#"));
        assert!(!priv_exec.matches("Switch57>"));
    }

    #[test]
    fn test_configuration_prompt_match() {
        let platform = platform();
        let config = platform.get_privilege("configuration").unwrap();

        assert!(config.matches("Switch57(config)#"));
        assert!(config.matches("Switch57(config-if)#"));
        assert!(config.matches("Switch57(config-vlan)#"));
        assert!(!config.matches("Switch57#"));
        assert!(!config.matches("Switch57>"));
    }

    #[test]
    fn test_privilege_graph() {
        let platform = platform();

        let priv_exec = platform.get_privilege("privilege_exec").unwrap();
        assert_eq!(priv_exec.previous_priv.as_deref(), Some("exec"));
        assert_eq!(priv_exec.escalate_command.as_deref(), Some("enable"));
        assert!(priv_exec.needs_auth());

        let config = platform.get_privilege("configuration").unwrap();
        assert_eq!(config.previous_priv.as_deref(), Some("privilege_exec"));
        assert_eq!(config.escalate_command.as_deref(), Some("configure terminal"));
        assert_eq!(config.deescalate_command.as_deref(), Some("end"));
    }

    #[test]
    fn test_rejection_markers_and_reads() {
        let platform = platform();
        assert!(platform.failed_when_contains.contains(&"Invalid input".to_string()));
        assert_eq!(
            platform.verification_commands,
            vec!["show vlan brief", "show interfaces trunk"]
        );
        assert!(platform.on_open_commands.contains(&"terminal length 0".to_string()));
    }
}
