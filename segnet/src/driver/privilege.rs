//! Privilege level tracking and graph-based navigation.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::error::{DriverError, Result};
use crate::platform::PrivilegeLevel;

/// Tracks the current privilege level and plans moves between levels.
///
/// Levels form an undirected graph through their `previous_priv` links;
/// moving between two levels walks the shortest path, escalating or
/// de-escalating one edge at a time.
#[derive(Debug)]
pub struct PrivilegeManager {
    /// All defined privilege levels.
    levels: IndexMap<String, PrivilegeLevel>,

    /// Adjacency list for the privilege graph.
    graph: HashMap<String, HashSet<String>>,

    /// Current privilege level name.
    current: Option<String>,
}

/// One edge of a privilege path.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    /// Command to execute for the transition.
    pub command: String,

    /// Password prompt to expect. If `Some`, a secret must be sent.
    pub auth_prompt: Option<Regex>,
}

impl PrivilegeManager {
    /// Create a manager; the current level starts at the root level.
    pub fn new(levels: IndexMap<String, PrivilegeLevel>) -> Self {
        let mut graph: HashMap<String, HashSet<String>> = HashMap::new();
        for (name, level) in &levels {
            graph.entry(name.clone()).or_default();
            if let Some(ref parent) = level.previous_priv {
                graph.entry(name.clone()).or_default().insert(parent.clone());
                graph.entry(parent.clone()).or_default().insert(name.clone());
            }
        }

        let current = levels
            .iter()
            .find(|(_, l)| l.previous_priv.is_none())
            .map(|(name, _)| name.clone());

        Self {
            levels,
            graph,
            current,
        }
    }

    /// Determine the privilege level a prompt belongs to.
    pub fn determine_from_prompt(&self, prompt: &str) -> Result<&PrivilegeLevel> {
        self.levels
            .values()
            .find(|level| level.matches(prompt))
            .ok_or_else(|| {
                DriverError::UnknownPrivilege {
                    prompt: prompt.to_string(),
                }
                .into()
            })
    }

    /// Get the current privilege level.
    pub fn current(&self) -> Option<&PrivilegeLevel> {
        self.current.as_ref().and_then(|name| self.levels.get(name))
    }

    /// Get the current privilege level name.
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Set the current privilege level by name.
    pub fn set_current(&mut self, name: &str) -> Result<()> {
        if !self.levels.contains_key(name) {
            return Err(DriverError::UnknownPrivilege {
                prompt: name.to_string(),
            }
            .into());
        }
        self.current = Some(name.to_string());
        Ok(())
    }

    /// Update the current level from a prompt; unknown prompts leave it unchanged.
    pub fn track_prompt(&mut self, prompt: &str) -> Option<&str> {
        let name = self.determine_from_prompt(prompt).ok()?.name.clone();
        self.current = Some(name);
        self.current.as_deref()
    }

    /// Find the shortest path between two levels, both ends included.
    pub fn find_path(&self, from: &str, to: &str) -> Result<Vec<String>> {
        if from == to {
            return Ok(vec![from.to_string()]);
        }

        let mut queue = VecDeque::from([from.to_string()]);
        let mut parent: HashMap<String, String> = HashMap::new();
        let mut visited = HashSet::from([from.to_string()]);

        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to.to_string()];
                let mut cursor = to;
                while let Some(prev) = parent.get(cursor) {
                    path.push(prev.clone());
                    cursor = prev;
                }
                path.reverse();
                return Ok(path);
            }

            for neighbor in self.graph.get(&node).into_iter().flatten() {
                if visited.insert(neighbor.clone()) {
                    parent.insert(neighbor.clone(), node.clone());
                    queue.push_back(neighbor.clone());
                }
            }
        }

        Err(DriverError::NoPrivilegePath {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into())
    }

    /// Get the transition between two adjacent levels.
    pub fn get_transition(&self, from: &str, to: &str) -> Option<TransitionInfo> {
        let from_level = self.levels.get(from)?;
        let to_level = self.levels.get(to)?;

        if to_level.previous_priv.as_deref() == Some(from) {
            return Some(TransitionInfo {
                command: to_level.escalate_command.clone()?,
                auth_prompt: to_level.escalate_prompt.clone(),
            });
        }

        if from_level.previous_priv.as_deref() == Some(to) {
            return Some(TransitionInfo {
                command: from_level.deescalate_command.clone()?,
                auth_prompt: None,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Dialect;

    fn cisco_manager() -> PrivilegeManager {
        PrivilegeManager::new(Dialect::CiscoIos.definition().privilege_levels)
    }

    #[test]
    fn test_starts_at_root() {
        let manager = cisco_manager();
        assert_eq!(manager.current_name(), Some("exec"));
    }

    #[test]
    fn test_determine_privilege() {
        let manager = cisco_manager();
        assert_eq!(manager.determine_from_prompt("Switch57>").unwrap().name, "exec");
        assert_eq!(
            manager.determine_from_prompt("Switch57#").unwrap().name,
            "privilege_exec"
        );
        assert_eq!(
            manager.determine_from_prompt("Switch57(config-if)#").unwrap().name,
            "configuration"
        );
        assert!(manager.determine_from_prompt("login:").is_err());
    }

    #[test]
    fn test_track_prompt() {
        let mut manager = cisco_manager();
        assert_eq!(manager.track_prompt("Switch57(config)#"), Some("configuration"));
        assert_eq!(manager.track_prompt("garbage"), None);
        assert_eq!(manager.current_name(), Some("configuration"));
    }

    #[test]
    fn test_find_path() {
        let manager = cisco_manager();

        let path = manager.find_path("exec", "configuration").unwrap();
        assert_eq!(path, vec!["exec", "privilege_exec", "configuration"]);

        let path = manager.find_path("configuration", "exec").unwrap();
        assert_eq!(path, vec!["configuration", "privilege_exec", "exec"]);

        let path = manager.find_path("exec", "exec").unwrap();
        assert_eq!(path, vec!["exec"]);
    }

    #[test]
    fn test_get_transition() {
        let manager = cisco_manager();

        let trans = manager.get_transition("exec", "privilege_exec").unwrap();
        assert_eq!(trans.command, "enable");
        assert!(trans.auth_prompt.is_some());

        let trans = manager.get_transition("configuration", "privilege_exec").unwrap();
        assert_eq!(trans.command, "end");
        assert!(trans.auth_prompt.is_none());

        assert!(manager.get_transition("exec", "configuration").is_none());
    }
}
