//! Permission policy (spec §6) gating tool invocations by command/path.
//!
//! Grounded in `cloudllm::tools::bash::BashTool`'s `allowed_commands`/
//! `denied_commands` substring gate, generalized to a pair of regular
//! expression allow/deny lists checked against an operation's key argument
//! (Bash command string, Edit/Write file path) before dispatch.

use crate::swarm::error::SwarmError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Declarative allow/deny policy, one per tool per agent (or per skill,
/// which overrides the agent's for the duration it is loaded).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionPolicy {
    /// Patterns that must match for the operation to proceed. Empty means
    /// "no allow-list restriction" (deny-list still applies).
    #[serde(default)]
    pub allowed: Vec<String>,
    /// Patterns that, if matched, reject the operation outright.
    #[serde(default)]
    pub denied: Vec<String>,
}

impl PermissionPolicy {
    /// A policy with no restrictions at all.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Check `subject` (a command string or file path) against this policy.
    ///
    /// Denied patterns are checked first: any match rejects. If an
    /// allow-list is present, `subject` must match at least one entry.
    pub fn check(&self, tool: &str, subject: &str) -> Result<(), SwarmError> {
        for pattern in &self.denied {
            let re = compile(pattern)?;
            if re.is_match(subject) {
                return Err(SwarmError::PermissionDenied(format!(
                    "{tool}: `{subject}` matches denied pattern `{pattern}`"
                )));
            }
        }
        if !self.allowed.is_empty() {
            let matched = self
                .allowed
                .iter()
                .map(|p| compile(p))
                .collect::<Result<Vec<_>, _>>()?
                .iter()
                .any(|re| re.is_match(subject));
            if !matched {
                return Err(SwarmError::PermissionDenied(format!(
                    "{tool}: `{subject}` does not match any allowed pattern"
                )));
            }
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Regex, SwarmError> {
    Regex::new(pattern).map_err(|e| {
        SwarmError::Configuration(crate::swarm::error::ConfigurationError::Invalid(format!(
            "invalid permission pattern `{pattern}`: {e}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_pattern_rejects() {
        let policy = PermissionPolicy {
            allowed: vec![],
            denied: vec!["rm -rf".to_string()],
        };
        assert!(policy.check("bash", "rm -rf /").is_err());
        assert!(policy.check("bash", "ls -la").is_ok());
    }

    #[test]
    fn allow_list_restricts_to_matches() {
        let policy = PermissionPolicy {
            allowed: vec![r"^/workspace/.*".to_string()],
            denied: vec![],
        };
        assert!(policy.check("edit", "/workspace/src/main.rs").is_ok());
        assert!(policy.check("edit", "/etc/passwd").is_err());
    }

    #[test]
    fn deny_list_checked_before_allow_list() {
        let policy = PermissionPolicy {
            allowed: vec![r"^/workspace/.*".to_string()],
            denied: vec![r".*\.secret$".to_string()],
        };
        assert!(policy.check("edit", "/workspace/creds.secret").is_err());
    }
}
