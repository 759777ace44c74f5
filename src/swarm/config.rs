//! Configuration data model (spec §6): a swarm is defined by `{ name, lead
//! agent id, agent definitions, optional workflow DAG }`, loaded from TOML.
//!
//! The distilled spec explicitly treats the YAML/DSL loader as an external
//! collaborator; this module only covers the CLI binary's own thin config
//! file, not a general loader framework. Grounded in `cloudllm::Agent`'s
//! builder fields, reshaped into a serde `Deserialize` model the way
//! `lanegrid-agtrace::config` loads its own provider/session settings from
//! TOML via the `toml` crate.

use crate::swarm::agent::AgentDefinition;
use crate::swarm::error::ConfigurationError;
use crate::swarm::permissions::PermissionPolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// One agent's declarative definition as it appears in a swarm config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable identifier used in delegation tool names and lookups.
    pub name: String,
    /// Human-readable description embedded into prompts.
    pub description: String,
    /// Model identifier passed to the LLM provider.
    pub model: String,
    /// Root directory this agent's filesystem tools are scoped to.
    #[serde(default = "default_directory")]
    pub directory: String,
    /// Declared tool names this agent may use.
    #[serde(default)]
    pub tools: Vec<String>,
    /// Names of agents this agent may delegate to.
    #[serde(default)]
    pub delegation_targets: Vec<String>,
    /// Permission policy applied to every tool built for this agent.
    #[serde(default)]
    pub permissions: PermissionPolicy,
    /// Per-plugin configuration, e.g. a memory tool's root directory.
    #[serde(default)]
    pub plugin_config: HashMap<String, Value>,
    /// System prompt injected on the first turn of a fresh conversation.
    #[serde(default)]
    pub system_prompt: String,
}

fn default_directory() -> String {
    ".".to_string()
}

impl AgentConfig {
    /// Convert this config entry into the runtime [`AgentDefinition`].
    #[must_use]
    pub fn into_definition(self) -> AgentDefinition {
        AgentDefinition::new(self.name, self.description, self.model)
            .with_directory(self.directory)
            .with_tools(self.tools)
            .with_permissions(self.permissions)
            .with_delegation_targets(self.delegation_targets)
            .with_system_prompt(self.system_prompt)
    }
}

/// A swarm's configuration, as loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Swarm name, embedded into lineage metadata.
    pub name: String,
    /// Name of the agent that receives the top-level prompt.
    pub lead_agent: String,
    /// Every agent declared in this swarm.
    pub agents: Vec<AgentConfig>,
    /// Soft ceiling on consecutive tool-calling turns, if overridden.
    #[serde(default)]
    pub max_turn_depth: Option<usize>,
    /// Context budget used for threshold checks, if overridden.
    #[serde(default)]
    pub context_limit: Option<usize>,
}

impl SwarmConfig {
    /// Parse a swarm configuration from a TOML string.
    pub fn from_toml(text: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigurationError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and parse a swarm configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigurationError::Invalid(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml(&text)
    }

    /// Check internal consistency: a declared lead agent, no duplicate agent
    /// names, and delegation targets that refer to declared agents.
    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.agents.is_empty() {
            return Err(ConfigurationError::Invalid("swarm config declares no agents".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(ConfigurationError::Invalid(format!("duplicate agent name `{}`", agent.name)));
            }
        }
        if !seen.contains(self.lead_agent.as_str()) {
            return Err(ConfigurationError::Invalid(format!(
                "lead agent `{}` is not among the declared agents",
                self.lead_agent
            )));
        }
        for agent in &self.agents {
            for target in &agent.delegation_targets {
                if !seen.contains(target.as_str()) {
                    return Err(ConfigurationError::Invalid(format!(
                        "agent `{}` declares delegation target `{target}`, which is not a declared agent",
                        agent.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Names of every declared agent, in declaration order.
    #[must_use]
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        name = "demo-swarm"
        lead_agent = "lead"

        [[agents]]
        name = "lead"
        description = "Lead agent"
        model = "test-model"
        tools = ["Bash", "Read"]
        delegation_targets = ["coder"]

        [[agents]]
        name = "coder"
        description = "Writes code"
        model = "test-model"
    "#;

    #[test]
    fn parses_a_well_formed_config() {
        let config = SwarmConfig::from_toml(VALID).unwrap();
        assert_eq!(config.name, "demo-swarm");
        assert_eq!(config.agent_names(), vec!["lead".to_string(), "coder".to_string()]);
    }

    #[test]
    fn unknown_lead_agent_is_rejected() {
        let text = VALID.replace("lead_agent = \"lead\"", "lead_agent = \"ghost\"");
        let err = SwarmConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn duplicate_agent_names_are_rejected() {
        let text = VALID.replace("name = \"coder\"", "name = \"lead\"");
        let err = SwarmConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn undeclared_delegation_target_is_rejected() {
        let text = VALID.replace("delegation_targets = [\"coder\"]", "delegation_targets = [\"ghost\"]");
        let err = SwarmConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid(_)));
    }

    #[test]
    fn into_definition_carries_fields_over() {
        let config = SwarmConfig::from_toml(VALID).unwrap();
        let lead = config.agents[0].clone().into_definition();
        assert_eq!(lead.name, "lead");
        assert!(lead.allows_delegation_to("coder"));
        assert_eq!(lead.tools, vec!["Bash".to_string(), "Read".to_string()]);
    }
}
