//! Snapshot Engine (C10): captures and restores the full state of a running
//! swarm as a single versioned JSON record.
//!
//! Grounded in `cloudllm::thought_chain::ThoughtChain`, the teacher's only
//! existing persistence-shaped module: a versioned, fully-serializable
//! record of accumulated state. That design is generalized here from a
//! single hash-chained log into the whole-swarm record spec §4.10 defines
//! (`version`, `type`, `agents`, `delegation_instances`, `scratchpad`,
//! `read_tracking`, `plugin_states`), since a swarm's restorable state
//! spans several components rather than one append-only chain.

use crate::swarm::agent::AgentContext;
use crate::swarm::error::{SwarmError, SwarmResult, StorageError};
use crate::swarm::message::Message;
use crate::swarm::read_tracker::{ReadTracker, Sha256Digest};
use crate::swarm::storage::ScopedStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Snapshot format version, fixed per spec §4.10.
pub const SNAPSHOT_VERSION: &str = "2.1.0";

/// One stored entry, captured content-and-all for round-tripping through
/// [`ScopedStore::write`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntrySnapshot {
    /// `/`-separated entry path.
    pub path: String,
    /// Display title.
    pub title: String,
    /// Raw content bytes.
    pub content: Vec<u8>,
    /// Arbitrary metadata pairs.
    pub metadata: HashMap<String, String>,
}

/// A single agent's restorable conversation state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Per-conversation mutable state (thresholds hit, compression flag,
    /// active skill, open delegations).
    pub context: AgentContext,
    /// Full message history.
    pub messages: Vec<Message>,
}

/// The full swarm-state record spec §4.10 defines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version, always [`SNAPSHOT_VERSION`] for records this crate
    /// writes.
    pub version: String,
    /// Discriminator, fixed at `"swarm_snapshot"`.
    #[serde(rename = "type")]
    pub snapshot_type: String,
    /// Swarm instance id this snapshot was captured from.
    pub swarm_id: String,
    /// Parent swarm id, for nested swarms.
    pub parent_swarm_id: Option<String>,
    /// Per-agent conversation state, keyed by agent name.
    pub agents: HashMap<String, AgentSnapshot>,
    /// `target@delegator` keys active at capture time. Informational only:
    /// a fresh [`crate::swarm::delegation::DelegationRouter`] is built for
    /// every execution, so these instances are not restored, only recorded.
    pub delegation_instances: Vec<String>,
    /// Volatile scratchpad entries (non-virtual only).
    pub scratchpad: Vec<StoreEntrySnapshot>,
    /// Read-tracker's full `agent -> {path -> digest}` map.
    pub read_tracking: HashMap<String, HashMap<PathBuf, Sha256Digest>>,
    /// Per-agent persistent memory store entries, keyed by agent name.
    pub plugin_states: HashMap<String, Vec<StoreEntrySnapshot>>,
}

async fn dump_store(store: &dyn ScopedStore) -> SwarmResult<Vec<StoreEntrySnapshot>> {
    let mut out = Vec::new();
    for info in store.list(None).await.map_err(SwarmError::Storage)? {
        if info.virtual_entry {
            continue;
        }
        let content = store.read(&info.path).await.map_err(SwarmError::Storage)?;
        out.push(StoreEntrySnapshot {
            path: info.path,
            title: info.title,
            content,
            metadata: info.metadata,
        });
    }
    Ok(out)
}

async fn restore_store(store: &dyn ScopedStore, entries: Vec<StoreEntrySnapshot>) -> SwarmResult<()> {
    for entry in entries {
        store
            .write(&entry.path, &entry.content, &entry.title, entry.metadata)
            .await
            .map_err(SwarmError::Storage)?;
    }
    Ok(())
}

impl Snapshot {
    /// Capture the current state of `agents`, `scratchpad`, `read_tracker`,
    /// and `plugin_stores` into a single record.
    pub async fn capture(
        swarm_id: impl Into<String>,
        parent_swarm_id: Option<String>,
        agents: HashMap<String, AgentSnapshot>,
        delegation_instances: Vec<String>,
        scratchpad: &dyn ScopedStore,
        read_tracker: &ReadTracker,
        plugin_stores: &HashMap<String, Arc<dyn ScopedStore>>,
    ) -> SwarmResult<Self> {
        let mut plugin_states = HashMap::new();
        for (agent_name, store) in plugin_stores {
            plugin_states.insert(agent_name.clone(), dump_store(store.as_ref()).await?);
        }
        Ok(Self {
            version: SNAPSHOT_VERSION.to_string(),
            snapshot_type: "swarm_snapshot".to_string(),
            swarm_id: swarm_id.into(),
            parent_swarm_id,
            agents,
            delegation_instances,
            scratchpad: dump_store(scratchpad).await?,
            read_tracking: read_tracker.export(),
            plugin_states,
        })
    }

    /// Restore this snapshot's scratchpad, read-tracking, and plugin state
    /// onto freshly-built stores. Per-agent conversation state
    /// (`context`/`messages`) is returned via [`Snapshot::agents`] for the
    /// caller to apply onto rebuilt [`crate::swarm::engine::AgentEngine`]
    /// instances, since those aren't owned by the snapshot itself.
    pub async fn restore(
        &self,
        scratchpad: &dyn ScopedStore,
        read_tracker: &ReadTracker,
        plugin_stores: &HashMap<String, Arc<dyn ScopedStore>>,
    ) -> SwarmResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SwarmError::Storage(StorageError::UnsupportedSnapshotVersion(self.version.clone())));
        }
        restore_store(scratchpad, self.scratchpad.clone()).await?;
        read_tracker.restore(self.read_tracking.clone());
        for (agent_name, entries) in &self.plugin_states {
            if let Some(store) = plugin_stores.get(agent_name) {
                restore_store(store.as_ref(), entries.clone()).await?;
            }
        }
        Ok(())
    }

    /// Serialize to pretty-printed JSON, the on-disk snapshot format.
    pub fn to_json(&self) -> SwarmResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SwarmError::Execution(format!("snapshot serialization: {e}")))
    }

    /// Parse a previously serialized snapshot.
    pub fn from_json(text: &str) -> SwarmResult<Self> {
        serde_json::from_str(text).map_err(|e| SwarmError::Execution(format!("snapshot parse: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::agent::AgentMetadata;
    use crate::swarm::storage::Scratchpad;

    fn meta() -> AgentMetadata {
        AgentMetadata {
            swarm_id: "s1".into(),
            parent_swarm_id: None,
            execution_id: "e1".into(),
        }
    }

    #[tokio::test]
    async fn capture_then_restore_round_trips_scratchpad_content() {
        let scratchpad = Scratchpad::default();
        scratchpad
            .write("notes/a", b"hello", "A", HashMap::new())
            .await
            .unwrap();
        let read_tracker = ReadTracker::new();
        read_tracker.register_read("lead", "/tmp/x", b"hi");
        let plugin_stores = HashMap::new();

        let mut agents = HashMap::new();
        agents.insert(
            "lead".to_string(),
            AgentSnapshot {
                context: AgentContext::new("lead", meta()),
                messages: vec![Message::user("hi")],
            },
        );

        let snapshot = Snapshot::capture("s1", None, agents, vec![], &scratchpad, &read_tracker, &plugin_stores)
            .await
            .unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);

        let json = snapshot.to_json().unwrap();
        let restored = Snapshot::from_json(&json).unwrap();

        let fresh_scratchpad = Scratchpad::default();
        let fresh_tracker = ReadTracker::new();
        restored.restore(&fresh_scratchpad, &fresh_tracker, &plugin_stores).await.unwrap();

        assert_eq!(fresh_scratchpad.read("notes/a").await.unwrap(), b"hello");
        assert!(fresh_tracker.file_read("lead", "/tmp/x"));
        assert_eq!(restored.agents["lead"].messages.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected_on_restore() {
        let scratchpad = Scratchpad::default();
        let read_tracker = ReadTracker::new();
        let plugin_stores = HashMap::new();
        let mut snapshot = Snapshot::capture("s1", None, HashMap::new(), vec![], &scratchpad, &read_tracker, &plugin_stores)
            .await
            .unwrap();
        snapshot.version = "1.0.0".to_string();

        let err = snapshot.restore(&scratchpad, &read_tracker, &plugin_stores).await.unwrap_err();
        assert!(matches!(
            err,
            SwarmError::Storage(StorageError::UnsupportedSnapshotVersion(_))
        ));
    }
}
