//! Read-Tracker (C3): per-agent file-path → content-digest map enabling
//! read-before-write enforcement.
//!
//! A process-wide, single-mutex map grounded in the locking discipline
//! spec §5 requires of shared resources generally ("operations are O(1)
//! map access plus, for `file_read?`, a filesystem read outside the
//! lock-critical section"). Digests use `sha2`, already in the teacher's
//! dependency table for its content-addressing needs elsewhere in the
//! pack.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A 32-byte SHA-256 digest.
pub type Sha256Digest = [u8; 32];

fn digest_of(bytes: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Hash `bytes` the documented way: UTF-8 decode when valid, else hash the
/// raw bytes (spec §4.3 "UTF-8 fallback → binary").
fn digest_with_fallback(bytes: &[u8]) -> Sha256Digest {
    match std::str::from_utf8(bytes) {
        Ok(text) => digest_of(text.as_bytes()),
        Err(_) => digest_of(bytes),
    }
}

/// Process-wide `agent → {path → digest}` map.
#[derive(Default)]
pub struct ReadTracker {
    inner: Mutex<HashMap<String, HashMap<PathBuf, Sha256Digest>>>,
}

impl ReadTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `agent` read `path` and consumed `content`. Hashes the
    /// bytes the caller actually used (UTF-8 text if the bytes decode,
    /// else raw bytes).
    pub fn register_read(&self, agent: &str, path: impl AsRef<Path>, content: &[u8]) {
        let digest = digest_with_fallback(content);
        let mut inner = self.inner.lock().expect("read-tracker lock poisoned");
        inner
            .entry(agent.to_string())
            .or_default()
            .insert(path.as_ref().to_path_buf(), digest);
    }

    /// Forget a recorded read, e.g. after a write invalidates it.
    pub fn forget(&self, agent: &str, path: impl AsRef<Path>) {
        let mut inner = self.inner.lock().expect("read-tracker lock poisoned");
        if let Some(map) = inner.get_mut(agent) {
            map.remove(path.as_ref());
        }
    }

    /// Snapshot the recorded digest for `agent`/`path`, without touching
    /// the filesystem.
    fn recorded_digest(&self, agent: &str, path: &Path) -> Option<Sha256Digest> {
        let inner = self.inner.lock().expect("read-tracker lock poisoned");
        inner.get(agent).and_then(|m| m.get(path)).copied()
    }

    /// Whether `path` currently exists with content matching what was
    /// recorded for `agent`. Re-reads the file outside the lock so the
    /// mutex is never held across I/O (spec §5).
    pub fn file_read(&self, agent: &str, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let Some(recorded) = self.recorded_digest(agent, path) else {
            return false;
        };
        let Ok(bytes) = std::fs::read(path) else {
            return false;
        };
        digest_with_fallback(&bytes) == recorded
    }

    /// Export the full map verbatim, for the snapshot engine.
    #[must_use]
    pub fn export(&self) -> HashMap<String, HashMap<PathBuf, Sha256Digest>> {
        self.inner.lock().expect("read-tracker lock poisoned").clone()
    }

    /// Restore a previously exported map verbatim, replacing any existing
    /// state.
    pub fn restore(&self, state: HashMap<String, HashMap<PathBuf, Sha256Digest>>) {
        *self.inner.lock().expect("read-tracker lock poisoned") = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_read_true_immediately_after_register() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let tracker = ReadTracker::new();
        tracker.register_read("agent-a", file.path(), b"hello");
        assert!(tracker.file_read("agent-a", file.path()));
    }

    #[test]
    fn file_read_false_after_external_modification() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        let tracker = ReadTracker::new();
        tracker.register_read("agent-a", file.path(), b"hello");
        file.write_all(b" world").unwrap();
        file.flush().unwrap();
        assert!(!tracker.file_read("agent-a", file.path()));
    }

    #[test]
    fn unregistered_path_is_not_read() {
        let tracker = ReadTracker::new();
        assert!(!tracker.file_read("agent-a", "/nonexistent"));
    }

    #[test]
    fn export_restore_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let tracker = ReadTracker::new();
        tracker.register_read("agent-a", file.path(), b"hi");
        let exported = tracker.export();

        let restored = ReadTracker::new();
        restored.restore(exported);
        assert!(restored.file_read("agent-a", file.path()));
    }
}
