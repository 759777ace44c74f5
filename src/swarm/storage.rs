//! Scoped Storage Substrate (C2): path-addressed key/value stores shared by
//! tools, with metadata, glob, and grep.
//!
//! Grounded in `cloudllm::tools::filesystem::FileSystemTool` (traversal-safe
//! path validation, canonicalization against a root) and
//! `cloudllm::tools::memory::Memory` (metadata-bearing key/value store with
//! a `BTreeMap` for sorted iteration). Two concrete stores —
//! [`Scratchpad`] (volatile) and [`MemoryStore`] (persistent) — implement
//! the shared [`ScopedStore`] trait.

use crate::swarm::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::Glob;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Per-entry size cap, shared by both store implementations (spec §3).
pub const MAX_ENTRY_BYTES: usize = 3_000_000;

/// Metadata describing a stored entry, without its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryInfo {
    /// `/`-separated path this entry is stored under.
    pub path: String,
    /// Display title.
    pub title: String,
    /// Content size in bytes.
    pub size: usize,
    /// Last write time.
    pub updated_at: DateTime<Utc>,
    /// Arbitrary metadata pairs.
    pub metadata: std::collections::HashMap<String, String>,
    /// Whether this is a built-in, read-only virtual entry.
    pub virtual_entry: bool,
}

/// Result of a `grep` call in `content` mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrepMatch {
    /// 1-based line number.
    pub line_number: usize,
    /// The matching line's content.
    pub content: String,
}

/// Selects what shape `grep` results take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrepMode {
    /// Return only the paths of matching entries.
    FilesWithMatches,
    /// Return per-matching-line detail.
    Content,
    /// Return per-entry occurrence counts.
    Count,
}

/// Outcome of a `grep` call, shaped per [`GrepMode`].
#[derive(Debug, Clone)]
pub enum GrepResult {
    /// Matching paths, for [`GrepMode::FilesWithMatches`].
    Paths(Vec<String>),
    /// Per-path line matches, for [`GrepMode::Content`].
    Content(Vec<(String, Vec<GrepMatch>)>),
    /// Per-path occurrence counts, for [`GrepMode::Count`].
    Count(Vec<(String, usize)>),
}

/// Shared contract implemented by [`Scratchpad`] and [`MemoryStore`].
#[async_trait]
pub trait ScopedStore: Send + Sync {
    /// Write `content` to `path`, creating or replacing the entry.
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        title: &str,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<(), StorageError>;

    /// Read the content stored at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Delete the entry at `path`.
    async fn delete(&self, path: &str) -> Result<(), StorageError>;

    /// List entries whose path starts with `prefix` (or all entries if
    /// `prefix` is `None`).
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<EntryInfo>, StorageError>;

    /// Return paths matching a `**`/`*`/`?` glob pattern, sorted
    /// most-recently-updated first.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>, StorageError>;

    /// Regex search over entry contents.
    async fn grep(
        &self,
        pattern: &str,
        case_insensitive: bool,
        mode: GrepMode,
    ) -> Result<GrepResult, StorageError>;

    /// Total bytes currently stored (excluding virtual entries).
    async fn total_size(&self) -> usize;
}

/// Normalize a path: reject empty/whitespace keys, strip a leading `/`,
/// and reject `.`/`..` segments (spec §4.2).
fn normalize_path(path: &str) -> Result<String, StorageError> {
    if path.trim().is_empty() {
        return Err(StorageError::EmptyKey);
    }
    let trimmed = path.trim_start_matches('/');
    for segment in trimmed.split('/') {
        if segment == "." || segment == ".." || segment.is_empty() {
            return Err(StorageError::InvalidPattern(format!(
                "path `{path}` contains an invalid segment"
            )));
        }
    }
    Ok(trimmed.to_string())
}

/// Convert the documented glob rules (`**` any-segments, `*` any within one
/// segment, `?` one character within a segment) into an anchored
/// `globset::Glob` matcher.
fn compile_glob(pattern: &str) -> Result<globset::GlobMatcher, StorageError> {
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| StorageError::InvalidPattern(format!("invalid glob `{pattern}`: {e}")))
}

fn compile_grep(pattern: &str, case_insensitive: bool) -> Result<Regex, StorageError> {
    let pattern = if case_insensitive {
        format!("(?i){pattern}")
    } else {
        pattern.to_string()
    };
    Regex::new(&pattern).map_err(|e| StorageError::InvalidPattern(format!("invalid regex: {e}")))
}

struct VirtualEntry {
    path: &'static str,
    title: &'static str,
    content: &'static str,
}

/// Built-in read-only entries available in every store (spec §4.2: "a
/// fixed set of built-in read-only entries, e.g. the Deep-Learning
/// Protocol skill").
const VIRTUAL_ENTRIES: &[VirtualEntry] = &[VirtualEntry {
    path: "skills/deep-learning-protocol",
    title: "Deep Learning Protocol",
    content: "A built-in skill entry describing the deep-learning collaboration protocol.",
}];

fn virtual_entry_info(entry: &VirtualEntry, now: DateTime<Utc>) -> EntryInfo {
    EntryInfo {
        path: entry.path.to_string(),
        title: entry.title.to_string(),
        size: entry.content.len(),
        updated_at: now,
        metadata: std::collections::HashMap::new(),
        virtual_entry: true,
    }
}

struct StoredEntry {
    content: Vec<u8>,
    title: String,
    updated_at: DateTime<Utc>,
    metadata: std::collections::HashMap<String, String>,
}

impl StoredEntry {
    fn info(&self, path: &str) -> EntryInfo {
        EntryInfo {
            path: path.to_string(),
            title: self.title.clone(),
            size: self.content.len(),
            updated_at: self.updated_at,
            metadata: self.metadata.clone(),
            virtual_entry: false,
        }
    }
}

/// Volatile, in-memory store. Backed by a `BTreeMap` for sorted prefix
/// iteration, matching `cloudllm::tools::memory::Memory`'s map choice.
pub struct Scratchpad {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
    total_size_limit: usize,
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::new(64 * MAX_ENTRY_BYTES)
    }
}

impl Scratchpad {
    /// Create an empty scratchpad with the given aggregate size cap.
    #[must_use]
    pub fn new(total_size_limit: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            total_size_limit,
        }
    }

    fn virtual_for(path: &str) -> Option<&'static VirtualEntry> {
        VIRTUAL_ENTRIES.iter().find(|e| e.path == path)
    }
}

#[async_trait]
impl ScopedStore for Scratchpad {
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        title: &str,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        if Self::virtual_for(&path).is_some() {
            return Err(StorageError::VirtualEntryImmutable(path));
        }
        if content.len() > MAX_ENTRY_BYTES {
            return Err(StorageError::EntryTooLarge {
                path,
                size: content.len(),
                limit: MAX_ENTRY_BYTES,
            });
        }
        let mut entries = self.entries.write().expect("scratchpad lock poisoned");
        let existing_size = entries.get(&path).map(|e| e.content.len()).unwrap_or(0);
        let current_total: usize = entries.values().map(|e| e.content.len()).sum();
        let new_total = current_total - existing_size + content.len();
        if new_total > self.total_size_limit {
            return Err(StorageError::TotalSizeExceeded {
                path,
                limit: self.total_size_limit,
            });
        }
        entries.insert(
            path,
            StoredEntry {
                content: content.to_vec(),
                title: title.to_string(),
                updated_at: Utc::now(),
                metadata,
            },
        );
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let path = normalize_path(path)?;
        if let Some(v) = Self::virtual_for(&path) {
            return Ok(v.content.as_bytes().to_vec());
        }
        let entries = self.entries.read().expect("scratchpad lock poisoned");
        entries
            .get(&path)
            .map(|e| e.content.clone())
            .ok_or(StorageError::NotFound(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        if Self::virtual_for(&path).is_some() {
            return Err(StorageError::VirtualEntryImmutable(path));
        }
        let mut entries = self.entries.write().expect("scratchpad lock poisoned");
        entries
            .remove(&path)
            .map(|_| ())
            .ok_or(StorageError::NotFound(path))
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<EntryInfo>, StorageError> {
        let now = Utc::now();
        let entries = self.entries.read().expect("scratchpad lock poisoned");
        let mut out: Vec<EntryInfo> = entries
            .iter()
            .filter(|(p, _)| prefix.map(|pre| p.starts_with(pre)).unwrap_or(true))
            .map(|(p, e)| e.info(p))
            .collect();
        out.extend(
            VIRTUAL_ENTRIES
                .iter()
                .filter(|v| prefix.map(|pre| v.path.starts_with(pre)).unwrap_or(true))
                .map(|v| virtual_entry_info(v, now)),
        );
        Ok(out)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let matcher = compile_glob(pattern)?;
        let now = Utc::now();
        let entries = self.entries.read().expect("scratchpad lock poisoned");
        let mut matches: Vec<(String, DateTime<Utc>)> = entries
            .iter()
            .filter(|(p, _)| matcher.is_match(p.as_str()))
            .map(|(p, e)| (p.clone(), e.updated_at))
            .collect();
        matches.extend(
            VIRTUAL_ENTRIES
                .iter()
                .filter(|v| matcher.is_match(v.path))
                .map(|v| (v.path.to_string(), now)),
        );
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(matches.into_iter().map(|(p, _)| p).collect())
    }

    async fn grep(
        &self,
        pattern: &str,
        case_insensitive: bool,
        mode: GrepMode,
    ) -> Result<GrepResult, StorageError> {
        let regex = compile_grep(pattern, case_insensitive)?;
        let entries = self.entries.read().expect("scratchpad lock poisoned");
        let mut sources: Vec<(String, String)> = entries
            .iter()
            .map(|(p, e)| (p.clone(), String::from_utf8_lossy(&e.content).into_owned()))
            .collect();
        sources.extend(
            VIRTUAL_ENTRIES
                .iter()
                .map(|v| (v.path.to_string(), v.content.to_string())),
        );
        Ok(grep_over(sources, &regex, mode))
    }

    async fn total_size(&self) -> usize {
        self.entries
            .read()
            .expect("scratchpad lock poisoned")
            .values()
            .map(|e| e.content.len())
            .sum()
    }
}

fn grep_over(sources: Vec<(String, String)>, regex: &Regex, mode: GrepMode) -> GrepResult {
    match mode {
        GrepMode::FilesWithMatches => {
            let paths = sources
                .into_iter()
                .filter(|(_, content)| regex.is_match(content))
                .map(|(p, _)| p)
                .collect();
            GrepResult::Paths(paths)
        }
        GrepMode::Content => {
            let results = sources
                .into_iter()
                .filter_map(|(path, content)| {
                    let matches: Vec<GrepMatch> = content
                        .lines()
                        .enumerate()
                        .filter(|(_, line)| regex.is_match(line))
                        .map(|(i, line)| GrepMatch {
                            line_number: i + 1,
                            content: line.to_string(),
                        })
                        .collect();
                    if matches.is_empty() {
                        None
                    } else {
                        Some((path, matches))
                    }
                })
                .collect();
            GrepResult::Content(results)
        }
        GrepMode::Count => {
            let counts = sources
                .into_iter()
                .filter_map(|(path, content)| {
                    let count = regex.find_iter(&content).count();
                    if count == 0 {
                        None
                    } else {
                        Some((path, count))
                    }
                })
                .collect();
            GrepResult::Count(counts)
        }
    }
}

/// Persistent, filesystem-backed store. One file per entry under `root`,
/// with a sidecar `<path>.meta.json` holding title/metadata/updated_at.
/// Path validation mirrors `FileSystemTool::validate_path`'s
/// traversal-safe canonicalization against the root.
pub struct MemoryStore {
    root: PathBuf,
    total_size_limit: usize,
    write_lock: tokio::sync::Mutex<()>,
}

#[derive(Serialize, Deserialize)]
struct Sidecar {
    title: String,
    updated_at: DateTime<Utc>,
    metadata: std::collections::HashMap<String, String>,
}

impl MemoryStore {
    /// Open (creating if necessary) a persistent store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, total_size_limit: usize) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(Self {
            root,
            total_size_limit,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn entry_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn sidecar_path(&self, path: &str) -> PathBuf {
        let mut p = self.entry_path(path).into_os_string();
        p.push(".meta.json");
        PathBuf::from(p)
    }

    /// Ensure `candidate` stays within `root` after canonicalization,
    /// resolving through the nearest existing ancestor for paths that do
    /// not exist yet (write targets).
    fn validate_within_root(&self, candidate: &Path) -> Result<(), StorageError> {
        let root_canonical = self
            .root
            .canonicalize()
            .map_err(|e| StorageError::Io(e.to_string()))?;
        let mut ancestor = candidate.to_path_buf();
        let resolved = loop {
            if ancestor.exists() {
                break ancestor
                    .canonicalize()
                    .map_err(|e| StorageError::Io(e.to_string()))?;
            }
            match ancestor.parent() {
                Some(parent) if parent != ancestor => ancestor = parent.to_path_buf(),
                _ => break candidate.to_path_buf(),
            }
        };
        if !resolved.starts_with(&root_canonical) {
            return Err(StorageError::InvalidPattern(format!(
                "path escapes storage root: {}",
                candidate.display()
            )));
        }
        Ok(())
    }

    fn read_sidecar(&self, path: &str) -> Option<Sidecar> {
        std::fs::read(self.sidecar_path(path))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    fn walk(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(read_dir) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in read_dir.flatten() {
                let p = entry.path();
                if p.is_dir() {
                    stack.push(p);
                    continue;
                }
                if let Ok(rel) = p.strip_prefix(&self.root) {
                    let rel = rel.to_string_lossy().replace('\\', "/");
                    if !rel.ends_with(".meta.json") {
                        out.push(rel);
                    }
                }
            }
        }
        out
    }
}

#[async_trait]
impl ScopedStore for MemoryStore {
    async fn write(
        &self,
        path: &str,
        content: &[u8],
        title: &str,
        metadata: std::collections::HashMap<String, String>,
    ) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        if content.len() > MAX_ENTRY_BYTES {
            return Err(StorageError::EntryTooLarge {
                path,
                size: content.len(),
                limit: MAX_ENTRY_BYTES,
            });
        }
        let entry_path = self.entry_path(&path);
        self.validate_within_root(&entry_path)?;

        let _guard = self.write_lock.lock().await;
        let existing_size = std::fs::metadata(&entry_path).map(|m| m.len() as usize).unwrap_or(0);
        let current_total: usize = self
            .walk()
            .iter()
            .filter(|p| *p != &path)
            .filter_map(|p| std::fs::metadata(self.entry_path(p)).ok())
            .map(|m| m.len() as usize)
            .sum::<usize>()
            + existing_size;
        let new_total = current_total - existing_size + content.len();
        if new_total > self.total_size_limit {
            return Err(StorageError::TotalSizeExceeded {
                path,
                limit: self.total_size_limit,
            });
        }
        if let Some(parent) = entry_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        std::fs::write(&entry_path, content).map_err(|e| StorageError::Io(e.to_string()))?;
        let sidecar = Sidecar {
            title: title.to_string(),
            updated_at: Utc::now(),
            metadata,
        };
        let bytes = serde_json::to_vec(&sidecar).expect("sidecar serialization cannot fail");
        std::fs::write(self.sidecar_path(&path), bytes).map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let path = normalize_path(path)?;
        if let Some(v) = VIRTUAL_ENTRIES.iter().find(|e| e.path == path) {
            return Ok(v.content.as_bytes().to_vec());
        }
        let entry_path = self.entry_path(&path);
        self.validate_within_root(&entry_path)?;
        std::fs::read(&entry_path).map_err(|_| StorageError::NotFound(path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        if VIRTUAL_ENTRIES.iter().any(|e| e.path == path) {
            return Err(StorageError::VirtualEntryImmutable(path));
        }
        let entry_path = self.entry_path(&path);
        self.validate_within_root(&entry_path)?;
        let _guard = self.write_lock.lock().await;
        std::fs::remove_file(&entry_path).map_err(|_| StorageError::NotFound(path.clone()))?;
        let _ = std::fs::remove_file(self.sidecar_path(&path));
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<EntryInfo>, StorageError> {
        let now = Utc::now();
        let mut out = Vec::new();
        for path in self.walk() {
            if prefix.map(|pre| path.starts_with(pre)).unwrap_or(true) {
                let size = std::fs::metadata(self.entry_path(&path)).map(|m| m.len() as usize).unwrap_or(0);
                let sidecar = self.read_sidecar(&path);
                out.push(EntryInfo {
                    path: path.clone(),
                    title: sidecar.as_ref().map(|s| s.title.clone()).unwrap_or_default(),
                    size,
                    updated_at: sidecar.map(|s| s.updated_at).unwrap_or(now),
                    metadata: std::collections::HashMap::new(),
                    virtual_entry: false,
                });
            }
        }
        out.extend(
            VIRTUAL_ENTRIES
                .iter()
                .filter(|v| prefix.map(|pre| v.path.starts_with(pre)).unwrap_or(true))
                .map(|v| virtual_entry_info(v, now)),
        );
        Ok(out)
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>, StorageError> {
        let matcher = compile_glob(pattern)?;
        let now = Utc::now();
        let mut matches: Vec<(String, DateTime<Utc>)> = self
            .walk()
            .into_iter()
            .filter(|p| matcher.is_match(p.as_str()))
            .map(|p| {
                let updated = self.read_sidecar(&p).map(|s| s.updated_at).unwrap_or(now);
                (p, updated)
            })
            .collect();
        matches.extend(
            VIRTUAL_ENTRIES
                .iter()
                .filter(|v| matcher.is_match(v.path))
                .map(|v| (v.path.to_string(), now)),
        );
        matches.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(matches.into_iter().map(|(p, _)| p).collect())
    }

    async fn grep(
        &self,
        pattern: &str,
        case_insensitive: bool,
        mode: GrepMode,
    ) -> Result<GrepResult, StorageError> {
        let regex = compile_grep(pattern, case_insensitive)?;
        let mut sources: Vec<(String, String)> = self
            .walk()
            .into_iter()
            .filter_map(|p| {
                std::fs::read(self.entry_path(&p))
                    .ok()
                    .map(|bytes| (p, String::from_utf8_lossy(&bytes).into_owned()))
            })
            .collect();
        sources.extend(
            VIRTUAL_ENTRIES
                .iter()
                .map(|v| (v.path.to_string(), v.content.to_string())),
        );
        Ok(grep_over(sources, &regex, mode))
    }

    async fn total_size(&self) -> usize {
        self.walk()
            .iter()
            .filter_map(|p| std::fs::metadata(self.entry_path(p)).ok())
            .map(|m| m.len() as usize)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn write_read_round_trip_scratchpad() {
        let store = Scratchpad::new(MAX_ENTRY_BYTES * 4);
        store
            .write("dir/a.txt", b"hello", "A", HashMap::new())
            .await
            .unwrap();
        let got = store.read("dir/a.txt").await.unwrap();
        assert_eq!(got, b"hello");
    }

    #[tokio::test]
    async fn replacement_based_size_accounting() {
        let store = Scratchpad::new(MAX_ENTRY_BYTES * 4);
        store.write("p", b"aaaa", "t", HashMap::new()).await.unwrap();
        let before = store.total_size().await;
        store.write("p", b"bb", "t", HashMap::new()).await.unwrap();
        let after = store.total_size().await;
        assert_eq!(after, before - 4 + 2);
    }

    #[tokio::test]
    async fn empty_key_rejected() {
        let store = Scratchpad::default();
        let err = store.write("   ", b"x", "t", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::EmptyKey));
    }

    #[tokio::test]
    async fn traversal_segments_rejected() {
        let store = Scratchpad::default();
        let err = store.write("../etc/passwd", b"x", "t", HashMap::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn glob_matches_and_sorts_most_recent_first() {
        let store = Scratchpad::default();
        store.write("dir/a.txt", b"1", "a", HashMap::new()).await.unwrap();
        store.write("dir/b.txt", b"2", "b", HashMap::new()).await.unwrap();
        store.write("dir/c.md", b"3", "c", HashMap::new()).await.unwrap();
        store.write("other/a.txt", b"4", "d", HashMap::new()).await.unwrap();

        let matches = store.glob("dir/*.txt").await.unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(&"dir/a.txt".to_string()));
        assert!(matches.contains(&"dir/b.txt".to_string()));

        let all_txt = store.glob("**/*.txt").await.unwrap();
        assert_eq!(all_txt.len(), 3);
    }

    #[tokio::test]
    async fn grep_modes() {
        let store = Scratchpad::default();
        store
            .write("f1", b"foo\nbar\nfoo again", "f1", HashMap::new())
            .await
            .unwrap();
        store.write("f2", b"nothing here", "f2", HashMap::new()).await.unwrap();

        match store.grep("foo", false, GrepMode::FilesWithMatches).await.unwrap() {
            GrepResult::Paths(p) => assert_eq!(p, vec!["f1".to_string()]),
            _ => panic!("wrong shape"),
        }
        match store.grep("foo", false, GrepMode::Count).await.unwrap() {
            GrepResult::Count(c) => assert_eq!(c, vec![("f1".to_string(), 2)]),
            _ => panic!("wrong shape"),
        }
    }

    #[tokio::test]
    async fn virtual_entry_cannot_be_written_or_deleted() {
        let store = Scratchpad::default();
        let err = store
            .write("skills/deep-learning-protocol", b"x", "t", HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::VirtualEntryImmutable(_)));
        let err = store.delete("skills/deep-learning-protocol").await.unwrap_err();
        assert!(matches!(err, StorageError::VirtualEntryImmutable(_)));
        assert!(store.read("skills/deep-learning-protocol").await.is_ok());
    }

    #[tokio::test]
    async fn memory_store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new(dir.path(), MAX_ENTRY_BYTES * 4).unwrap();
        store.write("notes/todo", b"ship it", "todo", HashMap::new()).await.unwrap();
        let got = store.read("notes/todo").await.unwrap();
        assert_eq!(got, b"ship it");
        let listed = store.list(Some("notes")).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
