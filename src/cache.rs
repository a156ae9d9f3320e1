//! Response cache for dependency snapshots.
//!
//! Entries are keyed by a BLAKE3 digest of `owner/repo#number` and expire a
//! fixed time after they are written. Every entry lives in memory for the
//! life of the process and, when a cache directory is configured, also as
//! one JSON file per key so later invocations can reuse it.
//!
//! The cache is an optimisation only: write failures are logged and
//! swallowed, unreadable entries are deleted and treated as misses, and
//! the whole directory can be removed at any time.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::issue::{DependencySnapshot, IssueRef};

/// Lifetime of every cache entry.
pub const DEFAULT_TTL_MINUTES: i64 = 5;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    data: DependencySnapshot,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Read-through cache consulted by the fetcher before any network call.
pub struct ResponseCache {
    dir: Option<PathBuf>,
    ttl: Duration,
    memory: RwLock<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    /// Cache that keeps entries for this process only.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            memory: RwLock::new(HashMap::new()),
        }
    }

    /// Cache that also persists entries under `dir`.
    /// The directory is created lazily on first write.
    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            ..Self::in_memory()
        }
    }

    /// Hex-encoded 256-bit key for an issue.
    pub fn key(issue: &IssueRef) -> String {
        let material = format!("{}/{}#{}", issue.owner, issue.repo, issue.number);
        blake3::hash(material.as_bytes()).to_hex().to_string()
    }

    /// Look up a live snapshot. Expired or corrupt entries are deleted and
    /// reported as a miss.
    pub fn get(&self, issue: &IssueRef) -> Option<DependencySnapshot> {
        let key = Self::key(issue);
        let now = Utc::now();

        let in_memory = self
            .memory
            .read()
            .ok()
            .and_then(|memory| memory.get(&key).cloned());
        if let Some(entry) = in_memory {
            if !entry.is_expired(now) {
                debug!(issue = %issue, "cache hit (memory)");
                return Some(entry.data);
            }
            debug!(issue = %issue, "cache entry expired");
            self.remove(&key);
            return None;
        }

        let path = self.entry_path(&key)?;
        let entry = match read_entry(&path) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!(issue = %issue, "cache miss");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "discarding unreadable cache entry");
                self.remove(&key);
                return None;
            }
        };

        if entry.is_expired(now) {
            debug!(issue = %issue, "cache entry expired");
            self.remove(&key);
            return None;
        }

        debug!(issue = %issue, "cache hit (disk)");
        if let Ok(mut memory) = self.memory.write() {
            memory.insert(key, entry.clone());
        }
        Some(entry.data)
    }

    /// Store a snapshot with the default lifetime.
    pub fn put(&self, issue: &IssueRef, snapshot: &DependencySnapshot) {
        self.put_with_ttl(issue, snapshot, self.ttl);
    }

    /// Store a snapshot that expires `ttl` from now. Never fails.
    pub fn put_with_ttl(&self, issue: &IssueRef, snapshot: &DependencySnapshot, ttl: Duration) {
        let key = Self::key(issue);
        let entry = CacheEntry {
            data: snapshot.clone(),
            expires_at: Utc::now() + ttl,
        };

        if let Some(path) = self.entry_path(&key) {
            if let Err(err) = write_entry(&path, &entry) {
                warn!(
                    issue = %issue,
                    path = %path.display(),
                    error = %err,
                    "failed to persist cache entry"
                );
            }
        }

        if let Ok(mut memory) = self.memory.write() {
            memory.insert(key, entry);
        }
        debug!(issue = %issue, "cached snapshot");
    }

    /// Drop any entry for `issue`.
    pub fn invalidate(&self, issue: &IssueRef) {
        self.remove(&Self::key(issue));
        debug!(issue = %issue, "cache entry invalidated");
    }

    /// Delete expired and unreadable entries. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize, AppError> {
        let now = Utc::now();
        let mut removed = 0;

        if let Ok(mut memory) = self.memory.write() {
            let before = memory.len();
            memory.retain(|_, entry| !entry.is_expired(now));
            removed += before - memory.len();
        }

        for path in self.disk_entries()? {
            let stale = match read_entry(&path) {
                Ok(Some(entry)) => entry.is_expired(now),
                Ok(None) => false,
                Err(_) => true,
            };
            if stale && remove_file(&path) {
                removed += 1;
            }
        }

        debug!(removed, "cache sweep complete");
        Ok(removed)
    }

    /// Delete every entry. Returns how many on-disk entries were removed.
    pub fn clear(&self) -> Result<usize, AppError> {
        if let Ok(mut memory) = self.memory.write() {
            memory.clear();
        }
        let removed = self
            .disk_entries()?
            .iter()
            .filter(|path| remove_file(path))
            .count();
        debug!(removed, "cache cleared");
        Ok(removed)
    }

    fn remove(&self, key: &str) {
        if let Ok(mut memory) = self.memory.write() {
            memory.remove(key);
        }
        if let Some(path) = self.entry_path(key) {
            remove_file(&path);
        }
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.{}", key, ENTRY_EXTENSION)))
    }

    fn disk_entries(&self) -> Result<Vec<PathBuf>, AppError> {
        let Some(dir) = &self.dir else {
            return Ok(Vec::new());
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::internal(format!(
                    "failed to read cache directory {}",
                    dir.display()
                ))
                .with_cause(err)
                .with_suggestion(format!(
                    "Delete {} manually; it only holds cached data",
                    dir.display()
                )))
            }
        };
        Ok(entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION))
            .collect())
    }
}

/// `Ok(None)` when there is no entry on disk.
fn read_entry(path: &Path) -> io::Result<Option<CacheEntry>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let entry = serde_json::from_slice(&contents)?;
    Ok(Some(entry))
}

/// Write to a temp file in the same directory, then rename over the target,
/// so concurrent readers never observe a partial entry.
fn write_entry(path: &Path, entry: &CacheEntry) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "cache path has no parent"))?;
    fs::create_dir_all(dir)?;
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut file, entry)?;
    file.flush()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn remove_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(err) if err.kind() == io::ErrorKind::NotFound => false,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to remove cache entry");
            false
        }
    }
}
