//! NF-015: Append-only JSONL lockfile, one entry per successful synthesis run.
//!
//! Entries are never rewritten. Commits are serialized through a mutex owned
//! by the `Lockfile`, and each entry is written with a single append.

use crate::core::error::LockError;
use crate::core::types::{LockEntry, ProviderId, RegistryBinding};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_LOCKFILE: &str = "nebulaforge.lock";

/// Generate a run ID from a timestamp.
pub fn generate_run_id(at: DateTime<Utc>) -> String {
    let nanos = at.timestamp_nanos_opt().unwrap_or_default() as u64;
    format!("r-{:012x}", nanos & 0xFFFF_FFFF_FFFF)
}

/// Handle on a lockfile. Share it (e.g. behind `Arc`) between logically
/// concurrent runs; commits still happen one at a time.
#[derive(Debug)]
pub struct Lockfile {
    path: PathBuf,
    writer: Mutex<()>,
}

impl Lockfile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a new entry recording the inputs of a successful run.
    pub fn commit(
        &self,
        workload: &str,
        graph_hash: &str,
        registry_versions: &RegistryBinding,
        targets: &[ProviderId],
    ) -> Result<LockEntry, LockError> {
        let mut targets = targets.to_vec();
        targets.sort();
        targets.dedup();

        let timestamp = Utc::now();
        let entry = LockEntry {
            run_id: generate_run_id(timestamp),
            workload: workload.to_string(),
            graph_hash: graph_hash.to_string(),
            registry_versions: registry_versions.clone(),
            targets,
            timestamp,
            generator: format!("nebulaforge {}", env!("CARGO_PKG_VERSION")),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.writer.lock().map_err(|_| LockError::Poisoned)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LockError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        file.write_all(line.as_bytes())
            .map_err(|source| self.io_error(source))?;

        debug!(run_id = %entry.run_id, path = %self.path.display(), "lock entry committed");
        Ok(entry)
    }

    /// All entries in file order. A missing file is an empty history.
    pub fn history(&self) -> Result<Vec<LockEntry>, LockError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: LockEntry = serde_json::from_str(line).map_err(|e| LockError::Corrupt {
                path: self.path.clone(),
                line: i + 1,
                reason: e.to_string(),
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Most recent entry by timestamp; the later line wins ties.
    pub fn last_entry(&self) -> Result<Option<LockEntry>, LockError> {
        Ok(self
            .history()?
            .into_iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.timestamp.cmp(&b.timestamp).then(ia.cmp(ib)))
            .map(|(_, e)| e))
    }

    /// Most recent entry recorded for `workload`.
    pub fn last_entry_for(&self, workload: &str) -> Result<Option<LockEntry>, LockError> {
        Ok(self
            .history()?
            .into_iter()
            .enumerate()
            .filter(|(_, e)| e.workload == workload)
            .max_by(|(ia, a), (ib, b)| a.timestamp.cmp(&b.timestamp).then(ia.cmp(ib)))
            .map(|(_, e)| e))
    }

    /// `last_entry_for`, with any failure degraded to "no previous entry".
    pub fn previous_or_none(&self, workload: &str) -> Option<LockEntry> {
        match self.last_entry_for(workload) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable lockfile; forcing full synthesis");
                None
            }
        }
    }

    fn io_error(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RuleVersion;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn binding() -> RegistryBinding {
        BTreeMap::from([
            (
                ProviderId::new("aws").unwrap(),
                RuleVersion::parse("1.1.0").unwrap(),
            ),
            (
                ProviderId::new("gcp").unwrap(),
                RuleVersion::parse("1.0.0").unwrap(),
            ),
        ])
    }

    fn targets() -> Vec<ProviderId> {
        vec![ProviderId::new("gcp").unwrap(), ProviderId::new("aws").unwrap()]
    }

    #[test]
    fn test_nf015_generate_run_id() {
        let id = generate_run_id(Utc::now());
        assert!(id.starts_with("r-"));
        assert_eq!(id.len(), 14);
    }

    #[test]
    fn test_nf015_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lockfile::new(dir.path().join("nebulaforge.lock"));
        assert!(lock.history().unwrap().is_empty());
        assert!(lock.last_entry().unwrap().is_none());
    }

    #[test]
    fn test_nf015_commit_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lockfile::new(dir.path().join("nebulaforge.lock"));
        let entry = lock
            .commit("default/web", "blake3:abc", &binding(), &targets())
            .unwrap();
        // Targets are stored sorted.
        assert_eq!(entry.targets[0].as_str(), "aws");
        assert!(entry.matches("blake3:abc", &binding()));

        let last = lock.last_entry().unwrap().unwrap();
        assert_eq!(last, entry);
    }

    #[test]
    fn test_nf015_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lockfile::new(dir.path().join("nebulaforge.lock"));
        lock.commit("default/web", "blake3:one", &binding(), &targets())
            .unwrap();
        let second = lock
            .commit("default/web", "blake3:two", &binding(), &targets())
            .unwrap();

        let history = lock.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].graph_hash, "blake3:one");
        assert_eq!(lock.last_entry().unwrap().unwrap(), second);

        let content = std::fs::read_to_string(lock.path()).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_nf015_last_entry_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nebulaforge.lock");
        let lock = Lockfile::new(&path);
        let newer = lock
            .commit("default/web", "blake3:newer", &binding(), &targets())
            .unwrap();
        let mut older = newer.clone();
        older.graph_hash = "blake3:older".to_string();
        older.timestamp = newer.timestamp - chrono::Duration::hours(1);

        // An out-of-order line (e.g. clock skew) must not win.
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{}", serde_json::to_string(&older).unwrap()).unwrap();

        assert_eq!(lock.last_entry().unwrap().unwrap().graph_hash, "blake3:newer");
    }

    #[test]
    fn test_nf015_corrupt_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nebulaforge.lock");
        let lock = Lockfile::new(&path);
        lock.commit("default/web", "blake3:abc", &binding(), &targets())
            .unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();

        assert!(matches!(
            lock.last_entry(),
            Err(LockError::Corrupt { line: 2, .. })
        ));
        assert!(lock.previous_or_none("default/web").is_none());
    }

    #[test]
    fn test_nf015_unreadable_path_degrades_to_none() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the lockfile should be.
        let lock = Lockfile::new(dir.path());
        assert!(lock.last_entry().is_err());
        assert!(lock.previous_or_none("default/web").is_none());
    }

    #[test]
    fn test_nf015_last_entry_per_workload() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lockfile::new(dir.path().join("nebulaforge.lock"));
        let web = lock
            .commit("default/web", "blake3:web", &binding(), &targets())
            .unwrap();
        lock.commit("default/api", "blake3:api", &binding(), &targets())
            .unwrap();

        assert_eq!(lock.last_entry_for("default/web").unwrap(), Some(web.clone()));
        assert_eq!(lock.previous_or_none("default/web"), Some(web));
        assert_eq!(lock.previous_or_none("default/db"), None);
    }

    #[test]
    fn test_nf015_concurrent_commits_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Arc::new(Lockfile::new(dir.path().join("nebulaforge.lock")));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let lock = Arc::clone(&lock);
                std::thread::spawn(move || {
                    lock.commit("default/web", &format!("blake3:{i}"), &binding(), &targets())
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let history = lock.history().unwrap();
        assert_eq!(history.len(), 8);
    }

    #[test]
    fn test_nf015_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let lock = Lockfile::new(dir.path().join("state").join("nebulaforge.lock"));
        lock.commit("default/web", "blake3:abc", &binding(), &targets())
            .unwrap();
        assert!(lock.path().exists());
    }
}
