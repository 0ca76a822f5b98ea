//! NF-011: Synthesis memoization keyed by (graph hash, bound rule-set versions).
//!
//! Entries live in memory and, when a directory is configured, as one JSON
//! file per key. Any read problem is a miss; write problems are logged and dropped.

use crate::core::types::{CompositionArtifact, ProviderId, RegistryBinding, SynthesisArtifact};
use crate::lock::hasher;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Output of one fully successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedRun {
    pub artifacts: BTreeMap<ProviderId, Vec<SynthesisArtifact>>,
    pub composition: Option<CompositionArtifact>,
}

/// Cache key for a graph hash and binding.
pub fn cache_key(graph_hash: &str, binding: &RegistryBinding) -> String {
    let mut components = vec![graph_hash.to_string()];
    components.extend(binding.iter().map(|(p, v)| format!("{}@{}", p, v)));
    let refs: Vec<&str> = components.iter().map(String::as_str).collect();
    hasher::composite_hash(&refs)
}

#[derive(Debug, Default)]
pub struct SynthesisCache {
    entries: Mutex<HashMap<String, CachedRun>>,
    dir: Option<PathBuf>,
}

impl SynthesisCache {
    /// Memory-only cache.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Cache backed by JSON files under `dir` (created on first write).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::default(),
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<CachedRun> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = entries.get(key) {
            debug!(key = hasher::short(key, 12), "cache hit (memory)");
            return Some(run.clone());
        }

        let path = self.file_for(key)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache read failed; treating as miss");
                return None;
            }
        };
        match serde_json::from_str::<CachedRun>(&content) {
            Ok(run) => {
                debug!(key = hasher::short(key, 12), "cache hit (disk)");
                entries.insert(key.to_string(), run.clone());
                Some(run)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache entry corrupt; treating as miss");
                None
            }
        }
    }

    pub fn put(&self, key: &str, run: CachedRun) {
        if let Some(path) = self.file_for(key) {
            if let Err(e) = write_atomic(&path, &run) {
                warn!(path = %path.display(), error = %e, "cache write failed");
            }
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), run);
    }

    /// Entries currently held in memory.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn file_for(&self, key: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|d| d.join(format!("{}.json", hasher::short(key, 64))))
    }
}

fn write_atomic(path: &Path, run: &CachedRun) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }
    let json = serde_json::to_string(run).map_err(|e| format!("serialize error: {}", e))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| format!("cannot write {}: {}", tmp.display(), e))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| format!("cannot rename {} → {}: {}", tmp.display(), path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ResourceKind, RuleVersion};

    fn run() -> CachedRun {
        let aws = ProviderId::new("aws").unwrap();
        CachedRun {
            artifacts: BTreeMap::from([(
                aws.clone(),
                vec![SynthesisArtifact {
                    provider: aws,
                    artifact_kind: "aws_instance".to_string(),
                    logical_id: "compute-0".to_string(),
                    logical_kind: ResourceKind::ComputeNode,
                    target_id: "compute_0".to_string(),
                    file_name: "compute_0.tf".to_string(),
                    body: "module \"compute_0\" {}\n".to_string(),
                    depends_on: vec![],
                }],
            )]),
            composition: None,
        }
    }

    fn binding(version: &str) -> RegistryBinding {
        BTreeMap::from([(
            ProviderId::new("aws").unwrap(),
            RuleVersion::parse(version).unwrap(),
        )])
    }

    #[test]
    fn test_nf011_key_depends_on_hash_and_binding() {
        let k = cache_key("blake3:aa", &binding("1.0.0"));
        assert_eq!(k, cache_key("blake3:aa", &binding("1.0.0")));
        assert_ne!(k, cache_key("blake3:bb", &binding("1.0.0")));
        assert_ne!(k, cache_key("blake3:aa", &binding("1.1.0")));
    }

    #[test]
    fn test_nf011_memory_round_trip() {
        let cache = SynthesisCache::in_memory();
        let key = cache_key("blake3:aa", &binding("1.0.0"));
        assert!(cache.get(&key).is_none());
        cache.put(&key, run());
        assert_eq!(cache.get(&key), Some(run()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_nf011_disk_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let key = cache_key("blake3:aa", &binding("1.0.0"));
        SynthesisCache::with_dir(dir.path().join("cache")).put(&key, run());

        let fresh = SynthesisCache::with_dir(dir.path().join("cache"));
        assert!(fresh.is_empty());
        assert_eq!(fresh.get(&key), Some(run()));
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_nf011_corrupt_file_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let key = cache_key("blake3:aa", &binding("1.0.0"));
        let cache = SynthesisCache::with_dir(dir.path());
        std::fs::write(
            dir.path().join(format!("{}.json", hasher::short(&key, 64))),
            "{broken",
        )
        .unwrap();
        assert!(cache.get(&key).is_none());
    }
}
