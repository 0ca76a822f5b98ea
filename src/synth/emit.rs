//! NF-012: Artifact tree emission.
//!
//! Each target tree is written to a staging directory next to its destination
//! and swapped in with renames, so readers see the old tree or the new one.

use super::composition::COMPOSITION_FILE;
use super::pipeline::SynthesisOutcome;
use crate::core::error::EmitError;
use crate::core::types::{CompositionArtifact, ProviderId, SynthesisArtifact};
use crate::lock::hasher;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory (under the output root) holding the composition.
pub const COMPOSITION_DIR: &str = "crossplane";

/// Directory name of one target tree: `{provider}_{workload}`.
pub fn tree_name(provider: &ProviderId, workload_name: &str) -> String {
    format!("{}_{}", provider, workload_name)
}

/// Content digest of a tree: file names and body hashes in emission order.
pub fn tree_digest(artifacts: &[SynthesisArtifact]) -> String {
    let components: Vec<String> = artifacts
        .iter()
        .map(|a| format!("{}={}", a.file_name, hasher::hash_string(&a.body)))
        .collect();
    let refs: Vec<&str> = components.iter().map(String::as_str).collect();
    hasher::composite_hash(&refs)
}

/// Write one target tree, replacing any previous tree. Returns its path.
pub fn write_target_tree(
    out_root: &Path,
    workload_name: &str,
    provider: &ProviderId,
    artifacts: &[SynthesisArtifact],
) -> Result<PathBuf, EmitError> {
    let name = tree_name(provider, workload_name);
    let dest = out_root.join(&name);
    let staging = out_root.join(format!(".{}.staging", name));
    let retired = out_root.join(format!(".{}.old", name));

    remove_if_exists(&staging)?;
    remove_if_exists(&retired)?;
    std::fs::create_dir_all(&staging).map_err(EmitError::io(&staging))?;

    for artifact in artifacts {
        let path = staging.join(&artifact.file_name);
        std::fs::write(&path, &artifact.body).map_err(EmitError::io(&path))?;
    }

    if dest.exists() {
        std::fs::rename(&dest, &retired).map_err(EmitError::io(&dest))?;
    }
    std::fs::rename(&staging, &dest).map_err(EmitError::io(&dest))?;
    remove_if_exists(&retired)?;

    debug!(path = %dest.display(), files = artifacts.len(), "target tree written");
    Ok(dest)
}

/// Write the composition to `{out}/crossplane/`. Returns its path.
pub fn write_composition(
    out_root: &Path,
    composition: &CompositionArtifact,
) -> Result<PathBuf, EmitError> {
    let dir = out_root.join(COMPOSITION_DIR);
    std::fs::create_dir_all(&dir).map_err(EmitError::io(&dir))?;
    let path = dir.join(&composition.file_name);
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, &composition.body).map_err(EmitError::io(&tmp))?;
    std::fs::rename(&tmp, &path).map_err(EmitError::io(&path))?;
    Ok(path)
}

/// Remove `{out}/crossplane/composition.yaml`. Returns whether one existed.
pub fn remove_composition(out_root: &Path) -> Result<bool, EmitError> {
    let path = out_root.join(COMPOSITION_DIR).join(COMPOSITION_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(EmitError::io(&path)(e)),
    }
}

/// Write every succeeded tree and the composition, if any.
///
/// A complete run without a composition (one target) retires the composition
/// of an earlier run, which would otherwise name providers this run never touched.
pub fn write_outcome(
    out_root: &Path,
    workload_name: &str,
    outcome: &SynthesisOutcome,
) -> Result<Vec<PathBuf>, EmitError> {
    let mut written = Vec::with_capacity(outcome.artifacts.len() + 1);
    for (provider, artifacts) in &outcome.artifacts {
        written.push(write_target_tree(
            out_root,
            workload_name,
            provider,
            artifacts,
        )?);
    }
    match &outcome.composition {
        Some(composition) => written.push(write_composition(out_root, composition)?),
        None if outcome.is_complete() => {
            if remove_composition(out_root)? {
                debug!("stale composition removed");
            }
        }
        None => {}
    }
    Ok(written)
}

fn remove_if_exists(dir: &Path) -> Result<(), EmitError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(EmitError::io(dir)(e)),
    }
}
