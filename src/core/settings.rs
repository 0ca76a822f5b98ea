//! NF-005: Project settings from the optional `nebulaforge.toml`.
//!
//! Every table and key is optional. A missing file yields defaults; command-line
//! flags override whatever the file says.

use super::error::SettingsError;
use super::types::{ProviderId, RuleVersion};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_SETTINGS_FILE: &str = "nebulaforge.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub output: OutputSettings,
    pub lock: LockSettings,
    pub cache: CacheSettings,
    pub registry: RegistrySettings,
    pub synthesis: SynthesisSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSettings {
    pub dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("outputs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockSettings {
    pub path: PathBuf,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::lock::lockfile::DEFAULT_LOCKFILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSettings {
    /// On-disk cache directory; `None` keeps the cache in memory only.
    pub dir: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: Some(PathBuf::from(".nebulaforge/cache")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    /// Extra rule-set directories loaded after the built-ins.
    pub extra_dirs: Vec<PathBuf>,
    /// Provider → rule-set version pins.
    pub pins: BTreeMap<ProviderId, RuleVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesisSettings {
    /// Walk targets concurrently.
    pub parallel: bool,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl Settings {
    /// Parse settings text. `path` is only used in error messages.
    pub fn parse(path: &Path, text: &str) -> Result<Self, SettingsError> {
        toml::from_str(text).map_err(|e| SettingsError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(path, &text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Resolve relative paths against `base` (the directory holding the file).
    pub fn relative_to(mut self, base: &Path) -> Self {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.output.dir);
        anchor(&mut self.lock.path);
        if let Some(dir) = self.cache.dir.as_mut() {
            anchor(dir);
        }
        self.registry.extra_dirs.iter_mut().for_each(anchor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nf005_defaults() {
        let s = Settings::default();
        assert_eq!(s.output.dir, PathBuf::from("outputs"));
        assert_eq!(s.lock.path, PathBuf::from("nebulaforge.lock"));
        assert!(s.synthesis.parallel);
        assert!(s.registry.pins.is_empty());
    }

    #[test]
    fn test_nf005_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load(&dir.path().join("nebulaforge.toml")).unwrap();
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn test_nf005_parse_full() {
        let text = r#"
[output]
dir = "build/iac"

[lock]
path = "state/nebulaforge.lock"

[cache]
dir = "/tmp/nf-cache"

[registry]
extra_dirs = ["rules"]

[registry.pins]
aws = "1.0.0"

[synthesis]
parallel = false
"#;
        let s = Settings::parse(Path::new("nebulaforge.toml"), text).unwrap();
        assert_eq!(s.output.dir, PathBuf::from("build/iac"));
        assert_eq!(s.cache.dir, Some(PathBuf::from("/tmp/nf-cache")));
        assert!(!s.synthesis.parallel);
        let aws = ProviderId::new("aws").unwrap();
        assert_eq!(s.registry.pins[&aws].as_str(), "1.0.0");

        let s = s.relative_to(Path::new("/project"));
        assert_eq!(s.output.dir, PathBuf::from("/project/build/iac"));
        assert_eq!(s.lock.path, PathBuf::from("/project/state/nebulaforge.lock"));
        assert_eq!(s.cache.dir, Some(PathBuf::from("/tmp/nf-cache")));
        assert_eq!(s.registry.extra_dirs, vec![PathBuf::from("/project/rules")]);
    }

    #[test]
    fn test_nf005_partial_tables_keep_defaults() {
        let s = Settings::parse(Path::new("x.toml"), "[synthesis]\nparallel = false\n").unwrap();
        assert_eq!(s.output.dir, PathBuf::from("outputs"));
        assert!(!s.synthesis.parallel);
    }

    #[test]
    fn test_nf005_rejects_unknown_keys_and_bad_pins() {
        let err = Settings::parse(Path::new("x.toml"), "[output]\ndirectory = \"o\"\n").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { .. }));
        assert!(Settings::parse(Path::new("x.toml"), "[registry.pins]\naws = \"one\"\n").is_err());
        assert!(Settings::parse(Path::new("x.toml"), "[registry.pins]\nAWS = \"1.0\"\n").is_err());
    }
}
