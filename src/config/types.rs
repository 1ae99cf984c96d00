//! Settings types for the reconciler.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attribution written for new entries when the tile file carries none.
pub const UNKNOWN_ATTRIBUTION: &str = "-unknown-";

/// Default number of tile files read concurrently.
pub const DEFAULT_MAX_CONCURRENT_READS: usize = 16;

/// How a tileset key is derived from a tile file's location under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    /// Bare file stem: `b.mbtiles` -> `b`.
    Stem,
    /// `<parent>-<stem>` for files in a subdirectory, bare stem at the root.
    #[default]
    DirStem,
    /// Root-relative path without extension, separators replaced by `-`.
    Path,
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Stem => write!(f, "stem"),
            KeyMode::DirStem => write!(f, "dir-stem"),
            KeyMode::Path => write!(f, "path"),
        }
    }
}

impl std::str::FromStr for KeyMode {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stem" => Ok(KeyMode::Stem),
            "dir-stem" | "dir_stem" => Ok(KeyMode::DirStem),
            "path" => Ok(KeyMode::Path),
            other => Err(ReconcileError::settings(format!(
                "unknown key mode '{}' (expected stem, dir-stem or path)",
                other
            ))),
        }
    }
}

/// Settings controlling a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Root directory holding the tile files. No discovery when unset.
    #[serde(default)]
    pub tiles_dir: Option<PathBuf>,

    /// Key derivation rule for newly discovered files.
    #[serde(default)]
    pub key_mode: KeyMode,

    /// Sort `data` keys in natural order before writing (default: false).
    #[serde(default)]
    pub natural_sort: bool,

    /// Read the attribution from each new tile file (default: true).
    #[serde(default = "default_true")]
    pub read_metadata: bool,

    /// File extensions treated as tile files, without the dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Attribution used when a tile file has none.
    #[serde(default = "default_unknown_attribution")]
    pub unknown_attribution: String,

    /// Upper bound on tile files read at the same time.
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            tiles_dir: None,
            key_mode: KeyMode::default(),
            natural_sort: false,
            read_metadata: default_true(),
            extensions: default_extensions(),
            unknown_attribution: default_unknown_attribution(),
            max_concurrent_reads: default_max_concurrent_reads(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    vec!["mbtiles".to_string()]
}

fn default_unknown_attribution() -> String {
    UNKNOWN_ATTRIBUTION.to_string()
}

fn default_max_concurrent_reads() -> usize {
    DEFAULT_MAX_CONCURRENT_READS
}

impl ReconcileSettings {
    /// Load settings from a single YAML file, without tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ReconcileError::read(path, e))?;
        // Empty or comment-only files parse as null
        let settings: Option<ReconcileSettings> = serde_yaml::from_str(&content)
            .map_err(|e| ReconcileError::settings(format!("{}: {}", path.display(), e)))?;
        let settings = settings.unwrap_or_default();
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_reads == 0 {
            return Err(ReconcileError::settings(
                "max_concurrent_reads must be at least 1",
            ));
        }
        if self.extensions.is_empty() {
            return Err(ReconcileError::settings(
                "at least one tile extension is required",
            ));
        }
        Ok(())
    }

    /// Whether `path` has one of the configured tile extensions.
    pub fn is_tile_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
    }
}
