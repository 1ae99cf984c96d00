//! Tileset entries and key derivation.
//!
//! Existing entries stay as raw JSON so fields this tool does not know about
//! survive untouched. Only newly discovered entries are built from
//! [`TilesetEntry`].

use crate::config::KeyMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};

/// Field of an entry that points at its tile file.
pub const MBTILES_FIELD: &str = "mbtiles";

/// A freshly discovered tileset entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TilesetEntry {
    /// Tile file path, relative to the tile root.
    pub mbtiles: String,
    pub tilejson: TileJson,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileJson {
    pub attribution: String,
}

impl TilesetEntry {
    pub fn new(mbtiles: impl Into<String>, attribution: impl Into<String>) -> Self {
        Self {
            mbtiles: mbtiles.into(),
            tilejson: TileJson {
                attribution: attribution.into(),
            },
        }
    }

    /// Convert into the JSON shape stored under `data`.
    pub fn into_value(self) -> Value {
        serde_json::json!({
            "mbtiles": self.mbtiles,
            "tilejson": { "attribution": self.tilejson.attribution },
        })
    }
}

/// The tile file an existing entry references, if it has one.
pub fn entry_file(entry: &Value) -> Option<&str> {
    entry.get(MBTILES_FIELD).and_then(Value::as_str)
}

/// Resolve an entry's file reference to a filesystem path.
///
/// Relative references resolve against the tile root when one is known,
/// otherwise against the working directory.
pub fn resolve_entry_path(tiles_root: Option<&Path>, reference: &str) -> PathBuf {
    let reference = Path::new(reference);
    match tiles_root {
        Some(root) if reference.is_relative() => root.join(reference),
        _ => reference.to_path_buf(),
    }
}

/// Path of `file` relative to `root`, joined with `/` whatever the platform.
///
/// Returns `None` when `file` is not under `root`.
pub fn relative_reference(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Derive the tileset key for `file` under `root`.
///
/// Returns `None` if the file has no usable stem or lies outside `root`.
pub fn derive_key(root: &Path, file: &Path, mode: KeyMode) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let stem = relative.file_stem()?.to_string_lossy().into_owned();
    if stem.is_empty() {
        return None;
    }

    let key = match mode {
        KeyMode::Stem => stem,
        KeyMode::DirStem => match relative.parent().and_then(Path::file_name) {
            Some(dir) => format!("{}-{}", dir.to_string_lossy(), stem),
            None => stem,
        },
        KeyMode::Path => {
            let mut parts: Vec<String> = relative
                .parent()
                .into_iter()
                .flat_map(Path::components)
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect();
            parts.push(stem);
            parts.join("-")
        }
    };
    Some(key)
}
