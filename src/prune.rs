//! Removal of entries whose tile file is gone.
//!
//! Runs before discovery so a stale entry and a rediscovered file never
//! compete for the same key.

use crate::tileset::{entry_file, resolve_entry_path};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// An entry dropped by [`prune_missing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedEntry {
    pub key: String,
    pub mbtiles: String,
}

/// Drop every entry of `data` whose `mbtiles` file does not exist.
///
/// Entries without a file reference are kept. Surviving entries keep their
/// relative order and contents.
pub fn prune_missing(data: &mut Map<String, Value>, tiles_root: Option<&Path>) -> Vec<RemovedEntry> {
    let mut removed = Vec::new();

    data.retain(|key, entry| {
        let Some(reference) = entry_file(entry) else {
            debug!(key = %key, "Keeping entry without a tile file reference");
            return true;
        };

        let path = resolve_entry_path(tiles_root, reference);
        if path.is_file() {
            info!(key = %key, path = %path.display(), "Found configured tile file");
            true
        } else {
            info!(key = %key, path = %path.display(), "Removing missing tile file from configuration");
            removed.push(RemovedEntry {
                key: key.clone(),
                mbtiles: reference.to_string(),
            });
            false
        }
    });

    removed
}
