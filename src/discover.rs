//! Discovery of tile files missing from the configuration.
//!
//! The directory walk is synchronous. Attribution lookups for the new files
//! fan out onto the blocking pool and are all joined before the accumulator
//! is touched, so entries are inserted in scan order whatever order the
//! lookups finish in.

use crate::config::ReconcileSettings;
use crate::error::{MetadataError, ReconcileError, Result};
use crate::metadata::AttributionReader;
use crate::tileset::{TilesetEntry, derive_key, entry_file, relative_reference, resolve_entry_path};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A tile file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Derived tileset key
    pub key: String,
    /// Path on disk
    pub path: PathBuf,
    /// Path relative to the tile root, `/`-separated
    pub reference: String,
}

/// An entry added by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntry {
    pub key: String,
    pub mbtiles: String,
    pub attribution: String,
}

/// A tile file that did not produce an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub added: Vec<AddedEntry>,
    pub skipped: Vec<SkippedFile>,
    /// Tile files already referenced by an entry
    pub already_configured: usize,
}

/// Walk `root` depth-first and list every tile file with its key.
///
/// Hidden files and directories are ignored and symlinks are not followed.
/// Unreadable subdirectories are logged and skipped.
pub fn scan(root: &Path, settings: &ReconcileSettings) -> Result<Vec<Candidate>> {
    if !root.is_dir() {
        return Err(ReconcileError::TilesDirNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut candidates = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(ReconcileError::Scan {
                    path: root.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                warn!(error = %e, "Skipping unreadable entry in tile directory");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            debug!(path = %entry.path().display(), "Scanning directory");
            continue;
        }
        // Directory links stay unfollowed; file links count when they resolve to a file
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file || !settings.is_tile_file(entry.path()) {
            continue;
        }

        let path = entry.into_path();
        let (Some(key), Some(reference)) = (
            derive_key(root, &path, settings.key_mode),
            relative_reference(root, &path),
        ) else {
            warn!(path = %path.display(), "Cannot derive a tileset key, skipping");
            continue;
        };
        candidates.push(Candidate {
            key,
            path,
            reference,
        });
    }

    Ok(candidates)
}

/// Keep the candidates no entry of `data` references yet.
///
/// A candidate is referenced when an entry's `mbtiles` resolves to the same
/// file. An unreferenced candidate whose key is already in use, by an entry
/// or an earlier candidate, is skipped. Returns the remaining candidates,
/// the number already referenced, and candidates skipped for key clashes.
pub fn unreferenced(
    candidates: Vec<Candidate>,
    data: &Map<String, Value>,
    root: &Path,
) -> (Vec<Candidate>, usize, Vec<SkippedFile>) {
    let referenced: HashSet<PathBuf> = data
        .values()
        .filter_map(entry_file)
        .map(|reference| canonical(&resolve_entry_path(Some(root), reference)))
        .collect();

    let mut taken: HashSet<String> = data.keys().cloned().collect();
    let mut fresh = Vec::new();
    let mut already = 0;
    let mut clashes = Vec::new();

    for candidate in candidates {
        if referenced.contains(&canonical(&candidate.path)) {
            debug!(key = %candidate.key, path = %candidate.path.display(), "Tile file already configured");
            already += 1;
            continue;
        }
        if !taken.insert(candidate.key.clone()) {
            let reason = if data.contains_key(&candidate.key) {
                format!("key '{}' used by another entry", candidate.key)
            } else {
                format!("duplicate key '{}'", candidate.key)
            };
            warn!(
                key = %candidate.key,
                path = %candidate.path.display(),
                reason = %reason,
                "Tileset key already taken, skipping"
            );
            clashes.push(SkippedFile {
                reason,
                path: candidate.path,
            });
            continue;
        }
        fresh.push(candidate);
    }

    (fresh, already, clashes)
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Look up the attribution of every candidate concurrently.
///
/// At most `max_concurrent` files are open at once. Results come back in
/// candidate order; a failed or panicked lookup yields an error for that
/// file only.
pub async fn read_attributions(
    candidates: &[Candidate],
    reader: Arc<dyn AttributionReader>,
    max_concurrent: usize,
) -> Vec<std::result::Result<Option<String>, MetadataError>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = JoinSet::new();

    for (index, candidate) in candidates.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let reader = Arc::clone(&reader);
        let path = candidate.path.clone();
        tasks.spawn(async move {
            // The semaphore is never closed
            let _permit = semaphore.acquire_owned().await.ok();
            let lookup_path = path.clone();
            let result = tokio::task::spawn_blocking(move || reader.read_attribution(&lookup_path))
                .await
                .unwrap_or_else(|e| {
                    Err(MetadataError::Task {
                        path,
                        message: e.to_string(),
                    })
                });
            (index, result)
        });
    }

    let mut results: Vec<Option<std::result::Result<Option<String>, MetadataError>>> =
        candidates.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(e) => warn!(error = %e, "Metadata task failed"),
        }
    }

    results
        .into_iter()
        .zip(candidates)
        .map(|(result, candidate)| {
            result.unwrap_or_else(|| {
                Err(MetadataError::Task {
                    path: candidate.path.clone(),
                    message: "task did not complete".to_string(),
                })
            })
        })
        .collect()
}

/// Add an entry to `data` for every unreferenced tile file under `root`.
///
/// `reader` is only consulted when `settings.read_metadata` is set; without
/// it every new entry gets the unknown-attribution sentinel.
pub async fn discover(
    data: &mut Map<String, Value>,
    root: &Path,
    settings: &ReconcileSettings,
    reader: Arc<dyn AttributionReader>,
) -> Result<DiscoveryReport> {
    let candidates = scan(root, settings)?;
    debug!(count = candidates.len(), "Tile files found");

    let (fresh, already_configured, mut skipped) = unreferenced(candidates, data, root);

    let attributions = if settings.read_metadata {
        read_attributions(&fresh, reader, settings.max_concurrent_reads).await
    } else {
        fresh.iter().map(|_| Ok(None)).collect()
    };

    let mut added = Vec::new();
    for (candidate, attribution) in fresh.into_iter().zip(attributions) {
        match attribution {
            Ok(attribution) => {
                let attribution =
                    attribution.unwrap_or_else(|| settings.unknown_attribution.clone());
                info!(
                    key = %candidate.key,
                    mbtiles = %candidate.reference,
                    attribution = %attribution,
                    "Adding tile file to configuration"
                );
                let entry = TilesetEntry::new(candidate.reference.clone(), attribution.clone());
                data.insert(candidate.key.clone(), entry.into_value());
                added.push(AddedEntry {
                    key: candidate.key,
                    mbtiles: candidate.reference,
                    attribution,
                });
            }
            Err(e) => {
                warn!(path = %candidate.path.display(), error = %e, "Skipping unreadable tile file");
                skipped.push(SkippedFile {
                    path: candidate.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(DiscoveryReport {
        added,
        skipped,
        already_configured,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyMode;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedReader(&'static str);

    impl AttributionReader for FixedReader {
        fn read_attribution(&self, _path: &Path) -> std::result::Result<Option<String>, MetadataError> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_scan_is_recursive_and_sorted() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "b.mbtiles");
        touch(temp.path(), "a.mbtiles");
        touch(temp.path(), "datasets/7.mbtiles");
        touch(temp.path(), "datasets/notes.txt");
        touch(temp.path(), ".cache/x.mbtiles");
        touch(temp.path(), "a.mbtiles-journal");

        let candidates = scan(temp.path(), &ReconcileSettings::default()).unwrap();
        let keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "datasets-7"]);
        assert_eq!(candidates[2].reference, "datasets/7.mbtiles");
    }

    #[test]
    fn test_scan_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = scan(&temp.path().join("nope"), &ReconcileSettings::default()).unwrap_err();
        assert!(matches!(err, ReconcileError::TilesDirNotFound { .. }));
    }

    #[test]
    fn test_unreferenced_skips_known_files_and_keys() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.mbtiles");
        touch(temp.path(), "renamed.mbtiles");
        touch(temp.path(), "new.mbtiles");

        let data = json!({
            "a": {"mbtiles": "somewhere-else.mbtiles"},
            "custom-name": {"mbtiles": "renamed.mbtiles"},
        })
        .as_object()
        .unwrap()
        .clone();

        let candidates = scan(temp.path(), &ReconcileSettings::default()).unwrap();
        let (fresh, already, clashes) = unreferenced(candidates, &data, temp.path());
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].key, "new");
        assert_eq!(already, 1);
        assert_eq!(clashes.len(), 1);
        assert!(clashes[0].path.ends_with("a.mbtiles"));
        assert_eq!(clashes[0].reason, "key 'a' used by another entry");
    }

    #[test]
    fn test_key_of_other_entry_is_skipped_not_configured() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "other.mbtiles");
        touch(temp.path(), "roads.mbtiles");

        let data = json!({"roads": {"mbtiles": "other.mbtiles"}})
            .as_object()
            .unwrap()
            .clone();

        let candidates = scan(temp.path(), &ReconcileSettings::default()).unwrap();
        let (fresh, already, clashes) = unreferenced(candidates, &data, temp.path());
        assert!(fresh.is_empty());
        assert_eq!(already, 1);
        assert_eq!(clashes.len(), 1);
        assert!(clashes[0].path.ends_with("roads.mbtiles"));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_accepts_file_links_but_not_directory_links() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("tiles");
        touch(temp.path(), "real.mbtiles");
        touch(temp.path(), "elsewhere/inner.mbtiles");
        fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real.mbtiles"), root.join("linked.mbtiles"))
            .unwrap();
        std::os::unix::fs::symlink(temp.path().join("elsewhere"), root.join("dir-link")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("absent.mbtiles"), root.join("dangling.mbtiles"))
            .unwrap();

        let candidates = scan(&root, &ReconcileSettings::default()).unwrap();
        let keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["linked"]);
        assert_eq!(candidates[0].reference, "linked.mbtiles");
    }

    /// Records how many lookups run at the same time.
    struct CountingReader {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl AttributionReader for CountingReader {
        fn read_attribution(&self, _path: &Path) -> std::result::Result<Option<String>, MetadataError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_read_attributions_respects_limit() {
        let candidates: Vec<Candidate> = (0..12)
            .map(|n| Candidate {
                key: n.to_string(),
                path: PathBuf::from(format!("{}.mbtiles", n)),
                reference: format!("{}.mbtiles", n),
            })
            .collect();
        let reader = Arc::new(CountingReader {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });

        let results = read_attributions(&candidates, reader.clone(), 3).await;
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| matches!(r, Ok(None))));

        let peak = reader.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {}", peak);
        assert!(peak >= 1);
    }

    #[test]
    fn test_duplicate_keys_first_wins() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "x/t.mbtiles");
        touch(temp.path(), "y/t.mbtiles");

        let settings = ReconcileSettings {
            key_mode: KeyMode::Stem,
            ..Default::default()
        };
        let candidates = scan(temp.path(), &settings).unwrap();
        let (fresh, _, clashes) = unreferenced(candidates, &Map::new(), temp.path());
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].reference, "x/t.mbtiles");
        assert_eq!(clashes.len(), 1);
        assert!(clashes[0].path.ends_with("y/t.mbtiles"));
    }

    #[tokio::test]
    async fn test_discover_inserts_in_scan_order() {
        let temp = TempDir::new().unwrap();
        for name in ["c.mbtiles", "a.mbtiles", "b.mbtiles"] {
            touch(temp.path(), name);
        }

        let mut data = json!({"existing": {"url": "x"}}).as_object().unwrap().clone();
        let settings = ReconcileSettings {
            max_concurrent_reads: 2,
            ..Default::default()
        };
        let report = discover(&mut data, temp.path(), &settings, Arc::new(FixedReader("OSM")))
            .await
            .unwrap();

        let keys: Vec<&str> = data.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["existing", "a", "b", "c"]);
        assert_eq!(report.added.len(), 3);
        assert_eq!(
            data["a"],
            json!({"mbtiles": "a.mbtiles", "tilejson": {"attribution": "OSM"}})
        );
    }

    #[tokio::test]
    async fn test_discover_without_metadata_uses_sentinel() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.mbtiles");

        let mut data = Map::new();
        let settings = ReconcileSettings {
            read_metadata: false,
            ..Default::default()
        };
        discover(&mut data, temp.path(), &settings, Arc::new(FixedReader("ignored")))
            .await
            .unwrap();
        assert_eq!(data["a"]["tilejson"]["attribution"], json!("-unknown-"));
    }
}
