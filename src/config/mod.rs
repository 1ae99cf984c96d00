//! Reconciler settings.
//!
//! Settings come from up to five tiers, merged field by field:
//! 1. **Defaults** - built into the binary
//! 2. **Project** - `./tile-reconcile.yaml`
//! 3. **User** - `~/.tile-reconcile/config.yaml`
//! 4. **Environment** - `TILE_RECONCILE_*` variables
//! 5. **CLI** - flags, applied by the binary on top of the loaded settings
//!
//! An explicit file (`--settings` or `TILE_RECONCILE_SETTINGS`) replaces the
//! project and user tiers and must parse, whereas broken tier files are
//! skipped with a warning.
//!
//! ## Environment Variables
//! - `TILE_RECONCILE_TILES_DIR` - Tile directory root
//! - `TILE_RECONCILE_KEY_MODE` - `stem`, `dir-stem` or `path`
//! - `TILE_RECONCILE_SORT` - Natural key sort on/off
//! - `TILE_RECONCILE_READ_METADATA` - Read attribution from tile files on/off
//! - `TILE_RECONCILE_MAX_CONCURRENT_READS` - Metadata read fan-out limit

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier, SETTINGS_PATH_ENV};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
