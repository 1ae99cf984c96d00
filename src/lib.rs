//! Tile server configuration reconciler.
//!
//! Brings a tile server's runtime configuration back in line with its base
//! template and with the MBTiles files actually present on disk.

pub mod cli;
pub mod config;
pub mod discover;
pub mod document;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod natural;
pub mod prune;
pub mod reconcile;
pub mod tileset;
