//! CLI definitions for tile-reconcile
//!
//! Positional arguments follow the original deployment scripts:
//! `tile-reconcile <BASE_CONFIG> <CONFIG> [TILES_DIR]`.

use crate::config::{KeyMode, ReconcileSettings};
use crate::reconcile::ReconcileRequest;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Key derivation rule as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KeyModeArg {
    /// Bare file stem
    Stem,
    /// `<parent-directory>-<stem>`
    DirStem,
    /// Root-relative path joined with `-`
    Path,
}

impl From<KeyModeArg> for KeyMode {
    fn from(arg: KeyModeArg) -> Self {
        match arg {
            KeyModeArg::Stem => KeyMode::Stem,
            KeyModeArg::DirStem => KeyMode::DirStem,
            KeyModeArg::Path => KeyMode::Path,
        }
    }
}

/// Reconcile a tile server configuration with the tile files on disk
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base configuration template (never modified)
    #[arg(value_name = "BASE_CONFIG")]
    pub base_config: PathBuf,

    /// Runtime configuration to reconcile and overwrite
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Root directory of the tile files (enables discovery)
    #[arg(value_name = "TILES_DIR")]
    pub tiles_dir: Option<PathBuf>,

    /// How keys are derived for newly discovered tile files
    #[arg(long, value_enum)]
    pub key_mode: Option<KeyModeArg>,

    /// Sort tileset keys in natural order before writing
    #[arg(long, overrides_with = "no_sort")]
    pub sort: bool,

    /// Keep tileset keys in their existing order
    #[arg(long, overrides_with = "sort")]
    pub no_sort: bool,

    /// Do not open tile files; new entries get the unknown attribution
    #[arg(long)]
    pub no_metadata: bool,

    /// Tile file extension to look for (repeatable, default: mbtiles)
    #[arg(long = "extension", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Maximum number of tile files read at once
    #[arg(long, value_name = "N")]
    pub max_concurrent_reads: Option<usize>,

    /// Write the result here instead of over CONFIG
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Print the result to stdout without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Settings file (replaces the project and user settings files)
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout (default), 2/stderr, or filename
    #[arg(short, long, default_value = "1")]
    pub log: String,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    pub fn apply_to(&self, settings: &mut ReconcileSettings) {
        if let Some(ref tiles_dir) = self.tiles_dir {
            settings.tiles_dir = Some(tiles_dir.clone());
        }
        if let Some(mode) = self.key_mode {
            settings.key_mode = mode.into();
        }
        if self.sort {
            settings.natural_sort = true;
        }
        if self.no_sort {
            settings.natural_sort = false;
        }
        if self.no_metadata {
            settings.read_metadata = false;
        }
        if !self.extensions.is_empty() {
            settings.extensions = self.extensions.clone();
        }
        if let Some(max) = self.max_concurrent_reads {
            settings.max_concurrent_reads = max;
        }
    }

    /// The files this invocation works on.
    pub fn request(&self) -> ReconcileRequest {
        ReconcileRequest {
            base_config: self.base_config.clone(),
            config: self.config.clone(),
            output: self.output.clone(),
            dry_run: self.dry_run,
        }
    }
}
