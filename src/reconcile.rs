//! One reconciliation pass: prune, discover, merge, sort, write.

use crate::config::ReconcileSettings;
use crate::discover::{DiscoveryReport, discover};
use crate::document::{self, Document};
use crate::error::Result;
use crate::metadata::{AttributionReader, MbtilesReader};
use crate::natural::sort_keys;
use crate::prune::{RemovedEntry, prune_missing};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Files involved in a run.
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    /// Template whose non-`data` fields are authoritative. Never written.
    pub base_config: PathBuf,
    /// Runtime configuration; read, then overwritten.
    pub config: PathBuf,
    /// Write here instead of over `config`.
    pub output: Option<PathBuf>,
    /// Render the result without writing it.
    pub dry_run: bool,
}

impl ReconcileRequest {
    pub fn new(base_config: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            base_config: base_config.into(),
            config: config.into(),
            output: None,
            dry_run: false,
        }
    }

    /// Where the result goes.
    pub fn output_path(&self) -> &Path {
        self.output.as_deref().unwrap_or(self.config.as_path())
    }
}

/// What a run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: Vec<RemovedEntry>,
    /// `None` when no tile directory was configured
    pub discovery: Option<DiscoveryReport>,
    /// Entries in the written `data`
    pub entries: usize,
    pub sorted: bool,
}

impl ReconcileReport {
    pub fn added_count(&self) -> usize {
        self.discovery.as_ref().map_or(0, |d| d.added.len())
    }

    pub fn skipped_count(&self) -> usize {
        self.discovery.as_ref().map_or(0, |d| d.skipped.len())
    }
}

/// Reconciles runtime configurations against the tile directory.
#[derive(Clone)]
pub struct Reconciler {
    settings: ReconcileSettings,
    reader: Arc<dyn AttributionReader>,
}

impl Reconciler {
    /// Create a reconciler that reads attributions from MBTiles files.
    pub fn new(settings: ReconcileSettings) -> Self {
        Self {
            settings,
            reader: Arc::new(MbtilesReader::new()),
        }
    }

    /// Replace the attribution reader.
    pub fn with_reader(mut self, reader: Arc<dyn AttributionReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Reconcile in memory. `config_path` only labels errors.
    pub async fn reconcile_documents(
        &self,
        template: Document,
        mut runtime: Document,
        config_path: &Path,
    ) -> Result<(Document, ReconcileReport)> {
        let mut data = document::take_data(&mut runtime, config_path)?;
        let tiles_root = self.settings.tiles_dir.as_deref();

        let removed = prune_missing(&mut data, tiles_root);

        let discovery = match tiles_root {
            Some(root) => {
                Some(discover(&mut data, root, &self.settings, Arc::clone(&self.reader)).await?)
            }
            None => None,
        };

        if self.settings.natural_sort {
            data = sort_keys(data);
        }

        let report = ReconcileReport {
            removed,
            discovery,
            entries: data.len(),
            sorted: self.settings.natural_sort,
        };
        Ok((document::merge_data(template, data), report))
    }

    /// Load both documents, reconcile, and write the result.
    ///
    /// Nothing is written unless every earlier step succeeded. Returns the
    /// rendered document alongside the report.
    pub async fn run(&self, request: &ReconcileRequest) -> Result<(String, ReconcileReport)> {
        let template = document::load(&request.base_config)?;
        let runtime = document::load(&request.config)?;

        let (merged, report) = self
            .reconcile_documents(template, runtime, &request.config)
            .await?;
        let rendered = document::render(&merged)?;

        if request.dry_run {
            info!("Dry run, configuration not written");
        } else {
            let output = request.output_path();
            document::write_atomic(output, &rendered)?;
            info!(path = %output.display(), "Wrote configuration");
        }

        info!(
            removed = report.removed.len(),
            added = report.added_count(),
            skipped = report.skipped_count(),
            entries = report.entries,
            "Config merged successfully"
        );
        Ok((rendered, report))
    }
}
