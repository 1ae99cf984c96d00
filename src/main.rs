//! tile-reconcile
//!
//! Prunes configuration entries for missing tile files, adds entries for new
//! ones, and merges the result into the base template.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tile_reconcile::cli::Cli;
use tile_reconcile::config::{ConfigLoader, ConfigPaths};
use tile_reconcile::logging::{self, LogTarget};
use tile_reconcile::reconcile::Reconciler;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error merging configs: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Keep stdout clean for the rendered document on dry runs
    let target = match LogTarget::parse(&cli.log) {
        LogTarget::Stdout if cli.dry_run => LogTarget::Stderr,
        target => target,
    };
    logging::init(&target, cli.verbose).context("failed to initialise logging")?;

    let mut paths = ConfigPaths::discover();
    if let Some(ref settings_path) = cli.settings {
        paths = paths.with_explicit(settings_path);
    }
    let mut loader = ConfigLoader::load(paths)?;
    for (tier, path) in loader.sources() {
        debug!(tier = %tier, path = %path.display(), "Using settings file");
    }

    cli.apply_to(loader.settings_mut());
    let settings = loader.into_settings();
    settings.validate()?;

    info!(
        base_config = %cli.base_config.display(),
        config = %cli.config.display(),
        tiles_dir = ?settings.tiles_dir,
        key_mode = %settings.key_mode,
        natural_sort = settings.natural_sort,
        "Reconciling configuration"
    );

    let request = cli.request();
    let (rendered, _report) = Reconciler::new(settings).run(&request).await?;

    if request.dry_run {
        print!("{}", rendered);
    }

    Ok(())
}
