mod catalog;
mod checkpoint;
mod fragdb;
mod http;
mod imaging;
mod matcher;
mod metrics;
mod models;
mod normalize;
mod pipeline;
mod products;
mod rules;
mod store;

use checkpoint::CheckpointStore;
use clap::Parser;
use pipeline::{Pipeline, PipelineConfig};
use rules::Rules;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

/// Builds the product catalog's image set: mirrors the remote designer
/// listings, fuzzy-matches price-list products against them, downloads and
/// re-encodes the matched images, and writes the references back into the
/// products file. Safe to stop and rerun; finished work is never redone.
#[derive(Parser, Debug)]
#[command(name = "sillage", version, about)]
struct Cli {
    /// Maximum product groups to process this run
    #[arg(long)]
    max: Option<usize>,

    /// Maximum new namespaces to scrape this run
    #[arg(long)]
    max_namespaces: Option<usize>,

    /// Clear the catalog mirror and checkpoint, then start fresh
    #[arg(long)]
    reset: bool,

    /// Clear only the failed list so past misses are retried
    #[arg(long)]
    reset_failed: bool,

    /// Report planned work without network or filesystem side effects
    #[arg(long)]
    dry_run: bool,

    /// Directory holding products.json and the pipeline's durable state
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Directory where encoded images are written
    #[arg(long, default_value = "public/images/products")]
    images_dir: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(target = "sillage.cli", "run failed: {err}");
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> eyre::Result<()> {
    let rules = Rules::load()?;

    let mut config = PipelineConfig::new(cli.data_dir, cli.images_dir);
    config.max_groups = cli.max;
    config.max_namespaces = cli.max_namespaces;
    config.dry_run = cli.dry_run;

    if cli.reset {
        remove_if_present(&config.catalog_path())?;
        remove_if_present(&config.checkpoint_path())?;
        info!(target = "sillage.cli", "durable state cleared");
    } else if cli.reset_failed {
        let mut checkpoint = CheckpointStore::load(&config.checkpoint_path())?;
        let cleared = checkpoint.clear_failed();
        checkpoint.save()?;
        info!(target = "sillage.cli", cleared = cleared, "failed list cleared");
    }

    let mut local = products::load(&config.products_path())?;
    info!(
        target = "sillage.cli",
        products = local.len(),
        "products loaded"
    );

    let pipeline = Pipeline::new(config, rules)?;
    let summary = pipeline.run(&mut local).await?;

    info!(
        target = "sillage.cli",
        downloaded = summary.downloaded,
        missed = summary.missed,
        completed = summary.completed_total,
        groups = summary.groups_total,
        coverage = %format!("{:.1}%", summary.coverage() * 100.0),
        "run finished"
    );
    Ok(())
}

fn remove_if_present(path: &std::path::Path) -> eyre::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
