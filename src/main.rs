use anyhow::{bail, Context, Result};
use causalprep::{catalog::Catalog, store};
use clap::Parser;
use std::{fs, path::PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Fetch an OpenML dataset and persist it under data/raw/"
)]
struct Args {
    /// Numeric OpenML dataset id.
    #[arg(long, default_value_t = 45580)]
    dataset_id: u64,
    /// Local name used for the output files.
    #[arg(long, default_value = "orange_belgium")]
    name: String,
}

fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();

    let args = Args::parse();
    info!(id = args.dataset_id, "downloading dataset from OpenML");

    let catalog = Catalog::default();
    let desc = catalog.fetch_description(args.dataset_id)?;
    let target = desc
        .default_target_attribute
        .clone()
        .with_context(|| format!("dataset `{}` declares no target attribute", desc.name))?;

    let table = catalog.fetch_table(&desc)?;
    if !table.has_column(&target) {
        bail!(
            "catalog declares target `{}` but the downloaded table only has {:?}",
            target,
            table.column_names().iter().take(20).collect::<Vec<_>>()
        );
    }

    let raw_dir = PathBuf::from(store::RAW_DIR);
    fs::create_dir_all(&raw_dir)
        .with_context(|| format!("creating `{}`", raw_dir.display()))?;

    let saved = store::save_table(
        &table,
        &store::csv_path(&raw_dir, &args.name),
        &store::parquet_path(&raw_dir, &args.name),
    )?;

    info!("saved: {}", saved.csv.display());
    if let Some(parquet) = &saved.parquet {
        info!("saved: {}", parquet.display());
    }
    let (rows, cols) = table.shape();
    info!("shape: {} rows x {} cols", rows, cols);
    info!(
        "columns (first 15): {:?}",
        table.column_names().iter().take(15).collect::<Vec<_>>()
    );
    info!("default target: {}", target);
    Ok(())
}
