use anyhow::Result;
use arrow::array::Int64Array;
use causalprep::{
    standardize::{standardize, TreatmentHeuristic, OUTCOME_COL, TREATMENT_COL},
    store,
    table::Table,
};
use std::{env, path::Path};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn head(table: &Table, col: &str, n: usize) -> Vec<Option<i64>> {
    table
        .column(col)
        .and_then(|a| {
            a.as_any()
                .downcast_ref::<Int64Array>()
                .map(|a| a.iter().take(n).collect())
        })
        .unwrap_or_default()
}

fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();

    // positional overrides, fixed defaults otherwise
    let name = env::args().nth(1).unwrap_or_else(|| "orange_belgium".to_string());
    let target = env::args().nth(2).unwrap_or_else(|| "y".to_string());

    let raw_dir = Path::new(store::RAW_DIR);
    let table = store::load_table(raw_dir, &name)?;

    let out = standardize(&table, &target, &TreatmentHeuristic::default())?;

    let saved = store::save_table(
        &out.table,
        &store::std_csv_path(raw_dir, &name),
        &store::std_parquet_path(raw_dir, &name),
    )?;
    let meta_path = store::meta_path(raw_dir, &name);
    store::write_json(&out.meta, &meta_path)?;

    info!("standardized saved: {}", saved.csv.display());
    if let Some(parquet) = &saved.parquet {
        info!("standardized saved: {}", parquet.display());
    }
    info!(
        "{}/{} head: {:?} / {:?}",
        OUTCOME_COL,
        TREATMENT_COL,
        head(&out.table, OUTCOME_COL, 5),
        head(&out.table, TREATMENT_COL, 5)
    );
    info!("meta path: {}", meta_path.display());
    Ok(())
}
