use crate::table::Table;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::warn;

/// Default root for raw and standardized outputs.
pub const RAW_DIR: &str = "data/raw";

pub fn csv_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.csv", name))
}

pub fn parquet_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.parquet", name))
}

pub fn std_csv_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_std.csv", name))
}

pub fn std_parquet_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_std.parquet", name))
}

pub fn meta_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}_std_meta.json", name))
}

/// Outcome of persisting one table. The CSV is the primary format and always
/// present; the parquet copy is best-effort and `None` when its write failed.
#[derive(Debug)]
pub struct SavedTable {
    pub csv: PathBuf,
    pub parquet: Option<PathBuf>,
}

/// Write `table` as CSV (required) and parquet (optional). A parquet failure
/// is logged and swallowed; a CSV failure aborts the run.
pub fn save_table(table: &Table, csv: &Path, parquet: &Path) -> Result<SavedTable> {
    table
        .write_csv(csv)
        .with_context(|| format!("saving `{}`", csv.display()))?;

    let parquet = match table.write_parquet(parquet) {
        Ok(()) => Some(parquet.to_path_buf()),
        Err(e) => {
            warn!("parquet save failed (optional): {:#}", e);
            None
        }
    };

    Ok(SavedTable {
        csv: csv.to_path_buf(),
        parquet,
    })
}

/// Load `{name}.parquet` from `dir` if present, else fall back to
/// `{name}.csv`.
pub fn load_table(dir: &Path, name: &str) -> Result<Table> {
    let parquet = parquet_path(dir, name);
    if parquet.exists() {
        return Table::read_parquet(&parquet);
    }
    let csv = csv_path(dir, name);
    if csv.exists() {
        return Table::read_csv(&csv);
    }
    bail!(
        "no `{}` or `{}`; run the fetcher first",
        parquet.display(),
        csv.display()
    );
}

/// Serialize `value` as pretty JSON with a trailing newline, writing to a
/// temp file and renaming over the destination so readers never observe a
/// partial report.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "meta.json".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    let mut tmp = fs::File::create(&tmp_path)
        .with_context(|| format!("creating `{}`", tmp_path.display()))?;
    serde_json::to_writer_pretty(&mut tmp, value).context("serializing JSON")?;
    tmp.write_all(b"\n")?;

    fs::rename(&tmp_path, path)
        .with_context(|| format!("renaming `{}` -> `{}`", tmp_path.display(), path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array};
    use serde_json::Value;
    use std::sync::Arc;

    fn tiny(values: Vec<i64>) -> Table {
        Table::from_columns(vec![(
            "x",
            Arc::new(Int64Array::from(values)) as ArrayRef,
        )])
        .unwrap()
    }

    #[test]
    fn save_writes_both_formats() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = tiny(vec![1, 2, 3]);
        let saved = save_table(
            &table,
            &csv_path(dir.path(), "t"),
            &parquet_path(dir.path(), "t"),
        )?;
        assert!(saved.csv.exists());
        assert!(saved.parquet.as_deref().is_some_and(Path::exists));
        Ok(())
    }

    #[test]
    fn parquet_failure_is_not_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let table = tiny(vec![1, 2, 3]);
        // parquet path points into a directory that does not exist
        let saved = save_table(
            &table,
            &csv_path(dir.path(), "t"),
            &dir.path().join("missing").join("t.parquet"),
        )?;
        assert!(saved.csv.exists());
        assert!(saved.parquet.is_none());
        Ok(())
    }

    #[test]
    fn load_prefers_parquet_over_csv() -> Result<()> {
        let dir = tempfile::tempdir()?;
        tiny(vec![1]).write_csv(csv_path(dir.path(), "t"))?;
        tiny(vec![1, 2]).write_parquet(parquet_path(dir.path(), "t"))?;

        let loaded = load_table(dir.path(), "t")?;
        assert_eq!(loaded.num_rows(), 2);
        Ok(())
    }

    #[test]
    fn load_falls_back_to_csv() -> Result<()> {
        let dir = tempfile::tempdir()?;
        tiny(vec![1, 2, 3]).write_csv(csv_path(dir.path(), "t"))?;
        let loaded = load_table(dir.path(), "t")?;
        assert_eq!(loaded.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn load_without_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_table(dir.path(), "t").is_err());
    }

    #[test]
    fn write_json_is_pretty_with_trailing_newline() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = meta_path(dir.path(), "t");
        write_json(&serde_json::json!({ "shape": [2, 3] }), &path)?;

        let text = fs::read_to_string(&path)?;
        assert!(text.ends_with('\n'));
        let parsed: Value = serde_json::from_str(&text)?;
        assert_eq!(parsed["shape"][1], 3);
        // no stray temp file left behind
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}
