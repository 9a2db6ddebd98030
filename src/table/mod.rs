use anyhow::{bail, Context, Result};
use arrow::{
    array::ArrayRef,
    compute,
    csv::{reader::Format, ReaderBuilder, WriterBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::Compression,
    file::properties::WriterProperties,
};
use std::{fs, fs::File, io::Cursor, path::Path, sync::Arc};

/// An in-memory table: named columns aligned by row index, backed by a single
/// Arrow `RecordBatch`. Reads that produce multiple batches are concatenated
/// on load, so every operation sees the whole table at once.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
}

impl Table {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Build a table from `(name, array)` pairs. All arrays must share the
    /// same length. Every field is marked nullable.
    pub fn from_columns(columns: Vec<(&str, ArrayRef)>) -> Result<Self> {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, arr)| Field::new(*name, arr.data_type().clone(), true))
            .collect();
        let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, arr)| arr).collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
            .context("building record batch from columns")?;
        Ok(Self { batch })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.batch.num_rows(), self.batch.num_columns())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().column_with_name(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<ArrayRef> {
        self.batch.column_by_name(name).cloned()
    }

    /// Rename one column via a schema-mapping projection: the data arrays are
    /// shared, only the schema is rebuilt. Renaming a column to its current
    /// name is a no-op.
    pub fn rename(&self, from: &str, to: &str) -> Result<Table> {
        if from == to {
            return Ok(self.clone());
        }
        if !self.has_column(from) {
            bail!(
                "no column `{}` to rename; columns: {:?}",
                from,
                self.column_names()
            );
        }
        let fields: Vec<Field> = self
            .batch
            .schema()
            .fields()
            .iter()
            .map(|f| {
                let name = if f.name() == from { to } else { f.name().as_str() };
                Field::new(name, f.data_type().clone(), f.is_nullable())
            })
            .collect();
        let batch = RecordBatch::try_new(
            Arc::new(Schema::new(fields)),
            self.batch.columns().to_vec(),
        )
        .with_context(|| format!("renaming column `{}` -> `{}`", from, to))?;
        Ok(Table::new(batch))
    }

    /// Cast one column to Int64, leaving the others untouched.
    pub fn cast_to_int(&self, name: &str) -> Result<Table> {
        let schema = self.batch.schema();
        let (idx, _) = schema
            .column_with_name(name)
            .with_context(|| format!("no column `{}` to cast", name))?;

        let cast = compute::cast(self.batch.column(idx), &DataType::Int64)
            .with_context(|| format!("casting column `{}` to Int64", name))?;

        let fields: Vec<Field> = schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, f)| {
                if i == idx {
                    Field::new(f.name(), DataType::Int64, f.is_nullable())
                } else {
                    Field::new(f.name(), f.data_type().clone(), f.is_nullable())
                }
            })
            .collect();
        let mut columns = self.batch.columns().to_vec();
        columns[idx] = cast;

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .with_context(|| format!("rebuilding batch after casting `{}`", name))?;
        Ok(Table::new(batch))
    }

    /// Parse a headered CSV blob, inferring column types from the full input.
    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Table> {
        let format = Format::default().with_header(true);
        let (schema, _) = format
            .infer_schema(Cursor::new(bytes), None)
            .context("inferring CSV schema")?;
        let schema = Arc::new(schema);

        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(Cursor::new(bytes))
            .context("creating CSV reader")?;
        let batches = reader
            .collect::<std::result::Result<Vec<RecordBatch>, _>>()
            .context("decoding CSV records")?;

        let batch = if batches.is_empty() {
            RecordBatch::new_empty(schema)
        } else {
            compute::concat_batches(&schema, &batches).context("concatenating CSV batches")?
        };
        Ok(Table::new(batch))
    }

    pub fn read_csv(path: impl AsRef<Path>) -> Result<Table> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("reading CSV `{}`", path.display()))?;
        Self::from_csv_bytes(&bytes)
            .with_context(|| format!("parsing CSV `{}`", path.display()))
    }

    pub fn read_parquet(path: impl AsRef<Path>) -> Result<Table> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening parquet `{}`", path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata of `{}`", path.display()))?;
        let schema = builder.schema().clone();
        let reader = builder.build().context("building parquet reader")?;

        let batches = reader
            .collect::<std::result::Result<Vec<RecordBatch>, _>>()
            .context("decoding parquet batches")?;
        let batch = if batches.is_empty() {
            RecordBatch::new_empty(schema)
        } else {
            compute::concat_batches(&schema, &batches)
                .context("concatenating parquet batches")?
        };
        Ok(Table::new(batch))
    }

    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("creating `{}`", path.display()))?;
        let mut writer = WriterBuilder::new().with_header(true).build(file);
        writer
            .write(&self.batch)
            .with_context(|| format!("writing CSV `{}`", path.display()))?;
        Ok(())
    }

    pub fn write_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("creating `{}`", path.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, self.batch.schema(), Some(props))
            .context("creating parquet writer")?;
        writer
            .write(&self.batch)
            .with_context(|| format!("writing parquet `{}`", path.display()))?;
        writer.close().context("closing parquet writer")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array, StringArray};

    fn sample() -> Table {
        Table::from_columns(vec![
            (
                "y",
                Arc::new(Int64Array::from(vec![0, 1, 1, 0])) as ArrayRef,
            ),
            (
                "score",
                Arc::new(Float64Array::from(vec![0.1, 0.7, 0.3, 0.9])) as ArrayRef,
            ),
            (
                "group",
                Arc::new(StringArray::from(vec!["a", "b", "a", "b"])) as ArrayRef,
            ),
        ])
        .unwrap()
    }

    #[test]
    fn shape_and_names() {
        let t = sample();
        assert_eq!(t.shape(), (4, 3));
        assert_eq!(t.column_names(), vec!["y", "score", "group"]);
        assert!(t.has_column("score"));
        assert!(!t.has_column("missing"));
    }

    #[test]
    fn rename_is_a_projection() {
        let t = sample();
        let renamed = t.rename("y", "churn").unwrap();
        assert_eq!(renamed.column_names(), vec!["churn", "score", "group"]);
        // original untouched, data shared
        assert_eq!(t.column_names(), vec!["y", "score", "group"]);
        assert_eq!(
            renamed.column("churn").unwrap().as_ref(),
            t.column("y").unwrap().as_ref()
        );
    }

    #[test]
    fn rename_same_name_is_noop() {
        let t = sample();
        let renamed = t.rename("y", "y").unwrap();
        assert_eq!(renamed.column_names(), t.column_names());
    }

    #[test]
    fn rename_missing_column_fails() {
        assert!(sample().rename("nope", "x").is_err());
    }

    #[test]
    fn cast_to_int_changes_only_target_dtype() {
        let t = sample();
        let cast = t.cast_to_int("score").unwrap();
        assert_eq!(
            cast.column("score").unwrap().data_type(),
            &DataType::Int64
        );
        assert_eq!(
            cast.column("y").unwrap().as_ref(),
            t.column("y").unwrap().as_ref()
        );
    }

    #[test]
    fn csv_round_trip_preserves_rows() -> Result<()> {
        let t = sample();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.csv");
        t.write_csv(&path)?;
        let back = Table::read_csv(&path)?;
        assert_eq!(back.shape(), t.shape());
        assert_eq!(back.column_names(), t.column_names());
        Ok(())
    }

    #[test]
    fn parquet_round_trip_preserves_batch() -> Result<()> {
        let t = sample();
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sample.parquet");
        t.write_parquet(&path)?;
        let back = Table::read_parquet(&path)?;
        assert_eq!(back.batch(), t.batch());
        Ok(())
    }

    #[test]
    fn csv_bytes_infers_types() -> Result<()> {
        let t = Table::from_csv_bytes(b"a,b\n1,x\n0,y\n")?;
        assert_eq!(t.shape(), (2, 2));
        assert_eq!(t.column("a").unwrap().data_type(), &DataType::Int64);
        Ok(())
    }
}
