//! Immutable dataset handles
//!
//! A [`Dataset`] pairs a row source with its resolved schema. Handles are
//! cheap to clone and can be shared across threads; the row sequences they
//! hand out are single-consumer iterators.

use crate::arrow_conversion::{arrow_to_schema, record_batch_to_rows, rows_to_record_batch};
use crate::codec::{decode_at, encode, infer_schema};
use crate::{Result, Row, Schema, SchemaRef, TabularError, TypedRecord, Value};
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Boxed row iterator handed out by sources
pub type RowStream = Box<dyn Iterator<Item = Result<Row>> + Send>;

type RowFactory = Arc<dyn Fn() -> Result<RowStream> + Send + Sync>;

/// How the schema of a record-backed dataset is determined
#[derive(Debug, Clone)]
pub enum SchemaMode {
    /// Derived from the record type's field descriptors
    Inferred,
    /// Supplied by the caller; every record is validated against it
    Explicit(Schema),
}

#[derive(Clone)]
enum Source {
    /// Validated rows held in memory
    Memory(Arc<[Row]>),
    /// A lazy source that can be re-opened, e.g. files on disk
    Replayable(RowFactory),
    /// A stream that can be consumed exactly once
    OneShot(Arc<Mutex<Option<RowStream>>>),
}

/// Immutable logical reference to tabular data plus its schema
#[derive(Clone)]
pub struct Dataset {
    schema: SchemaRef,
    /// Schema of the rows the source yields, before projection
    source_schema: SchemaRef,
    source: Source,
    /// Column positions of the source rows, when projected
    projection: Option<Arc<[usize]>>,
}

impl Dataset {
    /// Build a dataset from typed records
    ///
    /// In explicit mode each record is encoded against the given schema;
    /// the first failure is reported as [`TabularError::SchemaMismatch`]
    /// with the record's index.
    pub fn from_records<T, I>(records: I, mode: SchemaMode) -> Result<Self>
    where
        T: TypedRecord,
        I: IntoIterator<Item = T>,
    {
        let schema = match mode {
            SchemaMode::Inferred => infer_schema::<T>()?,
            SchemaMode::Explicit(schema) => schema,
        };

        let rows = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                encode(&record, &schema).map_err(|e| TabularError::SchemaMismatch {
                    index,
                    source: Box::new(e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_validated_rows(rows, Arc::new(schema)))
    }

    /// Build a dataset from rows, checking each against `schema`
    pub fn from_rows<I: IntoIterator<Item = Row>>(rows: I, schema: Schema) -> Result<Self> {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, row)| {
                row.check_against(&schema)
                    .map(|_| row)
                    .map_err(|reason| TabularError::RowSchemaViolation { index, reason })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_validated_rows(rows, Arc::new(schema)))
    }

    pub(crate) fn from_validated_rows(rows: Vec<Row>, schema: SchemaRef) -> Self {
        Self {
            source_schema: Arc::clone(&schema),
            schema,
            source: Source::Memory(rows.into()),
            projection: None,
        }
    }

    /// Wrap a one-shot row stream
    ///
    /// Rows are validated lazily as they are consumed. The stream can be
    /// read once; later reads fail with [`TabularError::SourceExhausted`].
    pub fn from_stream<I>(rows: I, schema: Schema) -> Self
    where
        I: Iterator<Item = Row> + Send + 'static,
    {
        Self::from_fallible_stream(rows.map(Ok), schema)
    }

    /// Like [`Dataset::from_stream`], for streams that can fail mid-way
    pub fn from_fallible_stream<I>(rows: I, schema: Schema) -> Self
    where
        I: Iterator<Item = Result<Row>> + Send + 'static,
    {
        let schema = Arc::new(schema);
        Self {
            source_schema: Arc::clone(&schema),
            schema,
            source: Source::OneShot(Arc::new(Mutex::new(Some(Box::new(rows))))),
            projection: None,
        }
    }

    /// Wrap a source that can be re-opened any number of times
    ///
    /// `factory` is called on every [`Dataset::to_rows`]; rows are
    /// validated lazily.
    pub fn from_replayable<F>(schema: SchemaRef, factory: F) -> Self
    where
        F: Fn() -> Result<RowStream> + Send + Sync + 'static,
    {
        Self {
            source_schema: Arc::clone(&schema),
            schema,
            source: Source::Replayable(Arc::new(factory)),
            projection: None,
        }
    }

    /// Build an in-memory dataset from an Arrow record batch
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = arrow_to_schema(&batch.schema(), false)?;
        let rows = record_batch_to_rows(batch, &schema)?;
        Self::from_rows(rows, schema)
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Whether [`Dataset::to_rows`] can be called more than once
    pub fn is_restartable(&self) -> bool {
        !matches!(self.source, Source::OneShot(_))
    }

    /// Lazy sequence of the dataset's rows
    ///
    /// Errors are yielded in place; the caller decides whether to continue.
    pub fn to_rows(&self) -> Result<Rows> {
        let stream: RowStream = match &self.source {
            Source::Memory(rows) => {
                let rows = Arc::clone(rows);
                Box::new((0..rows.len()).map(move |idx| Ok(rows[idx].clone())))
            }
            Source::Replayable(factory) => validated(factory()?, Arc::clone(&self.source_schema)),
            Source::OneShot(stream) => {
                let stream = stream.lock().take().ok_or(TabularError::SourceExhausted)?;
                validated(stream, Arc::clone(&self.source_schema))
            }
        };

        let stream = match &self.projection {
            Some(indices) => project(stream, Arc::clone(indices)),
            None => stream,
        };

        Ok(Rows { inner: stream })
    }

    /// Lazy sequence of decoded records, in row order
    ///
    /// A row that fails to decode yields an error at its position.
    pub fn to_records<T: TypedRecord>(&self) -> Result<RecordIter<T>> {
        Ok(RecordIter {
            rows: self.to_rows()?,
            index: 0,
            _marker: PhantomData,
        })
    }

    /// Materialize every row
    pub fn collect(&self) -> Result<Vec<Row>> {
        self.to_rows()?.collect()
    }

    pub fn count(&self) -> Result<usize> {
        match &self.source {
            Source::Memory(rows) => Ok(rows.len()),
            _ => self.to_rows()?.try_fold(0, |count, row| row.map(|_| count + 1)),
        }
    }

    /// Project to the named top-level columns, lazily
    pub fn select(&self, columns: &[&str]) -> Result<Dataset> {
        let schema = self.schema.project(columns)?;
        let indices: Vec<usize> = columns
            .iter()
            .map(|name| {
                let idx = self.schema.index_of(name).ok_or_else(|| {
                    TabularError::internal(format!("column {} vanished during projection", name))
                })?;
                Ok(match &self.projection {
                    Some(parent) => parent[idx],
                    None => idx,
                })
            })
            .collect::<Result<_>>()?;

        Ok(Dataset {
            schema: Arc::new(schema),
            source_schema: Arc::clone(&self.source_schema),
            source: self.source.clone(),
            projection: Some(indices.into()),
        })
    }

    /// Convert to Arrow record batches of at most `batch_size` rows
    pub fn to_record_batches(&self, batch_size: usize) -> Result<Vec<RecordBatch>> {
        let batch_size = batch_size.max(1);
        let mut batches = Vec::new();
        let mut pending = Vec::with_capacity(batch_size);

        for row in self.to_rows()? {
            pending.push(row?);
            if pending.len() == batch_size {
                batches.push(rows_to_record_batch(&self.schema, std::mem::take(&mut pending))?);
            }
        }
        if !pending.is_empty() || batches.is_empty() {
            batches.push(rows_to_record_batch(&self.schema, pending)?);
        }
        Ok(batches)
    }
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Source::Memory(rows) => format!("memory({} rows)", rows.len()),
            Source::Replayable(_) => "replayable".to_string(),
            Source::OneShot(_) => "one-shot stream".to_string(),
        };
        f.debug_struct("Dataset")
            .field("schema", &self.schema.to_string())
            .field("source", &source)
            .field("projection", &self.projection)
            .finish()
    }
}

/// Validate each row against the source schema, before projection
fn validated(stream: RowStream, schema: SchemaRef) -> RowStream {
    Box::new(stream.enumerate().map(move |(index, row)| {
        let row = row?;
        row.check_against(&schema)
            .map_err(|reason| TabularError::RowSchemaViolation { index, reason })?;
        Ok(row)
    }))
}

fn project(stream: RowStream, indices: Arc<[usize]>) -> RowStream {
    Box::new(stream.map(move |row| {
        let row = row?;
        let len = row.len();
        let mut values = row.into_values();
        indices
            .iter()
            .map(|&idx| {
                values
                    .get_mut(idx)
                    .map(|value| std::mem::replace(value, Value::Null))
                    .ok_or(TabularError::ArityMismatch {
                        path: "row".to_string(),
                        expected: idx + 1,
                        found: len,
                    })
            })
            .collect::<Result<Row>>()
    }))
}

/// Single-consumer lazy sequence of rows
pub struct Rows {
    inner: RowStream,
}

impl Iterator for Rows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Single-consumer lazy sequence of decoded records
pub struct RecordIter<T> {
    rows: Rows,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: TypedRecord> Iterator for RecordIter<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let index = self.index;
        self.index += 1;
        Some(row.and_then(|row| decode_at(row, &format!("row[{}]", index))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{typed_record, DataType, SchemaBuilder};

    typed_record! {
        #[derive(Debug, Clone, PartialEq)]
        struct RawPanda {
            id: i64,
            zip: String,
            happy: bool,
        }
    }

    fn pandas() -> Vec<RawPanda> {
        (0..3)
            .map(|id| RawPanda {
                id,
                zip: format!("9411{}", id),
                happy: id % 2 == 0,
            })
            .collect()
    }

    #[test]
    fn test_records_roundtrip() {
        let ds = Dataset::from_records(pandas(), SchemaMode::Inferred).unwrap();
        assert!(ds.is_restartable());
        assert_eq!(ds.count().unwrap(), 3);

        let back: Vec<RawPanda> = ds.to_records().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(back, pandas());
        // restartable: a second pass sees the same rows
        assert_eq!(ds.collect().unwrap().len(), 3);
    }

    #[test]
    fn test_explicit_schema_mismatch_reports_index() {
        let schema = SchemaBuilder::new()
            .field("id", DataType::Long, false)
            .field("zip", DataType::Long, false)
            .field("happy", DataType::Boolean, false)
            .build()
            .unwrap();
        let err = Dataset::from_records(pandas(), SchemaMode::Explicit(schema)).unwrap_err();
        assert!(matches!(err, TabularError::SchemaMismatch { index: 0, .. }));
    }

    #[test]
    fn test_from_rows_rejects_bad_arity() {
        let schema = infer_schema::<RawPanda>().unwrap();
        let rows = vec![
            Row::new(vec![Value::from(1i64), Value::from("94110"), Value::from(true)]),
            Row::new(vec![Value::from(2i64)]),
        ];
        let err = Dataset::from_rows(rows, schema).unwrap_err();
        assert!(matches!(err, TabularError::RowSchemaViolation { index: 1, .. }));
    }

    #[test]
    fn test_one_shot_stream() {
        let schema = infer_schema::<RawPanda>().unwrap();
        let rows = vec![Row::new(vec![Value::from(1i64), Value::from("94110"), Value::from(true)])];
        let ds = Dataset::from_stream(rows.into_iter(), schema);
        assert!(!ds.is_restartable());
        assert_eq!(ds.collect().unwrap().len(), 1);
        assert!(matches!(ds.to_rows(), Err(TabularError::SourceExhausted)));
    }

    #[test]
    fn test_stream_violation_is_lazy() {
        let schema = infer_schema::<RawPanda>().unwrap();
        let rows = vec![
            Row::new(vec![Value::from(1i64), Value::from("94110"), Value::from(true)]),
            Row::new(vec![Value::from(2i64), Value::Null, Value::from(true)]),
        ];
        let ds = Dataset::from_stream(rows.into_iter(), schema);
        let results: Vec<_> = ds.to_rows().unwrap().collect();
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(TabularError::RowSchemaViolation { index: 1, .. })
        ));
    }

    #[test]
    fn test_decode_failures_are_per_element() {
        let schema = SchemaBuilder::new()
            .field("id", DataType::Long, false)
            .field("zip", DataType::String, true)
            .field("happy", DataType::Boolean, false)
            .build()
            .unwrap();
        let rows = vec![
            Row::new(vec![Value::from(1i64), Value::from("94110"), Value::from(true)]),
            Row::new(vec![Value::from(2i64), Value::Null, Value::from(true)]),
            Row::new(vec![Value::from(3i64), Value::from("94112"), Value::from(false)]),
        ];
        let ds = Dataset::from_rows(rows, schema).unwrap();
        let results: Vec<Result<RawPanda>> = ds.to_records().unwrap().collect();
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("row[1].zip"));
        assert_eq!(results[2].as_ref().unwrap().id, 3);
    }

    #[test]
    fn test_select_and_batches() {
        let ds = Dataset::from_records(pandas(), SchemaMode::Inferred).unwrap();
        let zips = ds.select(&["zip", "id"]).unwrap();
        assert_eq!(zips.schema().field_names(), vec!["zip", "id"]);
        let rows = zips.collect().unwrap();
        assert_eq!(rows[0], Row::new(vec![Value::from("94110"), Value::from(0i64)]));

        let only_id = zips.select(&["id"]).unwrap();
        assert_eq!(only_id.collect().unwrap()[2], Row::new(vec![Value::from(2i64)]));

        let batches = ds.to_record_batches(2).unwrap();
        assert_eq!(batches.len(), 2);
        let back = Dataset::from_record_batch(&batches[0]).unwrap();
        assert_eq!(back.count().unwrap(), 2);
    }
}
