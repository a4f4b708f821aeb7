//! Core Parquet writing functionality

use crate::arrow_conversion::{rows_to_record_batch, schema_to_arrow};
use crate::{DataType, Result, Row, SchemaRef, TabularError, Value};
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rand::Rng;
use std::io::Write;
use std::str::FromStr;

// Default configuration constants
const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_MEMORY_THRESHOLD: usize = 100 * 1024 * 1024; // 100MB
const DEFAULT_SAMPLE_SIZE: usize = 100;
const MIN_BATCH_SIZE: usize = 10;
const MIN_SAMPLES_FOR_ESTIMATE: usize = 10;

/// Compression codecs accepted by the `compression` option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    Uncompressed,
    Snappy,
    Zstd,
    Lz4,
}

impl CompressionCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionCodec::Uncompressed => "uncompressed",
            CompressionCodec::Snappy => "snappy",
            CompressionCodec::Zstd => "zstd",
            CompressionCodec::Lz4 => "lz4",
        }
    }

    pub(crate) fn to_parquet(self) -> Compression {
        match self {
            CompressionCodec::Uncompressed => Compression::UNCOMPRESSED,
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Zstd => Compression::ZSTD(ZstdLevel::default()),
            CompressionCodec::Lz4 => Compression::LZ4_RAW,
        }
    }
}

impl FromStr for CompressionCodec {
    type Err = TabularError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uncompressed" | "none" => Ok(CompressionCodec::Uncompressed),
            "snappy" => Ok(CompressionCodec::Snappy),
            "zstd" => Ok(CompressionCodec::Zstd),
            "lz4" => Ok(CompressionCodec::Lz4),
            other => Err(TabularError::invalid_option(
                "compression",
                format!("unknown codec '{}', expected uncompressed, snappy, zstd or lz4", other),
            )),
        }
    }
}

/// Builder for creating a configured Writer
pub struct WriterBuilder {
    compression: CompressionCodec,
    batch_size: Option<usize>,
    memory_threshold: usize,
    sample_size: usize,
}

impl Default for WriterBuilder {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::Snappy,
            batch_size: None,
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

impl WriterBuilder {
    /// Create a new WriterBuilder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the compression algorithm
    pub fn with_compression(mut self, compression: CompressionCodec) -> Self {
        self.compression = compression;
        self
    }

    /// Set a fixed batch size (disables dynamic sizing)
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size.max(1));
        self
    }

    /// Set the memory threshold for flushing
    pub fn with_memory_threshold(mut self, threshold: usize) -> Self {
        self.memory_threshold = threshold;
        self
    }

    /// Set the sample size for row size estimation
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size;
        self
    }

    /// Build a Writer with the configured settings
    pub fn build<W: Write + Send>(self, writer: W, schema: SchemaRef) -> Result<Writer<W>> {
        let arrow_schema = schema_to_arrow(&schema);

        let props = WriterProperties::builder()
            .set_compression(self.compression.to_parquet())
            .build();

        let arrow_writer = ArrowWriter::try_new(writer, arrow_schema, Some(props))?;

        Ok(Writer {
            arrow_writer: Some(arrow_writer),
            schema,
            buffered_rows: Vec::new(),
            current_batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            memory_threshold: self.memory_threshold,
            sample_size: self.sample_size,
            size_samples: Vec::with_capacity(self.sample_size),
            rows_seen: 0,
            total_rows_written: 0,
            fixed_batch_size: self.batch_size,
        })
    }
}

/// Row-oriented Parquet writer that works with any type implementing Write
pub struct Writer<W: Write + Send> {
    arrow_writer: Option<ArrowWriter<W>>,
    schema: SchemaRef,
    buffered_rows: Vec<Row>,
    current_batch_size: usize,
    memory_threshold: usize,
    sample_size: usize,
    size_samples: Vec<usize>,
    rows_seen: usize,
    total_rows_written: usize,
    fixed_batch_size: Option<usize>,
}

impl<W> Writer<W>
where
    W: Write + Send,
{
    /// Create a new writer with default settings
    pub fn new(writer: W, schema: SchemaRef) -> Result<Self> {
        WriterBuilder::new().build(writer, schema)
    }

    /// Write a batch of rows
    pub fn write_rows<I: IntoIterator<Item = Row>>(&mut self, rows: I) -> Result<()> {
        for row in rows {
            self.write_row(row)?;
        }
        Ok(())
    }

    /// Write a single row
    ///
    /// Rows are validated against the schema, buffered, and written in
    /// batches sized from sampled row sizes.
    pub fn write_row(&mut self, row: Row) -> Result<()> {
        row.check_against(&self.schema)
            .map_err(|reason| TabularError::RowSchemaViolation {
                index: self.rows_seen,
                reason,
            })?;

        // Sample row size for dynamic batch sizing
        if self.fixed_batch_size.is_none() {
            self.sample_row_size(&row);
        }

        self.rows_seen += 1;
        self.buffered_rows.push(row);

        if self.buffered_rows.len() >= self.current_batch_size {
            self.flush_buffered_rows()?;
        }

        Ok(())
    }

    /// Rows accepted so far, buffered or written
    pub fn rows_written(&self) -> usize {
        self.rows_seen
    }

    /// Sample row size for dynamic batch sizing using reservoir sampling
    fn sample_row_size(&mut self, row: &Row) {
        let row_size = self.estimate_row_size(row);

        if self.size_samples.len() < self.sample_size {
            self.size_samples.push(row_size);
        } else {
            // Reservoir sampling
            let mut rng = rand::rng();
            let idx = rng.random_range(0..=self.rows_seen);
            if idx < self.sample_size {
                self.size_samples[idx] = row_size;
            }
        }

        if self.size_samples.len() >= MIN_SAMPLES_FOR_ESTIMATE {
            self.update_batch_size();
        }
    }

    /// Estimate the memory size of a single row
    fn estimate_row_size(&self, row: &Row) -> usize {
        row.values()
            .iter()
            .zip(self.schema.fields())
            .map(|(value, field)| estimate_value_size(value, field.data_type()))
            .sum()
    }

    /// Update dynamic batch size based on current samples
    fn update_batch_size(&mut self) {
        if self.size_samples.is_empty() {
            return;
        }

        let total_size: usize = self.size_samples.iter().sum();
        let avg_row_size = (total_size as f64 / self.size_samples.len() as f64).max(1.0);
        let suggested_batch_size = (self.memory_threshold as f64 / avg_row_size).floor() as usize;
        self.current_batch_size = suggested_batch_size.max(MIN_BATCH_SIZE);
    }

    /// Flush buffered rows to the Parquet file
    fn flush_buffered_rows(&mut self) -> Result<()> {
        if self.buffered_rows.is_empty() {
            return Ok(());
        }

        let rows = std::mem::take(&mut self.buffered_rows);
        let num_rows = rows.len();
        let batch = rows_to_record_batch(&self.schema, rows)?;

        let writer = self
            .arrow_writer
            .as_mut()
            .ok_or_else(|| TabularError::internal("Writer has been closed"))?;
        writer.write(&batch)?;

        // Check if we need to flush based on memory usage
        if writer.in_progress_size() >= self.memory_threshold {
            writer.flush()?;
        }

        self.total_rows_written += num_rows;
        Ok(())
    }

    /// Flush any buffered data
    pub fn flush(&mut self) -> Result<()> {
        self.flush_buffered_rows()?;

        if let Some(writer) = &mut self.arrow_writer {
            writer.flush()?;
        }
        Ok(())
    }

    /// Close the writer and write the file footer
    ///
    /// This must be called to finalize the Parquet file. Returns the number
    /// of rows written.
    pub fn close(mut self) -> Result<usize> {
        self.flush_buffered_rows()?;

        if let Some(writer) = self.arrow_writer.take() {
            let mut inner = writer.into_inner()?;
            inner.flush()?;
        }
        Ok(self.total_rows_written)
    }
}

/// Estimate the memory footprint of a single value
fn estimate_value_size(value: &Value, data_type: &DataType) -> usize {
    match (value, data_type) {
        (Value::Null, _) => 0,

        // Fixed size types
        (Value::Boolean(_), _) => 1,
        (Value::Integer(_), _) | (Value::Float(_), _) => 4,
        (Value::Long(_), _) | (Value::Double(_), _) => 8,

        // Variable size types
        (Value::String(s), _) => s.len() + std::mem::size_of::<usize>() * 3,
        (Value::Binary(b), _) => b.len() + std::mem::size_of::<usize>() * 3,

        // Complex types
        (Value::Array(items), DataType::Array { element, .. }) => {
            let base_size = std::mem::size_of::<usize>() * 3;
            if items.is_empty() {
                base_size
            } else {
                // Sample up to 5 elements
                let sample_count = items.len().min(5);
                let sample_size: usize = items
                    .iter()
                    .take(sample_count)
                    .map(|item| estimate_value_size(item, element))
                    .sum();
                base_size + (sample_size / sample_count) * items.len()
            }
        }
        (Value::Struct(row), DataType::Struct(schema)) => {
            let base_size = std::mem::size_of::<usize>() * 3;
            base_size
                + row
                    .values()
                    .iter()
                    .zip(schema.fields())
                    .map(|(v, f)| estimate_value_size(v, f.data_type()))
                    .sum::<usize>()
        }

        _ => 100, // Default estimate for mismatched types
    }
}
