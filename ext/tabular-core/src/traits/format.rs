use crate::config::keys;
use crate::writer::CompressionCodec;
use crate::{Options, Result, Row, Schema, SchemaRef};
use std::path::Path;

pub use crate::dataset::RowStream;

/// Read-side settings shared by file formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileReadOptions {
    pub binary_as_string: bool,
    pub merge_schema: bool,
}

impl FileReadOptions {
    pub fn from_options(options: &Options) -> Result<Self> {
        Ok(Self {
            binary_as_string: options.get_bool(keys::BINARY_AS_STRING)?.unwrap_or(false),
            merge_schema: options.get_bool(keys::MERGE_SCHEMA)?.unwrap_or(false),
        })
    }
}

/// Write-side settings shared by file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileWriteOptions {
    pub compression: CompressionCodec,
    /// 0 means unlimited
    pub max_records_per_file: usize,
    pub batch_size: Option<usize>,
}

impl Default for FileWriteOptions {
    fn default() -> Self {
        Self {
            compression: CompressionCodec::Snappy,
            max_records_per_file: 0,
            batch_size: None,
        }
    }
}

impl FileWriteOptions {
    pub fn from_options(options: &Options) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            compression: match options.get(keys::COMPRESSION) {
                Some(raw) => raw.parse()?,
                None => defaults.compression,
            },
            max_records_per_file: options
                .get_usize(keys::MAX_RECORDS_PER_FILE)?
                .unwrap_or(defaults.max_records_per_file),
            batch_size: options
                .get_usize(keys::WRITER_BATCH_SIZE)?
                .filter(|size| *size > 0),
        })
    }
}

/// An open output file accepting rows of one schema
pub trait FileSink: Send {
    fn write_row(&mut self, row: Row) -> Result<()>;

    /// Flush and close the file, returning the number of rows written
    fn finish(self: Box<Self>) -> Result<usize>;
}

/// Encoding of rows inside single data files
///
/// Directory layout, partitioning and commit are handled by the file
/// connector; a format only reads and writes individual files.
pub trait FileFormat: Send + Sync + 'static {
    /// Format identifier, also recorded in layout metadata
    fn name(&self) -> &'static str;

    /// Extension of data files, without the dot
    fn extension(&self) -> &'static str;

    /// Schema of one data file; `None` when it holds nothing to infer from
    fn file_schema(&self, path: &Path, options: &FileReadOptions) -> Result<Option<Schema>>;

    /// Stream the rows of one data file decoded against `target`
    ///
    /// Target columns the file does not carry read as null.
    fn open_rows(&self, path: &Path, target: SchemaRef, options: &FileReadOptions) -> Result<RowStream>;

    /// Create a new data file for rows of `schema`
    fn create_sink(
        &self,
        path: &Path,
        schema: SchemaRef,
        options: &FileWriteOptions,
    ) -> Result<Box<dyn FileSink>>;
}
