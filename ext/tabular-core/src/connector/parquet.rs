//! Parquet data files

use crate::error::ErrorContext;
use crate::reader::Reader;
use crate::traits::{FileFormat, FileReadOptions, FileSink, FileWriteOptions, RowStream};
use crate::writer::{Writer, WriterBuilder};
use crate::{Result, Row, Schema, SchemaRef};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Columnar Parquet files read and written through Arrow
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetFormat;

impl FileFormat for ParquetFormat {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn extension(&self) -> &'static str {
        "parquet"
    }

    fn file_schema(&self, path: &Path, options: &FileReadOptions) -> Result<Option<Schema>> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let reader = Reader::try_new(file)?;
        reader.schema(options.binary_as_string).map(Some)
    }

    fn open_rows(&self, path: &Path, target: SchemaRef, _options: &FileReadOptions) -> Result<RowStream> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let rows = Reader::try_new(file)?.read_rows(target, None)?;
        Ok(Box::new(rows))
    }

    fn create_sink(
        &self,
        path: &Path,
        schema: SchemaRef,
        options: &FileWriteOptions,
    ) -> Result<Box<dyn FileSink>> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;

        let mut builder = WriterBuilder::new().with_compression(options.compression);
        if let Some(size) = options.batch_size {
            builder = builder.with_batch_size(size);
        }
        let writer = builder.build(BufWriter::new(file), schema)?;
        Ok(Box::new(ParquetSink { writer }))
    }
}

struct ParquetSink {
    writer: Writer<BufWriter<File>>,
}

impl FileSink for ParquetSink {
    fn write_row(&mut self, row: Row) -> Result<()> {
        self.writer.write_row(row)
    }

    fn finish(self: Box<Self>) -> Result<usize> {
        self.writer.close()
    }
}
