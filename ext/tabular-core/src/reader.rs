//! Core Parquet reading functionality

use crate::arrow_conversion::{arrow_to_schema, bind_batch_columns, row_at, BoundColumns};
use crate::{Result, Row, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::file::reader::ChunkReader;

/// Parquet reader over any source implementing `ChunkReader`
pub struct Reader<R: ChunkReader> {
    builder: ParquetRecordBatchReaderBuilder<R>,
}

impl<R> Reader<R>
where
    R: ChunkReader + 'static,
{
    /// Open a reader, parsing the file footer
    pub fn try_new(reader: R) -> Result<Self> {
        Ok(Self {
            builder: ParquetRecordBatchReaderBuilder::try_new(reader)?,
        })
    }

    /// The logical schema stored in the file
    pub fn schema(&self, binary_as_string: bool) -> Result<Schema> {
        arrow_to_schema(self.builder.schema(), binary_as_string)
    }

    /// Number of rows recorded in the file footer
    pub fn num_rows(&self) -> i64 {
        self.builder.metadata().file_metadata().num_rows()
    }

    /// Read rows decoded against `target`
    ///
    /// Only top-level columns named in `target` are read. Target fields the
    /// file does not carry read as null.
    pub fn read_rows(self, target: SchemaRef, batch_size: Option<usize>) -> Result<RowIterator> {
        let mut builder = self.builder;
        let arrow_schema = builder.schema().clone();

        let column_indices: Vec<usize> = arrow_schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(_, field)| target.index_of(field.name()).is_some())
            .map(|(idx, _)| idx)
            .collect();

        let mask = parquet::arrow::ProjectionMask::roots(builder.parquet_schema(), column_indices);
        builder = builder.with_projection(mask);

        if let Some(size) = batch_size {
            builder = builder.with_batch_size(size);
        }

        Ok(RowIterator {
            batch_reader: builder.build()?,
            target,
            current: None,
            current_row: 0,
        })
    }
}

/// Iterator over the rows of one Parquet file
pub struct RowIterator {
    batch_reader: ParquetRecordBatchReader,
    target: SchemaRef,
    current: Option<(RecordBatch, BoundColumns)>,
    current_row: usize,
}

impl Iterator for RowIterator {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((batch, columns)) = &self.current {
                if self.current_row < batch.num_rows() {
                    let row = row_at(columns, &self.target, self.current_row, "");
                    self.current_row += 1;
                    return Some(row);
                }
            }

            // Need to fetch next batch
            match self.batch_reader.next() {
                Some(Ok(batch)) => match bind_batch_columns(&batch, &self.target) {
                    Ok(columns) => {
                        self.current = Some((batch, columns));
                        self.current_row = 0;
                    }
                    Err(e) => return Some(Err(e)),
                },
                Some(Err(e)) => return Some(Err(e.into())),
                None => return None,
            }
        }
    }
}
