//! Typed, schema-aware tabular data exchange and persistence
//!
//! `tabular-core` converts between strongly-typed records and generic,
//! schema-conformant rows, and dispatches reads and writes of those rows to
//! pluggable storage connectors with consistent partitioning and save-mode
//! semantics.
//!
//! # Key Components
//!
//! - **Schema**: ordered, possibly nested fields with nullability
//!   - [`SchemaBuilder`] for construction, [`infer_schema`] for record types
//!   - Structural, order-sensitive equality and schema merging
//!
//! - **Codec**: typed records to rows and back
//!   - [`TypedRecord`] / [`FieldType`] at the record boundary
//!   - [`typed_record!`] declares a struct together with its descriptor table
//!   - Errors carry the offending field path, e.g. `row[3].pandas[0].zip`
//!
//! - **Dataset**: immutable handle pairing a row source with its schema
//!   - In-memory, replayable and one-shot sources
//!   - Lazy row and record iteration, projection, Arrow batches
//!
//! - **Connectors**: storage backends selected by format name
//!   - `parquet` and `json` dataset directories with hive-style partitions
//!   - `jdbc` over a [`TabularStore`](connector::TabularStore)
//!   - `table` for managed tables in a warehouse [`Catalog`](connector::Catalog)
//!
//! - **Session**: configuration, connector registry and catalog behind
//!   reader and writer builders
//!
//! # Example
//!
//! ```no_run
//! use tabular_core::{typed_record, SaveMode, Session};
//!
//! typed_record! {
//!     #[derive(Debug, Clone, PartialEq)]
//!     pub struct RawPanda {
//!         pub id: i64,
//!         pub zip: String,
//!         pub happy: bool,
//!     }
//! }
//!
//! # fn main() -> tabular_core::Result<()> {
//! let session = Session::builder().warehouse_dir("warehouse").build()?;
//! let pandas = session.create_dataset(vec![RawPanda {
//!     id: 1,
//!     zip: "94110".to_string(),
//!     happy: true,
//! }])?;
//!
//! session
//!     .write(&pandas)
//!     .partition_by(["zip"])
//!     .mode(SaveMode::Append)
//!     .format("json")
//!     .save("output/")?;
//!
//! let back: Vec<RawPanda> = session
//!     .read()
//!     .json("output/")?
//!     .select(&["id", "zip", "happy"])?
//!     .to_records()?
//!     .collect::<tabular_core::Result<_>>()?;
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod arrow_conversion;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod connector;
pub mod dataset;
pub mod error;
pub mod partition;
pub mod planner;
pub mod reader;
pub mod row;
pub mod schema;
pub mod session;
pub mod traits;
pub mod value;
pub mod writer;

#[cfg(test)]
pub mod test_utils;

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::Lazy;
}

pub use cancel::CancellationToken;
pub use codec::{decode, encode, infer_schema};
pub use config::{Options, SessionConfig};
pub use connector::{
    Catalog, CatalogConnector, ConnectionSpec, ConnectorRegistry, DatasetLayout, FileConnector, JdbcConnector,
    JsonFormat, MemoryTabularStore, ParquetFormat, TableEntry, TabularStore,
};
pub use dataset::{Dataset, RecordIter, Rows, SchemaMode};
pub use error::{BackendError, ErrorContext, Result, TabularError};
pub use planner::{SaveMode, WritePlanner, WriteRequest, WriteSpec, WriteTarget};
pub use reader::Reader;
pub use row::Row;
pub use schema::{DataType, Field, Schema, SchemaBuilder, SchemaRef};
pub use session::{DataFrameReader, DataFrameWriter, Session, SessionBuilder};
pub use traits::{
    Connector, FieldDescriptor, FieldType, FileFormat, ReadRequest, ReadSource, RecordDescriptor, TypeDescriptor,
    TypedRecord,
};
pub use value::Value;
pub use writer::{CompressionCodec, Writer, WriterBuilder};
