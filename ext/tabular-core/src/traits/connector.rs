use crate::{CancellationToken, Dataset, Options, Result, Schema, WriteRequest};
use std::fmt;
use std::path::PathBuf;

/// Where a read comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSource {
    /// A filesystem location (file or directory)
    Path(PathBuf),
    /// A managed catalog table
    Table(String),
    /// Resolved by the connector from its options (e.g. `url`, `dbtable`)
    Options,
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSource::Path(path) => write!(f, "path {}", path.display()),
            ReadSource::Table(name) => write!(f, "table {}", name),
            ReadSource::Options => f.write_str("connector options"),
        }
    }
}

/// A logical read, consumed once by a connector
#[derive(Debug, Clone, PartialEq)]
pub struct ReadRequest {
    pub source: ReadSource,
    /// Lowercased format identifier
    pub format: String,
    pub options: Options,
    /// Caller-supplied schema, overriding inference
    pub schema: Option<Schema>,
}

impl ReadRequest {
    pub fn new<S: Into<String>>(source: ReadSource, format: S) -> Self {
        Self {
            source,
            format: format.into().to_ascii_lowercase(),
            options: Options::new(),
            schema: None,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A pluggable storage backend selected by format name
///
/// Both operations block. They observe `cancel` and return
/// [`TabularError::Cancelled`](crate::TabularError::Cancelled) promptly. A
/// failed write never reports success.
pub trait Connector: Send + Sync {
    /// Format identifier this connector is usually registered under
    fn name(&self) -> &str;

    fn read(&self, request: ReadRequest, cancel: &CancellationToken) -> Result<Dataset>;

    fn write(&self, dataset: &Dataset, request: WriteRequest, cancel: &CancellationToken) -> Result<()>;
}
