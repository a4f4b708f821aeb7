use thiserror::Error;

/// Core error type for tabular exchange and persistence operations
#[derive(Error, Debug)]
pub enum TabularError {
    /// A declared record field has no mapping onto a schema type tag
    #[error("Unsupported field type at {path}: {type_name}")]
    UnsupportedFieldType { path: String, type_name: String },

    /// A required field has no accessor on the record type
    #[error("No accessor for required field '{field}' on {record}")]
    FieldAccess { record: String, field: String },

    /// A row has a different number of values than the target expects
    #[error("Arity mismatch at {path}: expected {expected} values, found {found}")]
    ArityMismatch {
        path: String,
        expected: usize,
        found: usize,
    },

    /// A value is incompatible with the declared type
    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A record supplied alongside an explicit schema does not conform
    #[error("Record {index} does not match the schema: {source}")]
    SchemaMismatch {
        index: usize,
        source: Box<TabularError>,
    },

    /// A row supplied alongside a schema does not conform
    #[error("Row {index} violates the schema: {reason}")]
    RowSchemaViolation { index: usize, reason: String },

    /// No connector is registered for the format identifier
    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    /// A partition column is not part of the dataset schema
    #[error("Partition column '{column}' not found in schema {available}")]
    UnknownPartitionColumn { column: String, available: String },

    /// The write target (table or path) already exists
    #[error("Table or path already exists: {0}")]
    TableAlreadyExists(String),

    /// The catalog has no table with this name
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The operation observed a cancellation request
    #[error("Operation cancelled")]
    Cancelled,

    /// A one-shot row stream was already consumed
    #[error("Dataset source is a one-shot stream that has already been consumed")]
    SourceExhausted,

    /// Schema construction or merge errors
    #[error("Schema error: {0}")]
    Schema(String),

    /// An option value could not be interpreted
    #[error("Invalid value for option '{key}': {reason}")]
    InvalidOption { key: String, reason: String },

    /// A connector needs an option that was not supplied
    #[error("Missing required option '{0}'")]
    MissingOption(String),

    /// Invalid argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Any failure reported by a storage backend
    #[error("Connector I/O error ({context}): {source}")]
    ConnectorIo {
        context: String,
        source: BackendError,
    },

    /// Internal errors that shouldn't happen
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Backend failures carried by [`TabularError::ConnectorIo`]
///
/// The core does not interpret these; they are surfaced as-is.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failures reported by a tabular store implementation
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type alias for tabular operations
pub type Result<T> = std::result::Result<T, TabularError>;

impl TabularError {
    /// Create a new type mismatch error
    pub fn type_mismatch<P, E, F>(path: P, expected: E, found: F) -> Self
    where
        P: Into<String>,
        E: ToString,
        F: ToString,
    {
        TabularError::TypeMismatch {
            path: path.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Create a new schema error
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        TabularError::Schema(msg.into())
    }

    /// Create a new invalid option error
    pub fn invalid_option<K: Into<String>, R: Into<String>>(key: K, reason: R) -> Self {
        TabularError::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TabularError::InvalidArgument(msg.into())
    }

    /// Create a new store error reported by a tabular store backend
    pub fn store<C: Into<String>, S: Into<String>>(context: C, msg: S) -> Self {
        TabularError::ConnectorIo {
            context: context.into(),
            source: BackendError::Store(msg.into()),
        }
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        TabularError::Internal(msg.into())
    }

    /// Whether this error came from a storage backend rather than the core
    pub fn is_connector_io(&self) -> bool {
        matches!(self, TabularError::ConnectorIo { .. })
    }
}

impl From<std::io::Error> for TabularError {
    fn from(err: std::io::Error) -> Self {
        TabularError::ConnectorIo {
            context: "filesystem".to_string(),
            source: err.into(),
        }
    }
}

impl From<arrow_schema::ArrowError> for TabularError {
    fn from(err: arrow_schema::ArrowError) -> Self {
        TabularError::ConnectorIo {
            context: "arrow".to_string(),
            source: err.into(),
        }
    }
}

impl From<parquet::errors::ParquetError> for TabularError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        TabularError::ConnectorIo {
            context: "parquet".to_string(),
            source: err.into(),
        }
    }
}

impl From<serde_json::Error> for TabularError {
    fn from(err: serde_json::Error) -> Self {
        TabularError::ConnectorIo {
            context: "json".to_string(),
            source: err.into(),
        }
    }
}

/// Extension trait to add context to backend errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, ctx: S) -> Result<T>;

    /// Add context with a closure that's only called on error
    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<BackendError>,
{
    fn context<S: Into<String>>(self, ctx: S) -> Result<T> {
        self.map_err(|e| TabularError::ConnectorIo {
            context: ctx.into(),
            source: e.into(),
        })
    }

    fn with_context<S: Into<String>, F: FnOnce() -> S>(self, f: F) -> Result<T> {
        self.map_err(|e| TabularError::ConnectorIo {
            context: f().into(),
            source: e.into(),
        })
    }
}
