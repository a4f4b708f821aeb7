//! Resolution of write intents into concrete write requests

use crate::config::keys;
use crate::partition::PartitionSpec;
use crate::{Options, Result, Schema, TabularError};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// How a write treats an existing target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    /// Replace existing data
    Overwrite,
    /// Add to existing data without touching it
    Append,
    /// Fail if the target exists
    #[default]
    ErrorIfExists,
    /// Do nothing if the target exists
    Ignore,
}

impl FromStr for SaveMode {
    type Err = TabularError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(SaveMode::Overwrite),
            "append" => Ok(SaveMode::Append),
            "errorifexists" | "error" | "default" => Ok(SaveMode::ErrorIfExists),
            "ignore" => Ok(SaveMode::Ignore),
            other => Err(TabularError::invalid_option(
                keys::MODE,
                format!(
                    "unknown save mode '{}', expected overwrite, append, errorifexists or ignore",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for SaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SaveMode::Overwrite => "overwrite",
            SaveMode::Append => "append",
            SaveMode::ErrorIfExists => "errorifexists",
            SaveMode::Ignore => "ignore",
        })
    }
}

/// Where a write lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// A filesystem location
    Path(PathBuf),
    /// A managed catalog table
    Table(String),
    /// Resolved by the connector from its options (e.g. `dbtable`)
    Options,
}

impl fmt::Display for WriteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteTarget::Path(path) => write!(f, "path {}", path.display()),
            WriteTarget::Table(name) => write!(f, "table {}", name),
            WriteTarget::Options => f.write_str("connector options"),
        }
    }
}

/// A fully resolved write, consumed once by a connector
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub target: WriteTarget,
    /// Lowercased format identifier
    pub format: String,
    pub mode: SaveMode,
    pub partition_columns: Vec<String>,
    pub options: Options,
}

/// What a caller asked for, before defaults and validation
#[derive(Debug, Clone)]
pub struct WriteSpec {
    pub target: WriteTarget,
    pub format: Option<String>,
    pub mode: Option<SaveMode>,
    pub partition_by: Option<Vec<String>>,
    pub options: Options,
}

impl WriteSpec {
    pub fn new(target: WriteTarget) -> Self {
        Self {
            target,
            format: None,
            mode: None,
            partition_by: None,
            options: Options::new(),
        }
    }
}

/// Turns a [`WriteSpec`] into a validated [`WriteRequest`]
#[derive(Debug, Clone)]
pub struct WritePlanner {
    default_format: String,
}

impl WritePlanner {
    pub fn new<S: Into<String>>(default_format: S) -> Self {
        Self {
            default_format: default_format.into(),
        }
    }

    /// Resolve format, mode and partition columns against `schema`
    ///
    /// Explicit builder values win over the `mode` and `partitionBy`
    /// options, which are removed from the forwarded option map.
    pub fn plan(&self, spec: WriteSpec, schema: &Schema) -> Result<WriteRequest> {
        let WriteSpec {
            target,
            format,
            mode,
            partition_by,
            mut options,
        } = spec;

        let format = format
            .unwrap_or_else(|| self.default_format.clone())
            .trim()
            .to_ascii_lowercase();
        if format.is_empty() {
            return Err(TabularError::invalid_argument("format must not be empty"));
        }

        let mode_option = options.remove(keys::MODE);
        let mode = match (mode, mode_option) {
            (Some(mode), _) => mode,
            (None, Some(raw)) => raw.parse()?,
            (None, None) => SaveMode::default(),
        };

        let partition_option = options.remove(keys::PARTITION_BY);
        let partition_columns = match (partition_by, partition_option) {
            (Some(columns), _) => columns,
            (None, Some(raw)) => parse_column_list(&raw),
            (None, None) => Vec::new(),
        };
        PartitionSpec::new(schema, &partition_columns)?;

        debug!(
            %format,
            %mode,
            %target,
            partition_columns = ?partition_columns,
            "planned write"
        );

        Ok(WriteRequest {
            target,
            format,
            mode,
            partition_columns,
            options,
        })
    }
}

/// Parse a comma-separated column list, dropping empty entries
pub(crate) fn parse_column_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}
