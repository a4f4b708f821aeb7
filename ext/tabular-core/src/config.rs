//! Session configuration and connector option maps

use crate::writer::CompressionCodec;
use crate::{Result, TabularError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

/// Recognized option keys, in their canonical spelling
///
/// Lookups are case-insensitive.
pub mod keys {
    pub const MERGE_SCHEMA: &str = "mergeSchema";
    pub const BINARY_AS_STRING: &str = "binaryAsString";
    pub const URL: &str = "url";
    pub const DBTABLE: &str = "dbtable";
    pub const USER: &str = "user";
    pub const PASSWORD: &str = "password";
    pub const PARTITION_BY: &str = "partitionBy";
    pub const MODE: &str = "mode";
    pub const COMPRESSION: &str = "compression";
    pub const MAX_RECORDS_PER_FILE: &str = "maxRecordsPerFile";
    pub const PATH: &str = "path";
    pub const WRITER_BATCH_SIZE: &str = "writerBatchSize";
}

/// Case-insensitive string-to-string option map
///
/// Keys keep their first spelling for display; `Debug` redacts passwords.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Options {
    entries: IndexMap<String, (String, String)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.set(key, value);
        self
    }

    /// Insert or replace an option
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.entries.get_mut(&key.to_ascii_lowercase()) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key.to_ascii_lowercase(), (key, value));
            }
        }
    }

    /// Insert only when the key is absent
    pub fn set_default<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        if !self.contains(&key) {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries
            .shift_remove(&key.to_ascii_lowercase())
            .map(|(_, value)| value)
    }

    /// Parse a `true`/`false` option
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key).map(|raw| parse_bool(key, raw)).transpose()
    }

    /// Parse a non-negative integer option
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        self.get(key).map(|raw| parse_usize(key, raw)).transpose()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Merge another map in, replacing existing keys
    pub fn extend(&mut self, other: Options) {
        for (_, (key, value)) in other.entries {
            self.set(key, value);
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (lower, (key, value)) in &self.entries {
            if lower == "password" {
                map.entry(key, &"***");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Options::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

pub(crate) fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(TabularError::invalid_option(
            key,
            format!("expected true or false, got '{}'", raw),
        )),
    }
}

pub(crate) fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim().parse::<usize>().map_err(|_| {
        TabularError::invalid_option(key, format!("expected a non-negative integer, got '{}'", raw))
    })
}

/// Session-wide settings
///
/// Read-side and write-side values act as defaults for per-call options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Root directory of managed catalog tables
    pub warehouse_dir: PathBuf,
    /// Format used when a read or write names none
    pub default_format: String,
    pub binary_as_string: bool,
    pub merge_schema: bool,
    pub compression: String,
    /// Rows per output file; 0 means unlimited
    pub max_records_per_file: usize,
    /// Fixed writer batch size; dynamic sizing when unset
    pub writer_batch_size: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warehouse_dir: PathBuf::from("spark-warehouse"),
            default_format: "parquet".to_string(),
            binary_as_string: false,
            merge_schema: false,
            compression: CompressionCodec::Snappy.as_str().to_string(),
            max_records_per_file: 0,
            writer_batch_size: None,
        }
    }
}

pub(crate) fn setting_name(key: &str) -> String {
    key.rsplit('.').next().unwrap_or(key).to_ascii_lowercase()
}

/// Environment variables read by [`SessionConfig::from_env`]
const ENV_KEYS: &[(&str, &str)] = &[
    ("TABULAR_WAREHOUSE_DIR", "warehouseDir"),
    ("TABULAR_DEFAULT_FORMAT", "defaultFormat"),
    ("TABULAR_BINARY_AS_STRING", "binaryAsString"),
    ("TABULAR_MERGE_SCHEMA", "mergeSchema"),
    ("TABULAR_COMPRESSION", "compression"),
    ("TABULAR_MAX_RECORDS_PER_FILE", "maxRecordsPerFile"),
    ("TABULAR_WRITER_BATCH_SIZE", "writerBatchSize"),
];

impl SessionConfig {
    /// Defaults overridden by `TABULAR_*` environment variables
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the
    /// `TABULAR_*` variable names
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let mut config = Self::default();
        for (var, key) in ENV_KEYS {
            if let Some(value) = lookup(var) {
                if let Err(e) = config.set(key, &value) {
                    warn!(variable = var, error = %e, "ignoring invalid configuration value");
                }
            }
        }
        config
    }

    /// Parse a JSON document; absent keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.compression.parse::<CompressionCodec>()?;
        if self.default_format.trim().is_empty() {
            return Err(TabularError::invalid_option("defaultFormat", "must not be empty"));
        }
        Ok(())
    }

    /// Set one value by its camelCase key (case-insensitive)
    ///
    /// Dotted keys such as `spark.sql.parquet.binaryAsString` are matched by
    /// their last segment.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match setting_name(key).as_str() {
            "warehousedir" => self.warehouse_dir = PathBuf::from(value),
            "defaultformat" => {
                if value.trim().is_empty() {
                    return Err(TabularError::invalid_option(key, "must not be empty"));
                }
                self.default_format = value.trim().to_ascii_lowercase();
            }
            "binaryasstring" => self.binary_as_string = parse_bool(key, value)?,
            "mergeschema" => self.merge_schema = parse_bool(key, value)?,
            "compression" => {
                self.compression = value.parse::<CompressionCodec>()?.as_str().to_string();
            }
            "maxrecordsperfile" => self.max_records_per_file = parse_usize(key, value)?,
            "writerbatchsize" => {
                self.writer_batch_size = match parse_usize(key, value)? {
                    0 => None,
                    size => Some(size),
                }
            }
            _ => {
                return Err(TabularError::invalid_option(key, "unknown configuration key"));
            }
        }
        Ok(())
    }

    /// Current value of a key, rendered as a string
    pub fn get(&self, key: &str) -> Option<String> {
        Some(match setting_name(key).as_str() {
            "warehousedir" => self.warehouse_dir.display().to_string(),
            "defaultformat" => self.default_format.clone(),
            "binaryasstring" => self.binary_as_string.to_string(),
            "mergeschema" => self.merge_schema.to_string(),
            "compression" => self.compression.clone(),
            "maxrecordsperfile" => self.max_records_per_file.to_string(),
            "writerbatchsize" => self.writer_batch_size.unwrap_or(0).to_string(),
            _ => return None,
        })
    }

    /// Fill read options the caller left unset
    pub fn apply_read_defaults(&self, options: &mut Options) {
        options.set_default(keys::BINARY_AS_STRING, self.binary_as_string.to_string());
        options.set_default(keys::MERGE_SCHEMA, self.merge_schema.to_string());
    }

    /// Fill write options the caller left unset
    pub fn apply_write_defaults(&self, options: &mut Options) {
        options.set_default(keys::COMPRESSION, self.compression.clone());
        options.set_default(
            keys::MAX_RECORDS_PER_FILE,
            self.max_records_per_file.to_string(),
        );
        if let Some(size) = self.writer_batch_size {
            options.set_default(keys::WRITER_BATCH_SIZE, size.to_string());
        }
    }
}
