//! Managed tables stored under a warehouse directory
//!
//! Each table lives at `<warehouse>/<name>` as a Parquet dataset directory
//! with an extra `_table.json` entry, so reopening a warehouse rediscovers
//! its tables.

use crate::config::SessionConfig;
use crate::connector::file::{write_atomic, FileConnector};
use crate::connector::parquet::ParquetFormat;
use crate::error::ErrorContext;
use crate::traits::{Connector, ReadRequest, ReadSource};
use crate::{
    CancellationToken, Dataset, Options, Result, SaveMode, Schema, TabularError, WriteRequest, WriteTarget,
};
use indexmap::IndexMap;
use jiff::Timestamp;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-table metadata file
pub const TABLE_ENTRY_FILE: &str = "_table.json";

static GLOBAL_CATALOG: OnceCell<Arc<Catalog>> = OnceCell::new();

/// Catalog metadata of one managed table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableEntry {
    pub name: String,
    pub schema: Schema,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    pub created_at: Timestamp,
}

/// Check a table name and return its canonical lowercase form
pub fn validate_table_name(name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(TabularError::invalid_argument(format!(
            "invalid table name '{}': use letters, digits and underscores",
            name
        )));
    }
    Ok(name.to_ascii_lowercase())
}

/// Process-wide registry of managed tables
pub struct Catalog {
    warehouse_dir: PathBuf,
    tables: RwLock<IndexMap<String, TableEntry>>,
    files: FileConnector<ParquetFormat>,
}

impl Catalog {
    /// An empty catalog over `warehouse_dir`; nothing is read or created
    pub fn new<P: Into<PathBuf>>(warehouse_dir: P) -> Self {
        Self {
            warehouse_dir: warehouse_dir.into(),
            tables: RwLock::new(IndexMap::new()),
            files: FileConnector::new(ParquetFormat),
        }
    }

    /// Open a warehouse directory, creating it if needed and loading the
    /// tables it already holds
    pub fn open<P: Into<PathBuf>>(warehouse_dir: P) -> Result<Self> {
        let catalog = Self::new(warehouse_dir);
        let dir = &catalog.warehouse_dir;
        fs::create_dir_all(dir).with_context(|| format!("creating warehouse {}", dir.display()))?;

        let mut entries = fs::read_dir(dir)
            .with_context(|| format!("listing warehouse {}", dir.display()))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("listing warehouse {}", dir.display()))?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut tables = IndexMap::new();
        for entry in entries {
            let path = entry.path().join(TABLE_ENTRY_FILE);
            if !path.is_file() {
                continue;
            }
            match load_entry(&path) {
                Ok(table) => {
                    tables.insert(table.name.to_ascii_lowercase(), table);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable table entry"),
            }
        }
        debug!(warehouse = %dir.display(), tables = tables.len(), "opened catalog");

        *catalog.tables.write() = tables;
        Ok(catalog)
    }

    /// The shared catalog, opened on first use from the environment's
    /// warehouse directory
    pub fn global() -> Result<Arc<Catalog>> {
        GLOBAL_CATALOG
            .get_or_try_init(|| Catalog::open(SessionConfig::from_env().warehouse_dir).map(Arc::new))
            .cloned()
    }

    pub fn warehouse_dir(&self) -> &Path {
        &self.warehouse_dir
    }

    /// Directory holding a table's data
    pub fn table_location(&self, name: &str) -> Result<PathBuf> {
        Ok(self.warehouse_dir.join(validate_table_name(name)?))
    }

    pub fn table(&self, name: &str) -> Result<TableEntry> {
        self.tables
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| TabularError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.read().contains_key(&name.to_ascii_lowercase())
    }

    /// Table names in creation order
    pub fn list_tables(&self) -> Vec<String> {
        self.tables.read().values().map(|entry| entry.name.clone()).collect()
    }

    /// Read a managed table
    pub fn read_table(&self, name: &str, options: Options, cancel: &CancellationToken) -> Result<Dataset> {
        let entry = self.table(name)?;
        let location = self.table_location(&entry.name)?;
        let request = ReadRequest::new(ReadSource::Path(location), "parquet").with_options(options);
        self.files.read(request, cancel)
    }

    /// Write `dataset` as table `name`, registering it when new
    pub fn save_table(
        &self,
        dataset: &Dataset,
        name: &str,
        mode: SaveMode,
        partition_columns: Vec<String>,
        options: Options,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let key = validate_table_name(name)?;
        let location = self.warehouse_dir.join(&key);
        let existing = self.tables.read().get(&key).cloned();
        let exists = existing.is_some() || location.exists();

        let partition_columns = match (&existing, mode) {
            (_, SaveMode::ErrorIfExists) if exists => {
                return Err(TabularError::TableAlreadyExists(name.to_string()))
            }
            (_, SaveMode::Ignore) if exists => {
                info!(table = name, "table exists, ignoring write");
                return Ok(());
            }
            (Some(entry), SaveMode::Append) => {
                if entry.schema != **dataset.schema() {
                    return Err(TabularError::schema(format!(
                        "cannot append {} to table '{}' with schema {}",
                        dataset.schema(),
                        entry.name,
                        entry.schema
                    )));
                }
                if !partition_columns.is_empty() && partition_columns != entry.partition_columns {
                    return Err(TabularError::invalid_option(
                        "partitionBy",
                        format!(
                            "table '{}' is partitioned by [{}]",
                            entry.name,
                            entry.partition_columns.join(", ")
                        ),
                    ));
                }
                entry.partition_columns.clone()
            }
            _ => partition_columns,
        };

        if existing.is_none() && mode == SaveMode::Append && location.exists() {
            info!(table = name, location = %location.display(), "appending to unregistered table location");
        }
        let request = WriteRequest {
            target: WriteTarget::Path(location.clone()),
            format: "parquet".to_string(),
            mode: if mode == SaveMode::Append { SaveMode::Append } else { SaveMode::Overwrite },
            partition_columns,
            options,
        };

        let mut committed = None;
        self.files.write_with(dataset, request, cancel, |dir, layout| {
            let entry = match existing.as_ref().filter(|_| mode == SaveMode::Append) {
                Some(entry) => entry.clone(),
                None => TableEntry {
                    name: name.to_string(),
                    schema: layout.schema.clone(),
                    partition_columns: layout.partition_columns.clone(),
                    created_at: Timestamp::now(),
                },
            };
            store_entry(dir, &entry)?;
            committed = Some(entry);
            Ok(())
        })?;

        if let Some(entry) = committed {
            if existing.is_none() || mode != SaveMode::Append {
                info!(table = name, location = %location.display(), "registered managed table");
            }
            self.tables.write().insert(key, entry);
        }
        Ok(())
    }

    /// Remove a table and its data; returns whether it existed
    pub fn drop_table(&self, name: &str) -> Result<bool> {
        let key = validate_table_name(name)?;
        let removed = self.tables.write().shift_remove(&key);
        let location = self.warehouse_dir.join(&key);
        if location.exists() {
            fs::remove_dir_all(&location).with_context(|| format!("removing {}", location.display()))?;
        }
        if removed.is_some() {
            info!(table = name, "dropped managed table");
        }
        Ok(removed.is_some())
    }
}

fn load_entry(path: &Path) -> Result<TableEntry> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let entry = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(entry)
}

fn store_entry(location: &Path, entry: &TableEntry) -> Result<()> {
    let json = serde_json::to_string_pretty(entry)?;
    write_atomic(&location.join(TABLE_ENTRY_FILE), json.as_bytes())
}

/// Connector for `format("table")`, `table(name)` and `save_as_table(name)`
pub struct CatalogConnector {
    catalog: Arc<Catalog>,
}

impl CatalogConnector {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}

impl Connector for CatalogConnector {
    fn name(&self) -> &str {
        "table"
    }

    fn read(&self, request: ReadRequest, cancel: &CancellationToken) -> Result<Dataset> {
        let ReadSource::Table(name) = &request.source else {
            return Err(TabularError::invalid_argument(format!(
                "managed tables are read by name, got {}",
                request.source
            )));
        };
        if request.schema.is_some() {
            return Err(TabularError::invalid_argument(
                "managed tables do not accept a user-specified schema",
            ));
        }
        self.catalog.read_table(name, request.options, cancel)
    }

    fn write(&self, dataset: &Dataset, request: WriteRequest, cancel: &CancellationToken) -> Result<()> {
        let WriteTarget::Table(name) = &request.target else {
            return Err(TabularError::invalid_argument(format!(
                "managed tables are written by name, got {}",
                request.target
            )));
        };
        self.catalog.save_table(
            dataset,
            name,
            request.mode,
            request.partition_columns,
            request.options,
            cancel,
        )
    }
}
