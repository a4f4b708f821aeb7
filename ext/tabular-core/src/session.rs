//! Entry point tying configuration, connectors and the catalog together
//!
//! ```no_run
//! use tabular_core::{Session, SaveMode};
//!
//! # fn main() -> tabular_core::Result<()> {
//! let session = Session::builder().warehouse_dir("warehouse").build()?;
//! let pandas = session.read().option("mergeSchema", "true").parquet("pandas/")?;
//! session
//!     .write(&pandas)
//!     .partition_by(["zipcode"])
//!     .mode(SaveMode::Overwrite)
//!     .format("json")
//!     .save("output/")?;
//! # Ok(())
//! # }
//! ```

use crate::config::{keys, setting_name};
use crate::connector::{Catalog, ConnectorRegistry, MemoryTabularStore, TabularStore};
use crate::traits::{Connector, ReadRequest, ReadSource};
use crate::{
    CancellationToken, Dataset, Options, Result, Row, SaveMode, Schema, SchemaMode, SessionConfig, TabularError,
    TypedRecord, WritePlanner, WriteSpec, WriteTarget,
};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Builder for [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    config: Option<SessionConfig>,
    warehouse_dir: Option<PathBuf>,
    catalog: Option<Arc<Catalog>>,
    store: Option<Arc<dyn TabularStore>>,
    connectors: Vec<(String, Arc<dyn Connector>)>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from this configuration instead of the environment
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a private catalog over this warehouse directory
    pub fn warehouse_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.warehouse_dir = Some(dir.into());
        self
    }

    /// Share an existing catalog
    pub fn catalog(mut self, catalog: Arc<Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Backend for the `jdbc` connector
    pub fn tabular_store(mut self, store: Arc<dyn TabularStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register an additional connector, replacing any default of the same name
    pub fn connector<S: Into<String>>(mut self, format: S, connector: Arc<dyn Connector>) -> Self {
        self.connectors.push((format.into(), connector));
        self
    }

    /// Build the session
    ///
    /// Without an explicit catalog or warehouse directory the process-wide
    /// catalog is used.
    pub fn build(self) -> Result<Session> {
        let mut config = self.config.unwrap_or_else(SessionConfig::from_env);

        let catalog = match (self.catalog, self.warehouse_dir) {
            (Some(catalog), _) => catalog,
            (None, Some(dir)) => Arc::new(Catalog::open(dir)?),
            (None, None) => Catalog::global()?,
        };
        config.warehouse_dir = catalog.warehouse_dir().to_path_buf();

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTabularStore::new()));
        let registry = ConnectorRegistry::with_defaults(catalog.clone(), store);
        for (format, connector) in self.connectors {
            registry.register(format, connector);
        }

        debug!(
            warehouse = %config.warehouse_dir.display(),
            formats = ?registry.formats(),
            "session created"
        );
        Ok(Session {
            config: Arc::new(RwLock::new(config)),
            registry: Arc::new(registry),
            catalog,
        })
    }
}

/// Handle to a configured session; cheap to clone and share across threads
#[derive(Clone)]
pub struct Session {
    config: Arc<RwLock<SessionConfig>>,
    registry: Arc<ConnectorRegistry>,
    catalog: Arc<Catalog>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    /// Change one configuration value for subsequent reads and writes
    ///
    /// The warehouse directory is fixed once the catalog is built.
    pub fn set_conf(&self, key: &str, value: &str) -> Result<()> {
        if setting_name(key) == "warehousedir" {
            return Err(TabularError::invalid_option(
                key,
                format!(
                    "the catalog is already open at {}; build a new session to change it",
                    self.catalog.warehouse_dir().display()
                ),
            ));
        }
        self.config.write().set(key, value)
    }

    pub fn get_conf(&self, key: &str) -> Option<String> {
        self.config.read().get(key)
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Dataset of typed records with a schema inferred from `T`
    pub fn create_dataset<T, I>(&self, records: I) -> Result<Dataset>
    where
        T: TypedRecord,
        I: IntoIterator<Item = T>,
    {
        Dataset::from_records(records, SchemaMode::Inferred)
    }

    /// Dataset of typed records validated against `schema`
    pub fn create_dataset_with_schema<T, I>(&self, records: I, schema: Schema) -> Result<Dataset>
    where
        T: TypedRecord,
        I: IntoIterator<Item = T>,
    {
        Dataset::from_records(records, SchemaMode::Explicit(schema))
    }

    /// Dataset of generic rows validated against `schema`
    pub fn create_dataset_from_rows<I: IntoIterator<Item = Row>>(&self, rows: I, schema: Schema) -> Result<Dataset> {
        Dataset::from_rows(rows, schema)
    }

    pub fn read(&self) -> DataFrameReader {
        DataFrameReader::new(self.clone())
    }

    pub fn write<'a>(&'a self, dataset: &'a Dataset) -> DataFrameWriter<'a> {
        DataFrameWriter::new(self, dataset)
    }

    /// Read a managed table
    pub fn table(&self, name: &str) -> Result<Dataset> {
        self.read().table(name)
    }
}

/// Builder for a read through one of the session's connectors
pub struct DataFrameReader {
    session: Session,
    format: Option<String>,
    options: Options,
    schema: Option<Schema>,
    cancel: CancellationToken,
}

impl DataFrameReader {
    fn new(session: Session) -> Self {
        Self {
            session,
            format: None,
            options: Options::new(),
            schema: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn format<S: Into<String>>(mut self, format: S) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options.extend(options);
        self
    }

    /// Skip inference and read with this schema
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Token observed by the read and by the rows it produces
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Read a file or dataset directory
    pub fn load<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        let source = ReadSource::Path(path.as_ref().to_path_buf());
        self.run(source)
    }

    /// Read from a source described entirely by options, such as `url` and
    /// `dbtable`, or `path`
    pub fn load_from_options(self) -> Result<Dataset> {
        let source = match self.options.get(keys::PATH) {
            Some(path) => ReadSource::Path(PathBuf::from(path)),
            None => ReadSource::Options,
        };
        self.run(source)
    }

    pub fn parquet<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        self.format("parquet").load(path)
    }

    pub fn json<P: AsRef<Path>>(self, path: P) -> Result<Dataset> {
        self.format("json").load(path)
    }

    /// Read `table` through a connection string such as
    /// `jdbc:dialect:server;user=u;password=p`
    pub fn jdbc(self, url: &str, table: &str, properties: Options) -> Result<Dataset> {
        self.format("jdbc")
            .options(properties)
            .option(keys::URL, url)
            .option(keys::DBTABLE, table)
            .run(ReadSource::Options)
    }

    /// Read a managed table
    pub fn table(self, name: &str) -> Result<Dataset> {
        self.format("table").run(ReadSource::Table(name.to_string()))
    }

    fn run(self, source: ReadSource) -> Result<Dataset> {
        let config = self.session.config();
        let format = self.format.unwrap_or(config.default_format.clone());
        let mut options = self.options;
        config.apply_read_defaults(&mut options);

        let connector = self.session.registry.get(&format)?;
        let mut request = ReadRequest::new(source, format).with_options(options);
        if let Some(schema) = self.schema {
            request = request.with_schema(schema);
        }
        debug!(format = %request.format, source = %request.source, "reading dataset");
        connector.read(request, &self.cancel)
    }
}

/// Builder for a write of one dataset
pub struct DataFrameWriter<'a> {
    session: &'a Session,
    dataset: &'a Dataset,
    format: Option<String>,
    mode: Option<SaveMode>,
    partition_by: Option<Vec<String>>,
    options: Options,
    cancel: CancellationToken,
}

impl<'a> DataFrameWriter<'a> {
    fn new(session: &'a Session, dataset: &'a Dataset) -> Self {
        Self {
            session,
            dataset,
            format: None,
            mode: None,
            partition_by: None,
            options: Options::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn format<S: Into<String>>(mut self, format: S) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn mode(mut self, mode: SaveMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Store each distinct combination of these columns in its own directory
    pub fn partition_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.partition_by = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn option<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.options.set(key, value);
        self
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options.extend(options);
        self
    }

    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Write to a filesystem location
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let target = WriteTarget::Path(path.as_ref().to_path_buf());
        self.run(target)
    }

    /// Write to a target described by options, such as `url` and `dbtable`,
    /// or `path`
    pub fn save_from_options(self) -> Result<()> {
        let target = match self.options.get(keys::PATH) {
            Some(path) => WriteTarget::Path(PathBuf::from(path)),
            None => WriteTarget::Options,
        };
        self.run(target)
    }

    /// Write as a managed table in the session's catalog
    pub fn save_as_table(self, name: &str) -> Result<()> {
        self.format("table").run(WriteTarget::Table(name.to_string()))
    }

    pub fn parquet<P: AsRef<Path>>(self, path: P) -> Result<()> {
        self.format("parquet").save(path)
    }

    pub fn json<P: AsRef<Path>>(self, path: P) -> Result<()> {
        self.format("json").save(path)
    }

    /// Write to `table` through a connection string
    pub fn jdbc(self, url: &str, table: &str, properties: Options) -> Result<()> {
        self.format("jdbc")
            .options(properties)
            .option(keys::URL, url)
            .option(keys::DBTABLE, table)
            .run(WriteTarget::Options)
    }

    fn run(self, target: WriteTarget) -> Result<()> {
        let config = self.session.config();
        let mut options = self.options;
        config.apply_write_defaults(&mut options);

        let spec = WriteSpec {
            target,
            format: self.format,
            mode: self.mode,
            partition_by: self.partition_by,
            options,
        };
        let request = WritePlanner::new(config.default_format.clone()).plan(spec, self.dataset.schema())?;
        let connector = self.session.registry.get(&request.format)?;
        connector.write(self.dataset, request, &self.cancel)
    }
}
