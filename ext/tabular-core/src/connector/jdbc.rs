//! Generic tabular storage reached through a connection string
//!
//! The actual database is an external collaborator behind [`TabularStore`].
//! [`MemoryTabularStore`] keeps tables in process and is what the default
//! registry uses.

use crate::config::keys;
use crate::traits::{Connector, ReadRequest, ReadSource};
use crate::{
    CancellationToken, Dataset, Options, Result, Row, SaveMode, Schema, TabularError, WriteRequest,
    WriteTarget,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const URL_PREFIX: &str = "jdbc:";

/// Keys consumed by the core rather than passed to the store
const RESERVED_KEYS: &[&str] = &[
    keys::URL,
    keys::DBTABLE,
    keys::USER,
    keys::PASSWORD,
    keys::MODE,
    keys::PARTITION_BY,
    keys::PATH,
    keys::COMPRESSION,
    keys::MAX_RECORDS_PER_FILE,
    keys::WRITER_BATCH_SIZE,
    keys::MERGE_SCHEMA,
    keys::BINARY_AS_STRING,
];

/// Parsed connection string plus credentials
///
/// `jdbc:dialect:server;user=u;password=p` and `jdbc:dialect:server` with
/// separate `user`/`password` options describe the same connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSpec {
    url: String,
    user: Option<String>,
    password: Option<String>,
    properties: IndexMap<String, String>,
}

impl ConnectionSpec {
    /// Parse a `jdbc:` URL with optional `;key=value` segments
    pub fn parse(url: &str) -> Result<Self> {
        let mut segments = url.split(';');
        let base = segments.next().unwrap_or_default().trim();
        if !base.to_ascii_lowercase().starts_with(URL_PREFIX) || base.len() == URL_PREFIX.len() {
            return Err(TabularError::invalid_option(
                keys::URL,
                format!("expected a connection string starting with '{}'", URL_PREFIX),
            ));
        }

        let mut spec = ConnectionSpec {
            url: base.to_string(),
            user: None,
            password: None,
            properties: IndexMap::new(),
        };
        for segment in segments.map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                TabularError::invalid_option(keys::URL, format!("malformed segment '{}'", segment))
            })?;
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();
            match key.as_str() {
                "user" => spec.user = Some(value),
                "password" => spec.password = Some(value),
                _ => {
                    spec.properties.insert(key, value);
                }
            }
        }
        Ok(spec)
    }

    /// Add explicit credentials; they must agree with any given inline
    pub fn with_credentials(mut self, user: Option<&str>, password: Option<&str>) -> Result<Self> {
        merge_credential(&mut self.user, user, keys::USER)?;
        merge_credential(&mut self.password, password, keys::PASSWORD)?;
        Ok(self)
    }

    /// Build from the option form, returning the connection and the table name
    pub fn from_options(options: &Options) -> Result<(Self, String)> {
        let url = options
            .get(keys::URL)
            .ok_or_else(|| TabularError::MissingOption(keys::URL.to_string()))?;
        let table = options
            .get(keys::DBTABLE)
            .map(str::trim)
            .filter(|table| !table.is_empty())
            .ok_or_else(|| TabularError::MissingOption(keys::DBTABLE.to_string()))?;

        let mut spec = Self::parse(url)?.with_credentials(options.get(keys::USER), options.get(keys::PASSWORD))?;
        for (key, value) in options.iter() {
            let reserved = RESERVED_KEYS.iter().any(|r| r.eq_ignore_ascii_case(key));
            if !reserved {
                spec.properties.insert(key.to_ascii_lowercase(), value.to_string());
            }
        }
        Ok((spec, table.to_string()))
    }

    /// Connection string without credentials
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn properties(&self) -> &IndexMap<String, String> {
        &self.properties
    }
}

fn merge_credential(slot: &mut Option<String>, explicit: Option<&str>, key: &str) -> Result<()> {
    match (slot.as_deref(), explicit) {
        (Some(inline), Some(explicit)) if inline != explicit => Err(TabularError::invalid_option(
            key,
            "conflicts with the value given in the connection string",
        )),
        (None, Some(explicit)) => {
            *slot = Some(explicit.to_string());
            Ok(())
        }
        _ => Ok(()),
    }
}

impl fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("properties", &self.properties)
            .finish()
    }
}

/// How a store write treats an existing table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreWrite {
    /// Drop existing rows and schema
    Replace,
    /// Add rows to the table, which must have the same schema
    Append,
}

/// Backend holding named tables behind a connection
pub trait TabularStore: Send + Sync {
    fn table_exists(&self, conn: &ConnectionSpec, table: &str) -> Result<bool>;

    /// Schema and rows of a table; [`TabularError::TableNotFound`] if absent
    fn read_table(&self, conn: &ConnectionSpec, table: &str) -> Result<(Schema, Vec<Row>)>;

    fn write_table(
        &self,
        conn: &ConnectionSpec,
        table: &str,
        schema: &Schema,
        rows: Vec<Row>,
        mode: StoreWrite,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
struct StoredTable {
    schema: Schema,
    rows: Vec<Row>,
}

/// In-process [`TabularStore`] keyed by connection URL and table name
///
/// Table names are case-insensitive. Credentials are only checked for URLs
/// registered with [`MemoryTabularStore::require_credentials`].
#[derive(Debug, Default)]
pub struct MemoryTabularStore {
    tables: RwLock<HashMap<(String, String), StoredTable>>,
    credentials: RwLock<HashMap<String, (String, String)>>,
}

impl MemoryTabularStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject connections to `url` that do not present these credentials
    pub fn require_credentials<U, P>(&self, url: &str, user: U, password: P)
    where
        U: Into<String>,
        P: Into<String>,
    {
        self.credentials
            .write()
            .insert(url.to_string(), (user.into(), password.into()));
    }

    /// Names of the tables stored under `url`
    pub fn table_names(&self, url: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .keys()
            .filter(|(table_url, _)| table_url == url)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn authenticate(&self, conn: &ConnectionSpec) -> Result<()> {
        let credentials = self.credentials.read();
        let Some((user, password)) = credentials.get(conn.url()) else {
            return Ok(());
        };
        if conn.user() == Some(user.as_str()) && conn.password() == Some(password.as_str()) {
            Ok(())
        } else {
            Err(TabularError::store(
                "jdbc",
                format!(
                    "authentication failed for user '{}' at {}",
                    conn.user().unwrap_or_default(),
                    conn.url()
                ),
            ))
        }
    }

    fn key(conn: &ConnectionSpec, table: &str) -> (String, String) {
        (conn.url().to_string(), table.to_ascii_lowercase())
    }
}

impl TabularStore for MemoryTabularStore {
    fn table_exists(&self, conn: &ConnectionSpec, table: &str) -> Result<bool> {
        self.authenticate(conn)?;
        Ok(self.tables.read().contains_key(&Self::key(conn, table)))
    }

    fn read_table(&self, conn: &ConnectionSpec, table: &str) -> Result<(Schema, Vec<Row>)> {
        self.authenticate(conn)?;
        self.tables
            .read()
            .get(&Self::key(conn, table))
            .map(|stored| (stored.schema.clone(), stored.rows.clone()))
            .ok_or_else(|| TabularError::TableNotFound(table.to_string()))
    }

    fn write_table(
        &self,
        conn: &ConnectionSpec,
        table: &str,
        schema: &Schema,
        rows: Vec<Row>,
        mode: StoreWrite,
    ) -> Result<()> {
        self.authenticate(conn)?;
        let mut tables = self.tables.write();
        let key = Self::key(conn, table);

        match (mode, tables.get_mut(&key)) {
            (StoreWrite::Append, Some(stored)) => {
                if stored.schema != *schema {
                    return Err(TabularError::schema(format!(
                        "cannot append {} to table '{}' with schema {}",
                        schema, table, stored.schema
                    )));
                }
                stored.rows.extend(rows);
            }
            _ => {
                tables.insert(
                    key,
                    StoredTable {
                        schema: schema.clone(),
                        rows,
                    },
                );
            }
        }
        Ok(())
    }
}

/// Connector for `format("jdbc")`
pub struct JdbcConnector {
    store: Arc<dyn TabularStore>,
}

impl JdbcConnector {
    pub fn new(store: Arc<dyn TabularStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TabularStore> {
        &self.store
    }
}

impl Connector for JdbcConnector {
    fn name(&self) -> &str {
        "jdbc"
    }

    fn read(&self, request: ReadRequest, cancel: &CancellationToken) -> Result<Dataset> {
        if request.schema.is_some() {
            return Err(TabularError::invalid_argument(
                "jdbc sources do not accept a user-specified schema",
            ));
        }
        let mut options = request.options;
        if let ReadSource::Table(name) = &request.source {
            options.set(keys::DBTABLE, name.clone());
        } else if let ReadSource::Path(path) = &request.source {
            return Err(TabularError::invalid_argument(format!(
                "jdbc sources are addressed by url and dbtable, got {}",
                path.display()
            )));
        }

        let (conn, table) = ConnectionSpec::from_options(&options)?;
        cancel.check()?;
        debug!(url = conn.url(), table = %table, "reading jdbc table");

        let (schema, rows) = self.store.read_table(&conn, &table)?;
        cancel.check()?;
        Dataset::from_rows(rows, schema)
    }

    fn write(&self, dataset: &Dataset, request: WriteRequest, cancel: &CancellationToken) -> Result<()> {
        let mut options = request.options;
        match request.target {
            WriteTarget::Options => {}
            WriteTarget::Table(name) => options.set(keys::DBTABLE, name),
            WriteTarget::Path(path) => {
                return Err(TabularError::invalid_argument(format!(
                    "jdbc targets are addressed by url and dbtable, got {}",
                    path.display()
                )))
            }
        }
        if !request.partition_columns.is_empty() {
            return Err(TabularError::invalid_option(
                keys::PARTITION_BY,
                "partitioning is not supported by jdbc targets",
            ));
        }

        let (conn, table) = ConnectionSpec::from_options(&options)?;
        let exists = self.store.table_exists(&conn, &table)?;
        let mode = match (request.mode, exists) {
            (SaveMode::ErrorIfExists, true) => return Err(TabularError::TableAlreadyExists(table)),
            (SaveMode::Ignore, true) => {
                info!(url = conn.url(), table = %table, "table exists, ignoring write");
                return Ok(());
            }
            (SaveMode::Append, _) => StoreWrite::Append,
            _ => StoreWrite::Replace,
        };

        let mut rows = Vec::new();
        for row in dataset.to_rows()? {
            cancel.check()?;
            rows.push(row?);
        }
        cancel.check()?;

        let count = rows.len();
        self.store
            .write_table(&conn, &table, dataset.schema(), rows, mode)?;
        info!(url = conn.url(), table = %table, rows = count, mode = ?mode, "wrote jdbc table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, SchemaBuilder, Value};

    fn sample() -> Dataset {
        let schema = SchemaBuilder::new()
            .field("id", DataType::Long, false)
            .field("name", DataType::String, true)
            .build()
            .unwrap();
        Dataset::from_rows(
            vec![
                Row::new(vec![Value::Long(1), Value::from("bao")]),
                Row::new(vec![Value::Long(2), Value::Null]),
            ],
            schema,
        )
        .unwrap()
    }

    fn option_form() -> Options {
        Options::new()
            .with("url", "jdbc:dialect:serverName")
            .with("user", "user")
            .with("password", "pass")
            .with("dbtable", "table")
    }

    #[test]
    fn test_inline_and_option_forms_are_equal() {
        let inline = Options::new()
            .with("url", "jdbc:dialect:serverName;user=user;password=pass")
            .with("dbtable", "table");
        assert_eq!(
            ConnectionSpec::from_options(&inline).unwrap(),
            ConnectionSpec::from_options(&option_form()).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_non_jdbc_urls() {
        assert!(matches!(
            ConnectionSpec::parse("postgres://server"),
            Err(TabularError::InvalidOption { .. })
        ));
        assert!(ConnectionSpec::parse("jdbc:dialect:server;bogus").is_err());
    }

    #[test]
    fn test_conflicting_credentials() {
        let spec = ConnectionSpec::parse("jdbc:dialect:server;user=a").unwrap();
        assert!(spec.clone().with_credentials(Some("a"), None).is_ok());
        match spec.with_credentials(Some("b"), None) {
            Err(TabularError::InvalidOption { key, .. }) => assert_eq!(key, "user"),
            other => panic!("expected option error, got {other:?}"),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let spec = ConnectionSpec::parse("jdbc:dialect:server;user=u;password=secret").unwrap();
        let debug = format!("{spec:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_write_modes() {
        let store = Arc::new(MemoryTabularStore::new());
        let connector = JdbcConnector::new(store.clone());
        let cancel = CancellationToken::new();
        let request = |mode| WriteRequest {
            target: WriteTarget::Options,
            format: "jdbc".to_string(),
            mode,
            partition_columns: Vec::new(),
            options: option_form(),
        };

        connector.write(&sample(), request(SaveMode::ErrorIfExists), &cancel).unwrap();
        assert!(matches!(
            connector.write(&sample(), request(SaveMode::ErrorIfExists), &cancel),
            Err(TabularError::TableAlreadyExists(_))
        ));
        connector.write(&sample(), request(SaveMode::Ignore), &cancel).unwrap();
        connector.write(&sample(), request(SaveMode::Append), &cancel).unwrap();

        let read = connector
            .read(ReadRequest::new(ReadSource::Options, "jdbc").with_options(option_form()), &cancel)
            .unwrap();
        assert_eq!(read.count().unwrap(), 4);

        connector.write(&sample(), request(SaveMode::Overwrite), &cancel).unwrap();
        assert_eq!(store.table_names("jdbc:dialect:serverName"), vec!["table"]);
    }

    #[test]
    fn test_credentials_checked_when_required() {
        let store = Arc::new(MemoryTabularStore::new());
        store.require_credentials("jdbc:dialect:serverName", "user", "pass");
        let connector = JdbcConnector::new(store);
        let cancel = CancellationToken::new();

        let anonymous = Options::new()
            .with("url", "jdbc:dialect:serverName")
            .with("dbtable", "table");
        let err = connector
            .read(ReadRequest::new(ReadSource::Options, "jdbc").with_options(anonymous), &cancel)
            .unwrap_err();
        assert!(err.is_connector_io());

        let err = connector
            .read(ReadRequest::new(ReadSource::Options, "jdbc").with_options(option_form()), &cancel)
            .unwrap_err();
        assert!(matches!(err, TabularError::TableNotFound(_)));
    }

    #[test]
    fn test_missing_dbtable() {
        let options = Options::new().with("url", "jdbc:dialect:serverName");
        assert!(matches!(
            ConnectionSpec::from_options(&options),
            Err(TabularError::MissingOption(key)) if key == "dbtable"
        ));
    }
}
