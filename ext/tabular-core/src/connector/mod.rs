//! Storage connectors and the registry that selects them by format name

pub mod catalog;
pub mod file;
pub mod jdbc;
pub mod json;
pub mod parquet;

pub use catalog::{validate_table_name, Catalog, CatalogConnector, TableEntry};
pub use file::{DatasetLayout, FileConnector};
pub use jdbc::{ConnectionSpec, JdbcConnector, MemoryTabularStore, StoreWrite, TabularStore};
pub use json::JsonFormat;
pub use parquet::ParquetFormat;

use crate::traits::Connector;
use crate::{Result, TabularError};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Case-insensitive mapping from format identifier to connector
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: RwLock<IndexMap<String, Arc<dyn Connector>>>,
}

impl ConnectorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `parquet`, `json`, `jdbc` and `table`
    pub fn with_defaults(catalog: Arc<Catalog>, store: Arc<dyn TabularStore>) -> Self {
        let registry = Self::new();
        registry.register("parquet", Arc::new(FileConnector::new(ParquetFormat)));
        registry.register("json", Arc::new(FileConnector::new(JsonFormat)));
        registry.register("jdbc", Arc::new(JdbcConnector::new(store)));
        registry.register("table", Arc::new(CatalogConnector::new(catalog)));
        registry
    }

    /// Register or replace the connector for `format`
    pub fn register<S: AsRef<str>>(&self, format: S, connector: Arc<dyn Connector>) {
        let key = format.as_ref().to_ascii_lowercase();
        debug!(format = %key, connector = connector.name(), "registering connector");
        self.connectors.write().insert(key, connector);
    }

    pub fn get(&self, format: &str) -> Result<Arc<dyn Connector>> {
        self.connectors
            .read()
            .get(&format.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| TabularError::UnknownFormat(format.to_string()))
    }

    /// Registered format identifiers in registration order
    pub fn formats(&self) -> Vec<String> {
        self.connectors.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_case_insensitive_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectorRegistry::with_defaults(
            Arc::new(Catalog::new(dir.path())),
            Arc::new(MemoryTabularStore::new()),
        );

        assert_eq!(registry.formats(), vec!["parquet", "json", "jdbc", "table"]);
        assert_eq!(registry.get("PARQUET").unwrap().name(), "parquet");
        assert_eq!(registry.get("Table").unwrap().name(), "table");
        assert!(matches!(
            registry.get("orc"),
            Err(TabularError::UnknownFormat(format)) if format == "orc"
        ));
    }
}
