//! Data Sources
//!
//! A data source is a plugin binding: an optional [`Writer`] for the write
//! path and an optional [`Indexer`] for the indexing pipeline. Content types
//! name their data source through a `data-source` relationship; types without
//! one are bound to the registry's default source.

mod memory;

pub use memory::{MemoryDataSource, WriterStats};

use crate::config::HubConfig;
use crate::indexing::Indexer;
use crate::writers::Writer;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A registered data source
#[derive(Clone)]
pub struct DataSource {
    pub id: String,
    pub writer: Option<Arc<dyn Writer>>,
    pub indexer: Option<Arc<dyn Indexer>>,
}

impl DataSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            writer: None,
            indexer: None,
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn Writer>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("id", &self.id)
            .field("has_writer", &self.writer.is_some())
            .field("has_indexer", &self.indexer.is_some())
            .finish()
    }
}

/// Registered data sources plus the id of the default one
#[derive(Debug, Clone, Default)]
pub struct DataSourceRegistry {
    sources: BTreeMap<String, DataSource>,
    default_source: Option<String>,
}

impl DataSourceRegistry {
    pub fn new(default_source: impl Into<String>) -> Self {
        Self {
            sources: BTreeMap::new(),
            default_source: Some(default_source.into()),
        }
    }

    /// Registry whose default source is the configured one
    pub fn from_config(config: &HubConfig) -> Self {
        Self::new(config.default_data_source.clone())
    }

    /// Register a data source, replacing any previous one with the same id
    pub fn register(&mut self, source: DataSource) {
        self.sources.insert(source.id.clone(), source);
    }

    pub fn with_source(mut self, source: DataSource) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, id: &str) -> Option<&DataSource> {
        self.sources.get(id)
    }

    /// The source bound to content types that do not name one
    pub fn default_source(&self) -> Option<&DataSource> {
        self.default_source
            .as_deref()
            .and_then(|id| self.sources.get(id))
    }

    /// Registered sources in id order
    pub fn iter(&self) -> impl Iterator<Item = &DataSource> {
        self.sources.values()
    }
}
