//! Search Backend Abstraction
//!
//! The index is reached through two seams:
//!
//! - [`SearchClient`]: schema accommodation, write batches, per-source
//!   metadata and generation pruning (used by the write path and the
//!   indexing pipeline)
//! - [`Searchers`]: authorized reads of indexed documents
//!
//! [`MemoryIndex`] implements both in-process.

mod document_context;
mod memory;

pub use document_context::DocumentContext;
pub use memory::MemoryIndex;

use crate::error::Result;
use crate::indexing::Generation;
use crate::models::{CollectionDocument, Document, Session};
use crate::schema::SchemaRef;
use async_trait::async_trait;
use serde_json::Value;

/// A write batch; consumed by `done`, so it cannot be reused afterwards
#[async_trait]
pub trait Batch: Send {
    /// Stage a document; contexts without a searchable projection are skipped
    async fn save_document(&mut self, context: &DocumentContext) -> Result<()>;

    async fn delete_document(&mut self, context: &DocumentContext) -> Result<()>;

    /// Apply every staged operation
    async fn done(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn ensure_database_setup(&self) -> Result<()>;

    /// Bring index structures in line with a schema
    async fn accomodate_schema(&self, schema: &SchemaRef) -> Result<()>;

    fn begin_batch(&self, schema: SchemaRef) -> Box<dyn Batch>;

    /// Metadata last saved for a data source
    async fn load_meta(&self, source_id: &str) -> Result<Option<Value>>;

    async fn save_meta(&self, source_id: &str, params: Option<Value>) -> Result<()>;

    /// Delete every document from a source not tagged with `generation`
    async fn delete_older_generations(&self, source_id: &str, generation: Generation)
        -> Result<()>;
}

#[async_trait]
pub trait Searchers: Send + Sync {
    /// Fetch one document with its default includes (404 when missing)
    async fn get(
        &self,
        session: &Session,
        source_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Document>;

    /// Run a query of the form `{ "filter": { "type": ... } }`
    async fn search(&self, session: &Session, query: &Value) -> Result<CollectionDocument>;
}
