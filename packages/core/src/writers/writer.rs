//! Writer Plugin Contract
//!
//! A data source's writer never touches the index. It *prepares* a change:
//! it reports the document before and after the write and hands back a
//! finalizer that commits it and an aborter that releases anything staged.
//! The orchestrator wraps the result in a [`PendingChange`](super::PendingChange)
//! and decides which of the two runs.

use crate::error::{HubError, Result};
use crate::models::{Resource, Session};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Readable byte stream for binary uploads
pub type BinaryStream = Pin<Box<dyn AsyncRead + Send>>;

/// Meta a finalizer hands back to be merged into the final document
pub type FinalizeMeta = Option<Map<String, Value>>;

/// Commits a prepared change
pub type Finalizer =
    Box<dyn FnOnce(FinalizeContext) -> BoxFuture<'static, Result<FinalizeMeta>> + Send + Sync>;

/// Releases whatever a prepared change staged
pub type Aborter = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Named values a writer passes from `prepare_*` through to its finalizer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChangeOptions {
    /// The change edits a schema model
    pub is_schema: bool,
    /// Id of a staged binary blob the finalizer commits
    pub blob_id: Option<String>,
    /// Content type of a staged binary blob
    pub blob_content_type: Option<String>,
}

/// What a finalizer gets to see
#[derive(Debug, Clone)]
pub struct FinalizeContext {
    pub is_bulk: bool,
    pub final_document: Option<Resource>,
    pub server_provided_values: BTreeMap<String, Value>,
    pub options: PendingChangeOptions,
}

/// A change a writer has prepared but not committed
pub struct PreparedChange {
    pub original_document: Option<Resource>,
    pub final_document: Option<Resource>,
    pub finalizer: Option<Finalizer>,
    pub aborter: Option<Aborter>,
    pub options: PendingChangeOptions,
}

impl PreparedChange {
    pub fn new(original_document: Option<Resource>, final_document: Option<Resource>) -> Self {
        Self {
            original_document,
            final_document,
            finalizer: None,
            aborter: None,
            options: PendingChangeOptions::default(),
        }
    }

    pub fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    pub fn with_aborter(mut self, aborter: Aborter) -> Self {
        self.aborter = Some(aborter);
        self
    }

    pub fn with_options(mut self, options: PendingChangeOptions) -> Self {
        self.options = options;
        self
    }
}

/// Write half of a data source
#[async_trait]
pub trait Writer: Send + Sync {
    async fn prepare_create(
        &self,
        session: &Session,
        resource_type: &str,
        document: Resource,
        is_schema: bool,
    ) -> Result<PreparedChange>;

    async fn prepare_update(
        &self,
        session: &Session,
        resource_type: &str,
        id: &str,
        document: Resource,
        is_schema: bool,
    ) -> Result<PreparedChange>;

    async fn prepare_delete(
        &self,
        session: &Session,
        version: Option<&str>,
        resource_type: &str,
        id: &str,
        is_schema: bool,
    ) -> Result<PreparedChange>;

    async fn prepare_binary_create(
        &self,
        _session: &Session,
        resource_type: &str,
        _stream: BinaryStream,
    ) -> Result<PreparedChange> {
        Err(HubError::bad_request(format!(
            "\"{}\" does not accept binary uploads",
            resource_type
        )))
    }

    /// Flush work buffered by a bulk create or update
    async fn bulk_push(&self) -> Result<()> {
        Ok(())
    }
}
