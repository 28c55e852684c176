//! Indexer Plugin Contract
//!
//! A data source's indexer starts one [`Updater`] per indexing pass. What an
//! updater can do is declared through capability accessors rather than
//! queried for: each returns [`Capability::Supported`] with the
//! implementation, or [`Capability::Unsupported`] when the updater has
//! nothing to contribute for that hook.

use super::Operations;
use crate::error::Result;
use crate::models::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Narrows an indexing pass to the sources bound to the hinted types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateHint {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl UpdateHint {
    pub fn for_type(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            id: None,
        }
    }

    pub fn for_resource(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            id: Some(id.into()),
        }
    }
}

/// Whether an updater implements a hook
pub enum Capability<'a, T: ?Sized + 'a> {
    Supported(&'a mut T),
    Unsupported,
}

impl<'a, T: ?Sized + 'a> Capability<'a, T> {
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }
}

/// Contributes schema models at the start of a pass
#[async_trait]
pub trait SupportsSchema: Send {
    async fn schema(&mut self) -> Result<Vec<Resource>>;
}

/// Replays upstream content changes into the index
#[async_trait]
pub trait SupportsContentUpdate: Send {
    /// Returns the metadata to persist for the next pass
    async fn update_content(
        &mut self,
        meta: Option<Value>,
        hints: &[UpdateHint],
        ops: &mut Operations<'_>,
    ) -> Result<Option<Value>>;
}

/// Releases resources held by the updater
#[async_trait]
pub trait SupportsTeardown: Send {
    async fn destroy(&mut self) -> Result<()>;
}

/// One indexing pass worth of work for a data source
pub trait Updater: Send {
    fn schema_support(&mut self) -> Capability<'_, dyn SupportsSchema> {
        Capability::Unsupported
    }

    fn content_support(&mut self) -> Capability<'_, dyn SupportsContentUpdate> {
        Capability::Unsupported
    }

    fn teardown_support(&mut self) -> Capability<'_, dyn SupportsTeardown> {
        Capability::Unsupported
    }
}

/// Read half of a data source
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn begin_update(&self) -> Result<Box<dyn Updater>>;
}
