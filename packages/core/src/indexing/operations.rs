//! Operations handed to a data source during an indexing pass
//!
//! A data source stages content through exactly three verbs: `save`,
//! `delete`, and the `begin_replace_all`/`finish_replace_all` pair. The
//! replace-all pair tags everything saved in between with a fresh
//! [`Generation`] and, on finish, prunes every document from the same source
//! that was not re-saved under it.

use super::events::IndexingEvent;
use crate::error::{HubError, Result};
use crate::models::Document;
use crate::schema::SchemaRef;
use crate::search::{Batch, DocumentContext, SearchClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Replace-all marker; zero is a valid generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl Generation {
    /// A fresh 63-bit random generation
    pub fn mint() -> Self {
        Generation(Uuid::new_v4().as_u128() as u64 & i64::MAX as u64)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Generation(value)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability object scoped to one data source for one pass
pub struct Operations<'a> {
    source_id: String,
    schema: SchemaRef,
    client: &'a dyn SearchClient,
    batch: &'a mut dyn Batch,
    events: &'a broadcast::Sender<IndexingEvent>,
    generation: Option<Generation>,
}

impl<'a> Operations<'a> {
    pub(crate) fn new(
        source_id: impl Into<String>,
        schema: SchemaRef,
        client: &'a dyn SearchClient,
        batch: &'a mut dyn Batch,
        events: &'a broadcast::Sender<IndexingEvent>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            schema,
            client,
            batch,
            events,
            generation: None,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Generation of the replace-all in progress, if any
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    /// Stage a document; it is dropped when the schema gives it no
    /// searchable projection
    pub async fn save(
        &mut self,
        resource_type: &str,
        id: &str,
        document: Document,
    ) -> Result<()> {
        let context = DocumentContext::new(
            resource_type,
            id,
            self.schema.clone(),
            Some(self.source_id.clone()),
            Some(document.clone()),
        )
        .with_generation(self.generation);

        if context.search_doc().is_none() {
            return Ok(());
        }
        self.batch.save_document(&context).await?;

        let _ = self.events.send(IndexingEvent::Add {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
            document,
        });
        debug!("save {} {}", resource_type, id);
        Ok(())
    }

    pub async fn delete(&mut self, resource_type: &str, id: &str) -> Result<()> {
        let context = DocumentContext::new(resource_type, id, self.schema.clone(), None, None);
        self.batch.delete_document(&context).await?;

        let _ = self.events.send(IndexingEvent::Delete {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        });
        debug!("delete {} {}", resource_type, id);
        Ok(())
    }

    /// Start tagging saves with a freshly minted generation
    pub fn begin_replace_all(&mut self) -> Generation {
        let generation = Generation::mint();
        self.generation = Some(generation);
        generation
    }

    /// Prune everything from this source outside the current generation
    pub async fn finish_replace_all(&mut self) -> Result<()> {
        let generation = self.generation.take().ok_or_else(|| {
            HubError::indexing("tried to finish_replace_all when there was no begin_replace_all")
        })?;
        self.client
            .delete_older_generations(&self.source_id, generation)
            .await?;

        let _ = self.events.send(IndexingEvent::DeleteAllWithoutNonce {
            source_id: self.source_id.clone(),
            generation,
        });
        debug!(
            "bulk delete older content for data source {}",
            self.source_id
        );
        Ok(())
    }
}
