//! Document Context
//!
//! Wraps one upstream document with the schema knowledge needed to project
//! it for the index and for readers. A context without an upstream document
//! stands for a deletion.

use crate::error::{HubError, Result};
use crate::indexing::Generation;
use crate::models::{Document, Resource, Session};
use crate::schema::{ContentType, SchemaRef};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct DocumentContext {
    resource_type: String,
    id: String,
    schema: SchemaRef,
    source_id: Option<String>,
    generation: Option<Generation>,
    upstream: Option<Document>,
}

impl DocumentContext {
    pub fn new(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        schema: SchemaRef,
        source_id: Option<String>,
        upstream: Option<Document>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            schema,
            source_id,
            generation: None,
            upstream,
        }
    }

    /// Tag the document with a replace-all generation
    pub fn with_generation(mut self, generation: Option<Generation>) -> Self {
        self.generation = generation;
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    pub fn upstream(&self) -> Option<&Document> {
        self.upstream.as_ref()
    }

    pub fn content_type(&self) -> Option<Arc<ContentType>> {
        self.schema.get_type(&self.resource_type)
    }

    /// Relationship paths indexed alongside this document
    pub fn default_includes(&self) -> Vec<String> {
        self.content_type()
            .map(|ct| ct.default_includes.clone())
            .unwrap_or_default()
    }

    /// The projection stored in the index, or `None` when there is nothing
    /// searchable to store
    pub fn search_doc(&self) -> Option<Resource> {
        let upstream = self.upstream.as_ref()?;
        if self.content_type().is_none() {
            debug!(
                "dropping {}: no content type \"{}\" in schema",
                self.key(),
                self.resource_type
            );
            return None;
        }
        Some(self.schema.with_only_real_fields(upstream.data.clone()))
    }

    /// Merge finalizer-provided meta (e.g. the new version) into the document
    pub fn update_document_meta(&mut self, meta: Option<&Map<String, Value>>) {
        if let (Some(upstream), Some(meta)) = (self.upstream.as_mut(), meta) {
            upstream.data.merge_meta(meta);
        }
    }

    /// The document as the given session may see it
    pub fn apply_read_authorization(&self, session: &Session) -> Result<Document> {
        debug!(
            "authorizing read of {} for {}",
            self.key(),
            session.user_id().unwrap_or("internal")
        );
        self.upstream
            .clone()
            .ok_or_else(|| HubError::not_found(format!("No such resource {}", self.key())))
    }
}
