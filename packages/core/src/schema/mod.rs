//! Schema Abstraction
//!
//! The schema decides which types exist, which fields they declare, which
//! data source stores them, and whether a pending change is valid. The hub
//! consumes it through the [`Schema`] trait; [`MemorySchema`] is the in-process
//! implementation built from schema models (`content-types`, `fields`,
//! `computed-fields`, ...).
//!
//! Schemas are immutable values. `apply_changes` and a successful `validate`
//! of a schema-typed write return a *new* schema handle; the old one stays
//! valid for whoever still holds it.

mod bootstrap;
mod memory;

pub use bootstrap::{
    bootstrap_models, CARD_ASSET_FIELDS, METADATA_FIELD_TYPES_FIELD, SCHEMA_TYPES,
};
pub use memory::{MemoryCurrentSchema, MemorySchema};

use crate::error::Result;
use crate::models::{Resource, Session};
use crate::sources::DataSource;
use crate::writers::PendingChange;
use async_trait::async_trait;
use std::sync::Arc;

/// Shared handle to an immutable schema
pub type SchemaRef = Arc<dyn Schema>;

/// Field type identifiers understood by the hub
pub mod field_types {
    pub const STRING: &str = "@cardhub/core-types::string";
    pub const BOOLEAN: &str = "@cardhub/core-types::boolean";
    pub const INTEGER: &str = "@cardhub/core-types::integer";
    pub const OBJECT: &str = "@cardhub/core-types::object";
    pub const BELONGS_TO: &str = "@cardhub/core-types::belongs-to";
    pub const HAS_MANY: &str = "@cardhub/core-types::has-many";

    /// Relationship fields carry linkage instead of attribute values
    pub fn is_relationship(field_type: &str) -> bool {
        field_type == BELONGS_TO || field_type == HAS_MANY
    }
}

/// A resolved field (real or computed)
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: String,
    pub field_type: String,
    pub is_relationship: bool,
    /// Exposed on the public card views
    pub is_metadata: bool,
    /// Exposed on the embedded card view
    pub needed_when_embedded: bool,
    pub is_computed: bool,
    pub related_types: Vec<String>,
}

/// A resolved content type
#[derive(Debug, Clone)]
pub struct ContentType {
    pub id: String,
    /// Real and computed field ids, in declaration order
    pub fields: Vec<String>,
    /// Relationship paths (`a.b.c`) indexed alongside documents of this type
    pub default_includes: Vec<String>,
    pub data_source: Option<DataSource>,
}

impl ContentType {
    pub fn has_field(&self, field_id: &str) -> bool {
        self.fields.iter().any(|f| f == field_id)
    }
}

/// Upsert (`document: Some`) or removal (`document: None`) of a schema model
#[derive(Debug, Clone)]
pub struct SchemaChange {
    pub resource_type: String,
    pub id: String,
    pub document: Option<Resource>,
}

impl SchemaChange {
    pub fn upsert(document: Resource) -> Self {
        Self {
            resource_type: document.resource_type.clone(),
            id: document.id.clone(),
            document: Some(document),
        }
    }

    pub fn removal(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            document: None,
        }
    }
}

/// What a write is validated against
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub resource_type: Option<&'a str>,
    pub id: Option<&'a str>,
    pub session: &'a Session,
}

/// Schema collaborator interface
#[async_trait]
pub trait Schema: Send + Sync {
    fn get_type(&self, name: &str) -> Option<Arc<ContentType>>;

    /// Whether documents of this type are themselves schema models
    fn is_schema_type(&self, name: &str) -> bool;

    /// Derive a new schema with the given models added, replaced or removed
    async fn apply_changes(&self, changes: Vec<SchemaChange>) -> Result<SchemaRef>;

    /// Validate a pending change
    ///
    /// Returns the schema that results from the change when the change
    /// itself edits the schema, `None` otherwise.
    async fn validate(
        &self,
        pending: &PendingChange,
        context: &ValidationContext<'_>,
    ) -> Result<Option<SchemaRef>>;

    /// Strip computed field values from a resource
    fn with_only_real_fields(&self, resource: Resource) -> Resource;

    fn get_real_and_computed_field(&self, id: &str) -> Option<Field>;
}

/// Source of the hub-wide current schema
#[async_trait]
pub trait CurrentSchema: Send + Sync {
    async fn get_schema(&self) -> Result<SchemaRef>;

    /// Drop any cached schema so the next `get_schema` reloads it
    async fn invalidate_cache(&self);
}
