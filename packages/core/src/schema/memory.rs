//! In-process schema built from schema models
//!
//! `MemorySchema` resolves `content-types`, `fields` and `computed-fields`
//! documents into [`ContentType`] and [`Field`] values. Model sets are taken
//! as-is when a schema is constructed; only *changes* are checked, and a
//! change is rejected when it introduces a dangling reference that was not
//! already present:
//!
//! - a content type listing a field that does not exist
//! - a field whose `related-types` names a content type that does not exist

use super::{
    bootstrap_models, field_types, ContentType, CurrentSchema, Field, Schema, SchemaChange,
    SchemaRef, ValidationContext, SCHEMA_TYPES,
};
use crate::cards::{derive_card_model_content_type, is_card};
use crate::error::{HubError, Result};
use crate::models::{Document, Resource};
use crate::search::MemoryIndex;
use crate::sources::DataSourceRegistry;
use crate::writers::PendingChange;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Immutable schema resolved from a set of schema models
#[derive(Clone)]
pub struct MemorySchema {
    models: BTreeMap<String, Resource>,
    types: HashMap<String, Arc<ContentType>>,
    fields: HashMap<String, Field>,
    registry: Arc<DataSourceRegistry>,
}

impl MemorySchema {
    /// Resolve a schema from models, binding content types to data sources
    pub fn new(models: Vec<Resource>, registry: Arc<DataSourceRegistry>) -> Result<Self> {
        let models = models.into_iter().map(|m| (m.key(), m)).collect();
        Self::from_models(models, registry)
    }

    /// The core schema only
    pub fn bootstrap(registry: Arc<DataSourceRegistry>) -> Result<Self> {
        Self::new(bootstrap_models(), registry)
    }

    /// The core schema with no data sources bound, for pure format work
    pub fn standalone() -> Result<Self> {
        Self::bootstrap(Arc::new(DataSourceRegistry::default()))
    }

    /// Every schema model this schema was built from
    pub fn models(&self) -> impl Iterator<Item = &Resource> {
        self.models.values()
    }

    fn from_models(
        models: BTreeMap<String, Resource>,
        registry: Arc<DataSourceRegistry>,
    ) -> Result<Self> {
        let mut types = HashMap::new();
        let mut fields = HashMap::new();

        for model in models.values() {
            match model.resource_type.as_str() {
                "content-types" => {
                    let content_type = resolve_content_type(model, &registry);
                    types.insert(model.id.clone(), Arc::new(content_type));
                }
                "fields" | "computed-fields" => {
                    fields.insert(model.id.clone(), resolve_field(model)?);
                }
                _ => {}
            }
        }

        Ok(Self {
            models,
            types,
            fields,
            registry,
        })
    }

    /// Apply changes, rejecting newly introduced dangling references
    fn derive(&self, changes: Vec<SchemaChange>) -> Result<Self> {
        let mut models = self.models.clone();
        for change in changes {
            let key = format!("{}/{}", change.resource_type, change.id);
            match change.document {
                Some(document) => {
                    models.insert(key, document);
                }
                None => {
                    models.remove(&key);
                }
            }
        }
        let derived = Self::from_models(models, self.registry.clone())?;

        let before = self.dangling_references();
        if let Some(problem) = derived
            .dangling_references()
            .into_iter()
            .find(|p| !before.contains(p))
        {
            return Err(HubError::schema(problem));
        }
        Ok(derived)
    }

    fn dangling_references(&self) -> BTreeSet<String> {
        let mut problems = BTreeSet::new();
        for content_type in self.types.values() {
            for field in content_type.fields.iter() {
                if !self.fields.contains_key(field) {
                    problems.insert(format!(
                        "content type \"{}\" refers to missing field \"{}\"",
                        content_type.id, field
                    ));
                }
            }
        }
        for field in self.fields.values() {
            for related in field.related_types.iter() {
                if !self.types.contains_key(related) {
                    problems.insert(format!(
                        "field \"{}\" refers to missing content type \"{}\"",
                        field.id, related
                    ));
                }
            }
        }
        problems
    }

    fn validate_content(&self, resource_type: &str, document: Option<&Resource>) -> Result<()> {
        let content_type = self.get_type(resource_type).ok_or_else(|| {
            HubError::validation(
                format!("\"{}\" is not a valid type", resource_type),
                "/data/type",
            )
        })?;
        let Some(document) = document else {
            return Ok(());
        };
        if let Some(name) = document
            .attributes
            .keys()
            .find(|name| !content_type.has_field(name))
        {
            return Err(HubError::validation(
                format!("type \"{}\" has no field named \"{}\"", resource_type, name),
                format!("/data/attributes/{}", name),
            ));
        }
        if let Some(name) = document
            .relationships
            .keys()
            .find(|name| !content_type.has_field(name))
        {
            return Err(HubError::validation(
                format!("type \"{}\" has no field named \"{}\"", resource_type, name),
                format!("/data/relationships/{}", name),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Schema for MemorySchema {
    fn get_type(&self, name: &str) -> Option<Arc<ContentType>> {
        self.types.get(name).cloned()
    }

    fn is_schema_type(&self, name: &str) -> bool {
        SCHEMA_TYPES.contains(&name)
    }

    async fn apply_changes(&self, changes: Vec<SchemaChange>) -> Result<SchemaRef> {
        Ok(Arc::new(self.derive(changes)?))
    }

    async fn validate(
        &self,
        pending: &PendingChange,
        context: &ValidationContext<'_>,
    ) -> Result<Option<SchemaRef>> {
        let resource_type = pending
            .final_document()
            .or(pending.original_document())
            .map(|r| r.resource_type.clone())
            .or_else(|| context.resource_type.map(str::to_string))
            .ok_or_else(|| HubError::invalid("The change carries no document"))?;

        if !self.is_schema_type(&resource_type) {
            self.validate_content(&resource_type, pending.final_document())?;
            return Ok(None);
        }

        let change = match (pending.final_document(), pending.original_document()) {
            (Some(document), _) => SchemaChange::upsert(document.clone()),
            (None, Some(original)) => SchemaChange::removal(&original.resource_type, &original.id),
            (None, None) => return Ok(None),
        };
        let derived = self.derive(vec![change]).map_err(|e| match e {
            HubError::Schema(detail) => HubError::invalid(detail),
            other => other,
        })?;
        Ok(Some(Arc::new(derived)))
    }

    fn with_only_real_fields(&self, mut resource: Resource) -> Resource {
        let is_computed = |name: &String| {
            self.fields
                .get(name)
                .map(|f| f.is_computed)
                .unwrap_or(false)
        };
        resource.attributes.retain(|name, _| !is_computed(name));
        resource.relationships.retain(|name, _| !is_computed(name));
        resource
    }

    fn get_real_and_computed_field(&self, id: &str) -> Option<Field> {
        self.fields.get(id).cloned()
    }
}

fn resolve_content_type(model: &Resource, registry: &DataSourceRegistry) -> ContentType {
    let fields = model
        .linkage("fields")
        .map(|l| l.refs().into_iter().map(|r| r.id.clone()).collect())
        .unwrap_or_default();
    let default_includes = model
        .attributes
        .get("default-includes")
        .and_then(Value::as_array)
        .map(|paths| {
            paths
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let data_source = match model.linkage("data-source").and_then(|l| l.first()) {
        Some(source) => registry.get(&source.id).cloned(),
        None => registry.default_source().cloned(),
    };
    ContentType {
        id: model.id.clone(),
        fields,
        default_includes,
        data_source,
    }
}

fn resolve_field(model: &Resource) -> Result<Field> {
    let field_type = model
        .attributes
        .get("field-type")
        .and_then(Value::as_str)
        .ok_or_else(|| HubError::schema(format!("field \"{}\" has no field-type", model.id)))?
        .to_string();
    let flag = |name: &str| {
        model
            .attributes
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    Ok(Field {
        id: model.id.clone(),
        is_relationship: field_types::is_relationship(&field_type),
        field_type,
        is_metadata: flag("is-metadata"),
        needed_when_embedded: flag("needed-when-embedded"),
        is_computed: model.resource_type == "computed-fields",
        related_types: model
            .linkage("related-types")
            .map(|l| l.refs().into_iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default(),
    })
}

/// Current schema rebuilt from the indexed schema documents
///
/// The core models are always present. Every indexed card model also
/// contributes the content type derived from its field list.
pub struct MemoryCurrentSchema {
    index: MemoryIndex,
    registry: Arc<DataSourceRegistry>,
    cached: RwLock<Option<SchemaRef>>,
}

impl MemoryCurrentSchema {
    pub fn new(index: MemoryIndex, registry: Arc<DataSourceRegistry>) -> Self {
        Self {
            index,
            registry,
            cached: RwLock::new(None),
        }
    }

    async fn load(&self) -> Result<SchemaRef> {
        let mut models = bootstrap_models();
        for resource in self.index.all_resources().await {
            if SCHEMA_TYPES.contains(&resource.resource_type.as_str()) {
                models.push(resource);
            } else if is_card(&resource.resource_type, &resource.id) {
                if let Some(content_type) = derive_card_model_content_type(&Document::new(resource))
                {
                    models.push(content_type);
                }
            }
        }
        Ok(Arc::new(MemorySchema::new(models, self.registry.clone())?))
    }
}

#[async_trait]
impl CurrentSchema for MemoryCurrentSchema {
    async fn get_schema(&self) -> Result<SchemaRef> {
        if let Some(schema) = self.cached.read().await.as_ref() {
            return Ok(schema.clone());
        }
        let mut cached = self.cached.write().await;
        if let Some(schema) = cached.as_ref() {
            return Ok(schema.clone());
        }
        let schema = self.load().await?;
        *cached = Some(schema.clone());
        Ok(schema)
    }

    async fn invalidate_cache(&self) {
        *self.cached.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Linkage, ResourceRef};
    use serde_json::json;

    fn field(id: &str) -> Resource {
        Resource::new("fields", id).with_attribute("field-type", json!(field_types::STRING))
    }

    fn content_type(id: &str, fields: &[&str]) -> Resource {
        Resource::new("content-types", id).with_relationship(
            "fields",
            Linkage::Many(fields.iter().map(|f| ResourceRef::new("fields", *f)).collect()),
        )
    }

    #[tokio::test]
    async fn test_bootstrap_types() {
        let schema = MemorySchema::standalone().unwrap();
        assert!(schema.get_type("content-types").is_some());
        assert!(schema.is_schema_type("fields"));
        assert!(!schema.is_schema_type("articles"));

        let metadata = schema
            .get_real_and_computed_field("metadata-field-types")
            .unwrap();
        assert!(metadata.is_computed);
        assert!(metadata.is_metadata);

        let relationship = schema.get_real_and_computed_field("fields").unwrap();
        assert!(relationship.is_relationship);
    }

    #[tokio::test]
    async fn test_apply_changes_rejects_new_dangling_references() {
        let schema = MemorySchema::standalone().unwrap();

        let err = schema
            .apply_changes(vec![SchemaChange::upsert(content_type("articles", &["title"]))])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing field \"title\""));

        let schema = schema
            .apply_changes(vec![
                SchemaChange::upsert(field("title")),
                SchemaChange::upsert(content_type("articles", &["title"])),
            ])
            .await
            .unwrap();
        assert_eq!(schema.get_type("articles").unwrap().fields, vec!["title"]);

        let err = schema
            .apply_changes(vec![SchemaChange::removal("fields", "title")])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("refers to missing field"));
    }

    #[tokio::test]
    async fn test_existing_dangling_references_are_tolerated() {
        let registry = Arc::new(DataSourceRegistry::default());
        let mut models = bootstrap_models();
        models.push(content_type("articles", &["title"]));
        let schema = MemorySchema::new(models, registry).unwrap();

        let derived = schema
            .apply_changes(vec![SchemaChange::upsert(field("body"))])
            .await
            .unwrap();
        assert!(derived.get_real_and_computed_field("body").is_some());
    }

    #[test]
    fn test_with_only_real_fields() {
        let schema = MemorySchema::standalone().unwrap();
        let resource = Resource::new("articles", "1")
            .with_attribute("title", json!("x"))
            .with_attribute("metadata-field-types", json!({}));
        let stripped = schema.with_only_real_fields(resource);
        assert!(stripped.attributes.contains_key("title"));
        assert!(!stripped.attributes.contains_key("metadata-field-types"));
    }

    #[test]
    fn test_current_schema_reloads_after_invalidation() {
        use crate::search::{Batch, DocumentContext, SearchClient};

        let index = MemoryIndex::new();
        let current = MemoryCurrentSchema::new(index.clone(), Arc::new(DataSourceRegistry::default()));

        tokio_test::block_on(async {
            let before = current.get_schema().await.unwrap();
            assert!(before.get_type("articles").is_none());
            assert!(Arc::ptr_eq(&before, &current.get_schema().await.unwrap()));

            let schema: SchemaRef = Arc::new(MemorySchema::standalone().unwrap());
            let mut batch = index.begin_batch(schema.clone());
            let articles = content_type("articles", &[]);
            let context = DocumentContext::new(
                "content-types",
                "articles",
                schema,
                None,
                Some(Document::new(articles)),
            );
            batch.save_document(&context).await.unwrap();
            batch.done().await.unwrap();

            assert!(current.get_schema().await.unwrap().get_type("articles").is_none());
            current.invalidate_cache().await;
            assert!(current.get_schema().await.unwrap().get_type("articles").is_some());
        });
    }

    #[test]
    fn test_field_without_type_is_a_schema_error() {
        let registry = Arc::new(DataSourceRegistry::default());
        let err = MemorySchema::new(vec![Resource::new("fields", "title")], registry)
            .err()
            .unwrap();
        assert_eq!(err.status(), 500);
    }
}
