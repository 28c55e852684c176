//! In-process data source
//!
//! `MemoryDataSource` is both halves of a data source: a [`Writer`] with
//! optimistic versioning and staged binary uploads, and an [`Indexer`] whose
//! updater re-indexes the whole store whenever it changed since the last
//! pass.

use super::DataSource;
use crate::cards::{derive_card_model_content_type, is_card};
use crate::error::{HubError, Result};
use crate::indexing::{
    Capability, Indexer, Operations, SupportsContentUpdate, SupportsSchema, UpdateHint, Updater,
};
use crate::models::{Document, Resource, Session};
use crate::schema::SCHEMA_TYPES;
use crate::writers::{
    Aborter, BinaryStream, FinalizeContext, Finalizer, PendingChangeOptions, PreparedChange,
    Writer,
};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Counters for what happened to prepared changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub finalized: usize,
    pub aborted: usize,
    pub bulk_pushes: usize,
}

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<String, Resource>,
    blobs: HashMap<String, Vec<u8>>,
    staged_blobs: HashMap<String, Vec<u8>>,
    revision: u64,
    stats: WriterStats,
}

impl StoreState {
    fn commit(&mut self, mut resource: Resource, previous: Option<&str>) -> Map<String, Value> {
        let version = previous
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v + 1)
            .unwrap_or(1);
        let mut meta = Map::new();
        meta.insert("version".to_string(), json!(version.to_string()));
        resource.merge_meta(&meta);
        self.records.insert(resource.key(), resource);
        self.revision += 1;
        self.stats.finalized += 1;
        meta
    }
}

#[derive(Clone)]
pub struct MemoryDataSource {
    id: String,
    state: Arc<RwLock<StoreState>>,
}

impl MemoryDataSource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Arc::new(RwLock::new(StoreState::default())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register this store as both writer and indexer of a data source
    pub fn data_source(self: &Arc<Self>) -> DataSource {
        DataSource::new(&self.id)
            .with_writer(self.clone())
            .with_indexer(self.clone())
    }

    /// Store resources directly, bypassing the write path
    pub async fn seed(&self, resources: Vec<Resource>) {
        let mut state = self.state.write().await;
        for resource in resources {
            let previous = state.records.get(&resource.key()).and_then(|r| r.version());
            state.commit(resource, previous.as_deref());
        }
    }

    /// Remove a resource directly, bypassing the write path
    pub async fn remove(&self, resource_type: &str, id: &str) -> Option<Resource> {
        let mut state = self.state.write().await;
        let removed = state.records.remove(&format!("{}/{}", resource_type, id));
        if removed.is_some() {
            state.revision += 1;
        }
        removed
    }

    pub async fn record(&self, resource_type: &str, id: &str) -> Option<Resource> {
        self.state
            .read()
            .await
            .records
            .get(&format!("{}/{}", resource_type, id))
            .cloned()
    }

    pub async fn records(&self) -> Vec<Resource> {
        self.state.read().await.records.values().cloned().collect()
    }

    pub async fn blob(&self, id: &str) -> Option<Vec<u8>> {
        self.state.read().await.blobs.get(id).cloned()
    }

    /// Binary uploads prepared but neither committed nor released
    pub async fn staged_blob_count(&self) -> usize {
        self.state.read().await.staged_blobs.len()
    }

    pub async fn stats(&self) -> WriterStats {
        self.state.read().await.stats
    }

    fn count_abort(&self) -> Aborter {
        let state = self.state.clone();
        Box::new(move || {
            async move {
                state.write().await.stats.aborted += 1;
                Ok(())
            }
            .boxed()
        })
    }
}

fn check_version(existing: &Resource, version: Option<&str>) -> Result<()> {
    match (version, existing.version()) {
        (Some(requested), Some(current)) if requested != current => Err(HubError::conflict(
            format!(
                "{} is at version {}, not {}",
                existing.key(),
                current,
                requested
            ),
        )),
        _ => Ok(()),
    }
}

fn with_server_values(mut resource: Resource, ctx: &FinalizeContext) -> Resource {
    for (name, value) in ctx.server_provided_values.iter() {
        resource.attributes.insert(name.clone(), value.clone());
    }
    resource
}

#[async_trait]
impl Writer for MemoryDataSource {
    async fn prepare_create(
        &self,
        _session: &Session,
        resource_type: &str,
        document: Resource,
        is_schema: bool,
    ) -> Result<PreparedChange> {
        let id = if document.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            document.id.clone()
        };
        let key = format!("{}/{}", resource_type, id);
        if self.state.read().await.records.contains_key(&key) {
            return Err(HubError::conflict(format!("{} already exists", key)));
        }

        let mut resource = document;
        resource.resource_type = resource_type.to_string();
        resource.id = id;
        resource.meta = None;

        let state = self.state.clone();
        let finalizer: Finalizer = Box::new(move |ctx: FinalizeContext| {
            async move {
                let resource = ctx
                    .final_document
                    .clone()
                    .map(|r| with_server_values(r, &ctx))
                    .ok_or_else(|| HubError::invalid("create finalized without a document"))?;
                let mut state = state.write().await;
                if state.records.contains_key(&resource.key()) {
                    return Err(HubError::conflict(format!("{} already exists", resource.key())));
                }
                Ok(Some(state.commit(resource, None)))
            }
            .boxed()
        });

        Ok(PreparedChange::new(None, Some(resource))
            .with_finalizer(finalizer)
            .with_aborter(self.count_abort())
            .with_options(PendingChangeOptions {
                is_schema,
                ..Default::default()
            }))
    }

    async fn prepare_update(
        &self,
        _session: &Session,
        resource_type: &str,
        id: &str,
        document: Resource,
        is_schema: bool,
    ) -> Result<PreparedChange> {
        let key = format!("{}/{}", resource_type, id);
        let existing = self
            .state
            .read()
            .await
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("No such resource {}", key)))?;
        check_version(&existing, document.version().as_deref())?;

        let mut updated = existing.clone();
        if !document.attributes.is_empty() {
            updated.attributes = document.attributes;
        }
        if !document.relationships.is_empty() {
            updated.relationships = document.relationships;
        }

        let state = self.state.clone();
        let expected = existing.version();
        let finalizer: Finalizer = Box::new(move |ctx: FinalizeContext| {
            async move {
                let resource = ctx
                    .final_document
                    .clone()
                    .map(|r| with_server_values(r, &ctx))
                    .ok_or_else(|| HubError::invalid("update finalized without a document"))?;
                let mut state = state.write().await;
                let current = state
                    .records
                    .get(&resource.key())
                    .ok_or_else(|| HubError::not_found(format!("No such resource {}", resource.key())))?;
                check_version(current, expected.as_deref())?;
                let previous = current.version();
                Ok(Some(state.commit(resource, previous.as_deref())))
            }
            .boxed()
        });

        Ok(PreparedChange::new(Some(existing), Some(updated))
            .with_finalizer(finalizer)
            .with_aborter(self.count_abort())
            .with_options(PendingChangeOptions {
                is_schema,
                ..Default::default()
            }))
    }

    async fn prepare_delete(
        &self,
        _session: &Session,
        version: Option<&str>,
        resource_type: &str,
        id: &str,
        is_schema: bool,
    ) -> Result<PreparedChange> {
        let key = format!("{}/{}", resource_type, id);
        let existing = self
            .state
            .read()
            .await
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("No such resource {}", key)))?;
        check_version(&existing, version)?;

        let state = self.state.clone();
        let finalizer: Finalizer = Box::new(move |_ctx: FinalizeContext| {
            async move {
                let mut state = state.write().await;
                if state.records.remove(&key).is_some() {
                    state.revision += 1;
                }
                state.stats.finalized += 1;
                Ok(None)
            }
            .boxed()
        });

        Ok(PreparedChange::new(Some(existing), None)
            .with_finalizer(finalizer)
            .with_aborter(self.count_abort())
            .with_options(PendingChangeOptions {
                is_schema,
                ..Default::default()
            }))
    }

    async fn prepare_binary_create(
        &self,
        _session: &Session,
        resource_type: &str,
        mut stream: BinaryStream,
    ) -> Result<PreparedChange> {
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes).await?;

        let blob_id = Uuid::new_v4().to_string();
        let resource = Resource::new(resource_type, &blob_id)
            .with_attribute("size", json!(bytes.len()));
        self.state
            .write()
            .await
            .staged_blobs
            .insert(blob_id.clone(), bytes);
        debug!("staged binary upload {} for {}", blob_id, resource_type);

        let state = self.state.clone();
        let finalizer: Finalizer = Box::new(move |ctx: FinalizeContext| {
            async move {
                let resource = ctx
                    .final_document
                    .clone()
                    .ok_or_else(|| HubError::invalid("upload finalized without a document"))?;
                let blob_id = ctx
                    .options
                    .blob_id
                    .clone()
                    .ok_or_else(|| HubError::invalid("upload finalized without a staged blob"))?;
                let mut state = state.write().await;
                let bytes = state.staged_blobs.remove(&blob_id).ok_or_else(|| {
                    HubError::not_found(format!("No staged upload {}", blob_id))
                })?;
                state.blobs.insert(blob_id, bytes);
                Ok(Some(state.commit(resource, None)))
            }
            .boxed()
        });

        let state = self.state.clone();
        let staged = blob_id.clone();
        let aborter: Aborter = Box::new(move || {
            async move {
                let mut state = state.write().await;
                state.staged_blobs.remove(&staged);
                state.stats.aborted += 1;
                Ok(())
            }
            .boxed()
        });

        Ok(PreparedChange::new(None, Some(resource))
            .with_finalizer(finalizer)
            .with_aborter(aborter)
            .with_options(PendingChangeOptions {
                is_schema: false,
                blob_id: Some(blob_id),
                blob_content_type: Some("application/octet-stream".to_string()),
            }))
    }

    async fn bulk_push(&self) -> Result<()> {
        self.state.write().await.stats.bulk_pushes += 1;
        Ok(())
    }
}

#[async_trait]
impl Indexer for MemoryDataSource {
    async fn begin_update(&self) -> Result<Box<dyn Updater>> {
        Ok(Box::new(MemoryUpdater {
            state: self.state.clone(),
        }))
    }
}

/// Replays the whole store whenever its revision moved
struct MemoryUpdater {
    state: Arc<RwLock<StoreState>>,
}

impl Updater for MemoryUpdater {
    fn schema_support(&mut self) -> Capability<'_, dyn SupportsSchema> {
        Capability::Supported(self)
    }

    fn content_support(&mut self) -> Capability<'_, dyn SupportsContentUpdate> {
        Capability::Supported(self)
    }
}

/// Stored schema records, plus the content type of every stored card model
#[async_trait]
impl SupportsSchema for MemoryUpdater {
    async fn schema(&mut self) -> Result<Vec<Resource>> {
        let state = self.state.read().await;
        let mut models = Vec::new();
        for resource in state.records.values() {
            if SCHEMA_TYPES.contains(&resource.resource_type.as_str()) {
                models.push(resource.clone());
            } else if is_card(&resource.resource_type, &resource.id) {
                models.extend(derive_card_model_content_type(&Document::new(resource.clone())));
            }
        }
        Ok(models)
    }
}

#[async_trait]
impl SupportsContentUpdate for MemoryUpdater {
    async fn update_content(
        &mut self,
        meta: Option<Value>,
        hints: &[UpdateHint],
        ops: &mut Operations<'_>,
    ) -> Result<Option<Value>> {
        let (revision, records) = {
            let state = self.state.read().await;
            (state.revision, state.records.values().cloned().collect::<Vec<_>>())
        };
        let indexed = meta
            .as_ref()
            .and_then(|m| m.get("revision"))
            .and_then(Value::as_u64);
        if hints.is_empty() && indexed == Some(revision) {
            debug!("{} unchanged since revision {}", ops.source_id(), revision);
            return Ok(meta);
        }

        ops.begin_replace_all();
        for resource in records {
            let (resource_type, id) = (resource.resource_type.clone(), resource.id.clone());
            ops.save(&resource_type, &id, Document::new(resource)).await?;
        }
        ops.finish_replace_all().await?;
        Ok(Some(json!({ "revision": revision })))
    }
}
