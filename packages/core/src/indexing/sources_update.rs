//! Sources Update
//!
//! One `SourcesUpdate` drives indexing passes over a fixed set of data
//! sources:
//!
//! 1. `add_data_source` starts an updater per source and collects the schema
//!    models it contributes (only before the schema is established)
//! 2. `schema` lazily merges those models into the seed schema
//! 3. `update` accommodates the schema, opens one batch, runs each
//!    (optionally hint-narrowed) updater with its persisted metadata, saves
//!    the metadata it returns, and applies the batch
//!
//! Sources are processed sequentially, so per-source metadata needs no
//! locking. Concurrent `update` calls on one instance are excluded by
//! `&mut self`. A failing updater aborts the pass before the batch is
//! applied.

use super::events::{IndexingEvent, INDEXING_EVENT_CHANNEL_CAPACITY};
use super::static_models::{StaticModelsUpdater, STATIC_MODELS_SOURCE};
use super::{Capability, Operations, UpdateHint, Updater};
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::models::Resource;
use crate::schema::{SchemaChange, SchemaRef};
use crate::search::SearchClient;
use crate::sources::DataSource;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

enum SchemaSlot {
    Pending,
    Ready(SchemaRef),
    Taken,
}

pub struct SourcesUpdate {
    seed_schema: SchemaRef,
    client: Arc<dyn SearchClient>,
    updaters: Vec<(String, Box<dyn Updater>)>,
    schema_models: Vec<Resource>,
    schema: SchemaSlot,
    events: broadcast::Sender<IndexingEvent>,
}

impl SourcesUpdate {
    pub fn new(seed_schema: SchemaRef, client: Arc<dyn SearchClient>) -> Self {
        Self::with_capacity(seed_schema, client, INDEXING_EVENT_CHANNEL_CAPACITY)
    }

    /// Create with the configured event channel capacity
    pub fn from_config(
        config: &HubConfig,
        seed_schema: SchemaRef,
        client: Arc<dyn SearchClient>,
    ) -> Self {
        Self::with_capacity(seed_schema, client, config.event_channel_capacity)
    }

    /// Create with an explicit event channel capacity
    pub fn with_capacity(
        seed_schema: SchemaRef,
        client: Arc<dyn SearchClient>,
        event_channel_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_channel_capacity);
        Self {
            seed_schema,
            client,
            updaters: Vec::new(),
            schema_models: Vec::new(),
            schema: SchemaSlot::Pending,
            events,
        }
    }

    /// Subscribe to `add`, `delete` and `delete_all_without_nonce` events
    pub fn subscribe(&self) -> broadcast::Receiver<IndexingEvent> {
        self.events.subscribe()
    }

    /// Ids of the sources that take part in a pass, in registration order
    pub fn source_ids(&self) -> Vec<&str> {
        self.updaters.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Start an updater for a data source and collect its schema models
    pub async fn add_data_source(&mut self, source: &DataSource) -> Result<Vec<Resource>> {
        if !matches!(self.schema, SchemaSlot::Pending) {
            return Err(HubError::indexing(
                "tried to add a data source after the schema was already established",
            ));
        }
        let Some(indexer) = source.indexer.as_ref() else {
            return Ok(Vec::new());
        };

        let mut updater = indexer.begin_update().await?;
        let models = match updater.schema_support() {
            Capability::Supported(schema) => schema.schema().await?,
            Capability::Unsupported => Vec::new(),
        };
        debug!(
            "data source {} contributed {} schema models",
            source.id,
            models.len()
        );
        self.schema_models.extend(models.iter().cloned());
        self.updaters.push((source.id.clone(), updater));
        Ok(models)
    }

    /// Register built-in models: `schema_models` join the schema and
    /// `all_models` are replace-all indexed under the static models source
    pub fn add_static_models(&mut self, schema_models: Vec<Resource>, all_models: Vec<Resource>) {
        self.schema_models.extend(schema_models);
        let updater: Box<dyn Updater> = Box::new(StaticModelsUpdater::new(all_models));
        match self
            .updaters
            .iter_mut()
            .find(|(id, _)| id == STATIC_MODELS_SOURCE)
        {
            Some(entry) => entry.1 = updater,
            None => self.updaters.push((STATIC_MODELS_SOURCE.to_string(), updater)),
        }
    }

    /// The seed schema with every contributed model applied
    pub async fn schema(&mut self) -> Result<SchemaRef> {
        match &self.schema {
            SchemaSlot::Taken => Err(HubError::indexing(
                "the schema has already been taken away from this sources update",
            )),
            SchemaSlot::Ready(schema) => Ok(schema.clone()),
            SchemaSlot::Pending => {
                let changes = self
                    .schema_models
                    .iter()
                    .cloned()
                    .map(SchemaChange::upsert)
                    .collect();
                let schema = self.seed_schema.apply_changes(changes).await?;
                self.schema = SchemaSlot::Ready(schema.clone());
                Ok(schema)
            }
        }
    }

    /// Give the schema away; later `schema` and `update` calls fail
    pub async fn take_schema(&mut self) -> Result<SchemaRef> {
        let schema = self.schema().await?;
        self.schema = SchemaSlot::Taken;
        Ok(schema)
    }

    /// Run one indexing pass
    pub async fn update(&mut self, hints: &[UpdateHint]) -> Result<()> {
        let schema = self.schema().await?;
        let client = self.client.clone();
        client.accomodate_schema(&schema).await?;
        let mut batch = client.begin_batch(schema.clone());

        let mut hinted_sources: Vec<String> = hints
            .iter()
            .filter_map(|hint| hint.resource_type.as_deref())
            .filter_map(|t| schema.get_type(t))
            .filter_map(|ct| ct.data_source.as_ref().map(|source| source.id.clone()))
            .collect();
        hinted_sources.sort();
        hinted_sources.dedup();
        info!(
            "indexing pass with {} hints over {} hinted data sources",
            hints.len(),
            hinted_sources.len()
        );

        for (source_id, updater) in self.updaters.iter_mut() {
            if !hinted_sources.is_empty() && !hinted_sources.contains(source_id) {
                continue;
            }
            let Capability::Supported(content) = updater.content_support() else {
                continue;
            };
            let meta = client.load_meta(source_id).await?;
            let mut ops = Operations::new(
                source_id.clone(),
                schema.clone(),
                client.as_ref(),
                batch.as_mut(),
                &self.events,
            );
            let new_meta = content.update_content(meta, hints, &mut ops).await?;
            client.save_meta(source_id, new_meta).await?;
        }

        batch.done().await
    }

    /// Tear down every updater that supports it
    pub async fn destroy(mut self) -> Result<()> {
        for (source_id, updater) in self.updaters.iter_mut() {
            if let Capability::Supported(teardown) = updater.teardown_support() {
                debug!("tearing down updater for {}", source_id);
                teardown.destroy().await?;
            }
        }
        Ok(())
    }
}
