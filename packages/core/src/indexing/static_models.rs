//! Static models
//!
//! Built-in models that live in no data source are indexed through their own
//! updater, as if they came from a source named `static-models`.

use super::{Capability, Operations, SupportsContentUpdate, UpdateHint, Updater};
use crate::error::Result;
use crate::models::{Document, Resource};
use async_trait::async_trait;
use serde_json::Value;

/// Data source id the built-in static models are indexed under
pub const STATIC_MODELS_SOURCE: &str = "static-models";

/// Indexes a fixed model set, replacing whatever it indexed before
pub struct StaticModelsUpdater {
    models: Vec<Resource>,
}

impl StaticModelsUpdater {
    pub fn new(models: Vec<Resource>) -> Self {
        Self { models }
    }
}

impl Updater for StaticModelsUpdater {
    fn content_support(&mut self) -> Capability<'_, dyn SupportsContentUpdate> {
        Capability::Supported(self)
    }
}

#[async_trait]
impl SupportsContentUpdate for StaticModelsUpdater {
    async fn update_content(
        &mut self,
        _meta: Option<Value>,
        _hints: &[UpdateHint],
        ops: &mut Operations<'_>,
    ) -> Result<Option<Value>> {
        ops.begin_replace_all();
        for model in self.models.iter() {
            ops.save(&model.resource_type, &model.id, Document::new(model.clone()))
                .await?;
        }
        ops.finish_replace_all().await?;
        Ok(None)
    }
}
