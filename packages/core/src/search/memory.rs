//! In-process search index
//!
//! Documents are kept in a `type/id` keyed map together with the data
//! source that produced them, the replace-all generation they were written
//! under and the relationship paths to include when they are read back.
//! Batches buffer their operations and apply them in one step on `done`.

use super::{Batch, DocumentContext, SearchClient, Searchers};
use crate::error::{HubError, Result};
use crate::indexing::Generation;
use crate::models::{dedupe_resources, CollectionDocument, Document, Resource, Session};
use crate::schema::SchemaRef;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct IndexedDocument {
    resource: Resource,
    source_id: Option<String>,
    generation: Option<Generation>,
    default_includes: Vec<String>,
}

#[derive(Debug, Default)]
struct IndexState {
    documents: BTreeMap<String, IndexedDocument>,
    meta: HashMap<String, Value>,
    is_setup: bool,
    schema_accommodations: usize,
}

enum BatchOperation {
    Save(String, IndexedDocument),
    Delete(String),
}

/// Shared handle to an in-process index
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    state: Arc<RwLock<IndexState>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every indexed resource, in key order
    pub async fn all_resources(&self) -> Vec<Resource> {
        self.state
            .read()
            .await
            .documents
            .values()
            .map(|d| d.resource.clone())
            .collect()
    }

    pub async fn contains(&self, resource_type: &str, id: &str) -> bool {
        self.state
            .read()
            .await
            .documents
            .contains_key(&format!("{}/{}", resource_type, id))
    }

    /// Generation a document was indexed under
    pub async fn generation_of(&self, resource_type: &str, id: &str) -> Option<Generation> {
        self.state
            .read()
            .await
            .documents
            .get(&format!("{}/{}", resource_type, id))
            .and_then(|d| d.generation)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// How many times a schema has been accommodated
    pub async fn schema_accommodations(&self) -> usize {
        self.state.read().await.schema_accommodations
    }

    /// Resources reachable from `roots` along dotted relationship paths
    ///
    /// Every resource is visited at most once, so cyclic relationships
    /// terminate.
    fn resolve_includes(state: &IndexState, roots: &[&IndexedDocument]) -> Vec<Resource> {
        let mut visited: HashSet<String> = roots.iter().map(|d| d.resource.key()).collect();
        let mut included = Vec::new();

        for root in roots {
            for path in root.default_includes.iter() {
                let mut frontier = vec![root.resource.clone()];
                for segment in path.split('.') {
                    let mut next = Vec::new();
                    for resource in frontier.iter() {
                        let Some(linkage) = resource.linkage(segment) else {
                            continue;
                        };
                        for reference in linkage.refs() {
                            let key = reference.key();
                            if let Some(found) = state.documents.get(&key) {
                                next.push(found.resource.clone());
                                if visited.insert(key) {
                                    included.push(found.resource.clone());
                                }
                            }
                        }
                    }
                    frontier = next;
                }
            }
        }
        included
    }
}

#[async_trait]
impl SearchClient for MemoryIndex {
    async fn ensure_database_setup(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.is_setup {
            debug!("setting up in-memory index");
            state.is_setup = true;
        }
        Ok(())
    }

    async fn accomodate_schema(&self, _schema: &SchemaRef) -> Result<()> {
        self.state.write().await.schema_accommodations += 1;
        Ok(())
    }

    fn begin_batch(&self, _schema: SchemaRef) -> Box<dyn Batch> {
        Box::new(MemoryBatch {
            state: self.state.clone(),
            operations: Vec::new(),
        })
    }

    async fn load_meta(&self, source_id: &str) -> Result<Option<Value>> {
        Ok(self.state.read().await.meta.get(source_id).cloned())
    }

    async fn save_meta(&self, source_id: &str, params: Option<Value>) -> Result<()> {
        let mut state = self.state.write().await;
        match params {
            Some(params) => {
                state.meta.insert(source_id.to_string(), params);
            }
            None => {
                state.meta.remove(source_id);
            }
        }
        Ok(())
    }

    async fn delete_older_generations(
        &self,
        source_id: &str,
        generation: Generation,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let before = state.documents.len();
        state.documents.retain(|_, d| {
            d.source_id.as_deref() != Some(source_id) || d.generation == Some(generation)
        });
        debug!(
            "pruned {} documents from {} older than generation {}",
            before - state.documents.len(),
            source_id,
            generation
        );
        Ok(())
    }
}

#[async_trait]
impl Searchers for MemoryIndex {
    async fn get(
        &self,
        session: &Session,
        source_id: &str,
        resource_type: &str,
        id: &str,
    ) -> Result<Document> {
        let state = self.state.read().await;
        let key = format!("{}/{}", resource_type, id);
        let document = state.documents.get(&key).ok_or_else(|| {
            debug!(
                "{} not found via {} for {}",
                key,
                source_id,
                session.user_id().unwrap_or("internal")
            );
            HubError::not_found(format!("No such resource {}", key))
        })?;
        let included = Self::resolve_includes(&state, &[document]);
        Ok(Document::with_included(document.resource.clone(), included))
    }

    async fn search(&self, _session: &Session, query: &Value) -> Result<CollectionDocument> {
        let types: Option<Vec<String>> = match query.pointer("/filter/type") {
            None => None,
            Some(Value::String(t)) => Some(vec![t.clone()]),
            Some(Value::Array(ts)) => Some(
                ts.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            ),
            Some(other) => {
                return Err(HubError::bad_request(format!(
                    "filter.type must be a string or a list of strings, got {}",
                    other
                )))
            }
        };

        let state = self.state.read().await;
        let matches: Vec<&IndexedDocument> = state
            .documents
            .values()
            .filter(|d| {
                types
                    .as_ref()
                    .map(|ts| ts.contains(&d.resource.resource_type))
                    .unwrap_or(true)
            })
            .collect();

        let data: Vec<Resource> = matches.iter().map(|d| d.resource.clone()).collect();
        let included = dedupe_resources(Self::resolve_includes(&state, &matches));
        Ok(CollectionDocument { data, included })
    }
}

struct MemoryBatch {
    state: Arc<RwLock<IndexState>>,
    operations: Vec<BatchOperation>,
}

#[async_trait]
impl Batch for MemoryBatch {
    async fn save_document(&mut self, context: &DocumentContext) -> Result<()> {
        let Some(resource) = context.search_doc() else {
            return Ok(());
        };
        self.operations.push(BatchOperation::Save(
            context.key(),
            IndexedDocument {
                resource,
                source_id: context.source_id().map(str::to_string),
                generation: context.generation(),
                default_includes: context.default_includes(),
            },
        ));
        Ok(())
    }

    async fn delete_document(&mut self, context: &DocumentContext) -> Result<()> {
        self.operations.push(BatchOperation::Delete(context.key()));
        Ok(())
    }

    async fn done(self: Box<Self>) -> Result<()> {
        let mut state = self.state.write().await;
        for operation in self.operations {
            match operation {
                BatchOperation::Save(key, document) => {
                    state.documents.insert(key, document);
                }
                BatchOperation::Delete(key) => {
                    state.documents.remove(&key);
                }
            }
        }
        Ok(())
    }
}
