//! Write Orchestrator
//!
//! `Writers` is the single entry point for every mutation. Each write runs
//! through one [`PendingChange`]:
//!
//! 1. Resolve the writer bound to the type's data source (403 otherwise)
//! 2. Let the writer prepare the change and wrap it in a `PendingChange`
//! 3. Validate against the schema, which may hand back a new schema
//! 4. Finalize, merge the returned meta and persist the document context
//!    through a search batch
//! 5. Abort the pending change, on success and on failure alike
//!
//! `cards` writes are translated into a write of the internal card model
//! plus ordinary writes of the card's private resources. Resources that are
//! new or changed are written before the model is finalized; resources that
//! went away are deleted afterwards, content types before fields, so no
//! content type ever points at a field that is already gone.

use super::card_diff::CardDiff;
use super::pending_change::PendingChange;
use super::writer::{BinaryStream, PreparedChange, Writer};
use crate::cards::{
    adapt_card_to_format, card_root_identity, card_schema_models, is_card, load_card,
    to_internal_format, CardFormat, CardReader, CARDS_TYPE, QUERIES_TYPE,
};
use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::models::{Document, Linkage, Relationship, RelationshipLinks, Resource, Session};
use crate::schema::{CurrentSchema, Schema, SchemaChange, SchemaRef, ValidationContext};
use crate::search::{DocumentContext, SearchClient, Searchers};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one write: the document as the caller may see it (`None` for
/// deletions) and the schema later steps of the same operation must use
pub struct WriteOutcome {
    pub document: Option<Document>,
    pub schema: SchemaRef,
}

/// Card state gathered before the card model is written
struct CardPlan {
    internal: Document,
    schema: SchemaRef,
    diff: CardDiff,
}

#[derive(Clone, Copy)]
struct WriteRequest<'a> {
    session: &'a Session,
    resource_type: &'a str,
    id: Option<&'a str>,
    is_bulk: bool,
}

enum Preparation<'a> {
    Create(Resource),
    Update(&'a str, Resource),
    Delete(Option<&'a str>, &'a str),
}

pub struct Writers {
    current_schema: Arc<dyn CurrentSchema>,
    search_client: Arc<dyn SearchClient>,
    searchers: Arc<dyn Searchers>,
    reader: CardReader,
    card_source_id: String,
}

impl Writers {
    pub fn new(
        config: &HubConfig,
        current_schema: Arc<dyn CurrentSchema>,
        search_client: Arc<dyn SearchClient>,
        searchers: Arc<dyn Searchers>,
    ) -> Self {
        let reader = CardReader::new(
            searchers.clone(),
            current_schema.clone(),
            &config.card_source_id,
        );
        Self {
            current_schema,
            search_client,
            searchers,
            reader,
            card_source_id: config.card_source_id.clone(),
        }
    }

    /// Reader used to project written cards
    pub fn card_reader(&self) -> &CardReader {
        &self.reader
    }

    pub async fn create(&self, session: &Session, resource_type: &str, body: Value) -> Result<Document> {
        info!("creating type={}", resource_type);
        self.search_client.ensure_database_setup().await?;
        let document = Document::try_from(body)?;
        let schema = self.current_schema.get_schema().await?;
        let outcome = self
            .handle_create(session, resource_type, document, schema, false)
            .await?;
        written(outcome, resource_type)
    }

    /// Create every document concurrently, then flush each writer involved
    /// once
    pub async fn create_bulk(
        &self,
        session: &Session,
        resource_type: &str,
        bodies: Vec<Value>,
    ) -> Result<Vec<Document>> {
        info!("creating type={} count={}", resource_type, bodies.len());
        self.search_client.ensure_database_setup().await?;
        let documents = bodies
            .into_iter()
            .map(Document::try_from)
            .collect::<Result<Vec<_>>>()?;
        let schema = self.current_schema.get_schema().await?;

        // every branch runs to its abort before the first error is reported
        let outcomes = join_all(documents.into_iter().map(|document| {
            self.handle_create(session, resource_type, document, schema.clone(), true)
        }))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
        let documents = outcomes
            .into_iter()
            .map(|outcome| written(outcome, resource_type))
            .collect::<Result<Vec<_>>>()?;

        self.bulk_push(resource_type, &documents).await?;
        Ok(documents)
    }

    pub async fn create_binary(
        &self,
        session: &Session,
        resource_type: &str,
        stream: BinaryStream,
    ) -> Result<Document> {
        info!("creating binary type={}", resource_type);
        self.search_client.ensure_database_setup().await?;
        let schema = self.current_schema.get_schema().await?;
        let (writer, source_id) = writer_for_type(schema.as_ref(), resource_type)?;
        let prepared = writer
            .prepare_binary_create(session, resource_type, stream)
            .await?;
        let request = WriteRequest {
            session,
            resource_type,
            id: None,
            is_bulk: false,
        };
        let outcome = self
            .commit(request, prepared, source_id, schema, None)
            .await?;
        written(outcome, resource_type)
    }

    pub async fn update(
        &self,
        session: &Session,
        resource_type: &str,
        id: &str,
        body: Value,
    ) -> Result<Document> {
        info!("updating type={} id={}", resource_type, id);
        self.search_client.ensure_database_setup().await?;
        let document = Document::try_from(body)?;
        let schema = self.current_schema.get_schema().await?;
        let outcome = self
            .handle_update(session, resource_type, id, document, schema, false)
            .await?;
        written(outcome, resource_type)
    }

    /// Update every document (each names its own `data.id`) concurrently
    pub async fn update_bulk(
        &self,
        session: &Session,
        resource_type: &str,
        bodies: Vec<Value>,
    ) -> Result<Vec<Document>> {
        info!("updating type={} count={}", resource_type, bodies.len());
        self.search_client.ensure_database_setup().await?;
        let documents = bodies
            .into_iter()
            .map(Document::try_from)
            .collect::<Result<Vec<_>>>()?;
        if documents.iter().any(|d| d.data.id.is_empty()) {
            return Err(HubError::validation(
                "Every document of a bulk update must carry an id",
                "/data/id",
            ));
        }
        let schema = self.current_schema.get_schema().await?;

        let outcomes = join_all(documents.iter().map(|document| {
            self.handle_update(
                session,
                resource_type,
                &document.data.id,
                document.clone(),
                schema.clone(),
                true,
            )
        }))
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;
        let documents = outcomes
            .into_iter()
            .map(|outcome| written(outcome, resource_type))
            .collect::<Result<Vec<_>>>()?;

        self.bulk_push(resource_type, &documents).await?;
        Ok(documents)
    }

    pub async fn delete(
        &self,
        session: &Session,
        version: Option<&str>,
        resource_type: &str,
        id: &str,
    ) -> Result<()> {
        info!("deleting type={} id={}", resource_type, id);
        self.search_client.ensure_database_setup().await?;
        let schema = self.current_schema.get_schema().await?;

        if resource_type == CARDS_TYPE {
            return self.delete_card(session, version, id, schema).await;
        }
        self.handle_delete(session, version, resource_type, id, schema)
            .await
            .map(|_| ())
    }

    fn handle_create<'a>(
        &'a self,
        session: &'a Session,
        resource_type: &'a str,
        document: Document,
        schema: SchemaRef,
        is_bulk: bool,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let request = WriteRequest {
                session,
                resource_type,
                id: None,
                is_bulk,
            };
            if resource_type != CARDS_TYPE {
                return self
                    .write(request, Preparation::Create(document.data), schema, None)
                    .await;
            }

            let plan = self.plan_card_write(&document, &schema).await?;
            let request = WriteRequest {
                resource_type: &plan.internal.data.resource_type,
                ..request
            };
            let outcome = self
                .write(
                    request,
                    Preparation::Create(plan.internal.data.clone()),
                    plan.schema.clone(),
                    Some(&plan),
                )
                .await?;
            self.card_view(session, outcome).await
        }
        .boxed()
    }

    fn handle_update<'a>(
        &'a self,
        session: &'a Session,
        resource_type: &'a str,
        id: &'a str,
        document: Document,
        schema: SchemaRef,
        is_bulk: bool,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let request = WriteRequest {
                session,
                resource_type,
                id: Some(id),
                is_bulk,
            };
            if resource_type != CARDS_TYPE {
                return self
                    .write(request, Preparation::Update(id, document.data), schema, None)
                    .await;
            }
            if document.data.id != id {
                return Err(HubError::validation(
                    format!(
                        "The card id '{}' does not match the card being updated '{}'",
                        document.data.id, id
                    ),
                    "/data/id",
                ));
            }

            let plan = self.plan_card_write(&document, &schema).await?;
            let internal = &plan.internal.data;
            let request = WriteRequest {
                resource_type: &internal.resource_type,
                id: Some(&internal.id),
                ..request
            };
            let outcome = self
                .write(
                    request,
                    Preparation::Update(&internal.id, internal.clone()),
                    plan.schema.clone(),
                    Some(&plan),
                )
                .await?;
            self.card_view(session, outcome).await
        }
        .boxed()
    }

    fn handle_delete<'a>(
        &'a self,
        session: &'a Session,
        version: Option<&'a str>,
        resource_type: &'a str,
        id: &'a str,
        schema: SchemaRef,
    ) -> BoxFuture<'a, Result<WriteOutcome>> {
        async move {
            let request = WriteRequest {
                session,
                resource_type,
                id: Some(id),
                is_bulk: false,
            };
            self.write(request, Preparation::Delete(version, id), schema, None)
                .await
        }
        .boxed()
    }

    async fn delete_card(
        &self,
        session: &Session,
        version: Option<&str>,
        id: &str,
        schema: SchemaRef,
    ) -> Result<()> {
        let Some(internal) = self.stored_card(id).await? else {
            debug!("card {} is already gone", id);
            return Ok(());
        };
        let models = card_schema_models(schema.as_ref(), &internal)
            .into_iter()
            .map(SchemaChange::upsert)
            .collect();
        let card_schema = schema.apply_changes(models).await?;

        let stored_version = internal.data.version();
        let version = version.or(stored_version.as_deref());
        let mut resources = vec![internal.data.clone()];
        resources.extend(internal.included.iter().cloned());
        let plan = CardPlan {
            diff: CardDiff::deletion(resources),
            schema: card_schema.clone(),
            internal,
        };

        let internal = &plan.internal.data;
        let request = WriteRequest {
            session,
            resource_type: &internal.resource_type,
            id: Some(&internal.id),
            is_bulk: false,
        };
        self.write(
            request,
            Preparation::Delete(version, &internal.id),
            card_schema,
            Some(&plan),
        )
        .await
        .map(|_| ())
    }

    /// Convert the card, load its schema and diff it against the stored card
    async fn plan_card_write(&self, card: &Document, schema: &SchemaRef) -> Result<CardPlan> {
        let internal = to_internal_format(schema.as_ref(), card)?;
        let models = load_card(schema.as_ref(), &internal)?
            .into_iter()
            .map(SchemaChange::upsert)
            .collect();
        let card_schema = schema.apply_changes(models).await?;

        let old_included = self
            .stored_card(&internal.data.id)
            .await?
            .map(|old| old.included)
            .unwrap_or_default();
        let diff = CardDiff::between(&old_included, &internal.included);
        debug!(
            "card {}: {} added, {} changed, {} deleted",
            internal.data.id,
            diff.added.len(),
            diff.changed.len(),
            diff.deleted.len()
        );

        Ok(CardPlan {
            internal,
            schema: card_schema,
            diff,
        })
    }

    /// The indexed internal card, restricted to the card's own resources
    async fn stored_card(&self, id: &str) -> Result<Option<Document>> {
        let stored = match self
            .searchers
            .get(&Session::InternalPrivileged, &self.card_source_id, id, id)
            .await
        {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let included = stored
            .included
            .into_iter()
            .filter(|r| r.id.contains(id))
            .collect();
        Ok(Some(Document::with_included(stored.data, included)))
    }

    /// Project a written card model through the isolated card view
    async fn card_view(&self, session: &Session, outcome: WriteOutcome) -> Result<WriteOutcome> {
        let Some(authorized) = outcome.document else {
            return Ok(outcome);
        };
        let id = authorized.data.id.clone();
        let stored = match self
            .searchers
            .get(&Session::InternalPrivileged, &self.card_source_id, &id, &id)
            .await
        {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => authorized,
            Err(e) => return Err(e),
        };
        let schema = self.current_schema.get_schema().await?;
        let view =
            adapt_card_to_format(&schema, session, stored, CardFormat::Isolated, &self.reader)
                .await?;
        Ok(WriteOutcome {
            document: Some(view),
            schema: outcome.schema,
        })
    }

    async fn write(
        &self,
        request: WriteRequest<'_>,
        preparation: Preparation<'_>,
        schema: SchemaRef,
        plan: Option<&CardPlan>,
    ) -> Result<WriteOutcome> {
        let (writer, source_id) = writer_for_type(schema.as_ref(), request.resource_type)?;
        let is_schema = schema.is_schema_type(request.resource_type);
        let session = request.session;
        let resource_type = request.resource_type;

        let prepared = match preparation {
            Preparation::Create(resource) => {
                let resource = cleanup_body_data(schema.as_ref(), resource);
                writer
                    .prepare_create(session, resource_type, resource, is_schema)
                    .await?
            }
            Preparation::Update(id, resource) => {
                let resource = cleanup_body_data(schema.as_ref(), resource);
                writer
                    .prepare_update(session, resource_type, id, resource, is_schema)
                    .await?
            }
            Preparation::Delete(version, id) => {
                writer
                    .prepare_delete(session, version, resource_type, id, is_schema)
                    .await?
            }
        };
        self.commit(request, prepared, source_id, schema, plan).await
    }

    /// Drive a prepared change to completion, aborting it on every path
    async fn commit(
        &self,
        request: WriteRequest<'_>,
        prepared: PreparedChange,
        source_id: String,
        schema: SchemaRef,
        plan: Option<&CardPlan>,
    ) -> Result<WriteOutcome> {
        let mut pending = PendingChange::new(prepared, schema.clone(), Some(source_id.clone()))?;
        let outcome = self
            .run_pending(request, &mut pending, &source_id, schema, plan)
            .await;
        let aborted = pending.abort().await;

        match (outcome, aborted) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(abort_error)) => {
                warn!(
                    "failed to release {} after a failed write: {}",
                    request.resource_type, abort_error
                );
                Err(e)
            }
        }
    }

    async fn run_pending(
        &self,
        request: WriteRequest<'_>,
        pending: &mut PendingChange,
        source_id: &str,
        schema: SchemaRef,
        plan: Option<&CardPlan>,
    ) -> Result<WriteOutcome> {
        let is_deletion = pending.final_document().is_none();
        let context = ValidationContext {
            resource_type: (!is_deletion).then_some(request.resource_type),
            id: request.id,
            session: request.session,
        };
        let new_schema = pending.validate(&schema, &context).await?;
        let schema = new_schema.clone().unwrap_or(schema);

        if let Some(plan) = plan {
            self.before_finalize(request.session, plan).await?;
        }

        let meta = pending.finalize(request.is_bulk).await?;
        let mut context = if is_deletion {
            let id = pending
                .original_document()
                .map(|r| r.id.clone())
                .or_else(|| request.id.map(str::to_string))
                .unwrap_or_default();
            DocumentContext::new(
                request.resource_type,
                id,
                schema.clone(),
                Some(source_id.to_string()),
                None,
            )
        } else {
            pending
                .take_final_context()
                .ok_or_else(|| HubError::invalid("The finalized change has no document"))?
        };
        context.update_document_meta(meta.as_ref());

        let mut batch = self.search_client.begin_batch(schema.clone());
        if is_deletion {
            batch.delete_document(&context).await?;
        } else {
            batch.save_document(&context).await?;
        }
        batch.done().await?;

        let schema = match plan {
            Some(plan) => {
                self.delete_internal_card_resources(request.session, &plan.diff.deleted, schema)
                    .await?
            }
            None => schema,
        };
        if new_schema.is_some() || plan.is_some() {
            self.current_schema.invalidate_cache().await;
        }

        let document = if is_deletion {
            None
        } else {
            Some(context.apply_read_authorization(request.session)?)
        };
        Ok(WriteOutcome { document, schema })
    }

    /// Write the card's new and changed resources ahead of the card model
    async fn before_finalize(&self, session: &Session, plan: &CardPlan) -> Result<()> {
        let mut included = vec![plan.internal.data.clone()];
        included.extend(plan.internal.included.iter().cloned());

        for resource in plan.diff.added.iter() {
            let document = Document::with_included(resource.clone(), included.clone());
            self.handle_create(
                session,
                &resource.resource_type,
                document,
                plan.schema.clone(),
                false,
            )
            .await?;
        }
        for resource in plan.diff.changed.iter() {
            let document = Document::with_included(resource.clone(), included.clone());
            self.handle_update(
                session,
                &resource.resource_type,
                &resource.id,
                document,
                plan.schema.clone(),
                false,
            )
            .await?;
        }
        Ok(())
    }

    /// Delete the resources a card no longer has, threading the schema
    /// through every step
    async fn delete_internal_card_resources(
        &self,
        session: &Session,
        resources: &[Resource],
        mut schema: SchemaRef,
    ) -> Result<SchemaRef> {
        if resources.is_empty() {
            return Ok(schema);
        }
        let (models, mut schema_resources): (Vec<&Resource>, Vec<Resource>) = {
            let (models, schema_resources): (Vec<&Resource>, Vec<&Resource>) = resources
                .iter()
                .partition(|r| card_root_identity(&r.resource_type).is_some());
            (models, schema_resources.into_iter().cloned().collect())
        };
        let (card_models, internal_models): (Vec<&Resource>, Vec<&Resource>) = models
            .into_iter()
            .partition(|r| is_card(&r.resource_type, &r.id));

        for model in internal_models {
            let version = model.version();
            match self
                .handle_delete(
                    session,
                    version.as_deref(),
                    &model.resource_type,
                    &model.id,
                    schema.clone(),
                )
                .await
            {
                Ok(outcome) => schema = outcome.schema,
                Err(e) if e.is_not_found() => {
                    debug!("internal model {} was already deleted", model.key());
                }
                Err(e) => return Err(e),
            }
        }

        // Fields pointing at content types about to be deleted are cleared
        // first, or their removal would leave a dangling reference behind.
        for resource in schema_resources.iter_mut() {
            let has_related_types = resource.resource_type == "fields"
                && resource
                    .linkage("related-types")
                    .map(|l| !l.is_empty())
                    .unwrap_or(false);
            if !has_related_types {
                continue;
            }
            let mut cleared = resource.clone();
            cleared.relationships.insert(
                "related-types".to_string(),
                Relationship::with_data(Linkage::Many(Vec::new())),
            );
            let outcome = self
                .handle_update(
                    session,
                    "fields",
                    &resource.id,
                    Document::new(cleared),
                    schema.clone(),
                    false,
                )
                .await?;
            schema = outcome.schema;
            if let Some(updated) = outcome.document {
                *resource = updated.data;
            }
        }

        if !card_models.is_empty() {
            let removals = card_models
                .iter()
                .map(|m| SchemaChange::removal("content-types", &m.id))
                .collect();
            schema = schema.apply_changes(removals).await?;
        }

        schema_resources.sort_by_key(|r| deletion_rank(&r.resource_type));
        for resource in schema_resources.iter() {
            let version = resource.version();
            let outcome = self
                .handle_delete(
                    session,
                    version.as_deref(),
                    &resource.resource_type,
                    &resource.id,
                    schema.clone(),
                )
                .await?;
            schema = outcome.schema;
        }
        Ok(schema)
    }

    /// Flush each data source written by a bulk call once
    async fn bulk_push(&self, resource_type: &str, documents: &[Document]) -> Result<()> {
        let schema = self.current_schema.get_schema().await?;
        let mut flushed = BTreeSet::new();
        for document in documents {
            let written_type = if resource_type == CARDS_TYPE {
                document.data.id.as_str()
            } else {
                resource_type
            };
            let (writer, source_id) = writer_for_type(schema.as_ref(), written_type)?;
            if flushed.insert(source_id) {
                writer.bulk_push().await?;
            }
        }
        Ok(())
    }
}

fn written(outcome: WriteOutcome, resource_type: &str) -> Result<Document> {
    outcome
        .document
        .ok_or_else(|| HubError::invalid(format!("The write of {} produced no document", resource_type)))
}

/// The writer bound to a type's data source and that source's id
pub fn writer_for_type(schema: &dyn Schema, resource_type: &str) -> Result<(Arc<dyn Writer>, String)> {
    let source = schema
        .get_type(resource_type)
        .and_then(|content_type| content_type.data_source.clone());
    match source {
        Some(source) => match source.writer {
            Some(writer) => Ok((writer, source.id)),
            None => {
                debug!("non-writeable type {}: data source {} has no writer", resource_type, source.id);
                Err(HubError::not_writable(resource_type))
            }
        },
        None => {
            debug!("non-writeable type {}: no data source", resource_type);
            Err(HubError::not_writable(resource_type))
        }
    }
}

/// Strip computed fields and turn query-backed relationships into links
fn cleanup_body_data(schema: &dyn Schema, resource: Resource) -> Resource {
    let mut resource = schema.with_only_real_fields(resource);
    for relationship in resource.relationships.values_mut() {
        let query = relationship
            .data
            .as_ref()
            .and_then(Linkage::first)
            .filter(|r| r.resource_type == QUERIES_TYPE)
            .map(|r| r.id.clone());
        if let Some(query) = query {
            relationship.links = Some(RelationshipLinks { related: query });
            relationship.data = None;
        }
    }
    resource
}

/// Content types go before fields; computed fields count as fields
fn deletion_rank(resource_type: &str) -> u8 {
    match resource_type {
        "content-types" => 0,
        "fields" | "computed-fields" => 1,
        _ => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceRef;
    use crate::schema::MemorySchema;
    use serde_json::json;

    #[test]
    fn test_cleanup_rewrites_query_relationships() {
        let schema = MemorySchema::standalone().unwrap();
        let resource = Resource::new("articles", "1")
            .with_relationship(
                "recent",
                Linkage::One(ResourceRef::new(QUERIES_TYPE, "/api/articles?sort=-date")),
            )
            .with_relationship("author", Linkage::One(ResourceRef::new("people", "9")))
            .with_attribute(crate::schema::METADATA_FIELD_TYPES_FIELD, json!({}));

        let cleaned = cleanup_body_data(&schema, resource);
        let recent = &cleaned.relationships["recent"];
        assert!(recent.data.is_none());
        assert_eq!(
            recent.links.as_ref().map(|l| l.related.as_str()),
            Some("/api/articles?sort=-date")
        );
        assert!(cleaned.relationships["author"].data.is_some());
        assert!(cleaned.attributes.is_empty());
    }

    #[test]
    fn test_deletion_order() {
        let mut types = vec!["fields", "bios", "computed-fields", "content-types", "fields"];
        types.sort_by_key(|t| deletion_rank(t));
        assert_eq!(
            types,
            vec!["content-types", "fields", "computed-fields", "fields", "bios"]
        );
    }

    #[test]
    fn test_writer_for_unbound_type_is_forbidden() {
        let schema = MemorySchema::standalone().unwrap();
        let error = writer_for_type(&schema, "fields").err().unwrap();
        assert_eq!(error.status(), 403);
        let error = writer_for_type(&schema, "nope").err().unwrap();
        assert_eq!(error.status(), 403);
    }
}
