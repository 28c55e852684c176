//! Pending Change
//!
//! A single-use transaction around one prepared write.
//!
//! ```text
//! Created ──validate──▶ Validating ──finalize──▶ Finalized
//!    │                      │
//!    └──────────abort───────┴──────────────────▶ Aborted
//! ```
//!
//! `finalize` disarms the aborter and `abort` disarms the finalizer, so at
//! most one of the two callbacks ever runs, and each at most once. Callers
//! run `abort` on every exit path, including after a successful finalize,
//! where it is a no-op.

use super::writer::{
    Aborter, FinalizeContext, FinalizeMeta, Finalizer, PendingChangeOptions, PreparedChange,
};
use crate::error::{HubError, Result};
use crate::models::{Document, Resource};
use crate::schema::{SchemaRef, ValidationContext};
use crate::search::DocumentContext;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Lifecycle state of a pending change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    Created,
    Validating,
    Finalized,
    Aborted,
}

impl ChangeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChangeState::Finalized | ChangeState::Aborted)
    }
}

pub struct PendingChange {
    original_document: Option<Resource>,
    final_document: Option<Resource>,
    original_context: Option<DocumentContext>,
    final_context: Option<DocumentContext>,
    server_provided_values: BTreeMap<String, Value>,
    finalizer: Option<Finalizer>,
    aborter: Option<Aborter>,
    options: PendingChangeOptions,
    state: ChangeState,
    is_bulk: bool,
}

impl PendingChange {
    /// Wrap a prepared change, building a document context for each side
    pub fn new(
        prepared: PreparedChange,
        schema: SchemaRef,
        source_id: Option<String>,
    ) -> Result<Self> {
        if prepared.original_document.is_none() && prepared.final_document.is_none() {
            return Err(HubError::invalid(
                "A pending change needs an original or a final document",
            ));
        }
        let context = |resource: &Resource| {
            DocumentContext::new(
                &resource.resource_type,
                &resource.id,
                schema.clone(),
                source_id.clone(),
                Some(Document::new(resource.clone())),
            )
        };
        Ok(Self {
            original_context: prepared.original_document.as_ref().map(context),
            final_context: prepared.final_document.as_ref().map(context),
            original_document: prepared.original_document,
            final_document: prepared.final_document,
            server_provided_values: BTreeMap::new(),
            finalizer: prepared.finalizer,
            aborter: prepared.aborter,
            options: prepared.options,
            state: ChangeState::Created,
            is_bulk: false,
        })
    }

    pub fn original_document(&self) -> Option<&Resource> {
        self.original_document.as_ref()
    }

    pub fn final_document(&self) -> Option<&Resource> {
        self.final_document.as_ref()
    }

    pub fn original_context(&self) -> Option<&DocumentContext> {
        self.original_context.as_ref()
    }

    pub fn final_context(&self) -> Option<&DocumentContext> {
        self.final_context.as_ref()
    }

    /// Hand the final document context over to the caller
    pub fn take_final_context(&mut self) -> Option<DocumentContext> {
        self.final_context.take()
    }

    pub fn options(&self) -> &PendingChangeOptions {
        &self.options
    }

    pub fn state(&self) -> ChangeState {
        self.state
    }

    pub fn is_bulk(&self) -> bool {
        self.is_bulk
    }

    /// Values computed on the server side that the finalizer should persist
    pub fn server_provided_values(&self) -> &BTreeMap<String, Value> {
        &self.server_provided_values
    }

    pub fn set_server_provided_value(&mut self, name: impl Into<String>, value: Value) {
        self.server_provided_values.insert(name.into(), value);
    }

    /// Validate against a schema, returning the schema the change produces
    pub async fn validate(
        &mut self,
        schema: &SchemaRef,
        context: &ValidationContext<'_>,
    ) -> Result<Option<SchemaRef>> {
        if self.state.is_terminal() {
            return Err(HubError::invalid("The change has already completed"));
        }
        self.state = ChangeState::Validating;
        schema.validate(self, context).await
    }

    /// Run the finalizer once; later calls return `None`
    pub async fn finalize(&mut self, is_bulk: bool) -> Result<FinalizeMeta> {
        let finalizer = self.finalizer.take();
        self.aborter = None;
        if self.state.is_terminal() {
            return Ok(None);
        }
        self.state = ChangeState::Finalized;
        self.is_bulk = is_bulk;
        match finalizer {
            Some(finalizer) => {
                finalizer(FinalizeContext {
                    is_bulk,
                    final_document: self.final_document.clone(),
                    server_provided_values: self.server_provided_values.clone(),
                    options: self.options.clone(),
                })
                .await
            }
            None => Ok(None),
        }
    }

    /// Run the aborter once; a no-op after `finalize`
    pub async fn abort(&mut self) -> Result<()> {
        let aborter = self.aborter.take();
        self.finalizer = None;
        if !self.state.is_terminal() {
            self.state = ChangeState::Aborted;
        }
        match aborter {
            Some(aborter) => aborter().await,
            None => Ok(()),
        }
    }
}

impl Drop for PendingChange {
    fn drop(&mut self) {
        if self.finalizer.is_some() || self.aborter.is_some() {
            warn!(
                state = ?self.state,
                "pending change dropped without finalize or abort"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MemorySchema;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counters {
        finalized: Arc<AtomicUsize>,
        aborted: Arc<AtomicUsize>,
    }

    fn prepared() -> (PreparedChange, Counters) {
        let finalized = Arc::new(AtomicUsize::new(0));
        let aborted = Arc::new(AtomicUsize::new(0));
        let f = finalized.clone();
        let a = aborted.clone();
        let change = PreparedChange::new(None, Some(Resource::new("articles", "1")))
            .with_finalizer(Box::new(move |ctx: FinalizeContext| {
                async move {
                    f.fetch_add(1, Ordering::SeqCst);
                    let mut meta = serde_json::Map::new();
                    meta.insert("version".to_string(), json!("1"));
                    meta.insert("bulk".to_string(), json!(ctx.is_bulk));
                    Ok::<_, HubError>(Some(meta))
                }
                .boxed()
            }))
            .with_aborter(Box::new(move || {
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HubError>(())
                }
                .boxed()
            }));
        (change, Counters { finalized, aborted })
    }

    fn schema() -> SchemaRef {
        Arc::new(MemorySchema::standalone().unwrap())
    }

    #[tokio::test]
    async fn test_finalize_then_abort_runs_only_finalizer() {
        let (change, counters) = prepared();
        let mut pending = PendingChange::new(change, schema(), Some("local-hub".into())).unwrap();
        assert!(pending.final_context().is_some());
        assert!(pending.original_context().is_none());

        let meta = pending.finalize(true).await.unwrap().unwrap();
        assert_eq!(meta.get("bulk"), Some(&json!(true)));
        assert_eq!(pending.state(), ChangeState::Finalized);
        assert!(pending.is_bulk());

        assert!(pending.finalize(false).await.unwrap().is_none());
        pending.abort().await.unwrap();
        assert_eq!(pending.state(), ChangeState::Finalized);

        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
        assert_eq!(counters.aborted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_then_finalize_runs_only_aborter() {
        let (change, counters) = prepared();
        let mut pending = PendingChange::new(change, schema(), None).unwrap();

        pending.abort().await.unwrap();
        pending.abort().await.unwrap();
        assert!(pending.finalize(false).await.unwrap().is_none());
        assert_eq!(pending.state(), ChangeState::Aborted);

        assert_eq!(counters.finalized.load(Ordering::SeqCst), 0);
        assert_eq!(counters.aborted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_any_call_sequence_runs_at_most_one_callback() {
        let sequences: [&[bool]; 4] = [
            &[true, true, false],
            &[false, true, false],
            &[false, false, true, true],
            &[true, false, true, false],
        ];
        for sequence in sequences {
            let (change, counters) = prepared();
            let mut pending = PendingChange::new(change, schema(), None).unwrap();
            for finalize in sequence {
                if *finalize {
                    pending.finalize(false).await.unwrap();
                } else {
                    pending.abort().await.unwrap();
                }
            }
            let total = counters.finalized.load(Ordering::SeqCst)
                + counters.aborted.load(Ordering::SeqCst);
            assert_eq!(total, 1);
        }
    }

    #[test]
    fn test_requires_a_document() {
        let result = PendingChange::new(PreparedChange::new(None, None), schema(), None);
        assert_eq!(result.err().map(|e| e.status()), Some(400));
    }
}
