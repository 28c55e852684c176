//! Indexing Lifecycle Events
//!
//! Events are published on a tokio broadcast channel owned by
//! [`SourcesUpdate`](super::SourcesUpdate); any number of observers can
//! subscribe. Sends never fail the pass: with no subscribers the event is
//! simply dropped.

use super::Generation;
use crate::models::Document;

/// Default broadcast capacity for indexing events
pub const INDEXING_EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone)]
pub enum IndexingEvent {
    /// A document was staged into the pass's batch
    Add {
        resource_type: String,
        id: String,
        document: Document,
    },

    /// A document deletion was staged into the pass's batch
    Delete { resource_type: String, id: String },

    /// A replace-all pass pruned everything outside its generation
    DeleteAllWithoutNonce {
        source_id: String,
        generation: Generation,
    },
}

impl IndexingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            IndexingEvent::Add { .. } => "add",
            IndexingEvent::Delete { .. } => "delete",
            IndexingEvent::DeleteAllWithoutNonce { .. } => "delete_all_without_nonce",
        }
    }
}
