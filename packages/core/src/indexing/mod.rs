//! Indexing Pipeline
//!
//! Pulls schema and content from data sources into the search index:
//!
//! - [`SourcesUpdate`]: drives one pass over the registered data sources
//! - [`Operations`]: the save/delete/replace-all verbs a source stages with
//! - [`Updater`] and its capability traits: what a source contributes
//! - [`IndexingEvent`]: broadcast lifecycle events

mod events;
mod operations;
mod sources_update;
mod static_models;
mod updater;

pub use events::{IndexingEvent, INDEXING_EVENT_CHANNEL_CAPACITY};
pub use operations::{Generation, Operations};
pub use sources_update::SourcesUpdate;
pub use static_models::{StaticModelsUpdater, STATIC_MODELS_SOURCE};
pub use updater::{
    Capability, Indexer, SupportsContentUpdate, SupportsSchema, SupportsTeardown, UpdateHint,
    Updater,
};
