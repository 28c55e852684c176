//! CardHub Core
//!
//! Document lifecycle engine for cards: self-describing content units that
//! carry their own schema alongside their data.
//!
//! # Architecture
//!
//! - **Namespaced storage**: a card's private types, ids and field names are
//!   prefixed with its root identity (`repository::package::card`) so every
//!   card shares one resource space without collisions
//! - **Transactional writes**: every mutation is a `PendingChange` that is
//!   either finalized or aborted, never both
//! - **Incremental indexing**: data sources replay content into the search
//!   index, pruning stale documents by replace-all generation
//!
//! # Modules
//!
//! - [`cards`] - Identity and namespacing codecs, format adapters, views
//! - [`writers`] - Writer contract, `PendingChange`, the write orchestrator
//! - [`indexing`] - Indexing passes over data sources
//! - [`schema`] - Schema abstraction and the in-process schema
//! - [`search`] - Search backend contracts and the in-process index
//! - [`sources`] - Data source bindings and the in-process data source
//! - [`models`] - JSON:API documents and sessions

pub mod cards;
pub mod config;
pub mod error;
pub mod indexing;
pub mod logging;
pub mod models;
pub mod schema;
pub mod search;
pub mod sources;
pub mod writers;

// Re-export commonly used types
pub use cards::{CardFormat, CardReader, CardServices};
pub use config::HubConfig;
pub use error::{HubError, Result};
pub use indexing::{Generation, IndexingEvent, SourcesUpdate, UpdateHint};
pub use models::*;
pub use schema::{CurrentSchema, Schema, SchemaRef};
pub use search::{SearchClient, Searchers};
pub use sources::{DataSource, DataSourceRegistry};
pub use writers::{PendingChange, Writer, Writers};
