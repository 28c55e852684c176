//! Data Models
//!
//! This module contains the document structures shared by every layer:
//!
//! - `Resource`, `Document`, `CollectionDocument` - JSON:API envelopes
//! - `Linkage`, `Relationship`, `ResourceRef` - relationship values
//! - `Session` - authorization context for reads and writes

mod resource;
mod session;

pub use resource::{
    dedupe_resources, CollectionDocument, Document, Linkage, Relationship, RelationshipLinks,
    Resource, ResourceRef,
};
pub use session::Session;
