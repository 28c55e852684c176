//! Cards
//!
//! A card is a self-describing content unit: one document carrying its own
//! private schema (fields, computed fields) and content. This module holds
//! the identity codec, the namespacing codec, the external/internal format
//! adapters, the isolated/embedded view projection and the card services
//! facade built on top of the write orchestrator.

pub mod format;
pub mod identity;
pub mod namespacing;
pub mod services;
pub mod view;

pub use format::{
    card_schema_models, derive_card_model_content_type, load_card, to_internal_format,
    validate_external_card_format, validate_internal_card_format,
};
pub use identity::{
    card_root_identity, decode_identity, encode_identity, is_card, model_part, CardIdentity,
    CARD_ID_DELIMITER,
};
pub use namespacing::{add_card_namespacing, remove_card_namespacing};
pub use services::{CardReader, CardServices, CardSource};
pub use view::{adapt_card_collection_to_format, adapt_card_to_format, CardFormat};

/// Resource type of external card documents
pub const CARDS_TYPE: &str = "cards";

/// Relationship type whose linkage is resolved by a query instead of stored
pub const QUERIES_TYPE: &str = "cardstack-queries";
