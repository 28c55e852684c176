//! Card Identity Codec
//!
//! A card identity is a 2-4 part tuple joined by `::`:
//!
//! ```text
//! repository::packageName::cardId[::modelId]
//! ```
//!
//! Three parts name a card; a fourth part names something private to that
//! card (a field, a content type, an internal model). Malformed or missing
//! ids never error here: decoding yields an empty identity and the root
//! lookup yields `None`, so callers null-check instead of catching.

/// Reserved delimiter between identity parts
pub const CARD_ID_DELIMITER: &str = "::";

/// Decoded card identity; parts absent from the source id are `None`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CardIdentity {
    pub repository: Option<String>,
    pub package_name: Option<String>,
    pub card_id: Option<String>,
    pub model_id: Option<String>,
}

impl CardIdentity {
    pub fn new(
        repository: impl Into<String>,
        package_name: impl Into<String>,
        card_id: impl Into<String>,
    ) -> Self {
        Self {
            repository: Some(repository.into()),
            package_name: Some(package_name.into()),
            card_id: Some(card_id.into()),
            model_id: None,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == CardIdentity::default()
    }

    /// Join the present parts with the delimiter
    pub fn encode(&self) -> String {
        encode_identity(self)
    }
}

/// Split an id into its identity parts
///
/// Ids with fewer than two parts decode to an empty identity.
pub fn decode_identity(id: &str) -> CardIdentity {
    let parts: Vec<&str> = id.split(CARD_ID_DELIMITER).collect();
    if parts.len() < 2 {
        return CardIdentity::default();
    }
    let part = |i: usize| parts.get(i).map(|s| s.to_string());
    CardIdentity {
        repository: part(0),
        package_name: part(1),
        card_id: part(2),
        model_id: part(3),
    }
}

/// Join the present identity parts, skipping absent ones
pub fn encode_identity(identity: &CardIdentity) -> String {
    [
        &identity.repository,
        &identity.package_name,
        &identity.card_id,
        &identity.model_id,
    ]
    .iter()
    .filter_map(|part| part.as_deref())
    .collect::<Vec<_>>()
    .join(CARD_ID_DELIMITER)
}

/// True when `(type, id)` names a card itself rather than one of its parts
pub fn is_card(resource_type: &str, id: &str) -> bool {
    !id.is_empty() && resource_type == id && id.split(CARD_ID_DELIMITER).count() > 2
}

/// Three-part root identity of any card-scoped id
pub fn card_root_identity(id: &str) -> Option<String> {
    if id.split(CARD_ID_DELIMITER).count() < 3 {
        return None;
    }
    let identity = decode_identity(id);
    Some(encode_identity(&CardIdentity {
        model_id: None,
        ..identity
    }))
}

/// The private (fourth) part of a card-scoped id
pub fn model_part(id: &str) -> Option<String> {
    decode_identity(id).model_id
}

/// Prefix a private name with a card root identity
pub fn namespaced(root: &str, name: &str) -> String {
    format!("{}{}{}", root, CARD_ID_DELIMITER, name)
}
