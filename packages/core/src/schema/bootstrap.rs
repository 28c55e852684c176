//! Core schema models every hub starts from

use super::field_types;
use crate::models::{Linkage, Resource, ResourceRef};
use serde_json::json;

/// Types whose documents are schema models rather than content
pub const SCHEMA_TYPES: &[&str] = &[
    "content-types",
    "fields",
    "computed-fields",
    "constraints",
    "input-assignments",
    "data-sources",
    "default-values",
    "grants",
    "plugin-configs",
];

/// Template, script and style assets for the isolated and embedded views
pub const CARD_ASSET_FIELDS: &[&str] = &[
    "isolated-template",
    "isolated-js",
    "isolated-css",
    "embedded-template",
    "embedded-js",
    "embedded-css",
];

/// Computed field mapping each card field name to its field type
pub const METADATA_FIELD_TYPES_FIELD: &str = "metadata-field-types";

/// Content types for the schema types plus the framework fields cards share
pub fn bootstrap_models() -> Vec<Resource> {
    let mut models: Vec<Resource> = SCHEMA_TYPES
        .iter()
        .map(|t| Resource::new("content-types", *t))
        .collect();

    models.push(
        Resource::new("fields", "fields")
            .with_attribute("field-type", json!(field_types::HAS_MANY))
            .with_relationship(
                "related-types",
                Linkage::Many(vec![ResourceRef::new("content-types", "fields")]),
            ),
    );

    for asset in CARD_ASSET_FIELDS {
        models.push(
            Resource::new("fields", *asset)
                .with_attribute("field-type", json!(field_types::STRING))
                .with_attribute("is-metadata", json!(true))
                .with_attribute("needed-when-embedded", json!(true)),
        );
    }

    models.push(
        Resource::new("computed-fields", METADATA_FIELD_TYPES_FIELD)
            .with_attribute("computed-field-type", json!("@cardhub/core-types::metadata-field-types"))
            .with_attribute("field-type", json!(field_types::OBJECT))
            .with_attribute("is-metadata", json!(true))
            .with_attribute("needed-when-embedded", json!(true)),
    );

    models
}
