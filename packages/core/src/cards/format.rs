//! External ⇄ Internal Card Format
//!
//! The external card format is what clients send and receive: a `cards`
//! resource whose `model` relationship points at a resource typed and
//! identified by the card's own id, with the card's schema and content in
//! `included`. The internal format is the namespaced model graph the hub
//! stores: the model is the primary resource and every other private
//! resource rides along in `included`.

use super::identity::{card_root_identity, is_card};
use super::namespacing::add_card_namespacing;
use super::CARDS_TYPE;
use crate::error::{HubError, Result};
use crate::models::{Document, Linkage, Relationship, Resource, ResourceRef};
use crate::schema::{Schema, CARD_ASSET_FIELDS, METADATA_FIELD_TYPES_FIELD};
use serde_json::{json, Value};

/// Convert an external card document into the internal card format
pub fn to_internal_format(schema: &dyn Schema, card: &Document) -> Result<Document> {
    let id = card.data.id.clone();
    if id.is_empty() {
        return Err(HubError::validation(
            "The card ID must be supplied in the card document in order to create the card.",
            "/data/id",
        ));
    }
    validate_external_card_format(card)?;

    let namespaced = add_card_namespacing(schema, card).ok_or_else(|| {
        HubError::validation(
            format!("The card id '{}' is not a card identity", id),
            "/data/id",
        )
    })?;

    let model_key = format!("{}/{}", id, id);
    let mut model = namespaced
        .included
        .iter()
        .find(|r| r.key() == model_key)
        .cloned()
        .ok_or_else(|| missing_model_error(&id))?;

    let fields = namespaced
        .data
        .linkage("fields")
        .map(|l| l.refs().into_iter().cloned().collect())
        .unwrap_or_default();
    model
        .relationships
        .insert("fields".to_string(), Relationship::with_data(Linkage::Many(fields)));

    if let Some(version) = card.data.meta.as_ref().and_then(|m| m.get("version")) {
        let mut meta = serde_json::Map::new();
        meta.insert("version".to_string(), version.clone());
        model.merge_meta(&meta);
    }

    for field in CARD_ASSET_FIELDS {
        if let Some(value) = card.data.attributes.get(*field).filter(|v| is_truthy(v)) {
            model.attributes.insert(field.to_string(), value.clone());
        }
    }

    let mut included: Vec<Resource> = namespaced
        .included
        .iter()
        .filter(|r| r.key() != model_key && r.id.contains(&id))
        .cloned()
        .collect();

    for resource in included.iter_mut().chain(std::iter::once(&mut model)) {
        retarget_card_links(resource);
    }

    Ok(Document::with_included(model, included))
}

/// Check the shape of an external card document
pub fn validate_external_card_format(card: &Document) -> Result<()> {
    let id = &card.data.id;
    if id.is_empty() {
        return Err(HubError::validation(
            "The card ID must be supplied in the card document",
            "/data/id",
        ));
    }
    if card.data.resource_type != CARDS_TYPE {
        return Err(HubError::validation(
            format!(
                "The document type for card '{}' is not 'cards', rather it is '{}'",
                id, card.data.resource_type
            ),
            "/data/type",
        ));
    }
    let model = card
        .data
        .linkage("model")
        .and_then(|l| match l {
            Linkage::One(r) => Some(r),
            Linkage::Many(_) => None,
        })
        .ok_or_else(|| {
            HubError::validation(
                format!(
                    "The card 'cards/{}' is missing its card model '{}/{}'.",
                    id, id, id
                ),
                "/data/relationships/model/data",
            )
        })?;
    if &model.resource_type != id || &model.id != id {
        return Err(HubError::validation(
            format!(
                "For the card '{}', the card model does not match the card id. The card model is '{}'",
                id,
                model.key()
            ),
            "/data/relationships/model/data",
        ));
    }
    if card.find_included(id, id).is_none() {
        return Err(HubError::validation(
            format!(
                "The specified card model '{}/{}' is missing for card '{}'",
                id, id, id
            ),
            "/data/relationships/model/data",
        ));
    }
    Ok(())
}

/// Check that an internal card only references its own namespace
///
/// Searchers and indexers may hand back malformed cards, so every internal
/// card is checked before its schema is trusted.
pub fn validate_internal_card_format(schema: &dyn Schema, card: &Document) -> Result<()> {
    let id = &card.data.id;
    let resource_type = &card.data.resource_type;
    if id.is_empty() {
        return Err(HubError::validation(
            "The card ID must be supplied in the card document",
            "/data/id",
        ));
    }
    if resource_type.is_empty() {
        return Err(HubError::validation(
            "The card type must be supplied in the card document",
            "/data/type",
        ));
    }
    if id != resource_type {
        return Err(HubError::validation(
            format!(
                "The card '{}' has a card model content-type that does not match its id: '{}'",
                id, resource_type
            ),
            "/data/id",
        ));
    }

    if let Some(fields) = card.data.linkage("fields") {
        if let Some((index, field)) = fields
            .refs()
            .into_iter()
            .enumerate()
            .find(|(_, f)| !f.id.contains(id.as_str()))
        {
            return Err(HubError::validation(
                format!(
                    "The card '{}' uses a foreign field '{}'",
                    id,
                    field.key()
                ),
                format!("/data/relationships/fields/data/{}", index),
            ));
        }
    }

    for (name, relationship) in card.data.relationships.iter().filter(|(n, _)| *n != "fields") {
        let Some(linkage) = &relationship.data else {
            continue;
        };
        let foreign = |r: &ResourceRef| is_foreign(schema, id, &r.resource_type, &r.id);
        let failure = match linkage {
            Linkage::Many(refs) => refs
                .iter()
                .enumerate()
                .find(|(_, r)| foreign(r))
                .map(|(index, r)| (r, format!("/data/relationships/{}/data/{}", name, index))),
            Linkage::One(r) => {
                foreign(r).then(|| (r, format!("/data/relationships/{}/data", name)))
            }
        };
        if let Some((reference, pointer)) = failure {
            return Err(HubError::validation(
                format!(
                    "The card '{}' has a relationship to a foreign internal model '{}'",
                    id,
                    reference.key()
                ),
                pointer,
            ));
        }
    }

    if let Some((index, resource)) = card.included.iter().enumerate().find(|(_, r)| {
        !r.id.is_empty() && is_foreign(schema, id, &r.resource_type, &r.id)
    }) {
        return Err(HubError::validation(
            format!(
                "The card '{}' contains included foreign internal models '{}'",
                id,
                resource.key()
            ),
            format!("/included/{}", index),
        ));
    }
    Ok(())
}

/// Validate an internal card and return the schema models it contributes
pub fn load_card(schema: &dyn Schema, card: &Document) -> Result<Vec<Resource>> {
    validate_internal_card_format(schema, card)?;
    Ok(card_schema_models(schema, card))
}

/// Schema models a card contributes: its schema-typed includes plus a
/// content type derived for the card model
pub fn card_schema_models(schema: &dyn Schema, card: &Document) -> Vec<Resource> {
    if card.data.id.is_empty() {
        return Vec::new();
    }
    let mut models: Vec<Resource> = card
        .included
        .iter()
        .filter(|r| schema.is_schema_type(&r.resource_type))
        .cloned()
        .collect();
    if let Some(content_type) = derive_card_model_content_type(card) {
        models.push(content_type);
    }
    models
}

/// Content type describing a card model
///
/// Field types are not inspected when building `default-includes`, so
/// computed relationships can still be exposed as metadata.
pub fn derive_card_model_content_type(card: &Document) -> Option<Resource> {
    let id = card_root_identity(&card.data.id)?;
    let card_fields: Vec<ResourceRef> = card
        .data
        .linkage("fields")
        .map(|l| l.refs().into_iter().cloned().collect())
        .unwrap_or_default();

    let mut fields = vec![ResourceRef::new("fields", "fields")];
    fields.extend(CARD_ASSET_FIELDS.iter().map(|f| ResourceRef::new("fields", *f)));
    fields.extend(card_fields.iter().cloned());
    fields.push(ResourceRef::new("computed-fields", METADATA_FIELD_TYPES_FIELD));

    let mut default_includes = vec![
        "fields".to_string(),
        "fields.related-types".to_string(),
        "fields.constraints".to_string(),
    ];
    default_includes.extend(card_fields.iter().map(|f| f.id.clone()));

    Some(
        Resource::new("content-types", id)
            .with_attribute("default-includes", json!(default_includes))
            .with_relationship("fields", Linkage::Many(fields)),
    )
}

fn missing_model_error(id: &str) -> HubError {
    HubError::validation(
        format!(
            "The card 'cards/{}' is missing its card model '{}/{}'.",
            id, id, id
        ),
        "/data/relationships/model/data",
    )
}

/// A reference leaves the card's namespace without going through a card
fn is_foreign(schema: &dyn Schema, card_id: &str, resource_type: &str, id: &str) -> bool {
    if is_card(resource_type, id) {
        return false;
    }
    (!schema.is_schema_type(resource_type) && !resource_type.contains(card_id))
        || !id.contains(card_id)
}

/// Internal format addresses other cards by their own `type == id` pair
fn retarget_card_links(resource: &mut Resource) {
    if resource.id.is_empty() {
        return;
    }
    if resource.resource_type == CARDS_TYPE {
        resource.resource_type = resource.id.clone();
    }
    for relationship in resource.relationships.values_mut() {
        if let Some(linkage) = relationship.data.take() {
            relationship.data = Some(linkage.map_refs(|r| {
                if r.resource_type == CARDS_TYPE {
                    ResourceRef::new(&r.id, &r.id)
                } else {
                    r.clone()
                }
            }));
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        _ => true,
    }
}
