//! Card Views
//!
//! Projects an internal card into one of its two public views:
//!
//! - `Isolated`: the full card. Every metadata field, the private model and
//!   the card's schema ride along, and related cards are expanded into
//!   their embedded view.
//! - `Embedded`: the summary used when a card appears inside another card.
//!   Only metadata fields flagged as needed when embedded are exposed, and
//!   related cards are referenced but not expanded.
//!
//! Views are never namespaced.

use super::format::{card_schema_models, to_internal_format};
use super::identity::{is_card, model_part};
use super::namespacing::remove_card_namespacing;
use super::services::CardSource;
use super::CARDS_TYPE;
use crate::error::{HubError, Result};
use crate::models::{
    dedupe_resources, CollectionDocument, Document, Linkage, Relationship, Resource, ResourceRef,
    Session,
};
use crate::schema::{SchemaChange, SchemaRef, CARD_ASSET_FIELDS, METADATA_FIELD_TYPES_FIELD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFormat {
    Isolated,
    Embedded,
}

/// Project one internal card into a view
///
/// For sessions without full privileges the card's authoritative field list
/// is first recovered through a privileged isolated lookup; a missing card
/// falls back to the document given.
pub async fn adapt_card_to_format(
    schema: &SchemaRef,
    session: &Session,
    card: Document,
    format: CardFormat,
    source: &dyn CardSource,
) -> Result<Document> {
    let id = card.data.id.clone();
    let privileged = if session.is_privileged() {
        card.clone()
    } else {
        match source
            .get_card(&Session::InternalPrivileged, &id, CardFormat::Isolated)
            .await
        {
            Ok(external) => to_internal_format(schema.as_ref(), &external)?,
            Err(e) if e.is_not_found() => card.clone(),
            Err(e) => return Err(e),
        }
    };

    let changes = card_schema_models(schema.as_ref(), &privileged)
        .into_iter()
        .map(SchemaChange::upsert)
        .collect();
    let schema = schema.apply_changes(changes).await?;

    let field_refs: Vec<ResourceRef> = privileged
        .data
        .linkage("fields")
        .map(|l| l.refs().into_iter().cloned().collect())
        .unwrap_or_default();

    let mut result = Resource::new(CARDS_TYPE, &id);
    result.meta = card.data.meta.clone();
    result.relationships.insert(
        "fields".to_string(),
        Relationship::with_data(Linkage::Many(field_refs.clone())),
    );
    result.relationships.insert(
        "model".to_string(),
        Relationship::with_data(Linkage::One(ResourceRef::new(&id, &id))),
    );

    let mut model = card.data.clone();
    model.meta = None;
    for (name, value) in std::mem::take(&mut model.attributes) {
        if CARD_ASSET_FIELDS.contains(&name.as_str()) || name == METADATA_FIELD_TYPES_FIELD {
            result.attributes.insert(name, value);
        } else {
            model.attributes.insert(name, value);
        }
    }
    model.relationships.remove("fields");
    for relationship in model.relationships.values_mut() {
        if let Some(linkage) = relationship.data.take() {
            relationship.data = Some(linkage.map_refs(card_ref_to_cards));
        }
    }

    let mut included = Vec::new();
    if format == CardFormat::Isolated {
        included.push(model);
        included.extend(
            card.included
                .iter()
                .filter(|r| schema.is_schema_type(&r.resource_type))
                .cloned(),
        );
    }

    let mut field_types: Map<String, Value> = match result.attributes.get(METADATA_FIELD_TYPES_FIELD)
    {
        Some(Value::Object(existing)) => existing.clone(),
        _ => field_refs
            .iter()
            .filter_map(|f| {
                let field = schema.get_real_and_computed_field(&f.id)?;
                Some((model_part(&f.id)?, Value::String(field.field_type)))
            })
            .collect(),
    };

    for field_ref in field_refs.iter() {
        let Some(name) = model_part(&field_ref.id) else {
            continue;
        };
        let field = schema
            .get_real_and_computed_field(&field_ref.id)
            .filter(|f| f.is_metadata && (format == CardFormat::Isolated || f.needed_when_embedded));
        let Some(field) = field else {
            field_types.remove(&name);
            continue;
        };

        if !field.is_relationship {
            if let Some(value) = card.data.attributes.get(&field_ref.id) {
                result.attributes.insert(field_ref.id.clone(), value.clone());
            }
            continue;
        }
        let Some(relationship) = card.data.relationships.get(&field_ref.id) else {
            continue;
        };
        result.relationships.insert(
            field_ref.id.clone(),
            Relationship {
                data: relationship.data.as_ref().map(|l| l.map_refs(card_ref_to_cards)),
                links: relationship.links.clone(),
            },
        );

        let targets = relationship
            .data
            .as_ref()
            .map(|l| l.refs().into_iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        for target in targets {
            if is_card(&target.resource_type, &target.id) {
                if format != CardFormat::Isolated {
                    continue;
                }
                match source.get_card(session, &target.id, CardFormat::Embedded).await {
                    Ok(embedded) => {
                        included.push(embedded.data);
                        included.extend(
                            embedded
                                .included
                                .into_iter()
                                .filter(|r| r.resource_type == CARDS_TYPE),
                        );
                    }
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            } else if let Some(resource) = card.find_included(&target.resource_type, &target.id) {
                included.push(resource.clone());
            }
        }
    }
    result
        .attributes
        .insert(METADATA_FIELD_TYPES_FIELD.to_string(), Value::Object(field_types));

    let root = result.key();
    let included = dedupe_resources(included)
        .into_iter()
        .filter(|r| r.key() != root)
        .collect();
    remove_card_namespacing(&Document::with_included(result, included))
        .ok_or_else(|| HubError::validation("The card ID must be supplied", "/data/id"))
}

/// Project every card of a search result, pooling their included resources
///
/// Resources that are not cards pass through unchanged.
pub async fn adapt_card_collection_to_format(
    schema: &SchemaRef,
    session: &Session,
    collection: CollectionDocument,
    format: CardFormat,
    source: &dyn CardSource,
) -> Result<CollectionDocument> {
    let mut data = Vec::with_capacity(collection.data.len());
    let mut included = Vec::new();
    for card in collection.data {
        if !is_card(&card.resource_type, &card.id) {
            data.push(card);
            continue;
        }
        let document = Document::with_included(card, collection.included.clone());
        let view = adapt_card_to_format(schema, session, document, format, source).await?;
        data.push(view.data);
        included.extend(view.included);
    }

    let roots: HashSet<String> = data.iter().map(Resource::key).collect();
    let included = dedupe_resources(included)
        .into_iter()
        .filter(|r| !roots.contains(&r.key()))
        .collect();
    Ok(CollectionDocument { data, included })
}

fn card_ref_to_cards(reference: &ResourceRef) -> ResourceRef {
    if is_card(&reference.resource_type, &reference.id) {
        ResourceRef::new(CARDS_TYPE, &reference.id)
    } else {
        reference.clone()
    }
}
