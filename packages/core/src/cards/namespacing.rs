//! Card Namespacing
//!
//! A card's private schema and content live in one global resource space
//! alongside every other card, so each private name is prefixed with the
//! card's root identity:
//!
//! ```text
//! external:  { "type": "fields", "id": "title" }
//! internal:  { "type": "fields", "id": "local-hub::article-card::millenial-puppies::title" }
//! ```
//!
//! Rules for adding a namespace, per resource:
//!
//! - `cards` resources and the card model itself (`type == id`, a card
//!   identity) keep their type and id; every other resource gets a
//!   namespaced id, and a namespaced type unless the type is a schema type.
//! - Attribute and relationship keys are namespaced unless the resource is a
//!   schema model or a `cards` resource.
//! - Linkage types are namespaced unless they are schema types or `cards`;
//!   linkage ids are namespaced unless they point at `cards`.
//!
//! Removing the namespace reverses each rule by keeping only the private
//! (fourth) identity part.

use super::identity::{card_root_identity, is_card, model_part, namespaced};
use super::CARDS_TYPE;
use crate::models::{Document, Resource, ResourceRef};
use crate::schema::Schema;
use serde_json::Map;

/// Prefix every private type, id and field name with the card's root identity
///
/// Returns `None` when the document's id is not a card identity.
pub fn add_card_namespacing(schema: &dyn Schema, card: &Document) -> Option<Document> {
    let root = card_root_identity(&card.data.id)?;
    let mut result = card.clone();
    add_to_resource(schema, &root, &mut result.data);
    for resource in result.included.iter_mut() {
        add_to_resource(schema, &root, resource);
    }
    Some(result)
}

/// Strip card root identities from every type, id and field name
///
/// Returns `None` when the document has no id.
pub fn remove_card_namespacing(card: &Document) -> Option<Document> {
    if card.data.id.is_empty() {
        return None;
    }
    let mut result = card.clone();
    remove_from_resource(&mut result.data);
    for resource in result.included.iter_mut() {
        remove_from_resource(resource);
    }
    Some(result)
}

fn add_to_resource(schema: &dyn Schema, root: &str, resource: &mut Resource) {
    let is_schema_model = schema.is_schema_type(&resource.resource_type);
    let is_cards = resource.resource_type == CARDS_TYPE;

    if !is_cards && !is_card(&resource.resource_type, &resource.id) {
        if !is_schema_model {
            resource.resource_type = namespaced(root, &resource.resource_type);
        }
        if !resource.id.is_empty() {
            resource.id = namespaced(root, &resource.id);
        }
    }

    let keep_keys = is_schema_model || is_cards;
    if !keep_keys {
        resource.attributes = std::mem::take(&mut resource.attributes)
            .into_iter()
            .map(|(name, value)| (namespaced(root, &name), value))
            .collect::<Map<_, _>>();
    }

    resource.relationships = std::mem::take(&mut resource.relationships)
        .into_iter()
        .map(|(name, mut relationship)| {
            if is_cards && name == "model" {
                return (name, relationship);
            }
            let name = if keep_keys {
                name
            } else {
                namespaced(root, &name)
            };
            if let Some(linkage) = relationship.data.take() {
                relationship.data = Some(linkage.map_refs(|r| add_to_ref(schema, root, r)));
            }
            (name, relationship)
        })
        .collect();
}

fn add_to_ref(schema: &dyn Schema, root: &str, reference: &ResourceRef) -> ResourceRef {
    let points_at_cards = reference.resource_type == CARDS_TYPE;
    let resource_type = if points_at_cards || schema.is_schema_type(&reference.resource_type) {
        reference.resource_type.clone()
    } else {
        namespaced(root, &reference.resource_type)
    };
    let id = if points_at_cards {
        reference.id.clone()
    } else {
        namespaced(root, &reference.id)
    };
    ResourceRef { resource_type, id }
}

fn remove_from_resource(resource: &mut Resource) {
    let is_cards = resource.resource_type == CARDS_TYPE;

    if !is_cards && !is_card(&resource.resource_type, &resource.id) {
        resource.resource_type = strip(&resource.resource_type);
        resource.id = strip(&resource.id);
    }

    resource.attributes = std::mem::take(&mut resource.attributes)
        .into_iter()
        .map(|(name, value)| (model_part(&name).unwrap_or(name), value))
        .collect::<Map<_, _>>();

    resource.relationships = std::mem::take(&mut resource.relationships)
        .into_iter()
        .map(|(name, mut relationship)| {
            if is_cards && name == "model" {
                return (name, relationship);
            }
            let name = model_part(&name).unwrap_or(name);
            if let Some(linkage) = relationship.data.take() {
                relationship.data = Some(linkage.map_refs(remove_from_ref));
            }
            (name, relationship)
        })
        .collect();
}

fn remove_from_ref(reference: &ResourceRef) -> ResourceRef {
    if reference.resource_type == CARDS_TYPE {
        return reference.clone();
    }
    ResourceRef {
        resource_type: strip(&reference.resource_type),
        id: strip(&reference.id),
    }
}

/// Private part of a card-scoped name; other names pass through unchanged
fn strip(value: &str) -> String {
    if card_root_identity(value).is_some() {
        if let Some(part) = model_part(value) {
            return part;
        }
    }
    value.to_string()
}
