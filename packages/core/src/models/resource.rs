//! JSON:API Resource Model
//!
//! Every document that flows through the hub (external cards, internal card
//! graphs, schema models, plain content) is a JSON:API document: a primary
//! `data` resource plus an optional list of `included` resources.
//!
//! ```json
//! {
//!   "data": {
//!     "type": "articles",
//!     "id": "1",
//!     "attributes": { "title": "Hello" },
//!     "relationships": { "author": { "data": { "type": "people", "id": "9" } } },
//!     "meta": { "version": "3" }
//!   },
//!   "included": [ { "type": "people", "id": "9" } ]
//! }
//! ```
//!
//! A resource is uniquely identified by its `(type, id)` pair, rendered as
//! `type/id` by [`Resource::key`].

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reference to a resource by type and id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }

    /// `type/id` key used for identity comparisons
    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

/// Relationship linkage: a single reference or an ordered list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Linkage {
    Many(Vec<ResourceRef>),
    One(ResourceRef),
}

impl Linkage {
    /// All references carried by this linkage, in order
    pub fn refs(&self) -> Vec<&ResourceRef> {
        match self {
            Linkage::Many(refs) => refs.iter().collect(),
            Linkage::One(r) => vec![r],
        }
    }

    /// Rewrite every reference, preserving the single/list shape
    pub fn map_refs(&self, mut f: impl FnMut(&ResourceRef) -> ResourceRef) -> Linkage {
        match self {
            Linkage::Many(refs) => Linkage::Many(refs.iter().map(&mut f).collect()),
            Linkage::One(r) => Linkage::One(f(r)),
        }
    }

    /// First reference, if any
    pub fn first(&self) -> Option<&ResourceRef> {
        match self {
            Linkage::Many(refs) => refs.first(),
            Linkage::One(r) => Some(r),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Linkage::Many(refs) if refs.is_empty())
    }
}

/// Relationship links object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipLinks {
    pub related: String,
}

/// A relationship value: linkage data and/or a `links.related` URL
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Linkage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<RelationshipLinks>,
}

impl Relationship {
    pub fn with_data(data: Linkage) -> Self {
        Self {
            data: Some(data),
            links: None,
        }
    }
}

/// A single JSON:API resource object
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,

    /// Empty when the document did not carry an id
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    /// `type/id` key used for identity comparisons
    pub fn key(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    pub fn to_ref(&self) -> ResourceRef {
        ResourceRef::new(&self.resource_type, &self.id)
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Builder-style relationship setter
    pub fn with_relationship(mut self, name: impl Into<String>, data: Linkage) -> Self {
        self.relationships
            .insert(name.into(), Relationship::with_data(data));
        self
    }

    /// Linkage of a relationship, if present and non-null
    pub fn linkage(&self, name: &str) -> Option<&Linkage> {
        self.relationships.get(name).and_then(|r| r.data.as_ref())
    }

    /// `meta.version` rendered as a string (numbers and strings are accepted)
    pub fn version(&self) -> Option<String> {
        match self.meta.as_ref()?.get("version")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Merge keys into `meta`, creating it when absent
    pub fn merge_meta(&mut self, meta: &Map<String, Value>) {
        let target = self.meta.get_or_insert_with(Map::new);
        for (key, value) in meta {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// A single-resource JSON:API document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub data: Resource,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
}

impl Document {
    pub fn new(data: Resource) -> Self {
        Self {
            data,
            included: Vec::new(),
        }
    }

    pub fn with_included(data: Resource, included: Vec<Resource>) -> Self {
        Self { data, included }
    }

    /// Find an included resource by type and id
    pub fn find_included(&self, resource_type: &str, id: &str) -> Option<&Resource> {
        self.included
            .iter()
            .find(|r| r.resource_type == resource_type && r.id == id)
    }
}

impl TryFrom<Value> for Document {
    type Error = HubError;

    /// Parse a request body, rejecting bodies without a top-level `data` member
    fn try_from(value: Value) -> Result<Self> {
        match value.get("data") {
            Some(data) if data.is_object() => Ok(serde_json::from_value(value)?),
            _ => Err(HubError::Validation {
                status: 400,
                title: "Bad request".to_string(),
                detail: "The document must have a top-level \"data\" property".to_string(),
                pointer: Some("/data".to_string()),
            }),
        }
    }
}

/// A collection JSON:API document (search results)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectionDocument {
    pub data: Vec<Resource>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
}

/// Keep the first resource for each `type/id`, preserving order
pub fn dedupe_resources(resources: Vec<Resource>) -> Vec<Resource> {
    let mut seen = std::collections::HashSet::new();
    resources
        .into_iter()
        .filter(|r| seen.insert(r.key()))
        .collect()
}
