//! Card Diff
//!
//! Partitions the resources of an old and a new internal card by identity.
//! Content is never compared: a resource present on both sides is always
//! `changed`.

use crate::models::Resource;
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardDiff {
    /// Only in the new card
    pub added: Vec<Resource>,
    /// In both cards, carrying the new content
    pub changed: Vec<Resource>,
    /// Only in the old card
    pub deleted: Vec<Resource>,
}

impl CardDiff {
    pub fn between(old: &[Resource], new: &[Resource]) -> Self {
        let old_keys: HashSet<String> = old.iter().map(Resource::key).collect();
        let new_keys: HashSet<String> = new.iter().map(Resource::key).collect();

        let (changed, added): (Vec<Resource>, Vec<Resource>) = new
            .iter()
            .cloned()
            .partition(|r| old_keys.contains(&r.key()));
        let deleted = old
            .iter()
            .filter(|r| !new_keys.contains(&r.key()))
            .cloned()
            .collect();

        Self {
            added,
            changed,
            deleted,
        }
    }

    /// Every resource of a card that is going away
    pub fn deletion(resources: Vec<Resource>) -> Self {
        Self {
            deleted: resources,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.deleted.is_empty()
    }
}
