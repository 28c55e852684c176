//! Card Services
//!
//! Card-level facade over the search index and the write orchestrator.
//! Reads fetch the internal card from the index and project it into the
//! requested view; writes go through [`Writers`] as `cards` documents.

use super::identity::is_card;
use super::view::{adapt_card_collection_to_format, adapt_card_to_format, CardFormat};
use super::CARDS_TYPE;
use crate::error::Result;
use crate::models::{CollectionDocument, Document, Session};
use crate::schema::CurrentSchema;
use crate::search::Searchers;
use crate::writers::Writers;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Anything that can hand out a card in one of its views
#[async_trait]
pub trait CardSource: Send + Sync {
    async fn get_card(&self, session: &Session, id: &str, format: CardFormat) -> Result<Document>;
}

/// Reads cards out of the search index
#[derive(Clone)]
pub struct CardReader {
    searchers: Arc<dyn Searchers>,
    current_schema: Arc<dyn CurrentSchema>,
    source_id: String,
}

impl CardReader {
    pub fn new(
        searchers: Arc<dyn Searchers>,
        current_schema: Arc<dyn CurrentSchema>,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            searchers,
            current_schema,
            source_id: source_id.into(),
        }
    }

    pub async fn get(&self, session: &Session, id: &str, format: CardFormat) -> Result<Document> {
        let card = self.searchers.get(session, &self.source_id, id, id).await?;
        let schema = self.current_schema.get_schema().await?;
        adapt_card_to_format(&schema, session, card, format, self).await
    }

    /// Run a search and project every card it matched; other hits are dropped
    pub async fn search(
        &self,
        session: &Session,
        format: CardFormat,
        query: &Value,
    ) -> Result<CollectionDocument> {
        let mut results = self.searchers.search(session, query).await?;
        results
            .data
            .retain(|r| is_card(&r.resource_type, &r.id));
        let schema = self.current_schema.get_schema().await?;
        adapt_card_collection_to_format(&schema, session, results, format, self).await
    }
}

#[async_trait]
impl CardSource for CardReader {
    async fn get_card(&self, session: &Session, id: &str, format: CardFormat) -> Result<Document> {
        self.get(session, id, format).await
    }
}

pub struct CardServices {
    writers: Arc<Writers>,
    reader: CardReader,
}

impl CardServices {
    pub fn new(writers: Arc<Writers>) -> Self {
        let reader = writers.card_reader().clone();
        Self { writers, reader }
    }

    pub async fn get(&self, session: &Session, id: &str, format: CardFormat) -> Result<Document> {
        self.reader.get(session, id, format).await
    }

    pub async fn search(
        &self,
        session: &Session,
        format: CardFormat,
        query: &Value,
    ) -> Result<CollectionDocument> {
        self.reader.search(session, format, query).await
    }

    /// Create a card from its external document; returns the isolated view
    pub async fn create(&self, session: &Session, card: Document) -> Result<Document> {
        self.writers
            .create(session, CARDS_TYPE, serde_json::to_value(card)?)
            .await
    }

    pub async fn update(&self, session: &Session, id: &str, card: Document) -> Result<Document> {
        self.writers
            .update(session, CARDS_TYPE, id, serde_json::to_value(card)?)
            .await
    }

    pub async fn delete(&self, session: &Session, id: &str, version: Option<&str>) -> Result<()> {
        self.writers.delete(session, version, CARDS_TYPE, id).await
    }
}
