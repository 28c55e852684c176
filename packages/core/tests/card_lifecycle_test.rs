//! Card Lifecycle Tests
//!
//! Drives cards through create, read, update and delete against the
//! in-process index, schema and data source, checking both what callers see
//! and what ends up in the store and the index.

#[cfg(test)]
mod card_lifecycle_tests {
    use anyhow::Result;
    use cardhub_core::cards::{CardFormat, CardServices};
    use cardhub_core::schema::{field_types, MemoryCurrentSchema};
    use cardhub_core::search::MemoryIndex;
    use cardhub_core::sources::{DataSourceRegistry, MemoryDataSource};
    use cardhub_core::{Document, HubConfig, Session, Writers};
    use serde_json::{json, Value};
    use std::sync::Arc;

    const CARD: &str = "local-hub::article-card::millenial-puppies";

    struct Hub {
        store: Arc<MemoryDataSource>,
        index: MemoryIndex,
        cards: CardServices,
    }

    /// Helper to wire an in-process hub around one data source
    fn create_hub() -> Hub {
        let config = HubConfig::default();
        let store = Arc::new(MemoryDataSource::new(&config.default_data_source));
        let registry =
            Arc::new(DataSourceRegistry::from_config(&config).with_source(store.data_source()));
        let index = MemoryIndex::new();
        let current_schema = Arc::new(MemoryCurrentSchema::new(index.clone(), registry));
        let writers = Arc::new(Writers::new(
            &config,
            current_schema,
            Arc::new(index.clone()),
            Arc::new(index.clone()),
        ));
        Hub {
            store,
            index,
            cards: CardServices::new(writers),
        }
    }

    fn ns(name: &str) -> String {
        format!("{}::{}", CARD, name)
    }

    fn article_card(title: &str, with_body: bool, version: Option<&str>) -> Result<Document> {
        let mut fields = vec![json!({ "type": "fields", "id": "title" })];
        let mut included = vec![json!({
            "type": "fields",
            "id": "title",
            "attributes": {
                "field-type": field_types::STRING,
                "is-metadata": true,
                "needed-when-embedded": true
            }
        })];
        let mut model_attributes = json!({ "title": title });
        if with_body {
            fields.push(json!({ "type": "fields", "id": "body" }));
            included.push(json!({
                "type": "fields",
                "id": "body",
                "attributes": { "field-type": field_types::STRING }
            }));
            model_attributes["body"] = json!("Puppies are great");
        }
        included.push(json!({ "type": CARD, "id": CARD, "attributes": model_attributes }));

        let mut data = json!({
            "type": "cards",
            "id": CARD,
            "attributes": { "isolated-template": "<h1>{{title}}</h1>" },
            "relationships": {
                "fields": { "data": fields },
                "model": { "data": { "type": CARD, "id": CARD } }
            }
        });
        if let Some(version) = version {
            data["meta"] = json!({ "version": version });
        }
        Ok(Document::try_from(json!({ "data": data, "included": included }))?)
    }

    fn author_card() -> Result<Document> {
        Ok(Document::try_from(json!({
            "data": {
                "type": "cards",
                "id": CARD,
                "relationships": {
                    "fields": { "data": [ { "type": "fields", "id": "author" } ] },
                    "model": { "data": { "type": CARD, "id": CARD } }
                }
            },
            "included": [
                { "type": "content-types", "id": "bios" },
                {
                    "type": "fields",
                    "id": "author",
                    "attributes": { "field-type": field_types::BELONGS_TO, "is-metadata": true },
                    "relationships": {
                        "related-types": { "data": [ { "type": "content-types", "id": "bios" } ] }
                    }
                },
                { "type": "bios", "id": "van-gogh" },
                {
                    "type": CARD,
                    "id": CARD,
                    "relationships": {
                        "author": { "data": { "type": "bios", "id": "van-gogh" } }
                    }
                }
            ]
        }))?)
    }

    #[tokio::test]
    async fn test_create_card_returns_isolated_view() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");

        let view = hub
            .cards
            .create(&session, article_card("Millenial Puppies", false, None)?)
            .await?;

        assert_eq!(view.data.resource_type, "cards");
        assert_eq!(view.data.id, CARD);
        assert_eq!(view.data.attributes.get("title"), Some(&json!("Millenial Puppies")));
        assert_eq!(
            view.data.attributes.get("isolated-template"),
            Some(&json!("<h1>{{title}}</h1>"))
        );
        assert_eq!(view.data.version(), Some("1".to_string()));

        let model = view
            .find_included(CARD, CARD)
            .expect("isolated view should include the card model");
        assert_eq!(model.attributes.get("title"), Some(&json!("Millenial Puppies")));

        // Stored internally under namespaced names
        let stored = hub.store.record(CARD, CARD).await.expect("card model stored");
        assert_eq!(
            stored.attributes.get(&ns("title")),
            Some(&json!("Millenial Puppies"))
        );
        assert!(hub.store.record("fields", &ns("title")).await.is_some());
        assert!(hub.index.contains(CARD, CARD).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_card_in_both_formats() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");
        hub.cards
            .create(&session, article_card("Millenial Puppies", true, None)?)
            .await?;

        let isolated = hub.cards.get(&session, CARD, CardFormat::Isolated).await?;
        assert_eq!(isolated.data.attributes.get("title"), Some(&json!("Millenial Puppies")));
        assert!(!isolated.data.attributes.contains_key("body"));
        let model = isolated.find_included(CARD, CARD).expect("model included");
        assert_eq!(model.attributes.get("body"), Some(&json!("Puppies are great")));

        let embedded = hub.cards.get(&session, CARD, CardFormat::Embedded).await?;
        assert_eq!(embedded.data.attributes.get("title"), Some(&json!("Millenial Puppies")));
        assert!(embedded.find_included(CARD, CARD).is_none());

        let results = hub
            .cards
            .search(&session, CardFormat::Embedded, &json!({}))
            .await?;
        assert_eq!(results.data.len(), 1);
        assert_eq!(results.data[0].id, CARD);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_adds_and_removes_card_fields() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");
        hub.cards
            .create(&session, article_card("Millenial Puppies", false, None)?)
            .await?;

        let view = hub
            .cards
            .update(&session, CARD, article_card("Puppies!", true, Some("1"))?)
            .await?;
        assert_eq!(view.data.attributes.get("title"), Some(&json!("Puppies!")));
        assert_eq!(view.data.version(), Some("2".to_string()));
        assert!(hub.store.record("fields", &ns("body")).await.is_some());

        hub.cards
            .update(&session, CARD, article_card("Puppies!", false, Some("2"))?)
            .await?;
        assert!(hub.store.record("fields", &ns("body")).await.is_none());
        assert!(!hub.index.contains("fields", &ns("body")).await);
        assert!(hub.store.record("fields", &ns("title")).await.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");
        hub.cards
            .create(&session, article_card("Millenial Puppies", false, None)?)
            .await?;

        let error = hub
            .cards
            .update(&session, CARD, article_card("Late", false, Some("7"))?)
            .await
            .err()
            .expect("stale version must be rejected");
        assert_eq!(error.status(), 409);

        let stored = hub.store.record(CARD, CARD).await.expect("card model stored");
        assert_eq!(
            stored.attributes.get(&ns("title")),
            Some(&json!("Millenial Puppies"))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_update_body_must_name_the_updated_card() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");
        hub.cards
            .create(&session, article_card("Millenial Puppies", false, None)?)
            .await?;

        let error = hub
            .cards
            .update(
                &session,
                "local-hub::article-card::grumpy-cats",
                article_card("Puppies!", false, Some("1"))?,
            )
            .await
            .err()
            .expect("mismatched card id must be rejected");
        assert_eq!(error.status(), 400);
        assert_eq!(error.pointer(), Some("/data/id"));

        let stored = hub.store.record(CARD, CARD).await.expect("card model stored");
        assert_eq!(stored.version(), Some("1".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_card_clears_related_types_first() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");

        let view = hub.cards.create(&session, author_card()?).await?;
        assert_eq!(
            view.data.linkage("author").and_then(|l| l.first()).map(|r| r.id.as_str()),
            Some("van-gogh")
        );
        assert!(view.find_included("bios", "van-gogh").is_some());
        assert!(hub.store.record("content-types", &ns("bios")).await.is_some());

        hub.cards.delete(&session, CARD, None).await?;

        assert!(hub.store.records().await.is_empty());
        assert!(hub.index.is_empty().await);
        let missing = hub
            .cards
            .get(&session, CARD, CardFormat::Isolated)
            .await
            .err()
            .expect("deleted card must be gone");
        assert!(missing.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_a_missing_card_is_a_no_op() -> Result<()> {
        let hub = create_hub();
        hub.cards
            .delete(&Session::user("hassan"), CARD, None)
            .await?;
        assert!(hub.store.records().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_cards_are_rejected() -> Result<()> {
        let hub = create_hub();
        let session = Session::user("hassan");

        let mut card = article_card("Millenial Puppies", false, None)?;
        card.included.retain(|r| r.id != CARD);
        let error = hub
            .cards
            .create(&session, card)
            .await
            .err()
            .expect("card without a model must be rejected");
        assert_eq!(error.status(), 400);
        assert_eq!(error.pointer(), Some("/data/relationships/model/data"));

        let body: Value = json!({ "data": { "type": "cards", "id": "" } });
        let error = hub
            .cards
            .create(&session, Document::try_from(body)?)
            .await
            .err()
            .expect("card without an id must be rejected");
        assert_eq!(error.pointer(), Some("/data/id"));
        assert!(hub.store.records().await.is_empty());
        Ok(())
    }
}
