//! Indexing Pipeline Tests
//!
//! Runs `SourcesUpdate` passes over in-process data sources and checks the
//! index, the per-source metadata and the emitted events.

#[cfg(test)]
mod indexing_tests {
    use anyhow::Result;
    use cardhub_core::cards::{CardFormat, CardServices};
    use cardhub_core::indexing::{IndexingEvent, SourcesUpdate, UpdateHint, STATIC_MODELS_SOURCE};
    use cardhub_core::models::{Linkage, Resource, ResourceRef};
    use cardhub_core::schema::{field_types, MemoryCurrentSchema, MemorySchema};
    use cardhub_core::search::{MemoryIndex, SearchClient};
    use cardhub_core::sources::{DataSourceRegistry, MemoryDataSource};
    use cardhub_core::{Document, HubConfig, HubError, SchemaRef, Session, Writers};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::{timeout, Duration};

    fn field(id: &str) -> Resource {
        Resource::new("fields", id).with_attribute("field-type", json!(field_types::STRING))
    }

    fn content_type(id: &str, fields: &[&str], data_source: Option<&str>) -> Resource {
        let resource = Resource::new("content-types", id).with_relationship(
            "fields",
            Linkage::Many(fields.iter().map(|f| ResourceRef::new("fields", *f)).collect()),
        );
        match data_source {
            Some(source) => resource.with_relationship(
                "data-source",
                Linkage::One(ResourceRef::new("data-sources", source)),
            ),
            None => resource,
        }
    }

    fn article(id: &str, title: &str) -> Resource {
        Resource::new("articles", id).with_attribute("title", json!(title))
    }

    struct Fixture {
        articles: Arc<MemoryDataSource>,
        notes: Arc<MemoryDataSource>,
        registry: Arc<DataSourceRegistry>,
        index: MemoryIndex,
    }

    /// Helper to create two stores: `local-hub` holds articles, `notes-store`
    /// holds notes
    async fn create_fixture() -> Fixture {
        let articles = Arc::new(MemoryDataSource::new("local-hub"));
        articles
            .seed(vec![
                field("title"),
                content_type("articles", &["title"], None),
                article("1", "First"),
                article("2", "Second"),
            ])
            .await;

        let notes = Arc::new(MemoryDataSource::new("notes-store"));
        notes
            .seed(vec![
                content_type("notes", &["title"], Some("notes-store")),
                Resource::new("notes", "n1").with_attribute("title", json!("Note")),
            ])
            .await;

        let registry = Arc::new(
            DataSourceRegistry::new("local-hub")
                .with_source(articles.data_source())
                .with_source(notes.data_source()),
        );
        Fixture {
            articles,
            notes,
            registry,
            index: MemoryIndex::new(),
        }
    }

    async fn sources_update(fixture: &Fixture) -> Result<SourcesUpdate> {
        let seed: SchemaRef = Arc::new(MemorySchema::bootstrap(fixture.registry.clone())?);
        let mut update =
            SourcesUpdate::from_config(&HubConfig::default(), seed, Arc::new(fixture.index.clone()));
        for source in fixture.registry.iter() {
            update.add_data_source(source).await?;
        }
        Ok(update)
    }

    #[tokio::test]
    async fn test_replace_all_prunes_removed_documents() -> Result<()> {
        let fixture = create_fixture().await;
        let mut update = sources_update(&fixture).await?;

        update.update(&[]).await?;
        assert!(fixture.index.contains("articles", "1").await);
        assert!(fixture.index.contains("articles", "2").await);
        assert!(fixture.index.contains("notes", "n1").await);
        let first_generation = fixture.index.generation_of("articles", "1").await;
        assert!(first_generation.is_some());

        fixture.articles.remove("articles", "2").await;
        update.update(&[]).await?;

        assert!(fixture.index.contains("articles", "1").await);
        assert!(!fixture.index.contains("articles", "2").await);
        assert_ne!(
            fixture.index.generation_of("articles", "1").await,
            first_generation
        );
        assert!(fixture.index.contains("notes", "n1").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_unchanged_sources_keep_their_metadata() -> Result<()> {
        let fixture = create_fixture().await;
        let mut update = sources_update(&fixture).await?;

        update.update(&[]).await?;
        let meta = fixture.index.load_meta("local-hub").await?;
        assert!(meta.as_ref().and_then(|m| m.get("revision")).is_some());
        let generation = fixture.index.generation_of("articles", "1").await;

        update.update(&[]).await?;
        assert_eq!(fixture.index.load_meta("local-hub").await?, meta);
        assert_eq!(fixture.index.generation_of("articles", "1").await, generation);
        Ok(())
    }

    #[tokio::test]
    async fn test_hints_narrow_the_pass() -> Result<()> {
        let fixture = create_fixture().await;
        let mut update = sources_update(&fixture).await?;
        update.update(&[]).await?;

        fixture.articles.seed(vec![article("3", "Third")]).await;
        fixture
            .notes
            .seed(vec![Resource::new("notes", "n2").with_attribute("title", json!("Another"))])
            .await;

        update.update(&[UpdateHint::for_type("notes")]).await?;
        assert!(fixture.index.contains("notes", "n2").await);
        assert!(!fixture.index.contains("articles", "3").await);

        update.update(&[]).await?;
        assert!(fixture.index.contains("articles", "3").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_pass_emits_lifecycle_events() -> Result<()> {
        let fixture = create_fixture().await;
        let mut update = sources_update(&fixture).await?;
        let mut rx = update.subscribe();

        update.update(&[UpdateHint::for_type("notes")]).await?;

        let mut saw_note = false;
        let mut saw_prune = false;
        while let Ok(Ok(event)) = timeout(Duration::from_millis(100), rx.recv()).await {
            match event {
                IndexingEvent::Add { resource_type, id, .. } => {
                    if resource_type == "notes" && id == "n1" {
                        saw_note = true;
                    }
                }
                IndexingEvent::DeleteAllWithoutNonce { ref source_id, .. } => {
                    assert_eq!(event.event_type(), "delete_all_without_nonce");
                    assert_eq!(source_id, "notes-store");
                    saw_prune = true;
                }
                IndexingEvent::Delete { .. } => panic!("no deletes expected"),
            }
        }
        assert!(saw_note, "expected an add event for notes/n1");
        assert!(saw_prune, "expected a replace-all prune event");
        Ok(())
    }

    #[tokio::test]
    async fn test_static_models_are_indexed() -> Result<()> {
        let fixture = create_fixture().await;
        let mut update = sources_update(&fixture).await?;
        update.add_static_models(vec![field("summary")], vec![field("summary")]);
        assert!(update.source_ids().contains(&STATIC_MODELS_SOURCE));

        let schema = update.schema().await?;
        assert!(schema.get_real_and_computed_field("summary").is_some());

        update.update(&[]).await?;
        assert!(fixture.index.contains("fields", "summary").await);
        Ok(())
    }

    #[tokio::test]
    async fn test_schema_lifecycle_errors() -> Result<()> {
        let fixture = create_fixture().await;
        let mut update = sources_update(&fixture).await?;

        let schema = update.schema().await?;
        assert!(schema.get_type("articles").is_some());
        assert!(schema.get_type("notes").is_some());

        let late = update.add_data_source(&fixture.articles.data_source()).await;
        assert!(matches!(late, Err(HubError::Indexing(_))));

        update.take_schema().await?;
        assert!(matches!(update.schema().await, Err(HubError::Indexing(_))));
        assert!(update.update(&[]).await.is_err());

        update.destroy().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_cards_survive_an_indexing_pass() -> Result<()> {
        const CARD: &str = "local-hub::article-card::millenial-puppies";
        let config = HubConfig::default();
        let store = Arc::new(MemoryDataSource::new(&config.default_data_source));
        let registry =
            Arc::new(DataSourceRegistry::from_config(&config).with_source(store.data_source()));
        let index = MemoryIndex::new();
        let writers = Arc::new(Writers::new(
            &config,
            Arc::new(MemoryCurrentSchema::new(index.clone(), registry.clone())),
            Arc::new(index.clone()),
            Arc::new(index.clone()),
        ));
        let cards = CardServices::new(writers);

        let card = Document::try_from(json!({
            "data": {
                "type": "cards",
                "id": CARD,
                "relationships": {
                    "fields": { "data": [ { "type": "fields", "id": "title" } ] },
                    "model": { "data": { "type": CARD, "id": CARD } }
                }
            },
            "included": [
                {
                    "type": "fields",
                    "id": "title",
                    "attributes": { "field-type": field_types::STRING, "is-metadata": true }
                },
                { "type": CARD, "id": CARD, "attributes": { "title": "Millenial Puppies" } }
            ]
        }))?;
        let session = Session::user("hassan");
        cards.create(&session, card).await?;
        assert!(index.contains(CARD, CARD).await);

        let seed: SchemaRef = Arc::new(MemorySchema::bootstrap(registry.clone())?);
        let mut update = SourcesUpdate::from_config(&config, seed, Arc::new(index.clone()));
        update.add_data_source(&store.data_source()).await?;
        assert!(update.schema().await?.get_type(CARD).is_some());
        update.update(&[]).await?;

        assert!(index.contains(CARD, CARD).await);
        let view = cards.get(&session, CARD, CardFormat::Isolated).await?;
        assert_eq!(view.data.attributes.get("title"), Some(&json!("Millenial Puppies")));
        Ok(())
    }
}
