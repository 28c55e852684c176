//! Card format benchmarks
//!
//! Measures the pure card codecs (namespacing and internal format
//! conversion) and the view projection for cards of growing width.
//!
//! Run with: `cargo bench -p cardhub-core`

use async_trait::async_trait;
use cardhub_core::cards::{
    add_card_namespacing, adapt_card_to_format, remove_card_namespacing, to_internal_format,
    CardFormat, CardSource,
};
use cardhub_core::schema::{field_types, MemorySchema};
use cardhub_core::{Document, HubError, Result, SchemaRef, Session};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::runtime::Runtime;

const CARD: &str = "local-hub::article-card::millenial-puppies";

/// Never finds anything; the benches use a privileged session
struct NoCards;

#[async_trait]
impl CardSource for NoCards {
    async fn get_card(&self, _session: &Session, id: &str, _format: CardFormat) -> Result<Document> {
        Err(HubError::not_found(format!("No such card {}", id)))
    }
}

/// External card with `width` string fields, every other one metadata
fn external_card(width: usize) -> Document {
    let mut fields = Vec::with_capacity(width);
    let mut included = Vec::with_capacity(width + 1);
    let mut attributes = Map::new();
    for i in 0..width {
        let name = format!("field-{}", i);
        fields.push(json!({ "type": "fields", "id": name }));
        included.push(json!({
            "type": "fields",
            "id": name,
            "attributes": {
                "field-type": field_types::STRING,
                "is-metadata": i % 2 == 0,
                "needed-when-embedded": i % 4 == 0
            }
        }));
        attributes.insert(name, Value::String(format!("value {}", i)));
    }
    included.push(json!({ "type": CARD, "id": CARD, "attributes": attributes }));

    let body = json!({
        "data": {
            "type": "cards",
            "id": CARD,
            "relationships": {
                "fields": { "data": fields },
                "model": { "data": { "type": CARD, "id": CARD } }
            }
        },
        "included": included
    });
    Document::try_from(body).unwrap()
}

fn bench_namespacing(c: &mut Criterion) {
    let schema = MemorySchema::standalone().unwrap();
    let mut group = c.benchmark_group("card_namespacing");

    for width in [4usize, 32, 128] {
        let card = external_card(width);
        let internal = add_card_namespacing(&schema, &card).unwrap();

        group.bench_with_input(BenchmarkId::new("add", width), &card, |b, card| {
            b.iter(|| add_card_namespacing(&schema, black_box(card)))
        });
        group.bench_with_input(BenchmarkId::new("remove", width), &internal, |b, internal| {
            b.iter(|| remove_card_namespacing(black_box(internal)))
        });
        group.bench_with_input(BenchmarkId::new("to_internal", width), &card, |b, card| {
            b.iter(|| to_internal_format(&schema, black_box(card)).unwrap())
        });
    }

    group.finish();
}

/// Benchmark projecting an internal card into its public views
fn bench_view_projection(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let schema: SchemaRef = Arc::new(MemorySchema::standalone().unwrap());
    let mut group = c.benchmark_group("card_view");
    group.sample_size(30);

    for width in [4usize, 32] {
        let internal = to_internal_format(schema.as_ref(), &external_card(width)).unwrap();
        for format in [CardFormat::Isolated, CardFormat::Embedded] {
            let id = BenchmarkId::new(format!("{:?}", format).to_lowercase(), width);
            group.bench_with_input(id, &internal, |b, internal| {
                b.iter(|| {
                    rt.block_on(adapt_card_to_format(
                        &schema,
                        &Session::InternalPrivileged,
                        internal.clone(),
                        format,
                        &NoCards,
                    ))
                    .unwrap()
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_namespacing, bench_view_projection);
criterion_main!(benches);
