use criterion::{criterion_group, criterion_main, Criterion};
use rinbson::{decode_document, doc, encode_document, from_bson, to_bson, Document};
use serde::{Deserialize, Serialize};

fn bench_document_creation(c: &mut Criterion) {
    c.bench_function("document_create", |b| {
        b.iter(|| {
            let mut doc = Document::new();
            doc.insert("name", "Rin");
            doc.insert("age", 16i64);
            doc.insert("version", "v1");
            doc
        })
    });
}

fn bench_document_encode(c: &mut Criterion) {
    let doc = doc! {
        "name": "Rin",
        "age": 16i64,
        "active": true,
        "score": 99.5f64
    };

    c.bench_function("document_encode", |b| b.iter(|| encode_document(&doc)));
}

fn bench_document_decode(c: &mut Criterion) {
    let doc = doc! {
        "name": "Rin",
        "age": 16i64,
        "active": true,
        "score": 99.5f64
    };
    let encoded = encode_document(&doc).unwrap();

    c.bench_function("document_decode", |b| b.iter(|| decode_document(&encoded)));
}

fn bench_nested_document_encode(c: &mut Criterion) {
    let doc = doc! {
        "name": "Rin",
        "address": {
            "street": "123 Main St",
            "city": "Tokyo"
        },
        "tags": ["a", "b", "c"]
    };
    let encoded = encode_document(&doc).unwrap();

    c.bench_function("nested_document_encode", |b| {
        b.iter(|| encode_document(&doc))
    });
    c.bench_function("nested_document_decode", |b| {
        b.iter(|| decode_document(&encoded))
    });
}

#[derive(Serialize, Deserialize)]
struct Record {
    name: String,
    age: i64,
    active: bool,
    score: f64,
}

fn bench_serde_bridge(c: &mut Criterion) {
    let record = Record {
        name: "Rin".to_string(),
        age: 16,
        active: true,
        score: 99.5,
    };
    let value = to_bson(&record).unwrap();

    c.bench_function("serde_to_bson", |b| b.iter(|| to_bson(&record)));
    c.bench_function("serde_from_bson", |b| {
        b.iter(|| from_bson::<Record>(&value))
    });
}

criterion_group!(
    benches,
    bench_document_creation,
    bench_document_encode,
    bench_document_decode,
    bench_nested_document_encode,
    bench_serde_bridge,
);

criterion_main!(benches);
