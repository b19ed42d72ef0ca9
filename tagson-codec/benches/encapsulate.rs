use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tagson_codec::{Tagson, TypeSpec};
use tagson_format::classify::same_constructor;
use tagson_format::{Class, ObjectRef, Value};

fn date(millis: f64) -> Value {
    let obj = ObjectRef::instance_of(Arc::new(Class::exotic("Date")));
    obj.set_native(millis);
    Value::Object(obj)
}

fn with_dates() -> Tagson {
    let mut tagson = Tagson::new();
    tagson
        .register((
            "Date",
            TypeSpec::new(|v, _| same_constructor(v, &Class::exotic("Date")))
                .replace(|v, _| {
                    let millis = v
                        .as_object()
                        .and_then(|o| o.native::<f64>())
                        .map_or(f64::NAN, |m| *m);
                    Ok(Value::Number(millis))
                })
                .revive(|v, _| Ok(date(v.as_f64().unwrap_or(f64::NAN)))),
        ))
        .unwrap();
    tagson
}

fn create_test_records(count: usize, cardinality: usize) -> Value {
    let users: Vec<Value> = (0..cardinality)
        .map(|i| Value::object_from([("name", Value::from(format!("user{}", i)))]))
        .collect();

    Value::array((0..count).map(|i| {
        Value::object_from([
            ("id", Value::from(i)),
            ("user", users[i % cardinality].clone()),
            ("created", date(1_600_000_000_000.0 + i as f64)),
            ("value", Value::from(i * 2)),
            (
                "level",
                Value::from(if i % 3 == 0 {
                    "info"
                } else if i % 3 == 1 {
                    "warn"
                } else {
                    "error"
                }),
            ),
        ])
    }))
}

fn bench_encapsulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("encapsulate");
    let tagson = with_dates();

    for cardinality in [10, 1000] {
        for record_count in [100, 1000] {
            let records = create_test_records(record_count, cardinality);

            group.bench_with_input(
                BenchmarkId::from_parameter(format!("{}rec_{}card", record_count, cardinality)),
                &records,
                |b, records| {
                    b.iter(|| black_box(tagson.encapsulate(black_box(records), None).unwrap()));
                },
            );
        }
    }

    group.finish();
}

fn bench_revive(c: &mut Criterion) {
    let mut group = c.benchmark_group("revive");
    let tagson = with_dates();

    for record_count in [100, 1000] {
        let records = create_test_records(record_count, 10);
        let json = tagson.encapsulate(&records, None).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}rec", record_count)),
            &json,
            |b, json| {
                b.iter(|| black_box(tagson.revive(black_box(json), None).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_plain_passthrough(c: &mut Criterion) {
    let tagson = Tagson::new();
    let json = serde_json::json!({
        "items": (0..1000).map(|i| serde_json::json!({"id": i, "tags": ["a", "b"]})).collect::<Vec<_>>()
    });
    let value = Value::from_json(&json);

    c.bench_function("plain_passthrough", |b| {
        b.iter(|| black_box(tagson.encapsulate(black_box(&value), None).unwrap()));
    });
}

criterion_group!(benches, bench_encapsulate, bench_revive, bench_plain_passthrough);
criterion_main!(benches);
