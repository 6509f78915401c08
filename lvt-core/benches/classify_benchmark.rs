use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use lvt_core::{detect_key_slot, Node};
use serde_json::{json, Value};

fn create_range_payload(count: usize) -> Value {
    let items: Vec<Value> = (0..count)
        .map(|i| json!({"0": format!("row-{i}"), "1": format!("Item {i}"), "2": i}))
        .collect();
    json!({
        "statics": ["<ul>", "</ul>"],
        "0": {
            "d": items,
            "s": ["<li data-key=\"", "\">", " (", ")</li>"]
        }
    })
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("Classification");

    for count in [10usize, 1_000] {
        let payload = create_range_payload(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("range_{count}_items"), |b| {
            b.iter(|| black_box(Node::from_value(black_box(payload.clone()))))
        });
    }

    let ops = json!([["r", "row-1"], ["u", "row-2", {"1": "x"}], ["a", [{"0": "row-x"}]], ["o", ["row-3", "row-2"]]]);
    group.throughput(Throughput::Elements(4));
    group.bench_function("ops_4", |b| b.iter(|| black_box(Node::from_value(black_box(ops.clone())))));

    group.finish();
}

fn bench_key_slot(c: &mut Criterion) {
    let statics: Vec<String> = ["<tr class=\"", "\" id=\"", "\" data-lvt-key=\"", "\"><td>", "</td></tr>"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    c.bench_function("detect_key_slot", |b| b.iter(|| black_box(detect_key_slot(black_box(&statics)))));
}

criterion_group!(benches, bench_classify, bench_key_slot);
criterion_main!(benches);
