use criterion::{black_box, criterion_group, criterion_main, Criterion};
use livecast_collab::protocol::{
    HubMethod, Invocation, SessionId, UpdateSessionContentRequest,
};
use livecast_collab::{OperationBuilder, TextChange};

fn document(lines: usize) -> Vec<String> {
    (0..lines).map(|i| format!("    let value_{i} = compute({i});")).collect()
}

fn bench_replace_single_line(c: &mut Criterion) {
    let doc = document(1_000);
    let changes = [TextChange::new(500, 500, "    let value_500 = compute(501);")];

    c.bench_function("replace_single_line", |b| {
        b.iter(|| {
            let ops = OperationBuilder::from_replace(black_box(&changes), |i| doc.get(i).cloned());
            black_box(ops);
        })
    });
}

fn bench_replace_batch(c: &mut Criterion) {
    let doc = document(1_000);
    // Multi-cursor edit touching 100 lines at once
    let changes: Vec<TextChange> = (0..100)
        .map(|i| TextChange::new(i * 10, i * 10, doc[i * 10].clone()))
        .collect();

    c.bench_function("replace_batch_100", |b| {
        b.iter(|| {
            let ops = OperationBuilder::from_replace(black_box(&changes), |i| doc.get(i).cloned());
            black_box(ops);
        })
    });
}

fn bench_replace_paste(c: &mut Criterion) {
    let doc = document(1_000);
    let pasted = doc[100..300].join("\n");
    let changes = [TextChange::new(100, 101, pasted)];

    c.bench_function("replace_paste_200_lines", |b| {
        b.iter(|| {
            let ops = OperationBuilder::from_replace(black_box(&changes), |i| doc.get(i).cloned());
            black_box(ops);
        })
    });
}

fn bench_full_resync(c: &mut Criterion) {
    let text = document(10_000).join("\n");

    c.bench_function("full_resync_10k_lines", |b| {
        b.iter(|| {
            black_box(OperationBuilder::from_full_resync(black_box(Some(&text))));
        })
    });
}

fn bench_encode_content_call(c: &mut Criterion) {
    let doc = document(1_000);
    let changes: Vec<TextChange> = (0..20)
        .map(|i| TextChange::new(i, i, doc[i].clone()))
        .collect();
    let request = UpdateSessionContentRequest {
        id: SessionId::new("bench-session"),
        data: OperationBuilder::from_replace(&changes, |i| doc.get(i).cloned()),
    };

    c.bench_function("encode_content_call_20_ops", |b| {
        b.iter(|| {
            let invocation =
                Invocation::new(1, HubMethod::UpdateSessionContent, black_box(&request)).unwrap();
            let frame = serde_json::to_string(&invocation.to_frame("broadcast")).unwrap();
            black_box(frame);
        })
    });
}

criterion_group!(
    benches,
    bench_replace_single_line,
    bench_replace_batch,
    bench_replace_paste,
    bench_full_resync,
    bench_encode_content_call,
);
criterion_main!(benches);
