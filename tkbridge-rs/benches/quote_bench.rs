use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tkbridge::quote::{array_to_list, compose, enclose_str};
use tkbridge::Value;

fn make_args(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| match i % 4 {
            0 => Value::from(format!(".w{i}")),
            1 => Value::from("a label with spaces"),
            2 => Value::Int(i as i64),
            _ => Value::Float(i as f64 / 3.0),
        })
        .collect()
}

fn bench_quote(c: &mut Criterion) {
    let small = make_args(8);
    let large = make_args(512);
    let items: Vec<String> = (0..256).map(|i| format!("item {i}")).collect();

    let mut g = c.benchmark_group("quote");

    g.bench_function("enclose_word", |b| b.iter(|| enclose_str(black_box(".frame.button"))));
    g.bench_function("enclose_text", |b| {
        b.iter(|| enclose_str(black_box("some text with several words in it")))
    });
    g.bench_function("compose_small", |b| b.iter(|| compose(black_box(&small))));
    g.bench_function("compose_large", |b| b.iter(|| compose(black_box(&large))));
    g.bench_function("array_to_list_256", |b| b.iter(|| array_to_list(black_box(&items))));

    g.finish();
}

criterion_group!(benches, bench_quote);
criterion_main!(benches);
