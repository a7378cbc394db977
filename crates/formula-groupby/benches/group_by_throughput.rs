use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use formula_groupby::{
    AggregateFunction, AggregateSpec, BinaryStorage, EngineConfig, GroupByEngine, GroupBySpec,
    RowMeta, StoredValue, Value, ValueMeta, ValueType, VecRowSink, VecRowSource,
};
use std::time::Duration;

fn bench_rows() -> usize {
    std::env::var("FORMULA_GROUPBY_BENCH_ROWS")
        .ok()
        .and_then(|v| v.replace('_', "").parse::<usize>().ok())
        .filter(|&v| (10_000..=5_000_000).contains(&v))
        .unwrap_or(250_000)
}

fn spec() -> GroupBySpec {
    GroupBySpec::new(
        vec!["Region".to_string()],
        vec![
            AggregateSpec::new("Amount", "Total", AggregateFunction::Sum),
            AggregateSpec::new("Amount", "Avg", AggregateFunction::Average),
            AggregateSpec::new("Amount", "Max", AggregateFunction::Max),
            AggregateSpec::new("Customer", "Customers", AggregateFunction::CountDistinct),
            AggregateSpec::count_rows("Rows"),
        ],
    )
}

fn normal_rows(rows: usize, groups: usize) -> (RowMeta, Vec<Vec<StoredValue>>) {
    let meta = RowMeta::new(vec![
        ValueMeta::new("Region", ValueType::String),
        ValueMeta::new("Customer", ValueType::Integer),
        ValueMeta::new("Amount", ValueType::Integer),
    ]);
    let regions: Vec<Value> = (0..groups).map(|g| Value::from(format!("R{g}"))).collect();
    let data = (0..rows)
        .map(|i| {
            vec![
                StoredValue::Normal(regions[i % groups].clone()),
                StoredValue::Normal(Value::Integer((i % 1_000) as i64)),
                StoredValue::Normal(Value::Integer((i % 100) as i64)),
            ]
        })
        .collect();
    (meta, data)
}

// Same shape as `normal_rows`, but every cell arrives as raw bytes that must be decoded.
fn binary_rows(rows: usize, groups: usize) -> (RowMeta, Vec<Vec<StoredValue>>) {
    let meta = RowMeta::new(vec![
        ValueMeta::new("Region", ValueType::String).with_binary_storage(BinaryStorage::default()),
        ValueMeta::new("Customer", ValueType::Integer)
            .with_binary_storage(BinaryStorage::default()),
        ValueMeta::new("Amount", ValueType::Integer).with_binary_storage(BinaryStorage::default()),
    ]);
    let data = (0..rows)
        .map(|i| {
            vec![
                StoredValue::binary(format!("R{}", i % groups)),
                StoredValue::binary((i % 1_000).to_string()),
                StoredValue::binary((i % 100).to_string()),
            ]
        })
        .collect();
    (meta, data)
}

fn run(meta: &RowMeta, rows: &[Vec<StoredValue>]) -> usize {
    let mut engine = GroupByEngine::new(&spec(), meta.clone(), EngineConfig::default()).unwrap();
    let mut source = VecRowSource::new(rows.to_vec());
    let mut sink = VecRowSink::default();
    let mut errors = Vec::new();
    engine.run(&mut source, &mut sink, &mut errors).unwrap();
    sink.rows.len()
}

fn bench_group_by(c: &mut Criterion) {
    let rows = bench_rows();

    let mut group = c.benchmark_group("group_by_throughput");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));
    group.throughput(Throughput::Elements(rows as u64));

    for groups in [10usize, 10_000] {
        let (meta, data) = normal_rows(rows, groups);
        group.bench_with_input(BenchmarkId::new("normal", groups), &groups, |b, _| {
            b.iter(|| black_box(run(&meta, &data)))
        });

        let (meta, data) = binary_rows(rows, groups);
        group.bench_with_input(BenchmarkId::new("binary_string", groups), &groups, |b, _| {
            b.iter(|| black_box(run(&meta, &data)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_group_by);
criterion_main!(benches);
