use arctic_rs::chunking;
use arctic_rs::table::{ColumnData, VecTable};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn make_table(rows: usize) -> VecTable {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let index = (0..rows).map(|i| start + Duration::seconds(i as i64)).collect();
    let price = (0..rows).map(|i| i as f64 * 1.0001).collect();
    VecTable::new(index, vec![("price".to_string(), ColumnData::F64(price))], chrono_tz::Tz::UTC).unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking_encode");
    for &rows in &[1_000usize, 10_000, 100_000] {
        let table = make_table(rows);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &table, |b, table| {
            b.iter(|| black_box(chunking::encode("AAPL", table, 2 * 1024 * 1024).unwrap()));
        });
    }
    group.finish();
}

fn bench_round_trip(c: &mut Criterion) {
    let table = make_table(50_000);
    let (descriptor, segments) = chunking::encode("AAPL", &table, 2 * 1024 * 1024).unwrap();
    c.bench_function("chunking_decode_50k_rows", |b| {
        b.iter(|| black_box(chunking::decode(&descriptor, &segments).unwrap()));
    });
}

criterion_group!(benches, bench_encode, bench_round_trip);
criterion_main!(benches);
