use std::sync::Arc;

use arctic_rs::backend::{Backend, LibraryDescriptor, LibraryKind, MemoryBackend};
use arctic_rs::config::{ChunkingConfig, PruneConfig};
use arctic_rs::ids::LibraryName;
use arctic_rs::table::{ColumnData, VecTable};
use arctic_rs::version_store::VersionStoreLibrary;
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;

fn make_table(rows: usize) -> VecTable {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let index = (0..rows).map(|i| start + Duration::seconds(i as i64)).collect();
    let price = (0..rows).map(|i| i as f64).collect();
    VecTable::new(index, vec![("price".to_string(), ColumnData::F64(price))], chrono_tz::Tz::UTC).unwrap()
}

fn bench_write(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let library: VersionStoreLibrary = rt.block_on(async {
        let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        let name = LibraryName::new("bench").unwrap();
        backend
            .create_library(LibraryDescriptor {
                name: name.clone(),
                kind: LibraryKind::VersionStore,
                quota_bytes: None,
                last_sampled_bytes: None,
                last_sampled_at: None,
            })
            .await
            .unwrap();
        VersionStoreLibrary::new(backend, name, ChunkingConfig::default(), PruneConfig::default())
    });

    let table = make_table(10_000);
    c.bench_function("version_store_write_10k_rows", |b| {
        b.iter(|| {
            rt.block_on(async { black_box(library.write("AAPL", &table).await.unwrap()) });
        });
    });
}

criterion_group!(benches, bench_write);
criterion_main!(benches);
