//! Property tests for version monotonicity and content-hash dedup.

use std::sync::Arc;

use arctic_rs::backend::{Backend, LibraryDescriptor, LibraryKind, MemoryBackend};
use arctic_rs::config::{ChunkingConfig, PruneConfig};
use arctic_rs::ids::LibraryName;
use arctic_rs::table::{ColumnData, VecTable};
use arctic_rs::version_store::VersionStoreLibrary;
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

async fn make_library() -> VersionStoreLibrary {
    let backend: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
    let name = LibraryName::new("props").unwrap();
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
}

fn table_for_day(day: i64, price: f64) -> VecTable {
    let index = vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)];
    VecTable::new(index, vec![("price".to_string(), ColumnData::F64(vec![price]))], chrono_tz::Tz::UTC).unwrap()
}

proptest! {
    #[test]
    fn versions_are_strictly_increasing(prices in prop::collection::vec(any::<u16>().prop_map(|p| p as f64), 1..12)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let lib = make_library().await;
            let mut previous = 0u64;
            for (day, price) in prices.into_iter().enumerate() {
                let version = lib.write("SYM", &table_for_day(day as i64, price)).await.unwrap();
                prop_assert!(version > previous);
                previous = version;
            }
            Ok(())
        })?;
    }

    #[test]
    fn identical_table_bytes_dedup_to_the_same_segment_hash(price in any::<u16>().prop_map(|p| p as f64)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let lib = make_library().await;
            lib.write("A", &table_for_day(0, price)).await.unwrap();
            lib.write("B", &table_for_day(0, price)).await.unwrap();

            let (_, a) = lib.read("A", arctic_rs::version_store::AsOf::Latest).await.unwrap();
            let (_, b) = lib.read("B", arctic_rs::version_store::AsOf::Latest).await.unwrap();
            prop_assert_eq!(a, b);
            Ok(())
        })?;
    }
}
