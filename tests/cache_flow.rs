//! End-to-end cache flow: local source, disk substrate, in-memory metadata.
//!
//! These tests drive the full admission and eviction paths the way an
//! embedding server would: enqueue requests against the facade and observe
//! outcomes through the metadata store and the substrate.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use tricache::config::CacheConfig;
use tricache::holder::{BlobHolder, DiskHolder};
use tricache::manager::CacheManager;
use tricache::metadata::{FileState, MemoryStore};
use tricache::source::LocalSource;

fn fast_config() -> CacheConfig {
    CacheConfig::default()
        .with_local_mode(true)
        .with_tick_interval(Duration::from_millis(20))
        .with_purge_grace(Duration::from_millis(50))
}

fn write_source_artifact(dir: &Path, name: &str, data: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path.to_str().unwrap().to_string()
}

/// Poll until `predicate` holds or the deadline passes.
async fn wait_for(what: &str, predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !predicate() {
        assert!(Instant::now() < deadline, "timed out waiting for: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

struct Fixture {
    _source_dir: TempDir,
    _substrate_dir: TempDir,
    source_path: std::path::PathBuf,
    holder: Arc<DiskHolder>,
    store: Arc<MemoryStore>,
    manager: CacheManager<LocalSource, DiskHolder, MemoryStore>,
}

fn fixture(capacity: u64, config: CacheConfig) -> Fixture {
    let source_dir = TempDir::new().unwrap();
    let substrate_dir = TempDir::new().unwrap();
    let holder = Arc::new(DiskHolder::new(substrate_dir.path().to_path_buf(), capacity).unwrap());
    let store = Arc::new(MemoryStore::new());
    let manager = CacheManager::new(
        LocalSource::new(),
        Arc::clone(&holder),
        Arc::clone(&store),
        config,
    );
    let source_path = source_dir.path().to_path_buf();
    Fixture {
        _source_dir: source_dir,
        _substrate_dir: substrate_dir,
        source_path,
        holder,
        store,
        manager,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn admission_makes_artifact_resident() {
    let fx = fixture(1_000_000, fast_config());
    let location = write_source_artifact(&fx.source_path, "artifact_a", &[7u8; 1024]);

    fx.manager.enqueue_write("a", &location);

    wait_for("record sealed", || {
        fx.store.get("a").map(|r| r.state) == Some(FileState::Ready)
    })
    .await;

    let record = fx.store.get("a").unwrap();
    assert_eq!(record.size, Some(1024));
    assert!(record.token.is_some());

    // The bytes round-trip through the substrate.
    let data = fx.holder.read_blob("a").await.unwrap();
    assert_eq!(data, vec![7u8; 1024]);
    assert_eq!(fx.holder.used_bytes(), 1024);

    fx.manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_artifact_is_never_admitted() {
    let fx = fixture(1_000_000, fast_config());
    let location = fx.source_path.join("does_not_exist");

    fx.manager.enqueue_write("ghost", location.to_str().unwrap());
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(fx.store.get("ghost").is_none());
    assert_eq!(fx.holder.resident_count(), 0);

    fx.manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_artifact_is_never_admitted() {
    let fx = fixture(1_000_000, fast_config().with_max_object_size(100));
    let location = write_source_artifact(&fx.source_path, "big", &[0u8; 500]);

    fx.manager.enqueue_write("big", &location);
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(fx.store.get("big").is_none());
    assert_eq!(fx.holder.resident_count(), 0);

    fx.manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn cache_pressure_evicts_and_admits_on_retry() {
    // Substrate fits one artifact but not both.
    let fx = fixture(100, fast_config());
    let loc_a = write_source_artifact(&fx.source_path, "a", &[1u8; 80]);
    let loc_b = write_source_artifact(&fx.source_path, "b", &[2u8; 50]);

    fx.manager.enqueue_write("a", &loc_a);
    wait_for("first artifact resident", || {
        fx.store.get("a").map(|r| r.state) == Some(FileState::Ready)
    })
    .await;

    // The second admission hits the capacity ceiling: its pending row is
    // rolled back, and the first artifact is evicted.
    fx.manager.enqueue_write("b", &loc_b);
    wait_for("first artifact's metadata deleted", || {
        fx.store.get("a").is_none()
    })
    .await;
    assert!(fx.store.get("b").is_none());

    // After the grace window the bytes are reclaimed.
    wait_for("first artifact's bytes purged", || {
        fx.holder.used_bytes() == 0
    })
    .await;

    // A retry now finds room.
    fx.manager.enqueue_write("b", &loc_b);
    wait_for("second artifact resident", || {
        fx.store.get("b").map(|r| r.state) == Some(FileState::Ready)
    })
    .await;
    assert_eq!(fx.holder.used_bytes(), 50);
    assert_eq!(fx.holder.read_blob("b").await.unwrap(), vec![2u8; 50]);

    fx.manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn eviction_picks_least_recently_used() {
    let fx = fixture(1_000_000, fast_config());
    for (fid, name) in [("a", "fa"), ("b", "fb"), ("c", "fc")] {
        let location = write_source_artifact(&fx.source_path, name, &[0u8; 10]);
        fx.manager.enqueue_write(fid, &location);
        wait_for("artifact resident", || {
            fx.store.get(fid).map(|r| r.state) == Some(FileState::Ready)
        })
        .await;
    }

    // Touch "a" so "b" becomes the tail.
    fx.holder.read_blob("a").await.unwrap();

    fx.manager.enqueue_eviction().await;

    assert!(fx.store.get("b").is_none());
    assert!(fx.store.get("a").is_some());
    assert!(fx.store.get("c").is_some());

    wait_for("tail bytes purged", || fx.holder.used_bytes() == 20).await;

    fx.manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_requests_admit_once() {
    let fx = fixture(1_000_000, fast_config());
    let location = write_source_artifact(&fx.source_path, "artifact", &[3u8; 40]);

    for _ in 0..5 {
        fx.manager.enqueue_write("dup", &location);
    }

    wait_for("record sealed", || {
        fx.store.get("dup").map(|r| r.state) == Some(FileState::Ready)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(fx.holder.resident_count(), 1);
    assert_eq!(fx.holder.used_bytes(), 40);

    fx.manager.shutdown().await;
}
