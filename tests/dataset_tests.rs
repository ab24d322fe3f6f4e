//! Dataset controller tests.

mod common;

use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{wait_for_calls, GatedSource};
use dataset_rs::{
    Dataset, DatasetConfig, DatasetError, ErrorCode, Filter, MemorySource, PageSource,
    PageStore, SourceError, StoreSummary,
};

fn memory_source(count: u32) -> MemorySource<u32> {
    MemorySource::new((0..count).collect())
}

fn build_error<S: PageSource>(result: Result<Dataset<S>, DatasetError>) -> DatasetError {
    match result {
        Ok(_) => panic!("dataset built without error"),
        Err(err) => err,
    }
}

async fn wait_until<S, F>(dataset: &Dataset<S>, cond: F)
where
    S: PageSource,
    F: Fn(&PageStore<S::Record, S::Error>) -> bool,
{
    while !cond(&dataset.snapshot()) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn test_builder_requires_source() {
    let err = build_error(Dataset::<MemorySource<u32>>::builder().page_size(10).build());
    assert_eq!(err.code, ErrorCode::MissingSource);
    assert!(err.message.contains("without fetch()"));
}

#[tokio::test]
async fn test_builder_validates_config_first() {
    let err = build_error(Dataset::builder().source(memory_source(10)).build());
    assert_eq!(err.code, ErrorCode::MissingPageSize);

    let err = build_error(
        Dataset::builder()
            .source(memory_source(10))
            .page_size(10)
            .load_horizon(30)
            .unload_horizon(20)
            .build(),
    );
    assert_eq!(err.code, ErrorCode::InvalidHorizon);
    assert!(err.code.is_fatal());
}

#[test]
fn test_builder_requires_runtime() {
    let err = build_error(Dataset::new(memory_source(10), DatasetConfig::new(10)));
    assert_eq!(err.code, ErrorCode::NoRuntime);
    assert!(!err.code.is_fatal());
}

#[test]
fn test_driven_from_outside_runtime() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dataset = {
        let _guard = runtime.enter();
        Dataset::new(memory_source(100), DatasetConfig::new(10)).unwrap()
    };

    dataset.set_read_offset(20);
    runtime.block_on(dataset.idle());
    assert_eq!(dataset.get_record(20).unwrap().content(), Some(&20));
}

#[tokio::test]
async fn test_loads_pages_around_read_offset() {
    let config = DatasetConfig::new(10).load_horizon(20);
    let dataset = Dataset::new(memory_source(100), config).unwrap();

    dataset.set_read_offset(35);
    assert_eq!(dataset.in_flight(), 5);
    dataset.idle().await;
    assert_eq!(dataset.in_flight(), 0);

    let snapshot = dataset.snapshot();
    let offsets: Vec<usize> = snapshot.resolved().iter().map(|p| p.offset()).collect();
    assert_eq!(offsets, vec![1, 2, 3, 4, 5]);
    assert!(snapshot.is_resolved());
    assert_eq!(snapshot.stats().total_pages, Some(10));
    assert_eq!(snapshot.total_pages(), 10);
    assert_eq!(snapshot.length(), 100);

    assert_eq!(dataset.get_record(35).unwrap().content(), Some(&35));
    assert_eq!(dataset.get_record(5).unwrap().content(), None);
    assert_eq!(dataset.source().fetch_count(), 5);
    assert_eq!(dataset.source().leases(3), 1);
    assert_eq!(dataset.source().total_leases(), 5);
}

#[tokio::test]
async fn test_observer_receives_snapshots() {
    let seen: Arc<Mutex<Vec<StoreSummary>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let dataset = Dataset::builder()
        .source(memory_source(100))
        .page_size(10)
        .observe(move |store: &PageStore<u32, SourceError>| sink.lock().push(store.summary()))
        .build()
        .unwrap();

    dataset.set_read_offset(0);
    // Same offset again publishes nothing.
    dataset.set_read_offset(0);
    assert_eq!(seen.lock().len(), 1);

    dataset.idle().await;
    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].pending, 1);
    assert_eq!(seen[0].unrequested, 0);
    assert_eq!(seen[1].resolved, 1);
    assert_eq!(seen[1].read_offset, Some(0));
}

#[tokio::test]
async fn test_unloaded_pages_are_released() {
    let config = DatasetConfig::new(10).unload_horizon(10);
    let dataset = Dataset::new(memory_source(100), config).unwrap();

    dataset.set_read_offset(0);
    dataset.idle().await;
    assert_eq!(dataset.source().leases(0), 1);

    dataset.set_read_offset(55);
    assert_eq!(dataset.source().leases(0), 0);
    assert!(dataset.snapshot().unfetchable().is_empty());

    dataset.idle().await;
    let snapshot = dataset.snapshot();
    let offsets: Vec<usize> = snapshot.pages().iter().map(|p| p.offset()).collect();
    assert_eq!(offsets, vec![4, 5, 6]);
    assert_eq!(dataset.source().total_leases(), 3);
}

#[tokio::test]
async fn test_evicted_in_flight_page_returns_lease() {
    let source = memory_source(100).with_latency(Duration::from_millis(20));
    let config = DatasetConfig::new(10).unload_horizon(10);
    let dataset = Dataset::new(source, config).unwrap();

    dataset.set_read_offset(0);
    dataset.set_read_offset(55);
    dataset.idle().await;

    let snapshot = dataset.snapshot();
    let offsets: Vec<usize> = snapshot.pages().iter().map(|p| p.offset()).collect();
    assert_eq!(offsets, vec![4, 5, 6]);
    assert_eq!(dataset.source().fetch_count(), 4);
    assert_eq!(dataset.source().leases(0), 0);
    assert_eq!(dataset.source().total_leases(), 3);
}

#[tokio::test]
async fn test_reloaded_in_flight_page_returns_lease() {
    let source = memory_source(100).with_latency(Duration::from_millis(20));
    let dataset = Dataset::new(source, DatasetConfig::new(10)).unwrap();

    dataset.set_read_offset(0);
    dataset.reload(0);
    dataset.idle().await;

    assert!(dataset.snapshot().is_resolved());
    assert_eq!(dataset.source().fetch_count(), 2);
    assert_eq!(dataset.source().leases(0), 1);
}

#[tokio::test]
async fn test_failed_fetch_rejects_page() {
    let source = memory_source(100);
    source.fail_page(0);
    let dataset = Dataset::new(source, DatasetConfig::new(10)).unwrap();

    dataset.set_read_offset(0);
    dataset.idle().await;

    let snapshot = dataset.snapshot();
    assert!(snapshot.is_rejected());
    assert_eq!(
        snapshot.get(0).error(),
        Some(&SourceError::Unavailable { offset: 0 })
    );
    assert_eq!(snapshot.length(), 0);
    assert!(snapshot.get_record(0).is_none());

    dataset.source().recover_page(0);
    dataset.reload(0);
    dataset.idle().await;

    let snapshot = dataset.snapshot();
    assert!(snapshot.is_resolved());
    assert_eq!(snapshot.get_record(0).unwrap().content(), Some(&0));
    assert_eq!(dataset.source().fetch_count(), 2);
}

#[tokio::test]
async fn test_pages_resolve_in_any_order() {
    let source = memory_source(100).with_latency(Duration::from_millis(1));
    source.set_page_latency(0, Duration::from_millis(30));
    let config = DatasetConfig::new(10).load_horizon(30);
    let dataset = Dataset::new(source, config).unwrap();

    dataset.set_read_offset(0);
    wait_until(&dataset, |s| s.get(1).is_resolved() && s.get(2).is_resolved()).await;
    assert!(dataset.snapshot().get(0).is_pending());

    dataset.idle().await;
    let snapshot = dataset.snapshot();
    assert!(snapshot.is_resolved());
    assert_eq!(snapshot.get_record(0).unwrap().content(), Some(&0));
    assert_eq!(snapshot.get_record(29).unwrap().content(), Some(&29));
}

#[tokio::test]
async fn test_reload_releases_resolved_pages() {
    let dataset = Dataset::new(memory_source(100), DatasetConfig::new(10)).unwrap();
    dataset.set_read_offset(0);
    dataset.idle().await;
    let before = dataset.snapshot().get(0);

    dataset.reload(0);
    assert_eq!(dataset.source().leases(0), 0);
    dataset.idle().await;

    let after = dataset.snapshot().get(0);
    assert!(after.is_resolved());
    assert_ne!(after, before);
    assert_eq!(dataset.source().leases(0), 1);
}

#[tokio::test]
async fn test_late_response_after_newer_one_is_dropped() {
    let dataset = Dataset::new(GatedSource::new(2), DatasetConfig::new(10)).unwrap();

    dataset.set_read_offset(0);
    wait_for_calls(dataset.source(), 1).await;
    dataset.reload(0);
    wait_for_calls(dataset.source(), 2).await;

    dataset.source().release(1);
    wait_until(&dataset, |s| s.is_resolved()).await;
    assert_eq!(dataset.get_record(0).unwrap().content(), Some(&1000));

    dataset.source().release(0);
    dataset.idle().await;
    assert_eq!(dataset.get_record(0).unwrap().content(), Some(&1000));
    // The dropped response is handed back to the source.
    assert_eq!(dataset.source().unfetched(), 1);
}

#[tokio::test]
async fn test_superseded_response_arriving_first_is_dropped() {
    let dataset = Dataset::new(GatedSource::new(2), DatasetConfig::new(10)).unwrap();

    dataset.set_read_offset(0);
    wait_for_calls(dataset.source(), 1).await;
    dataset.reload(0);
    wait_for_calls(dataset.source(), 2).await;

    dataset.source().release(0);
    while dataset.in_flight() > 1 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(dataset.snapshot().is_pending());

    dataset.source().release(1);
    dataset.idle().await;
    assert_eq!(dataset.get_record(9).unwrap().content(), Some(&1009));
}

#[tokio::test]
async fn test_response_for_evicted_page_is_dropped() {
    let config = DatasetConfig::new(10).unload_horizon(10);
    let dataset = Dataset::new(GatedSource::new(4), config).unwrap();

    dataset.set_read_offset(0);
    wait_for_calls(dataset.source(), 1).await;
    dataset.set_read_offset(55);
    wait_for_calls(dataset.source(), 4).await;

    for call in 0..4 {
        dataset.source().release(call);
    }
    dataset.idle().await;

    let snapshot = dataset.snapshot();
    let offsets: Vec<usize> = snapshot.resolved().iter().map(|p| p.offset()).collect();
    assert_eq!(offsets, vec![4, 5, 6]);
    assert_eq!(snapshot.pages().len(), 3);
    assert_eq!(dataset.source().unfetched(), 1);
}

#[tokio::test]
async fn test_set_filter_refilters_without_fetching() {
    let config = DatasetConfig::new(10).load_horizon(20);
    let dataset = Dataset::new(memory_source(20), config).unwrap();
    dataset.set_read_offset(0);
    dataset.idle().await;
    assert_eq!(dataset.snapshot().length(), 20);

    let even: Filter<u32> = Arc::new(|n: &u32| n % 2 == 0);
    dataset.set_filter(Some(even));
    assert_eq!(dataset.in_flight(), 0);

    let snapshot = dataset.snapshot();
    assert_eq!(snapshot.length(), 10);
    assert_eq!(snapshot.get_record(1).unwrap().content(), Some(&2));
    assert_eq!(snapshot.get_record(5).unwrap().content(), Some(&10));

    dataset.set_filter(None);
    assert_eq!(dataset.snapshot().length(), 20);
    assert_eq!(dataset.source().fetch_count(), 2);
}

#[tokio::test]
async fn test_refilter_picks_up_filter_state() {
    let threshold = Arc::new(AtomicUsize::new(0));
    let limit = Arc::clone(&threshold);
    let dataset = Dataset::builder()
        .source(memory_source(100))
        .page_size(10)
        .load_horizon(20)
        .filter(move |n: &u32| (*n as usize) >= limit.load(Ordering::SeqCst))
        .build()
        .unwrap();

    dataset.set_read_offset(0);
    dataset.idle().await;
    assert_eq!(dataset.get_record(0).unwrap().content(), Some(&0));

    threshold.store(5, Ordering::SeqCst);
    dataset.refilter(None);
    assert_eq!(dataset.get_record(0).unwrap().content(), Some(&5));

    dataset.refilter(Some(40));
    dataset.idle().await;
    let snapshot = dataset.snapshot();
    assert_eq!(snapshot.read_offset(), Some(40));
    assert!(snapshot.is_resolved());
}

#[tokio::test]
async fn test_reset_abandons_pages() {
    let dataset = Dataset::new(memory_source(100), DatasetConfig::new(10)).unwrap();
    dataset.set_read_offset(0);
    dataset.idle().await;
    assert_eq!(dataset.source().leases(0), 1);

    dataset.reset(50);
    dataset.idle().await;

    let snapshot = dataset.snapshot();
    let offsets: Vec<usize> = snapshot.pages().iter().map(|p| p.offset()).collect();
    assert_eq!(offsets, vec![4, 5]);
    // Abandoned pages are never handed back to the source.
    assert_eq!(dataset.source().leases(0), 1);
    assert_eq!(dataset.source().total_leases(), 3);
}

#[tokio::test]
async fn test_clones_share_state() {
    let dataset = Dataset::new(memory_source(100), DatasetConfig::new(10)).unwrap();
    let other = dataset.clone();

    other.set_read_offset(20);
    dataset.idle().await;
    assert_eq!(dataset.snapshot().read_offset(), Some(20));
    assert_eq!(dataset.get_record(20).unwrap().content(), Some(&20));
}

#[tokio::test]
async fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"pageSize": 5, "loadHorizon": 10}}"#).unwrap();

    let config = DatasetConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.page_size, Some(5));
    let dataset = Dataset::new(memory_source(50), config).unwrap();

    dataset.set_read_offset(12);
    dataset.idle().await;
    let offsets: Vec<usize> = dataset
        .snapshot()
        .resolved()
        .iter()
        .map(|p| p.offset())
        .collect();
    assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_config_file_errors() {
    let dir = tempfile::tempdir().unwrap();

    let err = DatasetConfig::from_json_file(dir.path().join("missing.json")).unwrap_err();
    assert_eq!(err.code, ErrorCode::Io);

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ pageSize: ").unwrap();
    let err = DatasetConfig::from_json_file(&path).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidConfig);
}
