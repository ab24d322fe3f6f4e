//! Common test utilities.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use dataset_rs::{DatasetConfig, FetchResponse, PageSource, PageStore, Stats};

pub type TestStore = PageStore<u32, String>;

/// Creates an empty store for the given configuration.
pub fn store(config: DatasetConfig) -> TestStore {
    PageStore::new(&config).unwrap()
}

/// Records of page `offset`: consecutive integers starting at `offset * page_size`.
pub fn create_records(page_size: usize, offset: usize) -> Vec<u32> {
    let start = offset * page_size;
    (start..start + page_size).map(|n| n as u32).collect()
}

/// Marks every unrequested page in the load window as pending.
pub fn fetch_all(mut store: TestStore) -> TestStore {
    for page in store.unrequested() {
        store = store.fetch(page.page_ref());
    }
    store
}

/// Resolves every pending page with its full set of records.
pub fn resolve_all(mut store: TestStore) -> TestStore {
    for page in store.pending() {
        let records = create_records(store.page_size(), page.offset());
        store = store.resolve(records, page.page_ref(), None);
    }
    store
}

/// Page counts by status.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Expected {
    pub unrequested: usize,
    pub pending: usize,
    pub resolved: usize,
    pub rejected: usize,
}

pub fn assert_pages(store: &TestStore, expected: Expected) {
    let actual = Expected {
        unrequested: store.unrequested().len(),
        pending: store.pending().len(),
        resolved: store.resolved().len(),
        rejected: store.rejected().len(),
    };
    assert_eq!(actual, expected);
    assert_eq!(
        store.requested().len(),
        expected.pending + expected.resolved + expected.rejected
    );
}

/// Checks that page offsets form one gap-free run.
pub fn assert_contiguous(store: &TestStore) {
    let offsets: Vec<usize> = store.pages().iter().map(|p| p.offset()).collect();
    for pair in offsets.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "pages not contiguous: {:?}", offsets);
    }
}

/// Source whose fetches wait until the test releases them.
///
/// The n-th fetch call waits for `release(n)` and returns records tagged
/// with `n * 1000`, so a test can tell which call produced a page.
pub struct GatedSource {
    calls: AtomicUsize,
    gates: Vec<Semaphore>,
    unfetched: AtomicUsize,
}

impl GatedSource {
    pub fn new(max_calls: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            gates: (0..max_calls).map(|_| Semaphore::new(0)).collect(),
            unfetched: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, call: usize) {
        self.gates[call].add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn unfetched(&self) -> usize {
        self.unfetched.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageSource for GatedSource {
    type Record = u32;
    type Error = String;

    async fn fetch(
        &self,
        offset: usize,
        page_size: usize,
        _stats: Stats,
    ) -> Result<FetchResponse<u32>, String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let permit = self.gates[call]
            .acquire()
            .await
            .map_err(|e| e.to_string())?;
        permit.forget();
        let records = create_records(page_size, offset)
            .into_iter()
            .map(|n| n + (call as u32) * 1000)
            .collect();
        Ok(FetchResponse::new(records))
    }

    fn unfetch(&self, _records: &[u32], _offset: usize) {
        self.unfetched.fetch_add(1, Ordering::SeqCst);
    }
}

/// Waits until `source` has seen at least `calls` fetches.
pub async fn wait_for_calls(source: &GatedSource, calls: usize) {
    while source.calls() < calls {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
