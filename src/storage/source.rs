//! Record sources that pages are fetched from.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::models::Stats;

/// Records returned by a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse<T> {
    pub records: Vec<T>,
    /// Updated statistics, applied together with the records.
    pub stats: Option<Stats>,
}

impl<T> FetchResponse<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            stats: None,
        }
    }

    pub fn with_stats(mut self, stats: Stats) -> Self {
        self.stats = Some(stats);
        self
    }
}

impl<T> From<Vec<T>> for FetchResponse<T> {
    fn from(records: Vec<T>) -> Self {
        Self::new(records)
    }
}

/// Trait for the backend a dataset loads pages from.
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    type Record: Send + Sync + 'static;
    type Error: Send + Sync + 'static;

    /// Fetches the records of page `offset`.
    async fn fetch(
        &self,
        offset: usize,
        page_size: usize,
        stats: Stats,
    ) -> Result<FetchResponse<Self::Record>, Self::Error>;

    /// Releases whatever the source holds for a page that was unloaded while
    /// resolved. Called once per such page.
    fn unfetch(&self, _records: &[Self::Record], _offset: usize) {}
}

/// Errors produced by [`MemorySource`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("page {offset} is unavailable")]
    Unavailable { offset: usize },
}

/// In-memory record source.
///
/// Serves pages out of a vector, optionally after a delay, and keeps a lease
/// count per page offset: fetching a page takes a lease, unfetching it
/// returns the lease.
pub struct MemorySource<T> {
    records: Arc<Vec<T>>,
    latency: Duration,
    page_latency: DashMap<usize, Duration>,
    failing: DashSet<usize>,
    leases: DashMap<usize, usize>,
    fetches: AtomicU64,
    report_stats: bool,
}

impl<T> MemorySource<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records: Arc::new(records),
            latency: Duration::ZERO,
            page_latency: DashMap::new(),
            failing: DashSet::new(),
            leases: DashMap::new(),
            fetches: AtomicU64::new(0),
            report_stats: true,
        }
    }

    /// Delays every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Whether fetch responses carry the total page count.
    pub fn with_stats(mut self, report_stats: bool) -> Self {
        self.report_stats = report_stats;
        self
    }

    /// Overrides the delay for one page.
    pub fn set_page_latency(&self, offset: usize, latency: Duration) {
        self.page_latency.insert(offset, latency);
    }

    /// Makes fetches of page `offset` fail until [`recover_page`] is called.
    ///
    /// [`recover_page`]: MemorySource::recover_page
    pub fn fail_page(&self, offset: usize) {
        self.failing.insert(offset);
    }

    pub fn recover_page(&self, offset: usize) {
        self.failing.remove(&offset);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Leases currently held for page `offset`.
    pub fn leases(&self, offset: usize) -> usize {
        self.leases.get(&offset).map(|l| *l).unwrap_or(0)
    }

    /// Leases held across all pages.
    pub fn total_leases(&self) -> usize {
        self.leases.iter().map(|entry| *entry.value()).sum()
    }

    fn total_pages(&self, page_size: usize) -> usize {
        self.records.len().div_ceil(page_size)
    }

    fn latency_for(&self, offset: usize) -> Duration {
        self.page_latency
            .get(&offset)
            .map(|l| *l)
            .unwrap_or(self.latency)
    }
}

#[async_trait]
impl<T> PageSource for MemorySource<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Record = T;
    type Error = SourceError;

    async fn fetch(
        &self,
        offset: usize,
        page_size: usize,
        _stats: Stats,
    ) -> Result<FetchResponse<T>, SourceError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        let latency = self.latency_for(offset);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.failing.contains(&offset) {
            debug!(offset, "memory source failing page");
            return Err(SourceError::Unavailable { offset });
        }

        let start = offset.saturating_mul(page_size).min(self.records.len());
        let end = start.saturating_add(page_size).min(self.records.len());
        let records = self.records[start..end].to_vec();

        *self.leases.entry(offset).or_insert(0) += 1;

        let mut response = FetchResponse::new(records);
        if self.report_stats {
            response = response.with_stats(Stats::with_total_pages(self.total_pages(page_size)));
        }
        Ok(response)
    }

    fn unfetch(&self, _records: &[T], offset: usize) {
        let released = match self.leases.get_mut(&offset) {
            Some(mut leases) => {
                *leases = leases.saturating_sub(1);
                *leases == 0
            }
            None => false,
        };
        if released {
            self.leases.remove_if(&offset, |_, leases| *leases == 0);
        }
    }
}
