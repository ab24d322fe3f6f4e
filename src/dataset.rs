//! Dataset controller.
//!
//! A [`Dataset`] owns the current [`PageStore`] snapshot and a [`PageSource`].
//! Every operation computes the next snapshot, starts fetches for pages that
//! entered the load window, releases pages that were unloaded while resolved
//! and hands the new snapshot to the observer.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::DatasetConfig;
use crate::error::{DatasetError, DatasetResult, ErrorCode};
use crate::models::{Filter, PageRef, Record, Stats};
use crate::storage::{FetchResponse, PageSource, PageStore};

/// Store snapshot type for a given source.
pub type Snapshot<S> = PageStore<<S as PageSource>::Record, <S as PageSource>::Error>;

/// Callback receiving every published snapshot.
///
/// Runs while the dataset's state lock is held; it must not call back into
/// the dataset.
pub type Observer<T, E> = Box<dyn Fn(&PageStore<T, E>) + Send + Sync>;

struct Shared<S: PageSource> {
    source: S,
    runtime: Handle,
    state: Mutex<Snapshot<S>>,
    observer: Option<Observer<S::Record, S::Error>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Decrements the in-flight counter when a fetch task ends, however it ends.
struct InFlight<S: PageSource>(Arc<Shared<S>>);

impl<S: PageSource> Drop for InFlight<S> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl<S: PageSource> Shared<S> {
    /// Applies `op` to the current snapshot and publishes the result.
    ///
    /// `op` returning `None` leaves the snapshot as it is and publishes nothing.
    fn transition(self: &Arc<Self>, op: impl FnOnce(&Snapshot<S>) -> Option<Snapshot<S>>) {
        let mut state = self.state.lock();
        let Some(mut next) = op(&*state) else {
            return;
        };

        let mut requests = Vec::new();
        for page in next.unrequested() {
            next = next.fetch(page.page_ref());
            requests.push(next.get(page.offset()).page_ref());
        }

        for page in next.unfetchable().to_vec() {
            if let Some(records) = page.unfiltered() {
                self.source.unfetch(records, page.offset());
            }
            next = next.unfetch(page.page_ref());
        }

        *state = next;
        if let Some(observer) = &self.observer {
            observer(&*state);
        }

        let page_size = state.page_size();
        let stats = state.stats();
        drop(state);

        for page_ref in requests {
            self.spawn_fetch(page_ref, page_size, stats);
        }
    }

    fn spawn_fetch(self: &Arc<Self>, page_ref: PageRef, page_size: usize, stats: Stats) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let guard = InFlight(Arc::clone(self));
        self.runtime.spawn(async move {
            let shared = Arc::clone(&guard.0);
            debug!(offset = page_ref.offset, "fetching page");
            let result = shared
                .source
                .fetch(page_ref.offset, page_size, stats)
                .await;
            shared.settle(page_ref, result);
            drop(guard);
        });
    }

    fn settle(
        self: &Arc<Self>,
        page_ref: PageRef,
        result: Result<FetchResponse<S::Record>, S::Error>,
    ) {
        self.transition(|store| {
            if !store.contains(page_ref) {
                debug!(offset = page_ref.offset, "discarding superseded fetch");
                if let Ok(response) = &result {
                    self.source.unfetch(&response.records, page_ref.offset);
                }
                return None;
            }
            Some(match result {
                Ok(response) => store.resolve(response.records, page_ref, response.stats),
                Err(error) => {
                    warn!(offset = page_ref.offset, "page fetch failed");
                    store.reject(error, page_ref, None)
                }
            })
        });
    }
}

/// Windowed, incrementally loaded view over a [`PageSource`].
///
/// Fetches run on the tokio runtime that was current when the dataset was
/// built, so the dataset can be driven from threads outside that runtime.
pub struct Dataset<S: PageSource> {
    shared: Arc<Shared<S>>,
}

impl<S: PageSource> Clone for Dataset<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: PageSource> Dataset<S> {
    /// Creates a dataset over `source` with no filter and no observer.
    pub fn new(source: S, config: DatasetConfig) -> DatasetResult<Self> {
        DatasetBuilder::new().config(config).source(source).build()
    }

    pub fn builder() -> DatasetBuilder<S> {
        DatasetBuilder::new()
    }

    pub fn source(&self) -> &S {
        &self.shared.source
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Snapshot<S> {
        self.shared.state.lock().clone()
    }

    pub fn get_record(&self, index: usize) -> Option<Record<S::Record, S::Error>> {
        self.shared.state.lock().get_record(index)
    }

    /// Moves the window and fetches the pages that entered it.
    pub fn set_read_offset(&self, read_offset: usize) {
        self.shared.transition(|store| {
            (store.read_offset() != Some(read_offset)).then(|| store.set_read_offset(read_offset))
        });
    }

    /// Reapplies the filter to resolved pages, optionally moving the window.
    pub fn refilter(&self, read_offset: Option<usize>) {
        self.shared.transition(|store| {
            let store = store.refilter();
            Some(match read_offset {
                Some(offset) => store.set_read_offset(offset),
                None => store,
            })
        });
    }

    /// Replaces the filter and refilters resolved pages.
    pub fn set_filter(&self, filter: Option<Filter<S::Record>>) {
        self.shared
            .transition(|store| Some(store.clone().with_filter(filter).refilter()));
    }

    /// Unloads every page and fetches the window around `read_offset` again.
    pub fn reload(&self, read_offset: usize) {
        self.shared
            .transition(|store| Some(store.reload().set_read_offset(read_offset)));
    }

    /// Abandons every page and starts over at `read_offset`.
    ///
    /// Abandoned pages are not passed to [`PageSource::unfetch`].
    pub fn reset(&self, read_offset: usize) {
        self.shared
            .transition(|store| Some(store.reset().set_read_offset(read_offset)));
    }

    /// Number of fetches that have not completed yet.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Waits until no fetch is outstanding.
    pub async fn idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Builder for creating a dataset.
pub struct DatasetBuilder<S: PageSource> {
    config: DatasetConfig,
    source: Option<S>,
    filter: Option<Filter<S::Record>>,
    observer: Option<Observer<S::Record, S::Error>>,
}

impl<S: PageSource> DatasetBuilder<S> {
    /// Creates a builder with an empty configuration.
    pub fn new() -> Self {
        Self {
            config: DatasetConfig::default(),
            source: None,
            filter: None,
            observer: None,
        }
    }

    /// Sets the whole window configuration.
    pub fn config(mut self, config: DatasetConfig) -> Self {
        self.config = config;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = Some(page_size);
        self
    }

    pub fn load_horizon(mut self, horizon: usize) -> Self {
        self.config.load_horizon = Some(horizon);
        self
    }

    pub fn unload_horizon(mut self, horizon: usize) -> Self {
        self.config.unload_horizon = Some(horizon);
        self
    }

    pub fn stats(mut self, stats: Stats) -> Self {
        self.config.stats = stats;
        self
    }

    /// Sets the record source pages are fetched from.
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the predicate applied to resolved records.
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&S::Record) -> bool + Send + Sync + 'static,
    {
        let filter: Filter<S::Record> = Arc::new(filter);
        self.filter = Some(filter);
        self
    }

    /// Sets the callback receiving every new snapshot.
    pub fn observe<F>(mut self, observer: F) -> Self
    where
        F: Fn(&Snapshot<S>) + Send + Sync + 'static,
    {
        let observer: Observer<S::Record, S::Error> = Box::new(observer);
        self.observer = Some(observer);
        self
    }

    /// Validates the configuration and builds the dataset.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> DatasetResult<Dataset<S>> {
        let store = PageStore::new(&self.config)?.with_filter(self.filter);
        let source = self
            .source
            .ok_or_else(|| DatasetError::new(ErrorCode::MissingSource))?;
        let runtime = Handle::try_current()
            .map_err(|e| DatasetError::with_message(ErrorCode::NoRuntime, e.to_string()))?;

        Ok(Dataset {
            shared: Arc::new(Shared {
                source,
                runtime,
                state: Mutex::new(store),
                observer: self.observer,
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        })
    }
}

impl<S: PageSource> Default for DatasetBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}
