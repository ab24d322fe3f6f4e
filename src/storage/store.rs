//! The windowed page store.
//!
//! [`PageStore`] is an immutable snapshot. Every operation returns a new store
//! computed from the previous one; the old snapshot stays valid for whoever
//! still holds it. After each change the store recomputes its horizons, evicts
//! pages that fell out of the unload window, fills the load window with
//! unrequested pages and recomputes the estimated record count.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use super::horizon::Horizons;
use crate::config::DatasetConfig;
use crate::error::DatasetResult;
use crate::models::{Filter, Page, PageRef, Record, Stats};

/// Immutable snapshot of the paged window.
pub struct PageStore<T, E> {
    page_size: usize,
    load_horizon: usize,
    unload_horizon: Option<usize>,
    read_offset: Option<usize>,
    stats: Stats,
    total_pages: usize,
    horizons: Horizons,
    length: usize,
    beyond_length: bool,
    /// Contiguous run of pages, ordered by offset.
    pages: Vec<Page<T, E>>,
    /// Pages evicted while resolved, awaiting release.
    unfetchable: Vec<Page<T, E>>,
    filter: Option<Filter<T>>,
}

impl<T, E> Clone for PageStore<T, E> {
    fn clone(&self) -> Self {
        Self {
            page_size: self.page_size,
            load_horizon: self.load_horizon,
            unload_horizon: self.unload_horizon,
            read_offset: self.read_offset,
            stats: self.stats,
            total_pages: self.total_pages,
            horizons: self.horizons,
            length: self.length,
            beyond_length: self.beyond_length,
            pages: self.pages.clone(),
            unfetchable: self.unfetchable.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<T, E> fmt::Debug for PageStore<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageStore")
            .field("page_size", &self.page_size)
            .field("load_horizon", &self.load_horizon)
            .field("unload_horizon", &self.unload_horizon)
            .field("read_offset", &self.read_offset)
            .field("stats", &self.stats)
            .field("total_pages", &self.total_pages)
            .field("length", &self.length)
            .field("pages", &self.pages)
            .field("unfetchable", &self.unfetchable)
            .finish()
    }
}

impl<T, E> PageStore<T, E> {
    /// Creates an empty store with no read offset.
    ///
    /// Fails when the page size is missing or the unload horizon is smaller
    /// than the load horizon.
    pub fn new(config: &DatasetConfig) -> DatasetResult<Self> {
        let window = config.validate()?;
        Ok(Self {
            page_size: window.page_size,
            load_horizon: window.load_horizon,
            unload_horizon: window.unload_horizon,
            read_offset: None,
            stats: config.stats,
            total_pages: 0,
            horizons: Horizons::default(),
            length: 0,
            beyond_length: false,
            pages: Vec::new(),
            unfetchable: Vec::new(),
            filter: None,
        })
    }

    /// Installs the record filter used by later resolves and refilters.
    ///
    /// Already resolved pages keep their current view until [`refilter`].
    ///
    /// [`refilter`]: PageStore::refilter
    pub fn with_filter(mut self, filter: Option<Filter<T>>) -> Self {
        self.filter = filter;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn load_horizon(&self) -> usize {
        self.load_horizon
    }

    /// `None` when pages are never unloaded.
    pub fn unload_horizon(&self) -> Option<usize> {
        self.unload_horizon
    }

    pub fn read_offset(&self) -> Option<usize> {
        self.read_offset
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Known or estimated number of pages in the sequence.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn horizons(&self) -> Horizons {
        self.horizons
    }

    /// Best-effort number of records.
    ///
    /// Pages not yet resolved count as full pages, rejected pages count as
    /// empty and resolved pages contribute their filtered record count.
    pub fn length(&self) -> usize {
        self.length
    }

    /// True when the read offset lies at or past [`length`](PageStore::length).
    pub fn read_offset_exceeds_length(&self) -> bool {
        self.beyond_length
    }

    pub fn filter(&self) -> Option<&Filter<T>> {
        self.filter.as_ref()
    }

    /// The contiguous run of pages held by this snapshot.
    pub fn pages(&self) -> &[Page<T, E>] {
        &self.pages
    }

    /// Unrequested pages inside the load window; these need a fetch.
    pub fn unrequested(&self) -> Vec<Page<T, E>> {
        self.pages
            .iter()
            .filter(|p| !p.is_requested() && self.horizons.in_load(p.offset()))
            .cloned()
            .collect()
    }

    pub fn requested(&self) -> Vec<Page<T, E>> {
        self.select(Page::is_requested)
    }

    pub fn pending(&self) -> Vec<Page<T, E>> {
        self.select(Page::is_pending)
    }

    pub fn resolved(&self) -> Vec<Page<T, E>> {
        self.select(Page::is_resolved)
    }

    pub fn rejected(&self) -> Vec<Page<T, E>> {
        self.select(Page::is_rejected)
    }

    /// Pages evicted while resolved whose resources still need releasing.
    pub fn unfetchable(&self) -> &[Page<T, E>] {
        &self.unfetchable
    }

    pub fn is_pending(&self) -> bool {
        self.pages.iter().any(Page::is_pending)
    }

    pub fn is_rejected(&self) -> bool {
        self.pages.iter().any(Page::is_rejected)
    }

    /// True when something resolved and nothing is pending or rejected.
    pub fn is_resolved(&self) -> bool {
        !self.is_pending() && !self.is_rejected() && self.pages.iter().any(Page::is_resolved)
    }

    /// True when no fetch is outstanding.
    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    fn select(&self, pred: fn(&Page<T, E>) -> bool) -> Vec<Page<T, E>> {
        self.pages.iter().filter(|p| pred(p)).cloned().collect()
    }

    fn index_of(&self, page_offset: usize) -> Option<usize> {
        let first = self.pages.first()?.offset();
        let index = page_offset.checked_sub(first)?;
        (index < self.pages.len()).then_some(index)
    }

    /// Index of the page identified by `page_ref`, if it is still current.
    fn position(&self, page_ref: PageRef) -> Option<usize> {
        self.index_of(page_ref.offset)
            .filter(|&i| self.pages[i].generation() == page_ref.generation)
    }

    /// True while `page_ref` names the page currently stored at its offset.
    pub fn contains(&self, page_ref: PageRef) -> bool {
        self.position(page_ref).is_some()
    }

    /// Page at `page_offset`.
    ///
    /// Offsets outside the run yield a transient unrequested page that is not
    /// part of the store.
    pub fn get(&self, page_offset: usize) -> Page<T, E> {
        match self.index_of(page_offset) {
            Some(index) => self.pages[index].clone(),
            None => Page::new(page_offset, self.page_size),
        }
    }

    /// Record at logical position `index`.
    pub fn get_record(&self, index: usize) -> Option<Record<T, E>> {
        if index >= self.length {
            return None;
        }

        let page_index = index / self.page_size;
        match self.pages.iter().find(|p| p.is_settled()) {
            // Settled pages may hold fewer than `page_size` records, so from the
            // first of them onwards positions are found by walking actual counts.
            Some(first) if page_index >= first.offset() => {
                let mut offset = first.offset();
                let mut remaining = index - offset * self.page_size;
                while offset < self.total_pages {
                    let page = self.get(offset);
                    let count = page.record_count();
                    if remaining < count {
                        return page.record(remaining);
                    }
                    remaining -= count;
                    offset += 1;
                }
                None
            }
            _ => self.get(page_index).record(index % self.page_size),
        }
    }

    /// Moves the window to `read_offset`.
    ///
    /// Without an unload horizon nothing settled is ever evicted, so the run
    /// spans from the lowest retained page up to the load window and a far
    /// jump adds one placeholder per page in between. Set an unload horizon
    /// to keep the run bounded.
    pub fn set_read_offset(&self, read_offset: usize) -> Self {
        if self.read_offset == Some(read_offset) {
            return self.clone();
        }
        let mut next = self.clone();
        next.read_offset = Some(read_offset);
        let next = next.rebuild();
        next.report_range();
        next
    }

    /// Reapplies the filter to every resolved page.
    pub fn refilter(&self) -> Self {
        let mut next = self.clone();
        let filter = next.filter.clone();
        next.pages = next
            .pages
            .iter()
            .map(|p| p.refilter(filter.as_ref()))
            .collect();
        next.rebuild()
    }

    /// Unloads every requested page so the load window is fetched again.
    ///
    /// Resolved pages enter the unfetchable queue.
    pub fn reload(&self) -> Self {
        let mut next = self.clone();
        let mut released = Vec::new();
        next.pages = next
            .pages
            .iter()
            .map(|p| {
                if p.is_resolved() {
                    released.push(p.clone());
                }
                p.unload()
            })
            .collect();
        next.unfetchable.extend(released);
        next.rebuild()
    }

    /// Drops every page and the read offset.
    ///
    /// Dropped pages are abandoned, not queued for release.
    pub fn reset(&self) -> Self {
        let mut next = self.clone();
        next.pages.clear();
        next.read_offset = None;
        next.total_pages = 0;
        next.rebuild()
    }

    /// Marks the page named by `page_ref` as pending.
    pub fn fetch(&self, page_ref: PageRef) -> Self {
        let Some(index) = self.position(page_ref) else {
            debug!(offset = page_ref.offset, "fetch for a page no longer in the store");
            return self.clone();
        };
        match self.pages[index].request() {
            Ok(pending) => self.replace(index, pending, None),
            Err(e) => {
                warn!("{}", e);
                self.clone()
            }
        }
    }

    /// Applies a successful fetch to the page named by `page_ref`.
    ///
    /// A stale `page_ref` leaves the store unchanged.
    pub fn resolve(&self, records: Vec<T>, page_ref: PageRef, stats: Option<Stats>) -> Self {
        let Some(index) = self.position(page_ref) else {
            debug!(
                offset = page_ref.offset,
                generation = page_ref.generation,
                "dropping stale page response"
            );
            return self.clone();
        };
        match self.pages[index].resolve(records, self.filter.as_ref()) {
            Ok(resolved) => self.replace(index, resolved, stats),
            Err(e) => {
                warn!("{}", e);
                self.clone()
            }
        }
    }

    /// Applies a failed fetch to the page named by `page_ref`.
    ///
    /// A stale `page_ref` leaves the store unchanged.
    pub fn reject(&self, error: E, page_ref: PageRef, stats: Option<Stats>) -> Self {
        let Some(index) = self.position(page_ref) else {
            debug!(
                offset = page_ref.offset,
                generation = page_ref.generation,
                "dropping stale page failure"
            );
            return self.clone();
        };
        match self.pages[index].reject(error) {
            Ok(rejected) => self.replace(index, rejected, stats),
            Err(e) => {
                warn!("{}", e);
                self.clone()
            }
        }
    }

    /// Removes a released page from the unfetchable queue.
    pub fn unfetch(&self, page_ref: PageRef) -> Self {
        let mut next = self.clone();
        next.unfetchable
            .retain(|p| p.generation() != page_ref.generation);
        next
    }

    fn replace(&self, index: usize, page: Page<T, E>, stats: Option<Stats>) -> Self {
        let mut next = self.clone();
        debug!(
            offset = page.offset(),
            status = page.status().as_str(),
            "page transition"
        );
        next.pages[index] = page;
        if let Some(stats) = stats {
            next.stats = stats;
        }
        next.rebuild()
    }

    fn report_range(&self) {
        if let (true, Some(read_offset)) = (self.beyond_length, self.read_offset) {
            warn!(
                read_offset,
                length = self.length,
                "read offset is past the known records"
            );
        }
    }

    /// Recomputes horizons, eviction, fill and length.
    fn rebuild(mut self) -> Self {
        let Some(read_offset) = self.read_offset else {
            self.total_pages = 0;
            self.horizons = Horizons::default();
            self.length = 0;
            self.beyond_length = false;
            return self;
        };

        let run_end = self.pages.last().map_or(0, |p| p.offset() + 1);
        self.total_pages = match self.stats.total_pages {
            Some(total) => total,
            None => self
                .total_pages
                .max(run_end)
                .max(Horizons::load_extent(
                    read_offset,
                    self.page_size,
                    self.load_horizon,
                )),
        };

        let horizons = Horizons::compute(
            read_offset,
            self.page_size,
            self.load_horizon,
            self.unload_horizon,
            Some(self.total_pages),
        );
        self.horizons = horizons;

        self.evict();
        self.fill();

        let mut settled = 0;
        let mut visible = 0;
        for page in &self.pages {
            if page.is_settled() {
                settled += 1;
                visible += page.record_count();
            }
        }
        self.length = self
            .total_pages
            .saturating_sub(settled)
            .saturating_mul(self.page_size)
            .saturating_add(visible);
        self.beyond_length = read_offset >= self.length;
        self
    }

    fn evict(&mut self) {
        let horizons = self.horizons;
        let mut kept = Vec::with_capacity(self.pages.len());
        for page in self.pages.drain(..) {
            if horizons.in_unload(page.offset()) {
                kept.push(page);
            } else if page.is_resolved() {
                debug!(offset = page.offset(), "unloading resolved page");
                self.unfetchable.push(page);
            } else {
                debug!(
                    offset = page.offset(),
                    status = page.status().as_str(),
                    "discarding page"
                );
            }
        }

        // Unsettled pages left between the horizons are trimmed from both ends.
        let start = kept
            .iter()
            .position(|p| p.is_settled() || p.offset() >= horizons.min_load)
            .unwrap_or(kept.len());
        let end = kept
            .iter()
            .rposition(|p| p.is_settled() || p.offset() < horizons.max_load)
            .map_or(start, |i| i + 1)
            .max(start);
        kept.truncate(end);
        kept.drain(..start);
        self.pages = kept;
    }

    fn fill(&mut self) {
        let Horizons {
            min_load, max_load, ..
        } = self.horizons;
        if min_load >= max_load {
            return;
        }

        let page_size = self.page_size;
        let bounds = self
            .pages
            .first()
            .zip(self.pages.last())
            .map(|(first, last)| (first.offset(), last.offset() + 1));
        let Some((first, end)) = bounds else {
            self.pages = (min_load..max_load)
                .map(|offset| Page::new(offset, page_size))
                .collect();
            return;
        };

        // Offsets between the run and the load window become placeholders so
        // the run stays contiguous.
        let prefix = (min_load.min(first)..first).map(|offset| Page::new(offset, page_size));
        let suffix = (end..max_load.max(end)).map(|offset| Page::new(offset, page_size));
        let mut pages: Vec<Page<T, E>> = prefix.collect();
        pages.append(&mut self.pages);
        pages.extend(suffix);
        self.pages = pages;
    }

    /// Serializable overview of this snapshot.
    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            read_offset: self.read_offset,
            length: self.length,
            total_pages: self.total_pages,
            first_page: self.pages.first().map(Page::offset),
            page_count: self.pages.len(),
            unrequested: self.unrequested().len(),
            pending: self.pending().len(),
            resolved: self.resolved().len(),
            rejected: self.rejected().len(),
            unfetchable: self.unfetchable.len(),
            horizons: self.horizons,
        }
    }
}

/// Counts describing one store snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub read_offset: Option<usize>,
    pub length: usize,
    pub total_pages: usize,
    pub first_page: Option<usize>,
    pub page_count: usize,
    pub unrequested: usize,
    pub pending: usize,
    pub resolved: usize,
    pub rejected: usize,
    pub unfetchable: usize,
    pub horizons: Horizons,
}
