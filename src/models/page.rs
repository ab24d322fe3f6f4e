//! Page data models.
//!
//! A [`Page`] is one fixed-size chunk of the record sequence together with its
//! fetch status. Pages are immutable: every transition returns a new page with
//! a fresh generation number, so a [`PageRef`] captured before a transition
//! never matches the page that replaced it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::record::{Record, Records};
use crate::error::{DatasetError, DatasetResult, ErrorCode};

/// Predicate applied to raw records when a page resolves.
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Returns a filter that keeps every record.
pub fn accept_all<T: 'static>() -> Filter<T> {
    Arc::new(|_: &T| true)
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Fetch status of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageStatus {
    Unrequested,
    Pending,
    Resolved,
    Rejected,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Unrequested => "unrequested",
            PageStatus::Pending => "pending",
            PageStatus::Resolved => "resolved",
            PageStatus::Rejected => "rejected",
        }
    }
}

/// Identity of one page value.
///
/// Captured when a fetch is issued and handed back with its response; the
/// store only applies the response while the page at `offset` still carries
/// the same `generation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub offset: usize,
    pub generation: u64,
}

/// Variant data of a page.
pub enum PageState<T, E> {
    Unrequested,
    Pending,
    Resolved {
        /// Raw records exactly as fetched.
        unfiltered: Arc<Vec<T>>,
        /// Indices into `unfiltered` that passed the filter, in order.
        filtered: Vec<usize>,
    },
    Rejected(E),
}

impl<T, E> PageState<T, E> {
    pub fn status(&self) -> PageStatus {
        match self {
            PageState::Unrequested => PageStatus::Unrequested,
            PageState::Pending => PageStatus::Pending,
            PageState::Resolved { .. } => PageStatus::Resolved,
            PageState::Rejected(_) => PageStatus::Rejected,
        }
    }
}

struct PageInner<T, E> {
    offset: usize,
    size: usize,
    generation: u64,
    state: PageState<T, E>,
}

/// One fixed-size chunk of the record sequence.
///
/// Cloning a page is cheap and keeps its identity; transitions never do.
pub struct Page<T, E> {
    inner: Arc<PageInner<T, E>>,
}

impl<T, E> Clone for Page<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> PartialEq for Page<T, E> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.generation == other.inner.generation
    }
}

impl<T, E> Eq for Page<T, E> {}

impl<T, E> fmt::Debug for Page<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("offset", &self.inner.offset)
            .field("size", &self.inner.size)
            .field("generation", &self.inner.generation)
            .field("status", &self.status())
            .field("records", &self.record_count())
            .finish()
    }
}

impl<T, E> Page<T, E> {
    /// Creates a new unrequested page.
    pub fn new(offset: usize, size: usize) -> Self {
        Self::with_state(offset, size, PageState::Unrequested)
    }

    fn with_state(offset: usize, size: usize, state: PageState<T, E>) -> Self {
        Self {
            inner: Arc::new(PageInner {
                offset,
                size,
                generation: next_generation(),
                state,
            }),
        }
    }

    fn invalid_transition(&self, op: &str) -> DatasetError {
        DatasetError::with_message(
            ErrorCode::InvalidTransition,
            format!(
                "cannot {} page {} while {}",
                op,
                self.inner.offset,
                self.status().as_str()
            ),
        )
    }

    /// Position of this page in the page sequence.
    pub fn offset(&self) -> usize {
        self.inner.offset
    }

    /// Nominal number of records (the page size).
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation
    }

    pub fn page_ref(&self) -> PageRef {
        PageRef {
            offset: self.inner.offset,
            generation: self.inner.generation,
        }
    }

    pub fn state(&self) -> &PageState<T, E> {
        &self.inner.state
    }

    pub fn status(&self) -> PageStatus {
        self.inner.state.status()
    }

    pub fn is_requested(&self) -> bool {
        !matches!(self.inner.state, PageState::Unrequested)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.inner.state, PageState::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.inner.state, PageState::Resolved { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.inner.state, PageState::Rejected(_))
    }

    pub fn is_settled(&self) -> bool {
        self.is_resolved() || self.is_rejected()
    }

    /// Unrequested → Pending. A pending page is returned as is.
    pub fn request(&self) -> DatasetResult<Self> {
        match self.inner.state {
            PageState::Unrequested => Ok(Self::with_state(
                self.inner.offset,
                self.inner.size,
                PageState::Pending,
            )),
            PageState::Pending => Ok(self.clone()),
            _ => Err(self.invalid_transition("request")),
        }
    }

    /// Pending → Resolved.
    ///
    /// `records` is kept verbatim; the visible records are those accepted by
    /// `filter` (all of them when no filter is given), in their original order.
    pub fn resolve(&self, records: Vec<T>, filter: Option<&Filter<T>>) -> DatasetResult<Self> {
        if !self.is_pending() {
            return Err(self.invalid_transition("resolve"));
        }
        let filtered = apply_filter(&records, filter);
        Ok(Self::with_state(
            self.inner.offset,
            self.inner.size,
            PageState::Resolved {
                unfiltered: Arc::new(records),
                filtered,
            },
        ))
    }

    /// Pending → Rejected.
    pub fn reject(&self, error: E) -> DatasetResult<Self> {
        if !self.is_pending() {
            return Err(self.invalid_transition("reject"));
        }
        Ok(Self::with_state(
            self.inner.offset,
            self.inner.size,
            PageState::Rejected(error),
        ))
    }

    /// Any state → Unrequested. An unrequested page is returned as is.
    pub fn unload(&self) -> Self {
        match self.inner.state {
            PageState::Unrequested => self.clone(),
            _ => Self::new(self.inner.offset, self.inner.size),
        }
    }

    /// Rebuilds the filtered view of a resolved page from its raw records.
    ///
    /// The raw records are shared with the original page. Pages in any other
    /// state are returned unchanged.
    pub fn refilter(&self, filter: Option<&Filter<T>>) -> Self {
        match &self.inner.state {
            PageState::Resolved { unfiltered, .. } => Self::with_state(
                self.inner.offset,
                self.inner.size,
                PageState::Resolved {
                    filtered: apply_filter(unfiltered, filter),
                    unfiltered: Arc::clone(unfiltered),
                },
            ),
            _ => self.clone(),
        }
    }

    /// Raw records of a resolved page, before filtering.
    pub fn unfiltered(&self) -> Option<&[T]> {
        match &self.inner.state {
            PageState::Resolved { unfiltered, .. } => Some(unfiltered.as_slice()),
            _ => None,
        }
    }

    /// Shared handle to the raw records of a resolved page.
    pub fn unfiltered_arc(&self) -> Option<Arc<Vec<T>>> {
        match &self.inner.state {
            PageState::Resolved { unfiltered, .. } => Some(Arc::clone(unfiltered)),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match &self.inner.state {
            PageState::Rejected(error) => Some(error),
            _ => None,
        }
    }

    /// Number of records this page currently exposes.
    ///
    /// Unrequested and pending pages expose `size` placeholders, resolved pages
    /// their filtered records and rejected pages nothing.
    pub fn record_count(&self) -> usize {
        match &self.inner.state {
            PageState::Unrequested | PageState::Pending => self.inner.size,
            PageState::Resolved { filtered, .. } => filtered.len(),
            PageState::Rejected(_) => 0,
        }
    }

    /// Content of the slot at `index`, `None` for placeholders.
    pub fn content(&self, index: usize) -> Option<&T> {
        match &self.inner.state {
            PageState::Resolved {
                unfiltered,
                filtered,
            } => filtered.get(index).map(|&i| &unfiltered[i]),
            _ => None,
        }
    }

    /// Filtered records of a resolved page, in order.
    pub fn data(&self) -> Vec<&T> {
        (0..self.record_count())
            .filter_map(|i| self.content(i))
            .collect()
    }

    pub fn record(&self, index: usize) -> Option<Record<T, E>> {
        if index < self.record_count() {
            Some(Record::new(self.clone(), index))
        } else {
            None
        }
    }

    /// Lazily materializes one record view per slot.
    pub fn records(&self) -> Records<T, E> {
        Records::new(self.clone())
    }
}

fn apply_filter<T>(records: &[T], filter: Option<&Filter<T>>) -> Vec<usize> {
    match filter {
        Some(filter) => records
            .iter()
            .enumerate()
            .filter(|(_, record)| filter(record))
            .map(|(i, _)| i)
            .collect(),
        None => (0..records.len()).collect(),
    }
}
