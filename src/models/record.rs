//! Record views over page data.

use std::fmt;

use super::page::Page;

/// Read-only view of one slot of a page.
///
/// Holds a shared handle to the page version it was taken from; two records
/// are equal when they point at the same slot of the same page version.
pub struct Record<T, E> {
    page: Page<T, E>,
    index: usize,
}

impl<T, E> Record<T, E> {
    pub(crate) fn new(page: Page<T, E>, index: usize) -> Self {
        Self { page, index }
    }

    pub fn page(&self) -> &Page<T, E> {
        &self.page
    }

    /// Position of this record within its page.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw content, `None` while the page is unrequested or pending.
    pub fn content(&self) -> Option<&T> {
        self.page.content(self.index)
    }

    pub fn is_requested(&self) -> bool {
        self.page.is_requested()
    }

    pub fn is_pending(&self) -> bool {
        self.page.is_pending()
    }

    pub fn is_resolved(&self) -> bool {
        self.page.is_resolved()
    }

    pub fn is_rejected(&self) -> bool {
        self.page.is_rejected()
    }
}

impl<T, E> Clone for Record<T, E> {
    fn clone(&self) -> Self {
        Self {
            page: self.page.clone(),
            index: self.index,
        }
    }
}

impl<T, E> PartialEq for Record<T, E> {
    fn eq(&self, other: &Self) -> bool {
        self.page == other.page && self.index == other.index
    }
}

impl<T, E> Eq for Record<T, E> {}

impl<T: fmt::Debug, E> fmt::Debug for Record<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("page", &self.page.offset())
            .field("index", &self.index)
            .field("content", &self.content())
            .finish()
    }
}

/// Lazy iterator over the records of one page.
pub struct Records<T, E> {
    page: Page<T, E>,
    next: usize,
    len: usize,
}

impl<T, E> Records<T, E> {
    pub(crate) fn new(page: Page<T, E>) -> Self {
        let len = page.record_count();
        Self { page, next: 0, len }
    }
}

impl<T, E> Iterator for Records<T, E> {
    type Item = Record<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        let record = Record::new(self.page.clone(), self.next);
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len - self.next;
        (remaining, Some(remaining))
    }
}

impl<T, E> ExactSizeIterator for Records<T, E> {}
