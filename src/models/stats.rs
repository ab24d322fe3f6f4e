//! Dataset statistics reported by the record source.

use serde::{Deserialize, Serialize};

/// What the source knows about the size of the sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Known number of pages, `None` when the source has not said.
    #[serde(default, rename = "totalPages")]
    pub total_pages: Option<usize>,
}

impl Stats {
    pub fn new(total_pages: Option<usize>) -> Self {
        Self { total_pages }
    }

    pub fn with_total_pages(total_pages: usize) -> Self {
        Self {
            total_pages: Some(total_pages),
        }
    }
}
