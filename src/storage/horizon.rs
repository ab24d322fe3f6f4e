//! Load and unload window arithmetic.

use serde::Serialize;

/// Page ranges derived from a read offset and the two horizons.
///
/// Both ranges are half-open page offsets: `[min_load, max_load)` must have a
/// page present, pages outside `[min_unload, max_unload)` are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Horizons {
    pub min_load: usize,
    pub max_load: usize,
    pub min_unload: usize,
    pub max_unload: usize,
}

impl Horizons {
    /// Computes the window around `read_offset`.
    ///
    /// `unload_horizon` of `None` never unloads. `total_pages` of `None` leaves
    /// the upper bounds unclamped.
    pub fn compute(
        read_offset: usize,
        page_size: usize,
        load_horizon: usize,
        unload_horizon: Option<usize>,
        total_pages: Option<usize>,
    ) -> Self {
        let limit = total_pages.unwrap_or(usize::MAX);

        let min_load = min_page(read_offset, load_horizon, page_size);
        let max_load = max_page(read_offset, load_horizon, page_size).min(limit);

        let (min_unload, max_unload) = match unload_horizon {
            Some(horizon) => (
                min_page(read_offset, horizon, page_size),
                max_page(read_offset, horizon, page_size).min(limit),
            ),
            None => (0, limit),
        };

        Self {
            min_load: min_load.min(max_load),
            max_load,
            min_unload: min_unload.min(max_unload),
            max_unload,
        }
    }

    /// Unclamped end of the load window.
    pub fn load_extent(read_offset: usize, page_size: usize, load_horizon: usize) -> usize {
        max_page(read_offset, load_horizon, page_size)
    }

    pub fn in_load(&self, page_offset: usize) -> bool {
        page_offset >= self.min_load && page_offset < self.max_load
    }

    pub fn in_unload(&self, page_offset: usize) -> bool {
        page_offset >= self.min_unload && page_offset < self.max_unload
    }
}

/// `floor((offset - horizon) / page_size)`, clamped at zero.
fn min_page(offset: usize, horizon: usize, page_size: usize) -> usize {
    offset.saturating_sub(horizon) / page_size
}

/// `ceil((offset + horizon) / page_size)`.
fn max_page(offset: usize, horizon: usize, page_size: usize) -> usize {
    offset.saturating_add(horizon).div_ceil(page_size)
}
