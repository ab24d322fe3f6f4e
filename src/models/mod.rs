//! Data models for pages and records.

mod page;
mod record;
mod stats;

pub use page::*;
pub use record::*;
pub use stats::*;
