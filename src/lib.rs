//! dataset-rs: windowed, incrementally-loaded page cache.
//!
//! Records of a large sequence are split into fixed-size pages. Only the pages
//! around a moving read offset are kept: pages entering the load horizon are
//! fetched asynchronously, pages leaving the unload horizon are dropped, and
//! late or superseded fetch responses are discarded.
//!
//! # Example
//!
//! ```no_run
//! use dataset_rs::{Dataset, DatasetConfig, MemorySource};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = MemorySource::new((0..1000).collect::<Vec<u32>>());
//!     let dataset = Dataset::new(source, DatasetConfig::new(25)).unwrap();
//!     dataset.set_read_offset(100);
//!     dataset.idle().await;
//!     let record = dataset.get_record(100).unwrap();
//!     assert_eq!(record.content(), Some(&100));
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod models;
pub mod storage;

// Re-exports for convenience
pub use config::{Args, DatasetConfig, WindowSettings, DEFAULT_PAGE_SIZE, DEFAULT_TOTAL_RECORDS};
pub use dataset::{Dataset, DatasetBuilder, Observer, Snapshot};
pub use error::{DatasetError, DatasetResult, ErrorCode};
pub use models::{accept_all, Filter, Page, PageRef, PageState, PageStatus, Record, Records, Stats};
pub use storage::{
    FetchResponse, Horizons, MemorySource, PageSource, PageStore, SourceError, StoreSummary,
};
