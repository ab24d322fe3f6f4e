//! Dataset configuration.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, DatasetResult, ErrorCode};
use crate::models::Stats;

/// Default page size used by the demo binary.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Default number of records served by the demo source.
pub const DEFAULT_TOTAL_RECORDS: usize = 200;

/// Command-line arguments for the demo binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "dataset-rs")]
#[command(about = "Walk a windowed page cache over an in-memory record source")]
#[command(version)]
pub struct Args {
    /// Records per page.
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Records around the read offset that must be loaded.
    #[arg(long)]
    pub load_horizon: Option<usize>,

    /// Records beyond which pages are unloaded (unbounded when omitted).
    #[arg(long)]
    pub unload_horizon: Option<usize>,

    /// JSON config file; overrides the horizon flags above.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Number of records in the demo source.
    #[arg(long, default_value_t = DEFAULT_TOTAL_RECORDS)]
    pub total_records: usize,

    /// Tell the dataset the page count up front.
    #[arg(long)]
    pub known_total: bool,

    /// Read offsets to visit, in order.
    #[arg(long, value_delimiter = ',', default_value = "0")]
    pub offsets: Vec<usize>,

    /// Simulated fetch latency in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Page offsets whose fetch fails.
    #[arg(long, value_delimiter = ',')]
    pub fail_pages: Vec<usize>,

    /// Keep only records whose index is divisible by this number.
    #[arg(long)]
    pub keep_every: Option<usize>,

    /// Print snapshot summaries as JSON.
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (minimal logging).
    #[arg(long, short = 's')]
    pub silent: bool,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            load_horizon: None,
            unload_horizon: None,
            config: None,
            total_records: DEFAULT_TOTAL_RECORDS,
            known_total: false,
            offsets: vec![0],
            latency_ms: 0,
            fail_pages: Vec::new(),
            keep_every: None,
            json: false,
            debug: false,
            silent: false,
        }
    }
}

/// Window configuration of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetConfig {
    /// Records per page. Required.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Defaults to the page size.
    #[serde(default)]
    pub load_horizon: Option<usize>,
    /// Unbounded when unset.
    #[serde(default)]
    pub unload_horizon: Option<usize>,
    #[serde(default)]
    pub stats: Stats,
}

/// Validated window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    pub page_size: usize,
    pub load_horizon: usize,
    pub unload_horizon: Option<usize>,
}

impl DatasetConfig {
    /// Creates a configuration with the given page size and default horizons.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    pub fn load_horizon(mut self, horizon: usize) -> Self {
        self.load_horizon = Some(horizon);
        self
    }

    pub fn unload_horizon(mut self, horizon: usize) -> Self {
        self.unload_horizon = Some(horizon);
        self
    }

    pub fn stats(mut self, stats: Stats) -> Self {
        self.stats = stats;
        self
    }

    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> DatasetResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> DatasetResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::with_message(
                ErrorCode::Io,
                format!("Failed to read config {}: {}", path.display(), e),
            )
        })?;
        Self::from_json_str(&json)
    }

    /// Resolves defaults and checks the horizons.
    ///
    /// A zero load horizon falls back to the page size and a zero unload
    /// horizon means unbounded.
    pub fn validate(&self) -> DatasetResult<WindowSettings> {
        let page_size = match self.page_size {
            Some(size) if size > 0 => size,
            _ => return Err(DatasetError::new(ErrorCode::MissingPageSize)),
        };
        let load_horizon = self
            .load_horizon
            .filter(|&h| h > 0)
            .unwrap_or(page_size);
        let unload_horizon = self.unload_horizon.filter(|&h| h > 0);

        if let Some(unload) = unload_horizon {
            if unload < load_horizon {
                return Err(DatasetError::with_message(
                    ErrorCode::InvalidHorizon,
                    format!(
                        "created dataset with unloadHorizon less than loadHorizon ({} < {})",
                        unload, load_horizon
                    ),
                ));
            }
        }

        Ok(WindowSettings {
            page_size,
            load_horizon,
            unload_horizon,
        })
    }
}

impl From<&Args> for DatasetConfig {
    fn from(args: &Args) -> Self {
        let total_pages = args
            .known_total
            .then(|| args.total_records.div_ceil(args.page_size.max(1)));
        Self {
            page_size: Some(args.page_size),
            load_horizon: args.load_horizon,
            unload_horizon: args.unload_horizon,
            stats: Stats::new(total_pages),
        }
    }
}
