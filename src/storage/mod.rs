//! Windowing engine and record sources.

mod horizon;
mod source;
mod store;

pub use horizon::*;
pub use source::*;
pub use store::*;
