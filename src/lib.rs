//! # logsift - Incremental Log Filtering Core
//!
//! The engine behind an interactive log viewer: a growing list of lines runs
//! through a chain of filters, and a fixed-height viewport over the filtered
//! output is kept current as the source grows and as filters are added,
//! removed, or reconfigured.
//!
//! ## Features
//!
//! - **Lazy Filter Chain**: lines are annotated on demand, one line number at a time
//! - **Keyword Filters**: focus, match, and hide modes over plain or regex keys
//! - **Date Ranges**: binary-searched time bounds over time-ordered logs
//! - **Follow Mode**: tails a growing file and keeps the viewport at its end
//!
//! ## Architecture
//!
//! - [`error`] - Centralized error types and handling
//! - [`filter`] - Filter chain nodes and the [`Pipeline`] that links them
//! - [`display`] - Viewport over the chain's output
//! - [`reader`] - File and stdin readers feeding new lines
//! - [`app`] - The [`FilterManager`] coordinator and its protocol

pub mod config;
pub mod error;
pub mod line;
pub mod timestamp;

pub mod display;
pub mod filter;
pub mod reader;
pub mod spinner;

pub mod app;

// Re-export commonly used types for convenience
pub use error::{Result, SiftError};

pub use app::{Command, FilterManager, FilterManagerHandle, FilterSpec, Notification};
pub use config::Config;
pub use display::{Display, DisplaySnapshot};
pub use filter::{Direction, Filter, FilterId, FilterMode, Pipeline};
pub use line::{Line, LineStatus};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
