//! Filter chain abstraction.
//!
//! A chain is rooted at a [`Source`], runs through any number of user filters and
//! ends in a [`Cache`]. Every node speaks the same four-method [`Filter`] contract;
//! a lookup recurses upstream to the source and each node annotates the returned
//! copy on the way back down.

pub mod cache;
pub mod date;
pub mod pipeline;
pub mod source;
pub mod string;

use crate::error::{Result, SiftError};
use crate::line::Line;
use parking_lot::RwLock;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use cache::Cache;
pub use date::DateFilter;
pub use pipeline::{ChainWalker, FilterNode, Pipeline};
pub use source::Source;
pub use string::StringFilter;

/// Capability shared by every node in the chain.
pub trait Filter: Send + Sync {
    /// Annotated copy of line `n`, or `OutOfBounds` outside `[0, length())`
    fn get_line(&self, n: usize) -> Result<Line>;

    /// Re-link this node to a new upstream
    fn set_source(&self, upstream: Arc<dyn Filter>) -> Result<()>;

    /// Widest line seen so far, in bytes
    fn size(&self) -> usize;

    /// Number of lines in the source
    fn length(&self) -> usize;
}

/// Stable handle for a node in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub u64);

impl FilterId {
    /// Reserved for the root source
    pub const SOURCE: FilterId = FilterId(0);
    /// Reserved for the tail cache
    pub const OUTPUT: FilterId = FilterId(u64::MAX);
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scan direction through the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Next line number from `n`, or None when stepping off the front
    pub fn step(self, n: usize) -> Option<usize> {
        match self {
            Direction::Up => n.checked_sub(1),
            Direction::Down => n.checked_add(1),
        }
    }
}

/// How a keyword filter treats matching and non-matching lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Keep everything, dim what does not match
    Focus,
    /// Keep only what matches
    Match,
    /// Drop what matches
    Hide,
}

impl FromStr for FilterMode {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "focus" => Ok(FilterMode::Focus),
            "match" => Ok(FilterMode::Match),
            "hide" => Ok(FilterMode::Hide),
            _ => Err(SiftError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterMode::Focus => "focus",
            FilterMode::Match => "match",
            FilterMode::Hide => "hide",
        };
        f.write_str(name)
    }
}

/// Re-linkable upstream reference held by every non-source node
pub(crate) struct Upstream(RwLock<Arc<dyn Filter>>);

impl Upstream {
    pub(crate) fn new(upstream: Arc<dyn Filter>) -> Self {
        Self(RwLock::new(upstream))
    }

    pub(crate) fn get(&self) -> Arc<dyn Filter> {
        Arc::clone(&self.0.read())
    }

    pub(crate) fn set(&self, upstream: Arc<dyn Filter>) {
        *self.0.write() = upstream;
    }
}
