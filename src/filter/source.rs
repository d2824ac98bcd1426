//! Root of every filter chain: the append-only line store.

use crate::error::{Result, SiftError};
use crate::filter::Filter;
use crate::line::{Line, LineText};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Append-only store of every line read so far.
///
/// The source exclusively owns line text; lookups hand out unclassified copies
/// that share the text through an `Arc`.
#[derive(Debug, Default)]
pub struct Source {
    lines: RwLock<Vec<Arc<LineText>>>,
    width: AtomicUsize,
}

impl Source {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of newly read lines, returning the new length
    pub fn append<I>(&self, batch: I) -> usize
    where
        I: IntoIterator<Item = String>,
    {
        let mut widest = 0;
        let mut lines = self.lines.write();
        for text in batch {
            widest = widest.max(text.len());
            lines.push(Arc::new(LineText::new(text)));
        }
        self.width.fetch_max(widest, Ordering::Relaxed);
        lines.len()
    }
}

impl Filter for Source {
    fn get_line(&self, n: usize) -> Result<Line> {
        let lines = self.lines.read();
        lines
            .get(n)
            .map(|text| Line::new(n, Arc::clone(text)))
            .ok_or(SiftError::OutOfBounds { line: n })
    }

    fn set_source(&self, _upstream: Arc<dyn Filter>) -> Result<()> {
        Err(SiftError::invariant("the source has no upstream"))
    }

    fn size(&self) -> usize {
        self.width.load(Ordering::Relaxed)
    }

    fn length(&self) -> usize {
        self.lines.read().len()
    }
}
