//! Memoizing tail node of the chain.

use crate::error::Result;
use crate::filter::{Filter, Upstream};
use crate::line::Line;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

type Memo = Arc<Mutex<HashMap<usize, Line>>>;

/// Line-number keyed memo of fully filtered lines.
///
/// Not an LRU: a filter change can reclassify any number of lines, so the memo is
/// dropped wholesale by [`Cache::invalidate`]. Lookups hold the memo lock across
/// the upstream call, so concurrent callers are fully serialized.
pub struct Cache {
    upstream: Upstream,
    memo: RwLock<Memo>,
}

impl Cache {
    pub fn new(upstream: Arc<dyn Filter>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            memo: RwLock::new(Memo::default()),
        }
    }

    /// Swap in an empty memo. Lookups already holding the old one finish
    /// against it and their results are discarded with it.
    pub fn invalidate(&self) {
        *self.memo.write() = Memo::default();
    }

    /// Number of memoized lines
    pub fn cached_lines(&self) -> usize {
        self.memo.read().lock().len()
    }
}

impl Filter for Cache {
    fn get_line(&self, n: usize) -> Result<Line> {
        let memo = Arc::clone(&self.memo.read());
        let mut entries = memo.lock();
        if let Some(line) = entries.get(&n) {
            return Ok(line.clone());
        }

        let line = self.upstream.get().get_line(n)?;
        entries.insert(n, line.clone());
        Ok(line)
    }

    fn set_source(&self, upstream: Arc<dyn Filter>) -> Result<()> {
        self.upstream.set(upstream);
        Ok(())
    }

    fn size(&self) -> usize {
        self.upstream.get().size()
    }

    fn length(&self) -> usize {
        self.upstream.get().length()
    }
}
