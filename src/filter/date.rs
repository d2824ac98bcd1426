//! Date-range filter.
//!
//! Bounds are resolved to line numbers once, by binary search over the upstream,
//! so per-line filtering is a pair of integer comparisons. The search assumes the
//! source is time-ordered. A line without a parsable timestamp takes the time of
//! the next parsable line after it (or sorts last if there is none), which keeps
//! the ordering monotonic for well-behaved logs with the odd stack-trace line.

use crate::error::Result;
use crate::filter::{Filter, Upstream};
use crate::line::{Line, LineStatus};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Bounds {
    start: usize,
    end: usize,
}

#[derive(Debug, Default)]
struct State {
    bounds: Bounds,
    /// Requested times, kept so the bounds can follow a growing source
    start_at: Option<NaiveDateTime>,
    end_at: Option<NaiveDateTime>,
}

impl State {
    /// No requested time means no date filtering, whatever the bounds say.
    /// A set range that resolves to `start == end` hides every line.
    fn is_unset(&self) -> bool {
        self.start_at.is_none() && self.end_at.is_none()
    }
}

/// Keeps lines in `[start_line_no, end_line_no)`
pub struct DateFilter {
    upstream: Upstream,
    state: RwLock<State>,
}

impl DateFilter {
    pub fn new(upstream: Arc<dyn Filter>) -> Self {
        Self {
            upstream: Upstream::new(upstream),
            state: RwLock::new(State::default()),
        }
    }

    /// Start the range at the first line at or after `when`
    pub fn set_start(&self, when: NaiveDateTime) -> Result<()> {
        let start = self.first_at_or_after(when)?;
        let mut state = self.state.write();
        if state.is_unset() {
            state.bounds.end = usize::MAX;
        }
        state.bounds.start = start;
        state.start_at = Some(when);
        Ok(())
    }

    /// End the range after the last line strictly before `when`
    pub fn set_end(&self, when: NaiveDateTime) -> Result<()> {
        let end = self.first_at_or_after(when)?;
        let mut state = self.state.write();
        if state.is_unset() {
            state.bounds.start = 0;
        }
        state.bounds.end = end;
        state.end_at = Some(when);
        Ok(())
    }

    /// Apply both bounds; `None` leaves that side open
    pub fn set_range(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<()> {
        let bounds = self.resolve(start, end)?;
        *self.state.write() = State {
            bounds,
            start_at: start,
            end_at: end,
        };
        Ok(())
    }

    /// Restore the unset sentinel
    pub fn clear(&self) {
        *self.state.write() = State::default();
    }

    /// Recompute the bounds of a set range against the current upstream.
    ///
    /// Called after the source grows: a bound that fell past the end of the
    /// data when it was set moves onto the first newly arrived line at or
    /// after its time. Returns whether the bounds changed.
    pub fn refresh_bounds(&self) -> Result<bool> {
        let (start_at, end_at) = {
            let state = self.state.read();
            if state.is_unset() {
                return Ok(false);
            }
            (state.start_at, state.end_at)
        };

        let resolved = self.resolve(start_at, end_at)?;
        let mut state = self.state.write();
        let changed = resolved != state.bounds;
        state.bounds = resolved;
        Ok(changed)
    }

    fn resolve(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Bounds> {
        let start = match start {
            Some(when) => self.first_at_or_after(when)?,
            None => 0,
        };
        let end = match end {
            Some(when) => self.first_at_or_after(when)?,
            None => usize::MAX,
        };
        Ok(Bounds { start, end })
    }

    pub fn start_line_no(&self) -> usize {
        self.state.read().bounds.start
    }

    pub fn end_line_no(&self) -> usize {
        self.state.read().bounds.end
    }

    /// Lower bound over effective line times.
    fn first_at_or_after(&self, when: NaiveDateTime) -> Result<usize> {
        let upstream = self.upstream.get();
        let mut lo = 0;
        let mut hi = upstream.length();

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match Self::probe(upstream.as_ref(), mid, hi)? {
                Some((at, time)) if time < when => lo = at + 1,
                _ => hi = mid,
            }
        }
        Ok(lo)
    }

    /// First parsable line in `[from, to)` with its time
    fn probe(
        upstream: &dyn Filter,
        from: usize,
        to: usize,
    ) -> Result<Option<(usize, NaiveDateTime)>> {
        for n in from..to {
            if let Some(time) = upstream.get_line(n)?.when() {
                return Ok(Some((n, time)));
            }
        }
        Ok(None)
    }
}

impl Filter for DateFilter {
    fn get_line(&self, n: usize) -> Result<Line> {
        let mut line = self.upstream.get().get_line(n)?;
        let (unset, bounds) = {
            let state = self.state.read();
            (state.is_unset(), state.bounds)
        };
        if !unset && (n < bounds.start || n >= bounds.end) {
            line.status = LineStatus::Hidden;
        }
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
