//! Fixed-height viewport over the filtered output.
//!
//! The display owns one row per screen line. Rows are copies of the lines the
//! chain produced; slots past the end of the filtered output hold
//! `DoesNotExist` placeholders. Single-step scrolling shifts the buffer by one
//! row instead of re-walking the chain.

use crate::error::{Result, SiftError};
use crate::filter::{ChainWalker, Direction};
use crate::line::Line;
use tokio_util::sync::CancellationToken;

/// Screen position of a search hit found scrolling down, in percent from the top
pub const MATCH_POSITION_DOWN: usize = 25;
/// Screen position of a search hit found scrolling up
pub const MATCH_POSITION_UP: usize = 75;

/// Immutable copy of the viewport handed to the rendering layer
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    pub rows: Vec<Line>,
    pub current_col: usize,
    pub current_match: Option<usize>,
    pub total_length: usize,
    pub percentage: u8,
}

/// Viewport state
#[derive(Debug)]
pub struct Display {
    buffer: Vec<Line>,
    current_col: usize,
    current_match: Option<usize>,
    total_length: usize,
    percentage: u8,
}

impl Display {
    pub fn new(height: usize) -> Self {
        Self {
            buffer: vacant(height),
            current_col: 0,
            current_match: None,
            total_length: 0,
            percentage: 100,
        }
    }

    pub fn height(&self) -> usize {
        self.buffer.len()
    }

    /// Resize the buffer; the caller re-walks the chain afterwards
    pub fn set_height(&mut self, height: usize) {
        self.buffer = vacant(height);
    }

    pub fn rows(&self) -> &[Line] {
        &self.buffer
    }

    pub fn current_col(&self) -> usize {
        self.current_col
    }

    pub fn current_match(&self) -> Option<usize> {
        self.current_match
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    /// Source line of the topmost real row
    pub fn first_row_no(&self) -> Option<usize> {
        self.buffer.iter().find(|l| l.exists()).map(|l| l.no)
    }

    /// Source line of the bottommost real row
    pub fn last_row_no(&self) -> Option<usize> {
        self.buffer.iter().rev().find(|l| l.exists()).map(|l| l.no)
    }

    /// Whether any slot still holds a placeholder
    pub fn has_vacant_rows(&self) -> bool {
        self.buffer.iter().any(|l| !l.exists())
    }

    /// Walk forward from `anchor` collecting up to `height` visible lines.
    ///
    /// Returns `Ok(None)` when `cancel` fires; it is checked once per emitted row.
    pub fn collect_rows(
        walker: &ChainWalker,
        anchor: usize,
        height: usize,
        cancel: Option<&CancellationToken>,
    ) -> Result<Option<Vec<Line>>> {
        let mut rows = Vec::with_capacity(height);
        let mut next = anchor;

        while rows.len() < height {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                return Ok(None);
            }
            match walker.find_non_hidden_line(next, Direction::Down) {
                Ok(line) => {
                    next = line.no + 1;
                    rows.push(line);
                }
                Err(SiftError::OutOfBounds { .. }) => break,
                Err(err) => return Err(err),
            }
        }

        rows.resize_with(height, Line::missing);
        Ok(Some(rows))
    }

    /// Replace the buffer with freshly collected rows
    pub fn install(&mut self, rows: Vec<Line>, total_length: usize) {
        self.buffer = rows;
        self.update_total(total_length);
    }

    /// Refill the whole window starting at `anchor`
    pub fn refresh(&mut self, walker: &ChainWalker, anchor: usize) -> Result<()> {
        if let Some(rows) = Self::collect_rows(walker, anchor, self.height(), None)? {
            self.install(rows, walker.length());
        }
        Ok(())
    }

    /// Record the current source length and recompute the position
    pub fn update_total(&mut self, total_length: usize) {
        self.total_length = total_length;
        self.percentage = match (self.last_row_no(), total_length) {
            (_, 0) | (None, _) => 100,
            (Some(last), total) => ((last + 1) * 100 / total).min(100) as u8,
        };
    }

    /// Shift one row up, appending the next visible line at the bottom.
    /// Returns the new anchor.
    pub fn scroll_down(&mut self, walker: &ChainWalker) -> Result<usize> {
        let last = match self.buffer.last() {
            Some(line) if line.exists() => line.no,
            _ => {
                return Err(SiftError::OutOfBounds {
                    line: self.total_length,
                })
            }
        };

        let next = walker.find_non_hidden_line(last + 1, Direction::Down)?;
        self.buffer.rotate_left(1);
        if let Some(slot) = self.buffer.last_mut() {
            *slot = next;
        }
        self.update_total(walker.length());
        Ok(self.first_row_no().unwrap_or(last))
    }

    /// Shift one row down, prepending the previous visible line at the top.
    /// Returns the new anchor.
    pub fn scroll_up(&mut self, walker: &ChainWalker) -> Result<usize> {
        let first = match self.buffer.first() {
            Some(line) if line.exists() => line.no,
            _ => return Err(SiftError::OutOfBounds { line: 0 }),
        };

        let above = first.checked_sub(1).ok_or(SiftError::OutOfBounds { line: 0 })?;
        let prev = walker.find_non_hidden_line(above, Direction::Up)?;
        let anchor = prev.no;
        self.buffer.rotate_right(1);
        self.buffer[0] = prev;
        self.update_total(walker.length());
        Ok(anchor)
    }

    /// Fill the window with the last visible lines of the output, padding
    /// the top when there are fewer than a screenful. Returns the new anchor.
    pub fn scroll_end(&mut self, walker: &ChainWalker) -> Result<usize> {
        let height = self.height();
        let mut rows = Vec::with_capacity(height);
        let mut cursor = walker.length().checked_sub(1);

        while rows.len() < height {
            let Some(n) = cursor else { break };
            match walker.find_non_hidden_line(n, Direction::Up) {
                Ok(line) => {
                    cursor = line.no.checked_sub(1);
                    rows.push(line);
                }
                Err(SiftError::OutOfBounds { .. }) => break,
                Err(err) => return Err(err),
            }
        }

        rows.reverse();
        let mut buffer = vacant(height - rows.len());
        buffer.append(&mut rows);
        self.install(buffer, walker.length());
        Ok(self.first_row_no().unwrap_or(0))
    }

    /// Anchor that places `target` `percentage` percent down the screen.
    pub fn arrange_line(
        &self,
        walker: &ChainWalker,
        target: usize,
        percentage: usize,
    ) -> Result<usize> {
        let above = (percentage * self.height() / 100).saturating_sub(1);
        let mut anchor = target;

        for _ in 0..above {
            let Some(prev) = anchor.checked_sub(1) else { break };
            match walker.find_non_hidden_line(prev, Direction::Up) {
                Ok(line) => anchor = line.no,
                Err(SiftError::OutOfBounds { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok(anchor)
    }

    /// Jump to the next search target in `direction` and re-center on it.
    ///
    /// Continues from the current match while it is on screen, otherwise from
    /// the edge of the window. Returns the new anchor; on failure nothing changes.
    pub fn find_match(
        &mut self,
        walker: &ChainWalker,
        direction: Direction,
        anchor: usize,
    ) -> Result<usize> {
        let on_screen = self
            .current_match
            .filter(|m| self.buffer.iter().any(|l| l.exists() && l.no == *m));

        let start = match (on_screen, direction) {
            (Some(m), Direction::Down) => m + 1,
            (Some(m), Direction::Up) => m.checked_sub(1).ok_or(SiftError::NotFound)?,
            (None, Direction::Down) => self.first_row_no().unwrap_or(anchor),
            (None, Direction::Up) => self.last_row_no().unwrap_or(anchor),
        };

        let found = walker.search(start, direction)?;
        let position = match direction {
            Direction::Down => MATCH_POSITION_DOWN,
            Direction::Up => MATCH_POSITION_UP,
        };
        let anchor = self.arrange_line(walker, found.no, position)?;
        self.refresh(walker, anchor)?;
        self.current_match = Some(found.no);
        Ok(anchor)
    }

    /// Move the horizontal offset by `delta` columns within `[0, width)`
    pub fn scroll_horizontal(&mut self, delta: isize, width: usize) -> Result<()> {
        let max_col = width.saturating_sub(1);
        let blocked = (delta < 0 && self.current_col == 0)
            || (delta > 0 && self.current_col >= max_col);
        if blocked {
            return Err(SiftError::OutOfBounds {
                line: self.current_col,
            });
        }

        let moved = if delta < 0 {
            self.current_col.saturating_sub(delta.unsigned_abs())
        } else {
            self.current_col.saturating_add(delta as usize)
        };
        self.current_col = moved.min(max_col);
        Ok(())
    }

    /// No visible line exists below the window
    pub fn is_at_end(&self, walker: &ChainWalker) -> bool {
        match self.buffer.last() {
            Some(line) if line.exists() => walker
                .find_non_hidden_line(line.no + 1, Direction::Down)
                .is_err(),
            _ => true,
        }
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            rows: self.buffer.clone(),
            current_col: self.current_col,
            current_match: self.current_match,
            total_length: self.total_length,
            percentage: self.percentage,
        }
    }
}

fn vacant(height: usize) -> Vec<Line> {
    (0..height).map(|_| Line::missing()).collect()
}
