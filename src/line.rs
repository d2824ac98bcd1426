//! The atomic record flowing through the filter chain.
//!
//! A [`Line`] pairs shared, immutable text (owned by the source) with annotation
//! fields that each chain pass fills in from scratch. Every lookup hands out a
//! fresh copy, so one pass never observes another pass's classification.

use chrono::NaiveDateTime;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Visibility classification assigned by the filter chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineStatus {
    /// No filter has classified the line yet
    #[default]
    WithoutStatus,
    /// A keyword filter matched the line
    Matched,
    /// Shown, but de-emphasized by a focus filter
    Dimmed,
    /// Excluded from the viewport
    Hidden,
    /// Placeholder row past the end of the filtered output
    DoesNotExist,
}

impl LineStatus {
    /// Whether a row with this status occupies a viewport slot
    pub fn is_visible(self) -> bool {
        !matches!(self, LineStatus::Hidden | LineStatus::DoesNotExist)
    }
}

/// Source-owned text plus its memoized timestamp.
pub struct LineText {
    text: String,
    when: OnceLock<Option<NaiveDateTime>>,
}

impl LineText {
    pub fn new(text: String) -> Self {
        Self {
            text,
            when: OnceLock::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Debug for LineText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LineText").field(&self.text).finish()
    }
}

/// One annotated view of a source line
#[derive(Debug, Clone)]
pub struct Line {
    /// Stable zero-based index into the source
    pub no: usize,

    /// Classification from the most recent chain pass
    pub status: LineStatus,

    /// Set when some filter picked this line as a search target
    pub matched: bool,

    /// Highlight slot per byte of text, 0 = uncolored
    pub color_index: Vec<u8>,

    text: Arc<LineText>,
}

impl Line {
    /// Fresh, unclassified view of `text` at position `no`
    pub fn new(no: usize, text: Arc<LineText>) -> Self {
        Self {
            no,
            status: LineStatus::WithoutStatus,
            matched: false,
            color_index: vec![0; text.as_str().len()],
            text,
        }
    }

    /// Placeholder used to pad the viewport
    pub fn missing() -> Self {
        let mut line = Self::new(0, Arc::new(LineText::new(String::new())));
        line.status = LineStatus::DoesNotExist;
        line
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn exists(&self) -> bool {
        self.status != LineStatus::DoesNotExist
    }

    pub fn is_visible(&self) -> bool {
        self.status.is_visible()
    }

    /// Parsed timestamp, computed once per source line and shared by every copy
    pub fn when(&self) -> Option<NaiveDateTime> {
        *self
            .text
            .when
            .get_or_init(|| crate::timestamp::extract(self.text.as_str()))
    }

    /// Paint `range` (byte offsets) with highlight slot `slot`
    pub fn colorize(&mut self, range: std::ops::Range<usize>, slot: u8) {
        let end = range.end.min(self.color_index.len());
        let start = range.start.min(end);
        self.color_index[start..end].fill(slot);
    }
}
