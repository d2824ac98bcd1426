//! Keyword / regex filter.
//!
//! A key containing regex metacharacters is compiled as a regular expression;
//! anything else is a plain substring scan. The empty key matches zero-width at
//! every character position, which turns the filter into a pass-through that marks
//! every line as matched.

use crate::error::{Result, SiftError};
use crate::filter::{Filter, FilterMode, Upstream};
use crate::line::{Line, LineStatus};
use parking_lot::RwLock;
use regex::Regex;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Matcher {
    Everything,
    Substring { needle: String, fold_case: bool },
    Pattern(Regex),
}

impl Matcher {
    fn build(key: &str, case_sensitive: bool) -> Result<Self> {
        if key.is_empty() {
            return Ok(Matcher::Everything);
        }

        let is_plain = regex::escape(key) == key;
        if is_plain && (case_sensitive || key.is_ascii()) {
            let needle = if case_sensitive {
                key.to_string()
            } else {
                key.to_ascii_lowercase()
            };
            return Ok(Matcher::Substring {
                needle,
                fold_case: !case_sensitive,
            });
        }

        // Non-ASCII case folding changes byte lengths, so it goes through the
        // regex engine even for plain keys.
        let source = if is_plain {
            regex::escape(key)
        } else {
            key.to_string()
        };
        let pattern = if case_sensitive {
            source
        } else {
            format!("(?i){source}")
        };
        Regex::new(&pattern)
            .map(Matcher::Pattern)
            .map_err(|source| SiftError::InvalidPattern {
                pattern: key.to_string(),
                source,
            })
    }

    /// Byte ranges of every match in `text`
    fn find_ranges(&self, text: &str) -> Vec<Range<usize>> {
        match self {
            Matcher::Everything => text
                .char_indices()
                .map(|(idx, _)| idx)
                .chain(std::iter::once(text.len()))
                .map(|idx| idx..idx)
                .collect(),
            Matcher::Substring { needle, fold_case } => {
                let folded;
                let haystack = if *fold_case {
                    folded = text.to_ascii_lowercase();
                    folded.as_str()
                } else {
                    text
                };
                haystack
                    .match_indices(needle.as_str())
                    .map(|(start, hit)| start..start + hit.len())
                    .collect()
            }
            Matcher::Pattern(regex) => regex.find_iter(text).map(|m| m.range()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct Settings {
    key: String,
    mode: FilterMode,
    case_sensitive: bool,
    color_index: u8,
    matcher: Matcher,
}

/// Keyword filter with focus / match / hide semantics
pub struct StringFilter {
    upstream: Upstream,
    settings: RwLock<Settings>,
}

impl StringFilter {
    pub fn new(
        upstream: Arc<dyn Filter>,
        key: &str,
        mode: FilterMode,
        case_sensitive: bool,
        color_index: u8,
    ) -> Result<Self> {
        let matcher = Matcher::build(key, case_sensitive)?;
        Ok(Self {
            upstream: Upstream::new(upstream),
            settings: RwLock::new(Settings {
                key: key.to_string(),
                mode,
                case_sensitive,
                color_index,
                matcher,
            }),
        })
    }

    /// Replace the key; an invalid pattern leaves the filter unchanged
    pub fn set_key(&self, key: &str) -> Result<()> {
        let case_sensitive = self.settings.read().case_sensitive;
        let matcher = Matcher::build(key, case_sensitive)?;
        let mut settings = self.settings.write();
        settings.key = key.to_string();
        settings.matcher = matcher;
        Ok(())
    }

    pub fn set_case_sensitive(&self, case_sensitive: bool) -> Result<()> {
        let key = self.settings.read().key.clone();
        let matcher = Matcher::build(&key, case_sensitive)?;
        let mut settings = self.settings.write();
        settings.case_sensitive = case_sensitive;
        settings.matcher = matcher;
        Ok(())
    }

    pub fn set_mode(&self, mode: FilterMode) {
        self.settings.write().mode = mode;
    }

    pub fn set_color_index(&self, color_index: u8) {
        self.settings.write().color_index = color_index;
    }

    pub fn key(&self) -> String {
        self.settings.read().key.clone()
    }

    pub fn mode(&self) -> FilterMode {
        self.settings.read().mode
    }

    pub fn case_sensitive(&self) -> bool {
        self.settings.read().case_sensitive
    }

    pub fn color_index(&self) -> u8 {
        self.settings.read().color_index
    }

    fn annotate(settings: &Settings, line: &mut Line) {
        let ranges = settings.matcher.find_ranges(line.text());
        let hit = !ranges.is_empty();
        let first_hit = hit
            && !line.matched
            && matches!(line.status, LineStatus::WithoutStatus | LineStatus::Dimmed);

        match settings.mode {
            FilterMode::Match => {
                if !hit {
                    line.status = LineStatus::Hidden;
                } else if line.status == LineStatus::WithoutStatus {
                    line.status = LineStatus::Matched;
                }
            }
            FilterMode::Focus => {
                if hit {
                    if line.status == LineStatus::WithoutStatus {
                        line.status = LineStatus::Matched;
                    }
                } else if matches!(
                    line.status,
                    LineStatus::WithoutStatus | LineStatus::Matched
                ) {
                    line.status = LineStatus::Dimmed;
                }
            }
            FilterMode::Hide => {
                if ranges.iter().any(|r| !r.is_empty()) {
                    line.status = LineStatus::Hidden;
                }
                return;
            }
        }

        if first_hit && line.status != LineStatus::Hidden {
            line.matched = true;
        }
        if hit && line.status != LineStatus::Hidden {
            for range in ranges.into_iter().filter(|r| !r.is_empty()) {
                line.colorize(range, settings.color_index);
            }
        }
    }
}

impl Filter for StringFilter {
    fn get_line(&self, n: usize) -> Result<Line> {
        let mut line = self.upstream.get().get_line(n)?;
        let settings = self.settings.read();
        Self::annotate(&settings, &mut line);
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
