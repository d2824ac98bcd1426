//! Runtime configuration consumed by the filter manager.
//!
//! Flag and config-file parsing live in the binary; the library only sees the
//! resulting values.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of viewport rows when the caller never sets a height
pub const DEFAULT_DISPLAY_HEIGHT: usize = 40;

/// Configuration for a viewing session
#[derive(Debug, Clone)]
pub struct Config {
    /// Keep the viewport pinned to the end of the source as it grows
    pub follow: bool,

    /// File being viewed (None when reading from stdin)
    pub file_path: Option<PathBuf>,

    /// Input arrives through a pipe rather than a regular file
    pub is_stdin: bool,

    /// Initial viewport height in rows
    pub display_height: usize,

    /// Capacity of the bounded command queue
    pub command_queue_capacity: usize,

    /// Capacity of the bounded new-content queue
    pub content_queue_capacity: usize,

    /// How often the busy spinner drains its progress signal
    pub spinner_interval: Duration,

    /// Fallback polling interval for the file watcher
    pub poll_interval: Duration,

    /// Maximum number of lines the reader sends per content update
    pub read_batch_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            follow: false,
            file_path: None,
            is_stdin: false,
            display_height: DEFAULT_DISPLAY_HEIGHT,
            command_queue_capacity: 64,
            content_queue_capacity: 16,
            spinner_interval: Duration::from_millis(100),
            poll_interval: Duration::from_millis(500),
            read_batch_lines: 4096,
        }
    }
}

impl Config {
    /// Configuration for viewing a regular file
    pub fn for_file(path: impl AsRef<Path>) -> Self {
        Self {
            file_path: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    /// Configuration for viewing piped input
    pub fn for_stdin() -> Self {
        Self {
            is_stdin: true,
            ..Self::default()
        }
    }

    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn with_display_height(mut self, height: usize) -> Self {
        self.display_height = height;
        self
    }

    /// Override timing knobs from `LOGSIFT_POLL_MS` and `LOGSIFT_SPINNER_MS`
    pub fn apply_env(mut self) -> Self {
        if let Some(ms) = env_millis("LOGSIFT_POLL_MS") {
            self.poll_interval = ms;
        }
        if let Some(ms) = env_millis("LOGSIFT_SPINNER_MS") {
            self.spinner_interval = ms;
        }
        self
    }

    /// Display name for status messages
    pub fn source_name(&self) -> String {
        match &self.file_path {
            Some(path) => path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            None => "<stdin>".to_string(),
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let config = Config::for_file("/var/log/app.log").with_follow(true);
        assert!(config.follow);
        assert!(!config.is_stdin);
        assert_eq!(config.source_name(), "app.log");

        let config = Config::for_stdin().with_display_height(5);
        assert!(config.is_stdin);
        assert_eq!(config.display_height, 5);
        assert_eq!(config.source_name(), "<stdin>");
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.follow);
        assert_eq!(config.display_height, DEFAULT_DISPLAY_HEIGHT);
        assert!(config.read_batch_lines > 0);
    }
}
