//! Spawning the filter manager and talking to it.

use super::{Command, FilterManager, FilterSpec, Notification, Notifier};
use crate::config::Config;
use crate::display::Display;
use crate::error::{Result, SiftError};
use crate::filter::{Direction, Filter, FilterId, FilterMode, Pipeline, Source};
use crate::reader::{self, FileReader};
use crate::spinner::{self, BusySpinner};
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

impl FilterManager {
    /// Open the input, start the reader and spinner, and spawn the event loop.
    ///
    /// Failing to open the file is fatal and reported here; every later
    /// reader fault is logged and only stops tailing.
    pub fn spawn(
        config: Config,
        notifications: UnboundedSender<Notification>,
    ) -> Result<(FilterManagerHandle, JoinHandle<Result<()>>)> {
        Self::spawn_with_filters(config, Vec::new(), notifications)
    }

    /// Like [`FilterManager::spawn`], with `filters` installed before the
    /// first line is read. They get ids 1, 2, ... in order.
    pub fn spawn_with_filters(
        config: Config,
        filters: Vec<FilterSpec>,
        notifications: UnboundedSender<Notification>,
    ) -> Result<(FilterManagerHandle, JoinHandle<Result<()>>)> {
        let file_reader = match (&config.file_path, config.is_stdin) {
            (_, true) => None,
            (Some(path), false) => Some(FileReader::open(path)?),
            (None, false) => return Err(SiftError::invariant("no input file configured")),
        };

        let (command_tx, command_rx) = mpsc::channel(config.command_queue_capacity.max(1));
        let (content_tx, content_rx) = mpsc::channel(config.content_queue_capacity.max(1));

        let source = Arc::new(Source::new());
        let busy = Arc::new(BusySpinner::new());
        let pipeline = Pipeline::new(Arc::clone(&source), Arc::clone(&busy));
        let output = pipeline.output_filter();
        let shutdown = CancellationToken::new();
        let notifier = Notifier::new(notifications);

        let follow = config.follow;
        let mut manager = FilterManager {
            display: Arc::new(Mutex::new(Display::new(config.display_height))),
            config,
            pipeline,
            current_line: 0,
            notifier,
            content_tx,
            shutdown: shutdown.clone(),
            refresh: None,
            tail: None,
            parked_reader: file_reader,
            background: Vec::new(),
        };

        let mut next_id = 1;
        for spec in filters {
            manager.add_filter(FilterId(next_id), spec)?;
            next_id += 1;
        }

        let progress = manager.notifier.clone();
        manager.background.push(spinner::spawn_ticker(
            busy,
            manager.config.spinner_interval,
            shutdown.child_token(),
            move |state| progress.send(Notification::Progress(state)),
        ));
        if manager.config.is_stdin {
            manager.background.push(tokio::spawn(reader::run_stdin_session(
                manager.content_tx.clone(),
                manager.config.read_batch_lines,
                shutdown.child_token(),
            )));
        }
        manager.start_tail(follow);

        let handle = FilterManagerHandle {
            commands: command_tx,
            source,
            output,
            shutdown,
            next_id: Arc::new(AtomicU64::new(next_id)),
        };
        let task = tokio::spawn(manager.run(command_rx, content_rx));
        Ok((handle, task))
    }
}

/// Cloneable controller side of a running [`FilterManager`].
///
/// Commands are queued and processed in order; their outcome arrives as
/// [`Notification`]s, never as a return value.
#[derive(Clone)]
pub struct FilterManagerHandle {
    commands: mpsc::Sender<Command>,
    source: Arc<Source>,
    output: Arc<dyn Filter>,
    shutdown: CancellationToken,
    next_id: Arc<AtomicU64>,
}

impl FilterManagerHandle {
    /// Queue a command, waiting for room if the queue is full
    pub async fn submit(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SiftError::ChannelClosed)
    }

    pub async fn scroll_up(&self) -> Result<()> {
        self.submit(Command::ScrollUp).await
    }

    pub async fn scroll_down(&self) -> Result<()> {
        self.submit(Command::ScrollDown).await
    }

    pub async fn scroll_horizontal(&self, delta: isize) -> Result<()> {
        self.submit(Command::ScrollHorizontal(delta)).await
    }

    pub async fn page_up(&self) -> Result<()> {
        self.submit(Command::PageUp).await
    }

    pub async fn page_down(&self) -> Result<()> {
        self.submit(Command::PageDown).await
    }

    pub async fn home(&self) -> Result<()> {
        self.submit(Command::Home).await
    }

    pub async fn end(&self) -> Result<()> {
        self.submit(Command::End).await
    }

    pub async fn find_match(&self, direction: Direction) -> Result<()> {
        self.submit(Command::FindMatch(direction)).await
    }

    pub async fn set_display_height(&self, height: usize) -> Result<()> {
        self.submit(Command::SetDisplayHeight(height)).await
    }

    pub async fn set_current_line(&self, line: usize) -> Result<()> {
        self.submit(Command::SetCurrentLine(line)).await
    }

    pub async fn toggle_follow_mode(&self) -> Result<()> {
        self.submit(Command::ToggleFollowMode).await
    }

    /// Append a filter before the output cache and return the id that later
    /// commands use to address it.
    pub async fn add_filter(&self, spec: FilterSpec) -> Result<FilterId> {
        let id = FilterId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.submit(Command::AddFilter { id, spec }).await?;
        Ok(id)
    }

    pub async fn add_keyword_filter(
        &self,
        key: impl Into<String>,
        mode: FilterMode,
        case_sensitive: bool,
        color_index: u8,
    ) -> Result<FilterId> {
        self.add_filter(FilterSpec::Keyword {
            key: key.into(),
            mode,
            case_sensitive,
            color_index,
        })
        .await
    }

    pub async fn add_date_filter(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<FilterId> {
        self.add_filter(FilterSpec::DateRange { start, end }).await
    }

    pub async fn remove_filter(&self, id: FilterId) -> Result<()> {
        self.submit(Command::RemoveFilter(id)).await
    }

    pub async fn set_filter_key(&self, id: FilterId, key: impl Into<String>) -> Result<()> {
        self.submit(Command::SetFilterKey {
            id,
            key: key.into(),
        })
        .await
    }

    pub async fn set_filter_mode(&self, id: FilterId, mode: FilterMode) -> Result<()> {
        self.submit(Command::SetFilterMode { id, mode }).await
    }

    pub async fn set_case_sensitive(&self, id: FilterId, case_sensitive: bool) -> Result<()> {
        self.submit(Command::SetCaseSensitive { id, case_sensitive })
            .await
    }

    pub async fn set_filter_color(&self, id: FilterId, color_index: u8) -> Result<()> {
        self.submit(Command::SetFilterColor { id, color_index })
            .await
    }

    pub async fn set_date_range(
        &self,
        id: FilterId,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<()> {
        self.submit(Command::SetDateRange { id, start, end }).await
    }

    /// Widest line seen so far
    pub fn size(&self) -> usize {
        self.source.size()
    }

    /// Number of lines read so far
    pub fn source_length(&self) -> usize {
        self.source.length()
    }

    /// Read-only access to the filtered output
    pub fn output_filter(&self) -> Arc<dyn Filter> {
        Arc::clone(&self.output)
    }

    /// Stop the event loop and every task it started
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
