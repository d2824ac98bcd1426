//! Filter manager: the single coordinator that owns the pipeline and viewport.
//!
//! Every state mutation happens on the manager's event loop, which drains two
//! bounded queues: commands from the controller and new content from the
//! reader. Filter and attribute changes re-render the viewport on a blocking
//! worker so a slow scan never stalls the loop; navigation commands wait for
//! any such refresh to land first and then run inline.

pub mod messages;
pub mod runtime;

pub use messages::{Command, FilterSpec, Notification, Notifier};
pub use runtime::FilterManagerHandle;

use crate::config::Config;
use crate::display::Display;
use crate::error::{Result, SiftError};
use crate::filter::{
    ChainWalker, DateFilter, Direction, Filter, FilterId, FilterNode, Pipeline, StringFilter,
};
use crate::reader::{self, ContentUpdate, FileReader, SessionOptions};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// In-flight asynchronous viewport refresh
struct RefreshTask {
    token: CancellationToken,
    handle: JoinHandle<Result<()>>,
}

impl RefreshTask {
    /// Wait for the walk to end; a non-recoverable failure comes back here
    async fn join(self) -> Result<()> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                log::error!("refresh task failed: {}", err);
                Ok(())
            }
        }
    }
}

/// Running file reading session
struct TailSession {
    token: CancellationToken,
    handle: JoinHandle<FileReader>,
}

/// Coordinator state; see [`FilterManager::spawn`] to start one.
pub struct FilterManager {
    config: Config,
    pipeline: Pipeline,
    display: Arc<Mutex<Display>>,
    /// Anchor of the viewport: the line number the window starts at
    current_line: usize,
    notifier: Notifier,
    content_tx: mpsc::Sender<ContentUpdate>,
    shutdown: CancellationToken,
    refresh: Option<RefreshTask>,
    tail: Option<TailSession>,
    /// Reader handed back by a finished session, ready to resume
    parked_reader: Option<FileReader>,
    background: Vec<JoinHandle<()>>,
}

impl FilterManager {
    /// Event loop; returns when shut down, when every command sender is gone,
    /// or with the first non-recoverable error.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut content: mpsc::Receiver<ContentUpdate>,
    ) -> Result<()> {
        log::info!("filter manager started for {}", self.config.source_name());

        let outcome = loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break Ok(()),
                Some(update) = content.recv() => {
                    if let Err(err) = self.on_content(update).await {
                        if let Err(fatal) = self.report(err) {
                            break Err(fatal);
                        }
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        log::debug!("all command senders dropped");
                        break Ok(());
                    };
                    log::trace!("command {:?}", command);
                    if let Err(err) = self.handle_command(command).await {
                        if let Err(fatal) = self.report(err) {
                            break Err(fatal);
                        }
                    }
                }
            }
        };

        self.stop_background().await;
        match &outcome {
            Ok(()) => log::info!("filter manager stopped"),
            Err(err) => log::error!("filter manager failed: {}", err),
        }
        outcome
    }

    /// Beep on recoverable errors, hand back the rest
    fn report(&self, err: SiftError) -> Result<()> {
        if err.is_recoverable() {
            log::debug!("recoverable: {}", err);
            self.notifier.beep(err.to_string());
            Ok(())
        } else {
            Err(err)
        }
    }

    async fn handle_command(&mut self, command: Command) -> Result<()> {
        match command {
            Command::ScrollUp => self.navigate(|display, walker| display.scroll_up(walker)).await,
            Command::ScrollDown => {
                self.navigate(|display, walker| display.scroll_down(walker)).await
            }
            Command::PageUp => {
                self.navigate(|display, walker| scroll_page(display, walker, Direction::Up))
                    .await
            }
            Command::PageDown => {
                self.navigate(|display, walker| scroll_page(display, walker, Direction::Down))
                    .await
            }
            Command::Home => {
                self.navigate(|display, walker| display.refresh(walker, 0).map(|()| 0))
                    .await
            }
            Command::End => self.navigate(|display, walker| display.scroll_end(walker)).await,
            Command::FindMatch(direction) => {
                let anchor = self.current_line;
                self.navigate(move |display, walker| display.find_match(walker, direction, anchor))
                    .await
            }
            Command::ScrollHorizontal(delta) => {
                let anchor = self.current_line;
                self.navigate(move |display, walker| {
                    display
                        .scroll_horizontal(delta, walker.size())
                        .map(|()| anchor)
                })
                .await
            }
            Command::SetCurrentLine(line) => {
                self.navigate(move |display, walker| {
                    if line >= walker.length() {
                        return Err(SiftError::OutOfBounds { line });
                    }
                    display.refresh(walker, line).map(|()| line)
                })
                .await
            }
            Command::SetDisplayHeight(height) => {
                let anchor = self.current_line;
                let follow = self.config.follow;
                self.navigate(move |display, walker| {
                    display.set_height(height);
                    if follow {
                        display.scroll_end(walker)
                    } else {
                        display.refresh(walker, anchor).map(|()| anchor)
                    }
                })
                .await
            }
            Command::AddFilter { id, spec } => {
                self.add_filter(id, spec)?;
                self.reconfigured().await
            }
            Command::RemoveFilter(id) => {
                let removed = self.pipeline.remove(id)?;
                log::debug!("removed {} filter {}", removed.kind(), id);
                self.reconfigured().await
            }
            Command::SetFilterKey { id, key } => {
                self.keyword(id)?.set_key(&key)?;
                self.reconfigured().await
            }
            Command::SetFilterMode { id, mode } => {
                self.keyword(id)?.set_mode(mode);
                self.reconfigured().await
            }
            Command::SetCaseSensitive { id, case_sensitive } => {
                self.keyword(id)?.set_case_sensitive(case_sensitive)?;
                self.reconfigured().await
            }
            Command::SetFilterColor { id, color_index } => {
                self.keyword(id)?.set_color_index(color_index);
                self.reconfigured().await
            }
            Command::SetDateRange { id, start, end } => {
                let filter = self.date(id)?;
                // the bound search reads through the chain
                self.settle_refresh().await?;
                filter.set_range(start, end)?;
                self.reconfigured().await
            }
            Command::ToggleFollowMode => self.toggle_follow().await,
        }
    }

    fn keyword(&self, id: FilterId) -> Result<Arc<StringFilter>> {
        match self.pipeline.get(id) {
            Some(FilterNode::Keyword(filter)) => Ok(Arc::clone(filter)),
            _ => Err(SiftError::NotFound),
        }
    }

    fn date(&self, id: FilterId) -> Result<Arc<DateFilter>> {
        match self.pipeline.get(id) {
            Some(FilterNode::Date(filter)) => Ok(Arc::clone(filter)),
            _ => Err(SiftError::NotFound),
        }
    }

    fn add_filter(&mut self, id: FilterId, spec: FilterSpec) -> Result<()> {
        // the pipeline relinks the upstream on insertion
        let upstream = Arc::clone(self.pipeline.source()) as Arc<dyn Filter>;
        match spec {
            FilterSpec::Keyword {
                key,
                mode,
                case_sensitive,
                color_index,
            } => {
                let filter =
                    StringFilter::new(upstream, &key, mode, case_sensitive, color_index)?;
                self.pipeline.add(id, FilterNode::Keyword(Arc::new(filter)))?;
                log::debug!("added {} filter {} for {:?}", mode, id, key);
            }
            FilterSpec::DateRange { start, end } => {
                let filter = Arc::new(DateFilter::new(upstream));
                self.pipeline.add(id, FilterNode::Date(Arc::clone(&filter)))?;
                if start.is_some() || end.is_some() {
                    filter.set_range(start, end)?;
                }
                log::debug!(
                    "added date filter {} for [{}, {})",
                    id,
                    filter.start_line_no(),
                    filter.end_line_no()
                );
            }
        }
        Ok(())
    }

    /// Run a viewport operation inline and publish the result.
    ///
    /// The closure returns the new anchor. Any in-flight refresh lands first so
    /// the operation sees the window the user is looking at.
    async fn navigate<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&mut Display, &ChainWalker) -> Result<usize>,
    {
        self.settle_refresh().await?;
        let walker = self.pipeline.walker();
        let snapshot = {
            let mut display = self.display.lock();
            self.current_line = op(&mut display, &walker)?;
            display.snapshot()
        };
        self.notifier.display_changed(snapshot);
        Ok(())
    }

    /// Filter topology or attributes changed
    async fn reconfigured(&mut self) -> Result<()> {
        self.pipeline.invalidate_caches();
        self.refresh_async().await
    }

    /// Re-render from the current anchor on a blocking worker, superseding any
    /// refresh still running.
    async fn refresh_async(&mut self) -> Result<()> {
        if let Some(previous) = self.refresh.take() {
            previous.token.cancel();
            previous.join().await?;
        }

        let token = self.shutdown.child_token();
        let task_token = token.clone();
        let walker = self.pipeline.walker();
        let display = Arc::clone(&self.display);
        let notifier = self.notifier.clone();
        let anchor = self.current_line;

        let handle = tokio::task::spawn_blocking(move || {
            let height = display.lock().height();
            match Display::collect_rows(&walker, anchor, height, Some(&task_token)) {
                Ok(Some(rows)) if !task_token.is_cancelled() => {
                    let snapshot = {
                        let mut display = display.lock();
                        display.install(rows, walker.length());
                        display.snapshot()
                    };
                    notifier.display_changed(snapshot);
                    Ok(())
                }
                Ok(_) => {
                    log::debug!("refresh from line {} superseded", anchor);
                    Ok(())
                }
                Err(err) if err.is_recoverable() => {
                    log::debug!("refresh from line {} failed: {}", anchor, err);
                    notifier.beep(err.to_string());
                    Ok(())
                }
                Err(err) => Err(err),
            }
        });
        self.refresh = Some(RefreshTask { token, handle });
        Ok(())
    }

    /// Wait for an in-flight refresh to finish without cancelling it
    async fn settle_refresh(&mut self) -> Result<()> {
        match self.refresh.take() {
            Some(task) => task.join().await,
            None => Ok(()),
        }
    }

    async fn on_content(&mut self, update: ContentUpdate) -> Result<()> {
        let lines = match update {
            ContentUpdate::Lines(lines) => lines,
            ContentUpdate::EndOfInput => {
                log::debug!("initial load of {} finished", self.config.source_name());
                self.notifier.send(Notification::EndOfInput);
                return Ok(());
            }
        };

        let total = self.pipeline.source().append(lines);
        self.settle_refresh().await?;
        let rebounded = self.pipeline.refresh_date_bounds()?;
        if rebounded {
            self.pipeline.invalidate_caches();
        }
        let walker = self.pipeline.walker();

        let (changed, percentage) = {
            let mut display = self.display.lock();
            let changed = if self.config.follow {
                self.current_line = display.scroll_end(&walker)?;
                true
            } else if rebounded || display.has_vacant_rows() {
                display.refresh(&walker, self.current_line)?;
                true
            } else {
                display.update_total(total);
                false
            };
            let snapshot = changed.then(|| display.snapshot());
            (snapshot, display.percentage())
        };

        self.notifier.send(Notification::FileChanged {
            total_length: total,
            percentage,
        });
        if let Some(snapshot) = changed {
            self.notifier.display_changed(snapshot);
        }
        Ok(())
    }

    async fn toggle_follow(&mut self) -> Result<()> {
        if !self.config.follow {
            self.config.follow = true;
            log::info!("follow mode on");
            self.navigate(|display, walker| display.scroll_end(walker)).await?;
            if !self.config.is_stdin {
                self.stop_tail().await;
                self.start_tail(true);
            }
            return Ok(());
        }

        self.settle_refresh().await?;
        let at_end = {
            let walker = self.pipeline.walker();
            self.display.lock().is_at_end(&walker)
        };
        if at_end {
            self.config.follow = false;
            log::info!("follow mode off");
            self.stop_tail().await;
            Ok(())
        } else {
            self.navigate(|display, walker| display.scroll_end(walker)).await
        }
    }

    /// Start a reading session on the parked reader, if there is one
    fn start_tail(&mut self, follow: bool) {
        let Some(reader) = self.parked_reader.take() else {
            return;
        };
        let token = self.shutdown.child_token();
        let options = SessionOptions {
            follow,
            batch_lines: self.config.read_batch_lines,
            poll_interval: self.config.poll_interval,
        };
        let handle = tokio::spawn(reader::run_file_session(
            reader,
            self.content_tx.clone(),
            options,
            token.clone(),
        ));
        self.tail = Some(TailSession { token, handle });
    }

    /// Cancel the reading session and keep its reader for resumption
    async fn stop_tail(&mut self) {
        if let Some(session) = self.tail.take() {
            session.token.cancel();
            match session.handle.await {
                Ok(reader) => self.parked_reader = Some(reader),
                Err(err) => log::error!("reader task failed: {}", err),
            }
        }
    }

    async fn stop_background(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.refresh.take() {
            task.token.cancel();
            let _ = task.handle.await;
        }
        self.stop_tail().await;
        for handle in self.background.drain(..) {
            if let Err(err) = handle.await {
                log::error!("background task failed: {}", err);
            }
        }
    }
}

/// Scroll a full page one line at a time. Stopping early at a bound still
/// counts as a move; only a page that cannot move at all is an error.
fn scroll_page(
    display: &mut Display,
    walker: &ChainWalker,
    direction: Direction,
) -> Result<usize> {
    let mut anchor = None;
    for _ in 0..display.height().max(1) {
        let step = match direction {
            Direction::Up => display.scroll_up(walker),
            Direction::Down => display.scroll_down(walker),
        };
        match step {
            Ok(next) => anchor = Some(next),
            Err(SiftError::OutOfBounds { .. }) if anchor.is_some() => break,
            Err(err) => return Err(err),
        }
    }
    anchor.ok_or(SiftError::OutOfBounds { line: 0 })
}
