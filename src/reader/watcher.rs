//! Follow-mode change detection.
//!
//! Filesystem notifications wake the tail promptly; a periodic poll runs
//! alongside them because some filesystems (network mounts, rotated files)
//! never deliver events. Either wake-up just triggers another catch-up read.

use super::{catch_up, FileReader, SessionOptions};
use crate::reader::ContentUpdate;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Tail `reader` until cancelled, the coordinator goes away, or a read fails.
pub(crate) async fn follow(
    reader: &mut FileReader,
    tx: &mpsc::Sender<ContentUpdate>,
    options: &SessionOptions,
    cancellation_token: &CancellationToken,
) {
    let (wake_tx, mut wake_rx) = mpsc::unbounded_channel();
    // dropped at the end of the session, which unregisters the watch
    let _watcher = match watch_path(reader.path(), wake_tx) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            log::warn!(
                "cannot watch {}, polling every {:?}: {}",
                reader.path().display(),
                options.poll_interval,
                err
            );
            None
        }
    };

    let mut poll = tokio::time::interval(options.poll_interval);
    log::debug!("following {}", reader.path().display());

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            Some(()) = wake_rx.recv() => {},
            _ = poll.tick() => {},
        }
        // events arriving during a read are covered by that read
        while wake_rx.try_recv().is_ok() {}

        match catch_up(reader, tx, options.batch_lines, cancellation_token).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                log::warn!("tailing {} stopped: {}", reader.path().display(), err);
                break;
            }
        }
    }
    log::debug!("stopped following {}", reader.path().display());
}

fn watch_path(
    path: &Path,
    wake_tx: mpsc::UnboundedSender<()>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                let _ = wake_tx.send(());
            }
        }
        Err(err) => log::debug!("watch error: {}", err),
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
