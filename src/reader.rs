//! Input readers feeding the coordinator's new-content queue.
//!
//! A file is read incrementally from a byte offset, one bounded chunk at a time,
//! so a large initial load streams into the viewer in batches instead of
//! arriving as one allocation. The same offset later drives tailing. Standard
//! input has no offset to resume from and is read once to EOF.
//!
//! Every send into the content queue races the session's cancellation token.
//! A batch that could not be delivered stays with the [`FileReader`] and goes
//! out first when the next session starts, so stopping and restarting a tail
//! never drops lines.

pub mod validation;
pub mod watcher;

use crate::error::Result;
use memchr::memchr_iter;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use validation::validate_file_path;

/// Largest slice of the file read in one go
pub const READ_CHUNK_BYTES: usize = 4 * 1024 * 1024;

/// How long stdin lines may sit in a partial batch before being flushed
const STDIN_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Message on the new-content queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentUpdate {
    /// Complete lines in file order
    Lines(Vec<String>),
    /// The initial load reached the end of the input
    EndOfInput,
}

/// Knobs for one reading session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Keep reading as the file grows
    pub follow: bool,
    /// Maximum lines per content update
    pub batch_lines: usize,
    /// Fallback polling interval while following
    pub poll_interval: Duration,
}

/// Outcome of handing a batch to the content queue
enum Delivery {
    Sent,
    Cancelled(Vec<String>),
    Closed,
}

/// Incremental reader over a growing file
#[derive(Debug)]
pub struct FileReader {
    path: PathBuf,
    /// Bytes consumed so far, including any incomplete trailing line
    offset: u64,
    /// Bytes after the last newline, waiting for the rest of their line
    pending: Vec<u8>,
    /// Lines read but not yet delivered
    backlog: Vec<String>,
    /// The initial load has been reported as finished
    load_reported: bool,
    chunk_bytes: usize,
}

impl FileReader {
    /// Open `path` for incremental reading after validating it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        validate_file_path(path)?;
        log::debug!("opened {} for reading", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            offset: 0,
            pending: Vec::new(),
            backlog: Vec::new(),
            load_reported: false,
            chunk_bytes: READ_CHUNK_BYTES,
        })
    }

    /// Cap the number of bytes read per chunk
    pub fn with_chunk_bytes(mut self, chunk_bytes: usize) -> Self {
        self.chunk_bytes = chunk_bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the complete lines available past the current offset, at most one
    /// chunk's worth. An empty result means the reader has caught up.
    ///
    /// A file that shrank below the offset is treated as truncated and read
    /// again from the start.
    pub async fn read_chunk(&mut self) -> Result<Vec<String>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        if len < self.offset {
            log::info!(
                "{} shrank from {} to {} bytes, rereading from the start",
                self.path.display(),
                self.offset,
                len
            );
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let want = (len - self.offset).min(self.chunk_bytes as u64);
        let mut buf = Vec::with_capacity(want as usize);
        let read = (&mut file).take(want).read_to_end(&mut buf).await?;
        self.offset += read as u64;

        Ok(self.split_lines(&buf))
    }

    /// Hand out an incomplete trailing line, if any
    pub fn take_pending(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.pending);
        Some(decode_line(&bytes))
    }

    fn split_lines(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        for newline in memchr_iter(b'\n', &self.pending) {
            lines.push(decode_line(&self.pending[start..newline]));
            start = newline + 1;
        }
        self.pending.drain(..start);
        lines
    }
}

/// Lossy UTF-8 decode with any trailing carriage return removed
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

async fn deliver(
    tx: &mpsc::Sender<ContentUpdate>,
    batch: Vec<String>,
    cancellation_token: &CancellationToken,
) -> Delivery {
    tokio::select! {
        permit = tx.reserve() => match permit {
            Ok(permit) => {
                permit.send(ContentUpdate::Lines(batch));
                Delivery::Sent
            }
            Err(_) => Delivery::Closed,
        },
        _ = cancellation_token.cancelled() => Delivery::Cancelled(batch),
    }
}

/// Deliver everything readable right now.
///
/// Returns `Ok(false)` when the session should stop: the token fired or the
/// coordinator is gone.
pub(crate) async fn catch_up(
    reader: &mut FileReader,
    tx: &mpsc::Sender<ContentUpdate>,
    batch_lines: usize,
    cancellation_token: &CancellationToken,
) -> Result<bool> {
    let batch_lines = batch_lines.max(1);
    let mut lines = std::mem::take(&mut reader.backlog);

    loop {
        if lines.is_empty() {
            if cancellation_token.is_cancelled() {
                return Ok(false);
            }
            lines = reader.read_chunk().await?;
            if lines.is_empty() {
                return Ok(true);
            }
        }

        let rest = if lines.len() > batch_lines {
            lines.split_off(batch_lines)
        } else {
            Vec::new()
        };
        match deliver(tx, lines, cancellation_token).await {
            Delivery::Sent => lines = rest,
            Delivery::Cancelled(mut unsent) => {
                unsent.extend(rest);
                reader.backlog = unsent;
                return Ok(false);
            }
            Delivery::Closed => return Ok(false),
        }
    }
}

/// Load `reader` to the end, then keep following it if asked to.
///
/// The first session to catch up reports [`ContentUpdate::EndOfInput`]; a
/// session that does not follow also flushes an unterminated last line first.
/// The reader is handed back so a later session can resume from its offset.
pub async fn run_file_session(
    mut reader: FileReader,
    tx: mpsc::Sender<ContentUpdate>,
    options: SessionOptions,
    cancellation_token: CancellationToken,
) -> FileReader {
    match catch_up(&mut reader, &tx, options.batch_lines, &cancellation_token).await {
        Ok(true) => {}
        Ok(false) => return reader,
        Err(err) => {
            log::warn!("reading {} failed: {}", reader.path.display(), err);
            return reader;
        }
    }

    if !options.follow {
        if let Some(last) = reader.take_pending() {
            match deliver(&tx, vec![last], &cancellation_token).await {
                Delivery::Sent => {}
                Delivery::Cancelled(unsent) => {
                    reader.backlog = unsent;
                    return reader;
                }
                Delivery::Closed => return reader,
            }
        }
    }

    if !reader.load_reported {
        if !send_end_of_input(&tx, &cancellation_token).await {
            return reader;
        }
        reader.load_reported = true;
    }

    if options.follow {
        watcher::follow(&mut reader, &tx, &options, &cancellation_token).await;
    }
    reader
}

/// Returns false if the session was cancelled or the queue closed first
async fn send_end_of_input(
    tx: &mpsc::Sender<ContentUpdate>,
    cancellation_token: &CancellationToken,
) -> bool {
    tokio::select! {
        sent = tx.send(ContentUpdate::EndOfInput) => sent.is_ok(),
        _ = cancellation_token.cancelled() => false,
    }
}

/// Read piped standard input to EOF in batches.
pub async fn run_stdin_session(
    tx: mpsc::Sender<ContentUpdate>,
    batch_lines: usize,
    cancellation_token: CancellationToken,
) {
    read_lines_from(tokio::io::stdin(), tx, batch_lines, cancellation_token).await
}

/// Batch lines from any async byte stream, flushing partial batches on a short
/// timer so slow producers still show up promptly.
pub async fn read_lines_from<R>(
    input: R,
    tx: mpsc::Sender<ContentUpdate>,
    batch_lines: usize,
    cancellation_token: CancellationToken,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let batch_lines = batch_lines.max(1);
    let mut segments = BufReader::new(input).split(b'\n');
    let mut batch: Vec<String> = Vec::new();
    let mut flush = tokio::time::interval(STDIN_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => return,
            next = segments.next_segment() => match next {
                Ok(Some(segment)) => {
                    batch.push(decode_line(&segment));
                    if batch.len() >= batch_lines
                        && !matches!(
                            deliver(&tx, std::mem::take(&mut batch), &cancellation_token).await,
                            Delivery::Sent
                        )
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    log::warn!("reading stdin failed: {}", err);
                    break;
                }
            },
            _ = flush.tick(), if !batch.is_empty() => {
                if !matches!(
                    deliver(&tx, std::mem::take(&mut batch), &cancellation_token).await,
                    Delivery::Sent
                ) {
                    return;
                }
            }
        }
    }

    if !batch.is_empty()
        && !matches!(deliver(&tx, batch, &cancellation_token).await, Delivery::Sent)
    {
        return;
    }
    send_end_of_input(&tx, &cancellation_token).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn options(follow: bool, batch_lines: usize) -> SessionOptions {
        SessionOptions {
            follow,
            batch_lines,
            poll_interval: Duration::from_millis(20),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ContentUpdate>) -> (Vec<String>, bool) {
        let mut lines = Vec::new();
        let mut ended = false;
        while let Ok(update) = rx.try_recv() {
            match update {
                ContentUpdate::Lines(batch) => lines.extend(batch),
                ContentUpdate::EndOfInput => ended = true,
            }
        }
        (lines, ended)
    }

    #[tokio::test]
    async fn test_read_chunk_keeps_partial_line() {
        let mut file = write_file(b"first\r\nsecond\nthi");
        let mut reader = FileReader::open(file.path()).unwrap();

        let lines = reader.read_chunk().await.unwrap();
        assert_eq!(lines, vec!["first", "second"]);
        assert_eq!(reader.offset(), 17);

        file.write_all(b"rd\n").unwrap();
        file.flush().unwrap();
        assert_eq!(reader.read_chunk().await.unwrap(), vec!["third"]);
        assert!(reader.read_chunk().await.unwrap().is_empty());
        assert_eq!(reader.take_pending(), None);
    }

    #[tokio::test]
    async fn test_small_chunks_split_lines_across_reads() {
        let file = write_file(b"alpha\nbeta\ngamma\n");
        let mut reader = FileReader::open(file.path()).unwrap().with_chunk_bytes(4);

        let mut lines = Vec::new();
        for _ in 0..10 {
            lines.extend(reader.read_chunk().await.unwrap());
        }
        assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_truncation_rereads_from_start() {
        let file = write_file(b"one\ntwo\nthree\n");
        let mut reader = FileReader::open(file.path()).unwrap();
        assert_eq!(reader.read_chunk().await.unwrap().len(), 3);

        std::fs::write(file.path(), b"new\n").unwrap();
        assert_eq!(reader.read_chunk().await.unwrap(), vec!["new"]);
    }

    #[tokio::test]
    async fn test_session_batches_and_flushes_pending() {
        let file = write_file(b"a\nb\nc\nd\ne");
        let reader = FileReader::open(file.path()).unwrap();
        let (tx, mut rx) = mpsc::channel(16);

        let reader =
            run_file_session(reader, tx, options(false, 2), CancellationToken::new()).await;

        let mut batches = Vec::new();
        while let Ok(update) = rx.try_recv() {
            batches.push(update);
        }
        assert_eq!(
            batches,
            vec![
                ContentUpdate::Lines(vec!["a".into(), "b".into()]),
                ContentUpdate::Lines(vec!["c".into(), "d".into()]),
                ContentUpdate::Lines(vec!["e".into()]),
                ContentUpdate::EndOfInput,
            ]
        );
        assert_eq!(reader.offset(), 9);
    }

    #[tokio::test]
    async fn test_cancelled_session_keeps_undelivered_lines() {
        let file = write_file(b"a\nb\nc\n");
        let reader = FileReader::open(file.path()).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let token = CancellationToken::new();

        let session = tokio::spawn(run_file_session(
            reader,
            tx.clone(),
            options(false, 1),
            token.clone(),
        ));
        // one batch fills the queue; the session then blocks until cancelled
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        let reader = session.await.unwrap();

        let (first, _) = drain(&mut rx);
        assert_eq!(first, vec!["a"]);

        let session = tokio::spawn(run_file_session(
            reader,
            tx,
            options(false, 8),
            CancellationToken::new(),
        ));
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(next, Some(ContentUpdate::Lines(vec!["b".into(), "c".into()])));
        let next = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(next, Some(ContentUpdate::EndOfInput));
        assert_eq!(session.await.unwrap().offset(), 6);
    }

    #[tokio::test]
    async fn test_read_lines_from_stream() {
        let (tx, mut rx) = mpsc::channel(16);
        let input: &[u8] = b"x\ny\r\nz";

        read_lines_from(input, tx, 2, CancellationToken::new()).await;

        let (lines, ended) = drain(&mut rx);
        assert_eq!(lines, vec!["x", "y", "z"]);
        assert!(ended);
    }
}
