//! Download-and-parse task: one remote entry from retrieval to output channel
//!
//! Each entry runs in its own transfer session, opened here and closed on
//! every exit path. Decompression and parsing are synchronous, so they run on
//! the blocking pool fed through [`SyncIoBridge`].

use crate::config::TransferConfig;
use crate::decompress::Compression;
use crate::error::{EntryError, ParseError, ParseErrorKind};
use crate::transfer::{ByteStream, TransferClient, TransferSession, open_session};
use crate::types::{Event, RemoteEntry};
use crate::zone::{RecordParser, origin_from_entry_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::{broadcast, mpsc};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// How long closing a session may take once the run is cancelled
const CANCELLED_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Everything a worker needs to process entries, cloned once per worker
#[derive(Clone)]
pub(crate) struct EntryTaskContext {
    pub(crate) client: Arc<dyn TransferClient>,
    pub(crate) parser: Arc<dyn RecordParser>,
    pub(crate) transfer: Arc<TransferConfig>,
    pub(crate) output_tx: mpsc::Sender<String>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel_token: CancellationToken,
    /// Derive the zone origin from the entry name instead of starting empty
    pub(crate) infer_origin: bool,
}

/// Counters for one entry
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct EntryStats {
    /// Records forwarded to the output channel
    pub(crate) records: u64,
    /// Malformed records skipped
    pub(crate) skipped: u64,
}

/// How one entry ended
#[derive(Debug)]
pub(crate) struct EntryOutcome {
    pub(crate) stats: EntryStats,
    pub(crate) result: Result<(), EntryError>,
}

/// Process one entry in a fresh session and report the result
///
/// Never fails: every error is contained to the entry, logged and broadcast as
/// [`Event::EntryFailed`].
pub(crate) async fn run_entry_task(
    ctx: &EntryTaskContext,
    entry: &RemoteEntry,
    worker: usize,
) -> EntryOutcome {
    let name = entry.name.as_str();
    ctx.event_tx
        .send(Event::EntryStarted {
            name: name.to_string(),
            worker,
        })
        .ok();
    tracing::debug!(entry = %name, worker, size = entry.size, "Entry started");

    let mut stats = EntryStats::default();
    let opened = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => Err(EntryError::Cancelled),
        session = open_session(ctx.client.as_ref(), ctx.transfer.credentials()) => {
            session.map_err(EntryError::from)
        }
    };

    let result = match opened {
        Ok(mut session) => {
            let result = process_entry(ctx, entry, session.as_mut(), &mut stats).await;
            close_session(ctx, name, session).await;
            result
        }
        Err(e) => Err(e),
    };

    match &result {
        Ok(()) => {
            tracing::debug!(
                entry = %name,
                worker,
                records = stats.records,
                skipped = stats.skipped,
                "Entry complete"
            );
            ctx.event_tx
                .send(Event::EntryComplete {
                    name: name.to_string(),
                    records: stats.records,
                    skipped: stats.skipped,
                })
                .ok();
        }
        Err(e) => {
            tracing::warn!(
                entry = %name,
                worker,
                records = stats.records,
                error = %e,
                "Entry abandoned"
            );
            ctx.event_tx
                .send(Event::EntryFailed {
                    name: name.to_string(),
                    error: e.to_string(),
                    records: stats.records,
                })
                .ok();
        }
    }

    EntryOutcome { stats, result }
}

/// Close an entry's session, bounded by a short grace once the run is cancelled
///
/// A stalled server must not hold the run past its deadline; the socket is
/// released when the session drops.
async fn close_session(ctx: &EntryTaskContext, name: &str, session: Box<dyn TransferSession>) {
    let closed = if ctx.cancel_token.is_cancelled() {
        match tokio::time::timeout(CANCELLED_CLOSE_GRACE, session.close()).await {
            Ok(closed) => closed,
            Err(_) => {
                tracing::debug!(entry = %name, "Session close abandoned after cancellation");
                return;
            }
        }
    } else {
        session.close().await
    };
    if let Err(e) = closed {
        tracing::debug!(entry = %name, error = %e, "Failed to close entry session");
    }
}

/// Retrieve `entry` through `session` and forward its records
///
/// The session is borrowed; closing it is the caller's job.
pub(crate) async fn process_entry(
    ctx: &EntryTaskContext,
    entry: &RemoteEntry,
    session: &mut dyn TransferSession,
    stats: &mut EntryStats,
) -> Result<(), EntryError> {
    let path = ctx.transfer.entry_path(&entry.name);
    let stream = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => return Err(EntryError::Cancelled),
        stream = session.retrieve(&path) => stream?,
    };

    let origin = if ctx.infer_origin {
        origin_from_entry_name(&entry.name)
    } else {
        String::new()
    };

    let job = ParseJob {
        name: entry.name.clone(),
        origin,
        compression: Compression::for_name(&entry.name),
        // The bridge must be created on the runtime; it is only read from the blocking pool
        input: SyncIoBridge::new(Cancellable::new(stream, ctx.cancel_token.clone())),
        parser: Arc::clone(&ctx.parser),
        output_tx: ctx.output_tx.clone(),
        event_tx: ctx.event_tx.clone(),
        cancel_token: ctx.cancel_token.clone(),
    };

    // Offload decompression + parsing so runtime threads keep driving other transfers
    let (parsed, result) = tokio::task::spawn_blocking(move || job.run())
        .await
        .map_err(|e| EntryError::TaskFailed(e.to_string()))?;

    *stats = parsed;
    result
}

/// Blocking half of an entry: decompress, parse, forward
struct ParseJob {
    name: String,
    origin: String,
    compression: Compression,
    input: SyncIoBridge<Cancellable<ByteStream>>,
    parser: Arc<dyn RecordParser>,
    output_tx: mpsc::Sender<String>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl ParseJob {
    fn run(self) -> (EntryStats, Result<(), EntryError>) {
        let mut stats = EntryStats::default();
        let result = self.forward_records(&mut stats);
        (stats, result)
    }

    fn forward_records(self, stats: &mut EntryStats) -> Result<(), EntryError> {
        let reader = self.compression.wrap(self.input).map_err(|e| {
            if self.cancel_token.is_cancelled() {
                EntryError::Cancelled
            } else {
                EntryError::from(e)
            }
        })?;

        for record in self.parser.records(reader, &self.origin, &self.name) {
            if self.cancel_token.is_cancelled() {
                return Err(EntryError::Cancelled);
            }
            match record {
                Ok(record) => {
                    self.output_tx
                        .blocking_send(record.to_string())
                        .map_err(|_| EntryError::OutputClosed)?;
                    stats.records += 1;
                }
                Err(ParseError {
                    kind: ParseErrorKind::Io(source),
                    ..
                }) => {
                    if self.cancel_token.is_cancelled() {
                        return Err(EntryError::Cancelled);
                    }
                    return Err(EntryError::Read(source));
                }
                Err(e) => {
                    stats.skipped += 1;
                    tracing::warn!(entry = %self.name, line = e.line, error = %e.kind, "Skipping malformed record");
                    self.event_tx
                        .send(Event::RecordSkipped {
                            name: self.name.clone(),
                            line: e.line,
                            error: e.kind.to_string(),
                        })
                        .ok();
                }
            }
        }
        Ok(())
    }
}

/// Byte stream that fails once the run is cancelled
///
/// Lets the blocking parser give up on a stalled transfer.
pub(crate) struct Cancellable<R> {
    inner: R,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl<R> Cancellable<R> {
    pub(crate) fn new(inner: R, token: CancellationToken) -> Self {
        Self {
            inner,
            cancelled: Box::pin(token.cancelled_owned()),
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Cancellable<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Poll::Ready(Err(std::io::Error::other("entry cancelled")));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}
