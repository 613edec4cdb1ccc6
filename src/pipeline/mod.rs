//! Run orchestration
//!
//! A [`Pipeline`] owns every channel of a run and wires them together:
//!
//! ```text
//! listing -> filter -> job queue -> workers -> output channel -> writer
//! ```
//!
//! The writer is started before the listing is fetched and is only joined
//! after every worker has returned and the orchestrator's own output sender
//! has been dropped, so no line is lost on either end.

mod task;
mod worker;
mod writer;

pub use writer::{OutputWriter, normalize_line};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::filter::{filter_canonical, sort_largest_first};
use crate::listing::list_entries;
use crate::transfer::TransferClient;
use crate::types::{Event, RemoteEntry, RunSummary};
use crate::zone::{MasterFileParser, RecordParser};
use std::sync::Arc;
use task::EntryTaskContext;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// One configured retrieval run
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use zonefile_dl::{Config, FtpClient, Pipeline};
///
/// # async fn run() -> zonefile_dl::Result<()> {
/// let config = Config::default();
/// let client = FtpClient::from_config(&config.transfer);
/// let pipeline = Pipeline::new(config, Arc::new(client));
///
/// let summary = pipeline.run().await?;
/// println!("{} lines written", summary.records_written);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: Config,
    client: Arc<dyn TransferClient>,
    parser: Arc<dyn RecordParser>,
    cancel_token: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Create a pipeline that talks to the server through `client`
    pub fn new(config: Config, client: Arc<dyn TransferClient>) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            client,
            parser: Arc::new(MasterFileParser),
            cancel_token: CancellationToken::new(),
            event_tx,
        }
    }

    /// Replace the record parser
    pub fn with_parser(mut self, parser: Arc<dyn RecordParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Stop the run when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Subscribe to run events
    ///
    /// Events sent while nobody is subscribed are dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that cancels this pipeline's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute one run
    ///
    /// Fails only for fatal conditions: invalid configuration, an output file
    /// that cannot be created or written, or a listing that cannot be fetched.
    /// Entry and record failures are reported through events and the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        self.config.validate()?;
        let settings = &self.config.pipeline;

        let writer = OutputWriter::create(&settings.output_path).await?;
        let (output_tx, output_rx) = mpsc::channel(settings.output_buffer);
        let writer_handle = writer.spawn(output_rx);

        // Deadline cancels this run only, never the caller's token
        let cancel = self.cancel_token.child_token();
        let deadline = settings.deadline.map(|after| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                tracing::warn!(deadline_secs = after.as_secs(), "Run deadline reached, cancelling");
                cancel.cancel();
            })
        });

        let dispatched = self.dispatch(&cancel, output_tx).await;

        let written = match writer_handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("output writer task failed: {}", e))),
        };
        if let Some(timer) = deadline {
            timer.abort();
        }

        let mut summary = dispatched?;
        summary.records_written = written?;
        summary.cancelled = cancel.is_cancelled();

        tracing::info!(
            listed = summary.entries_listed,
            selected = summary.entries_selected,
            succeeded = summary.entries_succeeded,
            failed = summary.entries_failed,
            records = summary.records_written,
            skipped = summary.records_skipped,
            cancelled = summary.cancelled,
            "Run finished"
        );
        self.event_tx
            .send(Event::Finished {
                summary: summary.clone(),
            })
            .ok();
        Ok(summary)
    }

    /// List, filter, fan out to workers and wait for them
    ///
    /// Takes ownership of the orchestrator's output sender so it is dropped
    /// right after the completion barrier.
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        output_tx: mpsc::Sender<String>,
    ) -> Result<RunSummary> {
        let settings = &self.config.pipeline;
        let mut summary = RunSummary::default();

        let listed = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Run cancelled before the listing completed");
                return Ok(summary);
            }
            listed = list_entries(self.client.as_ref(), &self.config.transfer) => listed?,
        };
        summary.entries_listed = listed.len();

        let selected = self.select_entries(listed);
        summary.entries_selected = selected.len();
        tracing::info!(
            listed = summary.entries_listed,
            selected = summary.entries_selected,
            workers = settings.workers,
            "Dispatching entries"
        );
        self.event_tx
            .send(Event::ListingComplete {
                listed: summary.entries_listed,
                selected: summary.entries_selected,
            })
            .ok();

        let ctx = EntryTaskContext {
            client: Arc::clone(&self.client),
            parser: Arc::clone(&self.parser),
            transfer: Arc::new(self.config.transfer.clone()),
            output_tx,
            event_tx: self.event_tx.clone(),
            cancel_token: cancel.clone(),
            infer_origin: settings.infer_origin,
        };

        let (job_tx, jobs) = worker::job_queue(settings.effective_queue_capacity());
        let handles = worker::spawn_workers(settings.workers, jobs, ctx);

        for entry in selected {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!("Run cancelled, no further entries enqueued");
                    break;
                }
                sent = job_tx.send(entry) => {
                    if sent.is_err() {
                        tracing::warn!("All workers stopped, no further entries enqueued");
                        break;
                    }
                }
            }
        }
        // Closing the queue tells workers no more work is coming
        drop(job_tx);

        let (report, panicked) = worker::join_workers(handles).await;
        summary.entries_succeeded = report.succeeded;
        summary.entries_failed = report.failed;
        summary.records_skipped = report.records_skipped;
        summary.workers_panicked = panicked;
        Ok(summary)
    }

    /// Reduce the raw listing to the entries workers will process
    fn select_entries(&self, listed: Vec<RemoteEntry>) -> Vec<RemoteEntry> {
        let settings = &self.config.pipeline;

        let mut selected = if settings.filter_compressed {
            filter_canonical(&listed)
        } else {
            listed.into_iter().filter(|e| !e.is_pseudo()).collect()
        };
        if settings.largest_first {
            sort_largest_first(&mut selected);
        }

        selected.retain(|entry| {
            if entry.is_directory {
                tracing::debug!(entry = %entry.name, "Skipping directory entry");
            }
            !entry.is_directory
        });
        selected
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("output_path", &self.config.pipeline.output_path)
            .field("workers", &self.config.pipeline.workers)
            .finish_non_exhaustive()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;
    use crate::transfer::{ByteStream, TransferSession};
    use async_trait::async_trait;

    struct Listing(Vec<RemoteEntry>);

    struct ListingSession(Vec<RemoteEntry>);

    #[async_trait]
    impl TransferClient for Listing {
        async fn connect(&self) -> std::result::Result<Box<dyn TransferSession>, TransferError> {
            Ok(Box::new(ListingSession(self.0.clone())))
        }
    }

    #[async_trait]
    impl TransferSession for ListingSession {
        async fn login(&mut self, _u: &str, _p: &str) -> std::result::Result<(), TransferError> {
            Ok(())
        }

        async fn list(
            &mut self,
            _path: &str,
        ) -> std::result::Result<Vec<RemoteEntry>, TransferError> {
            Ok(self.0.clone())
        }

        async fn retrieve(&mut self, _path: &str) -> std::result::Result<ByteStream, TransferError> {
            Ok(Box::new(std::io::Cursor::new(Vec::new())))
        }

        async fn close(self: Box<Self>) -> std::result::Result<(), TransferError> {
            Ok(())
        }
    }

    fn pipeline(config: Config) -> Pipeline {
        Pipeline::new(config, Arc::new(Listing(Vec::new())))
    }

    #[test]
    fn selection_filters_sorts_and_drops_directories() {
        let p = pipeline(Config::default());
        let selected = p.select_entries(vec![
            RemoteEntry::directory("."),
            RemoteEntry::file("A.gz", 100),
            RemoteEntry::file("B.txt", 50),
            RemoteEntry::file("A", 100),
            RemoteEntry::directory("archive"),
            RemoteEntry::file("C.gz", 500),
        ]);

        let names: Vec<_> = selected.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["C.gz", "A.gz", "B.txt"]);
    }

    #[test]
    fn selection_can_skip_filter_and_sort() {
        let mut config = Config::default();
        config.pipeline.filter_compressed = false;
        config.pipeline.largest_first = false;
        let p = pipeline(config);

        let selected = p.select_entries(vec![
            RemoteEntry::file("a", 1),
            RemoteEntry::file("a.gz", 2),
            RemoteEntry::directory(".."),
        ]);

        let names: Vec<_> = selected.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "a.gz"]);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_touching_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transfer.host = "ftp.example.net".into();
        config.pipeline.workers = 0;
        config.pipeline.output_path = dir.path().join("out.txt");

        let err = pipeline(config.clone()).run().await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert!(!config.pipeline.output_path.exists());
    }

    #[tokio::test]
    async fn cancelled_run_still_closes_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.transfer.host = "ftp.example.net".into();
        config.pipeline.output_path = dir.path().join("out.txt");
        let token = CancellationToken::new();
        token.cancel();

        let summary = pipeline(config.clone())
            .with_cancellation(token)
            .run()
            .await
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.entries_listed, 0);
        assert_eq!(std::fs::read_to_string(&config.pipeline.output_path).unwrap(), "");
    }
}
