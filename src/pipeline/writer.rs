//! Output writer: the single consumer of the output channel
//!
//! The writer is the only component that opens or writes the destination.
//! It runs until every sender has been dropped and the channel is drained.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Write buffer in front of the destination file
const WRITE_BUFFER_BYTES: usize = 256 * 1024;

/// Normalize one record line for output
///
/// Trims surrounding whitespace and lower-cases. Returns `None` for lines that
/// are empty after trimming, so no blank line ever reaches the file.
pub fn normalize_line(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Open destination plus its write buffer
pub struct OutputWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl OutputWriter {
    /// Create (or truncate) the destination file
    ///
    /// Called before any entry is dispatched, so a destination that cannot be
    /// created fails the run before any download starts.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await.map_err(|source| Error::Output {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Opened output file");
        Ok(Self {
            path: path.to_path_buf(),
            file: BufWriter::with_capacity(WRITE_BUFFER_BYTES, file),
        })
    }

    /// Drain `rx` into the file, returning the number of lines written
    ///
    /// Returns once the channel is closed and empty. On a write failure the
    /// receiver is dropped, which makes every producer's next send fail.
    pub async fn run(mut self, mut rx: mpsc::Receiver<String>) -> Result<u64> {
        let mut written: u64 = 0;

        while let Some(line) = rx.recv().await {
            let Some(line) = normalize_line(&line) else {
                continue;
            };
            if let Err(source) = self.write_line(&line).await {
                drop(rx);
                tracing::error!(path = %self.path.display(), error = %source, "Output write failed");
                return Err(self.output_error(source));
            }
            written += 1;
        }

        if let Err(source) = self.file.flush().await {
            return Err(self.output_error(source));
        }
        if let Err(source) = self.file.get_mut().sync_all().await {
            return Err(self.output_error(source));
        }

        tracing::debug!(path = %self.path.display(), lines = written, "Output file closed");
        Ok(written)
    }

    /// Run the writer on its own task
    pub fn spawn(self, rx: mpsc::Receiver<String>) -> JoinHandle<Result<u64>> {
        tokio::spawn(self.run(rx))
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.write_all(b"\n").await
    }

    fn output_error(&self, source: std::io::Error) -> Error {
        Error::Output {
            path: self.path.clone(),
            source,
        }
    }
}
