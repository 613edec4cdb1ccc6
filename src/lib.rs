//! # zonefile-dl
//!
//! Concurrent retrieval of DNS zone files over FTP, normalized into one
//! line-oriented output file.
//!
//! ## Design Philosophy
//!
//! zonefile-dl is designed to be:
//! - **Failure-contained** - A broken entry or record never stops its siblings
//! - **Sensible defaults** - Five workers, `/zonefiles`, `results.txt`
//! - **Library-first** - The binary is a thin wrapper around [`Pipeline`]
//! - **Event-driven** - Consumers subscribe to events, no log scraping required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use zonefile_dl::{Config, FtpClient, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.transfer.host = "ftp.example.net".to_string();
//!     config.transfer.username = "user".to_string();
//!     config.transfer.password = "pass".to_string();
//!
//!     let client = FtpClient::from_config(&config.transfer);
//!     let pipeline = Pipeline::new(config, Arc::new(client));
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = pipeline.run().await?;
//!     println!("{} records written", summary.records_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Gzip detection and decoding
pub mod decompress;
/// Error types
pub mod error;
/// Canonical entry selection
pub mod filter;
/// Remote directory listing
pub mod listing;
/// Worker pool, download tasks and output writer
pub mod pipeline;
/// Transfer client abstraction and FTP implementation
pub mod transfer;
/// Core types and events
pub mod types;
/// DNS master-file parsing
pub mod zone;

// Re-export commonly used types
pub use config::{Config, PipelineConfig, TransferConfig};
pub use error::{EntryError, Error, ParseError, Result, TransferError};
pub use pipeline::Pipeline;
pub use transfer::{FtpClient, TransferClient, TransferSession};
pub use types::{Event, RemoteEntry, RunSummary};
pub use zone::{MasterFileParser, RecordParser, ResourceRecord};

// Re-export the cancellation token so callers need no direct tokio-util dependency
pub use tokio_util::sync::CancellationToken;

/// Cancel `token` on SIGINT or SIGTERM
///
/// Spawns a background task; the first signal cancels the token, after which
/// the task exits.
pub fn cancel_on_signal(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_signal() => token.cancel(),
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handlers may fail to register in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, cancelling run");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT (Ctrl+C), cancelling run");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, falling back to ctrl_c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl+C, cancelling run");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, cancelling run");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
