//! Core types and events

use serde::{Deserialize, Serialize};

/// A named object returned by a remote directory listing
///
/// Identity is the `name`; entries are immutable once listed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// File name relative to the listed directory
    pub name: String,
    /// Size in bytes as reported by the server
    pub size: u64,
    /// Whether the entry is a directory
    pub is_directory: bool,
}

impl RemoteEntry {
    /// Create a regular file entry
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            is_directory: false,
        }
    }

    /// Create a directory entry
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_directory: true,
        }
    }

    /// Whether this is one of the `.` / `..` pseudo-entries some servers list
    pub fn is_pseudo(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Event emitted while a run progresses
///
/// Delivered on a broadcast channel; see [`crate::Pipeline::subscribe`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The remote listing was fetched and reduced to the canonical set
    ListingComplete {
        /// Entries returned by the server
        listed: usize,
        /// Entries that will be dispatched to workers
        selected: usize,
    },

    /// A worker picked up an entry
    EntryStarted {
        /// Entry name
        name: String,
        /// Worker index (0-based)
        worker: usize,
    },

    /// A malformed record was skipped; the entry continues
    RecordSkipped {
        /// Entry name
        name: String,
        /// Line where the record starts
        line: usize,
        /// Error message
        error: String,
    },

    /// An entry was fully parsed and forwarded to the writer
    EntryComplete {
        /// Entry name
        name: String,
        /// Records forwarded
        records: u64,
        /// Records skipped as malformed
        skipped: u64,
    },

    /// An entry was abandoned
    EntryFailed {
        /// Entry name
        name: String,
        /// Error message
        error: String,
        /// Records already forwarded before the failure
        records: u64,
    },

    /// The run finished and the output file is closed
    Finished {
        /// Final counters
        summary: RunSummary,
    },
}

/// Counters describing a finished run
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Entries returned by the remote listing
    pub entries_listed: usize,
    /// Entries dispatched to workers
    pub entries_selected: usize,
    /// Entries parsed to the end of their stream
    pub entries_succeeded: usize,
    /// Entries abandoned
    pub entries_failed: usize,
    /// Lines persisted by the writer
    pub records_written: u64,
    /// Malformed records skipped across all entries
    pub records_skipped: u64,
    /// Worker tasks that panicked instead of returning a report
    pub workers_panicked: usize,
    /// Whether the run stopped early because it was cancelled
    pub cancelled: bool,
}

/// Per-worker counters, summed into [`RunSummary`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct WorkerReport {
    pub(crate) succeeded: usize,
    pub(crate) failed: usize,
    pub(crate) records_skipped: u64,
}

impl WorkerReport {
    pub(crate) fn merge(&mut self, other: WorkerReport) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.records_skipped += other.records_skipped;
    }
}
