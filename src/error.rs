//! Error types for zonefile-dl
//!
//! Errors are split by how far they are allowed to travel:
//! - [`Error`] aborts a whole run (bad configuration, unreachable listing host,
//!   unwritable output destination)
//! - [`EntryError`] abandons a single remote entry; sibling workers keep going
//! - [`ParseError`] skips a single record; the rest of the entry is still parsed

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for zonefile-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Run-level error type
///
/// Every variant is fatal: a run that returns one of these produced no
/// trustworthy output.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// The initial listing session could not be established or the listing failed
    #[error("failed to list {path}: {source}")]
    Listing {
        /// Remote path that was being listed
        path: String,
        /// Underlying transfer failure
        #[source]
        source: TransferError,
    },

    /// The output destination could not be created or written
    #[error("output error for {path}: {source}")]
    Output {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (config files)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Process exit code for this error when it terminates the binary
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config { .. } | Error::Serialization(_) => 2,
            _ => 1,
        }
    }
}

/// Errors raised by a transfer session (connect, login, list, retrieve, close)
#[derive(Debug, Error)]
pub enum TransferError {
    /// TCP connection to the server failed
    #[error("failed to connect to {address}: {source}")]
    Connect {
        /// Address that was dialed
        address: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// An operation did not complete within its deadline
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        /// The operation that timed out (e.g., "connect", "reply")
        operation: String,
        /// The deadline that was exceeded
        after: Duration,
    },

    /// The server rejected the credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The server answered with an error reply
    #[error("server replied {code}: {message}")]
    Protocol {
        /// Numeric reply code
        code: u16,
        /// Reply text
        message: String,
    },

    /// The server sent something that is not a valid reply for the command
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Socket I/O error on an established session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while opening the decompression layer of an entry
#[derive(Debug, Error)]
pub enum DecompressError {
    /// The stream does not start with a valid compressed-format header
    #[error("invalid gzip header: {reason}")]
    InvalidHeader {
        /// What was wrong with the header
        reason: String,
    },

    /// Reading the header from the underlying stream failed
    #[error("I/O error reading compressed header: {0}")]
    Io(#[from] std::io::Error),
}

/// A record-level parse failure
#[derive(Debug, Error)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    /// 1-based line number where the offending record starts
    pub line: usize,
    /// What went wrong
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }

    /// Whether parsing can continue after this error
    ///
    /// I/O errors end the record stream; everything else only skips one record.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.kind, ParseErrorKind::Io(_))
    }
}

/// Kinds of record-level parse failures
#[derive(Debug, Error)]
pub enum ParseErrorKind {
    /// Reading the underlying stream failed
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record line is syntactically invalid
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A relative owner name was used with no origin in effect
    #[error("relative name {0:?} without an origin")]
    NoOrigin(String),

    /// A TTL value could not be parsed
    #[error("invalid TTL {0:?}")]
    InvalidTtl(String),

    /// A directive that this parser does not support
    #[error("unsupported directive {0}")]
    UnsupportedDirective(String),

    /// A record has an owner but no type
    #[error("missing record type")]
    MissingType,

    /// Unbalanced parentheses or quotes at end of input
    #[error("unterminated {0}")]
    Unterminated(&'static str),
}

/// Per-entry failure: the entry is abandoned, the run continues
#[derive(Debug, Error)]
pub enum EntryError {
    /// Session setup or retrieval failed
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// The decompression layer could not be initialized
    #[error("decompression failed: {0}")]
    Decompress(#[from] DecompressError),

    /// The byte stream broke while records were being read
    #[error("stream read failed: {0}")]
    Read(std::io::Error),

    /// The output channel closed before the entry was fully forwarded
    #[error("output channel closed")]
    OutputClosed,

    /// The run was cancelled while the entry was in flight
    #[error("cancelled")]
    Cancelled,

    /// The blocking parse task panicked or was aborted
    #[error("parse task failed: {0}")]
    TaskFailed(String),
}
