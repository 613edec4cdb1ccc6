//! File-transfer collaborator
//!
//! The pipeline only talks to the remote server through [`TransferClient`] and
//! [`TransferSession`], so the production FTP implementation in [`ftp`] can be
//! swapped for an in-memory one in tests.
//!
//! ## Session discipline
//!
//! Every remote entry gets its own session: the download task opens it, retrieves
//! exactly one file through it and closes it on every exit path. A broken session
//! therefore costs one entry, never a worker's remaining queue. The listing uses a
//! separate, equally short-lived session.

pub mod ftp;

use crate::error::TransferError;
use crate::types::RemoteEntry;
use async_trait::async_trait;
use tokio::io::AsyncRead;

pub use ftp::FtpClient;

/// Raw bytes of one retrieved file
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Username/password pair passed to [`TransferSession::login`]
#[derive(Clone, Copy)]
pub struct Credentials<'a> {
    /// Account name
    pub username: &'a str,
    /// Account password
    pub password: &'a str,
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Factory for sessions against one remote server
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Open an unauthenticated session
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError>;
}

/// One stateful connection to the remote server
///
/// A session is owned by exactly one task at a time and is never shared.
#[async_trait]
pub trait TransferSession: Send {
    /// Authenticate the session
    async fn login(&mut self, username: &str, password: &str) -> Result<(), TransferError>;

    /// List the entries of a remote directory
    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError>;

    /// Start retrieving a remote file
    ///
    /// The returned stream yields the file's bytes until EOF. Only one retrieval
    /// may be in flight per session.
    async fn retrieve(&mut self, path: &str) -> Result<ByteStream, TransferError>;

    /// Terminate the session and release its connections
    async fn close(self: Box<Self>) -> Result<(), TransferError>;
}

/// Connect and authenticate in one step
///
/// A session whose login fails is closed before the error is returned.
pub async fn open_session(
    client: &dyn TransferClient,
    credentials: Credentials<'_>,
) -> Result<Box<dyn TransferSession>, TransferError> {
    let mut session = client.connect().await?;
    if let Err(e) = session
        .login(credentials.username, credentials.password)
        .await
    {
        if let Err(close_err) = session.close().await {
            tracing::debug!(error = %close_err, "Failed to close session after login failure");
        }
        return Err(e);
    }
    Ok(session)
}
