//! In-memory transfer client with failure injection

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zonefile_dl::transfer::ByteStream;
use zonefile_dl::{RemoteEntry, TransferClient, TransferError, TransferSession};

/// Session counters shared by every clone of a [`MockServer`]
#[derive(Debug, Default)]
pub struct MockStats {
    pub connects: AtomicUsize,
    pub logins: AtomicUsize,
    pub retrieves: AtomicUsize,
    pub closes: AtomicUsize,
    /// Highest number of sessions open at the same time
    pub peak_open: AtomicUsize,
    open: AtomicUsize,
}

impl MockStats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Serves a fixed listing and file bodies from memory
#[derive(Clone, Default)]
pub struct MockServer {
    entries: Vec<RemoteEntry>,
    bodies: HashMap<String, Vec<u8>>,
    fail_connect: bool,
    fail_login: bool,
    retrieve_delay: Option<Duration>,
    pub stats: Arc<MockStats>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// List `name` with `size` and serve `body` for it
    pub fn with_file(mut self, name: &str, size: u64, body: impl Into<Vec<u8>>) -> Self {
        self.entries.push(RemoteEntry::file(name, size));
        self.bodies.insert(name.to_string(), body.into());
        self
    }

    /// List `name` without a body; retrieving it fails with 550
    pub fn with_missing_file(mut self, name: &str, size: u64) -> Self {
        self.entries.push(RemoteEntry::file(name, size));
        self
    }

    pub fn with_directory(mut self, name: &str) -> Self {
        self.entries.push(RemoteEntry::directory(name));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    /// Delay every retrieval, to keep sessions open concurrently
    pub fn with_retrieve_delay(mut self, delay: Duration) -> Self {
        self.retrieve_delay = Some(delay);
        self
    }

    pub fn client(&self) -> Arc<dyn TransferClient> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl TransferClient for MockServer {
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(TransferError::Connect {
                address: "mock:21".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        let open = self.stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_open.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            server: self.clone(),
        }))
    }
}

struct MockSession {
    server: MockServer,
}

#[async_trait]
impl TransferSession for MockSession {
    async fn login(&mut self, _username: &str, _password: &str) -> Result<(), TransferError> {
        self.server.stats.logins.fetch_add(1, Ordering::SeqCst);
        if self.server.fail_login {
            return Err(TransferError::Authentication("530 Login incorrect.".to_string()));
        }
        Ok(())
    }

    async fn list(&mut self, _path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        Ok(self.server.entries.clone())
    }

    async fn retrieve(&mut self, path: &str) -> Result<ByteStream, TransferError> {
        self.server.stats.retrieves.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.server.retrieve_delay {
            tokio::time::sleep(delay).await;
        }
        let name = path.rsplit('/').next().unwrap_or(path);
        match self.server.bodies.get(name) {
            Some(body) => Ok(Box::new(std::io::Cursor::new(body.clone()))),
            None => Err(TransferError::Protocol {
                code: 550,
                message: format!("{}: No such file or directory", path),
            }),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), TransferError> {
        self.server.stats.closes.fetch_add(1, Ordering::SeqCst);
        self.server.stats.open.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
