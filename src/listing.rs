//! Listing fetcher: one short-lived session that lists the remote directory.

use crate::config::TransferConfig;
use crate::error::{Error, Result};
use crate::transfer::{TransferClient, open_session};
use crate::types::RemoteEntry;

/// List the configured remote directory
///
/// Opens a fresh session, authenticates, lists `remote_path` and closes the
/// session before returning. Any failure to connect, log in or list is fatal
/// for the run and is returned as [`Error::Listing`]. A failure to close the
/// session after a successful listing is only logged.
pub async fn list_entries(
    client: &dyn TransferClient,
    config: &TransferConfig,
) -> Result<Vec<RemoteEntry>> {
    let path = config.remote_path.as_str();
    let listing_error = |source| Error::Listing {
        path: path.to_string(),
        source,
    };

    let mut session = open_session(client, config.credentials())
        .await
        .map_err(listing_error)?;

    let listed = session.list(path).await;

    if let Err(e) = session.close().await {
        tracing::warn!(path, error = %e, "Failed to close listing session");
    }

    let entries = listed.map_err(listing_error)?;
    tracing::info!(path, count = entries.len(), "Fetched remote listing");
    Ok(entries)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransferError;
    use crate::transfer::{ByteStream, TransferSession};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Copy)]
    enum Failure {
        None,
        Connect,
        Login,
        List,
    }

    struct StaticListing {
        failure: Failure,
        closed: Arc<AtomicBool>,
    }

    struct StaticSession {
        failure: Failure,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TransferClient for StaticListing {
        async fn connect(&self) -> std::result::Result<Box<dyn TransferSession>, TransferError> {
            if matches!(self.failure, Failure::Connect) {
                return Err(TransferError::Connect {
                    address: "ftp.invalid:21".into(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            Ok(Box::new(StaticSession {
                failure: self.failure,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    #[async_trait]
    impl TransferSession for StaticSession {
        async fn login(&mut self, _u: &str, _p: &str) -> std::result::Result<(), TransferError> {
            match self.failure {
                Failure::Login => Err(TransferError::Authentication("530 denied".into())),
                _ => Ok(()),
            }
        }

        async fn list(
            &mut self,
            path: &str,
        ) -> std::result::Result<Vec<RemoteEntry>, TransferError> {
            assert_eq!(path, "/zonefiles");
            match self.failure {
                Failure::List => Err(TransferError::Protocol {
                    code: 550,
                    message: "No such directory".into(),
                }),
                _ => Ok(vec![
                    RemoteEntry::file("a.zone.gz", 100),
                    RemoteEntry::file("b.zone", 50),
                ]),
            }
        }

        async fn retrieve(&mut self, _path: &str) -> std::result::Result<ByteStream, TransferError> {
            unreachable!("listing never retrieves")
        }

        async fn close(self: Box<Self>) -> std::result::Result<(), TransferError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn client(failure: Failure) -> (StaticListing, Arc<AtomicBool>) {
        let closed = Arc::new(AtomicBool::new(false));
        (
            StaticListing {
                failure,
                closed: Arc::clone(&closed),
            },
            closed,
        )
    }

    #[tokio::test]
    async fn lists_and_closes_session() {
        let (client, closed) = client(Failure::None);

        let entries = list_entries(&client, &TransferConfig::default()).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert!(closed.load(Ordering::SeqCst), "session must be closed");
    }

    #[tokio::test]
    async fn connect_failure_is_fatal_listing_error() {
        let (client, _) = client(Failure::Connect);
        let err = list_entries(&client, &TransferConfig::default()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Listing {
                source: TransferError::Connect { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn login_failure_is_fatal_listing_error() {
        let (client, closed) = client(Failure::Login);
        let err = list_entries(&client, &TransferConfig::default()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Listing {
                source: TransferError::Authentication(_),
                ..
            }
        ));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn list_failure_still_closes_session() {
        let (client, closed) = client(Failure::List);
        let err = list_entries(&client, &TransferConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::Listing { .. }));
        assert!(closed.load(Ordering::SeqCst));
    }
}
