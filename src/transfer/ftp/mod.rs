//! FTP implementation of the transfer collaborator
//!
//! A deliberately small RFC 959 client: plain-text control channel, passive-mode
//! data connections, binary transfers. Split into:
//! - [`protocol`] - command/reply codec on the control connection
//! - [`listing`] - `LIST` body parsing (Unix and DOS formats)

mod listing;
mod protocol;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::types::RemoteEntry;
use async_trait::async_trait;
use protocol::{ControlChannel, Reply, parse_pasv};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use super::{ByteStream, TransferClient, TransferSession};

/// How long `close` waits for the completion reply of an abandoned transfer,
/// and for the reply to `QUIT`
const PENDING_REPLY_GRACE: Duration = Duration::from_secs(5);

/// Connects [`FtpSession`]s to one server
#[derive(Clone, Debug)]
pub struct FtpClient {
    address: String,
    connect_timeout: Duration,
    reply_timeout: Duration,
}

impl FtpClient {
    /// Create a client for `address` (`host:port`) with default timeouts
    pub fn new(address: impl Into<String>) -> Self {
        let defaults = TransferConfig::default();
        Self {
            address: address.into(),
            connect_timeout: defaults.connect_timeout,
            reply_timeout: defaults.reply_timeout,
        }
    }

    /// Create a client from the transfer section of the configuration
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            address: config.address(),
            connect_timeout: config.connect_timeout,
            reply_timeout: config.reply_timeout,
        }
    }

    /// Override the connect and reply timeouts
    pub fn with_timeouts(mut self, connect: Duration, reply: Duration) -> Self {
        self.connect_timeout = connect;
        self.reply_timeout = reply;
        self
    }

    /// Address this client dials
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl TransferClient for FtpClient {
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        let stream = connect_with_timeout(&self.address, self.connect_timeout).await?;
        let peer = stream.peer_addr()?.ip();
        let (read_half, write_half) = stream.into_split();
        let mut control = ControlChannel::new(
            Box::new(read_half),
            Box::new(write_half),
            self.reply_timeout,
        );

        // 120 = "service ready in nnn minutes", followed by the real greeting
        let mut greeting = control.read_reply().await?;
        while greeting.code == 120 {
            greeting = control.read_reply().await?;
        }
        if greeting.code != 220 {
            return Err(greeting.into_error());
        }

        tracing::debug!(address = %self.address, "FTP session connected");
        Ok(Box::new(FtpSession {
            control,
            peer,
            connect_timeout: self.connect_timeout,
            transfer_pending: false,
        }))
    }
}

async fn connect_with_timeout<A>(address: A, timeout: Duration) -> Result<TcpStream, TransferError>
where
    A: tokio::net::ToSocketAddrs + std::fmt::Display,
{
    match tokio::time::timeout(timeout, TcpStream::connect(&address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TransferError::Connect {
            address: address.to_string(),
            source: e,
        }),
        Err(_) => Err(TransferError::Timeout {
            operation: format!("connect to {}", address),
            after: timeout,
        }),
    }
}

/// An FTP control connection plus at most one in-flight data transfer
pub struct FtpSession {
    control: ControlChannel,
    peer: IpAddr,
    connect_timeout: Duration,
    /// A RETR was started whose completion reply has not been read yet
    transfer_pending: bool,
}

impl FtpSession {
    /// Enter passive mode and connect the data channel
    async fn open_data_connection(&mut self) -> Result<TcpStream, TransferError> {
        self.finish_pending_transfer(self.connect_timeout).await;

        let reply = self.control.command("PASV").await?;
        if reply.code != 227 {
            return Err(reply.into_error());
        }
        let announced = parse_pasv(&reply)?;

        // Servers behind NAT often announce 0.0.0.0; reuse the control peer then
        let ip = if announced.ip().is_unspecified() {
            self.peer
        } else {
            IpAddr::V4(*announced.ip())
        };
        connect_with_timeout(SocketAddr::new(ip, announced.port()), self.connect_timeout).await
    }

    /// Send a transfer command and require a 1yz "opening data connection" reply
    async fn start_transfer(&mut self, command: &str) -> Result<(), TransferError> {
        let reply = self.control.command(command).await?;
        if reply.is_preliminary() {
            Ok(())
        } else {
            Err(reply.into_error())
        }
    }

    /// Consume the completion reply of a retrieval, if one is outstanding
    async fn finish_pending_transfer(&mut self, grace: Duration) {
        if !self.transfer_pending {
            return;
        }
        self.transfer_pending = false;
        match self.control.read_reply_within(grace).await {
            Ok(reply) if reply.is_completion() => {}
            Ok(reply) => {
                tracing::debug!(code = reply.code, message = %reply.message(), "Transfer ended abnormally");
            }
            Err(e) => {
                tracing::debug!(error = %e, "No completion reply for transfer");
            }
        }
    }
}

#[async_trait]
impl TransferSession for FtpSession {
    async fn login(&mut self, username: &str, password: &str) -> Result<(), TransferError> {
        let mut reply = self.control.command(&format!("USER {}", username)).await?;
        if reply.code == 331 {
            reply = self.control.command(&format!("PASS {}", password)).await?;
        }
        match reply.code {
            230 | 202 => {}
            530 | 331 | 332 => return Err(TransferError::Authentication(reply.message())),
            _ => return Err(reply.into_error()),
        }

        let reply: Reply = self.control.command("TYPE I").await?;
        if !reply.is_completion() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn list(&mut self, path: &str) -> Result<Vec<RemoteEntry>, TransferError> {
        let mut data = self.open_data_connection().await?;
        self.start_transfer(&format!("LIST {}", path)).await?;

        let mut body = Vec::new();
        data.read_to_end(&mut body).await?;
        drop(data);

        let done = self.control.read_reply().await?;
        if !done.is_completion() {
            return Err(done.into_error());
        }

        let entries = listing::parse_listing(&String::from_utf8_lossy(&body));
        tracing::debug!(path, count = entries.len(), "Listed remote directory");
        Ok(entries)
    }

    async fn retrieve(&mut self, path: &str) -> Result<ByteStream, TransferError> {
        let data = self.open_data_connection().await?;
        self.start_transfer(&format!("RETR {}", path)).await?;
        self.transfer_pending = true;
        Ok(Box::new(data))
    }

    async fn close(mut self: Box<Self>) -> Result<(), TransferError> {
        self.finish_pending_transfer(PENDING_REPLY_GRACE).await;

        let reply = match self.control.send("QUIT").await {
            Ok(()) => self.control.read_reply_within(PENDING_REPLY_GRACE).await,
            Err(e) => Err(e),
        };
        // Best effort: the socket is released when `self` drops either way
        let _ = self.control.shutdown().await;
        match reply {
            Ok(r) if r.code == 221 || r.is_completion() => Ok(()),
            Ok(r) => Err(r.into_error()),
            Err(e) => Err(e),
        }
    }
}
