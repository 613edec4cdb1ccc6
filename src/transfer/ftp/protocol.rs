//! FTP control channel: command writing and reply reading (RFC 959 §4.2).

use crate::error::TransferError;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// A complete (possibly multi-line) server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    pub(crate) code: u16,
    pub(crate) lines: Vec<String>,
}

impl Reply {
    /// Reply text without the numeric code
    pub(crate) fn message(&self) -> String {
        self.lines
            .iter()
            .map(|l| strip_code(l).trim())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// 1yz: the command was accepted and more replies will follow
    pub(crate) fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// 2yz: the command completed
    pub(crate) fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub(crate) fn into_error(self) -> TransferError {
        TransferError::Protocol {
            code: self.code,
            message: self.message(),
        }
    }
}

fn strip_code(line: &str) -> &str {
    match parse_reply_line(line) {
        Some(_) => line.get(4..).unwrap_or(""),
        None => line,
    }
}

/// Split a reply line into its code and the separator that follows it
fn parse_reply_line(line: &str) -> Option<(u16, u8)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    let code = line[..3].parse().ok()?;
    let sep = bytes.get(3).copied().unwrap_or(b' ');
    Some((code, sep))
}

/// Line-oriented control connection
pub(crate) struct ControlChannel {
    reader: BufReader<Box<dyn AsyncRead + Send + Unpin>>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    reply_timeout: Duration,
}

impl ControlChannel {
    pub(crate) fn new(
        reader: Box<dyn AsyncRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            reply_timeout,
        }
    }

    /// Send one command line
    pub(crate) async fn send(&mut self, command: &str) -> Result<(), TransferError> {
        if command.starts_with("PASS ") {
            tracing::trace!("ftp> PASS ****");
        } else {
            tracing::trace!("ftp> {}", command);
        }
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a command and wait for its reply
    pub(crate) async fn command(&mut self, command: &str) -> Result<Reply, TransferError> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Read the next complete reply, bounded by the reply timeout
    pub(crate) async fn read_reply(&mut self) -> Result<Reply, TransferError> {
        self.read_reply_within(self.reply_timeout).await
    }

    /// Read the next complete reply with an explicit deadline
    pub(crate) async fn read_reply_within(
        &mut self,
        deadline: Duration,
    ) -> Result<Reply, TransferError> {
        match tokio::time::timeout(deadline, self.read_reply_unbounded()).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout {
                operation: "reply".to_string(),
                after: deadline,
            }),
        }
    }

    async fn read_reply_unbounded(&mut self) -> Result<Reply, TransferError> {
        let first = self.read_line().await?;
        let (code, sep) = parse_reply_line(&first)
            .ok_or_else(|| TransferError::UnexpectedReply(first.clone()))?;

        let mut lines = vec![first];
        if sep == b'-' {
            // Multi-line reply ends at "<code> " on a line of its own
            loop {
                let line = self.read_line().await?;
                let done = matches!(parse_reply_line(&line), Some((c, b' ')) if c == code);
                lines.push(line);
                if done {
                    break;
                }
            }
        }

        tracing::trace!("ftp< {}", lines.join(" | "));
        Ok(Reply { code, lines })
    }

    async fn read_line(&mut self) -> Result<String, TransferError> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "control connection closed by server",
            )));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Close the write side of the control connection
    pub(crate) async fn shutdown(&mut self) -> Result<(), TransferError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Parse the host/port announced by a `227 Entering Passive Mode` reply
pub(crate) fn parse_pasv(reply: &Reply) -> Result<SocketAddrV4, TransferError> {
    let text = reply.message();
    let inner = match (text.find('('), text.rfind(')')) {
        (Some(open), Some(close)) if open < close => &text[open + 1..close],
        _ => text
            .split_whitespace()
            .last()
            .unwrap_or("")
            .trim_end_matches('.'),
    };

    let parts: Vec<u8> = inner
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<Result<_, _>>()
        .map_err(|_| TransferError::UnexpectedReply(format!("bad PASV reply: {}", text)))?;

    if parts.len() != 6 {
        return Err(TransferError::UnexpectedReply(format!(
            "bad PASV reply: {}",
            text
        )));
    }

    let ip = Ipv4Addr::new(parts[0], parts[1], parts[2], parts[3]);
    let port = (u16::from(parts[4]) << 8) | u16::from(parts[5]);
    Ok(SocketAddrV4::new(ip, port))
}
