//! Minimal in-process FTP server for exercising the real `FtpClient`
//!
//! Supports USER/PASS/TYPE/PASV/LIST/RETR/QUIT on 127.0.0.1, one passive data
//! connection per transfer.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const FTP_USER: &str = "zf";
pub const FTP_PASS: &str = "secret";

#[derive(Clone, Default)]
struct Files {
    files: BTreeMap<String, Vec<u8>>,
    directories: Vec<String>,
    /// Answer RETR with 150 and then go silent on both connections
    stall_transfers: bool,
}

/// A running test server; stops when dropped
pub struct TestFtpServer {
    addr: SocketAddr,
    sessions: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

/// Builder for [`TestFtpServer`]
#[derive(Default)]
pub struct TestFtpServerBuilder {
    files: Files,
}

impl TestFtpServerBuilder {
    pub fn file(mut self, name: &str, body: impl Into<Vec<u8>>) -> Self {
        self.files.files.insert(name.to_string(), body.into());
        self
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.files.directories.push(name.to_string());
        self
    }

    pub fn stall_transfers(mut self) -> Self {
        self.files.stall_transfers = true;
        self
    }

    pub async fn start(self) -> TestFtpServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ftp listener");
        let addr = listener.local_addr().expect("listener addr");
        let sessions = Arc::new(AtomicUsize::new(0));
        let files = Arc::new(self.files);

        let counter = Arc::clone(&sessions);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let files = Arc::clone(&files);
                tokio::spawn(async move {
                    let _ = serve(stream, files).await;
                });
            }
        });

        TestFtpServer {
            addr,
            sessions,
            handle,
        }
    }
}

impl TestFtpServer {
    pub fn builder() -> TestFtpServerBuilder {
        TestFtpServerBuilder::default()
    }

    /// `host:port` of the control listener
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Control connections accepted so far
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Drop for TestFtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(stream: TcpStream, files: Arc<Files>) -> std::io::Result<()> {
    let (read_half, mut write) = stream.into_split();
    let mut read = BufReader::new(read_half);
    let mut user: Option<String> = None;
    let mut logged_in = false;
    let mut passive: Option<TcpListener> = None;

    reply(&mut write, "220 zonefile test server ready").await?;

    let mut line = String::new();
    loop {
        line.clear();
        if read.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let command = line.trim_end();
        let (verb, arg) = match command.split_once(' ') {
            Some((verb, arg)) => (verb.to_ascii_uppercase(), arg.to_string()),
            None => (command.to_ascii_uppercase(), String::new()),
        };

        match verb.as_str() {
            "USER" => {
                user = Some(arg);
                reply(&mut write, "331 Password required").await?;
            }
            "PASS" => {
                if user.as_deref() == Some(FTP_USER) && arg == FTP_PASS {
                    logged_in = true;
                    reply(&mut write, "230 Login successful").await?;
                } else {
                    reply(&mut write, "530 Login incorrect").await?;
                }
            }
            "QUIT" => {
                reply(&mut write, "221 Goodbye").await?;
                return Ok(());
            }
            _ if !logged_in => reply(&mut write, "530 Please login with USER and PASS").await?,
            "TYPE" => reply(&mut write, "200 Switching to Binary mode").await?,
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await?;
                let port = listener.local_addr()?.port();
                passive = Some(listener);
                reply(
                    &mut write,
                    &format!(
                        "227 Entering Passive Mode (127,0,0,1,{},{}).",
                        port >> 8,
                        port & 0xff
                    ),
                )
                .await?;
            }
            "LIST" => {
                let Some(listener) = passive.take() else {
                    reply(&mut write, "425 Use PASV first").await?;
                    continue;
                };
                reply(&mut write, "150 Here comes the directory listing").await?;
                let (mut data, _) = listener.accept().await?;
                let mut body = String::from("total 0\r\n");
                for dir in &files.directories {
                    body.push_str(&format!(
                        "drwxr-xr-x    2 ftp      ftp          4096 Jan 01 00:00 {}\r\n",
                        dir
                    ));
                }
                for (name, content) in &files.files {
                    body.push_str(&format!(
                        "-rw-r--r--    1 ftp      ftp      {:>8} Jan 01 00:00 {}\r\n",
                        content.len(),
                        name
                    ));
                }
                data.write_all(body.as_bytes()).await?;
                data.shutdown().await?;
                drop(data);
                reply(&mut write, "226 Directory send OK").await?;
            }
            "RETR" => {
                let name = arg.rsplit('/').next().unwrap_or(&arg).to_string();
                let Some(content) = files.files.get(&name) else {
                    passive = None;
                    reply(&mut write, "550 Failed to open file").await?;
                    continue;
                };
                let Some(listener) = passive.take() else {
                    reply(&mut write, "425 Use PASV first").await?;
                    continue;
                };
                reply(&mut write, "150 Opening BINARY mode data connection").await?;
                let (mut data, _) = listener.accept().await?;
                if files.stall_transfers {
                    // Hold the data connection and ignore everything, QUIT included
                    while read.read_line(&mut line).await? != 0 {
                        line.clear();
                    }
                    drop(data);
                    return Ok(());
                }
                let sent = async {
                    data.write_all(content).await?;
                    data.shutdown().await
                }
                .await;
                drop(data);
                match sent {
                    Ok(()) => reply(&mut write, "226 Transfer complete").await?,
                    Err(_) => reply(&mut write, "426 Connection closed; transfer aborted").await?,
                }
            }
            _ => reply(&mut write, "502 Command not implemented").await?,
        }
    }
}

async fn reply(write: &mut tokio::net::tcp::OwnedWriteHalf, text: &str) -> std::io::Result<()> {
    write.write_all(format!("{}\r\n", text).as_bytes()).await
}
