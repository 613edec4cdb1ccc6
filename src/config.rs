//! Configuration types for zonefile-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Remote file server settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Server hostname, optionally with a `:port` suffix
    #[serde(default)]
    pub host: String,

    /// Control port used when `host` carries none (default: 21)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for the transfer session
    #[serde(default)]
    pub username: String,

    /// Password for the transfer session
    #[serde(default)]
    pub password: String,

    /// Remote directory holding the zone files (default: "/zonefiles")
    #[serde(default = "default_remote_path")]
    pub remote_path: String,

    /// TCP connect timeout for control and data connections (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum wait for a single control-channel reply (default: 120 seconds)
    #[serde(default = "default_reply_timeout", with = "duration_serde")]
    pub reply_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            remote_path: default_remote_path(),
            connect_timeout: default_connect_timeout(),
            reply_timeout: default_reply_timeout(),
        }
    }
}

impl TransferConfig {
    /// Socket address string for the control connection
    ///
    /// A host that already names a port (`ftp.example.net:2121`) is used as-is;
    /// bracketed IPv6 literals without a port get one appended.
    pub fn address(&self) -> String {
        let host = self.host.trim();
        let has_port = match host.rsplit_once(':') {
            Some((head, port)) => {
                !port.is_empty()
                    && port.chars().all(|c| c.is_ascii_digit())
                    && (!head.contains(':') || head.ends_with(']'))
            }
            None => false,
        };
        if has_port {
            host.to_string()
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Full remote path of an entry in the listing directory
    pub fn entry_path(&self, name: &str) -> String {
        format!("{}/{}", self.remote_path.trim_end_matches('/'), name)
    }

    /// Credentials as a borrowed pair
    pub fn credentials(&self) -> crate::transfer::Credentials<'_> {
        crate::transfer::Credentials {
            username: &self.username,
            password: &self.password,
        }
    }
}

/// Worker pool and output settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrent workers (default: 5)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Job queue capacity; 0 means twice the worker count (default: 0)
    #[serde(default)]
    pub queue_capacity: usize,

    /// Output channel capacity in lines (default: 1024)
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,

    /// Consolidated output file, overwritten on every run (default: "results.txt")
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Skip plain files shadowed by a `.gz` variant of the same name (default: true)
    #[serde(default = "default_true")]
    pub filter_compressed: bool,

    /// Dispatch the largest entries first (default: true)
    #[serde(default = "default_true")]
    pub largest_first: bool,

    /// Derive the zone origin from the entry name instead of starting empty (default: false)
    ///
    /// `com.zone.gz` parses with origin `com.`. Origins set inside the file
    /// with `$ORIGIN` still take precedence.
    #[serde(default)]
    pub infer_origin: bool,

    /// Overall deadline for the run; in-flight entries are cancelled when it passes
    #[serde(default, with = "optional_duration_serde")]
    pub deadline: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: 0,
            output_buffer: default_output_buffer(),
            output_path: default_output_path(),
            filter_compressed: true,
            largest_first: true,
            infer_origin: false,
            deadline: None,
        }
    }
}

impl PipelineConfig {
    /// Job queue capacity with the 0 = auto rule applied
    pub fn effective_queue_capacity(&self) -> usize {
        if self.queue_capacity == 0 {
            self.workers.max(1) * 2
        } else {
            self.queue_capacity
        }
    }
}

/// Main configuration for a zonefile-dl run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote server and credentials
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Worker pool and output destination
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Check the configuration before any connection is opened
    pub fn validate(&self) -> Result<()> {
        if self.transfer.host.trim().is_empty() {
            return Err(Error::config("host", "transfer host is not set"));
        }
        if self.transfer.port == 0 {
            return Err(Error::config("port", "port must be non-zero"));
        }
        if !self.transfer.remote_path.starts_with('/') {
            return Err(Error::config(
                "remote_path",
                format!(
                    "remote path must be absolute, got {:?}",
                    self.transfer.remote_path
                ),
            ));
        }
        if self.pipeline.workers == 0 {
            return Err(Error::config("workers", "worker count must be at least 1"));
        }
        if self.pipeline.output_buffer == 0 {
            return Err(Error::config(
                "output_buffer",
                "output buffer must hold at least one line",
            ));
        }
        if self.pipeline.output_path.as_os_str().is_empty() {
            return Err(Error::config("output_path", "output path is empty"));
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    21
}

fn default_remote_path() -> String {
    "/zonefiles".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_reply_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_workers() -> usize {
    5
}

fn default_output_buffer() -> usize {
    1024
}

fn default_output_path() -> PathBuf {
    PathBuf::from("results.txt")
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
