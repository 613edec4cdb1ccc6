//! zonefile-dl command-line entry point

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use zonefile_dl::{Config, Error, FtpClient, Pipeline, cancel_on_signal};

/// Exit code for a run stopped by SIGINT/SIGTERM
const EXIT_CANCELLED: u8 = 130;

/// Download every zone file from an FTP server into one normalized text file
#[derive(Parser, Debug)]
#[command(
    name = "zonefile-dl",
    version,
    about,
    after_help = "EXAMPLES:\n    \
        zonefile-dl --host ftp.example.net --user alice --pass secret\n    \
        zf_ftp_host=ftp.example.net zf_workers=8 zonefile-dl -o zones.txt\n    \
        zonefile-dl --config zonefile-dl.json --deadline-secs 3600"
)]
struct Args {
    /// JSON configuration file, applied before any other option
    #[arg(short, long, env = "zf_config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// FTP server host, optionally with :port
    #[arg(long, env = "zf_ftp_host", value_name = "HOST")]
    host: Option<String>,

    /// FTP username
    #[arg(long, env = "zf_user", value_name = "USER")]
    user: Option<String>,

    /// FTP password
    #[arg(long, env = "zf_pass", value_name = "PASS", hide_env_values = true)]
    pass: Option<String>,

    /// Number of concurrent download workers
    #[arg(short, long, env = "zf_workers", value_name = "NUM")]
    workers: Option<usize>,

    /// Remote directory holding the zone files
    #[arg(long, env = "zf_remote_path", value_name = "PATH")]
    remote_path: Option<String>,

    /// Output file (overwritten on every run)
    #[arg(short, long, env = "zf_output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Cancel the run after this many seconds
    #[arg(long, env = "zf_deadline_secs", value_name = "SECS")]
    deadline_secs: Option<u64>,

    /// Download plain and compressed variants of the same file
    #[arg(long)]
    no_filter: bool,

    /// Derive each zone's origin from its file name
    #[arg(long)]
    infer_origin: bool,
}

impl Args {
    /// Build the run configuration: file first, then CLI/environment overrides
    fn into_config(self) -> zonefile_dl::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(host) = self.host {
            config.transfer.host = host;
        }
        if let Some(user) = self.user {
            config.transfer.username = user;
        }
        if let Some(pass) = self.pass {
            config.transfer.password = pass;
        }
        if let Some(remote_path) = self.remote_path {
            config.transfer.remote_path = remote_path;
        }
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(output) = self.output {
            config.pipeline.output_path = output;
        }
        if let Some(secs) = self.deadline_secs {
            config.pipeline.deadline = Some(Duration::from_secs(secs));
        }
        if self.no_filter {
            config.pipeline.filter_compressed = false;
        }
        if self.infer_origin {
            config.pipeline.infer_origin = true;
        }
        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment and CLI still apply
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing();
    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Run failed");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(args: Args) -> Result<ExitCode, Error> {
    let config = args.into_config()?;
    config.validate()?;

    let client = FtpClient::from_config(&config.transfer);
    let server = client.address().to_string();
    let pipeline = Pipeline::new(config, Arc::new(client));
    let token = pipeline.cancellation_token();
    let signals = cancel_on_signal(token.clone());

    let config = pipeline.config();
    tracing::info!(
        server = %server,
        remote_path = %config.transfer.remote_path,
        output = %config.pipeline.output_path.display(),
        workers = config.pipeline.workers,
        "Starting zone file download"
    );

    let result = pipeline.run().await;
    signals.abort();
    let summary = result?;

    if summary.entries_failed > 0 {
        tracing::warn!(
            failed = summary.entries_failed,
            "Some entries could not be processed; see earlier log lines"
        );
    }

    if token.is_cancelled() {
        Ok(ExitCode::from(EXIT_CANCELLED))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
