//! Payload builders and output helpers

use flate2::write::GzEncoder;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use zonefile_dl::Config;

/// gzip-compress `data`
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// A zone body with `count` A records under `zone`
pub fn zone_body(zone: &str, count: usize) -> Vec<u8> {
    let mut body = format!("$ORIGIN {}.\n$TTL 3600\n", zone);
    for i in 0..count {
        body.push_str(&format!("host{} IN A 192.0.2.{}\n", i, i % 250 + 1));
    }
    body.into_bytes()
}

/// The lines the pipeline writes for [`zone_body`]
pub fn expected_zone_lines(zone: &str, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("host{}.{}. 3600 in a 192.0.2.{}", i, zone, i % 250 + 1))
        .collect()
}

/// Configuration pointing at `host` and writing to `output`
pub fn test_config(host: &str, output: &Path, workers: usize) -> Config {
    let mut config = Config::default();
    config.transfer.host = host.to_string();
    config.transfer.username = "zf".to_string();
    config.transfer.password = "secret".to_string();
    config.pipeline.workers = workers;
    config.pipeline.output_path = output.to_path_buf();
    config
}

/// Output file path inside a temp dir
pub fn output_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("results.txt")
}

/// Raw output file contents
pub fn read_output(path: &Path) -> String {
    std::fs::read_to_string(path).expect("read output file")
}

/// Output lines as a set
pub fn output_set(path: &Path) -> BTreeSet<String> {
    read_output(path).lines().map(str::to_string).collect()
}
