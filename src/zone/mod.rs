//! Record parser collaborator: DNS master files (RFC 1035 §5)
//!
//! The pipeline hands each decompressed entry to a [`RecordParser`] and
//! forwards whatever records come back. [`MasterFileParser`] is the production
//! implementation; tests may substitute their own.

mod lexer;
mod reader;
mod record;

pub use reader::ZoneReader;
pub use record::ResourceRecord;

use crate::decompress::Compression;
use crate::error::ParseError;
use crate::filter::split_extension;
use std::io::BufRead;

/// Lazy stream of parsed records; per-record failures are items, not the end
pub type RecordIter = Box<dyn Iterator<Item = Result<ResourceRecord, ParseError>> + Send>;

/// Turns a byte stream into records
pub trait RecordParser: Send + Sync {
    /// Parse `input`
    ///
    /// `origin` is the zone origin to start from (empty for none); directives
    /// inside the file take precedence. `file` names the source for log
    /// context.
    fn records(&self, input: Box<dyn BufRead + Send>, origin: &str, file: &str) -> RecordIter;
}

/// RFC 1035 master-file parser
#[derive(Clone, Copy, Debug, Default)]
pub struct MasterFileParser;

impl RecordParser for MasterFileParser {
    fn records(&self, input: Box<dyn BufRead + Send>, origin: &str, file: &str) -> RecordIter {
        Box::new(ZoneReader::new(input, origin, file))
    }
}

/// Guess a zone origin from an entry name
///
/// `com.zone.gz` gives `com.`, `example.txt` gives `example.`. Returns an
/// empty string when nothing usable remains.
pub fn origin_from_entry_name(name: &str) -> String {
    let name = name
        .strip_suffix(Compression::COMPRESSED_EXTENSION)
        .unwrap_or(name);
    let name = name.rsplit('/').next().unwrap_or(name);
    let (base, _) = split_extension(name);
    if base.is_empty() || base == "." {
        String::new()
    } else {
        format!("{}.", base.trim_end_matches('.'))
    }
}
