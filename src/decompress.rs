//! Decompression layer for retrieved entries
//!
//! Only gzip is recognised. The fixed part of the gzip header is checked
//! before any byte reaches the record parser, so a corrupt archive fails the
//! entry up front instead of producing a partial record stream.

use crate::error::DecompressError;
use flate2::read::MultiGzDecoder;
use std::io::{BufRead, BufReader, Cursor, Read};

/// Fixed-size part of a gzip member header (RFC 1952 §2.3)
const GZIP_HEADER_LEN: usize = 10;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_METHOD_DEFLATE: u8 = 8;

/// Read buffer handed to the record parser
const READ_BUFFER_BYTES: usize = 64 * 1024;

/// Compression applied to a remote entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Plain text
    None,
    /// gzip (`.gz`)
    Gzip,
}

impl Compression {
    /// Extension (including the dot) that marks a compressed entry
    pub const COMPRESSED_EXTENSION: &'static str = ".gz";

    /// Pick the compression from an entry name
    pub fn for_name(name: &str) -> Self {
        if name.ends_with(Self::COMPRESSED_EXTENSION) {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    /// Wrap a raw byte stream in the matching decoder
    ///
    /// Fails with [`DecompressError::InvalidHeader`] when a gzip stream does not
    /// start with a valid header.
    pub fn wrap<R>(self, reader: R) -> Result<Box<dyn BufRead + Send>, DecompressError>
    where
        R: Read + Send + 'static,
    {
        match self {
            Compression::None => Ok(Box::new(BufReader::with_capacity(
                READ_BUFFER_BYTES,
                reader,
            ))),
            Compression::Gzip => {
                let mut reader = reader;
                let header = read_gzip_header(&mut reader)?;
                // Replay the header so the decoder sees the complete member
                let stream = Cursor::new(header).chain(reader);
                Ok(Box::new(BufReader::with_capacity(
                    READ_BUFFER_BYTES,
                    MultiGzDecoder::new(stream),
                )))
            }
        }
    }
}

fn read_gzip_header<R: Read>(reader: &mut R) -> Result<[u8; GZIP_HEADER_LEN], DecompressError> {
    let mut header = [0u8; GZIP_HEADER_LEN];
    let mut filled = 0;
    while filled < GZIP_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) => {
                return Err(DecompressError::InvalidHeader {
                    reason: format!("stream ended after {} header bytes", filled),
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DecompressError::Io(e)),
        }
    }

    if header[..2] != GZIP_MAGIC {
        return Err(DecompressError::InvalidHeader {
            reason: format!("bad magic bytes {:02x} {:02x}", header[0], header[1]),
        });
    }
    if header[2] != GZIP_METHOD_DEFLATE {
        return Err(DecompressError::InvalidHeader {
            reason: format!("unsupported compression method {}", header[2]),
        });
    }
    Ok(header)
}
