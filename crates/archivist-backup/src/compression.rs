//! Compression and checksum utilities for artifacts.
//!
//! Gzip handling for whole-file envelope compression, plus a SHA-256
//! writer so artifact checksums are computed while the bytes stream to disk.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// Gzip level for compressed envelopes (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Maximum gzip level, used for tree artifacts.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Compress a buffer with gzip.
pub fn gzip_bytes(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(MAX_COMPRESSION_LEVEL)));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompress a gzip buffer.
pub fn gunzip_bytes(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Calculates SHA256 checksum of a file.
pub fn calculate_checksum(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA256 checksum of a buffer.
pub fn checksum_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Writer that calculates SHA256 checksum while writing.
pub struct ChecksumWriter<W: Write> {
    writer: W,
    hasher: Sha256,
    bytes_written: u64,
}

impl<W: Write> ChecksumWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            hasher: Sha256::new(),
            bytes_written: 0,
        }
    }

    /// Flush and return the inner writer with the hex checksum and byte count.
    pub fn finish(mut self) -> io::Result<(W, String, u64)> {
        self.writer.flush()?;
        let checksum = format!("{:x}", self.hasher.finalize());
        Ok((self.writer, checksum, self.bytes_written))
    }
}

impl<W: Write> Write for ChecksumWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
