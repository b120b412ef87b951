//! Archive format detection using content signatures.
//!
//! The file name of an upload is never consulted: a zip renamed to `.tar`
//! is still a zip.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Bytes needed to see a full tar header block.
const SNIFF_LEN: usize = 512;

const TAR_MAGIC_OFFSET: usize = 257;
const TAR_CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

/// Container formats the pipeline knows how to unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveKind {
    Zip,
    Tar,
    GzipTar,
    Bzip2Tar,
}

impl ArchiveKind {
    pub const ALL: [ArchiveKind; 4] = [
        ArchiveKind::Zip,
        ArchiveKind::Tar,
        ArchiveKind::GzipTar,
        ArchiveKind::Bzip2Tar,
    ];

    /// Canonical extension used to name the saved upload. Never used for detection.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => ".zip",
            ArchiveKind::Tar => ".tar",
            ArchiveKind::GzipTar => ".tar.gz",
            ArchiveKind::Bzip2Tar => ".tar.bz2",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Tar => "tar",
            ArchiveKind::GzipTar => "gzip-tar",
            ArchiveKind::Bzip2Tar => "bzip2-tar",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveKind {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArchiveKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ArchiveError::UnsupportedFormat {
                detected: s.to_string(),
            })
    }
}

/// Detects the archive kind from the leading bytes of a file.
pub fn detect_from_bytes(bytes: &[u8]) -> Result<ArchiveKind, ArchiveError> {
    if bytes.starts_with(b"PK\x03\x04")
        || bytes.starts_with(b"PK\x05\x06")
        || bytes.starts_with(b"PK\x07\x08")
    {
        return Ok(ArchiveKind::Zip);
    }

    if bytes.starts_with(b"\x1f\x8b") {
        return Ok(ArchiveKind::GzipTar);
    }

    // "BZh" followed by the block size digit '1'..='9'
    if bytes.len() >= 4 && bytes.starts_with(b"BZh") && (b'1'..=b'9').contains(&bytes[3]) {
        return Ok(ArchiveKind::Bzip2Tar);
    }

    if looks_like_tar(bytes) {
        return Ok(ArchiveKind::Tar);
    }

    Err(ArchiveError::UnsupportedFormat {
        detected: describe_unknown(bytes),
    })
}

/// Detects the archive kind by reading at most one tar block from `reader`.
pub fn detect_from_reader<R: Read>(reader: R) -> Result<ArchiveKind, std::io::Error> {
    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    reader.take(SNIFF_LEN as u64).read_to_end(&mut buffer)?;
    // Unsupported content is reported as an io::Error of kind InvalidData so the
    // reader variant composes with other io-based callers.
    detect_from_bytes(&buffer)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

/// Detects the archive kind of the file at `path`.
pub fn detect_from_file(path: &Path) -> Result<ArchiveKind, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut buffer = Vec::with_capacity(SNIFF_LEN);
    BufReader::new(file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| ArchiveError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

    detect_from_bytes(&buffer)
}

/// POSIX/GNU tar carry `ustar` at offset 257; pre-POSIX headers are
/// recognised by their header checksum instead.
fn looks_like_tar(bytes: &[u8]) -> bool {
    if bytes.len() < SNIFF_LEN {
        return false;
    }

    if &bytes[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + 5] == b"ustar" {
        return true;
    }

    let header = &bytes[..SNIFF_LEN];
    // An all-zero block is an end-of-archive marker, not a header.
    if header.iter().all(|&b| b == 0) {
        return false;
    }

    match parse_octal(&header[TAR_CHECKSUM_RANGE]) {
        Some(recorded) => recorded == header_checksum(header),
        None => false,
    }
}

/// Sum of all header bytes with the checksum field itself counted as spaces.
fn header_checksum(header: &[u8]) -> u64 {
    header
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if TAR_CHECKSUM_RANGE.contains(&i) {
                u64::from(b' ')
            } else {
                u64::from(b)
            }
        })
        .sum()
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let digits: Vec<u8> = field
        .iter()
        .copied()
        .skip_while(|&b| b == b' ')
        .take_while(|&b| (b'0'..=b'7').contains(&b))
        .collect();
    if digits.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(&digits).ok()?;
    u64::from_str_radix(text, 8).ok()
}

fn describe_unknown(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "empty content".to_string();
    }
    if bytes.starts_with(b"Rar!\x1a\x07") {
        return "rar archive".to_string();
    }
    if bytes.starts_with(b"7z\xbc\xaf\x27\x1c") {
        return "7-zip archive".to_string();
    }
    if bytes.starts_with(b"\xfd7zXZ\x00") {
        return "xz compressed data".to_string();
    }
    if bytes.starts_with(b"\x28\xb5\x2f\xfd") {
        return "zstd compressed data".to_string();
    }
    let prefix: Vec<String> = bytes.iter().take(4).map(|b| format!("{:02x}", b)).collect();
    format!("unknown signature {}", prefix.join(" "))
}
