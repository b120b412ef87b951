//! Archive format detection and unpacking.

pub mod extract;
pub mod kind;

pub use extract::Extractor;
pub use kind::{detect_from_bytes, detect_from_file, detect_from_reader, ArchiveKind};
