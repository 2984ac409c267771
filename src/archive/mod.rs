//! ZIP archive reading on top of a random-access source.
//!
//! Nothing here knows about HTTP. The parser only asks a [`ReadAt`]
//! implementation for `(offset, length)` windows, which keeps it usable
//! (and testable) against any byte source.
//!
//! [`ReadAt`]: crate::io::ReadAt
//!
//! ## Layout
//!
//! - [`records`]: fixed-layout records (EOCD, ZIP64 EOCD, entry metadata)
//! - [`directory`]: locating and parsing the central directory
//! - [`extractor`]: streaming a single entry out to a writer
//!
//! ## Supported Features
//!
//! - ZIP64 archives and entries
//! - STORED and DEFLATE entries, verified by CRC-32
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support

pub mod directory;
pub mod extractor;
pub mod records;

pub use directory::DirectoryParser;
pub use extractor::{DEFAULT_CHUNK_SIZE, EntryExtractor, ProgressSender};
pub use records::{ArchiveEntry, CompressionMethod};
