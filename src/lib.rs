//! # zipfetch
//!
//! Extract a single entry from a ZIP archive on an HTTP server without
//! downloading the archive.
//!
//! A remote object is wrapped in a [`RemoteRangeSource`], which exposes it as
//! a random-access byte source ([`ReadAt`]) backed by HTTP Range requests.
//! The archive layer reads the end-of-central-directory record, the central
//! directory and the chosen entry's bytes through that interface, so only
//! those windows ever cross the network.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use zipfetch::{EntryExtractor, RemoteConfig, RemoteRangeSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = RemoteConfig::new("https://example.com/archive.zip");
//!     let source = Arc::new(RemoteRangeSource::connect(config).await?);
//!
//!     let extractor = EntryExtractor::new(source);
//!     let entry = extractor.find_entry("data.bin").await?;
//!     let bytes = extractor.extract_to_memory(&entry).await?;
//!     println!("{} bytes", bytes.len());
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;

pub use archive::{ArchiveEntry, EntryExtractor};
pub use cli::Cli;
pub use config::RemoteConfig;
pub use error::{FetchStage, RangeError};
pub use io::{ByteRange, ReadAt, RemoteRangeSource};
