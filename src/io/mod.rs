mod fetcher;
mod remote;

pub use fetcher::{parse_content_range, ContentRange, RangeFetcher};
pub use remote::RemoteRangeSource;

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

/// A requested byte window: `length` bytes starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Exclusive end offset, `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.length)
    }

    /// Inclusive offset of the last byte, as used in the `Range` header.
    ///
    /// Only meaningful for non-empty ranges.
    pub fn last(&self) -> u64 {
        self.offset + self.length.saturating_sub(1)
    }

    /// True when the range is non-empty and lies entirely within `[0, size)`.
    pub fn is_within(&self, size: u64) -> bool {
        self.length > 0 && self.end().is_some_and(|end| end <= size)
    }

    /// Value for the HTTP `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.offset, self.last())
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end() {
            Some(end) => write!(f, "[{}, {})", self.offset, end),
            None => write!(f, "[{}, +{})", self.offset, self.length),
        }
    }
}

/// Random access to a byte source of known length.
///
/// This is the whole contract the archive parser relies on, so any source
/// (remote or in-memory) can stand behind it.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Fill `buf` with exactly `buf.len()` bytes starting at `offset`.
    ///
    /// An empty `buf` or a window past [`size`](ReadAt::size) is an
    /// `InvalidRange` error, never clamped.
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Total size of the data source.
    fn size(&self) -> u64;
}
