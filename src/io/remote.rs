use async_trait::async_trait;
use log::{debug, info};

use super::{ByteRange, RangeFetcher, ReadAt};
use crate::config::RemoteConfig;
use crate::error::{RangeError, Result};

/// A remote HTTP object presented as a random-access byte source.
///
/// The length is probed once in [`connect`](Self::connect) and treated as
/// fixed afterwards. Every [`read_at`](ReadAt::read_at) is exactly one range
/// request: there is no cache and no read-ahead, because the archive parser
/// reads sparse, non-sequential windows.
pub struct RemoteRangeSource {
    fetcher: RangeFetcher,
    size: u64,
}

impl RemoteRangeSource {
    /// Create a new remote source
    ///
    /// This sends a probe request to learn the object's length, failing with
    /// `ResourceLengthUnknown` if the server will not tell.
    pub async fn connect(config: RemoteConfig) -> Result<Self> {
        let fetcher = RangeFetcher::new(&config)?;
        let size = fetcher.probe_length().await?;
        info!("{} is {} bytes", config.url, size);

        Ok(Self { fetcher, size })
    }

    pub fn url(&self) -> &str {
        self.fetcher.url()
    }

    /// Number of HTTP requests issued, including the length probe
    pub fn request_count(&self) -> u64 {
        self.fetcher.request_count()
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.fetcher.transferred_bytes()
    }
}

#[async_trait]
impl ReadAt for RemoteRangeSource {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let range = ByteRange::new(offset, buf.len() as u64);
        if !range.is_within(self.size) {
            return Err(RangeError::InvalidRange {
                range,
                size: self.size,
            });
        }

        debug!("read_at {}", range);
        self.fetcher.fetch(offset, buf, self.size).await
    }

    fn size(&self) -> u64 {
        self.size
    }
}
