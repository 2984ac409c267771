use log::{debug, warn};
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ByteRange;
use crate::config::RemoteConfig;
use crate::error::{FetchStage, RangeError, Result};

/// A parsed `Content-Range: bytes <first>-<last>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub first: u64,
    pub last: u64,
    /// `None` when the server sent `*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Whether the served window contains every byte of `range`.
    pub fn covers(&self, range: &ByteRange) -> bool {
        self.first <= range.offset && self.last >= range.last()
    }
}

/// Parse a `Content-Range` header value. Unsatisfied forms (`bytes */N`)
/// and malformed values yield `None`.
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.split_once('/')?;
    let (first, last) = span.trim().split_once('-')?;
    let first: u64 = first.trim().parse().ok()?;
    let last: u64 = last.trim().parse().ok()?;
    if last < first {
        return None;
    }

    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse().ok()?),
    };

    Some(ContentRange { first, last, total })
}

/// Issues single bounded HTTP GETs with a `Range` header and validates
/// what comes back.
///
/// The client is shared across requests for connection pooling. Nothing is
/// retried here.
pub struct RangeFetcher {
    client: Client,
    url: String,
    timeout: Duration,
    requests: AtomicU64,
    transferred_bytes: AtomicU64,
}

impl RangeFetcher {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = Client::builder().build().map_err(RangeError::Client)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            timeout: config.timeout,
            requests: AtomicU64::new(0),
            transferred_bytes: AtomicU64::new(0),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of HTTP requests issued so far, probes included
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Get total body bytes received from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// Discover the total length of the remote object.
    ///
    /// Tries `HEAD` first and falls back to a ranged `GET` of the first byte,
    /// reading the total from its `Content-Range`.
    pub async fn probe_length(&self) -> Result<u64> {
        if let Some(size) = self.head_length().await? {
            debug!("HEAD {} reports {} bytes", self.url, size);
            return Ok(size);
        }

        let probe = ByteRange::new(0, 1);
        let resp = self.send_range(probe, FetchStage::Probe).await?;
        let status = resp.status();
        debug!("GET {} ({}) -> {}", self.url, probe.header_value(), status);

        match status {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK => {
                return Err(RangeError::RangeUnsupported {
                    range: probe,
                    status,
                });
            }
            _ => {
                return Err(RangeError::ResourceLengthUnknown {
                    url: self.url.clone(),
                    reason: format!("range probe returned status {status}"),
                });
            }
        }

        resp.headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .and_then(|served| served.total)
            .ok_or_else(|| RangeError::ResourceLengthUnknown {
                url: self.url.clone(),
                reason: "range probe did not report a total length".to_string(),
            })
    }

    /// `Content-Length` from a `HEAD` request, if the server gives a usable one.
    async fn head_length(&self) -> Result<Option<u64>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let resp = match self
            .client
            .head(&self.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HEAD {} failed, falling back to a range probe: {}", self.url, e);
                return Ok(None);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            debug!("HEAD {} -> {}", self.url, status);
            return Ok(None);
        }

        let accept_ranges = resp
            .headers()
            .get(ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok());
        if accept_ranges.is_some_and(|v| v.trim().eq_ignore_ascii_case("none")) {
            return Err(RangeError::RangeUnsupported {
                range: ByteRange::new(0, 1),
                status,
            });
        }

        // Read the header directly: the body of a HEAD response is always empty.
        // Dynamic servers may claim 0 here, which the range probe settles.
        Ok(resp
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok())
            .filter(|&len: &u64| len > 0))
    }

    /// Fill `buf` with the bytes at `offset`, using exactly one request.
    ///
    /// `size` is the length established by the probe; a served window that
    /// reports a different total belongs to another version of the object.
    /// The response is dropped before returning on every path, which closes
    /// or recycles the connection.
    pub async fn fetch(&self, offset: u64, buf: &mut [u8], size: u64) -> Result<()> {
        let range = ByteRange::new(offset, buf.len() as u64);
        let mut resp = self.send_range(range, FetchStage::Request).await?;
        let status = resp.status();
        debug!("GET {} ({}) -> {}", self.url, range.header_value(), status);

        match status {
            StatusCode::PARTIAL_CONTENT => {}
            StatusCode::OK => return Err(RangeError::RangeUnsupported { range, status }),
            _ => return Err(RangeError::HttpStatus { range, status }),
        }

        // A wider window is acceptable as long as it covers ours.
        let served_first = match resp.headers().get(CONTENT_RANGE) {
            Some(value) => {
                let raw = value.to_str().unwrap_or_default();
                match parse_content_range(raw) {
                    Some(served)
                        if served.covers(&range) && served.total.is_none_or(|t| t == size) =>
                    {
                        served.first
                    }
                    _ => {
                        return Err(RangeError::RangeMismatch {
                            range,
                            served: raw.to_string(),
                        });
                    }
                }
            }
            None => offset,
        };

        let mut skip = offset - served_first;
        let mut filled = 0usize;

        while filled < buf.len() {
            let chunk = match resp.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                // A body cut off before its promised length surfaces as an
                // error from hyper rather than a clean end of stream.
                Err(e) if !e.is_timeout() && (e.is_body() || e.is_decode()) => {
                    debug!("body of {} ended early: {}", range, e);
                    break;
                }
                Err(e) => return Err(RangeError::transport(e, range, FetchStage::Body)),
            };
            self.transferred_bytes
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);

            let mut data = &chunk[..];
            if skip > 0 {
                let n = skip.min(data.len() as u64) as usize;
                data = &data[n..];
                skip -= n as u64;
            }

            let n = data.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&data[..n]);
            filled += n;
        }

        if filled < buf.len() {
            return Err(RangeError::ShortRead {
                range,
                received: filled as u64,
            });
        }

        Ok(())
    }

    async fn send_range(&self, range: ByteRange, stage: FetchStage) -> Result<Response> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.client
            .get(&self.url)
            .header(RANGE, range.header_value())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RangeError::transport(e, range, stage))
    }
}
