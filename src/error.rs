//! Error types for the remote range-reading core.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::io::ByteRange;

/// Result type for range reads.
pub type Result<T> = std::result::Result<T, RangeError>;

/// Stage of an HTTP exchange at which a transport failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    /// Length discovery (`HEAD` or `bytes=0-0`).
    Probe,
    /// Sending the request and waiting for response headers.
    Request,
    /// Streaming the response body.
    Body,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStage::Probe => f.write_str("probe"),
            FetchStage::Request => f.write_str("request"),
            FetchStage::Body => f.write_str("body"),
        }
    }
}

/// Failures of the remote range-reading core.
///
/// None of these are retried internally. Each carries the requested range
/// (and status where one was received) so the caller can decide what to do.
#[derive(Debug, Error)]
pub enum RangeError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("cannot determine length of {url}: {reason}")]
    ResourceLengthUnknown { url: String, reason: String },

    #[error("invalid range {range} for a resource of {size} bytes")]
    InvalidRange { range: ByteRange, size: u64 },

    #[error("server ignored range request for {range} (status {status})")]
    RangeUnsupported { range: ByteRange, status: StatusCode },

    #[error("short read for {range}: received {received} bytes")]
    ShortRead { range: ByteRange, received: u64 },

    #[error("server returned {served} for requested {range}")]
    RangeMismatch { range: ByteRange, served: String },

    #[error("unexpected status {status} for {range}")]
    HttpStatus { range: ByteRange, status: StatusCode },

    #[error("timed out during {stage} for {range}")]
    TransportTimeout { range: ByteRange, stage: FetchStage },

    #[error("transport error during {stage} for {range}: {source}")]
    TransportError {
        range: ByteRange,
        stage: FetchStage,
        #[source]
        source: reqwest::Error,
    },
}

impl RangeError {
    /// Map a `reqwest` failure, separating timeouts from other transport errors.
    pub(crate) fn transport(err: reqwest::Error, range: ByteRange, stage: FetchStage) -> Self {
        if err.is_timeout() {
            RangeError::TransportTimeout { range, stage }
        } else {
            RangeError::TransportError {
                range,
                stage,
                source: err,
            }
        }
    }
}
