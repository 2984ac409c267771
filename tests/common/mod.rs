//! Shared fixtures: a small range-aware HTTP server, an in-memory source
//! and a ZIP builder.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use zipfetch::{ByteRange, RangeError, ReadAt};

/// How the fixture server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// A well-behaved server
    Honor,
    /// Answers ranged GETs with 200 and the whole object
    IgnoreRange,
    /// Promises the full window in both `Content-Range` and
    /// `Content-Length` but sends half of it before closing
    ShortBody,
    /// Waits before answering GETs
    Delay(Duration),
    /// No HEAD support, ranged probe reports `bytes 0-0/*`
    NoLength,
    /// No HEAD support, ranges honored
    RangeProbeOnly,
    /// HEAD advertises `Accept-Ranges: none`
    NoRanges,
    /// Serves a few extra bytes on both sides of the window
    WiderRange,
    /// Serves a window shifted one byte forward
    Misaligned,
    /// GETs fail with 500
    ServerError,
    /// HEAD claims `Content-Length: 0`, ranges honored
    ZeroHeadLength,
    /// `Content-Range` totals disagree with the HEAD length
    ChangedTotal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Inclusive `(first, last)` from the `Range` header
    pub range: Option<(u64, u64)>,
}

pub struct RangeServer {
    pub url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl RangeServer {
    pub async fn start(data: Vec<u8>, behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/archive.zip", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let data = Arc::new(data);

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let data = data.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = handle(socket, data, behavior, log).await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn ranged_requests(&self) -> Vec<(u64, u64)> {
        self.requests().into_iter().filter_map(|r| r.range).collect()
    }
}

async fn handle(
    mut socket: TcpStream,
    data: Arc<Vec<u8>>,
    behavior: Behavior,
    log: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let text = String::from_utf8_lossy(&request).into_owned();
    let mut lines = text.split("\r\n");
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or_default()
        .to_string();
    let range = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("range"))
        .and_then(|(_, v)| parse_range_header(v.trim()));

    log.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        range,
    });

    let reply = respond(&method, range, &data, behavior).await;
    socket.write_all(&reply).await?;
    socket.shutdown().await
}

fn parse_range_header(value: &str) -> Option<(u64, u64)> {
    let (first, last) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((first.parse().ok()?, last.parse().ok()?))
}

async fn respond(method: &str, range: Option<(u64, u64)>, data: &[u8], behavior: Behavior) -> Vec<u8> {
    let len = data.len() as u64;

    if method == "HEAD" {
        return match behavior {
            Behavior::NoLength | Behavior::RangeProbeOnly => {
                reply("405 Method Not Allowed", &[("Content-Length", "0".into())], &[])
            }
            Behavior::ZeroHeadLength => reply(
                "200 OK",
                &[("Content-Length", "0".into()), ("Accept-Ranges", "bytes".into())],
                &[],
            ),
            Behavior::NoRanges => reply(
                "200 OK",
                &[("Content-Length", len.to_string()), ("Accept-Ranges", "none".into())],
                &[],
            ),
            _ => reply(
                "200 OK",
                &[("Content-Length", len.to_string()), ("Accept-Ranges", "bytes".into())],
                &[],
            ),
        };
    }

    if let Behavior::Delay(delay) = behavior {
        tokio::time::sleep(delay).await;
    }

    let full = || reply("200 OK", &[("Content-Length", len.to_string())], data);
    let Some((first, last)) = range else {
        return full();
    };

    match behavior {
        Behavior::IgnoreRange => return full(),
        Behavior::ServerError => {
            return reply("500 Internal Server Error", &[("Content-Length", "0".into())], &[]);
        }
        _ => {}
    }

    if first >= len || last < first {
        return reply(
            "416 Range Not Satisfiable",
            &[("Content-Range", format!("bytes */{len}")), ("Content-Length", "0".into())],
            &[],
        );
    }
    let last = last.min(len - 1);

    let (first, last, total) = match behavior {
        Behavior::NoLength => (first, last, "*".to_string()),
        Behavior::WiderRange => (first.saturating_sub(8), (last + 8).min(len - 1), len.to_string()),
        Behavior::Misaligned => (first + 1, (last + 1).min(len - 1), len.to_string()),
        Behavior::ChangedTotal => (first, last, (len + 1).to_string()),
        _ => (first, last, len.to_string()),
    };

    let window = &data[first as usize..=last as usize];
    let body = match behavior {
        Behavior::ShortBody => &window[..window.len() / 2],
        _ => window,
    };

    reply(
        "206 Partial Content",
        &[
            ("Content-Range", format!("bytes {first}-{last}/{total}")),
            ("Content-Length", window.len().to_string()),
        ],
        body,
    )
}

fn reply(status: &str, headers: &[(&str, String)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

/// Deterministic, non-repeating-looking payload.
pub fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545F491u32;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// An in-memory [`ReadAt`] that counts reads.
pub struct MemorySource {
    data: Vec<u8>,
    reads: AtomicU64,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: AtomicU64::new(0),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for MemorySource {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), RangeError> {
        let range = ByteRange::new(offset, buf.len() as u64);
        if !range.is_within(self.size()) {
            return Err(RangeError::InvalidRange {
                range,
                size: self.size(),
            });
        }

        self.reads.fetch_add(1, Ordering::Relaxed);
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Builds small ZIP archives for tests.
#[derive(Default)]
pub struct ZipBuilder {
    out: Vec<u8>,
    central: Vec<u8>,
    entries: u16,
    last_central: usize,
    comment: Vec<u8>,
    zip64: bool,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw filler bytes, e.g. to push entries to known offsets.
    pub fn padding(mut self, len: usize) -> Self {
        self.out.resize(self.out.len() + len, 0xAA);
        self
    }

    pub fn stored(mut self, name: &str, data: &[u8]) -> Self {
        self.add(name, data, 0, data.to_vec(), &[]);
        self
    }

    pub fn deflated(mut self, name: &str, data: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();
        self.add(name, data, 8, compressed, &[]);
        self
    }

    /// A stored entry whose local header carries an extra field the
    /// central directory does not.
    pub fn stored_with_local_extra(mut self, name: &str, data: &[u8], extra_len: usize) -> Self {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0xCAFEu16.to_le_bytes());
        extra.extend_from_slice(&((extra_len - 4) as u16).to_le_bytes());
        extra.resize(extra_len, 0);
        self.add(name, data, 0, data.to_vec(), &extra);
        self
    }

    /// Rewrite the CRC of the most recent entry in the central directory.
    pub fn corrupt_last_crc(mut self) -> Self {
        let at = self.last_central + 16;
        self.central[at] ^= 0xFF;
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    /// End the archive with ZIP64 records and a saturated classic end record.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let cd_offset = self.out.len() as u64;
        let cd_size = self.central.len() as u64;
        self.out.extend_from_slice(&self.central);

        let (entries, cd_size, cd_offset) = if self.zip64 {
            let eocd64_offset = self.out.len() as u64;
            let entries = self.entries as u64;

            self.out.extend_from_slice(b"PK\x06\x06");
            self.out.extend_from_slice(&44u64.to_le_bytes()); // size of the rest
            self.out.extend_from_slice(&45u16.to_le_bytes()); // made by
            self.out.extend_from_slice(&45u16.to_le_bytes()); // needed
            self.out.extend_from_slice(&[0; 8]); // disk numbers
            self.out.extend_from_slice(&entries.to_le_bytes());
            self.out.extend_from_slice(&entries.to_le_bytes());
            self.out.extend_from_slice(&cd_size.to_le_bytes());
            self.out.extend_from_slice(&cd_offset.to_le_bytes());

            self.out.extend_from_slice(b"PK\x06\x07");
            self.out.extend_from_slice(&0u32.to_le_bytes());
            self.out.extend_from_slice(&eocd64_offset.to_le_bytes());
            self.out.extend_from_slice(&1u32.to_le_bytes());

            (0xFFFF, 0xFFFFFFFF, 0xFFFFFFFF)
        } else {
            (self.entries, cd_size as u32, cd_offset as u32)
        };

        self.out.extend_from_slice(b"PK\x05\x06");
        self.out.extend_from_slice(&[0, 0, 0, 0]);
        self.out.extend_from_slice(&entries.to_le_bytes());
        self.out.extend_from_slice(&entries.to_le_bytes());
        self.out.extend_from_slice(&cd_size.to_le_bytes());
        self.out.extend_from_slice(&cd_offset.to_le_bytes());
        self.out.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        self.out.extend_from_slice(&self.comment);
        self.out
    }

    fn add(&mut self, name: &str, raw: &[u8], method: u16, payload: Vec<u8>, local_extra: &[u8]) {
        let crc = crc32fast::hash(raw);
        let offset = self.out.len() as u32;

        self.out.extend_from_slice(b"PK\x03\x04");
        self.out.extend_from_slice(&20u16.to_le_bytes());
        self.out.extend_from_slice(&0u16.to_le_bytes());
        self.out.extend_from_slice(&method.to_le_bytes());
        self.out.extend_from_slice(&[0, 0, 0x21, 0]); // time, date
        self.out.extend_from_slice(&crc.to_le_bytes());
        self.out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        self.out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.out.extend_from_slice(&(local_extra.len() as u16).to_le_bytes());
        self.out.extend_from_slice(name.as_bytes());
        self.out.extend_from_slice(local_extra);
        self.out.extend_from_slice(&payload);

        self.last_central = self.central.len();
        self.central.extend_from_slice(b"PK\x01\x02");
        self.central.extend_from_slice(&20u16.to_le_bytes());
        self.central.extend_from_slice(&20u16.to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes());
        self.central.extend_from_slice(&method.to_le_bytes());
        self.central.extend_from_slice(&[0, 0, 0x21, 0]);
        self.central.extend_from_slice(&crc.to_le_bytes());
        self.central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        self.central.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        self.central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        self.central.extend_from_slice(&0u16.to_le_bytes()); // extra
        self.central.extend_from_slice(&0u16.to_le_bytes()); // comment
        self.central.extend_from_slice(&[0; 8]); // disk, attrs
        self.central.extend_from_slice(&offset.to_le_bytes());
        self.central.extend_from_slice(name.as_bytes());

        self.entries += 1;
    }
}
