use flate2::write::DeflateDecoder;
use log::{debug, warn};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::io::ReadAt;
use anyhow::{Context, Result, bail};

use super::directory::{DirectoryParser, local_header_len};
use super::records::{ArchiveEntry, CompressionMethod, LFH_SIZE};

/// Size of each compressed-data read after the first one.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Receives the cumulative number of output bytes written so far.
pub type ProgressSender = mpsc::Sender<u64>;

/// Streams single entries out of an archive.
pub struct EntryExtractor<R: ReadAt> {
    parser: DirectoryParser<R>,
    chunk_size: usize,
}

impl<R: ReadAt> EntryExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: DirectoryParser::new(reader),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// List all entries in the archive
    pub async fn list_entries(&self) -> Result<Vec<ArchiveEntry>> {
        self.parser.list_entries().await
    }

    pub async fn find_entry(&self, name: &str) -> Result<ArchiveEntry> {
        self.parser.find_entry(name).await
    }

    /// Write the entry's decompressed contents to `writer`.
    ///
    /// The local header and the first data chunk come from one read. Any
    /// data left after that is fetched in `chunk_size` reads. The output is
    /// checked against the size and CRC-32 recorded in the central
    /// directory. Returns the number of bytes written.
    pub async fn extract_to_writer<W>(
        &self,
        entry: &ArchiveEntry,
        writer: &mut W,
        progress: Option<&ProgressSender>,
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if entry.is_directory() {
            bail!("{} is a directory", entry.name);
        }
        if entry.is_encrypted() {
            bail!("{} is encrypted, which is not supported", entry.name);
        }

        let mut sink = EntrySink::new(entry.compression_method)?;

        // Nothing stored means nothing to fetch.
        if entry.compressed_size > 0 {
            self.copy_data(entry, &mut sink, writer, progress).await?;
        }

        let (written, crc32) = sink.finish(writer).await?;
        writer.flush().await?;

        if written != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.name,
                entry.uncompressed_size,
                written
            );
        }
        if crc32 != entry.crc32 {
            bail!(
                "CRC mismatch for {}: expected {:08x}, got {:08x}",
                entry.name,
                entry.crc32,
                crc32
            );
        }

        Ok(written)
    }

    async fn copy_data<W>(
        &self,
        entry: &ArchiveEntry,
        sink: &mut EntrySink,
        writer: &mut W,
        progress: Option<&ProgressSender>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let reader = self.parser.reader();
        let size = reader.size();
        let chunk = self.chunk_size as u64;

        // Guess the local header from the central one and fetch it together
        // with the first data chunk.
        let window = (entry.expected_header_len() + entry.compressed_size.min(chunk))
            .min(size.saturating_sub(entry.lfh_offset));
        if window < LFH_SIZE as u64 {
            bail!("Local header of {} lies outside the archive", entry.name);
        }

        let mut buf = vec![0u8; window as usize];
        reader.read_at(entry.lfh_offset, &mut buf).await?;

        let header_len = local_header_len(&buf)?;
        let data_offset = entry.lfh_offset + header_len;
        if data_offset
            .checked_add(entry.compressed_size)
            .is_none_or(|end| end > size)
        {
            bail!("Data of {} extends past the end of the archive", entry.name);
        }

        let mut copied = 0u64;
        if (header_len as usize) < buf.len() {
            let available = (buf.len() as u64 - header_len).min(entry.compressed_size);
            let start = header_len as usize;
            sink.push(&buf[start..start + available as usize], writer, progress)
                .await?;
            copied = available;
        }

        if copied < entry.compressed_size {
            debug!(
                "{}: {} of {} compressed bytes came with the header",
                entry.name, copied, entry.compressed_size
            );
        }

        while copied < entry.compressed_size {
            let n = (entry.compressed_size - copied).min(chunk) as usize;
            buf.resize(n, 0);
            reader.read_at(data_offset + copied, &mut buf).await?;
            sink.push(&buf, writer, progress).await?;
            copied += n as u64;
        }

        Ok(())
    }

    /// Extract an entry into memory
    pub async fn extract_to_memory(&self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.extract_to_writer(entry, &mut data, None).await?;
        Ok(data)
    }

    /// Extract an entry to disk.
    ///
    /// A failed extraction removes the partially written file.
    pub async fn extract_to_file(
        &self,
        entry: &ArchiveEntry,
        output_path: &Path,
        progress: Option<&ProgressSender>,
    ) -> Result<u64> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path)
            .await
            .with_context(|| format!("Unable to create {}", output_path.display()))?;

        match self.extract_to_writer(entry, &mut file, progress).await {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);
                if let Err(rm) = fs::remove_file(output_path).await {
                    warn!("could not remove {}: {}", output_path.display(), rm);
                }
                Err(e)
            }
        }
    }

    /// Extract an entry to stdout
    pub async fn extract_to_stdout(
        &self,
        entry: &ArchiveEntry,
        progress: Option<&ProgressSender>,
    ) -> Result<u64> {
        let mut stdout = tokio::io::stdout();
        self.extract_to_writer(entry, &mut stdout, progress).await
    }
}

enum Decoder {
    Stored,
    Deflate(DeflateDecoder<Vec<u8>>),
}

/// Decodes compressed chunks and writes the output, keeping a running CRC.
struct EntrySink {
    decoder: Decoder,
    hasher: crc32fast::Hasher,
    written: u64,
    fed: bool,
}

impl EntrySink {
    fn new(method: CompressionMethod) -> Result<Self> {
        let decoder = match method {
            CompressionMethod::Stored => Decoder::Stored,
            CompressionMethod::Deflate => Decoder::Deflate(DeflateDecoder::new(Vec::new())),
            CompressionMethod::Unknown(code) => {
                bail!("Unsupported compression method: {}", code)
            }
        };

        Ok(Self {
            decoder,
            hasher: crc32fast::Hasher::new(),
            written: 0,
            fed: false,
        })
    }

    async fn push<W>(
        &mut self,
        data: &[u8],
        writer: &mut W,
        progress: Option<&ProgressSender>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.fed = true;
        let out: &[u8] = match &mut self.decoder {
            Decoder::Stored => data,
            Decoder::Deflate(decoder) => {
                decoder.write_all(data).context("Corrupt deflate stream")?;
                decoder.get_ref()
            }
        };

        self.hasher.update(out);
        writer.write_all(out).await?;
        self.written += out.len() as u64;

        if let Decoder::Deflate(decoder) = &mut self.decoder {
            decoder.get_mut().clear();
        }
        if let Some(tx) = progress {
            // Values are cumulative, so a full channel can drop one.
            let _ = tx.try_send(self.written);
        }

        Ok(())
    }

    /// Flush what the decoder still holds; returns total bytes and CRC-32.
    async fn finish<W>(mut self, writer: &mut W) -> Result<(u64, u32)>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if let Decoder::Deflate(decoder) = self.decoder {
            if self.fed {
                let rest = decoder.finish().context("Corrupt deflate stream")?;
                self.hasher.update(&rest);
                writer.write_all(&rest).await?;
                self.written += rest.len() as u64;
            }
        }

        Ok((self.written, self.hasher.finalize()))
    }
}
