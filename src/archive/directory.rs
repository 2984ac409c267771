//! ZIP central directory reader.
//!
//! Reads from any [`ReadAt`] source, in the order the format dictates:
//! 1. The End of Central Directory (EOCD) at the tail of the archive
//! 2. The ZIP64 EOCD, if the classic record is saturated
//! 3. The whole Central Directory in a single read
//!
//! Against a remote source each step is one range request, so listing an
//! archive costs a handful of small reads regardless of its size.

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;
use std::io::{Cursor, Read};
use std::sync::Arc;

use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::records::*;

/// Largest comment the format allows after the EOCD.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Central directory reader over a random-access source.
///
/// Usually driven through [`EntryExtractor`](super::EntryExtractor).
pub struct DirectoryParser<R: ReadAt> {
    reader: Arc<R>,
    size: u64,
}

impl<R: ReadAt> DirectoryParser<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// The trailing 22 bytes are tried first, which is enough for archives
    /// without a comment. Otherwise the largest possible comment window is
    /// read and scanned backward for a signature whose comment length
    /// matches the bytes that follow it.
    ///
    /// Returns the record and its offset in the archive.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let eocd_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < eocd_size {
            bail!("Not a valid ZIP file: only {} bytes", self.size);
        }

        let offset = self.size - eocd_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_at(offset, &mut buf).await?;

        if &buf[0..4] == EndOfCentralDirectory::SIGNATURE && buf[20..22] == [0, 0] {
            return Ok((EndOfCentralDirectory::from_bytes(&buf)?, offset));
        }

        debug!("no comment-less EOCD at {}, scanning for a comment", offset);
        let search_size = (MAX_COMMENT_SIZE + eocd_size).min(self.size);
        let search_start = self.size - search_size;

        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_at(search_start, &mut buf).await?;

        let eocd_len = EndOfCentralDirectory::SIZE;
        for i in (0..=buf.len() - eocd_len).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }

            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len == buf.len() - i - eocd_len {
                let eocd = EndOfCentralDirectory::from_bytes(&buf[i..i + eocd_len])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        bail!("Not a valid ZIP file: end of central directory not found")
    }

    /// Read the ZIP64 EOCD via the locator that precedes the classic EOCD.
    pub async fn read_zip64_eocd(&self, eocd_offset: u64) -> Result<Zip64EndOfCentralDirectory> {
        let Some(locator_offset) = eocd_offset.checked_sub(Zip64Locator::SIZE as u64) else {
            bail!("Invalid ZIP64 archive: no room for the locator");
        };

        let mut locator_buf = vec![0u8; Zip64Locator::SIZE];
        self.reader
            .read_at(locator_offset, &mut locator_buf)
            .await?;
        let locator = Zip64Locator::from_bytes(&locator_buf)?;

        let mut eocd64_buf = vec![0u8; Zip64EndOfCentralDirectory::MIN_SIZE];
        self.reader
            .read_at(locator.eocd64_offset, &mut eocd64_buf)
            .await?;

        Zip64EndOfCentralDirectory::from_bytes(&eocd64_buf)
    }

    /// List every entry of the archive.
    ///
    /// An empty archive costs no directory read.
    pub async fn list_entries(&self) -> Result<Vec<ArchiveEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let eocd64 = self.read_zip64_eocd(eocd_offset).await?;
            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        if total_entries == 0 {
            return Ok(Vec::new());
        }
        if cd_size < CDFH_MIN_SIZE as u64 {
            bail!("Central directory too small for {} entries", total_entries);
        }
        if cd_offset
            .checked_add(cd_size)
            .is_none_or(|end| end > eocd_offset)
        {
            bail!(
                "Central directory at {} ({} bytes) overlaps the end record at {}",
                cd_offset,
                cd_size,
                eocd_offset
            );
        }

        debug!(
            "central directory: {} entries, {} bytes at {}",
            total_entries, cd_size, cd_offset
        );
        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_at(cd_offset, &mut cd_data).await?;

        let capacity = total_entries.min(cd_size / CDFH_MIN_SIZE as u64) as usize;
        let mut entries = Vec::with_capacity(capacity);
        let mut cursor = Cursor::new(cd_data.as_slice());

        for _ in 0..total_entries {
            entries.push(parse_cdfh(&mut cursor)?);
        }

        Ok(entries)
    }

    /// Look an entry up by its exact stored name.
    pub async fn find_entry(&self, name: &str) -> Result<ArchiveEntry> {
        let entries = self.list_entries().await?;
        match entries.into_iter().find(|e| e.name == name) {
            Some(entry) => Ok(entry),
            None => bail!("Unable to find {} in archive", name),
        }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }
}

/// Parse one Central Directory File Header.
fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ArchiveEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let compression_method = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_time = cursor.read_u16::<LittleEndian>()?;
    let _last_mod_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    let _disk_number_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let _external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut name_bytes = vec![0u8; name_len as usize];
    cursor.read_exact(&mut name_bytes)?;
    let name = String::from_utf8_lossy(&name_bytes).into_owned();

    let extra_end = cursor.position() + extra_len as u64;

    while cursor.position() + 4 <= extra_end {
        let header_id = cursor.read_u16::<LittleEndian>()?;
        let field_size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = (cursor.position() + field_size).min(extra_end);

        if header_id == ZIP64_EXTRA_ID {
            // Only the saturated header fields are present, in this order.
            if uncompressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                uncompressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if compressed_size == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                compressed_size = cursor.read_u64::<LittleEndian>()?;
            }
            if lfh_offset == 0xFFFFFFFF && cursor.position() + 8 <= field_end {
                lfh_offset = cursor.read_u64::<LittleEndian>()?;
            }
        }

        cursor.set_position(field_end);
    }

    // comment is unused
    cursor.set_position(extra_end + comment_len as u64);

    Ok(ArchiveEntry {
        name,
        compression_method: CompressionMethod::from(compression_method),
        compressed_size,
        uncompressed_size,
        crc32,
        flags,
        lfh_offset,
        name_len,
        extra_len,
    })
}

/// Length of a local file header (fixed part, name and extra field),
/// given at least its first 30 bytes.
pub(crate) fn local_header_len(header: &[u8]) -> Result<u64> {
    if header.len() < LFH_SIZE || &header[0..4] != LFH_SIGNATURE {
        bail!("Invalid Local File Header");
    }

    let mut cursor = Cursor::new(&header[26..]);
    let name_len = cursor.read_u16::<LittleEndian>()? as u64;
    let extra_len = cursor.read_u16::<LittleEndian>()? as u64;

    Ok(LFH_SIZE as u64 + name_len + extra_len)
}
