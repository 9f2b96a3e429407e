use std::collections::HashSet;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::records::{self, ArchiveEntry};
use super::{ArchiveError, Result};
use crate::checksum::crc32;

/// Totals reported once the central directory is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entry_count: u64,
    /// Sum of all payload lengths
    pub payload_bytes: u64,
    /// Length of the complete archive
    pub archive_bytes: u64,
}

/// Writes a stored ZIP archive one entry at a time.
///
/// Each [`add_entry`](Self::add_entry) writes the local header and payload
/// straight through to `W`; only the small per-entry directory records are
/// kept until [`finish`](Self::finish).
pub struct ArchiveEncoder<W> {
    writer: W,
    entries: Vec<ArchiveEntry>,
    names: HashSet<String>,
    offset: u64,
    payload_bytes: u64,
    max_entry_bytes: u64,
}

impl<W: AsyncWrite + Unpin> ArchiveEncoder<W> {
    pub fn new(writer: W, max_entry_bytes: u64) -> Self {
        Self {
            writer,
            entries: Vec::new(),
            names: HashSet::new(),
            offset: 0,
            payload_bytes: 0,
            // Sizes are 32-bit header fields
            max_entry_bytes: max_entry_bytes.min(u64::from(u32::MAX) - 1),
        }
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Append one entry. `name` must already be sanitized and unique.
    pub async fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<&ArchiveEntry> {
        let size = data.len() as u64;
        if size > self.max_entry_bytes {
            return Err(ArchiveError::EntryTooLarge {
                name: name.to_string(),
                size,
                limit: self.max_entry_bytes,
            });
        }
        if name.is_empty() {
            return Err(ArchiveError::EmptyName);
        }
        if name.len() > usize::from(u16::MAX) {
            return Err(ArchiveError::NameTooLong(name.len()));
        }
        if self.names.contains(name) {
            return Err(ArchiveError::DuplicateName(name.to_string()));
        }

        let entry = ArchiveEntry {
            name: name.to_string(),
            size: size as u32,
            crc32: crc32(data),
            header_offset: self.offset,
        };
        let next_offset = self
            .offset
            .checked_add(entry.local_len())
            .ok_or(ArchiveError::OffsetOverflow)?;

        self.writer.write_all(&records::local_header(&entry)).await?;
        self.writer.write_all(data).await?;

        debug!(
            name,
            size,
            crc32 = format_args!("{:08x}", entry.crc32),
            offset = entry.header_offset,
            "Entry written"
        );

        self.offset = next_offset;
        self.payload_bytes += size;
        self.names.insert(entry.name.clone());
        self.entries.push(entry);

        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Write the central directory and end records, flush, and hand back the writer
    pub async fn finish(mut self) -> Result<(W, ArchiveSummary)> {
        let directory_offset = self.offset;
        let mut directory_len = 0u64;

        for entry in &self.entries {
            let record = records::central_header(entry);
            self.writer.write_all(&record).await?;
            directory_len += record.len() as u64;
        }

        let entry_count = self.entries.len() as u64;
        let end = records::end_of_central_directory(entry_count, directory_len, directory_offset);
        self.writer.write_all(&end).await?;
        self.writer.flush().await?;

        let summary = ArchiveSummary {
            entry_count,
            payload_bytes: self.payload_bytes,
            archive_bytes: directory_offset + directory_len + end.len() as u64,
        };
        debug!(
            entries = summary.entry_count,
            bytes = summary.archive_bytes,
            "Archive finished"
        );

        Ok((self.writer, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    async fn encode(entries: &[(&str, &[u8])]) -> (Vec<u8>, ArchiveSummary) {
        let mut encoder = ArchiveEncoder::new(Vec::new(), 1024 * 1024);
        for (name, data) in entries {
            encoder.add_entry(name, data).await.unwrap();
        }
        encoder.finish().await.unwrap()
    }

    #[tokio::test]
    async fn test_standard_reader_round_trip() {
        let big: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let entries: Vec<(&str, &[u8])> = vec![
            ("IMG_0001.jpg", &b"jpeg bytes"[..]),
            ("empty.txt", &b""[..]),
            ("clip.mp4", &big[..]),
        ];

        let (bytes, summary) = encode(&entries).await;
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.archive_bytes, bytes.len() as u64);
        assert_eq!(summary.payload_bytes, 10 + 100_000);

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);

        for (name, data) in entries {
            let mut file = archive.by_name(name).unwrap();
            assert_eq!(file.size(), data.len() as u64);
            assert_eq!(file.crc32(), crc32(data));
            let mut content = Vec::new();
            file.read_to_end(&mut content).unwrap();
            assert_eq!(content, data);
        }
    }

    #[tokio::test]
    async fn test_entries_keep_write_order() {
        let (bytes, _) = encode(&[
            ("b.jpg", &b"2"[..]),
            ("a.jpg", &b"1"[..]),
            ("c.jpg", &b"3"[..]),
        ])
        .await;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["b.jpg", "a.jpg", "c.jpg"]);
    }

    #[tokio::test]
    async fn test_non_ascii_names_readable() {
        let (bytes, _) =
            encode(&[("свадьба фото.jpg", &b"x"[..]), ("café.png", &b"y"[..])]).await;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.by_name("свадьба фото.jpg").is_ok());
        assert!(archive.by_name("café.png").is_ok());
    }

    #[tokio::test]
    async fn test_empty_archive_is_just_end_record() {
        let (bytes, summary) = encode(&[]).await;

        assert_eq!(bytes.len(), records::END_OF_CENTRAL_DIRECTORY_LEN);
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x05, 0x06]);
        assert_eq!(summary.entry_count, 0);
    }

    #[tokio::test]
    async fn test_offsets_advance_by_header_name_and_payload() {
        let mut encoder = ArchiveEncoder::new(Vec::new(), 1024);

        let first = encoder.add_entry("a.jpg", b"12345").await.unwrap().clone();
        let second = encoder.add_entry("bb.jpg", b"xy").await.unwrap().clone();

        assert_eq!(first.header_offset, 0);
        assert_eq!(second.header_offset, 30 + 5 + 5);
        assert_eq!(encoder.bytes_written(), 40 + 30 + 6 + 2);
        assert_eq!(encoder.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_oversized_entry_rejected_without_writing() {
        let mut encoder = ArchiveEncoder::new(Vec::new(), 4);

        let err = encoder.add_entry("big.mp4", b"12345").await.unwrap_err();
        assert!(matches!(err, ArchiveError::EntryTooLarge { size: 5, limit: 4, .. }));
        assert_eq!(encoder.bytes_written(), 0);

        encoder.add_entry("ok.jpg", b"1234").await.unwrap();
        let (bytes, summary) = encoder.finish().await.unwrap();
        assert_eq!(summary.entry_count, 1);
        assert_eq!(zip::ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_empty_names_rejected() {
        let mut encoder = ArchiveEncoder::new(Vec::new(), 1024);
        encoder.add_entry("a.jpg", b"1").await.unwrap();

        assert!(matches!(
            encoder.add_entry("a.jpg", b"2").await,
            Err(ArchiveError::DuplicateName(_))
        ));
        assert!(matches!(
            encoder.add_entry("", b"2").await,
            Err(ArchiveError::EmptyName)
        ));
        assert_eq!(encoder.entry_count(), 1);
    }
}
