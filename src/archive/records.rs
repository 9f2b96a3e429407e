//! Byte layouts of the ZIP records the encoder emits.
//!
//! All multi-byte fields are little-endian. Entries are always stored
//! (method 0) with a zeroed DOS timestamp. Entry sizes fit in 32 bits, so
//! ZIP64 structures appear only in the central directory, for header
//! offsets past 4 GiB and for directories too large for the classic
//! end record.

use bytes::{BufMut, BytesMut};

pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0606_4b50;
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

pub const LOCAL_HEADER_LEN: usize = 30;
pub const CENTRAL_HEADER_LEN: usize = 46;
pub const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY_LEN: usize = 56;
pub const ZIP64_LOCATOR_LEN: usize = 20;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;
const FLAG_UTF8_NAME: u16 = 1 << 11;
const METHOD_STORED: u16 = 0;

const U16_MARKER: u16 = 0xFFFF;
const U32_MARKER: u32 = 0xFFFF_FFFF;

/// One encoded entry, kept until the central directory is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u32,
    pub crc32: u32,
    /// Offset of the local header from the start of the archive
    pub header_offset: u64,
}

impl ArchiveEntry {
    fn flags(&self) -> u16 {
        if self.name.is_ascii() { 0 } else { FLAG_UTF8_NAME }
    }

    fn needs_zip64_offset(&self) -> bool {
        self.header_offset >= u64::from(U32_MARKER)
    }

    /// Bytes this entry occupies before the central directory
    pub fn local_len(&self) -> u64 {
        (LOCAL_HEADER_LEN + self.name.len()) as u64 + u64::from(self.size)
    }
}

/// Local file header followed by the name; the payload comes next
pub fn local_header(entry: &ArchiveEntry) -> BytesMut {
    let mut buf = BytesMut::with_capacity(LOCAL_HEADER_LEN + entry.name.len());
    buf.put_u32_le(LOCAL_HEADER_SIGNATURE);
    buf.put_u16_le(VERSION_DEFAULT);
    buf.put_u16_le(entry.flags());
    buf.put_u16_le(METHOD_STORED);
    buf.put_u16_le(0); // mod time
    buf.put_u16_le(0); // mod date
    buf.put_u32_le(entry.crc32);
    buf.put_u32_le(entry.size);
    buf.put_u32_le(entry.size);
    buf.put_u16_le(entry.name.len() as u16);
    buf.put_u16_le(0); // extra length
    buf.put_slice(entry.name.as_bytes());
    buf
}

/// Central directory record mirroring the local header plus its offset
pub fn central_header(entry: &ArchiveEntry) -> BytesMut {
    let zip64 = entry.needs_zip64_offset();
    let extra_len: u16 = if zip64 { 12 } else { 0 };
    let version = if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };
    let offset = if zip64 {
        U32_MARKER
    } else {
        entry.header_offset as u32
    };

    let mut buf =
        BytesMut::with_capacity(CENTRAL_HEADER_LEN + entry.name.len() + usize::from(extra_len));
    buf.put_u32_le(CENTRAL_HEADER_SIGNATURE);
    buf.put_u16_le(version); // made by, MS-DOS host
    buf.put_u16_le(version); // needed to extract
    buf.put_u16_le(entry.flags());
    buf.put_u16_le(METHOD_STORED);
    buf.put_u16_le(0);
    buf.put_u16_le(0);
    buf.put_u32_le(entry.crc32);
    buf.put_u32_le(entry.size);
    buf.put_u32_le(entry.size);
    buf.put_u16_le(entry.name.len() as u16);
    buf.put_u16_le(extra_len);
    buf.put_u16_le(0); // comment length
    buf.put_u16_le(0); // disk number start
    buf.put_u16_le(0); // internal attributes
    buf.put_u32_le(0); // external attributes
    buf.put_u32_le(offset);
    buf.put_slice(entry.name.as_bytes());

    if zip64 {
        buf.put_u16_le(ZIP64_EXTRA_FIELD_ID);
        buf.put_u16_le(8);
        buf.put_u64_le(entry.header_offset);
    }

    buf
}

/// Everything after the central directory: optional ZIP64 end record and
/// locator, then the classic end record
pub fn end_of_central_directory(
    entry_count: u64,
    directory_len: u64,
    directory_offset: u64,
) -> BytesMut {
    let zip64 = entry_count >= u64::from(U16_MARKER)
        || directory_len >= u64::from(U32_MARKER)
        || directory_offset >= u64::from(U32_MARKER);

    let mut buf = BytesMut::with_capacity(
        END_OF_CENTRAL_DIRECTORY_LEN + ZIP64_END_OF_CENTRAL_DIRECTORY_LEN + ZIP64_LOCATOR_LEN,
    );

    if zip64 {
        let zip64_record_offset = directory_offset + directory_len;

        buf.put_u32_le(ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE);
        buf.put_u64_le((ZIP64_END_OF_CENTRAL_DIRECTORY_LEN - 12) as u64);
        buf.put_u16_le(VERSION_ZIP64);
        buf.put_u16_le(VERSION_ZIP64);
        buf.put_u32_le(0); // this disk
        buf.put_u32_le(0); // disk with central directory
        buf.put_u64_le(entry_count);
        buf.put_u64_le(entry_count);
        buf.put_u64_le(directory_len);
        buf.put_u64_le(directory_offset);

        buf.put_u32_le(ZIP64_LOCATOR_SIGNATURE);
        buf.put_u32_le(0);
        buf.put_u64_le(zip64_record_offset);
        buf.put_u32_le(1); // total disks
    }

    let classic_count = u16::try_from(entry_count).unwrap_or(U16_MARKER);
    buf.put_u32_le(END_OF_CENTRAL_DIRECTORY_SIGNATURE);
    buf.put_u16_le(0);
    buf.put_u16_le(0);
    buf.put_u16_le(classic_count);
    buf.put_u16_le(classic_count);
    buf.put_u32_le(clamp_u32(directory_len));
    buf.put_u32_le(clamp_u32(directory_offset));
    buf.put_u16_le(0); // comment length

    buf
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(U32_MARKER)
}
