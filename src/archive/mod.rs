//! Streaming ZIP encoder
//!
//! Produces stored (uncompressed) archives readable by standard tools.
//! Names are made safe with [`sanitize_name`] and unique with
//! [`EntryNamer`] before they reach [`ArchiveEncoder::add_entry`].

mod encoder;
mod names;
pub mod records;

pub use encoder::{ArchiveEncoder, ArchiveSummary};
pub use names::{EntryNamer, sanitize_name};
pub use records::ArchiveEntry;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("exceeds size limit: {name} is {size} bytes, ceiling is {limit} bytes")]
    EntryTooLarge { name: String, size: u64, limit: u64 },

    #[error("Entry name is empty")]
    EmptyName,

    #[error("Entry name is {0} bytes, longer than a header can hold")]
    NameTooLong(usize),

    #[error("Duplicate entry name: {0}")]
    DuplicateName(String),

    #[error("Archive offset overflowed 64 bits")]
    OffsetOverflow,
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
