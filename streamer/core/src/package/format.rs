//! SPAK wire format.
//!
//! ```text
//! header (16 bytes)
//!   magic "SPAK" | version u16 | reserved u16 | entry_count u32 | table_len u32
//! table (table_len bytes), per entry
//!   name_len u16 | name (UTF-8) | kind u8 | offset u64 | length u64 | crc32 u32
//! data section
//!   starts at 16 + table_len; entry offsets are relative to it
//! ```
//!
//! All integers are little-endian.

use std::collections::HashSet;
use std::fmt;

use super::DecodeError;

/// File magic
pub const MAGIC: [u8; 4] = *b"SPAK";

/// Current format version
pub const VERSION: u16 = 1;

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 16;

/// Largest entry table accepted
pub const MAX_TABLE_LEN: u32 = 1024 * 1024;

/// Most entries accepted in one package
pub const MAX_ENTRIES: u32 = 4096;

/// Fixed bytes per table entry, excluding the name
const ENTRY_FIXED_LEN: usize = 2 + 1 + 8 + 8 + 4;

/// What an asset's payload holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Opaque bytes
    Binary,
    /// An encoded image
    Texture,
}

impl AssetKind {
    /// Parse a kind tag
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Binary),
            1 => Some(Self::Texture),
            _ => None,
        }
    }

    /// Wire tag
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::Binary => 0,
            Self::Texture => 1,
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Binary => "binary",
            Self::Texture => "texture",
        })
    }
}

/// Fixed package header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Number of table entries
    pub entry_count: u32,
    /// Table size in bytes
    pub table_len: u32,
}

impl Header {
    /// Parse and validate a header
    ///
    /// # Errors
    ///
    /// Bad magic, unknown version, an oversized table, or too many (or zero)
    /// entries.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = TableReader::new(bytes);
        let magic = reader.take(4)?;
        if magic != MAGIC {
            let mut found = [0u8; 4];
            found.copy_from_slice(magic);
            return Err(DecodeError::BadMagic(found));
        }

        let version = reader.u16()?;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let _reserved = reader.u16()?;
        let entry_count = reader.u32()?;
        let table_len = reader.u32()?;

        if entry_count == 0 {
            return Err(DecodeError::Empty);
        }
        if entry_count > MAX_ENTRIES {
            return Err(DecodeError::TooManyEntries(entry_count));
        }
        if table_len > MAX_TABLE_LEN {
            return Err(DecodeError::TableTooLarge(table_len));
        }

        Ok(Self {
            entry_count,
            table_len,
        })
    }

    /// Encode to wire bytes
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&VERSION.to_le_bytes());
        out[8..12].copy_from_slice(&self.entry_count.to_le_bytes());
        out[12..16].copy_from_slice(&self.table_len.to_le_bytes());
        out
    }

    /// Absolute offset of the data section
    #[must_use]
    pub fn data_start(&self) -> u64 {
        HEADER_LEN as u64 + u64::from(self.table_len)
    }
}

/// One asset in the entry table
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    /// Asset name, unique within the package
    pub name: String,
    /// Payload kind
    pub kind: AssetKind,
    /// Offset from the start of the data section
    pub offset: u64,
    /// Payload size in bytes
    pub length: u64,
    /// CRC32 of the payload
    pub crc32: u32,
}

impl Entry {
    /// Size of this entry in the table
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        ENTRY_FIXED_LEN + self.name.len()
    }

    /// Append the table encoding of this entry
    ///
    /// Names longer than `u16::MAX` bytes are the caller's responsibility to
    /// reject; the builder does so.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let name_len = u16::try_from(self.name.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&self.name.as_bytes()[..usize::from(name_len)]);
        out.push(self.kind.tag());
        out.extend_from_slice(&self.offset.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
    }
}

/// Parse the entry table
///
/// `data_len` is the size of the data section; every entry must lie inside
/// it. Names must be non-empty, valid UTF-8, and unique.
///
/// # Errors
///
/// The first malformed entry found.
pub fn parse_table(
    table: &[u8],
    entry_count: u32,
    data_len: u64,
) -> Result<Vec<Entry>, DecodeError> {
    let mut reader = TableReader::new(table);
    let mut entries = Vec::with_capacity(entry_count as usize);
    let mut seen = HashSet::with_capacity(entry_count as usize);

    for index in 0..entry_count as usize {
        let name_len = usize::from(reader.u16()?);
        let name = std::str::from_utf8(reader.take(name_len)?)
            .map_err(|_| DecodeError::InvalidName {
                index,
                reason: "not valid UTF-8",
            })?
            .to_string();
        if name.is_empty() {
            return Err(DecodeError::InvalidName {
                index,
                reason: "empty",
            });
        }

        let tag = reader.u8()?;
        let kind = AssetKind::from_tag(tag).ok_or_else(|| {
            DecodeError::MalformedTable(format!("entry {index} has unknown kind {tag}"))
        })?;
        let offset = reader.u64()?;
        let length = reader.u64()?;
        let crc32 = reader.u32()?;

        let in_bounds = offset.checked_add(length).is_some_and(|end| end <= data_len);
        if !in_bounds {
            return Err(DecodeError::EntryOutOfBounds {
                name,
                offset,
                length,
                data_len,
            });
        }
        if !seen.insert(name.clone()) {
            return Err(DecodeError::DuplicateName(name));
        }

        entries.push(Entry {
            name,
            kind,
            offset,
            length,
            crc32,
        });
    }

    if reader.remaining() != 0 {
        return Err(DecodeError::TableLengthMismatch {
            declared: table.len(),
            parsed: table.len() - reader.remaining(),
        });
    }

    Ok(entries)
}

/// Little-endian cursor over a table buffer
struct TableReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> TableReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::MalformedTable(format!(
                "needed {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }
}
