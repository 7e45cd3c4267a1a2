//! Package assembly.

use std::collections::HashSet;

use super::format::{self, AssetKind, Entry, Header};
use super::BuildError;

/// Assembles a package from named assets
///
/// Assets keep their insertion order, which becomes the package order the
/// decoder sees.
///
/// # Example
///
/// ```ignore
/// let bytes = PackageBuilder::new()
///     .add_texture("texture_00.png", png_bytes)
///     .build()?;
/// ```
#[derive(Debug, Default)]
pub struct PackageBuilder {
    assets: Vec<(String, AssetKind, Vec<u8>)>,
}

impl PackageBuilder {
    /// Start an empty package
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an encoded image
    #[must_use]
    pub fn add_texture(mut self, name: impl Into<String>, encoded: Vec<u8>) -> Self {
        self.assets.push((name.into(), AssetKind::Texture, encoded));
        self
    }

    /// Add opaque bytes
    #[must_use]
    pub fn add_binary(mut self, name: impl Into<String>, data: Vec<u8>) -> Self {
        self.assets.push((name.into(), AssetKind::Binary, data));
        self
    }

    /// Number of assets added so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether no assets were added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Encode the package
    ///
    /// # Errors
    ///
    /// No assets, an empty, overlong or duplicate name, or limits exceeded.
    pub fn build(self) -> Result<Vec<u8>, BuildError> {
        if self.assets.is_empty() {
            return Err(BuildError::Empty);
        }
        if self.assets.len() > format::MAX_ENTRIES as usize {
            return Err(BuildError::TooManyEntries(self.assets.len()));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.assets.len());
        let mut offset = 0u64;
        for (name, kind, data) in &self.assets {
            if name.is_empty() {
                return Err(BuildError::EmptyName);
            }
            if name.len() > usize::from(u16::MAX) {
                return Err(BuildError::NameTooLong(name.len()));
            }
            if !seen.insert(name.as_str()) {
                return Err(BuildError::DuplicateName(name.clone()));
            }

            let length = data.len() as u64;
            entries.push(Entry {
                name: name.clone(),
                kind: *kind,
                offset,
                length,
                crc32: crc32fast::hash(data),
            });
            offset += length;
        }

        let table_len: usize = entries.iter().map(Entry::encoded_len).sum();
        let table_len_u32 = u32::try_from(table_len)
            .ok()
            .filter(|len| *len <= format::MAX_TABLE_LEN)
            .ok_or(BuildError::TableTooLarge(table_len))?;

        let header = Header {
            entry_count: entries.len() as u32,
            table_len: table_len_u32,
        };

        let data_len = usize::try_from(offset).unwrap_or(usize::MAX);
        let mut out = Vec::with_capacity(format::HEADER_LEN + table_len + data_len);
        out.extend_from_slice(&header.encode());
        for entry in &entries {
            entry.encode_into(&mut out);
        }
        for (_, _, data) in &self.assets {
            out.extend_from_slice(data);
        }
        Ok(out)
    }
}
