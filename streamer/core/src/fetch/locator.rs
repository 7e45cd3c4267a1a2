//! Package URI construction.

use std::path::{Path, PathBuf};

use crate::config::PoolConfig;
use crate::slot::SlotId;

/// Builds the fetch URI for each slot: `{base}/{index:0width$}.{extension}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLocator {
    base: String,
    id_width: usize,
    extension: String,
}

impl ResourceLocator {
    /// Create a locator; `base` is normalized with [`normalize_base`]
    pub fn new(base: &str, id_width: usize, extension: impl Into<String>) -> Self {
        Self {
            base: normalize_base(base),
            id_width,
            extension: extension.into(),
        }
    }

    /// Create from the pool configuration
    #[must_use]
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(&config.base_uri, config.id_width, config.extension.clone())
    }

    /// Normalized base URI
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resource id for a slot, e.g. `07.bundle`
    #[must_use]
    pub fn resource_id(&self, slot: SlotId) -> String {
        format!(
            "{:0width$}.{}",
            slot.index(),
            self.extension,
            width = self.id_width
        )
    }

    /// Full URI for a slot's package
    #[must_use]
    pub fn uri_for(&self, slot: SlotId) -> String {
        format!("{}/{}", self.base, self.resource_id(slot))
    }

    /// Local file backing a slot's package, if the base is a `file://` URI
    #[must_use]
    pub fn local_path(&self, slot: SlotId) -> Option<PathBuf> {
        file_uri_to_path(&self.uri_for(slot))
    }
}

/// Turn a base location into a URI
///
/// Anything already carrying a scheme is kept (minus trailing slashes). A
/// plain filesystem path becomes an absolute `file://` URI.
#[must_use]
pub fn normalize_base(base: &str) -> String {
    if let Some((scheme, rest)) = base.split_once("://") {
        return format!("{scheme}://{}", rest.trim_end_matches('/'));
    }

    let trimmed = base.trim_end_matches('/');

    let path = if trimmed.is_empty() && base.starts_with('/') {
        Path::new("/")
    } else {
        Path::new(trimmed)
    };
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    format!("file://{}", absolute.display().to_string().trim_end_matches('/'))
}

/// Local path of a `file://` URI (no percent-decoding)
#[must_use]
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some(PathBuf::from(rest))
}
