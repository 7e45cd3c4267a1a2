//! Decoded Resources
//!
//! A [`DecodedResource`] is what one slot cycle produces: the visual asset
//! extracted from a package, plus the package itself so both can be released
//! together. The texture is shared with the display surface through a
//! [`TextureHandle`]; the resource itself stays owned by the slot that
//! decoded it, which is the only party allowed to release it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::package::ResourcePackage;

/// Unique identifier of a decoded resource
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Create a new unique resource ID
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res-{}", self.0)
    }
}

/// An RGBA8 image materialized from a package
///
/// Pixel storage is dropped when the owning resource is released; afterwards
/// the texture keeps its metadata but every pixel accessor returns `None`.
pub struct Texture {
    id: ResourceId,
    name: String,
    width: u32,
    height: u32,
    pixels: RwLock<Option<Vec<u8>>>,
}

/// Shared handle to a texture
pub type TextureHandle = Arc<Texture>;

impl Texture {
    /// Create a texture from tightly packed RGBA8 pixels
    #[must_use]
    pub fn new(name: impl Into<String>, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            id: ResourceId::new(),
            name: name.into(),
            width,
            height,
            pixels: RwLock::new(Some(pixels)),
        }
    }

    /// Resource identifier
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Asset name inside its package
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Width in pixels
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the pixel storage has been released
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.pixels.read().is_none()
    }

    /// Bytes of pixel storage currently held
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixels.read().as_ref().map_or(0, Vec::len)
    }

    /// RGBA value at `(x, y)`, or `None` if out of bounds or released
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let pixels = self.pixels.read();
        let px = pixels.as_ref()?.get(index..index + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Run `f` over the raw pixels, unless released
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        self.pixels.read().as_deref().map(f)
    }

    /// Drop pixel storage, returning how many bytes were freed
    fn release(&self) -> usize {
        self.pixels.write().take().map_or(0, |p| p.len())
    }
}

impl fmt::Debug for Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("released", &self.is_released())
            .finish()
    }
}

/// What a release freed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReleaseReport {
    /// The released resource
    pub resource: ResourceId,
    /// Pixel bytes dropped
    pub pixel_bytes: usize,
    /// Package bytes unloaded
    pub package_bytes: u64,
}

/// A decoded visual resource and the package it came from
///
/// Must be released explicitly with [`release`](Self::release); consuming
/// `self` makes use-after-release a compile error for the owner, and other
/// holders of the texture handle observe the release through
/// [`Texture::is_released`].
#[derive(Debug)]
pub struct DecodedResource {
    package: ResourcePackage,
    texture: TextureHandle,
}

impl DecodedResource {
    /// Pair a texture with the package it was loaded from
    #[must_use]
    pub fn new(package: ResourcePackage, texture: TextureHandle) -> Self {
        Self { package, texture }
    }

    /// Resource identifier (the texture's)
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.texture.id()
    }

    /// Shared handle to the texture, for publishing
    #[must_use]
    pub fn texture(&self) -> TextureHandle {
        Arc::clone(&self.texture)
    }

    /// The backing package
    #[must_use]
    pub fn package(&self) -> &ResourcePackage {
        &self.package
    }

    /// Free the texture pixels and unload the package
    pub fn release(self) -> ReleaseReport {
        let resource = self.texture.id();
        let pixel_bytes = self.texture.release();
        let package_bytes = self.package.unload();
        ReleaseReport {
            resource,
            pixel_bytes,
            package_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids_are_unique() {
        let a = ResourceId::new();
        let b = ResourceId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("res-"));
    }

    #[test]
    fn test_texture_pixel_access() {
        let pixels: Vec<u8> = vec![
            1, 2, 3, 255, 4, 5, 6, 255, //
            7, 8, 9, 255, 10, 11, 12, 255,
        ];
        let texture = Texture::new("quad", 2, 2, pixels);

        assert_eq!(texture.pixel(0, 0), Some([1, 2, 3, 255]));
        assert_eq!(texture.pixel(1, 1), Some([10, 11, 12, 255]));
        assert_eq!(texture.pixel(2, 0), None);
        assert_eq!(texture.byte_len(), 16);
        assert_eq!(texture.with_pixels(<[u8]>::len), Some(16));
        assert!(!texture.is_released());
    }

    #[test]
    fn test_released_texture_has_no_pixels() {
        let texture = Texture::new("solid", 1, 1, vec![0, 0, 0, 255]);
        assert_eq!(texture.release(), 4);
        assert!(texture.is_released());
        assert_eq!(texture.pixel(0, 0), None);
        assert_eq!(texture.byte_len(), 0);
        assert_eq!(texture.release(), 0);
    }
}
