//! Display Surface
//!
//! The single shared "what is on screen right now" cell. Any slot may publish
//! to it; every slot watches it to learn when its own texture has been
//! replaced. It is created by whoever owns the pool and injected into every
//! slot, never a process-wide singleton.
//!
//! # Thread Safety
//!
//! Backed by a tokio `watch` channel: `get`/`set` are atomic with respect to
//! each other, and every subscriber is woken on each `set`, including a `set`
//! of the value already shown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::resource::TextureHandle;

/// Receiver for surface changes
pub type SurfaceReceiver = watch::Receiver<Option<TextureHandle>>;

/// Shared reference to the currently displayed texture
#[derive(Debug)]
pub struct DisplaySurface {
    current: watch::Sender<Option<TextureHandle>>,
    publishes: AtomicU64,
}

impl Default for DisplaySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface {
    /// Create an empty surface
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            publishes: AtomicU64::new(0),
        }
    }

    /// The texture currently shown
    #[must_use]
    pub fn get(&self) -> Option<TextureHandle> {
        self.current.borrow().clone()
    }

    /// Show `texture`, returning what it replaced
    pub fn set(&self, texture: TextureHandle) -> Option<TextureHandle> {
        self.publishes.fetch_add(1, Ordering::Relaxed);
        self.current.send_replace(Some(texture))
    }

    /// Show nothing, returning what was shown
    pub fn clear(&self) -> Option<TextureHandle> {
        self.current.send_replace(None)
    }

    /// Whether `texture` (by identity) is the one shown
    #[must_use]
    pub fn shows(&self, texture: &TextureHandle) -> bool {
        self.current
            .borrow()
            .as_ref()
            .is_some_and(|shown| Arc::ptr_eq(shown, texture))
    }

    /// Subscribe to changes; the current value counts as already seen
    #[must_use]
    pub fn subscribe(&self) -> SurfaceReceiver {
        self.current.subscribe()
    }

    /// Total number of `set` calls so far
    #[must_use]
    pub fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Texture;

    fn texture(name: &str) -> TextureHandle {
        Arc::new(Texture::new(name, 1, 1, vec![0, 0, 0, 255]))
    }

    #[test]
    fn test_set_replaces_and_returns_previous() {
        let surface = DisplaySurface::new();
        assert!(surface.get().is_none());

        let a = texture("a");
        let b = texture("b");
        assert!(surface.set(a.clone()).is_none());
        assert!(surface.shows(&a));

        let previous = surface.set(b.clone()).unwrap();
        assert!(Arc::ptr_eq(&previous, &a));
        assert!(surface.shows(&b));
        assert!(!surface.shows(&a));
        assert_eq!(surface.publish_count(), 2);

        assert!(surface.clear().is_some());
        assert!(surface.get().is_none());
    }

    #[test]
    fn test_identity_not_equality() {
        let surface = DisplaySurface::new();
        let a = texture("same");
        let twin = texture("same");
        surface.set(a);
        assert!(!surface.shows(&twin));
    }

    #[tokio::test]
    async fn test_subscribers_are_woken_on_set() {
        let surface = DisplaySurface::new();
        let mut rx = surface.subscribe();

        let a = texture("a");
        surface.set(a.clone());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().as_ref().is_some_and(|t| Arc::ptr_eq(t, &a)));
    }
}
