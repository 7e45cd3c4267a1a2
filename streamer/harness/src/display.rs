//! Display observer: logs every change of the shared surface.

use std::sync::Arc;

use tracing::{debug, info};

use streamer_core::{DisplaySurface, Texture};

/// One-line summary of a texture for logs
pub fn describe(texture: &Texture) -> String {
    let first = match texture.pixel(0, 0) {
        Some([r, g, b, a]) => format!("#{r:02x}{g:02x}{b:02x}{a:02x}"),
        None => "released".to_string(),
    };
    format!(
        "{} {}x{} first pixel {first}",
        texture.name(),
        texture.width(),
        texture.height()
    )
}

/// Log surface changes until the surface goes away
pub async fn observe(surface: Arc<DisplaySurface>) {
    let mut changes = surface.subscribe();
    while changes.changed().await.is_ok() {
        let shown = changes.borrow_and_update().clone();
        match shown {
            Some(texture) => {
                info!(resource = %texture.id(), "Displaying {}", describe(&texture));
            }
            None => debug!("Display cleared"),
        }
    }
}
