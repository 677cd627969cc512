//! Renderer-agnostic sprite and text compositing.
//!
//! # Invariants
//! - At most one surface per sheet region and one texture per full sprite
//!   descriptor; at most one font per oversampled size and one texture per
//!   `(text, color, size)`.
//! - Nothing is evicted while the renderer lives. A failed creation is
//!   remembered and the draw is skipped from then on.
//! - All draws of a frame are placed with the camera current at present time.
//!
//! GPU work is hidden behind [`RenderBackend`]; [`RecordingBackend`] keeps
//! everything in memory so the caches and compositor run without a device.

mod backend;
pub mod color;
mod compositor;
mod config;
mod glyph;
mod recording;
mod renderer;
pub mod sheet;
pub mod sprite;
mod sprite_cache;
mod text_cache;

pub use backend::{Bitmap, RenderBackend, RenderError};
pub use compositor::{Compositor, QueuedDraw};
pub use config::{ConfigError, RendererConfig};
pub use recording::{RecordedDraw, RecordedTexture, RecordingBackend};
pub use renderer::{CacheStats, Renderer};
pub use sheet::{SheetError, SpriteSheet, Surface};
pub use sprite::{RegionKey, SpriteKey};
pub use sprite_cache::SpriteCache;
pub use text_cache::{FontSource, SizedFont, TextCache, TextEntry, TextError, TtfFontSource};

pub fn crate_info() -> &'static str {
    "pixelcraft-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
