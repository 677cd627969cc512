use crate::backend::{RenderBackend, RenderError};
use crate::compositor::Compositor;
use crate::config::RendererConfig;
use crate::sheet::SpriteSheet;
use crate::sprite::SpriteKey;
use crate::sprite_cache::SpriteCache;
use crate::text_cache::{FontSource, TextCache, TtfFontSource};
use glam::Vec2;
use pixelcraft_common::Rect;

/// Sizes of the renderer's caches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub surfaces: usize,
    pub sprite_textures: usize,
    pub fonts: usize,
    pub text_textures: usize,
    /// Draw keys (sprite descriptors, text tuples, font sizes) skipped because
    /// their creation failed.
    pub failed: usize,
}

/// Draw API for one window: sprite and text caches, camera, frame queue.
///
/// Everything is created lazily on first use and kept until
/// [`Renderer::release_caches`] or drop.
pub struct Renderer<B: RenderBackend, F: FontSource> {
    sprites: SpriteCache<B::Texture>,
    text: TextCache<F, B::Texture>,
    compositor: Compositor<B::Texture>,
    sheet: SpriteSheet,
    config: RendererConfig,
    backend: B,
}

impl<B: RenderBackend> Renderer<B, TtfFontSource> {
    /// Read the sprite sheet and font named by `config`.
    pub fn load(backend: B, config: RendererConfig) -> Result<Self, RenderError> {
        config.validate()?;
        let sheet = SpriteSheet::load(&config.sprite_sheet)?;
        let fonts = TtfFontSource::load(&config.font)?;
        Ok(Self::new(backend, config, sheet, fonts))
    }
}

impl<B: RenderBackend, F: FontSource> Renderer<B, F> {
    pub fn new(backend: B, config: RendererConfig, sheet: SpriteSheet, fonts: F) -> Self {
        tracing::info!(
            "renderer ready: {}x{} viewport, {}x{} sheet, text oversampling {}",
            config.viewport.width,
            config.viewport.height,
            sheet.width(),
            sheet.height(),
            config.font_oversampling
        );
        Self {
            sprites: SpriteCache::new(),
            text: TextCache::new(fonts, config.font_oversampling),
            compositor: Compositor::new(config.viewport),
            sheet,
            config,
            backend,
        }
    }

    /// Queue `sprite` centered at world position `(x, y)`.
    pub fn draw_sprite(&mut self, sprite: SpriteKey, x: f32, y: f32) {
        let Some(texture) = self.sprites.texture(&mut self.backend, &self.sheet, sprite) else {
            return;
        };
        let size = sprite.size();
        let half = (size / 2) as f32;
        let world = Rect::new(x - half, y - half, size as f32, size as f32);
        self.compositor.queue(texture, world);
    }

    /// Queue `text` centered at world position `(x, y)`.
    ///
    /// `color` uses the packed digit encoding; `size` is the logical pixel
    /// height before oversampling.
    pub fn draw_text(&mut self, text: &str, x: f32, y: f32, color: u16, size: u32) {
        let Some((texture, extent)) = self.text.texture(&mut self.backend, text, color, size)
        else {
            return;
        };
        let world = Rect::centered(Vec2::new(x, y), extent.x, extent.y);
        self.compositor.queue(texture, world);
    }

    /// Center the camera on `(x, y)`. The sprite only identifies the anchor.
    pub fn set_camera_anchor(&mut self, sprite: SpriteKey, x: f32, y: f32) {
        tracing::trace!("camera anchored on {sprite} at ({x}, {y})");
        self.compositor.anchor_on(Vec2::new(x, y));
    }

    pub fn camera(&self) -> Vec2 {
        self.compositor.camera()
    }

    /// Discard this frame's draws and start over.
    pub fn clear(&mut self) {
        self.compositor.clear();
        self.backend.clear();
    }

    /// Resolve the queued draws against the current camera and show them.
    pub fn present(&mut self) -> Result<(), RenderError> {
        for (texture, dst) in self.compositor.drain() {
            self.backend.draw(&texture, dst);
        }
        self.backend.present()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            surfaces: self.sprites.surface_count(),
            sprite_textures: self.sprites.texture_count(),
            fonts: self.text.font_count(),
            text_textures: self.text.texture_count(),
            failed: self.sprites.failed_count() + self.text.failed_count(),
        }
    }

    /// Drop every cached surface, texture and font.
    pub fn release_caches(&mut self) {
        let stats = self.stats();
        self.compositor.clear();
        self.sprites.clear();
        self.text.clear();
        tracing::info!(
            "released {} surfaces, {} sprite textures, {} fonts, {} text textures",
            stats.surfaces,
            stats.sprite_textures,
            stats.fonts,
            stats.text_textures
        );
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn sheet(&self) -> &SpriteSheet {
        &self.sheet
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: RenderBackend, F: FontSource> Drop for Renderer<B, F> {
    fn drop(&mut self) {
        self.release_caches();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Bitmap;
    use crate::recording::RecordingBackend;
    use crate::text_cache::TextError;
    use pixelcraft_common::Rgba;

    /// Every glyph is a 4x8 block at 4x oversampling.
    struct FixedFont;

    impl FontSource for FixedFont {
        type Font = ();

        fn open(&self, _px: u32) -> Result<(), TextError> {
            Ok(())
        }

        fn rasterize(&self, _font: &(), text: &str, _color: Rgba) -> Result<Bitmap, TextError> {
            if text.is_empty() {
                return Err(TextError::EmptyText);
            }
            Ok(Bitmap::new(text.chars().count() as u32 * 16, 32))
        }
    }

    fn renderer() -> Renderer<RecordingBackend, FixedFont> {
        let sheet = SpriteSheet::from_indices(64, 64, vec![1; 64 * 64]).unwrap();
        Renderer::new(
            RecordingBackend::new(),
            RendererConfig::default(),
            sheet,
            FixedFont,
        )
    }

    fn player() -> SpriteKey {
        SpriteKey::new([0, 555, 0, 0], 0, 0, 16)
    }

    #[test]
    fn anchored_sprite_lands_in_view_center() {
        let mut r = renderer();
        r.set_camera_anchor(player(), 100.0, 80.0);
        assert_eq!(r.camera(), Vec2::new(-28.0, 8.0));

        r.draw_sprite(player(), 100.0, 80.0);
        r.present().unwrap();

        let frame = r.backend().last_presented();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame[0].dst, Rect::new(120.0, 64.0, 16.0, 16.0));
    }

    #[test]
    fn draws_before_anchor_use_the_frame_camera() {
        let mut r = renderer();
        r.draw_sprite(player(), 100.0, 80.0);
        r.set_camera_anchor(player(), 100.0, 80.0);
        r.present().unwrap();

        assert_eq!(
            r.backend().last_presented()[0].dst,
            Rect::new(120.0, 64.0, 16.0, 16.0)
        );
    }

    #[test]
    fn odd_sprite_uses_integer_half_size() {
        let mut r = renderer();
        let key = SpriteKey::new([555, 0, 0, 0], 0, 0, 5);
        r.draw_sprite(key, 10.0, 10.0);
        r.present().unwrap();

        assert_eq!(
            r.backend().last_presented()[0].dst,
            Rect::new(8.0, 8.0, 5.0, 5.0)
        );
    }

    #[test]
    fn repeated_draws_reuse_cached_texture() {
        let mut r = renderer();
        for _ in 0..3 {
            r.clear();
            r.draw_sprite(player(), 0.0, 0.0);
            r.draw_text("HP", 0.0, 0.0, 555, 8);
            r.present().unwrap();
        }

        assert_eq!(r.backend().textures_created(), 2);
        assert_eq!(r.backend().presents(), 3);
        let stats = r.stats();
        assert_eq!(stats.surfaces, 1);
        assert_eq!(stats.sprite_textures, 1);
        assert_eq!(stats.fonts, 1);
        assert_eq!(stats.text_textures, 1);
    }

    #[test]
    fn text_is_centered_at_logical_size() {
        let mut r = renderer();
        r.draw_text("abc", 50.0, 20.0, 555, 8);
        r.present().unwrap();

        // 48x32 texture at 4x oversampling is drawn as 12x8.
        assert_eq!(
            r.backend().last_presented()[0].dst,
            Rect::new(44.0, 16.0, 12.0, 8.0)
        );
    }

    #[test]
    fn failed_draws_are_skipped_and_frame_continues() {
        let mut r = renderer();
        r.draw_text("", 0.0, 0.0, 555, 8);
        r.draw_sprite(SpriteKey::new([555, 0, 0, 0], 200, 0, 4), 0.0, 0.0);
        r.draw_sprite(player(), 0.0, 0.0);
        r.present().unwrap();

        // One skipped text and one skipped sprite.
        assert_eq!(r.backend().last_presented().len(), 1);
        assert_eq!(r.stats().failed, 2);
    }

    #[test]
    fn failures_are_not_retried_next_frame() {
        let mut r = renderer();
        r.backend_mut().set_fail_textures(true);
        r.draw_sprite(player(), 0.0, 0.0);
        r.present().unwrap();

        r.backend_mut().set_fail_textures(false);
        r.draw_sprite(player(), 0.0, 0.0);
        r.present().unwrap();

        assert!(r.backend().last_presented().is_empty());
        assert_eq!(r.backend().textures_created(), 0);
    }

    #[test]
    fn clear_drops_queued_draws() {
        let mut r = renderer();
        r.draw_sprite(player(), 0.0, 0.0);
        r.clear();
        r.present().unwrap();
        assert!(r.backend().last_presented().is_empty());
    }

    #[test]
    fn release_caches_empties_everything() {
        let mut r = renderer();
        r.draw_sprite(player(), 0.0, 0.0);
        r.draw_text("x", 0.0, 0.0, 5, 4);
        r.release_caches();
        assert_eq!(r.stats(), CacheStats::default());
    }

    #[test]
    fn load_reports_missing_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let config = RendererConfig::default().with_asset_root(dir.path());
        let err = Renderer::load(RecordingBackend::new(), config).err().unwrap();
        assert!(matches!(err, RenderError::Sheet(_)));
    }
}
