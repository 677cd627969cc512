//! Font and text-texture caches.
//!
//! Text is rasterized at `size * oversampling` pixels and drawn back at
//! `texture / oversampling`, so glyphs stay sharp when the logical viewport is
//! scaled up to the window.

use crate::backend::{Bitmap, RenderBackend, RenderError};
use crate::color;
use crate::glyph;
use glam::Vec2;
use pixelcraft_common::Rgba;
use std::collections::HashMap;
use std::path::Path;

/// Errors from opening fonts or rasterizing text.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid font: {0}")]
    Font(String),
    #[error("cannot render empty text")]
    EmptyText,
    #[error("font has no horizontal line metrics")]
    NoLineMetrics,
}

/// Opens a font at a pixel size and rasterizes text runs with it.
pub trait FontSource {
    type Font;

    fn open(&self, px: u32) -> Result<Self::Font, TextError>;

    fn rasterize(&self, font: &Self::Font, text: &str, color: Rgba) -> Result<Bitmap, TextError>;
}

/// TrueType font whose bytes are read once and opened per pixel size.
pub struct TtfFontSource {
    bytes: Vec<u8>,
}

/// A `fontdue` font opened for one pixel size.
pub struct SizedFont {
    font: fontdue::Font,
    px: f32,
}

impl TtfFontSource {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TextError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).inspect_err(|e| {
            tracing::error!("failed to read font {}: {e}", path.display());
        })?;
        tracing::info!("loaded font {} ({} bytes)", path.display(), bytes.len());
        Ok(Self { bytes })
    }
}

impl FontSource for TtfFontSource {
    type Font = SizedFont;

    fn open(&self, px: u32) -> Result<SizedFont, TextError> {
        let px = px as f32;
        let settings = fontdue::FontSettings {
            scale: px,
            ..fontdue::FontSettings::default()
        };
        let font = fontdue::Font::from_bytes(self.bytes.as_slice(), settings)
            .map_err(|e| TextError::Font(e.to_string()))?;
        Ok(SizedFont { font, px })
    }

    fn rasterize(&self, font: &SizedFont, text: &str, color: Rgba) -> Result<Bitmap, TextError> {
        glyph::rasterize_run(&font.font, font.px, text, color)
    }
}

/// A rendered text texture with its pixel dimensions.
#[derive(Debug, Clone)]
pub struct TextEntry<T> {
    pub texture: T,
    pub width: u32,
    pub height: u32,
}

/// `None` marks a creation that already failed and is not retried.
type Slot<T> = Option<T>;

pub struct TextCache<F: FontSource, T> {
    source: F,
    oversampling: u32,
    fonts: HashMap<u32, Slot<F::Font>>,
    // (color, oversampled size) -> text -> entry; lookups borrow `&str`.
    textures: HashMap<(u16, u32), HashMap<String, Slot<TextEntry<T>>>>,
}

impl<F: FontSource, T: Clone> TextCache<F, T> {
    pub fn new(source: F, oversampling: u32) -> Self {
        Self {
            source,
            oversampling: oversampling.max(1),
            fonts: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    pub fn oversampling(&self) -> u32 {
        self.oversampling
    }

    /// Find or build the texture for `(text, color, size)`.
    ///
    /// Returns the texture and its display size in logical pixels, or `None`
    /// if the font or the texture could not be created.
    pub fn texture<B>(
        &mut self,
        backend: &mut B,
        text: &str,
        color: u16,
        size: u32,
    ) -> Option<(T, Vec2)>
    where
        B: RenderBackend<Texture = T>,
    {
        let px = size.saturating_mul(self.oversampling);
        let oversampling = self.oversampling;

        let font = self
            .fonts
            .entry(px)
            .or_insert_with(|| match self.source.open(px) {
                Ok(font) => {
                    tracing::debug!("opened font at {px}px");
                    Some(font)
                }
                Err(e) => {
                    tracing::warn!("failed to open font at {px}px: {e}");
                    None
                }
            })
            .as_ref()?;

        let by_style = self.textures.entry((color, px)).or_default();
        if let Some(slot) = by_style.get(text) {
            return slot.as_ref().map(|entry| display(entry, oversampling));
        }

        let created = self
            .source
            .rasterize(font, text, color::quantize(color))
            .map_err(RenderError::from)
            .and_then(|bitmap| {
                let label = format!("text {text:?} {color:03} {px}px");
                let texture = backend.create_texture(&label, &bitmap)?;
                Ok(TextEntry {
                    texture,
                    width: bitmap.width,
                    height: bitmap.height,
                })
            });
        let slot = match created {
            Ok(entry) => {
                tracing::debug!(
                    "created text texture {text:?} ({}x{}, color {color:03}, {px}px)",
                    entry.width,
                    entry.height
                );
                Some(entry)
            }
            Err(e) => {
                tracing::warn!("skipping text {text:?} (color {color:03}, {px}px): {e}");
                None
            }
        };
        by_style
            .entry(text.to_owned())
            .or_insert(slot)
            .as_ref()
            .map(|entry| display(entry, oversampling))
    }

    pub fn font_count(&self) -> usize {
        self.fonts.values().filter(|f| f.is_some()).count()
    }

    pub fn texture_count(&self) -> usize {
        self.textures
            .values()
            .flat_map(HashMap::values)
            .filter(|t| t.is_some())
            .count()
    }

    pub fn failed_count(&self) -> usize {
        let fonts = self.fonts.values().filter(|f| f.is_none()).count();
        let textures = self
            .textures
            .values()
            .flat_map(HashMap::values)
            .filter(|t| t.is_none())
            .count();
        fonts + textures
    }

    pub fn clear(&mut self) {
        self.textures.clear();
        self.fonts.clear();
    }
}

// Integer division keeps text on whole logical pixels.
fn display<T: Clone>(entry: &TextEntry<T>, oversampling: u32) -> (T, Vec2) {
    let size = Vec2::new(
        (entry.width / oversampling) as f32,
        (entry.height / oversampling) as f32,
    );
    (entry.texture.clone(), size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;
    use std::cell::Cell;

    /// Renders each character as a `px/2` x `px` block.
    #[derive(Default)]
    struct BlockFont {
        opens: Cell<usize>,
        renders: Cell<usize>,
        broken_sizes: Vec<u32>,
    }

    impl FontSource for BlockFont {
        type Font = u32;

        fn open(&self, px: u32) -> Result<u32, TextError> {
            self.opens.set(self.opens.get() + 1);
            if self.broken_sizes.contains(&px) {
                return Err(TextError::Font(format!("no {px}px face")));
            }
            Ok(px)
        }

        fn rasterize(&self, px: &u32, text: &str, color: Rgba) -> Result<Bitmap, TextError> {
            self.renders.set(self.renders.get() + 1);
            if text.is_empty() {
                return Err(TextError::EmptyText);
            }
            let width = text.chars().count() as u32 * (px / 2);
            let mut bitmap = Bitmap::new(width, *px);
            bitmap.set_pixel(0, 0, color.to_array());
            Ok(bitmap)
        }
    }

    #[test]
    fn display_size_divides_by_oversampling() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(BlockFont::default(), 4);

        let (_, size) = cache.texture(&mut backend, "hi", 555, 8).unwrap();
        // 32px font: two 16px wide glyphs, 32px tall.
        assert_eq!(size, Vec2::new(8.0, 8.0));
        let texture = &backend.textures()[0];
        assert_eq!((texture.width, texture.height), (32, 32));
    }

    #[test]
    fn same_tuple_returns_same_texture() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(BlockFont::default(), 4);

        let (a, _) = cache.texture(&mut backend, "hello", 500, 6).unwrap();
        let (b, _) = cache.texture(&mut backend, "hello", 500, 6).unwrap();
        assert_eq!(a, b);
        assert_eq!(backend.textures_created(), 1);
        assert_eq!(cache.source.renders.get(), 1);
    }

    #[test]
    fn distinct_tuples_get_distinct_textures() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(BlockFont::default(), 4);

        let (a, _) = cache.texture(&mut backend, "hi", 500, 6).unwrap();
        let (b, _) = cache.texture(&mut backend, "hi", 50, 6).unwrap();
        let (c, _) = cache.texture(&mut backend, "hi", 500, 7).unwrap();
        let (d, _) = cache.texture(&mut backend, "ho", 500, 6).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(cache.texture_count(), 4);
    }

    #[test]
    fn one_font_per_size() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(BlockFont::default(), 4);

        cache.texture(&mut backend, "a", 500, 6);
        cache.texture(&mut backend, "b", 50, 6);
        cache.texture(&mut backend, "c", 5, 8);
        assert_eq!(cache.source.opens.get(), 2);
        assert_eq!(cache.font_count(), 2);
    }

    #[test]
    fn glyph_color_is_quantized() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(BlockFont::default(), 1);

        let (texture, _) = cache.texture(&mut backend, "x", 50, 4).unwrap();
        let pixels = backend.texture_pixels(&texture).unwrap();
        assert_eq!(pixels.pixel(0, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn empty_text_fails_once() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(BlockFont::default(), 4);

        assert!(cache.texture(&mut backend, "", 500, 6).is_none());
        assert!(cache.texture(&mut backend, "", 500, 6).is_none());
        assert_eq!(cache.source.renders.get(), 1);
        assert_eq!(cache.failed_count(), 1);
        assert_eq!(backend.textures_created(), 0);
    }

    #[test]
    fn broken_font_size_is_not_reopened() {
        let mut backend = RecordingBackend::new();
        let source = BlockFont {
            broken_sizes: vec![24],
            ..BlockFont::default()
        };
        let mut cache = TextCache::new(source, 4);

        assert!(cache.texture(&mut backend, "a", 500, 6).is_none());
        assert!(cache.texture(&mut backend, "b", 500, 6).is_none());
        assert_eq!(cache.source.opens.get(), 1);
        assert!(cache.texture(&mut backend, "a", 500, 5).is_some());
    }

    #[test]
    fn backend_failure_is_cached() {
        let mut backend = RecordingBackend::new();
        backend.set_fail_textures(true);
        let mut cache = TextCache::new(BlockFont::default(), 4);

        assert!(cache.texture(&mut backend, "hp", 500, 6).is_none());
        backend.set_fail_textures(false);
        assert!(cache.texture(&mut backend, "hp", 500, 6).is_none());
        assert_eq!(backend.textures_created(), 0);
    }

    #[test]
    fn zero_oversampling_is_treated_as_one() {
        let cache: TextCache<BlockFont, u32> = TextCache::new(BlockFont::default(), 0);
        assert_eq!(cache.oversampling(), 1);
    }

    const MONO: &[u8] = include_bytes!("../testdata/DejaVuSansMono.ttf");

    fn inked_rows(bitmap: &Bitmap) -> impl Iterator<Item = u32> + '_ {
        (0..bitmap.height).filter(move |&y| (0..bitmap.width).any(|x| bitmap.pixel(x, y)[3] > 0))
    }

    #[test]
    fn ttf_run_is_one_line_tall_in_the_quantized_color() {
        let source = TtfFontSource::from_bytes(MONO.to_vec());
        let font = source.open(32).unwrap();
        let line = font.font.horizontal_line_metrics(32.0).unwrap();
        let color = color::quantize(505);

        let bitmap = source.rasterize(&font, "HP 10", color).unwrap();
        let line_height = (line.ascent.ceil() - line.descent.floor()) as u32;
        assert_eq!(bitmap.height, line_height);

        let advance = font.font.metrics('H', 32.0).advance_width;
        assert!(bitmap.width as f32 >= (advance * 5.0).floor());

        let inked: Vec<[u8; 4]> = (0..bitmap.height)
            .flat_map(|y| (0..bitmap.width).map(move |x| (x, y)))
            .map(|(x, y)| bitmap.pixel(x, y))
            .filter(|p| p[3] > 0)
            .collect();
        assert!(!inked.is_empty());
        assert!(inked.iter().all(|p| p[..3] == [255, 0, 255]));
    }

    #[test]
    fn ttf_descenders_sit_below_the_baseline() {
        let source = TtfFontSource::from_bytes(MONO.to_vec());
        let font = source.open(32).unwrap();
        let ascent = font.font.horizontal_line_metrics(32.0).unwrap().ascent.ceil() as u32;

        let cap = source.rasterize(&font, "H", Rgba::opaque(255, 255, 255)).unwrap();
        let desc = source.rasterize(&font, "p", Rgba::opaque(255, 255, 255)).unwrap();
        let cap_bottom = inked_rows(&cap).max().unwrap();
        let desc_bottom = inked_rows(&desc).max().unwrap();
        assert!(cap_bottom <= ascent);
        assert!(desc_bottom > ascent);
    }

    #[test]
    fn ttf_rejects_empty_text() {
        let source = TtfFontSource::from_bytes(MONO.to_vec());
        let font = source.open(16).unwrap();
        assert!(matches!(
            source.rasterize(&font, "", Rgba::opaque(255, 255, 255)),
            Err(TextError::EmptyText)
        ));
    }

    #[test]
    fn ttf_text_through_the_cache() {
        let mut backend = RecordingBackend::new();
        let mut cache = TextCache::new(TtfFontSource::from_bytes(MONO.to_vec()), 4);

        let (texture, size) = cache.texture(&mut backend, "HP 10", 555, 8).unwrap();
        assert_eq!(size.x, (texture.width / 4) as f32);
        assert_eq!(size.y, (texture.height / 4) as f32);
        let pixels = backend.texture_pixels(&texture).unwrap();
        assert!(pixels.pixels.chunks_exact(4).any(|p| p[3] > 0));

        assert!(cache.texture(&mut backend, " ", 555, 8).is_some());
        assert!(cache.texture(&mut backend, "", 555, 8).is_none());
        assert_eq!(cache.font_count(), 1);
    }

    #[test]
    fn invalid_font_bytes_fail_to_open() {
        let source = TtfFontSource::from_bytes(b"not a font".to_vec());
        assert!(matches!(source.open(16), Err(TextError::Font(_))));
    }
}
