use crate::backend::{Bitmap, RenderBackend, RenderError};
use pixelcraft_common::Rect;

/// Handle to a texture held by [`RecordingBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedTexture {
    pub id: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordedDraw {
    pub texture: RecordedTexture,
    pub dst: Rect,
}

/// Backend that keeps textures in memory and records draw calls.
///
/// Stands in for the GPU in tests and in the CLI's frame dry run.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    textures: Vec<RecordedTexture>,
    labels: Vec<String>,
    pixels: Vec<Bitmap>,
    frame: Vec<RecordedDraw>,
    presented: Vec<RecordedDraw>,
    presents: usize,
    fail_textures: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create_texture` call fail.
    pub fn set_fail_textures(&mut self, fail: bool) {
        self.fail_textures = fail;
    }

    pub fn textures(&self) -> &[RecordedTexture] {
        &self.textures
    }

    pub fn textures_created(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_label(&self, texture: &RecordedTexture) -> Option<&str> {
        self.labels.get(texture.id).map(String::as_str)
    }

    pub fn texture_pixels(&self, texture: &RecordedTexture) -> Option<&Bitmap> {
        self.pixels.get(texture.id)
    }

    /// Draws issued since the last clear or present.
    pub fn pending_draws(&self) -> &[RecordedDraw] {
        &self.frame
    }

    /// Draws of the most recently presented frame.
    pub fn last_presented(&self) -> &[RecordedDraw] {
        &self.presented
    }

    pub fn presents(&self) -> usize {
        self.presents
    }

    /// Human-readable listing of the last presented frame.
    pub fn describe_frame(&self) -> String {
        let mut out = format!(
            "=== Frame {} ({} draws, {} textures) ===\n",
            self.presents,
            self.presented.len(),
            self.textures.len()
        );
        for draw in &self.presented {
            let label = self.texture_label(&draw.texture).unwrap_or("?");
            out.push_str(&format!(
                "  #{:<3} {:>7.1},{:>7.1} {:>5.1}x{:<5.1} {}\n",
                draw.texture.id, draw.dst.x, draw.dst.y, draw.dst.w, draw.dst.h, label
            ));
        }
        out
    }
}

impl RenderBackend for RecordingBackend {
    type Texture = RecordedTexture;

    fn create_texture(&mut self, label: &str, image: &Bitmap) -> Result<RecordedTexture, RenderError> {
        if self.fail_textures {
            return Err(RenderError::Texture(
                format!("texture creation disabled ({label})").into(),
            ));
        }
        let texture = RecordedTexture {
            id: self.textures.len(),
            width: image.width,
            height: image.height,
        };
        self.textures.push(texture);
        self.labels.push(label.to_owned());
        self.pixels.push(image.clone());
        Ok(texture)
    }

    fn clear(&mut self) {
        self.frame.clear();
    }

    fn draw(&mut self, texture: &RecordedTexture, dst: Rect) {
        self.frame.push(RecordedDraw {
            texture: *texture,
            dst,
        });
    }

    fn present(&mut self) -> Result<(), RenderError> {
        self.presented = std::mem::take(&mut self.frame);
        self.presents += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_textures_and_draws() {
        let mut backend = RecordingBackend::new();
        let texture = backend.create_texture("dot", &Bitmap::new(2, 3)).unwrap();
        assert_eq!((texture.width, texture.height), (2, 3));

        backend.draw(&texture, Rect::new(1.0, 2.0, 2.0, 3.0));
        assert_eq!(backend.pending_draws().len(), 1);
        backend.present().unwrap();

        assert!(backend.pending_draws().is_empty());
        assert_eq!(backend.last_presented()[0].dst, Rect::new(1.0, 2.0, 2.0, 3.0));
        let listing = backend.describe_frame();
        assert!(listing.contains("Frame 1 (1 draws, 1 textures)"));
        assert!(listing.contains("dot"));
    }

    #[test]
    fn clear_drops_pending_draws() {
        let mut backend = RecordingBackend::new();
        let texture = backend.create_texture("dot", &Bitmap::new(1, 1)).unwrap();
        backend.draw(&texture, Rect::new(0.0, 0.0, 1.0, 1.0));
        backend.clear();
        backend.present().unwrap();
        assert!(backend.last_presented().is_empty());
    }

    #[test]
    fn failing_mode_returns_texture_error() {
        let mut backend = RecordingBackend::new();
        backend.set_fail_textures(true);
        let err = backend.create_texture("dot", &Bitmap::new(1, 1)).unwrap_err();
        assert!(matches!(err, RenderError::Texture(_)));
        assert_eq!(backend.textures_created(), 0);
    }
}
