use pixelcraft_common::Rect;

/// Errors surfaced by the renderer and its backends.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("sprite sheet error: {0}")]
    Sheet(#[from] crate::sheet::SheetError),
    #[error("font error: {0}")]
    Text(#[from] crate::text_cache::TextError),
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("texture creation failed: {0}")]
    Texture(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("frame presentation failed: {0}")]
    Present(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Tightly packed RGBA8 pixels, row-major, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[i],
            self.pixels[i + 1],
            self.pixels[i + 2],
            self.pixels[i + 3],
        ]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[i..i + 4].copy_from_slice(&rgba);
    }
}

/// GPU-side half of the renderer.
///
/// The renderer owns all caching and placement; a backend only turns
/// bitmaps into textures and draws textures into logical-viewport
/// rectangles. Textures are cheap handles cloned into each frame's draw list.
pub trait RenderBackend {
    type Texture: Clone;

    /// Create a sampled texture from `image`.
    fn create_texture(&mut self, label: &str, image: &Bitmap)
    -> Result<Self::Texture, RenderError>;

    /// Start a new frame, discarding anything drawn since the last present.
    fn clear(&mut self);

    /// Draw `texture` stretched over `dst`, in logical viewport pixels.
    fn draw(&mut self, texture: &Self::Texture, dst: Rect);

    /// Show everything drawn since the last clear.
    fn present(&mut self) -> Result<(), RenderError>;
}
