use pixelcraft_common::{Rgba, Viewport};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("font oversampling must be at least 1")]
    ZeroOversampling,
    #[error("viewport must be non-empty, got {0}x{1}")]
    EmptyViewport(u32, u32),
}

/// Renderer settings, loadable from a JSON file. Missing fields fall back to
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub viewport: Viewport,
    /// Text is rasterized this many times larger than it is drawn.
    pub font_oversampling: u32,
    pub sprite_sheet: PathBuf,
    pub font: PathBuf,
    pub clear_color: Rgba,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            font_oversampling: 4,
            sprite_sheet: PathBuf::from("spritesheet.png"),
            font: PathBuf::from("RasterForgeRegular.ttf"),
            clear_color: Rgba::BLACK,
        }
    }
}

impl RendererConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::info!("loaded renderer config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.font_oversampling == 0 {
            return Err(ConfigError::ZeroOversampling);
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ConfigError::EmptyViewport(
                self.viewport.width,
                self.viewport.height,
            ));
        }
        Ok(())
    }

    /// Resolve relative asset paths against `root`.
    pub fn with_asset_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        if self.sprite_sheet.is_relative() {
            self.sprite_sheet = root.join(&self.sprite_sheet);
        }
        if self.font.is_relative() {
            self.font = root.join(&self.font);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.viewport, Viewport::new(256, 144));
        assert_eq!(config.font_oversampling, 4);
        assert_eq!(config.sprite_sheet, PathBuf::from("spritesheet.png"));
        assert_eq!(config.font, PathBuf::from("RasterForgeRegular.ttf"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.json");
        std::fs::write(&path, r#"{ "font_oversampling": 2 }"#).unwrap();

        let config = RendererConfig::load(&path).unwrap();
        assert_eq!(config.font_oversampling, 2);
        assert_eq!(config.viewport, Viewport::default());
    }

    #[test]
    fn zero_oversampling_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.json");
        std::fs::write(&path, r#"{ "font_oversampling": 0 }"#).unwrap();

        let err = RendererConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroOversampling));
    }

    #[test]
    fn malformed_file_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.json");
        std::fs::write(&path, "{ viewport").unwrap();

        assert!(matches!(
            RendererConfig::load(&path),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn asset_root_applies_to_relative_paths_only() {
        let config = RendererConfig {
            font: PathBuf::from("/fonts/mono.ttf"),
            ..RendererConfig::default()
        }
        .with_asset_root("assets");

        assert_eq!(config.sprite_sheet, PathBuf::from("assets/spritesheet.png"));
        assert_eq!(config.font, PathBuf::from("/fonts/mono.ttf"));
    }
}
