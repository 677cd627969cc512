//! The master sprite sheet and the indexed surfaces clipped from it.
//!
//! The sheet is an indexed-color PNG whose palette indices, not colors,
//! carry meaning: indices `0..=3` select one of a sprite's four colors and
//! everything else is transparent.

use crate::backend::Bitmap;
use pixelcraft_common::Rgba;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Palette index rendered fully transparent. Higher indices are treated
/// the same way.
pub const TRANSPARENT_INDEX: u8 = 4;

/// Errors from loading a sprite sheet.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PNG decode error: {0}")]
    Decode(#[from] png::DecodingError),
    #[error("sprite sheet must be an indexed-color PNG, found {0:?}")]
    NotIndexed(png::ColorType),
    #[error("expected {expected} pixel indices, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Palette indices of the whole sheet, one byte per pixel.
#[derive(Debug, Clone)]
pub struct SpriteSheet {
    width: u32,
    height: u32,
    indices: Vec<u8>,
}

impl SpriteSheet {
    pub fn from_indices(width: u32, height: u32, indices: Vec<u8>) -> Result<Self, SheetError> {
        let expected = width as usize * height as usize;
        if indices.len() != expected {
            return Err(SheetError::SizeMismatch {
                expected,
                actual: indices.len(),
            });
        }
        Ok(Self {
            width,
            height,
            indices,
        })
    }

    /// Load an indexed PNG, keeping raw palette indices (bit depths 1, 2, 4
    /// and 8 are unpacked to one byte per pixel).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SheetError> {
        let path = path.as_ref();
        let file = File::open(path).inspect_err(|e| {
            tracing::error!("failed to open sprite sheet {}: {e}", path.display());
        })?;

        let mut decoder = png::Decoder::new(BufReader::new(file));
        decoder.set_transformations(png::Transformations::IDENTITY);
        let mut reader = decoder.read_info()?;
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf)?;

        if info.color_type != png::ColorType::Indexed {
            return Err(SheetError::NotIndexed(info.color_type));
        }

        let depth = info.bit_depth as usize;
        let mask = ((1u16 << depth) - 1) as u8;
        let mut indices = Vec::with_capacity(info.width as usize * info.height as usize);
        for row in buf.chunks(info.line_size).take(info.height as usize) {
            for x in 0..info.width as usize {
                let bit = x * depth;
                let shift = 8 - depth - bit % 8;
                indices.push((row[bit / 8] >> shift) & mask);
            }
        }

        tracing::info!(
            "loaded sprite sheet {} ({}x{}, {}-bit)",
            path.display(),
            info.width,
            info.height,
            depth
        );
        Self::from_indices(info.width, info.height, indices)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Palette index at `(x, y)`, transparent outside the sheet.
    pub fn index_at(&self, x: u32, y: u32) -> u8 {
        if x >= self.width || y >= self.height {
            return TRANSPARENT_INDEX;
        }
        self.indices[y as usize * self.width as usize + x as usize]
    }

    /// Copy the `size` x `size` square at `(x, y)` into a new surface.
    ///
    /// Returns `None` when the origin lies outside the sheet; a square that
    /// merely overhangs the edge is padded with transparency. Both differ from
    /// a zero-filled blit, which would paint the overhang in the first palette
    /// colour.
    pub fn clip(&self, x: u32, y: u32, size: u32) -> Option<Surface> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let mut indices = Vec::with_capacity(size as usize * size as usize);
        for row in 0..size {
            for col in 0..size {
                indices.push(self.index_at(x + col, y + row));
            }
        }
        Some(Surface { size, indices })
    }
}

/// A square, palette-less sprite image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    size: u32,
    indices: Vec<u8>,
}

impl Surface {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    /// Resolve indices against a four-color palette.
    pub fn apply_palette(&self, palette: &[Rgba; 4]) -> Bitmap {
        let mut pixels = Vec::with_capacity(self.indices.len() * 4);
        for &index in &self.indices {
            let color = palette
                .get(index as usize)
                .copied()
                .unwrap_or(Rgba::TRANSPARENT);
            pixels.extend_from_slice(&color.to_array());
        }
        Bitmap {
            width: self.size,
            height: self.size,
            pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> SpriteSheet {
        let indices = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x + y) % 5) as u8))
            .collect();
        SpriteSheet::from_indices(width, height, indices).unwrap()
    }

    #[test]
    fn clip_copies_region() {
        let sheet = checker(8, 8);
        let surface = sheet.clip(2, 3, 2).unwrap();
        assert_eq!(surface.size(), 2);
        assert_eq!(surface.indices(), &[0, 1, 1, 2]);
    }

    #[test]
    fn clip_past_the_edge_is_transparent() {
        let sheet = checker(4, 4);
        let surface = sheet.clip(3, 3, 2).unwrap();
        assert_eq!(
            surface.indices(),
            &[1, TRANSPARENT_INDEX, TRANSPARENT_INDEX, TRANSPARENT_INDEX]
        );
    }

    #[test]
    fn clip_outside_the_sheet_fails() {
        let sheet = checker(4, 4);
        assert!(sheet.clip(4, 0, 2).is_none());
        assert!(sheet.clip(0, 9, 1).is_none());
    }

    #[test]
    fn palette_maps_four_colors_and_transparency() {
        let sheet = SpriteSheet::from_indices(3, 2, vec![0, 1, 2, 3, 4, 9]).unwrap();
        let surface = sheet.clip(0, 0, 2).unwrap();
        let palette = [
            Rgba::opaque(255, 0, 0),
            Rgba::opaque(0, 255, 0),
            Rgba::opaque(0, 0, 255),
            Rgba::opaque(255, 255, 255),
        ];
        let bitmap = surface.apply_palette(&palette);
        assert_eq!(bitmap.pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(bitmap.pixel(1, 0), [0, 255, 0, 255]);
        assert_eq!(bitmap.pixel(0, 1), [255, 255, 255, 255]);
        assert_eq!(bitmap.pixel(1, 1)[3], 0);

        let wide = sheet.clip(1, 1, 2).unwrap();
        assert_eq!(wide.apply_palette(&palette).pixel(1, 0)[3], 0);
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let err = SpriteSheet::from_indices(2, 2, vec![0; 3]).unwrap_err();
        assert!(matches!(
            err,
            SheetError::SizeMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    fn write_png(path: &Path, color: png::ColorType, depth: png::BitDepth, data: &[u8]) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(std::io::BufWriter::new(file), 4, 2);
        encoder.set_color(color);
        encoder.set_depth(depth);
        if color == png::ColorType::Indexed {
            encoder.set_palette(vec![0u8; 3 * 16]);
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(data).unwrap();
    }

    #[test]
    fn load_eight_bit_indexed_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.png");
        write_png(
            &path,
            png::ColorType::Indexed,
            png::BitDepth::Eight,
            &[0, 1, 2, 3, 4, 3, 2, 1],
        );

        let sheet = SpriteSheet::load(&path).unwrap();
        assert_eq!((sheet.width(), sheet.height()), (4, 2));
        assert_eq!(sheet.index_at(3, 0), 3);
        assert_eq!(sheet.index_at(0, 1), 4);
    }

    #[test]
    fn load_packed_two_bit_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.png");
        // Row 0: 0 1 2 3, row 1: 3 2 1 0, four pixels per byte.
        write_png(
            &path,
            png::ColorType::Indexed,
            png::BitDepth::Two,
            &[0b00_01_10_11, 0b11_10_01_00],
        );

        let sheet = SpriteSheet::load(&path).unwrap();
        assert_eq!(sheet.index_at(1, 0), 1);
        assert_eq!(sheet.index_at(3, 0), 3);
        assert_eq!(sheet.index_at(0, 1), 3);
        assert_eq!(sheet.index_at(3, 1), 0);
    }

    #[test]
    fn rgb_png_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.png");
        write_png(&path, png::ColorType::Rgb, png::BitDepth::Eight, &[0; 24]);

        let err = SpriteSheet::load(&path).unwrap_err();
        assert!(matches!(err, SheetError::NotIndexed(png::ColorType::Rgb)));
    }
}
