//! Glyph-run rasterization with `fontdue`.

use crate::backend::Bitmap;
use crate::text_cache::TextError;
use pixelcraft_common::Rgba;

/// Render `text` as a single line in `color`, coverage in alpha.
///
/// The bitmap is exactly one line tall (ascent to descent) and as wide as
/// the pen advance or the rightmost inked pixel, whichever is larger.
pub(crate) fn rasterize_run(
    font: &fontdue::Font,
    px: f32,
    text: &str,
    color: Rgba,
) -> Result<Bitmap, TextError> {
    if text.is_empty() {
        return Err(TextError::EmptyText);
    }
    let line = font
        .horizontal_line_metrics(px)
        .ok_or(TextError::NoLineMetrics)?;
    let ascent = line.ascent.ceil() as i32;
    let height = (line.ascent.ceil() - line.descent.floor()).max(1.0) as u32;

    let mut pen = 0.0f32;
    let mut right = 0i32;
    let mut prev = None;
    let mut glyphs = Vec::with_capacity(text.len());
    for ch in text.chars() {
        if let Some(left) = prev {
            pen += font.horizontal_kern(left, ch, px).unwrap_or(0.0);
        }
        let (metrics, coverage) = font.rasterize(ch, px);
        let x = pen.round() as i32 + metrics.xmin;
        right = right.max(x + metrics.width as i32);
        glyphs.push((x, metrics, coverage));
        pen += metrics.advance_width;
        prev = Some(ch);
    }

    let width = (pen.ceil() as i32).max(right).max(1) as u32;
    let mut bitmap = Bitmap::new(width, height);
    for (x0, metrics, coverage) in glyphs {
        // fontdue's ymin is the offset from the baseline to the glyph's bottom.
        let top = ascent - (metrics.ymin + metrics.height as i32);
        for gy in 0..metrics.height {
            for gx in 0..metrics.width {
                let (x, y) = (x0 + gx as i32, top + gy as i32);
                if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                    continue;
                }
                let alpha = coverage[gy * metrics.width + gx];
                let existing = bitmap.pixel(x as u32, y as u32)[3];
                bitmap.set_pixel(
                    x as u32,
                    y as u32,
                    [color.r, color.g, color.b, existing.max(alpha)],
                );
            }
        }
    }
    Ok(bitmap)
}
