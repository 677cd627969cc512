//! Packed 64-bit sprite descriptors.
//!
//! ```text
//!  63 62 | 61..58 | 57..49 | 48..40 | 39..30 | 29..20 | 19..10 | 9..0
//!  unused|  size  | sheet y| sheet x| color 3| color 2| color 1| color 0
//! ```
//!
//! Colors use the decimal-digit encoding from [`crate::color`]. The stored
//! size is one less than the sprite's pixel width and height.

use crate::color;
use pixelcraft_common::Rgba;
use serde::{Deserialize, Serialize};
use std::fmt;

const COLOR_BITS: u32 = 10;
const COLOR_MASK: u64 = 0x3FF;
const X_SHIFT: u32 = 40;
const Y_SHIFT: u32 = 49;
const COORD_MASK: u64 = 0x1FF;
const SIZE_SHIFT: u32 = 58;
const SIZE_MASK: u64 = 0xF;
const REGION_MASK: u64 = 0x3F_FFFF;

/// Largest sprite edge in pixels.
pub const MAX_SPRITE_SIZE: u32 = 16;

/// A sprite descriptor: sheet region plus a four-color palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpriteKey(pub u64);

/// The sheet-region part of a descriptor (x, y, size), palette excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionKey(pub u32);

impl SpriteKey {
    /// Pack a descriptor. Fields wider than their slot are truncated, and
    /// `size` is clamped to `1..=16`.
    pub fn new(colors: [u16; 4], x: u32, y: u32, size: u32) -> Self {
        let mut bits = 0u64;
        for (i, c) in colors.iter().enumerate() {
            bits |= (u64::from(*c) & COLOR_MASK) << (i as u32 * COLOR_BITS);
        }
        bits |= (u64::from(x) & COORD_MASK) << X_SHIFT;
        bits |= (u64::from(y) & COORD_MASK) << Y_SHIFT;
        let stored = size.clamp(1, MAX_SPRITE_SIZE) - 1;
        bits |= (u64::from(stored) & SIZE_MASK) << SIZE_SHIFT;
        Self(bits)
    }

    /// Raw packed value of color field `index` (`0..4`).
    pub fn color_field(self, index: usize) -> u16 {
        assert!(index < 4, "sprite color index {index} out of range");
        ((self.0 >> (index as u32 * COLOR_BITS)) & COLOR_MASK) as u16
    }

    /// The four palette colors, quantized.
    pub fn palette(self) -> [Rgba; 4] {
        std::array::from_fn(|i| color::quantize(self.color_field(i)))
    }

    pub fn x(self) -> u32 {
        ((self.0 >> X_SHIFT) & COORD_MASK) as u32
    }

    pub fn y(self) -> u32 {
        ((self.0 >> Y_SHIFT) & COORD_MASK) as u32
    }

    /// Edge length in pixels, `1..=16`.
    pub fn size(self) -> u32 {
        ((self.0 >> SIZE_SHIFT) & SIZE_MASK) as u32 + 1
    }

    pub fn region(self) -> RegionKey {
        RegionKey(((self.0 >> X_SHIFT) & REGION_MASK) as u32)
    }
}

impl From<u64> for SpriteKey {
    fn from(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Display for SpriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sprite({}x{} @ {},{} colors {:03}/{:03}/{:03}/{:03})",
            self.size(),
            self.size(),
            self.x(),
            self.y(),
            self.color_field(0),
            self.color_field(1),
            self.color_field(2),
            self.color_field(3),
        )
    }
}
