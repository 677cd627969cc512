//! Six-level color quantization.
//!
//! Colors are written as three decimal digits, one per channel, each in
//! `0..=5`: `512` is red 5, green 1, blue 2. Each level maps linearly onto
//! `0..=255`, so the only reachable channel values are 0, 51, 102, 153, 204
//! and 255.

use pixelcraft_common::Rgba;

/// Highest level a channel digit may take.
pub const MAX_LEVEL: u8 = 5;

/// Expand a packed `rgb` digit triple to an opaque color.
///
/// Digits above 5 are a caller bug: debug builds panic, release builds
/// clamp the digit to 5.
pub fn quantize(packed: u16) -> Rgba {
    let r = level((packed / 100) % 10);
    let g = level((packed / 10) % 10);
    let b = level(packed % 10);
    Rgba::opaque(r, g, b)
}

/// Pack three channel levels (`0..=5`) into the decimal-digit form.
pub fn encode(r: u8, g: u8, b: u8) -> u16 {
    debug_assert!(
        r <= MAX_LEVEL && g <= MAX_LEVEL && b <= MAX_LEVEL,
        "color level out of range: {r}{g}{b}"
    );
    u16::from(r) * 100 + u16::from(g) * 10 + u16::from(b)
}

/// Nearest level for an 8-bit channel value; the inverse of [`quantize`].
pub fn level_of(channel: u8) -> u8 {
    ((u16::from(channel) * u16::from(MAX_LEVEL) + 127) / 255) as u8
}

fn level(digit: u16) -> u8 {
    debug_assert!(digit <= u16::from(MAX_LEVEL), "color digit {digit} out of range");
    let digit = digit.min(u16::from(MAX_LEVEL));
    (digit * 255 / u16::from(MAX_LEVEL)) as u8
}
