//! Shared value types for the pixelcraft renderer crates.

mod types;

pub use types::{Rect, Rgba, Viewport};
