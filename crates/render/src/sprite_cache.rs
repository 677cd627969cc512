//! Surface and texture caches for sheet sprites.
//!
//! Surfaces are keyed by the region portion of a descriptor, textures by the
//! full descriptor, so recolours of one sprite share a single clipped surface.
//! Nothing is evicted; both maps live until [`SpriteCache::clear`].

use crate::backend::RenderBackend;
use crate::sheet::{SpriteSheet, Surface};
use crate::sprite::{RegionKey, SpriteKey};
use std::collections::HashMap;

pub struct SpriteCache<T> {
    surfaces: HashMap<RegionKey, Option<Surface>>,
    textures: HashMap<SpriteKey, Option<T>>,
}

impl<T> Default for SpriteCache<T> {
    fn default() -> Self {
        Self {
            surfaces: HashMap::new(),
            textures: HashMap::new(),
        }
    }
}

impl<T: Clone> SpriteCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find or build the texture for `key`.
    ///
    /// A `None` result means the surface or texture could not be created; the
    /// failure is remembered and never retried.
    pub fn texture<B>(&mut self, backend: &mut B, sheet: &SpriteSheet, key: SpriteKey) -> Option<T>
    where
        B: RenderBackend<Texture = T>,
    {
        if let Some(slot) = self.textures.get(&key) {
            return slot.clone();
        }

        let region = key.region();
        let surface = self.surfaces.entry(region).or_insert_with(|| {
            let surface = sheet.clip(key.x(), key.y(), key.size());
            match &surface {
                Some(_) => tracing::debug!(
                    "clipped surface {:#08x} at ({}, {}) size {}",
                    region.0,
                    key.x(),
                    key.y(),
                    key.size()
                ),
                None => tracing::warn!(
                    "sprite region ({}, {}) lies outside the {}x{} sheet",
                    key.x(),
                    key.y(),
                    sheet.width(),
                    sheet.height()
                ),
            }
            surface
        });

        let texture = match surface {
            Some(surface) => {
                let bitmap = surface.apply_palette(&key.palette());
                match backend.create_texture(&format!("sprite {key}"), &bitmap) {
                    Ok(texture) => {
                        tracing::debug!("created sprite texture {key}");
                        Some(texture)
                    }
                    Err(e) => {
                        tracing::warn!("skipping sprite {key}: {e}");
                        None
                    }
                }
            }
            None => None,
        };
        self.textures.insert(key, texture.clone());
        texture
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.values().filter(|s| s.is_some()).count()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.values().filter(|t| t.is_some()).count()
    }

    /// Descriptors whose draws are skipped. A failed surface leaves a failed
    /// texture slot for every descriptor that asked for it, so only texture
    /// slots are counted.
    pub fn failed_count(&self) -> usize {
        self.textures.values().filter(|t| t.is_none()).count()
    }

    pub fn clear(&mut self) {
        self.textures.clear();
        self.surfaces.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;

    fn sheet() -> SpriteSheet {
        // 32x16: left half index 0, right half index 1.
        let indices = (0..16 * 32).map(|i| u8::from(i % 32 >= 16)).collect();
        SpriteSheet::from_indices(32, 16, indices).unwrap()
    }

    #[test]
    fn recolour_shares_surface() {
        let sheet = sheet();
        let mut backend = RecordingBackend::new();
        let mut cache = SpriteCache::new();

        let red = SpriteKey::new([500, 0, 0, 0], 0, 0, 8);
        let blue = SpriteKey::new([5, 0, 0, 0], 0, 0, 8);
        let a = cache.texture(&mut backend, &sheet, red).unwrap();
        let b = cache.texture(&mut backend, &sheet, blue).unwrap();

        assert_ne!(a, b);
        assert_eq!(cache.surface_count(), 1);
        assert_eq!(cache.texture_count(), 2);
        assert_eq!(backend.texture_pixels(&a).unwrap().pixel(0, 0), [255, 0, 0, 255]);
        assert_eq!(backend.texture_pixels(&b).unwrap().pixel(0, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn cache_hit_creates_nothing() {
        let sheet = sheet();
        let mut backend = RecordingBackend::new();
        let mut cache = SpriteCache::new();
        let key = SpriteKey::new([555, 0, 0, 0], 16, 0, 4);

        let first = cache.texture(&mut backend, &sheet, key);
        let second = cache.texture(&mut backend, &sheet, key);
        assert_eq!(first, second);
        assert_eq!(backend.textures_created(), 1);
    }

    #[test]
    fn region_outside_sheet_fails_without_texture() {
        let sheet = sheet();
        let mut backend = RecordingBackend::new();
        let mut cache = SpriteCache::new();
        let key = SpriteKey::new([555, 0, 0, 0], 100, 0, 4);

        assert!(cache.texture(&mut backend, &sheet, key).is_none());
        assert!(cache.texture(&mut backend, &sheet, key).is_none());
        assert_eq!(backend.textures_created(), 0);
        assert_eq!(cache.failed_count(), 1);

        let recolour = SpriteKey::new([50, 0, 0, 0], 100, 0, 4);
        assert!(cache.texture(&mut backend, &sheet, recolour).is_none());
        assert_eq!(cache.failed_count(), 2);
    }

    #[test]
    fn failed_texture_is_not_retried() {
        let sheet = sheet();
        let mut backend = RecordingBackend::new();
        let mut cache = SpriteCache::new();
        let key = SpriteKey::new([555, 0, 0, 0], 0, 0, 4);

        backend.set_fail_textures(true);
        assert!(cache.texture(&mut backend, &sheet, key).is_none());
        backend.set_fail_textures(false);
        assert!(cache.texture(&mut backend, &sheet, key).is_none());
        assert_eq!(backend.textures_created(), 0);

        // The surface itself was fine and is reused by other palettes.
        let other = SpriteKey::new([5, 0, 0, 0], 0, 0, 4);
        assert!(cache.texture(&mut backend, &sheet, other).is_some());
        assert_eq!(cache.surface_count(), 1);
    }

    #[test]
    fn clear_drops_everything() {
        let sheet = sheet();
        let mut backend = RecordingBackend::new();
        let mut cache = SpriteCache::new();
        cache.texture(&mut backend, &sheet, SpriteKey::new([1, 2, 3, 4], 0, 0, 2));

        cache.clear();
        assert_eq!(cache.surface_count(), 0);
        assert_eq!(cache.texture_count(), 0);
    }
}
