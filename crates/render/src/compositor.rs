//! Camera and per-frame draw queue.
//!
//! Draws are recorded in world space and only moved into screen space when
//! the frame is presented, so every draw in a frame sees the same camera no
//! matter when the anchor was set.

use glam::Vec2;
use pixelcraft_common::{Rect, Viewport};

/// One draw waiting for the camera to be resolved.
#[derive(Debug, Clone)]
pub struct QueuedDraw<T> {
    pub texture: T,
    pub world: Rect,
}

pub struct Compositor<T> {
    viewport: Viewport,
    camera: Vec2,
    queue: Vec<QueuedDraw<T>>,
}

impl<T> Compositor<T> {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            camera: Vec2::ZERO,
            queue: Vec::new(),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Top-left corner of the view in world coordinates.
    pub fn camera(&self) -> Vec2 {
        self.camera
    }

    /// Center the view on `focus`. Half extents use integer division, so odd
    /// viewport sizes round the camera toward the top-left.
    pub fn anchor_on(&mut self, focus: Vec2) {
        let half = Vec2::new(
            (self.viewport.width / 2) as f32,
            (self.viewport.height / 2) as f32,
        );
        self.camera = focus - half;
    }

    pub fn queue(&mut self, texture: T, world: Rect) {
        self.queue.push(QueuedDraw { texture, world });
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Take the frame's draws in submission order, in screen space.
    pub fn drain(&mut self) -> impl Iterator<Item = (T, Rect)> + '_ {
        let camera = self.camera;
        self.queue
            .drain(..)
            .map(move |draw| (draw.texture, draw.world.offset_by(camera)))
    }
}
