//! wgpu backend for the pixelcraft renderer.
//!
//! - [`WgpuBackend`] implements [`pixelcraft_render::RenderBackend`]: sprite
//!   and text textures are drawn as alpha-blended quads into a letterboxed
//!   logical viewport.
//! - [`CopyPass`] stages buffer and texture uploads through mapped transfer
//!   buffers and submits them together.
//! - [`load_shader`] / [`load_compute_pipeline`] turn pre-compiled shader
//!   binaries plus their JSON metadata into modules and pipelines.
//! - [`VoxelModel`] is a deduplicated mesh with its palette texture.
//!
//! # Invariants
//! - Every upload failure is returned as an error; none panic.
//! - Shader metadata is validated before any GPU object is created.

mod gpu;
mod shaders;
mod upload;
mod voxel_model;

pub use gpu::{SpriteTexture, WgpuBackend};
pub use shaders::{
    ComputeKernel, LoadedShader, SPRITE_SHADER, ShaderError, ShaderFormat, load_compute_pipeline,
    load_shader,
};
pub use upload::{CopyPass, TEXTURE_FORMAT, UploadError, UploadedTexture, padded_row, padded_size};
pub use voxel_model::{ModelError, VoxelModel};

pub fn crate_info() -> &'static str {
    "pixelcraft-render-wgpu v0.1.0"
}

/// A headless device for tests, or `None` on machines without an adapter.
#[cfg(test)]
pub(crate) fn test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::default();
    let adapter =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))?;
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor::default(), None)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("wgpu"));
    }
}
