use crate::upload::{CopyPass, UploadError, UploadedTexture};
use pixelcraft_assets::{MeshError, ObjMesh, deduplicate};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("mesh error: {0}")]
    Mesh(#[from] MeshError),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
}

fn with_extension(name: &Path, extension: &str) -> PathBuf {
    let mut path = OsString::from(name.as_os_str());
    path.push(".");
    path.push(extension);
    PathBuf::from(path)
}

/// A palette-textured mesh in GPU memory.
#[derive(Debug, Default)]
pub struct VoxelModel {
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    palette: Option<UploadedTexture>,
    vertex_count: u32,
    index_count: u32,
}

impl VoxelModel {
    /// Record uploads of `<name>.model` and its `<name>.png` palette into
    /// `pass`. The data is usable once the pass is finished.
    pub fn load(pass: &mut CopyPass<'_>, name: impl AsRef<Path>) -> Result<Self, ModelError> {
        let name = name.as_ref();
        let obj = ObjMesh::load(with_extension(name, "model"))?;
        let mesh = deduplicate(&obj)?;
        let label = name.display().to_string();

        let vertex_buffer = pass.upload_buffer(
            &format!("{label} vertices"),
            wgpu::BufferUsages::VERTEX,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = pass.upload_buffer(
            &format!("{label} indices"),
            wgpu::BufferUsages::INDEX,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        let palette = pass.load_texture(with_extension(name, "png"))?;

        tracing::info!(
            "loaded model {label}: {} vertices, {} indices, {}x{} palette",
            mesh.vertices.len(),
            mesh.indices.len(),
            palette.width,
            palette.height
        );
        Ok(Self {
            vertex_buffer: Some(vertex_buffer),
            index_buffer: Some(index_buffer),
            palette: Some(palette),
            vertex_count: mesh.vertices.len() as u32,
            index_count: mesh.indices.len() as u32,
        })
    }

    /// Release the GPU resources. Safe to call more than once.
    pub fn free(&mut self) {
        if let Some(buffer) = self.vertex_buffer.take() {
            buffer.destroy();
        }
        if let Some(buffer) = self.index_buffer.take() {
            buffer.destroy();
        }
        if let Some(palette) = self.palette.take() {
            palette.texture.destroy();
        }
        self.vertex_count = 0;
        self.index_count = 0;
    }

    pub fn is_loaded(&self) -> bool {
        self.vertex_buffer.is_some()
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

impl Drop for VoxelModel {
    fn drop(&mut self) {
        self.free();
    }
}
