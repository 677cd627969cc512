//! File formats consumed by the renderer.
//!
//! - Shader side-car metadata (`<name>.json`): binding counts and compute
//!   thread-group sizes, validated against a fixed schema.
//! - Voxel model meshes (`<name>.model`): OBJ-style text, deduplicated into
//!   a 16-bit indexed vertex list ready for upload.
//!
//! Nothing here touches the GPU; the wgpu crate consumes these types.

pub mod mesh;
pub mod shader_meta;

pub use mesh::{MODEL_SCALE, MeshError, ObjIndex, ObjMesh, VoxelMesh, VoxelVertex, deduplicate};
pub use shader_meta::{
    ComputeMetadata, Digit, GraphicsMetadata, MetadataError, ShaderMetadata, ShaderStage,
    metadata_path,
};

pub fn crate_info() -> &'static str {
    "pixelcraft-assets v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("assets"));
    }
}
