//! Built-in WGSL plus loading of pre-compiled shader resources.
//!
//! A resource `<name>` is a binary `<name>.<spv|dxil|msl>` next to its
//! binding metadata `<name>.json`. The metadata is validated before any GPU
//! object is created, so a load never half-succeeds.

use pixelcraft_assets::{ComputeMetadata, MetadataError, ShaderMetadata, ShaderStage};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Textured quads in logical-viewport space.
pub const SPRITE_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) uv: vec2<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var sprite_texture: texture_2d<f32>;
@group(0) @binding(1) var sprite_sampler: sampler;

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.uv = in.uv;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(sprite_texture, sprite_sampler, in.uv);
}
"#;

#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no supported shader format among {0:?}")]
    NoSupportedFormat(Vec<ShaderFormat>),
    #[error("{0} shaders cannot be loaded by this backend")]
    UnsupportedFormat(ShaderFormat),
    #[error("invalid SPIR-V in {}: {reason}", path.display())]
    InvalidSpirv { path: PathBuf, reason: &'static str },
    #[error("{name} is a {stage} shader, not a compute kernel")]
    NotCompute { name: String, stage: ShaderStage },
    #[error("device rejected {name}: {message}")]
    Device { name: String, message: String },
}

/// Pre-compiled shader binary formats, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderFormat {
    SpirV,
    Dxil,
    Msl,
}

impl ShaderFormat {
    pub const PREFERENCE: [Self; 3] = [Self::SpirV, Self::Dxil, Self::Msl];

    pub fn extension(self) -> &'static str {
        match self {
            Self::SpirV => "spv",
            Self::Dxil => "dxil",
            Self::Msl => "msl",
        }
    }

    /// Metal shader compilers rename `main`.
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::SpirV | Self::Dxil => "main",
            Self::Msl => "main0",
        }
    }

    /// Most preferred format present in `supported`.
    pub fn select(supported: &[Self]) -> Option<Self> {
        Self::PREFERENCE
            .into_iter()
            .find(|format| supported.contains(format))
    }

    /// Formats this backend can turn into a shader module. SPIR-V goes
    /// through naga, so it works on every wgpu backend.
    pub fn supported() -> &'static [Self] {
        &[Self::SpirV]
    }

    pub fn binary_path(self, name: impl AsRef<Path>) -> PathBuf {
        let mut path = OsString::from(name.as_ref().as_os_str());
        path.push(".");
        path.push(self.extension());
        PathBuf::from(path)
    }
}

impl fmt::Display for ShaderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SpirV => "SPIR-V",
            Self::Dxil => "DXIL",
            Self::Msl => "MSL",
        })
    }
}

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Reject bytes `wgpu::util::make_spirv` would panic on.
fn check_spirv(path: &Path, bytes: &[u8]) -> Result<(), ShaderError> {
    let invalid = |reason| ShaderError::InvalidSpirv {
        path: path.to_path_buf(),
        reason,
    };
    if bytes.len() < 4 || bytes.len() % 4 != 0 {
        return Err(invalid("length is not a non-zero multiple of 4"));
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != SPIRV_MAGIC {
        return Err(invalid("missing SPIR-V magic number"));
    }
    Ok(())
}

/// A shader module with the metadata it was built from.
#[derive(Debug)]
pub struct LoadedShader {
    pub module: wgpu::ShaderModule,
    pub stage: ShaderStage,
    pub format: ShaderFormat,
    pub entry_point: &'static str,
    pub metadata: ShaderMetadata,
}

/// Validated metadata and the raw bytes of the chosen binary, read before
/// any GPU object exists.
#[derive(Debug)]
struct ShaderBinary {
    stage: ShaderStage,
    format: ShaderFormat,
    metadata: ShaderMetadata,
    bytes: Vec<u8>,
}

fn read_binary(name: &Path, supported: &[ShaderFormat]) -> Result<ShaderBinary, ShaderError> {
    let stage = ShaderStage::from_name(&name.display().to_string());
    let metadata = ShaderMetadata::load(name, stage)?;

    let format = ShaderFormat::select(supported)
        .ok_or_else(|| ShaderError::NoSupportedFormat(supported.to_vec()))?;
    let path = format.binary_path(name);
    let bytes = std::fs::read(&path).map_err(|source| ShaderError::Io {
        path: path.clone(),
        source,
    })?;
    match format {
        ShaderFormat::SpirV => check_spirv(&path, &bytes)?,
        other => return Err(ShaderError::UnsupportedFormat(other)),
    }
    Ok(ShaderBinary {
        stage,
        format,
        metadata,
        bytes,
    })
}

/// Load `<name>.json` and the best supported binary for it.
pub fn load_shader(device: &wgpu::Device, name: impl AsRef<Path>) -> Result<LoadedShader, ShaderError> {
    let name = name.as_ref();
    let label = name.display().to_string();
    let ShaderBinary {
        stage,
        format,
        metadata,
        bytes,
    } = read_binary(name, ShaderFormat::supported())?;
    let source = wgpu::util::make_spirv(&bytes);

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source,
    });
    if let Some(e) = pollster::block_on(device.pop_error_scope()) {
        return Err(ShaderError::Device {
            name: label,
            message: e.to_string(),
        });
    }

    tracing::info!(
        "loaded {stage} shader {label} ({format}, {} metadata)",
        metadata.stage_kind()
    );
    Ok(LoadedShader {
        module,
        stage,
        format,
        entry_point: format.entry_point(),
        metadata,
    })
}

/// A compute pipeline plus its thread-group size.
#[derive(Debug)]
pub struct ComputeKernel {
    pub pipeline: wgpu::ComputePipeline,
    pub metadata: ComputeMetadata,
}

impl ComputeKernel {
    pub fn threads(&self) -> [u32; 3] {
        self.metadata.threads()
    }

    /// Workgroup counts covering `extent` invocations on each axis.
    pub fn workgroups(&self, extent: [u32; 3]) -> [u32; 3] {
        workgroups_for(self.threads(), extent)
    }
}

fn workgroups_for(threads: [u32; 3], extent: [u32; 3]) -> [u32; 3] {
    std::array::from_fn(|i| extent[i].div_ceil(threads[i].max(1)))
}

/// Load a `.comp` resource and build its pipeline with a derived layout.
pub fn load_compute_pipeline(
    device: &wgpu::Device,
    name: impl AsRef<Path>,
) -> Result<ComputeKernel, ShaderError> {
    let name = name.as_ref();
    let label = name.display().to_string();
    let stage = ShaderStage::from_name(&label);
    if stage != ShaderStage::Compute {
        return Err(ShaderError::NotCompute { name: label, stage });
    }

    let shader = load_shader(device, name)?;
    let ShaderMetadata::Compute(metadata) = shader.metadata else {
        return Err(ShaderError::NotCompute {
            name: label,
            stage: shader.stage,
        });
    };

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&label),
        layout: None,
        module: &shader.module,
        entry_point: Some(shader.entry_point),
        compilation_options: Default::default(),
        cache: None,
    });
    if let Some(e) = pollster::block_on(device.pop_error_scope()) {
        return Err(ShaderError::Device {
            name: label,
            message: e.to_string(),
        });
    }

    tracing::info!("built compute pipeline {label} with {:?} threads", metadata.threads());
    Ok(ComputeKernel { pipeline, metadata })
}
