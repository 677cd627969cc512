//! Shader side-car metadata.
//!
//! Every pre-compiled shader `<name>.<ext>` ships with `<name>.json`, a flat
//! object of single-digit counts:
//!
//! ```json
//! { "samplers": 1, "storage_textures": 0, "storage_buffers": 0, "uniform_buffers": 1 }
//! ```
//!
//! The key set depends on the stage. A record must contain every key of its
//! schema exactly once and nothing else; values are integers `0..=9`.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors from reading or validating shader metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata must be a flat JSON object")]
    NotAnObject,
    #[error("metadata does not match the {stage} schema: {source}")]
    Schema {
        stage: ShaderStage,
        #[source]
        source: serde_json::Error,
    },
    #[error("threadcount_{axis} must be at least 1")]
    ZeroThreadCount { axis: char },
}

/// Pipeline stage, selected from the resource name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// `*.comp*` is compute, `*.frag*` is fragment, anything else is vertex.
    pub fn from_name(name: &str) -> Self {
        if name.contains(".comp") {
            Self::Compute
        } else if name.contains(".frag") {
            Self::Fragment
        } else {
            Self::Vertex
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        })
    }
}

/// A single decimal digit. The format has no way to express larger counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Digit(u8);

impl Digit {
    pub fn new(value: u8) -> Option<Self> {
        (value <= 9).then_some(Self(value))
    }

    pub fn get(self) -> u32 {
        u32::from(self.0)
    }
}

impl TryFrom<u8> for Digit {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("value {value} is not a single digit"))
    }
}

impl From<Digit> for u8 {
    fn from(digit: Digit) -> Self {
        digit.0
    }
}

/// Binding counts for a vertex or fragment shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphicsMetadata {
    pub samplers: Digit,
    pub storage_textures: Digit,
    pub storage_buffers: Digit,
    pub uniform_buffers: Digit,
}

/// Binding counts and thread-group size for a compute kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComputeMetadata {
    pub samplers: Digit,
    pub readonly_storage_textures: Digit,
    pub readonly_storage_buffers: Digit,
    pub readwrite_storage_textures: Digit,
    pub readwrite_storage_buffers: Digit,
    pub uniform_buffers: Digit,
    pub threadcount_x: Digit,
    pub threadcount_y: Digit,
    pub threadcount_z: Digit,
}

impl ComputeMetadata {
    pub fn threads(&self) -> [u32; 3] {
        [
            self.threadcount_x.get(),
            self.threadcount_y.get(),
            self.threadcount_z.get(),
        ]
    }
}

/// Parsed metadata for one shader resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShaderMetadata {
    Graphics(GraphicsMetadata),
    Compute(ComputeMetadata),
}

impl ShaderMetadata {
    /// Validate `text` against the schema for `stage`.
    pub fn parse(stage: ShaderStage, text: &str) -> Result<Self, MetadataError> {
        // Structs also deserialize from JSON arrays; only objects are valid here.
        if !text.trim_start().starts_with('{') {
            return Err(MetadataError::NotAnObject);
        }
        let schema = |source| MetadataError::Schema { stage, source };

        match stage {
            ShaderStage::Vertex | ShaderStage::Fragment => {
                let meta: GraphicsMetadata = serde_json::from_str(text).map_err(schema)?;
                Ok(Self::Graphics(meta))
            }
            ShaderStage::Compute => {
                let meta: ComputeMetadata = serde_json::from_str(text).map_err(schema)?;
                for (axis, count) in ['x', 'y', 'z'].into_iter().zip(meta.threads()) {
                    if count == 0 {
                        return Err(MetadataError::ZeroThreadCount { axis });
                    }
                }
                Ok(Self::Compute(meta))
            }
        }
    }

    /// Read and validate `<name>.json`.
    pub fn load(name: impl AsRef<Path>, stage: ShaderStage) -> Result<Self, MetadataError> {
        let path = metadata_path(name);
        let text = std::fs::read_to_string(&path).inspect_err(|e| {
            tracing::error!("failed to read shader metadata {}: {e}", path.display());
        })?;
        Self::parse(stage, &text)
    }

    pub fn stage_kind(&self) -> &'static str {
        match self {
            Self::Graphics(_) => "graphics",
            Self::Compute(_) => "compute",
        }
    }
}

/// `<name>.json`. The name usually carries a stage suffix (`render.vert`),
/// so this appends rather than replacing an extension.
pub fn metadata_path(name: impl AsRef<Path>) -> PathBuf {
    let mut path = OsString::from(name.as_ref().as_os_str());
    path.push(".json");
    PathBuf::from(path)
}
