//! Staged uploads recorded into a single copy pass.
//!
//! Each upload writes its payload into a freshly mapped staging buffer and
//! records a buffer-to-buffer or buffer-to-texture copy. Staging buffers are
//! dropped as soon as the copy is recorded; wgpu keeps them alive until the
//! submitted commands have run.

use std::path::Path;

/// Texture format used for every uploaded image.
pub const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload payload is empty")]
    EmptyPayload,
    #[error("buffer of {size} bytes exceeds the device limit of {limit}")]
    BufferTooLarge { size: u64, limit: u64 },
    #[error("texture {width}x{height} exceeds the device limit of {limit}")]
    TextureTooLarge { width: u32, height: u32, limit: u32 },
    #[error("expected {expected} bytes of RGBA pixels, got {actual}")]
    PixelLength { expected: usize, actual: usize },
    #[error("destination offset {0} is not a multiple of 4")]
    Misaligned(u64),
    #[error("destination holds {capacity} bytes, upload needs {needed}")]
    DestinationTooSmall { needed: u64, capacity: u64 },
    #[error("device rejected {what}: {message}")]
    Device { what: String, message: String },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// A texture created by an upload, with its default view.
#[derive(Debug)]
pub struct UploadedTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

/// Round `size` up to the copy alignment.
pub fn padded_size(size: u64) -> u64 {
    size.div_ceil(wgpu::COPY_BUFFER_ALIGNMENT) * wgpu::COPY_BUFFER_ALIGNMENT
}

/// Bytes per staged texture row, padded to the row alignment.
pub fn padded_row(width: u32) -> u32 {
    let unpadded = width * 4;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Copy `pixels` row by row into a buffer with `padded_row` stride.
fn pad_rows(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row = width as usize * 4;
    let stride = padded_row(width) as usize;
    if stride == row {
        return pixels.to_vec();
    }
    let mut out = vec![0u8; stride * height as usize];
    for (src, dst) in pixels.chunks_exact(row).zip(out.chunks_exact_mut(stride)) {
        dst[..row].copy_from_slice(src);
    }
    out
}

/// Staged size of a new buffer holding `len` bytes.
fn buffer_size(len: usize, limit: u64) -> Result<u64, UploadError> {
    if len == 0 {
        return Err(UploadError::EmptyPayload);
    }
    let size = padded_size(len as u64);
    if size > limit {
        return Err(UploadError::BufferTooLarge { size, limit });
    }
    Ok(size)
}

/// Staged size of `len` bytes written at `offset` into a buffer of `capacity`.
fn destination_size(len: usize, offset: u64, capacity: u64) -> Result<u64, UploadError> {
    if len == 0 {
        return Err(UploadError::EmptyPayload);
    }
    if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 {
        return Err(UploadError::Misaligned(offset));
    }
    let size = padded_size(len as u64);
    if offset + size > capacity {
        return Err(UploadError::DestinationTooSmall {
            needed: offset + size,
            capacity,
        });
    }
    Ok(size)
}

/// Validate a tightly packed RGBA8 image against the device's 2D limit.
fn check_texture(width: u32, height: u32, len: usize, limit: u32) -> Result<(), UploadError> {
    if width == 0 || height == 0 {
        return Err(UploadError::EmptyPayload);
    }
    if width > limit || height > limit {
        return Err(UploadError::TextureTooLarge {
            width,
            height,
            limit,
        });
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(UploadError::PixelLength {
            expected,
            actual: len,
        });
    }
    Ok(())
}

/// One command encoder collecting staged uploads until [`CopyPass::finish`].
///
/// A failed upload returns its error and records nothing; uploads already
/// recorded in the pass are unaffected.
pub struct CopyPass<'a> {
    device: &'a wgpu::Device,
    encoder: wgpu::CommandEncoder,
    label: String,
    uploads: usize,
}

impl<'a> CopyPass<'a> {
    pub fn begin(device: &'a wgpu::Device, label: &str) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(label),
        });
        Self {
            device,
            encoder,
            label: label.to_owned(),
            uploads: 0,
        }
    }

    pub fn device(&self) -> &'a wgpu::Device {
        self.device
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }

    /// Create a buffer with `usage | COPY_DST` and fill it with `data`.
    pub fn upload_buffer(
        &mut self,
        label: &str,
        usage: wgpu::BufferUsages,
        data: &[u8],
    ) -> Result<wgpu::Buffer, UploadError> {
        let size = buffer_size(data.len(), self.device.limits().max_buffer_size)?;
        let destination = self.checked(label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: usage | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        })?;
        self.upload_into(label, &destination, 0, data)?;
        Ok(destination)
    }

    /// Fill `destination` starting at `offset` with `data`.
    pub fn upload_into(
        &mut self,
        label: &str,
        destination: &wgpu::Buffer,
        offset: u64,
        data: &[u8],
    ) -> Result<(), UploadError> {
        let size = destination_size(data.len(), offset, destination.size())?;
        let staging = self.staging(label, data)?;
        self.encoder
            .copy_buffer_to_buffer(&staging, 0, destination, offset, size);
        self.uploads += 1;
        tracing::debug!("staged {} bytes for {label}", data.len());
        Ok(())
    }

    /// Create an RGBA8 texture and fill it with tightly packed `pixels`.
    pub fn upload_texture(
        &mut self,
        label: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<UploadedTexture, UploadError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        check_texture(width, height, pixels.len(), limit)?;

        let extent = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.checked(label, |device| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TEXTURE_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;

        let rows = pad_rows(pixels, width, height);
        let staging = self.staging(label, &rows)?;
        self.encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row(width)),
                    rows_per_image: Some(height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            extent,
        );
        self.uploads += 1;
        tracing::debug!("staged {width}x{height} texture {label}");

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(UploadedTexture {
            texture,
            view,
            width,
            height,
        })
    }

    /// Decode an image file and upload it as an RGBA8 texture.
    pub fn load_texture(&mut self, path: impl AsRef<Path>) -> Result<UploadedTexture, UploadError> {
        let path = path.as_ref();
        let image = image::open(path)
            .inspect_err(|e| tracing::error!("failed to load image {}: {e}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        self.upload_texture(&path.display().to_string(), width, height, image.as_raw())
    }

    /// Submit every recorded copy.
    pub fn finish(self, queue: &wgpu::Queue) -> Result<(), UploadError> {
        let Self {
            device,
            encoder,
            label,
            uploads,
        } = self;
        push_scopes(device);
        queue.submit(std::iter::once(encoder.finish()));
        pop_scopes(device, &label)?;
        tracing::debug!("submitted copy pass {label} ({uploads} uploads)");
        Ok(())
    }

    fn staging(&self, label: &str, data: &[u8]) -> Result<wgpu::Buffer, UploadError> {
        let size = buffer_size(data.len(), self.device.limits().max_buffer_size)?;
        let staging = self.checked(label, |device| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{label} staging")),
                size,
                usage: wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: true,
            })
        })?;
        staging.slice(..).get_mapped_range_mut()[..data.len()].copy_from_slice(data);
        staging.unmap();
        Ok(staging)
    }

    /// Run `create` inside error scopes so allocation failures come back as
    /// errors instead of reaching the uncaptured-error handler.
    fn checked<T>(
        &self,
        what: &str,
        create: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, UploadError> {
        push_scopes(self.device);
        let created = create(self.device);
        pop_scopes(self.device, what)?;
        Ok(created)
    }
}

fn push_scopes(device: &wgpu::Device) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
}

fn pop_scopes(device: &wgpu::Device, what: &str) -> Result<(), UploadError> {
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(e) => {
            tracing::error!("device rejected {what}: {e}");
            Err(UploadError::Device {
                what: what.to_owned(),
                message: e.to_string(),
            })
        }
        None => Ok(()),
    }
}
