//! Optional 3D velocity field sampled by the simulation.

use std::path::Path;

use crate::error::{self, SetupError};

/// Anything that can hand the simulation a 3D texture of velocities.
pub trait VectorFieldProvider {
    fn dimensions(&self) -> [u32; 3];
    fn texture_view(&self) -> &wgpu::TextureView;
}

/// Velocity at normalized position `p` in `[0, 1)^3`: a rotation around the
/// z axis through the middle of the volume.
pub fn velocity_at(p: [f32; 3]) -> [f32; 3] {
    [p[1] - 0.5, -(p[0] - 0.5), 0.0]
}

pub fn sample_count(dimensions: [u32; 3]) -> usize {
    dimensions.iter().map(|&d| d as usize).product()
}

/// Samples of the whole volume, x fastest then y then z.
pub fn generate_samples(dimensions: [u32; 3]) -> Vec<[f32; 3]> {
    let [width, height, depth] = dimensions;
    let mut samples = Vec::with_capacity(sample_count(dimensions));
    for z in 0..depth {
        let dz = z as f32 / depth as f32;
        for y in 0..height {
            let dy = y as f32 / height as f32;
            for x in 0..width {
                let dx = x as f32 / width as f32;
                samples.push(velocity_at([dx, dy, dz]));
            }
        }
    }
    samples
}

/// Reads a cache of raw little-endian float triples. Anything that is not
/// exactly `expected` samples long is rejected.
pub fn read_cache(path: &Path, expected: usize) -> Option<Vec<[f32; 3]>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::info!("No vector field cache at {}: {}", path.display(), e);
            return None;
        }
    };
    let expected_bytes = expected * std::mem::size_of::<[f32; 3]>();
    if bytes.len() != expected_bytes {
        log::warn!(
            "Vector field cache {} has {} bytes, expected {}, recalculating",
            path.display(),
            bytes.len(),
            expected_bytes
        );
        return None;
    }
    Some(
        bytes
            .chunks_exact(12)
            .map(|chunk| {
                let component = |i: usize| {
                    f32::from_le_bytes([chunk[i], chunk[i + 1], chunk[i + 2], chunk[i + 3]])
                };
                [component(0), component(4), component(8)]
            })
            .collect(),
    )
}

pub fn write_cache(path: &Path, samples: &[[f32; 3]]) -> std::io::Result<()> {
    let bytes: Vec<u8> = samples
        .iter()
        .flatten()
        .flat_map(|component| component.to_le_bytes())
        .collect();
    std::fs::write(path, bytes)
}

/// Cached samples when the cache matches `dimensions`, freshly computed (and
/// written back) otherwise.
pub fn load_or_generate_samples(path: &Path, dimensions: [u32; 3]) -> Vec<[f32; 3]> {
    if let Some(samples) = read_cache(path, sample_count(dimensions)) {
        return samples;
    }
    log::info!("Calculating vector field {:?}", dimensions);
    let samples = generate_samples(dimensions);
    if let Err(e) = write_cache(path, &samples) {
        log::warn!(
            "Failed to write vector field cache {}: {}",
            path.display(),
            e
        );
    }
    samples
}

pub struct VectorField {
    dimensions: [u32; 3],
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl VectorField {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dimensions: [u32; 3],
        cache_path: &Path,
    ) -> Result<Self, SetupError> {
        if dimensions.iter().any(|&d| d == 0) {
            return Err(SetupError::Config(format!(
                "vector field dimensions {:?} contain a zero",
                dimensions
            )));
        }
        let max = device.limits().max_texture_dimension_3d;
        if dimensions.iter().any(|&d| d > max) {
            return Err(SetupError::UnsupportedLimit {
                limit: "max_texture_dimension_3d",
                available: max as u64,
                required: *dimensions.iter().max().unwrap_or(&0) as u64,
            });
        }
        let samples = load_or_generate_samples(cache_path, dimensions);
        Self::from_samples(device, queue, dimensions, &samples)
    }

    /// A single zero texel, bound when no field is in use.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Self, SetupError> {
        Self::from_samples(device, queue, [1, 1, 1], &[[0.0; 3]])
    }

    pub fn from_samples(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dimensions: [u32; 3],
        samples: &[[f32; 3]],
    ) -> Result<Self, SetupError> {
        let [width, height, depth] = dimensions;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: depth,
        };
        // RGB32F has no wgpu equivalent, pad to RGBA.
        let texels: Vec<[f32; 4]> = samples.iter().map(|v| [v[0], v[1], v[2], 0.0]).collect();
        let texture = error::checked_allocation(device, "Vector field", || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Vector field"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D3,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            })
        })?;
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&texels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * std::mem::size_of::<[f32; 4]>() as u32),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(VectorField {
            dimensions,
            texture,
            view,
        })
    }

    pub fn destroy(self) {
        self.texture.destroy();
    }
}

impl VectorFieldProvider for VectorField {
    fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    fn texture_view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// Layout entry the simulation uses for the field.
pub fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        // Rgba32Float is not filterable without an extra feature, the kernel
        // interpolates by hand.
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D3,
            multisampled: false,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("sparkle-{}-{}", std::process::id(), name))
    }

    #[test]
    fn field_rotates_around_the_center() {
        assert_eq!(velocity_at([0.5, 0.5, 0.3]), [0.0, 0.0, 0.0]);
        assert_eq!(velocity_at([1.0, 0.5, 0.0]), [0.0, -0.5, 0.0]);
        assert_eq!(velocity_at([0.5, 1.0, 0.0]), [0.5, 0.0, 0.0]);
    }

    #[test]
    fn samples_are_x_fastest() {
        let samples = generate_samples([4, 2, 3]);
        assert_eq!(samples.len(), 24);
        // x steps change the y component of the velocity.
        assert_eq!(samples[0], velocity_at([0.0, 0.0, 0.0]));
        assert_eq!(samples[1], velocity_at([0.25, 0.0, 0.0]));
        assert_eq!(samples[4], velocity_at([0.0, 0.5, 0.0]));
        assert_eq!(samples[8], velocity_at([0.0, 0.0, 1.0 / 3.0]));
    }

    #[test]
    fn missing_cache_is_generated_and_written() {
        let path = temp_path("missing.dat");
        let _ = std::fs::remove_file(&path);
        let samples = load_or_generate_samples(&path, [8, 8, 4]);
        assert_eq!(samples, generate_samples([8, 8, 4]));
        let written = std::fs::metadata(&path).unwrap().len();
        assert_eq!(written, 8 * 8 * 4 * 12);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn mismatched_cache_is_rewritten() {
        let path = temp_path("mismatch.dat");
        write_cache(&path, &generate_samples([2, 2, 2])).unwrap();
        assert!(read_cache(&path, sample_count([4, 4, 4])).is_none());
        let samples = load_or_generate_samples(&path, [4, 4, 4]);
        assert_eq!(samples.len(), 64);
        assert_eq!(read_cache(&path, 64), Some(samples));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn cache_is_used_when_sizes_match() {
        let path = temp_path("hit.dat");
        let custom = vec![[1.0, 2.0, 3.0]; 8];
        write_cache(&path, &custom).unwrap();
        assert_eq!(load_or_generate_samples(&path, [2, 2, 2]), custom);
        std::fs::remove_file(&path).unwrap();
    }
}
