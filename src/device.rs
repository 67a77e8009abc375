//! Adapter and device selection.

use crate::error::SetupError;
use crate::layout::ParticleLayout;

/// Storage bindings the sort kernels add on top of the particle store.
pub const SORT_STORAGE_BINDINGS: u32 = 3;

/// Limits to ask for: the defaults, with the storage limits raised to what the
/// particle kernels need and the buffer sizes raised to what the adapter has.
pub fn required_limits(
    adapter: &wgpu::Limits,
    layout: ParticleLayout,
) -> Result<wgpu::Limits, SetupError> {
    let defaults = wgpu::Limits::default();
    let storage_buffers = layout.store_binding_count() + SORT_STORAGE_BINDINGS;
    if adapter.max_storage_buffers_per_shader_stage < storage_buffers {
        return Err(SetupError::UnsupportedLimit {
            limit: "max_storage_buffers_per_shader_stage",
            available: adapter.max_storage_buffers_per_shader_stage as u64,
            required: storage_buffers as u64,
        });
    }
    Ok(wgpu::Limits {
        max_storage_buffers_per_shader_stage: storage_buffers
            .max(defaults.max_storage_buffers_per_shader_stage),
        max_storage_buffer_binding_size: adapter
            .max_storage_buffer_binding_size
            .max(defaults.max_storage_buffer_binding_size),
        max_buffer_size: adapter.max_buffer_size.max(defaults.max_buffer_size),
        ..defaults
    })
}

pub async fn open_device(
    adapter: &wgpu::Adapter,
    required_limits: wgpu::Limits,
) -> Result<(wgpu::Device, wgpu::Queue), SetupError> {
    let info = adapter.get_info();
    log::info!("Using {} ({:?})", info.name, info.backend);
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("sparkle"),
                required_features: wgpu::Features::empty(),
                required_limits,
            },
            None,
        )
        .await?;
    crate::error::install_device_error_hook(&device);
    Ok((device, queue))
}

/// A device without any surface, for tests and offline runs.
pub fn headless_device(layout: ParticleLayout) -> Result<(wgpu::Device, wgpu::Queue), SetupError> {
    futures::executor::block_on(async {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(SetupError::NoAdapter)?;
        let limits = required_limits(&adapter.limits(), layout)?;
        open_device(&adapter, limits).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aos_fits_the_default_limits() {
        let limits =
            required_limits(&wgpu::Limits::default(), ParticleLayout::ArrayOfStructures).unwrap();
        assert_eq!(
            limits.max_storage_buffers_per_shader_stage,
            wgpu::Limits::default().max_storage_buffers_per_shader_stage
        );
    }

    #[test]
    fn soa_needs_more_storage_bindings() {
        let layout = ParticleLayout::StructureOfArrays;
        match required_limits(&wgpu::Limits::default(), layout) {
            Err(SetupError::UnsupportedLimit { required, .. }) => assert_eq!(required, 11),
            other => panic!("unexpected {:?}", other.map(|l| l.max_storage_buffers_per_shader_stage)),
        }

        let adapter = wgpu::Limits {
            max_storage_buffers_per_shader_stage: 16,
            max_buffer_size: 1 << 32,
            ..wgpu::Limits::default()
        };
        let limits = required_limits(&adapter, layout).unwrap();
        assert_eq!(limits.max_storage_buffers_per_shader_stage, 11);
        assert_eq!(limits.max_buffer_size, 1 << 32);
    }
}
