use crate::buffer_util::{self, SizedBuffer};
use crate::dispatch::{self, THREAD_GROUP_WIDTH};
use crate::error::{self, SetupError};
use crate::layout::ParticleLayout;
use crate::params::SimulationParams;
use crate::particle_store::ParticleStore;
use crate::random_source::RandomSource;
use crate::shader_utils::{self, Kernel};

// This should match the struct defined in shaders/emission.wgsl.
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct EmissionUniforms {
    pub position: [f32; 3],
    pub radius: f32,
    pub direction: [f32; 3],
    pub emitter_type: u32,
    pub emit_count: u32,
    pub min_age: f32,
    pub max_age: f32,
    pub id_offset: u32,
}

impl EmissionUniforms {
    pub fn new(params: &SimulationParams, emit_count: u32, id_offset: u32) -> Self {
        EmissionUniforms {
            position: params.emitter_position,
            radius: params.emitter_radius,
            direction: params.emitter_direction,
            emitter_type: params.emitter_type as u32,
            emit_count,
            min_age: params.min_age,
            max_age: params.max_age,
            id_offset,
        }
    }
}

/// Appends freshly born particles to buffer A.
pub struct Emitter {
    uniform_buffer: SizedBuffer,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::ComputePipeline,
    // Running total, the source of particle ids.
    emitted_total: u32,
}

impl Emitter {
    pub fn new(
        device: &wgpu::Device,
        layout: ParticleLayout,
        store: &ParticleStore,
        randoms: &RandomSource,
    ) -> Result<Self, SetupError> {
        let uniform_buffer = error::checked_allocation(device, "Emission uniforms", || {
            buffer_util::make_default_uniform_buffer::<EmissionUniforms>(
                device,
                "Emission uniforms",
            )
        })?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Emission layout"),
            entries: &[
                buffer_util::storage_entry(0, true),
                buffer_util::uniform_entry(1, wgpu::ShaderStages::COMPUTE, uniform_buffer.size),
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Emission bind group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: randoms.buffer.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniform_buffer.buffer.as_entire_binding(),
                },
            ],
        });
        let pipeline = shader_utils::compute_pipeline(
            device,
            Kernel::Emission,
            layout,
            &[store.bind_group_layout(), &bind_group_layout],
        )?;
        Ok(Emitter {
            uniform_buffer,
            bind_group,
            pipeline,
            emitted_total: 0,
        })
    }

    pub fn emitted_total(&self) -> u32 {
        self.emitted_total
    }

    /// Records the emission of `emit_count` particles. Nothing is recorded for
    /// an empty batch.
    pub fn emit(
        &mut self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        store: &ParticleStore,
        params: &SimulationParams,
        emit_count: u32,
    ) {
        if emit_count == 0 {
            return;
        }
        let uniforms = EmissionUniforms::new(params, emit_count, self.emitted_total);
        queue.write_buffer(&self.uniform_buffer.buffer, 0, bytemuck::bytes_of(&uniforms));
        self.emitted_total = self.emitted_total.wrapping_add(emit_count);

        let work_groups = dispatch::thread_group_count(emit_count, THREAD_GROUP_WIDTH);
        log::debug!("Emitting {} particles in {} work groups", emit_count, work_groups);
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Particle emission"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(&self.pipeline);
        store.bind(&mut cpass, 0);
        cpass.set_bind_group(1, &self.bind_group, &[]);
        cpass.dispatch_workgroups(work_groups, 1, 1);
    }

    pub fn destroy(self) {
        self.uniform_buffer.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::EmitterType;

    #[test]
    fn uniforms_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<EmissionUniforms>(), 48);
        assert_eq!(std::mem::offset_of!(EmissionUniforms, direction), 16);
        assert_eq!(std::mem::offset_of!(EmissionUniforms, emit_count), 32);
    }

    #[test]
    fn uniforms_follow_the_params() {
        let params = SimulationParams {
            emitter_type: EmitterType::Ball,
            emitter_radius: 12.0,
            min_age: 1.0,
            max_age: 3.0,
            ..SimulationParams::default()
        };
        let uniforms = EmissionUniforms::new(&params, 256, 1000);
        assert_eq!(uniforms.emitter_type, 3);
        assert_eq!(uniforms.radius, 12.0);
        assert_eq!((uniforms.min_age, uniforms.max_age), (1.0, 3.0));
        assert_eq!((uniforms.emit_count, uniforms.id_offset), (256, 1000));

        let shape_ids: Vec<u32> = EmitterType::ALL.iter().map(|&t| t as u32).collect();
        assert_eq!(shape_ids, vec![0, 1, 2, 3]);
    }
}
