//! Per frame sequencing of the particle pipeline:
//! randoms, emission, indirect args, simulation, sort, postprocess.

use std::path::Path;

use crate::buffer_util::{self, SizedBuffer};
use crate::dispatch::{self, THREAD_GROUP_WIDTH};
use crate::emitter::Emitter;
use crate::error::{self, SetupError};
use crate::indirect::{self, IndirectArgs, IndirectArgsBuffer};
use crate::params::{SimulationParams, SparkleConfig};
use crate::particle_store::{Particle, ParticleStore, Side};
use crate::random_source::RandomSource;
use crate::shader_utils::{self, Kernel};
use crate::sort::SortEngine;
use crate::vector_field::{self, VectorField, VectorFieldProvider};

/// Random values are drawn from this range.
const RANDOM_RANGE: (f32, f32) = (0.0, 1.0);

/// How fast the curl noise potential drifts, in noise units per second.
const NOISE_DRIFT: f32 = 0.05;

/// What happened during one `update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub emitted: u32,
    pub simulated: bool,
    pub sorted: bool,
    pub live_count: u32,
    pub sort_rounds: u32,
}

// This should match the struct defined in shaders/simulation.wgsl.
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct SimulationUniforms {
    pub time_step: f32,
    pub bounding_volume: u32,
    pub bounding_size: f32,
    pub scattering_factor: f32,
    pub vectorfield_factor: f32,
    pub curlnoise_factor: f32,
    pub curlnoise_inv_scale: f32,
    pub velocity_factor: f32,
    pub enable_scattering: u32,
    pub enable_vectorfield: u32,
    pub enable_curlnoise: u32,
    pub enable_velocity_control: u32,
    pub vectorfield_dims: [f32; 3],
    pub noise_time: f32,
}

impl SimulationUniforms {
    /// `field_dims` is `None` when no vector field is bound, which turns the
    /// vector field force off whatever the params say.
    pub fn new(
        params: &SimulationParams,
        dt: f32,
        field_dims: Option<[u32; 3]>,
        noise_time: f32,
    ) -> Self {
        let dims = field_dims.unwrap_or([1, 1, 1]);
        SimulationUniforms {
            time_step: dt * params.time_step_factor,
            bounding_volume: params.bounding_volume as u32,
            bounding_size: params.bounding_volume_size,
            scattering_factor: params.scattering_factor,
            vectorfield_factor: params.vectorfield_factor,
            curlnoise_factor: params.curlnoise_factor,
            curlnoise_inv_scale: 1.0 / params.curlnoise_scale,
            velocity_factor: params.velocity_factor,
            enable_scattering: params.enable_scattering as u32,
            enable_vectorfield: (params.enable_vectorfield && field_dims.is_some()) as u32,
            enable_curlnoise: params.enable_curlnoise as u32,
            enable_velocity_control: params.enable_velocity_control as u32,
            vectorfield_dims: [dims[0] as f32, dims[1] as f32, dims[2] as f32],
            noise_time,
        }
    }
}

/// Owns every GPU resource of the pipeline. Dropping it works, `destroy`
/// frees the memory right away in a fixed order.
pub struct ParticleSystem {
    params: SimulationParams,
    batch_emit_count: u32,
    enable_sorting: bool,
    // Provisional between emission and the readback after the simulation.
    alive_estimate: u32,
    noise_time: f32,

    store: ParticleStore,
    randoms: RandomSource,
    vector_field: VectorField,
    has_vector_field: bool,
    args: IndirectArgsBuffer,
    emitter: Emitter,
    sort: SortEngine,

    simulation_uniforms: SizedBuffer,
    simulation_bind_group: wgpu::BindGroup,
    simulation_pipeline: wgpu::ComputePipeline,
}

impl ParticleSystem {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &SparkleConfig,
    ) -> Result<Self, SetupError> {
        let capacity = dispatch::floor_particle_count(config.capacity, THREAD_GROUP_WIDTH);
        if capacity != config.capacity {
            log::info!(
                "Capacity {} floored to {} to fill whole work groups",
                config.capacity,
                capacity
            );
        }
        let layout = config.layout;
        let store = ParticleStore::new(device, capacity, layout, config.compaction)?;
        let randoms = RandomSource::new(
            device,
            capacity * RandomSource::VALUES_PER_PARTICLE,
            RANDOM_RANGE.0,
            RANDOM_RANGE.1,
            config.random_seed,
        )?;
        let (vector_field, has_vector_field) = if config.vector_field.enabled {
            let field = VectorField::new(
                device,
                queue,
                config.vector_field.dimensions,
                Path::new(&config.vector_field.cache_path),
            )?;
            (field, true)
        } else {
            (VectorField::placeholder(device, queue)?, false)
        };
        let args = IndirectArgsBuffer::new(device, layout, &store)?;
        args.reset(queue);
        let emitter = Emitter::new(device, layout, &store, &randoms)?;
        let sort = SortEngine::new(device, queue, layout, &store)?;

        let simulation_uniforms = error::checked_allocation(device, "Simulation uniforms", || {
            buffer_util::make_default_uniform_buffer::<SimulationUniforms>(
                device,
                "Simulation uniforms",
            )
        })?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulation layout"),
            entries: &[
                buffer_util::storage_entry(0, true),
                buffer_util::uniform_entry(
                    1,
                    wgpu::ShaderStages::COMPUTE,
                    simulation_uniforms.size,
                ),
                vector_field::texture_entry(2),
            ],
        });
        let simulation_bind_group = Self::simulation_bind_group(
            device,
            &bind_group_layout,
            &randoms,
            &simulation_uniforms,
            &vector_field,
        );
        let simulation_pipeline = shader_utils::compute_pipeline(
            device,
            Kernel::Simulation,
            layout,
            &[store.bind_group_layout(), &bind_group_layout],
        )?;

        let mut params = config.simulation;
        params.clamp();
        params.enable_vectorfield &= has_vector_field;

        Ok(ParticleSystem {
            params,
            batch_emit_count: config.batch_emit_count,
            enable_sorting: config.enable_sorting,
            alive_estimate: 0,
            noise_time: 0.0,
            store,
            randoms,
            vector_field,
            has_vector_field,
            args,
            emitter,
            sort,
            simulation_uniforms,
            simulation_bind_group,
            simulation_pipeline,
        })
    }

    fn simulation_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        randoms: &RandomSource,
        uniforms: &SizedBuffer,
        field: &dyn VectorFieldProvider,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Simulation bind group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: randoms.buffer.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: uniforms.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(field.texture_view()),
                },
            ],
        })
    }

    /// Runs one frame of the pipeline. `dt` is in seconds, `view` is the
    /// camera transform the sort orders by. Blocks once, on the live count
    /// readback after the simulation.
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        dt: f32,
        view: cgmath::Matrix4<f32>,
    ) -> FrameStats {
        let capacity = self.store.capacity();
        let mut stats = FrameStats::default();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle update"),
        });

        // Emission uses two slots per new particle, the simulation one per
        // live particle.
        let emit_count = dispatch::emit_count(self.batch_emit_count, capacity, self.alive_estimate);
        let slots = (self.alive_estimate + 2 * emit_count).min(capacity);
        self.randoms
            .regenerate(queue, slots * RandomSource::VALUES_PER_PARTICLE);

        if emit_count > 0 {
            self.emitter
                .emit(queue, &mut encoder, &self.store, &self.params, emit_count);
            self.alive_estimate += emit_count;
            stats.emitted = emit_count;
        }

        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Update indirect args"),
                timestamp_writes: None,
            });
            self.args.record_update(&mut cpass, &self.store);
        }

        stats.simulated = self.alive_estimate > 0;
        if stats.simulated {
            self.noise_time += dt * NOISE_DRIFT;
            let uniforms = SimulationUniforms::new(
                &self.params,
                dt,
                self.vectorfield_dimensions(),
                self.noise_time,
            );
            queue.write_buffer(
                &self.simulation_uniforms.buffer,
                0,
                bytemuck::bytes_of(&uniforms),
            );
            {
                let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Particle simulation"),
                    timestamp_writes: None,
                });
                cpass.set_pipeline(&self.simulation_pipeline);
                self.store.bind(&mut cpass, 0);
                cpass.set_bind_group(1, &self.simulation_bind_group, &[]);
                cpass.dispatch_workgroups_indirect(self.args.buffer(), indirect::DISPATCH_OFFSET);
            }
            self.store.reset_consumed_counter(&mut encoder);
        }
        queue.submit(Some(encoder.finish()));

        if stats.simulated {
            self.alive_estimate = self.store.read_live_count(device, queue);
        }
        stats.live_count = self.alive_estimate;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle postprocess"),
        });
        stats.sorted = stats.simulated && self.enable_sorting && stats.live_count > 0;
        if stats.sorted {
            stats.sort_rounds =
                self.sort
                    .sort(queue, &mut encoder, &self.store, stats.live_count, view);
        }
        if stats.simulated {
            self.store.swap_counters();
            if !stats.sorted {
                self.store.swap_storage(&mut encoder);
            }
        }
        self.args.set_instance_count_from(&mut encoder, &self.store);
        queue.submit(Some(encoder.finish()));

        log::debug!(
            "Emitted {}, live {}, sort rounds {}",
            stats.emitted,
            stats.live_count,
            stats.sort_rounds
        );
        stats
    }

    pub fn capacity(&self) -> u32 {
        self.store.capacity()
    }

    /// Live count as of the last readback, plus whatever was emitted since.
    pub fn live_count(&self) -> u32 {
        self.alive_estimate
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn indirect_args(&self) -> &IndirectArgsBuffer {
        &self.args
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Replaces the simulation params, clamped to their ranges.
    pub fn set_params(&mut self, params: SimulationParams) {
        self.params = params;
        self.params.clamp();
        self.params.enable_vectorfield &= self.has_vector_field;
    }

    pub fn batch_emit_count(&self) -> u32 {
        self.batch_emit_count
    }

    pub fn set_batch_emit_count(&mut self, count: u32) {
        self.batch_emit_count = count;
    }

    pub fn is_sorting_enabled(&self) -> bool {
        self.enable_sorting
    }

    pub fn set_sorting(&mut self, enabled: bool) {
        if enabled != self.enable_sorting {
            log::info!("Sorting {}", if enabled { "enabled" } else { "disabled" });
        }
        self.enable_sorting = enabled;
    }

    pub fn is_vectorfield_enabled(&self) -> bool {
        self.params.enable_vectorfield
    }

    /// Has no effect without a vector field.
    pub fn set_vectorfield(&mut self, enabled: bool) {
        if enabled && !self.has_vector_field {
            log::warn!("No vector field loaded, the force stays off");
        }
        self.params.enable_vectorfield = enabled && self.has_vector_field;
    }

    pub fn vectorfield_dimensions(&self) -> Option<[u32; 3]> {
        self.has_vector_field
            .then(|| self.vector_field.dimensions())
    }

    /// Replaces the live set with `particles`.
    pub fn seed(&mut self, queue: &wgpu::Queue, particles: &[Particle]) -> Result<(), SetupError> {
        self.store.seed(queue, particles)?;
        self.alive_estimate = particles.len() as u32;
        Ok(())
    }

    pub fn read_particles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        side: Side,
        count: u32,
    ) -> Result<Vec<Particle>, wgpu::BufferAsyncError> {
        self.store.read_particles(device, queue, side, count)
    }

    pub fn read_indirect_args(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<IndirectArgs, wgpu::BufferAsyncError> {
        self.args.read(device, queue)
    }

    pub fn destroy(self) {
        self.sort.destroy();
        self.args.destroy();
        self.emitter.destroy();
        self.simulation_uniforms.buffer.destroy();
        self.randoms.destroy();
        self.vector_field.destroy();
        self.store.destroy();
    }
}
