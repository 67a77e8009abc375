//! Back to front ordering of the survivors with a bitonic sorting network.
//!
//! The network runs over a power of two number of slots. Slots past the live
//! count hold the `-f32::MAX` sentinel depth, and since the order is
//! descending they all collect at the end. Every round reads one half of the
//! index buffer and writes the other; the halves trade places between rounds.

use crate::buffer_util::{self, SizedBuffer};
use crate::dispatch::{self, THREAD_GROUP_WIDTH};
use crate::error::{self, SetupError};
use crate::layout::ParticleLayout;
use crate::particle_store::ParticleStore;
use crate::shader_utils::{self, Kernel};

/// Depth given to padding slots.
pub const SENTINEL_DEPTH: f32 = -f32::MAX;

/// Smallest network the GPU engine allocates. Keeps the second index half
/// on a 256 byte boundary.
pub const MIN_NETWORK_LENGTH: u32 = 64;

/// One compare-exchange round of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortPass {
    pub step: u32,
    pub stage: u32,
    /// Distance between compared slots, times two.
    pub block_width: u32,
    /// Width of the blocks sharing one direction.
    pub max_block_width: u32,
}

/// Rounds of a network over `padded_count` slots, in execution order. The
/// schedule of a shorter network is a prefix of the one of a longer network.
pub fn schedule(padded_count: u32) -> impl Iterator<Item = SortPass> {
    let steps = padded_count.max(1).trailing_zeros();
    (0..steps).flat_map(|step| {
        (0..=step).map(move |stage| SortPass {
            step,
            stage,
            block_width: 2 << (step - stage),
            max_block_width: 2 << step,
        })
    })
}

pub fn round_count(padded_count: u32) -> u32 {
    let steps = padded_count.max(1).trailing_zeros();
    steps * (steps + 1) / 2
}

/// Host execution of one round, thread for thread the same as the kernel.
pub fn compare_exchange(pass: SortPass, depths: &[f32], input: &[u32], output: &mut [u32]) {
    let half_width = pass.block_width / 2;
    for t in 0..(input.len() as u32 / 2) {
        let i = ((t / half_width) * pass.block_width + t % half_width) as usize;
        let j = i + half_width as usize;
        let (a, b) = (input[i], input[j]);
        let (da, db) = (depths[a as usize], depths[b as usize]);
        let descending = (i as u32 & pass.max_block_width) == 0;
        let swap = if descending { da < db } else { da > db };
        output[i] = if swap { b } else { a };
        output[j] = if swap { a } else { b };
    }
}

/// Indices of `depths` ordered from the largest depth to the smallest, padded
/// to the network length with sentinel slots.
pub fn sort_by_depth(depths: &[f32]) -> Vec<u32> {
    let padded_count = dispatch::sort_length(depths.len() as u32);
    let mut padded = depths.to_vec();
    padded.resize(padded_count as usize, SENTINEL_DEPTH);
    let mut first: Vec<u32> = (0..padded_count).collect();
    let mut second = vec![0; padded_count as usize];
    for pass in schedule(padded_count) {
        compare_exchange(pass, &padded, &first, &mut second);
        std::mem::swap(&mut first, &mut second);
    }
    first
}

// These should match the structs defined in shaders/_sort_common.wgsl.
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct SortUniforms {
    padded_count: u32,
    live_count: u32,
    _pad: [u32; 2],
}

#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct NetworkStepUniforms {
    block_width: u32,
    max_block_width: u32,
    _pad: [u32; 2],
}

#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
struct DepthUniforms {
    view: [[f32; 4]; 4],
}

impl Default for DepthUniforms {
    fn default() -> Self {
        DepthUniforms {
            view: cgmath::Matrix4::from_scale(1.0f32).into(),
        }
    }
}

const STEP_SIZE: wgpu::BufferAddress =
    std::mem::size_of::<NetworkStepUniforms>() as wgpu::BufferAddress;

struct SortPipelines {
    fill: wgpu::ComputePipeline,
    depth: wgpu::ComputePipeline,
    step: wgpu::ComputePipeline,
    finish: wgpu::ComputePipeline,
}

/// GPU side of the sort. Owns the scratch buffers, sized once for the largest
/// network the store can need.
pub struct SortEngine {
    max_length: u32,
    dot_products: SizedBuffer,
    indices: SizedBuffer,
    uniform_buffer: SizedBuffer,
    depth_buffer: SizedBuffer,
    step_table: SizedBuffer,
    step_stride: wgpu::BufferAddress,
    // [0] binds the halves as (first, second), [1] as (second, first).
    bind_groups: [wgpu::BindGroup; 2],
    pipelines: SortPipelines,
}

impl SortEngine {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: ParticleLayout,
        store: &ParticleStore,
    ) -> Result<Self, SetupError> {
        let max_length = dispatch::sort_length(store.capacity()).max(MIN_NETWORK_LENGTH);
        let half_size = max_length as wgpu::BufferAddress * 4;
        error::check_buffer_size(device, "Sort indices", 2 * half_size, false)?;
        error::check_buffer_size(device, "Sort indices", half_size, true)?;

        let step_stride = (device.limits().min_uniform_buffer_offset_alignment
            as wgpu::BufferAddress)
            .max(STEP_SIZE);
        let rounds = round_count(max_length);
        let mut table = vec![0u8; (rounds as wgpu::BufferAddress * step_stride) as usize];
        for (round, pass) in schedule(max_length).enumerate() {
            let offset = round * step_stride as usize;
            let uniforms = NetworkStepUniforms {
                block_width: pass.block_width,
                max_block_width: pass.max_block_width,
                _pad: [0; 2],
            };
            table[offset..offset + STEP_SIZE as usize]
                .copy_from_slice(bytemuck::bytes_of(&uniforms));
        }
        log::info!(
            "Sort network: up to {} slots, {} rounds, step stride {}",
            max_length,
            rounds,
            step_stride
        );

        let (dot_products, indices, uniform_buffer, depth_buffer, step_table) =
            error::checked_allocation(device, "Sort scratch", || {
                let dot_products = buffer_util::make_storage_buffer(
                    device,
                    "Sort dot products",
                    half_size,
                    wgpu::BufferUsages::empty(),
                );
                let indices = buffer_util::make_storage_buffer(
                    device,
                    "Sort indices",
                    2 * half_size,
                    wgpu::BufferUsages::empty(),
                );
                let uniform_buffer =
                    buffer_util::make_default_uniform_buffer::<SortUniforms>(device, "Sort uniforms");
                let depth_buffer =
                    buffer_util::make_default_uniform_buffer::<DepthUniforms>(device, "Sort depth");
                let step_table = SizedBuffer {
                    buffer: device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Sort network steps"),
                        size: table.len() as wgpu::BufferAddress,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }),
                    size: table.len() as wgpu::BufferAddress,
                };
                (dot_products, indices, uniform_buffer, depth_buffer, step_table)
            })?;
        queue.write_buffer(&step_table.buffer, 0, &table);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Sort layout"),
            entries: &[
                buffer_util::uniform_entry(
                    0,
                    wgpu::ShaderStages::COMPUTE,
                    uniform_buffer.size,
                ),
                buffer_util::storage_entry(1, false),
                buffer_util::storage_entry(2, false),
                buffer_util::storage_entry(3, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: wgpu::BufferSize::new(STEP_SIZE),
                    },
                    count: None,
                },
                buffer_util::uniform_entry(5, wgpu::ShaderStages::COMPUTE, depth_buffer.size),
            ],
        });
        let make_bind_group = |first: wgpu::BufferAddress, second: wgpu::BufferAddress| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Sort bind group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: dot_products.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffer_util::buffer_range(&indices.buffer, first, half_size),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: buffer_util::buffer_range(&indices.buffer, second, half_size),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: buffer_util::buffer_range(&step_table.buffer, 0, STEP_SIZE),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: depth_buffer.buffer.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [make_bind_group(0, half_size), make_bind_group(half_size, 0)];

        let layouts = [store.bind_group_layout(), &bind_group_layout];
        let pipelines = SortPipelines {
            fill: shader_utils::compute_pipeline(device, Kernel::FillIndices, layout, &layouts)?,
            depth: shader_utils::compute_pipeline(device, Kernel::CalculateDepth, layout, &layouts)?,
            step: shader_utils::compute_pipeline(device, Kernel::SortStep, layout, &layouts)?,
            finish: shader_utils::compute_pipeline(device, Kernel::SortFinal, layout, &layouts)?,
        };

        Ok(SortEngine {
            max_length,
            dot_products,
            indices,
            uniform_buffer,
            depth_buffer,
            step_table,
            step_stride,
            bind_groups,
            pipelines,
        })
    }

    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    /// Records the whole sort of the `live_count` survivors in B into A. The
    /// uniforms go through the queue, so `encoder` must be submitted after
    /// this call. Returns the number of network rounds.
    pub fn sort(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        store: &ParticleStore,
        live_count: u32,
        view: cgmath::Matrix4<f32>,
    ) -> u32 {
        if live_count == 0 {
            return 0;
        }
        let padded_count = dispatch::sort_length(live_count).min(self.max_length);
        queue.write_buffer(
            &self.uniform_buffer.buffer,
            0,
            bytemuck::bytes_of(&SortUniforms {
                padded_count,
                live_count,
                _pad: [0; 2],
            }),
        );
        queue.write_buffer(
            &self.depth_buffer.buffer,
            0,
            bytemuck::bytes_of(&DepthUniforms { view: view.into() }),
        );

        self.run(encoder, store, &self.pipelines.fill, 0, 0, padded_count);
        self.run(encoder, store, &self.pipelines.depth, 0, 0, live_count);
        let rounds = round_count(padded_count);
        for round in 0..rounds {
            let offset = (round as wgpu::BufferAddress * self.step_stride) as u32;
            self.run(
                encoder,
                store,
                &self.pipelines.step,
                round as usize % 2,
                offset,
                padded_count / 2,
            );
        }
        self.run(
            encoder,
            store,
            &self.pipelines.finish,
            rounds as usize % 2,
            0,
            live_count,
        );
        rounds
    }

    // One pass per kernel launch, so every launch sees the writes of the
    // previous one.
    fn run(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        store: &ParticleStore,
        pipeline: &wgpu::ComputePipeline,
        half: usize,
        step_offset: u32,
        nthreads: u32,
    ) {
        let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Particle sort"),
            timestamp_writes: None,
        });
        cpass.set_pipeline(pipeline);
        store.bind(&mut cpass, 0);
        cpass.set_bind_group(1, &self.bind_groups[half], &[step_offset]);
        cpass.dispatch_workgroups(
            dispatch::thread_group_count(nthreads, THREAD_GROUP_WIDTH),
            1,
            1,
        );
    }

    pub fn destroy(self) {
        for buffer in [
            self.dot_products,
            self.indices,
            self.uniform_buffer,
            self.depth_buffer,
            self.step_table,
        ] {
            buffer.buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn assert_sorted(depths: &[f32], order: &[u32]) {
        let live = depths.len();
        let mut seen: Vec<u32> = order[..live].to_vec();
        seen.sort_unstable();
        assert_eq!(seen, (0..live as u32).collect::<Vec<_>>(), "not a permutation");
        for pair in order[..live].windows(2) {
            assert!(
                depths[pair[0] as usize] >= depths[pair[1] as usize],
                "{:?} out of order",
                pair
            );
        }
        assert!(order[live..].iter().all(|&i| i as usize >= live));
    }

    #[test]
    fn schedule_matches_the_network_shape() {
        let passes: Vec<_> = schedule(8).collect();
        assert_eq!(passes.len() as u32, round_count(8));
        let widths: Vec<_> = passes
            .iter()
            .map(|p| (p.block_width, p.max_block_width))
            .collect();
        assert_eq!(
            widths,
            vec![(2, 2), (4, 4), (2, 4), (8, 8), (4, 8), (2, 8)]
        );
        assert_eq!(schedule(1).count(), 0);
        assert_eq!(round_count(1 << 19), 190);
    }

    #[test]
    fn shorter_schedules_are_prefixes() {
        let long: Vec<_> = schedule(1024).collect();
        for n in [2u32, 4, 64, 512] {
            let short: Vec<_> = schedule(n).collect();
            assert_eq!(short[..], long[..short.len()]);
        }
    }

    #[test]
    fn random_depths_of_every_power_of_two() {
        let mut rng = SmallRng::seed_from_u64(17);
        let mut n = 2;
        while n <= 1024 {
            let depths: Vec<f32> = (0..n).map(|_| rng.gen_range(-500.0..500.0)).collect();
            assert_sorted(&depths, &sort_by_depth(&depths));
            n *= 2;
        }
    }

    #[test]
    fn counts_between_powers_of_two_are_padded() {
        let mut rng = SmallRng::seed_from_u64(5);
        for live in [1usize, 3, 5, 7, 63, 65, 100, 255, 257, 1000, 1023] {
            let depths: Vec<f32> = (0..live).map(|_| rng.gen_range(0.0..2000.0)).collect();
            let order = sort_by_depth(&depths);
            assert_eq!(order.len(), live.next_power_of_two());
            assert_sorted(&depths, &order);
        }
    }

    #[test]
    fn duplicates_and_extremes() {
        let depths = [3.0, 1.0, 3.0, 3.0, -1.0, 1.0, f32::MAX, 0.0, 3.0];
        assert_sorted(&depths, &sort_by_depth(&depths));

        let equal = vec![42.0; 37];
        assert_sorted(&equal, &sort_by_depth(&equal));

        // Particles behind the camera have negative depth, still above the
        // sentinel.
        let behind: Vec<f32> = (0..20).map(|i| -(i as f32) * 1e30).collect();
        assert_sorted(&behind, &sort_by_depth(&behind));
    }

    #[test]
    fn sentinels_only_move_among_themselves() {
        let depths = [5.0, 9.0, 1.0];
        let order = sort_by_depth(&depths);
        assert_eq!(order[..3], [1, 0, 2]);
        assert_eq!(order[3], 3);
    }
}
