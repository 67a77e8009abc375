//! Double buffered append/consume particle storage.
//!
//! Buffer A is the front: emission appends to it, the simulation consumes it
//! and appends the survivors to buffer B. Each buffer has its own atomic
//! counter holding how many particles were written into it this stage.

use serde::{Deserialize, Serialize};

use crate::buffer_util::{self, SizedBuffer};
use crate::error::{self, SetupError};
use crate::layout::ParticleLayout;

// This should match the struct defined in shaders/_particle_store.wgsl.
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Particle {
    pub position: [f32; 4],
    pub velocity: [f32; 4],
    /// Lifetime the particle was born with.
    pub start_age: f32,
    /// Time lived so far, the particle dies once it reaches `start_age`.
    pub age: f32,
    pub _padding: f32,
    pub id: u32,
}

impl Default for Particle {
    fn default() -> Self {
        Particle {
            position: [0.0, 0.0, 0.0, 1.0],
            velocity: [0.0; 4],
            start_age: 0.0,
            age: 0.0,
            _padding: 0.0,
            id: 0,
        }
    }
}

/// How survivors end up back in buffer A after a frame without sorting.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Compaction {
    /// Device copy of B into A.
    Copy,
    /// Exchange the roles of A and B. Saves the copy, but anything that kept a
    /// reference to the old front buffer sees last frame's attributes.
    Swap,
}

/// Two handles, one of which is the front. Swapping exchanges which one is the
/// front without touching the handles themselves.
#[derive(Debug)]
pub struct SwapPair<T> {
    items: [T; 2],
    front: usize,
}

impl<T> SwapPair<T> {
    pub fn new(front: T, back: T) -> Self {
        SwapPair {
            items: [front, back],
            front: 0,
        }
    }

    pub fn front(&self) -> &T {
        &self.items[self.front]
    }

    pub fn back(&self) -> &T {
        &self.items[self.front ^ 1]
    }

    pub fn front_index(&self) -> usize {
        self.front
    }

    pub fn get(&self, index: usize) -> &T {
        &self.items[index & 1]
    }

    pub fn swap(&mut self) {
        self.front ^= 1;
    }

    pub fn into_inner(self) -> [T; 2] {
        self.items
    }
}

/// Which particle buffer to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Front,
    Back,
}

pub struct ParticleStore {
    layout: ParticleLayout,
    compaction: Compaction,
    capacity: u32,
    storage: SwapPair<SizedBuffer>,
    counters: SwapPair<SizedBuffer>,
    live_count_readback: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    // Indexed by [storage front][counter front].
    bind_groups: [[wgpu::BindGroup; 2]; 2],
}

const COUNTER_SIZE: wgpu::BufferAddress = std::mem::size_of::<u32>() as wgpu::BufferAddress;

impl ParticleStore {
    /// Allocates both particle buffers and both counters, zero initialized.
    pub fn new(
        device: &wgpu::Device,
        capacity: u32,
        layout: ParticleLayout,
        compaction: Compaction,
    ) -> Result<Self, SetupError> {
        if capacity == 0 {
            return Err(SetupError::Config("particle capacity is zero".to_string()));
        }
        let size = capacity as wgpu::BufferAddress * layout.particle_stride();
        error::check_buffer_size(device, "Particle storage", size, true)?;
        log::info!(
            "Particle store: {} particles, {:?}, {} bytes per buffer",
            capacity,
            layout,
            size
        );

        let (storage, counters, live_count_readback) =
            error::checked_allocation(device, "Particle storage", || {
                // Storage doubles as the vertex input of the renderer.
                let storage = SwapPair::new(
                    buffer_util::make_storage_buffer(
                        device,
                        "Particle storage A",
                        size,
                        wgpu::BufferUsages::VERTEX,
                    ),
                    buffer_util::make_storage_buffer(
                        device,
                        "Particle storage B",
                        size,
                        wgpu::BufferUsages::VERTEX,
                    ),
                );
                let counters = SwapPair::new(
                    buffer_util::make_storage_buffer(
                        device,
                        "Particle counter A",
                        COUNTER_SIZE,
                        wgpu::BufferUsages::empty(),
                    ),
                    buffer_util::make_storage_buffer(
                        device,
                        "Particle counter B",
                        COUNTER_SIZE,
                        wgpu::BufferUsages::empty(),
                    ),
                );
                let readback =
                    buffer_util::make_readback_buffer(device, "Live count readback", COUNTER_SIZE);
                (storage, counters, readback)
            })?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle store layout"),
            entries: &layout.store_layout_entries(),
        });

        let make_bind_group = |storage_front: usize, counter_front: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Particle store bind group"),
                layout: &bind_group_layout,
                entries: &layout.store_bind_entries(
                    capacity,
                    &storage.get(storage_front).buffer,
                    &storage.get(storage_front ^ 1).buffer,
                    &counters.get(counter_front).buffer,
                    &counters.get(counter_front ^ 1).buffer,
                ),
            })
        };
        let bind_groups = [
            [make_bind_group(0, 0), make_bind_group(0, 1)],
            [make_bind_group(1, 0), make_bind_group(1, 1)],
        ];

        Ok(ParticleStore {
            layout,
            compaction,
            capacity,
            storage,
            counters,
            live_count_readback,
            bind_group_layout,
            bind_groups,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn layout(&self) -> ParticleLayout {
        self.layout
    }

    pub fn compaction(&self) -> Compaction {
        self.compaction
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    /// Binds both particle buffers and both counters in their current roles.
    /// The binding only lives as long as the pass, so nothing leaks into
    /// passes that do not touch particles.
    pub fn bind<'a>(&'a self, pass: &mut wgpu::ComputePass<'a>, index: u32) {
        let group =
            &self.bind_groups[self.storage.front_index()][self.counters.front_index()];
        pass.set_bind_group(index, group, &[]);
    }

    pub fn front_buffer(&self) -> &wgpu::Buffer {
        &self.storage.front().buffer
    }

    pub fn counter(&self, side: Side) -> &wgpu::Buffer {
        match side {
            Side::Front => &self.counters.front().buffer,
            Side::Back => &self.counters.back().buffer,
        }
    }

    /// Exchanges which counter is A. No data moves.
    pub fn swap_counters(&mut self) {
        self.counters.swap();
    }

    /// Brings the survivors written to B back into A.
    pub fn swap_storage(&mut self, encoder: &mut wgpu::CommandEncoder) {
        match self.compaction {
            Compaction::Copy => encoder.copy_buffer_to_buffer(
                &self.storage.back().buffer,
                0,
                &self.storage.front().buffer,
                0,
                self.storage.front().size,
            ),
            Compaction::Swap => self.storage.swap(),
        }
    }

    /// Zeroes counter A once its particles have been consumed, so it can take
    /// appends again after the counters swap.
    pub fn reset_consumed_counter(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.counters.front().buffer, 0, None);
    }

    /// Copies counter A into `destination` at `offset`.
    pub fn copy_live_count(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        destination: &wgpu::Buffer,
        offset: wgpu::BufferAddress,
    ) {
        encoder.copy_buffer_to_buffer(
            &self.counters.front().buffer,
            0,
            destination,
            offset,
            COUNTER_SIZE,
        );
    }

    /// Reads counter B back to the host. Blocks until the GPU is done with
    /// everything submitted so far: call it once per frame at most.
    pub fn read_live_count(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> u32 {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Live count readback"),
        });
        encoder.copy_buffer_to_buffer(
            &self.counters.back().buffer,
            0,
            &self.live_count_readback,
            0,
            COUNTER_SIZE,
        );
        queue.submit(Some(encoder.finish()));
        match buffer_util::map_read(device, &self.live_count_readback, COUNTER_SIZE) {
            Ok(bytes) => bytemuck::pod_read_unaligned::<u32>(&bytes).min(self.capacity),
            Err(e) => {
                log::error!("Failed to map the live particle counter: {:?}", e);
                0
            }
        }
    }

    /// Reads the counter of one side without touching the frame state.
    pub fn read_counter(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        side: Side,
    ) -> Result<u32, wgpu::BufferAsyncError> {
        let bytes = buffer_util::read_buffer(device, queue, self.counter(side), 0, COUNTER_SIZE)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    /// Replaces the content of buffer A with `particles` and sets counter A to
    /// their count.
    pub fn seed(&self, queue: &wgpu::Queue, particles: &[Particle]) -> Result<(), SetupError> {
        if particles.len() > self.capacity as usize {
            return Err(SetupError::Config(format!(
                "cannot seed {} particles into a store of {}",
                particles.len(),
                self.capacity
            )));
        }
        let ranges = self.layout.attribute_ranges(self.capacity);
        for (plane, range) in self.layout.pack(particles).iter().zip(ranges) {
            if !plane.is_empty() {
                queue.write_buffer(&self.storage.front().buffer, range.start, plane);
            }
        }
        queue.write_buffer(
            &self.counters.front().buffer,
            0,
            bytemuck::bytes_of(&(particles.len() as u32)),
        );
        Ok(())
    }

    /// Reads the first `count` particles of one side.
    pub fn read_particles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        side: Side,
        count: u32,
    ) -> Result<Vec<Particle>, wgpu::BufferAsyncError> {
        let buffer = match side {
            Side::Front => &self.storage.front().buffer,
            Side::Back => &self.storage.back().buffer,
        };
        let count = count.min(self.capacity) as wgpu::BufferAddress;
        let plane_stride = self.layout.particle_stride() / self.layout.planes_per_buffer() as u64;
        let planes = self
            .layout
            .attribute_ranges(self.capacity)
            .into_iter()
            .map(|range| buffer_util::read_buffer(device, queue, buffer, range.start, count * plane_stride))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.layout.unpack(&planes))
    }

    /// Binds buffer A as the instance-rate vertex input of a render pass.
    pub fn set_vertex_buffers<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>) {
        let buffer = &self.storage.front().buffer;
        for (slot, range) in self
            .layout
            .attribute_ranges(self.capacity)
            .into_iter()
            .enumerate()
        {
            pass.set_vertex_buffer(slot as u32, buffer.slice(range));
        }
    }

    /// Releases the GPU memory right away instead of waiting for the drop.
    pub fn destroy(self) {
        for buffer in self
            .storage
            .into_inner()
            .into_iter()
            .chain(self.counters.into_inner())
        {
            buffer.buffer.destroy();
        }
        self.live_count_readback.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_is_three_blocks() {
        assert_eq!(std::mem::size_of::<Particle>(), 48);
        assert_eq!(
            std::mem::size_of::<Particle>() as u64,
            ParticleLayout::ArrayOfStructures.particle_stride()
        );
    }

    #[test]
    fn swap_exchanges_identity_only() {
        let mut counters = SwapPair::new("counter 0", "counter 1");
        let written_by_simulation = *counters.back();
        counters.swap();
        // What the simulation wrote is now the front, without copying.
        assert_eq!(*counters.front(), written_by_simulation);
        assert_eq!(*counters.back(), "counter 0");
        counters.swap();
        assert_eq!(*counters.front(), "counter 0");
        assert_eq!(counters.front_index(), 0);
    }

    #[test]
    fn get_wraps_the_index() {
        let pair = SwapPair::new(10, 20);
        assert_eq!(*pair.get(0), 10);
        assert_eq!(*pair.get(1), 20);
        assert_eq!(*pair.get(2), 10);
    }
}
