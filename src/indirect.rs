//! Dispatch and draw arguments the GPU computes for itself.

use crate::buffer_util::{self, SizedBuffer};
use crate::error::{self, SetupError};
use crate::layout::ParticleLayout;
use crate::particle_store::ParticleStore;
use crate::shader_utils::{self, Kernel};

/// Vertices of the quad drawn for every particle.
pub const QUAD_VERTEX_COUNT: u32 = 4;

/// Byte offset of the `dispatch_workgroups_indirect` arguments.
pub const DISPATCH_OFFSET: wgpu::BufferAddress = 0;
/// Byte offset of the `draw_indirect` arguments.
pub const DRAW_OFFSET: wgpu::BufferAddress = 12;
/// Byte offset of `draw_instance_count`, where the live count gets copied.
pub const INSTANCE_COUNT_OFFSET: wgpu::BufferAddress = 16;

// This should match the struct defined in shaders/update_args.wgsl.
#[derive(Copy, Clone, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct IndirectArgs {
    pub dispatch_x: u32,
    pub dispatch_y: u32,
    pub dispatch_z: u32,
    pub draw_count: u32,
    pub draw_instance_count: u32,
    pub draw_first: u32,
    pub reserved: u32,
}

impl Default for IndirectArgs {
    fn default() -> Self {
        IndirectArgs {
            dispatch_x: 1,
            dispatch_y: 1,
            dispatch_z: 1,
            draw_count: QUAD_VERTEX_COUNT,
            draw_instance_count: 0,
            draw_first: 0,
            reserved: 0,
        }
    }
}

impl IndirectArgs {
    /// What the device ends up holding once a frame with `live_count`
    /// particles is done, with `group_width` invocations per work group.
    pub fn for_live_count(live_count: u32, group_width: u32) -> Self {
        IndirectArgs {
            dispatch_x: crate::dispatch::thread_group_count(live_count, group_width),
            draw_instance_count: live_count,
            ..IndirectArgs::default()
        }
    }
}

const ARGS_SIZE: wgpu::BufferAddress = std::mem::size_of::<IndirectArgs>() as wgpu::BufferAddress;

pub struct IndirectArgsBuffer {
    buffer: SizedBuffer,
    bind_group: wgpu::BindGroup,
    update_pipeline: wgpu::ComputePipeline,
}

impl IndirectArgsBuffer {
    pub fn new(
        device: &wgpu::Device,
        layout: ParticleLayout,
        store: &ParticleStore,
    ) -> Result<Self, SetupError> {
        let buffer = error::checked_allocation(device, "Indirect args", || {
            buffer_util::make_storage_buffer(
                device,
                "Indirect args",
                ARGS_SIZE,
                wgpu::BufferUsages::INDIRECT,
            )
        })?;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Indirect args layout"),
            entries: &[buffer_util::storage_entry(0, false)],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Indirect args bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.buffer.as_entire_binding(),
            }],
        });
        let update_pipeline = shader_utils::compute_pipeline(
            device,
            Kernel::UpdateArgs,
            layout,
            &[store.bind_group_layout(), &bind_group_layout],
        )?;
        Ok(IndirectArgsBuffer {
            buffer,
            bind_group,
            update_pipeline,
        })
    }

    /// Writes the default record. The upload lands before the next submission.
    pub fn reset(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.buffer.buffer,
            0,
            bytemuck::bytes_of(&IndirectArgs::default()),
        );
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer.buffer
    }

    /// Sizes the next simulation dispatch from counter A.
    pub fn record_update<'a>(&'a self, pass: &mut wgpu::ComputePass<'a>, store: &'a ParticleStore) {
        pass.set_pipeline(&self.update_pipeline);
        store.bind(pass, 0);
        pass.set_bind_group(1, &self.bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }

    /// Copies the authoritative live count into the draw instance count.
    pub fn set_instance_count_from(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        store: &ParticleStore,
    ) {
        store.copy_live_count(encoder, &self.buffer.buffer, INSTANCE_COUNT_OFFSET);
    }

    pub fn read(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<IndirectArgs, wgpu::BufferAsyncError> {
        let bytes = buffer_util::read_buffer(device, queue, &self.buffer.buffer, 0, ARGS_SIZE)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }

    pub fn destroy(self) {
        self.buffer.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_offsets() {
        assert_eq!(ARGS_SIZE, 28);
        assert_eq!(
            std::mem::offset_of!(IndirectArgs, draw_count) as u64,
            DRAW_OFFSET
        );
        assert_eq!(
            std::mem::offset_of!(IndirectArgs, draw_instance_count) as u64,
            INSTANCE_COUNT_OFFSET
        );
        // Device copies need 4 byte alignment.
        assert_eq!(INSTANCE_COUNT_OFFSET % wgpu::COPY_BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn args_follow_the_live_count() {
        let args = IndirectArgs::for_live_count(12345, 512);
        assert_eq!(args.dispatch_x, 25);
        assert_eq!((args.dispatch_y, args.dispatch_z), (1, 1));
        assert_eq!(args.draw_instance_count, 12345);
        assert_eq!(args.draw_count, QUAD_VERTEX_COUNT);

        let empty = IndirectArgs::for_live_count(0, 256);
        assert_eq!(empty.dispatch_x, 0);
        assert_eq!(empty.draw_instance_count, 0);
    }
}
