use crate::buffer_util::{self, SizedBuffer};
use crate::error::{self, SetupError};
use crate::indirect::{self, IndirectArgsBuffer};
use crate::layout::ParticleLayout;
use crate::params::{BoundingVolume, ColorMode, DebugParams, RenderMode, RenderingParams};
use crate::particle_store::ParticleStore;
use crate::shader_utils::Kernel;

// This should match the struct defined in shaders/render_particles.wgsl.
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct RenderUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub birth_color: [f32; 4],
    pub death_color: [f32; 4],
    pub min_size: f32,
    pub max_size: f32,
    pub stretch_factor: f32,
    pub fade_coefficient: f32,
    pub color_mode: u32,
    pub _padding: u32,
    pub viewport: [f32; 2],
}

impl Default for RenderUniforms {
    fn default() -> Self {
        RenderUniforms::new(
            &RenderingParams::default(),
            cgmath::Matrix4::from_scale(1.0),
            cgmath::Matrix4::from_scale(1.0),
            [1.0, 1.0],
        )
    }
}

impl RenderUniforms {
    pub fn new(
        params: &RenderingParams,
        view: cgmath::Matrix4<f32>,
        projection: cgmath::Matrix4<f32>,
        viewport: [f32; 2],
    ) -> Self {
        RenderUniforms {
            view: view.into(),
            projection: projection.into(),
            birth_color: params.birth_gradient,
            death_color: params.death_gradient,
            min_size: params.min_size,
            max_size: params.max_size,
            stretch_factor: params.stretched_factor,
            fade_coefficient: params.fading_factor,
            color_mode: match params.color_mode {
                ColorMode::Flat => 0,
                ColorMode::Gradient => 1,
            },
            _padding: 0,
            viewport,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct LineVertex {
    pub position: [f32; 4],
    pub color: [f32; 4],
}

const GRID_COLOR: [f32; 4] = [0.5, 0.5, 0.5, 0.35];
const VOLUME_COLOR: [f32; 4] = [0.3, 0.6, 1.0, 0.5];
const GRID_DIVISIONS: u32 = 16;
const CIRCLE_SEGMENTS: u32 = 64;
const MAX_LINE_VERTICES: usize = 1024;

fn line(a: [f32; 3], b: [f32; 3], color: [f32; 4]) -> [LineVertex; 2] {
    [
        LineVertex {
            position: [a[0], a[1], a[2], 1.0],
            color,
        },
        LineVertex {
            position: [b[0], b[1], b[2], 1.0],
            color,
        },
    ]
}

/// Square grid on the XZ plane, centered on the origin.
pub fn grid_lines(size: f32, divisions: u32) -> Vec<LineVertex> {
    let half = size / 2.0;
    (0..=divisions)
        .flat_map(|i| {
            let t = -half + size * i as f32 / divisions as f32;
            let along_x = line([-half, 0.0, t], [half, 0.0, t], GRID_COLOR);
            let along_z = line([t, 0.0, -half], [t, 0.0, half], GRID_COLOR);
            along_x.into_iter().chain(along_z)
        })
        .collect()
}

/// Outline of the bounding volume, empty when there is none.
pub fn volume_lines(volume: BoundingVolume, size: f32) -> Vec<LineVertex> {
    let h = size / 2.0;
    match volume {
        BoundingVolume::Box => {
            let corner = |i: u32| {
                [
                    if i & 1 == 0 { -h } else { h },
                    if i & 2 == 0 { -h } else { h },
                    if i & 4 == 0 { -h } else { h },
                ]
            };
            // Corners differing in exactly one bit share an edge.
            (0..8u32)
                .flat_map(|a| [1u32, 2, 4].into_iter().map(move |bit| (a, a | bit)))
                .filter(|(a, b)| a != b)
                .flat_map(|(a, b)| line(corner(a), corner(b), VOLUME_COLOR))
                .collect()
        }
        BoundingVolume::Sphere => {
            let point = |axis: usize, angle: f32| {
                let (s, c) = angle.sin_cos();
                match axis {
                    0 => [0.0, h * c, h * s],
                    1 => [h * c, 0.0, h * s],
                    _ => [h * c, h * s, 0.0],
                }
            };
            let step = std::f32::consts::TAU / CIRCLE_SEGMENTS as f32;
            (0..3)
                .flat_map(|axis| {
                    (0..CIRCLE_SEGMENTS).flat_map(move |i| {
                        line(
                            point(axis, i as f32 * step),
                            point(axis, (i + 1) as f32 * step),
                            VOLUME_COLOR,
                        )
                    })
                })
                .collect()
        }
        BoundingVolume::None => Vec::new(),
    }
}

/// Where and how a frame is drawn.
pub struct FrameView<'a> {
    pub view: cgmath::Matrix4<f32>,
    pub projection: cgmath::Matrix4<f32>,
    pub viewport: [f32; 2],
    pub rendering: &'a RenderingParams,
    pub debug: &'a DebugParams,
    pub bounding_volume: (BoundingVolume, f32),
}

fn stage(
    belt: &mut wgpu::util::StagingBelt,
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    target: &wgpu::Buffer,
    bytes: &[u8],
) {
    if let Some(size) = wgpu::BufferSize::new(bytes.len() as wgpu::BufferAddress) {
        belt.write_buffer(encoder, target, 0, size, device)
            .copy_from_slice(bytes);
    }
}

pub struct ParticleRenderer {
    uniform_buffer: SizedBuffer,
    bind_group: wgpu::BindGroup,
    point_sprite_pipeline: wgpu::RenderPipeline,
    stretched_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    line_buffer: SizedBuffer,
    staging_belt: wgpu::util::StagingBelt,
}

const ADDITIVE: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

const LINE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x4, 1 => Float32x4];

impl ParticleRenderer {
    pub fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        layout: ParticleLayout,
    ) -> Result<Self, SetupError> {
        let uniform_buffer = buffer_util::make_default_uniform_buffer::<RenderUniforms>(
            device,
            "Render uniforms",
        );
        let line_size = (MAX_LINE_VERTICES * std::mem::size_of::<LineVertex>()) as wgpu::BufferAddress;
        let line_buffer = error::checked_allocation(device, "Debug lines", || SizedBuffer {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Debug lines"),
                size: line_size,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size: line_size,
        })?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render layout"),
            entries: &[buffer_util::uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                uniform_buffer.size,
            )],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Render bind group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.buffer.as_entire_binding(),
            }],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let particle_module = Kernel::RenderParticles.module(device, layout)?;
        let particle_buffers = layout.vertex_buffer_layouts();
        let make_particle_pipeline = |entry_point: &'static str| {
            error::checked_pipeline(device, Kernel::RenderParticles.label(), || {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(entry_point),
                    layout: Some(&pipeline_layout),
                    vertex: wgpu::VertexState {
                        module: &particle_module,
                        entry_point,
                        buffers: &particle_buffers,
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &particle_module,
                        entry_point: "fs_main",
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: Some(ADDITIVE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleStrip,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                })
            })
        };
        let point_sprite_pipeline = make_particle_pipeline("vs_point_sprite")?;
        let stretched_pipeline = make_particle_pipeline("vs_stretched")?;

        let line_module = Kernel::DebugLines.module(device, layout)?;
        let line_pipeline = error::checked_pipeline(device, Kernel::DebugLines.label(), || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Debug lines"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &line_module,
                    entry_point: "vs_main",
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &LINE_ATTRIBUTES,
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &line_module,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::LineList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })?;

        Ok(ParticleRenderer {
            uniform_buffer,
            bind_group,
            point_sprite_pipeline,
            stretched_pipeline,
            line_pipeline,
            line_buffer,
            staging_belt: wgpu::util::StagingBelt::new(0x1000),
        })
    }

    /// Draws the debug lines and then every live particle of buffer A, with
    /// the instance count the GPU left in the indirect args.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        store: &ParticleStore,
        args: &IndirectArgsBuffer,
        frame: &FrameView,
    ) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle render"),
        });

        let uniforms =
            RenderUniforms::new(frame.rendering, frame.view, frame.projection, frame.viewport);
        stage(
            &mut self.staging_belt,
            device,
            &mut encoder,
            &self.uniform_buffer.buffer,
            bytemuck::bytes_of(&uniforms),
        );

        let mut lines = Vec::new();
        if frame.debug.show_grid {
            lines.extend(grid_lines(frame.bounding_volume.1, GRID_DIVISIONS));
        }
        if frame.debug.show_simulation_volume {
            lines.extend(volume_lines(frame.bounding_volume.0, frame.bounding_volume.1));
        }
        lines.truncate(MAX_LINE_VERTICES);
        stage(
            &mut self.staging_belt,
            device,
            &mut encoder,
            &self.line_buffer.buffer,
            bytemuck::cast_slice(&lines),
        );
        self.staging_belt.finish();

        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particles"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.04,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rpass.set_bind_group(0, &self.bind_group, &[]);

            if !lines.is_empty() {
                rpass.set_pipeline(&self.line_pipeline);
                rpass.set_vertex_buffer(0, self.line_buffer.buffer.slice(..));
                rpass.draw(0..lines.len() as u32, 0..1);
            }

            rpass.set_pipeline(match frame.rendering.render_mode {
                RenderMode::PointSprite => &self.point_sprite_pipeline,
                RenderMode::Stretched => &self.stretched_pipeline,
            });
            store.set_vertex_buffers(&mut rpass);
            rpass.draw_indirect(args.buffer(), indirect::DRAW_OFFSET);
        }

        queue.submit(Some(encoder.finish()));
        self.staging_belt.recall();
    }

    pub fn destroy(self) {
        self.uniform_buffer.buffer.destroy();
        self.line_buffer.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_match_the_shader_layout() {
        assert_eq!(std::mem::size_of::<RenderUniforms>(), 192);
        assert_eq!(std::mem::offset_of!(RenderUniforms, min_size), 160);
        assert_eq!(std::mem::offset_of!(RenderUniforms, viewport), 184);
    }

    #[test]
    fn color_mode_reaches_the_shader() {
        let mut params = RenderingParams::default();
        params.color_mode = ColorMode::Gradient;
        let identity = cgmath::Matrix4::from_scale(1.0);
        let uniforms = RenderUniforms::new(&params, identity, identity, [1280.0, 720.0]);
        assert_eq!(uniforms.color_mode, 1);
        assert_eq!(uniforms.viewport, [1280.0, 720.0]);
        assert_eq!(uniforms.birth_color, params.birth_gradient);
    }

    #[test]
    fn debug_geometry() {
        assert_eq!(grid_lines(256.0, 16).len(), 17 * 4);
        let cube = volume_lines(BoundingVolume::Box, 2.0);
        assert_eq!(cube.len(), 24);
        assert!(cube
            .iter()
            .all(|v| v.position[..3].iter().all(|c| c.abs() == 1.0)));
        let sphere = volume_lines(BoundingVolume::Sphere, 10.0);
        assert_eq!(sphere.len(), 3 * CIRCLE_SEGMENTS as usize * 2);
        for v in &sphere {
            let r = v.position[..3].iter().map(|c| c * c).sum::<f32>().sqrt();
            assert!((r - 5.0).abs() < 1e-4);
        }
        assert!(volume_lines(BoundingVolume::None, 10.0).is_empty());
        assert!(sphere.len() + grid_lines(1024.0, GRID_DIVISIONS).len() <= MAX_LINE_VERTICES);
    }
}
