//! How particle records are laid out inside a storage buffer.
//!
//! The kernels only ever go through `load_a`/`store_a`/`load_b`/`store_b`
//! (see `shaders/_particle_store.wgsl`), so the simulation itself does not
//! care which layout is active. This module owns everything that does: the
//! storage bindings, the vertex attribute aliases and the host side packing
//! used for seeding and readback.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::buffer_util::{buffer_range, storage_entry};
use crate::particle_store::Particle;

/// Every attribute block is one `vec4<f32>`.
pub const ATTRIBUTE_BLOCK_SIZE: wgpu::BufferAddress = 16;

/// position, velocity, (start_age, age, padding, id)
pub const ATTRIBUTE_BLOCK_COUNT: u32 = 3;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ParticleLayout {
    /// One 48 byte record per particle, a single binding per buffer.
    #[serde(rename = "aos")]
    ArrayOfStructures,
    /// One plane per attribute block, one binding per plane.
    #[serde(rename = "soa")]
    StructureOfArrays,
}

const AOS_ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: ATTRIBUTE_BLOCK_SIZE,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 2 * ATTRIBUTE_BLOCK_SIZE,
        shader_location: 2,
    },
];

const SOA_POSITION: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x3,
    offset: 0,
    shader_location: 0,
}];
const SOA_VELOCITY: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x3,
    offset: 0,
    shader_location: 1,
}];
const SOA_AGES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x2,
    offset: 0,
    shader_location: 2,
}];

impl ParticleLayout {
    pub fn attribute_block_count(self) -> u32 {
        ATTRIBUTE_BLOCK_COUNT
    }

    /// Bytes taken by one particle, whatever the layout.
    pub fn particle_stride(self) -> wgpu::BufferAddress {
        self.attribute_block_count() as wgpu::BufferAddress * ATTRIBUTE_BLOCK_SIZE
    }

    /// Storage bindings needed for one particle buffer.
    pub fn planes_per_buffer(self) -> u32 {
        match self {
            ParticleLayout::ArrayOfStructures => 1,
            ParticleLayout::StructureOfArrays => self.attribute_block_count(),
        }
    }

    /// Storage bindings of the store bind group: both buffers plus both counters.
    pub fn store_binding_count(self) -> u32 {
        2 * self.planes_per_buffer() + 2
    }

    pub fn shader_dir(self) -> &'static str {
        match self {
            ParticleLayout::ArrayOfStructures => "aos",
            ParticleLayout::StructureOfArrays => "soa",
        }
    }

    /// Byte ranges of each binding inside a buffer holding `capacity` particles.
    pub fn attribute_ranges(self, capacity: u32) -> Vec<Range<wgpu::BufferAddress>> {
        let capacity = capacity as wgpu::BufferAddress;
        match self {
            ParticleLayout::ArrayOfStructures => vec![0..capacity * self.particle_stride()],
            ParticleLayout::StructureOfArrays => {
                let plane = capacity * ATTRIBUTE_BLOCK_SIZE;
                (0..self.attribute_block_count() as wgpu::BufferAddress)
                    .map(|i| i * plane..(i + 1) * plane)
                    .collect()
            }
        }
    }

    /// Layout entries for the store bind group: planes of A, planes of B, then
    /// counter A and counter B.
    pub fn store_layout_entries(self) -> Vec<wgpu::BindGroupLayoutEntry> {
        (0..self.store_binding_count())
            .map(|binding| storage_entry(binding, false))
            .collect()
    }

    pub fn store_bind_entries<'a>(
        self,
        capacity: u32,
        particles_a: &'a wgpu::Buffer,
        particles_b: &'a wgpu::Buffer,
        counter_a: &'a wgpu::Buffer,
        counter_b: &'a wgpu::Buffer,
    ) -> Vec<wgpu::BindGroupEntry<'a>> {
        let ranges = self.attribute_ranges(capacity);
        let planes = [particles_a, particles_b]
            .into_iter()
            .flat_map(|buffer| {
                ranges
                    .clone()
                    .into_iter()
                    .map(move |range| buffer_range(buffer, range.start, range.end - range.start))
            })
            .chain([counter_a.as_entire_binding(), counter_b.as_entire_binding()]);
        planes
            .enumerate()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource,
            })
            .collect()
    }

    /// Instance-rate vertex buffers aliasing the particle storage. Locations:
    /// 0 position, 1 velocity, 2 (start_age, age).
    pub fn vertex_buffer_layouts(self) -> Vec<wgpu::VertexBufferLayout<'static>> {
        match self {
            ParticleLayout::ArrayOfStructures => vec![wgpu::VertexBufferLayout {
                array_stride: self.particle_stride(),
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &AOS_ATTRIBUTES,
            }],
            ParticleLayout::StructureOfArrays => [&SOA_POSITION, &SOA_VELOCITY, &SOA_AGES]
                .into_iter()
                .map(|attributes| wgpu::VertexBufferLayout {
                    array_stride: ATTRIBUTE_BLOCK_SIZE,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: attributes.as_slice(),
                })
                .collect(),
        }
    }

    /// Splits particles into the byte planes matching `attribute_ranges`.
    pub fn pack(self, particles: &[Particle]) -> Vec<Vec<u8>> {
        match self {
            ParticleLayout::ArrayOfStructures => vec![bytemuck::cast_slice(particles).to_vec()],
            ParticleLayout::StructureOfArrays => {
                let positions: Vec<[f32; 4]> = particles.iter().map(|p| p.position).collect();
                let velocities: Vec<[f32; 4]> = particles.iter().map(|p| p.velocity).collect();
                let ages: Vec<[f32; 4]> = particles
                    .iter()
                    .map(|p| [p.start_age, p.age, p._padding, f32::from_bits(p.id)])
                    .collect();
                vec![
                    bytemuck::cast_slice(&positions).to_vec(),
                    bytemuck::cast_slice(&velocities).to_vec(),
                    bytemuck::cast_slice(&ages).to_vec(),
                ]
            }
        }
    }

    /// Inverse of `pack`. Every plane must hold the same number of particles.
    pub fn unpack(self, planes: &[Vec<u8>]) -> Vec<Particle> {
        match self {
            ParticleLayout::ArrayOfStructures => planes
                .first()
                .map(|plane| bytemuck::pod_collect_to_vec(plane.as_slice()))
                .unwrap_or_default(),
            ParticleLayout::StructureOfArrays => {
                let blocks: Vec<Vec<[f32; 4]>> = planes
                    .iter()
                    .map(|plane| bytemuck::pod_collect_to_vec(plane.as_slice()))
                    .collect();
                match blocks.as_slice() {
                    [positions, velocities, ages] => positions
                        .iter()
                        .zip(velocities)
                        .zip(ages)
                        .map(|((position, velocity), ages)| Particle {
                            position: *position,
                            velocity: *velocity,
                            start_age: ages[0],
                            age: ages[1],
                            _padding: ages[2],
                            id: ages[3].to_bits(),
                        })
                        .collect(),
                    _ => Vec::new(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aos_attributes_alias_particle_fields() {
        let stride = std::mem::size_of::<Particle>() as wgpu::BufferAddress;
        assert_eq!(stride, ParticleLayout::ArrayOfStructures.particle_stride());
        assert_eq!(
            AOS_ATTRIBUTES[1].offset,
            std::mem::offset_of!(Particle, velocity) as wgpu::BufferAddress
        );
        assert_eq!(
            AOS_ATTRIBUTES[2].offset,
            std::mem::offset_of!(Particle, start_age) as wgpu::BufferAddress
        );
    }

    #[test]
    fn soa_planes_are_contiguous_and_aligned() {
        let layout = ParticleLayout::StructureOfArrays;
        let ranges = layout.attribute_ranges(1024);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].start, 0);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        // Storage binding offsets have to respect the 256 byte alignment.
        assert!(ranges.iter().all(|range| range.start % 256 == 0));
        assert_eq!(
            ranges[2].end,
            1024 * ParticleLayout::StructureOfArrays.particle_stride()
        );
    }

    #[test]
    fn soa_keeps_the_id_bits() {
        let particles = [
            Particle {
                position: [1.0, 2.0, 3.0, 1.0],
                velocity: [0.5, 0.0, -0.5, 0.0],
                start_age: 4.0,
                age: 1.5,
                _padding: 0.0,
                id: 0xffff_fff0,
            },
            Particle {
                id: 7,
                ..Particle::default()
            },
        ];
        let layout = ParticleLayout::StructureOfArrays;
        let planes = layout.pack(&particles);
        assert_eq!(planes.len(), 3);
        assert!(planes.iter().all(|plane| plane.len() == 2 * 16));
        assert_eq!(layout.unpack(&planes), particles.to_vec());
    }

    #[test]
    fn aos_unpacks_whole_particles() {
        let particles = [
            Particle {
                position: [4.0, 5.0, 6.0, 1.0],
                age: 0.25,
                id: 42,
                ..Particle::default()
            },
            Particle {
                id: 43,
                ..Particle::default()
            },
        ];
        let layout = ParticleLayout::ArrayOfStructures;
        let planes = layout.pack(&particles);
        assert_eq!(planes.len(), 1);
        assert_eq!(planes[0].len(), 2 * std::mem::size_of::<Particle>());
        assert_eq!(layout.unpack(&planes), particles.to_vec());
    }

    #[test]
    fn binding_counts() {
        assert_eq!(ParticleLayout::ArrayOfStructures.store_binding_count(), 4);
        assert_eq!(ParticleLayout::StructureOfArrays.store_binding_count(), 8);
        assert_eq!(
            ParticleLayout::StructureOfArrays.store_layout_entries().len(),
            8
        );
    }
}
