use std::borrow::Cow;

use crate::error::{self, SetupError};
use crate::layout::ParticleLayout;

// Include a rendered shader by specifying the layout directory and a path
// relative to the shader source directory.
#[macro_export]
macro_rules! include_shader {
    ($layout:literal, $path:literal) => {
        include_str!(concat!(env!("OUT_DIR"), "/shaders/", $layout, "/", $path))
    };
}

/// Every shader the crate builds, compute kernels and render stages alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Emission,
    UpdateArgs,
    Simulation,
    FillIndices,
    CalculateDepth,
    SortStep,
    SortFinal,
    RenderParticles,
    DebugLines,
}

impl Kernel {
    pub const ALL: [Kernel; 9] = [
        Kernel::Emission,
        Kernel::UpdateArgs,
        Kernel::Simulation,
        Kernel::FillIndices,
        Kernel::CalculateDepth,
        Kernel::SortStep,
        Kernel::SortFinal,
        Kernel::RenderParticles,
        Kernel::DebugLines,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kernel::Emission => "Emission",
            Kernel::UpdateArgs => "Update indirect args",
            Kernel::Simulation => "Simulation",
            Kernel::FillIndices => "Sort fill indices",
            Kernel::CalculateDepth => "Sort depth",
            Kernel::SortStep => "Sort step",
            Kernel::SortFinal => "Sort final",
            Kernel::RenderParticles => "Render particles",
            Kernel::DebugLines => "Debug lines",
        }
    }

    /// WGSL rendered for `layout`.
    pub fn source(self, layout: ParticleLayout) -> &'static str {
        macro_rules! by_layout {
            ($file:literal) => {
                match layout {
                    ParticleLayout::ArrayOfStructures => crate::include_shader!("aos", $file),
                    ParticleLayout::StructureOfArrays => crate::include_shader!("soa", $file),
                }
            };
        }
        match self {
            Kernel::Emission => by_layout!("emission.wgsl"),
            Kernel::UpdateArgs => by_layout!("update_args.wgsl"),
            Kernel::Simulation => by_layout!("simulation.wgsl"),
            Kernel::FillIndices => by_layout!("fill_indices.wgsl"),
            Kernel::CalculateDepth => by_layout!("calculate_dp.wgsl"),
            Kernel::SortStep => by_layout!("sort_step.wgsl"),
            Kernel::SortFinal => by_layout!("sort_final.wgsl"),
            Kernel::RenderParticles => by_layout!("render_particles.wgsl"),
            Kernel::DebugLines => by_layout!("debug_lines.wgsl"),
        }
    }

    pub fn module(
        self,
        device: &wgpu::Device,
        layout: ParticleLayout,
    ) -> Result<wgpu::ShaderModule, SetupError> {
        error::checked_pipeline(device, self.label(), || {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(self.label()),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(self.source(layout))),
            })
        })
    }
}

/// Builds a compute pipeline over `bind_group_layouts` from the kernel's
/// `main` entry point.
pub fn compute_pipeline(
    device: &wgpu::Device,
    kernel: Kernel,
    layout: ParticleLayout,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
) -> Result<wgpu::ComputePipeline, SetupError> {
    let module = kernel.module(device, layout)?;
    error::checked_pipeline(device, kernel.label(), || {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(kernel.label()),
            bind_group_layouts,
            push_constant_ranges: &[],
        });
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.label()),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: "main",
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::THREAD_GROUP_WIDTH;

    const LAYOUTS: [ParticleLayout; 2] = [
        ParticleLayout::ArrayOfStructures,
        ParticleLayout::StructureOfArrays,
    ];

    #[test]
    fn group_width_matches_the_shaders() {
        let expected = format!("@workgroup_size({})", THREAD_GROUP_WIDTH);
        for layout in LAYOUTS {
            for kernel in Kernel::ALL {
                if matches!(
                    kernel,
                    Kernel::UpdateArgs | Kernel::RenderParticles | Kernel::DebugLines
                ) {
                    continue;
                }
                assert!(
                    kernel.source(layout).contains(&expected),
                    "{:?} ({:?}) is not built for {}",
                    kernel,
                    layout,
                    expected
                );
            }
        }
    }

    #[test]
    fn templates_are_fully_rendered() {
        for layout in LAYOUTS {
            for kernel in Kernel::ALL {
                let source = kernel.source(layout);
                assert!(!source.contains("{{"), "{:?}", kernel);
                assert!(!source.contains("{%"), "{:?}", kernel);
            }
        }
    }

    #[test]
    fn layouts_bind_particles_differently() {
        let aos = Kernel::Simulation.source(ParticleLayout::ArrayOfStructures);
        let soa = Kernel::Simulation.source(ParticleLayout::StructureOfArrays);
        assert!(aos.contains("particles_a"));
        assert!(!aos.contains("positions_a"));
        assert!(soa.contains("positions_a"));
        assert!(soa.contains("@binding(7)"));
    }
}
