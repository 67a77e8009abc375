mod framework;

use sparkle::camera::Camera;
use sparkle::error::SetupError;
use sparkle::frame_clock::FrameClock;
use sparkle::input::InputState;
use sparkle::panels::{PanelState, Tunables};
use sparkle::params::SparkleConfig;
use sparkle::particle_system::ParticleSystem;
use sparkle::render::{FrameView, ParticleRenderer};

gflags::define! {
    --config: &str = "sparkle_config.toml"
}

const TARGET_FPS: f64 = 60.0;

struct App {
    system: ParticleSystem,
    renderer: ParticleRenderer,
    camera: Camera,
    input: InputState,
    panels: PanelState,
    tunables: Tunables,
    clock: FrameClock,
}

impl App {
    // Pushes panel edits into the system and reads back what it accepted.
    fn apply_tunables(&mut self) {
        self.system.set_params(self.tunables.simulation);
        self.system.set_sorting(self.tunables.sorting);
        self.tunables.simulation = *self.system.params();
    }

    // Update pre-render cpu logic.
    fn update_state(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.input.pause {
            self.clock.toggle_pause();
        }
        if self.panels.handle_keys(&self.input.keys, &mut self.tunables) {
            self.apply_tunables();
        }
        self.camera.update_state(&self.input);
        self.input.end_frame();

        let dt = self.clock.tick(self.tunables.debug.freeze);
        if dt > 0.0 {
            self.system.update(device, queue, dt, self.camera.view());
        }
    }
}

impl framework::Example for App {
    type Settings = SparkleConfig;

    fn required_limits(
        settings: &SparkleConfig,
        adapter: &wgpu::Limits,
    ) -> Result<wgpu::Limits, SetupError> {
        sparkle::device::required_limits(adapter, settings.layout)
    }

    fn init(
        settings: SparkleConfig,
        config: &wgpu::SurfaceConfiguration,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> anyhow::Result<Self> {
        log::info!("Running!");
        let system = ParticleSystem::new(device, queue, &settings)?;
        let renderer = ParticleRenderer::new(device, config.format, settings.layout)?;
        let tunables = Tunables {
            simulation: *system.params(),
            rendering: settings.rendering,
            debug: settings.debug,
            sorting: system.is_sorting_enabled(),
        };
        Ok(App {
            system,
            renderer,
            camera: Camera::new(config.width, config.height),
            input: InputState::default(),
            panels: PanelState::default(),
            tunables,
            clock: FrameClock::new(TARGET_FPS),
        })
    }

    fn resize(
        &mut self,
        config: &wgpu::SurfaceConfiguration,
        _device: &wgpu::Device,
        _queue: &wgpu::Queue,
    ) {
        self.camera.resize(config.width, config.height);
    }

    fn handle_event(&mut self, event: &winit::event::WindowEvent) {
        self.input.handle_event(event);
    }

    fn render(&mut self, view: &wgpu::TextureView, device: &wgpu::Device, queue: &wgpu::Queue) {
        self.update_state(device, queue);
        let params = self.system.params();
        let frame = FrameView {
            view: self.camera.view(),
            projection: self.camera.projection(),
            viewport: self.camera.viewport(),
            rendering: &self.tunables.rendering,
            debug: &self.tunables.debug,
            bounding_volume: (params.bounding_volume, params.bounding_volume_size),
        };
        self.renderer.render(
            device,
            queue,
            view,
            self.system.store(),
            self.system.indirect_args(),
            &frame,
        );
    }

    fn destroy(self) {
        self.renderer.destroy();
        self.system.destroy();
    }
}

fn main() {
    framework::parse_flags();
    let config = sparkle::params::get_config(CONFIG.flag);
    let window = config.window.clone();
    if let Err(e) = framework::run::<App>(&window, config) {
        log::error!("Fatal: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn read_config() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/sparkle_config.toml");
        let serialized = std::fs::read_to_string(path).unwrap();
        let deserialized_config: SparkleConfig = serialized.parse().unwrap();
        println!("deserialized = {:?}", deserialized_config);
        assert_eq!(CONFIG.flag, "sparkle_config.toml");
    }
}
