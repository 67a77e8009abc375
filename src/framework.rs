use std::sync::Arc;

use sparkle::error::SetupError;
use sparkle::params::WindowConfig;
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

gflags::define! {
    --log_filter: &str = "warn,sparkle=info"
}
gflags::define! {
    -h, --help = false
}

// "Framework" for a windowed executable.
pub trait Example: 'static + Sized {
    type Settings;

    fn required_limits(
        settings: &Self::Settings,
        adapter: &wgpu::Limits,
    ) -> Result<wgpu::Limits, SetupError>;
    fn init(
        settings: Self::Settings,
        config: &wgpu::SurfaceConfiguration,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> anyhow::Result<Self>;
    fn resize(
        &mut self,
        config: &wgpu::SurfaceConfiguration,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    );
    fn handle_event(&mut self, event: &WindowEvent);
    fn render(&mut self, view: &wgpu::TextureView, device: &wgpu::Device, queue: &wgpu::Queue);
    fn destroy(self);
}

/// Parses the command line and starts logging. Must run before anything
/// reads a flag.
pub fn parse_flags() {
    gflags::parse();
    if HELP.flag {
        gflags::print_help_and_exit(0);
    }
    if let Err(e) = scrub_log::init_with_filter_string(LOG_FILTER.flag) {
        eprintln!("Failed to initialize logging: {:?}", e);
    }
}

async fn run_async<E: Example>(
    window_config: &WindowConfig,
    settings: E::Settings,
) -> anyhow::Result<()> {
    use winit::event_loop::{ControlFlow, EventLoop};

    let event_loop = EventLoop::new()?;
    log::info!("Initializing the window...");

    let window = Arc::new(
        winit::window::WindowBuilder::new()
            .with_title(window_config.title.as_str())
            .with_inner_size(winit::dpi::LogicalSize::new(
                window_config.width,
                window_config.height,
            ))
            .build(&event_loop)?,
    );
    let size = window.inner_size();

    let instance = wgpu::Instance::default();
    let surface = instance.create_surface(window.clone())?;
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: Some(&surface),
        })
        .await
        .ok_or(SetupError::NoAdapter)?;
    let limits = E::required_limits(&settings, &adapter.limits())?;
    let (device, queue) = sparkle::device::open_device(&adapter, limits).await?;

    let mut config = surface
        .get_default_config(&adapter, size.width.max(1), size.height.max(1))
        .ok_or_else(|| anyhow::anyhow!("surface is not supported by the adapter"))?;
    surface.configure(&device, &config);

    log::info!("Initializing the example...");
    let mut example = Some(E::init(settings, &config, &device, &queue)?);
    let mut last_frame_start = std::time::Instant::now();

    log::info!("Entering render loop...");
    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        let Some(app) = example.as_mut() else {
            return;
        };
        match event {
            Event::WindowEvent {
                event: WindowEvent::Resized(size),
                ..
            } => {
                log::info!("Resizing to {:?}", size);
                config.width = size.width.max(1);
                config.height = size.height.max(1);
                surface.configure(&device, &config);
                app.resize(&config, &device, &queue);
            }
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::KeyboardInput {
                    event:
                        KeyEvent {
                            physical_key: PhysicalKey::Code(KeyCode::Escape | KeyCode::KeyQ),
                            state: ElementState::Pressed,
                            ..
                        },
                    ..
                }
                | WindowEvent::CloseRequested => {
                    elwt.exit();
                }
                WindowEvent::RedrawRequested => {
                    let frame = match surface.get_current_texture() {
                        Ok(frame) => frame,
                        Err(e) => {
                            log::warn!("Dropped frame: {:?}", e);
                            surface.configure(&device, &config);
                            return;
                        }
                    };
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    let cpu_time_start = std::time::Instant::now();
                    app.render(&view, &device, &queue);
                    let cpu_time = cpu_time_start.elapsed();
                    let gpu_time_start = std::time::Instant::now();
                    device.poll(wgpu::Maintain::Wait);
                    let gpu_time = gpu_time_start.elapsed();
                    frame.present();
                    let frame_time = last_frame_start.elapsed();
                    last_frame_start = std::time::Instant::now();
                    log::info!(
                        "Frame time: {:?}, GPU time: {:?}, CPU time: {:?}",
                        frame_time,
                        gpu_time,
                        cpu_time
                    );
                }
                _ => {
                    app.handle_event(&event);
                }
            },
            Event::AboutToWait => window.request_redraw(),
            Event::LoopExiting => {
                if let Some(app) = example.take() {
                    log::info!("Releasing GPU resources...");
                    app.destroy();
                }
            }
            _ => (),
        }
    })?;
    Ok(())
}

pub fn run<E: Example>(window_config: &WindowConfig, settings: E::Settings) -> anyhow::Result<()> {
    futures::executor::block_on(run_async::<E>(window_config, settings))
}
