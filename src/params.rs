use serde::{Deserialize, Serialize};

use crate::layout::ParticleLayout;
use crate::particle_store::Compaction;

// Ranges and steps used by the tuning panels.
pub const TIME_STEP_FACTOR_RANGE: (f32, f32) = (0.0, 10.0);
pub const AGE_RANGE: (f32, f32) = (0.01, 10.0);
pub const FORCE_FACTOR_RANGE: (f32, f32) = (0.0, 100.0);
pub const EMITTER_RADIUS_RANGE: (f32, f32) = (0.0, 256.0);
pub const BOUNDING_VOLUME_SIZE_RANGE: (f32, f32) = (1.0, 1024.0);
pub const CURLNOISE_SCALE_RANGE: (f32, f32) = (1.0, 1024.0);
pub const PARTICLE_SIZE_RANGE: (f32, f32) = (0.0, 100.0);
pub const STRETCHED_FACTOR_RANGE: (f32, f32) = (0.5, 500.0);
pub const FADING_FACTOR_RANGE: (f32, f32) = (0.01, 1.0);

/// Default edge length of the simulation volume.
pub const DEFAULT_SIMULATION_BOX_SIZE: f32 = 256.0;

fn clamp(value: &mut f32, range: (f32, f32)) {
    *value = value.clamp(range.0, range.1);
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmitterType {
    Point,
    Disk,
    Sphere,
    Ball,
}

impl EmitterType {
    pub const ALL: [EmitterType; 4] = [
        EmitterType::Point,
        EmitterType::Disk,
        EmitterType::Sphere,
        EmitterType::Ball,
    ];
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BoundingVolume {
    Sphere,
    Box,
    None,
}

impl BoundingVolume {
    pub const ALL: [BoundingVolume; 3] = [
        BoundingVolume::Sphere,
        BoundingVolume::Box,
        BoundingVolume::None,
    ];
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Stretched,
    PointSprite,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColorMode {
    Flat,
    Gradient,
}

// Tweakable at runtime from the simulation panel.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct SimulationParams {
    pub time_step_factor: f32,

    pub emitter_type: EmitterType,
    pub emitter_position: [f32; 3],
    pub emitter_direction: [f32; 3],
    pub emitter_radius: f32,
    pub min_age: f32,
    pub max_age: f32,

    pub bounding_volume: BoundingVolume,
    pub bounding_volume_size: f32,

    pub scattering_factor: f32,
    pub vectorfield_factor: f32,
    pub curlnoise_factor: f32,
    pub curlnoise_scale: f32,
    pub velocity_factor: f32,

    pub enable_scattering: bool,
    pub enable_vectorfield: bool,
    pub enable_curlnoise: bool,
    pub enable_velocity_control: bool,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            time_step_factor: 1.0,
            emitter_type: EmitterType::Point,
            emitter_position: [0.0, 0.0, 0.0],
            emitter_direction: [0.0, 32.0, 0.0],
            emitter_radius: 32.0,
            min_age: 5.0,
            max_age: 10.0,
            bounding_volume: BoundingVolume::Sphere,
            bounding_volume_size: DEFAULT_SIMULATION_BOX_SIZE,
            scattering_factor: 1.0,
            vectorfield_factor: 1.0,
            curlnoise_factor: 16.0,
            curlnoise_scale: 128.0,
            velocity_factor: 1.0,
            enable_scattering: true,
            enable_vectorfield: false,
            enable_curlnoise: true,
            enable_velocity_control: true,
        }
    }
}

impl SimulationParams {
    /// Brings every field back into its panel range. The age range keeps
    /// `min_age <= max_age`.
    pub fn clamp(&mut self) {
        clamp(&mut self.time_step_factor, TIME_STEP_FACTOR_RANGE);
        clamp(&mut self.emitter_radius, EMITTER_RADIUS_RANGE);
        clamp(&mut self.min_age, AGE_RANGE);
        clamp(&mut self.max_age, AGE_RANGE);
        if self.min_age > self.max_age {
            self.max_age = self.min_age;
        }
        clamp(&mut self.bounding_volume_size, BOUNDING_VOLUME_SIZE_RANGE);
        clamp(&mut self.scattering_factor, FORCE_FACTOR_RANGE);
        clamp(&mut self.vectorfield_factor, FORCE_FACTOR_RANGE);
        clamp(&mut self.curlnoise_factor, FORCE_FACTOR_RANGE);
        clamp(&mut self.velocity_factor, FORCE_FACTOR_RANGE);
        clamp(&mut self.curlnoise_scale, CURLNOISE_SCALE_RANGE);
    }
}

// Tweakable at runtime from the rendering panel.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RenderingParams {
    pub render_mode: RenderMode,
    pub color_mode: ColorMode,
    pub birth_gradient: [f32; 4],
    pub death_gradient: [f32; 4],
    pub min_size: f32,
    pub max_size: f32,
    pub stretched_factor: f32,
    pub fading_factor: f32,
}

impl Default for RenderingParams {
    fn default() -> Self {
        RenderingParams {
            render_mode: RenderMode::Stretched,
            color_mode: ColorMode::Flat,
            birth_gradient: [1.0, 0.75, 0.25, 1.0],
            death_gradient: [0.25, 0.1, 0.75, 1.0],
            min_size: 0.75,
            max_size: 12.0,
            stretched_factor: 10.0,
            fading_factor: 0.35,
        }
    }
}

impl RenderingParams {
    pub fn clamp(&mut self) {
        clamp(&mut self.min_size, PARTICLE_SIZE_RANGE);
        clamp(&mut self.max_size, PARTICLE_SIZE_RANGE);
        if self.min_size > self.max_size {
            self.max_size = self.min_size;
        }
        clamp(&mut self.stretched_factor, STRETCHED_FACTOR_RANGE);
        clamp(&mut self.fading_factor, FADING_FACTOR_RANGE);
        for channel in self
            .birth_gradient
            .iter_mut()
            .chain(self.death_gradient.iter_mut())
        {
            clamp(channel, (0.0, 1.0));
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct DebugParams {
    pub show_grid: bool,
    pub show_simulation_volume: bool,
    pub freeze: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VectorFieldConfig {
    pub enabled: bool,
    pub dimensions: [u32; 3],
    pub cache_path: String,
}

impl Default for VectorFieldConfig {
    fn default() -> Self {
        VectorFieldConfig {
            enabled: true,
            dimensions: [128, 128, 64],
            cache_path: "velocities.dat".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1280,
            height: 720,
            title: "sparkle".to_string(),
        }
    }
}

// Parameters that define the particle system. Everything outside of
// `simulation`, `rendering` and `debug` is fixed once the system is created.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SparkleConfig {
    pub capacity: u32,
    pub batch_emit_count: u32,
    pub layout: ParticleLayout,
    pub compaction: Compaction,
    pub enable_sorting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,

    pub vector_field: VectorFieldConfig,
    pub simulation: SimulationParams,
    pub rendering: RenderingParams,
    pub debug: DebugParams,
    pub window: WindowConfig,
}

impl Default for SparkleConfig {
    fn default() -> Self {
        SparkleConfig {
            capacity: 1 << 19,
            batch_emit_count: 256,
            layout: ParticleLayout::ArrayOfStructures,
            compaction: Compaction::Copy,
            enable_sorting: false,
            random_seed: None,
            vector_field: VectorFieldConfig::default(),
            simulation: SimulationParams::default(),
            rendering: RenderingParams::default(),
            debug: DebugParams::default(),
            window: WindowConfig::default(),
        }
    }
}

impl std::str::FromStr for SparkleConfig {
    type Err = toml::de::Error;
    fn from_str(serialized: &str) -> Result<Self, Self::Err> {
        let mut config: SparkleConfig = toml::from_str(serialized)?;
        config.simulation.clamp();
        config.rendering.clamp();
        Ok(config)
    }
}

pub fn read_config_from_file(path: &str) -> anyhow::Result<SparkleConfig> {
    let config = std::fs::read_to_string(path)?.parse()?;
    Ok(config)
}

pub fn get_config(path: &str) -> SparkleConfig {
    match read_config_from_file(path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to parse config file({}): {:?}", path, e);
            SparkleConfig::default()
        }
    }
}
