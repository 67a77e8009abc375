//! Keyboard driven tuning panels for the simulation, rendering and debug
//! parameters.

use crate::input::Key;
use crate::params::{
    BoundingVolume, ColorMode, DebugParams, EmitterType, RenderMode, RenderingParams,
    SimulationParams,
};

/// Everything the panels can edit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tunables {
    pub simulation: SimulationParams,
    pub rendering: RenderingParams,
    pub debug: DebugParams,
    pub sorting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Simulation,
    Rendering,
    Debug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    TimeStepFactor,
    EmitterType,
    EmitterRadius,
    EmitterPositionX,
    EmitterPositionY,
    EmitterPositionZ,
    EmitterDirectionX,
    EmitterDirectionY,
    EmitterDirectionZ,
    MinAge,
    MaxAge,
    BoundingVolume,
    BoundingVolumeSize,
    EnableScattering,
    ScatteringFactor,
    EnableVectorfield,
    VectorfieldFactor,
    EnableCurlnoise,
    CurlnoiseFactor,
    CurlnoiseScale,
    EnableVelocityControl,
    VelocityFactor,

    RenderMode,
    ColorMode,
    BirthColorR,
    BirthColorG,
    BirthColorB,
    BirthColorA,
    DeathColorR,
    DeathColorG,
    DeathColorB,
    DeathColorA,
    MinSize,
    MaxSize,
    StretchedFactor,
    FadingFactor,

    ShowGrid,
    ShowSimulationVolume,
    Freeze,
    Sorting,
}

const SIMULATION_FIELDS: [Field; 22] = [
    Field::TimeStepFactor,
    Field::EmitterType,
    Field::EmitterRadius,
    Field::EmitterPositionX,
    Field::EmitterPositionY,
    Field::EmitterPositionZ,
    Field::EmitterDirectionX,
    Field::EmitterDirectionY,
    Field::EmitterDirectionZ,
    Field::MinAge,
    Field::MaxAge,
    Field::BoundingVolume,
    Field::BoundingVolumeSize,
    Field::EnableScattering,
    Field::ScatteringFactor,
    Field::EnableVectorfield,
    Field::VectorfieldFactor,
    Field::EnableCurlnoise,
    Field::CurlnoiseFactor,
    Field::CurlnoiseScale,
    Field::EnableVelocityControl,
    Field::VelocityFactor,
];

const RENDERING_FIELDS: [Field; 14] = [
    Field::RenderMode,
    Field::ColorMode,
    Field::BirthColorR,
    Field::BirthColorG,
    Field::BirthColorB,
    Field::BirthColorA,
    Field::DeathColorR,
    Field::DeathColorG,
    Field::DeathColorB,
    Field::DeathColorA,
    Field::MinSize,
    Field::MaxSize,
    Field::StretchedFactor,
    Field::FadingFactor,
];

const DEBUG_FIELDS: [Field; 4] = [
    Field::ShowGrid,
    Field::ShowSimulationVolume,
    Field::Freeze,
    Field::Sorting,
];

impl Panel {
    pub const ALL: [Panel; 3] = [Panel::Simulation, Panel::Rendering, Panel::Debug];

    pub fn title(self) -> &'static str {
        match self {
            Panel::Simulation => "Simulation",
            Panel::Rendering => "Rendering",
            Panel::Debug => "Debug",
        }
    }

    pub fn fields(self) -> &'static [Field] {
        match self {
            Panel::Simulation => &SIMULATION_FIELDS,
            Panel::Rendering => &RENDERING_FIELDS,
            Panel::Debug => &DEBUG_FIELDS,
        }
    }

    pub fn next(self) -> Panel {
        match self {
            Panel::Simulation => Panel::Rendering,
            Panel::Rendering => Panel::Debug,
            Panel::Debug => Panel::Simulation,
        }
    }
}

fn cycle<T: Copy + PartialEq>(all: &[T], current: T, forward: bool) -> T {
    let n = all.len();
    let i = all.iter().position(|&v| v == current).unwrap_or(0);
    all[if forward { (i + 1) % n } else { (i + n - 1) % n }]
}

const RENDER_MODES: [RenderMode; 2] = [RenderMode::Stretched, RenderMode::PointSprite];
const COLOR_MODES: [ColorMode; 2] = [ColorMode::Flat, ColorMode::Gradient];

impl Field {
    pub fn label(self) -> &'static str {
        match self {
            Field::TimeStepFactor => "Time step factor",
            Field::EmitterType => "Emitter type",
            Field::EmitterRadius => "Emitter radius",
            Field::EmitterPositionX => "Emitter position x",
            Field::EmitterPositionY => "Emitter position y",
            Field::EmitterPositionZ => "Emitter position z",
            Field::EmitterDirectionX => "Emitter direction x",
            Field::EmitterDirectionY => "Emitter direction y",
            Field::EmitterDirectionZ => "Emitter direction z",
            Field::MinAge => "Min age",
            Field::MaxAge => "Max age",
            Field::BoundingVolume => "Bounding volume",
            Field::BoundingVolumeSize => "Bounding volume size",
            Field::EnableScattering => "Scattering",
            Field::ScatteringFactor => "Scattering factor",
            Field::EnableVectorfield => "Vector field",
            Field::VectorfieldFactor => "Vector field factor",
            Field::EnableCurlnoise => "Curl noise",
            Field::CurlnoiseFactor => "Curl noise factor",
            Field::CurlnoiseScale => "Curl noise scale",
            Field::EnableVelocityControl => "Velocity control",
            Field::VelocityFactor => "Velocity factor",
            Field::RenderMode => "Render mode",
            Field::ColorMode => "Color mode",
            Field::BirthColorR => "Birth color r",
            Field::BirthColorG => "Birth color g",
            Field::BirthColorB => "Birth color b",
            Field::BirthColorA => "Birth color a",
            Field::DeathColorR => "Death color r",
            Field::DeathColorG => "Death color g",
            Field::DeathColorB => "Death color b",
            Field::DeathColorA => "Death color a",
            Field::MinSize => "Min size",
            Field::MaxSize => "Max size",
            Field::StretchedFactor => "Stretch factor",
            Field::FadingFactor => "Fading factor",
            Field::ShowGrid => "Show grid",
            Field::ShowSimulationVolume => "Show simulation volume",
            Field::Freeze => "Freeze",
            Field::Sorting => "Depth sorting",
        }
    }

    fn number<'a>(self, t: &'a mut Tunables) -> Option<(&'a mut f32, f32)> {
        let s = &mut t.simulation;
        let r = &mut t.rendering;
        Some(match self {
            Field::TimeStepFactor => (&mut s.time_step_factor, 0.1),
            Field::EmitterRadius => (&mut s.emitter_radius, 1.0),
            Field::EmitterPositionX => (&mut s.emitter_position[0], 1.0),
            Field::EmitterPositionY => (&mut s.emitter_position[1], 1.0),
            Field::EmitterPositionZ => (&mut s.emitter_position[2], 1.0),
            Field::EmitterDirectionX => (&mut s.emitter_direction[0], 1.0),
            Field::EmitterDirectionY => (&mut s.emitter_direction[1], 1.0),
            Field::EmitterDirectionZ => (&mut s.emitter_direction[2], 1.0),
            Field::MinAge => (&mut s.min_age, 0.1),
            Field::MaxAge => (&mut s.max_age, 0.1),
            Field::BoundingVolumeSize => (&mut s.bounding_volume_size, 8.0),
            Field::ScatteringFactor => (&mut s.scattering_factor, 0.5),
            Field::VectorfieldFactor => (&mut s.vectorfield_factor, 0.5),
            Field::CurlnoiseFactor => (&mut s.curlnoise_factor, 0.5),
            Field::CurlnoiseScale => (&mut s.curlnoise_scale, 8.0),
            Field::VelocityFactor => (&mut s.velocity_factor, 0.1),
            Field::BirthColorR => (&mut r.birth_gradient[0], 0.05),
            Field::BirthColorG => (&mut r.birth_gradient[1], 0.05),
            Field::BirthColorB => (&mut r.birth_gradient[2], 0.05),
            Field::BirthColorA => (&mut r.birth_gradient[3], 0.05),
            Field::DeathColorR => (&mut r.death_gradient[0], 0.05),
            Field::DeathColorG => (&mut r.death_gradient[1], 0.05),
            Field::DeathColorB => (&mut r.death_gradient[2], 0.05),
            Field::DeathColorA => (&mut r.death_gradient[3], 0.05),
            Field::MinSize => (&mut r.min_size, 0.25),
            Field::MaxSize => (&mut r.max_size, 0.25),
            Field::StretchedFactor => (&mut r.stretched_factor, 1.0),
            Field::FadingFactor => (&mut r.fading_factor, 0.01),
            _ => return None,
        })
    }

    fn flag<'a>(self, t: &'a mut Tunables) -> Option<&'a mut bool> {
        Some(match self {
            Field::EnableScattering => &mut t.simulation.enable_scattering,
            Field::EnableVectorfield => &mut t.simulation.enable_vectorfield,
            Field::EnableCurlnoise => &mut t.simulation.enable_curlnoise,
            Field::EnableVelocityControl => &mut t.simulation.enable_velocity_control,
            Field::ShowGrid => &mut t.debug.show_grid,
            Field::ShowSimulationVolume => &mut t.debug.show_simulation_volume,
            Field::Freeze => &mut t.debug.freeze,
            Field::Sorting => &mut t.sorting,
            _ => return None,
        })
    }

    /// Steps a number, flips a flag or cycles an enum.
    pub fn adjust(self, t: &mut Tunables, forward: bool) {
        if let Some((value, step)) = self.number(t) {
            *value += if forward { step } else { -step };
        } else if let Some(flag) = self.flag(t) {
            *flag = !*flag;
        } else {
            self.cycle(t, forward);
        }
        t.simulation.clamp();
        t.rendering.clamp();
    }

    /// Enter: flips a flag or cycles an enum, numbers are left alone.
    pub fn activate(self, t: &mut Tunables) {
        if self.number(t).is_none() {
            self.adjust(t, true);
        }
    }

    fn cycle(self, t: &mut Tunables, forward: bool) {
        match self {
            Field::EmitterType => {
                t.simulation.emitter_type =
                    cycle(&EmitterType::ALL, t.simulation.emitter_type, forward)
            }
            Field::BoundingVolume => {
                t.simulation.bounding_volume =
                    cycle(&BoundingVolume::ALL, t.simulation.bounding_volume, forward)
            }
            Field::RenderMode => {
                t.rendering.render_mode = cycle(&RENDER_MODES, t.rendering.render_mode, forward)
            }
            Field::ColorMode => {
                t.rendering.color_mode = cycle(&COLOR_MODES, t.rendering.color_mode, forward)
            }
            _ => {}
        }
    }

    pub fn value(self, t: &Tunables) -> String {
        let mut t = *t;
        if let Some((value, _)) = self.number(&mut t) {
            return format!("{:.2}", value);
        }
        if let Some(flag) = self.flag(&mut t) {
            return if *flag { "on" } else { "off" }.to_string();
        }
        match self {
            Field::EmitterType => format!("{:?}", t.simulation.emitter_type),
            Field::BoundingVolume => format!("{:?}", t.simulation.bounding_volume),
            Field::RenderMode => format!("{:?}", t.rendering.render_mode),
            Field::ColorMode => format!("{:?}", t.rendering.color_mode),
            _ => String::new(),
        }
    }
}

/// Which panel is open and which of its fields is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelState {
    panel: Panel,
    selected: usize,
}

impl Default for PanelState {
    fn default() -> Self {
        PanelState {
            panel: Panel::Simulation,
            selected: 0,
        }
    }
}

impl PanelState {
    pub fn panel(&self) -> Panel {
        self.panel
    }

    pub fn field(&self) -> Field {
        self.panel.fields()[self.selected]
    }

    /// Applies this frame's keys. Returns whether any value changed.
    pub fn handle_keys(&mut self, keys: &[Key], tunables: &mut Tunables) -> bool {
        let mut changed = false;
        for &key in keys {
            let count = self.panel.fields().len();
            match key {
                Key::Tab => {
                    self.panel = self.panel.next();
                    self.selected = 0;
                }
                Key::Up => self.selected = (self.selected + count - 1) % count,
                Key::Down => self.selected = (self.selected + 1) % count,
                Key::Left | Key::Right | Key::Enter => {
                    let before = *tunables;
                    match key {
                        Key::Enter => self.field().activate(tunables),
                        _ => self.field().adjust(tunables, key == Key::Right),
                    }
                    if *tunables != before {
                        changed = true;
                        log::info!(
                            "{} > {} = {}",
                            self.panel.title(),
                            self.field().label(),
                            self.field().value(tunables)
                        );
                    }
                    continue;
                }
            }
            log::info!(
                "{} > {} ({})",
                self.panel.title(),
                self.field().label(),
                self.field().value(tunables)
            );
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tunables() -> Tunables {
        Tunables {
            simulation: SimulationParams::default(),
            rendering: RenderingParams::default(),
            debug: DebugParams::default(),
            sorting: false,
        }
    }

    #[test]
    fn every_field_belongs_to_one_panel() {
        let total: usize = Panel::ALL.iter().map(|p| p.fields().len()).sum();
        assert_eq!(total, 40);
        let all: Vec<Field> = Panel::ALL.iter().flat_map(|p| p.fields()).copied().collect();
        for field in &all {
            assert_eq!(all.iter().filter(|&f| f == field).count(), 1, "{:?}", field);
        }
        assert!(Panel::Simulation.fields().contains(&Field::EmitterDirectionY));
        assert!(Panel::Rendering.fields().contains(&Field::DeathColorA));
        for panel in Panel::ALL {
            assert!(!panel.fields().is_empty());
            assert_eq!(Panel::ALL.iter().filter(|&&p| p.next() == panel).count(), 1);
        }
    }

    #[test]
    fn navigation_wraps() {
        let mut state = PanelState::default();
        let mut t = tunables();
        state.handle_keys(&[Key::Up], &mut t);
        assert_eq!(state.field(), Field::VelocityFactor);
        state.handle_keys(&[Key::Down, Key::Down], &mut t);
        assert_eq!(state.field(), Field::EmitterType);

        state.handle_keys(&[Key::Tab], &mut t);
        assert_eq!(state.panel(), Panel::Rendering);
        assert_eq!(state.field(), Field::RenderMode);
        state.handle_keys(&[Key::Tab, Key::Tab], &mut t);
        assert_eq!(state.panel(), Panel::Simulation);
        assert_eq!(t, tunables());
    }

    #[test]
    fn numbers_step_and_clamp() {
        let mut state = PanelState::default();
        let mut t = tunables();
        assert!(state.handle_keys(&[Key::Right, Key::Right], &mut t));
        assert!((t.simulation.time_step_factor - 1.2).abs() < 1e-5);

        t.simulation.time_step_factor = 10.0;
        assert!(!state.handle_keys(&[Key::Right], &mut t));
        assert_eq!(t.simulation.time_step_factor, 10.0);

        // Enter leaves numbers alone.
        assert!(!state.handle_keys(&[Key::Enter], &mut t));

        Field::EmitterPositionZ.adjust(&mut t, false);
        Field::EmitterDirectionY.adjust(&mut t, true);
        assert_eq!(t.simulation.emitter_position, [0.0, 0.0, -1.0]);
        assert_eq!(t.simulation.emitter_direction, [0.0, 33.0, 0.0]);

        // Color channels stay in [0, 1].
        t.rendering.birth_gradient[0] = 0.98;
        Field::BirthColorR.adjust(&mut t, true);
        assert_eq!(t.rendering.birth_gradient[0], 1.0);
        t.rendering.death_gradient[3] = 0.02;
        Field::DeathColorA.adjust(&mut t, false);
        assert_eq!(t.rendering.death_gradient[3], 0.0);
        assert_eq!(Field::DeathColorA.value(&t), "0.00");
    }

    #[test]
    fn max_age_cannot_drop_below_min_age() {
        let mut t = tunables();
        t.simulation.min_age = 5.0;
        t.simulation.max_age = 5.0;
        Field::MaxAge.adjust(&mut t, false);
        assert_eq!(t.simulation.max_age, 5.0);
    }

    #[test]
    fn enums_cycle_and_flags_toggle() {
        let mut state = PanelState::default();
        let mut t = tunables();
        state.handle_keys(&[Key::Down], &mut t);
        state.handle_keys(&[Key::Enter], &mut t);
        assert_eq!(t.simulation.emitter_type, EmitterType::Disk);
        state.handle_keys(&[Key::Left, Key::Left], &mut t);
        assert_eq!(t.simulation.emitter_type, EmitterType::Ball);

        let mut state = PanelState::default();
        state.handle_keys(&[Key::Tab, Key::Tab, Key::Up, Key::Enter], &mut t);
        assert_eq!(state.field(), Field::Sorting);
        assert!(t.sorting);
        state.handle_keys(&[Key::Up, Key::Right], &mut t);
        assert!(t.debug.freeze);
        assert_eq!(Field::Freeze.value(&t), "on");
    }
}
