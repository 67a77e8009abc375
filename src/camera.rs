use std::f32::consts::PI;

use cgmath::{InnerSpace, Matrix4, Point3, Vector3};

use crate::input::InputState;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

pub const FOV_DEGREES: f32 = 60.0;
pub const NEAR: f32 = 0.01;
pub const FAR: f32 = 2000.0;
pub const INITIAL_DISTANCE: f32 = 295.0;
pub const INITIAL_ELEVATION: f32 = 0.65;

// Keeps the eye off the poles, where `up` degenerates.
const THETA_EPSILON: f32 = 1e-3;
const MIN_RADIUS: f32 = 1.0;
const MAX_RADIUS: f32 = FAR / 2.0;

pub struct CameraMotion {
    /// Radians per pixel of mouse motion.
    pub angular_speed: f32,
    /// Fraction of the radius per pixel of mouse motion.
    pub linear_speed: f32,
    /// Fraction of the radius per wheel line.
    pub dolly_speed: f32,
}

impl Default for CameraMotion {
    fn default() -> CameraMotion {
        CameraMotion {
            angular_speed: 0.005,
            linear_speed: 0.002,
            dolly_speed: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub center: Point3<f32>,

    // Eye in spherical coordinates around the center, y up.
    pub phi: f32,    // Longitude, 0 on +z.
    pub theta: f32,  // Polar angle from +y.
    pub radius: f32, // Distance to the center.
}

impl Default for CameraState {
    fn default() -> CameraState {
        let (y, z) = (INITIAL_ELEVATION * INITIAL_DISTANCE, INITIAL_DISTANCE);
        let radius = (y * y + z * z).sqrt();
        CameraState {
            center: Point3::new(0.0, 0.0, 0.0),
            phi: 0.0,
            theta: (y / radius).acos(),
            radius,
        }
    }
}

impl CameraState {
    pub fn pos(&self) -> Point3<f32> {
        self.center
            + self.radius
                * Vector3::new(
                    self.theta.sin() * self.phi.sin(),
                    self.theta.cos(),
                    self.theta.sin() * self.phi.cos(),
                )
    }

    pub fn forward(&self) -> Vector3<f32> {
        (self.center - self.pos()).normalize()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.forward().cross(Vector3::unit_y()).normalize()
    }

    pub fn up(&self) -> Vector3<f32> {
        self.right().cross(self.forward())
    }

    pub fn update(&mut self, input_state: &InputState, motion_params: &CameraMotion) {
        let [dx, dy] = input_state.mouse_delta;
        if input_state.rotate {
            self.phi -= dx * motion_params.angular_speed;
            self.theta -= dy * motion_params.angular_speed;
        }
        if input_state.translate {
            let scale = self.radius * motion_params.linear_speed;
            self.center += (self.up() * dy - self.right() * dx) * scale;
        }
        if input_state.wheel_delta != 0.0 {
            self.radius *= 1.0 - input_state.wheel_delta * motion_params.dolly_speed;
        }
        self.phi %= 2.0 * PI;
        self.theta = self.theta.clamp(THETA_EPSILON, PI - THETA_EPSILON);
        self.radius = self.radius.clamp(MIN_RADIUS, MAX_RADIUS);
    }
}

/// Orbit camera around the simulation volume.
pub struct Camera {
    pub motion_params: CameraMotion,
    pub screen_size: (u32, u32),
    pub state: CameraState,
}

impl Camera {
    pub fn new(width: u32, height: u32) -> Camera {
        Camera {
            motion_params: CameraMotion::default(),
            screen_size: (width, height),
            state: CameraState::default(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.screen_size = (width.max(1), height.max(1));
    }

    pub fn aspect(&self) -> f32 {
        self.screen_size.0 as f32 / self.screen_size.1.max(1) as f32
    }

    pub fn viewport(&self) -> [f32; 2] {
        [self.screen_size.0 as f32, self.screen_size.1 as f32]
    }

    /// World to camera space, right handed, looking down -z.
    pub fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.state.pos(), self.state.center, Vector3::unit_y())
    }

    /// Camera to clip space, with wgpu's [0, 1] depth range.
    pub fn projection(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * cgmath::perspective(cgmath::Deg(FOV_DEGREES), self.aspect(), NEAR, FAR)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection() * self.view()
    }

    pub fn update_state(&mut self, input_state: &InputState) {
        self.state.update(input_state, &self.motion_params);
    }
}
