//! GPU particle simulation: emission, simulation and depth sorting run as
//! compute kernels over append/consume buffers, and rendering draws straight
//! from the particle storage through indirect arguments.

pub mod buffer_util;
pub mod camera;
pub mod device;
pub mod dispatch;
pub mod emitter;
pub mod error;
pub mod frame_clock;
pub mod indirect;
pub mod input;
pub mod layout;
pub mod panels;
pub mod params;
pub mod particle_store;
pub mod particle_system;
pub mod random_source;
pub mod render;
pub mod shader_utils;
pub mod sort;
pub mod vector_field;
