use rand::{distributions::Uniform, rngs::SmallRng, Rng, SeedableRng};

use crate::buffer_util::{self, SizedBuffer};
use crate::error::{self, SetupError};

/// Host side generator and scratch for the uploads.
pub struct HostRandoms {
    rng: SmallRng,
    distribution: Uniform<f32>,
    values: Vec<f32>,
}

impl HostRandoms {
    pub fn new(count: usize, min: f32, max: f32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        HostRandoms {
            rng,
            distribution: Uniform::new(min, max),
            values: vec![0.0; count],
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Draws `count` new values, capped at the capacity.
    pub fn fill(&mut self, count: usize) -> &[f32] {
        let count = count.min(self.values.len());
        let distribution = self.distribution;
        for value in self.values[..count].iter_mut() {
            *value = self.rng.sample(distribution);
        }
        &self.values[..count]
    }
}

/// Device buffer of uniform random floats, refilled from the host every frame.
/// Kernels index it with `3 * particle + k`.
pub struct RandomSource {
    host: HostRandoms,
    pub buffer: SizedBuffer,
}

impl RandomSource {
    pub const VALUES_PER_PARTICLE: u32 = 3;

    /// Values are drawn from `[min, max)`.
    pub fn new(
        device: &wgpu::Device,
        count: u32,
        min: f32,
        max: f32,
        seed: Option<u64>,
    ) -> Result<Self, SetupError> {
        let size = (count as wgpu::BufferAddress) * std::mem::size_of::<f32>() as wgpu::BufferAddress;
        error::check_buffer_size(device, "Random values", size, true)?;
        let buffer = error::checked_allocation(device, "Random values", || {
            buffer_util::make_storage_buffer(device, "Random values", size, wgpu::BufferUsages::empty())
        })?;
        Ok(RandomSource {
            host: HostRandoms::new(count as usize, min, max, seed),
            buffer,
        })
    }

    pub fn len(&self) -> u32 {
        self.host.capacity() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.host.capacity() == 0
    }

    /// Draws `count` fresh values (capped at the buffer length) and queues the
    /// upload, which lands before any later submission.
    pub fn regenerate(&mut self, queue: &wgpu::Queue, count: u32) {
        let values = self.host.fill(count as usize);
        if values.is_empty() {
            return;
        }
        queue.write_buffer(&self.buffer.buffer, 0, bytemuck::cast_slice(values));
    }

    pub fn destroy(self) {
        self.buffer.buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_stay_in_range() {
        let mut randoms = HostRandoms::new(10_000, 0.0, 1.0, Some(7));
        let values = randoms.fill(10_000);
        assert!(values.iter().all(|v| (0.0..1.0).contains(v)));
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        assert!((mean - 0.5).abs() < 0.05, "mean {}", mean);
    }

    #[test]
    fn fill_is_capped_and_refreshes() {
        let mut randoms = HostRandoms::new(16, -1.0, 1.0, Some(3));
        assert_eq!(randoms.fill(100).len(), 16);
        let first = randoms.fill(16).to_vec();
        let second = randoms.fill(16).to_vec();
        assert_ne!(first, second);
        assert!(second.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn seeded_generators_repeat() {
        let mut a = HostRandoms::new(64, 0.0, 1.0, Some(42));
        let mut b = HostRandoms::new(64, 0.0, 1.0, Some(42));
        assert_eq!(a.fill(64), b.fill(64));
    }
}
