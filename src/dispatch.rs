//! Work-size arithmetic shared by the compute stages.

/// Invocations per work group for every particle kernel. The shaders get the
/// same value through the `workgroup_size` template constant.
pub const THREAD_GROUP_WIDTH: u32 = 256;

/// Number of work groups needed to cover `nthreads` invocations.
pub fn thread_group_count(nthreads: u32, group_width: u32) -> u32 {
    (nthreads + group_width - 1) / group_width
}

/// Largest multiple of `group_width` not above `nparticles`. The simulated
/// capacity is always floored this way so full groups never overrun a buffer.
pub fn floor_particle_count(nparticles: u32, group_width: u32) -> u32 {
    group_width * (nparticles / group_width)
}

/// How many particles may be emitted this frame.
pub fn emit_count(batch_size: u32, capacity: u32, alive_estimate: u32) -> u32 {
    batch_size.min(capacity.saturating_sub(alive_estimate))
}

/// Padded length of the sort network for `live_count` particles.
pub fn sort_length(live_count: u32) -> u32 {
    live_count.max(1).next_power_of_two()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_count_rounds_up() {
        assert_eq!(thread_group_count(0, 512), 0);
        assert_eq!(thread_group_count(1, 512), 1);
        assert_eq!(thread_group_count(512, 512), 1);
        assert_eq!(thread_group_count(513, 512), 2);
        assert_eq!(thread_group_count(12345, 512), 25);
    }

    #[test]
    fn floored_capacity_is_a_multiple_of_the_group_width() {
        for width in [64u32, 256, 512] {
            for capacity in [0u32, 1, 255, 256, 1000, 1 << 19, (1 << 19) + 77] {
                let floored = floor_particle_count(capacity, width);
                assert!(floored <= capacity);
                assert_eq!(floored % width, 0);
                assert!(capacity - floored < width);
            }
        }
    }

    #[test]
    fn emission_never_exceeds_remaining_capacity() {
        assert_eq!(emit_count(256, 1024, 0), 256);
        assert_eq!(emit_count(256, 1024, 900), 124);
        assert_eq!(emit_count(256, 1024, 1024), 0);
        // A stale estimate above capacity must not underflow.
        assert_eq!(emit_count(256, 1024, 2000), 0);
        assert_eq!(emit_count(0, 1024, 10), 0);
    }

    #[test]
    fn sort_length_is_next_power_of_two() {
        assert_eq!(sort_length(0), 1);
        assert_eq!(sort_length(1), 1);
        assert_eq!(sort_length(3), 4);
        assert_eq!(sort_length(1024), 1024);
        assert_eq!(sort_length(1025), 2048);
    }
}
