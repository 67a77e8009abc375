use std::time::{Duration, Instant};

use log::info;

/// Measures the time between frames and turns it into the simulation step.
#[derive(Debug)]
pub struct FrameClock {
    iteration_start: Instant,
    pub frame_budget: Duration,
    paused: bool,
}

impl FrameClock {
    pub fn new(fps: f64) -> FrameClock {
        FrameClock::starting_at(Instant::now(), fps)
    }

    pub fn starting_at(start: Instant, fps: f64) -> FrameClock {
        FrameClock {
            iteration_start: start,
            frame_budget: Duration::from_secs_f64(1.0 / fps),
            paused: false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
        info!("{}", if self.paused { "Paused" } else { "Resumed" });
    }

    pub fn tick(&mut self, freeze: bool) -> f32 {
        self.tick_at(Instant::now(), freeze)
    }

    /// Simulation step in seconds for a frame ending at `now`. Zero while
    /// paused or frozen, the wall clock keeps running either way.
    pub fn tick_at(&mut self, now: Instant, freeze: bool) -> f32 {
        let delta_t = now.saturating_duration_since(self.iteration_start);
        if delta_t > self.frame_budget {
            log::debug!("Over time budget by: {:?}", delta_t - self.frame_budget);
        }
        self.iteration_start = now;
        if self.paused || freeze {
            0.0
        } else {
            delta_t.as_secs_f32()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_measures_the_frame() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start, 60.0);
        let dt = clock.tick_at(start + Duration::from_millis(16), false);
        assert!((dt - 0.016).abs() < 1e-6);
        let dt = clock.tick_at(start + Duration::from_millis(20), false);
        assert!((dt - 0.004).abs() < 1e-6);
    }

    #[test]
    fn pause_and_freeze_stop_time() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start, 60.0);
        assert_eq!(clock.tick_at(start + Duration::from_millis(10), true), 0.0);

        clock.toggle_pause();
        assert!(clock.is_paused());
        assert_eq!(clock.tick_at(start + Duration::from_millis(20), false), 0.0);

        clock.toggle_pause();
        // Time spent paused is not replayed.
        let dt = clock.tick_at(start + Duration::from_millis(30), false);
        assert!((dt - 0.010).abs() < 1e-6);
    }
}
