//! Fixed-timestep frame scheduling
//!
//! Rendering runs at whatever rate the host drives
//! [`MarbleApp::frame`](crate::MarbleApp::frame); physics advances in fixed
//! steps accumulated from wall-clock deltas so simulation behavior does not
//! depend on frame rate.

/// Accumulates frame time and doles out fixed physics steps
pub struct FrameScheduler {
    fixed_dt: f32,
    accumulator: f32,
    elapsed: f32,
    frame_index: u64,
    max_steps_per_frame: u32,
}

impl FrameScheduler {
    pub fn new(fixed_dt: f32) -> Self {
        Self {
            fixed_dt,
            accumulator: 0.0,
            elapsed: 0.0,
            frame_index: 0,
            max_steps_per_frame: 4,
        }
    }

    /// Advance by one rendered frame, returning how many fixed physics
    /// steps to run. Capped so a long stall cannot trigger a spiral of
    /// ever-larger catch-up work.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.elapsed += dt.max(0.0);
        self.frame_index += 1;
        self.accumulator += dt.max(0.0);

        let mut steps = 0;
        while self.accumulator >= self.fixed_dt && steps < self.max_steps_per_frame {
            self.accumulator -= self.fixed_dt;
            steps += 1;
        }
        if steps == self.max_steps_per_frame && self.accumulator >= self.fixed_dt {
            log::debug!(
                "frame {} fell behind, dropping {:.3}s of simulation time",
                self.frame_index,
                self.accumulator
            );
            self.accumulator = 0.0;
        }
        steps
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn fixed_dt(&self) -> f32 {
        self.fixed_dt
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(1.0 / 60.0)
    }
}
