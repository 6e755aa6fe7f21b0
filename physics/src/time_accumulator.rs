/// Turns variable frame times into a whole number of fixed steps, carrying the remainder.
#[derive(Clone, Debug)]
pub struct TimeAccumulator {
    accumulated_time: f32,
    frame_number: u64,
    num_steps: u32,
    max_steps: u32,
    update_rate: f32,
}

impl Default for TimeAccumulator {
    fn default() -> Self {
        Self::new(1.0 / 60.0, 10)
    }
}

impl TimeAccumulator {
    pub fn new(update_rate: f32, max_steps: u32) -> Self {
        TimeAccumulator {
            accumulated_time: 0.0,
            frame_number: 0,
            num_steps: 0,
            max_steps,
            update_rate,
        }
    }

    /// Changing the rate keeps the accumulated time.
    pub fn set_update_rate(&mut self, update_rate: f32, max_steps: u32) {
        self.update_rate = update_rate;
        self.max_steps = max_steps;
    }

    /// Adds `delta` seconds and returns how many fixed steps to take this frame.
    pub fn update(&mut self, delta: f32) -> u32 {
        self.frame_number += 1;
        if self.update_rate <= 0.0 {
            self.num_steps = 0;
            return 0;
        }
        self.accumulated_time += delta.max(0.0);
        let num_steps = (self.accumulated_time / self.update_rate) as u32;
        if num_steps > self.max_steps {
            tracing::warn!(
                steps = num_steps,
                delta,
                accumulated = self.accumulated_time,
                rate = self.update_rate,
                "capping physics steps"
            );
            self.num_steps = self.max_steps;
            self.accumulated_time %= self.update_rate;
        } else {
            self.num_steps = num_steps;
            self.accumulated_time =
                (self.accumulated_time - self.update_rate * num_steps as f32).max(0.0);
        }
        self.num_steps
    }

    pub fn num_steps(&self) -> u32 {
        self.num_steps
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Fraction of a step left over, used to blend the last two states.
    pub fn alpha(&self) -> f32 {
        if self.update_rate > 0.0 {
            (self.accumulated_time / self.update_rate).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
