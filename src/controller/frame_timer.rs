use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Upper bound on the summed durations kept for the FPS estimate.
pub const FPS_WINDOW: Duration = Duration::from_millis(250);

/// Measures time between render ticks and keeps a rolling FPS estimate.
///
/// The FPS value is display-only. Motion integration uses the delta returned
/// by `tick`, never the windowed average.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    last_tick: Option<Instant>,
    window: VecDeque<Duration>,
    window_sum: Duration,
    fps: u32,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameTimer {
    pub fn new() -> Self {
        Self {
            last_tick: None,
            window: VecDeque::new(),
            window_sum: Duration::ZERO,
            fps: 0,
        }
    }

    /// Tick against the wall clock. Returns seconds since the previous tick.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Tick at a given instant. The first tick has no baseline and reports
    /// zero; it does not enter the window.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let Some(last) = self.last_tick.replace(now) else {
            return 0.0;
        };
        let delta = now.saturating_duration_since(last);

        self.window.push_back(delta);
        self.window_sum += delta;
        while self.window_sum > FPS_WINDOW {
            match self.window.pop_front() {
                Some(oldest) => self.window_sum -= oldest,
                None => break,
            }
        }

        self.fps = if self.window_sum.is_zero() {
            0
        } else {
            (self.window.len() as f64 / self.window_sum.as_secs_f64()).round() as u32
        };

        delta.as_secs_f32()
    }

    /// Frames per second over the current window, rounded.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_sum(&self) -> Duration {
        self.window_sum
    }
}
