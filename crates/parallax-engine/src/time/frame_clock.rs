use std::time::{Duration, Instant};

/// Shortest frame time reported; tight present loops can tick twice in one microsecond.
const MIN_DT: Duration = Duration::from_micros(100);
/// Longest frame time reported; covers debugger pauses and window drags.
const MAX_DT: Duration = Duration::from_millis(250);
/// Weight of the newest sample in the fps average.
const FPS_SMOOTHING: f32 = 0.1;

/// Timing of one redraw.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Seconds since the previous tick, clamped.
    pub dt: f32,
    pub now: Instant,
    pub frame_index: u64,
    /// Exponential moving average of `1 / dt`.
    pub fps: f32,
}

/// Produces a [`FrameTime`] per redraw.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frames: u64,
    fps: f32,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self {
            last: Instant::now(),
            frames: 0,
            fps: 0.0,
        }
    }
}

impl FrameClock {
    /// Restarts the interval so a resize or stall does not count as one long frame.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last);
        self.last = now;
        self.record(elapsed, now)
    }

    fn record(&mut self, elapsed: Duration, now: Instant) -> FrameTime {
        let dt = elapsed.clamp(MIN_DT, MAX_DT).as_secs_f32();
        let rate = dt.recip();
        self.fps = match self.frames {
            0 => rate,
            _ => self.fps + (rate - self.fps) * FPS_SMOOTHING,
        };

        let time = FrameTime {
            dt,
            now,
            frame_index: self.frames,
            fps: self.fps,
        };
        self.frames = self.frames.wrapping_add(1);
        time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped() {
        let mut clock = FrameClock::default();
        let now = Instant::now();
        assert!((clock.record(Duration::from_secs(5), now).dt - 0.25).abs() < 1e-6);
        assert!((clock.record(Duration::ZERO, now).dt - 0.0001).abs() < 1e-7);
    }

    #[test]
    fn fps_converges_to_steady_rate() {
        let mut clock = FrameClock::default();
        let now = Instant::now();
        let mut last = clock.record(Duration::from_millis(10), now);
        for _ in 0..200 {
            last = clock.record(Duration::from_millis(10), now);
        }
        assert!((last.fps - 100.0).abs() < 0.5, "fps = {}", last.fps);
        assert_eq!(last.frame_index, 200);
    }
}
