use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock measuring time since the current cue started.
#[derive(Debug, Clone, Copy)]
pub struct CueClock {
    started: Instant,
}

impl Default for CueClock {
    fn default() -> Self {
        Self::start()
    }
}

impl CueClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Paces a fixed-rate loop. The pause after a tick is shortened by the time
/// the tick itself took, so slow ticks do not accumulate drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTimer {
    interval: Duration,
}

impl FrameTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_fps(fps: u32) -> Self {
        Self::new(crate::config::frame_interval(fps))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// How long to sleep after a tick that took `spent`.
    pub fn pause_after(&self, spent: Duration) -> Duration {
        self.interval.saturating_sub(spent)
    }

    pub fn overran(&self, spent: Duration) -> bool {
        spent > self.interval
    }
}

/// Seconds since the Unix epoch, for frame timestamps only.
pub fn wall_clock_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_compensates_for_tick_time() {
        let timer = FrameTimer::new(Duration::from_millis(40));
        assert_eq!(timer.pause_after(Duration::from_millis(10)), Duration::from_millis(30));
        assert_eq!(timer.pause_after(Duration::from_millis(55)), Duration::ZERO);
        assert!(timer.overran(Duration::from_millis(41)));
        assert!(!timer.overran(Duration::from_millis(40)));
    }

    #[test]
    fn fps_zero_is_treated_as_one() {
        assert_eq!(FrameTimer::from_fps(0).interval(), Duration::from_secs(1));
    }

    #[test]
    fn cue_clock_resets() {
        let mut clock = CueClock::start();
        std::thread::sleep(Duration::from_millis(20));
        let before = clock.elapsed();
        assert!(before >= Duration::from_millis(20));
        clock.reset();
        assert!(clock.elapsed() < before);
    }

    #[test]
    fn wall_clock_is_after_2020() {
        assert!(wall_clock_secs() > 1_577_836_800.0);
    }
}
