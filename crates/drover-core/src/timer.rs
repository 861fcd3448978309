//! Wall-clock elapsed time since start or last reset.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct ElapsedTimer {
    started: Instant,
}

impl ElapsedTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Restart the timer and return the time elapsed before the reset.
    pub fn reset(&mut self) -> Duration {
        let now = Instant::now();
        let diff = now.duration_since(self.started);
        self.started = now;
        diff
    }
}

impl Default for ElapsedTimer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_returns_previous_span_and_restarts() {
        let mut timer = ElapsedTimer::start();
        std::thread::sleep(Duration::from_millis(20));

        let before = timer.reset();
        assert!(before >= Duration::from_millis(20));
        assert!(timer.elapsed() < before);
    }
}
