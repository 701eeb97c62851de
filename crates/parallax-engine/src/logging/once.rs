use std::sync::atomic::{AtomicBool, Ordering};

/// Latch for warnings emitted from per-frame code paths.
///
/// A pass that skips itself every frame for the same reason logs the reason once;
/// re-arming happens when the condition clears.
#[derive(Debug, Default)]
pub struct WarnOnce {
    fired: AtomicBool,
}

impl WarnOnce {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
        }
    }

    /// Returns `true` exactly once until [`reset`](Self::reset) is called.
    pub fn should_fire(&self) -> bool {
        !self.fired.swap(true, Ordering::Relaxed)
    }

    /// Re-arms the latch.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::Relaxed);
    }

    /// Logs `msg` at warn level under `target` if the latch has not fired yet.
    pub fn warn(&self, target: &str, msg: std::fmt::Arguments<'_>) {
        if self.should_fire() {
            log::warn!(target: target, "{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_until_reset() {
        let latch = WarnOnce::new();
        assert!(latch.should_fire());
        assert!(!latch.should_fire());
        assert!(!latch.should_fire());
        latch.reset();
        assert!(latch.should_fire());
    }
}
