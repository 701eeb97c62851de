//! Frame statistics: hole and triangle counts, read back without stalling, and
//! their optional batch logs.

mod batch_log;
mod readback;
mod stats;

pub use batch_log::{batch_path, BatchLog};
pub use readback::Readback;
pub use stats::{triangle_count, HoleStats};

use crate::config::DiagnosticsConfig;

/// Latest values read back from the GPU.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct FrameStats {
    pub holes: Option<HoleStats>,
    pub triangles: Option<u64>,
}

/// Collects read-back statistics and feeds the batch logs.
#[derive(Default)]
pub struct Diagnostics {
    config: DiagnosticsConfig,
    hole_log: Option<BatchLog>,
    triangle_log: Option<BatchLog>,
    last: FrameStats,
}

impl Diagnostics {
    pub fn new(config: &DiagnosticsConfig) -> Self {
        let mut d = Self::default();
        d.configure(config);
        d
    }

    /// Applies `config`; logs are opened and closed as their toggles change.
    pub fn configure(&mut self, config: &DiagnosticsConfig) {
        let reopen = config.log_dir != self.config.log_dir
            || config.log_batch_size != self.config.log_batch_size;
        let open = |name: &str, wanted: bool| {
            wanted.then(|| BatchLog::new(name, config.log_dir.clone(), config.log_batch_size))
        };

        let holes = config.batch_logging && config.hole_count;
        if reopen || holes != self.hole_log.is_some() {
            self.hole_log = open("holecount", holes);
        }
        let triangles = config.batch_logging && config.triangle_count;
        if reopen || triangles != self.triangle_log.is_some() {
            self.triangle_log = open("trianglecount", triangles);
        }

        if !config.hole_count {
            self.last.holes = None;
        }
        if !config.triangle_count {
            self.last.triangles = None;
        }
        self.config = config.clone();
    }

    pub fn record_holes(&mut self, stats: HoleStats) {
        self.last.holes = Some(stats);
        log::trace!("holes: {} of {} ({:.3}%)", stats.holes, stats.total, stats.percent());
        push_sample(&mut self.hole_log, stats.percent());
    }

    pub fn record_triangles(&mut self, triangles: u64) {
        self.last.triangles = Some(triangles);
        log::trace!("warp triangles: {triangles}");
        push_sample(&mut self.triangle_log, triangles as f64);
    }

    pub fn stats(&self) -> FrameStats {
        self.last
    }
}

/// A log that fails to write is closed rather than retried every frame.
fn push_sample(log: &mut Option<BatchLog>, value: f64) {
    let Some(l) = log.as_mut() else { return };
    if let Err(err) = l.push(value) {
        log::warn!("batch logging disabled: {err:#}");
        *log = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_counters_clear_their_stats() {
        let mut config = DiagnosticsConfig {
            hole_count: true,
            triangle_count: true,
            ..Default::default()
        };
        let mut d = Diagnostics::new(&config);
        d.record_holes(HoleStats::from_count(10, 10, 10));
        d.record_triangles(42);
        assert_eq!(d.stats().triangles, Some(42));

        config.triangle_count = false;
        d.configure(&config);
        assert_eq!(d.stats().triangles, None);
        assert!(d.stats().holes.is_some());
    }

    #[test]
    fn logs_open_only_when_batch_logging_is_on() {
        let mut config = DiagnosticsConfig {
            hole_count: true,
            ..Default::default()
        };
        let mut d = Diagnostics::new(&config);
        assert!(d.hole_log.is_none());

        config.batch_logging = true;
        d.configure(&config);
        assert!(d.hole_log.is_some());
        assert!(d.triangle_log.is_none());
    }
}
