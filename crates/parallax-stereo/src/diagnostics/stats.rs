/// Uncovered-pixel statistics of one right-eye frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct HoleStats {
    pub holes: u64,
    pub total: u64,
}

impl HoleStats {
    pub fn from_count(holes: u64, width: u32, height: u32) -> Self {
        let total = width as u64 * height as u64;
        Self {
            holes: holes.min(total),
            total,
        }
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.holes as f64 * 100.0 / self.total as f64
    }
}

/// Triangles drawn by the warp for the given per-level patch counts.
pub fn triangle_count(instance_counts: &[u32], factors: &[u32]) -> u64 {
    instance_counts
        .iter()
        .zip(factors)
        .map(|(&n, &f)| n as u64 * 2 * f as u64 * f as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_frame() {
        let s = HoleStats::from_count(20_736, 1920, 1080);
        assert!((s.percent() - 1.0).abs() < 1e-9);
        assert_eq!(HoleStats::from_count(5, 0, 0).percent(), 0.0);
    }

    #[test]
    fn count_is_capped_by_frame_size() {
        assert_eq!(HoleStats::from_count(100, 4, 4).holes, 16);
    }

    #[test]
    fn triangles_scale_with_factor_squared() {
        assert_eq!(triangle_count(&[100, 10, 1], &[1, 2, 4]), 200 + 80 + 32);
        assert_eq!(triangle_count(&[], &[1, 2]), 0);
    }
}
