//! Tessellation factor selection.
//!
//! Mirrors the hull stage in `shaders/hull.wgsl`: both must agree on how a
//! discontinuity sample maps to a factor and on how factors are bucketed into
//! draw levels.

/// Largest factor the warp pass can expand per quad.
pub const MAX_TESS_FACTOR: u32 = 64;

/// Per-quad tessellation factor for a discontinuity `sample`.
///
/// Flat quads (sample at or below `threshold`) stay a single patch. Above the
/// threshold the factor grows with the ratio `sample / threshold`, rounded up to a
/// power of two and clamped to `max_factor`. NaN samples count as flat.
pub fn tessellation_factor(sample: f32, threshold: f32, max_factor: u32) -> u32 {
    let max_factor = max_factor.clamp(1, MAX_TESS_FACTOR);
    if !(sample > threshold) || max_factor == 1 {
        return 1;
    }
    if threshold <= 0.0 {
        return max_factor;
    }

    let ratio = (sample / threshold).ceil().min(max_factor as f32) as u32;
    ratio.max(1).next_power_of_two().min(max_factor)
}

/// Factor of each draw level: powers of two below `max_factor`, then `max_factor`.
pub fn factor_levels(max_factor: u32) -> Vec<u32> {
    let max_factor = max_factor.clamp(1, MAX_TESS_FACTOR);
    (0..level_count(max_factor))
        .map(|level| (1u32 << level).min(max_factor))
        .collect()
}

pub fn level_count(max_factor: u32) -> u32 {
    ceil_log2(max_factor.clamp(1, MAX_TESS_FACTOR)) + 1
}

/// Level a factor produced by [`tessellation_factor`] is drawn in.
pub fn level_of(factor: u32) -> u32 {
    ceil_log2(factor.max(1))
}

pub fn triangles_per_patch(factor: u32) -> u32 {
    2 * factor * factor
}

pub fn vertices_per_patch(factor: u32) -> u32 {
    3 * triangles_per_patch(factor)
}

fn ceil_log2(n: u32) -> u32 {
    if n <= 1 { 0 } else { 32 - (n - 1).leading_zeros() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_quads_stay_coarse() {
        assert_eq!(tessellation_factor(0.0, 0.003, 16), 1);
        assert_eq!(tessellation_factor(0.003, 0.003, 16), 1);
        assert_eq!(tessellation_factor(f32::NAN, 0.003, 16), 1);
    }

    #[test]
    fn factor_is_monotonic_and_bounded() {
        for max in [1, 3, 12, 16, 64] {
            let mut prev = 0;
            for i in 0..2000 {
                let s = i as f32 * 0.0005;
                let f = tessellation_factor(s, 0.003, max);
                assert!(f >= prev, "factor dropped at sample {s} (max {max})");
                assert!(f >= 1 && f <= max);
                prev = f;
            }
            assert_eq!(prev, max);
        }
    }

    #[test]
    fn zero_threshold_escalates_any_discontinuity() {
        assert_eq!(tessellation_factor(1e-6, 0.0, 8), 8);
        assert_eq!(tessellation_factor(0.0, 0.0, 8), 1);
    }

    #[test]
    fn levels_cover_every_factor() {
        for max in 1..=MAX_TESS_FACTOR {
            let levels = factor_levels(max);
            assert_eq!(levels.len() as u32, level_count(max));
            assert_eq!(*levels.last().unwrap(), max);
            for i in 0..400 {
                let f = tessellation_factor(i as f32 * 0.001, 0.003, max);
                let level = level_of(f) as usize;
                assert_eq!(levels[level], f, "factor {f} misfiled (max {max})");
            }
        }
    }

    #[test]
    fn patch_sizes() {
        assert_eq!(triangles_per_patch(1), 2);
        assert_eq!(vertices_per_patch(4), 96);
    }
}
