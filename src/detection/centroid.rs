//! Centroid ("baricenter") refinement of peak positions.

use super::{is_flat, median, MIN_PROFILE_LEN};

/// Refined peaks closer than this (pixels) are considered duplicates.
const MERGE_DISTANCE: f64 = 0.5;

/// Maximum ratio between the weighted position variance of the contributing
/// samples and the variance of a uniform distribution over the window.
const MAX_VARIANCE_FRACTION: f64 = 0.8;

/// Intensity-weighted centroid of the dominant peak inside a window.
///
/// Samples above the midpoint between the window median and maximum
/// contribute with weight `v − median`. The result is a position relative to
/// the window start, or `None` when:
/// - the window has fewer than five samples or no structure,
/// - fewer than `min_points` samples contribute,
/// - the contributing samples are spread over the window like noise
///   (weighted variance ≥ 80% of `n²/12`).
pub fn peak_position(window: &[f32], min_points: usize) -> Option<f64> {
    let n = window.len();
    if n < MIN_PROFILE_LEN || is_flat(window) {
        return None;
    }

    let med = median(window) as f64;
    let max = window.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let level = (max + med) / 2.0;

    let mut count = 0usize;
    let mut sum_w = 0.0_f64;
    let mut sum_wx = 0.0_f64;
    for (i, &v) in window.iter().enumerate() {
        let v = v as f64;
        if v > level {
            let w = v - med;
            sum_w += w;
            sum_wx += w * i as f64;
            count += 1;
        }
    }
    if count < min_points.max(1) || sum_w <= 0.0 {
        return None;
    }
    let pos = sum_wx / sum_w;

    let variance = window
        .iter()
        .enumerate()
        .filter(|(_, &v)| v as f64 > level)
        .map(|(i, &v)| (v as f64 - med) * (i as f64 - pos).powi(2))
        .sum::<f64>()
        / sum_w;
    let uniform_variance = (n * n) as f64 / 12.0;
    if variance >= MAX_VARIANCE_FRACTION * uniform_variance {
        return None;
    }

    Some(pos)
}

/// Re-centre peak candidates on the local intensity centroid.
///
/// Each peak is re-measured over `[⌊p⌋ − radius, ⌊p⌋ + radius]`; peaks whose
/// window leaves the profile, or whose centroid is rejected, keep their
/// original position. Afterwards the peaks are sorted and, of two adjacent
/// peaks closer than half a pixel, the first is dropped.
pub fn refine_peaks(profile: &[f32], mut peaks: Vec<f64>, radius: usize) -> Vec<f64> {
    let window = 2 * radius + 1;
    for p in peaks.iter_mut() {
        let start = p.floor() as isize - radius as isize;
        if start < 0 || start as usize + window > profile.len() {
            continue;
        }
        let start = start as usize;
        if let Some(pos) = peak_position(&profile[start..start + window], 1) {
            *p = start as f64 + pos;
        }
    }

    peaks.sort_by(|a, b| a.total_cmp(b));
    let mut keep = vec![true; peaks.len()];
    for i in 1..peaks.len() {
        if peaks[i] - peaks[i - 1] < MERGE_DISTANCE {
            keep[i - 1] = false;
        }
    }
    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_util::synthetic_profile;
    use super::*;

    #[test]
    fn test_peak_position_symmetric() {
        let window = [1.0, 2.0, 5.0, 9.0, 5.0, 2.0, 1.0];
        let pos = peak_position(&window, 1).unwrap();
        assert!((pos - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_peak_position_flat_or_short() {
        assert!(peak_position(&[3.0; 9], 1).is_none());
        assert!(peak_position(&[1.0, 5.0, 1.0], 1).is_none());
    }

    #[test]
    fn test_peak_position_spread_rejected() {
        // Two equal lines at the window edges: the contributing samples span
        // the whole window, which is no single peak.
        let window = [9.0, 9.0, 1.0, 1.0, 1.0, 1.0, 1.0, 9.0, 9.0];
        assert!(peak_position(&window, 1).is_none());
    }

    #[test]
    fn test_peak_position_min_points() {
        let window = [1.0, 1.0, 1.0, 9.0, 1.0, 1.0, 1.0];
        assert!(peak_position(&window, 1).is_some());
        assert!(peak_position(&window, 2).is_none());
    }

    #[test]
    fn test_refine_keeps_unrefinable() {
        let profile = synthetic_profile(60, &[(30.0, 100.0)], 1.0, 5.0);
        // Window of the first peak leaves the profile: kept unchanged.
        let refined = refine_peaks(&profile, vec![1.3, 30.2], 3);
        assert_eq!(refined.len(), 2);
        assert_eq!(refined[0], 1.3);
        assert!((refined[1] - 30.0).abs() < 0.05);
    }

    #[test]
    fn test_refine_merges_duplicates() {
        let profile = synthetic_profile(60, &[(30.0, 100.0)], 1.0, 5.0);
        let refined = refine_peaks(&profile, vec![29.6, 30.4], 3);
        assert_eq!(refined.len(), 1);
        assert!((refined[0] - 30.0).abs() < 0.05);
    }

    #[test]
    fn test_refine_window_touching_last_sample() {
        // Window [54, 60] ends exactly on the last sample of the profile.
        let profile = synthetic_profile(61, &[(57.0, 100.0)], 1.0, 5.0);
        let refined = refine_peaks(&profile, vec![57.4], 3);
        assert!((refined[0] - 57.0).abs() < 0.05, "{refined:?}");
        // One sample further the window leaves the profile.
        let refined = refine_peaks(&profile[..60], vec![57.4], 3);
        assert_eq!(refined, vec![57.4]);
    }

    #[test]
    fn test_refine_sorts_before_merging() {
        let profile = synthetic_profile(160, &[(40.0, 1000.0), (120.0, 1000.0)], 1.5, 20.0);
        let refined = refine_peaks(&profile, vec![120.3, 40.2], 3);
        assert_eq!(refined.len(), 2, "{refined:?}");
        assert!((refined[0] - 40.0).abs() < 0.05);
        assert!((refined[1] - 120.0).abs() < 0.05);
    }
}
