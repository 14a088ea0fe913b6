//! Local-maximum scan with closed-form sub-pixel refinement.

use super::{is_flat, MIN_PROFILE_LEN};

/// Lines wider than this are boxcar-smoothed before the scan, so that flat
/// tops (e.g. from a wide slit) produce a single maximum.
const SMOOTH_WIDTH: usize = 7;

/// Lines wider than this are scanned with a stride of half the width.
const STRIDE_WIDTH: usize = 20;

/// Sub-pixel offset of a maximum from three equally spaced samples.
///
/// Returns `0.5·(v3 − v1)/(2·v2 − v3 − v1)` when `v2` is the maximum of the
/// three (`v1 ≤ v2`, `v3 ≤ v2`) and the curvature is not degenerate. The
/// result always lies in [−0.5, 0.5].
pub fn peak_offset(v1: f32, v2: f32, v3: f32) -> Option<f64> {
    let (v1, v2, v3) = (v1 as f64, v2 as f64, v3 as f64);
    if v1 > v2 || v3 > v2 {
        return None;
    }
    let denom = 2.0 * v2 - v3 - v1;
    if denom < 1e-8 {
        return None;
    }
    Some(0.5 * (v3 - v1) / denom)
}

/// Scan a profile for emission-line peak candidates.
///
/// A sample is a candidate when it exceeds `level`, is not lower than the
/// sample `stride` pixels before and is strictly higher than the sample
/// `stride` pixels after. Neighbours that are exactly zero mark masked
/// regions and disqualify the candidate, as do non-finite (bad) samples.
///
/// Returns ascending sub-pixel positions; empty for profiles shorter than
/// five samples or without any structure.
pub fn peak_candidates(profile: &[f32], level: f32, expected_width: f32) -> Vec<f64> {
    let n = profile.len();
    if n < MIN_PROFILE_LEN || is_flat(profile) {
        return Vec::new();
    }

    let width = 2 * (expected_width.max(0.0) / 2.0).ceil() as usize + 1;

    let smoothed;
    let data: &[f32] = if width > SMOOTH_WIDTH && width < n {
        smoothed = boxcar(profile, width);
        &smoothed
    } else {
        profile
    };

    let step = if width > STRIDE_WIDTH { width / 2 } else { 1 };
    if 2 * step >= n {
        return Vec::new();
    }

    let mut peaks = Vec::new();
    for i in step..n - step {
        let (prev, here, next) = (data[i - step], data[i], data[i + step]);
        if !(prev.is_finite() && here.is_finite() && next.is_finite()) {
            continue;
        }
        if here <= level || here < prev || here <= next {
            continue;
        }
        if prev == 0.0 || next == 0.0 {
            continue;
        }
        let dx = peak_offset(prev, here, next).unwrap_or(0.0);
        peaks.push(i as f64 + step as f64 * dx);
    }
    peaks
}

/// Running mean of `width` samples; the `width/2` samples at each end are copied.
/// Non-finite samples count as zero.
fn boxcar(profile: &[f32], width: usize) -> Vec<f32> {
    let half = width / 2;
    let n = profile.len();
    let value = |i: usize| if profile[i].is_finite() { profile[i] as f64 } else { 0.0 };
    let mut out = profile.to_vec();
    let mut sum: f64 = (0..width).map(value).sum();
    for i in half..n - half {
        if i > half {
            sum += value(i + half) - value(i - half - 1);
        }
        out[i] = (sum / width as f64) as f32;
    }
    out
}
