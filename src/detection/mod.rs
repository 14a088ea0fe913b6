//! Emission-line peak detection along a 1-D intensity profile.
//!
//! Detection runs in three steps:
//! 1. Estimate the typical line width from the profile derivative ([`line_width`])
//! 2. Scan for local maxima above a threshold, with a closed-form sub-pixel
//!    offset from the three samples around each maximum ([`peak_candidates`])
//! 3. Re-centre each candidate on the intensity-weighted centroid of the
//!    samples above half maximum, and merge candidates closer than half a
//!    pixel ([`refine_peaks`])
//!
//! Positions are in pixels from the first sample of the profile.

mod candidates;
mod centroid;
mod noise;
mod width;

pub use candidates::{peak_candidates, peak_offset};
pub use centroid::{peak_position, refine_peaks};
pub use noise::{estimate_noise, NoiseEstimate};
pub use width::line_width;

/// Profiles shorter than this carry no usable peaks.
pub const MIN_PROFILE_LEN: usize = 5;

/// A profile whose maximum exceeds its median by less than this is flat.
pub const FLAT_PROFILE_EPSILON: f32 = 1e-5;

/// Detect and refine emission-line peaks in one profile.
///
/// `level` is the absolute detection threshold and `expected_width` the
/// typical line width in pixels (see [`line_width`]). The returned positions
/// are ascending.
pub fn detect_peaks(profile: &[f32], level: f32, expected_width: usize) -> Vec<f64> {
    let candidates = peak_candidates(profile, level, expected_width as f32);
    if candidates.is_empty() {
        return candidates;
    }
    refine_peaks(profile, candidates, expected_width.max(1))
}

/// Median of a slice (mean of the two central values for even lengths).
pub(crate) fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.total_cmp(b));
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// True if the profile has no structure worth scanning.
pub(crate) fn is_flat(profile: &[f32]) -> bool {
    let max = profile.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    max - median(profile) < FLAT_PROFILE_EPSILON
}
