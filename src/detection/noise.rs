//! Robust background and noise estimate for a profile.

use super::median;

/// Background level and noise of a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseEstimate {
    /// Median of the profile.
    pub median: f32,
    /// Standard deviation of the samples at or below the median, after sigma clipping.
    pub sigma: f32,
}

impl NoiseEstimate {
    /// Detection level `median + nsigma · sigma`.
    pub fn level(&self, nsigma: f32) -> f32 {
        self.median + nsigma * self.sigma
    }
}

/// Estimate background and noise from the lower half of the sample distribution.
///
/// Emission lines only bias the distribution upward, so the samples at or
/// below the median are sigma-clipped (`clip_factor`, up to `clip_iterations`
/// passes) and their RMS about their own mean is taken as the noise.
pub fn estimate_noise(profile: &[f32], clip_iterations: usize, clip_factor: f32) -> NoiseEstimate {
    let values: Vec<f32> = profile.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return NoiseEstimate {
            median: 0.0,
            sigma: 0.0,
        };
    }

    let med = median(&values);
    let mut low_half: Vec<f32> = values.into_iter().filter(|&v| v <= med).collect();

    let mut sigma = 0.0_f32;
    for _ in 0..clip_iterations.max(1) {
        if low_half.is_empty() {
            break;
        }
        let mean = (low_half.iter().map(|&v| v as f64).sum::<f64>() / low_half.len() as f64) as f32;
        let var = low_half
            .iter()
            .map(|&v| ((v - mean) as f64).powi(2))
            .sum::<f64>()
            / low_half.len() as f64;
        sigma = var.sqrt() as f32;
        if sigma < 1e-10 {
            break;
        }
        let lo = mean - clip_factor * sigma;
        let hi = mean + clip_factor * sigma;
        let before = low_half.len();
        low_half.retain(|&v| v >= lo && v <= hi);
        if low_half.len() == before {
            break;
        }
    }

    NoiseEstimate { median: med, sigma }
}
