//! Calibration of a single profile.

use tracing::debug;

use super::{CalibrationConfig, CalibrationResult, CalibrationStatus, PeakThreshold};
use crate::catalog::LineCatalog;
use crate::correspondence::Correspondence;
use crate::detection::{detect_peaks, estimate_noise, line_width, peak_position};
use crate::dispersion::{
    fit_pixel_from_wavelength, min_lines_for_order, DispersionFit, DispersionFitConfig,
    DispersionModel,
};
use crate::error::FitError;
use crate::matching::{identify_peaks, IdentifyConfig, MIN_PEAKS};

const NOISE_CLIP_ITERATIONS: usize = 5;
const NOISE_CLIP_FACTOR: f32 = 3.0;

/// Calibrate one profile against the catalog.
///
/// Never fails: every problem is reported through
/// [`CalibrationResult::status`], with zeroed coefficients.
pub fn calibrate_row(
    profile: &[f32],
    catalog: &LineCatalog,
    config: &CalibrationConfig,
) -> CalibrationResult {
    let reference = config.reference_for(catalog);

    // ── Detecting ──
    let width = line_width(profile);
    let level = match config.peak_threshold {
        PeakThreshold::Absolute(level) => level,
        PeakThreshold::Sigma(nsigma) => {
            estimate_noise(profile, NOISE_CLIP_ITERATIONS, NOISE_CLIP_FACTOR).level(nsigma)
        }
    };
    let peaks = detect_peaks(profile, level, width);
    let npeaks = peaks.len();
    debug!("Detected {} peaks (width {} px, level {:.1})", npeaks, width, level);
    if npeaks < MIN_PEAKS {
        return CalibrationResult::failure(CalibrationStatus::TooFewPeaks, width, npeaks);
    }

    // ── Blind fit ──
    let mut identify = IdentifyConfig::from_dispersion(
        config.dispersion,
        config.dispersion_tolerance,
        config.ratio_tolerance,
    );
    identify.selection = config.selection;
    let identified = match identify_peaks(&peaks, catalog, &identify) {
        Some(lines) if lines.len() >= MIN_PEAKS => lines,
        other => {
            debug!(
                "Identified {} of {} peaks, not enough to fit",
                other.map_or(0, |l| l.len()),
                npeaks
            );
            return CalibrationResult::failure(CalibrationStatus::NoIdentification, width, npeaks);
        }
    };

    let mut fit = match fit_row(&identified, reference, config) {
        Ok(fit) => fit,
        Err(e) => {
            debug!("Blind fit failed: {}", e);
            return CalibrationResult::failure(CalibrationStatus::FitFailed, width, npeaks);
        }
    };
    debug!(
        "Blind fit: {} of {} lines, rms {:.3} px",
        fit.n_used,
        identified.len(),
        fit.rms
    );

    // ── Guided re-detection and fit ──
    if config.search_radius > 0 {
        let guide = config.first_guess.as_ref().unwrap_or(&fit.model);
        let guided = guided_lines(profile, catalog, guide, config.search_radius);
        fit = match fit_row(&guided, reference, config) {
            Ok(fit) => fit,
            Err(e) => {
                debug!("Guided fit on {} lines failed: {}", guided.len(), e);
                return CalibrationResult::failure(CalibrationStatus::GuidedFitFailed, width, npeaks);
            }
        };
        debug!(
            "Guided fit: {} of {} lines, rms {:.3} px",
            fit.n_used,
            guided.len(),
            fit.rms
        );
    }

    // ── Done ──
    let (blue, red) = fit
        .used_lines()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.wavelength), hi.max(c.wavelength))
        });
    if !fit.model.is_monotonic(blue, red, 0.0) {
        debug!("Model is not monotonic over [{:.1}, {:.1}]", blue, red);
        return CalibrationResult::failure(CalibrationStatus::NonMonotonic, width, npeaks);
    }

    let order = fit.model.order();
    let fit_error = fit.rms / (fit.n_used as f64 / (order + 1) as f64).sqrt();
    CalibrationResult {
        status: CalibrationStatus::Calibrated,
        coefficients: fit.model.padded_coefficients(),
        model: Some(fit.model),
        order,
        lines_used: fit.n_used,
        rms: fit.rms,
        fit_error,
        line_width: width,
        peaks_detected: npeaks,
        correspondences: fit.lines,
    }
}

/// Fit with the order lowered to what the number of lines supports.
fn fit_row(
    lines: &[Correspondence],
    reference: f64,
    config: &CalibrationConfig,
) -> Result<DispersionFit, FitError> {
    let n = lines.len();
    if n < MIN_PEAKS {
        return Err(FitError::TooFewLines {
            available: n,
            required: MIN_PEAKS,
        });
    }
    let order = config.order.min(n / 2 - 1);
    let fit_config = DispersionFitConfig {
        order,
        reject_threshold: config.reject_threshold,
        min_lines: config.min_lines.max(min_lines_for_order(order)),
    };
    fit_pixel_from_wavelength(lines, reference, &fit_config)
}

/// Re-measure a peak around the predicted position of every catalog line.
///
/// Lines whose search window leaves the profile, or where no peak stands
/// out, are skipped.
fn guided_lines(
    profile: &[f32],
    catalog: &LineCatalog,
    guide: &DispersionModel,
    radius: usize,
) -> Vec<Correspondence> {
    let window = 2 * radius + 1;
    catalog
        .wavelengths()
        .iter()
        .filter_map(|&wavelength| {
            let predicted = guide.pixel_at(wavelength);
            if !predicted.is_finite() {
                return None;
            }
            let start = predicted.round() as i64 - radius as i64;
            if start < 0 || start as usize + window > profile.len() {
                return None;
            }
            let start = start as usize;
            peak_position(&profile[start..start + window], 1)
                .map(|pos| Correspondence::new(start as f64 + pos, wavelength))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_util::synthetic_profile;

    const SPACINGS: [f64; 19] = [
        52.0, 77.0, 41.0, 95.0, 63.0, 118.0, 46.0, 84.0, 71.0, 58.0, 103.0, 49.0, 88.0, 66.0, 125.0,
        55.0, 79.0, 44.0, 97.0,
    ];

    fn catalog() -> LineCatalog {
        let mut waves = vec![4500.0];
        for s in SPACINGS {
            let last = waves[waves.len() - 1];
            waves.push(last + s);
        }
        LineCatalog::new(waves).unwrap()
    }

    fn truth(reference: f64) -> DispersionModel {
        DispersionModel::new(vec![512.0, 0.4, 1e-5], reference)
    }

    fn arc_profile(catalog: &LineCatalog, model: &DispersionModel) -> Vec<f32> {
        let lines: Vec<(f64, f64)> = catalog
            .wavelengths()
            .iter()
            .map(|&w| (model.pixel_at(w), 1000.0))
            .collect();
        synthetic_profile(1024, &lines, 1.5, 20.0)
    }

    fn config() -> CalibrationConfig {
        CalibrationConfig {
            peak_threshold: PeakThreshold::Absolute(100.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_calibrates_synthetic_row() {
        let catalog = catalog();
        let config = config();
        let model = truth(config.reference_for(&catalog));
        let result = calibrate_row(&arc_profile(&catalog, &model), &catalog, &config);

        assert_eq!(result.status, CalibrationStatus::Calibrated);
        assert_eq!(result.lines_used, catalog.len());
        assert_eq!(result.order, 2);
        assert!(result.fit_error > 0.0 && result.fit_error < 0.2);
        assert_eq!(result.coefficients[3..], [0.0; 3]);

        let fitted = result.model.unwrap();
        for &w in catalog.wavelengths() {
            assert!((fitted.pixel_at(w) - model.pixel_at(w)).abs() < 0.3);
        }
    }

    #[test]
    fn test_sigma_threshold() {
        let catalog = catalog();
        let config = CalibrationConfig {
            peak_threshold: PeakThreshold::Sigma(5.0),
            ..Default::default()
        };
        let model = truth(config.reference_for(&catalog));
        let mut profile = arc_profile(&catalog, &model);
        // Deterministic ±1 ripple so the noise estimate is not zero.
        for (i, v) in profile.iter_mut().enumerate() {
            *v += if i % 2 == 0 { 1.0 } else { -1.0 };
        }
        let result = calibrate_row(&profile, &catalog, &config);
        assert!(result.is_success(), "{:?}", result.status);
    }

    #[test]
    fn test_blind_only() {
        let catalog = catalog();
        let config = CalibrationConfig {
            search_radius: 0,
            ..config()
        };
        let model = truth(config.reference_for(&catalog));
        let result = calibrate_row(&arc_profile(&catalog, &model), &catalog, &config);
        assert!(result.is_success());
        assert!(result.lines_used >= MIN_PEAKS);
        assert_eq!(result.peaks_detected, catalog.len());
    }

    #[test]
    fn test_flat_row() {
        let result = calibrate_row(&[20.0; 1024], &catalog(), &config());
        assert_eq!(result.status, CalibrationStatus::TooFewPeaks);
        assert_eq!(result.coefficients, [0.0; 6]);
        assert_eq!(result.lines_used, 0);
    }

    #[test]
    fn test_unmatched_pattern() {
        // Evenly spaced lines: every pixel ratio is 1 and no window fits.
        let lines: Vec<(f64, f64)> = (0..8).map(|i| (150.0 + 100.0 * i as f64, 1000.0)).collect();
        let profile = synthetic_profile(1024, &lines, 1.5, 20.0);
        let result = calibrate_row(&profile, &catalog(), &config());
        assert_eq!(result.status, CalibrationStatus::NoIdentification);
        assert_eq!(result.peaks_detected, 8);
    }

    #[test]
    fn test_guided_failure_invalidates_row() {
        let catalog = catalog();
        let mut config = config();
        let reference = config.reference_for(&catalog);
        let model = truth(reference);
        // A guide that predicts every line off the detector.
        config.first_guess = Some(DispersionModel::new(vec![-5000.0, 0.4], reference));
        let result = calibrate_row(&arc_profile(&catalog, &model), &catalog, &config);
        assert_eq!(result.status, CalibrationStatus::GuidedFitFailed);
        assert_eq!(result.fit_error, 0.0);
    }

    #[test]
    fn test_folded_guide_is_non_monotonic() {
        // Palindromic line spacings: a mirrored guide predicts every line on
        // top of its mirror image, and the guided fit comes out decreasing.
        let spacings = [
            52.0, 77.0, 41.0, 95.0, 63.0, 118.0, 46.0, 84.0, 84.0, 46.0, 118.0, 63.0, 95.0, 41.0,
            77.0, 52.0,
        ];
        let mut waves = vec![4500.0];
        for s in spacings {
            let last = waves[waves.len() - 1];
            waves.push(last + s);
        }
        let catalog = LineCatalog::new(waves).unwrap();
        let mut config = config();
        let reference = config.reference_for(&catalog);
        let model = DispersionModel::new(vec![512.0, 0.4], reference);
        let profile = arc_profile(&catalog, &model);

        // The blind solution alone is fine.
        let blind_config = CalibrationConfig {
            search_radius: 0,
            ..config.clone()
        };
        let blind = calibrate_row(&profile, &catalog, &blind_config);
        assert!(blind.is_success(), "{:?}", blind.status);

        config.first_guess = Some(DispersionModel::new(vec![512.0, -0.4], reference));
        let result = calibrate_row(&profile, &catalog, &config);
        assert_eq!(result.status, CalibrationStatus::NonMonotonic);
        assert_eq!(result.coefficients, [0.0; 6]);
        assert!(result.model.is_none());
        assert_eq!(result.peaks_detected, catalog.len());
    }

    #[test]
    fn test_order_follows_line_count() {
        let lines: Vec<Correspondence> = (0..5)
            .map(|i| Correspondence::new(10.0 + 20.0 * i as f64, 5000.0 + 40.0 * i as f64))
            .collect();
        let config = CalibrationConfig {
            order: 3,
            reject_threshold: 0.0,
            ..Default::default()
        };
        let fit = fit_row(&lines, 5000.0, &config).unwrap();
        assert_eq!(fit.model.order(), 1);
        assert!(matches!(
            fit_row(&lines[..3], 5000.0, &config),
            Err(FitError::TooFewLines { .. })
        ));
    }
}
