//! Row-by-row wavelength calibration.
//!
//! Each profile goes through the same stages:
//!
//! 1. **Detecting**: estimate the line width, derive the detection threshold
//!    and find the peaks.
//! 2. **Blind fit**: identify the peaks against the catalog without any
//!    prior, and fit a first dispersion model.
//! 3. **Guided re-detection** (optional): predict the position of every
//!    catalog line with the blind model, or with a first-guess model shared
//!    by all rows, and re-measure a peak around each prediction.
//! 4. **Guided fit**: refit on the re-detected lines. A failure here
//!    invalidates the row even though the blind fit succeeded.
//!
//! Rows are independent, so an image is calibrated by running
//! [`calibrate_row`] on every row ([`calibrate_image`]) and collecting the
//! solutions into a [`CoefficientTable`].

mod image;
mod row;
mod table;

pub use image::{calibrate_image, ImageCalibration, ResidualSample};
pub use row::calibrate_row;
pub use table::{CoefficientTable, RowSolution};

use crate::catalog::LineCatalog;
use crate::correspondence::Correspondence;
use crate::dispersion::{DispersionModel, MAX_COEFFS, MAX_ORDER};
use crate::matching::SequenceSelection;

// ── Status codes ────────────────────────────────────────────────────────────

/// Outcome of calibrating one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStatus {
    /// A monotonic dispersion model was fitted.
    Calibrated,
    /// Fewer than four peaks were detected.
    TooFewPeaks,
    /// Fewer than four peaks could be identified with catalog lines.
    NoIdentification,
    /// The blind fit was refused or failed.
    FitFailed,
    /// The fit on the guided re-detection was refused or failed.
    GuidedFitFailed,
    /// The fitted model folds back over the wavelength span of its lines.
    NonMonotonic,
}

impl CalibrationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CalibrationStatus::Calibrated)
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Peak detection threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PeakThreshold {
    /// Absolute intensity a sample must exceed.
    Absolute(f32),
    /// Multiple of the profile noise above the profile median.
    Sigma(f32),
}

/// Configuration for [`calibrate_row`] and [`calibrate_image`].
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    /// Expected dispersion in wavelength units per pixel. Default 2.5
    /// (VIMOS MR grism, Å/px).
    pub dispersion: f64,
    /// Fractional tolerance on `dispersion`. Default 0.2 (±20%).
    pub dispersion_tolerance: f64,
    /// Tolerance on catalog/pixel interval ratios. Default 0.05.
    pub ratio_tolerance: f64,
    /// Peak detection threshold. Default 250 counts absolute.
    pub peak_threshold: PeakThreshold,
    /// Requested polynomial order (lowered for rows with few lines). Default 2.
    pub order: usize,
    /// Pixel residual at which a line is rejected from the fit; ≤ 0 disables
    /// rejection. Default 0.7.
    pub reject_threshold: f64,
    /// Minimum number of fitted lines. Always raised to at least
    /// `2·(order + 1)`. Default 0.
    pub min_lines: usize,
    /// Half width (pixels) of the guided search window; 0 disables the guided
    /// pass. Default 6.
    pub search_radius: usize,
    /// Wavelength zero point of the models. `None` uses the middle of the
    /// catalog span.
    pub reference_wavelength: Option<f64>,
    /// Sequence selection for multiplexed spectra. Default longest.
    pub selection: SequenceSelection,
    /// Model used instead of the blind one to guide re-detection, typically
    /// [`ImageCalibration::first_guess`] from a previous pass.
    pub first_guess: Option<DispersionModel>,
    /// Residual diagnostics are kept for every `residual_sample_step`-th row;
    /// 0 disables them. Default 10.
    pub residual_sample_step: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            dispersion: 2.5,
            dispersion_tolerance: 0.2,
            ratio_tolerance: 0.05,
            peak_threshold: PeakThreshold::Absolute(250.0),
            order: 2,
            reject_threshold: 0.7,
            min_lines: 0,
            search_radius: 6,
            reference_wavelength: None,
            selection: SequenceSelection::Longest,
            first_guess: None,
            residual_sample_step: 10,
        }
    }
}

impl CalibrationConfig {
    /// Check the configuration for values no row could be calibrated with.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.dispersion.is_finite() && self.dispersion > 0.0,
            "Expected dispersion must be positive, got {}",
            self.dispersion
        );
        anyhow::ensure!(
            (0.0..1.0).contains(&self.dispersion_tolerance),
            "Dispersion tolerance must be in [0, 1), got {}",
            self.dispersion_tolerance
        );
        anyhow::ensure!(
            self.ratio_tolerance > 0.0,
            "Ratio tolerance must be positive, got {}",
            self.ratio_tolerance
        );
        anyhow::ensure!(
            self.order <= MAX_ORDER,
            "Polynomial order {} exceeds the maximum of {}",
            self.order,
            MAX_ORDER
        );
        if let Some(reference) = self.reference_wavelength {
            anyhow::ensure!(reference.is_finite(), "Reference wavelength must be finite");
        }
        if let SequenceSelection::Region { size, .. } = self.selection {
            anyhow::ensure!(size > 0, "Region size must be positive");
        }
        Ok(())
    }

    /// Wavelength zero point used with `catalog`.
    pub fn reference_for(&self, catalog: &LineCatalog) -> f64 {
        self.reference_wavelength.unwrap_or_else(|| {
            let (blue, red) = catalog.span();
            0.5 * (blue + red)
        })
    }
}

// ── Result ──────────────────────────────────────────────────────────────────

/// Calibration of one row.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub status: CalibrationStatus,
    /// The accepted model, `None` on failure.
    pub model: Option<DispersionModel>,
    /// Model coefficients zero-padded to six entries; all zero on failure.
    pub coefficients: [f64; MAX_COEFFS],
    /// Order of the fitted polynomial.
    pub order: usize,
    /// Lines kept by the final fit; 0 on failure.
    pub lines_used: usize,
    /// RMS pixel residual of the used lines.
    pub rms: f64,
    /// Reported accuracy `rms / √(lines_used / (order + 1))`; 0 on failure.
    pub fit_error: f64,
    /// Estimated line width (pixels).
    pub line_width: usize,
    /// Number of peaks found by the blind detection.
    pub peaks_detected: usize,
    /// Lines offered to the final fit, with `used` flags. Empty on failure.
    pub correspondences: Vec<Correspondence>,
}

impl CalibrationResult {
    pub(crate) fn failure(status: CalibrationStatus, line_width: usize, peaks_detected: usize) -> Self {
        Self {
            status,
            model: None,
            coefficients: [0.0; MAX_COEFFS],
            order: 0,
            lines_used: 0,
            rms: 0.0,
            fit_error: 0.0,
            line_width,
            peaks_detected,
            correspondences: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
