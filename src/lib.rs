//! # wavecal
//!
//! **Wavelength calibration of arc-lamp spectra**, one detector row at a time.
//!
//! Given a 1-D intensity profile containing emission lines and an ascending
//! catalog of the lamp's line wavelengths, `wavecal` finds the peaks,
//! identifies them with catalog lines and fits the polynomial dispersion
//! relation `pixel = P(λ − λref)`. No prior estimate of the line positions is
//! needed beyond a rough dispersion.
//!
//! ## Features
//!
//! - **Blind identification**: catalog lines are recognised from the ratios of
//!   consecutive line intervals, which do not depend on the dispersion
//! - **Robust fitting**: iterative least squares with residual-based rejection
//! - **Guided refinement**: a second detection pass around the positions
//!   predicted by the first model (or by a median model shared by all rows)
//! - **Multiplexed spectra**: sequence selection by detector region
//! - **Parallel**: image rows are calibrated independently with
//!   [rayon](https://docs.rs/rayon) (`parallel` feature, on by default)
//! - **Zero-copy tables**: coefficient tables serialize with [rkyv](https://docs.rs/rkyv)
//!
//! ## Example
//!
//! ```no_run
//! use wavecal::{calibrate_image, CalibrationConfig, LineCatalog, PeakThreshold};
//!
//! let catalog = LineCatalog::new(vec![
//!     5015.7, 5460.7, 5769.6, 5790.7, 5852.5, 5875.6, 5944.8, 6029.9, 6074.3,
//! ]).unwrap();
//!
//! let config = CalibrationConfig {
//!     dispersion: 2.5,
//!     peak_threshold: PeakThreshold::Sigma(8.0),
//!     ..Default::default()
//! };
//!
//! # let (pixels, width, height) = (vec![0.0_f32; 2048 * 4], 2048, 4);
//! // First pass: blind solutions for every row.
//! let first = calibrate_image(&pixels, width, height, &catalog, &config).unwrap();
//!
//! // Second pass guided by the median solution.
//! let config = CalibrationConfig { first_guess: first.first_guess(), ..config };
//! let result = calibrate_image(&pixels, width, height, &catalog, &config).unwrap();
//!
//! result.table.save_to_file("ids.rkyv").unwrap();
//! if let Some(w) = result.table.wavelength_at(0, 1024.0) {
//!     println!("Row 0, pixel 1024: {w:.2} Å");
//! }
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Detection**: estimate the line width, find local maxima above a
//!    threshold and re-centre them on their intensity centroid
//! 2. **Voting**: every catalog triple whose interval ratio matches a triple
//!    of peaks votes for those peaks; unambiguous majorities are kept
//! 3. **Chaining**: identifications are chained into sequences with a
//!    plausible dispersion; gaps are filled and the sequence is extrapolated
//! 4. **Fitting**: pixel as a polynomial of wavelength, rejecting lines with
//!    large residuals until the set of lines is stable
//! 5. **Guided pass**: lines are re-measured where the model predicts them
//!    and the polynomial is refitted
//!

pub mod calibrate;
pub mod catalog;
mod correspondence;
pub mod detection;
pub mod dispersion;
pub mod error;
pub mod matching;

pub use calibrate::{
    calibrate_image, calibrate_row, CalibrationConfig, CalibrationResult, CalibrationStatus,
    CoefficientTable, ImageCalibration, PeakThreshold, ResidualSample, RowSolution,
};
pub use catalog::LineCatalog;
pub use correspondence::Correspondence;
pub use detection::{detect_peaks, line_width};
pub use dispersion::{
    fit_pixel_from_wavelength, fit_wavelength_from_pixel, DispersionFit, DispersionFitConfig,
    DispersionModel,
};
pub use error::{CatalogError, FitError};
pub use matching::{identify_peaks, IdentifyConfig, SequenceSelection};
