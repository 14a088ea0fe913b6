//! Calibration of every row of a 2-D arc-lamp image.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::info;

use super::{calibrate_row, CalibrationConfig, CalibrationResult, CoefficientTable};
use crate::catalog::LineCatalog;
use crate::dispersion::DispersionModel;

/// Fit residual of one line, kept for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualSample {
    pub row: usize,
    pub pixel: f64,
    pub wavelength: f64,
    /// Observed minus modelled pixel position.
    pub residual: f64,
}

/// Result of [`calibrate_image`].
#[derive(Debug, Clone)]
pub struct ImageCalibration {
    pub table: CoefficientTable,
    /// Per-row results, in row order.
    pub rows: Vec<CalibrationResult>,
    /// Residuals of the used lines of every sampled row.
    pub residuals: Vec<ResidualSample>,
}

impl ImageCalibration {
    /// Coefficient-wise median of the models of all calibrated rows.
    ///
    /// Feed it back as [`CalibrationConfig::first_guess`] to guide a second
    /// pass over rows whose own blind solution is poor.
    pub fn first_guess(&self) -> Option<DispersionModel> {
        let models: Vec<&DispersionModel> = self.rows.iter().filter_map(|r| r.model.as_ref()).collect();
        DispersionModel::median(&models)
    }

    /// Number of rows calibrated successfully.
    pub fn success_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_success()).count()
    }
}

/// Calibrate every row of a row-major image independently.
///
/// `pixels` must hold `width * height` samples. Rows that cannot be
/// calibrated are marked invalid in the table; only invalid inputs or an
/// invalid configuration are errors.
pub fn calibrate_image(
    pixels: &[f32],
    width: usize,
    height: usize,
    catalog: &LineCatalog,
    config: &CalibrationConfig,
) -> anyhow::Result<ImageCalibration> {
    anyhow::ensure!(width > 0 && height > 0, "Image must not be empty ({}x{})", width, height);
    anyhow::ensure!(
        pixels.len() == width * height,
        "Pixel data length ({}) does not match width*height ({}x{}={})",
        pixels.len(),
        width,
        height,
        width * height
    );
    config.validate()?;

    #[cfg(feature = "parallel")]
    let rows: Vec<CalibrationResult> = pixels
        .par_chunks(width)
        .map(|row| calibrate_row(row, catalog, config))
        .collect();
    #[cfg(not(feature = "parallel"))]
    let rows: Vec<CalibrationResult> = pixels
        .chunks(width)
        .map(|row| calibrate_row(row, catalog, config))
        .collect();

    let residuals = sample_residuals(&rows, config.residual_sample_step);

    let (blue, red) = catalog.span();
    let table = CoefficientTable::from_results(&rows, config.reference_for(catalog), blue, red);

    let calibration = ImageCalibration {
        table,
        rows,
        residuals,
    };
    info!(
        "Calibrated {} of {} rows ({}x{} image, {} catalog lines)",
        calibration.success_count(),
        height,
        width,
        height,
        catalog.len()
    );
    Ok(calibration)
}

fn sample_residuals(rows: &[CalibrationResult], step: usize) -> Vec<ResidualSample> {
    if step == 0 {
        return Vec::new();
    }
    rows.iter()
        .enumerate()
        .step_by(step)
        .filter_map(|(row, result)| result.model.as_ref().map(|m| (row, m, result)))
        .flat_map(|(row, model, result)| {
            result
                .correspondences
                .iter()
                .filter(|c| c.used)
                .map(move |c| ResidualSample {
                    row,
                    pixel: c.pixel,
                    wavelength: c.wavelength,
                    residual: c.pixel - model.pixel_at(c.wavelength),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_buffers() {
        let catalog = LineCatalog::new(vec![5000.0, 5020.0, 5050.0]).unwrap();
        let config = CalibrationConfig::default();
        assert!(calibrate_image(&[0.0; 10], 4, 3, &catalog, &config).is_err());
        assert!(calibrate_image(&[], 0, 0, &catalog, &config).is_err());
        let bad_config = CalibrationConfig {
            dispersion: -1.0,
            ..Default::default()
        };
        assert!(calibrate_image(&[0.0; 12], 4, 3, &catalog, &bad_config).is_err());
    }

    #[test]
    fn test_blank_image_has_no_valid_rows() {
        let catalog = LineCatalog::new(vec![5000.0, 5020.0, 5050.0]).unwrap();
        let result = calibrate_image(&[10.0; 64 * 4], 64, 4, &catalog, &CalibrationConfig::default()).unwrap();
        assert_eq!(result.rows.len(), 4);
        assert_eq!(result.table.valid_rows(), 0);
        assert!(result.residuals.is_empty());
        assert!(result.first_guess().is_none());
    }
}
