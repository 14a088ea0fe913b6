//! Image-wide table of per-row dispersion solutions.

use std::ops::Range;
use std::path::Path;

use rkyv::{Archive, Deserialize, Serialize};
use tracing::info;

use super::CalibrationResult;
use crate::dispersion::{DispersionModel, MAX_COEFFS};

/// Dispersion solution of one row as stored in a [`CoefficientTable`].
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct RowSolution {
    /// Coefficients zero-padded to six entries.
    pub coefficients: [f64; MAX_COEFFS],
    pub order: u32,
    pub lines_used: u32,
    pub fit_error: f64,
    /// False for rows that failed to calibrate.
    pub valid: bool,
}

impl RowSolution {
    fn from_result(result: &CalibrationResult) -> Self {
        Self {
            coefficients: result.coefficients,
            order: result.order as u32,
            lines_used: result.lines_used as u32,
            fit_error: result.fit_error,
            valid: result.is_success(),
        }
    }
}

/// Per-row dispersion models of an image, sharing one reference wavelength
/// and one wavelength window for inverse evaluation.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct CoefficientTable {
    pub reference_wavelength: f64,
    /// Bluest wavelength searched when inverting a row model.
    pub blue: f64,
    /// Reddest wavelength searched when inverting a row model.
    pub red: f64,
    pub rows: Vec<RowSolution>,
}

impl CoefficientTable {
    pub fn from_results(results: &[CalibrationResult], reference_wavelength: f64, blue: f64, red: f64) -> Self {
        Self {
            reference_wavelength,
            blue,
            red,
            rows: results.iter().map(RowSolution::from_result).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_valid_calibration(&self, row: usize) -> bool {
        self.rows.get(row).is_some_and(|r| r.valid)
    }

    /// Number of rows with a valid solution.
    pub fn valid_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.valid).count()
    }

    /// Dispersion model of a row, if it was calibrated.
    pub fn model(&self, row: usize) -> Option<DispersionModel> {
        let solution = self.rows.get(row).filter(|r| r.valid)?;
        Some(DispersionModel::from_padded(
            &solution.coefficients,
            solution.order as usize,
            self.reference_wavelength,
        ))
    }

    pub fn pixel_at(&self, row: usize, wavelength: f64) -> Option<f64> {
        self.model(row).map(|m| m.pixel_at(wavelength))
    }

    /// Wavelength imaged at `pixel` of `row`, searched within `[blue, red]`.
    pub fn wavelength_at(&self, row: usize, pixel: f64) -> Option<f64> {
        self.model(row)?.wavelength_at(pixel, self.blue, self.red)
    }

    /// Whether the model of `row` is monotonic over `[start, end]`.
    /// Rows without a valid solution are not.
    pub fn is_monotonic(&self, row: usize, start: f64, end: f64, step: f64) -> bool {
        self.model(row)
            .is_some_and(|m| m.is_monotonic(start, end, step))
    }

    /// Mean dispersion (wavelength units per pixel) between `start` and
    /// `end`, averaged over the valid rows in `rows`.
    pub fn mean_dispersion(&self, start: f64, end: f64, rows: Range<usize>) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for row in rows {
            let Some(model) = self.model(row) else {
                continue;
            };
            let pixels = model.pixel_at(end) - model.pixel_at(start);
            if pixels != 0.0 {
                sum += (end - start) / pixels;
                count += 1;
            }
        }
        (count > 0).then(|| sum / count as f64)
    }

    /// Wavelength range covered by pixels `0..width` over the valid rows in
    /// `rows`, clipped to `[blue, red]`.
    pub fn wavelength_range(&self, width: usize, rows: Range<usize>) -> Option<(f64, f64)> {
        let last = width.checked_sub(1)? as f64;
        let mut range: Option<(f64, f64)> = None;
        for row in rows {
            let Some(model) = self.model(row) else {
                continue;
            };
            let lo = model
                .wavelength_at(0.0, self.blue, self.red)
                .unwrap_or(self.blue);
            let hi = model
                .wavelength_at(last, self.blue, self.red)
                .unwrap_or(self.red);
            range = Some(match range {
                Some((a, b)) => (a.min(lo), b.max(hi)),
                None => (lo, hi),
            });
        }
        range
    }

    // ── Serialization ───────────────────────────────────────────────────────

    /// Serialize the table to bytes using rkyv.
    pub fn to_rkyv_bytes(&self) -> anyhow::Result<Vec<u8>> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map_err(|e| anyhow::anyhow!("rkyv serialization failed: {}", e))?;
        Ok(bytes.to_vec())
    }

    /// Save the table to a file using rkyv.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let bytes = self.to_rkyv_bytes()?;
        std::fs::write(path, &bytes)?;
        info!("Saved coefficient table to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a table from an rkyv file.
    pub fn load_from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let table = rkyv::from_bytes::<Self, rkyv::rancor::Error>(&bytes)
            .map_err(|e| anyhow::anyhow!("rkyv deserialization failed: {}", e))?;
        info!(
            "Loaded coefficient table: {} rows, {} valid",
            table.len(),
            table.valid_rows()
        );
        Ok(table)
    }
}
