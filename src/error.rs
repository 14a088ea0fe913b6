//! Error types for catalog construction and dispersion fitting.
//!
//! Per-row calibration never fails with an error: the row driver maps these
//! into a [`CalibrationStatus`](crate::CalibrationStatus) and moves on.

/// Reasons a dispersion polynomial could not be fitted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    /// Fewer correspondences than the minimum required for an over-determined fit.
    #[error("{available} lines available, at least {required} required")]
    TooFewLines { available: usize, required: usize },

    /// Polynomial order outside the supported range.
    #[error("polynomial order {0} is not supported (maximum {max})", max = crate::dispersion::MAX_ORDER)]
    UnsupportedOrder(usize),

    /// The least-squares system is rank deficient (e.g. repeated abscissae).
    #[error("least-squares system is singular [n: {n}, k: {k}]")]
    Singular { n: usize, k: usize },

    /// Iterative rejection discarded too many lines.
    #[error("rejection left {remaining} lines, at least {required} required")]
    RejectedBelowMinimum { remaining: usize, required: usize },
}

/// Reasons a wavelength list cannot be used as a line catalog.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error("line catalog is empty")]
    Empty,

    #[error("catalog wavelength at index {0} is not finite")]
    NonFinite(usize),

    #[error("catalog wavelengths must be strictly ascending (index {0})")]
    NotAscending(usize),
}
