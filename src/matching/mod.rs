//! Identification of detected peaks against the line catalog.
//!
//! No prior dispersion model is needed: the ratio of two consecutive
//! wavelength intervals is invariant under any locally affine pixel ↔
//! wavelength transform, so catalog triples can be recognised directly in
//! pixel space. The algorithm:
//!
//! 1. **Voting**: for every interior catalog line and every interior peak,
//!    look for one peak below and one above at distances compatible with the
//!    dispersion window, whose pixel-interval ratio matches the catalog ratio.
//!    The closest matching pair votes for the three lines.
//! 2. **Tally**: a peak with at least two votes and a strict majority becomes
//!    a preliminary identification; ties are dropped as ambiguous.
//! 3. **Chaining**: identifications are chained into self-consistent
//!    sequences, and one sequence is selected (longest, or by CCD region).
//! 4. **Gap filling**: catalog lines missing inside the sequence are
//!    predicted from the neighbouring pair and recovered from the peak list.
//! 5. **Extrapolation**: the sequence is extended one catalog line at a time
//!    beyond both ends.
//!
//! Dispersion bounds are given in pixels per wavelength unit.

mod sequence;
mod votes;

use crate::catalog::LineCatalog;
use crate::correspondence::Correspondence;

/// Fewer peaks than this cannot form a voting triple with neighbours.
pub const MIN_PEAKS: usize = 4;

/// How the matcher chooses among several self-consistent sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceSelection {
    /// The longest sequence; the first one wins on ties.
    #[default]
    Longest,
    /// Multiplexed spectra: the first sequence (of at least two lines) whose
    /// middle pixel, divided by `size` and truncated, equals `index`.
    Region { index: usize, size: usize },
}

/// Configuration for [`identify_peaks`].
#[derive(Debug, Clone, PartialEq)]
pub struct IdentifyConfig {
    /// Lowest plausible dispersion, pixels per wavelength unit.
    pub min_dispersion: f64,
    /// Highest plausible dispersion, pixels per wavelength unit.
    pub max_dispersion: f64,
    /// Largest relative difference between catalog and pixel interval ratios.
    pub ratio_tolerance: f64,
    /// Sequence selection rule.
    pub selection: SequenceSelection,
}

impl IdentifyConfig {
    /// Window from an expected dispersion in wavelength units per pixel and a
    /// fractional tolerance (e.g. 0.2 for ±20%).
    pub fn from_dispersion(dispersion: f64, tolerance: f64, ratio_tolerance: f64) -> Self {
        Self {
            min_dispersion: 1.0 / (dispersion * (1.0 + tolerance)),
            max_dispersion: 1.0 / (dispersion * (1.0 - tolerance)),
            ratio_tolerance,
            selection: SequenceSelection::Longest,
        }
    }

    pub(crate) fn accepts(&self, dispersion: f64) -> bool {
        dispersion >= self.min_dispersion && dispersion <= self.max_dispersion
    }
}

/// Identify peaks with catalog lines.
///
/// Returns the correspondences of the selected sequence ordered by pixel,
/// with absolute catalog wavelengths, or `None` if fewer than
/// [`MIN_PEAKS`] peaks are given or nothing could be identified.
pub fn identify_peaks(
    peaks: &[f64],
    catalog: &LineCatalog,
    config: &IdentifyConfig,
) -> Option<Vec<Correspondence>> {
    let mut peaks: Vec<f64> = peaks.iter().copied().filter(|p| p.is_finite()).collect();
    if peaks.len() < MIN_PEAKS || catalog.len() < 3 {
        return None;
    }
    peaks.sort_by(|a, b| a.total_cmp(b));

    let preliminary = votes::preliminary_identifications(&peaks, catalog, config);
    if preliminary.is_empty() {
        return None;
    }

    let sequences = sequence::chain(&preliminary, catalog, config);
    let mut selected = sequence::select(&sequences, config.selection)?.clone();

    sequence::fill_gaps(&mut selected, &peaks, catalog);
    sequence::extrapolate(&mut selected, &peaks, catalog, config);

    Some(
        selected
            .iter()
            .map(|id| Correspondence::new(id.pixel, catalog[id.line]))
            .collect(),
    )
}

/// A peak assigned to a catalog line index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Identification {
    pub pixel: f64,
    pub line: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_catalog() -> LineCatalog {
        LineCatalog::new(vec![5000.0, 5020.0, 5050.0, 5100.0]).unwrap()
    }

    fn config(min: f64, max: f64) -> IdentifyConfig {
        IdentifyConfig {
            min_dispersion: min,
            max_dispersion: max,
            ratio_tolerance: 0.05,
            selection: SequenceSelection::Longest,
        }
    }

    #[test]
    fn test_four_line_scenario() {
        let peaks = [10.0, 20.0, 35.0, 60.0];
        let ids = identify_peaks(&peaks, &scenario_catalog(), &config(0.3, 0.7)).unwrap();
        let got: Vec<(f64, f64)> = ids.iter().map(|c| (c.pixel, c.wavelength)).collect();
        assert_eq!(
            got,
            vec![(10.0, 5000.0), (20.0, 5020.0), (35.0, 5050.0), (60.0, 5100.0)]
        );
    }

    #[test]
    fn test_unordered_input() {
        let peaks = [35.0, 60.0, 10.0, 20.0];
        let ids = identify_peaks(&peaks, &scenario_catalog(), &config(0.3, 0.7)).unwrap();
        assert_eq!(ids.len(), 4);
        assert!(ids.windows(2).all(|w| w[0].pixel < w[1].pixel));
    }

    #[test]
    fn test_too_few_peaks() {
        assert!(identify_peaks(&[10.0, 20.0, 35.0], &scenario_catalog(), &config(0.3, 0.7)).is_none());
    }

    #[test]
    fn test_dispersion_window_excludes_truth() {
        // True dispersion is 0.5 px/Å; a window of [1, 2] px/Å finds nothing.
        let peaks = [10.0, 20.0, 35.0, 60.0];
        assert!(identify_peaks(&peaks, &scenario_catalog(), &config(1.0, 2.0)).is_none());
    }

    #[test]
    fn test_from_dispersion() {
        let c = IdentifyConfig::from_dispersion(2.0, 0.2, 0.05);
        assert!((c.min_dispersion - 1.0 / 2.4).abs() < 1e-12);
        assert!((c.max_dispersion - 1.0 / 1.6).abs() < 1e-12);
        assert!(c.accepts(0.5));
        assert!(!c.accepts(0.7));
    }

    #[test]
    fn test_region_selection() {
        // Two copies of the same spectrum multiplexed in one row.
        let peaks = [10.0, 20.0, 35.0, 60.0, 110.0, 120.0, 135.0, 160.0];
        let catalog = scenario_catalog();

        let first = identify_peaks(&peaks, &catalog, &config(0.3, 0.7)).unwrap();
        assert_eq!(first.iter().map(|c| c.pixel).collect::<Vec<_>>(), vec![10.0, 20.0, 35.0, 60.0]);

        let mut cfg = config(0.3, 0.7);
        cfg.selection = SequenceSelection::Region { index: 1, size: 100 };
        let second = identify_peaks(&peaks, &catalog, &cfg).unwrap();
        assert_eq!(
            second.iter().map(|c| c.pixel).collect::<Vec<_>>(),
            vec![110.0, 120.0, 135.0, 160.0]
        );
        assert_eq!(second[0].wavelength, 5000.0);

        cfg.selection = SequenceSelection::Region { index: 3, size: 100 };
        assert!(identify_peaks(&peaks, &catalog, &cfg).is_none());
    }

    #[test]
    fn test_quadratic_spectrum_with_ratio_invariance() {
        let catalog = LineCatalog::new(vec![
            4000.0, 4046.0, 4110.0, 4158.0, 4240.0, 4287.0, 4360.0, 4402.0, 4491.0, 4538.0, 4610.0,
            4680.0, 4733.0, 4810.0, 4852.0,
        ])
        .unwrap();
        let truth = |w: f64| 100.0 + 0.5 * (w - 4400.0) + 2e-5 * (w - 4400.0).powi(2);
        let peaks: Vec<f64> = catalog.wavelengths().iter().map(|&w| truth(w)).collect();
        let cfg = IdentifyConfig::from_dispersion(2.0, 0.2, 0.05);

        let ids = identify_peaks(&peaks, &catalog, &cfg).unwrap();
        assert_eq!(ids.len(), catalog.len());
        for c in &ids {
            assert!((c.pixel - truth(c.wavelength)).abs() < 1e-9);
        }
        for w in ids.windows(3) {
            let lratio = (w[2].wavelength - w[1].wavelength) / (w[1].wavelength - w[0].wavelength);
            let pratio = (w[2].pixel - w[1].pixel) / (w[1].pixel - w[0].pixel);
            assert!((lratio - pratio).abs() / pratio < cfg.ratio_tolerance);
        }
    }
}
