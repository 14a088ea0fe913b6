//! Chaining of identifications into sequences, selection, gap filling and
//! extrapolation.

use tracing::debug;

use super::{IdentifyConfig, Identification, SequenceSelection};
use crate::catalog::LineCatalog;

/// Largest distance (pixels) between a predicted and a recovered peak inside a gap.
const GAP_TOLERANCE_PX: f64 = 2.0;

/// Largest distance (pixels) between a predicted and a recovered peak beyond the ends.
const EXTRAPOLATION_TOLERANCE_PX: f64 = 6.0;

/// Extrapolated peaks closer than this to the current end point are refused.
const MIN_SEPARATION_PX: f64 = 1.0;

fn dispersion(a: &Identification, b: &Identification, catalog: &LineCatalog) -> f64 {
    (b.pixel - a.pixel) / (catalog[b.line] - catalog[a.line])
}

/// Chain identifications (ascending in pixel) into self-consistent sequences.
///
/// Each sequence starts at the first identification not yet assigned and is
/// greedily extended with every later free identification whose dispersion
/// with respect to the current end lies inside the window.
pub(super) fn chain(
    identifications: &[Identification],
    catalog: &LineCatalog,
    config: &IdentifyConfig,
) -> Vec<Vec<Identification>> {
    let mut assigned = vec![false; identifications.len()];
    let mut sequences = Vec::new();

    while let Some(start) = assigned.iter().position(|a| !a) {
        assigned[start] = true;
        let mut seq = vec![identifications[start]];
        for k in start + 1..identifications.len() {
            if assigned[k] {
                continue;
            }
            let last = seq[seq.len() - 1];
            if config.accepts(dispersion(&last, &identifications[k], catalog)) {
                assigned[k] = true;
                seq.push(identifications[k]);
            }
        }
        sequences.push(seq);
    }

    debug!(
        "Chained {} identifications into {} sequences",
        identifications.len(),
        sequences.len()
    );
    sequences
}

/// Pick the sequence to keep.
pub(super) fn select(
    sequences: &[Vec<Identification>],
    selection: SequenceSelection,
) -> Option<&Vec<Identification>> {
    match selection {
        SequenceSelection::Longest => {
            let mut best: Option<&Vec<Identification>> = None;
            for seq in sequences {
                if best.map_or(true, |b| seq.len() > b.len()) {
                    best = Some(seq);
                }
            }
            best
        }
        SequenceSelection::Region { index, size } => {
            if size == 0 {
                return None;
            }
            sequences.iter().find(|seq| {
                seq.len() > 1 && (seq[seq.len() / 2].pixel / size as f64) as usize == index
            })
        }
    }
}

/// Nearest peak to `predicted` within `tolerance` that is not in `seq` and
/// passes `accept`.
fn nearest_free(
    peaks: &[f64],
    seq: &[Identification],
    predicted: f64,
    tolerance: f64,
    accept: impl Fn(f64) -> bool,
) -> Option<f64> {
    peaks
        .iter()
        .copied()
        .filter(|p| (p - predicted).abs() <= tolerance)
        .filter(|p| !seq.iter().any(|id| id.pixel == *p))
        .filter(|&p| accept(p))
        .min_by(|a, b| (a - predicted).abs().total_cmp(&(b - predicted).abs()))
}

/// Recover catalog lines missing between adjacent identifications.
///
/// The dispersion of the pair bounding the gap predicts each missing line in
/// turn, starting from the last recovered point. The gap is abandoned at the
/// first line with no peak near its prediction.
pub(super) fn fill_gaps(seq: &mut Vec<Identification>, peaks: &[f64], catalog: &LineCatalog) {
    let mut k = 1;
    while k < seq.len() {
        let (a, b) = (seq[k - 1], seq[k]);
        if b.line > a.line + 1 {
            let disp = dispersion(&a, &b, catalog);
            let mut anchor = a;
            for line in a.line + 1..b.line {
                let predicted = anchor.pixel + (catalog[line] - catalog[anchor.line]) * disp;
                match nearest_free(peaks, seq, predicted, GAP_TOLERANCE_PX, |_| true) {
                    Some(pixel) => {
                        anchor = Identification { pixel, line };
                        seq.insert(k, anchor);
                        k += 1;
                    }
                    None => break,
                }
            }
        }
        k += 1;
    }
}

/// Extend the sequence one catalog line at a time, forwards then backwards.
///
/// The local dispersion comes from the two points at the growing end and
/// must stay inside the window.
pub(super) fn extrapolate(
    seq: &mut Vec<Identification>,
    peaks: &[f64],
    catalog: &LineCatalog,
    config: &IdentifyConfig,
) {
    let added_before = seq.len();

    while seq.len() >= 2 {
        let last = seq[seq.len() - 1];
        let prev = seq[seq.len() - 2];
        if last.line + 1 >= catalog.len() {
            break;
        }
        let disp = dispersion(&prev, &last, catalog);
        if !config.accepts(disp) {
            break;
        }
        let line = last.line + 1;
        let step = catalog[line] - catalog[last.line];
        let predicted = last.pixel + step * disp;
        // The new point must lie beyond the end, at a plausible dispersion.
        let beyond = |pixel: f64| {
            pixel - last.pixel > MIN_SEPARATION_PX && config.accepts((pixel - last.pixel) / step)
        };
        match nearest_free(peaks, seq, predicted, EXTRAPOLATION_TOLERANCE_PX, beyond) {
            Some(pixel) => seq.push(Identification { pixel, line }),
            None => break,
        }
    }

    while seq.len() >= 2 {
        let first = seq[0];
        let next = seq[1];
        if first.line == 0 {
            break;
        }
        let disp = dispersion(&first, &next, catalog);
        if !config.accepts(disp) {
            break;
        }
        let line = first.line - 1;
        let step = catalog[first.line] - catalog[line];
        let predicted = first.pixel - step * disp;
        let before = |pixel: f64| {
            first.pixel - pixel > MIN_SEPARATION_PX && config.accepts((first.pixel - pixel) / step)
        };
        match nearest_free(peaks, seq, predicted, EXTRAPOLATION_TOLERANCE_PX, before) {
            Some(pixel) => seq.insert(0, Identification { pixel, line }),
            None => break,
        }
    }

    debug!(
        "Extrapolation added {} lines ({} total)",
        seq.len() - added_before,
        seq.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(pixel: f64, line: usize) -> Identification {
        Identification { pixel, line }
    }

    fn catalog() -> LineCatalog {
        LineCatalog::new(vec![5000.0, 5020.0, 5050.0, 5100.0]).unwrap()
    }

    fn config() -> IdentifyConfig {
        IdentifyConfig {
            min_dispersion: 0.3,
            max_dispersion: 0.7,
            ratio_tolerance: 0.05,
            selection: SequenceSelection::Longest,
        }
    }

    #[test]
    fn test_chain_splits_inconsistent_runs() {
        let ids = [id(20.0, 1), id(35.0, 2), id(40.0, 0), id(120.0, 1), id(135.0, 2)];
        let seqs = chain(&ids, &catalog(), &config());
        assert_eq!(
            seqs,
            vec![
                vec![id(20.0, 1), id(35.0, 2)],
                vec![id(40.0, 0)],
                vec![id(120.0, 1), id(135.0, 2)],
            ]
        );
    }

    #[test]
    fn test_select_longest_first_on_ties() {
        let a = vec![id(1.0, 0), id(2.0, 1)];
        let b = vec![id(5.0, 0), id(6.0, 1)];
        let c = vec![id(9.0, 0)];
        let seqs = vec![c, a.clone(), b];
        assert_eq!(select(&seqs, SequenceSelection::Longest), Some(&a));
        assert_eq!(select(&[], SequenceSelection::Longest), None);
    }

    #[test]
    fn test_select_region_skips_singletons() {
        let single = vec![id(150.0, 0)];
        let pair = vec![id(140.0, 0), id(160.0, 1)];
        let seqs = vec![single, pair.clone()];
        let region = SequenceSelection::Region { index: 1, size: 100 };
        assert_eq!(select(&seqs, region), Some(&pair));
        assert_eq!(select(&seqs, SequenceSelection::Region { index: 1, size: 0 }), None);
    }

    #[test]
    fn test_fill_gap() {
        let mut seq = vec![id(10.0, 0), id(60.0, 3)];
        fill_gaps(&mut seq, &[10.0, 20.5, 35.0, 60.0], &catalog());
        assert_eq!(seq, vec![id(10.0, 0), id(20.5, 1), id(35.0, 2), id(60.0, 3)]);
    }

    #[test]
    fn test_fill_gap_stops_on_first_miss() {
        let mut seq = vec![id(10.0, 0), id(60.0, 3)];
        // Line 1 predicted at 20 has no peak within 2 px; line 2 is not tried.
        fill_gaps(&mut seq, &[10.0, 25.0, 35.0, 60.0], &catalog());
        assert_eq!(seq, vec![id(10.0, 0), id(60.0, 3)]);
    }

    #[test]
    fn test_extrapolate_both_ends() {
        let mut seq = vec![id(20.0, 1), id(35.0, 2)];
        extrapolate(&mut seq, &[10.4, 20.0, 35.0, 59.5], &catalog(), &config());
        assert_eq!(seq, vec![id(10.4, 0), id(20.0, 1), id(35.0, 2), id(59.5, 3)]);
    }

    #[test]
    fn test_extrapolate_needs_peak_within_tolerance() {
        let mut seq = vec![id(20.0, 1), id(35.0, 2)];
        extrapolate(&mut seq, &[3.0, 20.0, 35.0, 67.0], &catalog(), &config());
        assert_eq!(seq, vec![id(20.0, 1), id(35.0, 2)]);
    }

    #[test]
    fn test_extrapolate_keeps_pixel_order() {
        // Line 3 is only 4 Å past line 2: its prediction (37) is nearest to
        // the peak at 33, which lies behind the end of the sequence.
        let catalog = LineCatalog::new(vec![5000.0, 5020.0, 5050.0, 5054.0]).unwrap();
        let mut seq = vec![id(20.0, 1), id(35.0, 2)];
        extrapolate(&mut seq, &[10.0, 20.0, 33.0, 35.0], &catalog, &config());
        assert_eq!(seq, vec![id(10.0, 0), id(20.0, 1), id(35.0, 2)]);
        assert!(seq.windows(2).all(|w| w[0].pixel < w[1].pixel));
    }

    #[test]
    fn test_extrapolate_backward_keeps_pixel_order() {
        // Line 0 is 4 Å below line 1; the peak at 22 sits above the start.
        let catalog = LineCatalog::new(vec![5016.0, 5020.0, 5050.0, 5100.0]).unwrap();
        let mut seq = vec![id(20.0, 1), id(35.0, 2)];
        extrapolate(&mut seq, &[20.0, 22.0, 35.0, 60.0], &catalog, &config());
        assert_eq!(seq, vec![id(20.0, 1), id(35.0, 2), id(60.0, 3)]);
    }
}
