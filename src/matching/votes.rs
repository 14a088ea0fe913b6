//! Ratio-invariant voting of peaks for catalog lines.

use tracing::debug;

use super::{IdentifyConfig, Identification};
use crate::catalog::LineCatalog;

/// Cast votes over every (interior catalog line, interior peak) combination
/// and keep the peaks whose vote is unambiguous. `peaks` must be ascending.
pub(super) fn preliminary_identifications(
    peaks: &[f64],
    catalog: &LineCatalog,
    config: &IdentifyConfig,
) -> Vec<Identification> {
    let npeaks = peaks.len();
    let nlines = catalog.len();
    let mut votes: Vec<Vec<usize>> = vec![Vec::new(); npeaks];

    let mut low = Vec::new();
    let mut high = Vec::new();

    for i in 1..nlines - 1 {
        let Some(lratio) = catalog.interval_ratio(i) else {
            continue;
        };
        let lo_step = catalog[i] - catalog[i - 1];
        let hi_step = catalog[i + 1] - catalog[i];

        for j in 1..npeaks - 1 {
            let centre = peaks[j];

            let lo_min = centre - lo_step * config.max_dispersion;
            let lo_max = centre - lo_step * config.min_dispersion;
            low.clear();
            low.extend((0..j).filter(|&k| peaks[k] >= lo_min && peaks[k] <= lo_max));
            if low.is_empty() {
                continue;
            }

            let hi_min = centre + hi_step * config.min_dispersion;
            let hi_max = centre + hi_step * config.max_dispersion;
            high.clear();
            high.extend((j + 1..npeaks).filter(|&k| peaks[k] >= hi_min && peaks[k] <= hi_max));
            if high.is_empty() {
                continue;
            }

            // Closest ratio wins.
            let mut best: Option<(usize, usize, f64)> = None;
            for &l in &low {
                for &h in &high {
                    let pratio = (peaks[h] - centre) / (centre - peaks[l]);
                    let variation = (lratio - pratio).abs() / pratio;
                    if variation < config.ratio_tolerance
                        && best.map_or(true, |(_, _, v)| variation < v)
                    {
                        best = Some((l, h, variation));
                    }
                }
            }

            if let Some((l, h, _)) = best {
                votes[j].push(i);
                votes[l].push(i - 1);
                votes[h].push(i + 1);
            }
        }
    }

    let identifications: Vec<Identification> = votes
        .iter()
        .enumerate()
        .filter_map(|(k, v)| {
            winning_vote(v).map(|line| Identification {
                pixel: peaks[k],
                line,
            })
        })
        .collect();

    debug!(
        "Line voting: {} of {} peaks identified",
        identifications.len(),
        npeaks
    );
    identifications
}

/// The catalog index voted for most, if there are at least two votes and the
/// winner is strictly ahead of every other index.
fn winning_vote(votes: &[usize]) -> Option<usize> {
    if votes.len() < 2 {
        return None;
    }
    let mut sorted = votes.to_vec();
    sorted.sort_unstable();

    let mut best = (sorted[0], 0usize);
    let mut runner_up = 0usize;
    for run in sorted.chunk_by(|a, b| a == b) {
        let count = run.len();
        if count > best.1 {
            runner_up = best.1;
            best = (run[0], count);
        } else if count > runner_up {
            runner_up = count;
        }
    }

    (best.1 > runner_up).then_some(best.0)
}

#[cfg(test)]
mod tests {
    use super::super::SequenceSelection;
    use super::*;

    #[test]
    fn test_winning_vote() {
        assert_eq!(winning_vote(&[]), None);
        assert_eq!(winning_vote(&[4]), None);
        assert_eq!(winning_vote(&[3, 3]), Some(3));
        assert_eq!(winning_vote(&[2, 3]), None);
        assert_eq!(winning_vote(&[2, 3, 2]), Some(2));
        assert_eq!(winning_vote(&[5, 1, 5, 1]), None);
        assert_eq!(winning_vote(&[7, 1, 7, 1, 7]), Some(7));
    }

    #[test]
    fn test_scenario_votes() {
        let catalog = LineCatalog::new(vec![5000.0, 5020.0, 5050.0, 5100.0]).unwrap();
        let config = IdentifyConfig {
            min_dispersion: 0.3,
            max_dispersion: 0.7,
            ratio_tolerance: 0.05,
            selection: SequenceSelection::Longest,
        };
        let ids = preliminary_identifications(&[10.0, 20.0, 35.0, 60.0], &catalog, &config);
        // End peaks receive a single vote each; only the interior ones qualify.
        assert_eq!(
            ids,
            vec![
                Identification { pixel: 20.0, line: 1 },
                Identification { pixel: 35.0, line: 2 },
            ]
        );
    }
}
