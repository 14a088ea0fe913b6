//! Typical emission-line width from the profile derivative.

/// Largest width (and correlation shift) considered, in pixels.
const MAX_WIDTH: usize = 20;

/// Estimate the typical line width of a profile, in pixels.
///
/// The rising flank of a line shows up in the positive part of the
/// derivative and the falling flank in its negative part, one line width
/// later. The width is the shift that maximises the cross-correlation of the
/// positive part with the (negated) negative part, clipped to [1, 20].
pub fn line_width(profile: &[f32]) -> usize {
    if profile.len() < 2 * MAX_WIDTH + 2 {
        return 1;
    }

    let n = profile.len() - 1;
    let mut rising = vec![0.0_f64; n];
    let mut falling = vec![0.0_f64; n];
    for i in 0..n {
        let d = profile[i + 1] as f64 - profile[i] as f64;
        if d > 0.0 {
            rising[i] = d;
        } else {
            falling[i] = -d;
        }
    }

    let norm = rising
        .iter()
        .chain(falling.iter())
        .copied()
        .fold(0.0_f64, f64::max);
    if norm <= 0.0 {
        return 1;
    }
    rising.iter_mut().for_each(|v| *v /= norm);
    falling.iter_mut().for_each(|v| *v /= norm);

    let span = n - 2 * MAX_WIDTH;
    let mut best = 0.0_f64;
    let mut width = 1;
    for shift in 0..=MAX_WIDTH {
        let value: f64 = (MAX_WIDTH..MAX_WIDTH + span)
            .map(|k| rising[k] * falling[k + shift])
            .sum();
        if value > best {
            best = value;
            width = shift;
        }
    }

    width.clamp(1, MAX_WIDTH)
}
