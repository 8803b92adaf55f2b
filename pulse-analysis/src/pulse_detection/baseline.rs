use super::Real;
use drscope_common::SETTLING_SAMPLES;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Baseline {
    pub(crate) offset: Real,
    pub(crate) noise: Real,
}

/// Offset and noise from the pre-trigger region, computed fresh per event.
///
/// The window runs from the settling cutoff up to three quarters of the
/// first sample index past `window_start`. Offset is the window mean;
/// noise is half the 95th-5th percentile spread of the same window.
pub(crate) fn estimate(times: &[Real], voltages: &[Real], window_start: Real) -> Baseline {
    let istart = times
        .iter()
        .position(|&t| t > window_start)
        .unwrap_or(times.len());
    let upper = (istart * 3 / 4).min(voltages.len());
    if upper <= SETTLING_SAMPLES {
        return Baseline::default();
    }

    let window = &voltages[SETTLING_SAMPLES..upper];
    let offset = window.iter().sum::<Real>() / window.len() as Real;

    let mut sorted = window.to_vec();
    sorted.sort_by(Real::total_cmp);
    let noise = 0.5 * (percentile(&sorted, 95.0) - percentile(&sorted, 5.0));

    Baseline { offset, noise }
}

/// Percentile by linear interpolation between closest ranks; `sorted` must
/// be ascending and non-empty.
pub(crate) fn percentile(sorted: &[Real], q: Real) -> Real {
    match sorted {
        [] => 0.0,
        [only] => *only,
        _ => {
            let rank = q / 100.0 * (sorted.len() - 1) as Real;
            let low = rank.floor() as usize;
            let high = rank.ceil() as usize;
            sorted[low] + (sorted[high] - sorted[low]) * (rank - low as Real)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn uniform_times(count: usize) -> Vec<Real> {
        (0..count).map(|i| i as Real).collect()
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let sorted: Vec<Real> = (1..=100).map(|i| i as Real).collect();
        assert_approx_eq!(percentile(&sorted, 5.0), 5.95, 1e-9);
        assert_approx_eq!(percentile(&sorted, 50.0), 50.5, 1e-9);
        assert_approx_eq!(percentile(&sorted, 95.0), 95.05, 1e-9);
        assert_approx_eq!(percentile(&sorted, 0.0), 1.0, 1e-9);
        assert_approx_eq!(percentile(&sorted, 100.0), 100.0, 1e-9);
    }

    #[test]
    fn constant_window_has_exact_offset_and_no_noise() {
        let times = uniform_times(1024);
        let voltages = vec![7.25; 1024];
        let baseline = estimate(&times, &voltages, 400.0);
        assert_approx_eq!(baseline.offset, 7.25, 1e-12);
        assert_approx_eq!(baseline.noise, 0.0, 1e-12);
    }

    #[test]
    fn uniform_spread_noise_matches_percentile_width() {
        // Samples cycle evenly through [10 - r, 10 + r]; the 95th-5th
        // percentile spread of a uniform distribution is 0.9 of its width.
        let r = 4.0;
        let times = uniform_times(1024);
        let voltages: Vec<Real> = (0..1024)
            .map(|i| 10.0 + r * ((i % 21) as Real - 10.0) / 10.0)
            .collect();
        let baseline = estimate(&times, &voltages, 400.0);
        assert_approx_eq!(baseline.offset, 10.0, 0.1);
        assert_approx_eq!(baseline.noise, 0.9 * r, 0.05 * r);
    }

    #[test]
    fn settling_samples_are_excluded() {
        let times = uniform_times(1024);
        let mut voltages = vec![5.0; 1024];
        for sample in voltages.iter_mut().take(SETTLING_SAMPLES) {
            *sample = 1000.0;
        }
        let baseline = estimate(&times, &voltages, 400.0);
        assert_approx_eq!(baseline.offset, 5.0, 1e-12);
    }

    #[test]
    fn degenerate_window_yields_zeroes() {
        let times = uniform_times(1024);
        let voltages = vec![5.0; 1024];
        // window start before any usable samples
        let baseline = estimate(&times, &voltages, 10.0);
        assert_eq!(baseline, Baseline::default());
    }
}
