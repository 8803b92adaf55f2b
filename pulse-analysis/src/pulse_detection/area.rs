use super::Real;
use itertools::izip;

/// Trapezoidal integral of the waveform over the half-open time window.
/// The rule works pairwise on the native axis, so unequal sample spacing
/// is integrated exactly.
pub(crate) fn pulse_area(times: &[Real], voltages: &[Real], window: (Real, Real)) -> Real {
    let (start, end) = window;
    let istart = times.iter().position(|&t| t >= start).unwrap_or(times.len());
    let iend = times.iter().position(|&t| t >= end).unwrap_or(times.len());
    trapezoid(&times[istart..iend], &voltages[istart..iend])
}

fn trapezoid(times: &[Real], voltages: &[Real]) -> Real {
    if times.len() < 2 {
        return 0.0;
    }
    izip!(times, &times[1..], voltages, &voltages[1..])
        .map(|(t0, t1, v0, v1)| 0.5 * (v0 + v1) * (t1 - t0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn honours_unequal_spacing() {
        let times = [0.0, 1.0, 3.0, 6.0];
        let voltages = [0.0, 2.0, 2.0, 4.0];
        assert_approx_eq!(pulse_area(&times, &voltages, (0.0, 10.0)), 14.0, 1e-12);
    }

    #[test]
    fn window_selects_a_sub_range() {
        let times = [0.0, 1.0, 3.0, 6.0];
        let voltages = [0.0, 2.0, 2.0, 4.0];
        assert_approx_eq!(pulse_area(&times, &voltages, (1.0, 6.0)), 4.0, 1e-12);
    }

    #[test]
    fn empty_or_single_sample_window_is_zero() {
        let times = [0.0, 1.0, 2.0];
        let voltages = [5.0, 5.0, 5.0];
        assert_eq!(pulse_area(&times, &voltages, (10.0, 20.0)), 0.0);
        assert_eq!(pulse_area(&times, &voltages, (1.0, 1.5)), 0.0);
    }

    #[test]
    fn flat_baseline_subtracted_signal_integrates_to_zero() {
        let times: Vec<Real> = (0..100).map(|i| 0.5 * i as Real).collect();
        let voltages = vec![0.0; 100];
        assert_eq!(pulse_area(&times, &voltages, (10.0, 40.0)), 0.0);
    }
}
