use super::{Real, template::Template};
use drscope_common::TIME_SENTINEL;

/// Matched-filter amplitudes below this are reported as "no pulse found".
pub(crate) const CONFIDENCE_FLOOR: Real = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PrimaryPulse {
    /// Maximum of the matched-filter output inside the primary window.
    pub(crate) smoothed_max: Real,
    /// Time of that maximum, or the sentinel.
    pub(crate) tmax: Real,
    /// Interpolated time at which the output last rose through half the
    /// maximum, or the sentinel.
    pub(crate) thalfmax: Real,
}

impl Default for PrimaryPulse {
    fn default() -> Self {
        PrimaryPulse {
            smoothed_max: TIME_SENTINEL,
            tmax: TIME_SENTINEL,
            thalfmax: TIME_SENTINEL,
        }
    }
}

/// Cross-correlation of the waveform with the kernel over the valid
/// overlap: output length `len(voltages) - len(kernel) + 1`.
pub(crate) fn correlate(voltages: &[Real], kernel: &[Real]) -> Vec<Real> {
    if kernel.is_empty() || voltages.len() < kernel.len() {
        return Vec::new();
    }
    (0..=voltages.len() - kernel.len())
        .map(|start| {
            kernel
                .iter()
                .zip(&voltages[start..])
                .map(|(k, v)| k * v)
                .sum()
        })
        .collect()
}

/// Locates the primary pulse inside `window` on the baseline-subtracted
/// waveform. Sample `i` of the correlation corresponds to waveform sample
/// `i + peak_index`, which keeps the output aligned with the pulse peak.
pub(crate) fn find_primary(
    times: &[Real],
    voltages: &[Real],
    template: &Template,
    window: (Real, Real),
) -> PrimaryPulse {
    let convolved = correlate(voltages, template.kernel());
    if convolved.is_empty() {
        return PrimaryPulse::default();
    }
    let peak = template.peak_index();
    let convolved_times = &times[peak..peak + convolved.len()];

    let (start, end) = window;
    let icstart = convolved_times
        .iter()
        .position(|&t| t >= start)
        .unwrap_or(convolved_times.len());
    let icend = convolved_times
        .iter()
        .position(|&t| t >= end)
        .unwrap_or(convolved_times.len());
    if icstart >= icend {
        return PrimaryPulse::default();
    }

    let mut icmax = icstart;
    for index in icstart..icend {
        if convolved[index] > convolved[icmax] {
            icmax = index;
        }
    }
    let cmax = convolved[icmax];
    if cmax < CONFIDENCE_FLOOR {
        return PrimaryPulse {
            smoothed_max: cmax,
            ..Default::default()
        };
    }

    let mut half = icmax;
    while half > icstart && convolved[half] > cmax / 2.0 {
        half -= 1;
    }
    let thalfmax = if convolved[half] > cmax / 2.0 {
        // left the search window without crossing half maximum
        TIME_SENTINEL
    } else {
        convolved_times[half]
            + (convolved_times[half + 1] - convolved_times[half])
                / (convolved[half + 1] - convolved[half])
                * (cmax / 2.0 - convolved[half])
    };

    PrimaryPulse {
        smoothed_max: cmax,
        tmax: convolved_times[icmax],
        thalfmax,
    }
}

/// Secondary peaks strictly after the primary window: samples where the
/// matched-filter output is the maximum over `±halfwidth` neighbours
/// (clamped at the array edges) and above the noise floor. Returns
/// full-waveform sample indices in time order. An empty result is a normal
/// outcome, not an error.
pub(crate) fn find_afterpulses(
    times: &[Real],
    voltages: &[Real],
    template: &Template,
    window_end: Real,
    noise: Real,
    noise_floor_fraction: Real,
    halfwidth: usize,
) -> Vec<usize> {
    if noise == 0.0 {
        // a flat record with zero noise yields no detections
        return Vec::new();
    }
    let convolved = correlate(voltages, template.kernel());
    let peak = template.peak_index();
    let threshold = noise * noise_floor_fraction;

    let mut peaks = Vec::new();
    for index in 0..convolved.len() {
        if times[index + peak] < window_end || convolved[index] <= threshold {
            continue;
        }
        let low = index.saturating_sub(halfwidth);
        let high = (index + halfwidth + 1).min(convolved.len());
        let local_max = convolved[low..high]
            .iter()
            .fold(Real::NEG_INFINITY, |acc, &value| acc.max(value));
        if convolved[index] >= local_max {
            peaks.push(index + peak);
        }
    }
    peaks
}
