//! Conversion of raw event records into calibrated time/voltage series.

use drscope_common::{Channel, N_BINS, Polarity, RawAdc, Real};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ChannelWaveform {
    pub channel: Channel,
    /// Sample times in ns, strictly increasing within the record.
    pub times: Vec<Real>,
    /// Calibrated amplitudes in mV, polarity already applied.
    pub voltages: Vec<Real>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CalibratedEvent {
    pub serial: u32,
    /// Unix epoch seconds of the event trigger.
    pub timestamp: Real,
    pub board_number: u16,
    pub trigger_cell: u16,
    pub channels: Vec<ChannelWaveform>,
}

/// Index holding the sampling-ring origin once the width table has been
/// rotated by the trigger cell.
pub fn origin_index(trigger_cell: u16) -> usize {
    (N_BINS - trigger_cell as usize) % N_BINS
}

/// Recovers absolute sample times from the per-cell width table.
///
/// Acquisition starts at the trigger cell of the circular buffer, so the
/// widths are rotated left by `trigger_cell` before the prefix sum. The
/// first sample sits at zero and the final width never contributes.
pub fn reconstruct_times(bin_widths: &[f32], trigger_cell: u16) -> Vec<Real> {
    let cell = trigger_cell as usize;
    let mut times = Vec::with_capacity(bin_widths.len());
    let mut elapsed = 0.0;
    times.push(0.0);
    for index in 0..bin_widths.len().saturating_sub(1) {
        elapsed += bin_widths[(index + cell) % bin_widths.len()] as Real;
        times.push(elapsed);
    }
    times
}

/// Maps raw ADC counts onto mV about the configured range centre.
pub fn calibrate_voltages(
    samples: &[RawAdc],
    range_center: Real,
    polarity: Polarity,
) -> Vec<Real> {
    samples
        .iter()
        .map(|&raw| {
            polarity.factor()
                * (raw as Real / RawAdc::MAX as Real * 1000.0 - 500.0 + range_center)
        })
        .collect()
}
