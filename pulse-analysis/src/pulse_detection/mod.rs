//! Offline pulse analysis on calibrated waveforms.
//!
//! A waveform enters as `(time, voltage)` series with non-uniform sample
//! spacing. The baseline estimator fixes the DC offset and noise scale from
//! the pre-trigger region; the matched filter cross-correlates the
//! baseline-subtracted trace with a unit-sum single-pulse template to find
//! the primary pulse with sub-sample timing, or secondary pulses after it;
//! the area module integrates charge over the primary window.

pub(crate) mod area;
pub(crate) mod baseline;
pub(crate) mod matched_filter;
pub(crate) mod template;

pub(crate) use drscope_common::Real;
