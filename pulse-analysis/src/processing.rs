//! Per-event orchestration: baseline, area, and matched-filter detection.

use std::io::Read;

use capture_reader::{CaptureFile, ChannelWaveform};
use drscope_common::{PipelineConfig, Real};
use rayon::prelude::*;

use crate::output::ChannelRecord;
use crate::parameters::Mode;
use crate::pulse_detection::{
    area,
    baseline::{self, Baseline},
    matched_filter,
    template::Template,
};

/// Events decoded per batch before fanning out across the worker pool. The
/// decoder stays strictly sequential; only decoded events are processed in
/// parallel, each worker owning its own scratch.
const BATCH_SIZE: usize = 64;

pub(crate) fn process_channel(
    waveform: ChannelWaveform,
    serial: u32,
    timestamp: Real,
    template: &Template,
    config: &PipelineConfig,
    mode: &Mode,
) -> ChannelRecord {
    let ChannelWaveform {
        channel,
        times,
        voltages,
    } = waveform;

    let Baseline { offset, noise } =
        baseline::estimate(&times, &voltages, config.primary_window.0);
    let corrected: Vec<Real> = voltages.iter().map(|v| v - offset).collect();

    let area = area::pulse_area(&times, &corrected, config.primary_window);
    let primary = matched_filter::find_primary(&times, &corrected, template, config.primary_window);
    let afterpulses = match mode {
        Mode::Primary => None,
        Mode::Afterpulse(_) => Some(matched_filter::find_afterpulses(
            &times,
            &corrected,
            template,
            config.primary_window.1,
            noise,
            config.noise_floor_fraction,
            config.local_max_halfwidth,
        )),
    };

    ChannelRecord {
        serial,
        channel,
        timestamp,
        times,
        voltages,
        offset,
        noise,
        area,
        smoothed_max: primary.smoothed_max,
        tmax: primary.tmax,
        thalfmax: primary.thalfmax,
        afterpulses,
    }
}

fn process_event(
    event: capture_reader::CalibratedEvent,
    template: &Template,
    config: &PipelineConfig,
    mode: &Mode,
) -> Vec<ChannelRecord> {
    let serial = event.serial;
    let timestamp = event.timestamp;
    event
        .channels
        .into_iter()
        .map(|waveform| process_channel(waveform, serial, timestamp, template, config, mode))
        .collect()
}

/// Runs the whole capture through the analysis, handing each finished
/// record to `sink` in event order.
pub(crate) fn process_capture<R: Read>(
    capture: &mut CaptureFile<R>,
    template: &Template,
    config: &PipelineConfig,
    mode: &Mode,
    mut sink: impl FnMut(ChannelRecord) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    loop {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        while batch.len() < BATCH_SIZE {
            match capture.next_event()? {
                Some(event) => batch.push(event),
                None => break,
            }
        }
        if batch.is_empty() {
            return Ok(());
        }
        let records: Vec<Vec<ChannelRecord>> = batch
            .into_par_iter()
            .map(|event| process_event(event, template, config, mode))
            .collect();
        for record in records.into_iter().flatten() {
            sink(record)?;
        }
    }
}
