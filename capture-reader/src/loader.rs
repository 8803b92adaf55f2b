//! Capture-file parsing: header discovery and per-event record decoding.

use std::io::Read;

use chrono::{DateTime, TimeZone, Utc};
use drscope_common::{Channel, N_BINS, PipelineConfig, RawAdc, Real};
use tracing::{debug, info};

use crate::calibrate::{self, CalibratedEvent, ChannelWaveform};
use crate::error::FormatError;
use crate::peek::PeekReader;

const FILE_TAG: &[u8; 4] = b"DRS2";
const TIME_TAG: &[u8; 4] = b"TIME";
const BOARD_TAG: &[u8; 2] = b"B#";
const EVENT_TAG: &[u8; 4] = b"EHDR";

#[derive(Debug)]
pub struct ChannelCalibration {
    pub channel: Channel,
    /// Per-cell sampling intervals in ns.
    pub bin_widths: Vec<f32>,
}

#[derive(Debug)]
pub struct CaptureHeader {
    pub board_id: u16,
    /// Channel descriptors in file discovery order.
    pub channels: Vec<ChannelCalibration>,
}

impl CaptureHeader {
    fn load<R: Read>(reader: &mut PeekReader<R>) -> Result<Self, FormatError> {
        let file_tag = load_tag(reader)?;
        if &file_tag != FILE_TAG {
            return Err(FormatError::BadFileHeader(file_tag));
        }
        let time_tag = load_tag(reader)?;
        if &time_tag != TIME_TAG {
            return Err(FormatError::BadTimeHeader(time_tag));
        }

        let mut header: Option<CaptureHeader> = None;
        while reader.peek(2)? == BOARD_TAG {
            reader.consume(2);
            if header.is_some() {
                return Err(FormatError::MultipleBoards);
            }
            let board_id = load_u16(reader)?;
            debug!("found board {board_id}");

            let mut channels = Vec::new();
            loop {
                let channel = match reader.peek(3)? {
                    [b'C', b'0', digit] if digit.is_ascii_digit() => digit - b'0',
                    _ => break,
                };
                reader.consume(3);
                debug!("found channel {channel} on board {board_id}");
                channels.push(ChannelCalibration {
                    channel,
                    bin_widths: load_f32_array(reader, N_BINS)?,
                });
            }
            if channels.is_empty() {
                return Err(FormatError::NoChannels(board_id));
            }
            header = Some(CaptureHeader { board_id, channels });
        }
        header.ok_or(FormatError::NoBoards)
    }
}

/// A lazily decoded capture. Events come back in file order via
/// [`CaptureFile::next_event`] or the `Iterator` impl; the cursor cannot be
/// rewound, so a second pass means reopening the source.
pub struct CaptureFile<R: Read> {
    reader: PeekReader<R>,
    header: CaptureHeader,
    config: PipelineConfig,
    interval_sum: Real,
    interval_count: u64,
    first_event_time: Option<DateTime<Utc>>,
    events_read: u64,
    finished: bool,
}

impl<R: Read> CaptureFile<R> {
    pub fn open(source: R, config: &PipelineConfig) -> Result<Self, FormatError> {
        let mut reader = PeekReader::new(source);
        let header = CaptureHeader::load(&mut reader)?;
        for &channel in &config.read_channels {
            if !header.channels.iter().any(|c| c.channel == channel) {
                return Err(FormatError::MissingChannel(channel));
            }
        }
        info!(
            board = header.board_id,
            channels = header.channels.len(),
            "capture header decoded"
        );
        Ok(CaptureFile {
            reader,
            header,
            config: config.clone(),
            interval_sum: 0.0,
            interval_count: 0,
            first_event_time: None,
            events_read: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> &CaptureHeader {
        &self.header
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    /// Channel numbers actually retained, in file order.
    pub fn retained_channels(&self) -> Vec<Channel> {
        self.header
            .channels
            .iter()
            .map(|c| c.channel)
            .filter(|&c| self.config.retains(c))
            .collect()
    }

    /// Trigger time of the first event decoded so far.
    pub fn acquisition_date(&self) -> Option<DateTime<Utc>> {
        self.first_event_time
    }

    /// Reciprocal of the mean sampling interval over every retained channel
    /// of every event decoded so far: GHz when bin widths are in ns.
    pub fn measured_sample_rate(&self) -> Option<Real> {
        (self.interval_count > 0).then(|| self.interval_count as Real / self.interval_sum)
    }

    /// Decodes the next event, or `None` once the stream ends cleanly at an
    /// event boundary. Ending anywhere else is a [`FormatError`].
    pub fn next_event(&mut self) -> Result<Option<CalibratedEvent>, FormatError> {
        if self.finished {
            return Ok(None);
        }
        let peeked = self.reader.peek(4)?;
        if peeked.is_empty() {
            self.finished = true;
            return Ok(None);
        }
        let tag: [u8; 4] = peeked.try_into().map_err(|_| FormatError::BadEventData)?;
        if &tag != EVENT_TAG {
            return Err(FormatError::BadEventHeader);
        }
        self.reader.consume(4);

        let serial = load_u32(&mut self.reader)?;
        let mut date = [0u16; 7];
        for field in &mut date {
            *field = load_u16(&mut self.reader)?;
        }
        let trigger_time =
            event_datetime(&date).ok_or(FormatError::BadTimestamp { serial })?;
        let range_center = load_u16(&mut self.reader)? as Real;
        skip(&mut self.reader, 2)?;
        let board_number = load_u16(&mut self.reader)?;
        skip(&mut self.reader, 2)?;
        let trigger_cell = load_u16(&mut self.reader)?;
        if trigger_cell as usize >= N_BINS {
            return Err(FormatError::BadTriggerCell {
                serial,
                trigger_cell,
            });
        }

        let mut time_origin: Option<Real> = None;
        let mut channels = Vec::new();
        for calibration in &self.header.channels {
            let tag = load_tag(&mut self.reader)?;
            if tag != [b'C', b'0', b'0', b'0' + calibration.channel] {
                return Err(FormatError::BadEventData);
            }
            let _scaler = load_u32(&mut self.reader)?;
            // Unrequested channels are still decoded in full to keep the
            // stream aligned with the next record.
            let samples = load_u16_array(&mut self.reader, N_BINS)?;
            if !self.config.retains(calibration.channel) {
                continue;
            }

            let mut times = calibrate::reconstruct_times(&calibration.bin_widths, trigger_cell);
            self.interval_sum += (times[N_BINS - 1] - times[0]) / (N_BINS - 1) as Real;
            self.interval_count += 1;

            // The first retained channel pins the absolute origin; later
            // channels shift so equal sample indices mean equal time.
            let origin = times[calibrate::origin_index(trigger_cell)];
            match time_origin {
                None => time_origin = Some(origin),
                Some(first) => {
                    let shift = origin - first;
                    for time in &mut times {
                        *time -= shift;
                    }
                }
            }

            channels.push(ChannelWaveform {
                channel: calibration.channel,
                times,
                voltages: calibrate::calibrate_voltages(
                    &samples,
                    range_center,
                    self.config.polarity,
                ),
            });
        }

        self.first_event_time.get_or_insert(trigger_time);
        self.events_read += 1;
        Ok(Some(CalibratedEvent {
            serial,
            timestamp: trigger_time.timestamp_millis() as Real / 1000.0,
            board_number,
            trigger_cell,
            channels,
        }))
    }
}

impl<R: Read> Iterator for CaptureFile<R> {
    type Item = Result<CalibratedEvent, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_event() {
            Ok(event) => event.map(Ok),
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn event_datetime(fields: &[u16; 7]) -> Option<DateTime<Utc>> {
    let [year, month, day, hour, minute, second, millisecond] = *fields;
    Utc.with_ymd_and_hms(
        year as i32,
        month as u32,
        day as u32,
        hour as u32,
        minute as u32,
        second as u32,
    )
    .single()?
    .checked_add_signed(chrono::Duration::milliseconds(millisecond as i64))
}

fn load_tag<R: Read>(reader: &mut PeekReader<R>) -> Result<[u8; 4], FormatError> {
    let mut tag = [0u8; 4];
    reader.read_exact(&mut tag)?;
    Ok(tag)
}

fn load_u16<R: Read>(reader: &mut PeekReader<R>) -> Result<u16, FormatError> {
    let mut bytes = [0u8; 2];
    reader.read_exact(&mut bytes)?;
    Ok(u16::from_le_bytes(bytes))
}

fn load_u32<R: Read>(reader: &mut PeekReader<R>) -> Result<u32, FormatError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn skip<R: Read>(reader: &mut PeekReader<R>, count: usize) -> Result<(), FormatError> {
    let mut bytes = vec![0u8; count];
    reader.read_exact(&mut bytes)?;
    Ok(())
}

fn load_u16_array<R: Read>(
    reader: &mut PeekReader<R>,
    count: usize,
) -> Result<Vec<RawAdc>, FormatError> {
    let mut bytes = vec![0u8; 2 * count];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn load_f32_array<R: Read>(
    reader: &mut PeekReader<R>,
    count: usize,
) -> Result<Vec<f32>, FormatError> {
    let mut bytes = vec![0u8; 4 * count];
    reader.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|quad| f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::io::Cursor;

    fn push_u16(bytes: &mut Vec<u8>, value: u16) {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn push_u32(bytes: &mut Vec<u8>, value: u32) {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    fn push_widths(bytes: &mut Vec<u8>, width: f32) {
        for _ in 0..N_BINS {
            bytes.extend_from_slice(&width.to_le_bytes());
        }
    }

    fn push_event_header(bytes: &mut Vec<u8>, serial: u32, trigger_cell: u16) {
        bytes.extend_from_slice(b"EHDR");
        push_u32(bytes, serial);
        for field in [2019u16, 2, 22, 10, 30, 0, 500] {
            push_u16(bytes, field);
        }
        push_u16(bytes, 0); // range centre
        push_u16(bytes, 0); // filler
        push_u16(bytes, 1); // board number
        push_u16(bytes, 0); // filler
        push_u16(bytes, trigger_cell);
    }

    fn push_channel_data(bytes: &mut Vec<u8>, channel: Channel, sample: u16) {
        bytes.extend_from_slice(&[b'C', b'0', b'0', b'0' + channel]);
        push_u32(bytes, 0); // scaler
        for _ in 0..N_BINS {
            push_u16(bytes, sample);
        }
    }

    /// One board, one channel, uniform 0.5 ns cells, flat mid-scale events.
    fn minimal_capture(events: usize, trigger_cell: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DRS2TIME");
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 1);
        bytes.extend_from_slice(b"C01");
        push_widths(&mut bytes, 0.5);
        for serial in 0..events {
            push_event_header(&mut bytes, serial as u32, trigger_cell);
            push_channel_data(&mut bytes, 1, 32767);
        }
        bytes
    }

    fn open(bytes: Vec<u8>) -> Result<CaptureFile<Cursor<Vec<u8>>>, FormatError> {
        CaptureFile::open(Cursor::new(bytes), &PipelineConfig::default())
    }

    #[test]
    fn rejects_bad_file_header() {
        let mut bytes = minimal_capture(0, 0);
        bytes[..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            open(bytes),
            Err(FormatError::BadFileHeader(tag)) if &tag == b"XXXX"
        ));
    }

    #[test]
    fn rejects_bad_time_header() {
        let mut bytes = minimal_capture(0, 0);
        bytes[4..8].copy_from_slice(b"EHDR");
        assert!(matches!(open(bytes), Err(FormatError::BadTimeHeader(_))));
    }

    #[test]
    fn rejects_empty_board_list() {
        assert!(matches!(
            open(b"DRS2TIME".to_vec()),
            Err(FormatError::NoBoards)
        ));
    }

    #[test]
    fn rejects_second_board() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DRS2TIME");
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 1);
        bytes.extend_from_slice(b"C01");
        push_widths(&mut bytes, 0.5);
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 2);
        bytes.extend_from_slice(b"C01");
        push_widths(&mut bytes, 0.5);
        assert!(matches!(open(bytes), Err(FormatError::MultipleBoards)));
    }

    #[test]
    fn rejects_board_without_channels() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DRS2TIME");
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 7);
        assert!(matches!(open(bytes), Err(FormatError::NoChannels(7))));
    }

    #[test]
    fn rejects_missing_requested_channel() {
        let config = PipelineConfig {
            read_channels: vec![3],
            ..Default::default()
        };
        let result = CaptureFile::open(Cursor::new(minimal_capture(0, 0)), &config);
        assert!(matches!(result, Err(FormatError::MissingChannel(3))));
    }

    #[test]
    fn decodes_minimal_capture() {
        let mut capture = open(minimal_capture(2, 0)).unwrap();
        assert_eq!(capture.header().board_id, 1);
        assert_eq!(capture.retained_channels(), vec![1]);

        for serial in 0..2u32 {
            let event = capture.next_event().unwrap().unwrap();
            assert_eq!(event.serial, serial);
            assert_eq!(event.trigger_cell, 0);
            assert_eq!(event.channels.len(), 1);

            let waveform = &event.channels[0];
            assert_eq!(waveform.times.len(), N_BINS);
            assert_eq!(waveform.times[0], 0.0);
            assert_approx_eq!(waveform.times[N_BINS - 1], 511.5, 1e-6);
            for pair in waveform.times.windows(2) {
                assert!(pair[1] > pair[0]);
            }
            for &volt in &waveform.voltages {
                assert!(volt.abs() < 0.01);
            }
        }
        assert!(capture.next_event().unwrap().is_none());
        assert_eq!(capture.events_read(), 2);
        assert_approx_eq!(capture.measured_sample_rate().unwrap(), 2.0, 1e-6);
        assert!(capture.acquisition_date().is_some());
    }

    #[test]
    fn unrequested_channels_keep_the_stream_aligned() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DRS2TIME");
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 1);
        bytes.extend_from_slice(b"C01");
        push_widths(&mut bytes, 0.5);
        bytes.extend_from_slice(b"C02");
        push_widths(&mut bytes, 0.5);
        for serial in 0..2 {
            push_event_header(&mut bytes, serial, 4);
            push_channel_data(&mut bytes, 1, 100);
            push_channel_data(&mut bytes, 2, 60000);
        }

        let config = PipelineConfig {
            read_channels: vec![2],
            ..Default::default()
        };
        let mut capture = CaptureFile::open(Cursor::new(bytes), &config).unwrap();
        for _ in 0..2 {
            let event = capture.next_event().unwrap().unwrap();
            assert_eq!(event.channels.len(), 1);
            assert_eq!(event.channels[0].channel, 2);
            assert!(event.channels[0].voltages[0] > 400.0);
        }
        assert!(capture.next_event().unwrap().is_none());
    }

    #[test]
    fn aligns_time_axes_across_channels() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DRS2TIME");
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 1);
        bytes.extend_from_slice(b"C01");
        push_widths(&mut bytes, 0.5);
        bytes.extend_from_slice(b"C02");
        push_widths(&mut bytes, 0.25);
        let trigger_cell = 700u16;
        push_event_header(&mut bytes, 0, trigger_cell);
        push_channel_data(&mut bytes, 1, 32767);
        push_channel_data(&mut bytes, 2, 32767);

        let mut capture = open(bytes).unwrap();
        let event = capture.next_event().unwrap().unwrap();
        assert_eq!(event.channels.len(), 2);
        let origin = calibrate::origin_index(trigger_cell);
        assert_approx_eq!(
            event.channels[0].times[origin],
            event.channels[1].times[origin],
            1e-9
        );
    }

    #[test]
    fn rejects_bad_event_tag() {
        let mut bytes = minimal_capture(1, 0);
        let header_len = 8 + 4 + 3 + 4 * N_BINS;
        bytes[header_len..header_len + 4].copy_from_slice(b"EVNT");
        let mut capture = open(bytes).unwrap();
        assert!(matches!(
            capture.next_event(),
            Err(FormatError::BadEventHeader)
        ));
    }

    #[test]
    fn rejects_mismatched_channel_tag() {
        let mut bytes = minimal_capture(1, 0);
        let channel_tag_at = 8 + 4 + 3 + 4 * N_BINS + 4 + 4 + 14 + 10;
        bytes[channel_tag_at..channel_tag_at + 4].copy_from_slice(b"C002");
        let mut capture = open(bytes).unwrap();
        assert!(matches!(
            capture.next_event(),
            Err(FormatError::BadEventData)
        ));
    }

    #[test]
    fn rejects_out_of_range_trigger_cell() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"DRS2TIME");
        bytes.extend_from_slice(b"B#");
        push_u16(&mut bytes, 1);
        bytes.extend_from_slice(b"C01");
        push_widths(&mut bytes, 0.5);
        push_event_header(&mut bytes, 9, 1024);
        push_channel_data(&mut bytes, 1, 0);
        let mut capture = open(bytes).unwrap();
        assert!(matches!(
            capture.next_event(),
            Err(FormatError::BadTriggerCell {
                serial: 9,
                trigger_cell: 1024
            })
        ));
    }

    #[test]
    fn rejects_truncated_event() {
        let mut bytes = minimal_capture(1, 0);
        bytes.truncate(bytes.len() - 100);
        let mut capture = open(bytes).unwrap();
        assert!(matches!(
            capture.next_event(),
            Err(FormatError::Truncated(_))
        ));
    }

    #[test]
    fn iterator_fuses_after_an_error() {
        let mut bytes = minimal_capture(1, 0);
        bytes.truncate(bytes.len() - 100);
        let mut capture = open(bytes).unwrap();
        assert!(capture.next().unwrap().is_err());
        assert!(capture.next().is_none());
    }

    #[test]
    fn empty_capture_has_no_rate() {
        let mut capture = open(minimal_capture(0, 0)).unwrap();
        assert!(capture.next_event().unwrap().is_none());
        assert!(capture.measured_sample_rate().is_none());
        assert!(capture.acquisition_date().is_none());
    }
}
