use std::io::{self, Write};

use chrono::{DateTime, Datelike, Timelike, Utc};
use drscope_common::{Channel, N_BINS, RawAdc, Real};

/// Emits capture files in the digitiser's binary layout, little-endian.
pub(crate) struct CaptureWriter<W: Write> {
    inner: W,
}

impl<W: Write> CaptureWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        CaptureWriter { inner }
    }

    pub(crate) fn write_header(
        &mut self,
        board_id: u16,
        channels: &[Channel],
        bin_width: f32,
    ) -> io::Result<()> {
        self.inner.write_all(b"DRS2")?;
        self.inner.write_all(b"TIME")?;
        self.inner.write_all(b"B#")?;
        self.inner.write_all(&board_id.to_le_bytes())?;
        for &channel in channels {
            self.inner.write_all(&[b'C', b'0', b'0' + channel])?;
            for _ in 0..N_BINS {
                self.inner.write_all(&bin_width.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub(crate) fn write_event(
        &mut self,
        serial: u32,
        timestamp: DateTime<Utc>,
        range_center: u16,
        board_number: u16,
        trigger_cell: u16,
        channels: &[(Channel, Vec<RawAdc>)],
    ) -> io::Result<()> {
        self.inner.write_all(b"EHDR")?;
        self.inner.write_all(&serial.to_le_bytes())?;
        for field in [
            timestamp.year() as u16,
            timestamp.month() as u16,
            timestamp.day() as u16,
            timestamp.hour() as u16,
            timestamp.minute() as u16,
            timestamp.second() as u16,
            timestamp.timestamp_subsec_millis() as u16,
        ] {
            self.inner.write_all(&field.to_le_bytes())?;
        }
        self.inner.write_all(&range_center.to_le_bytes())?;
        self.inner.write_all(&0u16.to_le_bytes())?;
        self.inner.write_all(&board_number.to_le_bytes())?;
        self.inner.write_all(&0u16.to_le_bytes())?;
        self.inner.write_all(&trigger_cell.to_le_bytes())?;
        for (channel, samples) in channels {
            self.inner.write_all(&[b'C', b'0', b'0', b'0' + channel])?;
            self.inner.write_all(&0u32.to_le_bytes())?; // scaler
            for &sample in samples {
                self.inner.write_all(&sample.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Inverse of the decoder's voltage mapping, clamped to the ADC range.
pub(crate) fn to_raw(voltage: Real, range_center: Real) -> RawAdc {
    ((voltage + 500.0 - range_center) / 1000.0 * RawAdc::MAX as Real)
        .round()
        .clamp(0.0, RawAdc::MAX as Real) as RawAdc
}
