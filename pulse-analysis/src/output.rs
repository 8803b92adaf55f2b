//! The logical output schema. The columnar container itself is external;
//! records go out as JSON lines with a sibling metadata document.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use drscope_common::{Channel, Real};
use serde::Serialize;

/// Pulse metrics for one retained channel of one event.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ChannelRecord {
    pub(crate) serial: u32,
    pub(crate) channel: Channel,
    pub(crate) timestamp: Real,
    pub(crate) times: Vec<Real>,
    pub(crate) voltages: Vec<Real>,
    pub(crate) offset: Real,
    pub(crate) noise: Real,
    pub(crate) area: Real,
    pub(crate) smoothed_max: Real,
    pub(crate) tmax: Real,
    pub(crate) thalfmax: Real,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) afterpulses: Option<Vec<usize>>,
}

/// File-level metadata, written once the capture is fully decoded.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct CaptureSummary {
    pub(crate) measured_sample_rate: Real,
    pub(crate) acquisition_date: String,
    pub(crate) channel_list: Vec<Channel>,
}

pub(crate) struct RecordWriter {
    inner: BufWriter<File>,
}

impl RecordWriter {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("cannot create output file {}", path.display()))?;
        Ok(RecordWriter {
            inner: BufWriter::new(file),
        })
    }

    pub(crate) fn write(&mut self, record: &ChannelRecord) -> Result<()> {
        serde_json::to_writer(&mut self.inner, record)?;
        writeln!(self.inner)?;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

pub(crate) fn write_summary(path: &Path, summary: &CaptureSummary) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create summary file {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), summary)?;
    Ok(())
}
