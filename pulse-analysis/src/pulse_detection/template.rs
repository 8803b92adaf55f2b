use std::{fs::File, io::BufReader, path::Path};

use super::Real;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse template: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("template stride must be non-zero")]
    ZeroStride,

    #[error("template is empty")]
    Empty,

    #[error("template sum must be positive and finite")]
    BadNormalisation,
}

/// The single-pulse shape used as the matched-filter kernel.
///
/// Loaded once at startup and immutable afterwards, so it can be shared by
/// reference across worker threads.
pub struct Template {
    kernel: Vec<Real>,
    peak_index: usize,
}

impl Template {
    /// Reads a JSON array of pulse-shape samples from `path`.
    pub fn load(path: &Path, stride: usize) -> Result<Self, TemplateError> {
        let samples: Vec<Real> = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        Self::from_samples(samples, stride)
    }

    /// Decimates the samples by `stride` to match the acquisition rate,
    /// then renormalises so the kernel sums to one (unit gain).
    pub fn from_samples(samples: Vec<Real>, stride: usize) -> Result<Self, TemplateError> {
        if stride == 0 {
            return Err(TemplateError::ZeroStride);
        }
        let mut kernel: Vec<Real> = samples.into_iter().step_by(stride).collect();
        if kernel.is_empty() {
            return Err(TemplateError::Empty);
        }
        let sum: Real = kernel.iter().sum();
        if !(sum.is_finite() && sum > 0.0) {
            return Err(TemplateError::BadNormalisation);
        }
        for value in &mut kernel {
            *value /= sum;
        }
        let mut peak_index = 0;
        for (index, value) in kernel.iter().enumerate() {
            if *value > kernel[peak_index] {
                peak_index = index;
            }
        }
        Ok(Template { kernel, peak_index })
    }

    pub fn kernel(&self) -> &[Real] {
        &self.kernel
    }

    /// Sample index of the kernel maximum, used to align the correlation
    /// output with the waveform's time axis.
    pub fn peak_index(&self) -> usize {
        self.peak_index
    }
}
