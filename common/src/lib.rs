//! Types and constants shared across the capture pipeline.

use clap::ValueEnum;

pub type Channel = u8;
pub type RawAdc = u16;
pub type Real = f64;

/// Number of sampling cells per channel on the digitiser.
pub const N_BINS: usize = 1024;

/// Reported for `tmax`/`thalfmax` when no pulse is found. A documented
/// outcome, distinct from any decode error.
pub const TIME_SENTINEL: Real = -999.0;

/// Leading samples of each record excluded from baseline estimation while
/// the sampling cells settle.
pub const SETTLING_SAMPLES: usize = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Polarity {
    #[default]
    Positive,
    Negative,
}

impl Polarity {
    pub fn factor(&self) -> Real {
        match self {
            Polarity::Positive => 1.0,
            Polarity::Negative => -1.0,
        }
    }
}

/// The one immutable configuration value handed to every pipeline
/// component. Built once at startup and shared by reference thereafter.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Primary-pulse search window in ns, half-open.
    pub primary_window: (Real, Real),
    pub polarity: Polarity,
    /// Channels to retain. Empty means every channel in the file.
    pub read_channels: Vec<Channel>,
    /// Afterpulse acceptance threshold as a fraction of the noise estimate.
    pub noise_floor_fraction: Real,
    /// Half-width, in samples, of the local-maximum test window.
    pub local_max_halfwidth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            primary_window: (140.0, 290.0),
            polarity: Polarity::default(),
            read_channels: Vec::new(),
            noise_floor_fraction: 0.5,
            local_max_halfwidth: 5,
        }
    }
}

impl PipelineConfig {
    pub fn retains(&self, channel: Channel) -> bool {
        self.read_channels.is_empty() || self.read_channels.contains(&channel)
    }
}
