use std::str::FromStr;

use anyhow::{Error, anyhow};
use clap::{Parser, Subcommand};
use drscope_common::{Channel, PipelineConfig, Polarity, Real};
use strum::EnumString;
use thiserror::Error as ThisError;

/// Invalid run configuration, fatal at startup.
#[derive(Debug, ThisError)]
pub(crate) enum ConfigError {
    #[error("unknown PMT model '{0}'")]
    UnknownModel(String),

    #[error("no primary window: give --model or --window")]
    MissingWindow,

    #[error("window start {0} is not before end {1}")]
    EmptyWindow(Real, Real),

    #[error("channel {0} is not a single digit")]
    InvalidChannel(Channel),

    #[error("channel {0} selected twice")]
    DuplicateChannel(Channel),
}

/// Primary-pulse window bounds, parsed from `start,end` in ns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct WindowWrapper(pub(crate) (Real, Real));

impl FromStr for WindowWrapper {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let vals: Vec<_> = s.split(',').collect();
        if vals.len() == 2 {
            Ok(WindowWrapper((
                Real::from_str(vals[0].trim())?,
                Real::from_str(vals[1].trim())?,
            )))
        } else {
            Err(anyhow!(
                "incorrect number of window bounds, expected pattern '*,*', got '{s}'"
            ))
        }
    }
}

/// Tube models with standard run windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub(crate) enum PmtModel {
    R878,
    R7725,
    KuBoard,
}

impl PmtModel {
    pub(crate) fn parse(key: &str) -> Result<Self, ConfigError> {
        Self::from_str(key).map_err(|_| ConfigError::UnknownModel(key.to_owned()))
    }

    pub(crate) fn primary_window(&self) -> (Real, Real) {
        match self {
            PmtModel::R878 => (140.0, 290.0),
            PmtModel::R7725 => (200.0, 310.0),
            PmtModel::KuBoard => (280.0, 390.0),
        }
    }
}

#[derive(Debug, Clone, Parser)]
pub(crate) struct AfterpulseParameters {
    /// Acceptance threshold as a fraction of the per-event noise estimate
    #[clap(long, default_value = "0.5")]
    pub(crate) noise_floor_fraction: Real,

    /// Half-width, in samples, of the local-maximum test window
    #[clap(long, default_value = "5")]
    pub(crate) local_max_halfwidth: usize,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Mode {
    #[clap(
        about = "Locates the primary pulse: matched-filter amplitude, peak time and half-maximum time."
    )]
    Primary,
    #[clap(about = "Additionally searches for secondary pulses after the primary window.")]
    Afterpulse(AfterpulseParameters),
}

/// Builds the one immutable configuration value shared by every component.
pub(crate) fn build_config(
    model: Option<&str>,
    window: Option<WindowWrapper>,
    channels: &[Channel],
    polarity: Polarity,
    mode: &Mode,
) -> Result<PipelineConfig, ConfigError> {
    let primary_window = match (window, model) {
        (Some(WindowWrapper(bounds)), _) => bounds,
        (None, Some(key)) => PmtModel::parse(key)?.primary_window(),
        (None, None) => return Err(ConfigError::MissingWindow),
    };
    if primary_window.0 >= primary_window.1 {
        return Err(ConfigError::EmptyWindow(primary_window.0, primary_window.1));
    }

    let mut seen = Vec::new();
    for &channel in channels {
        if channel > 9 {
            return Err(ConfigError::InvalidChannel(channel));
        }
        if seen.contains(&channel) {
            return Err(ConfigError::DuplicateChannel(channel));
        }
        seen.push(channel);
    }

    let defaults = PipelineConfig::default();
    let (noise_floor_fraction, local_max_halfwidth) = match mode {
        Mode::Primary => (defaults.noise_floor_fraction, defaults.local_max_halfwidth),
        Mode::Afterpulse(params) => (params.noise_floor_fraction, params.local_max_halfwidth),
    };

    Ok(PipelineConfig {
        primary_window,
        polarity,
        read_channels: channels.to_vec(),
        noise_floor_fraction,
        local_max_halfwidth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_table_lookup() {
        assert_eq!(PmtModel::parse("r7725").unwrap(), PmtModel::R7725);
        assert_eq!(PmtModel::R7725.primary_window(), (200.0, 310.0));
        assert_eq!(PmtModel::parse("R878").unwrap(), PmtModel::R878);
        assert!(matches!(
            PmtModel::parse("r9999"),
            Err(ConfigError::UnknownModel(_))
        ));
    }

    #[test]
    fn window_parses_two_bounds() {
        assert_eq!(
            WindowWrapper::from_str("140,290").unwrap(),
            WindowWrapper((140.0, 290.0))
        );
        assert_eq!(
            WindowWrapper::from_str("200.5, 310").unwrap(),
            WindowWrapper((200.5, 310.0))
        );
        assert!(WindowWrapper::from_str("140").is_err());
        assert!(WindowWrapper::from_str("a,b").is_err());
    }

    #[test]
    fn explicit_window_overrides_model() {
        let config = build_config(
            Some("r7725"),
            Some(WindowWrapper((10.0, 20.0))),
            &[],
            Polarity::Negative,
            &Mode::Primary,
        )
        .unwrap();
        assert_eq!(config.primary_window, (10.0, 20.0));
    }

    #[test]
    fn missing_window_is_rejected() {
        assert!(matches!(
            build_config(None, None, &[], Polarity::Negative, &Mode::Primary),
            Err(ConfigError::MissingWindow)
        ));
    }

    #[test]
    fn inverted_window_is_rejected() {
        assert!(matches!(
            build_config(
                None,
                Some(WindowWrapper((290.0, 140.0))),
                &[],
                Polarity::Negative,
                &Mode::Primary
            ),
            Err(ConfigError::EmptyWindow(..))
        ));
    }

    #[test]
    fn channel_selection_is_validated() {
        let window = Some(WindowWrapper((140.0, 290.0)));
        assert!(matches!(
            build_config(None, window, &[1, 1], Polarity::Negative, &Mode::Primary),
            Err(ConfigError::DuplicateChannel(1))
        ));
        assert!(matches!(
            build_config(None, window, &[12], Polarity::Negative, &Mode::Primary),
            Err(ConfigError::InvalidChannel(12))
        ));
    }

    #[test]
    fn afterpulse_parameters_reach_the_config() {
        let mode = Mode::Afterpulse(AfterpulseParameters {
            noise_floor_fraction: 0.25,
            local_max_halfwidth: 8,
        });
        let config = build_config(
            None,
            Some(WindowWrapper((140.0, 290.0))),
            &[1],
            Polarity::Negative,
            &mode,
        )
        .unwrap();
        assert_eq!(config.noise_floor_fraction, 0.25);
        assert_eq!(config.local_max_halfwidth, 8);
    }
}
