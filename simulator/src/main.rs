mod pulse;
mod writer;

use std::{fs::File, io::BufWriter, path::PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use drscope_common::{Channel, N_BINS, RawAdc, Real};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::info;

use pulse::PulseShape;
use writer::CaptureWriter;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum ShapeKind {
    #[default]
    Gaussian,
    Biexp,
}

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Output capture file
    #[clap(short, long)]
    output: PathBuf,

    #[clap(short, long, default_value = "10")]
    num_events: u32,

    /// Channels to include (single digits)
    #[clap(short, long, default_values_t = vec![1u8])]
    channels: Vec<Channel>,

    /// Uniform sampling interval in ns
    #[clap(long, default_value = "0.5")]
    bin_width: f32,

    #[clap(long, default_value = "0")]
    range_center: u16,

    /// Fixed trigger cell; drawn at random per event when unset
    #[clap(long)]
    trigger_cell: Option<u16>,

    #[clap(long, value_enum, default_value_t = ShapeKind::Gaussian)]
    pulse_shape: ShapeKind,

    /// Primary pulse peak time in ns
    #[clap(long, default_value = "200.0")]
    pulse_time: Real,

    /// Primary pulse height in mV; pulses are written negative-going
    #[clap(long, default_value = "25.0")]
    pulse_height: Real,

    /// Gaussian pulse standard deviation in ns
    #[clap(long, default_value = "4.0")]
    pulse_sd: Real,

    /// Bi-exponential rise constant in ns
    #[clap(long, default_value = "2.0")]
    pulse_rise: Real,

    /// Bi-exponential decay constant in ns
    #[clap(long, default_value = "15.0")]
    pulse_decay: Real,

    /// Number of afterpulses injected behind the primary
    #[clap(long, default_value = "0")]
    afterpulses: u32,

    /// Delay between injected afterpulses in ns
    #[clap(long, default_value = "80.0")]
    afterpulse_delay: Real,

    /// Afterpulse height as a fraction of the primary height
    #[clap(long, default_value = "0.25")]
    afterpulse_fraction: Real,

    /// Gaussian noise standard deviation in mV
    #[clap(long, default_value = "1.0")]
    noise: Real,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    for &channel in &args.channels {
        if channel > 9 {
            bail!("channel {channel} is not a single digit");
        }
    }
    if args.bin_width <= 0.0 {
        bail!("bin width must be positive");
    }

    if matches!(args.pulse_shape, ShapeKind::Biexp) && args.pulse_rise >= args.pulse_decay {
        bail!("bi-exponential pulses need rise shorter than decay");
    }
    let shape_at = |peak_time: Real, height: Real| match args.pulse_shape {
        ShapeKind::Gaussian => PulseShape::Gaussian {
            peak_time,
            sd: args.pulse_sd,
            height,
        },
        ShapeKind::Biexp => PulseShape::Biexp {
            start: peak_time,
            rise: args.pulse_rise,
            decay: args.pulse_decay,
            height,
        },
    };

    let mut shapes = vec![shape_at(args.pulse_time, args.pulse_height)];
    for order in 1..=args.afterpulses {
        shapes.push(shape_at(
            args.pulse_time + order as Real * args.afterpulse_delay,
            args.pulse_height * args.afterpulse_fraction,
        ));
    }

    let noise = (args.noise > 0.0)
        .then(|| Normal::new(0.0, args.noise))
        .transpose()
        .context("invalid noise parameter")?;
    let mut rng = rand::rng();

    let file = File::create(&args.output)
        .with_context(|| format!("cannot create capture {}", args.output.display()))?;
    let mut writer = CaptureWriter::new(BufWriter::new(file));
    writer.write_header(1, &args.channels, args.bin_width)?;

    let started = Utc::now();
    for serial in 0..args.num_events {
        let trigger_cell = args
            .trigger_cell
            .unwrap_or_else(|| rng.random_range(0..N_BINS as u16));

        let channels: Vec<(Channel, Vec<RawAdc>)> = args
            .channels
            .iter()
            .map(|&channel| {
                let samples = (0..N_BINS)
                    .map(|index| {
                        let time = index as Real * args.bin_width as Real;
                        let signal: Real =
                            shapes.iter().map(|shape| shape.value_at(time)).sum();
                        let jitter = noise
                            .as_ref()
                            .map(|normal| normal.sample(&mut rng))
                            .unwrap_or_default();
                        writer::to_raw(-signal + jitter, args.range_center as Real)
                    })
                    .collect();
                (channel, samples)
            })
            .collect();

        writer.write_event(
            serial,
            started + chrono::Duration::milliseconds(10 * serial as i64),
            args.range_center,
            1,
            trigger_cell,
            &channels,
        )?;
    }
    writer.finish()?;

    info!(
        events = args.num_events,
        channels = args.channels.len(),
        "capture written to {}",
        args.output.display()
    );
    Ok(())
}
