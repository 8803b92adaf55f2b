mod output;
mod parameters;
mod processing;
mod pulse_detection;

use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, Result};
use capture_reader::CaptureFile;
use clap::Parser;
use drscope_common::{Channel, Polarity};
use tracing::info;

use output::{CaptureSummary, RecordWriter};
use parameters::{Mode, WindowWrapper};
use pulse_detection::template::Template;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Capture file to analyse
    #[clap(short, long)]
    file_name: PathBuf,

    /// JSON array of single-pulse template samples
    #[clap(short, long)]
    template: PathBuf,

    /// Decimation stride applied to the template
    #[clap(long, default_value = "2")]
    template_stride: usize,

    /// Tube model supplying the primary window
    #[clap(short, long)]
    model: Option<String>,

    /// Explicit primary window "start,end" in ns; overrides --model
    #[clap(short, long)]
    window: Option<WindowWrapper>,

    /// Channels to analyse; defaults to every channel in the file
    #[clap(short, long)]
    channels: Vec<Channel>,

    /// Tube pulses are negative-going; flip them so peaks are positive
    #[clap(long, value_enum, default_value_t = Polarity::Negative)]
    polarity: Polarity,

    /// Pulse records are written here as JSON lines
    #[clap(short, long)]
    output: PathBuf,

    /// Capture metadata path; defaults to the output path with a
    /// "meta.json" extension
    #[clap(long)]
    summary: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    let config = parameters::build_config(
        args.model.as_deref(),
        args.window,
        &args.channels,
        args.polarity,
        &args.mode,
    )?;
    let template = Template::load(&args.template, args.template_stride)?;

    let file = File::open(&args.file_name)
        .with_context(|| format!("cannot open capture {}", args.file_name.display()))?;
    let mut capture = CaptureFile::open(BufReader::new(file), &config)?;

    let mut writer = RecordWriter::create(&args.output)?;
    processing::process_capture(&mut capture, &template, &config, &args.mode, |record| {
        writer.write(&record)
    })?;
    writer.finish()?;

    let summary = CaptureSummary {
        measured_sample_rate: capture.measured_sample_rate().unwrap_or(0.0),
        acquisition_date: capture
            .acquisition_date()
            .map(|date| date.to_rfc3339())
            .unwrap_or_default(),
        channel_list: capture.retained_channels(),
    };
    let summary_path = args
        .summary
        .unwrap_or_else(|| args.output.with_extension("meta.json"));
    output::write_summary(&summary_path, &summary)?;

    info!(
        events = capture.events_read(),
        sample_rate = summary.measured_sample_rate,
        "analysis complete"
    );
    Ok(())
}
