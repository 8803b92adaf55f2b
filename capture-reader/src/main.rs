use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use capture_reader::CaptureFile;
use clap::Parser;
use drscope_common::{Channel, PipelineConfig, Polarity};
use tracing::info;

#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Capture file to inspect
    #[clap(short, long)]
    file_name: PathBuf,

    /// Channels to retain; defaults to every channel in the file
    #[clap(short, long)]
    channels: Vec<Channel>,

    #[clap(long, value_enum, default_value_t = Polarity::Positive)]
    polarity: Polarity,

    /// If set, calibrated events are written here as JSON lines
    #[clap(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    let config = PipelineConfig {
        read_channels: args.channels,
        polarity: args.polarity,
        ..Default::default()
    };

    let file = File::open(&args.file_name)
        .with_context(|| format!("cannot open capture {}", args.file_name.display()))?;
    let mut capture = CaptureFile::open(BufReader::new(file), &config)?;

    let mut output = args
        .output
        .map(|path| File::create(path).map(BufWriter::new))
        .transpose()
        .context("cannot create output file")?;

    while let Some(event) = capture.next_event()? {
        if let Some(writer) = output.as_mut() {
            serde_json::to_writer(&mut *writer, &event)?;
            writeln!(writer)?;
        }
    }

    info!(
        board = capture.header().board_id,
        channels = ?capture.retained_channels(),
        events = capture.events_read(),
        "capture decoded"
    );
    if let Some(rate) = capture.measured_sample_rate() {
        info!("measured sampling rate: {rate:.2} GHz");
    }
    if let Some(date) = capture.acquisition_date() {
        info!("acquired: {}", date.to_rfc3339());
    }
    Ok(())
}
