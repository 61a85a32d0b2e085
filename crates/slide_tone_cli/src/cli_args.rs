//! Definition of the Clap command line.
use std::num::{NonZeroU16, NonZeroU32};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Play a sliding-pitch triangle tone.
#[derive(Debug, Parser)]
#[command(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Twenty short buffers, reversing the glide after each: an up/down siren.
    Siren(ToneArgs),

    /// One four second buffer gliding in a single direction.
    Sweep(ToneArgs),
}

#[derive(Debug, Args)]
pub struct ToneArgs {
    /// YAML file whose values replace the preset's.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Render into this wave file instead of playing through a device.
    #[arg(long)]
    pub wav: Option<PathBuf>,

    /// Print the resolved configuration as YAML and exit without touching a device.
    #[arg(long)]
    pub print_config: bool,

    #[command(flatten)]
    pub device: DeviceArgs,

    #[command(flatten)]
    pub oscillator: OscillatorArgs,

    #[command(flatten)]
    pub schedule: ScheduleArgs,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum FormatArg {
    F32,
    I16,
}

#[derive(Debug, Args)]
pub struct DeviceArgs {
    /// Output device name, or "default".
    #[arg(long)]
    pub device: Option<String>,

    #[arg(long)]
    pub sample_rate: Option<NonZeroU32>,

    /// Device channels; each receives the same mono signal.
    #[arg(long)]
    pub channels: Option<NonZeroU16>,

    #[arg(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Audio buffered ahead of the device, in microseconds.
    #[arg(long)]
    pub latency_us: Option<u32>,

    /// Require the device to support the requested format natively.
    #[arg(long)]
    pub no_resample: bool,
}

#[derive(Debug, Args)]
pub struct OscillatorArgs {
    /// Starting frequency in Hz.
    #[arg(long)]
    pub frequency: Option<f64>,

    #[arg(long)]
    pub amplitude: Option<f64>,

    /// Starting phase in radians.
    #[arg(long)]
    pub phase: Option<f64>,

    /// Per-sample multiplier applied to frequency and amplitude.
    #[arg(long)]
    pub slide_factor: Option<f64>,

    /// Keep samples within the current amplitude.
    #[arg(long)]
    pub normalize: bool,

    #[arg(long)]
    pub min_frequency: Option<f64>,

    #[arg(long)]
    pub max_frequency: Option<f64>,

    #[arg(long)]
    pub min_amplitude: Option<f64>,

    #[arg(long)]
    pub max_amplitude: Option<f64>,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// Frames per buffer.
    #[arg(long, conflicts_with = "seconds")]
    pub buffer_len: Option<usize>,

    /// Buffer length in seconds at the configured sample rate.
    #[arg(long)]
    pub seconds: Option<f64>,

    #[arg(long)]
    pub iterations: Option<u32>,

    /// Keep the glide direction fixed.
    #[arg(long)]
    pub no_reverse: bool,

    /// Start every buffer at the initial amplitude.
    #[arg(long)]
    pub reset_amplitude: bool,
}
