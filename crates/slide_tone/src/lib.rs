//! Sliding-pitch triangle tones written to a blocking audio sink.
//!
//! A [SlideOscillator] produces a triangle wave whose frequency and amplitude glide geometrically.  The [program]
//! module drives it through a [sink::PlaybackSession]: open a device, configure it, then fill and write buffers
//! according to a [Schedule].  Two presets exist: [ToneConfig::siren] reverses the glide after each of twenty short
//! buffers, and [ToneConfig::sweep] writes a single four second buffer.
#[cfg(test)]
mod close_floats;
mod config;
mod error;
mod oscillator;
pub mod program;
pub mod sink;

pub use config::*;
pub use error::{Error, Result};
pub use oscillator::SlideOscillator;
pub use program::{run, RunSummary};
