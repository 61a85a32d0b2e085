//! Where generated audio goes.
//!
//! A backend opens sessions; a session is configured once, then takes blocking writes of mono frames until it is
//! dropped.  Dropping a session releases whatever it holds, so early returns never leak a device.
mod cpal_backend;
mod wave_file;

use std::num::{NonZeroU16, NonZeroU32};
use std::time::Duration;

pub use cpal_backend::{CpalBackend, CpalSession};
pub use wave_file::{WaveFileBackend, WaveFileSession};

use crate::config::{AccessMode, DeviceConfig, SampleFormat};
use crate::error::Result;

/// Everything a session needs to know before it can take audio.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamParams {
    pub sample_format: SampleFormat,
    pub access: AccessMode,
    pub channels: NonZeroU16,
    pub sample_rate: NonZeroU32,
    pub allow_resample: bool,
    pub latency: Duration,
}

impl From<&DeviceConfig> for StreamParams {
    fn from(value: &DeviceConfig) -> Self {
        StreamParams {
            sample_format: value.sample_format,
            access: value.access,
            channels: value.channels,
            sample_rate: value.sample_rate,
            allow_resample: value.allow_resample,
            latency: value.latency(),
        }
    }
}

impl StreamParams {
    /// Frames which fit in the requested latency, never less than one.
    pub fn latency_frames(&self) -> usize {
        let frames = self.latency.as_secs_f64() * self.sample_rate.get() as f64;
        (frames as usize).max(1)
    }
}

/// Something which can open playback sessions.
pub trait AudioBackend {
    type Session: PlaybackSession;

    /// Acquire the device named by `device`.
    fn open(&mut self, device: &str) -> Result<Self::Session>;
}

/// An open playback stream.
pub trait PlaybackSession {
    /// Set the stream up.  Must be called exactly once, before any writes.
    fn configure(&mut self, params: &StreamParams) -> Result<()>;

    /// Submit mono frames.
    ///
    /// Blocks until at least one frame has been accepted, then returns how many were.  This may be fewer than offered.
    /// An empty slice returns `Ok(0)` immediately.
    fn write(&mut self, frames: &[f32]) -> Result<usize>;

    /// Block until everything written so far has been played or persisted.
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Write all of `frames`, retrying short writes.  Returns the number of calls to [PlaybackSession::write] it took.
pub fn write_all<S: PlaybackSession + ?Sized>(session: &mut S, frames: &[f32]) -> Result<usize> {
    let mut remaining = frames;
    let mut calls = 0;

    while !remaining.is_empty() {
        let accepted = session.write(remaining)?;
        calls += 1;

        if accepted < remaining.len() {
            log::trace!(
                "Short write: {} of {} frames accepted",
                accepted,
                remaining.len()
            );
        }

        if accepted == 0 {
            std::thread::yield_now();
            continue;
        }

        remaining = &remaining[accepted.min(remaining.len())..];
    }

    Ok(calls)
}
