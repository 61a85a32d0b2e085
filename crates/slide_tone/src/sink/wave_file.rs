//! Render to a wave file instead of a device.
//!
//! The device identifier is a path.  Opening creates the file, configuring writes the header, and each write appends
//! frames.  The file is finalized when the session is drained or dropped.
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use cpal::Sample;

use super::{AudioBackend, PlaybackSession, StreamParams};
use crate::config::SampleFormat;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct WaveFileBackend;

impl WaveFileBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for WaveFileBackend {
    type Session = WaveFileSession;

    fn open(&mut self, device: &str) -> Result<WaveFileSession> {
        let path = PathBuf::from(device);
        let file = File::create(&path).map_err(|e| Error::device_open(device, e.to_string()))?;

        Ok(WaveFileSession {
            path,
            state: SessionState::Opened(BufWriter::new(file)),
        })
    }
}

enum SessionState {
    Opened(BufWriter<File>),
    Writing {
        writer: hound::WavWriter<BufWriter<File>>,
        sample_format: SampleFormat,
        channels: u16,
    },
    /// Configuration failed and took the file with it, or the writer was finalized.
    Closed,
}

pub struct WaveFileSession {
    path: PathBuf,
    state: SessionState,
}

impl WaveFileSession {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn wav_spec(params: &StreamParams) -> hound::WavSpec {
    let (sample_format, bits_per_sample) = match params.sample_format {
        SampleFormat::F32 => (hound::SampleFormat::Float, 32),
        SampleFormat::I16 => (hound::SampleFormat::Int, 16),
    };

    hound::WavSpec {
        channels: params.channels.get(),
        sample_rate: params.sample_rate.get(),
        bits_per_sample,
        sample_format,
    }
}

impl PlaybackSession for WaveFileSession {
    fn configure(&mut self, params: &StreamParams) -> Result<()> {
        let file = match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Opened(f) => f,
            other => {
                self.state = other;
                return Err(Error::configure("The session is already configured"));
            }
        };

        let writer =
            hound::WavWriter::new(file, wav_spec(params)).map_err(|e| Error::configure(e.to_string()))?;

        self.state = SessionState::Writing {
            writer,
            sample_format: params.sample_format,
            channels: params.channels.get(),
        };
        Ok(())
    }

    fn write(&mut self, frames: &[f32]) -> Result<usize> {
        let SessionState::Writing {
            writer,
            sample_format,
            channels,
        } = &mut self.state
        else {
            return Err(Error::NotConfigured);
        };

        for &s in frames {
            for _ in 0..*channels {
                let res = match sample_format {
                    SampleFormat::F32 => writer.write_sample(s),
                    SampleFormat::I16 => writer.write_sample(i16::from_sample(s)),
                };
                res.map_err(|e| Error::write(e.to_string()))?;
            }
        }

        Ok(frames.len())
    }

    fn drain(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Writing { writer, .. } => {
                writer.finalize().map_err(|e| Error::write(e.to_string()))?;
                log::debug!("Finalized {}", self.path.display());
                Ok(())
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }
}

impl Drop for WaveFileSession {
    fn drop(&mut self) {
        if let SessionState::Writing { writer, .. } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            if let Err(e) = writer.finalize() {
                log::error!("Unable to finalize {}: {}", self.path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::num::{NonZeroU16, NonZeroU32};
    use std::time::Duration;

    use crate::config::AccessMode;

    fn i16_params() -> StreamParams {
        StreamParams {
            sample_format: SampleFormat::I16,
            access: AccessMode::Interleaved,
            channels: NonZeroU16::MIN,
            sample_rate: NonZeroU32::new(8000).unwrap(),
            allow_resample: true,
            latency: Duration::from_millis(10),
        }
    }

    /// The wave file gets the same integers an i16 device would.
    #[test]
    fn i16_samples_match_the_device_conversion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conv.wav");
        let input = [0.0f32, 0.5, -0.25, -1.0, 1.0, 3.3, -3.3];

        let mut session = WaveFileBackend::new().open(path.to_str().unwrap()).unwrap();
        session.configure(&i16_params()).unwrap();
        assert_eq!(session.write(&input).unwrap(), input.len());
        drop(session);

        let got = hound::WavReader::open(&path)
            .unwrap()
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        let expected = input.iter().map(|s| i16::from_sample(*s)).collect::<Vec<_>>();
        assert_eq!(got, expected);
        assert_eq!(got, [0, 16384, -8192, i16::MIN, i16::MAX, i16::MAX, i16::MIN]);
    }
}
