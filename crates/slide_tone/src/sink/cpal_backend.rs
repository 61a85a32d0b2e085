//! Playback through cpal.
//!
//! cpal pulls audio from a callback on its own thread, but the generator wants to push with a blocking write.  The two
//! are joined by a bounded channel sized to the requested latency: `write` blocks while the channel is full, which paces
//! the generator to real time, and the callback plays silence if the channel runs dry.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample, StreamConfig};
use crossbeam::channel::{Receiver, SendTimeoutError, Sender, TrySendError};

use super::{AudioBackend, PlaybackSession, StreamParams};
use crate::config::{SampleFormat, DEFAULT_DEVICE};
use crate::error::{Error, Result};

/// How long a blocked write waits before checking whether the stream died.
const WRITE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Polling interval while waiting for the channel to empty.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Longest wait for the callback after the last sample, in case the stream has stalled.
const DRAIN_CALLBACK_TIMEOUT: Duration = Duration::from_secs(2);

pub struct CpalBackend {
    host: cpal::Host,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalBackend {
    type Session = CpalSession;

    fn open(&mut self, device: &str) -> Result<CpalSession> {
        let found = find_output_device(&self.host, device)?;
        log::debug!("Resolved {} to a {:?} output device", device, self.host.id());

        Ok(CpalSession {
            device: found,
            name: device.to_string(),
            running: None,
        })
    }
}

/// An open cpal output device.  The stream only exists once configured.
pub struct CpalSession {
    device: cpal::Device,
    name: String,
    running: Option<RunningStream>,
}

struct RunningStream {
    /// Never read, but dropping it stops playback.
    _stream: cpal::Stream,
    sender: Sender<f32>,
    shared: Arc<CallbackShared>,
    sample_rate: u32,
}

/// State shared with the audio callback.
///
/// The callback must not log or allocate, so it only records what happened and the writing side reports it.
#[derive(Default)]
struct CallbackShared {
    failed: AtomicBool,

    /// Set once the writer is done, so the silence that follows isn't an underrun.
    draining: AtomicBool,

    /// Number of callbacks that have completed.
    callbacks: AtomicU64,

    /// Frames of silence played between the first sample and the start of draining.
    underrun_frames: AtomicU64,

    /// Size of the most recent callback, in frames.
    period_frames: AtomicU64,

    /// Time between the most recent callback and the device playing what it produced.
    output_latency_ns: AtomicU64,
}

impl CallbackShared {
    /// Upper bound on how long the device needs to play everything the callbacks have handed it so far.
    fn playout_time(&self, sample_rate: u32) -> Duration {
        let period_ns = self.period_frames.load(Ordering::Relaxed) * 1_000_000_000 / sample_rate.max(1) as u64;
        Duration::from_nanos(period_ns.saturating_add(self.output_latency_ns.load(Ordering::Relaxed)))
    }
}

/// The body of the audio callback, owned by the audio thread.
struct Feeder {
    receiver: Receiver<f32>,
    channels: usize,
    shared: Arc<CallbackShared>,

    /// Whether any sample has arrived yet.  Silence before that is the stream starting up.
    started: bool,
}

impl Feeder {
    fn feed<T: Sample + FromSample<f32>>(&mut self, data: &mut [T], output_latency: Option<Duration>) {
        let mut missing = 0u64;
        let mut frames = 0u64;
        for frame in data.chunks_mut(self.channels) {
            frames += 1;
            let sample = match self.receiver.try_recv() {
                Ok(s) => {
                    self.started = true;
                    s
                }
                Err(_) => {
                    missing += self.started as u64;
                    0.0
                }
            };
            frame.fill(T::from_sample(sample));
        }

        if missing != 0 && !self.shared.draining.load(Ordering::Acquire) {
            self.shared.underrun_frames.fetch_add(missing, Ordering::Relaxed);
        }
        self.shared.period_frames.store(frames, Ordering::Relaxed);
        if let Some(l) = output_latency {
            self.shared
                .output_latency_ns
                .store(l.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
        }
        self.shared.callbacks.fetch_add(1, Ordering::Release);
    }
}

fn find_output_device(host: &cpal::Host, name: &str) -> Result<cpal::Device> {
    if name == DEFAULT_DEVICE {
        return host
            .default_output_device()
            .ok_or_else(|| Error::device_open(name, "No default output device is available"));
    }

    let devices = host
        .output_devices()
        .map_err(|e| Error::device_open(name, e.to_string()))?;

    for device in devices {
        match device.name() {
            Ok(n) if n == name => return Ok(device),
            Ok(_) => {}
            Err(e) => log::debug!("Skipping an output device without a name: {}", e),
        }
    }

    Err(Error::device_open(name, "No such device"))
}

fn to_cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::F32 => cpal::SampleFormat::F32,
        SampleFormat::I16 => cpal::SampleFormat::I16,
    }
}

/// Fail unless some supported output configuration covers `params` exactly.
fn check_supported(device: &cpal::Device, params: &StreamParams) -> Result<()> {
    let format = to_cpal_format(params.sample_format);
    let channels = params.channels.get();
    let sr = params.sample_rate.get();

    let mut supported = device
        .supported_output_configs()
        .map_err(|e| Error::configure(e.to_string()))?;

    let ok = supported.any(|c| {
        c.sample_format() == format
            && c.channels() == channels
            && c.min_sample_rate().0 <= sr
            && c.max_sample_rate().0 >= sr
    });

    if ok {
        Ok(())
    } else {
        Err(Error::configure(format!(
            "The device cannot play {:?} with {} channels at {} Hz",
            params.sample_format, channels, sr
        )))
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    receiver: Receiver<f32>,
    shared: Arc<CallbackShared>,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let err_shared = shared.clone();
    let mut feeder = Feeder {
        receiver,
        channels: config.channels as usize,
        shared,
        started: false,
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                let ts = info.timestamp();
                feeder.feed(data, ts.playback.duration_since(&ts.callback));
            },
            move |err| {
                // cpal calls this off the audio callback, so logging here is fine.
                log::error!("Audio stream error: {}", err);
                err_shared.failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| Error::configure(e.to_string()))?;

    Ok(stream)
}

impl RunningStream {
    fn check_failed(&self) -> Result<()> {
        if self.shared.failed.load(Ordering::Acquire) {
            return Err(Error::write("The audio stream reported an error"));
        }
        Ok(())
    }

    /// Send one sample, blocking until there is room.
    fn send_blocking(&self, sample: f32) -> Result<()> {
        loop {
            match self.sender.send_timeout(sample, WRITE_POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(_)) => self.check_failed()?,
                Err(SendTimeoutError::Disconnected(_)) => {
                    return Err(Error::write("The audio stream has stopped"))
                }
            }
        }
    }

    fn report_underruns(&self) {
        let frames = self.shared.underrun_frames.swap(0, Ordering::Relaxed);
        if frames != 0 {
            log::debug!("The device played {} frames of silence", frames);
        }
    }
}

impl PlaybackSession for CpalSession {
    fn configure(&mut self, params: &StreamParams) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::configure("The session is already configured"));
        }

        if params.allow_resample {
            log::debug!("Resampling allowed; leaving {} to the backend", self.name);
        } else {
            check_supported(&self.device, params)?;
        }

        let config = StreamConfig {
            channels: params.channels.get(),
            sample_rate: cpal::SampleRate(params.sample_rate.get()),
            buffer_size: cpal::BufferSize::Default,
        };

        let capacity = params.latency_frames();
        let (sender, receiver) = crossbeam::channel::bounded(capacity);
        let shared = Arc::new(CallbackShared::default());

        let stream = match params.sample_format {
            SampleFormat::F32 => build_stream::<f32>(&self.device, &config, receiver, shared.clone())?,
            SampleFormat::I16 => build_stream::<i16>(&self.device, &config, receiver, shared.clone())?,
        };

        stream
            .play()
            .map_err(|e| Error::configure(e.to_string()))?;

        log::debug!(
            "Playing {:?} at {} Hz on {} channels, {} frames of buffering",
            params.sample_format,
            config.sample_rate.0,
            config.channels,
            capacity
        );

        self.running = Some(RunningStream {
            _stream: stream,
            sender,
            shared,
            sample_rate: params.sample_rate.get(),
        });

        Ok(())
    }

    fn write(&mut self, frames: &[f32]) -> Result<usize> {
        let running = self.running.as_ref().ok_or(Error::NotConfigured)?;

        let Some((first, rest)) = frames.split_first() else {
            return Ok(0);
        };

        running.check_failed()?;
        running.send_blocking(*first)?;

        let mut accepted = 1;
        for s in rest {
            match running.sender.try_send(*s) {
                Ok(()) => accepted += 1,
                // A disconnect is reported by the next call, after these frames are counted.
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => break,
            }
        }

        Ok(accepted)
    }

    fn drain(&mut self) -> Result<()> {
        let Some(running) = self.running.as_ref() else {
            return Ok(());
        };

        let shared = &running.shared;
        shared.draining.store(true, Ordering::Release);

        while !running.sender.is_empty() {
            running.check_failed()?;
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }

        // The callback that took the last sample may still be running.  Once a later one has finished, everything
        // written is in the device's hands.
        let seen = shared.callbacks.load(Ordering::Acquire);
        let deadline = Instant::now() + DRAIN_CALLBACK_TIMEOUT;
        while shared.callbacks.load(Ordering::Acquire) == seen {
            running.check_failed()?;
            if Instant::now() >= deadline {
                log::warn!("No audio callback within {:?} while draining {}", DRAIN_CALLBACK_TIMEOUT, self.name);
                break;
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }

        let playout = shared.playout_time(running.sample_rate);
        log::trace!("Waiting {:?} for the device to finish playing", playout);
        std::thread::sleep(playout);

        running.report_underruns();
        Ok(())
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.report_underruns();
        }
        log::debug!("Closed {}", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feeder(channels: usize) -> (Sender<f32>, Feeder) {
        let (sender, receiver) = crossbeam::channel::bounded(64);
        let feeder = Feeder {
            receiver,
            channels,
            shared: Arc::new(CallbackShared::default()),
            started: false,
        };
        (sender, feeder)
    }

    fn underruns(f: &Feeder) -> u64 {
        f.shared.underrun_frames.load(Ordering::Relaxed)
    }

    #[test]
    fn fans_out_and_converts() {
        let (tx, mut f) = feeder(2);
        tx.send(0.5).unwrap();
        tx.send(-1.0).unwrap();

        let mut data = [7i16; 6];
        f.feed(&mut data, None);
        assert_eq!(data, [16384, 16384, i16::MIN, i16::MIN, 0, 0]);
        assert_eq!(f.shared.period_frames.load(Ordering::Relaxed), 3);
        assert_eq!(f.shared.callbacks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn only_gaps_between_writes_are_underruns() {
        let (tx, mut f) = feeder(1);
        let mut data = [0.0f32; 4];

        // Startup silence.
        f.feed(&mut data, None);
        assert_eq!(underruns(&f), 0);

        tx.send(0.25).unwrap();
        f.feed(&mut data, None);
        assert_eq!(data, [0.25, 0.0, 0.0, 0.0]);
        assert_eq!(underruns(&f), 3);

        f.feed(&mut data, None);
        assert_eq!(underruns(&f), 7);

        // Silence after the writer finished.
        f.shared.draining.store(true, Ordering::Release);
        f.feed(&mut data, None);
        assert_eq!(underruns(&f), 7);
    }

    #[test]
    fn playout_covers_a_period_and_the_latency() {
        let (_tx, mut f) = feeder(1);
        let mut data = [0.0f32; 4800];
        f.feed(&mut data, Some(Duration::from_millis(150)));

        assert_eq!(f.shared.playout_time(48000), Duration::from_millis(250));
    }
}
