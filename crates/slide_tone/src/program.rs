//! The tone program: open, configure, then generate and write each buffer in turn.
use crate::config::ToneConfig;
use crate::error::Result;
use crate::oscillator::SlideOscillator;
use crate::sink::{write_all, AudioBackend, PlaybackSession, StreamParams};

/// What a completed run did.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub buffers_written: u32,
    pub frames_written: u64,

    /// Calls to the session's `write`, including retries after short writes.
    pub write_calls: u64,

    pub final_phase: f64,
    pub final_frequency: f64,
    pub final_amplitude: f64,
    pub final_slide_factor: f64,
}

/// Run a whole program against `backend`.
///
/// Failures to open or configure are logged in the same words the user sees and returned.  The session is dropped on
/// every path out of this function, which closes it.
pub fn run<B: AudioBackend>(backend: &mut B, config: &ToneConfig) -> Result<RunSummary> {
    config.validate()?;

    log::info!("opening device");
    let mut session = backend.open(&config.device.name).inspect_err(|e| {
        log::error!("{}", e);
    })?;

    log::info!("setting params");
    let params = StreamParams::from(&config.device);
    session.configure(&params).inspect_err(|e| {
        log::error!("{}", e);
    })?;

    let summary = play(&mut session, config)?;

    session.drain()?;
    std::mem::drop(session);
    log::debug!("Run finished: {:?}", summary);

    Ok(summary)
}

/// Generate and submit every buffer of the schedule to an already configured session.
pub fn play<S: PlaybackSession + ?Sized>(session: &mut S, config: &ToneConfig) -> Result<RunSummary> {
    let schedule = &config.schedule;
    let mut osc = SlideOscillator::new(&config.oscillator, config.device.sample_rate.get());
    let mut buffer = vec![0.0f32; schedule.buffer_len];

    let mut frames_written = 0u64;
    let mut write_calls = 0u64;

    for i in 0..schedule.iterations {
        if schedule.reset_amplitude_per_buffer {
            osc.set_amplitude(config.oscillator.initial_amplitude);
        }

        log::info!("~generating audio");
        osc.fill(&mut buffer[..]);

        log::info!("~outputting audio");
        write_calls += write_all(session, &buffer[..])? as u64;
        frames_written += buffer.len() as u64;

        if schedule.reverse_each_buffer {
            osc.reverse_slide();
        }

        log::trace!(
            "Buffer {} done: frequency={} amplitude={}",
            i,
            osc.frequency(),
            osc.amplitude()
        );
    }

    Ok(RunSummary {
        buffers_written: schedule.iterations,
        frames_written,
        write_calls,
        final_phase: osc.phase(),
        final_frequency: osc.frequency(),
        final_amplitude: osc.amplitude(),
        final_slide_factor: osc.slide_factor(),
    })
}
