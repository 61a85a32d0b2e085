use anyhow::{Context, Result};

use slide_tone::sink::{AudioBackend, CpalBackend, WaveFileBackend};
use slide_tone::{RunSummary, SampleFormat, ToneConfig};

use crate::cli_args::{self, CliArgs, FormatArg, ToneArgs};

/// Figure out what command to run, then run it.  Returns the process exit status.
pub fn dispatch_command(args: CliArgs) -> u8 {
    let (preset, tone_args) = match &args.command {
        cli_args::Command::Siren(a) => (ToneConfig::siren(), a),
        cli_args::Command::Sweep(a) => (ToneConfig::sweep(), a),
    };

    exit_status(run_tone(preset, tone_args))
}

fn run_tone(preset: ToneConfig, args: &ToneArgs) -> Result<Option<RunSummary>> {
    let config = resolve_config(preset, args)?;

    if args.print_config {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(None);
    }

    let summary = if args.wav.is_some() {
        run_with(&mut WaveFileBackend::new(), &config)?
    } else {
        run_with(&mut CpalBackend::new(), &config)?
    };

    Ok(Some(summary))
}

pub(crate) fn run_with<B: AudioBackend>(backend: &mut B, config: &ToneConfig) -> Result<RunSummary> {
    let summary = slide_tone::run(backend, config)?;
    log::debug!(
        "Wrote {} frames in {} buffers using {} writes",
        summary.frames_written,
        summary.buffers_written,
        summary.write_calls
    );
    Ok(summary)
}

/// Preset, then file, then flags.
pub(crate) fn resolve_config(preset: ToneConfig, args: &ToneArgs) -> Result<ToneConfig> {
    let mut config = match &args.config {
        Some(path) => preset
            .overlay_yaml_file(path)
            .with_context(|| format!("While loading {}", path.display()))?,
        None => preset,
    };

    let d = &args.device;
    let dev = &mut config.device;
    if let Some(name) = &d.device {
        dev.name = name.clone();
    }
    if let Some(sr) = d.sample_rate {
        dev.sample_rate = sr;
    }
    if let Some(ch) = d.channels {
        dev.channels = ch;
    }
    if let Some(f) = d.format {
        dev.sample_format = match f {
            FormatArg::F32 => SampleFormat::F32,
            FormatArg::I16 => SampleFormat::I16,
        };
    }
    if let Some(l) = d.latency_us {
        dev.latency_us = l;
    }
    if d.no_resample {
        dev.allow_resample = false;
    }
    if let Some(path) = &args.wav {
        dev.name = path
            .to_str()
            .context("The wave file path must be valid UTF-8")?
            .to_string();
    }

    let o = &args.oscillator;
    let osc = &mut config.oscillator;
    if let Some(v) = o.frequency {
        osc.initial_frequency = v;
    }
    if let Some(v) = o.amplitude {
        osc.initial_amplitude = v;
    }
    if let Some(v) = o.phase {
        osc.initial_phase = v;
    }
    if let Some(v) = o.slide_factor {
        osc.slide_factor = v;
    }
    if o.normalize {
        osc.normalize = true;
    }
    osc.limits.min_frequency = o.min_frequency.or(osc.limits.min_frequency);
    osc.limits.max_frequency = o.max_frequency.or(osc.limits.max_frequency);
    osc.limits.min_amplitude = o.min_amplitude.or(osc.limits.min_amplitude);
    osc.limits.max_amplitude = o.max_amplitude.or(osc.limits.max_amplitude);

    let s = &args.schedule;
    let sched = &mut config.schedule;
    if let Some(v) = s.buffer_len {
        sched.buffer_len = v;
    }
    if let Some(secs) = s.seconds {
        anyhow::ensure!(
            secs.is_finite() && secs >= 0.0,
            "--seconds must be a non-negative number, got {secs}"
        );
        sched.buffer_len = (secs * config.device.sample_rate.get() as f64).round() as usize;
    }
    if let Some(v) = s.iterations {
        sched.iterations = v;
    }
    if s.no_reverse {
        sched.reverse_each_buffer = false;
    }
    if s.reset_amplitude {
        sched.reset_amplitude_per_buffer = true;
    }

    config.validate()?;
    Ok(config)
}

/// Log whatever went wrong and turn it into a process exit status.
fn exit_status<T>(result: Result<T>) -> u8 {
    let Err(e) = result else {
        return 0;
    };

    // The program already logged device failures in its own words.
    let already_logged = e
        .downcast_ref::<slide_tone::Error>()
        .is_some_and(|e| e.is_device_open() || e.is_configure());
    if !already_logged {
        log::error!("{:#}", e);
    }

    1
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use slide_tone::sink::{PlaybackSession, StreamParams};
    use slide_tone::Error;

    use super::*;

    fn tone_args(argv: &[&str]) -> (ToneConfig, ToneArgs) {
        let args = CliArgs::parse_from(argv);
        match args.command {
            cli_args::Command::Siren(a) => (ToneConfig::siren(), a),
            cli_args::Command::Sweep(a) => (ToneConfig::sweep(), a),
        }
    }

    struct Unplugged {
        attempts: usize,
    }

    struct NeverUsed;

    impl PlaybackSession for NeverUsed {
        fn configure(&mut self, _params: &StreamParams) -> slide_tone::Result<()> {
            panic!("Configured a session that was never opened");
        }

        fn write(&mut self, _frames: &[f32]) -> slide_tone::Result<usize> {
            panic!("Wrote to a session that was never opened");
        }
    }

    impl AudioBackend for Unplugged {
        type Session = NeverUsed;

        fn open(&mut self, device: &str) -> slide_tone::Result<NeverUsed> {
            self.attempts += 1;
            Err(Error::DeviceOpen {
                device: device.to_string(),
                message: "No such device".into(),
            })
        }
    }

    #[test]
    fn failed_open_is_a_nonzero_exit() {
        let mut backend = Unplugged { attempts: 0 };
        let status = exit_status(run_with(&mut backend, &ToneConfig::siren()));
        assert_ne!(status, 0);
        assert_eq!(backend.attempts, 1);
    }

    #[test]
    fn success_is_a_zero_exit() {
        assert_eq!(exit_status(Ok(())), 0);
    }

    #[test]
    fn no_flags_means_the_preset() {
        let (preset, args) = tone_args(&["slide_tone", "siren"]);
        assert_eq!(resolve_config(preset, &args).unwrap(), ToneConfig::siren());

        let (preset, args) = tone_args(&["slide_tone", "sweep"]);
        assert_eq!(resolve_config(preset, &args).unwrap(), ToneConfig::sweep());
    }

    #[test]
    fn flags_override_the_preset() {
        let (preset, args) = tone_args(&[
            "slide_tone",
            "sweep",
            "--sample-rate",
            "44100",
            "--seconds",
            "2",
            "--format",
            "i16",
            "--frequency",
            "440",
            "--max-amplitude",
            "0.8",
            "--no-resample",
            "--wav",
            "out.wav",
        ]);
        let c = resolve_config(preset, &args).unwrap();
        assert_eq!(c.device.sample_rate.get(), 44100);
        assert_eq!(c.device.sample_format, SampleFormat::I16);
        assert_eq!(c.device.name, "out.wav");
        assert!(!c.device.allow_resample);
        assert_eq!(c.schedule.buffer_len, 88200);
        assert_eq!(c.oscillator.initial_frequency, 440.0);
        assert_eq!(c.oscillator.limits.max_amplitude, Some(0.8));
        assert_eq!(c.oscillator.slide_factor, 1.0 / 1.000027);
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.yaml");
        std::fs::write(
            &path,
            "
oscillator:
  initial_frequency: 300.0
  initial_amplitude: 0.5
schedule:
  iterations: 4
",
        )
        .unwrap();

        let path = path.to_str().unwrap();
        let (preset, args) = tone_args(&["slide_tone", "siren", "--config", path, "--frequency", "440"]);
        let c = resolve_config(preset, &args).unwrap();
        assert_eq!(c.oscillator.initial_frequency, 440.0);
        assert_eq!(c.oscillator.initial_amplitude, 0.5);
        assert_eq!(c.schedule.iterations, 4);
        assert_eq!(c.schedule.buffer_len, 8000);
        assert_eq!(c.oscillator.slide_factor, 1.00015);

        let missing = dir.path().join("missing.yaml");
        let (preset, args) = tone_args(&["slide_tone", "siren", "--config", missing.to_str().unwrap()]);
        assert!(resolve_config(preset, &args).is_err());
    }

    #[test]
    fn invalid_flags_are_rejected() {
        let (preset, args) = tone_args(&["slide_tone", "siren", "--slide-factor", "0"]);
        assert!(resolve_config(preset, &args).is_err());

        let (preset, args) = tone_args(&["slide_tone", "siren", "--seconds=-1"]);
        assert!(resolve_config(preset, &args).is_err());
    }

    #[test]
    fn buffer_len_and_seconds_conflict() {
        assert!(CliArgs::try_parse_from([
            "slide_tone",
            "siren",
            "--buffer-len",
            "10",
            "--seconds",
            "1"
        ])
        .is_err());
    }
}
