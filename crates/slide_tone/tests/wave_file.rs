use std::num::NonZeroU16;

use pretty_assertions::assert_eq;

use slide_tone::sink::{PlaybackSession, StreamParams, WaveFileBackend};
use slide_tone::*;

fn render(config: &ToneConfig) -> RunSummary {
    run(&mut WaveFileBackend::new(), config).unwrap()
}

fn config_for(path: &std::path::Path) -> ToneConfig {
    let mut config = ToneConfig::siren();
    config.device.name = path.to_str().unwrap().to_string();
    config.schedule.iterations = 3;
    config.schedule.buffer_len = 500;
    config
}

#[test]
fn renders_float_wave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("siren.wav");
    let config = config_for(&path);

    let summary = render(&config);
    assert_eq!(summary.frames_written, 1500);

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 48000);
    assert_eq!(spec.bits_per_sample, 32);
    assert_eq!(spec.sample_format, hound::SampleFormat::Float);

    let got = reader
        .samples::<f32>()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    let mut osc = SlideOscillator::new(&config.oscillator, 48000);
    let mut expected = vec![];
    for _ in 0..3 {
        let mut buf = vec![0.0f32; 500];
        osc.fill(&mut buf);
        expected.extend(buf);
        osc.reverse_slide();
    }
    assert_eq!(got, expected);
}

#[test]
fn renders_stereo_i16_wave() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("siren16.wav");
    let mut config = config_for(&path);
    config.device.sample_format = SampleFormat::I16;
    config.device.channels = NonZeroU16::new(2).unwrap();
    config.oscillator.normalize = true;

    render(&config);

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_format, hound::SampleFormat::Int);

    let got = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(got.len(), 3000);

    // Both channels carry the same mono signal.
    for frame in got.chunks(2) {
        assert_eq!(frame[0], frame[1]);
    }
    assert!(got.iter().any(|s| *s != 0));
}

#[test]
fn unwritable_path_is_an_open_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("out.wav");
    let config = config_for(&path);

    let err = run(&mut WaveFileBackend::new(), &config).unwrap_err();
    assert!(err.is_device_open());
    assert!(!path.exists());
}

#[test]
fn write_before_configure_fails() {
    use slide_tone::sink::AudioBackend;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("early.wav");

    let mut session = WaveFileBackend::new().open(path.to_str().unwrap()).unwrap();
    assert!(matches!(
        session.write(&[0.0, 0.1]),
        Err(Error::NotConfigured)
    ));

    let params = StreamParams::from(&DeviceConfig::default());
    session.configure(&params).unwrap();
    assert!(session.configure(&params).unwrap_err().is_configure());
    assert_eq!(session.write(&[0.0, 0.1]).unwrap(), 2);
}
