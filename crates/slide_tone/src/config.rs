//! Configuration for a tone run.
//!
//! Every parameter of a run lives here.  A [ToneConfig] starts from one of the two presets, may be overlaid by a YAML
//! file, and is then adjusted by the command line.  Every field has a default, so a
//! file only needs to mention what it changes.
use std::num::{NonZeroU16, NonZeroU32};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The sample rate both programs run at unless told otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Device identifier resolved to the platform's default output.
pub const DEFAULT_DEVICE: &str = "default";

/// Encoding of samples handed to the device.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 32-bit float, native to the generator.
    #[default]
    F32,

    /// 16-bit signed integer, converted at the edge.
    I16,
}

/// How frames are laid out in a submission.
///
/// Only interleaved access exists; with one channel it is just a flat array of samples.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    #[default]
    Interleaved,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Identifier handed to the backend's `open`.
    ///
    /// For audio devices this is a device name, or `"default"`.  For the wave file backend it is a path.
    pub name: String,

    pub sample_format: SampleFormat,

    pub access: AccessMode,

    /// The generator is always mono; extra channels receive copies of the same sample.
    pub channels: NonZeroU16,

    pub sample_rate: NonZeroU32,

    /// Let the backend convert rates and formats the device cannot do natively.
    pub allow_resample: bool,

    /// Amount of audio the backend may hold ahead of the device, in microseconds.
    pub latency_us: u32,
}

/// Optional bounds on the glide.
///
/// Without any, frequency and amplitude grow or decay geometrically forever.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlideLimits {
    pub min_frequency: Option<f64>,
    pub max_frequency: Option<f64>,
    pub min_amplitude: Option<f64>,
    pub max_amplitude: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OscillatorConfig {
    /// In radians.
    pub initial_phase: f64,

    /// In Hz.
    pub initial_frequency: f64,

    pub initial_amplitude: f64,

    /// Multiplied into both frequency and amplitude after every sample.
    pub slide_factor: f64,

    /// Scale the raw `asin(sin(phase))` output by `2/π` so that samples never exceed the current amplitude.
    pub normalize: bool,

    pub limits: GlideLimits,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Schedule {
    /// Frames per submission.
    pub buffer_len: usize,

    /// How many buffers are generated and submitted.
    pub iterations: u32,

    /// Invert the slide factor after each buffer.
    pub reverse_each_buffer: bool,

    /// Set the amplitude back to its initial value at the start of every buffer.
    ///
    /// Phase and frequency always carry over.
    pub reset_amplitude_per_buffer: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToneConfig {
    pub device: DeviceConfig,
    pub oscillator: OscillatorConfig,
    pub schedule: Schedule,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE.to_string(),
            sample_format: SampleFormat::F32,
            access: AccessMode::Interleaved,
            channels: NonZeroU16::MIN,
            sample_rate: NonZeroU32::new(DEFAULT_SAMPLE_RATE).expect("Nonzero constant"),
            allow_resample: true,
            latency_us: 500_000,
        }
    }
}

impl Default for OscillatorConfig {
    fn default() -> Self {
        Self {
            initial_phase: 0.0,
            initial_frequency: 200.0,
            initial_amplitude: 1.0,
            slide_factor: 1.00015,
            normalize: false,
            limits: GlideLimits::default(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            buffer_len: 8000,
            iterations: 20,
            reverse_each_buffer: true,
            reset_amplitude_per_buffer: false,
        }
    }
}

impl DeviceConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_micros(self.latency_us as u64)
    }
}

impl GlideLimits {
    pub fn is_unbounded(&self) -> bool {
        self.min_frequency.is_none()
            && self.max_frequency.is_none()
            && self.min_amplitude.is_none()
            && self.max_amplitude.is_none()
    }

    pub fn clamp_frequency(&self, frequency: f64) -> f64 {
        clamp_optional(frequency, self.min_frequency, self.max_frequency)
    }

    pub fn clamp_amplitude(&self, amplitude: f64) -> f64 {
        clamp_optional(amplitude, self.min_amplitude, self.max_amplitude)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_frequency", self.min_frequency),
            ("max_frequency", self.max_frequency),
            ("min_amplitude", self.min_amplitude),
            ("max_amplitude", self.max_amplitude),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::invalid_config(format!(
                        "{name} must be finite and non-negative, got {v}"
                    )));
                }
            }
        }

        if let (Some(lo), Some(hi)) = (self.min_frequency, self.max_frequency) {
            if lo > hi {
                return Err(Error::invalid_config(format!(
                    "min_frequency {lo} is above max_frequency {hi}"
                )));
            }
        }

        if let (Some(lo), Some(hi)) = (self.min_amplitude, self.max_amplitude) {
            if lo > hi {
                return Err(Error::invalid_config(format!(
                    "min_amplitude {lo} is above max_amplitude {hi}"
                )));
            }
        }

        Ok(())
    }
}

fn clamp_optional(value: f64, lo: Option<f64>, hi: Option<f64>) -> f64 {
    let value = lo.map_or(value, |lo| value.max(lo));
    hi.map_or(value, |hi| value.min(hi))
}

impl ToneConfig {
    /// The up/down siren: twenty short buffers, reversing the glide after each one.
    pub fn siren() -> Self {
        Self::default()
    }

    /// One four-second buffer gliding down without reversing.
    pub fn sweep() -> Self {
        let device = DeviceConfig::default();
        let buffer_len = device.sample_rate.get() as usize * 4;

        Self {
            device,
            oscillator: OscillatorConfig {
                initial_frequency: 1000.0,
                slide_factor: 1.0 / 1.000027,
                ..Default::default()
            },
            schedule: Schedule {
                buffer_len,
                iterations: 1,
                reverse_each_buffer: false,
                reset_amplitude_per_buffer: false,
            },
        }
    }

    /// Parse a YAML document.  Missing fields take the values of [ToneConfig::default].
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: ToneConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Start from `self` and replace whatever the YAML document mentions.
    ///
    /// Sections the document leaves out keep the values they had in `self`, which is how presets survive a partial
    /// file.
    pub fn overlay_yaml_str(self, yaml: &str) -> Result<Self> {
        let mut base = serde_yaml::to_value(&self)?;
        let overlay: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        // An empty document parses as null and changes nothing.
        if !overlay.is_null() {
            merge_yaml(&mut base, overlay);
        }
        let config: ToneConfig = serde_yaml::from_value(base)?;
        Ok(config)
    }

    pub fn overlay_yaml_file(self, path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        self.overlay_yaml_str(&yaml)
    }

    /// Check that the configuration describes something that can actually be generated.
    pub fn validate(&self) -> Result<()> {
        let osc = &self.oscillator;

        if !osc.slide_factor.is_finite() || osc.slide_factor <= 0.0 {
            return Err(Error::invalid_config(format!(
                "slide_factor must be finite and positive, got {}",
                osc.slide_factor
            )));
        }

        if !osc.initial_frequency.is_finite() || osc.initial_frequency <= 0.0 {
            return Err(Error::invalid_config(format!(
                "initial_frequency must be finite and positive, got {}",
                osc.initial_frequency
            )));
        }

        if !osc.initial_amplitude.is_finite() || osc.initial_amplitude <= 0.0 {
            return Err(Error::invalid_config(format!(
                "initial_amplitude must be finite and positive, got {}",
                osc.initial_amplitude
            )));
        }

        if !osc.initial_phase.is_finite() {
            return Err(Error::invalid_config(format!(
                "initial_phase must be finite, got {}",
                osc.initial_phase
            )));
        }

        osc.limits.validate()?;

        if self.device.name.is_empty() {
            return Err(Error::invalid_config("The device name may not be empty"));
        }

        Ok(())
    }
}

/// Recursively replace mappings in `base` with those in `overlay`.  Anything that isn't a mapping replaces wholesale,
/// so an explicit `null` clears an optional field.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    use serde_yaml::Value;

    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
