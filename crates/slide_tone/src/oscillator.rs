use std::f64::consts::{FRAC_2_PI, TAU};

use crate::config::{GlideLimits, OscillatorConfig};

/// A triangle oscillator whose frequency and amplitude glide geometrically.
///
/// `asin(sin(phase))` gives a triangle of period 2π with slope ±1 around zero.  After every sample both the frequency
/// and the amplitude are multiplied by the slide factor, so a factor above 1 rises in pitch and volume and a factor
/// below 1 falls.
///
/// The phase is kept in `[0, 2π)`.  This produces the same waveform as letting it accumulate, but stays precise over
/// arbitrarily long runs.
#[derive(Clone, Debug)]
pub struct SlideOscillator {
    phase: f64,
    frequency: f64,
    amplitude: f64,
    slide_factor: f64,

    /// `2π / sample_rate`, so that the per-sample increment is one multiply.
    radians_per_hz: f64,

    /// Either 1.0 or `2/π`.
    output_scale: f64,

    limits: GlideLimits,
}

impl SlideOscillator {
    pub fn new(config: &OscillatorConfig, sample_rate: u32) -> Self {
        Self {
            phase: config.initial_phase.rem_euclid(TAU),
            frequency: config.initial_frequency,
            amplitude: config.initial_amplitude,
            slide_factor: config.slide_factor,
            radians_per_hz: TAU / sample_rate as f64,
            output_scale: if config.normalize { FRAC_2_PI } else { 1.0 },
            limits: config.limits,
        }
    }

    #[inline(always)]
    pub fn next_sample(&mut self) -> f32 {
        self.phase = (self.phase + self.frequency * self.radians_per_hz).rem_euclid(TAU);
        let sample = self.amplitude * self.phase.sin().asin() * self.output_scale;

        self.frequency *= self.slide_factor;
        self.amplitude *= self.slide_factor;
        if !self.limits.is_unbounded() {
            self.frequency = self.limits.clamp_frequency(self.frequency);
            self.amplitude = self.limits.clamp_amplitude(self.amplitude);
        }

        sample as f32
    }

    /// Overwrite every sample of `buffer`.
    pub fn fill(&mut self, buffer: &mut [f32]) {
        for s in buffer.iter_mut() {
            *s = self.next_sample();
        }
    }

    /// Invert the slide factor, so that the glide runs the other way.
    pub fn reverse_slide(&mut self) -> &mut Self {
        self.slide_factor = 1.0 / self.slide_factor;
        self
    }

    pub fn set_amplitude(&mut self, amplitude: f64) -> &mut Self {
        self.amplitude = amplitude;
        self
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    pub fn slide_factor(&self) -> f64 {
        self.slide_factor
    }
}
