//! Biquad filter effect (high-pass, low-pass, band-pass)

use super::{Effect, EffectError, EffectOptions};
use std::f32::consts::PI;

/// Filter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterType {
    #[default]
    LowPass,
    HighPass,
    BandPass,
}

/// Biquad filter implementation
pub struct Filter {
    filter_type: FilterType,
    cutoff: f32,    // Hz
    resonance: f32, // Q factor

    /// Rate the coefficients were computed for
    coefficient_rate: u32,

    // Biquad coefficients
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,

    // State variables (one channel at a time)
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Filter {
    /// Option a scalar `options` value is assigned to
    pub const DEFAULT_OPTION: &'static str = "cutoff";

    /// Create a new filter
    pub fn new(filter_type: FilterType, cutoff: f32, resonance: f32) -> Self {
        Self {
            filter_type,
            cutoff: cutoff.clamp(20.0, 20000.0),
            resonance: resonance.clamp(0.1, 20.0),
            coefficient_rate: 0,
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b1: 0.0,
            b2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Build from `cutoff` (required) and `resonance` (Butterworth Q by default)
    pub fn build(filter_type: FilterType, options: &EffectOptions) -> Result<Box<dyn Effect>, EffectError> {
        let cutoff = options.require("cutoff")? as f32;
        let resonance = options.get_or("resonance", 0.707) as f32;
        Ok(Box::new(Self::new(filter_type, cutoff, resonance)))
    }

    /// Get filter type
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Calculate biquad coefficients for `sample_rate`
    fn calculate_coefficients(&mut self, sample_rate: u32) {
        // Keep the cutoff below Nyquist
        let cutoff = self.cutoff.min(sample_rate as f32 * 0.45);
        let omega = 2.0 * PI * cutoff / sample_rate as f32;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * self.resonance);

        let (b0, b1, b2) = match self.filter_type {
            FilterType::LowPass => (
                (1.0 - cos_omega) / 2.0,
                1.0 - cos_omega,
                (1.0 - cos_omega) / 2.0,
            ),
            FilterType::HighPass => (
                (1.0 + cos_omega) / 2.0,
                -(1.0 + cos_omega),
                (1.0 + cos_omega) / 2.0,
            ),
            FilterType::BandPass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        self.a0 = b0 / a0;
        self.a1 = b1 / a0;
        self.a2 = b2 / a0;
        self.b1 = a1 / a0;
        self.b2 = a2 / a0;
        self.coefficient_rate = sample_rate;
    }

    fn process_sample(&mut self, input: f32) -> f32 {
        let output = self.a0 * input + self.a1 * self.x1 + self.a2 * self.x2
            - self.b1 * self.y1
            - self.b2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

impl Effect for Filter {
    fn process(&mut self, samples: &mut [f32], sample_rate: u32) {
        if sample_rate == 0 {
            return;
        }
        if self.coefficient_rate != sample_rate {
            self.calculate_coefficients(sample_rate);
        }
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    fn name(&self) -> &'static str {
        match self.filter_type {
            FilterType::LowPass => "LP Filter",
            FilterType::HighPass => "HP Filter",
            FilterType::BandPass => "BP Filter",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .map(|i| (2.0 * PI * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        let mut filter = Filter::new(FilterType::LowPass, 200.0, 0.707);
        let mut samples = sine(8000.0, 44100, 4410);
        let before = rms(&samples);
        filter.process(&mut samples, 44100);
        assert!(rms(&samples[441..]) < before * 0.1);
    }

    #[test]
    fn test_highpass_attenuates_low_frequency() {
        let mut filter = Filter::new(FilterType::HighPass, 5000.0, 0.707);
        let mut samples = sine(50.0, 44100, 44100);
        let before = rms(&samples);
        filter.process(&mut samples, 44100);
        assert!(rms(&samples[4410..]) < before * 0.1);
    }

    #[test]
    fn test_cutoff_above_nyquist_stays_stable() {
        let mut filter = Filter::new(FilterType::LowPass, 20000.0, 0.707);
        let mut samples = sine(1000.0, 22050, 22050);
        let before = rms(&samples);
        filter.process(&mut samples, 22050);
        assert!(samples.iter().all(|s| s.is_finite()));
        assert!((rms(&samples[2205..]) - before).abs() < before * 0.1);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = Filter::new(FilterType::LowPass, 1000.0, 0.707);
        let mut samples = vec![1.0; 64];
        filter.process(&mut samples, 44100);
        filter.reset();
        let mut silence = vec![0.0; 8];
        filter.process(&mut silence, 44100);
        assert!(silence.iter().all(|s| *s == 0.0));
    }
}
