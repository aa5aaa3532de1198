//! Adjustable fade effect built on the fade curve generator

use super::{Effect, EffectError, EffectOptions};
use crate::fade::curve;

/// Gain envelope from `gain0` to `gain1` shaped by `curve_ratio`
pub struct AdjustableFade {
    gain0: f32,
    gain1: f32,
    curve_ratio: f32,
    /// Last generated envelope, reused across channels of equal length
    envelope: Vec<f32>,
}

impl AdjustableFade {
    /// Option a scalar `options` value is assigned to
    pub const DEFAULT_OPTION: &'static str = "curve_ratio";

    pub fn new(gain0: f32, gain1: f32, curve_ratio: f32) -> Self {
        Self {
            gain0,
            gain1,
            curve_ratio,
            envelope: Vec::new(),
        }
    }

    pub fn build(options: &EffectOptions) -> Result<Box<dyn Effect>, EffectError> {
        Ok(Box::new(Self::new(
            options.get_or("gain0", 1.0) as f32,
            options.get_or("gain1", 0.0) as f32,
            options.get_or("curve_ratio", 0.0) as f32,
        )))
    }
}

impl Effect for AdjustableFade {
    fn process(&mut self, samples: &mut [f32], _sample_rate: u32) {
        if self.envelope.len() != samples.len() {
            self.envelope = curve(self.gain0, self.gain1, self.curve_ratio, samples.len());
        }
        for (sample, gain) in samples.iter_mut().zip(&self.envelope) {
            *sample *= gain;
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "Adjustable Fade"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_out_reaches_zero() {
        let mut fade = AdjustableFade::new(1.0, 0.0, 0.0);
        let mut samples = vec![1.0; 5];
        fade.process(&mut samples, 44100);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[4], 0.0);
        assert!((samples[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_build_defaults() {
        let options = EffectOptions::new("fade").with("gain0", 0.0).with("gain1", 1.0);
        let mut fade = AdjustableFade::build(&options).unwrap();
        let mut samples = vec![0.5; 3];
        fade.process(&mut samples, 44100);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[2], 0.5);
    }
}
