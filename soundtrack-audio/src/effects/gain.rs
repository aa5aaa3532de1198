//! Constant gain

use super::{Effect, EffectError, EffectOptions};

/// Multiply every sample by a fixed factor
pub struct Gain {
    gain: f32,
}

impl Gain {
    /// Option a scalar `options` value is assigned to
    pub const DEFAULT_OPTION: &'static str = "gain";

    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    /// Build from `gain` (multiplier) or `db` (decibels)
    pub fn build(options: &EffectOptions) -> Result<Box<dyn Effect>, EffectError> {
        let gain = match options.get("db") {
            Some(db) => 10f64.powf(db / 20.0),
            None => options.get_or("gain", 1.0),
        };
        Ok(Box::new(Self::new(gain as f32)))
    }
}

impl Effect for Gain {
    fn process(&mut self, samples: &mut [f32], _sample_rate: u32) {
        for sample in samples.iter_mut() {
            *sample *= self.gain;
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "Gain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_option() {
        let mut gain = Gain::build(&EffectOptions::new("gain").with("db", -6.0)).unwrap();
        let mut samples = vec![1.0];
        gain.process(&mut samples, 44100);
        assert!((samples[0] - 0.501).abs() < 0.001);
    }
}
