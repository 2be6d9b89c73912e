//! Waveform policies evaluated once per emitted sample

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use vdaq_core::Waveform;

/// Reference frequency of the plain sinusoid
pub const SINUSOID_FREQ_HZ: f64 = 10.0;
/// Fundamental of the noisy sinusoid
pub const NOISY_BASE_FREQ_HZ: f64 = 5.0;
/// Overtone of the noisy sinusoid, scaled by [`NOISY_OVERTONE_GAIN`]
pub const NOISY_OVERTONE_FREQ_HZ: f64 = 15.0;
pub const NOISY_OVERTONE_GAIN: f64 = 0.2;
pub const NOISE_GAIN: f64 = 0.2;

/// A waveform strategy plus the RNG its random components draw from
pub struct WaveformPolicy {
    waveform: Waveform,
    rng: StdRng,
}

impl WaveformPolicy {
    pub fn new(waveform: Waveform, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { waveform, rng }
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Sample vector of `channel_count` values at `phase` seconds
    pub fn evaluate(&mut self, phase: f64, channel_count: usize) -> Vec<f32> {
        match self.waveform {
            Waveform::Random => (0..channel_count).map(|_| self.rng.gen::<f32>()).collect(),

            Waveform::Sinusoid => {
                let value = (SINUSOID_FREQ_HZ * 2.0 * PI * phase).sin();
                vec![value as f32; channel_count]
            }

            Waveform::NoisySinusoid => {
                let value = (NOISY_BASE_FREQ_HZ * 2.0 * PI * phase).sin()
                    + NOISY_OVERTONE_GAIN * (NOISY_OVERTONE_FREQ_HZ * 2.0 * PI * phase).sin()
                    + NOISE_GAIN * self.rng.gen::<f64>();
                vec![value as f32; channel_count]
            }
        }
    }

    pub fn description(&self) -> &'static str {
        match self.waveform {
            Waveform::Random => "Uncorrelated uniform noise",
            Waveform::Sinusoid => "10 Hz sinusoid",
            Waveform::NoisySinusoid => "5 Hz + 15 Hz sinusoid with noise",
        }
    }
}
