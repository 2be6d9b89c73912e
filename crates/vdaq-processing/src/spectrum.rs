//! One-sided spectrum of captured stream data
//!
//! The sample spacing is taken from the first two timestamps and assumed
//! constant. Irregular timestamps therefore give a wrong frequency axis;
//! nothing here checks for that.

use num_complex::Complex;
use realfft::RealFftPlanner;
use vdaq_core::{DaqError, DaqResult};

/// Frequency-domain view of a real signal
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Bin centre frequencies in Hz, `k / (n * dt)` for `k = 0..=n/2`
    pub frequencies: Vec<f64>,
    /// Complex transform values per bin
    pub magnitudes: Vec<Complex<f64>>,
    /// `20 * log10(|X_k|)`; a zero bin gives negative infinity
    pub magnitudes_db: Vec<f64>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Spacing between adjacent bins in Hz
    pub fn bin_width(&self) -> f64 {
        match self.frequencies.get(1) {
            Some(f) => *f,
            None => 0.0,
        }
    }

    /// Frequency of the strongest non-DC bin
    pub fn peak_frequency(&self) -> Option<f64> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|(_, a), (_, b)| a.norm().total_cmp(&b.norm()))
            .map(|(i, _)| self.frequencies[i])
    }
}

/// Real-input FFT analyzer that caches plans between calls
pub struct SpectrumAnalyzer {
    planner: RealFftPlanner<f64>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
        }
    }

    pub fn analyze(&mut self, timestamps: &[f64], signal: &[f64]) -> DaqResult<Spectrum> {
        if timestamps.len() < 2 {
            return Err(DaqError::input(format!(
                "need at least 2 samples, got {}",
                timestamps.len()
            )));
        }
        if timestamps.len() != signal.len() {
            return Err(DaqError::input(format!(
                "timestamps ({}) and signal ({}) differ in length",
                timestamps.len(),
                signal.len()
            )));
        }

        let dt = timestamps[1] - timestamps[0];
        if !dt.is_finite() || dt <= 0.0 {
            return Err(DaqError::input(format!(
                "sample spacing must be positive, got {}",
                dt
            )));
        }

        let n = signal.len();
        let fft = self.planner.plan_fft_forward(n);
        let mut input = signal.to_vec();
        let mut output = fft.make_output_vec();
        fft.process(&mut input, &mut output)
            .map_err(|e| DaqError::input(format!("FFT failed: {}", e)))?;

        let resolution = 1.0 / (n as f64 * dt);
        let frequencies = (0..output.len()).map(|k| k as f64 * resolution).collect();
        let magnitudes_db = output.iter().map(|c| 20.0 * c.norm().log10()).collect();

        Ok(Spectrum {
            frequencies,
            magnitudes: output,
            magnitudes_db,
        })
    }
}

/// One-shot analysis without plan reuse
pub fn analyze(timestamps: &[f64], signal: &[f64]) -> DaqResult<Spectrum> {
    SpectrumAnalyzer::new().analyze(timestamps, signal)
}
