//! Generator configuration

use crate::error::{DaqError, DaqResult};
use crate::stream_types::AUX_CHANNEL_COUNT;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Waveform strategy used to fill every emitted sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Independent uniform noise on every channel
    Random,
    /// 10 Hz sine broadcast to all channels
    Sinusoid,
    /// 5 Hz + 15 Hz sines with uniform noise, broadcast to all channels
    #[serde(alias = "noisy_sin")]
    NoisySinusoid,
}

impl Waveform {
    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Random => "random",
            Waveform::Sinusoid => "sinusoid",
            Waveform::NoisySinusoid => "noisy_sin",
        }
    }
}

impl FromStr for Waveform {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Waveform::Random),
            "sinusoid" => Ok(Waveform::Sinusoid),
            "noisy_sin" | "noisy_sinusoid" => Ok(Waveform::NoisySinusoid),
            other => Err(DaqError::config(format!(
                "unknown waveform '{}', expected one of: random, sinusoid, noisy_sin",
                other
            ))),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// When the generator's phase cursor moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseAdvance {
    /// Only ticks that pushed a sample advance the phase
    #[default]
    OnEmit,
    /// Every tick advances the phase, consumer or not
    EveryTick,
}

/// Configuration for one virtual acquisition device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Number of sensor channels; five auxiliary channels are added on top
    pub sensor_channel_count: usize,
    /// Nominal sample rate in Hz
    pub sample_rate_hz: f64,
    /// Samples per transport chunk
    pub chunk_size: usize,
    /// Outgoing buffer length in seconds
    pub buffer_duration_s: f64,
    /// Waveform strategy
    pub waveform: Waveform,
    /// Phase cursor policy
    pub phase_advance: PhaseAdvance,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// Source identifier of the signal stream
    pub source_id: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            sensor_channel_count: 8,
            sample_rate_hz: 500.0,
            chunk_size: 1,
            buffer_duration_s: 360.0,
            waveform: Waveform::Random,
            phase_advance: PhaseAdvance::OnEmit,
            seed: None,
            source_id: "myuid000000".to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Number of auxiliary channels appended after the sensors
    pub const AUX_CHANNELS: usize = AUX_CHANNEL_COUNT;

    pub fn with_waveform(waveform: Waveform, sample_rate_hz: f64) -> Self {
        Self {
            waveform,
            sample_rate_hz,
            ..Default::default()
        }
    }

    /// Parse a JSON document and validate it
    pub fn from_json(json: &str) -> DaqResult<Self> {
        let config: GeneratorConfig = serde_json::from_str(json)
            .map_err(|e| DaqError::config(format!("failed to parse generator config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DaqResult<()> {
        if self.sensor_channel_count == 0 {
            return Err(DaqError::config("sensor channel count must be positive"));
        }
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(DaqError::config(format!(
                "sample rate must be positive, got {}",
                self.sample_rate_hz
            )));
        }
        if self.chunk_size == 0 {
            return Err(DaqError::config("chunk size must be positive"));
        }
        if !self.buffer_duration_s.is_finite() || self.buffer_duration_s < 0.0 {
            return Err(DaqError::config(format!(
                "buffer duration must be non-negative, got {}",
                self.buffer_duration_s
            )));
        }
        if self.source_id.trim().is_empty() {
            return Err(DaqError::config("source id must not be empty"));
        }
        Ok(())
    }

    /// Total channels per sample
    pub fn channel_count(&self) -> usize {
        self.sensor_channel_count + Self::AUX_CHANNELS
    }

    /// Nominal seconds between samples
    pub fn interval_s(&self) -> f64 {
        1.0 / self.sample_rate_hz
    }

    /// Source id of the impedance stream.
    ///
    /// A trailing digit run is incremented keeping its width
    /// (`myuid000000` becomes `myuid000001`), otherwise `-z` is appended.
    pub fn impedance_source_id(&self) -> String {
        let id = self.source_id.as_str();
        let prefix = id.trim_end_matches(|c: char| c.is_ascii_digit());
        let digits = &id[prefix.len()..];

        match digits.parse::<u64>() {
            Ok(n) if !digits.is_empty() => {
                format!("{}{:0width$}", prefix, n.wrapping_add(1), width = digits.len())
            }
            _ => format!("{}-z", id),
        }
    }
}
