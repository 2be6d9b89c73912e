//! Stream metadata: per-channel specs and stream descriptors

use serde::{Deserialize, Serialize};

/// Channel labels of the emulated Quick-20 headset, in sample order.
///
/// Eight sensor sites followed by the auxiliary lanes.
pub const REFERENCE_LABELS: [&str; 13] = [
    "P8", "P7", "Pz", "P4", "P3", "O1", "O2", "A2",
    "ACC8", "ACC9", "ACC10", "Packet Counter", "TRIGGER",
];

/// Auxiliary channels appended after the sensor channels
pub const AUX_CHANNEL_COUNT: usize = 5;

/// Display name of the emulated device
pub const DEVICE_NAME: &str = "Virtual Cognionics Quick-20";

/// Reference label for a channel index, if the reference set covers it
pub fn reference_label(index: usize) -> Option<&'static str> {
    REFERENCE_LABELS.get(index).copied()
}

/// Metadata for one channel lane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub label: String,
    pub unit: String,
    pub kind: String,
}

/// Unit and label decoration applied to every channel of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelProfile {
    pub label_suffix: &'static str,
    pub unit: &'static str,
}

impl ChannelProfile {
    pub const SIGNAL: ChannelProfile = ChannelProfile {
        label_suffix: "",
        unit: "microvolts",
    };

    pub const IMPEDANCE: ChannelProfile = ChannelProfile {
        label_suffix: "-Z",
        unit: "kohms",
    };
}

/// Static description of one logical stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub kind: String,
    pub channel_count: usize,
    pub sample_rate: f64,
    pub unique_id: String,
    /// Per-channel metadata for the first `min(channel_count, 13)` channels
    pub channels: Vec<ChannelSpec>,
}

impl StreamDescriptor {
    /// Build a descriptor with `sensor_channel_count + AUX_CHANNEL_COUNT` channels.
    ///
    /// Channels are labeled from [`REFERENCE_LABELS`] by index. Channels past
    /// the end of the reference set get no entry in `channels`.
    pub fn build(
        name: &str,
        kind: &str,
        sensor_channel_count: usize,
        sample_rate: f64,
        unique_id: &str,
        profile: ChannelProfile,
    ) -> Self {
        let channel_count = sensor_channel_count + AUX_CHANNEL_COUNT;
        let channels = (0..channel_count)
            .map_while(reference_label)
            .map(|label| ChannelSpec {
                label: format!("{}{}", label, profile.label_suffix),
                unit: profile.unit.to_string(),
                kind: kind.to_string(),
            })
            .collect();

        StreamDescriptor {
            name: name.to_string(),
            kind: kind.to_string(),
            channel_count,
            sample_rate,
            unique_id: unique_id.to_string(),
            channels,
        }
    }

    /// Sensor data stream ("EEG", microvolts)
    pub fn signal(sensor_channel_count: usize, sample_rate: f64, unique_id: &str) -> Self {
        Self::build(
            DEVICE_NAME,
            "EEG",
            sensor_channel_count,
            sample_rate,
            unique_id,
            ChannelProfile::SIGNAL,
        )
    }

    /// Companion impedance stream ("Impedance", kohms, "-Z" labels)
    pub fn impedance(sensor_channel_count: usize, sample_rate: f64, unique_id: &str) -> Self {
        Self::build(
            &format!("{} Impedance", DEVICE_NAME),
            "Impedance",
            sensor_channel_count,
            sample_rate,
            unique_id,
            ChannelProfile::IMPEDANCE,
        )
    }

    /// Metadata for a channel index, `None` past the labeled range
    pub fn channel(&self, index: usize) -> Option<&ChannelSpec> {
        self.channels.get(index)
    }

    /// Number of channels without per-channel metadata
    pub fn unlabeled_channels(&self) -> usize {
        self.channel_count.saturating_sub(self.channels.len())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.label.as_str())
    }
}
