//! Nominal interval pacing for the emission loop
//!
//! Sleep-based pacing is best effort. Below [`MIN_RELIABLE_INTERVAL`]
//! (roughly 500 Hz) the OS timer overshoots noticeably and the achieved
//! sample rate drops below nominal. This is a known limitation.

use tokio::time::{sleep, Duration};

/// Shortest interval the sleep primitive honours with acceptable accuracy
pub const MIN_RELIABLE_INTERVAL: Duration = Duration::from_millis(2);

/// Fixed-duration wait between generator ticks
#[derive(Debug, Clone, Copy)]
pub struct NominalTimer {
    interval: Duration,
}

impl NominalTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Interval of `1 / rate_hz`, saturating for rates too low to represent
    pub fn from_rate(rate_hz: f64) -> Self {
        Self::new(Duration::try_from_secs_f64(1.0 / rate_hz).unwrap_or(Duration::MAX))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the interval is at or above the reliable resolution
    pub fn is_reliable(&self) -> bool {
        self.interval >= MIN_RELIABLE_INTERVAL
    }

    pub async fn wait(&self) {
        sleep(self.interval).await;
    }
}
