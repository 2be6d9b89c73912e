//! Interface to the labeled-stream transport
//!
//! The generator only talks to the transport through these traits. Stream
//! discovery, buffering and delivery are the implementor's business.

use crate::error::DaqResult;
use crate::stream_types::StreamDescriptor;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One sample vector with its timestamp in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedSample {
    pub timestamp: f64,
    pub values: Vec<f32>,
}

/// Outbound channel for a single registered stream
pub trait PublisherHandle {
    fn descriptor(&self) -> &StreamDescriptor;

    /// Whether at least one consumer is attached right now
    fn has_consumers(&self) -> bool;

    /// Hand one sample to the transport. Must not block.
    fn push(&mut self, sample: &[f32], timestamp: f64) -> DaqResult<()>;
}

/// Registers streams and hands out publisher handles
pub trait Transport {
    type Handle: PublisherHandle;

    fn register(
        &self,
        descriptor: StreamDescriptor,
        chunk_size: usize,
        buffer_duration_s: f64,
    ) -> DaqResult<Self::Handle>;
}

/// High-resolution clock in seconds
pub trait Clock {
    fn now(&self) -> f64;
}

/// Monotonic clock counting from its own creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}
