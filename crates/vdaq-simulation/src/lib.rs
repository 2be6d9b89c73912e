//! VDAQ-Simulation: virtual acquisition device
//!
//! Waveform generation, the paired-stream emission loop and an in-process
//! loopback transport for consumers in the same process.

pub mod generator;
pub mod loopback;
pub mod timer;
pub mod waveform;

pub use generator::*;
pub use loopback::*;
pub use timer::*;
pub use waveform::*;
