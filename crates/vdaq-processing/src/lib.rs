//! VDAQ-Processing: analysis of captured stream data
//!
//! Spectral validation of signals recorded from a virtual device.

pub mod spectrum;

pub use spectrum::{analyze, Spectrum, SpectrumAnalyzer};
