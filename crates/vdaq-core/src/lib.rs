//! VDAQ-Core: Foundation types for the virtual acquisition device
//!
//! Stream metadata, generator configuration, the transport interface and
//! the shared error type.

pub mod config;
pub mod error;
pub mod stream_types;
pub mod transport;

pub use config::*;
pub use error::{DaqError, DaqResult};
pub use stream_types::*;
pub use transport::*;
