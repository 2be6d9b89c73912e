//! Error handling for the virtual acquisition device
//!
//! Three failure classes: bad configuration caught at construction,
//! bad input to the analysis utilities, and opaque transport faults.

use core::fmt;

/// Result type alias for virtual DAQ operations
pub type DaqResult<T> = Result<T, DaqError>;

/// Error type shared by every crate in the workspace
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DaqError {
    /// Generator configuration rejected at construction time
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
    },

    /// Input data rejected by an analysis routine
    InvalidInput {
        /// Description of the input problem
        reason: String,
    },

    /// Fault surfaced by the labeled-stream transport
    Transport {
        /// Name of the stream the fault belongs to
        stream: String,
        /// Transport-provided description
        reason: String,
    },
}

impl DaqError {
    pub fn config(reason: impl Into<String>) -> Self {
        DaqError::InvalidConfiguration { reason: reason.into() }
    }

    pub fn input(reason: impl Into<String>) -> Self {
        DaqError::InvalidInput { reason: reason.into() }
    }

    pub fn transport(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        DaqError::Transport {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// True for faults raised by the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, DaqError::Transport { .. })
    }
}

impl fmt::Display for DaqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaqError::InvalidConfiguration { reason } => {
                write!(f, "Invalid configuration: {}", reason)
            }
            DaqError::InvalidInput { reason } => {
                write!(f, "Invalid input: {}", reason)
            }
            DaqError::Transport { stream, reason } => {
                write!(f, "Transport error on stream '{}': {}", stream, reason)
            }
        }
    }
}

impl std::error::Error for DaqError {}
