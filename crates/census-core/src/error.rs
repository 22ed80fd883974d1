//! Per-host failure taxonomy.
//!
//! A `ProbeError` is always tagged with the host it belongs to, so a failed
//! job can be reported by name without any surrounding context.

use thiserror::Error;

use crate::types::{Field, HostAddress};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("No vendor/credential pair accepted by {host}")]
    Connection { host: HostAddress },

    #[error("Field {field} unavailable on {host}")]
    FieldRetrieval { host: HostAddress, field: Field },

    #[error("Model {model:?} on {host} matches no known device")]
    UnknownDevice { host: HostAddress, model: String },

    #[error("Job for {host} panicked: {message}")]
    Panicked { host: HostAddress, message: String },

    #[error("Job for {host} cancelled before dispatch")]
    Cancelled { host: HostAddress },
}

impl ProbeError {
    pub fn host(&self) -> HostAddress {
        match self {
            Self::Connection { host }
            | Self::FieldRetrieval { host, .. }
            | Self::UnknownDevice { host, .. }
            | Self::Panicked { host, .. }
            | Self::Cancelled { host } => *host,
        }
    }

    /// Stable name of the error kind, used in summaries and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "ConnectionError",
            Self::FieldRetrieval { .. } => "FieldRetrievalError",
            Self::UnknownDevice { .. } => "UnknownDeviceError",
            Self::Panicked { .. } => "Panicked",
            Self::Cancelled { .. } => "Cancelled",
        }
    }
}
