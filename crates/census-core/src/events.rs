//! Scan progress events.
//!
//! The job scheduler publishes one event per completed host; the binary
//! subscribes to drive progress logging instead of polling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{HostAddress, ScanMode};

/// An event emitted during a scan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEvent {
    pub scan_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl ScanEvent {
    pub fn new(scan_id: Uuid, payload: EventPayload) -> Self {
        Self {
            scan_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    /// A run started dispatching jobs.
    ScanStarted { mode: ScanMode, host_count: u64 },
    /// One host's job finished, successfully or not.
    HostCompleted {
        host: HostAddress,
        /// `None` on success, otherwise the error kind.
        error_kind: Option<String>,
        completed: u64,
        total: u64,
    },
    /// All jobs have reported.
    ScanCompleted {
        succeeded: u64,
        failed: u64,
        duration_ms: u64,
    },
}
