//! Merging per-host outcomes into the final dataset.
//!
//! Results are keyed by address, so the order outcomes arrive in never
//! matters. Failed hosts are kept by name; nothing is dropped silently.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use census_core::{ClassifiedDevice, HostAddress, HostStatus, ProbeError, ScanMode};

use crate::pipeline::ScanRun;
use crate::scheduler::JobOutcome;

/// Which hosts the discovery table lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputPolicy {
    #[default]
    AllHosts,
    UpOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub hosts: BTreeMap<HostAddress, HostStatus>,
    pub failures: Vec<ProbeError>,
}

impl DiscoveryReport {
    pub fn from_outcomes(outcomes: &[JobOutcome], policy: OutputPolicy) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(record) => {
                    if policy == OutputPolicy::AllHosts || record.status.is_up() {
                        report.hosts.insert(record.address, record.status);
                    }
                }
                Err(e) => report.failures.push(e.clone()),
            }
        }
        report
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub devices: BTreeMap<HostAddress, ClassifiedDevice>,
    /// Hosts that were down; not failures.
    pub down: Vec<HostAddress>,
    pub failures: Vec<ProbeError>,
}

impl ProbeReport {
    pub fn from_outcomes(outcomes: &[JobOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(record) => match &record.attributes {
                    Some(device) => {
                        report.devices.insert(record.address, device.clone());
                    }
                    None => report.down.push(record.address),
                },
                Err(e) => report.failures.push(e.clone()),
            }
        }
        report
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedHost {
    pub host: HostAddress,
    pub kind: &'static str,
    pub message: String,
}

/// End-of-run totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub scan_id: Uuid,
    pub mode: ScanMode,
    pub total: u64,
    pub up: u64,
    pub down: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failures_by_kind: BTreeMap<&'static str, u64>,
    pub failed_hosts: Vec<FailedHost>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// In discovery every answered job succeeds, up or down. In probing only
    /// a classified device counts as a success; down hosts count as neither.
    pub fn new(run: &ScanRun) -> Self {
        let mut summary = Self {
            scan_id: run.scan_id,
            mode: run.mode,
            total: run.outcomes.len() as u64,
            up: 0,
            down: 0,
            succeeded: 0,
            failed: 0,
            failures_by_kind: BTreeMap::new(),
            failed_hosts: Vec::new(),
            started_at: run.started_at,
            finished_at: run.finished_at,
        };

        for outcome in &run.outcomes {
            match &outcome.result {
                Ok(record) => {
                    match record.status {
                        HostStatus::Up => summary.up += 1,
                        HostStatus::Down => summary.down += 1,
                    }
                    let success = match run.mode {
                        ScanMode::Discovery => true,
                        ScanMode::Probing => record.attributes.is_some(),
                    };
                    if success {
                        summary.succeeded += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    *summary.failures_by_kind.entry(e.kind()).or_default() += 1;
                    summary.failed_hosts.push(FailedHost {
                        host: e.host(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        summary
    }

    /// A non-empty run in which no host succeeded, whatever the reason:
    /// down, failed, or cancelled before dispatch.
    pub fn nothing_succeeded(&self) -> bool {
        self.total > 0 && self.succeeded == 0
    }

    pub fn log(&self) {
        tracing::info!(
            scan_id = %self.scan_id,
            mode = ?self.mode,
            total = self.total,
            up = self.up,
            down = self.down,
            succeeded = self.succeeded,
            failed = self.failed,
            failures_by_kind = ?self.failures_by_kind,
            duration_ms = (self.finished_at - self.started_at).num_milliseconds(),
            "Run summary"
        );
        for failed in &self.failed_hosts {
            tracing::warn!(host = %failed.host, kind = failed.kind, "{}", failed.message);
        }
    }
}
