//! Per-host jobs and the run that fans them out.
//!
//! Discovery runs the liveness probe alone. Probing gates on liveness (unless
//! disabled), then binds a credential, reads the device, and classifies it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use census_core::events::{EventPayload, ScanEvent};
use census_core::{HostAddress, HostRecord, HostStatus, ProbeError, ScanMode};

use crate::classify::DeviceClassifier;
use crate::config::LivenessConfig;
use crate::liveness::LivenessProbe;
use crate::prober::DeviceProber;
use crate::scheduler::{JobOutcome, JobScheduler};
use crate::targets::HostSet;

/// A liveness probe with its retry budget.
#[derive(Clone)]
pub struct Liveness {
    probe: Arc<dyn LivenessProbe>,
    attempts: u32,
    timeout: Duration,
}

impl Liveness {
    pub fn new(probe: Arc<dyn LivenessProbe>, attempts: u32, timeout: Duration) -> Self {
        Self {
            probe,
            attempts: attempts.max(1),
            timeout,
        }
    }

    pub fn from_config(probe: Arc<dyn LivenessProbe>, config: &LivenessConfig) -> Self {
        Self::new(probe, config.attempts, config.timeout())
    }

    pub async fn status(&self, host: HostAddress) -> HostStatus {
        if self.probe.is_up(host, self.attempts, self.timeout).await {
            HostStatus::Up
        } else {
            HostStatus::Down
        }
    }
}

/// Everything a probing job needs beyond liveness.
pub struct Probing {
    pub prober: DeviceProber,
    pub classifier: DeviceClassifier,
    pub require_liveness: bool,
}

/// The raw result of one run, before aggregation.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub scan_id: Uuid,
    pub mode: ScanMode,
    pub outcomes: Vec<JobOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Pipeline {
    scan_id: Uuid,
    concurrency: usize,
    liveness: Liveness,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Pipeline {
    pub fn new(concurrency: usize, liveness: Liveness) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            concurrency,
            liveness,
            events: None,
            shutdown: None,
        }
    }

    pub fn scan_id(&self) -> Uuid {
        self.scan_id
    }

    pub fn with_events(mut self, sender: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Liveness sweep: every host comes back `Up` or `Down`.
    pub async fn discover(&self, hosts: &HostSet) -> ScanRun {
        let liveness = self.liveness.clone();
        self.execute(ScanMode::Discovery, hosts, move |host| {
            let liveness = liveness.clone();
            async move {
                Ok(match liveness.status(host).await {
                    HostStatus::Up => HostRecord::up(host),
                    HostStatus::Down => HostRecord::down(host),
                })
            }
        })
        .await
    }

    /// Liveness gate, then probe and classify each host that is up.
    pub async fn probe(&self, hosts: &HostSet, probing: Arc<Probing>) -> ScanRun {
        let liveness = self.liveness.clone();
        self.execute(ScanMode::Probing, hosts, move |host| {
            let liveness = liveness.clone();
            let probing = Arc::clone(&probing);
            async move { probe_host(host, &liveness, &probing).await }
        })
        .await
    }

    async fn execute<F, Fut>(&self, mode: ScanMode, hosts: &HostSet, job: F) -> ScanRun
    where
        F: Fn(HostAddress) -> Fut,
        Fut: std::future::Future<Output = Result<HostRecord, ProbeError>> + Send + 'static,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        tracing::info!(
            scan_id = %self.scan_id,
            mode = ?mode,
            hosts = hosts.len(),
            concurrency = self.concurrency,
            "Starting scan"
        );
        self.publish(EventPayload::ScanStarted {
            mode,
            host_count: hosts.len(),
        });

        let mut scheduler = JobScheduler::new(self.concurrency);
        if let Some(sender) = &self.events {
            scheduler = scheduler.with_events(self.scan_id, sender.clone());
        }
        if let Some(shutdown) = &self.shutdown {
            scheduler = scheduler.with_shutdown(shutdown.clone());
        }
        let outcomes = scheduler.run(hosts.iter(), job).await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count() as u64;
        let succeeded = outcomes.len() as u64 - failed;
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            scan_id = %self.scan_id,
            succeeded,
            failed,
            duration_ms,
            "Scan complete"
        );
        self.publish(EventPayload::ScanCompleted {
            succeeded,
            failed,
            duration_ms,
        });

        ScanRun {
            scan_id: self.scan_id,
            mode,
            outcomes,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn publish(&self, payload: EventPayload) {
        if let Some(sender) = &self.events {
            let _ = sender.send(ScanEvent::new(self.scan_id, payload));
        }
    }
}

/// A down host is a normal outcome, not a failure.
async fn probe_host(
    host: HostAddress,
    liveness: &Liveness,
    probing: &Probing,
) -> Result<HostRecord, ProbeError> {
    if probing.require_liveness && !liveness.status(host).await.is_up() {
        return Ok(HostRecord::down(host));
    }
    let device = probing.prober.probe(host).await?;
    let classified = probing.classifier.classify(host, device.attributes)?;
    tracing::info!(
        host = %host,
        vendor = %device.binding.vendor,
        model = %classified.attributes.model,
        device_type = %classified.device_type,
        "Device classified"
    );
    Ok(HostRecord::up(host).with_device(classified))
}
