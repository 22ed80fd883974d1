//! Bounded-concurrency job execution.
//!
//! One tokio task per host; a semaphore caps how many run at once. Every
//! submitted host yields exactly one outcome, whatever happens to its job.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use census_core::events::{EventPayload, ScanEvent};
use census_core::{HostAddress, HostRecord, ProbeError};

/// The result of one host's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub host: HostAddress,
    pub result: Result<HostRecord, ProbeError>,
}

/// Progress publishing for one run.
#[derive(Clone)]
struct Progress {
    scan_id: Uuid,
    sender: mpsc::UnboundedSender<ScanEvent>,
    completed: Arc<AtomicU64>,
    total: u64,
}

impl Progress {
    fn host_completed(&self, host: HostAddress, error: Option<&ProbeError>) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let event = ScanEvent::new(
            self.scan_id,
            EventPayload::HostCompleted {
                host,
                error_kind: error.map(|e| e.kind().to_string()),
                completed,
                total: self.total,
            },
        );
        // A dropped receiver only means nobody is watching.
        let _ = self.sender.send(event);
    }
}

pub struct JobScheduler {
    concurrency: usize,
    events: Option<(Uuid, mpsc::UnboundedSender<ScanEvent>)>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl JobScheduler {
    /// A scheduler running at most `concurrency` jobs at once (at least one).
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            events: None,
            shutdown: None,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Publish a `HostCompleted` event per finished job.
    pub fn with_events(mut self, scan_id: Uuid, sender: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.events = Some((scan_id, sender));
        self
    }

    /// Stop dispatching once `true` is sent on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run `job` once per host and collect outcomes in submission order.
    ///
    /// A job that panics is reported as `Panicked`. After shutdown, jobs
    /// already running finish on their own timeouts and hosts not yet
    /// dispatched are reported as `Cancelled`.
    pub async fn run<I, F, Fut>(&self, hosts: I, job: F) -> Vec<JobOutcome>
    where
        I: IntoIterator<Item = HostAddress>,
        F: Fn(HostAddress) -> Fut,
        Fut: Future<Output = Result<HostRecord, ProbeError>> + Send + 'static,
    {
        let mut hosts = hosts.into_iter();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let progress = self.events.as_ref().map(|(scan_id, sender)| Progress {
            scan_id: *scan_id,
            sender: sender.clone(),
            completed: Arc::new(AtomicU64::new(0)),
            total: hosts.size_hint().0 as u64,
        });
        let mut shutdown = self.shutdown.clone();

        let mut handles: Vec<(HostAddress, JoinHandle<Result<HostRecord, ProbeError>>)> =
            Vec::with_capacity(hosts.size_hint().0);
        let mut cancelled_at = None;

        for host in hosts.by_ref() {
            if is_shutdown(shutdown.as_ref()) {
                cancelled_at = Some(host);
                break;
            }

            let permit = match shutdown.as_mut() {
                Some(rx) => tokio::select! {
                    permit = semaphore.clone().acquire_owned() => permit.ok(),
                    _ = wait_for_shutdown(rx) => None,
                },
                None => semaphore.clone().acquire_owned().await.ok(),
            };
            let Some(permit) = permit else {
                cancelled_at = Some(host);
                break;
            };

            let fut = job(host);
            let progress = progress.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = fut.await;
                if let Err(e) = &result {
                    tracing::warn!(host = %host, kind = e.kind(), error = %e, "Host job failed");
                }
                if let Some(progress) = &progress {
                    progress.host_completed(host, result.as_ref().err());
                }
                result
            });
            handles.push((host, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (host, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let error = panicked(host, e);
                    tracing::error!(host = %host, error = %error, "Host job panicked");
                    if let Some(progress) = &progress {
                        progress.host_completed(host, Some(&error));
                    }
                    Err(error)
                }
            };
            outcomes.push(JobOutcome { host, result });
        }

        if let Some(first) = cancelled_at {
            let before = outcomes.len();
            outcomes.extend(std::iter::once(first).chain(hosts).map(|host| JobOutcome {
                host,
                result: Err(ProbeError::Cancelled { host }),
            }));
            tracing::warn!(
                dispatched = before,
                cancelled = outcomes.len() - before,
                "Scan interrupted"
            );
        }

        outcomes
    }
}

fn is_shutdown(shutdown: Option<&watch::Receiver<bool>>) -> bool {
    shutdown.is_some_and(|rx| *rx.borrow())
}

/// Resolves once shutdown is signalled; never if the sender goes away first.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panicked(host: HostAddress, error: JoinError) -> ProbeError {
    let message = if error.is_panic() {
        let payload = error.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string())
    } else {
        error.to_string()
    };
    ProbeError::Panicked { host, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use census_core::AddressRange;

    fn hosts(n: u32) -> AddressRange {
        AddressRange::new(HostAddress(1), HostAddress(n))
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let scheduler = JobScheduler::new(3);

        let outcomes = scheduler
            .run(&hosts(20), |host| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(HostRecord::up(host))
                }
            })
            .await;

        assert_eq!(outcomes.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_isolated() {
        let scheduler = JobScheduler::new(4);
        let outcomes = scheduler
            .run(&hosts(10), |host| async move {
                match host.0 {
                    3 => Err(ProbeError::Connection { host }),
                    7 => panic!("probe blew up"),
                    _ => Ok(HostRecord::up(host)),
                }
            })
            .await;

        assert_eq!(outcomes.len(), 10);
        let order: Vec<u32> = outcomes.iter().map(|o| o.host.0).collect();
        assert_eq!(order, (1..=10).collect::<Vec<_>>());
        for outcome in &outcomes {
            match outcome.host.0 {
                3 => assert_eq!(outcome.result, Err(ProbeError::Connection { host: outcome.host })),
                7 => assert!(matches!(
                    &outcome.result,
                    Err(ProbeError::Panicked { message, .. }) if message == "probe blew up"
                )),
                _ => assert_eq!(outcome.result, Ok(HostRecord::up(outcome.host))),
            }
        }
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let scheduler = JobScheduler::new(0);
        assert_eq!(scheduler.concurrency(), 1);
        let outcomes = scheduler
            .run(&hosts(3), |host| async move { Ok(HostRecord::down(host)) })
            .await;
        assert_eq!(outcomes.len(), 3);
    }

    #[tokio::test]
    async fn test_progress_events_cover_every_host() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scan_id = Uuid::new_v4();
        let scheduler = JobScheduler::new(2).with_events(scan_id, tx);
        scheduler
            .run(&hosts(5), |host| async move {
                if host.0 == 2 {
                    Err(ProbeError::Connection { host })
                } else {
                    Ok(HostRecord::up(host))
                }
            })
            .await;
        drop(scheduler);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.scan_id == scan_id));
        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::HostCompleted {
                    host,
                    error_kind: Some(kind),
                    total,
                    ..
                } => Some((host.0, kind.clone(), *total)),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec![(2, "ConnectionError".to_string(), 5)]);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_undispatched_hosts() {
        let (stop, shutdown) = watch::channel(false);
        let stop = Arc::new(stop);
        let scheduler = JobScheduler::new(1).with_shutdown(shutdown);

        let outcomes = scheduler
            .run(&hosts(6), |host| {
                let stop = Arc::clone(&stop);
                async move {
                    if host.0 == 2 {
                        let _ = stop.send(true);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Ok(HostRecord::up(host))
                }
            })
            .await;

        assert_eq!(outcomes.len(), 6);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[1].result.is_ok());
        let cancelled = outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(ProbeError::Cancelled { .. })))
            .count();
        assert_eq!(cancelled, 4);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_cancels_all() {
        let (_stop, shutdown) = watch::channel(true);
        let scheduler = JobScheduler::new(4).with_shutdown(shutdown);
        let outcomes = scheduler
            .run(&hosts(3), |host| async move { Ok(HostRecord::up(host)) })
            .await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes
            .iter()
            .all(|o| o.result == Err(ProbeError::Cancelled { host: o.host })));
    }
}
