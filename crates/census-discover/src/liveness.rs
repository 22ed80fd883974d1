//! Host reachability probing.
//!
//! Unreachability is a normal outcome: probes return `false`, never an error,
//! for hosts that do not answer.

use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::process::Command;

use census_core::HostAddress;

use crate::config::{LivenessConfig, LivenessMethod};
use crate::error::{DiscoverError, Result};

const PAYLOAD: [u8; 56] = [0u8; 56];

/// Extra time a spawned `ping` gets past its own deadline before it is killed.
const PROCESS_GRACE: Duration = Duration::from_millis(500);

const LOOPBACK: HostAddress = HostAddress(0x7f00_0001);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(1);

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Send one echo request and wait at most `timeout` for the reply.
    async fn echo(&self, host: HostAddress, sequence: u16, timeout: Duration) -> bool;

    /// Up to `attempts` echoes; `true` on the first reply.
    async fn is_up(&self, host: HostAddress, attempts: u32, timeout: Duration) -> bool {
        for attempt in 0..attempts {
            let sequence = u16::try_from(attempt).unwrap_or(u16::MAX);
            if self.echo(host, sequence, timeout).await {
                tracing::debug!(host = %host, attempt, "Host replied");
                return true;
            }
        }
        tracing::debug!(host = %host, attempts, "Host did not reply");
        false
    }
}

/// Build the probe selected by configuration.
///
/// A `system` probe must pass [`SystemPing::verify`] first, so a missing or
/// incompatible binary fails the run instead of reporting every host down.
pub async fn from_config(config: &LivenessConfig) -> Result<Arc<dyn LivenessProbe>> {
    match config.method {
        LivenessMethod::System => {
            let ping = SystemPing::new(&config.ping_path);
            ping.verify().await?;
            Ok(Arc::new(ping))
        }
        LivenessMethod::Icmp => Ok(Arc::new(IcmpPing::new()?)),
    }
}

/// Runs the platform `ping` binary, one echo per attempt.
pub struct SystemPing {
    ping_path: String,
}

impl SystemPing {
    pub fn new(ping_path: &str) -> Self {
        Self {
            ping_path: ping_path.to_string(),
        }
    }

    /// One echo to loopback with the same arguments a scan uses.
    pub async fn verify(&self) -> Result<()> {
        let child = Command::new(&self.ping_path)
            .args(Self::args(LOOPBACK, VERIFY_TIMEOUT))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(VERIFY_TIMEOUT + PROCESS_GRACE, child)
            .await
            .map_err(|_| {
                DiscoverError::LivenessInit(format!("{} did not answer loopback", self.ping_path))
            })?
            .map_err(|e| DiscoverError::LivenessInit(format!("{}: {e}", self.ping_path)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DiscoverError::LivenessInit(format!(
                "{} failed loopback check ({}): {}",
                self.ping_path,
                output.status,
                stderr.trim()
            )));
        }
        tracing::debug!(path = %self.ping_path, "Ping binary verified");
        Ok(())
    }

    fn args(host: HostAddress, timeout: Duration) -> Vec<String> {
        let host = host.to_string();
        if cfg!(windows) {
            vec!["-n".into(), "1".into(), "-w".into(), timeout.as_millis().to_string(), host]
        } else if cfg!(target_os = "macos") {
            vec!["-c".into(), "1".into(), "-W".into(), timeout.as_millis().to_string(), host]
        } else {
            // iputils takes fractional seconds.
            let secs = format!("{:.3}", timeout.as_secs_f64());
            vec!["-n".into(), "-q".into(), "-c".into(), "1".into(), "-W".into(), secs, host]
        }
    }
}

#[async_trait]
impl LivenessProbe for SystemPing {
    async fn echo(&self, host: HostAddress, _sequence: u16, timeout: Duration) -> bool {
        let child = Command::new(&self.ping_path)
            .args(Self::args(host, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(timeout + PROCESS_GRACE, child).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::warn!(host = %host, error = %e, path = %self.ping_path, "Failed to run ping");
                false
            }
            Err(_) => false,
        }
    }
}

/// Raw ICMP echo over a shared socket. Needs raw-socket privileges.
pub struct IcmpPing {
    client: Client,
}

impl IcmpPing {
    pub fn new() -> Result<Self> {
        let client = Client::new(&Config::default())
            .map_err(|e| DiscoverError::LivenessInit(e.to_string()))?;
        Ok(Self { client })
    }

    fn identifier(host: HostAddress) -> PingIdentifier {
        PingIdentifier((host.0 as u16) ^ ((host.0 >> 16) as u16))
    }
}

#[async_trait]
impl LivenessProbe for IcmpPing {
    async fn echo(&self, host: HostAddress, sequence: u16, timeout: Duration) -> bool {
        let ip = IpAddr::V4(Ipv4Addr::from(host));
        let mut pinger = self.client.pinger(ip, Self::identifier(host)).await;
        pinger.timeout(timeout);
        pinger.ping(PingSequence(sequence), &PAYLOAD).await.is_ok()
    }
}
