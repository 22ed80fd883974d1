//! Configuration for the census-discover scanner.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from `census.toml` `[discover]` section or
/// `CENSUS_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Maximum concurrent host jobs. Defaults to available parallelism.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Credential and OID profile document (JSON).
    #[serde(default = "default_profiles_path")]
    pub profiles_path: String,

    /// Known-device table (`prefix;type` rows).
    #[serde(default = "default_known_devices_path")]
    pub known_devices_path: String,

    #[serde(default = "default_delimiter")]
    pub known_devices_delimiter: String,

    /// Field delimiter of the discovery table.
    #[serde(default = "default_delimiter")]
    pub output_delimiter: String,

    /// Gate device probing on a successful liveness probe.
    #[serde(default = "default_true")]
    pub require_liveness: bool,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub snmp: SnmpConfig,
}

/// How reachability is tested.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LivenessMethod {
    /// Spawn the platform `ping` binary.
    #[default]
    System,
    /// Raw ICMP echo; needs privileges.
    Icmp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LivenessConfig {
    #[serde(default)]
    pub method: LivenessMethod,

    /// Echo attempts before a host is declared down.
    #[serde(default = "default_ping_attempts")]
    pub attempts: u32,

    /// Timeout of each attempt.
    #[serde(default = "default_ping_timeout_ms")]
    pub timeout_ms: u64,

    /// Path to the ping binary for the `system` method.
    #[serde(default = "default_ping_path")]
    pub ping_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnmpConfig {
    #[serde(default = "default_snmp_port")]
    pub port: u16,

    /// Timeout of session open and of each GET.
    #[serde(default = "default_snmp_timeout_ms")]
    pub timeout_ms: u64,

    /// Query used to confirm a community is accepted (`sysDescr.0`).
    #[serde(default = "default_canary_oid")]
    pub canary_oid: String,
}

impl DiscoverConfig {
    /// Effective worker count: configured value, else available parallelism.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(default_concurrency)
    }

    pub fn known_devices_delimiter_byte(&self) -> Result<u8> {
        delimiter_byte("known_devices_delimiter", &self.known_devices_delimiter)
    }

    pub fn output_delimiter_byte(&self) -> Result<u8> {
        delimiter_byte("output_delimiter", &self.output_delimiter)
    }
}

/// A delimiter must be exactly one ASCII character.
fn delimiter_byte(key: &str, raw: &str) -> Result<u8> {
    match raw.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(DiscoverError::ConfigLoad(format!(
            "{key} must be a single ASCII character, got {raw:?}"
        ))),
    }
}

impl LivenessConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SnmpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_profiles_path() -> String {
    "profiles.json".to_string()
}

fn default_known_devices_path() -> String {
    "known_devices.csv".to_string()
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ping_attempts() -> u32 {
    2
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_ping_path() -> String {
    "ping".to_string()
}

fn default_snmp_port() -> u16 {
    161
}

fn default_snmp_timeout_ms() -> u64 {
    2000
}

fn default_canary_oid() -> String {
    "1.3.6.1.2.1.1.1.0".to_string()
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            profiles_path: default_profiles_path(),
            known_devices_path: default_known_devices_path(),
            known_devices_delimiter: default_delimiter(),
            output_delimiter: default_delimiter(),
            require_liveness: true,
            liveness: LivenessConfig::default(),
            snmp: SnmpConfig::default(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            method: LivenessMethod::default(),
            attempts: default_ping_attempts(),
            timeout_ms: default_ping_timeout_ms(),
            ping_path: default_ping_path(),
        }
    }
}

impl Default for SnmpConfig {
    fn default() -> Self {
        Self {
            port: default_snmp_port(),
            timeout_ms: default_snmp_timeout_ms(),
            canary_oid: default_canary_oid(),
        }
    }
}

/// Load `[discover]` from `<file_prefix>.toml` (optional) layered under
/// `CENSUS_DISCOVER__*` environment variables.
///
/// A missing section yields defaults; a malformed one is an error.
pub fn load_discover_config(file_prefix: &str) -> Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("CENSUS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.profiles_path, "profiles.json");
        assert_eq!(config.output_delimiter_byte().unwrap(), b';');
        assert!(config.require_liveness);
        assert_eq!(config.liveness.method, LivenessMethod::System);
        assert_eq!(config.liveness.attempts, 2);
        assert_eq!(config.snmp.port, 161);
        assert_eq!(config.snmp.canary_oid, "1.3.6.1.2.1.1.1.0");
    }

    #[test]
    fn test_effective_concurrency() {
        let mut config = DiscoverConfig::default();
        assert!(config.effective_concurrency() >= 1);
        config.concurrency = Some(8);
        assert_eq!(config.effective_concurrency(), 8);
        config.concurrency = Some(0);
        assert_eq!(config.effective_concurrency(), default_concurrency());
    }

    #[test]
    fn test_delimiter_must_be_single_ascii() {
        let config = DiscoverConfig {
            output_delimiter: ";;".to_string(),
            known_devices_delimiter: "\t".to_string(),
            ..Default::default()
        };
        assert!(config.output_delimiter_byte().is_err());
        assert_eq!(config.known_devices_delimiter_byte().unwrap(), b'\t');
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("census");
        std::fs::write(
            dir.path().join("census.toml"),
            "[discover]\nconcurrency = 3\nrequire_liveness = false\n\n[discover.snmp]\nport = 1161\n",
        )
        .unwrap();

        let config = load_discover_config(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.concurrency, Some(3));
        assert!(!config.require_liveness);
        assert_eq!(config.snmp.port, 1161);
        assert_eq!(config.snmp.timeout_ms, 2000);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = load_discover_config(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.known_devices_path, "known_devices.csv");
    }

    #[test]
    fn test_malformed_section_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("bad.toml"),
            "[discover]\nconcurrency = \"many\"\n",
        )
        .unwrap();
        let prefix = dir.path().join("bad");
        assert!(load_discover_config(prefix.to_str().unwrap()).is_err());
    }
}
