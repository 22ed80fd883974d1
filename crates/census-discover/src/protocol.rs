//! Device-query protocol capability.
//!
//! The prober only sees these traits. `crate::snmp` backs them with SNMPv2c;
//! [`mock::ScriptedClient`] backs them with a fixed script for tests and dry
//! runs.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use census_core::HostAddress;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid query key {0:?}")]
    InvalidKey(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Opens authenticated sessions to devices.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Open a session to `host` under `credential`.
    ///
    /// Success does not prove the credential was accepted; callers confirm
    /// with a canary query.
    async fn open(
        &self,
        host: HostAddress,
        credential: &str,
    ) -> Result<Box<dyn ProtocolSession>, ProtocolError>;
}

/// A live session to one device.
#[async_trait]
pub trait ProtocolSession: Send {
    /// Query one key. `Ok(None)` means the device answered without a value.
    async fn get(&mut self, key: &str) -> Result<Option<String>, ProtocolError>;

    /// Release the session.
    async fn close(self: Box<Self>);
}

pub mod mock {
    //! A protocol client driven by a fixed script.

    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use census_core::HostAddress;

    use super::{ProtocolClient, ProtocolError, ProtocolSession};

    /// One recorded interaction.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Open { host: HostAddress, credential: String },
        Get { host: HostAddress, key: String },
        Close { host: HostAddress },
    }

    /// Sessions under an accepted `(host, credential)` answer every query
    /// from the host's value map (`None` for unknown keys). Sessions under
    /// any other credential time out on every query, as an SNMP agent
    /// silently drops an unknown community.
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedClient {
        accepted: HashSet<(HostAddress, String)>,
        values: HashMap<HostAddress, HashMap<String, String>>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl ScriptedClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn accept(mut self, host: HostAddress, credential: &str) -> Self {
            self.accepted.insert((host, credential.to_string()));
            self
        }

        pub fn value(mut self, host: HostAddress, key: &str, value: &str) -> Self {
            self.values
                .entry(host)
                .or_default()
                .insert(key.to_string(), value.to_string());
            self
        }

        /// Every call so far, in order.
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn record(calls: &Mutex<Vec<Call>>, call: Call) {
            if let Ok(mut log) = calls.lock() {
                log.push(call);
            }
        }
    }

    #[async_trait]
    impl ProtocolClient for ScriptedClient {
        async fn open(
            &self,
            host: HostAddress,
            credential: &str,
        ) -> Result<Box<dyn ProtocolSession>, ProtocolError> {
            Self::record(
                &self.calls,
                Call::Open {
                    host,
                    credential: credential.to_string(),
                },
            );
            let accepted = self.accepted.contains(&(host, credential.to_string()));
            Ok(Box::new(ScriptedSession {
                host,
                accepted,
                values: self.values.get(&host).cloned().unwrap_or_default(),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct ScriptedSession {
        host: HostAddress,
        accepted: bool,
        values: HashMap<String, String>,
        calls: Arc<Mutex<Vec<Call>>>,
    }

    #[async_trait]
    impl ProtocolSession for ScriptedSession {
        async fn get(&mut self, key: &str) -> Result<Option<String>, ProtocolError> {
            ScriptedClient::record(
                &self.calls,
                Call::Get {
                    host: self.host,
                    key: key.to_string(),
                },
            );
            if !self.accepted {
                return Err(ProtocolError::Timeout(Duration::ZERO));
            }
            Ok(self.values.get(key).cloned())
        }

        async fn close(self: Box<Self>) {
            ScriptedClient::record(&self.calls, Call::Close { host: self.host });
        }
    }
}
