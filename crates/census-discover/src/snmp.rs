//! SNMPv2c backing for the protocol capability.
//!
//! The credential is the community string. SNMP runs over UDP, so opening a
//! session always succeeds locally and a wrong community only shows up as a
//! query that never gets an answer.

use std::time::Duration;

use async_trait::async_trait;
use snmp2::{AsyncSession, Oid, Value};
use tokio::time::timeout;

use census_core::HostAddress;

use crate::config::SnmpConfig;
use crate::protocol::{ProtocolClient, ProtocolError, ProtocolSession};

pub struct SnmpClient {
    port: u16,
    timeout: Duration,
}

impl SnmpClient {
    pub fn new(config: &SnmpConfig) -> Self {
        Self {
            port: config.port,
            timeout: config.timeout(),
        }
    }
}

#[async_trait]
impl ProtocolClient for SnmpClient {
    async fn open(
        &self,
        host: HostAddress,
        credential: &str,
    ) -> Result<Box<dyn ProtocolSession>, ProtocolError> {
        let addr = format!("{host}:{}", self.port);
        let session = match timeout(
            self.timeout,
            AsyncSession::new_v2c(&addr, credential.as_bytes(), 0),
        )
        .await
        {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(ProtocolError::Transport(e.to_string())),
            Err(_) => return Err(ProtocolError::Timeout(self.timeout)),
        };
        Ok(Box::new(SnmpSession {
            session,
            timeout: self.timeout,
        }))
    }
}

struct SnmpSession {
    session: AsyncSession,
    timeout: Duration,
}

#[async_trait]
impl ProtocolSession for SnmpSession {
    async fn get(&mut self, key: &str) -> Result<Option<String>, ProtocolError> {
        let arcs = parse_oid(key)?;
        let oid = Oid::from(arcs.as_slice())
            .map_err(|_| ProtocolError::InvalidKey(key.to_string()))?;

        let mut response = match timeout(self.timeout, self.session.get(&oid)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ProtocolError::Transport(format!("{e:?}"))),
            Err(_) => return Err(ProtocolError::Timeout(self.timeout)),
        };

        Ok(response
            .varbinds
            .next()
            .and_then(|(_, value)| render_value(&value)))
    }

    async fn close(self: Box<Self>) {
        // Dropping the session releases its socket.
    }
}

/// Dotted numeric OID, with or without a leading dot.
fn parse_oid(key: &str) -> Result<Vec<u64>, ProtocolError> {
    let trimmed = key.trim().trim_start_matches('.');
    let arcs: Option<Vec<u64>> = trimmed.split('.').map(|arc| arc.parse().ok()).collect();
    match arcs {
        Some(arcs) if arcs.len() >= 2 => Ok(arcs),
        _ => Err(ProtocolError::InvalidKey(key.to_string())),
    }
}

/// Text form of a scalar varbind. Exception values count as "no value".
fn render_value(value: &Value<'_>) -> Option<String> {
    match value {
        Value::OctetString(bytes) => Some(String::from_utf8_lossy(bytes).trim().to_string()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Counter32(n) | Value::Unsigned32(n) | Value::Timeticks(n) => Some(n.to_string()),
        Value::Counter64(n) => Some(n.to_string()),
        Value::IpAddress(octets) => Some(std::net::Ipv4Addr::from(*octets).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oid() {
        assert_eq!(parse_oid("1.3.6.1.2.1.1.1.0").unwrap(), vec![1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(parse_oid(".1.3.6").unwrap(), vec![1, 3, 6]);
    }

    #[test]
    fn test_parse_oid_rejects_garbage() {
        for bad in ["", "1", "1.3.x", "1..3", "sysDescr"] {
            assert!(
                matches!(parse_oid(bad), Err(ProtocolError::InvalidKey(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_render_values() {
        assert_eq!(
            render_value(&Value::OctetString(b" FGT60E4Q16000001 ")),
            Some("FGT60E4Q16000001".to_string())
        );
        assert_eq!(render_value(&Value::Integer(-3)), Some("-3".to_string()));
        assert_eq!(render_value(&Value::Timeticks(4200)), Some("4200".to_string()));
        assert_eq!(
            render_value(&Value::IpAddress([10, 0, 0, 1])),
            Some("10.0.0.1".to_string())
        );
        assert_eq!(render_value(&Value::NoSuchObject), None);
        assert_eq!(render_value(&Value::Null), None);
    }
}
