//! Credential fallback and attribute retrieval for one device.

use std::sync::Arc;

use census_core::{
    CredentialTable, DeviceAttributes, Field, HostAddress, OidProfile, OidProfiles, ProbeError,
    QueryKey,
};

use crate::protocol::{ProtocolClient, ProtocolSession};
use crate::vendor::NormalizerRegistry;

/// The vendor/credential pair a device accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub vendor: String,
    pub credential: String,
    /// Pairs tried and rejected before this one.
    pub failed_attempts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbedDevice {
    pub binding: Binding,
    pub attributes: DeviceAttributes,
}

/// Drives a [`ProtocolClient`] through the credential table.
///
/// The tables are shared read-only between every concurrent job of a run.
pub struct DeviceProber {
    client: Arc<dyn ProtocolClient>,
    credentials: Arc<CredentialTable>,
    profiles: Arc<OidProfiles>,
    normalizers: Arc<NormalizerRegistry>,
    canary_key: String,
}

impl DeviceProber {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        credentials: Arc<CredentialTable>,
        profiles: Arc<OidProfiles>,
        canary_key: &str,
    ) -> Self {
        Self {
            client,
            credentials,
            profiles,
            normalizers: Arc::new(NormalizerRegistry::default()),
            canary_key: canary_key.to_string(),
        }
    }

    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = Arc::new(normalizers);
        self
    }

    /// Bind a credential, read every field, and normalize the result.
    pub async fn probe(&self, host: HostAddress) -> Result<ProbedDevice, ProbeError> {
        let (binding, mut session) = self
            .bind(host)
            .await
            .ok_or(ProbeError::Connection { host })?;

        let retrieved = match self.profiles.get(&binding.vendor) {
            Some(profile) => retrieve(host, session.as_mut(), profile).await,
            None => {
                tracing::warn!(host = %host, vendor = %binding.vendor, "No OID profile for vendor");
                retrieve(host, session.as_mut(), &OidProfile::new()).await
            }
        };
        session.close().await;

        let mut attributes = retrieved?;
        self.normalizers.normalize(&binding.vendor, &mut attributes);

        tracing::debug!(
            host = %host,
            vendor = %binding.vendor,
            model = %attributes.model,
            "Device probed"
        );
        Ok(ProbedDevice {
            binding,
            attributes,
        })
    }

    /// First `(vendor, credential)` pair, in table order, whose session
    /// answers the canary query. The live session is handed back open.
    pub async fn bind(&self, host: HostAddress) -> Option<(Binding, Box<dyn ProtocolSession>)> {
        for (failed_attempts, (vendor, credential)) in self.credentials.attempts().enumerate() {
            let mut session = match self.client.open(host, credential).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::debug!(host = %host, vendor, attempt = failed_attempts, error = %e, "Session open failed");
                    continue;
                }
            };

            match session.get(&self.canary_key).await {
                Ok(_) => {
                    tracing::debug!(host = %host, vendor, attempt = failed_attempts, "Credential accepted");
                    let binding = Binding {
                        vendor: vendor.to_string(),
                        credential: credential.to_string(),
                        failed_attempts,
                    };
                    return Some((binding, session));
                }
                Err(e) => {
                    tracing::debug!(host = %host, vendor, attempt = failed_attempts, error = %e, "Canary query failed");
                    session.close().await;
                }
            }
        }
        None
    }
}

/// Read the six fields from the bound vendor's profile. Values are trimmed.
async fn retrieve(
    host: HostAddress,
    session: &mut dyn ProtocolSession,
    profile: &OidProfile,
) -> Result<DeviceAttributes, ProbeError> {
    let mut attributes = DeviceAttributes::default();
    for field in Field::ALL {
        let value = retrieve_field(host, session, field, profile.candidates(field))
            .await
            .ok_or(ProbeError::FieldRetrieval { host, field })?;
        attributes.set(field, value.trim().to_string());
    }
    Ok(attributes)
}

async fn retrieve_field(
    host: HostAddress,
    session: &mut dyn ProtocolSession,
    field: Field,
    candidates: &[QueryKey],
) -> Option<String> {
    for key in candidates {
        let oid = match key {
            QueryKey::Skip => return Some(String::new()),
            QueryKey::Oid(oid) => oid,
        };
        match session.get(oid).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {
                tracing::debug!(host = %host, field = %field, oid = %oid, "No value");
            }
            Err(e) => {
                tracing::debug!(host = %host, field = %field, oid = %oid, error = %e, "Query failed");
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::{Call, ScriptedClient};

    const CANARY: &str = "1.3.6.1.2.1.1.1.0";
    const HOST: HostAddress = HostAddress(0x0A00_0001);

    fn full_profile() -> OidProfile {
        let mut profile = OidProfile::new();
        for (i, field) in Field::ALL.into_iter().enumerate() {
            profile = profile.with_field(field, [QueryKey::Oid(format!("1.9.{i}"))]);
        }
        profile
    }

    fn prober(
        client: &ScriptedClient,
        credentials: CredentialTable,
        profiles: OidProfiles,
    ) -> DeviceProber {
        DeviceProber::new(
            Arc::new(client.clone()),
            Arc::new(credentials),
            Arc::new(profiles),
            CANARY,
        )
        .with_normalizers(NormalizerRegistry::empty())
    }

    fn scripted_values(client: ScriptedClient) -> ScriptedClient {
        Field::ALL
            .into_iter()
            .enumerate()
            .fold(client, |c, (i, field)| {
                c.value(HOST, &format!("1.9.{i}"), &format!(" {field}-value "))
            })
    }

    fn opens(client: &ScriptedClient) -> Vec<String> {
        client
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Open { credential, .. } => Some(credential),
                _ => None,
            })
            .collect()
    }

    fn closes(client: &ScriptedClient) -> usize {
        client
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::Close { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_fallback_binds_last_pair_after_three_failures() {
        let client = ScriptedClient::new().accept(HOST, "b-c2");
        let credentials = CredentialTable::from_pairs([
            ("A", vec!["a-c1", "a-c2"]),
            ("B", vec!["b-c1", "b-c2"]),
        ]);
        let profiles = OidProfiles::from_pairs([
            ("A".to_string(), full_profile()),
            ("B".to_string(), full_profile()),
        ]);
        let p = prober(&client, credentials, profiles);

        let (binding, session) = p.bind(HOST).await.unwrap();
        session.close().await;

        assert_eq!(binding.vendor, "B");
        assert_eq!(binding.credential, "b-c2");
        assert_eq!(binding.failed_attempts, 3);
        assert_eq!(opens(&client), vec!["a-c1", "a-c2", "b-c1", "b-c2"]);
        // Every rejected session was closed, plus the bound one.
        assert_eq!(closes(&client), 4);
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let client = ScriptedClient::new().accept(HOST, "a-c1").accept(HOST, "b-c2");
        let credentials = CredentialTable::from_pairs([
            ("A", vec!["a-c1", "a-c2"]),
            ("B", vec!["b-c1", "b-c2"]),
        ]);
        let profiles = OidProfiles::from_pairs([
            ("A".to_string(), full_profile()),
            ("B".to_string(), full_profile()),
        ]);
        let p = prober(&client, credentials, profiles);
        let (binding, _session) = p.bind(HOST).await.unwrap();
        assert_eq!(binding.vendor, "A");
        assert_eq!(opens(&client), vec!["a-c1"]);
    }

    #[tokio::test]
    async fn test_no_accepted_pair_is_connection_error() {
        let client = ScriptedClient::new();
        let p = prober(
            &client,
            CredentialTable::from_pairs([("A", vec!["x", "y"])]),
            OidProfiles::from_pairs([("A".to_string(), full_profile())]),
        );
        assert_eq!(p.probe(HOST).await, Err(ProbeError::Connection { host: HOST }));
        assert_eq!(closes(&client), 2);
    }

    #[tokio::test]
    async fn test_probe_reads_and_trims_every_field() {
        let client = scripted_values(ScriptedClient::new().accept(HOST, "c"));
        let p = prober(
            &client,
            CredentialTable::from_pairs([("acme", vec!["c"])]),
            OidProfiles::from_pairs([("acme".to_string(), full_profile())]),
        );
        let device = p.probe(HOST).await.unwrap();
        assert_eq!(device.attributes.model, "model-value");
        assert_eq!(device.attributes.fullmodel, "fullmodel-value");
        assert_eq!(device.attributes.vendor, "vendor-value");
        assert_eq!(closes(&client), 1);
    }

    #[tokio::test]
    async fn test_skip_sets_empty_without_query() {
        let client = scripted_values(ScriptedClient::new().accept(HOST, "c"));
        let profile = full_profile().with_field(Field::Model, [QueryKey::Skip]);
        let p = prober(
            &client,
            CredentialTable::from_pairs([("acme", vec!["c"])]),
            OidProfiles::from_pairs([("acme".to_string(), profile)]),
        );
        let device = p.probe(HOST).await.unwrap();
        assert_eq!(device.attributes.model, "");
        let queried_model_oid = client
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Get { key, .. } if key == "1.9.0"));
        assert!(!queried_model_oid);
    }

    #[tokio::test]
    async fn test_later_candidate_used_when_first_is_null() {
        let client = scripted_values(ScriptedClient::new().accept(HOST, "c"));
        let profile = full_profile().with_field(
            Field::Serial,
            [QueryKey::Oid("1.8.missing".into()), QueryKey::Oid("1.9.2".into())],
        );
        let p = prober(
            &client,
            CredentialTable::from_pairs([("acme", vec!["c"])]),
            OidProfiles::from_pairs([("acme".to_string(), profile)]),
        );
        assert_eq!(p.probe(HOST).await.unwrap().attributes.serial, "serial-value");
    }

    #[tokio::test]
    async fn test_missing_field_fails_and_still_closes() {
        let client = scripted_values(ScriptedClient::new().accept(HOST, "c"));
        let profile = full_profile().with_field(Field::Firmware, [QueryKey::Oid("1.8.0".into())]);
        let p = prober(
            &client,
            CredentialTable::from_pairs([("acme", vec!["c"])]),
            OidProfiles::from_pairs([("acme".to_string(), profile)]),
        );
        assert_eq!(
            p.probe(HOST).await,
            Err(ProbeError::FieldRetrieval {
                host: HOST,
                field: Field::Firmware
            })
        );
        assert_eq!(closes(&client), 1);
    }

    #[tokio::test]
    async fn test_vendor_normalizer_applied() {
        let client = ScriptedClient::new()
            .accept(HOST, "fg")
            .value(HOST, "1.9.2", "FGT60E4Q16000001")
            .value(HOST, "1.9.4", "v6.4.8,build1914,211117");
        let profile = OidProfile::new()
            .with_field(Field::Model, [QueryKey::Skip])
            .with_field(Field::FullModel, [QueryKey::Skip])
            .with_field(Field::Serial, [QueryKey::Oid("1.9.2".into())])
            .with_field(Field::Firmware, [QueryKey::Skip])
            .with_field(Field::Software, [QueryKey::Oid("1.9.4".into())])
            .with_field(Field::Vendor, [QueryKey::Skip]);
        let p = DeviceProber::new(
            Arc::new(client.clone()),
            Arc::new(CredentialTable::from_pairs([("fortinet", vec!["fg"])])),
            Arc::new(OidProfiles::from_pairs([("fortinet".to_string(), profile)])),
            CANARY,
        );
        let attrs = p.probe(HOST).await.unwrap().attributes;
        assert_eq!(attrs.model, "FG60E");
        assert_eq!(attrs.software, "v6.4.8");
        assert_eq!(attrs.vendor, "Fortinet");
    }
}
