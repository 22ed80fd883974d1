//! Immutable lookup tables shared by every probe job in a run.
//!
//! All three tables are built once at startup and handed to jobs behind an
//! `Arc`; nothing in this module offers mutation after construction.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::Field;

// ── Credentials ───────────────────────────────────────────────────

/// Vendor name → ordered credential list. Vendor order is probe priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialTable {
    vendors: Vec<(String, Vec<String>)>,
}

impl CredentialTable {
    /// Build a table from `(vendor, credentials)` pairs, keeping their order.
    pub fn from_pairs<V, C>(pairs: impl IntoIterator<Item = (V, Vec<C>)>) -> Self
    where
        V: Into<String>,
        C: Into<String>,
    {
        Self {
            vendors: pairs
                .into_iter()
                .map(|(v, creds)| (v.into(), creds.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }

    /// Vendors with their credentials, in priority order.
    pub fn vendors(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.vendors.iter().map(|(v, c)| (v.as_str(), c.as_slice()))
    }

    /// Every `(vendor, credential)` pair in the order they are tried.
    pub fn attempts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vendors
            .iter()
            .flat_map(|(v, creds)| creds.iter().map(move |c| (v.as_str(), c.as_str())))
    }
}

struct OrderedVendors;

impl<'de> Visitor<'de> for OrderedVendors {
    type Value = Vec<(String, Vec<String>)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of vendor name to credential list")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut vendors: Vec<(String, Vec<String>)> =
            Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((name, creds)) = map.next_entry::<String, Vec<String>>()? {
            if vendors.iter().any(|(existing, _)| existing == &name) {
                return Err(de::Error::custom(format!("duplicate vendor {name:?}")));
            }
            vendors.push((name, creds));
        }
        Ok(vendors)
    }
}

impl<'de> Deserialize<'de> for CredentialTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer
            .deserialize_map(OrderedVendors)
            .map(|vendors| Self { vendors })
    }
}

impl Serialize for CredentialTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.vendors.len()))?;
        for (vendor, creds) in &self.vendors {
            map.serialize_entry(vendor, creds)?;
        }
        map.end()
    }
}

// ── OID profiles ──────────────────────────────────────────────────

/// One candidate for retrieving a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKey {
    /// The field is defined as empty; no query is issued.
    Skip,
    /// A dotted OID to query.
    Oid(String),
}

impl QueryKey {
    pub const SKIP_SENTINEL: &'static str = "skip";
}

impl From<&str> for QueryKey {
    fn from(raw: &str) -> Self {
        if raw == Self::SKIP_SENTINEL {
            Self::Skip
        } else {
            Self::Oid(raw.to_string())
        }
    }
}

impl<'de> Deserialize<'de> for QueryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(QueryKey::from(raw.as_str()))
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Skip => serializer.serialize_str(Self::SKIP_SENTINEL),
            Self::Oid(oid) => serializer.serialize_str(oid),
        }
    }
}

/// Field → ordered candidate keys for one vendor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OidProfile {
    fields: HashMap<Field, Vec<QueryKey>>,
}

impl OidProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: Field, keys: impl IntoIterator<Item = QueryKey>) -> Self {
        self.fields.insert(field, keys.into_iter().collect());
        self
    }

    /// Candidates for `field`; empty when the profile does not define it.
    pub fn candidates(&self, field: Field) -> &[QueryKey] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Vendor name → OID profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OidProfiles {
    vendors: HashMap<String, OidProfile>,
}

impl OidProfiles {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, OidProfile)>) -> Self {
        Self {
            vendors: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, vendor: &str) -> Option<&OidProfile> {
        self.vendors.get(vendor)
    }

    pub fn contains(&self, vendor: &str) -> bool {
        self.vendors.contains_key(vendor)
    }
}

// ── Known devices ─────────────────────────────────────────────────

/// A model prefix and the device type it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownDevice {
    pub prefix: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

/// Ordered `(prefix, type)` list; the first prefix that matches wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownDeviceTable {
    entries: Vec<KnownDevice>,
}

impl KnownDeviceTable {
    pub fn from_pairs<P, T>(pairs: impl IntoIterator<Item = (P, T)>) -> Self
    where
        P: Into<String>,
        T: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(p, t)| KnownDevice {
                    prefix: p.into(),
                    device_type: t.into(),
                })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[KnownDevice] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose prefix starts `model`, in table order.
    pub fn lookup(&self, model: &str) -> Option<&KnownDevice> {
        self.entries.iter().find(|e| model.starts_with(&e.prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_order_follows_document() {
        let json = r#"{"zeta": ["z1"], "alpha": ["a1", "a2"], "mid": ["m1"]}"#;
        let table: CredentialTable = serde_json::from_str(json).unwrap();
        let vendors: Vec<&str> = table.vendors().map(|(v, _)| v).collect();
        assert_eq!(vendors, vec!["zeta", "alpha", "mid"]);

        let attempts: Vec<(&str, &str)> = table.attempts().collect();
        assert_eq!(
            attempts,
            vec![("zeta", "z1"), ("alpha", "a1"), ("alpha", "a2"), ("mid", "m1")]
        );
    }

    #[test]
    fn duplicate_vendor_rejected() {
        let json = r#"{"a": ["x"], "a": ["y"]}"#;
        let err = serde_json::from_str::<CredentialTable>(json).unwrap_err();
        assert!(err.to_string().contains("duplicate vendor"));
    }

    #[test]
    fn skip_sentinel_parses() {
        let json = r#"{"model": ["skip"], "serial": ["1.3.6.1.4.1.1.1", "1.3.6.1.4.1.1.2"]}"#;
        let profile: OidProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.candidates(Field::Model), &[QueryKey::Skip]);
        assert_eq!(
            profile.candidates(Field::Serial),
            &[
                QueryKey::Oid("1.3.6.1.4.1.1.1".to_string()),
                QueryKey::Oid("1.3.6.1.4.1.1.2".to_string())
            ]
        );
        assert!(profile.candidates(Field::Vendor).is_empty());
    }

    #[test]
    fn unknown_field_name_rejected() {
        let json = r#"{"colour": ["1.2.3"]}"#;
        assert!(serde_json::from_str::<OidProfile>(json).is_err());
    }

    #[test]
    fn known_device_first_match_wins() {
        let table = KnownDeviceTable::from_pairs([("FG", "Firewall"), ("FG1", "Big Firewall")]);
        assert_eq!(table.lookup("FG100E").unwrap().device_type, "Firewall");
        assert!(table.lookup("XX1").is_none());
    }
}
