//! Loading the credential, OID profile, and known-device tables from disk.
//!
//! Every problem found here is fatal: a run never starts against a table it
//! could only partially read.

use std::path::Path;

use serde::Deserialize;

use census_core::{CredentialTable, KnownDeviceTable, OidProfiles};

use crate::error::{DiscoverError, Result};
use crate::targets::read_input_file;

/// The credential/profile document.
///
/// ```json
/// {
///   "communities": { "fortinet": ["fg-ro", "public"] },
///   "oids": { "fortinet": { "model": ["skip"], "serial": ["1.3.6.1.4.1.12356.100.1.1.1.0"] } }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct ProfileDocument {
    communities: CredentialTable,
    oids: OidProfiles,
}

pub fn load_profiles(path: &Path) -> Result<(CredentialTable, OidProfiles)> {
    let content = read_input_file(path)?;
    let (credentials, profiles) = parse_profiles(&content)?;
    tracing::info!(
        path = %path.display(),
        vendors = credentials.len(),
        credentials = credentials.attempts().count(),
        "Loaded credential profiles"
    );
    Ok((credentials, profiles))
}

pub fn parse_profiles(content: &str) -> Result<(CredentialTable, OidProfiles)> {
    let doc: ProfileDocument = serde_json::from_str(content)
        .map_err(|e| DiscoverError::ConfigLoad(format!("profile document: {e}")))?;

    if doc.communities.is_empty() {
        return Err(DiscoverError::ConfigLoad(
            "profile document lists no vendors".to_string(),
        ));
    }
    for (vendor, creds) in doc.communities.vendors() {
        if creds.is_empty() {
            return Err(DiscoverError::ConfigLoad(format!(
                "vendor {vendor:?} has no credentials"
            )));
        }
        if !doc.oids.contains(vendor) {
            return Err(DiscoverError::ConfigLoad(format!(
                "vendor {vendor:?} has no OID profile"
            )));
        }
    }

    Ok((doc.communities, doc.oids))
}

pub fn load_known_devices(path: &Path, delimiter: u8) -> Result<KnownDeviceTable> {
    let content = read_input_file(path)?;
    let table = parse_known_devices(&content, delimiter)?;
    tracing::info!(path = %path.display(), entries = table.len(), "Loaded known devices");
    Ok(table)
}

/// Parse `prefix<delim>type` rows; `#` lines are comments, no header.
pub fn parse_known_devices(content: &str, delimiter: u8) -> Result<KnownDeviceTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record?;
        match (record.get(0), record.get(1)) {
            (Some(prefix), Some(device_type)) if !prefix.is_empty() && !device_type.is_empty() => {
                pairs.push((prefix.to_string(), device_type.to_string()));
            }
            _ if record.iter().all(str::is_empty) => continue,
            _ => {
                let line = record.position().map_or(0, |p| p.line());
                return Err(DiscoverError::ConfigLoad(format!(
                    "known-device line {line} needs a prefix and a type"
                )));
            }
        }
    }

    Ok(KnownDeviceTable::from_pairs(pairs))
}
