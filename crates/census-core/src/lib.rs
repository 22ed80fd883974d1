//! census-core: Shared types, lookup tables, and error handling for Census.
//!
//! This crate provides the foundational types used by the discovery tools:
//! - Host addresses, address ranges, and per-host records
//! - The immutable credential, OID profile, and known-device tables
//! - The per-host probe error taxonomy
//! - Scan progress events

pub mod error;
pub mod events;
pub mod tables;
pub mod types;

pub use error::ProbeError;
pub use tables::{CredentialTable, KnownDevice, KnownDeviceTable, OidProfile, OidProfiles, QueryKey};
pub use types::{
    AddressRange, ClassifiedDevice, DeviceAttributes, Field, HostAddress, HostRecord, HostStatus,
    ScanMode,
};
