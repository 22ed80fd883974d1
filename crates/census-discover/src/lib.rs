//! census-discover: Host discovery and SNMP device fingerprinting.
//!
//! Expands a network target into hosts, sweeps them for reachability, and in
//! probing mode binds a vendor credential on each live device, reads its
//! attributes, and classifies it against the known-device table.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod liveness;
pub mod output;
pub mod pipeline;
pub mod prober;
pub mod protocol;
pub mod range;
pub mod scheduler;
pub mod snmp;
pub mod tables;
pub mod targets;
pub mod vendor;
