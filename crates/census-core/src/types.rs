//! Core domain types for discovery and device fingerprinting.
//!
//! These types are produced by range expansion and the per-host probe jobs,
//! and consumed by aggregation and the output writers.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ── Addresses ─────────────────────────────────────────────────────

/// Error returned when a string is not a dotted-quad IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid IPv4 address: {0:?}")]
pub struct AddressParseError(pub String);

/// An IPv4 host address held as its 32-bit value.
///
/// Ordering is numeric, which is also dotted-quad order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostAddress(pub u32);

impl HostAddress {
    pub const MIN: Self = Self(0);
    pub const MAX: Self = Self(u32::MAX);

    pub fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(u32::from_be_bytes([a, b, c, d]))
    }

    /// `self + n`, or `None` past `255.255.255.255`.
    pub fn checked_add(self, n: u32) -> Option<Self> {
        self.0.checked_add(n).map(Self)
    }

    /// `self - n`, or `None` below `0.0.0.0`.
    pub fn checked_sub(self, n: u32) -> Option<Self> {
        self.0.checked_sub(n).map(Self)
    }

    pub fn next(self) -> Option<Self> {
        self.checked_add(1)
    }

    pub fn prev(self) -> Option<Self> {
        self.checked_sub(1)
    }

    pub fn octets(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl From<Ipv4Addr> for HostAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self(u32::from(ip))
    }
}

impl From<HostAddress> for Ipv4Addr {
    fn from(addr: HostAddress) -> Self {
        Ipv4Addr::from(addr.0)
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ipv4Addr::from(self.0))
    }
}

impl FromStr for HostAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| AddressParseError(s.to_string()))
    }
}

impl Serialize for HostAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An inclusive range of host addresses. Empty when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: HostAddress,
    pub end: HostAddress,
}

impl AddressRange {
    pub fn new(start: HostAddress, end: HostAddress) -> Self {
        Self { start, end }
    }

    pub fn single(addr: HostAddress) -> Self {
        Self::new(addr, addr)
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Number of addresses in the range (up to 2^32, hence `u64`).
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            u64::from(self.end.0) - u64::from(self.start.0) + 1
        }
    }

    pub fn contains(&self, addr: HostAddress) -> bool {
        self.start <= addr && addr <= self.end
    }

    /// Ascending, lazy iterator over the range. Can be called repeatedly.
    pub fn iter(&self) -> AddressIter {
        AddressIter {
            front: u64::from(self.start.0),
            back: u64::from(self.end.0) + 1,
        }
    }
}

impl IntoIterator for &AddressRange {
    type Item = HostAddress;
    type IntoIter = AddressIter;

    fn into_iter(self) -> AddressIter {
        self.iter()
    }
}

/// Iterator over an [`AddressRange`]; `front..back` is half-open in `u64`
/// so the last address of the space is reachable without overflow.
#[derive(Debug, Clone)]
pub struct AddressIter {
    front: u64,
    back: u64,
}

impl Iterator for AddressIter {
    type Item = HostAddress;

    fn next(&mut self) -> Option<HostAddress> {
        if self.front >= self.back {
            return None;
        }
        let addr = HostAddress(self.front as u32);
        self.front += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back.saturating_sub(self.front);
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl DoubleEndedIterator for AddressIter {
    fn next_back(&mut self) -> Option<HostAddress> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(HostAddress(self.back as u32))
    }
}

impl std::iter::FusedIterator for AddressIter {}

// ── Host results ──────────────────────────────────────────────────

/// Which pipeline a run executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Liveness sweep only.
    Discovery,
    /// Liveness, device query, and classification.
    Probing,
}

/// Reachability of a host as reported in discovery output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HostStatus {
    Up,
    Down,
}

impl HostStatus {
    pub fn is_up(self) -> bool {
        matches!(self, Self::Up)
    }
}

impl fmt::Display for HostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("Up"),
            Self::Down => f.write_str("Down"),
        }
    }
}

/// The fixed attribute set extracted from every device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Model,
    FullModel,
    Serial,
    Firmware,
    Software,
    Vendor,
}

impl Field {
    /// Every field, in retrieval order.
    pub const ALL: [Field; 6] = [
        Field::Model,
        Field::FullModel,
        Field::Serial,
        Field::Firmware,
        Field::Software,
        Field::Vendor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::FullModel => "fullmodel",
            Self::Serial => "serial",
            Self::Firmware => "firmware",
            Self::Software => "software",
            Self::Vendor => "vendor",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes retrieved from a device, before classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceAttributes {
    pub model: String,
    pub fullmodel: String,
    pub serial: String,
    pub firmware: String,
    pub software: String,
    pub vendor: String,
}

impl DeviceAttributes {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Model => &self.model,
            Field::FullModel => &self.fullmodel,
            Field::Serial => &self.serial,
            Field::Firmware => &self.firmware,
            Field::Software => &self.software,
            Field::Vendor => &self.vendor,
        }
    }

    pub fn set(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Model => &mut self.model,
            Field::FullModel => &mut self.fullmodel,
            Field::Serial => &mut self.serial,
            Field::Firmware => &mut self.firmware,
            Field::Software => &mut self.software,
            Field::Vendor => &mut self.vendor,
        };
        *slot = value;
    }
}

/// A device whose model matched the known-device table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifiedDevice {
    #[serde(flatten)]
    pub attributes: DeviceAttributes,
    #[serde(rename = "type")]
    pub device_type: String,
}

/// The per-host result of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostRecord {
    pub address: HostAddress,
    pub status: HostStatus,
    /// Present only in probing mode, for hosts that were up and classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<ClassifiedDevice>,
}

impl HostRecord {
    pub fn up(address: HostAddress) -> Self {
        Self {
            address,
            status: HostStatus::Up,
            attributes: None,
        }
    }

    pub fn down(address: HostAddress) -> Self {
        Self {
            address,
            status: HostStatus::Down,
            attributes: None,
        }
    }

    pub fn with_device(mut self, device: ClassifiedDevice) -> Self {
        self.attributes = Some(device);
        self
    }
}
