//! CIDR expansion into the range of scannable host addresses.
//!
//! The network and broadcast addresses are excluded. Two prefixes need a
//! policy of their own because that rule leaves nothing behind:
//! - `/32` names a single host, which is scanned.
//! - `/31` is a point-to-point link (RFC 3021); both addresses are scanned.

use census_core::{AddressRange, HostAddress};
use ipnet::Ipv4Net;

use crate::error::{DiscoverError, Result};

/// Parse `ip/prefix` with `prefix` in `0..=32`. Host bits may be set.
pub fn parse_cidr(input: &str) -> Result<Ipv4Net> {
    let trimmed = input.trim();
    if !trimmed.contains('/') {
        return Err(DiscoverError::InvalidTargetFormat {
            input: input.to_string(),
        });
    }
    trimmed
        .parse::<Ipv4Net>()
        .map_err(|_| DiscoverError::InvalidTargetFormat {
            input: input.to_string(),
        })
}

/// Scannable range of a parsed network.
pub fn usable_range(net: Ipv4Net) -> AddressRange {
    let network = HostAddress::from(net.network());
    let broadcast = HostAddress::from(net.broadcast());

    match net.prefix_len() {
        32 => AddressRange::single(network),
        31 => AddressRange::new(network, broadcast),
        // For prefixes up to /30 the block holds at least four addresses,
        // so neither step can leave the address space.
        _ => match (network.next(), broadcast.prev()) {
            (Some(start), Some(end)) => AddressRange::new(start, end),
            _ => AddressRange::new(HostAddress::MAX, HostAddress::MIN),
        },
    }
}

/// Parse a CIDR string and return its scannable range.
pub fn host_range(input: &str) -> Result<AddressRange> {
    let net = parse_cidr(input)?;
    let range = usable_range(net);
    tracing::debug!(
        cidr = %net,
        start = %range.start,
        end = %range.end,
        hosts = range.len(),
        "Expanded CIDR"
    );
    Ok(range)
}
