//! Target intake: what the caller asked to scan, resolved to host addresses.

use std::collections::BTreeSet;
use std::path::Path;

use census_core::types::AddressIter;
use census_core::{AddressRange, HostAddress};

use crate::error::{DiscoverError, Result};
use crate::range;

/// The scan target as supplied by the caller.
///
/// `Addresses` is the direct-target mode and bypasses CIDR expansion; it is
/// exclusive with the two network forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    /// A single CIDR block.
    Cidr(String),
    /// CIDR blocks and/or single addresses.
    List(Vec<String>),
    /// Raw host addresses, probed as given.
    Addresses(Vec<String>),
}

/// The resolved host set of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostSet {
    /// Lazily enumerated block.
    Range(AddressRange),
    /// Sorted, disjoint, non-adjacent blocks, enumerated lazily in turn.
    Ranges(Vec<AddressRange>),
    /// Ascending, deduplicated addresses.
    Listed(Vec<HostAddress>),
}

impl HostSet {
    pub fn len(&self) -> u64 {
        match self {
            Self::Range(r) => r.len(),
            Self::Ranges(rs) => rs.iter().map(AddressRange::len).sum(),
            Self::Listed(v) => v.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> HostSetIter<'_> {
        match self {
            Self::Range(r) => HostSetIter::Range(r.iter()),
            Self::Ranges(rs) => HostSetIter::Ranges(RangesIter {
                pending: rs.iter(),
                current: None,
                remaining: self.len(),
            }),
            Self::Listed(v) => HostSetIter::Listed(v.iter()),
        }
    }
}

/// Walks merged ranges in turn, keeping an exact remaining count.
pub struct RangesIter<'a> {
    pending: std::slice::Iter<'a, AddressRange>,
    current: Option<AddressIter>,
    remaining: u64,
}

impl Iterator for RangesIter<'_> {
    type Item = HostAddress;

    fn next(&mut self) -> Option<HostAddress> {
        loop {
            if let Some(addr) = self.current.as_mut().and_then(Iterator::next) {
                self.remaining -= 1;
                return Some(addr);
            }
            self.current = Some(self.pending.next()?.iter());
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

pub enum HostSetIter<'a> {
    Range(AddressIter),
    Ranges(RangesIter<'a>),
    Listed(std::slice::Iter<'a, HostAddress>),
}

impl Iterator for HostSetIter<'_> {
    type Item = HostAddress;

    fn next(&mut self) -> Option<HostAddress> {
        match self {
            Self::Range(it) => it.next(),
            Self::Ranges(it) => it.next(),
            Self::Listed(it) => it.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Self::Range(it) => it.size_hint(),
            Self::Ranges(it) => it.size_hint(),
            Self::Listed(it) => it.size_hint(),
        }
    }
}

impl TargetSpec {
    /// Resolve to an ascending, duplicate-free host set.
    pub fn resolve(&self) -> Result<HostSet> {
        match self {
            Self::Cidr(cidr) => range::host_range(cidr).map(HostSet::Range),
            Self::List(tokens) => {
                let ranges = tokens
                    .iter()
                    .map(|t| token_range(t))
                    .collect::<Result<Vec<_>>>()?;
                Ok(HostSet::Ranges(coalesce(ranges)))
            }
            Self::Addresses(raw) => {
                let mut hosts = BTreeSet::new();
                for addr in raw {
                    hosts.insert(parse_address(addr)?);
                }
                Ok(HostSet::Listed(hosts.into_iter().collect()))
            }
        }
    }
}

/// Sort and merge overlapping or adjacent ranges; empty ranges are dropped.
fn coalesce(mut ranges: Vec<AddressRange>) -> Vec<AddressRange> {
    ranges.retain(|r| !r.is_empty());
    ranges.sort_by_key(|r| r.start);

    let mut merged: Vec<AddressRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.end.checked_add(1).map_or(true, |next| range.start <= next) => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// A list token is either a CIDR block or one address.
fn token_range(token: &str) -> Result<AddressRange> {
    if token.contains('/') {
        range::host_range(token)
    } else {
        parse_address(token).map(AddressRange::single)
    }
}

fn parse_address(raw: &str) -> Result<HostAddress> {
    raw.parse().map_err(|_| DiscoverError::InvalidTargetFormat {
        input: raw.to_string(),
    })
}

/// Read a whole input file, reporting a missing file as `FileNotFound`.
pub(crate) fn read_input_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DiscoverError::FileNotFound {
            path: path.display().to_string(),
        },
        _ => DiscoverError::Io(e),
    })
}

/// Tokens of a flat target file.
///
/// Tokens are separated by commas, semicolons, or whitespace; `#` starts a
/// comment that runs to the end of the line.
pub fn read_target_file(path: &Path) -> Result<Vec<String>> {
    let content = read_input_file(path)?;
    Ok(split_tokens(&content))
}

fn split_tokens(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .flat_map(|line| line.split(|c: char| c == ',' || c == ';' || c.is_whitespace()))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Values of the column named `column` in a delimited file with a header row.
pub fn read_target_column(path: &Path, column: &str, delimiter: u8) -> Result<Vec<String>> {
    let content = read_input_file(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let index = reader
        .headers()?
        .iter()
        .position(|h| h.eq_ignore_ascii_case(column))
        .ok_or_else(|| DiscoverError::InvalidTargetFormat {
            input: format!("column {column:?} not found in {}", path.display()),
        })?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(index).filter(|v| !v.is_empty()) {
            values.push(value.to_string());
        }
    }
    Ok(values)
}
