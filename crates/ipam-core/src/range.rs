//! Pool configuration and address range parsing
//!
//! A pool configuration is a JSON object mapping a label to a range spec:
//!
//! ```text
//! {"dev": "10.0.0.1-10.0.0.20", "prod": "10.1.0.1/24-10.1.0.50/24,10.1.0.100/24-10.1.0.120/24"}
//! ```
//!
//! Each comma-separated part is `start-end`. When the endpoints carry a
//! `/mask`, both must carry the same one and both must lie in the network
//! it describes.

use crate::error::RangeError;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

/// Largest number of addresses a single pool may expand to
pub const MAX_POOL_SIZE: u64 = 65_536;

/// One `start-end` part of a range spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
    /// Network the range was qualified with
    pub network: Option<Ipv4Net>,
}

impl AddressRange {
    /// Number of addresses covered, endpoints included
    pub fn size(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }

    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> {
        (u32::from(self.start)..=u32::from(self.end)).map(Ipv4Addr::from)
    }
}

/// Parse the `label → range spec` JSON map.
///
/// Surrounding single or double quotes, as left behind by some shells and
/// manifests, are stripped first.
pub fn parse_pool_config(raw: &str) -> Result<BTreeMap<String, String>, RangeError> {
    let trimmed = trim_quotes(raw.trim());
    let pools: BTreeMap<String, String> = serde_json::from_str(trimmed)
        .map_err(|e| RangeError::InvalidConfig(format!("expected a JSON object of label to range: {}", e)))?;

    for (label, spec) in &pools {
        if label.trim().is_empty() {
            return Err(RangeError::InvalidConfig("empty pool label".to_string()));
        }
        if spec.trim().is_empty() {
            return Err(RangeError::InvalidConfig(format!("pool {} has an empty range", label)));
        }
    }
    Ok(pools)
}

/// Strip one layer of matching surrounding quotes
pub fn trim_quotes(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if let Some(inner) = raw.strip_prefix(quote).and_then(|s| s.strip_suffix(quote)) {
            return inner;
        }
    }
    raw
}

/// Parse a range spec into its parts
pub fn parse_range(spec: &str) -> Result<Vec<AddressRange>, RangeError> {
    let ranges = spec
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_part)
        .collect::<Result<Vec<_>, _>>()?;

    if ranges.is_empty() {
        return Err(RangeError::InvalidRange(spec.to_string()));
    }
    Ok(ranges)
}

/// Expand a range spec into its distinct addresses, lowest first
pub fn expand_range(spec: &str) -> Result<Vec<Ipv4Addr>, RangeError> {
    let ranges = parse_range(spec)?;
    let size: u64 = ranges.iter().map(AddressRange::size).sum();
    if size > MAX_POOL_SIZE {
        return Err(RangeError::TooLarge {
            range: spec.to_string(),
            size,
            max: MAX_POOL_SIZE,
        });
    }

    let addresses: BTreeSet<Ipv4Addr> = ranges.iter().flat_map(AddressRange::addresses).collect();
    Ok(addresses.into_iter().collect())
}

/// Parse an IPv4 literal, rejecting IPv6 and anything else
pub fn parse_ipv4(raw: &str) -> Result<Ipv4Addr, RangeError> {
    raw.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| RangeError::InvalidAddress(raw.to_string()))
}

/// Parse `a.b.c.d/len` into the network it names, host bits cleared
pub fn parse_cidr(raw: &str) -> Result<Ipv4Net, RangeError> {
    raw.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|_| RangeError::InvalidRange(raw.to_string()))
}

fn parse_part(part: &str) -> Result<AddressRange, RangeError> {
    let (start, end) = part
        .split_once('-')
        .ok_or_else(|| RangeError::InvalidRange(part.to_string()))?;
    let (start, start_net) = split_mask(start.trim())?;
    let (end, end_net) = split_mask(end.trim())?;

    if start > end {
        return Err(RangeError::Reversed {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let network = match (start_net, end_net) {
        (None, None) => None,
        (Some(a), Some(b)) if a.prefix_len() == b.prefix_len() => {
            let network = a.trunc();
            if let Some(outside) = [start, end].into_iter().find(|addr| !network.contains(addr)) {
                return Err(RangeError::OutsideNetwork {
                    address: outside.to_string(),
                    network: network.to_string(),
                });
            }
            Some(network)
        }
        _ => return Err(RangeError::MaskMismatch(part.to_string())),
    };

    Ok(AddressRange { start, end, network })
}

/// Endpoint with its optional `/mask`
fn split_mask(raw: &str) -> Result<(Ipv4Addr, Option<Ipv4Net>), RangeError> {
    if raw.contains('/') {
        let net: Ipv4Net = raw.parse().map_err(|_| RangeError::InvalidRange(raw.to_string()))?;
        Ok((net.addr(), Some(net)))
    } else {
        Ok((parse_ipv4(raw)?, None))
    }
}
