//! CIDR and address parsing.
//!
//! Thin layer over [`ipnet`] that produces errors worded for operators and
//! enumerates the addresses a ping sweep should probe.

use std::net::IpAddr;

use ipnet::IpNet;

/// Errors that can occur while parsing or expanding network blocks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrError {
    #[error("Invalid CIDR '{0}': expected notation like 192.168.1.0/24")]
    InvalidCidr(String),

    #[error("CIDR '{input}' has host bits set; did you mean {network}?")]
    HostBitsSet { input: String, network: String },

    #[error("Invalid IP address '{0}'")]
    InvalidAddress(String),

    #[error("{cidr} spans {hosts} addresses, more than the sweep limit of {limit}")]
    TooLarge { cidr: String, hosts: u128, limit: usize },
}

/// Parse a network block, rejecting blocks whose address has host bits set.
///
/// # Examples
/// ```
/// use p3ipam::ip::cidr::parse_cidr;
///
/// assert_eq!(parse_cidr("10.0.0.0/24").unwrap().to_string(), "10.0.0.0/24");
/// assert!(parse_cidr("10.0.0.7/24").is_err());
/// assert!(parse_cidr("10.0.0.0").is_err());
/// ```
pub fn parse_cidr(input: &str) -> Result<IpNet, CidrError> {
    let trimmed = input.trim();
    let net: IpNet = trimmed
        .parse()
        .map_err(|_| CidrError::InvalidCidr(input.to_string()))?;

    let network = net.trunc();
    if network != net {
        return Err(CidrError::HostBitsSet {
            input: trimmed.to_string(),
            network: network.to_string(),
        });
    }
    Ok(net)
}

/// The canonical text form of a block, as stored for subnets
pub fn canonical_cidr(input: &str) -> Result<String, CidrError> {
    parse_cidr(input).map(|net| net.to_string())
}

/// Parse a single IPv4 or IPv6 address
pub fn parse_address(input: &str) -> Result<IpAddr, CidrError> {
    input
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| CidrError::InvalidAddress(input.to_string()))
}

/// Whether `addr` lies inside `net`
pub fn contains(net: &IpNet, addr: &IpAddr) -> bool {
    net.contains(addr)
}

/// Whether `child` is `parent` itself or nested inside it
pub fn subnet_of(child: &IpNet, parent: &IpNet) -> bool {
    parent.contains(child)
}

/// Number of addresses [`usable_hosts`] would yield for `net`.
///
/// IPv4 blocks with two or more host bits lose their network and broadcast
/// addresses; /31, /32 and all IPv6 blocks count every address. Saturates at
/// `u128::MAX` for an IPv6 /0.
pub fn host_count(net: &IpNet) -> u128 {
    let host_bits = u32::from(net.max_prefix_len() - net.prefix_len());
    let total = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
    match net {
        IpNet::V4(_) if host_bits >= 2 => total - 2,
        _ => total,
    }
}

/// Enumerate the probe-able addresses of a block, refusing blocks with more
/// than `limit` addresses.
pub fn usable_hosts(net: &IpNet, limit: usize) -> Result<Vec<IpAddr>, CidrError> {
    let hosts = host_count(net);
    if hosts > limit as u128 {
        return Err(CidrError::TooLarge {
            cidr: net.to_string(),
            hosts,
            limit,
        });
    }
    Ok(net.hosts().collect())
}
