//! Address classification.

use super::error::BlockedRange;
use ipnet::IpNet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Hostnames refused before any resolution happens.
pub(crate) const BUILTIN_BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "metadata",
    "metadata.google.internal",
    "metadata.azure.internal",
    "instance-data",
    "instance-data.ec2.internal",
];

const METADATA_V4: &[Ipv4Addr] = &[
    Ipv4Addr::new(169, 254, 169, 254),
    // ECS task metadata
    Ipv4Addr::new(169, 254, 170, 2),
    // Alibaba Cloud
    Ipv4Addr::new(100, 100, 100, 200),
];

// AWS IMDS over IPv6: fd00:ec2::254
const METADATA_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0x0ec2, 0, 0, 0, 0, 0, 0x0254);

/// Decides whether a resolved address may be dialed.
#[derive(Debug, Clone, Default)]
pub struct AddressPolicy {
    allowed: Vec<IpNet>,
}

impl AddressPolicy {
    pub fn new(allowed: Vec<IpNet>) -> Self {
        Self { allowed }
    }

    /// `Err` carries the range that blocked the address.
    ///
    /// Metadata addresses are refused even when an allowed network covers them.
    pub fn check(&self, ip: IpAddr) -> Result<(), BlockedRange> {
        let Some(range) = classify(ip) else {
            return Ok(());
        };
        if range == BlockedRange::CloudMetadata {
            return Err(range);
        }
        let canonical = canonical(ip);
        if self
            .allowed
            .iter()
            .any(|net| net.contains(&ip) || net.contains(&canonical))
        {
            return Ok(());
        }
        Err(range)
    }

    pub fn allowed_networks(&self) -> &[IpNet] {
        &self.allowed
    }
}

/// IPv4-mapped, IPv4-compatible and NAT64 addresses are judged by the
/// embedded IPv4 address.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match embedded_v4(&v6) {
            Some(v4) => IpAddr::V4(v4),
            None => ip,
        },
        v4 => v4,
    }
}

fn embedded_v4(ip: &Ipv6Addr) -> Option<Ipv4Addr> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return Some(v4);
    }
    let s = ip.segments();
    // ::/96 IPv4-compatible, except :: and ::1 which are classified as IPv6
    if s[..6].iter().all(|&x| x == 0) && !ip.is_unspecified() && !ip.is_loopback() {
        let o = ip.octets();
        return Some(Ipv4Addr::new(o[12], o[13], o[14], o[15]));
    }
    // 64:ff9b::/96
    if s[0] == 0x0064 && s[1] == 0xff9b && s[2..6].iter().all(|&x| x == 0) {
        let o = ip.octets();
        return Some(Ipv4Addr::new(o[12], o[13], o[14], o[15]));
    }
    None
}

/// Returns the blocked range an address falls in, or `None` if it is public.
pub fn classify(ip: IpAddr) -> Option<BlockedRange> {
    match canonical(ip) {
        IpAddr::V4(v4) => classify_v4(v4),
        IpAddr::V6(v6) => classify_v6(v6),
    }
}

fn classify_v4(ip: Ipv4Addr) -> Option<BlockedRange> {
    if METADATA_V4.contains(&ip) {
        return Some(BlockedRange::CloudMetadata);
    }
    let [a, b, c, _] = ip.octets();
    let range = if ip.is_unspecified() || a == 0 {
        BlockedRange::Unspecified
    } else if ip.is_loopback() {
        BlockedRange::Loopback
    } else if ip.is_private() {
        BlockedRange::Private
    } else if ip.is_link_local() {
        BlockedRange::LinkLocal
    } else if ip.is_broadcast() {
        BlockedRange::Broadcast
    } else if ip.is_multicast() {
        BlockedRange::Multicast
    } else if ip.is_documentation() {
        BlockedRange::Documentation
    } else if a == 100 && (b & 0xc0) == 64 {
        BlockedRange::SharedAddressSpace
    } else if a == 198 && (b & 0xfe) == 18 {
        BlockedRange::Benchmarking
    } else if a >= 240 || (a == 192 && b == 0 && c == 0) {
        BlockedRange::Reserved
    } else {
        return None;
    };
    Some(range)
}

fn classify_v6(ip: Ipv6Addr) -> Option<BlockedRange> {
    if ip == METADATA_V6 {
        return Some(BlockedRange::CloudMetadata);
    }
    let first = ip.segments()[0];
    let range = if ip.is_unspecified() {
        BlockedRange::Unspecified
    } else if ip.is_loopback() {
        BlockedRange::Loopback
    } else if ip.is_multicast() {
        BlockedRange::Multicast
    } else if (first & 0xfe00) == 0xfc00 {
        BlockedRange::UniqueLocal
    } else if (first & 0xffc0) == 0xfe80 {
        BlockedRange::LinkLocal
    } else if (first & 0xffc0) == 0xfec0 {
        // deprecated site-local
        BlockedRange::Reserved
    } else if first == 0x2001 && ip.segments()[1] == 0x0db8 {
        BlockedRange::Documentation
    } else {
        return None;
    };
    Some(range)
}

/// Lower-cased, trailing-dot-free hostname used for deny-list comparison.
pub(crate) fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

pub(crate) fn is_blocked_host(host: &str, extra: &[String]) -> bool {
    let host = normalize_host(host);
    if host.ends_with(".localhost") {
        return true;
    }
    BUILTIN_BLOCKED_HOSTS.contains(&host.as_str())
        || extra.iter().any(|blocked| normalize_host(blocked) == host)
}
