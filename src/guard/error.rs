//! Error types for the request guard.

use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Address class a rejected IP belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockedRange {
    Loopback,
    Private,
    LinkLocal,
    UniqueLocal,
    Multicast,
    Unspecified,
    Broadcast,
    Documentation,
    /// 100.64.0.0/10 carrier-grade NAT
    SharedAddressSpace,
    /// 198.18.0.0/15
    Benchmarking,
    Reserved,
    CloudMetadata,
}

impl BlockedRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockedRange::Loopback => "loopback",
            BlockedRange::Private => "private",
            BlockedRange::LinkLocal => "link-local",
            BlockedRange::UniqueLocal => "unique-local",
            BlockedRange::Multicast => "multicast",
            BlockedRange::Unspecified => "unspecified",
            BlockedRange::Broadcast => "broadcast",
            BlockedRange::Documentation => "documentation",
            BlockedRange::SharedAddressSpace => "shared-address-space",
            BlockedRange::Benchmarking => "benchmarking",
            BlockedRange::Reserved => "reserved",
            BlockedRange::CloudMetadata => "cloud-metadata",
        }
    }
}

impl fmt::Display for BlockedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the guard refused a URL. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("scheme '{0}' is not allowed, only http and https are")]
    Scheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("host '{0}' is blocked")]
    BlockedHost(String),

    #[error("address {addr} for host '{host}' is in a blocked range ({range})")]
    BlockedAddress {
        host: String,
        addr: IpAddr,
        range: BlockedRange,
    },
}

impl Rejection {
    /// Short label used for metrics and structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::InvalidUrl(_) => "invalid_url",
            Rejection::Scheme(_) => "scheme",
            Rejection::MissingHost => "missing_host",
            Rejection::BlockedHost(_) => "blocked_host",
            Rejection::BlockedAddress { .. } => "blocked_address",
        }
    }
}

/// Errors produced while validating a URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Refused by policy
    #[error(transparent)]
    Rejected(#[from] Rejection),

    /// Name could not be resolved; transient
    #[error("DNS resolution failed for '{host}': {message}")]
    Resolution { host: String, message: String },
}
