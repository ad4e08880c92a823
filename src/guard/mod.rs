//! Request guard: refuses URLs that would reach internal infrastructure.
//!
//! Validation happens in two places. [`UrlValidator::validate`] runs before a
//! request (and before every redirect hop) and checks the scheme, the host
//! name and every address the name resolves to. The same policy is applied
//! again inside the HTTP client's resolver so the addresses actually dialed
//! are the ones that passed.

mod config;
mod error;
mod policy;
pub mod resolver;


pub use config::GuardConfig;
pub use error::{BlockedRange, GuardError, Rejection};
pub use policy::{classify, AddressPolicy};
pub use resolver::{HostResolver, SystemResolver};

use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;
use url::{Host, Url};

/// Validates outbound URLs against the address policy.
pub struct UrlValidator {
    policy: AddressPolicy,
    blocked_hostnames: Vec<String>,
    resolver: Arc<dyn HostResolver>,
}

impl std::fmt::Debug for UrlValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlValidator")
            .field("policy", &self.policy)
            .field("blocked_hostnames", &self.blocked_hostnames)
            .finish_non_exhaustive()
    }
}

/// Host part of a URL that passed the static checks.
enum CheckedHost<'a> {
    Ip(IpAddr),
    Domain(&'a str),
}

impl UrlValidator {
    /// Validator using the system resolver.
    pub fn new(config: &GuardConfig) -> Self {
        Self::with_resolver(config, Arc::new(SystemResolver))
    }

    pub fn with_resolver(config: &GuardConfig, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            policy: AddressPolicy::new(config.allowed_networks.clone()),
            blocked_hostnames: config.blocked_hostnames.clone(),
            resolver,
        }
    }

    pub fn policy(&self) -> &AddressPolicy {
        &self.policy
    }

    /// Parse and validate a URL string.
    pub async fn validate_str(&self, raw: &str) -> Result<Vec<IpAddr>, GuardError> {
        let url = Url::parse(raw).map_err(|e| {
            let rejection = Rejection::InvalidUrl(e.to_string());
            record_rejection(raw, &rejection);
            GuardError::Rejected(rejection)
        })?;
        self.validate(&url).await
    }

    /// Validate a URL, returning every address its host resolves to.
    ///
    /// All resolved addresses must pass; one blocked address rejects the URL.
    pub async fn validate(&self, url: &Url) -> Result<Vec<IpAddr>, GuardError> {
        let host = self.check_static(url).map_err(|rejection| {
            record_rejection(url.as_str(), &rejection);
            GuardError::Rejected(rejection)
        })?;
        match host {
            CheckedHost::Ip(ip) => Ok(vec![ip]),
            CheckedHost::Domain(name) => self.resolve_checked(name).await,
        }
    }

    /// Checks that need no network: scheme, host presence, deny-listed
    /// names and literal addresses.
    fn check_static<'a>(&self, url: &'a Url) -> Result<CheckedHost<'a>, Rejection> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(Rejection::Scheme(other.to_string())),
        }
        match url.host() {
            None => Err(Rejection::MissingHost),
            Some(Host::Domain("")) => Err(Rejection::MissingHost),
            Some(Host::Domain(name)) => {
                if policy::is_blocked_host(name, &self.blocked_hostnames) {
                    return Err(Rejection::BlockedHost(policy::normalize_host(name)));
                }
                Ok(CheckedHost::Domain(name))
            }
            Some(Host::Ipv4(v4)) => {
                let ip = IpAddr::V4(v4);
                self.check_addr(&v4.to_string(), ip)?;
                Ok(CheckedHost::Ip(ip))
            }
            Some(Host::Ipv6(v6)) => {
                let ip = IpAddr::V6(v6);
                self.check_addr(&v6.to_string(), ip)?;
                Ok(CheckedHost::Ip(ip))
            }
        }
    }

    /// Check one address against the policy.
    pub fn check_addr(&self, host: &str, addr: IpAddr) -> Result<(), Rejection> {
        self.policy
            .check(addr)
            .map_err(|range| Rejection::BlockedAddress {
                host: host.to_string(),
                addr,
                range,
            })
    }

    /// Resolve a hostname and check every address.
    ///
    /// Used both by [`validate`](Self::validate) and by the HTTP client's
    /// resolver at connect time.
    pub async fn resolve_checked(&self, host: &str) -> Result<Vec<IpAddr>, GuardError> {
        if policy::is_blocked_host(host, &self.blocked_hostnames) {
            let rejection = Rejection::BlockedHost(policy::normalize_host(host));
            record_rejection(host, &rejection);
            return Err(rejection.into());
        }
        // Bracketed or literal addresses can reach the client resolver as names
        if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return match self.check_addr(host, ip) {
                Ok(()) => Ok(vec![ip]),
                Err(rejection) => {
                    record_rejection(host, &rejection);
                    Err(rejection.into())
                }
            };
        }

        let addrs = self
            .resolver
            .resolve(host)
            .await
            .map_err(|e| GuardError::Resolution {
                host: host.to_string(),
                message: e.to_string(),
            })?;
        if addrs.is_empty() {
            return Err(GuardError::Resolution {
                host: host.to_string(),
                message: "no addresses returned".to_string(),
            });
        }
        for addr in &addrs {
            if let Err(rejection) = self.check_addr(host, *addr) {
                record_rejection(host, &rejection);
                return Err(rejection.into());
            }
        }
        Ok(addrs)
    }
}

fn record_rejection(subject: &str, rejection: &Rejection) {
    warn!(
        subject = %crate::logging::redact_url_credentials(subject),
        reason = rejection.reason(),
        error = %rejection,
        "Request blocked by guard"
    );
    metrics::counter!("sitewatch_guard_rejections_total", "reason" => rejection.reason())
        .increment(1);
}
