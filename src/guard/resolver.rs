//! Name resolution seam.
//!
//! Every address the HTTP client dials comes out of [`GuardedDns`], which runs
//! the same address policy as pre-flight validation. A name that resolves to a
//! public address during validation and to a private one at connect time is
//! therefore still refused.

use super::error::GuardError;
use super::UrlValidator;
use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Resolves a hostname to its addresses.
#[async_trait]
pub trait HostResolver: Send + Sync + 'static {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Adapter installed into the reqwest client as its DNS resolver.
#[derive(Clone)]
pub(crate) struct GuardedDns {
    validator: Arc<UrlValidator>,
}

impl GuardedDns {
    pub(crate) fn new(validator: Arc<UrlValidator>) -> Self {
        Self { validator }
    }
}

impl Resolve for GuardedDns {
    fn resolve(&self, name: Name) -> Resolving {
        let validator = Arc::clone(&self.validator);
        Box::pin(async move {
            let host = name.as_str().to_string();
            let addrs = validator
                .resolve_checked(&host)
                .await
                .map_err(|e: GuardError| -> Box<dyn std::error::Error + Send + Sync> {
                    Box::new(e)
                })?;
            let addrs: Addrs = Box::new(addrs.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}
