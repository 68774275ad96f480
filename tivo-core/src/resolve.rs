//! Name resolution between device host names and addresses.
//!
//! A device configured by host name needs its address before the first
//! connection; a device first heard by beacon only has an address, and
//! its host name is looked up for display. Both directions go through the
//! [`Resolver`] trait so the session and discovery code can be driven by
//! a fixed table offline.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Forward lookup: host name → address.
    async fn lookup_host(&self, host: &str) -> io::Result<IpAddr>;

    /// Reverse lookup: address → host name.
    async fn lookup_addr(&self, addr: IpAddr) -> io::Result<String>;
}

// ── SystemResolver ───────────────────────────────────────────────

/// Resolver backed by the operating system (`getaddrinfo` / `getnameinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_host(&self, host: &str) -> io::Result<IpAddr> {
        let addrs: Vec<_> = tokio::net::lookup_host((host, 0)).await?.collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .map(|a| a.ip())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}")))
    }

    async fn lookup_addr(&self, addr: IpAddr) -> io::Result<String> {
        tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&addr))
            .await
            .map_err(io::Error::other)?
    }
}

// ── StaticResolver ───────────────────────────────────────────────

/// Resolver answering from a fixed host table, like `/etc/hosts`.
///
/// Names missing from the table fail with `NotFound`.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `host` ↔ `addr` entry.
    pub fn with_host(mut self, host: impl Into<String>, addr: IpAddr) -> Self {
        self.hosts.insert(host.into(), addr);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup_host(&self, host: &str) -> io::Result<IpAddr> {
        self.hosts
            .get(host)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host {host}")))
    }

    async fn lookup_addr(&self, addr: IpAddr) -> io::Result<String> {
        self.hosts
            .iter()
            .find(|(_, a)| **a == addr)
            .map(|(host, _)| host.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no name for {addr}")))
    }
}
