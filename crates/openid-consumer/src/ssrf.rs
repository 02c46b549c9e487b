//! Outbound target checks for direct requests
//!
//! `check_authentication` posts to the `op_endpoint` of a response that has
//! not been authenticated yet, so the target is checked before connecting:
//!
//! - the scheme must be on the allow-list (`http`, `https` by default)
//! - every address the host resolves to must be public; loopback, private
//!   (RFC 1918, `fc00::/7`), link-local (including `169.254.169.254`),
//!   unspecified, broadcast and documentation ranges are refused
//!
//! IPv4-mapped IPv6 addresses are judged as the IPv4 address they carry.
//!
//! ```rust
//! use openid_consumer::ssrf::SsrfPolicy;
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let policy = SsrfPolicy::default();
//! assert!(policy.check_ip(IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254))).is_err());
//! assert!(policy.check_ip(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))).is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use tracing::{debug, warn};
use url::{Host, Url};

/// Refused outbound targets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SsrfError {
    /// The URL does not parse or has no host
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Scheme outside the allow-list
    #[error("URL scheme not allowed: {0}")]
    InvalidScheme(String),

    /// The host is or resolves to a refused address
    #[error("IP address blocked: {0} ({1})")]
    BlockedIpAddress(IpAddr, &'static str),

    /// The host name did not resolve
    #[error("Failed to resolve hostname: {0}")]
    ResolutionFailed(String),
}

/// Which URLs direct requests may target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsrfPolicy {
    /// Accepted URL schemes
    #[serde(default = "default_allowed_schemes")]
    pub allowed_schemes: Vec<String>,

    /// Skip the address checks; only for OPs on a trusted internal network
    /// or local test servers
    #[serde(default)]
    pub allow_internal_targets: bool,
}

fn default_allowed_schemes() -> Vec<String> {
    vec!["https".to_string(), "http".to_string()]
}

impl Default for SsrfPolicy {
    fn default() -> Self {
        Self {
            allowed_schemes: default_allowed_schemes(),
            allow_internal_targets: false,
        }
    }
}

impl SsrfPolicy {
    /// Policy that accepts any address, for tests against local mock servers
    pub fn permissive() -> Self {
        Self {
            allow_internal_targets: true,
            ..Self::default()
        }
    }

    /// Validate `url` before a request is sent to it
    ///
    /// Host names are resolved and every returned address is checked.
    ///
    /// # Errors
    ///
    /// Returns [`SsrfError`] if the URL is malformed, its scheme is not
    /// allowed, or the host is or resolves to a refused address.
    pub async fn validate_url(&self, url: &str) -> Result<(), SsrfError> {
        let url = Url::parse(url).map_err(|e| SsrfError::InvalidUrl(format!("Failed to parse URL: {e}")))?;

        if !self.allowed_schemes.iter().any(|scheme| scheme == url.scheme()) {
            warn!(scheme = url.scheme(), "Refusing direct request with disallowed scheme");
            return Err(SsrfError::InvalidScheme(url.scheme().to_string()));
        }

        let host = url
            .host()
            .ok_or_else(|| SsrfError::InvalidUrl("URL has no host".to_string()))?;
        if self.allow_internal_targets {
            return Ok(());
        }

        match host {
            Host::Ipv4(ip) => self.check_ip(IpAddr::V4(ip)),
            Host::Ipv6(ip) => self.check_ip(IpAddr::V6(ip)),
            Host::Domain(domain) => {
                let port = url.port_or_known_default().unwrap_or(443);
                self.validate_hostname(domain, port).await
            }
        }
    }

    async fn validate_hostname(&self, hostname: &str, port: u16) -> Result<(), SsrfError> {
        let addrs: Vec<_> = tokio::net::lookup_host((hostname, port))
            .await
            .map_err(|e| SsrfError::ResolutionFailed(format!("{hostname}: {e}")))?
            .collect();

        if addrs.is_empty() {
            return Err(SsrfError::ResolutionFailed(format!(
                "No IP addresses resolved for: {hostname}"
            )));
        }
        debug!(hostname = hostname, addresses = addrs.len(), "Resolved direct request target");

        for addr in addrs {
            self.check_ip(addr.ip())?;
        }
        Ok(())
    }

    /// Check a single address against the policy
    ///
    /// # Errors
    ///
    /// Returns [`SsrfError::BlockedIpAddress`] for loopback, private,
    /// link-local and other non-public addresses.
    pub fn check_ip(&self, ip: IpAddr) -> Result<(), SsrfError> {
        if self.allow_internal_targets {
            return Ok(());
        }
        let refused = match ip {
            IpAddr::V4(v4) => classify_ipv4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => classify_ipv4(v4),
                None => classify_ipv6(v6),
            },
        };
        match refused {
            Some(reason) => {
                warn!(ip = %ip, reason = reason, "Refusing direct request to non-public address");
                Err(SsrfError::BlockedIpAddress(ip, reason))
            }
            None => Ok(()),
        }
    }
}

fn classify_ipv4(ip: Ipv4Addr) -> Option<&'static str> {
    if ip == Ipv4Addr::new(169, 254, 169, 254) {
        Some("Cloud metadata endpoint")
    } else if ip.is_loopback() {
        Some("Localhost")
    } else if ip.is_private() {
        Some("Private network (RFC 1918)")
    } else if ip.is_link_local() {
        Some("Link-local")
    } else if ip.is_unspecified() {
        Some("Unspecified address")
    } else if ip.is_broadcast() {
        Some("Broadcast address")
    } else if ip.is_documentation() {
        Some("Documentation address range")
    } else {
        None
    }
}

fn classify_ipv6(ip: Ipv6Addr) -> Option<&'static str> {
    if ip.is_loopback() {
        Some("Localhost")
    } else if ip.is_unspecified() {
        Some("Unspecified address")
    } else if ip.is_unique_local() {
        Some("Unique local address (fc00::/7)")
    } else if ip.is_unicast_link_local() {
        Some("Link-local (fe80::/10)")
    } else {
        None
    }
}
