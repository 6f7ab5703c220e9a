//! Target validation and the address-space guard.
//!
//! The guard is deliberately textual: it matches the hostname *string*
//! against an exact set and a prefix list, without resolving DNS or
//! canonicalizing IPv6 literals. A hostname that resolves to a private
//! address but does not itself look like one passes the check. Upgrading to
//! resolve-then-check is a product decision, not a bug fix; see DESIGN.md.

use std::collections::HashSet;

use url::Url;

use crate::error::{GuardError, Result};

/// Loopback names that are always refused, regardless of prefix rules.
const FORBIDDEN_HOSTS: &[&str] = &["localhost", "127.0.0.1", "[::1]"];

/// Textual hostname prefixes covering private and link-local ranges.
const FORBIDDEN_PREFIXES: &[&str] = &[
    "10.", "192.168.", "172.16.", "172.17.", "172.18.", "172.19.", "172.20.",
    "172.21.", "172.22.", "172.23.", "172.24.", "172.25.", "172.26.", "172.27.",
    "172.28.", "172.29.", "172.30.", "172.31.", "169.254.", "fc00::", "fe80::",
];

/// Process-wide, read-only address restrictions. Built once at startup and
/// shared by every request; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AddressPolicy {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self {
            exact: FORBIDDEN_HOSTS.iter().map(|h| (*h).to_string()).collect(),
            prefixes: FORBIDDEN_PREFIXES.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

impl AddressPolicy {
    /// The built-in policy extended with operator-supplied entries.
    #[must_use]
    pub fn with_extras(hosts: &[String], prefixes: &[String]) -> Self {
        let mut policy = Self::default();
        policy.exact.extend(hosts.iter().map(|h| h.to_ascii_lowercase()));
        policy
            .prefixes
            .extend(prefixes.iter().map(|p| p.to_ascii_lowercase()));
        policy
    }

    /// A policy with no restrictions at all. Test servers bind to loopback,
    /// so integration tests need a way out of the default rules.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            exact: HashSet::new(),
            prefixes: Vec::new(),
        }
    }

    /// Textual exact + prefix match on the hostname string.
    #[must_use]
    pub fn is_forbidden(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.exact.contains(&host) || self.prefixes.iter().any(|p| host.starts_with(p.as_str()))
    }
}

/// Parse and validate the raw value of the target query parameter.
///
/// Pure validation, no side effects. Errors map to 4xx responses and are
/// produced before the proxy talks to anyone.
pub fn resolve_target(raw: Option<&str>, policy: &AddressPolicy) -> Result<Url> {
    let raw = raw.ok_or(GuardError::MissingTarget)?;
    let target = Url::parse(raw).map_err(|_| GuardError::InvalidTarget)?;

    if !matches!(target.scheme(), "http" | "https") {
        return Err(GuardError::UnsupportedScheme);
    }

    let host = target.host_str().ok_or(GuardError::InvalidTarget)?;
    if policy.is_forbidden(host) {
        return Err(GuardError::ForbiddenAddress);
    }

    Ok(target)
}
