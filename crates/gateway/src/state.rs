use std::sync::Arc;

use cocoon_core::AddressPolicy;

use crate::{config::ProxyConfig, error::Result};

/// Shared per-process state: the outbound client plus the immutable policy
/// and configuration. Cloned per request; nothing in here mutates after
/// startup.
#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub policy: Arc<AddressPolicy>,
    pub config: Arc<ProxyConfig>,
}

impl AppState {
    /// Build state with the address policy derived from the config.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let policy = AddressPolicy::with_extras(
            &config.policy.forbidden_hosts,
            &config.policy.forbidden_prefixes,
        );
        Self::with_policy(config, policy)
    }

    /// Build state with an explicit policy (tests proxy loopback servers).
    pub fn with_policy(config: ProxyConfig, policy: AddressPolicy) -> Result<Self> {
        // Redirects are never followed here: Location is rewritten and the
        // browser decides whether to navigate. Compression is negotiated and
        // transparently decoded by this client, so the body rewriters always
        // see plain bytes.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            policy: Arc::new(policy),
            config: Arc::new(config),
        })
    }
}
