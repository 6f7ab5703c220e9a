//! Startup configuration.
//!
//! Loaded once from `cocoon.toml` (or a path given on the command line) and
//! frozen for the life of the process. Every field has a default, so a
//! missing file just means "run with the built-in policy".

use std::path::Path;

use {serde::Deserialize, tracing::warn};

use cocoon_core::headers::BROWSER_USER_AGENT;

/// Default config filename, discovered in the working directory.
pub const CONFIG_FILE: &str = "cocoon.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Present a fixed common-browser user-agent to the upstream instead of
    /// the client's own. Reduces the chance of being blocked as a bot; not a
    /// correctness requirement.
    pub spoof_user_agent: bool,
    /// Identity to present when spoofing. Defaults to a current Chrome UA.
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            spoof_user_agent: true,
            user_agent: None,
        }
    }
}

impl UpstreamConfig {
    /// The user-agent to send upstream, or `None` to pass the client's
    /// through unchanged.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.spoof_user_agent
            .then(|| self.user_agent.as_deref().unwrap_or(BROWSER_USER_AGENT))
    }
}

/// Operator additions to the built-in address restrictions. Entries only
/// ever extend the policy; the defaults cannot be turned off from here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    pub forbidden_hosts: Vec<String>,
    pub forbidden_prefixes: Vec<String>,
}

/// Load `cocoon.toml` from the working directory, falling back to defaults.
#[must_use]
pub fn discover_and_load() -> ProxyConfig {
    load_from(Path::new(CONFIG_FILE))
}

/// Load a specific config file, falling back to defaults when it is missing
/// or malformed (a malformed file is logged, not fatal).
#[must_use]
pub fn load_from(path: &Path) -> ProxyConfig {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return ProxyConfig::default();
    };
    match toml::from_str(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed config file");
            ProxyConfig::default()
        },
    }
}
