//! The cocoon gateway: HTTP server, per-request orchestration, and the
//! outbound client used to fetch target resources.
//!
//! The interesting logic lives in `cocoon-core` and `cocoon-stream`; this
//! crate wires it into an axum router and a reqwest client configured to
//! never follow redirects on its own (redirects are rewritten and handed
//! back to the browser instead).

pub mod config;
pub mod error;
pub mod proxy;
pub mod server;
pub mod state;

pub use {
    config::ProxyConfig,
    error::{Error, Result},
    server::{build_app, serve},
    state::AppState,
};
