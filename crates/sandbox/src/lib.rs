//! Client runtime sandbox: the script injected into every proxied HTML page.
//!
//! Server-side rewriting only covers references present in the markup. Any
//! script-driven network call (fetch, XHR, WebSocket, popups, scripted
//! navigation, late-bound form submits) would otherwise escape straight to
//! the origin. The runtime re-implements the rewrite contract of
//! `cocoon_core::rewrite` inside the page: resolve against the document
//! base, guard against double-rewriting, route through the proxy, then
//! delegate to the native browser primitive.
//!
//! The script itself cannot be unit-tested here; its contract is exercised
//! in a browser harness. This crate only owns the asset and its templating.

use {cocoon_core::TARGET_PARAM, url::Url};

const RUNTIME_TEMPLATE: &str = include_str!("../assets/runtime.js");

/// The proxy's own `scheme://host/path`, query and fragment dropped: the
/// prefix the client runtime builds routed URLs from.
#[must_use]
pub fn proxy_base(self_url: &Url) -> String {
    let mut base = self_url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.into()
}

/// Render the runtime script for one request's proxy identity.
#[must_use]
pub fn runtime_script(self_url: &Url) -> String {
    RUNTIME_TEMPLATE
        .replace("{{proxy_base}}", &proxy_base(self_url))
        .replace("{{target_param}}", TARGET_PARAM)
}
