//! The canonical URL-rewrite function.
//!
//! Every reference found in proxied content funnels through
//! [`rewrite_reference`]: resolve against the page's target URL, then fold
//! the absolute result back into the proxy's own URL as a query parameter.
//! The function is total: a reference that cannot be resolved degrades to
//! re-proxying the base page instead of surfacing an error, so one broken
//! link never takes down a whole render.
//!
//! It is *not* idempotent: feeding it an already-rewritten URL nests the
//! proxy URL inside itself. Callers only ever rewrite references found in
//! origin content (see DESIGN.md).

use url::Url;

/// Query parameter that carries the target URL on the proxy's own origin.
pub const TARGET_PARAM: &str = "url";

/// Build the proxy-routed URL for an already-absolute target.
///
/// Takes the proxy's own URL, replaces its target parameter with `target`,
/// and keeps every other query parameter as-is.
#[must_use]
pub fn proxy_url(self_url: &Url, target: &str) -> String {
    let mut routed = self_url.clone();
    let carried: Vec<(String, String)> = routed
        .query_pairs()
        .filter(|(name, _)| name != TARGET_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = routed.query_pairs_mut();
        pairs.clear();
        for (name, value) in &carried {
            pairs.append_pair(name, value);
        }
        pairs.append_pair(TARGET_PARAM, target);
    }
    routed.into()
}

/// Rewrite one reference (absolute or relative) into a proxy-routed URL.
#[must_use]
pub fn rewrite_reference(reference: &str, base: &Url, self_url: &Url) -> String {
    match base.join(reference) {
        Ok(resolved) => proxy_url(self_url, resolved.as_str()),
        Err(_) => proxy_url(self_url, base.as_str()),
    }
}
