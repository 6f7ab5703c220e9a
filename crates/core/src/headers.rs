//! Header translation between the browser-facing and upstream-facing sides.
//!
//! Request side: make the outbound request look like it came from a normal
//! browser talking directly to the origin; nothing may leak that identifies
//! the proxy or its edge. Response side: remove everything that is tied to
//! the original transport or that would stop the content from running under
//! the proxy's origin, and rewrite the two headers that carry URLs back to
//! the client (Location, Set-Cookie).

use std::collections::HashSet;

use {
    http::{HeaderMap, HeaderValue, StatusCode, header},
    once_cell::sync::Lazy,
    url::Url,
};

use crate::rewrite;

/// Fixed common-browser identity used when user-agent spoofing is enabled.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Request headers that must never reach the upstream origin: the ones we
/// replace (host/origin/referer), hop-by-hop headers scoped to the
/// client-proxy connection, the encoding negotiation (the outbound client
/// negotiates its own compression and hands back decoded bytes, which the
/// body rewriters require), and the ones that identify the proxy's own
/// infrastructure or edge provider.
static REQUEST_STRIP: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "host",
        "origin",
        "referer",
        "accept-encoding",
        "connection",
        "keep-alive",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
        "forwarded",
        "via",
        "x-forwarded-for",
        "x-forwarded-host",
        "x-forwarded-proto",
        "x-real-ip",
        "cf-connecting-ip",
        "cf-ipcountry",
        "cf-ray",
        "cf-visitor",
        "fly-client-ip",
        "fly-forwarded-port",
        "fly-region",
    ])
});

/// Response headers dropped on the way back: hop-by-hop headers, lengths and
/// encodings invalidated by body rewriting, and the policies that would block
/// the content from running inside the proxy's origin.
static RESPONSE_STRIP: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
        "content-length",
        "content-encoding",
        "content-security-policy",
        "content-security-policy-report-only",
        "strict-transport-security",
        "x-frame-options",
    ])
});

/// Build the header map for the upstream request.
///
/// `user_agent` is the spoofed identity to present, or `None` to pass the
/// client's own user-agent through.
#[must_use]
pub fn to_outbound(headers: &HeaderMap, target: &Url, user_agent: Option<&str>) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if REQUEST_STRIP.contains(name.as_str()) {
            continue;
        }
        if user_agent.is_some() && *name == header::USER_AGENT {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    if let Some(ua) = user_agent
        && let Ok(value) = HeaderValue::from_str(ua)
    {
        out.insert(header::USER_AGENT, value);
    }

    // Present host/origin/referer as if the browser were on the target site.
    if let Some(host) = host_with_port(target)
        && let Ok(value) = HeaderValue::from_str(&host)
    {
        out.insert(header::HOST, value);
    }
    if let Ok(value) = HeaderValue::from_str(&origin_of(target)) {
        out.insert(header::ORIGIN, value);
    }
    if let Ok(value) = HeaderValue::from_str(target.as_str()) {
        out.insert(header::REFERER, value);
    }

    out
}

/// Build the header map for the response handed back to the client.
///
/// Location is resolved against `target` and rewritten for 301–308 so the
/// client is never told to navigate to the upstream origin directly.
#[must_use]
pub fn to_inbound(
    headers: &HeaderMap,
    status: StatusCode,
    target: &Url,
    self_url: &Url,
) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers {
        if RESPONSE_STRIP.contains(name.as_str())
            || *name == header::SET_COOKIE
            || *name == header::LOCATION
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    out.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    out.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("*"),
    );

    if let Some(location) = headers.get(header::LOCATION) {
        if (301..=308).contains(&status.as_u16()) {
            if let Ok(location) = location.to_str() {
                let routed = rewrite::rewrite_reference(location, target, self_url);
                if let Ok(value) = HeaderValue::from_str(&routed) {
                    out.insert(header::LOCATION, value);
                }
            }
        } else {
            out.insert(header::LOCATION, location.clone());
        }
    }

    for value in headers.get_all(header::SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for cookie in split_cookie_list(raw) {
            if let Ok(value) = HeaderValue::from_str(&rescope_cookie(cookie)) {
                out.append(header::SET_COOKIE, value);
            }
        }
    }

    out
}

/// `host` or `host:port` for the Host header.
fn host_with_port(target: &Url) -> Option<String> {
    let host = target.host_str()?;
    Some(match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// `scheme://host[:port]` without path or query.
fn origin_of(target: &Url) -> String {
    match (target.host_str(), target.port()) {
        (Some(host), Some(port)) => format!("{}://{host}:{port}", target.scheme()),
        (Some(host), None) => format!("{}://{host}", target.scheme()),
        _ => target.as_str().to_string(),
    }
}

/// Split a header value that may carry several cookies joined by `, `.
///
/// A comma is a cookie boundary only when the text after it looks like a new
/// `name=value` token before the next `;`. Commas inside an Expires date
/// ("Wed, 21 Oct ...") do not qualify.
fn split_cookie_list(raw: &str) -> Vec<&str> {
    let mut cookies = Vec::new();
    let mut start = 0;
    for (i, byte) in raw.bytes().enumerate() {
        if byte == b',' && starts_new_cookie(&raw[i + 1..]) {
            cookies.push(raw[start..i].trim());
            start = i + 1;
        }
    }
    cookies.push(raw[start..].trim());
    cookies.retain(|cookie| !cookie.is_empty());
    cookies
}

fn starts_new_cookie(rest: &str) -> bool {
    let head = rest.trim_start().split([';', ',']).next().unwrap_or("");
    match head.split_once('=') {
        Some((name, _)) => {
            let name = name.trim_end();
            !name.is_empty() && !name.contains(char::is_whitespace)
        },
        None => false,
    }
}

/// Re-scope one cookie to the proxy's own origin: drop any `Domain=`
/// attribute and normalize `Path=` to `/`.
fn rescope_cookie(cookie: &str) -> String {
    let mut parts = Vec::new();
    for (i, segment) in cookie.split(';').enumerate() {
        let trimmed = segment.trim();
        if i == 0 {
            parts.push(trimmed.to_string());
            continue;
        }
        let attr = trimmed
            .split('=')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match attr.as_str() {
            "domain" => {},
            "path" => parts.push("Path=/".to_string()),
            _ => parts.push(trimmed.to_string()),
        }
    }
    parts.join("; ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    fn target() -> Url {
        Url::parse("http://example.com/old").unwrap()
    }

    fn self_url() -> Url {
        Url::parse("http://proxy/?url=http%3A%2F%2Fexample.com%2Fold").unwrap()
    }

    fn routed_target(routed: &str) -> String {
        Url::parse(routed)
            .unwrap()
            .query_pairs()
            .find(|(name, _)| name == rewrite::TARGET_PARAM)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    // ── Request side ────────────────────────────────────────────────────────

    #[test]
    fn outbound_strips_edge_headers_and_sets_native_identity() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "proxy".parse().unwrap());
        headers.insert("origin", "http://proxy".parse().unwrap());
        headers.insert("referer", "http://proxy/?url=x".parse().unwrap());
        headers.insert("cf-ray", "abc".parse().unwrap());
        headers.insert("x-forwarded-for", "1.2.3.4".parse().unwrap());
        headers.insert("accept", "text/html".parse().unwrap());

        let out = to_outbound(&headers, &target(), Some(BROWSER_USER_AGENT));

        assert_eq!(out.get("host").unwrap(), "example.com");
        assert_eq!(out.get("origin").unwrap(), "http://example.com");
        assert_eq!(out.get("referer").unwrap(), "http://example.com/old");
        assert_eq!(out.get("user-agent").unwrap(), BROWSER_USER_AGENT);
        assert_eq!(out.get("accept").unwrap(), "text/html");
        assert!(out.get("cf-ray").is_none());
        assert!(out.get("x-forwarded-for").is_none());
    }

    #[rstest]
    #[case("accept-encoding")]
    #[case("connection")]
    #[case("te")]
    #[case("upgrade")]
    #[case("proxy-authorization")]
    #[case("transfer-encoding")]
    fn outbound_strips_hop_by_hop_and_encoding_negotiation(#[case] name: &str) {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::HeaderName::try_from(name).unwrap(),
            "whatever".parse().unwrap(),
        );
        let out = to_outbound(&headers, &target(), None);
        assert!(out.get(name).is_none(), "{name} must not go upstream");
    }

    #[test]
    fn outbound_host_includes_explicit_port() {
        let target = Url::parse("https://example.com:8443/a").unwrap();
        let out = to_outbound(&HeaderMap::new(), &target, None);
        assert_eq!(out.get("host").unwrap(), "example.com:8443");
        assert_eq!(out.get("origin").unwrap(), "https://example.com:8443");
    }

    #[test]
    fn outbound_without_spoofing_keeps_client_user_agent() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        let out = to_outbound(&headers, &target(), None);
        assert_eq!(out.get("user-agent").unwrap(), "curl/8.0");
    }

    // ── Response side ───────────────────────────────────────────────────────

    #[rstest]
    #[case("content-security-policy")]
    #[case("strict-transport-security")]
    #[case("x-frame-options")]
    #[case("transfer-encoding")]
    #[case("content-length")]
    #[case("content-encoding")]
    fn inbound_strips_blocking_and_transport_headers(#[case] name: &str) {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::HeaderName::try_from(name).unwrap(),
            "whatever".parse().unwrap(),
        );
        let out = to_inbound(&headers, StatusCode::OK, &target(), &self_url());
        assert!(out.get(name).is_none(), "{name} must be stripped");
    }

    #[test]
    fn inbound_sets_permissive_cors() {
        let out = to_inbound(&HeaderMap::new(), StatusCode::OK, &target(), &self_url());
        assert_eq!(out.get("access-control-allow-origin").unwrap(), "*");
        assert_eq!(out.get("access-control-expose-headers").unwrap(), "*");
    }

    #[test]
    fn redirect_location_is_rewritten_through_the_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("location", "/new".parse().unwrap());
        let out = to_inbound(&headers, StatusCode::FOUND, &target(), &self_url());
        let location = out.get("location").unwrap().to_str().unwrap();
        assert!(location.starts_with("http://proxy/?"));
        assert_eq!(routed_target(location), "http://example.com/new");
    }

    #[test]
    fn non_redirect_location_passes_through() {
        let mut headers = HeaderMap::new();
        headers.insert("location", "/created/42".parse().unwrap());
        let out = to_inbound(&headers, StatusCode::CREATED, &target(), &self_url());
        assert_eq!(out.get("location").unwrap(), "/created/42");
    }

    #[test]
    fn cookie_loses_domain_and_path_is_normalized() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "set-cookie",
            "a=1; Domain=example.com; Path=/sub".parse().unwrap(),
        );
        let out = to_inbound(&headers, StatusCode::OK, &target(), &self_url());
        let cookie = out.get("set-cookie").unwrap().to_str().unwrap();
        assert_eq!(cookie, "a=1; Path=/");
    }

    #[test]
    fn joined_cookie_list_splits_on_attribute_boundaries() {
        let raw = "a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Path=/x, b=2; Domain=example.com";
        let cookies = split_cookie_list(raw);
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("a=1"));
        assert!(cookies[0].contains("Wed, 21 Oct 2015"));
        assert!(cookies[1].starts_with("b=2"));

        let mut headers = HeaderMap::new();
        headers.insert("set-cookie", raw.parse().unwrap());
        let out = to_inbound(&headers, StatusCode::OK, &target(), &self_url());
        let rewritten: Vec<&str> = out
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(rewritten.len(), 2);
        assert_eq!(rewritten[0], "a=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT; Path=/");
        assert_eq!(rewritten[1], "b=2");
    }

    #[test]
    fn multiple_set_cookie_headers_are_each_rescoped() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1; Domain=x.com".parse().unwrap());
        headers.append("set-cookie", "b=2; Path=/deep; Secure".parse().unwrap());
        let out = to_inbound(&headers, StatusCode::OK, &target(), &self_url());
        let rewritten: Vec<&str> = out
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(rewritten, vec!["a=1", "b=2; Path=/; Secure"]);
    }
}
