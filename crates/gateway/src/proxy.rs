//! The per-request pipeline: validate the target, translate headers, fetch
//! with manual redirect handling, and pipe the body through the right
//! streaming rewriter.
//!
//! Each request runs on its own task and owns its rewriter state outright.
//! Pacing is backpressure-driven (the next upstream chunk is pulled only
//! after downstream accepted the previous one), and a client that hangs up
//! drops the body stream, which drops the reqwest response and aborts the
//! upstream transfer with it.

use {
    axum::{
        body::Body,
        extract::{Request, State},
        http::{HeaderValue, Method, StatusCode, header, request::Parts},
        response::Response,
    },
    bytes::Bytes,
    futures::StreamExt,
    tracing::{debug, instrument, warn},
    url::Url,
};

use {
    cocoon_core::{TARGET_PARAM, headers, policy},
    cocoon_stream::{BodyRewriter, CssRewriter, HtmlRewriter},
};

use crate::{
    error::{Error, Result},
    state::AppState,
};

#[instrument(skip_all, fields(method = %request.method()))]
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    // Preflights are answered here, never forwarded.
    if request.method() == Method::OPTIONS {
        return Ok(preflight());
    }

    let (parts, body) = request.into_parts();
    let self_url = self_identity(&parts)?;
    let raw_target = self_url
        .query_pairs()
        .find(|(name, _)| name == TARGET_PARAM)
        .map(|(_, value)| value.into_owned());
    let target = policy::resolve_target(raw_target.as_deref(), &state.policy)?;

    debug!(method = %parts.method, target = %target, "proxying request");

    let outbound =
        headers::to_outbound(&parts.headers, &target, state.config.upstream.user_agent());
    let mut upstream_request = state
        .client
        .request(parts.method.clone(), target.as_str())
        .headers(outbound);
    if parts.method != Method::GET && parts.method != Method::HEAD {
        upstream_request =
            upstream_request.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let upstream = upstream_request.send().await.map_err(|e| {
        warn!(target = %target, error = %e, "upstream fetch failed");
        Error::Upstream(e)
    })?;

    let status = upstream.status();
    let response_headers = headers::to_inbound(upstream.headers(), status, &target, &self_url);
    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = if content_type.contains("text/html") {
        rewritten_body(upstream, HtmlRewriter::new(target, self_url))
    } else if content_type.contains("text/css") {
        rewritten_body(upstream, CssRewriter::new(target, self_url))
    } else {
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Reconstruct the proxy's own URL for this request from the Host header
/// (or URI authority) and the request path + query.
fn self_identity(parts: &Parts) -> Result<Url> {
    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    let host = parts
        .uri
        .host()
        .or_else(|| {
            parts
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("localhost");
    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |path_and_query| path_and_query.as_str());

    Url::parse(&format!("{scheme}://{host}{path_and_query}"))
        .map_err(|_| Error::message("could not reconstruct the request URL"))
}

/// Permissive CORS preflight answer, bypassing the rest of the pipeline.
fn preflight() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    response
}

/// Pipe the upstream body through a streaming rewriter, flushing its tail at
/// end of stream. An upstream read error terminates the body instead of
/// emitting whatever half-transformed bytes were pending.
fn rewritten_body<R>(upstream: reqwest::Response, mut rewriter: R) -> Body
where
    R: BodyRewriter + 'static,
{
    Body::from_stream(async_stream::stream! {
        let mut chunks = upstream.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    let out = rewriter.transform(&bytes);
                    if !out.is_empty() {
                        yield Ok::<Bytes, std::io::Error>(Bytes::from(out));
                    }
                },
                Err(e) => {
                    yield Err(std::io::Error::other(e));
                    return;
                },
            }
        }
        let tail = rewriter.finish();
        if !tail.is_empty() {
            yield Ok(Bytes::from(tail));
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parts_for(uri: &str, host: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header("host", host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn self_identity_from_host_header() {
        let parts = parts_for("/?url=http%3A%2F%2Fexample.com%2F", Some("proxy.test:8080"));
        let url = self_identity(&parts).unwrap();
        assert_eq!(url.as_str(), "http://proxy.test:8080/?url=http%3A%2F%2Fexample.com%2F");
    }

    #[test]
    fn self_identity_honors_forwarded_proto() {
        let mut parts = parts_for("/", Some("proxy.test"));
        parts
            .headers
            .insert("x-forwarded-proto", "https".parse().unwrap());
        let url = self_identity(&parts).unwrap();
        assert_eq!(url.scheme(), "https");
    }

    #[test]
    fn preflight_is_permissive() {
        let response = preflight();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-methods")
                .unwrap(),
            "*"
        );
    }
}
