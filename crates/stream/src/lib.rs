//! Streaming content rewriters for proxied response bodies.
//!
//! Both rewriters are single-pass transforms with the same calling shape:
//! feed one upstream chunk at a time through `transform`, then call `finish`
//! once at end of stream to flush whatever tail was still pending. The tail
//! is what makes chunking invisible: a construct split across two delivered
//! chunks (a half-open tag, half a `url(` token) is held back rather than
//! evaluated as "not found".
//!
//! Neither rewriter buffers whole bodies, and each instance is owned by
//! exactly one response pipeline.

pub mod css;
pub mod html;

mod scan;

pub use {css::CssRewriter, html::HtmlRewriter};

/// Common calling surface over the two rewriters, for pipelines that pick a
/// transform by content type at runtime.
pub trait BodyRewriter: Send {
    fn transform(&mut self, chunk: &[u8]) -> Vec<u8>;
    fn finish(&mut self) -> Vec<u8>;
}

impl BodyRewriter for HtmlRewriter {
    fn transform(&mut self, chunk: &[u8]) -> Vec<u8> {
        HtmlRewriter::transform(self, chunk)
    }

    fn finish(&mut self) -> Vec<u8> {
        HtmlRewriter::finish(self)
    }
}

impl BodyRewriter for CssRewriter {
    fn transform(&mut self, chunk: &[u8]) -> Vec<u8> {
        CssRewriter::transform(self, chunk)
    }

    fn finish(&mut self) -> Vec<u8> {
        CssRewriter::finish(self)
    }
}
