//! Streaming CSS rewriter.
//!
//! Single-pass scan for `url(<quote?><value><quote?>)`. Network references
//! are routed through the proxy with their original quoting; `data:` values
//! are inline payloads, not network references, and are left byte-for-byte
//! untouched. A token split across two chunks is reassembled via the held
//! tail, never dropped.

use std::mem;

use url::Url;

use cocoon_core::rewrite;

use crate::scan;

/// Longest `url(` token held back waiting for its closing paren.
const MAX_PENDING_TOKEN: usize = 4 * 1024;

const TOKEN: &[u8] = b"url(";

pub struct CssRewriter {
    target: Url,
    self_url: Url,
    tail: Vec<u8>,
}

enum Token {
    /// Full token parsed: total length, value range within it, quote used.
    Complete {
        len: usize,
        value: (usize, usize),
        quote: Option<u8>,
    },
    /// Closing quote or paren not seen yet.
    Incomplete,
}

impl CssRewriter {
    #[must_use]
    pub fn new(target: Url, self_url: Url) -> Self {
        Self {
            target,
            self_url,
            tail: Vec::new(),
        }
    }

    pub fn transform(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut buf = mem::take(&mut self.tail);
        buf.extend_from_slice(chunk);
        let mut out = Vec::with_capacity(buf.len() + 64);
        let mut pos = 0;

        loop {
            let Some(rel) = scan::find_ci(&buf[pos..], TOKEN) else {
                let keep = scan::partial_suffix(&buf[pos..], TOKEN);
                out.extend_from_slice(&buf[pos..buf.len() - keep]);
                self.tail = buf[buf.len() - keep..].to_vec();
                return out;
            };
            let start = pos + rel;
            out.extend_from_slice(&buf[pos..start]);

            match parse_token(&buf[start..]) {
                Token::Complete { len, value, quote } => {
                    self.emit_token(&buf[start..start + len], value, quote, &mut out);
                    pos = start + len;
                },
                Token::Incomplete => {
                    if buf.len() - start > MAX_PENDING_TOKEN {
                        // Unclosed past any plausible token length; treat as
                        // literal text rather than buffering forever.
                        out.extend_from_slice(&buf[start..]);
                        self.tail.clear();
                        return out;
                    }
                    self.tail = buf[start..].to_vec();
                    return out;
                },
            }
        }
    }

    /// Flush the pending tail at end of stream.
    pub fn finish(&mut self) -> Vec<u8> {
        mem::take(&mut self.tail)
    }

    fn emit_token(
        &self,
        token: &[u8],
        (value_start, value_end): (usize, usize),
        quote: Option<u8>,
        out: &mut Vec<u8>,
    ) {
        let value = &token[value_start..value_end];
        let keep_original = value.is_empty()
            || value.len() >= 5 && value[..5].eq_ignore_ascii_case(b"data:")
            || std::str::from_utf8(value).is_err();
        if keep_original {
            out.extend_from_slice(token);
            return;
        }

        // Checked for UTF-8 validity just above.
        let value = String::from_utf8_lossy(value);
        let routed = rewrite::rewrite_reference(&value, &self.target, &self.self_url);
        out.extend_from_slice(b"url(");
        if let Some(q) = quote {
            out.push(q);
        }
        out.extend_from_slice(routed.as_bytes());
        if let Some(q) = quote {
            out.push(q);
        }
        out.push(b')');
    }
}

/// Parse one token starting at `url(`. Returns `Incomplete` when the buffer
/// ends before the token closes.
fn parse_token(buf: &[u8]) -> Token {
    let mut i = TOKEN.len();

    while i < buf.len() && buf[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= buf.len() {
        return Token::Incomplete;
    }

    match buf[i] {
        q @ (b'"' | b'\'') => {
            let value_start = i + 1;
            let Some(rel) = buf[value_start..].iter().position(|&b| b == q) else {
                return Token::Incomplete;
            };
            let value_end = value_start + rel;
            let mut j = value_end + 1;
            while j < buf.len() && buf[j].is_ascii_whitespace() {
                j += 1;
            }
            if j >= buf.len() {
                return Token::Incomplete;
            }
            if buf[j] != b')' {
                // Malformed; resync at the next closing paren.
                let Some(rel) = buf[j..].iter().position(|&b| b == b')') else {
                    return Token::Incomplete;
                };
                j += rel;
            }
            Token::Complete {
                len: j + 1,
                value: (value_start, value_end),
                quote: Some(q),
            }
        },
        _ => {
            let Some(rel) = buf[i..].iter().position(|&b| b == b')') else {
                return Token::Incomplete;
            };
            let mut value_end = i + rel;
            let len = value_end + 1;
            while value_end > i && buf[value_end - 1].is_ascii_whitespace() {
                value_end -= 1;
            }
            Token::Complete {
                len,
                value: (i, value_end),
                quote: None,
            }
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, cocoon_core::TARGET_PARAM, rstest::rstest};

    fn rewriter() -> CssRewriter {
        CssRewriter::new(
            Url::parse("http://example.com/").unwrap(),
            Url::parse("http://proxy.test/").unwrap(),
        )
    }

    fn run(rewriter: &mut CssRewriter, chunks: &[&[u8]]) -> String {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(rewriter.transform(chunk));
        }
        out.extend(rewriter.finish());
        String::from_utf8(out).unwrap()
    }

    fn routed_target(css: &str) -> String {
        let start = css.find("url(").unwrap() + "url(".len();
        let end = css[start..].find(')').unwrap() + start;
        let inner = css[start..end].trim_matches(['"', '\'']);
        Url::parse(inner)
            .unwrap()
            .query_pairs()
            .find(|(name, _)| name == TARGET_PARAM)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    #[test]
    fn rewrites_quoted_reference() {
        let out = run(&mut rewriter(), &[br#"div{background:url("/img/a.png")}"#]);
        assert_eq!(routed_target(&out), "http://example.com/img/a.png");
        assert!(out.contains(r#"url("http://proxy.test/?"#), "double quoting kept: {out}");
    }

    #[rstest]
    #[case("url('/a.png')", '\'')]
    #[case("url(/a.png)", ' ')]
    fn quoting_is_preserved(#[case] css: &str, #[case] quote: char) {
        let out = run(&mut rewriter(), &[css.as_bytes()]);
        assert_eq!(routed_target(&out), "http://example.com/a.png");
        if quote == '\'' {
            assert!(out.starts_with("url('"));
        } else {
            assert!(out.starts_with("url(http"));
        }
    }

    #[test]
    fn data_urls_are_untouched() {
        let css = "span{background:url(data:image/png;base64,AAAA)}";
        let out = run(&mut rewriter(), &[css.as_bytes()]);
        assert_eq!(out, css);
    }

    #[test]
    fn token_case_is_insensitive() {
        let out = run(&mut rewriter(), &[b"a{b:URL(\"/x.gif\")}"]);
        assert_eq!(routed_target(&out), "http://example.com/x.gif");
    }

    #[test]
    fn token_split_across_chunks_is_reassembled() {
        let css = r#"div{background:url("/img/a.png")}"#;
        let reference = run(&mut rewriter(), &[css.as_bytes()]);
        for split in 0..=css.len() {
            let out = run(&mut rewriter(), &[
                &css.as_bytes()[..split],
                &css.as_bytes()[split..],
            ]);
            assert_eq!(out, reference, "split at byte {split}");
        }
    }

    #[test]
    fn multiple_tokens_in_one_chunk() {
        let css = r#"a{x:url("/1.png");y:url("/2.png")}"#;
        let out = run(&mut rewriter(), &[css.as_bytes()]);
        assert_eq!(out.matches("http://proxy.test/?").count(), 2);
    }

    #[test]
    fn unterminated_trailing_text_is_flushed_at_finish() {
        let out = run(&mut rewriter(), &[b"p{color:red} /* url("]);
        assert_eq!(out, "p{color:red} /* url(");
    }

    #[test]
    fn plain_css_passes_through() {
        let css = "body { margin: 0; padding: 0 }";
        assert_eq!(run(&mut rewriter(), &[css.as_bytes()]), css);
    }
}
