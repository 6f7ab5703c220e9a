//! Streaming HTML rewriter.
//!
//! A small state machine over the response body: scan for tags, rewrite the
//! URL-bearing attributes of every element, and inject a `<base>` tag plus
//! the client runtime script immediately inside the first `<head>`. Script
//! and style element bodies pass through in raw-text mode so their content
//! is never mistaken for markup.
//!
//! The rewriter never buffers the whole document. Only a bounded tail (an
//! unterminated tag or a possible prefix of a raw-text closing tag) is
//! carried from one chunk to the next.

use std::{borrow::Cow, mem};

use url::Url;

use cocoon_core::rewrite;

use crate::scan;

/// Longest pending tag we are willing to hold back. A '<' that stays open
/// past this is treated as literal text and flushed.
const MAX_PENDING_TAG: usize = 8 * 1024;

/// Attributes whose value is a single URL reference.
const URL_ATTRS: &[&str] = &["href", "src", "action", "poster"];

pub struct HtmlRewriter {
    target: Url,
    self_url: Url,
    /// Pending head payload; taken (set to `None`) once injected.
    injection: Option<String>,
    /// When inside script/style content, the closing tag we scan for.
    raw_until: Option<&'static [u8]>,
    tail: Vec<u8>,
}

impl HtmlRewriter {
    #[must_use]
    pub fn new(target: Url, self_url: Url) -> Self {
        let injection = format!(
            "<base href=\"{}\"><script>{}</script>",
            target.as_str(),
            cocoon_sandbox::runtime_script(&self_url),
        );
        Self {
            target,
            self_url,
            injection: Some(injection),
            raw_until: None,
            tail: Vec::new(),
        }
    }

    /// Transform one chunk of the document, returning the bytes that are
    /// safe to flush downstream.
    pub fn transform(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut buf = mem::take(&mut self.tail);
        buf.extend_from_slice(chunk);
        let mut out = Vec::with_capacity(buf.len() + 128);
        let mut pos = 0;

        while pos < buf.len() {
            if let Some(close) = self.raw_until {
                match scan::find_ci(&buf[pos..], close) {
                    Some(rel) => {
                        out.extend_from_slice(&buf[pos..pos + rel]);
                        pos += rel;
                        // The closing tag itself goes through the tag scanner.
                        self.raw_until = None;
                    },
                    None => {
                        let keep = scan::partial_suffix(&buf[pos..], close);
                        out.extend_from_slice(&buf[pos..buf.len() - keep]);
                        self.tail = buf[buf.len() - keep..].to_vec();
                        return out;
                    },
                }
                continue;
            }

            let Some(rel) = buf[pos..].iter().position(|&b| b == b'<') else {
                out.extend_from_slice(&buf[pos..]);
                return out;
            };
            let lt = pos + rel;
            out.extend_from_slice(&buf[pos..lt]);

            let Some(gt_rel) = tag_end(&buf[lt..]) else {
                if buf.len() - lt > MAX_PENDING_TAG {
                    out.extend_from_slice(&buf[lt..]);
                    return out;
                }
                self.tail = buf[lt..].to_vec();
                return out;
            };
            let gt = lt + gt_rel;
            self.emit_tag(&buf[lt..=gt], &mut out);
            pos = gt + 1;
        }

        out
    }

    /// Flush whatever is still pending. Headless or malformed documents end
    /// up here with their last bytes intact and simply no injection.
    pub fn finish(&mut self) -> Vec<u8> {
        mem::take(&mut self.tail)
    }

    fn emit_tag(&mut self, tag: &[u8], out: &mut Vec<u8>) {
        let name = tag_name(tag);

        match std::str::from_utf8(tag) {
            Ok(text) if !name.is_empty() => {
                out.extend_from_slice(
                    rewrite_tag(text, &name, &self.target, &self.self_url).as_bytes(),
                );
            },
            // Closing tags, comments, doctype, and tags that are not valid
            // UTF-8 pass through untouched.
            _ => out.extend_from_slice(tag),
        }

        let self_closing = tag.ends_with(b"/>");
        match name.as_str() {
            "head" => {
                if let Some(payload) = self.injection.take() {
                    out.extend_from_slice(payload.as_bytes());
                }
            },
            "script" if !self_closing => self.raw_until = Some(b"</script"),
            "style" if !self_closing => self.raw_until = Some(b"</style"),
            _ => {},
        }
    }
}

/// Position of the `>` closing the tag that starts at `tag[0] == '<'`,
/// skipping any `>` inside a quoted attribute value. Comments, doctype, and
/// processing instructions close at the first `>`; quote pairing is an
/// element-tag rule only.
fn tag_end(tag: &[u8]) -> Option<usize> {
    if tag.len() > 1 && (tag[1] == b'!' || tag[1] == b'?') {
        return tag.iter().position(|&b| b == b'>');
    }
    let mut quote: Option<u8> = None;
    for (i, &byte) in tag.iter().enumerate().skip(1) {
        match quote {
            Some(q) => {
                if byte == q {
                    quote = None;
                }
            },
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'>' => return Some(i),
                _ => {},
            },
        }
    }
    None
}

/// Lowercased element name of an opening tag, or empty for anything that is
/// not one (closing tags, comments, doctype).
fn tag_name(tag: &[u8]) -> String {
    if tag.len() < 3 || tag[1] == b'!' || tag[1] == b'/' || tag[1] == b'?' {
        return String::new();
    }
    tag[1..]
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric())
        .map(|b| b.to_ascii_lowercase() as char)
        .collect()
}

/// Rebuild one opening tag with its URL attributes rewritten.
///
/// `integrity` is dropped from script/link (the hash was computed for the
/// origin's bytes, which we are changing) and `target` is dropped from form
/// (a submit must not open a browsing context outside the proxy).
fn rewrite_tag(text: &str, name: &str, target: &Url, self_url: &Url) -> String {
    let inner = &text[1..text.len() - 1];
    let (inner, self_closing) = match inner.strip_suffix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };

    let mut result = String::with_capacity(text.len() + 64);
    result.push('<');
    result.push_str(&inner[..name.len()]);

    let mut rest = &inner[name.len()..];
    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let attr_name = &rest[..name_end];
        rest = &rest[name_end..];

        let mut quote = '"';
        let mut value: Option<&str> = None;
        let after = rest.trim_start();
        if let Some(after_eq) = after.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    quote = q;
                    let body = &after_eq[1..];
                    let end = body.find(q).unwrap_or(body.len());
                    value = Some(&body[..end]);
                    rest = body[end..].strip_prefix(q).unwrap_or(&body[end..]);
                },
                _ => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    value = Some(&after_eq[..end]);
                    rest = &after_eq[end..];
                },
            }
        } else {
            rest = after;
        }

        if attr_name.is_empty() {
            continue;
        }
        let lower = attr_name.to_ascii_lowercase();
        if lower == "integrity" && matches!(name, "script" | "link") {
            continue;
        }
        if lower == "target" && name == "form" {
            continue;
        }

        result.push(' ');
        result.push_str(attr_name);
        if let Some(v) = value {
            let rewritten: Cow<'_, str> = if v.is_empty() {
                Cow::Borrowed(v)
            } else if URL_ATTRS.contains(&lower.as_str()) {
                Cow::Owned(rewrite::rewrite_reference(v, target, self_url))
            } else if lower == "srcset" {
                Cow::Owned(rewrite_srcset(v, target, self_url))
            } else {
                Cow::Borrowed(v)
            };
            result.push('=');
            result.push(quote);
            result.push_str(&rewritten);
            result.push(quote);
        }
    }

    if self_closing {
        result.push_str(" /");
    }
    result.push('>');
    result
}

/// Rewrite the URL of each `url [descriptor]` candidate, preserving
/// descriptors and ordering.
fn rewrite_srcset(value: &str, target: &Url, self_url: &Url) -> String {
    value
        .split(',')
        .filter_map(|candidate| {
            let trimmed = candidate.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(match trimmed.split_once(char::is_whitespace) {
                Some((url, descriptor)) => format!(
                    "{} {}",
                    rewrite::rewrite_reference(url, target, self_url),
                    descriptor.trim_start(),
                ),
                None => rewrite::rewrite_reference(trimmed, target, self_url),
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}
