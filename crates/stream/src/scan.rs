//! Byte scanning helpers shared by the streaming rewriters.

/// First position of `needle` in `haystack`, ASCII case-insensitive.
pub(crate) fn find_ci(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

/// Length of the longest proper prefix of `needle` that `haystack` ends
/// with. This is how much of the buffer must be held back: those bytes may
/// be the start of a match whose remainder arrives in the next chunk.
pub(crate) fn partial_suffix(haystack: &[u8], needle: &[u8]) -> usize {
    let longest = needle.len().saturating_sub(1).min(haystack.len());
    (1..=longest)
        .rev()
        .find(|&keep| haystack[haystack.len() - keep..].eq_ignore_ascii_case(&needle[..keep]))
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn find_is_case_insensitive() {
        assert_eq!(find_ci(b"a URL(x)", b"url("), Some(2));
        assert_eq!(find_ci(b"nothing here", b"url("), None);
        assert_eq!(find_ci(b"ur", b"url("), None);
    }

    #[test]
    fn partial_suffix_lengths() {
        assert_eq!(partial_suffix(b"body { background: u", b"url("), 1);
        assert_eq!(partial_suffix(b"...UR", b"url("), 2);
        assert_eq!(partial_suffix(b"...url", b"url("), 3);
        assert_eq!(partial_suffix(b"no match", b"url("), 0);
    }
}
