//! Subscription token extraction from request paths.

/// Extract the subscription token from `path` under `prefix`.
///
/// The token is the first non-empty segment after the prefix, taken
/// verbatim: no percent-decoding, normalization or case folding. Returns
/// `None` when the path is outside the prefix or carries no token.
///
/// With prefix `/s/`, `/s/abc123/extra` yields `abc123`.
pub fn extract_token<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?.trim_matches('/');
    if rest.is_empty() {
        return None;
    }

    let token = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_single_segment() {
        assert_eq!(extract_token("/s/abc123", "/s/"), Some("abc123"));
    }

    #[test]
    fn test_takes_only_first_segment() {
        assert_eq!(extract_token("/s/abc123/extra", "/s/"), Some("abc123"));
        assert_eq!(extract_token("/s/abc123/extra/more", "/s/"), Some("abc123"));
    }

    #[test]
    fn test_trims_surrounding_slashes() {
        assert_eq!(extract_token("/s/abc123/", "/s/"), Some("abc123"));
        assert_eq!(extract_token("/s//abc123", "/s/"), Some("abc123"));
    }

    #[test]
    fn test_empty_token_is_none() {
        assert_eq!(extract_token("/s/", "/s/"), None);
        assert_eq!(extract_token("/s///", "/s/"), None);
    }

    #[test]
    fn test_outside_prefix_is_none() {
        assert_eq!(extract_token("/other/abc", "/s/"), None);
        assert_eq!(extract_token("/s", "/s/"), None);
        assert_eq!(extract_token("/sub/abc", "/s/"), None);
    }

    #[test]
    fn test_token_is_taken_verbatim() {
        assert_eq!(extract_token("/s/AbC%20x", "/s/"), Some("AbC%20x"));
        assert_eq!(extract_token("/s/..", "/s/"), Some(".."));
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(
            extract_token("/api/v1/client/subscribe/tok", "/api/v1/client/subscribe/"),
            Some("tok")
        );
    }
}
