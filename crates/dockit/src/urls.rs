//! URL normalization and scope checks
//!
//! Two URLs that differ only in fragment, query string, or a trailing
//! slash normalize to the same string, so the crawler and the path mapper
//! treat them as one node.

use url::Url;

/// Parse and require an http(s) scheme
pub fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

/// Canonical form of an already parsed URL
pub fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.set_query(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    url.to_string()
}

/// Parse and normalize; `None` for non-http(s) or malformed input
pub fn normalize_url(raw: &str) -> Option<String> {
    parse_http_url(raw).map(|u| normalize(&u))
}

/// Resolve a possibly relative link against a base and normalize it
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let joined = base.join(href).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(normalize(&joined)),
        _ => None,
    }
}

/// Scope pattern in the same form as normalized URLs; unparseable patterns are kept as given
pub fn normalize_scope(scope: &str) -> String {
    let scope = scope.trim();
    normalize_url(scope).unwrap_or_else(|| scope.to_string())
}

/// Prefix match of a normalized URL against a scope pattern
pub fn in_scope(url: &str, scope: &str) -> bool {
    url.starts_with(scope.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_matches_after_normalization() {
        let scope = normalize_scope(" https://Docs.Example.com/guide/ ");
        assert_eq!(scope, "https://docs.example.com/guide");
        let link = normalize_url("https://docs.example.com/guide/setup").unwrap();
        assert!(in_scope(&link, &scope));
        assert!(!in_scope("https://docs.example.com/blog", &scope));
        assert_eq!(normalize_scope("docs/guide"), "docs/guide");
    }

    #[test]
    fn test_variants_normalize_to_same_node() {
        let variants = [
            "https://docs.example.com/guide/intro",
            "https://docs.example.com/guide/intro/",
            "https://docs.example.com/guide/intro#setup",
            "https://docs.example.com/guide/intro?ref=nav",
            "https://docs.example.com/guide/intro/?ref=nav#top",
        ];
        let normalized: Vec<_> = variants.iter().map(|v| normalize_url(v)).collect();
        for n in &normalized {
            assert_eq!(n.as_deref(), Some("https://docs.example.com/guide/intro"));
        }
    }

    #[test]
    fn test_root_keeps_slash() {
        assert_eq!(
            normalize_url("https://example.com").as_deref(),
            Some("https://example.com/")
        );
        assert_eq!(
            normalize_url("https://example.com/#top").as_deref(),
            Some("https://example.com/")
        );
    }

    #[test]
    fn test_rejects_non_http() {
        assert_eq!(normalize_url("ftp://example.com/file"), None);
        assert_eq!(normalize_url("not a url"), None);
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://example.com/docs/page").unwrap();
        assert_eq!(
            resolve_link(&base, "other#frag").as_deref(),
            Some("https://example.com/docs/other")
        );
        assert_eq!(
            resolve_link(&base, "/api/").as_deref(),
            Some("https://example.com/api")
        );
        assert_eq!(resolve_link(&base, "#section"), None);
        assert_eq!(resolve_link(&base, "javascript:void(0)"), None);
        assert_eq!(resolve_link(&base, "mailto:a@b.c"), None);
    }

    #[test]
    fn test_in_scope() {
        assert!(in_scope(
            "https://example.com/docs/a",
            "https://example.com/docs/"
        ));
        assert!(in_scope("https://example.com/docs", "https://example.com/docs/"));
        assert!(!in_scope("https://example.com/blog/a", "https://example.com/docs"));
        assert!(!in_scope("https://other.com/docs/a", "https://example.com/docs"));
    }
}
