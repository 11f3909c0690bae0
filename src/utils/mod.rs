//! Utility functions and helpers.

pub mod http;
pub mod retry;

use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Absolute URL for a catalog link.
///
/// Blank hrefs give an empty string, `http(s)` hrefs are kept as-is and
/// anything else is joined onto the site root.
pub fn abs_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with("//") {
        let scheme = base.split("://").next().unwrap_or("https");
        return format!("{scheme}:{href}");
    }
    match Url::parse(base) {
        Ok(base_url) if href.starts_with('/') => resolve_url(&base_url, href),
        _ => {
            let sep = if href.starts_with('/') { "" } else { "/" };
            format!("{}{}{}", base.trim_end_matches('/'), sep, href)
        }
    }
}

/// Collapse runs of whitespace and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://example.com/path/").unwrap();
        assert_eq!(
            resolve_url(&base, "/root.html"),
            "https://example.com/root.html"
        );
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_abs_url() {
        let base = "https://www.escolavirtual.gov.br";
        assert_eq!(abs_url(base, ""), "");
        assert_eq!(abs_url(base, "   "), "");
        assert_eq!(
            abs_url(base, "/curso/123"),
            "https://www.escolavirtual.gov.br/curso/123"
        );
        assert_eq!(
            abs_url(base, "curso/123"),
            "https://www.escolavirtual.gov.br/curso/123"
        );
        assert_eq!(abs_url(base, "https://x.br/a"), "https://x.br/a");
        assert_eq!(abs_url(base, "//cdn.x.br/a"), "https://cdn.x.br/a");
    }

    #[test]
    fn test_abs_url_keeps_base_path_prefix_for_relative() {
        assert_eq!(
            abs_url("http://127.0.0.1:8080/", "cursos/online/a/b"),
            "http://127.0.0.1:8080/cursos/online/a/b"
        );
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Curso \n  de\tExcel "), "Curso de Excel");
    }
}
