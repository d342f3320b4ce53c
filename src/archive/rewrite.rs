//! Static link rewriting for portable serving
//!
//! A build usually references assets from the site root (`href="/app.css"`).
//! Served under a scope prefix those would escape to the real origin, so
//! markup and stylesheets get a single textual pass turning root-relative
//! `href`/`src` attributes into scope-relative ones. This is not an HTML
//! parser: references built by scripts at runtime are not touched.

use regex::Regex;
use std::sync::OnceLock;

fn root_relative_attr() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `//host/...` is protocol-relative and must stay as is
    RE.get_or_init(|| Regex::new(r#"(\s(?:href|src))=(["'])/([^/])"#).expect("valid regex"))
}

fn head_open_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<head(\s[^>]*)?>").expect("valid regex"))
}

/// Rewrite root-relative `href`/`src` attributes to scope-relative form
pub fn rewrite_root_links(text: &str) -> String {
    root_relative_attr()
        .replace_all(text, "${1}=${2}${3}")
        .into_owned()
}

/// Insert `<base href="{scope}">` right after the opening head tag
///
/// Returns the input unchanged when there is no head tag.
pub fn inject_base(html: &str, scope_prefix: &str) -> String {
    match head_open_tag().find(html) {
        Some(tag) => {
            let base = format!("<base href=\"{}\">", scope_prefix);
            let mut out = String::with_capacity(html.len() + base.len());
            out.push_str(&html[..tag.end()]);
            out.push_str(&base);
            out.push_str(&html[tag.end()..]);
            out
        }
        None => html.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_href() {
        let html = r#"<a href="/about.html">About</a>"#;
        assert_eq!(rewrite_root_links(html), r#"<a href="about.html">About</a>"#);
    }

    #[test]
    fn test_rewrite_src_single_quotes() {
        let html = "<img src='/img/logo.png'>";
        assert_eq!(rewrite_root_links(html), "<img src='img/logo.png'>");
    }

    #[test]
    fn test_rewrite_every_occurrence() {
        let html = r#"<link href="/a.css"><script src="/b.js"></script><a href="/c">c</a>"#;
        assert_eq!(
            rewrite_root_links(html),
            r#"<link href="a.css"><script src="b.js"></script><a href="c">c</a>"#
        );
    }

    #[test]
    fn test_leaves_relative_and_absolute() {
        let html = r#"<a href="page.html"></a><a href="https://x.dev/y"></a><script src="//cdn.x.dev/z.js"></script>"#;
        assert_eq!(rewrite_root_links(html), html);
    }

    #[test]
    fn test_ignores_data_attributes() {
        let html = r#"<div data-src="/keep.png"></div>"#;
        assert_eq!(rewrite_root_links(html), html);
    }

    #[test]
    fn test_inject_base_after_head() {
        let html = "<html><head><title>t</title></head></html>";
        assert_eq!(
            inject_base(html, "/portal-scope/"),
            "<html><head><base href=\"/portal-scope/\"><title>t</title></head></html>"
        );
    }

    #[test]
    fn test_inject_base_head_with_attributes() {
        let html = "<HEAD lang=\"en\"><meta charset=\"utf-8\"></HEAD>";
        assert_eq!(
            inject_base(html, "/s/"),
            "<HEAD lang=\"en\"><base href=\"/s/\"><meta charset=\"utf-8\"></HEAD>"
        );
    }

    #[test]
    fn test_inject_base_ignores_header_element() {
        let html = "<body><header>x</header></body>";
        assert_eq!(inject_base(html, "/s/"), html);
    }
}
