//! HTML minification for production page output.

use std::borrow::Cow;

/// Minify page HTML when `enabled`.
///
/// Returns `Cow::Borrowed` if minification is off. Runs after bundling, so no
/// island token (an HTML comment) is left to preserve.
pub fn minify_html(html: &str, enabled: bool) -> Cow<'_, [u8]> {
    if !enabled {
        return Cow::Borrowed(html.as_bytes());
    }

    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    Cow::Owned(minify_html::minify(html.as_bytes(), &cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_borrowed() {
        let html = "<p>  hello  </p>";
        assert!(matches!(minify_html(html, false), Cow::Borrowed(_)));
    }

    #[test]
    fn test_enabled_strips_comments_and_whitespace() {
        let html = "<html><head></head><body>\n  <p>hi</p>\n  <!-- note -->\n</body></html>";
        let out = minify_html(html, true);
        let out = String::from_utf8_lossy(&out);
        assert!(!out.contains("note"));
        assert!(out.contains("<p>hi</p>"));
        assert!(out.len() < html.len());
    }

    #[test]
    fn test_keeps_deferred_script_tags() {
        let html = r#"<html><head><script defer src="/assets/page-1.js"></script></head><body></body></html>"#;
        let out = minify_html(html, true);
        let out = String::from_utf8_lossy(&out);
        assert!(out.contains("/assets/page-1.js"));
    }
}
