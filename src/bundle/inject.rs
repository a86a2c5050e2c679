//! Token substitution and `<head>` injection.

use super::ssr::SsrOutput;
use super::BundleError;
use crate::log;
use crate::site::Page;
use std::fmt::Write;

const HEAD_CLOSE: &str = "</head>";

/// Replace every element token of `page`.
///
/// Server-rendered elements get their fragment, client-only ones become
/// empty. Each token must occur exactly once; this is checked for all
/// elements before anything is replaced.
pub fn replace_tokens(page: &mut Page, fragments: &SsrOutput) -> Result<(), BundleError> {
    for el in &page.elements {
        let count = page.contents.matches(&el.token).count();
        if count != 1 {
            return Err(BundleError::TokenCount {
                page: page.rel_display(),
                id: el.id.clone(),
                count,
            });
        }
    }

    for el in &page.elements {
        let html = if el.is_client_only() {
            ""
        } else {
            match fragments.get(&el.id) {
                Some(html) => html.as_str(),
                None => {
                    log!("warn"; "no server output for {} ({}) in {}", el.id, el.src, page.rel_display());
                    ""
                }
            }
        };
        page.contents = page.contents.replacen(&el.token, html, 1);
    }
    Ok(())
}

/// Tags to add to one page, in insertion order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeadTags {
    pub styles: Vec<String>,
    pub scripts: Vec<String>,
}

impl HeadTags {
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty() && self.scripts.is_empty()
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for href in &self.styles {
            let _ = writeln!(out, r#"<link rel="stylesheet" href="{href}">"#);
        }
        for src in &self.scripts {
            let _ = writeln!(out, r#"<script defer src="{src}"></script>"#);
        }
        out
    }
}

/// Insert `tags` before the first `</head>`; `None` if there is none.
pub fn inject_head(contents: &str, tags: &HeadTags) -> Option<String> {
    let at = contents.find(HEAD_CLOSE)?;
    let mut out = String::with_capacity(contents.len() + 128);
    out.push_str(&contents[..at]);
    out.push_str(&tags.render());
    out.push_str(&contents[at..]);
    Some(out)
}
