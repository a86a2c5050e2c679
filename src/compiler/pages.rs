//! Depth-ordered page rendering.
//!
//! Every page template is parsed before anything renders, then pages render
//! deepest first so that an index page listing its subtree with `pages()`
//! sees the final URL, front matter and body of every deeper page.

use super::markdown::Converter;
use super::template::{DEFAULT_STYLES, Layout, PageIndex, PageTemplate, SharedIndex};
use crate::config::SiteConfig;
use crate::log;
use crate::site::{Page, PageId, Site};
use anyhow::{Context, Result};
use minijinja::{Value, context};
use parking_lot::RwLock;
use std::{collections::BTreeMap, fs, sync::Arc};

/// Load the configured layout, or the embedded default.
pub fn load_layout(config: &SiteConfig) -> Result<Layout> {
    let source = match &config.build.layout {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read layout {}", path.display()))?,
        ),
        None => None,
    };
    Ok(Layout::parse(source)?)
}

/// Parse the template of every page.
///
/// Pages are visited in relative-path order and the first failure aborts.
pub fn parse_pages(site: &Site, index: &SharedIndex) -> Result<BTreeMap<PageId, PageTemplate>> {
    let mut pages: Vec<&Page> = site.pages.values().collect();
    pages.sort_by(|a, b| a.rel.cmp(&b.rel));

    let mut templates = BTreeMap::new();
    for page in pages {
        let source = fs::read_to_string(&page.path)
            .with_context(|| format!("Failed to read {}", page.path.display()))?;
        let template = PageTemplate::parse(page, source, Arc::clone(index))?;
        templates.insert(page.id.clone(), template);
    }
    Ok(templates)
}

/// Render every page of `site` through template, converter and layout.
pub fn render_site(
    site: &mut Site,
    config: &SiteConfig,
    layout: &Layout,
    converter: &dyn Converter,
) -> Result<()> {
    let index: SharedIndex = Arc::new(RwLock::new(PageIndex::from_site(site)));
    let templates = parse_pages(site, &index)?;

    for id in site.render_order() {
        let (Some(page), Some(template)) = (site.pages.get_mut(&id), templates.get(&id)) else {
            continue;
        };
        render_page(page, template, config, layout, converter, &index)?;
    }

    log!("render"; "{} pages, {} elements", site.pages.len(), site.element_count());
    Ok(())
}

fn scope(page: &Page, config: &SiteConfig) -> Value {
    context! {
        page => page.view(),
        site => &config.base,
        default_styles => DEFAULT_STYLES,
    }
}

fn render_page(
    page: &mut Page,
    template: &PageTemplate,
    config: &SiteConfig,
    layout: &Layout,
    converter: &dyn Converter,
    index: &SharedIndex,
) -> Result<()> {
    let rel = page.rel_display();

    // template expansion
    let (body, elements) = template.execute(scope(page, config))?;
    page.elements = elements;
    page.contents = body;

    // content transform
    let converted = converter.convert(&rel, &page.contents)?;
    page.data = converted.data;
    page.url = page.public_url();
    page.contents = converted.html;
    index.write().publish(page);

    // layout wrap
    page.contents = layout.render(&rel, scope(page, config))?;
    Ok(())
}
