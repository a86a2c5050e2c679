//! Hydration bundling.
//!
//! Runs after every page is rendered and works on the whole site at once:
//!
//! ```text
//! stage A  ssr elements ──► static bundle (node, cjs) ──► SsrRuntime
//!                                                            │
//!          tokens ◄──────────── id → html ───────────────────┘
//!
//! stage B  csr pages ──► page:<id> entries ──► client bundles (browser)
//!                                                  │
//!          <head> ◄──── <link>/<script> by entry ──┘
//! ```
//!
//! - **framework**: Entry source generation per UI framework
//! - **bundler**: Bundler contract and the esbuild implementation
//! - **host**: Long-lived Node.js process
//! - **ssr**: Server-rendering runtimes
//! - **inject**: Token substitution and head injection

pub mod bundler;
pub mod framework;
pub mod host;
pub mod inject;
pub mod ssr;

use crate::compiler::element::Element;
use crate::log;
use crate::site::{OutputFile, Page, PageId, Site, slash_path};
use anyhow::{Context, Result};
use bundler::{
    BundleMode, BundleRequest, BundleResult, Bundler, Entry, Format, Message, Output, Platform,
    VirtualModule, VirtualResolver,
};
use framework::{Framework, framework_for};
use inject::{HeadTags, inject_head, replace_tokens};
use rustc_hash::FxHashMap;
use ssr::{SsrOutput, SsrRuntime};
use std::{collections::BTreeMap, fs, path::Path};
use thiserror::Error;

/// Output subdirectory holding client bundles.
pub const ASSETS_DIR: &str = "assets";

/// Prefix of virtual client entry ids.
pub const VIRTUAL_PREFIX: &str = "page:";

/// File name of the compiled server bundle inside the cache directory.
pub const STATIC_BUNDLE: &str = "static-bundle.js";

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("{stage} bundle failed with {count} error(s)")]
    Compile { stage: &'static str, count: usize },

    #[error("element id {id} is shared by {first} and {second}")]
    ElementCollision {
        id: String,
        first: String,
        second: String,
    },

    #[error("element {id} must appear exactly once in {page}, found {count}")]
    TokenCount {
        page: String,
        id: String,
        count: usize,
    },

    #[error("bundler output {0} is outside the output directory")]
    StrayOutput(String),
}

/// Virtual id of a page's client entry.
pub fn virtual_id(page: &PageId) -> String {
    format!("{VIRTUAL_PREFIX}{page}")
}

/// Output name of a page's client entry.
fn entry_name(page: &PageId) -> String {
    format!("page-{page}")
}

/// Bundle every island of `site`: server-render, substitute tokens, build
/// client entries and inject them.
pub fn bundle_site(site: &mut Site, bundler: &dyn Bundler, runtime: &dyn SsrRuntime) -> Result<()> {
    let framework = framework_for(site.framework);
    check_element_ids(site)?;

    let fragments = static_stage(site, framework, bundler, runtime)?;
    for page in site.pages.values_mut() {
        replace_tokens(page, &fragments)?;
    }

    client_stage(site, framework, bundler)
}

fn check_element_ids(site: &Site) -> Result<(), BundleError> {
    let mut seen: FxHashMap<&str, &Page> = FxHashMap::default();
    for page in site.pages.values() {
        for el in &page.elements {
            if let Some(first) = seen.insert(&el.id, page) {
                return Err(BundleError::ElementCollision {
                    id: el.id.clone(),
                    first: first.rel_display(),
                    second: page.rel_display(),
                });
            }
        }
    }
    Ok(())
}

fn report(stage: &'static str, result: &BundleResult, site: &Site) -> Result<(), BundleError> {
    for warning in &result.warnings {
        log!("warn"; "{}", describe(warning, site));
    }
    if result.is_ok() {
        return Ok(());
    }
    for error in &result.errors {
        log!("error"; "{}", describe(error, site));
    }
    Err(BundleError::Compile {
        stage,
        count: result.errors.len(),
    })
}

/// Message text with its file, virtual ids mapped back to their page.
fn describe(message: &Message, site: &Site) -> String {
    let Some(file) = message.file.as_deref() else {
        return message.text.clone();
    };
    let file = match file.strip_prefix(VIRTUAL_PREFIX) {
        Some(id) => site
            .pages
            .values()
            .find(|p| p.id.as_str() == id)
            .map_or_else(|| file.to_owned(), Page::rel_display),
        None => file.to_owned(),
    };
    format!("{} in {file}", message.text)
}

// ============================================================================
// Stage A: server rendering
// ============================================================================

fn static_stage(
    site: &Site,
    framework: &dyn Framework,
    bundler: &dyn Bundler,
    runtime: &dyn SsrRuntime,
) -> Result<SsrOutput> {
    let elements: Vec<&Element> = site
        .pages
        .values()
        .flat_map(|p| p.elements.iter())
        .filter(|el| el.ssr)
        .collect();
    if elements.is_empty() {
        return Ok(SsrOutput::new());
    }

    let script = site.cache.join(STATIC_BUNDLE);
    let request = BundleRequest {
        key: "static",
        working_dir: &site.root,
        entries: vec![Entry::Stdin {
            contents: framework.static_bundle(&elements),
            resolve_dir: site.root.clone(),
            sourcefile: STATIC_BUNDLE.into(),
        }],
        resolver: None,
        mode: BundleMode {
            minify: false,
            incremental: !site.production,
            content_hash: false,
        },
        platform: Platform::Node,
        format: Format::Cjs,
        externals: framework
            .static_external()
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
        jsx_import_source: framework.jsx_import_source(),
        output: Output::File(script.clone()),
    };

    let result = bundler.bundle(&request)?;
    report("static", &result, site)?;

    for output in &result.outputs {
        write_file(&output.path, output.contents.as_bytes())?;
    }

    let fragments = runtime.execute(&script)?;
    log!("ssr"; "rendered {} of {} elements", fragments.len(), elements.len());
    Ok(fragments)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}

// ============================================================================
// Stage B: client bundles
// ============================================================================

/// Client entry sources for every page with client-rendered elements.
struct ClientEntries {
    modules: BTreeMap<String, VirtualModule>,
}

impl ClientEntries {
    fn collect(site: &Site, framework: &dyn Framework) -> Self {
        let modules = site
            .pages
            .values()
            .filter(|p| p.has_csr())
            .map(|page| {
                let elements: Vec<&Element> = page.elements.iter().collect();
                let module = VirtualModule {
                    contents: framework.client_bundle(&elements),
                    resolve_dir: page.dir.clone(),
                };
                (virtual_id(&page.id), module)
            })
            .collect();
        Self { modules }
    }
}

impl VirtualResolver for ClientEntries {
    fn resolve(&self, id: &str) -> Option<VirtualModule> {
        self.modules.get(id).cloned()
    }
}

fn client_stage(site: &mut Site, framework: &dyn Framework, bundler: &dyn Bundler) -> Result<()> {
    let entries = ClientEntries::collect(site, framework);
    if entries.modules.is_empty() {
        return Ok(());
    }

    let request = BundleRequest {
        key: "client",
        working_dir: &site.root,
        entries: site
            .pages
            .keys()
            .filter(|id| entries.modules.contains_key(&virtual_id(id)))
            .map(|id| Entry::Virtual {
                name: entry_name(id),
                id: virtual_id(id),
            })
            .collect(),
        resolver: Some(&entries),
        mode: BundleMode::for_posture(site.production),
        platform: Platform::Browser,
        format: Format::Iife,
        externals: Vec::new(),
        jsx_import_source: framework.jsx_import_source(),
        output: Output::Dir(site.output.join(ASSETS_DIR)),
    };

    let result = bundler.bundle(&request)?;
    report("client", &result, site)?;

    let mut tags: BTreeMap<PageId, HeadTags> = BTreeMap::new();
    let mut bundled = Vec::with_capacity(result.outputs.len());

    for output in result.outputs {
        let rel = output
            .path
            .strip_prefix(&site.output)
            .map_err(|_| BundleError::StrayOutput(output.path.display().to_string()))?
            .to_path_buf();
        let url = format!("/{}", slash_path(&rel));

        let owner = output
            .entry_point
            .as_deref()
            .and_then(|e| e.strip_prefix(VIRTUAL_PREFIX))
            .and_then(|id| site.pages.keys().find(|k| k.as_str() == id));

        if let Some(page) = owner {
            let tags = tags.entry(page.clone()).or_default();
            match rel.extension().and_then(|e| e.to_str()) {
                Some("js") => tags.scripts.push(url),
                Some("css") => tags.styles.push(url),
                Some("map") => {}
                other => log!("warn"; "unrecognised output extension {:?} for {}", other.unwrap_or(""), url),
            }
        }

        bundled.push(OutputFile {
            rel,
            contents: output.contents.into_bytes(),
        });
    }

    for (id, tags) in &tags {
        // only maps or dropped files
        if tags.is_empty() {
            continue;
        }
        let Some(page) = site.pages.get_mut(id) else {
            continue;
        };
        match inject_head(&page.contents, tags) {
            Some(html) => page.contents = html,
            None => log!("warn"; "no </head> in {}, client bundle not linked", page.rel_display()),
        }
    }

    log!("bundle"; "{} client entries for {}, {} files",
        entries.modules.len(), framework.name(), bundled.len());
    site.bundled = bundled;
    Ok(())
}
