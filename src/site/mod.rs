//! The site context: pages, assets and directories of one build.
//!
//! A [`Site`] is created empty for every build, populated by the crawler,
//! mutated by the renderer and the bundler, and consumed by the writer.
//! Nothing survives from one build to the next.
//!
//! # Page lifecycle
//!
//! ```text
//! crawl        id, paths, depth, provisional url (= relative path)
//!   │
//! phase 1      elements registered, contents = expanded template
//!   │
//! phase 2      data (front matter), final url, contents = body html
//!   │
//! phase 3      contents = layout html
//!   │
//! bundle       tokens replaced, <script>/<link> injected
//! ```

pub mod crawl;

pub use crawl::crawl_site;

use crate::compiler::element::Element;
use crate::config::{FrameworkKind, SiteConfig};
use serde::Serialize;
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

/// Extension of content documents.
pub const DOCUMENT_EXT: &str = "md";

/// Extension of rendered pages.
pub const OUTPUT_EXT: &str = "html";

/// File name of a directory's index document.
pub const INDEX_DOCUMENT: &str = "index.md";

/// Front-matter metadata of a page.
pub type PageData = Map<String, Value>;

// ============================================================================
// Identifiers
// ============================================================================

/// Stable page identifier: short hash of the absolute document path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn for_path(path: &Path) -> Self {
        Self(crate::utils::hash::short_id(
            path.as_os_str().as_encoded_bytes(),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Page
// ============================================================================

/// One content document and everything the pipeline derives from it.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: PageId,
    /// Absolute document path.
    pub path: PathBuf,
    /// Absolute path of the owning directory.
    pub dir: PathBuf,
    /// File name, e.g. `post1.md`.
    pub name: String,
    /// Path relative to the content root.
    pub rel: PathBuf,
    /// Render depth; index documents sit one level above their directory.
    pub depth: i32,
    /// Public URL; provisional until phase 2.
    pub url: String,
    /// Front matter, set in phase 2.
    pub data: PageData,
    /// HTML contents, overwritten by every phase.
    pub contents: String,
    /// Islands in template execution order.
    pub elements: Vec<Element>,
}

impl Page {
    /// Create a page found by the crawler in a directory at `dir_depth`.
    pub fn new(path: PathBuf, rel: PathBuf, dir_depth: i32) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let depth = if name == INDEX_DOCUMENT {
            dir_depth - 1
        } else {
            dir_depth
        };
        let url = format!("/{}", slash_path(&rel));

        Self {
            id: PageId::for_path(&path),
            path,
            dir,
            name,
            rel,
            depth,
            url,
            data: PageData::new(),
            contents: String::new(),
            elements: Vec::new(),
        }
    }

    pub fn is_index(&self) -> bool {
        self.name == INDEX_DOCUMENT
    }

    /// Relative path with forward slashes, for logs and templates.
    pub fn rel_display(&self) -> String {
        slash_path(&self.rel)
    }

    /// Output path relative to the output root.
    pub fn output_rel(&self) -> PathBuf {
        self.rel.with_extension(OUTPUT_EXT)
    }

    /// Final public URL: `.md` becomes `.html`, a trailing `index.html` is elided.
    pub fn public_url(&self) -> String {
        let url = format!("/{}", slash_path(&self.output_rel()));
        match url.strip_suffix("index.html") {
            Some(dir) if dir.ends_with('/') => dir.to_owned(),
            _ => url,
        }
    }

    pub fn has_csr(&self) -> bool {
        self.elements.iter().any(|e| e.csr)
    }

    /// Template-facing view of this page.
    pub fn view(&self) -> PageView {
        PageView {
            id: self.id.clone(),
            name: self.name.clone(),
            path: self.rel_display(),
            url: self.url.clone(),
            depth: self.depth,
            data: self.data.clone(),
            contents: self.contents.clone(),
        }
    }
}

/// What templates see of a page (`page`, items of `pages()`).
#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub id: PageId,
    pub name: String,
    pub path: String,
    pub url: String,
    pub depth: i32,
    pub data: PageData,
    pub contents: String,
}

// ============================================================================
// Assets and bundle outputs
// ============================================================================

/// A static file copied verbatim.
#[derive(Debug, Clone)]
pub struct Asset {
    pub source: PathBuf,
    /// Path relative to both the content and the output root.
    pub rel: PathBuf,
}

/// A bundler output destined for the output root.
#[derive(Debug, Clone)]
pub struct OutputFile {
    /// Path relative to the output root, e.g. `assets/page-1a2b.js`.
    pub rel: PathBuf,
    pub contents: Vec<u8>,
}

// ============================================================================
// Site
// ============================================================================

/// Site context of a single build.
#[derive(Debug)]
pub struct Site {
    pub root: PathBuf,
    pub content: PathBuf,
    pub output: PathBuf,
    pub cache: PathBuf,
    /// Directories to create, relative to the output root, in crawl order.
    pub directories: Vec<PathBuf>,
    pub pages: BTreeMap<PageId, Page>,
    pub assets: Vec<Asset>,
    pub framework: FrameworkKind,
    pub production: bool,
    /// Client bundle outputs, filled by the orchestrator.
    pub bundled: Vec<OutputFile>,
}

impl Site {
    /// An empty site context for `config`.
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            root: config.root.clone(),
            content: config.build.content.clone(),
            output: config.build.output.clone(),
            cache: config.build.cache.clone(),
            directories: Vec::new(),
            pages: BTreeMap::new(),
            assets: Vec::new(),
            framework: config.build.framework,
            production: config.production,
            bundled: Vec::new(),
        }
    }

    /// Page ids deepest first; ties keep relative-path order.
    pub fn render_order(&self) -> Vec<PageId> {
        let mut pages: Vec<&Page> = self.pages.values().collect();
        pages.sort_by(|a, b| b.depth.cmp(&a.depth).then_with(|| a.rel.cmp(&b.rel)));
        pages.into_iter().map(|p| p.id.clone()).collect()
    }

    pub fn element_count(&self) -> usize {
        self.pages.values().map(|p| p.elements.len()).sum()
    }
}

/// Render a relative path with `/` separators.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
