//! Site building orchestration.
//!
//! # Architecture
//!
//! ```text
//! Builder::stage()
//!     │
//!     ├── crawl_site()      content tree → pages, assets, directories
//!     ├── render_site()     template → markdown → layout, deepest first
//!     ├── bundle_site()     server render + client bundles (Toolchain)
//!     └── write_site()      staging tree
//!
//! StagedOutput::publish()   swap staging in place of the output root
//! ```
//!
//! The [`Toolchain`] outlives single builds: in `serve` it keeps the Node
//! host and its incremental bundler state warm between rebuilds.

use crate::{
    bundle::{
        bundle_site,
        bundler::{Bundler, EsbuildBundler},
        host::NodeHost,
        ssr::{HostRuntime, ProcessRuntime, SsrRuntime},
    },
    compiler::{
        markdown::{Converter, MarkdownConverter},
        pages::load_layout,
        render_site,
    },
    config::{SiteConfig, SsrMode},
    log,
    site::{Site, crawl_site},
    writer::{StagedOutput, write_site},
};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// External collaborators of a build.
pub struct Toolchain {
    bundler: Box<dyn Bundler + Send>,
    ssr: Box<dyn SsrRuntime + Send>,
    converter: Box<dyn Converter + Send>,
}

impl Toolchain {
    /// esbuild in a shared Node host, SSR as configured.
    pub fn new(config: &SiteConfig) -> Self {
        let host = Arc::new(NodeHost::new(
            config.build.node.command.clone(),
            &config.root,
            &config.build.cache,
        ));

        let ssr: Box<dyn SsrRuntime + Send> = match config.build.node.ssr {
            SsrMode::Process => Box::new(ProcessRuntime::new(
                config.build.node.command.clone(),
                &config.root,
            )),
            SsrMode::Host => Box::new(HostRuntime::new(Arc::clone(&host))),
        };

        Self {
            bundler: Box::new(EsbuildBundler::new(host)),
            ssr,
            converter: Box::new(MarkdownConverter::default()),
        }
    }

    /// A toolchain with explicit collaborators.
    #[cfg(test)]
    pub fn with(bundler: Box<dyn Bundler + Send>, ssr: Box<dyn SsrRuntime + Send>) -> Self {
        Self {
            bundler,
            ssr,
            converter: Box::new(MarkdownConverter::default()),
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub pages: usize,
    pub assets: usize,
    pub elements: usize,
    pub bundled: usize,
    pub duration: Duration,
    pub finished: DateTime<Local>,
}

impl BuildReport {
    fn new(site: &Site, started: Instant) -> Self {
        Self {
            pages: site.pages.len(),
            assets: site.assets.len(),
            elements: site.element_count(),
            bundled: site.bundled.len(),
            duration: started.elapsed(),
            finished: Local::now(),
        }
    }
}

/// Builds a site with one configuration and one toolchain.
pub struct Builder {
    config: SiteConfig,
    toolchain: Toolchain,
}

impl Builder {
    pub fn new(config: SiteConfig) -> Self {
        let toolchain = Toolchain::new(&config);
        Self::with_toolchain(config, toolchain)
    }

    pub fn with_toolchain(config: SiteConfig, toolchain: Toolchain) -> Self {
        Self { config, toolchain }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Run every build step and stage the output without publishing it.
    pub fn stage(&self) -> Result<(BuildReport, StagedOutput)> {
        let started = Instant::now();
        let config = &self.config;
        let mut site = Site::new(config);

        crawl_site(&mut site).context("crawl failed")?;

        let layout = load_layout(config)?;
        render_site(&mut site, config, &layout, self.toolchain.converter.as_ref())
            .context("render failed")?;

        bundle_site(
            &mut site,
            self.toolchain.bundler.as_ref(),
            self.toolchain.ssr.as_ref(),
        )
        .context("bundle failed")?;

        let staged = write_site(&site, config.build.minify).context("write failed")?;
        Ok((BuildReport::new(&site, started), staged))
    }

    /// Build and publish.
    pub fn build(&self) -> Result<BuildReport> {
        let (report, staged) = self.stage()?;
        staged.publish()?;
        log!("build"; "{} pages, {} assets, {} elements, {} bundle files in {:.2?}",
            report.pages, report.assets, report.elements, report.bundled, report.duration);
        Ok(report)
    }
}

/// One-shot build used by `melange build`.
pub fn build_site(config: SiteConfig) -> Result<BuildReport> {
    Builder::new(config).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::bundler::{BundleRequest, BundleResult, Entry, Output, OutputFile};
    use crate::bundle::ssr::SsrOutput;
    use std::{fs, path::Path};
    use tempfile::TempDir;

    /// Answers the static request with a stub script and every client entry
    /// with one hashed JS file.
    struct StubBundler;

    impl Bundler for StubBundler {
        fn bundle(&self, request: &BundleRequest<'_>) -> Result<BundleResult> {
            let outputs = match &request.output {
                Output::File(path) => vec![OutputFile {
                    path: path.clone(),
                    contents: "module.exports = {}".into(),
                    entry_point: None,
                }],
                Output::Dir(dir) => request
                    .entries
                    .iter()
                    .filter_map(|entry| match entry {
                        Entry::Virtual { name, id } => Some(OutputFile {
                            path: dir.join(format!("{name}-H4SH.js")),
                            contents: "/* client */".into(),
                            entry_point: Some(id.clone()),
                        }),
                        _ => None,
                    })
                    .collect(),
            };
            Ok(BundleResult {
                outputs,
                ..Default::default()
            })
        }
    }

    /// Returns a fixed fragment map.
    struct StubRuntime {
        fragments: SsrOutput,
    }

    impl SsrRuntime for StubRuntime {
        fn execute(&self, script: &Path) -> Result<SsrOutput> {
            assert!(script.is_file());
            Ok(self.fragments.clone())
        }
    }

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn builder(dir: &TempDir, production: bool, fragments: SsrOutput) -> Builder {
        let config = SiteConfig::default().with_root(dir.path(), production);
        let toolchain = Toolchain::with(
            Box::new(StubBundler),
            Box::new(StubRuntime { fragments }),
        );
        Builder::with_toolchain(config, toolchain)
    }

    fn read(dir: &TempDir, rel: &str) -> String {
        fs::read_to_string(dir.path().join("_site").join(rel)).unwrap()
    }

    #[test]
    fn test_blog_site() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pages/index.md", "# Home\n");
        write(
            dir.path(),
            "pages/blog/index.md",
            "{% for p in pages() %}[{{ p.data.title }}]({{ p.url }})\n{% endfor %}",
        );
        write(dir.path(), "pages/blog/post1.md", "---\ntitle: First\n---\nHello\n");
        write(dir.path(), "pages/blog/cover.jpg", "jpeg-bytes");
        write(dir.path(), "pages/_drafts/wip.md", "hidden");

        let report = builder(&dir, false, SsrOutput::new()).build().unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.assets, 1);
        assert_eq!(report.elements, 0);

        assert!(read(&dir, "index.html").contains("<h1>Home</h1>"));
        assert!(read(&dir, "blog/index.html").contains(r#"<a href="/blog/post1.html">First</a>"#));
        assert!(read(&dir, "blog/post1.html").contains("<p>Hello</p>"));
        assert_eq!(read(&dir, "blog/cover.jpg"), "jpeg-bytes");
        assert!(!dir.path().join("_site/_drafts").exists());
        assert!(!read(&dir, "index.html").contains("<script"));
    }

    #[test]
    fn test_island_page() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "pages/counter.md",
            "# Counter\n\n{{ client_load(render(\"./_Counter.jsx\", \"start\", 1)) }}\n",
        );
        write(dir.path(), "pages/_Counter.jsx", "export default () => null;");

        // learn the element id from a first build without fragments
        let first = builder(&dir, false, SsrOutput::new());
        first.build().unwrap();
        let html = read(&dir, "counter.html");
        let id = html
            .split("<div id=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap()
            .to_owned();

        let mut fragments = SsrOutput::new();
        fragments.insert(id.clone(), "<button>1</button>".into());
        builder(&dir, false, fragments).build().unwrap();

        let html = read(&dir, "counter.html");
        assert!(html.contains(&format!("<div id=\"{id}\"><button>1</button></div>")));
        assert_eq!(html.matches("<script defer").count(), 1);
        assert!(html.find("<script defer").unwrap() < html.find("</head>").unwrap());

        let assets: Vec<_> = fs::read_dir(dir.path().join("_site/assets"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(assets.len(), 1);
        assert!(html.contains(&format!("/assets/{}", assets[0])));
        assert!(assets[0].starts_with("page-") && assets[0].ends_with("-H4SH.js"));
    }

    #[test]
    fn test_failed_build_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "pages/index.md", "ok\n");
        let builder = builder(&dir, false, SsrOutput::new());
        builder.build().unwrap();

        write(dir.path(), "pages/index.md", "{% broken %}\n");
        assert!(builder.build().is_err());
        assert!(read(&dir, "index.html").contains("<p>ok</p>"));
    }

    #[test]
    fn test_missing_content_root() {
        let dir = TempDir::new().unwrap();
        assert!(builder(&dir, false, SsrOutput::new()).build().is_err());
    }
}
