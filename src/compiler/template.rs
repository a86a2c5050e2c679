//! MiniJinja environments for pages and the layout.
//!
//! Every page gets its own environment: the directive functions close over
//! the page's element registry and directory, so the registry a template
//! writes into is fixed at parse time. All environments share one
//! [`PageIndex`] that the renderer updates as pages finish.

use super::TemplateError;
use super::element::{Element, ElementHandle, ElementRegistry, Props};
use crate::site::{Page, PageView, Site};
use minijinja::{
    AutoEscape, Environment, Error, ErrorKind,
    value::{Rest, Value},
};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Default site layout.
pub const DEFAULT_LAYOUT: &str = include_str!("../embed/layout.html");

/// Default stylesheet, exposed to templates as `default_styles`.
pub const DEFAULT_STYLES: &str = include_str!("../embed/theme.css");

const LAYOUT_NAME: &str = "layout";

/// Base environment shared by pages and the layout.
fn environment() -> Environment<'static> {
    let mut env = Environment::new();
    // page bodies carry raw markup and tokens
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_keep_trailing_newline(true);
    env
}

// ============================================================================
// Page index
// ============================================================================

#[derive(Debug, Clone)]
struct IndexEntry {
    dir: PathBuf,
    is_index: bool,
    view: PageView,
}

/// Site-wide listing behind `pages()`, keyed by relative path.
#[derive(Debug, Default)]
pub struct PageIndex {
    entries: BTreeMap<PathBuf, IndexEntry>,
}

pub type SharedIndex = Arc<RwLock<PageIndex>>;

impl PageIndex {
    /// Seed the index with the provisional view of every crawled page.
    pub fn from_site(site: &Site) -> Self {
        let mut index = Self::default();
        for page in site.pages.values() {
            index.publish(page);
        }
        index
    }

    /// Insert or replace the view of `page`.
    pub fn publish(&mut self, page: &Page) {
        self.entries.insert(
            page.rel.clone(),
            IndexEntry {
                dir: page.dir.clone(),
                is_index: page.is_index(),
                view: page.view(),
            },
        );
    }

    /// Pages listed for a page living in `dir`: the non-index documents of
    /// `dir` and the index documents of its immediate subdirectories.
    pub fn list(&self, dir: &Path) -> Vec<PageView> {
        self.entries
            .values()
            .filter(|e| {
                if e.is_index {
                    e.dir.parent() == Some(dir)
                } else {
                    e.dir == dir
                }
            })
            .map(|e| e.view.clone())
            .collect()
    }
}

// ============================================================================
// Page templates
// ============================================================================

/// A parsed page template bound to its element registry.
pub struct PageTemplate {
    name: String,
    env: Environment<'static>,
    registry: Arc<ElementRegistry>,
}

impl PageTemplate {
    /// Parse `source` as the template of `page`.
    pub fn parse(page: &Page, source: String, index: SharedIndex) -> Result<Self, TemplateError> {
        let name = page.rel_display();
        let registry = Arc::new(ElementRegistry::new(name.clone(), page.dir.clone()));

        let mut env = environment();
        register_directives(&mut env, &registry, index, page.dir.clone());
        env.add_template_owned(name.clone(), source)
            .map_err(|source| TemplateError::Parse {
                page: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            env,
            registry,
        })
    }

    /// Execute the template; returns the output and the sealed element list.
    pub fn execute(&self, ctx: Value) -> Result<(String, Vec<Element>), TemplateError> {
        self.registry.reset();
        let result = self
            .env
            .get_template(&self.name)
            .and_then(|tmpl| tmpl.render(ctx));
        let elements = self.registry.seal();

        let output = result.map_err(|source| TemplateError::Render {
            page: self.name.clone(),
            source,
        })?;
        Ok((output, elements))
    }
}

fn register_directives(
    env: &mut Environment<'static>,
    registry: &Arc<ElementRegistry>,
    index: SharedIndex,
    dir: PathBuf,
) {
    let reg = Arc::clone(registry);
    env.add_function(
        "render",
        move |src: String, args: Rest<Value>| -> Result<Value, Error> {
            let props = parse_props(&args)?;
            let index = reg.register(&src, props)?;
            Ok(Value::from_object(ElementHandle::new(Arc::clone(&reg), index)))
        },
    );
    env.add_function("client_load", |handle: Value| -> Result<Value, Error> {
        set_flags(&handle, true, true)?;
        Ok(handle)
    });
    env.add_function("client_only", |handle: Value| -> Result<Value, Error> {
        set_flags(&handle, false, true)?;
        Ok(handle)
    });
    env.add_function("pages", move || Value::from_serialize(index.read().list(&dir)));
}

fn set_flags(handle: &Value, ssr: bool, csr: bool) -> Result<(), Error> {
    let handle = handle.downcast_object_ref::<ElementHandle>().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            "expected an element returned by render()",
        )
    })?;
    handle.registry().set_flags(handle.index(), ssr, csr)?;
    Ok(())
}

/// Build props from alternating key/value arguments.
fn parse_props(args: &[Value]) -> Result<Props, TemplateError> {
    if args.len() % 2 != 0 {
        return Err(TemplateError::Props(format!(
            "expected key/value pairs, got {} arguments",
            args.len()
        )));
    }

    let mut props = Props::new();
    for pair in args.chunks(2) {
        let key = pair[0]
            .as_str()
            .ok_or_else(|| TemplateError::Props(format!("prop name `{}` is not a string", pair[0])))?;
        let value = serde_json::to_value(&pair[1])
            .map_err(|err| TemplateError::Props(format!("prop `{key}`: {err}")))?;
        props.insert(key.to_owned(), value);
    }
    Ok(props)
}

// ============================================================================
// Layout
// ============================================================================

/// The site layout wrapped around every page body.
pub struct Layout {
    env: Environment<'static>,
}

impl Layout {
    /// Parse a layout template; `None` selects the embedded default.
    pub fn parse(source: Option<String>) -> Result<Self, TemplateError> {
        let mut env = environment();
        let source = source.unwrap_or_else(|| DEFAULT_LAYOUT.to_owned());
        env.add_template_owned(LAYOUT_NAME, source)
            .map_err(|source| TemplateError::Parse {
                page: LAYOUT_NAME.into(),
                source,
            })?;
        Ok(Self { env })
    }

    pub fn render(&self, page: &str, ctx: Value) -> Result<String, TemplateError> {
        self.env
            .get_template(LAYOUT_NAME)
            .and_then(|tmpl| tmpl.render(ctx))
            .map_err(|source| TemplateError::Render {
                page: page.to_owned(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use minijinja::context;

    fn page(rel: &str, dir_depth: i32) -> Page {
        Page::new(PathBuf::from("/site/pages").join(rel), rel.into(), dir_depth)
    }

    fn site_with(pages: &[(&str, i32)]) -> Site {
        let mut site = Site::new(&SiteConfig::default());
        for (rel, depth) in pages {
            let p = page(rel, *depth);
            site.pages.insert(p.id.clone(), p);
        }
        site
    }

    fn execute(source: &str) -> (String, Vec<Element>) {
        let p = page("blog/post1.md", 1);
        let index = Arc::new(RwLock::new(PageIndex::default()));
        let tmpl = PageTemplate::parse(&p, source.to_owned(), index).unwrap();
        tmpl.execute(context! {}).unwrap()
    }

    #[test]
    fn test_render_prints_bare_token() {
        let (out, elements) = execute(r#"before {{ render("./Counter.jsx") }} after"#);

        assert_eq!(elements.len(), 1);
        assert!(elements[0].ssr && !elements[0].csr);
        assert_eq!(out, format!("before {} after", elements[0].token));
    }

    #[test]
    fn test_client_load_wraps_in_container() {
        let (out, elements) =
            execute(r#"{{ client_load(render("./Counter.jsx", "count", 3, "label", "Clicks")) }}"#);

        let el = &elements[0];
        assert!(el.ssr && el.csr);
        assert_eq!(out, format!("<div id=\"{}\">{}</div>", el.id, el.token));
        assert_eq!(el.props["count"], serde_json::json!(3));
        assert_eq!(el.props["label"], serde_json::json!("Clicks"));
        assert_eq!(el.module, "/site/pages/blog/Counter.jsx");
    }

    #[test]
    fn test_client_only() {
        let (_, elements) = execute(r#"{{ client_only(render("./Map.jsx")) }}"#);
        assert!(!elements[0].ssr && elements[0].csr);
    }

    #[test]
    fn test_handle_attributes() {
        let (out, elements) = execute(r#"{% set el = render("./A.jsx") %}{{ el.id }}|{{ el.src }}"#);
        assert_eq!(out, format!("{}|./A.jsx", elements[0].id));
    }

    #[test]
    fn test_odd_props_is_error() {
        let p = page("about.md", 0);
        let index = Arc::new(RwLock::new(PageIndex::default()));
        let tmpl =
            PageTemplate::parse(&p, r#"{{ render("./A.jsx", "only") }}"#.into(), index).unwrap();
        assert!(matches!(
            tmpl.execute(context! {}),
            Err(TemplateError::Render { .. })
        ));
    }

    #[test]
    fn test_non_string_prop_key_is_error() {
        let p = page("about.md", 0);
        let index = Arc::new(RwLock::new(PageIndex::default()));
        let tmpl = PageTemplate::parse(&p, r#"{{ render("./A.jsx", 1, 2) }}"#.into(), index).unwrap();
        assert!(tmpl.execute(context! {}).is_err());
    }

    #[test]
    fn test_client_load_requires_handle() {
        let p = page("about.md", 0);
        let index = Arc::new(RwLock::new(PageIndex::default()));
        let tmpl = PageTemplate::parse(&p, r#"{{ client_load("x") }}"#.into(), index).unwrap();
        assert!(tmpl.execute(context! {}).is_err());
    }

    #[test]
    fn test_parse_error() {
        let p = page("about.md", 0);
        let index = Arc::new(RwLock::new(PageIndex::default()));
        let err = PageTemplate::parse(&p, "{% if %}".into(), index).err().unwrap();
        assert!(matches!(err, TemplateError::Parse { ref page, .. } if page == "about.md"));
    }

    #[test]
    fn test_reexecution_restarts_registry() {
        let p = page("about.md", 0);
        let index = Arc::new(RwLock::new(PageIndex::default()));
        let tmpl = PageTemplate::parse(&p, r#"{{ render("./A.jsx") }}"#.into(), index).unwrap();

        let (_, first) = tmpl.execute(context! {}).unwrap();
        let (_, second) = tmpl.execute(context! {}).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_index_lists_siblings_and_child_indexes() {
        let site = site_with(&[
            ("index.md", 0),
            ("about.md", 0),
            ("blog/index.md", 1),
            ("blog/post1.md", 1),
            ("blog/2024/index.md", 2),
            ("blog/2024/recap.md", 2),
        ]);
        let index = PageIndex::from_site(&site);

        let root: Vec<_> = index
            .list(Path::new("/site/pages"))
            .into_iter()
            .map(|v| v.path)
            .collect();
        assert_eq!(root, vec!["about.md", "blog/index.md"]);

        let blog: Vec<_> = index
            .list(Path::new("/site/pages/blog"))
            .into_iter()
            .map(|v| v.path)
            .collect();
        assert_eq!(blog, vec!["blog/2024/index.md", "blog/post1.md"]);
    }

    #[test]
    fn test_pages_function_sees_published_views() {
        let site = site_with(&[("blog/index.md", 1), ("blog/post1.md", 1)]);
        let index = Arc::new(RwLock::new(PageIndex::from_site(&site)));

        let mut post = site
            .pages
            .values()
            .find(|p| p.name == "post1.md")
            .unwrap()
            .clone();
        post.url = post.public_url();
        post.data.insert("title".into(), "First".into());
        index.write().publish(&post);

        let blog_index = page("blog/index.md", 1);
        let tmpl = PageTemplate::parse(
            &blog_index,
            "{% for p in pages() %}{{ p.url }}:{{ p.data.title }}{% endfor %}".into(),
            index,
        )
        .unwrap();
        let (out, _) = tmpl.execute(context! {}).unwrap();
        assert_eq!(out, "/blog/post1.html:First");
    }

    #[test]
    fn test_default_layout_renders() {
        let layout = Layout::parse(None).unwrap();
        let p = page("about.md", 0);
        let mut view = p.view();
        view.contents = "<p>hello</p>".into();
        let out = layout
            .render(
                "about.md",
                context! { page => view, site => context! { title => "Site" }, default_styles => DEFAULT_STYLES },
            )
            .unwrap();
        assert!(out.contains("<p>hello</p>"));
        assert!(out.contains("</head>"));
    }
}
