//! Hydration islands and the per-page element registry.
//!
//! Templates create elements through `render(...)` and upgrade their flags
//! with `client_load` / `client_only`. Each element is printed into the page
//! as a placeholder token; the bundling stage later swaps the token for the
//! server-rendered fragment.

use super::TemplateError;
use crate::utils::hash::short_id;
use minijinja::value::{Object, ObjectRepr, Value};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

/// Prefix of the id inside an element token.
pub const TOKEN_PREFIX: &str = "hydrate_";

/// Serializable component props.
pub type Props = Map<String, JsonValue>;

/// One island on a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    pub id: String,
    /// Component source as written in the template.
    pub src: String,
    /// Import specifier: `src` anchored at the page directory when relative.
    pub module: String,
    pub token: String,
    pub props: Props,
    pub ssr: bool,
    pub csr: bool,
}

impl Element {
    /// HTML printed into the template output.
    ///
    /// Anything rendered on the client gets a mount container carrying the
    /// element id; server-only islands are the bare token.
    pub fn markup(&self) -> String {
        if self.csr {
            format!("<div id=\"{}\">{}</div>", self.id, self.token)
        } else {
            self.token.clone()
        }
    }

    pub fn is_client_only(&self) -> bool {
        self.csr && !self.ssr
    }
}

/// Token for an element id: the id wrapped in an HTML comment.
pub fn token_for(id: &str) -> String {
    format!("<!--{TOKEN_PREFIX}{id}-->")
}

/// Resolve a component source against the page directory.
///
/// `./` and `../` paths are anchored and normalized, anything else (absolute
/// paths, package specifiers) is used as written.
pub fn resolve_module(page_dir: &Path, src: &str) -> String {
    if !(src.starts_with("./") || src.starts_with("../")) {
        return src.to_owned();
    }

    let mut out = PathBuf::new();
    for component in page_dir.join(src).components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other),
        }
    }
    out.to_string_lossy().replace('\\', "/")
}

// ============================================================================
// Registry
// ============================================================================

/// Elements of one page, in template execution order.
///
/// Sealed once phase 1 of its page ends; directive calls after that fail.
#[derive(Debug)]
pub struct ElementRegistry {
    /// Page path relative to the content root, the element id seed.
    page_rel: String,
    page_dir: PathBuf,
    elements: Mutex<Vec<Element>>,
    sealed: AtomicBool,
}

impl ElementRegistry {
    pub fn new(page_rel: impl Into<String>, page_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_rel: page_rel.into(),
            page_dir: page_dir.into(),
            elements: Mutex::new(Vec::new()),
            sealed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), TemplateError> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(TemplateError::Sealed(self.page_rel.clone()));
        }
        Ok(())
    }

    /// Register a new server-rendered element; returns its index.
    pub fn register(&self, src: &str, props: Props) -> Result<usize, TemplateError> {
        self.ensure_open()?;
        let mut elements = self.elements.lock();
        let index = elements.len();
        let id = short_id(format!("{}:{index}", self.page_rel).as_bytes());

        elements.push(Element {
            token: token_for(&id),
            id,
            src: src.to_owned(),
            module: resolve_module(&self.page_dir, src),
            props,
            ssr: true,
            csr: false,
        });
        Ok(index)
    }

    /// Overwrite the flags of element `index`.
    pub fn set_flags(&self, index: usize, ssr: bool, csr: bool) -> Result<(), TemplateError> {
        self.ensure_open()?;
        let mut elements = self.elements.lock();
        let element = elements
            .get_mut(index)
            .ok_or(TemplateError::UnknownElement(index))?;
        element.ssr = ssr;
        element.csr = csr;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Element> {
        self.elements.lock().get(index).cloned()
    }

    /// Seal the registry and take its elements.
    pub fn seal(&self) -> Vec<Element> {
        self.sealed.store(true, Ordering::Release);
        std::mem::take(&mut *self.elements.lock())
    }

    /// Reopen for another execution of the same template.
    pub fn reset(&self) {
        self.elements.lock().clear();
        self.sealed.store(false, Ordering::Release);
    }
}

// ============================================================================
// Template handle
// ============================================================================

/// Template-side reference to a registered element.
///
/// Printing it emits the element markup according to the flags at print time;
/// `id` and `src` are readable attributes.
#[derive(Debug)]
pub struct ElementHandle {
    registry: Arc<ElementRegistry>,
    index: usize,
}

impl ElementHandle {
    pub fn new(registry: Arc<ElementRegistry>, index: usize) -> Self {
        Self { registry, index }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }
}

impl Object for ElementHandle {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let element = self.registry.get(self.index)?;
        match key.as_str()? {
            "id" => Some(Value::from(element.id)),
            "src" => Some(Value::from(element.src)),
            "ssr" => Some(Value::from(element.ssr)),
            "csr" => Some(Value::from(element.csr)),
            _ => None,
        }
    }

    fn render(self: &Arc<Self>, f: &mut fmt::Formatter<'_>) -> fmt::Result
    where
        Self: Sized + 'static,
    {
        match self.registry.get(self.index) {
            Some(element) => f.write_str(&element.markup()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ElementRegistry {
        ElementRegistry::new("blog/post1.md", "/site/pages/blog")
    }

    #[test]
    fn test_register_defaults_to_ssr() {
        let reg = registry();
        let index = reg.register("./Counter.jsx", Props::new()).unwrap();
        let el = reg.get(index).unwrap();

        assert!(el.ssr);
        assert!(!el.csr);
        assert_eq!(el.markup(), el.token);
        assert_eq!(el.token, format!("<!--hydrate_{}-->", el.id));
    }

    #[test]
    fn test_element_ids_follow_page_and_order() {
        let a = registry();
        let b = registry();
        a.register("./A.jsx", Props::new()).unwrap();
        a.register("./B.jsx", Props::new()).unwrap();
        b.register("./Other.jsx", Props::new()).unwrap();
        b.register("./Other.jsx", Props::new()).unwrap();

        let a = a.seal();
        let b = b.seal();
        assert_eq!(a[0].id, b[0].id);
        assert_eq!(a[1].id, b[1].id);
        assert_ne!(a[0].id, a[1].id);

        let other_page = ElementRegistry::new("about.md", "/site/pages");
        other_page.register("./A.jsx", Props::new()).unwrap();
        assert_ne!(other_page.seal()[0].id, a[0].id);
    }

    #[test]
    fn test_csr_markup_has_mount_container() {
        let reg = registry();
        let index = reg.register("./Counter.jsx", Props::new()).unwrap();
        reg.set_flags(index, false, true).unwrap();
        let el = reg.get(index).unwrap();

        assert!(el.is_client_only());
        assert_eq!(el.markup(), format!("<div id=\"{}\">{}</div>", el.id, el.token));
    }

    #[test]
    fn test_sealed_registry_rejects_directives() {
        let reg = registry();
        let index = reg.register("./Counter.jsx", Props::new()).unwrap();
        let sealed = reg.seal();
        assert_eq!(sealed.len(), 1);

        assert!(matches!(
            reg.register("./Late.jsx", Props::new()),
            Err(TemplateError::Sealed(_))
        ));
        assert!(reg.set_flags(index, true, true).is_err());

        reg.reset();
        assert!(reg.register("./Again.jsx", Props::new()).is_ok());
    }

    #[test]
    fn test_resolve_module() {
        let dir = Path::new("/site/pages/blog");
        assert_eq!(resolve_module(dir, "./Counter.jsx"), "/site/pages/blog/Counter.jsx");
        assert_eq!(
            resolve_module(dir, "../components/Nav.tsx"),
            "/site/pages/components/Nav.tsx"
        );
        assert_eq!(resolve_module(dir, "/abs/Comp.jsx"), "/abs/Comp.jsx");
        assert_eq!(resolve_module(dir, "my-widgets/Chart"), "my-widgets/Chart");
    }

    #[test]
    fn test_handle_attributes_and_render() {
        let reg = Arc::new(registry());
        let index = reg.register("./Counter.jsx", Props::new()).unwrap();
        let handle = Value::from_object(ElementHandle::new(reg.clone(), index));

        let id = reg.get(index).unwrap().id;
        assert_eq!(handle.get_attr("id").unwrap().as_str(), Some(id.as_str()));
        assert_eq!(handle.get_attr("src").unwrap().as_str(), Some("./Counter.jsx"));
        assert_eq!(handle.to_string(), token_for(&id));

        reg.set_flags(index, true, true).unwrap();
        assert!(handle.to_string().starts_with("<div id="));
    }
}
