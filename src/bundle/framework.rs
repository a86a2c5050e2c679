//! UI framework descriptors.
//!
//! A framework knows how to render a component to a string on the server
//! and how to hydrate or mount it in the browser. Everything else about the
//! framework is left to the bundler.

use crate::compiler::element::Element;
use crate::config::FrameworkKind;
use std::fmt::Write;

pub trait Framework: Send + Sync {
    fn name(&self) -> &'static str;

    /// Packages left external in the server bundle.
    fn static_external(&self) -> &'static [&'static str];

    /// Import source of the automatic JSX runtime.
    fn jsx_import_source(&self) -> &'static str;

    /// CommonJS entry rendering every element to a string.
    ///
    /// The script exports the `id → html` map and prints it as JSON when run
    /// as the main module.
    fn static_bundle(&self, elements: &[&Element]) -> String;

    /// Browser entry for one page: hydrates server-rendered elements and
    /// mounts client-only ones.
    fn client_bundle(&self, elements: &[&Element]) -> String;
}

/// Descriptor for a configured framework.
pub fn framework_for(kind: FrameworkKind) -> &'static dyn Framework {
    match kind {
        FrameworkKind::Preact => &Preact,
        FrameworkKind::React => &React,
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn props(element: &Element) -> String {
    serde_json::Value::Object(element.props.clone()).to_string()
}

fn component(element: &Element) -> String {
    format!("C_{}", element.id)
}

/// Shared shape of the server entry; `render` builds the expression
/// producing a string for one element.
fn static_entry(prelude: &str, elements: &[&Element], render: impl Fn(&str, &str) -> String) -> String {
    let mut out = String::from(prelude);
    out.push_str("const elements = {};\n");
    for el in elements {
        let c = component(el);
        let _ = writeln!(out, "const {c} = require({}).default;", quote(&el.module));
        let _ = writeln!(out, "elements[{}] = {};", quote(&el.id), render(&c, &props(el)));
    }
    out.push_str("module.exports = elements;\n");
    out.push_str("if (require.main === module) process.stdout.write(JSON.stringify(elements));\n");
    out
}

/// Shared shape of the client entry.
fn client_entry(
    prelude: &str,
    elements: &[&Element],
    hydrate: impl Fn(&str, &str, &str) -> String,
    mount: impl Fn(&str, &str, &str) -> String,
) -> String {
    let mut out = String::from(prelude);
    for el in elements.iter().filter(|el| el.csr) {
        let _ = writeln!(out, "import {} from {};", component(el), quote(&el.src));
    }
    for el in elements.iter().filter(|el| el.csr) {
        let target = format!("document.getElementById({})", quote(&el.id));
        let line = if el.ssr {
            hydrate(&component(el), &props(el), &target)
        } else {
            mount(&component(el), &props(el), &target)
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

// ============================================================================
// Preact
// ============================================================================

pub struct Preact;

impl Framework for Preact {
    fn name(&self) -> &'static str {
        "preact"
    }

    fn static_external(&self) -> &'static [&'static str] {
        &["preact", "preact/*", "preact-render-to-string"]
    }

    fn jsx_import_source(&self) -> &'static str {
        "preact"
    }

    fn static_bundle(&self, elements: &[&Element]) -> String {
        static_entry(
            "const { h } = require(\"preact\");\nconst { render } = require(\"preact-render-to-string\");\n",
            elements,
            |c, props| format!("render(h({c}, {props}))"),
        )
    }

    fn client_bundle(&self, elements: &[&Element]) -> String {
        client_entry(
            "import { h, hydrate, render } from \"preact\";\n",
            elements,
            |c, props, target| format!("hydrate(h({c}, {props}), {target});"),
            |c, props, target| format!("render(h({c}, {props}), {target});"),
        )
    }
}

// ============================================================================
// React
// ============================================================================

pub struct React;

impl Framework for React {
    fn name(&self) -> &'static str {
        "react"
    }

    fn static_external(&self) -> &'static [&'static str] {
        &["react", "react/*", "react-dom", "react-dom/*"]
    }

    fn jsx_import_source(&self) -> &'static str {
        "react"
    }

    fn static_bundle(&self, elements: &[&Element]) -> String {
        static_entry(
            "const { createElement } = require(\"react\");\nconst { renderToString } = require(\"react-dom/server\");\n",
            elements,
            |c, props| format!("renderToString(createElement({c}, {props}))"),
        )
    }

    fn client_bundle(&self, elements: &[&Element]) -> String {
        client_entry(
            "import { createElement } from \"react\";\nimport { createRoot, hydrateRoot } from \"react-dom/client\";\n",
            elements,
            |c, props, target| format!("hydrateRoot({target}, createElement({c}, {props}));"),
            |c, props, target| format!("createRoot({target}).render(createElement({c}, {props}));"),
        )
    }
}
