//! `[build]` section configuration.
//!
//! Paths of the build pipeline, the component framework, and the Node.js
//! toolchain used for bundling and server rendering.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Enums
// ============================================================================

/// Component framework the islands are written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameworkKind {
    /// `preact` + `preact-render-to-string` (default).
    #[default]
    Preact,
    /// `react` + `react-dom`.
    React,
}

/// How the compiled static bundle is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SsrMode {
    /// Spawn `node <script>` once per build and read stdout (default).
    #[default]
    Process,
    /// Send the script to the long-lived Node host.
    Host,
}

// ============================================================================
// BuildConfig
// ============================================================================

/// `[build]` section in melange.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// content = "pages"
/// output = "_site"
/// framework = "preact"
/// layout = "layout.html"
///
/// [build.node]
/// command = ["node"]
/// ssr = "process"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Content root (documents, components and static files).
    #[serde(default = "defaults::build::content")]
    #[educe(Default = defaults::build::content())]
    pub content: PathBuf,

    /// Output root.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Scratch directory for the compiled static bundle and the Node host.
    ///
    /// Lives under `node_modules` so the compiled script resolves the
    /// project's framework packages.
    #[serde(default = "defaults::build::cache")]
    #[educe(Default = defaults::build::cache())]
    pub cache: PathBuf,

    /// Component framework.
    #[serde(default)]
    pub framework: FrameworkKind,

    /// Custom layout template; the embedded layout is used when unset.
    #[serde(default = "defaults::build::layout")]
    #[educe(Default = defaults::build::layout())]
    pub layout: Option<PathBuf>,

    /// Minify page HTML in production builds.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub minify: bool,

    /// Node.js toolchain settings.
    #[serde(default)]
    pub node: NodeConfig,
}

/// `[build.node]` section.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Command used to start Node.js, e.g. `["node"]` or `["bun"]`.
    #[serde(default = "defaults::build::node::command")]
    #[educe(Default = defaults::build::node::command())]
    pub command: Vec<String>,

    /// Static bundle execution strategy.
    #[serde(default)]
    pub ssr: SsrMode,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.build.content, PathBuf::from("pages"));
        assert_eq!(config.build.output, PathBuf::from("_site"));
        assert_eq!(
            config.build.cache,
            PathBuf::from("node_modules/.cache/melange")
        );
        assert_eq!(config.build.framework, FrameworkKind::Preact);
        assert!(config.build.layout.is_none());
        assert!(config.build.minify);
        assert_eq!(config.build.node.command, vec!["node".to_string()]);
        assert_eq!(config.build.node.ssr, SsrMode::Process);
    }

    #[test]
    fn test_build_config_full() {
        let config = r#"
            [build]
            content = "docs"
            output = "dist"
            framework = "react"
            layout = "theme/layout.html"
            minify = false

            [build.node]
            command = ["bun", "run"]
            ssr = "host"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.build.content, PathBuf::from("docs"));
        assert_eq!(config.build.output, PathBuf::from("dist"));
        assert_eq!(config.build.framework, FrameworkKind::React);
        assert_eq!(
            config.build.layout,
            Some(PathBuf::from("theme/layout.html"))
        );
        assert!(!config.build.minify);
        assert_eq!(config.build.node.command, vec!["bun", "run"]);
        assert_eq!(config.build.node.ssr, SsrMode::Host);
    }

    #[test]
    fn test_unknown_framework_rejected() {
        let config = r#"
            [build]
            framework = "svelte"
        "#;
        assert!(toml::from_str::<SiteConfig>(config).is_err());
    }

    #[test]
    fn test_unknown_node_field_rejected() {
        let config = r#"
            [build.node]
            version = "20"
        "#;
        assert!(toml::from_str::<SiteConfig>(config).is_err());
    }
}
