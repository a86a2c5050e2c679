//! Site configuration management for `melange.toml`.
//!
//! The config file is optional: a project with only a `pages/` directory
//! builds with the defaults.
//!
//! # Sections
//!
//! | Section     | Purpose                                        |
//! |-------------|------------------------------------------------|
//! | `[base]`    | Site metadata exposed to templates as `site`   |
//! | `[build]`   | Paths, framework, layout, Node.js toolchain    |
//! | `[serve]`   | Development server (interface, port)           |
//!
//! # Example
//!
//! ```toml
//! [base]
//! title = "Field Notes"
//!
//! [build]
//! framework = "preact"
//!
//! [serve]
//! port = 8000
//! ```

mod base;
mod build;
pub mod defaults;
mod error;
mod serve;

pub use build::{FrameworkKind, SsrMode};
pub use error::ConfigError;

use base::BaseConfig;
use build::BuildConfig;
use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Root configuration structure representing melange.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute project root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Production posture: hashed asset names, minification, no incremental state
    #[serde(skip)]
    pub production: bool,

    /// Basic site information
    #[serde(default)]
    pub base: BaseConfig,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Read(path.to_path_buf(), err))?;
        Self::from_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Load the config for a CLI invocation.
    ///
    /// A missing config file is not an error; defaults are used.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = normalize_path(cli.cwd.as_deref().unwrap_or(Path::new("./")));
        if !root.is_dir() {
            bail!("project directory `{}` does not exist", root.display());
        }

        let config_path = root.join(&cli.config);
        let config = if config_path.is_file() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };

        let mut config = config.with_root(&root, cli.is_production());
        config.update_with_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Anchor every relative path at `root` and set the build posture.
    pub fn with_root(mut self, root: &Path, production: bool) -> Self {
        self.root = root.to_path_buf();
        self.production = production;
        self.build.content = root.join(&self.build.content);
        self.build.output = root.join(&self.build.output);
        self.build.cache = root.join(&self.build.cache);
        if let Some(layout) = self.build.layout.take() {
            self.build.layout = Some(root.join(layout));
        }
        self
    }

    /// Update configuration with CLI arguments
    fn update_with_cli(&mut self, cli: &Cli) {
        if let Commands::Serve { interface, port } = &cli.command {
            update_option(&mut self.serve.interface, interface.as_ref());
            update_option(&mut self.serve.port, port.as_ref());
        }
    }

    /// Validate paths and commands.
    pub fn validate(&self) -> Result<()> {
        if self.build.node.command.is_empty() {
            bail!(ConfigError::EmptyNodeCommand);
        }

        if !self.build.content.is_dir() {
            bail!(ConfigError::MissingContent(self.build.content.clone()));
        }

        if let Some(layout) = &self.build.layout
            && !layout.is_file()
        {
            bail!(ConfigError::MissingLayout(layout.clone()));
        }

        if self.build.output == self.root || self.build.output == self.build.content {
            bail!(ConfigError::OutputOverlap(self.build.output.clone()));
        }

        Ok(())
    }
}

/// Update config option if CLI value is provided
fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
    if let Some(option) = cli_option {
        *config_option = option.clone();
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}
