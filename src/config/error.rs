//! Configuration errors.
//!
//! Everything that stops a project from being built before the first page
//! is touched: an unreadable or malformed `melange.toml`, and paths or
//! commands that cannot work.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{0}`")]
    Read(PathBuf, #[source] std::io::Error),

    /// Unknown fields and bad enum values (`framework`, `ssr`) end up here.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("content directory `{0}` not found")]
    MissingContent(PathBuf),

    #[error("[build.layout] `{0}` is not a file")]
    MissingLayout(PathBuf),

    #[error("[build.node.command] must name a program")]
    EmptyNodeCommand,

    #[error("[build.output] `{0}` must not be the project or content directory")]
    OutputOverlap(PathBuf),
}
