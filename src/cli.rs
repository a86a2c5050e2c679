//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// melange static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project directory to build (defaults to the current directory)
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Config file name, relative to the project directory
    #[arg(short = 'C', long, global = true, default_value = "melange.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build the site once with production settings
    Build,

    /// Serve the site and rebuild it on every page request
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
}

impl Cli {
    /// Builds are production builds, the dev server is not.
    pub const fn is_production(&self) -> bool {
        matches!(self.command, Commands::Build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from(["melange", "build"]).unwrap();
        assert!(cli.is_production());
        assert!(cli.cwd.is_none());
        assert_eq!(cli.config, PathBuf::from("melange.toml"));
    }

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "melange", "--cwd", "site", "serve", "--port", "3000", "-i", "0.0.0.0",
        ])
        .unwrap();

        assert!(!cli.is_production());
        assert_eq!(cli.cwd, Some(PathBuf::from("site")));
        match cli.command {
            Commands::Serve { interface, port } => {
                assert_eq!(interface.as_deref(), Some("0.0.0.0"));
                assert_eq!(port, Some(3000));
            }
            Commands::Build => panic!("expected serve"),
        }
    }

    #[test]
    fn test_cwd_after_subcommand() {
        let cli = Cli::try_parse_from(["melange", "build", "--cwd", "/tmp/site"]).unwrap();
        assert_eq!(cli.cwd, Some(PathBuf::from("/tmp/site")));
    }
}
