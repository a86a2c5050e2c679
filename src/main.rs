//! melange - a static site generator with server-rendered component islands.

mod build;
mod bundle;
mod cli;
mod compiler;
mod config;
mod logger;
mod serve;
mod site;
mod utils;
mod writer;

use anyhow::Result;
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        log!("error"; "{err:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = SiteConfig::load(cli)?;

    match &cli.command {
        Commands::Build => build_site(config).map(|_| ()),
        Commands::Serve { .. } => serve_site(config),
    }
}
