//! Utility modules for the static site generator.

pub mod exec;
pub mod hash;
pub mod minify;
