//! Site output.
//!
//! The build is written into a staging directory beside the output root and
//! swapped into place once everything is on disk, so a failed build never
//! leaves a half-written site behind.
//!
//! ```text
//! _site/                 previous output, served until publish
//! ._site.staging/        this build
//!     │ publish()
//!     ▼
//! ._site.old/ ──► removed
//! ```

use crate::log;
use crate::site::Site;
use crate::utils::minify::minify_html;
use anyhow::{Context, Result};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

/// Sibling of `output` named `.<name>.<suffix>`.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(output.file_name().unwrap_or_default());
    name.push(".");
    name.push(suffix);
    output.with_file_name(name)
}

fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// A fully written, not yet published build.
///
/// Dropping it without [`publish`](Self::publish) discards the staged tree.
#[derive(Debug)]
pub struct StagedOutput {
    staging: PathBuf,
    output: PathBuf,
    published: bool,
}

impl StagedOutput {
    #[cfg(test)]
    fn path(&self) -> &Path {
        &self.staging
    }

    /// Swap the staged tree in place of the output root.
    pub fn publish(mut self) -> Result<()> {
        let old = sibling(&self.output, "old");
        remove_dir_if_exists(&old)?;

        if self.output.exists() {
            fs::rename(&self.output, &old).with_context(|| {
                format!("Failed to move aside {}", self.output.display())
            })?;
        }
        if let Err(err) = fs::rename(&self.staging, &self.output) {
            // put the previous output back
            let _ = fs::rename(&old, &self.output);
            return Err(err).with_context(|| format!("Failed to publish {}", self.output.display()));
        }
        self.published = true;

        remove_dir_if_exists(&old)
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.published {
            let _ = fs::remove_dir_all(&self.staging);
        }
    }
}

/// Write every directory, page, asset and bundle output of `site` into a
/// fresh staging tree.
pub fn write_site(site: &Site, minify: bool) -> Result<StagedOutput> {
    let staging = sibling(&site.output, "staging");
    remove_dir_if_exists(&staging)?;

    // guard from here on so a failure cleans up
    let staged = StagedOutput {
        staging: staging.clone(),
        output: site.output.clone(),
        published: false,
    };

    fs::create_dir_all(&staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;

    let bundle_dirs = site.bundled.iter().filter_map(|o| o.rel.parent());
    for dir in site.directories.iter().map(PathBuf::as_path).chain(bundle_dirs) {
        let path = staging.join(dir);
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    let minify = minify && site.production;
    for page in site.pages.values() {
        let path = staging.join(page.output_rel());
        fs::write(&path, minify_html(&page.contents, minify))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    for asset in &site.assets {
        let path = staging.join(&asset.rel);
        fs::copy(&asset.source, &path).with_context(|| {
            format!("Failed to copy {} to {}", asset.source.display(), path.display())
        })?;
    }

    for output in &site.bundled {
        let path = staging.join(&output.rel);
        fs::write(&path, &output.contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    log!("write"; "{} pages, {} assets, {} bundle files",
        site.pages.len(), site.assets.len(), site.bundled.len());
    Ok(staged)
}
