//! Content tree crawler.
//!
//! Walks the content root depth-first in file name order and classifies
//! every entry: directories are recorded for the writer, `*.md` documents
//! become pages, everything else becomes a verbatim asset.

use super::{Asset, DOCUMENT_EXT, Page, Site};
use crate::log;
use anyhow::{Context, Result, bail};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

/// Whether an entry is hidden from the build (`_drafts`, `.git`, ...).
fn is_hidden(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// The content root itself is never hidden, whatever its name.
fn is_visible(entry: &DirEntry) -> bool {
    entry.depth() == 0 || !is_hidden(&entry.file_name().to_string_lossy())
}

fn is_document(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == DOCUMENT_EXT)
}

/// Crawl `site.content` and populate directories, pages and assets.
///
/// Any I/O error aborts the crawl.
pub fn crawl_site(site: &mut Site) -> Result<()> {
    let content = site.content.clone();
    let walker = WalkDir::new(&content)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(is_visible);

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to crawl {}", content.display()))?;
        if entry.depth() == 0 {
            continue;
        }

        let path = entry.path();
        let rel = path
            .strip_prefix(&content)
            .with_context(|| format!("{} is outside the content root", path.display()))?
            .to_path_buf();
        // walk depth counts the root as 0, page depth starts at its children
        let dir_depth = entry.depth() as i32 - 1;

        if entry.file_type().is_dir() {
            site.directories.push(rel);
        } else if is_document(path) {
            add_page(site, Page::new(path.to_path_buf(), rel, dir_depth))?;
        } else {
            site.assets.push(Asset {
                source: path.to_path_buf(),
                rel,
            });
        }
    }

    log!("crawl"; "{} pages, {} assets, {} directories",
        site.pages.len(), site.assets.len(), site.directories.len());
    Ok(())
}

fn add_page(site: &mut Site, page: Page) -> Result<()> {
    if let Some(existing) = site.pages.get(&page.id) {
        bail!(
            "page id collision: {} and {} both hash to {}",
            existing.path.display(),
            page.path.display(),
            page.id
        );
    }
    site.pages.insert(page.id.clone(), page);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use std::{fs, path::PathBuf};
    use tempfile::TempDir;

    fn site_for(dir: &TempDir) -> Site {
        let mut site = Site::new(&SiteConfig::default());
        site.root = dir.path().to_path_buf();
        site.content = dir.path().join("pages");
        site
    }

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join("pages").join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_classifies_entries() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.md", "# Home");
        touch(dir.path(), "blog/index.md", "# Blog");
        touch(dir.path(), "blog/post1.md", "# Post");
        touch(dir.path(), "img/logo.png", "png");
        touch(dir.path(), "robots.txt", "User-agent: *");

        let mut site = site_for(&dir);
        crawl_site(&mut site).unwrap();

        assert_eq!(site.pages.len(), 3);
        assert_eq!(site.directories, vec![PathBuf::from("blog"), PathBuf::from("img")]);

        let mut assets: Vec<_> = site.assets.iter().map(|a| a.rel.clone()).collect();
        assets.sort();
        assert_eq!(
            assets,
            vec![PathBuf::from("img/logo.png"), PathBuf::from("robots.txt")]
        );
    }

    #[test]
    fn test_depths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.md", "");
        touch(dir.path(), "blog/index.md", "");
        touch(dir.path(), "blog/post1.md", "");
        touch(dir.path(), "blog/2024/recap.md", "");

        let mut site = site_for(&dir);
        crawl_site(&mut site).unwrap();

        let depth = |rel: &str| {
            site.pages
                .values()
                .find(|p| p.rel_display() == rel)
                .map(|p| p.depth)
                .unwrap()
        };
        assert_eq!(depth("index.md"), -1);
        assert_eq!(depth("blog/index.md"), 0);
        assert_eq!(depth("blog/post1.md"), 1);
        assert_eq!(depth("blog/2024/recap.md"), 2);
    }

    #[test]
    fn test_skips_hidden_entries() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.md", "");
        touch(dir.path(), "_drafts/wip.md", "");
        touch(dir.path(), ".secret", "");
        touch(dir.path(), "_partial.md", "");
        touch(dir.path(), "blog/.DS_Store", "");

        let mut site = site_for(&dir);
        crawl_site(&mut site).unwrap();

        assert_eq!(site.pages.len(), 1);
        assert!(site.assets.is_empty());
        assert_eq!(site.directories, vec![PathBuf::from("blog")]);
    }

    #[test]
    fn test_page_ids_follow_absolute_path() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.md", "");
        touch(dir.path(), "b.md", "");

        let mut first = site_for(&dir);
        crawl_site(&mut first).unwrap();
        let mut second = site_for(&dir);
        crawl_site(&mut second).unwrap();

        let ids: Vec<_> = first.pages.keys().cloned().collect();
        assert_eq!(ids, second.pages.keys().cloned().collect::<Vec<_>>());
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_directories_in_depth_first_order() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "b/x/file.txt", "");
        touch(dir.path(), "a/file.txt", "");
        touch(dir.path(), "b/file.txt", "");

        let mut site = site_for(&dir);
        crawl_site(&mut site).unwrap();

        assert_eq!(
            site.directories,
            vec![
                PathBuf::from("a"),
                PathBuf::from("b"),
                PathBuf::from("b/x"),
            ]
        );
    }

    #[test]
    fn test_missing_content_root_is_error() {
        let dir = TempDir::new().unwrap();
        let mut site = site_for(&dir);
        assert!(crawl_site(&mut site).is_err());
    }

    #[test]
    fn test_page_id_collision_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut site = site_for(&dir);
        let path = dir.path().join("pages/a.md");

        add_page(&mut site, Page::new(path.clone(), "a.md".into(), 0)).unwrap();
        let err = add_page(&mut site, Page::new(path, "copy/a.md".into(), 1)).unwrap_err();

        assert!(format!("{err}").contains("page id collision"));
        assert_eq!(site.pages.len(), 1);
    }

    #[test]
    fn test_underscore_content_root_is_walked() {
        let dir = TempDir::new().unwrap();
        let mut site = site_for(&dir);
        site.content = dir.path().join("_content");
        fs::create_dir_all(&site.content).unwrap();
        fs::write(site.content.join("index.md"), "").unwrap();

        crawl_site(&mut site).unwrap();
        assert_eq!(site.pages.len(), 1);
    }
}
