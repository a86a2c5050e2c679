//! Development server.
//!
//! Serves the output root with `tiny_http` and rebuilds the whole site
//! before answering any page request, so a browser reload always shows the
//! current state of the content tree.
//!
//! # Architecture
//!
//! ```text
//!  worker 1 ─┐                      ┌─► Mutex<Builder>     single-flight rebuild
//!  worker 2 ─┼─► handle_request() ──┤
//!  worker N ─┘                      ├─► RwLock<()>         write: publish
//!                                   │                      read:  serve a file
//!                                   └─► ArcSwapOption      last good build
//! ```
//!
//! A failed rebuild answers with a 500 page describing the error; the
//! previous output stays in place and the server keeps running.

use crate::{
    build::{BuildReport, Builder},
    config::SiteConfig,
    log,
};
use anyhow::{Context, Result, anyhow};
use arc_swap::ArcSwapOption;
use minijinja::HtmlEscape;
use parking_lot::{Mutex, RwLock};
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
    thread,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Page shown when a rebuild fails.
const ERROR_TEMPLATE: &str = include_str!("embed/serve/error.html");

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

const MAX_WORKERS: usize = 4;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Build once, then serve until Ctrl+C.
///
/// A failing initial build is logged; the next page request retries it.
pub fn serve_site(config: SiteConfig) -> Result<()> {
    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("invalid interface `{}`", config.serve.interface))?;
    let base_port = config.serve.port;

    let state = ServerState::new(Builder::new(config));
    if let Err(err) = state.rebuild() {
        log!("error"; "{err:#}");
    }

    let (server, addr) = try_bind_port(interface, base_port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);
    let workers = thread::available_parallelism().map_or(1, |n| n.get().min(MAX_WORKERS));

    // one unblock per worker blocked in recv()
    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        for _ in 0..workers {
            server_for_signal.unblock();
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                for request in server.incoming_requests() {
                    if let Err(e) = state.handle_request(request) {
                        log!("serve"; "request error: {e:#}");
                    }
                }
            });
        }
    });

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Shared State
// ============================================================================

struct ServerState {
    builder: Mutex<Builder>,
    /// Gates the output tree: publish writes, responses read.
    output: RwLock<()>,
    last_build: ArcSwapOption<BuildReport>,
    root: PathBuf,
}

impl ServerState {
    fn new(builder: Builder) -> Self {
        let root = builder.config().build.output.clone();
        Self {
            builder: Mutex::new(builder),
            output: RwLock::new(()),
            last_build: ArcSwapOption::empty(),
            root,
        }
    }

    /// Rebuild the site; concurrent callers wait for the running build.
    fn rebuild(&self) -> Result<Arc<BuildReport>> {
        let builder = self.builder.lock();
        let (report, staged) = builder.stage()?;
        {
            let _gate = self.output.write();
            staged.publish()?;
        }

        log!("serve"; "rebuilt {} pages in {:.2?}", report.pages, report.duration);
        let report = Arc::new(report);
        self.last_build.store(Some(Arc::clone(&report)));
        Ok(report)
    }

    /// Rebuild if needed, then answer with a file, 404 or the error page.
    fn handle_request(&self, request: Request) -> Result<()> {
        let Some(url_path) = request_path(request.url()) else {
            return respond_status(request, 400, "400 Bad Request");
        };

        if should_rebuild(&url_path)
            && let Err(err) = self.rebuild()
        {
            log!("error"; "{err:#}");
            let page = self.error_page(&err);
            return respond_html(request, 500, page);
        }

        let file = {
            let _gate = self.output.read();
            resolve(&self.root, &url_path)
                .map(|path| fs::read(&path).map(|content| (content, path)))
                .transpose()
        };

        match file.context("Failed to read output file")? {
            Some((content, path)) => {
                let response = Response::from_data(content)
                    .with_header(header("Content-Type", guess_content_type(&path))?);
                request.respond(response)?;
                Ok(())
            }
            None => respond_status(request, 404, "404 Not Found"),
        }
    }

    // `{error}` and friends are template placeholders, not format args
    #[allow(clippy::literal_string_with_formatting_args)]
    fn error_page(&self, err: &anyhow::Error) -> String {
        let last_build = match self.last_build.load_full() {
            Some(report) => format!(
                "Serving the build from {}.",
                report.finished.format("%Y-%m-%d %H:%M:%S")
            ),
            None => "No successful build yet.".to_owned(),
        };

        ERROR_TEMPLATE
            .replace("{error}", &HtmlEscape(&format!("{err:#}")).to_string())
            .replace("{last_build}", &last_build)
            .replace("{version}", env!("CARGO_PKG_VERSION"))
    }
}

// ============================================================================
// Request Handling
// ============================================================================

/// Decoded path of a request URL without query string or fragment.
///
/// `None` when the path tries to leave the output root.
fn request_path(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let decoded = urlencoding::decode(path).ok()?.into_owned();

    let escapes = Path::new(decoded.trim_start_matches('/'))
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return None;
    }
    Some(decoded)
}

/// Page requests trigger a rebuild, asset requests do not.
fn should_rebuild(url_path: &str) -> bool {
    url_path.is_empty() || url_path.ends_with('/') || url_path.ends_with(".html")
}

/// Local file answering `url_path`: the file itself or a directory's
/// `index.html`.
fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    let local = root.join(url_path.trim_matches('/'));
    if local.is_file() {
        return Some(local);
    }
    let index = local.join("index.html");
    (local.is_dir() && index.is_file()).then_some(index)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name, value).map_err(|()| anyhow!("invalid header {name}: {value}"))
}

fn respond_html(request: Request, status: u16, content: String) -> Result<()> {
    let response = Response::from_string(content)
        .with_status_code(StatusCode(status))
        .with_header(header("Content-Type", "text/html; charset=utf-8")?);
    request.respond(response)?;
    Ok(())
}

fn respond_status(request: Request, status: u16, body: &'static str) -> Result<()> {
    let response = Response::new(
        StatusCode(status),
        vec![header("Content-Type", "text/plain")?],
        Cursor::new(body),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("map" | "json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}
