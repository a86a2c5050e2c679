//! The bundler contract and its esbuild implementation.
//!
//! A [`BundleRequest`] names entry points (stdin source, or virtual ids
//! answered by a [`VirtualResolver`]) and how to compile them. The
//! answer is every output file with the entry it belongs to, so callers can
//! attribute outputs without guessing from file names.

use super::host::NodeHost;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Where bundled code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Node,
    Browser,
}

/// Module format of the outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Cjs,
    Iife,
}

/// Posture-dependent compile switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BundleMode {
    pub minify: bool,
    /// Keep incremental state between requests with the same key.
    pub incremental: bool,
    /// Append a content hash to output names.
    pub content_hash: bool,
}

impl BundleMode {
    pub const fn production() -> Self {
        Self {
            minify: true,
            incremental: false,
            content_hash: true,
        }
    }

    pub const fn development() -> Self {
        Self {
            minify: false,
            incremental: true,
            content_hash: false,
        }
    }

    pub const fn for_posture(production: bool) -> Self {
        if production {
            Self::production()
        } else {
            Self::development()
        }
    }

    pub const fn entry_names(&self) -> &'static str {
        if self.content_hash { "[name]-[hash]" } else { "[name]" }
    }
}

/// Source of a synthesized module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualModule {
    pub contents: String,
    /// Directory imports inside `contents` resolve against.
    pub resolve_dir: PathBuf,
}

/// Answers virtual module ids with their source.
pub trait VirtualResolver {
    fn resolve(&self, id: &str) -> Option<VirtualModule>;
}

/// One entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A virtual id, emitted as `name`.
    Virtual { name: String, id: String },
    /// Source passed directly; only valid with [`Output::File`].
    Stdin {
        contents: String,
        resolve_dir: PathBuf,
        sourcefile: String,
    },
}

/// Where outputs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    File(PathBuf),
    Dir(PathBuf),
}

#[derive(Clone)]
pub struct BundleRequest<'a> {
    /// Identifies the request across builds for incremental state.
    pub key: &'a str,
    pub working_dir: &'a Path,
    pub entries: Vec<Entry>,
    pub resolver: Option<&'a dyn VirtualResolver>,
    pub mode: BundleMode,
    pub platform: Platform,
    pub format: Format,
    pub externals: Vec<String>,
    pub jsx_import_source: &'a str,
    pub output: Output,
}

/// A compiled file. Nothing is written by the bundler itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFile {
    pub path: PathBuf,
    #[serde(rename = "text")]
    pub contents: String,
    /// Entry this output belongs to (virtual ids without namespace).
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub text: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BundleResult {
    pub outputs: Vec<OutputFile>,
    #[serde(default)]
    pub errors: Vec<Message>,
    #[serde(default)]
    pub warnings: Vec<Message>,
}

impl BundleResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A JS bundler.
pub trait Bundler {
    /// Compile one request. Compile errors are reported in the result;
    /// `Err` means the bundler itself could not run.
    fn bundle(&self, request: &BundleRequest<'_>) -> anyhow::Result<BundleResult>;
}

// ============================================================================
// esbuild over the Node host
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry<'a> {
    name: &'a str,
    path: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireStdin<'a> {
    contents: &'a str,
    resolve_dir: &'a Path,
    sourcefile: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    key: &'a str,
    abs_working_dir: &'a Path,
    entries: Vec<WireEntry<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdin: Option<WireStdin<'a>>,
    #[serde(rename = "virtual")]
    virtual_modules: BTreeMap<&'a str, VirtualModule>,
    virtual_prefix: &'a str,
    platform: Platform,
    format: Format,
    external: &'a [String],
    jsx_import_source: &'a str,
    minify: bool,
    incremental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    outfile: Option<&'a Path>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outdir: Option<&'a Path>,
    entry_names: &'a str,
}

/// esbuild's JS API running inside the shared [`NodeHost`].
///
/// Virtual entries are resolved up front and shipped with the request; the
/// host serves them from a plugin namespace.
pub struct EsbuildBundler {
    host: Arc<NodeHost>,
}

impl EsbuildBundler {
    pub fn new(host: Arc<NodeHost>) -> Self {
        Self { host }
    }
}

fn wire_request<'a>(request: &'a BundleRequest<'a>) -> anyhow::Result<WireRequest<'a>> {
    let mut entries = Vec::new();
    let mut stdin = None;
    let mut virtual_modules = BTreeMap::new();

    for entry in &request.entries {
        match entry {
            Entry::Virtual { name, id } => {
                let module = request
                    .resolver
                    .and_then(|r| r.resolve(id))
                    .ok_or_else(|| anyhow::anyhow!("unresolved virtual entry `{id}`"))?;
                virtual_modules.insert(id.as_str(), module);
                entries.push(WireEntry {
                    name: name.as_str(),
                    path: id.as_str(),
                });
            }
            Entry::Stdin {
                contents,
                resolve_dir,
                sourcefile,
            } => {
                stdin = Some(WireStdin {
                    contents: contents.as_str(),
                    resolve_dir: resolve_dir.as_path(),
                    sourcefile: sourcefile.as_str(),
                });
            }
        }
    }

    let (outfile, outdir) = match &request.output {
        Output::File(path) => (Some(path.as_path()), None),
        Output::Dir(path) => (None, Some(path.as_path())),
    };
    if stdin.is_some() && outfile.is_none() {
        anyhow::bail!("stdin entries need a single output file");
    }

    Ok(WireRequest {
        key: request.key,
        abs_working_dir: request.working_dir,
        entries,
        stdin,
        virtual_modules,
        virtual_prefix: super::VIRTUAL_PREFIX,
        platform: request.platform,
        format: request.format,
        external: &request.externals,
        jsx_import_source: request.jsx_import_source,
        minify: request.mode.minify,
        incremental: request.mode.incremental,
        outfile,
        outdir,
        entry_names: request.mode.entry_names(),
    })
}

impl Bundler for EsbuildBundler {
    fn bundle(&self, request: &BundleRequest<'_>) -> anyhow::Result<BundleResult> {
        let payload = serde_json::to_value(wire_request(request)?)?;
        let result = self.host.request("bundle", payload)?;
        Ok(serde_json::from_value(result)?)
    }
}
