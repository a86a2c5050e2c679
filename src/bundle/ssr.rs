//! Server-rendering runtimes.
//!
//! A runtime executes the compiled static bundle once and returns the
//! `element id → html` map the bundle produced.

use super::host::NodeHost;
use crate::exec;
use crate::utils::exec::FilterRule;
use anyhow::{Context, Result};
use serde_json::json;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

/// Rendered fragments keyed by element id.
pub type SsrOutput = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum SsrError {
    #[error("static bundle {script} printed malformed output")]
    Malformed {
        script: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Executes a compiled server bundle.
pub trait SsrRuntime {
    fn execute(&self, script: &Path) -> Result<SsrOutput>;
}

/// Skip Node's experimental and deprecation chatter.
const NODE_FILTER: FilterRule = FilterRule::new(&["(node:", "(Use `node --trace"]);

fn parse_output(script: &Path, json: serde_json::Value) -> Result<SsrOutput, SsrError> {
    serde_json::from_value(json).map_err(|source| SsrError::Malformed {
        script: script.to_path_buf(),
        source,
    })
}

/// Runs `node <script>` once per build and reads the map from stdout.
pub struct ProcessRuntime {
    command: Vec<String>,
    root: PathBuf,
}

impl ProcessRuntime {
    pub fn new(command: Vec<String>, root: &Path) -> Self {
        Self {
            command,
            root: root.to_path_buf(),
        }
    }
}

impl SsrRuntime for ProcessRuntime {
    fn execute(&self, script: &Path) -> Result<SsrOutput> {
        let output = exec!(filter=&NODE_FILTER; self.root.as_path(); &self.command; script)?;
        let json = serde_json::from_slice(&output.stdout).map_err(|source| SsrError::Malformed {
            script: script.to_path_buf(),
            source,
        })?;
        Ok(parse_output(script, json)?)
    }
}

/// Requires the script inside the shared [`NodeHost`].
pub struct HostRuntime {
    host: Arc<NodeHost>,
}

impl HostRuntime {
    pub fn new(host: Arc<NodeHost>) -> Self {
        Self { host }
    }
}

impl SsrRuntime for HostRuntime {
    fn execute(&self, script: &Path) -> Result<SsrOutput> {
        let result = self
            .host
            .request("exec", json!({ "script": script }))
            .with_context(|| format!("Failed to run {}", script.display()))?;
        Ok(parse_output(script, result)?)
    }
}
