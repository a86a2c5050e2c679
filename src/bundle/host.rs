//! Long-lived Node.js host process.
//!
//! The host runs `embed/host.js` and answers line-delimited JSON requests on
//! its stdin/stdout. It is started on the first request, restarted when it
//! has died, and killed when the owner drops it. A mutex keeps at most one
//! request in flight.

use crate::log;
use crate::utils::exec::{ensure_installed, spawn_piped};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    ffi::OsString,
    fs,
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, ChildStdout},
};
use thiserror::Error;

/// Source of the host script.
pub const HOST_SCRIPT: &str = include_str!("../embed/host.js");

const HOST_SCRIPT_NAME: &str = "host.js";

#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to start node host: {0}")]
    Spawn(String),

    #[error("node host i/o failed")]
    Io(#[from] std::io::Error),

    #[error("node host exited while handling `{0}`")]
    Closed(String),

    #[error("malformed node host message")]
    Json(#[from] serde_json::Error),

    #[error("node host answered request {got:?}, expected {expected}")]
    Protocol { expected: u64, got: Option<u64> },

    #[error("`{op}` failed in node host:\n{message}")]
    Remote { op: String, message: String },
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    op: &'a str,
    payload: &'a Value,
}

#[derive(Deserialize)]
struct Response {
    id: Option<u64>,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

struct HostProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl HostProcess {
    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn roundtrip(&mut self, line: &str) -> std::io::Result<Option<String>> {
        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;

        let mut answer = String::new();
        if self.stdout.read_line(&mut answer)? == 0 {
            return Ok(None);
        }
        Ok(Some(answer))
    }
}

struct HostState {
    process: Option<HostProcess>,
    next_id: u64,
}

/// Handle to the Node.js host.
pub struct NodeHost {
    command: Vec<String>,
    root: PathBuf,
    cache: PathBuf,
    state: Mutex<HostState>,
}

impl NodeHost {
    /// A host running `command` in `root`; the script is written to `cache`.
    /// Nothing starts until the first request.
    pub fn new(command: Vec<String>, root: &Path, cache: &Path) -> Self {
        Self {
            command,
            root: root.to_path_buf(),
            cache: cache.to_path_buf(),
            state: Mutex::new(HostState {
                process: None,
                next_id: 0,
            }),
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.state
            .lock()
            .process
            .as_mut()
            .is_some_and(HostProcess::is_alive)
    }

    fn spawn(&self) -> Result<HostProcess, HostError> {
        ensure_installed("[build.node.command]", &self.command)
            .map_err(|e| HostError::Spawn(format!("{e:#}")))?;

        fs::create_dir_all(&self.cache)?;
        let script = self.cache.join(HOST_SCRIPT_NAME);
        fs::write(&script, HOST_SCRIPT)?;

        let cmd: Vec<OsString> = self.command.iter().map(OsString::from).collect();
        let mut child = spawn_piped(Some(&self.root), &cmd, &[script.into_os_string()])
            .map_err(|e| HostError::Spawn(format!("{e:#}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::Spawn("stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::Spawn("stdout not captured".into()))?;

        log!("node"; "host started (pid {})", child.id());
        Ok(HostProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one request and wait for its answer.
    ///
    /// A host found dead is restarted once before the request is sent.
    pub fn request(&self, op: &str, payload: Value) -> Result<Value, HostError> {
        let mut state = self.state.lock();

        if !state.process.as_mut().is_some_and(HostProcess::is_alive) {
            if let Some(mut dead) = state.process.take() {
                dead.kill();
                log!("node"; "host exited, restarting");
            }
            state.process = Some(self.spawn()?);
        }

        state.next_id += 1;
        let id = state.next_id;
        let line = serde_json::to_string(&Request {
            id,
            op,
            payload: &payload,
        })?;

        let Some(process) = state.process.as_mut() else {
            return Err(HostError::Closed(op.to_owned()));
        };
        let answer = match process.roundtrip(&line) {
            Ok(Some(answer)) => answer,
            Ok(None) | Err(_) => {
                if let Some(mut dead) = state.process.take() {
                    dead.kill();
                }
                return Err(HostError::Closed(op.to_owned()));
            }
        };

        let response: Response = serde_json::from_str(&answer)?;
        if response.id != Some(id) {
            return Err(HostError::Protocol {
                expected: id,
                got: response.id,
            });
        }
        if !response.ok {
            return Err(HostError::Remote {
                op: op.to_owned(),
                message: response.error.unwrap_or_default(),
            });
        }
        Ok(response.result)
    }

    /// Stop the host if it is running.
    pub fn shutdown(&self) {
        if let Some(mut process) = self.state.lock().process.take() {
            process.kill();
        }
    }
}

impl Drop for NodeHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
