//! Local `ferret` executable.

use std::process::Stdio;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::error::{RuntimeError, RuntimeResult};
use super::Runtime;

/// Runs each query in a fresh process.
///
/// The query is written to stdin; parameters are passed as
/// `--param=name:<json>` flags and the browser address as `--cdp=<addr>`.
#[derive(Debug, Clone)]
pub struct Binary {
    path: String,
    cdp: String,
    params: Map<String, Value>,
}

impl Binary {
    /// `params` are shared by every query and overridden by query params.
    pub fn new(path: impl Into<String>, cdp: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            cdp: cdp.into(),
            params,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn args(&self, params: &Map<String, Value>) -> RuntimeResult<Vec<String>> {
        let mut merged = self.params.clone();
        for (key, value) in params {
            merged.insert(key.clone(), value.clone());
        }

        let mut args = Vec::with_capacity(merged.len() + 1);
        args.push(format!("--cdp={}", self.cdp));

        for (key, value) in &merged {
            args.push(format!("--param={key}:{}", serde_json::to_string(value)?));
        }

        Ok(args)
    }
}

#[async_trait]
impl Runtime for Binary {
    async fn version(&self) -> RuntimeResult<String> {
        let output = Command::new(&self.path)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RuntimeError::Process(format!("failed to run {}: {e}", self.path)))?;

        if !output.status.success() {
            return Err(RuntimeError::Process(combined(&output.stdout, &output.stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .replace('\n', "")
            .trim()
            .to_string())
    }

    async fn run(&self, query: &str, params: &Map<String, Value>) -> RuntimeResult<Vec<u8>> {
        let args = self.args(params)?;
        debug!(path = %self.path, args = args.len(), "spawning runtime");

        let mut child = Command::new(&self.path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::Process(format!("failed to run {}: {e}", self.path)))?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(query.as_bytes()).await {
                // The process may exit without reading its input.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(RuntimeError::Process(format!("failed to write query: {e}")));
                }
                _ => {}
            }
            // Closing stdin marks the end of the query.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RuntimeError::Process(e.to_string()))?;

        if !output.status.success() {
            return Err(RuntimeError::Query(combined(&output.stdout, &output.stderr)));
        }

        Ok(output.stdout)
    }
}

fn combined(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    format!("{}{}", stdout, stderr).trim().to_string()
}
