/* src/cli/core/src/app/bridge.rs */

// Server entry hosted in a long-lived Node process. Requests go out on stdin
// with an id; one reader task routes prefixed response lines back to the
// waiting caller and forwards everything else to the log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot};

use super::{AppContext, EntryLoader, LoaderOutput, PageRequest, RenderResult, RouteSpec, ServerApp};
use crate::config::ModuleFormat;

const BRIDGE_SCRIPT: &str = include_str!("../../scripts/ssr-bridge.mjs");
const BRIDGE_FILE: &str = "ssr-bridge.mjs";
const PREFIX: &str = "@@ssg ";
const READY_ID: u64 = 0;

type Reply = std::result::Result<Value, String>;
type Pending = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
  pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Serialize)]
struct BridgeRequest<'a> {
  id: u64,
  op: &'a str,
  args: Value,
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
  id: u64,
  ok: bool,
  #[serde(default)]
  result: Value,
  #[serde(default)]
  error: Option<String>,
}

/// Loads server bundles into Node.
pub struct NodeLoader {
  node: String,
  mock: bool,
  cwd: PathBuf,
}

impl NodeLoader {
  pub fn new(node: impl Into<String>, mock: bool, cwd: PathBuf) -> Self {
    Self { node: node.into(), mock, cwd }
  }
}

#[async_trait]
impl EntryLoader for NodeLoader {
  async fn load(&self, bundle: &Path, format: ModuleFormat) -> Result<Arc<dyn ServerApp>> {
    let dir = bundle.parent().context("server bundle has no parent directory")?;
    let script = dir.join(BRIDGE_FILE);
    tokio::fs::write(&script, BRIDGE_SCRIPT)
      .await
      .with_context(|| format!("failed to write {}", script.display()))?;

    let mut child = Command::new(&self.node)
      .arg(&script)
      .arg(bundle)
      .arg(format.as_str())
      .arg(if self.mock { "true" } else { "false" })
      .current_dir(&self.cwd)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::inherit())
      .kill_on_drop(true)
      .spawn()
      .with_context(|| format!("failed to start {}", self.node))?;

    let stdin = child.stdin.take().context("server runtime stdin unavailable")?;
    let stdout = child.stdout.take().context("server runtime stdout unavailable")?;

    let pending: Pending = Arc::default();
    let (ready_tx, ready_rx) = oneshot::channel();
    lock(&pending).insert(READY_ID, ready_tx);
    tokio::spawn(read_responses(stdout, Arc::clone(&pending)));

    let ready = ready_rx
      .await
      .map_err(|_| anyhow!("server runtime exited before loading the entry"))?
      .map_err(|e| anyhow!(e))?;
    let has_included_routes = ready.get("includedRoutes").and_then(Value::as_bool).unwrap_or(false);
    tracing::debug!(bundle = %bundle.display(), format = format.as_str(), has_included_routes, "server entry loaded");

    Ok(Arc::new(NodeApp {
      stdin: Mutex::new(stdin),
      pending,
      next_id: AtomicU64::new(READY_ID + 1),
      has_included_routes,
      _child: Mutex::new(child),
    }))
  }
}

async fn read_responses(stdout: ChildStdout, pending: Pending) {
  let mut lines = BufReader::new(stdout).lines();
  loop {
    match lines.next_line().await {
      Ok(Some(line)) => dispatch(&line, &pending),
      Ok(None) => break,
      Err(e) => {
        tracing::warn!(error = %e, "failed to read from server runtime");
        break;
      }
    }
  }
  let waiting: Vec<_> = lock(&pending).drain().collect();
  for (_, tx) in waiting {
    let _ = tx.send(Err("server runtime exited".to_string()));
  }
}

fn dispatch(line: &str, pending: &Pending) {
  let Some(payload) = line.strip_prefix(PREFIX) else {
    tracing::info!("{line}");
    return;
  };
  let response: BridgeResponse = match serde_json::from_str(payload) {
    Ok(response) => response,
    Err(e) => {
      tracing::warn!(error = %e, "malformed response from server runtime");
      return;
    }
  };
  let Some(tx) = lock(pending).remove(&response.id) else {
    tracing::debug!(id = response.id, "response for unknown request");
    return;
  };
  let reply = if response.ok {
    Ok(response.result)
  } else {
    Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
  };
  let _ = tx.send(reply);
}

struct NodeApp {
  stdin: Mutex<ChildStdin>,
  pending: Pending,
  next_id: AtomicU64,
  has_included_routes: bool,
  // Held for kill-on-drop.
  _child: Mutex<Child>,
}

impl NodeApp {
  async fn call<T: DeserializeOwned>(&self, op: &str, args: Value) -> Result<T> {
    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
    let (tx, rx) = oneshot::channel();
    lock(&self.pending).insert(id, tx);

    let mut line = serde_json::to_string(&BridgeRequest { id, op, args })?;
    line.push('\n');
    let sent = {
      let mut stdin = self.stdin.lock().await;
      match stdin.write_all(line.as_bytes()).await {
        Ok(()) => stdin.flush().await,
        Err(e) => Err(e),
      }
    };
    if let Err(e) = sent {
      lock(&self.pending).remove(&id);
      return Err(e).with_context(|| format!("failed to send {op} to the server runtime"));
    }
    tracing::trace!(id, op, "request sent");

    let value = rx
      .await
      .map_err(|_| anyhow!("server runtime dropped the {op} request"))?
      .map_err(|e| anyhow!(e))?;
    serde_json::from_value(value).with_context(|| format!("unexpected {op} response"))
  }
}

#[async_trait]
impl ServerApp for NodeApp {
  async fn routes(&self) -> Result<Vec<RouteSpec>> {
    self.call("routes", json!({})).await
  }

  async fn load(&self, key: &str) -> Result<LoaderOutput> {
    self.call("load", json!({ "key": key })).await
  }

  async fn included_routes(&self, paths: &[String]) -> Result<Option<Vec<String>>> {
    if !self.has_included_routes {
      return Ok(None);
    }
    self.call("includedRoutes", json!({ "paths": paths })).await
  }

  async fn create_root(&self, path: &str) -> Result<AppContext> {
    self.call("createRoot", json!({ "path": path })).await
  }

  async fn render(&self, ctx: &AppContext, request: &PageRequest) -> Result<RenderResult> {
    self.call("render", json!({ "handle": ctx.handle, "url": request.url.as_str() })).await
  }

  async fn app_rendered(&self, ctx: &AppContext, _path: &str, app_html: &str) -> Result<()> {
    self.call::<Value>("appRendered", json!({ "handle": ctx.handle, "html": app_html })).await?;
    Ok(())
  }

  async fn release(&self, ctx: &AppContext) -> Result<()> {
    self.call::<Value>("release", json!({ "handle": ctx.handle })).await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pending_with(id: u64) -> (Pending, oneshot::Receiver<Reply>) {
    let pending: Pending = Arc::default();
    let (tx, rx) = oneshot::channel();
    lock(&pending).insert(id, tx);
    (pending, rx)
  }

  #[tokio::test]
  async fn ok_response_resolves_caller() {
    let (pending, rx) = pending_with(3);
    dispatch(r#"@@ssg {"id":3,"ok":true,"result":{"handle":9}}"#, &pending);
    assert_eq!(rx.await.unwrap().unwrap(), json!({"handle": 9}));
    assert!(lock(&pending).is_empty());
  }

  #[tokio::test]
  async fn error_response_carries_message() {
    let (pending, rx) = pending_with(1);
    dispatch(r#"@@ssg {"id":1,"ok":false,"error":"ReferenceError: window is not defined"}"#, &pending);
    assert_eq!(rx.await.unwrap().unwrap_err(), "ReferenceError: window is not defined");
  }

  #[test]
  fn unprefixed_and_unknown_lines_are_ignored() {
    let (pending, _rx) = pending_with(1);
    dispatch("hello from the app", &pending);
    dispatch(r#"@@ssg {"id":42,"ok":true}"#, &pending);
    dispatch("@@ssg not json", &pending);
    assert!(lock(&pending).contains_key(&1));
  }

  #[test]
  fn script_speaks_the_same_prefix() {
    assert!(BRIDGE_SCRIPT.contains(&format!("const PREFIX = '{PREFIX}'")));
  }
}
