//! The ConfigHub CLI as a command-per-verb JSON interface

use std::{collections::BTreeMap, process::Stdio, time::Duration};

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::gateway::{
  HubClient,
  types::{HubContext, Organization, Space, Target, Unit, Worker},
};

const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Spawns `cub <verb> ... --json` per call; concurrent invocations are safe
/// since each runs in its own subprocess
#[derive(Clone, Debug)]
pub struct CubCli {
  bin: String,
  deadline: Duration,
}

impl Default for CubCli {
  fn default() -> Self {
    Self {
      bin: "cub".to_string(),
      deadline: DEFAULT_DEADLINE,
    }
  }
}

impl CubCli {
  pub fn new(bin: impl Into<String>, deadline: Duration) -> Self {
    Self {
      bin: bin.into(),
      deadline,
    }
  }

  /// Run one verb to completion, honoring the deadline. Errors carry the verb.
  async fn run(&self, verb: &str, args: &[&str], stdin: Option<&str>) -> Result<String> {
    let mut cmd = Command::new(&self.bin);
    cmd
      .args(verb.split_whitespace())
      .args(args)
      .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());

    let mut child = cmd.spawn().with_context(|| format!("cub {verb}: failed to spawn"))?;

    if let Some(input) = stdin {
      let mut handle = child.stdin.take().with_context(|| format!("cub {verb}: no stdin"))?;
      handle
        .write_all(input.as_bytes())
        .await
        .with_context(|| format!("cub {verb}: failed to write stdin"))?;
      drop(handle);
    }

    let output = tokio::time::timeout(self.deadline, child.wait_with_output())
      .await
      .with_context(|| format!("cub {verb}: deadline exceeded"))?
      .with_context(|| format!("cub {verb}: failed to run"))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      bail!("cub {verb}: {}", stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
  }

  async fn run_json<T: DeserializeOwned>(&self, verb: &str, args: &[&str]) -> Result<T> {
    let mut full_args = args.to_vec();
    full_args.push("--json");
    let stdout = self.run(verb, &full_args, None).await?;
    serde_json::from_str(&stdout).with_context(|| format!("cub {verb}: unexpected JSON output"))
  }
}

impl HubClient for CubCli {
  async fn context_get(&self) -> Result<HubContext> {
    self.run_json("context get", &[]).await
  }

  async fn context_use(&self, space: &str) -> Result<()> {
    self.run("context use", &[space], None).await.map(|_| ())
  }

  async fn organization_list(&self) -> Result<Vec<Organization>> {
    self.run_json("organization list", &[]).await
  }

  async fn space_list(&self) -> Result<Vec<Space>> {
    self.run_json("space list", &[]).await
  }

  async fn space_create(&self, slug: &str) -> Result<Space> {
    self.run_json("space create", &[slug]).await
  }

  async fn space_delete(&self, slug: &str) -> Result<()> {
    self.run("space delete", &[slug], None).await.map(|_| ())
  }

  async fn unit_list(&self, space: &str) -> Result<Vec<Unit>> {
    self.run_json("unit list", &["--space", space]).await
  }

  async fn unit_get(&self, space: &str, slug: &str) -> Result<Unit> {
    self.run_json("unit get", &[slug, "--space", space]).await
  }

  async fn unit_create(
    &self,
    space: &str,
    slug: &str,
    manifest: &str,
    labels: &BTreeMap<String, String>,
  ) -> Result<Unit> {
    let mut args = vec![slug.to_string(), "--space".to_string(), space.to_string()];
    for (key, value) in labels {
      args.push("--label".to_string());
      args.push(format!("{key}={value}"));
    }
    args.push("--from-stdin".to_string());
    args.push("--json".to_string());

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let stdout = self.run("unit create", &arg_refs, Some(manifest)).await?;
    serde_json::from_str(&stdout).context("cub unit create: unexpected JSON output")
  }

  async fn unit_apply(&self, space: &str, slug: &str) -> Result<()> {
    self
      .run("unit apply", &[slug, "--space", space], None)
      .await
      .map(|_| ())
  }

  async fn unit_delete(&self, space: &str, slug: &str) -> Result<()> {
    self
      .run("unit delete", &[slug, "--space", space], None)
      .await
      .map(|_| ())
  }

  async fn unit_set_target(&self, space: &str, slug: &str, target: &str) -> Result<()> {
    self
      .run("unit set-target", &[slug, target, "--space", space], None)
      .await
      .map(|_| ())
  }

  async fn target_list(&self, space: &str) -> Result<Vec<Target>> {
    self.run_json("target list", &["--space", space]).await
  }

  async fn target_delete(&self, space: &str, slug: &str) -> Result<()> {
    self
      .run("target delete", &[slug, "--space", space], None)
      .await
      .map(|_| ())
  }

  async fn worker_list(&self, space: &str) -> Result<Vec<Worker>> {
    self.run_json("worker list", &["--space", space]).await
  }

  async fn worker_create(&self, space: &str, slug: &str) -> Result<Worker> {
    self.run_json("worker create", &[slug, "--space", space]).await
  }

  /// Launch a worker process detached; its exit is reaped in the background
  async fn worker_run(&self, space: &str, slug: &str) -> Result<()> {
    let mut cmd = Command::new(&self.bin);
    cmd
      .args(["worker", "run", slug, "--space", space])
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null());

    let mut child = cmd.spawn().context("cub worker run: failed to spawn")?;
    tokio::spawn(async move {
      // best-effort: the worker outlives this process; reap if it exits first
      let _ = child.wait().await;
    });

    Ok(())
  }
}
