//! `kubectl` shell-outs for quick existence checks

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;

const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct Kubectl {
  bin: String,
  context: Option<String>,
  deadline: Duration,
}

impl Kubectl {
  pub fn new(context: Option<&str>) -> Self {
    Self {
      bin: "kubectl".to_string(),
      context: context.map(ToString::to_string),
      deadline: DEFAULT_DEADLINE,
    }
  }

  async fn get_succeeds(&self, args: &[&str]) -> Result<bool> {
    let mut cmd = Command::new(&self.bin);
    if let Some(ctx) = &self.context {
      cmd.args(["--context", ctx]);
    }
    cmd.arg("get").args(args).args(["--no-headers", "--ignore-not-found=false"]);

    let verb = format!("kubectl get {}", args.join(" "));
    let output = tokio::time::timeout(self.deadline, cmd.output())
      .await
      .with_context(|| format!("{verb}: deadline exceeded"))?
      .with_context(|| format!("{verb}: failed to run"))?;

    if output.status.success() {
      return Ok(true);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("NotFound") || stderr.contains("not found") {
      return Ok(false);
    }
    anyhow::bail!("{verb}: {}", stderr.trim())
  }

  pub async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
    self.get_succeeds(&["namespace", namespace]).await
  }

  pub async fn resource_exists(&self, kind: &str, namespace: &str, name: &str) -> Result<bool> {
    self.get_succeeds(&[&kind.to_lowercase(), name, "-n", namespace]).await
  }
}
