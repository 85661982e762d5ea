//! Append-only audit log, one line per remediation attempt

use std::{
  fs::OpenOptions,
  io::Write,
  path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::ccve::Finding;

pub const AUDIT_LOG_FILE: &str = "remedy-audit.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditStatus {
  Success,
  Failed,
  DryRun,
}

impl std::fmt::Display for AuditStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      AuditStatus::Success => write!(f, "SUCCESS"),
      AuditStatus::Failed => write!(f, "FAILED"),
      AuditStatus::DryRun => write!(f, "DRY-RUN"),
    }
  }
}

impl std::str::FromStr for AuditStatus {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "SUCCESS" => Ok(AuditStatus::Success),
      "FAILED" => Ok(AuditStatus::Failed),
      "DRY-RUN" => Ok(AuditStatus::DryRun),
      _ => Err(()),
    }
  }
}

/// Writes are line-oriented and atomic per line; the file is opened in append
/// mode on every write so concurrent attempts interleave whole lines
#[derive(Clone, Debug)]
pub struct AuditLog {
  path: PathBuf,
}

impl Default for AuditLog {
  fn default() -> Self {
    Self {
      path: PathBuf::from(AUDIT_LOG_FILE),
    }
  }
}

impl AuditLog {
  pub fn at(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Append one attempt line:
  /// `<rfc3339> <STATUS> <ccve> ns=<ns> resource=<kind>/<name> <message>`
  pub fn append(&self, status: AuditStatus, finding: &Finding, message: &str) -> Result<()> {
    let resource = finding
      .resource
      .as_ref()
      .map(|r| format!("{}/{}", r.kind, r.name))
      .unwrap_or_else(|| "-".to_string());
    let namespace = finding.namespace.clone().unwrap_or_else(|| "-".to_string());

    let line = format!(
      "{} {} {} ns={} resource={} {}\n",
      Utc::now().to_rfc3339(),
      status,
      finding.ccve_id,
      namespace,
      resource,
      message
    );

    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)
      .with_context(|| format!("Failed to open audit log: {}", self.path.display()))?;
    file
      .write_all(line.as_bytes())
      .with_context(|| format!("Failed to write audit log: {}", self.path.display()))?;

    Ok(())
  }
}

/// Parse one audit line back into (timestamp, status, ccve id)
pub fn parse_audit_line(line: &str) -> Option<(DateTime<Utc>, AuditStatus, String)> {
  let mut parts = line.split_whitespace();
  let timestamp = DateTime::parse_from_rfc3339(parts.next()?).ok()?.with_timezone(&Utc);
  let status: AuditStatus = parts.next()?.parse().ok()?;
  let ccve = parts.next()?.to_string();
  Some((timestamp, status, ccve))
}
