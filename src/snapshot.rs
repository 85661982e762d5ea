//! Best-effort persistence of session navigation state, TTL-bounded

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: u32 = 1;
const MAX_AGE_HOURS: i64 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
  Hub,
  LocalCluster,
}

impl SnapshotKind {
  fn file_name(&self) -> &'static str {
    match self {
      SnapshotKind::Hub => "hub-snapshot.json",
      SnapshotKind::LocalCluster => "localcluster-snapshot.json",
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
  pub version: u32,
  pub updated_at: DateTime<Utc>,
  pub cursor: usize,
  #[serde(default)]
  pub current_org: Option<String>,
  #[serde(default)]
  pub hub_view: bool,
  #[serde(default)]
  pub filter_active: bool,
  #[serde(default)]
  pub expanded_paths: Vec<String>,
}

fn sessions_dir() -> Option<PathBuf> {
  dirs::home_dir().map(|home| home.join(".confighub").join("sessions"))
}

/// Load a snapshot. Read failures, parse errors, version mismatches, and
/// age beyond 24 h all yield "no snapshot".
pub fn load(kind: SnapshotKind) -> Option<Snapshot> {
  let path = sessions_dir()?.join(kind.file_name());
  load_from(&path)
}

pub(crate) fn load_from(path: &std::path::Path) -> Option<Snapshot> {
  let contents = std::fs::read_to_string(path).ok()?;
  let snapshot: Snapshot = serde_json::from_str(&contents).ok()?;

  if snapshot.version != SNAPSHOT_VERSION {
    return None;
  }
  if Utc::now() - snapshot.updated_at > Duration::hours(MAX_AGE_HOURS) {
    return None;
  }
  Some(snapshot)
}

/// Persist a snapshot, rewriting the file wholly. The caller treats failures
/// as best-effort.
pub fn save(kind: SnapshotKind, snapshot: &Snapshot) -> Result<()> {
  let dir = sessions_dir().context("Could not determine home directory")?;
  std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
  save_to(&dir.join(kind.file_name()), snapshot)
}

pub(crate) fn save_to(path: &std::path::Path, snapshot: &Snapshot) -> Result<()> {
  let contents = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
  std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
  Ok(())
}
