//! ConfigHub entities as returned by the `cub` CLI in `--json` mode.
//!
//! Every field defaults so partial payloads from older CLI versions still
//! deserialize.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct HubContext {
  pub organization: String,
  pub space: String,
  pub user: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Organization {
  pub slug: String,
  pub display_name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Space {
  pub slug: String,
  pub display_name: String,
  pub organization: String,
}

/// A versioned configuration artifact with head and live revisions
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Unit {
  pub slug: String,
  pub space: String,
  pub display_name: String,
  pub head_revision: i64,
  pub live_revision: i64,
  pub toolchain: String,
  pub sync_status: String,
  pub drift: String,
  pub action: String,
  pub action_result: String,
  pub target: Option<String>,
  pub worker: Option<String>,
  pub labels: BTreeMap<String, String>,
}

/// A deployment destination: a toolchain plus its parameters
/// (`KubeContext` for Kubernetes targets)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Target {
  pub slug: String,
  pub space: String,
  pub toolchain: String,
  pub parameters: BTreeMap<String, String>,
}

/// A local process reconciling units into targets
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Worker {
  pub slug: String,
  pub space: String,
  pub condition: String,
}

impl Worker {
  pub fn is_ready(&self) -> bool {
    self.condition == "Ready"
  }
}
