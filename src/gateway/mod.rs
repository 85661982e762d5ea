//! Typed wrappers over the external collaborators: the `cub` CLI, `kubectl`,
//! and the Kubernetes dynamic client.
//!
//! Every fallible call annotates its error with the invoked verb; nothing is
//! suppressed silently except sites explicitly marked best-effort.

mod dynamic;
mod hub;
mod kubectl;
pub mod types;

use std::{
  collections::BTreeMap,
  sync::Mutex,
  time::{Duration, Instant},
};

use anyhow::Result;
use serde_json::Value;

pub use dynamic::DynamicClusterClient;
pub use hub::CubCli;
pub use kubectl::Kubectl;
pub use types::{HubContext, Organization, Space, Target, Unit, Worker};

/// A group/version/kind plus its plural, enough to address any list endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gvr {
  pub group: String,
  pub version: String,
  pub kind: String,
  pub plural: String,
}

impl Gvr {
  pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
    Self {
      group: group.to_string(),
      version: version.to_string(),
      kind: kind.to_string(),
      plural: plural.to_string(),
    }
  }

  pub fn api_version(&self) -> String {
    if self.group.is_empty() {
      self.version.clone()
    } else {
      format!("{}/{}", self.group, self.version)
    }
  }
}

/// Resolve a GVR from a kind name, case-insensitively.
///
/// Covers the kinds remediation and import act on; unknown kinds resolve to
/// `None` and surface as validation failures upstream.
pub fn gvr_for_kind(kind: &str) -> Option<Gvr> {
  let gvr = match kind.to_lowercase().as_str() {
    "deployment" | "deployments" => Gvr::new("apps", "v1", "Deployment", "deployments"),
    "statefulset" | "statefulsets" => Gvr::new("apps", "v1", "StatefulSet", "statefulsets"),
    "daemonset" | "daemonsets" => Gvr::new("apps", "v1", "DaemonSet", "daemonsets"),
    "replicaset" | "replicasets" => Gvr::new("apps", "v1", "ReplicaSet", "replicasets"),
    "pod" | "pods" => Gvr::new("", "v1", "Pod", "pods"),
    "service" | "services" => Gvr::new("", "v1", "Service", "services"),
    "configmap" | "configmaps" => Gvr::new("", "v1", "ConfigMap", "configmaps"),
    "secret" | "secrets" => Gvr::new("", "v1", "Secret", "secrets"),
    "namespace" | "namespaces" => Gvr::new("", "v1", "Namespace", "namespaces"),
    "endpoints" => Gvr::new("", "v1", "Endpoints", "endpoints"),
    "kustomization" | "kustomizations" => {
      Gvr::new("kustomize.toolkit.fluxcd.io", "v1", "Kustomization", "kustomizations")
    }
    "helmrelease" | "helmreleases" => Gvr::new("helm.toolkit.fluxcd.io", "v2", "HelmRelease", "helmreleases"),
    "application" | "applications" => Gvr::new("argoproj.io", "v1alpha1", "Application", "applications"),
    _ => return None,
  };
  Some(gvr)
}

/// Operations against the ConfigHub backend, one method per CLI verb
pub trait HubClient {
  fn context_get(&self) -> impl std::future::Future<Output = Result<HubContext>> + Send;
  fn context_use(&self, space: &str) -> impl std::future::Future<Output = Result<()>> + Send;
  fn organization_list(&self) -> impl std::future::Future<Output = Result<Vec<Organization>>> + Send;
  fn space_list(&self) -> impl std::future::Future<Output = Result<Vec<Space>>> + Send;
  fn space_create(&self, slug: &str) -> impl std::future::Future<Output = Result<Space>> + Send;
  fn space_delete(&self, slug: &str) -> impl std::future::Future<Output = Result<()>> + Send;
  fn unit_list(&self, space: &str) -> impl std::future::Future<Output = Result<Vec<Unit>>> + Send;
  fn unit_get(&self, space: &str, slug: &str) -> impl std::future::Future<Output = Result<Unit>> + Send;
  fn unit_create(
    &self,
    space: &str,
    slug: &str,
    manifest: &str,
    labels: &BTreeMap<String, String>,
  ) -> impl std::future::Future<Output = Result<Unit>> + Send;
  fn unit_apply(&self, space: &str, slug: &str) -> impl std::future::Future<Output = Result<()>> + Send;
  fn unit_delete(&self, space: &str, slug: &str) -> impl std::future::Future<Output = Result<()>> + Send;
  fn unit_set_target(
    &self,
    space: &str,
    slug: &str,
    target: &str,
  ) -> impl std::future::Future<Output = Result<()>> + Send;
  fn target_list(&self, space: &str) -> impl std::future::Future<Output = Result<Vec<Target>>> + Send;
  fn target_delete(&self, space: &str, slug: &str) -> impl std::future::Future<Output = Result<()>> + Send;
  fn worker_list(&self, space: &str) -> impl std::future::Future<Output = Result<Vec<Worker>>> + Send;
  fn worker_create(&self, space: &str, slug: &str) -> impl std::future::Future<Output = Result<Worker>> + Send;
  fn worker_run(&self, space: &str, slug: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Operations against the live cluster
pub trait ClusterClient {
  fn list(
    &self,
    gvr: &Gvr,
    namespace: Option<&str>,
  ) -> impl std::future::Future<Output = Result<Vec<Value>>> + Send;
  fn list_namespaces(&self) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
  fn namespace_exists(&self, namespace: &str) -> impl std::future::Future<Output = Result<bool>> + Send;
  fn resource_exists(
    &self,
    kind: &str,
    namespace: &str,
    name: &str,
  ) -> impl std::future::Future<Output = Result<bool>> + Send;
  fn get_manifest(
    &self,
    kind: &str,
    namespace: &str,
    name: &str,
  ) -> impl std::future::Future<Output = Result<String>> + Send;
  fn apply_label(
    &self,
    kind: &str,
    namespace: &str,
    name: &str,
    key: &str,
    value: &str,
  ) -> impl std::future::Future<Output = Result<()>> + Send;
  fn remove_metadata(
    &self,
    kind: &str,
    namespace: &str,
    name: &str,
    annotations: &[&str],
    labels: &[&str],
  ) -> impl std::future::Future<Output = Result<()>> + Send;
  fn rollout_restart(
    &self,
    kind: &str,
    namespace: &str,
    name: &str,
  ) -> impl std::future::Future<Output = Result<()>> + Send;
  fn patch(
    &self,
    gvr: &Gvr,
    namespace: &str,
    name: &str,
    patch: Value,
  ) -> impl std::future::Future<Output = Result<()>> + Send;
  fn delete(
    &self,
    gvr: &Gvr,
    namespace: &str,
    name: &str,
  ) -> impl std::future::Future<Output = Result<()>> + Send;
  fn context_name(&self) -> String;
}

const NAMESPACE_CACHE_TTL: Duration = Duration::from_secs(3);
const NAMESPACE_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// TTL-guarded cache of cluster namespaces for tab completion
#[derive(Default)]
pub struct NamespaceCache {
  inner: Mutex<Option<(Instant, Vec<String>)>>,
}

impl NamespaceCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Return cached namespaces if fresh, otherwise fetch with a short timeout.
  /// A failed fetch falls back to the stale entry, then to nothing.
  pub async fn get<C: ClusterClient>(&self, client: &C) -> Vec<String> {
    let cached = {
      let guard = self.inner.lock().expect("namespace cache poisoned");
      guard.clone()
    };

    if let Some((at, ref namespaces)) = cached {
      if at.elapsed() < NAMESPACE_CACHE_TTL {
        return namespaces.clone();
      }
    }

    match tokio::time::timeout(NAMESPACE_FETCH_TIMEOUT, client.list_namespaces()).await {
      Ok(Ok(namespaces)) => {
        let mut guard = self.inner.lock().expect("namespace cache poisoned");
        *guard = Some((Instant::now(), namespaces.clone()));
        namespaces
      }
      _ => cached.map(|(_, namespaces)| namespaces).unwrap_or_default(),
    }
  }
}

/// Open a URL in the default browser. Best-effort: a missing opener is not an
/// error worth surfacing.
pub fn open_browser(url: &str) {
  #[cfg(target_os = "macos")]
  let opener = "open";
  #[cfg(not(target_os = "macos"))]
  let opener = "xdg-open";

  // best-effort: browser launch failures are discarded
  let _ = std::process::Command::new(opener)
    .arg(url)
    .stdout(std::process::Stdio::null())
    .stderr(std::process::Stdio::null())
    .spawn();
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gvr_for_kind_case_insensitive() {
    let gvr = gvr_for_kind("DePlOyMeNt").unwrap();
    assert_eq!(gvr.plural, "deployments");
    assert_eq!(gvr.api_version(), "apps/v1");
  }

  #[test]
  fn gvr_for_kind_core_group() {
    let gvr = gvr_for_kind("Service").unwrap();
    assert_eq!(gvr.api_version(), "v1");
  }

  #[test]
  fn gvr_for_unknown_kind() {
    assert!(gvr_for_kind("FlumoxedGadget").is_none());
  }
}
