use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  k8s::nested::{nested, nested_map, nested_slice, nested_str_map, nested_string},
  ownership::{self, Owner, OwnerRef},
};

/// Canonical identity of a cluster object
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
  pub cluster: String,
  pub namespace: String,
  pub group: String,
  pub kind: String,
  pub name: String,
}

impl ResourceId {
  /// Canonical string form used as a map key
  pub fn key(&self) -> String {
    format!(
      "{}/{}/{}/{}/{}",
      self.cluster, self.namespace, self.group, self.kind, self.name
    )
  }
}

impl std::fmt::Display for ResourceId {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(f, "{}", self.key())
  }
}

/// Condition-derived workload status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadStatus {
  Ready,
  Running,
  Failed,
  Pending,
  NotReady,
  Unknown,
}

impl std::fmt::Display for WorkloadStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      WorkloadStatus::Ready => write!(f, "Ready"),
      WorkloadStatus::Running => write!(f, "Running"),
      WorkloadStatus::Failed => write!(f, "Failed"),
      WorkloadStatus::Pending => write!(f, "Pending"),
      WorkloadStatus::NotReady => write!(f, "NotReady"),
      WorkloadStatus::Unknown => write!(f, "Unknown"),
    }
  }
}

/// Flat record of a live workload
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MapEntry {
  pub id: ResourceId,
  pub api_version: String,
  pub owner: Owner,
  pub owner_details: BTreeMap<String, String>,
  pub labels: BTreeMap<String, String>,
  pub annotations: BTreeMap<String, String>,
  pub status: WorkloadStatus,
  pub created_at: Option<DateTime<Utc>>,
  pub updated_at: Option<DateTime<Utc>>,
}

impl MapEntry {
  /// The ConfigHub unit slug this workload is labeled with, if any
  pub fn unit_slug(&self) -> Option<&str> {
    self
      .labels
      .get(ownership::UNIT_SLUG_KEY)
      .or_else(|| self.annotations.get(ownership::UNIT_SLUG_KEY))
      .map(String::as_str)
  }

  /// The applied ConfigHub revision number, if annotated
  pub fn revision_num(&self) -> Option<i64> {
    self
      .annotations
      .get(ownership::REVISION_NUM_KEY)
      .and_then(|v| v.parse().ok())
  }
}

/// Deployer custom resource kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitOpsKind {
  Kustomization,
  HelmRelease,
  Application,
  ApplicationSet,
}

impl std::fmt::Display for GitOpsKind {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      GitOpsKind::Kustomization => write!(f, "Kustomization"),
      GitOpsKind::HelmRelease => write!(f, "HelmRelease"),
      GitOpsKind::Application => write!(f, "Application"),
      GitOpsKind::ApplicationSet => write!(f, "ApplicationSet"),
    }
  }
}

/// Deployer health as reported by its controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitOpsStatus {
  Ready,
  NotReady,
  Healthy,
  Degraded,
  Missing,
  Progressing,
  Unknown,
}

impl std::fmt::Display for GitOpsStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      GitOpsStatus::Ready => write!(f, "Ready"),
      GitOpsStatus::NotReady => write!(f, "NotReady"),
      GitOpsStatus::Healthy => write!(f, "Healthy"),
      GitOpsStatus::Degraded => write!(f, "Degraded"),
      GitOpsStatus::Missing => write!(f, "Missing"),
      GitOpsStatus::Progressing => write!(f, "Progressing"),
      GitOpsStatus::Unknown => write!(f, "Unknown"),
    }
  }
}

/// Flat record of a GitOps deployer (Flux Kustomization/HelmRelease,
/// ArgoCD Application/ApplicationSet)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitOpsResource {
  pub kind: GitOpsKind,
  pub name: String,
  pub namespace: String,
  pub status: GitOpsStatus,
  /// Name of the referenced source (repo ref name or repo URL for ArgoCD)
  pub source: String,
  /// Kind of the referenced source, empty for ArgoCD
  pub source_kind: String,
  pub path: String,
  pub inventory_count: usize,
  pub last_applied: Option<DateTime<Utc>>,
  /// `ns/name` pairs this deployer depends on
  pub depends_on: BTreeSet<String>,
  /// ArgoCD automated sync enabled
  pub auto_sync: bool,
  /// ArgoCD selfHeal enabled; mutations to managed resources are reverted
  pub self_heal: bool,
}

/// Flux-style source kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitSourceKind {
  GitRepository,
  OciRepository,
  HelmRepository,
}

impl std::fmt::Display for GitSourceKind {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      GitSourceKind::GitRepository => write!(f, "GitRepository"),
      GitSourceKind::OciRepository => write!(f, "OCIRepository"),
      GitSourceKind::HelmRepository => write!(f, "HelmRepository"),
    }
  }
}

/// Flat record of a Flux-style source referenced by deployers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitSourceInfo {
  pub kind: GitSourceKind,
  pub name: String,
  pub namespace: String,
  pub url: String,
  pub branch: String,
  pub tag: String,
  pub revision: String,
  pub status: GitOpsStatus,
  pub last_fetch: Option<DateTime<Utc>>,
  pub interval: String,
  /// `kind/name` of every deployer referencing this source
  pub deployers: BTreeSet<String>,
}

fn parse_time(value: Option<String>) -> Option<DateTime<Utc>> {
  value
    .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
    .map(|dt| dt.with_timezone(&Utc))
}

fn owner_refs(value: &Value) -> Vec<OwnerRef> {
  match nested_slice(value, &["metadata", "ownerReferences"]) {
    Some(refs) => refs
      .iter()
      .map(|r| OwnerRef {
        uid: nested_string(r, &["uid"]).unwrap_or_default(),
        kind: nested_string(r, &["kind"]).unwrap_or_default(),
        name: nested_string(r, &["name"]).unwrap_or_default(),
      })
      .collect(),
    None => Vec::new(),
  }
}

/// Find the `Ready` condition and derive a status from it.
///
/// `True` means ready, anything else means not ready; a missing condition
/// list or missing `Ready` entry reads as unknown.
fn ready_condition(value: &Value) -> (GitOpsStatus, Option<DateTime<Utc>>) {
  let Some(conditions) = nested_slice(value, &["status", "conditions"]) else {
    return (GitOpsStatus::Unknown, None);
  };

  for cond in conditions {
    if nested_string(cond, &["type"]).as_deref() == Some("Ready") {
      let transition = parse_time(nested_string(cond, &["lastTransitionTime"]));
      return match nested_string(cond, &["status"]).as_deref() {
        Some("True") => (GitOpsStatus::Ready, transition),
        Some(_) => (GitOpsStatus::NotReady, transition),
        None => (GitOpsStatus::Unknown, transition),
      };
    }
  }

  (GitOpsStatus::Unknown, None)
}

/// Project a dynamic workload payload (Deployment/StatefulSet/DaemonSet) into
/// a [`MapEntry`]. Returns `None` when the payload has no name, never panics.
pub fn parse_workload(cluster: &str, kind: &str, value: &Value) -> Option<MapEntry> {
  let name = nested_string(value, &["metadata", "name"])?;
  let namespace = nested_string(value, &["metadata", "namespace"]).unwrap_or_default();
  let has_labels = nested_map(value, &["metadata", "labels"]).is_some();
  let has_annotations = nested_map(value, &["metadata", "annotations"]).is_some();
  let labels = nested_str_map(value, &["metadata", "labels"]);
  let annotations = nested_str_map(value, &["metadata", "annotations"]);
  let refs = owner_refs(value);

  let ownership = ownership::classify_payload(
    has_labels.then_some(&labels),
    has_annotations.then_some(&annotations),
    &refs,
  );
  let (ready, transition) = ready_condition(value);
  let status = match ready {
    GitOpsStatus::Ready => WorkloadStatus::Ready,
    GitOpsStatus::NotReady => WorkloadStatus::NotReady,
    _ => WorkloadStatus::Unknown,
  };

  let api_version = nested_string(value, &["apiVersion"]).unwrap_or_else(|| "apps/v1".to_string());
  let group = api_version.split_once('/').map(|(g, _)| g).unwrap_or("").to_string();

  Some(MapEntry {
    id: ResourceId {
      cluster: cluster.to_string(),
      namespace,
      group,
      kind: kind.to_string(),
      name,
    },
    api_version,
    owner: ownership.owner,
    owner_details: ownership.details,
    labels,
    annotations,
    status,
    created_at: parse_time(nested_string(value, &["metadata", "creationTimestamp"])),
    updated_at: transition,
  })
}

/// Resolve `spec.dependsOn` into `ns/name` pairs, inheriting the resource's
/// namespace when omitted
fn depends_on(value: &Value, own_namespace: &str) -> BTreeSet<String> {
  let mut deps = BTreeSet::new();
  if let Some(entries) = nested_slice(value, &["spec", "dependsOn"]) {
    for entry in entries {
      let Some(name) = nested_string(entry, &["name"]) else {
        continue;
      };
      let ns = nested_string(entry, &["namespace"]).unwrap_or_else(|| own_namespace.to_string());
      deps.insert(format!("{ns}/{name}"));
    }
  }
  deps
}

/// Project a Flux Kustomization or HelmRelease payload
pub fn parse_flux_deployer(kind: GitOpsKind, value: &Value) -> Option<GitOpsResource> {
  let name = nested_string(value, &["metadata", "name"])?;
  let namespace = nested_string(value, &["metadata", "namespace"]).unwrap_or_default();
  let (status, transition) = ready_condition(value);

  let (source, source_kind, path) = match kind {
    GitOpsKind::HelmRelease => (
      nested_string(value, &["spec", "chart", "spec", "sourceRef", "name"]).unwrap_or_default(),
      nested_string(value, &["spec", "chart", "spec", "sourceRef", "kind"]).unwrap_or_default(),
      nested_string(value, &["spec", "chart", "spec", "chart"]).unwrap_or_default(),
    ),
    _ => (
      nested_string(value, &["spec", "sourceRef", "name"]).unwrap_or_default(),
      nested_string(value, &["spec", "sourceRef", "kind"]).unwrap_or_default(),
      nested_string(value, &["spec", "path"]).unwrap_or_default(),
    ),
  };

  let inventory_count = nested_slice(value, &["status", "inventory", "entries"])
    .map(Vec::len)
    .unwrap_or(0);

  Some(GitOpsResource {
    kind,
    depends_on: depends_on(value, &namespace),
    name,
    namespace,
    status,
    source,
    source_kind,
    path,
    inventory_count,
    last_applied: transition,
    auto_sync: false,
    self_heal: false,
  })
}

/// Project an ArgoCD Application or ApplicationSet payload
pub fn parse_argo_deployer(kind: GitOpsKind, value: &Value) -> Option<GitOpsResource> {
  let name = nested_string(value, &["metadata", "name"])?;
  let namespace = nested_string(value, &["metadata", "namespace"]).unwrap_or_default();

  // ArgoCD reports health directly instead of a Ready condition
  let status = match nested_string(value, &["status", "health", "status"]).as_deref() {
    Some("Healthy") => GitOpsStatus::Healthy,
    Some("Degraded") => GitOpsStatus::Degraded,
    Some("Missing") => GitOpsStatus::Missing,
    Some("Progressing") => GitOpsStatus::Progressing,
    Some(_) | None => GitOpsStatus::Unknown,
  };

  let inventory_count = nested_slice(value, &["status", "resources"])
    .map(Vec::len)
    .unwrap_or(0);

  let automated = nested(value, &["spec", "syncPolicy", "automated"]).is_some();
  let self_heal = nested(value, &["spec", "syncPolicy", "automated", "selfHeal"])
    .and_then(Value::as_bool)
    .unwrap_or(false);

  Some(GitOpsResource {
    kind,
    depends_on: BTreeSet::new(),
    name,
    namespace,
    status,
    source: nested_string(value, &["spec", "source", "repoURL"]).unwrap_or_default(),
    source_kind: String::new(),
    path: nested_string(value, &["spec", "source", "path"]).unwrap_or_default(),
    inventory_count,
    last_applied: parse_time(nested_string(value, &[
      "status",
      "operationState",
      "finishedAt",
    ])),
    auto_sync: automated,
    self_heal,
  })
}

/// Shorten a Flux artifact revision (`main@sha1:deadbeef…`) for display
fn short_revision(revision: &str) -> String {
  match revision.split_once("sha1:") {
    Some((prefix, digest)) => format!("{prefix}sha1:{}", &digest[..digest.len().min(8)]),
    None => revision.to_string(),
  }
}

/// Project a Flux source payload (GitRepository/OCIRepository/HelmRepository)
pub fn parse_git_source(kind: GitSourceKind, value: &Value) -> Option<GitSourceInfo> {
  let name = nested_string(value, &["metadata", "name"])?;
  let namespace = nested_string(value, &["metadata", "namespace"]).unwrap_or_default();
  let (status, _) = ready_condition(value);

  Some(GitSourceInfo {
    kind,
    name,
    namespace,
    url: nested_string(value, &["spec", "url"]).unwrap_or_default(),
    branch: nested_string(value, &["spec", "ref", "branch"]).unwrap_or_default(),
    tag: nested_string(value, &["spec", "ref", "tag"]).unwrap_or_default(),
    revision: nested_string(value, &["status", "artifact", "revision"])
      .map(|r| short_revision(&r))
      .unwrap_or_default(),
    status,
    last_fetch: parse_time(nested_string(value, &["status", "artifact", "lastUpdateTime"])),
    interval: nested_string(value, &["spec", "interval"]).unwrap_or_default(),
    deployers: BTreeSet::new(),
  })
}

/// Fill each source's `deployers` set from the Flux deployers referencing it
pub fn link_sources(sources: &mut [GitSourceInfo], deployers: &[GitOpsResource]) {
  for source in sources.iter_mut() {
    for deployer in deployers {
      if deployer.source == source.name && deployer.source_kind == source.kind.to_string() {
        source.deployers.insert(format!("{}/{}", deployer.kind, deployer.name));
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parse_workload_full() {
    let v = json!({
      "apiVersion": "apps/v1",
      "metadata": {
        "name": "web",
        "namespace": "prod",
        "labels": {"confighub.com/UnitSlug": "web-prod"},
        "annotations": {"confighub.com/RevisionNum": "7"},
        "creationTimestamp": "2026-01-02T03:04:05Z"
      },
      "status": {
        "conditions": [
          {"type": "Ready", "status": "True", "lastTransitionTime": "2026-01-03T00:00:00Z"}
        ]
      }
    });

    let entry = parse_workload("kind-local", "Deployment", &v).unwrap();
    assert_eq!(entry.id.key(), "kind-local/prod/apps/Deployment/web");
    assert_eq!(entry.owner, Owner::Hub);
    assert_eq!(entry.status, WorkloadStatus::Ready);
    assert_eq!(entry.unit_slug(), Some("web-prod"));
    assert_eq!(entry.revision_num(), Some(7));
    assert!(entry.created_at.is_some());
  }

  #[test]
  fn parse_workload_without_conditions_is_unknown() {
    let v = json!({"metadata": {"name": "web", "namespace": "default"}});
    let entry = parse_workload("c", "Deployment", &v).unwrap();
    assert_eq!(entry.status, WorkloadStatus::Unknown);
    // No label map, no annotation map, no owner refs: no ownership evidence
    assert_eq!(entry.owner, Owner::Unknown);
  }

  #[test]
  fn parse_workload_with_empty_label_map_is_native() {
    let v = json!({"metadata": {"name": "web", "namespace": "default", "labels": {}}});
    let entry = parse_workload("c", "Deployment", &v).unwrap();
    assert_eq!(entry.owner, Owner::Native);
  }

  #[test]
  fn parse_workload_not_ready() {
    let v = json!({
      "metadata": {"name": "web", "namespace": "default"},
      "status": {"conditions": [{"type": "Ready", "status": "False"}]}
    });
    let entry = parse_workload("c", "StatefulSet", &v).unwrap();
    assert_eq!(entry.status, WorkloadStatus::NotReady);
  }

  #[test]
  fn parse_workload_missing_name_is_none() {
    let v = json!({"metadata": {"namespace": "default"}});
    assert!(parse_workload("c", "Deployment", &v).is_none());
  }

  #[test]
  fn parse_kustomization() {
    let v = json!({
      "metadata": {"name": "apps", "namespace": "flux-system"},
      "spec": {
        "path": "./apps",
        "sourceRef": {"kind": "GitRepository", "name": "fleet"},
        "dependsOn": [{"name": "infra"}, {"name": "crds", "namespace": "crds-ns"}]
      },
      "status": {
        "conditions": [{"type": "Ready", "status": "True"}],
        "inventory": {"entries": [{}, {}]}
      }
    });

    let r = parse_flux_deployer(GitOpsKind::Kustomization, &v).unwrap();
    assert_eq!(r.status, GitOpsStatus::Ready);
    assert_eq!(r.inventory_count, 2);
    assert_eq!(r.source, "fleet");
    assert_eq!(r.source_kind, "GitRepository");
    assert!(r.depends_on.contains("flux-system/infra"));
    assert!(r.depends_on.contains("crds-ns/crds"));
  }

  #[test]
  fn parse_helm_release_chart_ref() {
    let v = json!({
      "metadata": {"name": "podinfo", "namespace": "default"},
      "spec": {
        "chart": {"spec": {"chart": "podinfo", "sourceRef": {"kind": "HelmRepository", "name": "podinfo-repo"}}}
      }
    });

    let r = parse_flux_deployer(GitOpsKind::HelmRelease, &v).unwrap();
    assert_eq!(r.source, "podinfo-repo");
    assert_eq!(r.path, "podinfo");
    assert_eq!(r.status, GitOpsStatus::Unknown);
  }

  #[test]
  fn parse_argo_application_health_and_self_heal() {
    let v = json!({
      "metadata": {"name": "shop", "namespace": "argocd"},
      "spec": {
        "source": {"repoURL": "https://git.example.com/shop.git", "path": "deploy"},
        "syncPolicy": {"automated": {"selfHeal": true}}
      },
      "status": {
        "health": {"status": "Healthy"},
        "resources": [{}, {}, {}]
      }
    });

    let r = parse_argo_deployer(GitOpsKind::Application, &v).unwrap();
    assert_eq!(r.status, GitOpsStatus::Healthy);
    assert_eq!(r.inventory_count, 3);
    assert!(r.auto_sync);
    assert!(r.self_heal);
  }

  #[test]
  fn parse_argo_application_no_health_is_unknown() {
    let v = json!({"metadata": {"name": "shop", "namespace": "argocd"}, "spec": {}});
    let r = parse_argo_deployer(GitOpsKind::Application, &v).unwrap();
    assert_eq!(r.status, GitOpsStatus::Unknown);
    assert!(!r.auto_sync);
  }

  #[test]
  fn parse_git_source_artifact() {
    let v = json!({
      "metadata": {"name": "fleet", "namespace": "flux-system"},
      "spec": {
        "url": "https://git.example.com/fleet.git",
        "ref": {"branch": "main"},
        "interval": "1m0s"
      },
      "status": {
        "conditions": [{"type": "Ready", "status": "True"}],
        "artifact": {
          "revision": "main@sha1:0123456789abcdef0123456789abcdef01234567",
          "lastUpdateTime": "2026-02-01T00:00:00Z"
        }
      }
    });

    let s = parse_git_source(GitSourceKind::GitRepository, &v).unwrap();
    assert_eq!(s.branch, "main");
    assert_eq!(s.revision, "main@sha1:01234567");
    assert_eq!(s.interval, "1m0s");
    assert!(s.last_fetch.is_some());
  }

  #[test]
  fn parse_git_source_missing_fields_are_empty() {
    let v = json!({"metadata": {"name": "bare", "namespace": "flux-system"}});
    let s = parse_git_source(GitSourceKind::HelmRepository, &v).unwrap();
    assert!(s.url.is_empty());
    assert!(s.revision.is_empty());
    assert!(s.last_fetch.is_none());
    assert_eq!(s.status, GitOpsStatus::Unknown);
  }

  #[test]
  fn link_sources_matches_kind_and_name() {
    let mut sources = vec![
      parse_git_source(
        GitSourceKind::GitRepository,
        &json!({"metadata": {"name": "fleet", "namespace": "flux-system"}}),
      )
      .unwrap(),
    ];
    let deployers = vec![
      parse_flux_deployer(
        GitOpsKind::Kustomization,
        &json!({
          "metadata": {"name": "apps", "namespace": "flux-system"},
          "spec": {"sourceRef": {"kind": "GitRepository", "name": "fleet"}}
        }),
      )
      .unwrap(),
      parse_flux_deployer(
        GitOpsKind::Kustomization,
        &json!({
          "metadata": {"name": "other", "namespace": "flux-system"},
          "spec": {"sourceRef": {"kind": "OCIRepository", "name": "fleet"}}
        }),
      )
      .unwrap(),
    ];

    link_sources(&mut sources, &deployers);
    assert_eq!(sources[0].deployers.len(), 1);
    assert!(sources[0].deployers.contains("Kustomization/apps"));
  }
}
