pub mod nested;
pub mod relations;
pub mod resources;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, settings::Style};

use crate::{
  gateway::{ClusterClient, Gvr},
  k8s::relations::{PopulationItem, Relation, build_owns_relations, build_selects_relations, population_item},
  k8s::resources::{
    GitOpsKind, GitOpsResource, GitSourceInfo, GitSourceKind, MapEntry, link_sources, parse_argo_deployer,
    parse_flux_deployer, parse_git_source, parse_workload,
  },
  output::tabled_vec_to_string,
};

/// The apps/v1 workload GVRs the scanner walks
fn workload_gvrs() -> Vec<Gvr> {
  vec![
    Gvr::new("apps", "v1", "Deployment", "deployments"),
    Gvr::new("apps", "v1", "StatefulSet", "statefulsets"),
    Gvr::new("apps", "v1", "DaemonSet", "daemonsets"),
  ]
}

fn flux_deployer_gvrs() -> Vec<(GitOpsKind, Gvr)> {
  vec![
    (
      GitOpsKind::Kustomization,
      Gvr::new("kustomize.toolkit.fluxcd.io", "v1", "Kustomization", "kustomizations"),
    ),
    (
      GitOpsKind::HelmRelease,
      Gvr::new("helm.toolkit.fluxcd.io", "v2", "HelmRelease", "helmreleases"),
    ),
  ]
}

fn argo_deployer_gvrs() -> Vec<(GitOpsKind, Gvr)> {
  vec![
    (
      GitOpsKind::Application,
      Gvr::new("argoproj.io", "v1alpha1", "Application", "applications"),
    ),
    (
      GitOpsKind::ApplicationSet,
      Gvr::new("argoproj.io", "v1alpha1", "ApplicationSet", "applicationsets"),
    ),
  ]
}

/// Flux sources are served at v1 or v1beta2 depending on the installed
/// controller version; both are tried
fn source_gvrs(kind: GitSourceKind) -> Vec<Gvr> {
  let (k, plural) = match kind {
    GitSourceKind::GitRepository => ("GitRepository", "gitrepositories"),
    GitSourceKind::OciRepository => ("OCIRepository", "ocirepositories"),
    GitSourceKind::HelmRepository => ("HelmRepository", "helmrepositories"),
  };
  vec![
    Gvr::new("source.toolkit.fluxcd.io", "v1", k, plural),
    Gvr::new("source.toolkit.fluxcd.io", "v1beta2", k, plural),
  ]
}

/// Everything one pass over the cluster produces
#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterScan {
  pub cluster: String,
  pub entries: Vec<MapEntry>,
  pub gitops: Vec<GitOpsResource>,
  pub sources: Vec<GitSourceInfo>,
  pub relations: Vec<Relation>,
  pub namespaces: Vec<String>,
}

/// List one GVR, swallowing failures: an uninstalled CRD contributes nothing
/// and must not take sibling data sources down with it
async fn list_or_skip<C: ClusterClient>(client: &C, gvr: &Gvr, namespace: Option<&str>) -> Vec<serde_json::Value> {
  match client.list(gvr, namespace).await {
    Ok(items) => items,
    Err(err) => {
      tracing::debug!("Skipping {}: {err}", gvr.kind);
      Vec::new()
    }
  }
}

/// Rebuild the whole MapEntry/GitOpsResource/GitSourceInfo population from the
/// live cluster. The record sets are not incrementally updated; each scan
/// replaces the previous one.
pub async fn scan_cluster<C: ClusterClient>(
  client: &C,
  cluster_name: &str,
  namespace: Option<&str>,
) -> Result<ClusterScan> {
  let mut entries = Vec::new();
  let mut population: Vec<PopulationItem> = Vec::new();

  for gvr in workload_gvrs() {
    for value in list_or_skip(client, &gvr, namespace).await {
      if let Some(entry) = parse_workload(cluster_name, &gvr.kind, &value) {
        entries.push(entry);
      }
      if let Some(item) = population_item(cluster_name, &gvr.group, &gvr.kind, &value) {
        population.push(item);
      }
    }
  }

  // ReplicaSets complete the Deployment -> ReplicaSet -> Pod ownership chain
  for value in list_or_skip(client, &Gvr::new("apps", "v1", "ReplicaSet", "replicasets"), namespace).await {
    if let Some(item) = population_item(cluster_name, "apps", "ReplicaSet", &value) {
      population.push(item);
    }
  }

  let mut pods = Vec::new();
  for value in list_or_skip(client, &Gvr::new("", "v1", "Pod", "pods"), namespace).await {
    if let Some(item) = population_item(cluster_name, "", "Pod", &value) {
      pods.push(item);
    }
  }

  let mut services = Vec::new();
  for value in list_or_skip(client, &Gvr::new("", "v1", "Service", "services"), namespace).await {
    if let Some(item) = population_item(cluster_name, "", "Service", &value) {
      services.push(item);
    }
  }

  let mut gitops = Vec::new();
  for (kind, gvr) in flux_deployer_gvrs() {
    for value in list_or_skip(client, &gvr, namespace).await {
      if let Some(resource) = parse_flux_deployer(kind, &value) {
        gitops.push(resource);
      }
    }
  }
  for (kind, gvr) in argo_deployer_gvrs() {
    for value in list_or_skip(client, &gvr, namespace).await {
      if let Some(resource) = parse_argo_deployer(kind, &value) {
        gitops.push(resource);
      }
    }
  }

  let mut sources = Vec::new();
  for kind in [
    GitSourceKind::GitRepository,
    GitSourceKind::OciRepository,
    GitSourceKind::HelmRepository,
  ] {
    for gvr in source_gvrs(kind) {
      let values = match client.list(&gvr, namespace).await {
        Ok(values) => values,
        Err(err) => {
          tracing::debug!("Skipping {} {}: {err}", gvr.version, gvr.kind);
          continue;
        }
      };
      for value in &values {
        if let Some(source) = parse_git_source(kind, value) {
          sources.push(source);
        }
      }
      // Served at this version; don't double-list the fallback
      break;
    }
  }
  link_sources(&mut sources, &gitops);

  population.extend(pods.iter().cloned());
  population.extend(services.iter().cloned());

  let mut relations = build_owns_relations(&population);
  relations.extend(build_selects_relations(&services, &pods));

  let namespaces = client.list_namespaces().await.unwrap_or_default();

  Ok(ClusterScan {
    cluster: cluster_name.to_string(),
    entries,
    gitops,
    sources,
    relations,
    namespaces,
  })
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct WorkloadRow {
  kind: String,
  name: String,
  namespace: String,
  owner: String,
  details: String,
  status: String,
}

/// Render the live workload map as a stdout table
pub fn workloads_table(entries: &[MapEntry]) -> String {
  if entries.is_empty() {
    return "No workloads found\n".to_string();
  }

  let rows: Vec<WorkloadRow> = entries
    .iter()
    .map(|e| WorkloadRow {
      kind: e.id.kind.clone(),
      name: e.id.name.clone(),
      namespace: e.id.namespace.clone(),
      owner: e.owner.to_string(),
      details: e
        .owner_details
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(" "),
      status: e.status.to_string(),
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct GitOpsRow {
  kind: String,
  name: String,
  namespace: String,
  status: String,
  source: String,
  path: String,
  inventory: usize,
  #[tabled(rename = "DEPENDS ON")]
  depends_on: String,
}

/// Render the GitOps deployer set as a stdout table
pub fn gitops_table(gitops: &[GitOpsResource]) -> String {
  if gitops.is_empty() {
    return "No GitOps deployers found\n".to_string();
  }

  let rows: Vec<GitOpsRow> = gitops
    .iter()
    .map(|g| GitOpsRow {
      kind: g.kind.to_string(),
      name: g.name.clone(),
      namespace: g.namespace.clone(),
      status: g.status.to_string(),
      source: g.source.clone(),
      path: g.path.clone(),
      inventory: g.inventory_count,
      depends_on: tabled_vec_to_string(&g.depends_on.iter().cloned().collect::<Vec<_>>()),
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct SourceRow {
  kind: String,
  name: String,
  url: String,
  #[tabled(rename = "REF")]
  reference: String,
  revision: String,
  interval: String,
  status: String,
  deployers: String,
}

/// Render the Flux source set as a stdout table
pub fn sources_table(sources: &[GitSourceInfo]) -> String {
  if sources.is_empty() {
    return "No git sources found\n".to_string();
  }

  let rows: Vec<SourceRow> = sources
    .iter()
    .map(|s| SourceRow {
      kind: s.kind.to_string(),
      name: s.name.clone(),
      url: s.url.clone(),
      reference: if s.tag.is_empty() { s.branch.clone() } else { s.tag.clone() },
      revision: s.revision.clone(),
      interval: s.interval.clone(),
      status: s.status.to_string(),
      deployers: tabled_vec_to_string(&s.deployers.iter().cloned().collect::<Vec<_>>()),
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}
