//! Finds configuration issues in manifest files, the live cluster, and
//! textual scan reports

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  ccve::{Finding, RemedyType, Registry, ResourceRef, Severity},
  gateway::{ClusterClient, Gvr},
  k8s::nested::{nested, nested_slice, nested_str_map, nested_string},
};

const WORKLOAD_KINDS: &[&str] = &["Deployment", "StatefulSet", "DaemonSet"];

/// Categories a textual scan report groups its rows under
const REPORT_CATEGORIES: &[&str] = &[
  "STATE", "ORPHAN", "DRIFT", "CONFIG", "SOURCE", "RENDER", "APPLY", "DEPEND",
];

/// Build a finding, preferring catalog remedy data when the id is registered.
/// Unregistered ids still produce findings, just without an executable remedy.
fn finding(registry: &Registry, id: &str, namespace: Option<String>, resource: ResourceRef, message: String) -> Finding {
  match registry.get(id) {
    Some(def) => Finding {
      ccve_id: id.to_string(),
      namespace,
      resource: Some(resource),
      message,
      category: def.category.clone(),
      severity: def.severity,
      remedy_type: def.remedy_type,
      commands: def.commands.clone(),
      steps: def.steps.clone(),
      auto_fixable: def.is_auto_fixable(),
    },
    None => Finding {
      ccve_id: id.to_string(),
      namespace,
      resource: Some(resource),
      message,
      category: String::new(),
      severity: Severity::Info,
      remedy_type: RemedyType::Unsupported,
      commands: Vec::new(),
      steps: Vec::new(),
      auto_fixable: false,
    },
  }
}

fn containers(doc: &Value) -> Vec<&Value> {
  nested_slice(doc, &["spec", "template", "spec", "containers"])
    .map(|v| v.iter().collect())
    .unwrap_or_default()
}

fn check_workload_doc(registry: &Registry, doc: &Value, findings: &mut Vec<Finding>) {
  let Some(kind) = nested_string(doc, &["kind"]) else {
    return;
  };
  if !WORKLOAD_KINDS.contains(&kind.as_str()) {
    return;
  }
  let Some(name) = nested_string(doc, &["metadata", "name"]) else {
    return;
  };
  let namespace = nested_string(doc, &["metadata", "namespace"]);
  let resource = ResourceRef {
    kind: kind.clone(),
    name: name.clone(),
  };

  for container in containers(doc) {
    let cname = nested_string(container, &["name"]).unwrap_or_default();

    if nested(container, &["resources", "limits"]).is_none() {
      findings.push(finding(
        registry,
        "CCVE-2024-0101",
        namespace.clone(),
        resource.clone(),
        format!("container '{cname}' has no resource limits"),
      ));
    }

    if let Some(image) = nested_string(container, &["image"]) {
      let tag = image.rsplit_once(':').map(|(_, t)| t);
      let floating = match tag {
        Some("latest") | None => true,
        Some(t) => t.contains('/'),
      };
      if floating {
        findings.push(finding(
          registry,
          "CCVE-2024-0102",
          namespace.clone(),
          resource.clone(),
          format!("container '{cname}' image '{image}' is not pinned"),
        ));
      }
    }

    if nested(container, &["readinessProbe"]).is_none() {
      findings.push(finding(
        registry,
        "CCVE-2024-0103",
        namespace.clone(),
        resource.clone(),
        format!("container '{cname}' has no readiness probe"),
      ));
    }
  }

  if namespace.as_deref().unwrap_or("default") == "default" {
    findings.push(finding(
      registry,
      "CCVE-2024-0104",
      namespace.clone(),
      resource,
      format!("{kind} '{name}' targets the default namespace"),
    ));
  }
}

/// Static analysis of a multi-document manifest file
pub fn scan_file(registry: &Registry, path: &str) -> Result<Vec<Finding>> {
  let contents = std::fs::read_to_string(path).with_context(|| format!("Failed to read manifest: {path}"))?;
  scan_manifest(registry, &contents).with_context(|| format!("Failed to parse manifest: {path}"))
}

/// Static analysis of manifest text, split on YAML document boundaries
pub fn scan_manifest(registry: &Registry, contents: &str) -> Result<Vec<Finding>> {
  let mut findings = Vec::new();

  for document in contents.split("\n---") {
    if document.trim().is_empty() {
      continue;
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(document).context("Invalid YAML document")?;
    let doc = serde_json::to_value(yaml).context("Invalid YAML document")?;
    check_workload_doc(registry, &doc, &mut findings);
  }

  Ok(findings)
}

/// Discover dangling and orphaned resources in the live cluster
pub async fn scan_cluster<C: ClusterClient>(registry: &Registry, client: &C) -> Result<Vec<Finding>> {
  let mut findings = Vec::new();

  let services = client
    .list(&Gvr::new("", "v1", "Service", "services"), None)
    .await
    .unwrap_or_default();
  let pods = client
    .list(&Gvr::new("", "v1", "Pod", "pods"), None)
    .await
    .unwrap_or_default();

  for service in &services {
    let Some(name) = nested_string(service, &["metadata", "name"]) else {
      continue;
    };
    let namespace = nested_string(service, &["metadata", "namespace"]).unwrap_or_default();
    let selector = nested_str_map(service, &["spec", "selector"]);
    if selector.is_empty() {
      continue;
    }

    let selected = pods.iter().any(|pod| {
      nested_string(pod, &["metadata", "namespace"]).as_deref() == Some(namespace.as_str()) && {
        let labels = nested_str_map(pod, &["metadata", "labels"]);
        selector.iter().all(|(k, v)| labels.get(k) == Some(v))
      }
    });

    if !selected {
      findings.push(finding(
        registry,
        "CCVE-2024-0201",
        Some(namespace),
        ResourceRef {
          kind: "Service".to_string(),
          name,
        },
        "service selector matches no pods".to_string(),
      ));
    }
  }

  let deployments = client
    .list(&Gvr::new("apps", "v1", "Deployment", "deployments"), None)
    .await
    .unwrap_or_default();
  let deployment_uids: Vec<String> = deployments
    .iter()
    .filter_map(|d| nested_string(d, &["metadata", "uid"]))
    .collect();

  let replicasets = client
    .list(&Gvr::new("apps", "v1", "ReplicaSet", "replicasets"), None)
    .await
    .unwrap_or_default();

  for rs in &replicasets {
    let Some(name) = nested_string(rs, &["metadata", "name"]) else {
      continue;
    };
    let namespace = nested_string(rs, &["metadata", "namespace"]).unwrap_or_default();

    let owned = nested_slice(rs, &["metadata", "ownerReferences"]).is_some_and(|refs| {
      refs.iter().any(|r| {
        nested_string(r, &["uid"]).is_some_and(|uid| deployment_uids.contains(&uid))
      })
    });

    if !owned {
      findings.push(finding(
        registry,
        "CCVE-2024-0202",
        Some(namespace),
        ResourceRef {
          kind: "ReplicaSet".to_string(),
          name,
        },
        "replica set has no living owner".to_string(),
      ));
    }
  }

  Ok(findings)
}

/// One row parsed from a textual scan report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFinding {
  pub category: String,
  pub severity: Severity,
  pub ccve_id: String,
  pub message: String,
}

fn parse_report_row(line: &str) -> Option<(Severity, String, String)> {
  let line = line.trim();
  let rest = line.strip_prefix('[')?;
  let severity = Severity::from_letter(rest.chars().next()?)?;
  let rest = rest.get(1..)?.strip_prefix(']')?.trim_start();

  let rest = rest.strip_prefix("CCVE-")?;
  let (digits, tail) = rest.split_at_checked(9)?;
  let mut parts = digits.split('-');
  let year = parts.next()?;
  let number = parts.next()?;
  if year.len() != 4 || number.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) || !number.chars().all(|c| c.is_ascii_digit()) {
    return None;
  }

  let message = tail.trim_start_matches([':', ' ', '\t']).to_string();
  Some((severity, format!("CCVE-{digits}"), message))
}

/// Parse the line-oriented scan format: category headers followed by
/// `[C|W|I|S] CCVE-YYYY-NNNN: message` rows
pub fn parse_report(text: &str) -> Vec<ReportFinding> {
  let mut findings = Vec::new();
  let mut category = String::new();

  for line in text.lines() {
    let trimmed = line.trim().trim_end_matches(':');
    if REPORT_CATEGORIES.contains(&trimmed) {
      category = trimmed.to_string();
      continue;
    }

    if let Some((severity, ccve_id, message)) = parse_report_row(line) {
      findings.push(ReportFinding {
        category: category.clone(),
        severity,
        ccve_id,
        message,
      });
    }
  }

  findings
}
