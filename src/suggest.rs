//! Groups unmanaged workloads into proposed ConfigHub units

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tabled::{Table, Tabled, settings::Style};

use crate::{k8s::resources::MapEntry, ownership::Owner};

/// Environment-style namespace suffixes recognized during grouping
const VARIANT_SUFFIXES: &[&str] = &[
  "-prod",
  "-production",
  "-prd",
  "-staging",
  "-stg",
  "-stage",
  "-dev",
  "-development",
  "-test",
  "-qa",
  "-canary",
  "-preview",
];

const APP_NAME_LABELS: &[&str] = &[
  "app.kubernetes.io/name",
  "app.kubernetes.io/instance",
  "app.kubernetes.io/part-of",
  "app",
];

/// Reference to a live workload included in a proposed unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
  pub kind: String,
  pub name: String,
  pub namespace: String,
}

/// One proposed unit covering an (app, variant) group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposedUnit {
  pub slug: String,
  pub app: String,
  pub variant: String,
  pub tier: String,
  pub labels: BTreeMap<String, String>,
  pub status: String,
  pub workloads: Vec<WorkloadRef>,
  pub hub_bases: Vec<String>,
}

/// Per-variant reconciliation defaults carried by the proposal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRule {
  pub variant: String,
  pub interval: String,
  pub prune: bool,
  pub self_heal: bool,
}

impl ReconciliationRule {
  /// Defaults: reconcile every 5m, prune removed resources, leave self-heal
  /// off so manual interventions stay visible
  pub fn for_variant(variant: &str) -> Self {
    Self {
      variant: variant.to_string(),
      interval: "5m".to_string(),
      prune: true,
      self_heal: false,
    }
  }
}

/// A proposed Hub/AppSpace import covering a set of workloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportProposal {
  pub app_space: String,
  pub deployer: Owner,
  pub rules: Vec<ReconciliationRule>,
  pub units: Vec<ProposedUnit>,
}

/// Lower-case, replace anything outside `[a-z0-9-]`, collapse runs, and trim
/// stray dashes. Idempotent; empty input sanitizes to `app`.
pub fn sanitize(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut last_dash = false;

  for ch in raw.to_lowercase().chars() {
    let mapped = if ch.is_ascii_alphanumeric() { ch } else { '-' };
    if mapped == '-' {
      if !last_dash {
        out.push('-');
      }
      last_dash = true;
    } else {
      out.push(mapped);
      last_dash = false;
    }
  }

  let trimmed = out.trim_matches('-');
  if trimmed.is_empty() {
    "app".to_string()
  } else {
    trimmed.to_string()
  }
}

/// Strip a recognized environment suffix, returning the stem and the variant
/// the suffix names
pub fn namespace_stem(namespace: &str) -> (String, Option<String>) {
  for suffix in VARIANT_SUFFIXES {
    if let Some(stem) = namespace.strip_suffix(suffix) {
      if !stem.is_empty() {
        return (stem.to_string(), Some(suffix[1..].to_string()));
      }
    }
  }
  (namespace.to_string(), None)
}

/// App name: first non-empty app label, else the namespace stem, else the
/// workload's own name
pub fn app_name_for(entry: &MapEntry) -> String {
  for label in APP_NAME_LABELS {
    if let Some(value) = entry.labels.get(*label) {
      if !value.is_empty() {
        return value.clone();
      }
    }
  }

  let (stem, _) = namespace_stem(&entry.id.namespace);
  if !stem.is_empty() {
    return stem;
  }

  entry.id.name.clone()
}

/// Variant: `environment`/`env` label, else the recognized namespace suffix,
/// else `default`
pub fn variant_for(entry: &MapEntry) -> String {
  for label in ["environment", "env"] {
    if let Some(value) = entry.labels.get(label) {
      if !value.is_empty() {
        return value.clone();
      }
    }
  }

  let (_, variant) = namespace_stem(&entry.id.namespace);
  variant.unwrap_or_else(|| "default".to_string())
}

/// Filter the workload set down to candidates for import: unmanaged, not
/// already labeled with a unit, and outside the excluded namespaces
pub fn unmanaged_workloads(entries: &[MapEntry], excluded_namespaces: &[String]) -> Vec<MapEntry> {
  entries
    .iter()
    .filter(|e| e.owner.is_unmanaged())
    .filter(|e| e.unit_slug().is_none())
    .filter(|e| !excluded_namespaces.contains(&e.id.namespace))
    .cloned()
    .collect()
}

/// Group workloads into proposed units by (app, variant) and elect the
/// proposal's deployer. Deterministic given a stable input order.
pub fn propose(app_space: &str, workloads: &[MapEntry]) -> ImportProposal {
  let mut units: Vec<ProposedUnit> = Vec::new();
  let mut variants: Vec<String> = Vec::new();

  for entry in workloads {
    let app = app_name_for(entry);
    let variant = variant_for(entry);
    let slug = if variant == "default" {
      sanitize(&app)
    } else {
      sanitize(&format!("{app}-{variant}"))
    };

    if !variants.contains(&variant) {
      variants.push(variant.clone());
    }

    let workload_ref = WorkloadRef {
      kind: entry.id.kind.clone(),
      name: entry.id.name.clone(),
      namespace: entry.id.namespace.clone(),
    };

    match units.iter_mut().find(|u| u.slug == slug) {
      Some(unit) => {
        if !unit.workloads.contains(&workload_ref) {
          unit.workloads.push(workload_ref);
        }
      }
      None => {
        let tier = entry
          .labels
          .get("app.kubernetes.io/component")
          .cloned()
          .unwrap_or_default();
        units.push(ProposedUnit {
          slug: slug.clone(),
          app: app.clone(),
          variant: variant.clone(),
          tier,
          labels: BTreeMap::from([
            ("app".to_string(), sanitize(&app)),
            ("variant".to_string(), variant.clone()),
          ]),
          status: "proposed".to_string(),
          workloads: vec![workload_ref],
          hub_bases: Vec::new(),
        });
      }
    }
  }

  // Most common non-Native owner wins; ties break by first appearance
  let mut owner_order: Vec<Owner> = Vec::new();
  let mut owner_counts: BTreeMap<Owner, usize> = BTreeMap::new();
  for entry in workloads {
    if !entry.owner.is_unmanaged() {
      if !owner_order.contains(&entry.owner) {
        owner_order.push(entry.owner);
      }
      *owner_counts.entry(entry.owner).or_insert(0) += 1;
    }
  }
  let mut deployer = Owner::Native;
  let mut best = 0;
  for owner in &owner_order {
    let count = owner_counts.get(owner).copied().unwrap_or(0);
    if count > best {
      best = count;
      deployer = *owner;
    }
  }

  ImportProposal {
    app_space: app_space.to_string(),
    deployer,
    rules: variants.iter().map(|v| ReconciliationRule::for_variant(v)).collect(),
    units,
  }
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct ProposalRow {
  unit: String,
  app: String,
  variant: String,
  workloads: usize,
}

/// Render a proposal as a stdout table
pub fn proposal_table(proposal: &ImportProposal) -> String {
  if proposal.units.is_empty() {
    return "No unmanaged workloads to propose units for\n".to_string();
  }

  let rows: Vec<ProposalRow> = proposal
    .units
    .iter()
    .map(|u| ProposalRow {
      unit: u.slug.clone(),
      app: u.app.clone(),
      variant: u.variant.clone(),
      workloads: u.workloads.len(),
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("Proposed space: {}\n{table}\n", proposal.app_space)
}
