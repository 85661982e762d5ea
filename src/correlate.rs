//! Cross-links Hub units with live workloads by fingerprint

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, settings::Style};

use crate::{gateway::types::Unit, k8s::resources::MapEntry};

/// A correlated workload trailing its unit's head revision
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriftEntry {
  pub unit_slug: String,
  pub kind: String,
  pub name: String,
  pub namespace: String,
  pub workload_revision: i64,
  pub head_revision: i64,
}

impl DriftEntry {
  pub fn behind_by(&self) -> i64 {
    self.head_revision - self.workload_revision
  }
}

/// Output of one correlation pass over the unit and workload sets
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CorrelationReport {
  /// unit slug → live workloads realizing it, in discovery order
  pub correlated: BTreeMap<String, Vec<MapEntry>>,
  /// Workloads not managed by any recognized deployer nor the Hub
  pub orphans: Vec<MapEntry>,
  /// Correlated workloads behind their unit's head revision
  pub drift: Vec<DriftEntry>,
}

/// A unit is in sync when head and live revisions agree and neither the
/// drift nor sync status fields report divergence
pub fn unit_in_sync(unit: &Unit) -> bool {
  unit.head_revision == unit.live_revision
    && matches!(unit.drift.as_str(), "" | "NotDrifted" | "N/A")
    && matches!(unit.sync_status.as_str(), "" | "InSync")
}

/// Pick the unit a workload namespace heuristically belongs to.
///
/// A unit is a candidate when its slug equals the namespace, or one is a
/// `-`-separated prefix of the other. Candidates are ranked lexicographically
/// by slug and the first wins, making the choice deterministic when several
/// units share a fragment.
pub fn heuristic_unit_for<'a>(namespace: &str, units: &'a [Unit]) -> Option<&'a str> {
  if namespace.is_empty() {
    return None;
  }

  let mut candidates: Vec<&str> = units
    .iter()
    .map(|u| u.slug.as_str())
    .filter(|slug| {
      !slug.is_empty()
        && (*slug == namespace
          || namespace.starts_with(&format!("{slug}-"))
          || slug.starts_with(&format!("{namespace}-")))
    })
    .collect();

  candidates.sort_unstable();
  candidates.first().copied()
}

/// Correlate the Hub unit set with the live workload set.
///
/// The `confighub.com/UnitSlug` label is authoritative; the namespace
/// heuristic only fills units the label left unclaimed and never overwrites
/// an authoritative link.
pub fn correlate(units: &[Unit], entries: &[MapEntry]) -> CorrelationReport {
  let mut report = CorrelationReport::default();
  for unit in units {
    report.correlated.insert(unit.slug.clone(), Vec::new());
  }

  let heads: BTreeMap<&str, i64> = units.iter().map(|u| (u.slug.as_str(), u.head_revision)).collect();

  for entry in entries {
    let labeled = entry.unit_slug().filter(|slug| heads.contains_key(slug));

    let slug = match labeled {
      Some(slug) => Some(slug.to_string()),
      None => heuristic_unit_for(&entry.id.namespace, units).map(ToString::to_string),
    };

    if let Some(slug) = slug {
      // Revision drift only applies to authoritatively linked workloads
      if labeled.is_some() {
        if let (Some(revision), Some(head)) = (entry.revision_num(), heads.get(slug.as_str())) {
          if revision < *head {
            report.drift.push(DriftEntry {
              unit_slug: slug.clone(),
              kind: entry.id.kind.clone(),
              name: entry.id.name.clone(),
              namespace: entry.id.namespace.clone(),
              workload_revision: revision,
              head_revision: *head,
            });
          }
        }
      }

      if let Some(list) = report.correlated.get_mut(&slug) {
        list.push(entry.clone());
      }
    }

    // Orphanhood is about management, not correlation: a heuristic match does
    // not make a workload managed
    let known_unit = entry.unit_slug().is_some_and(|slug| heads.contains_key(slug));
    if entry.owner.is_unmanaged() && !known_unit {
      report.orphans.push(entry.clone());
    }
  }

  report
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct CorrelationRow {
  unit: String,
  workloads: usize,
  #[tabled(rename = "IN SYNC")]
  in_sync: String,
}

/// Render unit → workload correlation counts as a stdout table
pub fn correlation_table(report: &CorrelationReport) -> String {
  if report.correlated.is_empty() {
    return "No units to correlate\n".to_string();
  }

  let rows: Vec<CorrelationRow> = report
    .correlated
    .iter()
    .map(|(slug, workloads)| CorrelationRow {
      unit: slug.clone(),
      workloads: workloads.len(),
      in_sync: if report.drift.iter().any(|d| &d.unit_slug == slug) {
        "behind".to_string()
      } else {
        "yes".to_string()
      },
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct OrphanRow {
  kind: String,
  name: String,
  namespace: String,
  status: String,
}

/// Render unmanaged workloads as a stdout table
pub fn orphans_table(orphans: &[MapEntry]) -> String {
  if orphans.is_empty() {
    return "No orphaned workloads\n".to_string();
  }

  let rows: Vec<OrphanRow> = orphans
    .iter()
    .map(|e| OrphanRow {
      kind: e.id.kind.clone(),
      name: e.id.name.clone(),
      namespace: e.id.namespace.clone(),
      status: e.status.to_string(),
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct DriftRow {
  unit: String,
  workload: String,
  #[tabled(rename = "LIVE REV")]
  live: i64,
  #[tabled(rename = "HEAD REV")]
  head: i64,
  #[tabled(rename = "BEHIND BY")]
  behind: i64,
}

/// Render revision drift as a stdout table
pub fn drift_table(drift: &[DriftEntry]) -> String {
  if drift.is_empty() {
    return "No revision drift\n".to_string();
  }

  let rows: Vec<DriftRow> = drift
    .iter()
    .map(|d| DriftRow {
      unit: d.unit_slug.clone(),
      workload: format!("{}/{}", d.kind, d.name),
      live: d.workload_revision,
      head: d.head_revision,
      behind: d.behind_by(),
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}
