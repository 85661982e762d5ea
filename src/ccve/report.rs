//! Stdout rendering for scan findings

use tabled::{Table, Tabled, settings::Style};

use crate::ccve::Finding;

#[derive(Tabled)]
#[tabled(rename_all = "UpperCase")]
struct FindingRow {
  #[tabled(rename = " ")]
  symbol: String,
  ccve: String,
  severity: String,
  resource: String,
  namespace: String,
  message: String,
  #[tabled(rename = "AUTO-FIX")]
  auto_fix: String,
}

/// Render findings as a stdout table, worst severity first
pub fn findings_table(findings: &[Finding]) -> String {
  if findings.is_empty() {
    return "No findings\n".to_string();
  }

  let mut sorted: Vec<&Finding> = findings.iter().collect();
  sorted.sort_by_key(|f| match f.severity {
    crate::ccve::Severity::Critical => 0,
    crate::ccve::Severity::Warning => 1,
    crate::ccve::Severity::State => 2,
    crate::ccve::Severity::Info => 3,
  });

  let rows: Vec<FindingRow> = sorted
    .iter()
    .map(|f| FindingRow {
      symbol: f.severity.symbol(),
      ccve: f.ccve_id.clone(),
      severity: f.severity.to_string(),
      resource: f
        .resource
        .as_ref()
        .map(|r| format!("{}/{}", r.kind, r.name))
        .unwrap_or_default(),
      namespace: f.namespace.clone().unwrap_or_default(),
      message: f.message.clone(),
      auto_fix: if f.auto_fixable { "yes".to_string() } else { "no".to_string() },
    })
    .collect();

  let mut table = Table::new(rows);
  table.with(Style::sharp());
  format!("{table}\n")
}
