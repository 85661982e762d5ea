//! Plans, validates, executes, and audits remedies for findings

mod audit;

pub use audit::{AuditLog, AuditStatus, parse_audit_line};

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::{
  ccve::{Finding, RemedyType, Registry},
  gateway::{ClusterClient, gvr_for_kind},
};

/// High-risk remedies refuse to run without explicit confirmation
#[derive(Debug)]
pub struct ConfirmationRequired {
  pub ccve_id: String,
}

impl std::fmt::Display for ConfirmationRequired {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    write!(
      f,
      "{} is a high-risk remedy; re-run with --force to confirm",
      self.ccve_id
    )
  }
}

impl std::error::Error for ConfirmationRequired {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

impl std::fmt::Display for RiskLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      RiskLevel::Low => write!(f, "low"),
      RiskLevel::Medium => write!(f, "medium"),
      RiskLevel::High => write!(f, "high"),
    }
  }
}

/// One executable step of a remedy plan
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemedyAction {
  pub description: String,
  /// argv; catalog commands must not rely on shell quoting
  pub command: Vec<String>,
  /// A failed ignorable action does not abort the remaining actions
  pub ignorable: bool,
}

/// Ordered actions with an overall risk assessment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemedyPlan {
  pub finding: Finding,
  pub actions: Vec<RemedyAction>,
  pub risk_level: RiskLevel,
  pub reversible: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionOutcome {
  pub action: String,
  pub success: bool,
  pub output: String,
  pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemedyResult {
  pub success: bool,
  pub message: String,
  pub actions: Vec<ActionOutcome>,
  pub rollback_cmd: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ExecuteOpts {
  pub dry_run: bool,
  pub force: bool,
  /// Per-action timeout
  pub timeout: Duration,
}

impl Default for ExecuteOpts {
  fn default() -> Self {
    Self {
      dry_run: false,
      force: false,
      timeout: Duration::from_secs(30),
    }
  }
}

/// Substitute `{kind}`, `{name}`, and `{namespace}` placeholders from the
/// finding; unknown placeholders pass through untouched
fn expand(template: &str, finding: &Finding) -> String {
  let mut out = template.to_string();
  if let Some(resource) = &finding.resource {
    out = out.replace("{kind}", &resource.kind.to_lowercase());
    out = out.replace("{name}", &resource.name);
  }
  if let Some(namespace) = &finding.namespace {
    out = out.replace("{namespace}", namespace);
  }
  out
}

fn catalog_actions(finding: &Finding) -> Vec<RemedyAction> {
  finding
    .commands
    .iter()
    .map(|command| RemedyAction {
      description: expand(command, finding),
      command: expand(command, finding).split_whitespace().map(ToString::to_string).collect(),
      ignorable: false,
    })
    .collect()
}

/// Build the ordered action plan for a finding. Pure: the plan depends only
/// on the finding (which already carries its registry snapshot).
pub fn plan(finding: &Finding) -> RemedyPlan {
  let (actions, risk_level, reversible) = match finding.remedy_type {
    RemedyType::DeleteResource => {
      let mut actions = Vec::new();
      if let (Some(resource), Some(namespace)) = (&finding.resource, &finding.namespace) {
        actions.push(RemedyAction {
          description: format!("Capture {}/{} for rollback", resource.kind, resource.name),
          command: vec![
            "kubectl".to_string(),
            "get".to_string(),
            resource.kind.to_lowercase(),
            resource.name.clone(),
            "-n".to_string(),
            namespace.clone(),
            "-o".to_string(),
            "yaml".to_string(),
          ],
          ignorable: true,
        });
      }
      if finding.commands.is_empty() {
        if let (Some(resource), Some(namespace)) = (&finding.resource, &finding.namespace) {
          actions.push(RemedyAction {
            description: format!("Delete {}/{}", resource.kind, resource.name),
            command: vec![
              "kubectl".to_string(),
              "delete".to_string(),
              resource.kind.to_lowercase(),
              resource.name.clone(),
              "-n".to_string(),
              namespace.clone(),
            ],
            ignorable: false,
          });
        }
      } else {
        actions.extend(catalog_actions(finding));
      }
      (actions, RiskLevel::High, false)
    }
    RemedyType::Restart => {
      let actions = if finding.commands.is_empty() {
        match (&finding.resource, &finding.namespace) {
          (Some(resource), Some(namespace)) => vec![RemedyAction {
            description: format!("Rollout-restart {}/{}", resource.kind, resource.name),
            command: vec![
              "kubectl".to_string(),
              "rollout".to_string(),
              "restart".to_string(),
              format!("{}/{}", resource.kind.to_lowercase(), resource.name),
              "-n".to_string(),
              namespace.clone(),
            ],
            ignorable: false,
          }],
          _ => Vec::new(),
        }
      } else {
        catalog_actions(finding)
      };
      (actions, RiskLevel::Low, true)
    }
    RemedyType::ConfigFix | RemedyType::TriggerAction => (catalog_actions(finding), RiskLevel::Medium, true),
    RemedyType::Unsupported => (Vec::new(), RiskLevel::Low, false),
  };

  RemedyPlan {
    finding: finding.clone(),
    actions,
    risk_level,
    reversible,
  }
}

/// Pre-execution validation: the CCVE must be registered, and any specified
/// namespace and resource must exist in the cluster
pub async fn validate<C: ClusterClient>(finding: &Finding, registry: &Registry, client: &C) -> Result<()> {
  if registry.get(&finding.ccve_id).is_none() {
    bail!("CCVE {} not found in the catalog", finding.ccve_id);
  }

  if let Some(namespace) = &finding.namespace {
    if !client
      .namespace_exists(namespace)
      .await
      .with_context(|| format!("validate namespace {namespace}"))?
    {
      bail!("Namespace '{namespace}' not found in the cluster");
    }

    if let Some(resource) = &finding.resource {
      if gvr_for_kind(&resource.kind).is_none() {
        bail!("Unsupported resource kind '{}'", resource.kind);
      }
      if !client
        .resource_exists(&resource.kind, namespace, &resource.name)
        .await
        .with_context(|| format!("validate resource {}/{}", resource.kind, resource.name))?
      {
        bail!("{} '{}' not found in namespace '{namespace}'", resource.kind, resource.name);
      }
    }
  }

  Ok(())
}

async fn run_action(action: &RemedyAction, timeout: Duration) -> ActionOutcome {
  let Some((program, args)) = action.command.split_first() else {
    return ActionOutcome {
      action: action.description.clone(),
      success: false,
      output: String::new(),
      error: Some("empty command".to_string()),
    };
  };

  let result = tokio::time::timeout(timeout, Command::new(program).args(args).output()).await;

  match result {
    Ok(Ok(output)) => {
      let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
      if output.status.success() {
        ActionOutcome {
          action: action.description.clone(),
          success: true,
          output: stdout,
          error: None,
        }
      } else {
        ActionOutcome {
          action: action.description.clone(),
          success: false,
          output: stdout,
          error: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        }
      }
    }
    Ok(Err(err)) => ActionOutcome {
      action: action.description.clone(),
      success: false,
      output: String::new(),
      error: Some(format!("failed to spawn: {err}")),
    },
    Err(_) => ActionOutcome {
      action: action.description.clone(),
      success: false,
      output: String::new(),
      error: Some(format!("timed out after {}s", timeout.as_secs())),
    },
  }
}

/// Execute a remedy: validate, gate on risk, then run the planned actions in
/// order, aborting on the first non-ignorable failure. Every attempt is
/// audited.
pub async fn execute<C: ClusterClient>(
  finding: &Finding,
  registry: &Registry,
  client: &C,
  opts: &ExecuteOpts,
  audit: &AuditLog,
) -> Result<RemedyResult> {
  validate(finding, registry, client).await?;

  let remedy_plan = plan(finding);

  if remedy_plan.risk_level == RiskLevel::High && !opts.force && !opts.dry_run {
    audit.append(AuditStatus::Failed, finding, "confirmation required")?;
    return Err(ConfirmationRequired {
      ccve_id: finding.ccve_id.clone(),
    }
    .into());
  }

  if opts.dry_run {
    audit.append(AuditStatus::DryRun, finding, "plan only, no mutations")?;
    return Ok(RemedyResult {
      success: true,
      message: format!("dry-run: {} action(s) planned", remedy_plan.actions.len()),
      actions: remedy_plan
        .actions
        .iter()
        .map(|a| ActionOutcome {
          action: a.description.clone(),
          success: true,
          output: "skipped (dry-run)".to_string(),
          error: None,
        })
        .collect(),
      rollback_cmd: None,
    });
  }

  if remedy_plan.actions.is_empty() {
    audit.append(AuditStatus::Failed, finding, "no executable remedy")?;
    return Ok(RemedyResult {
      success: false,
      message: format!("{} has no executable remedy", finding.ccve_id),
      actions: Vec::new(),
      rollback_cmd: None,
    });
  }

  // Rollback capture for destructive remedies, best-effort: a failed capture
  // is logged on the outcome but never blocks the remedy
  let mut rollback_cmd = None;
  if finding.remedy_type == RemedyType::DeleteResource {
    if let (Some(resource), Some(namespace)) = (&finding.resource, &finding.namespace) {
      match client.get_manifest(&resource.kind, namespace, &resource.name).await {
        Ok(manifest) => {
          let path = format!("rollback-{}-{}.yaml", finding.ccve_id, resource.name);
          if std::fs::write(&path, manifest).is_ok() {
            rollback_cmd = Some(format!("kubectl apply -f {path}"));
          }
        }
        Err(err) => tracing::warn!("Rollback capture failed: {err}"),
      }
    }
  }

  let mut outcomes = Vec::new();
  let mut success = true;
  let mut message = "remedy applied".to_string();

  for action in &remedy_plan.actions {
    let outcome = run_action(action, opts.timeout).await;
    let failed = !outcome.success;
    let ignorable = action.ignorable;
    let error = outcome.error.clone();
    outcomes.push(outcome);

    if failed && !ignorable {
      success = false;
      message = error.unwrap_or_else(|| "action failed".to_string());
      break;
    }
  }

  let status = if success { AuditStatus::Success } else { AuditStatus::Failed };
  audit.append(status, finding, &message)?;

  Ok(RemedyResult {
    success,
    message,
    actions: outcomes,
    rollback_cmd,
  })
}

/// One-line human summary for the CLI
pub fn result_summary(result: &RemedyResult) -> String {
  let mut out = String::new();
  for outcome in &result.actions {
    let mark = if outcome.success { "✔" } else { "✖" };
    out.push_str(&format!("{mark} {}\n", outcome.action));
    if let Some(error) = &outcome.error {
      out.push_str(&format!("  {error}\n"));
    }
  }
  out.push_str(&format!(
    "{}: {}",
    if result.success { "ok" } else { "failed" },
    result.message
  ));
  if let Some(rollback) = &result.rollback_cmd {
    out.push_str(&format!("\nrollback: {rollback}"));
  }
  out
}
