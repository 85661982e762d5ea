//! Headless driver for the import machine: executes commands through the
//! gateway traits and feeds completion messages back until the machine
//! completes or stalls on an error

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;

use crate::{
  gateway::{ClusterClient, Gvr, HubClient},
  import::{
    ArgoCleanupChoice, CreatedUnit, GitOpsRef, ImportCmd, ImportMachine, ImportMsg, ImportSource, ImportState,
    POLL_INTERVAL_SECS, STALE_INVENTORY_ANNOTATIONS, STALE_INVENTORY_LABELS, UnitStructure, WorkloadInfo,
  },
  k8s::nested::{nested, nested_slice, nested_string},
  k8s::resources::{WorkloadStatus, parse_workload},
  ownership::UNIT_SLUG_KEY,
};

/// Caller-supplied inputs for one headless import run
#[derive(Clone, Debug)]
pub struct ImportOptions {
  pub source: ImportSource,
  pub namespace: Option<String>,
  pub app: Option<String>,
  pub space: String,
  pub worker: String,
  pub combine: bool,
  pub cleanup: ArgoCleanupChoice,
  pub test: bool,
  pub context: String,
}

/// What the run accomplished, successes and failures accumulated side by side
#[derive(Debug)]
pub struct ImportOutcome {
  pub state: ImportState,
  pub units: Vec<String>,
  pub imported_failed: usize,
  pub applied_success: usize,
  pub applied_failed: usize,
  pub target: Option<String>,
  pub warnings: Vec<String>,
  pub errors: Vec<String>,
}

impl ImportOutcome {
  pub fn summary(&self) -> String {
    let mut out = String::new();
    if self.state == ImportState::Complete {
      out.push_str(&format!(
        "Import complete: {} unit(s) created, {} failed; {} applied, {} apply failures\n",
        self.units.len(),
        self.imported_failed,
        self.applied_success,
        self.applied_failed
      ));
    } else {
      out.push_str(&format!("Import stopped in state {:?}\n", self.state));
    }
    for unit in &self.units {
      out.push_str(&format!("  unit {unit}\n"));
    }
    if let Some(target) = &self.target {
      out.push_str(&format!("  target {target}\n"));
    }
    for warning in &self.warnings {
      out.push_str(&format!("  warning: {warning}\n"));
    }
    for error in &self.errors {
      out.push_str(&format!("  error: {error}\n"));
    }
    out.trim_end().to_string()
  }
}

fn argo_app_gvr() -> Gvr {
  Gvr::new("argoproj.io", "v1alpha1", "Application", "applications")
}

/// Run a full import. Required inputs are validated up front; everything else
/// surfaces on the outcome rather than aborting the run.
pub async fn run_import<H: HubClient, C: ClusterClient>(
  opts: ImportOptions,
  hub: &H,
  cluster: &C,
) -> Result<ImportOutcome> {
  let mut machine = ImportMachine::new(&opts.space, &opts.worker, &opts.context, opts.cleanup, opts.test);
  let mut queue: VecDeque<ImportMsg> = VecDeque::from([ImportMsg::SourceChosen(opts.source)]);

  while machine.state != ImportState::Complete {
    let msg = match queue.pop_front() {
      Some(msg) => msg,
      None => match input_for_state(&machine, &opts, cluster).await? {
        Some(msg) => msg,
        // Stalled: an error was recorded and no further input applies
        None => break,
      },
    };

    let cmds = machine.step(msg);
    for cmd in cmds {
      let msg = execute_cmd(cmd, &machine, hub, cluster).await;
      queue.push_back(msg);
    }
  }

  Ok(ImportOutcome {
    state: machine.state,
    units: machine.created_units.iter().map(|u| u.slug.clone()).collect(),
    imported_failed: machine.imported_failed,
    applied_success: machine.applied.0,
    applied_failed: machine.applied.1,
    target: machine.new_target_name.clone(),
    warnings: machine.warnings.clone(),
    errors: machine.errors.clone(),
  })
}

/// Supply the caller's answer for states that wait on input
async fn input_for_state<C: ClusterClient>(
  machine: &ImportMachine,
  opts: &ImportOptions,
  cluster: &C,
) -> Result<Option<ImportMsg>> {
  match machine.state {
    ImportState::ChooseNamespace => {
      let namespace = opts
        .namespace
        .clone()
        .context("--namespace is required for Kubernetes imports")?;
      Ok(Some(ImportMsg::NamespaceChosen(namespace)))
    }
    ImportState::ChooseArgoApp => {
      let name = opts.app.clone().context("--app is required for ArgoCD imports")?;
      let apps = cluster
        .list(&argo_app_gvr(), None)
        .await
        .context("list argocd applications")?;
      let app = apps
        .iter()
        .find(|a| nested_string(a, &["metadata", "name"]).as_deref() == Some(name.as_str()))
        .with_context(|| format!("ArgoCD application '{name}' not found"))?;

      Ok(Some(ImportMsg::ArgoAppChosen {
        name,
        namespace: nested_string(app, &["metadata", "namespace"]).unwrap_or_else(|| "argocd".to_string()),
        self_heal: nested(app, &["spec", "syncPolicy", "automated", "selfHeal"])
          .and_then(serde_json::Value::as_bool)
          .unwrap_or(false),
      }))
    }
    ImportState::Setup => Ok(Some(ImportMsg::SetupConfirmed)),
    ImportState::Selection => Ok(Some(ImportMsg::SelectionMade {
      indices: machine.selectable(),
    })),
    ImportState::UnitStructure => Ok(Some(ImportMsg::StructureChosen(if opts.combine {
      UnitStructure::Combined
    } else {
      UnitStructure::PerWorkload
    }))),
    _ => Ok(None),
  }
}

async fn execute_cmd<H: HubClient, C: ClusterClient>(
  cmd: ImportCmd,
  machine: &ImportMachine,
  hub: &H,
  cluster: &C,
) -> ImportMsg {
  match cmd {
    ImportCmd::CreateSpace { slug } => match hub.space_create(&slug).await {
      Ok(_) => {
        // The new space becomes the active context
        if let Err(err) = hub.context_use(&slug).await {
          tracing::warn!("context use {slug}: {err}");
        }
        ImportMsg::SpaceCreated {
          existed: false,
          error: None,
        }
      }
      Err(err) if err.to_string().contains("exist") => {
        if let Err(err) = hub.context_use(&slug).await {
          tracing::warn!("context use {slug}: {err}");
        }
        ImportMsg::SpaceCreated {
          existed: true,
          error: None,
        }
      }
      Err(err) => ImportMsg::SpaceCreated {
        existed: false,
        error: Some(err.to_string()),
      },
    },

    ImportCmd::CreateWorker { space, slug } => {
      let existing = hub
        .worker_list(&space)
        .await
        .map(|workers| workers.iter().any(|w| w.slug == slug))
        .unwrap_or(false);
      if existing {
        return ImportMsg::WorkerCreated {
          existed: true,
          error: None,
        };
      }
      match hub.worker_create(&space, &slug).await {
        Ok(_) => ImportMsg::WorkerCreated {
          existed: false,
          error: None,
        },
        Err(err) => ImportMsg::WorkerCreated {
          existed: false,
          error: Some(err.to_string()),
        },
      }
    }

    ImportCmd::StartWorker { space, slug } => match hub.worker_run(&space, &slug).await {
      Ok(()) => ImportMsg::WorkerStarted { error: None },
      Err(err) => ImportMsg::WorkerStarted {
        error: Some(err.to_string()),
      },
    },

    ImportCmd::PollWorkerReady { space, slug } => {
      tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
      let ready = hub
        .worker_list(&space)
        .await
        .map(|workers| workers.iter().any(|w| w.slug == slug && w.is_ready()))
        .unwrap_or(false);
      ImportMsg::WorkerReadyTick { ready }
    }

    ImportCmd::PollTarget { space } => {
      tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
      let targets = hub.target_list(&space).await.unwrap_or_default();
      ImportMsg::TargetTick { targets }
    }

    ImportCmd::DiscoverWorkloads => discover_workloads(machine, cluster).await,

    ImportCmd::ExtractConfigs { indices } => {
      let mut workloads = machine.workloads.clone();
      for index in indices {
        let Some(workload) = workloads.get_mut(index) else {
          continue;
        };
        // Best-effort: a failed extraction is captured per workload and never
        // aborts the batch
        match cluster
          .get_manifest(&workload.kind, &workload.namespace, &workload.name)
          .await
        {
          Ok(manifest) => workload.extracted_config = manifest,
          Err(err) => workload.config_error = Some(err.to_string()),
        }
      }
      ImportMsg::ConfigExtracted { workloads }
    }

    ImportCmd::CreateUnits { indices } => create_units(machine, &indices, hub, cluster).await,

    ImportCmd::DoCleanup { choice } => {
      let result = match choice {
        ArgoCleanupChoice::KeepAsIs => Ok(()),
        ArgoCleanupChoice::DisableAutoSync => {
          cluster
            .patch(
              &argo_app_gvr(),
              &machine.app_namespace,
              &machine.app,
              json!({"spec": {"syncPolicy": null}}),
            )
            .await
        }
        ArgoCleanupChoice::DeleteApplication => {
          cluster.delete(&argo_app_gvr(), &machine.app_namespace, &machine.app).await
        }
      };
      ImportMsg::CleanupDone {
        error: result.err().map(|e| e.to_string()),
      }
    }

    ImportCmd::ApplyUnits { units } => apply_units(machine, &units, hub, cluster).await,

    ImportCmd::RolloutRestart { unit } => {
      let mut error = None;
      if let Some(workload) = unit.workloads.first() {
        if let Err(err) = cluster
          .rollout_restart(&workload.kind, &workload.namespace, &workload.name)
          .await
        {
          error = Some(err.to_string());
        }
      }

      // Await livedata: the worker should report a live revision shortly
      if error.is_none() {
        let mut live = false;
        for _ in 0..5 {
          tokio::time::sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
          if let Ok(fresh) = hub.unit_get(&machine.space, &unit.slug).await {
            if fresh.live_revision > 0 {
              live = true;
              break;
            }
          }
        }
        if !live {
          error = Some(format!("unit '{}' reported no live revision", unit.slug));
        }
      }

      ImportMsg::TestDone { error }
    }
  }
}

async fn discover_workloads<C: ClusterClient>(machine: &ImportMachine, cluster: &C) -> ImportMsg {
  let workload_gvrs = [
    Gvr::new("apps", "v1", "Deployment", "deployments"),
    Gvr::new("apps", "v1", "StatefulSet", "statefulsets"),
    Gvr::new("apps", "v1", "DaemonSet", "daemonsets"),
  ];

  // For ArgoCD imports the population is the application's managed resources
  let argo_managed: Option<Vec<(String, String, String)>> = if machine.source == ImportSource::Argocd {
    match cluster.list(&argo_app_gvr(), None).await {
      Ok(apps) => {
        let app = apps
          .iter()
          .find(|a| nested_string(a, &["metadata", "name"]).as_deref() == Some(machine.app.as_str()));
        match app {
          Some(app) => Some(
            nested_slice(app, &["status", "resources"])
              .map(|resources| {
                resources
                  .iter()
                  .filter_map(|r| {
                    Some((
                      nested_string(r, &["kind"])?,
                      nested_string(r, &["namespace"]).unwrap_or_default(),
                      nested_string(r, &["name"])?,
                    ))
                  })
                  .collect()
              })
              .unwrap_or_default(),
          ),
          None => {
            return ImportMsg::WorkloadsDiscovered {
              workloads: Vec::new(),
              error: Some(format!("ArgoCD application '{}' not found", machine.app)),
            };
          }
        }
      }
      Err(err) => {
        return ImportMsg::WorkloadsDiscovered {
          workloads: Vec::new(),
          error: Some(err.to_string()),
        };
      }
    }
  } else {
    None
  };

  let namespace = if machine.source == ImportSource::Kubernetes {
    Some(machine.namespace.as_str())
  } else {
    None
  };

  let mut workloads = Vec::new();
  let mut error = None;

  for gvr in &workload_gvrs {
    let values = match cluster.list(gvr, namespace).await {
      Ok(values) => values,
      Err(err) => {
        error = Some(err.to_string());
        continue;
      }
    };

    for value in &values {
      let Some(entry) = parse_workload(&machine.context, &gvr.kind, value) else {
        continue;
      };

      if let Some(managed) = &argo_managed {
        let key = (entry.id.kind.clone(), entry.id.namespace.clone(), entry.id.name.clone());
        if !managed.contains(&key) {
          continue;
        }
      }

      let gitops_ref = entry
        .owner_details
        .get("kustomization")
        .map(|name| GitOpsRef {
          kind: "Kustomization".to_string(),
          name: name.clone(),
          namespace: entry.owner_details.get("namespace").cloned().unwrap_or_default(),
        })
        .or_else(|| {
          entry.owner_details.get("application").map(|name| GitOpsRef {
            kind: "Application".to_string(),
            name: name.clone(),
            namespace: machine.app_namespace.clone(),
          })
        });

      workloads.push(WorkloadInfo {
        kind: entry.id.kind.clone(),
        name: entry.id.name.clone(),
        namespace: entry.id.namespace.clone(),
        owner: entry.owner,
        labels: entry.labels.clone(),
        ready: entry.status == WorkloadStatus::Ready,
        source_repo: String::new(),
        source_path: String::new(),
        gitops_ref,
        extracted_config: String::new(),
        config_error: None,
        unit_slug: entry.unit_slug().unwrap_or_default().to_string(),
      });
    }
  }

  ImportMsg::WorkloadsDiscovered { workloads, error }
}

async fn create_units<H: HubClient, C: ClusterClient>(
  machine: &ImportMachine,
  indices: &[usize],
  hub: &H,
  cluster: &C,
) -> ImportMsg {
  let mut units: Vec<CreatedUnit> = Vec::new();
  let mut failed = 0;

  let selected: Vec<&WorkloadInfo> = indices.iter().filter_map(|i| machine.workloads.get(*i)).collect();

  let groups: Vec<(String, Vec<&WorkloadInfo>)> = match machine.structure {
    UnitStructure::Combined => {
      if selected.is_empty() {
        Vec::new()
      } else {
        vec![(machine.unit_slug_for(selected[0]), selected.clone())]
      }
    }
    UnitStructure::PerWorkload => selected
      .iter()
      .map(|w| (machine.unit_slug_for(w), vec![*w]))
      .collect(),
  };

  for (slug, members) in groups {
    let configs: Vec<&str> = members
      .iter()
      .filter(|w| w.config_error.is_none() && !w.extracted_config.is_empty())
      .map(|w| w.extracted_config.as_str())
      .collect();

    if configs.is_empty() {
      failed += members.len();
      continue;
    }
    let manifest = configs.join("\n---\n");

    let labels = BTreeMap::from([("ImportedFrom".to_string(), machine.context.clone())]);
    if let Err(err) = hub.unit_create(&machine.space, &slug, &manifest, &labels).await {
      tracing::warn!("unit create {slug}: {err}");
      failed += members.len();
      continue;
    }

    if let Some(target) = &machine.new_target_name {
      // best-effort: a missing target only means manual targeting later
      if let Err(err) = hub.unit_set_target(&machine.space, &slug, target).await {
        tracing::warn!("unit set-target {slug}: {err}");
      }
    }

    let mut refs = Vec::new();
    for workload in members {
      if let Err(err) = cluster
        .apply_label(&workload.kind, &workload.namespace, &workload.name, UNIT_SLUG_KEY, &slug)
        .await
      {
        tracing::warn!("label {}/{}: {err}", workload.kind, workload.name);
      }
      refs.push(GitOpsRef {
        kind: workload.kind.clone(),
        name: workload.name.clone(),
        namespace: workload.namespace.clone(),
      });
    }

    units.push(CreatedUnit { slug, workloads: refs });
  }

  ImportMsg::UnitsCreated {
    units,
    failed,
    error: None,
  }
}

async fn apply_units<H: HubClient, C: ClusterClient>(
  machine: &ImportMachine,
  units: &[CreatedUnit],
  hub: &H,
  cluster: &C,
) -> ImportMsg {
  let mut success = 0;
  let mut failed = 0;

  for unit in units {
    // Stale inventory markers confuse apply's ownership tracking; stripping
    // them is best-effort and never blocks the apply itself
    for workload in &unit.workloads {
      let _ = cluster
        .remove_metadata(
          &workload.kind,
          &workload.namespace,
          &workload.name,
          STALE_INVENTORY_ANNOTATIONS,
          STALE_INVENTORY_LABELS,
        )
        .await;
    }

    match hub.unit_apply(&machine.space, &unit.slug).await {
      Ok(()) => success += 1,
      Err(err) => {
        tracing::warn!("unit apply {}: {err}", unit.slug);
        failed += 1;
      }
    }
  }

  ImportMsg::Applied { success, failed }
}
