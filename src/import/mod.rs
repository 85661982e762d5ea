//! The import orchestrator: a finite-state machine for discovering,
//! extracting, creating, labeling, applying, and verifying imports.
//!
//! The machine itself is not a task. `step` is a pure transition over the
//! machine's state; every side effect is a command the runner executes,
//! yielding further messages. Transitions are testable in isolation.

mod runner;

pub use runner::{ImportOptions, ImportOutcome, run_import};

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::{gateway::types::Target, ownership::Owner, suggest};

/// Poll period for worker readiness and target discovery
pub const POLL_INTERVAL_SECS: u64 = 2;
/// Worker readiness polling gives up after 30 s and continues with a warning
pub const WORKER_READY_ATTEMPTS: u32 = 15;
/// Target discovery polling gives up after 60 s and continues with a warning
pub const TARGET_ATTEMPTS: u32 = 30;

/// Annotations stripped from live resources before `unit apply`
pub const STALE_INVENTORY_ANNOTATIONS: &[&str] = &[
  "config.k8s.io/owning-inventory",
  "cli-utils.sigs.k8s.io/inventory-id",
  "confighub.com/UnitSlug",
];
/// Labels stripped from live resources before `unit apply`
pub const STALE_INVENTORY_LABELS: &[&str] = &["confighub.com/UnitSlug"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ImportSource {
  #[default]
  Kubernetes,
  Argocd,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum ArgoCleanupChoice {
  /// Remove the automated sync policy so the controller stops reverting edits
  #[default]
  DisableAutoSync,
  /// Delete the ArgoCD application outright
  DeleteApplication,
  /// Leave the application untouched
  KeepAsIs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitStructure {
  /// One unit per selected workload
  #[default]
  PerWorkload,
  /// One combined unit per ArgoCD application
  Combined,
}

/// Reference to the deployer that owns a discovered workload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitOpsRef {
  pub kind: String,
  pub name: String,
  pub namespace: String,
}

/// One row of an import proposal
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WorkloadInfo {
  pub kind: String,
  pub name: String,
  pub namespace: String,
  pub owner: Owner,
  pub labels: BTreeMap<String, String>,
  pub ready: bool,
  pub source_repo: String,
  pub source_path: String,
  pub gitops_ref: Option<GitOpsRef>,
  pub extracted_config: String,
  pub config_error: Option<String>,
  /// Non-empty when the workload is already imported
  pub unit_slug: String,
}

/// A unit created during the import, with the live workloads it covers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedUnit {
  pub slug: String,
  pub workloads: Vec<GitOpsRef>,
}

/// States of the import machine. `Source` is the deliberate initial state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportState {
  Source,
  ChooseNamespace,
  ChooseArgoApp,
  Setup,
  CreatingSpace,
  CreatingWorker,
  WaitingWorkerReady,
  WaitingTarget,
  Discovering,
  Selection,
  UnitStructure,
  ExtractingConfig,
  Importing,
  ArgoCleanup,
  Applying,
  Testing,
  Complete,
}

/// Messages posted back to the machine by the runner
#[derive(Clone, Debug)]
pub enum ImportMsg {
  SourceChosen(ImportSource),
  NamespaceChosen(String),
  ArgoAppChosen {
    name: String,
    namespace: String,
    self_heal: bool,
  },
  SetupConfirmed,
  SpaceCreated {
    existed: bool,
    error: Option<String>,
  },
  WorkerCreated {
    existed: bool,
    error: Option<String>,
  },
  WorkerStarted {
    error: Option<String>,
  },
  WorkerReadyTick {
    ready: bool,
  },
  TargetTick {
    targets: Vec<Target>,
  },
  WorkloadsDiscovered {
    workloads: Vec<WorkloadInfo>,
    error: Option<String>,
  },
  SelectionMade {
    indices: Vec<usize>,
  },
  StructureChosen(UnitStructure),
  ConfigExtracted {
    workloads: Vec<WorkloadInfo>,
  },
  UnitsCreated {
    units: Vec<CreatedUnit>,
    failed: usize,
    error: Option<String>,
  },
  CleanupDone {
    error: Option<String>,
  },
  Applied {
    success: usize,
    failed: usize,
  },
  TestDone {
    error: Option<String>,
  },
}

/// Commands the runner executes on behalf of the machine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportCmd {
  CreateSpace { slug: String },
  CreateWorker { space: String, slug: String },
  StartWorker { space: String, slug: String },
  PollWorkerReady { space: String, slug: String },
  PollTarget { space: String },
  DiscoverWorkloads,
  ExtractConfigs { indices: Vec<usize> },
  CreateUnits { indices: Vec<usize> },
  DoCleanup { choice: ArgoCleanupChoice },
  ApplyUnits { units: Vec<CreatedUnit> },
  RolloutRestart { unit: CreatedUnit },
}

/// The machine: current state plus everything accumulated along the way.
/// Errors surface on the machine without terminating it; warnings accumulate
/// rather than replacing earlier successes.
#[derive(Clone, Debug)]
pub struct ImportMachine {
  pub state: ImportState,
  pub source: ImportSource,
  pub space: String,
  pub worker: String,
  pub context: String,
  pub namespace: String,
  pub app: String,
  pub app_namespace: String,
  pub app_self_heal: bool,
  pub structure: UnitStructure,
  pub cleanup: ArgoCleanupChoice,
  pub test: bool,
  pub workloads: Vec<WorkloadInfo>,
  pub selected: Vec<usize>,
  pub created_units: Vec<CreatedUnit>,
  pub new_target_name: Option<String>,
  pub imported_failed: usize,
  pub applied: (usize, usize),
  pub warnings: Vec<String>,
  pub errors: Vec<String>,
  worker_attempts: u32,
  target_attempts: u32,
}

impl ImportMachine {
  pub fn new(space: &str, worker: &str, context: &str, cleanup: ArgoCleanupChoice, test: bool) -> Self {
    Self {
      state: ImportState::Source,
      source: ImportSource::Kubernetes,
      space: space.to_string(),
      worker: worker.to_string(),
      context: context.to_string(),
      namespace: String::new(),
      app: String::new(),
      app_namespace: "argocd".to_string(),
      app_self_heal: false,
      structure: UnitStructure::PerWorkload,
      cleanup,
      test,
      workloads: Vec::new(),
      selected: Vec::new(),
      created_units: Vec::new(),
      new_target_name: None,
      imported_failed: 0,
      applied: (0, 0),
      warnings: Vec::new(),
      errors: Vec::new(),
      worker_attempts: 0,
      target_attempts: 0,
    }
  }

  /// The target slug the worker is expected to auto-create for this context
  pub fn expected_target_slug(&self) -> String {
    format!("{}-kubernetes-yaml-{}", self.worker, self.context.replace('/', "-"))
  }

  /// Workloads eligible for selection: already-imported ones are filtered out
  pub fn selectable(&self) -> Vec<usize> {
    self
      .workloads
      .iter()
      .enumerate()
      .filter(|(_, w)| w.unit_slug.is_empty())
      .map(|(i, _)| i)
      .collect()
  }

  fn after_importing(&mut self) -> Vec<ImportCmd> {
    if self.source == ImportSource::Argocd {
      if self.cleanup == ArgoCleanupChoice::KeepAsIs && self.app_self_heal {
        self.warnings.push(format!(
          "application '{}' keeps selfHeal enabled; the controller may revert applied changes",
          self.app
        ));
      }
      self.state = ImportState::ArgoCleanup;
      vec![ImportCmd::DoCleanup { choice: self.cleanup }]
    } else {
      self.state = ImportState::Applying;
      vec![ImportCmd::ApplyUnits {
        units: self.created_units.clone(),
      }]
    }
  }

  /// One transition. Unexpected messages for the current state are dropped.
  pub fn step(&mut self, msg: ImportMsg) -> Vec<ImportCmd> {
    match (self.state, msg) {
      (ImportState::Source, ImportMsg::SourceChosen(source)) => {
        self.source = source;
        self.state = match source {
          ImportSource::Kubernetes => ImportState::ChooseNamespace,
          ImportSource::Argocd => ImportState::ChooseArgoApp,
        };
        Vec::new()
      }

      (ImportState::ChooseNamespace, ImportMsg::NamespaceChosen(namespace)) => {
        self.namespace = namespace;
        self.state = ImportState::Setup;
        Vec::new()
      }

      (
        ImportState::ChooseArgoApp,
        ImportMsg::ArgoAppChosen {
          name,
          namespace,
          self_heal,
        },
      ) => {
        self.app = name;
        self.app_namespace = namespace;
        self.app_self_heal = self_heal;
        self.state = ImportState::Setup;
        Vec::new()
      }

      (ImportState::Setup, ImportMsg::SetupConfirmed) => {
        self.state = ImportState::CreatingSpace;
        vec![ImportCmd::CreateSpace {
          slug: self.space.clone(),
        }]
      }

      (ImportState::CreatingSpace, ImportMsg::SpaceCreated { existed, error }) => {
        match error {
          Some(error) => {
            // Surfaced to the caller; the machine stays put for a retry
            self.errors.push(format!("space create: {error}"));
            Vec::new()
          }
          None => {
            if existed {
              self.warnings.push(format!("space '{}' already exists, reusing it", self.space));
            }
            self.state = ImportState::CreatingWorker;
            vec![ImportCmd::CreateWorker {
              space: self.space.clone(),
              slug: self.worker.clone(),
            }]
          }
        }
      }

      (ImportState::CreatingWorker, ImportMsg::WorkerCreated { existed, error }) => {
        if let Some(error) = error {
          self.errors.push(format!("worker create: {error}"));
          return Vec::new();
        }
        if existed {
          // An existing worker already has its target; skip the wait loops
          self.state = ImportState::Discovering;
          return vec![ImportCmd::DiscoverWorkloads];
        }
        vec![ImportCmd::StartWorker {
          space: self.space.clone(),
          slug: self.worker.clone(),
        }]
      }

      (ImportState::CreatingWorker, ImportMsg::WorkerStarted { error }) => {
        if let Some(error) = error {
          self.warnings.push(format!("worker start: {error}"));
        }
        self.state = ImportState::WaitingWorkerReady;
        self.worker_attempts = 0;
        vec![ImportCmd::PollWorkerReady {
          space: self.space.clone(),
          slug: self.worker.clone(),
        }]
      }

      (ImportState::WaitingWorkerReady, ImportMsg::WorkerReadyTick { ready }) => {
        self.worker_attempts += 1;
        if ready {
          self.state = ImportState::WaitingTarget;
          self.target_attempts = 0;
          return vec![ImportCmd::PollTarget {
            space: self.space.clone(),
          }];
        }
        if self.worker_attempts >= WORKER_READY_ATTEMPTS {
          self.warnings.push(format!(
            "worker '{}' not Ready after {}s; continuing without a running worker",
            self.worker,
            WORKER_READY_ATTEMPTS as u64 * POLL_INTERVAL_SECS
          ));
          self.state = ImportState::WaitingTarget;
          self.target_attempts = 0;
          return vec![ImportCmd::PollTarget {
            space: self.space.clone(),
          }];
        }
        vec![ImportCmd::PollWorkerReady {
          space: self.space.clone(),
          slug: self.worker.clone(),
        }]
      }

      (ImportState::WaitingTarget, ImportMsg::TargetTick { targets }) => {
        self.target_attempts += 1;
        let expected = self.expected_target_slug();

        let found = targets
          .iter()
          .find(|t| t.slug == expected)
          .or_else(|| {
            // Fallback: any Kubernetes target pinned to the current context
            targets.iter().find(|t| {
              t.toolchain.to_lowercase().contains("kubernetes")
                && t.parameters.get("KubeContext").map(String::as_str) == Some(self.context.as_str())
            })
          })
          .map(|t| t.slug.clone());

        if let Some(slug) = found {
          self.new_target_name = Some(slug);
          self.state = ImportState::Discovering;
          return vec![ImportCmd::DiscoverWorkloads];
        }
        if self.target_attempts >= TARGET_ATTEMPTS {
          self.warnings.push(format!(
            "no target matching '{expected}' after {}s; units must be targeted manually",
            TARGET_ATTEMPTS as u64 * POLL_INTERVAL_SECS
          ));
          self.state = ImportState::Discovering;
          return vec![ImportCmd::DiscoverWorkloads];
        }
        vec![ImportCmd::PollTarget {
          space: self.space.clone(),
        }]
      }

      (ImportState::Discovering, ImportMsg::WorkloadsDiscovered { workloads, error }) => {
        if let Some(error) = error {
          self.errors.push(format!("discovery: {error}"));
        }
        self.workloads = workloads;
        self.state = ImportState::Selection;
        Vec::new()
      }

      (ImportState::Selection, ImportMsg::SelectionMade { indices }) => {
        let selectable = self.selectable();
        self.selected = indices.into_iter().filter(|i| selectable.contains(i)).collect();
        if self.source == ImportSource::Argocd {
          self.state = ImportState::UnitStructure;
          Vec::new()
        } else {
          self.state = ImportState::ExtractingConfig;
          vec![ImportCmd::ExtractConfigs {
            indices: self.selected.clone(),
          }]
        }
      }

      (ImportState::UnitStructure, ImportMsg::StructureChosen(structure)) => {
        self.structure = structure;
        self.state = ImportState::ExtractingConfig;
        vec![ImportCmd::ExtractConfigs {
          indices: self.selected.clone(),
        }]
      }

      (ImportState::ExtractingConfig, ImportMsg::ConfigExtracted { workloads }) => {
        self.workloads = workloads;
        self.state = ImportState::Importing;
        vec![ImportCmd::CreateUnits {
          indices: self.selected.clone(),
        }]
      }

      (ImportState::Importing, ImportMsg::UnitsCreated { units, failed, error }) => {
        if let Some(error) = error {
          self.errors.push(format!("import: {error}"));
        }
        self.created_units = units;
        self.imported_failed = failed;
        // Partial imports advance regardless; counts are reported at the end
        self.after_importing()
      }

      (ImportState::ArgoCleanup, ImportMsg::CleanupDone { error }) => {
        if let Some(error) = error {
          self.warnings.push(format!("argocd cleanup: {error}"));
        }
        self.state = ImportState::Applying;
        vec![ImportCmd::ApplyUnits {
          units: self.created_units.clone(),
        }]
      }

      (ImportState::Applying, ImportMsg::Applied { success, failed }) => {
        self.applied = (success, failed);
        if self.test {
          if let Some(unit) = self.created_units.first().cloned() {
            self.state = ImportState::Testing;
            return vec![ImportCmd::RolloutRestart { unit }];
          }
        }
        self.state = ImportState::Complete;
        Vec::new()
      }

      (ImportState::Testing, ImportMsg::TestDone { error }) => {
        if let Some(error) = error {
          self.warnings.push(format!("pipeline test: {error}"));
        }
        self.state = ImportState::Complete;
        Vec::new()
      }

      (_, msg) => {
        tracing::debug!("Dropping message {msg:?} in state {:?}", self.state);
        Vec::new()
      }
    }
  }

  /// Slug for a unit covering one workload
  pub fn unit_slug_for(&self, workload: &WorkloadInfo) -> String {
    match self.structure {
      UnitStructure::Combined => suggest::sanitize(&self.app),
      UnitStructure::PerWorkload => suggest::sanitize(&format!("{}-{}", workload.namespace, workload.name)),
    }
  }
}
