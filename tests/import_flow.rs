mod common;

use std::collections::BTreeMap;
use std::sync::Mutex;

use common::{fixtures, mock_gateway::{MockCluster, MockHub, ops_log}};
use cub_scout::import::{ArgoCleanupChoice, ImportOptions, ImportSource, ImportState, run_import};
use serde_json::json;

fn options(source: ImportSource) -> ImportOptions {
  ImportOptions {
    source,
    namespace: Some("shop".to_string()),
    app: Some("shop-app".to_string()),
    space: "shop".to_string(),
    worker: "w1".to_string(),
    combine: false,
    cleanup: ArgoCleanupChoice::DisableAutoSync,
    test: false,
    context: "kind-local".to_string(),
  }
}

/// Hub with an already-running worker, so the machine skips the wait loops
fn hub_with_worker(ops: common::mock_gateway::OpsLog) -> MockHub {
  MockHub {
    workers: Mutex::new(BTreeMap::from([(
      "shop".to_string(),
      vec![fixtures::worker("w1", true)],
    )])),
    ops,
    ..Default::default()
  }
}

// ============================================================================
// Kubernetes imports
// ============================================================================

#[tokio::test]
async fn kubernetes_import_end_to_end() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());
  let cluster = MockCluster {
    objects: BTreeMap::from([(
      "deployments".to_string(),
      vec![
        fixtures::deployment("shop", "web", "u1", json!({})),
        fixtures::deployment("elsewhere", "other", "u2", json!({})),
      ],
    )]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };

  let outcome = run_import(options(ImportSource::Kubernetes), &hub, &cluster).await.unwrap();

  assert_eq!(outcome.state, ImportState::Complete);
  assert_eq!(outcome.units, vec!["shop-web"]);
  assert_eq!(outcome.imported_failed, 0);
  assert_eq!(outcome.applied_success, 1);
  assert_eq!(outcome.applied_failed, 0);

  let log = ops.lock().unwrap().clone();
  assert!(log.contains(&"space create shop".to_string()));
  assert!(log.contains(&"context use shop".to_string()));
  assert!(log.contains(&"unit create shop/shop-web".to_string()));
  assert!(log.iter().any(|op| op.starts_with("label Deployment shop/web confighub.com/UnitSlug=shop-web")));
  assert!(log.contains(&"unit apply shop/shop-web".to_string()));

  // Namespace scoping kept the other namespace out
  assert!(!log.iter().any(|op| op.contains("other")));
}

#[tokio::test]
async fn inventory_is_stripped_before_apply() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());
  let cluster = MockCluster {
    objects: BTreeMap::from([(
      "deployments".to_string(),
      vec![fixtures::deployment("shop", "web", "u1", json!({}))],
    )]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };

  run_import(options(ImportSource::Kubernetes), &hub, &cluster).await.unwrap();

  let log = ops.lock().unwrap().clone();
  let strip = log
    .iter()
    .position(|op| op.starts_with("strip Deployment shop/web"))
    .expect("inventory strip missing");
  let apply = log
    .iter()
    .position(|op| op == "unit apply shop/shop-web")
    .expect("apply missing");
  assert!(strip < apply, "stale inventory must be stripped before apply");
  assert!(log[strip].contains("config.k8s.io/owning-inventory"));
  assert!(log[strip].contains("cli-utils.sigs.k8s.io/inventory-id"));
}

#[tokio::test]
async fn already_imported_workloads_are_skipped() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());
  let cluster = MockCluster {
    objects: BTreeMap::from([(
      "deployments".to_string(),
      vec![fixtures::deployment(
        "shop",
        "web",
        "u1",
        json!({"confighub.com/UnitSlug": "already-there"}),
      )],
    )]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };

  let outcome = run_import(options(ImportSource::Kubernetes), &hub, &cluster).await.unwrap();

  assert_eq!(outcome.state, ImportState::Complete);
  assert!(outcome.units.is_empty());
  let log = ops.lock().unwrap().clone();
  assert!(!log.iter().any(|op| op.starts_with("unit create")));
}

#[tokio::test]
async fn import_requires_namespace_for_kubernetes_source() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());
  let cluster = MockCluster {
    context: "kind-local".to_string(),
    ops,
    ..Default::default()
  };

  let mut opts = options(ImportSource::Kubernetes);
  opts.namespace = None;
  let err = run_import(opts, &hub, &cluster).await.unwrap_err();
  assert!(err.to_string().contains("--namespace"));
}

// ============================================================================
// ArgoCD imports
// ============================================================================

#[tokio::test]
async fn argo_import_runs_cleanup_before_apply() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());
  let cluster = MockCluster {
    objects: BTreeMap::from([
      (
        "applications".to_string(),
        vec![fixtures::argo_application(
          "shop-app",
          "argocd",
          true,
          json!([{"kind": "Deployment", "namespace": "shop", "name": "web"}]),
        )],
      ),
      (
        "deployments".to_string(),
        vec![
          fixtures::deployment("shop", "web", "u1", json!({})),
          fixtures::deployment("shop", "unmanaged", "u2", json!({})),
        ],
      ),
    ]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };

  let mut opts = options(ImportSource::Argocd);
  opts.combine = true;
  let outcome = run_import(opts, &hub, &cluster).await.unwrap();

  assert_eq!(outcome.state, ImportState::Complete);
  assert_eq!(outcome.units, vec!["shop-app"]);

  let log = ops.lock().unwrap().clone();
  let cleanup = log
    .iter()
    .position(|op| op == "patch applications argocd/shop-app")
    .expect("auto-sync disable missing");
  let apply = log
    .iter()
    .position(|op| op == "unit apply shop/shop-app")
    .expect("apply missing");
  assert!(cleanup < apply, "selfHeal would revert mutations applied before cleanup");

  // Only the application's managed resources were imported
  assert!(!log.iter().any(|op| op.contains("unmanaged")));
}

#[tokio::test]
async fn argo_import_delete_application_cleanup() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());
  let cluster = MockCluster {
    objects: BTreeMap::from([
      (
        "applications".to_string(),
        vec![fixtures::argo_application(
          "shop-app",
          "argocd",
          false,
          json!([{"kind": "Deployment", "namespace": "shop", "name": "web"}]),
        )],
      ),
      (
        "deployments".to_string(),
        vec![fixtures::deployment("shop", "web", "u1", json!({}))],
      ),
    ]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };

  let mut opts = options(ImportSource::Argocd);
  opts.combine = true;
  opts.cleanup = ArgoCleanupChoice::DeleteApplication;
  run_import(opts, &hub, &cluster).await.unwrap();

  let log = ops.lock().unwrap().clone();
  assert!(log.contains(&"delete applications argocd/shop-app".to_string()));
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn importing_twice_creates_no_duplicate_units() {
  let ops = ops_log();
  let hub = hub_with_worker(ops.clone());

  // First run: the workload is unlabeled
  let cluster = MockCluster {
    objects: BTreeMap::from([(
      "deployments".to_string(),
      vec![fixtures::deployment("shop", "web", "u1", json!({}))],
    )]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };
  let outcome = run_import(options(ImportSource::Kubernetes), &hub, &cluster).await.unwrap();
  assert_eq!(outcome.units, vec!["shop-web"]);

  // Second run: the workload now carries the unit label the first run applied
  let relabeled = MockCluster {
    objects: BTreeMap::from([(
      "deployments".to_string(),
      vec![fixtures::deployment(
        "shop",
        "web",
        "u1",
        json!({"confighub.com/UnitSlug": "shop-web"}),
      )],
    )]),
    namespaces: vec!["shop".to_string()],
    context: "kind-local".to_string(),
    ops: ops.clone(),
    ..Default::default()
  };
  let outcome = run_import(options(ImportSource::Kubernetes), &hub, &relabeled).await.unwrap();
  assert!(outcome.units.is_empty(), "no new units on re-import");

  let creates = ops
    .lock()
    .unwrap()
    .iter()
    .filter(|op| op.starts_with("unit create"))
    .count();
  assert_eq!(creates, 1);
}
