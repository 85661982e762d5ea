//! In-memory implementations of the gateway traits. Both mocks share an
//! operation log so tests can assert cross-client ordering.

use std::{
  collections::BTreeMap,
  sync::{Arc, Mutex},
};

use anyhow::{Result, bail};
use cub_scout::gateway::{
  ClusterClient, Gvr, HubClient,
  types::{HubContext, Organization, Space, Target, Unit, Worker},
};
use serde_json::Value;

pub type OpsLog = Arc<Mutex<Vec<String>>>;

pub fn ops_log() -> OpsLog {
  Arc::new(Mutex::new(Vec::new()))
}

#[derive(Default)]
pub struct MockHub {
  pub context: HubContext,
  pub organizations: Vec<Organization>,
  pub spaces: Mutex<Vec<Space>>,
  pub units: Mutex<BTreeMap<String, Vec<Unit>>>,
  pub targets: Mutex<BTreeMap<String, Vec<Target>>>,
  pub workers: Mutex<BTreeMap<String, Vec<Worker>>>,
  pub fail_unit_delete: Option<String>,
  pub ops: OpsLog,
}

impl MockHub {
  fn log(&self, op: String) {
    self.ops.lock().unwrap().push(op);
  }
}

impl HubClient for MockHub {
  async fn context_get(&self) -> Result<HubContext> {
    Ok(self.context.clone())
  }

  async fn context_use(&self, space: &str) -> Result<()> {
    self.log(format!("context use {space}"));
    Ok(())
  }

  async fn organization_list(&self) -> Result<Vec<Organization>> {
    Ok(self.organizations.clone())
  }

  async fn space_list(&self) -> Result<Vec<Space>> {
    Ok(self.spaces.lock().unwrap().clone())
  }

  async fn space_create(&self, slug: &str) -> Result<Space> {
    self.log(format!("space create {slug}"));
    let mut spaces = self.spaces.lock().unwrap();
    if spaces.iter().any(|s| s.slug == slug) {
      bail!("space '{slug}' already exists");
    }
    let space = Space {
      slug: slug.to_string(),
      ..Default::default()
    };
    spaces.push(space.clone());
    Ok(space)
  }

  async fn space_delete(&self, slug: &str) -> Result<()> {
    self.log(format!("space delete {slug}"));
    self.spaces.lock().unwrap().retain(|s| s.slug != slug);
    Ok(())
  }

  async fn unit_list(&self, space: &str) -> Result<Vec<Unit>> {
    Ok(self.units.lock().unwrap().get(space).cloned().unwrap_or_default())
  }

  async fn unit_get(&self, space: &str, slug: &str) -> Result<Unit> {
    self
      .units
      .lock()
      .unwrap()
      .get(space)
      .and_then(|units| units.iter().find(|u| u.slug == slug).cloned())
      .ok_or_else(|| anyhow::anyhow!("unit '{slug}' not found"))
  }

  async fn unit_create(
    &self,
    space: &str,
    slug: &str,
    _manifest: &str,
    labels: &BTreeMap<String, String>,
  ) -> Result<Unit> {
    self.log(format!("unit create {space}/{slug}"));
    let unit = Unit {
      slug: slug.to_string(),
      space: space.to_string(),
      head_revision: 1,
      live_revision: 1,
      labels: labels.clone(),
      ..Default::default()
    };
    self
      .units
      .lock()
      .unwrap()
      .entry(space.to_string())
      .or_default()
      .push(unit.clone());
    Ok(unit)
  }

  async fn unit_apply(&self, space: &str, slug: &str) -> Result<()> {
    self.log(format!("unit apply {space}/{slug}"));
    Ok(())
  }

  async fn unit_delete(&self, space: &str, slug: &str) -> Result<()> {
    self.log(format!("unit delete {space}/{slug}"));
    if self.fail_unit_delete.as_deref() == Some(slug) {
      bail!("unit '{slug}' is referenced by a target");
    }
    if let Some(units) = self.units.lock().unwrap().get_mut(space) {
      units.retain(|u| u.slug != slug);
    }
    Ok(())
  }

  async fn unit_set_target(&self, space: &str, slug: &str, target: &str) -> Result<()> {
    self.log(format!("unit set-target {space}/{slug} {target}"));
    Ok(())
  }

  async fn target_list(&self, space: &str) -> Result<Vec<Target>> {
    Ok(self.targets.lock().unwrap().get(space).cloned().unwrap_or_default())
  }

  async fn target_delete(&self, space: &str, slug: &str) -> Result<()> {
    self.log(format!("target delete {space}/{slug}"));
    Ok(())
  }

  async fn worker_list(&self, space: &str) -> Result<Vec<Worker>> {
    Ok(self.workers.lock().unwrap().get(space).cloned().unwrap_or_default())
  }

  async fn worker_create(&self, space: &str, slug: &str) -> Result<Worker> {
    self.log(format!("worker create {space}/{slug}"));
    let worker = Worker {
      slug: slug.to_string(),
      space: space.to_string(),
      condition: "Ready".to_string(),
    };
    self
      .workers
      .lock()
      .unwrap()
      .entry(space.to_string())
      .or_default()
      .push(worker.clone());
    Ok(worker)
  }

  async fn worker_run(&self, space: &str, slug: &str) -> Result<()> {
    self.log(format!("worker run {space}/{slug}"));
    Ok(())
  }
}

#[derive(Default)]
pub struct MockCluster {
  /// Objects keyed by GVR plural
  pub objects: BTreeMap<String, Vec<Value>>,
  pub namespaces: Vec<String>,
  pub context: String,
  pub fail_lists: Vec<String>,
  pub ops: OpsLog,
}

impl MockCluster {
  fn log(&self, op: String) {
    self.ops.lock().unwrap().push(op);
  }
}

impl ClusterClient for MockCluster {
  async fn list(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<Vec<Value>> {
    if self.fail_lists.contains(&gvr.plural) {
      bail!("the server could not find the requested resource ({})", gvr.plural);
    }
    let items = self.objects.get(&gvr.plural).cloned().unwrap_or_default();
    Ok(match namespace {
      Some(ns) => items
        .into_iter()
        .filter(|item| {
          item
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .is_some_and(|n| n == ns)
        })
        .collect(),
      None => items,
    })
  }

  async fn list_namespaces(&self) -> Result<Vec<String>> {
    Ok(self.namespaces.clone())
  }

  async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
    Ok(self.namespaces.iter().any(|n| n == namespace))
  }

  async fn resource_exists(&self, kind: &str, namespace: &str, name: &str) -> Result<bool> {
    let plural = format!("{}s", kind.to_lowercase());
    Ok(
      self
        .objects
        .get(&plural)
        .map(|items| {
          items.iter().any(|item| {
            item.pointer("/metadata/name").and_then(Value::as_str) == Some(name)
              && item.pointer("/metadata/namespace").and_then(Value::as_str) == Some(namespace)
          })
        })
        .unwrap_or(false),
    )
  }

  async fn get_manifest(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
    self.log(format!("get manifest {kind} {namespace}/{name}"));
    Ok(format!(
      "apiVersion: apps/v1\nkind: {kind}\nmetadata:\n  name: {name}\n  namespace: {namespace}\n"
    ))
  }

  async fn apply_label(&self, kind: &str, namespace: &str, name: &str, key: &str, value: &str) -> Result<()> {
    self.log(format!("label {kind} {namespace}/{name} {key}={value}"));
    Ok(())
  }

  async fn remove_metadata(
    &self,
    kind: &str,
    namespace: &str,
    name: &str,
    annotations: &[&str],
    labels: &[&str],
  ) -> Result<()> {
    self.log(format!(
      "strip {kind} {namespace}/{name} annotations={} labels={}",
      annotations.join(","),
      labels.join(",")
    ));
    Ok(())
  }

  async fn rollout_restart(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
    self.log(format!("rollout restart {kind} {namespace}/{name}"));
    Ok(())
  }

  async fn patch(&self, gvr: &Gvr, namespace: &str, name: &str, _patch: Value) -> Result<()> {
    self.log(format!("patch {} {namespace}/{name}", gvr.plural));
    Ok(())
  }

  async fn delete(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<()> {
    self.log(format!("delete {} {namespace}/{name}", gvr.plural));
    Ok(())
  }

  fn context_name(&self) -> String {
    self.context.clone()
  }
}
