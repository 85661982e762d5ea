//! Kubernetes dynamic client for list and mutation operations against
//! arbitrary GVRs

use anyhow::{Context, Result};
use kube::{
  Client,
  api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams},
  config::{KubeConfigOptions, Kubeconfig},
  core::{ApiResource, GroupVersionKind},
};
use serde_json::{Value, json};

use crate::gateway::{ClusterClient, Gvr, Kubectl, gvr_for_kind};

pub struct DynamicClusterClient {
  client: Client,
  kubectl: Kubectl,
  context: String,
}

impl DynamicClusterClient {
  /// Connect to the cluster behind `context`, or the current context when
  /// absent. Kubeconfig discovery follows the standard client rules.
  pub async fn connect(context: Option<&str>) -> Result<Self> {
    let (client, context_name) = match context {
      Some(ctx) => {
        let kubeconfig = Kubeconfig::read().context("Unable to read kubeconfig")?;
        let options = KubeConfigOptions {
          context: Some(ctx.to_string()),
          ..Default::default()
        };
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &options)
          .await
          .with_context(|| format!("Unable to load kube context '{ctx}'"))?;
        let client = Client::try_from(config).context("Unable to build Kubernetes client")?;
        (client, ctx.to_string())
      }
      None => {
        let client = match Client::try_default().await {
          Ok(client) => client,
          Err(e) => {
            anyhow::bail!(
              "Unable to connect to cluster: {e}\n\n\
              Ensure a kubeconfig file is present and points at a reachable cluster."
            );
          }
        };
        let context_name = Kubeconfig::read()
          .ok()
          .and_then(|k| k.current_context)
          .unwrap_or_else(|| "default".to_string());
        (client, context_name)
      }
    };

    Ok(Self {
      client,
      kubectl: Kubectl::new(context),
      context: context_name,
    })
  }

  fn api(&self, gvr: &Gvr, namespace: Option<&str>) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(&gvr.group, &gvr.version, &gvr.kind);
    let resource = ApiResource::from_gvk_with_plural(&gvk, &gvr.plural);
    match namespace {
      Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
      None => Api::all_with(self.client.clone(), &resource),
    }
  }

  fn api_for_kind(&self, kind: &str, namespace: &str) -> Result<Api<DynamicObject>> {
    let gvr = gvr_for_kind(kind).with_context(|| format!("Unsupported resource kind '{kind}'"))?;
    Ok(self.api(&gvr, Some(namespace)))
  }
}

impl ClusterClient for DynamicClusterClient {
  async fn list(&self, gvr: &Gvr, namespace: Option<&str>) -> Result<Vec<Value>> {
    let api = self.api(gvr, namespace);
    let list = api
      .list(&ListParams::default())
      .await
      .with_context(|| format!("list {}", gvr.plural))?;

    list
      .items
      .into_iter()
      .map(|item| serde_json::to_value(item).with_context(|| format!("list {}: serialize", gvr.plural)))
      .collect()
  }

  async fn list_namespaces(&self) -> Result<Vec<String>> {
    let values = self
      .list(&Gvr::new("", "v1", "Namespace", "namespaces"), None)
      .await
      .context("list namespaces")?;

    Ok(
      values
        .iter()
        .filter_map(|v| crate::k8s::nested::nested_string(v, &["metadata", "name"]))
        .collect(),
    )
  }

  async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
    self.kubectl.namespace_exists(namespace).await
  }

  async fn resource_exists(&self, kind: &str, namespace: &str, name: &str) -> Result<bool> {
    self.kubectl.resource_exists(kind, namespace, name).await
  }

  async fn get_manifest(&self, kind: &str, namespace: &str, name: &str) -> Result<String> {
    let api = self.api_for_kind(kind, namespace)?;
    let object = api
      .get(name)
      .await
      .with_context(|| format!("get {kind} {namespace}/{name}"))?;
    serde_yaml::to_string(&object).with_context(|| format!("get {kind} {namespace}/{name}: serialize"))
  }

  async fn apply_label(&self, kind: &str, namespace: &str, name: &str, key: &str, value: &str) -> Result<()> {
    let api = self.api_for_kind(kind, namespace)?;
    let patch = json!({"metadata": {"labels": {key: value}}});
    api
      .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
      .await
      .with_context(|| format!("label {kind} {namespace}/{name}"))?;
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
    let api = self.api_for_kind(kind, namespace)?;

    let mut annotation_patch = serde_json::Map::new();
    for key in annotations {
      annotation_patch.insert((*key).to_string(), Value::Null);
    }
    let mut label_patch = serde_json::Map::new();
    for key in labels {
      label_patch.insert((*key).to_string(), Value::Null);
    }

    let patch = json!({"metadata": {"annotations": annotation_patch, "labels": label_patch}});
    api
      .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
      .await
      .with_context(|| format!("strip metadata {kind} {namespace}/{name}"))?;
    Ok(())
  }

  async fn rollout_restart(&self, kind: &str, namespace: &str, name: &str) -> Result<()> {
    let api = self.api_for_kind(kind, namespace)?;
    let patch = json!({
      "spec": {"template": {"metadata": {"annotations": {
        "kubectl.kubernetes.io/restartedAt": chrono::Utc::now().to_rfc3339()
      }}}}
    });
    api
      .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
      .await
      .with_context(|| format!("rollout restart {kind} {namespace}/{name}"))?;
    Ok(())
  }

  async fn patch(&self, gvr: &Gvr, namespace: &str, name: &str, patch: Value) -> Result<()> {
    let api = self.api(gvr, Some(namespace));
    api
      .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
      .await
      .with_context(|| format!("patch {} {namespace}/{name}", gvr.kind))?;
    Ok(())
  }

  async fn delete(&self, gvr: &Gvr, namespace: &str, name: &str) -> Result<()> {
    let api = self.api(gvr, Some(namespace));
    api
      .delete(name, &DeleteParams::default())
      .await
      .with_context(|| format!("delete {} {namespace}/{name}", gvr.kind))?;
    Ok(())
  }

  fn context_name(&self) -> String {
    self.context.clone()
  }
}
