//! Builders for cluster payloads and Hub entities used across the
//! integration tests

use std::collections::BTreeMap;

use cub_scout::gateway::types::{Organization, Space, Target, Unit, Worker};
use serde_json::{Value, json};

pub fn deployment(namespace: &str, name: &str, uid: &str, labels: Value) -> Value {
  json!({
    "apiVersion": "apps/v1",
    "kind": "Deployment",
    "metadata": {
      "name": name,
      "namespace": namespace,
      "uid": uid,
      "labels": labels,
      "creationTimestamp": "2026-03-01T00:00:00Z"
    },
    "status": {
      "conditions": [{"type": "Ready", "status": "True"}]
    }
  })
}

pub fn replicaset(namespace: &str, name: &str, uid: &str, owner_uid: Option<&str>) -> Value {
  let owner_refs = match owner_uid {
    Some(uid) => json!([{"uid": uid, "kind": "Deployment", "name": name}]),
    None => json!([]),
  };
  json!({
    "apiVersion": "apps/v1",
    "kind": "ReplicaSet",
    "metadata": {
      "name": name,
      "namespace": namespace,
      "uid": uid,
      "ownerReferences": owner_refs
    }
  })
}

pub fn pod(namespace: &str, name: &str, uid: &str, labels: Value) -> Value {
  json!({
    "apiVersion": "v1",
    "kind": "Pod",
    "metadata": {
      "name": name,
      "namespace": namespace,
      "uid": uid,
      "labels": labels
    }
  })
}

pub fn service(namespace: &str, name: &str, uid: &str, selector: Value) -> Value {
  json!({
    "apiVersion": "v1",
    "kind": "Service",
    "metadata": {
      "name": name,
      "namespace": namespace,
      "uid": uid
    },
    "spec": {"selector": selector}
  })
}

pub fn kustomization(name: &str, source: &str) -> Value {
  json!({
    "apiVersion": "kustomize.toolkit.fluxcd.io/v1",
    "kind": "Kustomization",
    "metadata": {"name": name, "namespace": "flux-system"},
    "spec": {
      "path": "./apps",
      "sourceRef": {"kind": "GitRepository", "name": source}
    },
    "status": {
      "conditions": [{"type": "Ready", "status": "True"}],
      "inventory": {"entries": [{}, {}]}
    }
  })
}

pub fn git_repository(name: &str) -> Value {
  json!({
    "apiVersion": "source.toolkit.fluxcd.io/v1",
    "kind": "GitRepository",
    "metadata": {"name": name, "namespace": "flux-system"},
    "spec": {
      "url": "https://git.example.com/fleet.git",
      "ref": {"branch": "main"},
      "interval": "1m0s"
    },
    "status": {
      "conditions": [{"type": "Ready", "status": "True"}],
      "artifact": {
        "revision": "main@sha1:0123456789abcdef0123456789abcdef01234567",
        "lastUpdateTime": "2026-03-01T00:00:00Z"
      }
    }
  })
}

pub fn argo_application(name: &str, namespace: &str, self_heal: bool, resources: Value) -> Value {
  json!({
    "apiVersion": "argoproj.io/v1alpha1",
    "kind": "Application",
    "metadata": {"name": name, "namespace": namespace},
    "spec": {
      "source": {"repoURL": "https://git.example.com/shop.git", "path": "deploy"},
      "syncPolicy": {"automated": {"selfHeal": self_heal}}
    },
    "status": {
      "health": {"status": "Healthy"},
      "resources": resources
    }
  })
}

pub fn organization(slug: &str) -> Organization {
  Organization {
    slug: slug.to_string(),
    display_name: slug.to_uppercase(),
  }
}

pub fn space(slug: &str) -> Space {
  Space {
    slug: slug.to_string(),
    display_name: slug.to_string(),
    organization: String::new(),
  }
}

pub fn unit(slug: &str, head: i64, live: i64) -> Unit {
  Unit {
    slug: slug.to_string(),
    head_revision: head,
    live_revision: live,
    ..Default::default()
  }
}

pub fn target(slug: &str, context: &str) -> Target {
  Target {
    slug: slug.to_string(),
    toolchain: "Kubernetes/YAML".to_string(),
    parameters: BTreeMap::from([("KubeContext".to_string(), context.to_string())]),
    ..Default::default()
  }
}

pub fn worker(slug: &str, ready: bool) -> Worker {
  Worker {
    slug: slug.to_string(),
    condition: if ready { "Ready".to_string() } else { "Pending".to_string() },
    ..Default::default()
  }
}
