//! Derives owner-reference and label-selector edges across a resource population

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  k8s::nested::{nested_str_map, nested_string},
  k8s::resources::ResourceId,
  ownership::OwnerRef,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
  Owns,
  Selects,
}

/// A directed edge between two cluster objects
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
  pub from: ResourceId,
  pub to: ResourceId,
  pub rel: RelationType,
}

/// One member of the observed population, annotated with the fields the
/// relation builder needs
#[derive(Clone, Debug, Default)]
pub struct PopulationItem {
  pub id: ResourceId,
  pub uid: String,
  pub owner_refs: Vec<OwnerRef>,
  pub labels: BTreeMap<String, String>,
  /// `spec.selector` for service-like objects; empty means no edges
  pub selector: BTreeMap<String, String>,
}

/// Build a population item from a dynamic payload
pub fn population_item(cluster: &str, group: &str, kind: &str, value: &Value) -> Option<PopulationItem> {
  let name = nested_string(value, &["metadata", "name"])?;
  let namespace = nested_string(value, &["metadata", "namespace"]).unwrap_or_default();
  let uid = nested_string(value, &["metadata", "uid"]).unwrap_or_default();

  let owner_refs = match crate::k8s::nested::nested_slice(value, &["metadata", "ownerReferences"]) {
    Some(refs) => refs
      .iter()
      .map(|r| OwnerRef {
        uid: nested_string(r, &["uid"]).unwrap_or_default(),
        kind: nested_string(r, &["kind"]).unwrap_or_default(),
        name: nested_string(r, &["name"]).unwrap_or_default(),
      })
      .collect(),
    None => Vec::new(),
  };

  Some(PopulationItem {
    id: ResourceId {
      cluster: cluster.to_string(),
      namespace,
      group: group.to_string(),
      kind: kind.to_string(),
      name,
    },
    uid,
    owner_refs,
    labels: nested_str_map(value, &["metadata", "labels"]),
    selector: nested_str_map(value, &["spec", "selector"]),
  })
}

/// Emit `owns` edges from resolved ownerRef UIDs.
///
/// Unresolved parent UIDs are dropped, self-loops are impossible by
/// construction (an object never owner-references itself through the API),
/// and duplicate (from, to) pairs collapse to one edge.
pub fn build_owns_relations(population: &[PopulationItem]) -> Vec<Relation> {
  let uid_index: HashMap<&str, &ResourceId> = population
    .iter()
    .filter(|item| !item.uid.is_empty())
    .map(|item| (item.uid.as_str(), &item.id))
    .collect();

  let mut seen = HashSet::new();
  let mut relations = Vec::new();

  for item in population {
    for owner_ref in &item.owner_refs {
      let Some(parent) = uid_index.get(owner_ref.uid.as_str()) else {
        continue;
      };
      if **parent == item.id {
        continue;
      }
      if seen.insert(((*parent).clone(), item.id.clone())) {
        relations.push(Relation {
          from: (*parent).clone(),
          to: item.id.clone(),
          rel: RelationType::Owns,
        });
      }
    }
  }

  relations
}

/// Emit `selects` edges for every service whose selector matches a pod's
/// labels in the same namespace. The selector must be non-empty and every
/// selector key/value must appear in the pod's labels.
pub fn build_selects_relations(services: &[PopulationItem], pods: &[PopulationItem]) -> Vec<Relation> {
  let mut seen = HashSet::new();
  let mut relations = Vec::new();

  for service in services {
    if service.selector.is_empty() {
      continue;
    }
    for pod in pods {
      if pod.id.namespace != service.id.namespace {
        continue;
      }
      let matches = service
        .selector
        .iter()
        .all(|(k, v)| pod.labels.get(k) == Some(v));
      if matches && seen.insert((service.id.clone(), pod.id.clone())) {
        relations.push(Relation {
          from: service.id.clone(),
          to: pod.id.clone(),
          rel: RelationType::Selects,
        });
      }
    }
  }

  relations
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn item(ns: &str, kind: &str, name: &str, uid: &str) -> PopulationItem {
    PopulationItem {
      id: ResourceId {
        cluster: "c".into(),
        namespace: ns.into(),
        group: String::new(),
        kind: kind.into(),
        name: name.into(),
      },
      uid: uid.into(),
      ..Default::default()
    }
  }

  #[test]
  fn owns_resolves_uid_index() {
    let deploy = item("default", "Deployment", "web", "uid-deploy");
    let mut rs = item("default", "ReplicaSet", "web-abc", "uid-rs");
    rs.owner_refs = vec![OwnerRef {
      uid: "uid-deploy".into(),
      kind: "Deployment".into(),
      name: "web".into(),
    }];

    let relations = build_owns_relations(&[deploy.clone(), rs.clone()]);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].from, deploy.id);
    assert_eq!(relations[0].to, rs.id);
    assert_eq!(relations[0].rel, RelationType::Owns);
  }

  #[test]
  fn owns_drops_unresolved_parents() {
    let mut rs = item("default", "ReplicaSet", "web-abc", "uid-rs");
    rs.owner_refs = vec![OwnerRef {
      uid: "uid-gone".into(),
      kind: "Deployment".into(),
      name: "web".into(),
    }];

    assert!(build_owns_relations(&[rs]).is_empty());
  }

  #[test]
  fn owns_dedupes_edges() {
    let deploy = item("default", "Deployment", "web", "uid-deploy");
    let mut rs = item("default", "ReplicaSet", "web-abc", "uid-rs");
    rs.owner_refs = vec![
      OwnerRef {
        uid: "uid-deploy".into(),
        kind: "Deployment".into(),
        name: "web".into(),
      },
      OwnerRef {
        uid: "uid-deploy".into(),
        kind: "Deployment".into(),
        name: "web".into(),
      },
    ];

    assert_eq!(build_owns_relations(&[deploy, rs]).len(), 1);
  }

  #[test]
  fn owns_empty_population() {
    assert!(build_owns_relations(&[]).is_empty());
  }

  #[test]
  fn selects_requires_superset_match() {
    let mut svc = item("default", "Service", "web", "uid-svc");
    svc.selector = BTreeMap::from([("app".to_string(), "web".to_string())]);

    let mut pod_match = item("default", "Pod", "web-1", "uid-p1");
    pod_match.labels = BTreeMap::from([
      ("app".to_string(), "web".to_string()),
      ("tier".to_string(), "frontend".to_string()),
    ]);

    let mut pod_miss = item("default", "Pod", "api-1", "uid-p2");
    pod_miss.labels = BTreeMap::from([("app".to_string(), "api".to_string())]);

    let relations = build_selects_relations(&[svc], &[pod_match.clone(), pod_miss]);
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].to, pod_match.id);
  }

  #[test]
  fn selects_respects_namespace() {
    let mut svc = item("prod", "Service", "web", "uid-svc");
    svc.selector = BTreeMap::from([("app".to_string(), "web".to_string())]);

    let mut pod = item("staging", "Pod", "web-1", "uid-p1");
    pod.labels = BTreeMap::from([("app".to_string(), "web".to_string())]);

    assert!(build_selects_relations(&[svc], &[pod]).is_empty());
  }

  #[test]
  fn selects_empty_selector_no_edges() {
    let svc = item("default", "Service", "headless", "uid-svc");
    let mut pod = item("default", "Pod", "web-1", "uid-p1");
    pod.labels = BTreeMap::from([("app".to_string(), "web".to_string())]);

    assert!(build_selects_relations(&[svc], &[pod]).is_empty());
  }

  #[test]
  fn population_item_from_payload() {
    let v = json!({
      "metadata": {
        "name": "web",
        "namespace": "default",
        "uid": "uid-1",
        "labels": {"app": "web"},
        "ownerReferences": [{"uid": "uid-0", "kind": "Deployment", "name": "web"}]
      },
      "spec": {"selector": {"app": "web"}}
    });

    let item = population_item("c", "", "Service", &v).unwrap();
    assert_eq!(item.uid, "uid-1");
    assert_eq!(item.owner_refs.len(), 1);
    assert_eq!(item.selector.get("app").unwrap(), "web");
  }
}
