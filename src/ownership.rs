//! Classifies a cluster object into the deployer that manages it

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label carried by workloads imported into ConfigHub
pub const UNIT_SLUG_KEY: &str = "confighub.com/UnitSlug";
/// Annotation naming the owning ConfigHub space
pub const SPACE_NAME_KEY: &str = "confighub.com/SpaceName";
/// Annotation carrying the applied revision number
pub const REVISION_NUM_KEY: &str = "confighub.com/RevisionNum";

const FLUX_KUSTOMIZE_NAME: &str = "kustomize.toolkit.fluxcd.io/name";
const FLUX_KUSTOMIZE_NAMESPACE: &str = "kustomize.toolkit.fluxcd.io/namespace";
const FLUX_HELM_NAME: &str = "helm.toolkit.fluxcd.io/name";
const ARGO_INSTANCE: &str = "argocd.argoproj.io/instance";
const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
const INSTANCE: &str = "app.kubernetes.io/instance";

/// The controller (or absence of one) managing a cluster object
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Owner {
  Hub,
  Flux,
  ArgoCd,
  Helm,
  #[default]
  Native,
  Unknown,
}

impl Owner {
  /// Unknown is rendered as unmanaged, same as Native
  pub fn is_unmanaged(&self) -> bool {
    matches!(self, Owner::Native | Owner::Unknown)
  }
}

impl std::fmt::Display for Owner {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      Owner::Hub => write!(f, "ConfigHub"),
      Owner::Flux => write!(f, "Flux"),
      Owner::ArgoCd => write!(f, "ArgoCD"),
      Owner::Helm => write!(f, "Helm"),
      Owner::Native => write!(f, "Native"),
      Owner::Unknown => write!(f, "Native"),
    }
  }
}

/// A single entry of `metadata.ownerReferences`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OwnerRef {
  pub uid: String,
  pub kind: String,
  pub name: String,
}

/// Result of ownership classification: the owner plus the identifying details
/// extracted from the matching label/annotation set
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ownership {
  pub owner: Owner,
  pub details: BTreeMap<String, String>,
}

/// Classify a cluster object by its labels, annotations, and owner references.
///
/// Signals are evaluated in fixed precedence order: Hub > Flux > ArgoCD > Helm,
/// falling back to the ownerRef chain and finally Native. The classification is
/// insensitive to key ordering in the input maps.
pub fn classify(
  labels: &BTreeMap<String, String>,
  annotations: &BTreeMap<String, String>,
  owner_refs: &[OwnerRef],
) -> Ownership {
  let mut details = BTreeMap::new();

  let unit_slug = labels.get(UNIT_SLUG_KEY).or_else(|| annotations.get(UNIT_SLUG_KEY));
  if let Some(slug) = unit_slug {
    details.insert("unit".to_string(), slug.to_owned());
    if let Some(space) = annotations.get(SPACE_NAME_KEY) {
      details.insert("space".to_string(), space.to_owned());
    }
    if let Some(revision) = annotations.get(REVISION_NUM_KEY) {
      details.insert("revision".to_string(), revision.to_owned());
    }
    return Ownership {
      owner: Owner::Hub,
      details,
    };
  }

  if labels.contains_key(FLUX_KUSTOMIZE_NAME)
    || labels.contains_key(FLUX_HELM_NAME)
    || labels.contains_key(FLUX_KUSTOMIZE_NAMESPACE)
  {
    if let Some(name) = labels.get(FLUX_KUSTOMIZE_NAME) {
      details.insert("kustomization".to_string(), name.to_owned());
    }
    if let Some(name) = labels.get(FLUX_HELM_NAME) {
      details.insert("name".to_string(), name.to_owned());
    }
    if let Some(ns) = labels.get(FLUX_KUSTOMIZE_NAMESPACE) {
      details.insert("namespace".to_string(), ns.to_owned());
    }
    return Ownership {
      owner: Owner::Flux,
      details,
    };
  }

  let helm_managed = labels.get(MANAGED_BY).is_some_and(|v| v == "Helm");

  if let Some(instance) = labels.get(ARGO_INSTANCE) {
    details.insert("application".to_string(), instance.to_owned());
    return Ownership {
      owner: Owner::ArgoCd,
      details,
    };
  }
  if helm_managed && labels.get(INSTANCE).is_some_and(|v| v.contains("argocd")) {
    details.insert(
      "instance".to_string(),
      labels.get(INSTANCE).cloned().unwrap_or_default(),
    );
    return Ownership {
      owner: Owner::ArgoCd,
      details,
    };
  }

  if helm_managed {
    if let Some(release) = labels.get(INSTANCE) {
      details.insert("release".to_string(), release.to_owned());
    }
    return Ownership {
      owner: Owner::Helm,
      details,
    };
  }

  // Labels are silent; the ownerRef chain is the last composite signal
  for or in owner_refs {
    let owner = match or.kind.as_str() {
      "Kustomization" => Some((Owner::Flux, "kustomization")),
      "HelmRelease" => Some((Owner::Helm, "release")),
      "Application" => Some((Owner::ArgoCd, "application")),
      _ => None,
    };
    if let Some((owner, key)) = owner {
      details.insert(key.to_string(), or.name.to_owned());
      return Ownership { owner, details };
    }
  }

  Ownership {
    owner: Owner::Native,
    details,
  }
}

/// Classify a dynamic payload that may lack metadata entirely.
///
/// A payload carrying no label map, no annotation map, and no owner
/// references gives no evidence either way and classifies as
/// [`Owner::Unknown`]; anything else goes through [`classify`]. Unknown still
/// renders and filters as unmanaged.
pub fn classify_payload(
  labels: Option<&BTreeMap<String, String>>,
  annotations: Option<&BTreeMap<String, String>>,
  owner_refs: &[OwnerRef],
) -> Ownership {
  match (labels, annotations) {
    (None, None) if owner_refs.is_empty() => Ownership {
      owner: Owner::Unknown,
      details: BTreeMap::new(),
    },
    _ => {
      let empty = BTreeMap::new();
      classify(labels.unwrap_or(&empty), annotations.unwrap_or(&empty), owner_refs)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn hub_label_wins_over_everything() {
    let l = labels(&[
      (UNIT_SLUG_KEY, "orders-api"),
      (FLUX_KUSTOMIZE_NAME, "apps"),
      (MANAGED_BY, "Helm"),
    ]);
    let a = labels(&[(SPACE_NAME_KEY, "prod"), (REVISION_NUM_KEY, "12")]);

    let result = classify(&l, &a, &[]);
    assert_eq!(result.owner, Owner::Hub);
    assert_eq!(result.details.get("unit").unwrap(), "orders-api");
    assert_eq!(result.details.get("space").unwrap(), "prod");
    assert_eq!(result.details.get("revision").unwrap(), "12");
  }

  #[test]
  fn hub_annotation_alone_is_sufficient() {
    let a = labels(&[(UNIT_SLUG_KEY, "billing")]);
    let result = classify(&BTreeMap::new(), &a, &[]);
    assert_eq!(result.owner, Owner::Hub);
    assert_eq!(result.details.get("unit").unwrap(), "billing");
  }

  #[test]
  fn flux_kustomization_label() {
    let l = labels(&[
      (FLUX_KUSTOMIZE_NAME, "apps"),
      (FLUX_KUSTOMIZE_NAMESPACE, "flux-system"),
    ]);
    let result = classify(&l, &BTreeMap::new(), &[]);
    assert_eq!(result.owner, Owner::Flux);
    assert_eq!(result.details.get("kustomization").unwrap(), "apps");
    assert_eq!(result.details.get("namespace").unwrap(), "flux-system");
  }

  #[test]
  fn flux_helm_controller_label() {
    let l = labels(&[(FLUX_HELM_NAME, "podinfo")]);
    let result = classify(&l, &BTreeMap::new(), &[]);
    assert_eq!(result.owner, Owner::Flux);
    assert_eq!(result.details.get("name").unwrap(), "podinfo");
  }

  #[test]
  fn argocd_instance_beats_helm() {
    let l = labels(&[(MANAGED_BY, "Helm"), (ARGO_INSTANCE, "argocd-app")]);
    let result = classify(&l, &BTreeMap::new(), &[]);
    assert_eq!(result.owner, Owner::ArgoCd);
    assert_eq!(result.details.get("application").unwrap(), "argocd-app");
  }

  #[test]
  fn helm_managed_argocd_instance_name() {
    let l = labels(&[(MANAGED_BY, "Helm"), (INSTANCE, "argocd-repo-server")]);
    let result = classify(&l, &BTreeMap::new(), &[]);
    assert_eq!(result.owner, Owner::ArgoCd);
    assert_eq!(result.details.get("instance").unwrap(), "argocd-repo-server");
  }

  #[test]
  fn plain_helm_release() {
    let l = labels(&[(MANAGED_BY, "Helm"), (INSTANCE, "nginx")]);
    let result = classify(&l, &BTreeMap::new(), &[]);
    assert_eq!(result.owner, Owner::Helm);
    assert_eq!(result.details.get("release").unwrap(), "nginx");
  }

  #[test]
  fn owner_ref_chain_as_fallback() {
    let refs = vec![OwnerRef {
      uid: "u1".into(),
      kind: "Kustomization".into(),
      name: "infra".into(),
    }];
    let result = classify(&BTreeMap::new(), &BTreeMap::new(), &refs);
    assert_eq!(result.owner, Owner::Flux);
    assert_eq!(result.details.get("kustomization").unwrap(), "infra");
  }

  #[test]
  fn no_signal_is_native() {
    let l = labels(&[("app", "legacy")]);
    let result = classify(&l, &BTreeMap::new(), &[]);
    assert_eq!(result.owner, Owner::Native);
    assert!(result.details.is_empty());
  }

  #[test]
  fn payload_without_metadata_is_unknown() {
    let result = classify_payload(None, None, &[]);
    assert_eq!(result.owner, Owner::Unknown);
    assert!(result.details.is_empty());
    assert!(result.owner.is_unmanaged());
  }

  #[test]
  fn payload_with_empty_label_map_is_native() {
    let empty = BTreeMap::new();
    let result = classify_payload(Some(&empty), None, &[]);
    assert_eq!(result.owner, Owner::Native);
  }

  #[test]
  fn payload_without_maps_still_reads_owner_refs() {
    let refs = vec![OwnerRef {
      uid: "u1".into(),
      kind: "Kustomization".into(),
      name: "infra".into(),
    }];
    let result = classify_payload(None, None, &refs);
    assert_eq!(result.owner, Owner::Flux);
  }

  #[test]
  fn classification_ignores_key_order() {
    // BTreeMap normalizes ordering; build the same map from reversed input
    let forward = labels(&[(MANAGED_BY, "Helm"), (ARGO_INSTANCE, "x")]);
    let reverse = labels(&[(ARGO_INSTANCE, "x"), (MANAGED_BY, "Helm")]);
    let a = classify(&forward, &BTreeMap::new(), &[]);
    let b = classify(&reverse, &BTreeMap::new(), &[]);
    assert_eq!(a.owner, b.owner);
    assert_eq!(a.details, b.details);
  }
}
