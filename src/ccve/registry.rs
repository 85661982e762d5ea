//! The CCVE catalog: one hierarchical document per finding id

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result, bail};
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};

use crate::ccve::{Finding, RemedyType, ResourceRef, Severity};

/// Catalog shipped with the binary; a directory override replaces it wholesale
#[derive(RustEmbed)]
#[folder = "catalog/"]
struct EmbeddedCatalog;

/// Raw catalog file shape. Missing fields coerce to empty values.
#[derive(Debug, Default, Deserialize)]
struct RawCcve {
  #[serde(default)]
  id: String,
  #[serde(default)]
  category: String,
  #[serde(default)]
  name: String,
  #[serde(default)]
  severity: Severity,
  #[serde(default)]
  detection: RawDetection,
  #[serde(default)]
  remedy: RawRemedy,
  #[serde(default)]
  remediation: RawRemediation,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetection {
  #[serde(default)]
  resources: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRemedy {
  #[serde(default, rename = "type")]
  remedy_type: RemedyType,
}

#[derive(Debug, Default, Deserialize)]
struct RawRemediation {
  #[serde(default)]
  commands: Vec<String>,
  #[serde(default)]
  steps: Vec<String>,
}

/// A parsed catalog entry
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CcveDefinition {
  pub id: String,
  pub category: String,
  pub name: String,
  pub severity: Severity,
  /// The resource kind the detection targets
  pub kind: String,
  pub remedy_type: RemedyType,
  pub commands: Vec<String>,
  pub steps: Vec<String>,
}

impl CcveDefinition {
  pub fn is_auto_fixable(&self) -> bool {
    self.remedy_type.is_auto_fixable()
  }
}

impl From<RawCcve> for CcveDefinition {
  fn from(raw: RawCcve) -> Self {
    Self {
      id: raw.id,
      category: raw.category,
      name: raw.name,
      severity: raw.severity,
      kind: raw.detection.resources.first().cloned().unwrap_or_default(),
      remedy_type: raw.remedy.remedy_type,
      commands: raw.remediation.commands,
      steps: raw.remediation.steps,
    }
  }
}

/// In-memory catalog keyed by CCVE id
#[derive(Debug, Default)]
pub struct Registry {
  definitions: BTreeMap<String, CcveDefinition>,
}

impl Registry {
  /// Load the catalog from a directory of `CCVE-*.yaml` files, or the
  /// embedded default catalog when no directory is given
  pub fn load(dir: Option<&str>) -> Result<Self> {
    match dir {
      Some(dir) => Self::load_dir(Path::new(dir)),
      None => Self::load_embedded(),
    }
  }

  fn load_embedded() -> Result<Self> {
    let mut definitions = BTreeMap::new();
    for file in EmbeddedCatalog::iter() {
      let data = EmbeddedCatalog::get(&file).context("Embedded catalog entry vanished")?;
      let raw: RawCcve = serde_yaml::from_slice(&data.data)
        .with_context(|| format!("Failed to parse embedded catalog file: {file}"))?;
      let def = CcveDefinition::from(raw);
      if !def.id.is_empty() {
        definitions.insert(def.id.clone(), def);
      }
    }
    Ok(Self { definitions })
  }

  fn load_dir(dir: &Path) -> Result<Self> {
    let mut definitions = BTreeMap::new();
    let entries =
      std::fs::read_dir(dir).with_context(|| format!("Failed to read catalog directory: {}", dir.display()))?;

    for entry in entries {
      let path = entry?.path();
      let is_ccve_file = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("CCVE-") && (n.ends_with(".yaml") || n.ends_with(".yml")));
      if !is_ccve_file {
        continue;
      }

      let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
      let raw: RawCcve = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse catalog file: {}", path.display()))?;
      let def = CcveDefinition::from(raw);
      if !def.id.is_empty() {
        definitions.insert(def.id.clone(), def);
      }
    }

    Ok(Self { definitions })
  }

  pub fn get(&self, id: &str) -> Option<&CcveDefinition> {
    self.definitions.get(id)
  }

  pub fn len(&self) -> usize {
    self.definitions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.definitions.is_empty()
  }

  pub fn is_auto_fixable(&self, id: &str) -> bool {
    self.get(id).is_some_and(CcveDefinition::is_auto_fixable)
  }

  /// Build a finding for a known CCVE against a concrete resource. Fails when
  /// the id is not in the catalog.
  pub fn finding_for(&self, id: &str, namespace: Option<String>, resource: Option<ResourceRef>) -> Result<Finding> {
    let Some(def) = self.get(id) else {
      bail!("CCVE {id} not found in the catalog");
    };

    Ok(Finding {
      ccve_id: def.id.clone(),
      namespace,
      resource,
      message: def.name.clone(),
      category: def.category.clone(),
      severity: def.severity,
      remedy_type: def.remedy_type,
      commands: def.commands.clone(),
      steps: def.steps.clone(),
      auto_fixable: def.is_auto_fixable(),
    })
  }
}
