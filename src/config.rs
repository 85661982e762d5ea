use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from `.cub-scout.yaml` or an explicit path.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
  /// CCVE ids suppressed during scans.
  #[serde(default)]
  pub ignored_ccves: Vec<String>,

  /// Namespaces excluded from orphan detection and suggestions.
  #[serde(default = "default_excluded_namespaces")]
  pub excluded_namespaces: Vec<String>,
}

fn default_excluded_namespaces() -> Vec<String> {
  [
    "kube-system",
    "kube-public",
    "kube-node-lease",
    "flux-system",
    "argocd",
  ]
  .iter()
  .map(ToString::to_string)
  .collect()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      ignored_ccves: Vec::new(),
      excluded_namespaces: default_excluded_namespaces(),
    }
  }
}

const DEFAULT_CONFIG_FILE: &str = ".cub-scout.yaml";

/// Load configuration from an explicit path, the default `.cub-scout.yaml` in the
/// current working directory, or fall back to `Config::default()`.
pub fn load(path: Option<&str>) -> Result<Config> {
  load_from(path, std::env::current_dir().ok().as_deref())
}

fn load_from(path: Option<&str>, base_dir: Option<&std::path::Path>) -> Result<Config> {
  if let Some(p) = path {
    let contents = std::fs::read_to_string(p).with_context(|| format!("Failed to read config file: {p}"))?;
    let config: Config =
      serde_yaml::from_str(&contents).with_context(|| format!("Failed to parse config file: {p}"))?;
    return Ok(config);
  }

  if let Some(dir) = base_dir {
    let default_path = dir.join(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
      let contents = std::fs::read_to_string(&default_path)
        .with_context(|| format!("Failed to read config file: {}", default_path.display()))?;
      let config: Config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", default_path.display()))?;
      return Ok(config);
    }
  }

  Ok(Config::default())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn config_default() {
    let cfg = Config::default();
    assert!(cfg.ignored_ccves.is_empty());
    assert!(cfg.excluded_namespaces.contains(&"kube-system".to_string()));
  }

  #[test]
  fn deserialize_empty_yaml_uses_defaults() {
    let cfg: Config = serde_yaml::from_str("{}").unwrap();
    assert!(cfg.excluded_namespaces.contains(&"flux-system".to_string()));
  }

  #[test]
  fn deserialize_full_yaml() {
    let yaml = r#"
ignored_ccves:
  - CCVE-2024-0104
excluded_namespaces:
  - monitoring
"#;
    let cfg: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.ignored_ccves, vec!["CCVE-2024-0104"]);
    assert_eq!(cfg.excluded_namespaces, vec!["monitoring"]);
  }

  #[test]
  fn load_no_path_no_default_file() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = load_from(None, Some(tmp.path())).unwrap();
    assert!(cfg.ignored_ccves.is_empty());
  }

  #[test]
  fn load_explicit_path() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("scout.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(f, "ignored_ccves:\n  - CCVE-2024-0101").unwrap();

    let cfg = load_from(Some(path.to_str().unwrap()), None).unwrap();
    assert_eq!(cfg.ignored_ccves, vec!["CCVE-2024-0101"]);
  }

  #[test]
  fn load_explicit_path_not_found() {
    assert!(load_from(Some("/tmp/does-not-exist-cub-scout.yaml"), None).is_err());
  }

  #[test]
  fn load_default_file_in_base_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let default_path = tmp.path().join(DEFAULT_CONFIG_FILE);
    let mut f = std::fs::File::create(&default_path).unwrap();
    writeln!(f, "excluded_namespaces:\n  - sandbox").unwrap();

    let cfg = load_from(None, Some(tmp.path())).unwrap();
    assert_eq!(cfg.excluded_namespaces, vec!["sandbox"]);
  }
}
