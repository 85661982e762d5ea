pub mod registry;
pub mod report;
pub mod scanner;

pub use registry::{CcveDefinition, Registry};

use serde::{Deserialize, Serialize};

/// Finding severity, also encoded as the first letter of report rows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Critical,
  Warning,
  #[default]
  Info,
  State,
}

impl Severity {
  /// Parse the single-letter severity used by textual scan reports
  pub fn from_letter(letter: char) -> Option<Self> {
    match letter {
      'C' => Some(Severity::Critical),
      'W' => Some(Severity::Warning),
      'I' => Some(Severity::Info),
      'S' => Some(Severity::State),
      _ => None,
    }
  }

  pub(crate) fn symbol(&self) -> String {
    match self {
      Severity::Critical => "❌".to_string(),
      Severity::Warning => "⚠️".to_string(),
      Severity::Info => "ℹ".to_string(),
      Severity::State => "•".to_string(),
    }
  }
}

impl std::fmt::Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      Severity::Critical => write!(f, "critical"),
      Severity::Warning => write!(f, "warning"),
      Severity::Info => write!(f, "info"),
      Severity::State => write!(f, "state"),
    }
  }
}

/// How a finding is remediated; only the four known types are auto-fixable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemedyType {
  ConfigFix,
  TriggerAction,
  DeleteResource,
  Restart,
  #[default]
  #[serde(other)]
  Unsupported,
}

impl RemedyType {
  pub fn is_auto_fixable(&self) -> bool {
    !matches!(self, RemedyType::Unsupported)
  }
}

impl std::fmt::Display for RemedyType {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      RemedyType::ConfigFix => write!(f, "config_fix"),
      RemedyType::TriggerAction => write!(f, "trigger_action"),
      RemedyType::DeleteResource => write!(f, "delete_resource"),
      RemedyType::Restart => write!(f, "restart"),
      RemedyType::Unsupported => write!(f, "unsupported"),
    }
  }
}

/// Kind/name pair identifying the affected resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
  pub kind: String,
  pub name: String,
}

/// A matched configuration finding, carrying enough remedy context to plan
/// and execute a fix without another registry round trip
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Finding {
  pub ccve_id: String,
  pub namespace: Option<String>,
  pub resource: Option<ResourceRef>,
  pub message: String,
  pub category: String,
  pub severity: Severity,
  pub remedy_type: RemedyType,
  pub commands: Vec<String>,
  pub steps: Vec<String>,
  pub auto_fixable: bool,
}
