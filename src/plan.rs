//! Renders an import proposal as a markdown plan

use anyhow::{Context, Result};
use handlebars::{Handlebars, to_json};
use rust_embed::RustEmbed;
use serde_json::value::{Map, Value as Json};

use crate::{PlanArgs, suggest::ImportProposal};

#[derive(RustEmbed)]
#[folder = "templates/"]
struct Templates;

/// Template data: the proposal plus the cluster it came from
fn template_data(cluster_name: &str, proposal: &ImportProposal) -> Map<String, Json> {
  let mut data = Map::new();
  data.insert("cluster_name".to_string(), to_json(cluster_name));
  data.insert("app_space".to_string(), to_json(&proposal.app_space));
  data.insert("deployer".to_string(), to_json(proposal.deployer.to_string()));
  data.insert("units".to_string(), to_json(&proposal.units));
  data.insert("rules".to_string(), to_json(&proposal.rules));
  data
}

/// Render the plan to markdown text
pub fn render(cluster_name: &str, proposal: &ImportProposal) -> Result<String> {
  let mut handlebars = Handlebars::new();
  handlebars
    .register_embed_templates::<Templates>()
    .context("Failed to register embedded templates")?;

  handlebars
    .render("plan.md", &template_data(cluster_name, proposal))
    .context("Failed to render import plan")
}

/// Render and write the plan file
pub fn create(args: &PlanArgs, cluster_name: &str, proposal: &ImportProposal) -> Result<()> {
  let rendered = render(cluster_name, proposal)?;

  let filename = match &args.filename {
    Some(filename) => filename.clone(),
    None => format!("import-plan-{}.md", crate::suggest::sanitize(cluster_name)),
  };
  std::fs::write(&filename, rendered).with_context(|| format!("Failed to write plan: {filename}"))?;
  println!("Import plan written to {filename}");

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::suggest::propose;

  #[test]
  fn render_is_deterministic() {
    let proposal = propose("apps", &[]);
    let a = render("kind-local", &proposal).unwrap();
    let b = render("kind-local", &proposal).unwrap();
    assert_eq!(a, b);
    assert!(a.contains("kind-local"));
    assert!(a.contains("`apps`"));
  }

  #[test]
  fn render_lists_units_and_rules() {
    use crate::k8s::resources::{MapEntry, ResourceId, WorkloadStatus};
    use crate::ownership::Owner;
    use std::collections::BTreeMap;

    let entry = MapEntry {
      id: ResourceId {
        cluster: "c".into(),
        namespace: "shop-prod".into(),
        group: "apps".into(),
        kind: "Deployment".into(),
        name: "web".into(),
      },
      api_version: "apps/v1".into(),
      owner: Owner::Native,
      owner_details: BTreeMap::new(),
      labels: BTreeMap::from([("app".to_string(), "shop".to_string())]),
      annotations: BTreeMap::new(),
      status: WorkloadStatus::Ready,
      created_at: None,
      updated_at: None,
    };

    let proposal = propose("apps", &[entry]);
    let text = render("kind-local", &proposal).unwrap();
    assert!(text.contains("`shop-prod`"));
    assert!(text.contains("Deployment `shop-prod/web`"));
    assert!(text.contains("| prod | 5m | true | false |"));
  }
}
