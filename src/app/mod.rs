//! The single-threaded update loop over the hierarchy model.
//!
//! All model mutations happen through `update(model, msg) -> cmds`; side
//! effects are commands a runtime executes against the gateway, posting
//! completion messages back. Background work never touches the model.

use anyhow::{Context, Result};

use crate::{
  gateway::HubClient,
  gateway::types::{Organization, Space, Target, Unit, Worker},
  hierarchy::{HubEntity, Model, NodeId, NodeStatus, NodeType, space_group},
  snapshot,
};

#[derive(Clone, Debug)]
pub enum Msg {
  DataLoaded {
    organizations: Vec<Organization>,
    spaces: Vec<Space>,
    error: Option<String>,
  },
  SpaceDataLoaded {
    space: String,
    units: Vec<Unit>,
    targets: Vec<Target>,
    workers: Vec<Worker>,
    error: Option<String>,
  },
  ToggleExpand(NodeId),
  SetFilter(Option<String>),
  CreateSpace {
    org: NodeId,
    slug: String,
  },
  ResourceCreated {
    node_type: NodeType,
    name: String,
    data: Option<HubEntity>,
    error: Option<String>,
  },
  DeleteUnit {
    node: NodeId,
  },
  ResourceDeleted {
    node: NodeId,
    error: Option<String>,
  },
  Quit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cmd {
  LoadData,
  LoadSpace(String),
  CreateSpace(String),
  DeleteUnit {
    space: String,
    slug: String,
    node: NodeId,
  },
  SaveSnapshot,
}

fn find_space_node(model: &Model, name: &str) -> Option<NodeId> {
  (0..model.tree.len()).find(|&id| {
    let node = model.tree.node(id);
    node.node_type == NodeType::Space && node.name == name && {
      // Only reachable nodes count; detached ones linger until rebuild
      node.parent.is_some_and(|p| model.tree.node(p).children.contains(&id))
    }
  })
}

fn space_ancestor(model: &Model, node: NodeId) -> Option<String> {
  let mut current = model.tree.node(node).parent;
  while let Some(id) = current {
    let n = model.tree.node(id);
    if n.node_type == NodeType::Space {
      return Some(n.name.clone());
    }
    current = n.parent;
  }
  None
}

/// One step of the event loop. Returns the commands to dispatch.
pub fn update(model: &mut Model, msg: Msg) -> Vec<Cmd> {
  match msg {
    Msg::DataLoaded {
      organizations,
      spaces,
      error,
    } => {
      if let Some(error) = error {
        model.last_error = Some(error);
        return Vec::new();
      }

      model.tree = Default::default();
      model.pending.clear();
      let mut cmds = Vec::new();

      for (org_index, org) in organizations.iter().enumerate() {
        let org_node = model
          .tree
          .add_root(&org.slug, NodeType::Organization, Some(HubEntity::Organization(org.clone())));
        model.tree.node_mut(org_node).expanded = true;

        // HubView partitions a space list into virtual Hub and App groups
        let (hub_group, app_group) = if model.hub_view {
          let hub = model.tree.add_child(
            org_node,
            "Hub",
            NodeType::HubGroup,
            NodeStatus::None,
            "",
            Some(HubEntity::Group("Hub".to_string())),
          );
          let app = model.tree.add_child(
            org_node,
            "Apps",
            NodeType::AppGroup,
            NodeStatus::None,
            "",
            Some(HubEntity::Group("Apps".to_string())),
          );
          model.tree.node_mut(hub).expanded = true;
          model.tree.node_mut(app).expanded = true;
          (Some(hub), Some(app))
        } else {
          (None, None)
        };

        // Spaces that don't name their organization land under the first one
        for space in spaces
          .iter()
          .filter(|s| s.organization == org.slug || (s.organization.is_empty() && org_index == 0))
        {
          let parent = match (hub_group, app_group) {
            (Some(hub), Some(app)) => {
              if space_group(&space.slug) == NodeType::HubGroup {
                hub
              } else {
                app
              }
            }
            _ => org_node,
          };
          let space_node = model.tree.add_child(
            parent,
            &space.slug,
            NodeType::Space,
            NodeStatus::None,
            &space.display_name,
            Some(HubEntity::Space(space.clone())),
          );
          model.tree.node_mut(space_node).expanded = true;
          cmds.push(Cmd::LoadSpace(space.slug.clone()));
        }
      }

      if model.current_org.is_none() {
        model.current_org = organizations.first().map(|o| o.slug.clone());
      }
      model.rebuild_flat_list();
      cmds
    }

    Msg::SpaceDataLoaded {
      space,
      units,
      targets,
      workers,
      error,
    } => {
      let Some(space_node) = find_space_node(model, &space) else {
        return Vec::new();
      };
      match error {
        Some(error) => {
          // Shown next to the space, not in a global modal
          let node = model.tree.node_mut(space_node);
          node.status = NodeStatus::Error;
          node.info = error;
        }
        None => {
          model.set_space_children(space_node, &units, &targets, &workers);
        }
      }
      model.rebuild_flat_list();
      Vec::new()
    }

    Msg::ToggleExpand(node) => {
      let mut cmds = Vec::new();
      let expanded = model.tree.node(node).expanded;
      model.tree.node_mut(node).expanded = !expanded;

      let n = model.tree.node(node);
      if !expanded && n.node_type == NodeType::Space && n.children.is_empty() {
        cmds.push(Cmd::LoadSpace(n.name.clone()));
      }
      model.rebuild_flat_list();
      cmds
    }

    Msg::SetFilter(filter) => {
      model.set_filter(filter);
      model.rebuild_flat_list();
      Vec::new()
    }

    Msg::CreateSpace { org, slug } => {
      match model.begin_create(org, NodeType::Space, &slug) {
        Some(_) => {
          model.rebuild_flat_list();
          vec![Cmd::CreateSpace(slug)]
        }
        None => {
          model.last_error = Some(format!("space '{slug}' already exists"));
          Vec::new()
        }
      }
    }

    Msg::ResourceCreated {
      node_type,
      name,
      data,
      error,
    } => {
      let success = error.is_none();
      if let Some(error) = error {
        model.last_error = Some(error);
      }
      model.resolve_create(node_type, &name, success, data);
      model.rebuild_flat_list();
      Vec::new()
    }

    Msg::DeleteUnit { node } => {
      let slug = model.tree.node(node).name.clone();
      let Some(space) = space_ancestor(model, node) else {
        model.last_error = Some(format!("unit '{slug}' has no enclosing space"));
        return Vec::new();
      };
      model.begin_delete(node);
      model.rebuild_flat_list();
      vec![Cmd::DeleteUnit { space, slug, node }]
    }

    Msg::ResourceDeleted { node, error } => {
      let success = error.is_none();
      if let Some(error) = error {
        // Reported verbatim next to the restored node
        model.last_error = Some(error);
      }
      model.resolve_delete(node, success);
      model.rebuild_flat_list();
      Vec::new()
    }

    Msg::Quit => vec![Cmd::SaveSnapshot],
  }
}

/// Execute one command against the Hub, returning the completion message to
/// feed back into `update`. Messages posted after quit are dropped by the
/// caller.
pub async fn dispatch<H: HubClient>(model: &Model, cmd: Cmd, hub: &H) -> Option<Msg> {
  match cmd {
    Cmd::LoadData => {
      let organizations = match hub.organization_list().await {
        Ok(organizations) => organizations,
        Err(err) => {
          return Some(Msg::DataLoaded {
            organizations: Vec::new(),
            spaces: Vec::new(),
            error: Some(err.to_string()),
          });
        }
      };
      match hub.space_list().await {
        Ok(spaces) => Some(Msg::DataLoaded {
          organizations,
          spaces,
          error: None,
        }),
        Err(err) => Some(Msg::DataLoaded {
          organizations,
          spaces: Vec::new(),
          error: Some(err.to_string()),
        }),
      }
    }

    Cmd::LoadSpace(slug) => {
      let units = hub.unit_list(&slug).await;
      let targets = hub.target_list(&slug).await;
      let workers = hub.worker_list(&slug).await;

      let error = units
        .as_ref()
        .err()
        .map(ToString::to_string)
        .or_else(|| targets.as_ref().err().map(ToString::to_string))
        .or_else(|| workers.as_ref().err().map(ToString::to_string));

      Some(Msg::SpaceDataLoaded {
        space: slug,
        units: units.unwrap_or_default(),
        targets: targets.unwrap_or_default(),
        workers: workers.unwrap_or_default(),
        error,
      })
    }

    Cmd::CreateSpace(slug) => match hub.space_create(&slug).await {
      Ok(space) => Some(Msg::ResourceCreated {
        node_type: NodeType::Space,
        name: slug,
        data: Some(HubEntity::Space(space)),
        error: None,
      }),
      Err(err) => Some(Msg::ResourceCreated {
        node_type: NodeType::Space,
        name: slug,
        data: None,
        error: Some(err.to_string()),
      }),
    },

    Cmd::DeleteUnit { space, slug, node } => match hub.unit_delete(&space, &slug).await {
      Ok(()) => Some(Msg::ResourceDeleted { node, error: None }),
      Err(err) => Some(Msg::ResourceDeleted {
        node,
        error: Some(err.to_string()),
      }),
    },

    Cmd::SaveSnapshot => {
      // best-effort: losing cursor state is not worth surfacing
      let _ = snapshot::save(snapshot::SnapshotKind::Hub, &model.to_snapshot());
      None
    }
  }
}

/// Load the full hierarchy: one `LoadData`, then one `LoadSpace` per space.
/// Space loads complete independently; each one replaces the children of
/// exactly one space node.
pub async fn load_hierarchy<H: HubClient>(model: &mut Model, hub: &H) -> Result<()> {
  let msg = dispatch(model, Cmd::LoadData, hub)
    .await
    .context("load data produced no message")?;
  let cmds = update(model, msg);

  for cmd in cmds {
    if let Some(msg) = dispatch(model, cmd, hub).await {
      update(model, msg);
    }
  }

  if let Some(error) = &model.last_error {
    tracing::warn!("hierarchy load: {error}");
  }
  Ok(())
}
