//! In-memory model of the Hub hierarchy: the tree, its flat navigation list,
//! filter/search, and optimistic pending actions

pub mod tree;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::{
  correlate::unit_in_sync,
  gateway::types::{Target, Unit, Worker},
  snapshot::Snapshot,
};

pub use tree::{HubEntity, NodeId, NodeStatus, NodeType, Tree, TreeNode};

/// Space slug prefixes partitioned into the Hub group under HubView mode
const HUB_GROUP_PREFIXES: &[&str] = &["platform-", "infra-", "hub-", "shared-"];

/// Which virtual group a space belongs to when HubView mode is on
pub fn space_group(slug: &str) -> NodeType {
  if HUB_GROUP_PREFIXES.iter().any(|p| slug.starts_with(p)) {
    NodeType::HubGroup
  } else {
    NodeType::AppGroup
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingKind {
  Creating,
  Deleting,
}

/// An optimistic mutation reflected in the tree before the Hub confirms it
#[derive(Clone, Debug)]
pub struct PendingAction {
  pub kind: PendingKind,
  pub node_type: NodeType,
  pub name: String,
  pub parent: Option<NodeId>,
  /// The synthetic node (creating) or the hidden node (deleting)
  pub node: NodeId,
  pub start_time: DateTime<Utc>,
}

/// One row of the flat navigation list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlatRow {
  pub node: NodeId,
  pub depth: usize,
}

#[derive(Debug, Default)]
pub struct Model {
  pub tree: Tree,
  pub flat: Vec<FlatRow>,
  pub cursor: usize,
  pub filter: Option<String>,
  pub hub_view: bool,
  pub current_org: Option<String>,
  pub pending: Vec<PendingAction>,
  pub last_error: Option<String>,
  /// Filter visibility, cached per rebuild
  match_cache: HashMap<NodeId, bool>,
}

impl Model {
  pub fn new() -> Self {
    Self::default()
  }

  fn node_matches(&self, id: NodeId, query: &str) -> bool {
    let node = self.tree.node(id);
    node.name.to_lowercase().contains(query) || node.info.to_lowercase().contains(query)
  }

  /// A node is visible in filter mode iff it matches or any descendant does
  fn compute_visibility(&mut self, id: NodeId, query: &str) -> bool {
    let mut visible = self.node_matches(id, query);
    for child in self.tree.node(id).children.clone() {
      if self.compute_visibility(child, query) {
        visible = true;
      }
    }
    self.match_cache.insert(id, visible);
    visible
  }

  fn deleting_nodes(&self) -> HashSet<NodeId> {
    self
      .pending
      .iter()
      .filter(|p| p.kind == PendingKind::Deleting)
      .map(|p| p.node)
      .collect()
  }

  /// Depth-first rebuild of the flat list, honoring `expanded`, skipping
  /// nodes under a deleting pending action, and applying the filter cache
  pub fn rebuild_flat_list(&mut self) {
    self.match_cache.clear();
    let query = self.filter.clone().map(|q| q.to_lowercase()).filter(|q| !q.is_empty());

    if let Some(query) = &query {
      for root in self.tree.roots.clone() {
        self.compute_visibility(root, query);
      }
    }

    let hidden = self.deleting_nodes();
    self.flat.clear();

    fn visit(model: &mut Model, id: NodeId, depth: usize, hidden: &HashSet<NodeId>, filtered: bool) {
      if hidden.contains(&id) {
        return;
      }
      if filtered && !model.match_cache.get(&id).copied().unwrap_or(false) {
        return;
      }

      model.flat.push(FlatRow { node: id, depth });

      if !model.tree.node(id).expanded {
        return;
      }
      for child in model.tree.node(id).children.clone() {
        visit(model, child, depth + 1, hidden, filtered);
      }
    }

    let filtered = query.is_some();
    for root in self.tree.roots.clone() {
      visit(self, root, 0, &hidden, filtered);
    }

    if self.cursor >= self.flat.len() {
      self.cursor = self.flat.len().saturating_sub(1);
    }
  }

  pub fn set_filter(&mut self, filter: Option<String>) {
    self.filter = filter.filter(|f| !f.is_empty());
  }

  /// Begin an optimistic create: a synthetic node with pending status appears
  /// under the parent. Refuses to collide with an existing or pending node of
  /// the same (type, name, parent).
  pub fn begin_create(&mut self, parent: NodeId, node_type: NodeType, name: &str) -> Option<NodeId> {
    if self.tree.find_child(parent, node_type, name).is_some() {
      return None;
    }
    let collides = self.pending.iter().any(|p| {
      p.node_type == node_type && p.name == name && p.parent == Some(parent) && p.kind == PendingKind::Creating
    });
    if collides {
      return None;
    }

    let node = self
      .tree
      .add_child(parent, name, node_type, NodeStatus::Pending, "creating…", None);
    self.pending.push(PendingAction {
      kind: PendingKind::Creating,
      node_type,
      name: name.to_string(),
      parent: Some(parent),
      node,
      start_time: Utc::now(),
    });
    Some(node)
  }

  /// Resolve an optimistic create: on success the synthetic node becomes the
  /// real one; on failure it disappears
  pub fn resolve_create(&mut self, node_type: NodeType, name: &str, success: bool, data: Option<HubEntity>) {
    let Some(position) = self
      .pending
      .iter()
      .position(|p| p.kind == PendingKind::Creating && p.node_type == node_type && p.name == name)
    else {
      return;
    };
    let action = self.pending.remove(position);

    if success {
      let node = self.tree.node_mut(action.node);
      node.status = NodeStatus::Ok;
      node.info.clear();
      node.data = data;
    } else {
      self.tree.remove(action.node);
    }
  }

  /// Begin an optimistic delete: the node is hidden from the flat list while
  /// the backing mutation is in flight
  pub fn begin_delete(&mut self, node: NodeId) {
    let (node_type, name, parent) = {
      let n = self.tree.node(node);
      (n.node_type, n.name.clone(), n.parent)
    };
    self.pending.push(PendingAction {
      kind: PendingKind::Deleting,
      node_type,
      name,
      parent,
      node,
      start_time: Utc::now(),
    });
  }

  /// Resolve an optimistic delete: on success the node leaves the tree, on
  /// failure it reappears
  pub fn resolve_delete(&mut self, node: NodeId, success: bool) {
    self.pending.retain(|p| !(p.kind == PendingKind::Deleting && p.node == node));
    if success {
      self.tree.remove(node);
    }
  }

  /// Atomically replace a space's children from a background load
  pub fn set_space_children(&mut self, space: NodeId, units: &[Unit], targets: &[Target], workers: &[Worker]) {
    let mut children = Vec::new();

    for unit in units {
      let status = if unit_in_sync(unit) { NodeStatus::Ok } else { NodeStatus::Warn };
      let info = format!("rev {}/{}", unit.live_revision, unit.head_revision);
      let id = self
        .tree
        .orphan(&unit.slug, NodeType::Unit, status, &info, Some(HubEntity::Unit(unit.clone())));
      children.push(id);
    }
    for target in targets {
      let id = self.tree.orphan(
        &target.slug,
        NodeType::Target,
        NodeStatus::Ok,
        &target.toolchain,
        Some(HubEntity::Target(target.clone())),
      );
      children.push(id);
    }
    for worker in workers {
      let status = if worker.is_ready() { NodeStatus::Ok } else { NodeStatus::Warn };
      let id = self.tree.orphan(
        &worker.slug,
        NodeType::Worker,
        status,
        &worker.condition,
        Some(HubEntity::Worker(worker.clone())),
      );
      children.push(id);
    }

    self.tree.replace_children(space, children);
  }

  /// Paths of every expanded node, for the session snapshot
  pub fn expanded_paths(&self) -> Vec<String> {
    let mut paths = Vec::new();
    for id in 0..self.tree.len() {
      let node = self.tree.node(id);
      if node.expanded && self.is_reachable(id) {
        paths.push(self.tree.path(id));
      }
    }
    paths
  }

  fn is_reachable(&self, id: NodeId) -> bool {
    let mut current = id;
    loop {
      match self.tree.node(current).parent {
        Some(parent) => {
          if !self.tree.node(parent).children.contains(&current) {
            return false;
          }
          current = parent;
        }
        None => return self.tree.roots.contains(&current),
      }
    }
  }

  pub fn to_snapshot(&self) -> Snapshot {
    Snapshot {
      version: crate::snapshot::SNAPSHOT_VERSION,
      updated_at: Utc::now(),
      cursor: self.cursor,
      current_org: self.current_org.clone(),
      hub_view: self.hub_view,
      filter_active: self.filter.is_some(),
      expanded_paths: self.expanded_paths(),
    }
  }

  /// Restore cursor and expansion state; paths unreachable in the reloaded
  /// tree are ignored
  pub fn restore(&mut self, snapshot: &Snapshot) {
    self.cursor = snapshot.cursor;
    self.current_org = snapshot.current_org.clone();
    self.hub_view = snapshot.hub_view;
    for path in &snapshot.expanded_paths {
      if let Some(id) = self.tree.find_by_path(path) {
        self.tree.node_mut(id).expanded = true;
      }
    }
  }

  /// Render the flat list as indented text
  pub fn render_flat(&self) -> String {
    let mut out = String::new();
    for row in &self.flat {
      let node = self.tree.node(row.node);
      let marker = if node.children.is_empty() {
        " "
      } else if node.expanded {
        "▾"
      } else {
        "▸"
      };
      let status = match node.status {
        NodeStatus::None => String::new(),
        other => format!(" [{other}]"),
      };
      let info = if node.info.is_empty() {
        String::new()
      } else {
        format!("  {}", node.info)
      };
      out.push_str(&format!(
        "{}{} {}{}{}\n",
        "  ".repeat(row.depth),
        marker,
        node.name,
        status,
        info
      ));
    }
    if let Some(error) = &self.last_error {
      out.push_str(&format!("error: {error}\n"));
    }
    out.trim_end().to_string()
  }
}
