//! Arena-backed tree of Hub entities.
//!
//! All nodes live in one vector; parent and child links are indices, which
//! keeps the parent back-reference cycle-free. Detached nodes stay allocated
//! until the next full rebuild; the tree is rebuilt once per refresh.

use serde::{Deserialize, Serialize};

use crate::gateway::types::{Organization, Space, Target, Unit, Worker};

pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
  Organization,
  Space,
  Unit,
  Target,
  Worker,
  Group,
  HubGroup,
  AppGroup,
  Detail,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
  Ok,
  Warn,
  Error,
  Pending,
  #[default]
  None,
}

impl std::fmt::Display for NodeStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    match *self {
      NodeStatus::Ok => write!(f, "ok"),
      NodeStatus::Warn => write!(f, "warn"),
      NodeStatus::Error => write!(f, "error"),
      NodeStatus::Pending => write!(f, "pending"),
      NodeStatus::None => write!(f, ""),
    }
  }
}

/// The Hub entity a node represents
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum HubEntity {
  Organization(Organization),
  Space(Space),
  Unit(Unit),
  Target(Target),
  Worker(Worker),
  Group(String),
  Detail(String),
}

#[derive(Clone, Debug)]
pub struct TreeNode {
  pub name: String,
  pub node_type: NodeType,
  pub status: NodeStatus,
  pub info: String,
  pub children: Vec<NodeId>,
  pub parent: Option<NodeId>,
  pub expanded: bool,
  pub data: Option<HubEntity>,
}

#[derive(Debug, Default)]
pub struct Tree {
  nodes: Vec<TreeNode>,
  pub roots: Vec<NodeId>,
}

impl Tree {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn node(&self, id: NodeId) -> &TreeNode {
    &self.nodes[id]
  }

  pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
    &mut self.nodes[id]
  }

  fn push(&mut self, node: TreeNode) -> NodeId {
    self.nodes.push(node);
    self.nodes.len() - 1
  }

  pub fn add_root(&mut self, name: &str, node_type: NodeType, data: Option<HubEntity>) -> NodeId {
    let id = self.push(TreeNode {
      name: name.to_string(),
      node_type,
      status: NodeStatus::None,
      info: String::new(),
      children: Vec::new(),
      parent: None,
      expanded: false,
      data,
    });
    self.roots.push(id);
    id
  }

  /// Insert a child at the end of the parent's ordered child sequence
  pub fn add_child(
    &mut self,
    parent: NodeId,
    name: &str,
    node_type: NodeType,
    status: NodeStatus,
    info: &str,
    data: Option<HubEntity>,
  ) -> NodeId {
    let id = self.push(TreeNode {
      name: name.to_string(),
      node_type,
      status,
      info: info.to_string(),
      children: Vec::new(),
      parent: Some(parent),
      expanded: false,
      data,
    });
    self.nodes[parent].children.push(id);
    id
  }

  pub fn find_child(&self, parent: NodeId, node_type: NodeType, name: &str) -> Option<NodeId> {
    self.nodes[parent]
      .children
      .iter()
      .copied()
      .find(|&c| self.nodes[c].node_type == node_type && self.nodes[c].name == name)
  }

  /// Detach a node from its parent (or the root list). The subtree becomes
  /// unreachable; storage is reclaimed at the next rebuild.
  pub fn remove(&mut self, id: NodeId) {
    match self.nodes[id].parent {
      Some(parent) => self.nodes[parent].children.retain(|&c| c != id),
      None => self.roots.retain(|&r| r != id),
    }
  }

  /// Atomically replace a node's children: the old subtrees detach and the
  /// replacement list becomes the new ordered sequence
  pub fn replace_children(&mut self, parent: NodeId, children: Vec<NodeId>) {
    for &child in &children {
      self.nodes[child].parent = Some(parent);
    }
    self.nodes[parent].children = children;
  }

  /// Create a node without attaching it, for use with `replace_children`
  pub fn orphan(
    &mut self,
    name: &str,
    node_type: NodeType,
    status: NodeStatus,
    info: &str,
    data: Option<HubEntity>,
  ) -> NodeId {
    self.push(TreeNode {
      name: name.to_string(),
      node_type,
      status,
      info: info.to_string(),
      children: Vec::new(),
      parent: None,
      expanded: false,
      data,
    })
  }

  /// Names from the root down to this node, `/`-joined
  pub fn path(&self, id: NodeId) -> String {
    let mut names = Vec::new();
    let mut current = Some(id);
    while let Some(node_id) = current {
      names.push(self.nodes[node_id].name.clone());
      current = self.nodes[node_id].parent;
    }
    names.reverse();
    names.join("/")
  }

  /// Resolve a `/`-joined path back to a node, if still reachable
  pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
    let mut segments = path.split('/');
    let first = segments.next()?;
    let mut current = self.roots.iter().copied().find(|&r| self.nodes[r].name == first)?;

    for segment in segments {
      current = self.nodes[current]
        .children
        .iter()
        .copied()
        .find(|&c| self.nodes[c].name == segment)?;
    }
    Some(current)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> (Tree, NodeId, NodeId, NodeId) {
    let mut tree = Tree::new();
    let org = tree.add_root("acme", NodeType::Organization, None);
    let space = tree.add_child(org, "shop", NodeType::Space, NodeStatus::Ok, "", None);
    let unit = tree.add_child(space, "orders-api", NodeType::Unit, NodeStatus::Ok, "rev 3/3", None);
    (tree, org, space, unit)
  }

  #[test]
  fn parent_links_are_acyclic_to_root() {
    let (tree, org, _, unit) = sample();
    let mut current = Some(unit);
    let mut hops = 0;
    while let Some(id) = current {
      current = tree.node(id).parent;
      hops += 1;
      assert!(hops < 10);
    }
    assert_eq!(tree.node(org).parent, None);
  }

  #[test]
  fn path_round_trip() {
    let (tree, _, _, unit) = sample();
    assert_eq!(tree.path(unit), "acme/shop/orders-api");
    assert_eq!(tree.find_by_path("acme/shop/orders-api"), Some(unit));
    assert_eq!(tree.find_by_path("acme/shop/missing"), None);
  }

  #[test]
  fn remove_detaches_subtree() {
    let (mut tree, _, space, unit) = sample();
    tree.remove(unit);
    assert!(tree.node(space).children.is_empty());
    assert_eq!(tree.find_by_path("acme/shop/orders-api"), None);
  }

  #[test]
  fn replace_children_is_atomic() {
    let (mut tree, _, space, unit) = sample();
    let fresh_a = tree.orphan("a", NodeType::Unit, NodeStatus::Ok, "", None);
    let fresh_b = tree.orphan("b", NodeType::Unit, NodeStatus::Warn, "", None);
    tree.replace_children(space, vec![fresh_a, fresh_b]);

    assert_eq!(tree.node(space).children, vec![fresh_a, fresh_b]);
    assert_eq!(tree.node(fresh_a).parent, Some(space));
    // The old unit is detached, not reparented
    assert_eq!(tree.find_by_path("acme/shop/orders-api"), None);
    let _ = unit;
  }

  #[test]
  fn children_preserve_insertion_order() {
    let (mut tree, _, space, _) = sample();
    tree.add_child(space, "zeta", NodeType::Unit, NodeStatus::Ok, "", None);
    tree.add_child(space, "alpha", NodeType::Unit, NodeStatus::Ok, "", None);

    let names: Vec<&str> = tree
      .node(space)
      .children
      .iter()
      .map(|&c| tree.node(c).name.as_str())
      .collect();
    assert_eq!(names, vec!["orders-api", "zeta", "alpha"]);
  }

  #[test]
  fn find_child_matches_type_and_name() {
    let (tree, _, space, unit) = sample();
    assert_eq!(tree.find_child(space, NodeType::Unit, "orders-api"), Some(unit));
    assert_eq!(tree.find_child(space, NodeType::Worker, "orders-api"), None);
  }
}
