use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub mod record;

pub use record::{tree_digest, TreeNodeRecord};

pub const DEFAULT_COLOR: &str = "#5E81AC";
pub const PATH_SEPARATOR: &str = " > ";

const COLOR_KEY: &str = "color";
const EXPANDED_KEY: &str = "expanded";

/// One node of the weighted decision tree.
///
/// A node owns its children. The parent link is the parent's id and is only
/// a lookup aid: it is rewritten by `add_child`/`remove_child` and
/// `relink_parents`, and never serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    id: String,
    pub label: String,
    pub percentage: f64,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    children: Vec<TreeNode>,
    parent: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct TreeSummary {
    pub node_count: usize,
    pub leaf_count: usize,
    pub max_depth: usize,
}

impl TreeNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, percentage: f64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            percentage,
            emoji: None,
            description: None,
            metadata: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn with_generated_id(label: impl Into<String>, percentage: f64) -> Self {
        Self::new(new_node_id(), label, percentage)
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.set_color(color);
        self
    }

    pub fn with_child(mut self, child: TreeNode) -> Self {
        self.add_child(child);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Mutable access to the children without the ability to add or remove
    /// any, so parent links stay correct.
    pub fn children_mut(&mut self) -> &mut [TreeNode] {
        &mut self.children
    }

    pub fn add_child(&mut self, mut child: TreeNode) {
        child.parent = Some(self.id.clone());
        self.children.push(child);
    }

    pub fn remove_child(&mut self, id: &str) -> Option<TreeNode> {
        let index = self.children.iter().position(|child| child.id == id)?;
        let mut removed = self.children.remove(index);
        removed.parent = None;
        Some(removed)
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn children_sum(&self) -> f64 {
        self.children.iter().map(|child| child.percentage).sum()
    }

    /// Depth-first search, returns the first node carrying `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_by_id(id))
    }

    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut TreeNode> {
        if self.id == id {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|child| child.find_by_id_mut(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    pub fn parent_of(&self, id: &str) -> Option<&TreeNode> {
        let parent_id = self.find_by_id(id)?.parent_id()?;
        self.find_by_id(parent_id)
    }

    /// Distance from this root to the node `id`, following parent links.
    pub fn depth_of(&self, id: &str) -> Option<usize> {
        let mut current = self.find_by_id(id)?;
        let mut depth = 0;
        while let Some(parent_id) = current.parent_id() {
            current = self.find_by_id(parent_id)?;
            depth += 1;
        }
        Some(depth)
    }

    /// Nodes from this root down to `id`, both included.
    pub fn path_to(&self, id: &str) -> Option<Vec<&TreeNode>> {
        let mut current = self.find_by_id(id)?;
        let mut path = vec![current];
        while let Some(parent_id) = current.parent_id() {
            current = self.find_by_id(parent_id)?;
            path.push(current);
        }
        path.reverse();
        Some(path)
    }

    pub fn path_string(&self, id: &str) -> Option<String> {
        let labels = self
            .path_to(id)?
            .into_iter()
            .map(|node| node.label.as_str())
            .collect::<Vec<_>>();
        Some(labels.join(PATH_SEPARATOR))
    }

    /// True when `id` sits strictly below `ancestor_id`.
    pub fn is_descendant_of(&self, id: &str, ancestor_id: &str) -> bool {
        match self.find_by_id(ancestor_id) {
            Some(ancestor) => ancestor
                .children
                .iter()
                .any(|child| child.contains(id)),
            None => false,
        }
    }

    /// Pre-order flatten.
    pub fn all_nodes(&self) -> Vec<&TreeNode> {
        let mut nodes = Vec::new();
        self.collect_nodes(&mut nodes);
        nodes
    }

    fn collect_nodes<'a>(&'a self, nodes: &mut Vec<&'a TreeNode>) {
        nodes.push(self);
        for child in &self.children {
            child.collect_nodes(nodes);
        }
    }

    #[cfg(test)]
    pub fn leaf_nodes(&self) -> Vec<&TreeNode> {
        self.all_nodes()
            .into_iter()
            .filter(|node| node.is_leaf())
            .collect()
    }

    /// Ids that occur more than once in this subtree, in pre-order of their
    /// second occurrence.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for node in self.all_nodes() {
            if !seen.insert(node.id.as_str()) && !duplicates.contains(&node.id) {
                duplicates.push(node.id.clone());
            }
        }
        duplicates
    }

    /// Rewrites every parent link below this node from the ownership
    /// structure.
    pub fn relink_parents(&mut self) {
        let id = self.id.clone();
        for child in &mut self.children {
            child.parent = Some(id.clone());
            child.relink_parents();
        }
    }

    pub(crate) fn detach_parent(&mut self) {
        self.parent = None;
    }

    /// Deep copy with a fresh id on every node. `clone()` keeps ids.
    #[cfg(test)]
    pub fn duplicate(&self) -> TreeNode {
        let mut copy = TreeNode {
            id: new_node_id(),
            label: self.label.clone(),
            percentage: self.percentage,
            emoji: self.emoji.clone(),
            description: self.description.clone(),
            metadata: self.metadata.clone(),
            children: Vec::with_capacity(self.children.len()),
            parent: None,
        };
        for child in &self.children {
            copy.add_child(child.duplicate());
        }
        copy
    }

    pub fn summary(&self) -> TreeSummary {
        let mut summary = TreeSummary {
            node_count: 0,
            leaf_count: 0,
            max_depth: 0,
        };
        self.accumulate_summary(0, &mut summary);
        summary
    }

    fn accumulate_summary(&self, depth: usize, summary: &mut TreeSummary) {
        summary.node_count += 1;
        summary.max_depth = summary.max_depth.max(depth);
        if self.is_leaf() {
            summary.leaf_count += 1;
        }
        for child in &self.children {
            child.accumulate_summary(depth + 1, summary);
        }
    }

    pub fn color(&self) -> Option<&str> {
        self.metadata.get(COLOR_KEY).and_then(Value::as_str)
    }

    pub fn set_color(&mut self, raw: &str) {
        self.metadata
            .insert(COLOR_KEY.to_string(), Value::String(normalize_color(raw)));
    }

    pub fn is_expanded(&self) -> bool {
        self.metadata
            .get(EXPANDED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        self.metadata
            .insert(EXPANDED_KEY.to_string(), Value::Bool(expanded));
    }
}

impl fmt::Display for TreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(emoji) = self
            .emoji
            .as_deref()
            .filter(|emoji| !emoji.is_empty() && !self.label.starts_with(*emoji))
        {
            write!(f, "{emoji} ")?;
        }
        write!(f, "{} ({:.1}%)", self.label, self.percentage)
    }
}

pub fn new_node_id() -> String {
    format!("node-{}", Uuid::now_v7().simple())
}

/// Normalizes `#RGB`, `RRGGBB` and `#RRGGBB` to `#RRGGBB`; anything else
/// becomes the default color.
pub fn normalize_color(raw: &str) -> String {
    let trimmed = raw.trim();
    let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return DEFAULT_COLOR.to_string();
    }
    match hex.len() {
        6 => format!("#{hex}"),
        3 => {
            let expanded = hex.chars().flat_map(|ch| [ch, ch]).collect::<String>();
            format!("#{expanded}")
        }
        _ => DEFAULT_COLOR.to_string(),
    }
}

/// The tree installed on first start and by a reset.
pub fn default_tree() -> TreeNode {
    let branch_a = TreeNode::new("brancheA", "📊 Branch A", 60.0)
        .with_emoji("📊")
        .with_color("#5E81AC")
        .with_child(
            TreeNode::new("subA1", "🔹 Item A1", 70.0)
                .with_emoji("🔹")
                .with_color("#81A1C1"),
        )
        .with_child(
            TreeNode::new("subA2", "🔹 Item A2", 30.0)
                .with_emoji("🔹")
                .with_color("#81A1C1"),
        );

    let branch_b = TreeNode::new("brancheB", "📈 Branch B", 40.0)
        .with_emoji("📈")
        .with_color("#A3BE8C")
        .with_child(
            TreeNode::new("subB1", "🔸 Item B1", 50.0)
                .with_emoji("🔸")
                .with_color("#88C0D0"),
        )
        .with_child(
            TreeNode::new("subB2", "🔸 Item B2", 50.0)
                .with_emoji("🔸")
                .with_color("#88C0D0"),
        );

    TreeNode::new("root", "🌳 Main Tree", 100.0)
        .with_emoji("🌳")
        .with_color("#2E3440")
        .with_child(branch_a)
        .with_child(branch_b)
}
