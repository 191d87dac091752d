use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::TreeNode;

const DIGEST_LEN: usize = 12;

/// Parent-free wire shape of a [`TreeNode`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeNodeRecord {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub children: Vec<TreeNodeRecord>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl From<&TreeNode> for TreeNodeRecord {
    fn from(node: &TreeNode) -> Self {
        Self {
            id: node.id.clone(),
            label: node.label.clone(),
            percentage: node.percentage,
            emoji: node.emoji.clone(),
            description: node.description.clone(),
            children: node.children.iter().map(TreeNodeRecord::from).collect(),
            metadata: node.metadata.clone(),
        }
    }
}

impl TreeNodeRecord {
    /// Rebuilds the in-memory tree; parent links are derived while attaching.
    pub fn into_tree(self) -> TreeNode {
        let mut node = TreeNode::new(self.id, self.label, self.percentage);
        node.emoji = self.emoji;
        node.description = self.description;
        node.metadata = self.metadata;
        for child in self.children {
            node.add_child(child.into_tree());
        }
        node
    }
}

/// Short content fingerprint of a tree, stable across runs for the same
/// configuration.
pub fn tree_digest(root: &TreeNode) -> String {
    let record = TreeNodeRecord::from(root);
    let bytes = serde_json::to_vec(&record).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = format!("{:x}", hasher.finalize());
    digest[..DIGEST_LEN].to_string()
}
