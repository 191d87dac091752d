use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::redistribute::{redistribute_to_hundred, FULL_SHARE};
use crate::slot::now_utc_rfc3339;
use crate::store::{Persisted, StoreError, StructuralError, TreeStore};
use crate::tree::TreeNode;

/// Children sums further than this from 100 are errors.
pub const ERROR_TOLERANCE: f64 = 0.1;
/// Children sums further than this (but within the error band) are warnings.
pub const WARNING_TOLERANCE: f64 = 0.01;

const DUPLICATE_SUFFIX: &str = "_duplicate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Valid,
    Warning,
    Error,
}

impl ValidationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationLevel::Valid => "valid",
            ValidationLevel::Warning => "warning",
            ValidationLevel::Error => "error",
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeValidation {
    pub level: ValidationLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_percentage: Option<f64>,
}

impl NodeValidation {
    fn valid() -> Self {
        Self::at(ValidationLevel::Valid, "valid")
    }

    fn at(level: ValidationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            suggested_percentage: None,
        }
    }

    #[cfg(test)]
    pub fn is_valid(&self) -> bool {
        self.level != ValidationLevel::Error
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationStatus {
    pub level: ValidationLevel,
    pub message: String,
    pub nodes: BTreeMap<String, NodeValidation>,
    pub validated_at: String,
}

impl ValidationStatus {
    pub fn problems(&self) -> impl Iterator<Item = (&String, &NodeValidation)> {
        self.nodes
            .iter()
            .filter(|(_, result)| result.level != ValidationLevel::Valid)
    }
}

impl PartialEq for ValidationStatus {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.message == other.message && self.nodes == other.nodes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentageCorrection {
    pub node_id: String,
    pub label: String,
    pub current: f64,
    pub corrected: f64,
    pub delta: f64,
}

#[derive(Debug, Clone)]
pub struct AppliedCorrections {
    pub corrections: Vec<PercentageCorrection>,
    pub persisted: Persisted,
    pub status: ValidationStatus,
}

/// Checks one node's own percentage, then the sum of its direct children.
pub fn validate_node(node: &TreeNode) -> NodeValidation {
    if !node.percentage.is_finite() {
        return NodeValidation::at(ValidationLevel::Error, "percentage is not a number");
    }
    if node.percentage < 0.0 {
        return NodeValidation::at(ValidationLevel::Error, "negative percentage");
    }
    if node.percentage > FULL_SHARE {
        return NodeValidation::at(ValidationLevel::Error, "percentage above 100%");
    }
    if !node.has_children() {
        return NodeValidation::valid();
    }

    let sum = node.children_sum();
    if !sum.is_finite() {
        return NodeValidation::at(ValidationLevel::Error, "children percentages are not numbers");
    }
    let difference = (sum - FULL_SHARE).abs();
    if difference > ERROR_TOLERANCE {
        let mut result = NodeValidation::at(
            ValidationLevel::Error,
            format!("children sum to {sum:.1}% instead of 100%"),
        );
        result.suggested_percentage = suggested_first_child(node, sum);
        return result;
    }
    if difference > WARNING_TOLERANCE {
        return NodeValidation::at(
            ValidationLevel::Warning,
            format!("children drift by {difference:.2}%"),
        );
    }
    NodeValidation::valid()
}

fn suggested_first_child(node: &TreeNode, sum: f64) -> Option<f64> {
    let first = node.children().first()?;
    if sum > 0.0 {
        Some(first.percentage * FULL_SHARE / sum)
    } else {
        Some(FULL_SHARE / node.children().len() as f64)
    }
}

/// Validates every node and aggregates the worst level. Repeated ids get an
/// extra `<id>_duplicate` error entry and keep the worse of their results.
pub fn validate_tree(root: &TreeNode) -> ValidationStatus {
    let mut nodes: BTreeMap<String, NodeValidation> = BTreeMap::new();
    let mut seen = HashSet::new();
    for node in root.all_nodes() {
        let result = validate_node(node);
        match nodes.get_mut(node.id()) {
            Some(existing) if existing.level >= result.level => {}
            Some(existing) => *existing = result,
            None => {
                nodes.insert(node.id().to_string(), result);
            }
        }
        if !seen.insert(node.id()) {
            nodes.insert(
                format!("{}{DUPLICATE_SUFFIX}", node.id()),
                NodeValidation::at(ValidationLevel::Error, "duplicate id"),
            );
        }
    }

    let level = nodes
        .values()
        .map(|result| result.level)
        .max()
        .unwrap_or(ValidationLevel::Valid);
    let message = match level {
        ValidationLevel::Valid => "configuration is valid",
        ValidationLevel::Warning => "warnings found in the tree",
        ValidationLevel::Error => "errors found in the tree",
    };
    debug!(level = %level, nodes = nodes.len(), "tree validated");
    ValidationStatus {
        level,
        message: message.to_string(),
        nodes,
        validated_at: now_utc_rfc3339(),
    }
}

/// Proportional targets for every child of `parent`, or nothing when the
/// children already sum to 100 within the error band.
pub fn suggested_corrections(parent: &TreeNode) -> Vec<PercentageCorrection> {
    if !parent.has_children() {
        return Vec::new();
    }
    let sum = parent.children_sum();
    if sum.is_finite() && (sum - FULL_SHARE).abs() <= ERROR_TOLERANCE {
        return Vec::new();
    }

    let mut target = parent.clone();
    redistribute_to_hundred(&mut target);
    parent
        .children()
        .iter()
        .zip(target.children())
        .map(|(current, corrected)| PercentageCorrection {
            node_id: current.id().to_string(),
            label: current.label.clone(),
            current: current.percentage,
            corrected: corrected.percentage,
            delta: corrected.percentage - current.percentage,
        })
        .collect()
}

/// Normalizes the children of `parent_id` through the store, then
/// re-validates. `Ok(None)` means nothing needed fixing.
pub fn apply_corrections(
    store: &mut TreeStore,
    parent_id: &str,
) -> Result<Option<AppliedCorrections>, StoreError> {
    let parent = store
        .find(parent_id)
        .ok_or_else(|| StructuralError::NotFound(parent_id.to_string()))?;
    let corrections = suggested_corrections(parent);
    if corrections.is_empty() {
        return Ok(None);
    }

    let persisted = store.normalize_children(parent_id)?;
    let status = validate_tree(store.root());
    info!(
        parent = parent_id,
        corrected = corrections.len(),
        level = %status.level,
        "percentage corrections applied"
    );
    Ok(Some(AppliedCorrections {
        corrections,
        persisted,
        status,
    }))
}

#[cfg(test)]
mod tests {
    use super::{
        apply_corrections, suggested_corrections, validate_node, validate_tree, ValidationLevel,
    };
    use crate::store::{MemoryPersistence, Persisted, StoreError, TreeStore};
    use crate::tree::{default_tree, TreeNode};

    fn parent_with(percentages: &[f64]) -> TreeNode {
        percentages
            .iter()
            .enumerate()
            .fold(TreeNode::new("p", "Parent", 100.0), |parent, (i, pct)| {
                parent.with_child(TreeNode::new(format!("c{i}"), format!("Child {i}"), *pct))
            })
    }

    #[test]
    fn default_tree_is_valid() {
        let status = validate_tree(&default_tree());
        assert_eq!(status.level, ValidationLevel::Valid);
        assert_eq!(status.nodes.len(), 7);
        assert_eq!(status.problems().count(), 0);
    }

    #[test]
    fn tolerance_bands_separate_warning_from_error() {
        assert_eq!(
            validate_node(&parent_with(&[50.0, 50.0])).level,
            ValidationLevel::Valid
        );
        assert_eq!(
            validate_node(&parent_with(&[50.0, 50.05])).level,
            ValidationLevel::Warning
        );
        let error = validate_node(&parent_with(&[50.0, 50.5]));
        assert_eq!(error.level, ValidationLevel::Error);
        assert_eq!(error.message, "children sum to 100.5% instead of 100%");
        assert!(!error.is_valid());
    }

    #[test]
    fn own_percentage_out_of_range_is_an_error() {
        for value in [-1.0, 100.5, f64::NAN] {
            let node = TreeNode::new("n", "N", value);
            assert_eq!(validate_node(&node).level, ValidationLevel::Error);
        }
    }

    #[test]
    fn duplicate_ids_are_reported_separately() {
        let root = TreeNode::new("root", "Root", 100.0)
            .with_child(TreeNode::new("x", "First", 50.0))
            .with_child(TreeNode::new("x", "Second", 50.0));
        let status = validate_tree(&root);
        assert_eq!(status.level, ValidationLevel::Error);
        assert_eq!(status.nodes["x_duplicate"].level, ValidationLevel::Error);
        assert_eq!(status.nodes["x"].level, ValidationLevel::Valid);
    }

    #[test]
    fn repeated_id_keeps_the_worse_result() {
        let root = TreeNode::new("root", "Root", 100.0)
            .with_child(
                TreeNode::new("x", "First", 50.0).with_child(TreeNode::new("c", "C", 30.0)),
            )
            .with_child(TreeNode::new("x", "Second", 50.0));
        let status = validate_tree(&root);
        assert_eq!(status.nodes["x"].level, ValidationLevel::Error);
        assert_eq!(
            status.nodes["x"].message,
            "children sum to 30.0% instead of 100%"
        );

        let reversed = TreeNode::new("root", "Root", 100.0)
            .with_child(TreeNode::new("x", "First", 50.0))
            .with_child(
                TreeNode::new("x", "Second", 50.0).with_child(TreeNode::new("c", "C", 30.0)),
            );
        assert_eq!(validate_tree(&reversed).nodes["x"].level, ValidationLevel::Error);
    }

    #[test]
    fn overfull_parent_gets_proportional_corrections() {
        let parent = parent_with(&[60.0, 40.0, 50.0]);
        let status = validate_tree(&parent);
        assert_eq!(status.level, ValidationLevel::Error);
        assert_eq!(status.nodes["p"].message, "children sum to 150.0% instead of 100%");
        let suggested = status.nodes["p"]
            .suggested_percentage
            .expect("first child suggestion");
        assert!((suggested - 40.0).abs() < 1e-9);

        let corrections = suggested_corrections(&parent);
        assert_eq!(corrections.len(), 3);
        let corrected = corrections.iter().map(|c| c.corrected).collect::<Vec<_>>();
        assert!((corrected[0] - 40.0).abs() < 0.01);
        assert!((corrected[1] - 26.67).abs() < 0.01);
        assert!((corrected[2] - 33.33).abs() < 0.01);
        assert!((corrected.iter().sum::<f64>() - 100.0).abs() < 0.001);
        assert!((corrections[0].delta + 20.0).abs() < 0.01);
    }

    #[test]
    fn no_corrections_within_tolerance() {
        assert!(suggested_corrections(&parent_with(&[50.0, 50.05])).is_empty());
        assert!(suggested_corrections(&TreeNode::new("leaf", "Leaf", 10.0)).is_empty());
    }

    #[test]
    fn apply_corrections_normalizes_through_the_store() {
        let root = TreeNode::new("root", "Root", 100.0).with_child(parent_with(&[60.0, 40.0, 50.0]));
        let persistence = MemoryPersistence::new();
        let mut store = TreeStore::with_root(root, Box::new(persistence.clone()));

        let applied = apply_corrections(&mut store, "p")
            .expect("corrections apply")
            .expect("something to fix");
        assert_eq!(applied.corrections.len(), 3);
        assert_eq!(applied.persisted, Persisted::Saved);
        assert_eq!(applied.status.level, ValidationLevel::Valid);
        assert_eq!(persistence.save_count(), 1);

        assert!(apply_corrections(&mut store, "p")
            .expect("second pass")
            .is_none());
        assert!(matches!(
            apply_corrections(&mut store, "missing"),
            Err(StoreError::Structural(_))
        ));
    }
}
