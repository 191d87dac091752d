//! Sibling percentage redistribution.
//!
//! Mode A ([`redistribute_to_hundred`]) rescales all children of a parent so
//! they sum to 100. Mode B ([`redistribute_excluding`]) keeps one child fixed
//! and lets its siblings absorb the remainder. Both expect percentages that
//! are finite and non-negative; callers reject anything else first.

use tracing::debug;

use crate::tree::TreeNode;

pub const FULL_SHARE: f64 = 100.0;

/// Sums at or below this are treated as "all zero" and split equally.
const ZERO_SUM_THRESHOLD: f64 = 0.01;
/// Residual left after scaling that triggers a correction on one child.
const ROUNDING_TOLERANCE: f64 = 0.001;

pub fn redistribute_to_hundred(parent: &mut TreeNode) {
    let label = parent.label.clone();
    let children = parent.children_mut();
    if children.is_empty() {
        return;
    }

    let current_sum = sum(children);
    debug!(
        parent = %label,
        current_sum,
        children = children.len(),
        "redistributing children to 100%"
    );

    if current_sum > ZERO_SUM_THRESHOLD {
        let factor = FULL_SHARE / current_sum;
        for child in children.iter_mut() {
            child.percentage *= factor;
        }
    } else {
        let equal = FULL_SHARE / children.len() as f64;
        for child in children.iter_mut() {
            child.percentage = equal;
        }
    }

    let residual = FULL_SHARE - sum(children);
    if residual.abs() > ROUNDING_TOLERANCE {
        children[0].percentage += residual;
        debug!(child = %children[0].label, residual, "rounding correction applied");
    }
}

/// Redistributes the siblings of `excluded_id` into `100 - excluded`.
///
/// The excluded child is never modified. When it already takes the whole
/// share, every sibling drops to 0.
pub fn redistribute_excluding(parent: &mut TreeNode, excluded_id: &str) {
    let label = parent.label.clone();
    let children = parent.children_mut();
    let Some(excluded) = children
        .iter()
        .find(|child| child.id() == excluded_id)
        .map(|child| child.percentage)
    else {
        redistribute_to_hundred(parent);
        return;
    };

    let mut others = children
        .iter_mut()
        .filter(|child| child.id() != excluded_id)
        .collect::<Vec<_>>();
    if others.is_empty() {
        debug!(parent = %label, excluded_id, "no siblings to redistribute");
        return;
    }

    let available = FULL_SHARE - excluded;
    let others_sum = others.iter().map(|child| child.percentage).sum::<f64>();
    debug!(
        parent = %label,
        excluded_id,
        available,
        others_sum,
        "redistributing siblings around edited child"
    );

    if available <= ROUNDING_TOLERANCE {
        for child in others.iter_mut() {
            child.percentage = 0.0;
        }
        return;
    }

    if others_sum > ZERO_SUM_THRESHOLD {
        let factor = available / others_sum;
        for child in others.iter_mut() {
            child.percentage *= factor;
        }
    } else {
        let equal = available / others.len() as f64;
        for child in others.iter_mut() {
            child.percentage = equal;
        }
    }

    let total = excluded + others.iter().map(|child| child.percentage).sum::<f64>();
    let residual = FULL_SHARE - total;
    if residual.abs() > ROUNDING_TOLERANCE {
        others[0].percentage += residual;
        debug!(child = %others[0].label, residual, "rounding correction applied");
    }
}

fn sum(children: &[TreeNode]) -> f64 {
    children.iter().map(|child| child.percentage).sum()
}
