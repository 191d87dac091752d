use tracing::{error, info, warn};

use crate::redistribute::{redistribute_excluding, redistribute_to_hundred, FULL_SHARE};
use crate::tree::{default_tree, TreeNode};

mod errors;
mod listeners;
mod persistence;

pub use errors::{PercentageError, StoreError, StructuralError};
use listeners::ChangeListeners;
pub use listeners::{ListenerError, ListenerId};
#[cfg(test)]
pub use persistence::MemoryPersistence;
pub use persistence::{JsonFilePersistence, TreePersistence};

/// Largest drift of a children sum from 100 that still counts as valid.
const SUM_TOLERANCE: f64 = 0.1;

/// Outcome of the save that follows every successful mutation.
///
/// A failed save never rolls the mutation back: memory stays authoritative
/// and listeners have already seen the new tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Saved,
    Failed(String),
}

impl Persisted {
    pub fn is_saved(&self) -> bool {
        matches!(self, Persisted::Saved)
    }
}

#[derive(Debug)]
pub struct Removed {
    pub node: TreeNode,
    pub persisted: Persisted,
}

/// Field changes applied by [`TreeStore::update_node`].
#[derive(Debug, Clone, Default)]
pub struct NodeEdit {
    pub label: Option<String>,
    pub percentage: Option<f64>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub expanded: Option<bool>,
}

impl NodeEdit {
    fn apply(self, node: &mut TreeNode) {
        if let Some(label) = self.label {
            node.label = label;
        }
        if let Some(percentage) = self.percentage {
            node.percentage = percentage;
        }
        if let Some(emoji) = self.emoji {
            node.emoji = non_empty(emoji);
        }
        if let Some(description) = self.description {
            node.description = non_empty(description);
        }
        if let Some(color) = self.color {
            node.set_color(&color);
        }
        if let Some(expanded) = self.expanded {
            node.set_expanded(expanded);
        }
    }
}

/// Single owner of the tree configuration.
///
/// Every mutation validates first, mutates, redistributes the affected
/// parent(s), saves, then notifies listeners. Mutations take `&mut self`;
/// callers sharing a store across threads wrap it in a lock.
pub struct TreeStore {
    root: TreeNode,
    persistence: Box<dyn TreePersistence>,
    listeners: ChangeListeners,
}

impl TreeStore {
    /// Loads the saved tree, installing (and saving) the default tree when
    /// nothing was saved and falling back to it when loading fails or the
    /// saved tree has duplicate ids or out-of-range percentages.
    pub fn open(persistence: Box<dyn TreePersistence>) -> Self {
        let root = match persistence.load() {
            Ok(Some(root)) => match check_loaded_tree(&root) {
                Ok(()) => {
                    info!(nodes = root.summary().node_count, "tree configuration loaded");
                    root
                }
                Err(err) => {
                    error!(error = %err, "saved tree configuration is invalid, using default tree");
                    default_tree()
                }
            },
            Ok(None) => {
                info!("no saved tree configuration, installing default tree");
                let root = default_tree();
                if let Err(err) = persistence.save(&root) {
                    warn!(error = %err, "default tree could not be saved");
                }
                root
            }
            Err(err) => {
                error!(error = %err, "tree configuration failed to load, using default tree");
                default_tree()
            }
        };
        Self::with_root(root, persistence)
    }

    /// Wraps an existing tree without loading or saving.
    pub fn with_root(mut root: TreeNode, persistence: Box<dyn TreePersistence>) -> Self {
        root.detach_parent();
        root.relink_parents();
        Self {
            root,
            persistence,
            listeners: ChangeListeners::default(),
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.root.find_by_id(id)
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&TreeNode) -> Result<(), ListenerError> + Send + 'static,
    {
        self.listeners.subscribe(Box::new(listener))
    }

    #[cfg(test)]
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Attaches `child` under `parent_id` and rescales the parent's children
    /// to 100%.
    pub fn add_child(&mut self, parent_id: &str, child: TreeNode) -> Result<Persisted, StoreError> {
        self.attach(parent_id, child, true)
    }

    /// Attaches `child` and leaves sibling percentages as they are; the
    /// caller fixes them up separately.
    pub fn add_child_without_redistribution(
        &mut self,
        parent_id: &str,
        child: TreeNode,
    ) -> Result<Persisted, StoreError> {
        self.attach(parent_id, child, false)
    }

    fn attach(
        &mut self,
        parent_id: &str,
        child: TreeNode,
        redistribute: bool,
    ) -> Result<Persisted, StoreError> {
        if !self.root.contains(parent_id) {
            return Err(StructuralError::NotFound(parent_id.to_string()).into());
        }
        check_subtree_percentages(&child)?;
        self.check_new_ids(&child)?;

        let child_label = child.label.clone();
        let depth = self.root.depth_of(parent_id).map_or(0, |depth| depth + 1);
        let parent = self.require_mut(parent_id)?;
        parent.add_child(child);
        if redistribute {
            redistribute_to_hundred(parent);
        }
        info!(
            child = %child_label,
            parent = %parent.label,
            depth,
            redistributed = redistribute,
            "node added"
        );
        Ok(self.commit())
    }

    pub fn remove_node(&mut self, id: &str) -> Result<Removed, StoreError> {
        if self.root.find_by_id(id).is_some_and(TreeNode::is_root) {
            return Err(StructuralError::RootNode("removal").into());
        }
        let parent_id = self.parent_id_of(id)?;
        let parent = self.require_mut(&parent_id)?;
        let node = parent
            .remove_child(id)
            .ok_or_else(|| StructuralError::NotFound(id.to_string()))?;
        redistribute_to_hundred(parent);
        info!(node = %node.label, parent = %parent.label, "node removed");
        let persisted = self.commit();
        Ok(Removed { node, persisted })
    }

    /// Moves the subtree rooted at `id` under `new_parent_id`. Both the old
    /// and the new parent are rescaled to 100%.
    pub fn move_node(&mut self, id: &str, new_parent_id: &str) -> Result<Persisted, StoreError> {
        if id == self.root.id() {
            return Err(StructuralError::RootNode("a move").into());
        }
        if !self.root.contains(new_parent_id) {
            return Err(StructuralError::NotFound(new_parent_id.to_string()).into());
        }
        let old_parent_id = self.parent_id_of(id)?;
        if id == new_parent_id || self.root.is_descendant_of(new_parent_id, id) {
            return Err(StructuralError::Cycle {
                node: id.to_string(),
                target: new_parent_id.to_string(),
            }
            .into());
        }

        let old_parent = self.require_mut(&old_parent_id)?;
        let node = old_parent
            .remove_child(id)
            .ok_or_else(|| StructuralError::NotFound(id.to_string()))?;
        redistribute_to_hundred(old_parent);

        let node_label = node.label.clone();
        let new_parent = self.require_mut(new_parent_id)?;
        new_parent.add_child(node);
        redistribute_to_hundred(new_parent);
        info!(
            node = %node_label,
            from = %old_parent_id,
            to = %new_parent_id,
            "node moved"
        );
        Ok(self.commit())
    }

    /// Applies `edit` to the node, then lets its siblings absorb the
    /// remainder of the parent's share around the node's new percentage.
    /// An only child has no siblings to absorb anything, so its percentage
    /// can only be set to 100.
    pub fn update_node(&mut self, id: &str, edit: NodeEdit) -> Result<Persisted, StoreError> {
        if !self.root.contains(id) {
            return Err(StructuralError::NotFound(id.to_string()).into());
        }
        if let Some(percentage) = edit.percentage {
            check_percentage(id, percentage)?;
            let only_child = self
                .root
                .parent_of(id)
                .is_some_and(|parent| parent.children().len() == 1);
            if only_child && (percentage - FULL_SHARE).abs() > SUM_TOLERANCE {
                return Err(PercentageError::OnlyChild {
                    node: id.to_string(),
                    value: percentage,
                }
                .into());
            }
        }

        let node = self.require_mut(id)?;
        edit.apply(node);
        let parent_id = node.parent_id().map(str::to_string);
        if let Some(parent_id) = parent_id {
            let parent = self.require_mut(&parent_id)?;
            redistribute_excluding(parent, id);
        }
        info!(node = id, "node updated");
        Ok(self.commit())
    }

    /// Rescales the children of one parent to 100%.
    pub fn normalize_children(&mut self, parent_id: &str) -> Result<Persisted, StoreError> {
        let parent = self.require_mut(parent_id)?;
        redistribute_to_hundred(parent);
        info!(parent = parent_id, "children normalized");
        Ok(self.commit())
    }

    /// Swaps in a whole new tree, e.g. from an import.
    pub fn replace_root(&mut self, mut root: TreeNode) -> Result<Persisted, StoreError> {
        check_loaded_tree(&root)?;
        root.detach_parent();
        root.relink_parents();
        self.root = root;
        info!(nodes = self.root.summary().node_count, "tree replaced");
        Ok(self.commit())
    }

    pub fn reset_to_default(&mut self) -> Persisted {
        self.root = default_tree();
        info!("tree reset to default");
        self.commit()
    }

    /// Re-reads the saved tree. A failed load or an invalid saved tree
    /// leaves the in-memory tree in place; `Ok(false)` means nothing was
    /// saved.
    #[cfg(test)]
    pub fn reload(&mut self) -> Result<bool, StoreError> {
        match self.persistence.load() {
            Ok(Some(mut root)) => {
                check_loaded_tree(&root)?;
                root.detach_parent();
                root.relink_parents();
                self.root = root;
                self.listeners.notify(&self.root);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(err) => {
                warn!(error = %err, "reload failed, keeping current tree");
                Err(err.into())
            }
        }
    }

    fn commit(&mut self) -> Persisted {
        let persisted = match self.persistence.save(&self.root) {
            Ok(()) => Persisted::Saved,
            Err(err) => {
                warn!(error = %err, "tree changed in memory but could not be saved");
                Persisted::Failed(err.to_string())
            }
        };
        self.listeners.notify(&self.root);
        persisted
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut TreeNode, StructuralError> {
        self.root
            .find_by_id_mut(id)
            .ok_or_else(|| StructuralError::NotFound(id.to_string()))
    }

    fn parent_id_of(&self, id: &str) -> Result<String, StructuralError> {
        self.root
            .parent_of(id)
            .map(|parent| parent.id().to_string())
            .ok_or_else(|| StructuralError::NotFound(id.to_string()))
    }

    fn check_new_ids(&self, subtree: &TreeNode) -> Result<(), StructuralError> {
        if let Some(duplicate) = subtree.duplicate_ids().into_iter().next() {
            return Err(StructuralError::DuplicateId(duplicate));
        }
        match subtree
            .all_nodes()
            .into_iter()
            .find(|node| self.root.contains(node.id()))
        {
            Some(node) => Err(StructuralError::DuplicateId(node.id().to_string())),
            None => Ok(()),
        }
    }
}

pub fn check_percentage(id: &str, value: f64) -> Result<(), PercentageError> {
    if !value.is_finite() {
        return Err(PercentageError::NotFinite {
            node: id.to_string(),
        });
    }
    if !(0.0..=FULL_SHARE).contains(&value) {
        return Err(PercentageError::OutOfRange {
            node: id.to_string(),
            value,
        });
    }
    Ok(())
}

pub fn check_subtree_percentages(subtree: &TreeNode) -> Result<(), PercentageError> {
    subtree
        .all_nodes()
        .into_iter()
        .try_for_each(|node| check_percentage(node.id(), node.percentage))
}

/// Checks a whole tree coming from outside the store.
fn check_loaded_tree(root: &TreeNode) -> Result<(), StoreError> {
    check_subtree_percentages(root)?;
    if let Some(duplicate) = root.duplicate_ids().into_iter().next() {
        return Err(StructuralError::DuplicateId(duplicate).into());
    }
    Ok(())
}

fn non_empty(raw: String) -> Option<String> {
    if raw.trim().is_empty() {
        None
    } else {
        Some(raw.trim().to_string())
    }
}
