use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::slot::{
    GeneratedSlot, FINAL_PERCENTAGE_KEY, NODE_COLOR_KEY, NODE_LEVEL_KEY, TREE_DIGEST_KEY,
};
use crate::store::{ListenerId, TreeStore};
use crate::tree::{tree_digest, TreeNode, DEFAULT_COLOR, PATH_SEPARATOR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    NoTree,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::NoTree => write!(f, "no tree configuration is loaded"),
        }
    }
}

impl Error for GenerationError {}

#[derive(Debug)]
struct Snapshot {
    root: TreeNode,
    digest: String,
}

impl Snapshot {
    fn of(root: &TreeNode) -> Arc<Self> {
        Arc::new(Self {
            root: root.clone(),
            digest: tree_digest(root),
        })
    }
}

type SharedSnapshot = Arc<RwLock<Option<Arc<Snapshot>>>>;

/// Exact probability of reaching one leaf from the root.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LeafProbability {
    pub id: String,
    pub path: String,
    pub probability: f64,
}

/// Weighted random descent over a cached copy of the tree.
///
/// The cache is replaced whole on every store notification, so a generation
/// always walks a tree that has finished redistributing.
pub struct SlotEngine {
    snapshot: SharedSnapshot,
    rng: Mutex<ChaCha8Rng>,
    listener: Option<ListenerId>,
}

impl SlotEngine {
    /// Takes an initial snapshot of the store and subscribes for refreshes.
    pub fn attach(store: &mut TreeStore, seed: Option<u64>) -> Self {
        let snapshot: SharedSnapshot = Arc::new(RwLock::new(Some(Snapshot::of(store.root()))));
        let cache = Arc::clone(&snapshot);
        let listener = store.subscribe(move |root: &TreeNode| {
            let mut guard = cache
                .write()
                .map_err(|_| "generation snapshot lock poisoned")?;
            *guard = Some(Snapshot::of(root));
            info!(
                nodes = root.summary().node_count,
                "generation snapshot refreshed"
            );
            Ok(())
        });
        debug!(listeners = store.listener_count(), "slot engine attached");
        Self {
            snapshot,
            rng: Mutex::new(rng_from_seed(seed)),
            listener: Some(listener),
        }
    }

    /// An engine with no tree; every generation reports `NoTree`.
    #[cfg(test)]
    pub fn empty(seed: Option<u64>) -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(None)),
            rng: Mutex::new(rng_from_seed(seed)),
            listener: None,
        }
    }

    /// True while store notifications refresh the snapshot.
    pub fn is_attached(&self) -> bool {
        self.listener.is_some()
    }

    /// Stops receiving refreshes; the last snapshot stays usable.
    #[cfg(test)]
    pub fn detach(&mut self, store: &mut TreeStore) -> bool {
        match self.listener.take() {
            Some(id) => store.unsubscribe(id),
            None => false,
        }
    }

    #[cfg(test)]
    pub fn cached_root(&self) -> Option<TreeNode> {
        self.current().map(|snapshot| snapshot.root.clone())
    }

    fn current(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    pub fn generate_slot(&self) -> Result<GeneratedSlot, GenerationError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.generate_slot_with(&mut *rng)
    }

    /// Draws one slot with a caller-owned RNG, so concurrent callers do not
    /// share the engine's RNG lock.
    pub fn generate_slot_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<GeneratedSlot, GenerationError> {
        let snapshot = self.current().ok_or_else(|| {
            warn!("slot requested without a cached tree");
            GenerationError::NoTree
        })?;

        let mut path = Vec::new();
        let leaf = descend(&snapshot.root, rng, &mut path);
        let slot = GeneratedSlot::new(path.join(PATH_SEPARATOR), leaf.id(), leaf.label.clone())
            .with_metadata(NODE_LEVEL_KEY, path.len() - 1)
            .with_metadata(FINAL_PERCENTAGE_KEY, leaf.percentage)
            .with_metadata(NODE_COLOR_KEY, leaf.color().unwrap_or(DEFAULT_COLOR))
            .with_metadata(TREE_DIGEST_KEY, snapshot.digest.clone());
        debug!(path = %slot.decision_path, leaf = %slot.selected_node_id, "slot generated");
        Ok(slot)
    }

    pub fn generate_slots(&self, count: usize) -> Result<Vec<GeneratedSlot>, GenerationError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let slots = (0..count)
            .map(|_| self.generate_slot_with(&mut *rng))
            .collect::<Result<Vec<_>, _>>()?;
        info!(count = slots.len(), "slots generated");
        Ok(slots)
    }

    pub fn leaf_probabilities(&self) -> Vec<LeafProbability> {
        match self.current() {
            Some(snapshot) => leaf_probabilities(&snapshot.root),
            None => Vec::new(),
        }
    }
}

fn rng_from_seed(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn descend<'a, R: Rng + ?Sized>(
    root: &'a TreeNode,
    rng: &mut R,
    path: &mut Vec<String>,
) -> &'a TreeNode {
    let mut current = root;
    loop {
        path.push(current.label.clone());
        if current.is_leaf() {
            return current;
        }
        current = select_child(current.children(), rng);
    }
}

/// Weighted pick among non-empty `children`; uniform when no child carries
/// weight.
fn select_child<'a, R: Rng + ?Sized>(children: &'a [TreeNode], rng: &mut R) -> &'a TreeNode {
    let total = children.iter().map(|child| child.percentage).sum::<f64>();
    if !(total > 0.0) {
        debug!("no usable weights, picking uniformly");
        return &children[rng.gen_range(0..children.len())];
    }
    let draw = rng.gen::<f64>() * total;
    pick_by_draw(children, draw)
}

/// Child `i` owns the interval `(c(i-1), c(i)]` of cumulative percentages,
/// so a draw equal to a boundary selects the earlier child. Zero-weight
/// children own no interval and are skipped. The last child absorbs any
/// floating-point overshoot.
fn pick_by_draw(children: &[TreeNode], draw: f64) -> &TreeNode {
    let mut cumulative = 0.0;
    for child in children.iter().filter(|child| child.percentage > 0.0) {
        cumulative += child.percentage;
        if draw <= cumulative {
            return child;
        }
    }
    &children[children.len() - 1]
}

pub fn leaf_probabilities(root: &TreeNode) -> Vec<LeafProbability> {
    let mut leaves = Vec::new();
    let mut path = vec![root.label.clone()];
    collect_probabilities(root, 1.0, &mut path, &mut leaves);
    leaves
}

fn collect_probabilities(
    node: &TreeNode,
    probability: f64,
    path: &mut Vec<String>,
    leaves: &mut Vec<LeafProbability>,
) {
    if node.is_leaf() {
        leaves.push(LeafProbability {
            id: node.id().to_string(),
            path: path.join(PATH_SEPARATOR),
            probability,
        });
        return;
    }
    let total = node.children_sum();
    let count = node.children().len() as f64;
    for child in node.children() {
        let share = if total > 0.0 {
            child.percentage / total
        } else {
            1.0 / count
        };
        path.push(child.label.clone());
        collect_probabilities(child, probability * share, path, leaves);
        path.pop();
    }
}
