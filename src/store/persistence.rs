use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tracing::debug;

use super::errors::PersistenceError;
use crate::tree::{TreeNode, TreeNodeRecord};

/// Load/save boundary for the tree configuration.
pub trait TreePersistence: Send {
    /// `Ok(None)` means nothing has been saved yet.
    fn load(&self) -> Result<Option<TreeNode>, PersistenceError>;
    fn save(&self, root: &TreeNode) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone)]
pub struct JsonFilePersistence {
    path: PathBuf,
}

impl JsonFilePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TreePersistence for JsonFilePersistence {
    fn load(&self) -> Result<Option<TreeNode>, PersistenceError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.path)?;
        let record = serde_json::from_slice::<TreeNodeRecord>(&bytes)?;
        debug!(path = %self.path.display(), "tree configuration loaded");
        Ok(Some(record.into_tree()))
    }

    fn save(&self, root: &TreeNode) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        serde_json::to_writer_pretty(&mut file, &TreeNodeRecord::from(root))?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), "tree configuration saved");
        Ok(())
    }
}

#[cfg(test)]
pub use memory::MemoryPersistence;

#[cfg(test)]
mod memory {
    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};

    use super::{PersistenceError, TreePersistence};
    use crate::tree::{TreeNode, TreeNodeRecord};

    #[derive(Debug, Default)]
    struct MemoryState {
        saved: Option<TreeNodeRecord>,
        fail_saves: bool,
        fail_loads: bool,
        save_count: usize,
    }

    /// In-process persistence; clones share state so a test can inspect what
    /// a store saved.
    #[derive(Debug, Default, Clone)]
    pub struct MemoryPersistence {
        state: Arc<Mutex<MemoryState>>,
    }

    impl MemoryPersistence {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_tree(root: &TreeNode) -> Self {
            let persistence = Self::default();
            persistence.lock().saved = Some(TreeNodeRecord::from(root));
            persistence
        }

        pub fn set_fail_saves(&self, fail: bool) {
            self.lock().fail_saves = fail;
        }

        pub fn set_fail_loads(&self, fail: bool) {
            self.lock().fail_loads = fail;
        }

        pub fn saved_tree(&self) -> Option<TreeNode> {
            self.lock().saved.clone().map(TreeNodeRecord::into_tree)
        }

        pub fn save_count(&self) -> usize {
            self.lock().save_count
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl TreePersistence for MemoryPersistence {
        fn load(&self) -> Result<Option<TreeNode>, PersistenceError> {
            let state = self.lock();
            if state.fail_loads {
                return Err(PersistenceError::Io(io::Error::other("simulated load failure")));
            }
            Ok(state.saved.clone().map(TreeNodeRecord::into_tree))
        }

        fn save(&self, root: &TreeNode) -> Result<(), PersistenceError> {
            let mut state = self.lock();
            if state.fail_saves {
                return Err(PersistenceError::Io(io::Error::other("simulated save failure")));
            }
            state.saved = Some(TreeNodeRecord::from(root));
            state.save_count += 1;
            Ok(())
        }
    }
}
