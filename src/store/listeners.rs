use std::error::Error;
use std::panic::{self, AssertUnwindSafe};

use tracing::{error, warn};

use crate::tree::TreeNode;

pub type ListenerError = Box<dyn Error + Send + Sync>;

type Listener = Box<dyn FnMut(&TreeNode) -> Result<(), ListenerError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Change-notification registry owned by one store.
#[derive(Default)]
pub struct ChangeListeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl ChangeListeners {
    pub fn subscribe(&mut self, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, listener));
        id
    }

    #[cfg(test)]
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Calls every listener in registration order and returns how many
    /// failed. A failing or panicking listener does not stop the others.
    pub fn notify(&mut self, root: &TreeNode) -> usize {
        let mut failures = 0;
        for (id, listener) in self.entries.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(root))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    warn!(listener = id.0, error = %err, "change listener failed");
                }
                Err(_) => {
                    failures += 1;
                    error!(listener = id.0, "change listener panicked");
                }
            }
        }
        failures
    }
}
