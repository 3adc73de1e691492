//! Engine lifecycle bookkeeping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};

/// Shared lifecycle state: the engine's logical name and its closed flag.
///
/// The closed flag flips before the concrete engine releases its partitions,
/// so partition teardown must not re-check [`assert_open`](Self::assert_open).
pub(crate) struct EngineCore {
    name: RwLock<String>,
    closed: AtomicBool,
}

impl EngineCore {
    pub(crate) fn new(name: String) -> Self {
        Self { name: RwLock::new(name), closed: AtomicBool::new(false) }
    }

    pub(crate) fn name(&self) -> String {
        self.name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name.to_string();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fail with [`StoreError::Closed`] before any side effect.
    pub(crate) fn assert_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Flip the closed flag. Returns `true` if this call performed the
    /// open-to-closed transition, `false` if the engine was already closed.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let core = EngineCore::new("modelA".to_string());
        assert_eq!(core.name(), "modelA");
        assert!(!core.is_closed());
        assert!(core.assert_open().is_ok());

        assert!(core.begin_close());
        assert!(core.is_closed());
        assert!(matches!(core.assert_open(), Err(StoreError::Closed)));
        // A second close is not a transition.
        assert!(!core.begin_close());
    }

    #[test]
    fn test_rename_updates_name() {
        let core = EngineCore::new("old".to_string());
        core.set_name("new");
        assert_eq!(core.name(), "new");
    }
}
