//! Ordered record of store calls

use parking_lot::Mutex;

use tandem_core::StepType;

/// Kind of store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// Bulk store
    Store,
    /// Bulk delete
    Delete,
}

/// One recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    /// Which store received the call
    pub store: StepType,
    /// What was called
    pub action: CallAction,
    /// Chunk ids (store) or object ids (delete) passed in
    pub ids: Vec<String>,
}

/// Shared, append-only journal of store calls
#[derive(Debug, Default)]
pub struct CallJournal {
    calls: Mutex<Vec<StoreCall>>,
}

impl CallJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call
    pub fn record(&self, store: StepType, action: CallAction, ids: Vec<String>) {
        self.calls.lock().push(StoreCall { store, action, ids });
    }

    /// All calls in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Delete calls in order
    pub fn deletes(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.action == CallAction::Delete)
            .cloned()
            .collect()
    }

    /// Number of recorded calls
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    /// Forget every recorded call
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}
