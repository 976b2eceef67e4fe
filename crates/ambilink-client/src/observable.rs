//! Values the surrounding application observes.
//!
//! Client threads never write the store directly. They queue
//! [`PropertyUpdate`]s, and the application's control thread applies them with
//! [`ObservableState::apply_pending`], so UI-facing state only ever changes on
//! the thread that owns it.

use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;

use crate::{state::StateId, types::DirectionWithDistance};

/// One queued change to the observable store.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyUpdate {
    /// The client entered a new state
    ClientState(StateId),
    /// Name of the subscribed object, or `None` when unsubscribed
    ObjectName(Option<String>),
    /// Whether the subscribed object was deleted remotely
    ObjectDeleted(bool),
    /// Names of all trackable objects
    ObjectList(Vec<String>),
    /// Description of the last error, or `None` once recovered
    IpcError(Option<String>),
    /// Latest live direction (throttled mirror of the atomics)
    CurrentDirection(DirectionWithDistance),
}

/// Applied values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservableSnapshot {
    /// Current client state
    pub client_state: StateId,
    /// Subscribed object name
    pub object_name: Option<String>,
    /// Subscribed object was deleted
    pub object_deleted: bool,
    /// Trackable objects
    pub object_list: Vec<String>,
    /// Last error description
    pub ipc_error: Option<String>,
    /// Latest mirrored direction
    pub current_direction: Option<DirectionWithDistance>,
}

impl ObservableSnapshot {
    fn apply(&mut self, update: PropertyUpdate) {
        match update {
            PropertyUpdate::ClientState(id) => self.client_state = id,
            PropertyUpdate::ObjectName(name) => self.object_name = name,
            PropertyUpdate::ObjectDeleted(deleted) => self.object_deleted = deleted,
            PropertyUpdate::ObjectList(names) => self.object_list = names,
            PropertyUpdate::IpcError(error) => self.ipc_error = error,
            PropertyUpdate::CurrentDirection(sample) => self.current_direction = Some(sample),
        }
    }
}

/// Observable store plus its pending-update queue.
#[derive(Debug)]
pub struct ObservableState {
    values: RwLock<ObservableSnapshot>,
    pending: ArrayQueue<PropertyUpdate>,
}

impl ObservableState {
    /// Create an empty store whose queue holds `capacity` updates (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            values: RwLock::new(ObservableSnapshot::default()),
            pending: ArrayQueue::new(capacity.max(1)),
        }
    }

    /// Queue an update for the control thread.
    ///
    /// Returns false and drops the update if the queue is full.
    pub fn queue(&self, update: PropertyUpdate) -> bool {
        match self.pending.push(update) {
            Ok(()) => true,
            Err(dropped) => {
                tracing::warn!(?dropped, "property update queue full, dropping update");
                false
            },
        }
    }

    /// Apply every queued update in order and return them.
    ///
    /// Called from the application's control thread.
    pub fn apply_pending(&self) -> Vec<PropertyUpdate> {
        let mut applied = Vec::new();
        while let Some(update) = self.pending.pop() {
            applied.push(update);
        }
        if !applied.is_empty() {
            let mut values = self.values.write();
            for update in &applied {
                values.apply(update.clone());
            }
        }
        applied
    }

    /// Number of updates waiting to be applied.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Copy of the applied values.
    pub fn snapshot(&self) -> ObservableSnapshot {
        self.values.read().clone()
    }

    /// Applied object name.
    pub fn object_name(&self) -> Option<String> {
        self.values.read().object_name.clone()
    }

    /// Set the object name directly, e.g. when restoring a saved session.
    ///
    /// Only the control thread may call this.
    pub fn set_object_name(&self, name: Option<String>) {
        self.values.write().object_name = name;
    }
}
