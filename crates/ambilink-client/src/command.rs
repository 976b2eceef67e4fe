//! User intents and the bounded queue that carries them to the request thread.

use crossbeam::queue::ArrayQueue;

/// A user intent processed by the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Leave the error state and reconnect
    Connect,
    /// Drop the current subscription
    Unsubscribe,
    /// Subscribe to the named object, replacing any current subscription
    SubscribeToObject(String),
    /// Refresh the list of trackable objects
    UpdateObjectList,
    /// Switch to offline rendering
    EnableRenderingMode,
    /// Return to live tracking
    DisableRenderingMode,
}

impl Command {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Unsubscribe => "unsubscribe",
            Self::SubscribeToObject(_) => "subscribe_to_object",
            Self::UpdateObjectList => "update_object_list",
            Self::EnableRenderingMode => "enable_rendering_mode",
            Self::DisableRenderingMode => "disable_rendering_mode",
        }
    }
}

/// Bounded FIFO of commands.
///
/// Fed from the control thread and drained by the request thread. A full
/// queue rejects new commands instead of blocking the caller.
#[derive(Debug)]
pub struct CommandQueue {
    queue: ArrayQueue<Command>,
}

impl CommandQueue {
    /// Create a queue holding at most `capacity` commands (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self { queue: ArrayQueue::new(capacity.max(1)) }
    }

    /// Append a command. Returns false if the queue is full.
    pub fn push(&self, command: Command) -> bool {
        match self.queue.push(command) {
            Ok(()) => true,
            Err(rejected) => {
                tracing::warn!(command = rejected.name(), "command queue full, dropping command");
                false
            },
        }
    }

    /// Take the oldest command.
    pub fn pop(&self) -> Option<Command> {
        self.queue.pop()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if no command is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum number of queued commands.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}
