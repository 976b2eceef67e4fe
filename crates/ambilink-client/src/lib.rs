//! Ambilink IPC client.
//!
//! Connects a real-time audio plugin to the companion 3D application, tracks
//! the position of one subscribed object and hands direction/distance samples
//! to the audio thread without ever blocking it on I/O.
//!
//! # Architecture
//!
//! The client is a six-state machine driven by a dedicated request/reply
//! thread. A second thread listens for push notifications and forwards them to
//! whatever state is current. The audio thread only ever reads atomics, or in
//! offline rendering mode calls a bounded-wait lookup into a prefetched slice
//! cache.
//!
//! ```text
//! Disconnected ──dial──► Connected ──subscribe──► Subscribed ──render──► OfflineRendering
//!       ▲                    ▲                      │   ▲                     │
//!       └─ reconnectable ────┤◄──── unsubscribe ────┘   └──── disable ────────┘
//!                            │                      │ deleted                 │ deleted
//!                 connect ── ErrorState             ▼                         ▼
//!                                                 ObjectDeleted ◄─────────────┘
//! ```
//!
//! # Components
//!
//! - [`IpcClient`]: owns the threads, the current-state slot and the real-time
//!   surface
//! - [`State`]: the closed set of states and their transition constructors
//! - [`StateContext`]: channels, atomics and the observable store shared by
//!   every state
//! - [`CommandQueue`]: bounded queue of user intents
//! - [`ObservableState`]: values the surrounding application observes, written
//!   only through queued [`PropertyUpdate`]s
//! - [`AudioBridge`]: per-block adapter used by the audio processor
//! - [`transport`]: channel traits and the Unix-socket implementation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bridge;
pub mod client;
pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod geometry;
pub mod observable;
pub mod state;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use bridge::{AudioBridge, BridgeConfig, Encoder};
pub use client::{IpcClient, ScopedState};
pub use command::{Command, CommandQueue};
pub use config::{ClientConfig, OfflineRenderingConfig};
pub use context::StateContext;
pub use error::ClientError;
pub use observable::{ObservableSnapshot, ObservableState, PropertyUpdate};
pub use state::{
    Connected, Disconnected, ErrorState, ObjectDeleted, OfflineRendering, State, StateId,
    StateVariant, Subscribed,
};
pub use transport::{
    NotificationChannel, RequestChannel, Transport, TransportError, UnixTransport,
};
pub use types::{Direction, DirectionWithDistance, Distance, ObjectInfo};
