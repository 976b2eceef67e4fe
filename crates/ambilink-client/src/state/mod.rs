//! Client state machine.
//!
//! [`State`] is a closed set of six variants. Each variant holds only its own
//! data; shared channels and stores come in through [`StateContext`]. State
//! methods never install their successor themselves. They return it, and the
//! request thread installs it, so there is a single place where transitions
//! happen and get announced.
//!
//! Transitions are built by named constructors on the target type
//! (`Subscribed::from_connected`, `Connected::from_error`, ...), which take
//! the previous state by reference and do the entry work (requests, listener
//! switch, observable updates). A constructor that fails leaves the previous
//! state in place and hands the error to the failure policy.

mod connected;
mod disconnected;
mod error_state;
mod object_deleted;
pub mod offline;
mod subscribed;

use std::fmt;

use ambilink_proto::{NotificationKind, ObjectId, Reader};
pub use connected::Connected;
pub use disconnected::Disconnected;
pub use error_state::ErrorState;
pub use object_deleted::ObjectDeleted;
pub use offline::OfflineRendering;
pub use subscribed::Subscribed;

use crate::{command::Command, context::StateContext, error::ClientError};

/// Discriminant of [`State`], cheap to store and compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    /// No channels open; dialing in the background
    #[default]
    Disconnected = 0,
    /// Channels open, no object tracked
    Connected = 1,
    /// Tracking one object live
    Subscribed = 2,
    /// Serving prefetched positions to an offline render
    OfflineRendering = 3,
    /// The tracked object was deleted remotely
    ObjectDeleted = 4,
    /// A fatal error occurred; waiting for a connect command
    Error = 5,
}

impl StateId {
    /// Number of states.
    pub const COUNT: usize = 6;

    /// All states in discriminant order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Disconnected,
        Self::Connected,
        Self::Subscribed,
        Self::OfflineRendering,
        Self::ObjectDeleted,
        Self::Error,
    ];

    /// Slot index of this state.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Convert from the raw discriminant.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Subscribed => "Subscribed",
            Self::OfflineRendering => "OfflineRendering",
            Self::ObjectDeleted => "ObjectDeleted",
            Self::Error => "ErrorState",
        }
    }

    /// Returns true if this state acts on `command`.
    ///
    /// Every other command is dropped with a debug log.
    pub fn supports(self, command: &Command) -> bool {
        use Command as C;

        match self {
            Self::Disconnected => false,
            Self::Connected => {
                matches!(command, C::SubscribeToObject(_) | C::UpdateObjectList)
            },
            Self::Subscribed => matches!(
                command,
                C::Unsubscribe
                    | C::SubscribeToObject(_)
                    | C::EnableRenderingMode
                    | C::UpdateObjectList
            ),
            Self::OfflineRendering => {
                matches!(command, C::DisableRenderingMode | C::UpdateObjectList)
            },
            Self::ObjectDeleted => {
                matches!(command, C::SubscribeToObject(_) | C::Unsubscribe | C::UpdateObjectList)
            },
            Self::Error => matches!(command, C::Connect),
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The current client state.
#[derive(Debug)]
pub enum State {
    /// See [`Disconnected`]
    Disconnected(Disconnected),
    /// See [`Connected`]
    Connected(Connected),
    /// See [`Subscribed`]
    Subscribed(Subscribed),
    /// See [`OfflineRendering`]
    OfflineRendering(OfflineRendering),
    /// See [`ObjectDeleted`]
    ObjectDeleted(ObjectDeleted),
    /// See [`ErrorState`]
    Error(ErrorState),
}

impl State {
    /// Discriminant of this state.
    pub fn id(&self) -> StateId {
        match self {
            Self::Disconnected(_) => StateId::Disconnected,
            Self::Connected(_) => StateId::Connected,
            Self::Subscribed(_) => StateId::Subscribed,
            Self::OfflineRendering(_) => StateId::OfflineRendering,
            Self::ObjectDeleted(_) => StateId::ObjectDeleted,
            Self::Error(_) => StateId::Error,
        }
    }

    /// Object id the companion is currently pushing notifications for.
    pub fn active_subscription(&self) -> Option<ObjectId> {
        match self {
            Self::Subscribed(s) => s.active_subscription(),
            Self::OfflineRendering(s) => Some(s.object_id()),
            _ => None,
        }
    }

    /// Act on a user command. Returns the next state, if any.
    pub(crate) fn process_command(
        &self,
        command: &Command,
        ctx: &StateContext,
    ) -> Result<Option<Self>, ClientError> {
        if !self.id().supports(command) {
            tracing::debug!(state = %self.id(), command = command.name(), "command ignored");
            return Ok(None);
        }

        match self {
            Self::Disconnected(_) => Ok(None),
            Self::Connected(s) => s.process_command(command, ctx),
            Self::Subscribed(s) => s.process_command(command, ctx),
            Self::OfflineRendering(s) => s.process_command(command, ctx),
            Self::ObjectDeleted(s) => s.process_command(command, ctx),
            Self::Error(s) => s.process_command(command, ctx),
        }
    }

    /// Periodic work on the request thread. Returns the next state, if any.
    ///
    /// `should_stop` is polled by long-running work so shutdown is not held
    /// up by a reconnect loop or a prefetch run.
    pub(crate) fn idle_poll(
        &self,
        ctx: &StateContext,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<Option<Self>, ClientError> {
        match self {
            Self::Disconnected(s) => s.idle_poll(ctx, should_stop),
            Self::Connected(s) => s.idle_poll(ctx),
            Self::Subscribed(s) => s.idle_poll(ctx),
            Self::OfflineRendering(s) => s.idle_poll(ctx, should_stop),
            Self::ObjectDeleted(_) | Self::Error(_) => Ok(None),
        }
    }

    /// Handle a push notification about the subscribed object.
    ///
    /// Runs on the subscription thread; the reader sits just past the
    /// notification header.
    pub(crate) fn on_push_notification(
        &self,
        kind: NotificationKind,
        reader: &mut Reader,
        ctx: &StateContext,
    ) -> Result<(), ClientError> {
        match self {
            Self::Subscribed(s) => s.on_push_notification(kind, reader, ctx),
            Self::OfflineRendering(s) => s.on_push_notification(kind, reader, ctx),
            _ => {
                tracing::trace!(state = %self.id(), ?kind, "notification ignored");
                Ok(())
            },
        }
    }

    /// Keepalive, sent only by states that hold a healthy connection.
    pub(crate) fn send_ping(&self, ctx: &StateContext) -> Result<(), ClientError> {
        match self {
            Self::Connected(_) | Self::Subscribed(_) | Self::ObjectDeleted(_) => ctx.ping_if_due(),
            Self::OfflineRendering(s) => s.send_ping(ctx),
            Self::Disconnected(_) | Self::Error(_) => Ok(()),
        }
    }

    /// Cleanup when the client shuts down in this state.
    pub(crate) fn on_shutdown(&self, ctx: &StateContext) -> Result<(), ClientError> {
        match self {
            Self::Subscribed(s) => s.on_shutdown(ctx),
            Self::OfflineRendering(s) => s.on_shutdown(ctx),
            _ => Ok(()),
        }
    }

    /// Release anything blocked on this state (an audio-thread lookup).
    ///
    /// Called before the state is replaced after a failure and at shutdown.
    pub(crate) fn interrupt(&self) {
        if let Self::OfflineRendering(s) = self {
            s.abort();
        }
    }
}

/// A concrete state type that can be projected out of [`State`].
pub trait StateVariant: Sized {
    /// Discriminant of this variant.
    const ID: StateId;

    /// Borrow the variant if `state` is one.
    fn project(state: &State) -> Option<&Self>;
}

macro_rules! impl_state_variant {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl StateVariant for $ty {
                const ID: StateId = StateId::$variant;

                fn project(state: &State) -> Option<&Self> {
                    match state {
                        State::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_state_variant! {
    Disconnected => Disconnected,
    Connected => Connected,
    Subscribed => Subscribed,
    OfflineRendering => OfflineRendering,
    ObjectDeleted => ObjectDeleted,
    ErrorState => Error,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::{ScriptedTransport, connected_context};

    fn all_commands() -> Vec<Command> {
        vec![
            Command::Connect,
            Command::Unsubscribe,
            Command::SubscribeToObject("Cube".into()),
            Command::UpdateObjectList,
            Command::EnableRenderingMode,
            Command::DisableRenderingMode,
        ]
    }

    #[test]
    fn ids_round_trip_through_u8() {
        for id in StateId::ALL {
            assert_eq!(StateId::from_u8(id as u8), Some(id));
            assert_eq!(StateId::ALL[id.index()], id);
        }
        assert_eq!(StateId::from_u8(6), None);
        assert_eq!(StateId::default(), StateId::Disconnected);
    }

    #[test]
    fn supported_command_sets() {
        let supported = |id: StateId| -> Vec<&'static str> {
            all_commands().iter().filter(|c| id.supports(c)).map(Command::name).collect()
        };

        assert!(supported(StateId::Disconnected).is_empty());
        assert_eq!(supported(StateId::Connected), ["subscribe_to_object", "update_object_list"]);
        assert_eq!(
            supported(StateId::Subscribed),
            ["unsubscribe", "subscribe_to_object", "update_object_list", "enable_rendering_mode"]
        );
        assert_eq!(
            supported(StateId::OfflineRendering),
            ["update_object_list", "disable_rendering_mode"]
        );
        assert_eq!(
            supported(StateId::ObjectDeleted),
            ["unsubscribe", "subscribe_to_object", "update_object_list"]
        );
        assert_eq!(supported(StateId::Error), ["connect"]);
    }

    #[test]
    fn unsupported_commands_send_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        let state = State::Connected(Connected::from_disconnected(&ctx).unwrap());

        for command in [Command::Connect, Command::Unsubscribe, Command::DisableRenderingMode] {
            assert!(state.process_command(&command, &ctx).unwrap().is_none());
        }
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn projection_matches_variant() {
        let state = State::Disconnected(Disconnected);
        assert!(Disconnected::project(&state).is_some());
        assert!(Connected::project(&state).is_none());
        assert_eq!(<ErrorState as StateVariant>::ID, StateId::Error);
        assert_eq!(state.active_subscription(), None);
    }

    #[test]
    fn error_and_disconnected_never_ping() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context_with(
            &transport,
            crate::config::ClientConfig {
                ping_interval: std::time::Duration::ZERO,
                ..Default::default()
            },
        );

        State::Disconnected(Disconnected).send_ping(&ctx).unwrap();
        let error = ErrorState::enter(
            ClientError::Protocol(ambilink_proto::ProtocolError::InternalError),
            &State::Disconnected(Disconnected),
            &ctx,
        );
        State::Error(error).send_ping(&ctx).unwrap();
        assert!(transport.sent().is_empty());
    }
}
