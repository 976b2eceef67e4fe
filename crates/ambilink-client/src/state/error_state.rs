use parking_lot::Mutex;

use super::{Connected, State, StateId};
use crate::{
    command::Command, context::StateContext, error::ClientError, observable::PropertyUpdate,
};

/// A non-reconnectable failure happened.
///
/// Holds the last error and the state it happened in. Nothing is retried
/// automatically; a [`Command::Connect`] redials and returns to
/// [`Connected`]. Further failures while here replace the stored error.
#[derive(Debug)]
pub struct ErrorState {
    error: Mutex<ClientError>,
    previous: StateId,
}

impl ErrorState {
    pub(crate) fn enter(error: ClientError, previous: &State, ctx: &StateContext) -> Self {
        let previous_id = previous.id();
        tracing::error!(state = %previous_id, %error, "entering error state");

        ctx.release_subscription(previous.active_subscription(), previous_id);
        ctx.observable().queue(PropertyUpdate::IpcError(Some(describe(previous_id, &error))));
        Self { error: Mutex::new(error), previous: previous_id }
    }

    /// Record another failure without leaving the state.
    pub(crate) fn set_error(&self, error: ClientError, ctx: &StateContext) {
        tracing::warn!(%error, "error while in error state");
        ctx.observable().queue(PropertyUpdate::IpcError(Some(describe(self.previous, &error))));
        *self.error.lock() = error;
    }

    /// Last recorded error.
    pub fn error(&self) -> ClientError {
        self.error.lock().clone()
    }

    /// State the client was in when the first error happened.
    pub fn previous(&self) -> StateId {
        self.previous
    }

    /// User-facing description of the last error.
    pub fn description(&self) -> String {
        describe(self.previous, &self.error.lock())
    }

    pub(crate) fn process_command(
        &self,
        command: &Command,
        ctx: &StateContext,
    ) -> Result<Option<State>, ClientError> {
        match command {
            Command::Connect => Ok(Some(State::Connected(Connected::from_error(self, ctx)?))),
            _ => Ok(None),
        }
    }
}

fn describe(state: StateId, error: &ClientError) -> String {
    if error.is_transport() {
        format!("IPC communication error in state {state}: {error}")
    } else {
        format!("Error occurred in state {state}: {error}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ambilink_proto::{Opcode, ProtocolError, StatusCode};

    use super::*;
    use crate::{
        state::{Disconnected, Subscribed},
        testing::{ScriptedTransport, connected_context},
        transport::TransportError,
    };

    #[test]
    fn entry_releases_subscription_and_reports() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        transport.reply(StatusCode::Success, &5u16.to_ne_bytes());
        let previous = State::Subscribed(Subscribed::from_connected("Cube", &ctx).unwrap());
        transport.reply(StatusCode::Success, &[]);

        let state = ErrorState::enter(
            ClientError::Protocol(ProtocolError::InvalidRequestData),
            &previous,
            &ctx,
        );
        assert_eq!(state.previous(), StateId::Subscribed);
        assert_eq!(ctx.subscription().active(), None);

        ctx.observable().apply_pending();
        assert_eq!(
            ctx.observable().snapshot().ipc_error.as_deref(),
            Some("Error occurred in state Subscribed: protocol error: invalid request data")
        );
    }

    #[test]
    fn transport_errors_are_described_as_ipc_errors() {
        let description = describe(
            StateId::Connected,
            &ClientError::Transport(TransportError::FrameTooLarge { size: 9, max: 4 }),
        );
        assert!(description.starts_with("IPC communication error in state Connected"));
    }

    #[test]
    fn set_error_replaces_the_stored_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        let state = ErrorState::enter(
            ClientError::Protocol(ProtocolError::InternalError),
            &State::Disconnected(Disconnected),
            &ctx,
        );

        state.set_error(ClientError::Protocol(ProtocolError::UnknownCommand), &ctx);
        assert_eq!(state.error(), ClientError::Protocol(ProtocolError::UnknownCommand));
        assert_eq!(state.previous(), StateId::Disconnected);
    }

    #[test]
    fn connect_redials_and_clears_the_error() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        let state = ErrorState::enter(
            ClientError::Protocol(ProtocolError::InternalError),
            &State::Disconnected(Disconnected),
            &ctx,
        );

        let next = state.process_command(&Command::Connect, &ctx).unwrap();
        let Some(State::Connected(connected)) = next else {
            panic!("expected Connected");
        };
        assert!(connected.restores_subscription());
        assert!(ctx.is_connected());

        ctx.observable().apply_pending();
        assert_eq!(ctx.observable().snapshot().ipc_error, None);
        assert!(!transport.sent_opcodes().contains(&Opcode::Ping.to_u8()));
    }
}
