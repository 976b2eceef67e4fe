use super::{ErrorState, ObjectDeleted, State, Subscribed};
use crate::{
    command::Command, context::StateContext, error::ClientError, observable::PropertyUpdate,
};

/// Channels open, no object tracked.
///
/// When entered by (re)connecting, the first idle poll restores the
/// subscription to the object named in the observable store, so a reloaded
/// project or a restarted companion resumes tracking without user action.
#[derive(Debug)]
pub struct Connected {
    restore_subscription: bool,
}

impl Connected {
    /// Dial both channels.
    pub(crate) fn from_disconnected(ctx: &StateContext) -> Result<Self, ClientError> {
        ctx.dial()?;
        Ok(Self { restore_subscription: true })
    }

    /// Leave a subscription at the user's request.
    pub(crate) fn from_subscribed(
        previous: &Subscribed,
        ctx: &StateContext,
    ) -> Result<Self, ClientError> {
        ctx.subscription().stop();
        if let Some(object_id) = previous.active_subscription() {
            ctx.unsubscribe(object_id)?;
        }
        Self::announce_unsubscribed(ctx);
        Ok(Self { restore_subscription: false })
    }

    /// Give up on a deleted object.
    pub(crate) fn from_object_deleted(
        previous: &ObjectDeleted,
        ctx: &StateContext,
    ) -> Result<Self, ClientError> {
        ctx.subscription().stop();
        tracing::debug!(object = %previous.object().name, "dropping deleted object");
        Self::announce_unsubscribed(ctx);
        Ok(Self { restore_subscription: false })
    }

    /// Recover from the error state by redialing both channels.
    pub(crate) fn from_error(previous: &ErrorState, ctx: &StateContext) -> Result<Self, ClientError> {
        tracing::info!(after = %previous.previous(), "reconnecting after error");
        ctx.close_channels();
        ctx.dial()?;
        ctx.observable().queue(PropertyUpdate::IpcError(None));
        Ok(Self { restore_subscription: true })
    }

    /// Returns true if the next idle poll resubscribes to the stored name.
    pub fn restores_subscription(&self) -> bool {
        self.restore_subscription
    }

    pub(crate) fn process_command(
        &self,
        command: &Command,
        ctx: &StateContext,
    ) -> Result<Option<State>, ClientError> {
        match command {
            Command::SubscribeToObject(name) => {
                Ok(Some(State::Subscribed(Subscribed::from_connected(name, ctx)?)))
            },
            Command::UpdateObjectList => ctx.update_object_list().map(|()| None),
            _ => Ok(None),
        }
    }

    pub(crate) fn idle_poll(&self, ctx: &StateContext) -> Result<Option<State>, ClientError> {
        if !self.restore_subscription {
            return Ok(None);
        }
        let Some(name) = ctx.observable().object_name() else {
            return Ok(None);
        };

        tracing::info!(object = %name, "restoring subscription");
        Ok(Some(State::Subscribed(Subscribed::from_connected(&name, ctx)?)))
    }

    fn announce_unsubscribed(ctx: &StateContext) {
        let observable = ctx.observable();
        observable.queue(PropertyUpdate::ObjectName(None));
        observable.queue(PropertyUpdate::ObjectDeleted(false));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ambilink_proto::{Opcode, StatusCode};

    use super::*;
    use crate::testing::{ScriptedTransport, connected_context};

    #[test]
    fn subscribe_command_enters_subscribed() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        let connected = Connected::from_disconnected(&ctx).unwrap();
        transport.reply(StatusCode::Success, &9u16.to_ne_bytes());

        let next = connected
            .process_command(&Command::SubscribeToObject("Cube".into()), &ctx)
            .unwrap();
        let Some(State::Subscribed(subscribed)) = next else {
            panic!("expected Subscribed");
        };
        assert_eq!(subscribed.active_subscription(), Some(9));
        assert_eq!(ctx.subscription().active(), Some(9));
    }

    #[test]
    fn restores_stored_object_name() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        ctx.observable().set_object_name(Some("Cube".into()));
        let connected = Connected::from_disconnected(&ctx).unwrap();
        transport.reply(StatusCode::Success, &1u16.to_ne_bytes());

        let next = connected.idle_poll(&ctx).unwrap();
        assert!(matches!(next, Some(State::Subscribed(_))));
        assert_eq!(transport.sent_opcodes(), vec![Opcode::Subscribe.to_u8()]);
    }

    #[test]
    fn no_restore_without_a_stored_name() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        let connected = Connected::from_disconnected(&ctx).unwrap();

        assert!(connected.idle_poll(&ctx).unwrap().is_none());
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn unsubscribe_clears_observable_name() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = connected_context(&transport);
        transport.reply(StatusCode::Success, &4u16.to_ne_bytes());
        let subscribed = Subscribed::from_connected("Cube", &ctx).unwrap();
        transport.reply(StatusCode::Success, &[]);

        let connected = Connected::from_subscribed(&subscribed, &ctx).unwrap();
        assert!(!connected.restores_subscription());
        assert_eq!(ctx.subscription().active(), None);

        ctx.observable().apply_pending();
        let snapshot = ctx.observable().snapshot();
        assert_eq!(snapshot.object_name, None);
        assert!(!snapshot.object_deleted);
        assert_eq!(
            transport.sent_opcodes(),
            vec![Opcode::Subscribe.to_u8(), Opcode::Unsubscribe.to_u8()]
        );
    }
}
