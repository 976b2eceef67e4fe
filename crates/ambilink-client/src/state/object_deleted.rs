use ambilink_proto::Opcode;

use super::{Connected, OfflineRendering, State, StateId, Subscribed};
use crate::{
    command::Command, context::StateContext, error::ClientError, observable::PropertyUpdate,
    types::ObjectInfo,
};

/// The tracked object was deleted in the companion.
///
/// Entry is best-effort: the listener is stopped and the remote subscription
/// dropped, but cleanup failures are only logged. The user either subscribes
/// to another object (or the same name, once it exists again) or
/// unsubscribes.
#[derive(Debug)]
pub struct ObjectDeleted {
    object: ObjectInfo,
}

impl ObjectDeleted {
    pub(crate) fn from_subscribed(previous: &Subscribed, ctx: &StateContext) -> Self {
        let object = previous.object();
        tracing::info!(object = %object.name, "tracked object deleted");
        ctx.observable().queue(PropertyUpdate::ObjectDeleted(true));
        ctx.release_subscription(previous.active_subscription(), StateId::Subscribed);
        Self { object }
    }

    pub(crate) fn from_offline(previous: &OfflineRendering, ctx: &StateContext) -> Self {
        let object = previous.object();
        tracing::info!(object = %object.name, "tracked object deleted during offline render");
        ctx.observable().queue(PropertyUpdate::ObjectDeleted(true));
        if let Err(error) = ctx.send(Opcode::InformRenderFinished) {
            tracing::warn!(%error, "failed to report render finished");
        }
        ctx.release_subscription(Some(previous.object_id()), StateId::OfflineRendering);
        Self { object }
    }

    /// The object that was deleted.
    pub fn object(&self) -> &ObjectInfo {
        &self.object
    }

    pub(crate) fn process_command(
        &self,
        command: &Command,
        ctx: &StateContext,
    ) -> Result<Option<State>, ClientError> {
        match command {
            Command::SubscribeToObject(name) => {
                Ok(Some(State::Subscribed(Subscribed::from_object_deleted(self, name, ctx)?)))
            },
            Command::Unsubscribe => {
                Ok(Some(State::Connected(Connected::from_object_deleted(self, ctx)?)))
            },
            Command::UpdateObjectList => ctx.update_object_list().map(|()| None),
            _ => Ok(None),
        }
    }
}
