use std::sync::atomic::{AtomicBool, Ordering};

use ambilink_proto::{
    CameraSpacePosition, NotificationKind, ObjectId, Opcode, Reader, StatusCode, payloads,
};
use parking_lot::Mutex;

use super::{Connected, ObjectDeleted, OfflineRendering, State};
use crate::{
    command::Command,
    context::StateContext,
    error::ClientError,
    observable::PropertyUpdate,
    types::ObjectInfo,
};

#[derive(Debug)]
struct Subscription {
    object: ObjectInfo,
    /// `None` while the named object does not exist remotely
    active: Option<ObjectId>,
}

/// Tracking one object live.
///
/// Position notifications go straight into the live-sample atomics. Deletion
/// is only flagged from the subscription thread; the request thread picks the
/// flag up on its next idle poll and moves to [`ObjectDeleted`].
#[derive(Debug)]
pub struct Subscribed {
    subscription: Mutex<Subscription>,
    deletion_pending: AtomicBool,
}

impl Subscribed {
    /// Subscribe to the object called `name`.
    pub(crate) fn from_connected(name: &str, ctx: &StateContext) -> Result<Self, ClientError> {
        Self::handshake(name, ctx).map(Self::with)
    }

    /// Subscribe again after the previous object was deleted.
    pub(crate) fn from_object_deleted(
        previous: &ObjectDeleted,
        name: &str,
        ctx: &StateContext,
    ) -> Result<Self, ClientError> {
        tracing::debug!(previous = %previous.object().name, name, "subscribing after deletion");
        ctx.subscription().stop();
        Self::handshake(name, ctx).map(Self::with)
    }

    /// Return to live tracking after an offline render.
    pub(crate) fn from_offline(
        previous: &OfflineRendering,
        ctx: &StateContext,
    ) -> Result<Self, ClientError> {
        ctx.send(Opcode::InformRenderFinished)?;

        let object_id = previous.object_id();
        ctx.subscription().start(object_id);
        tracing::info!(object_id, "offline rendering finished");
        Ok(Self::with((
            Subscription { object: previous.object(), active: Some(object_id) },
            false,
        )))
    }

    fn with((subscription, deletion_pending): (Subscription, bool)) -> Self {
        Self {
            subscription: Mutex::new(subscription),
            deletion_pending: AtomicBool::new(deletion_pending),
        }
    }

    /// Send the subscribe request and start listening on success.
    ///
    /// An unknown name is not an error: it yields a subscription without an
    /// active id and with deletion already pending, so the next idle poll
    /// reports the object as deleted.
    fn handshake(name: &str, ctx: &StateContext) -> Result<(Subscription, bool), ClientError> {
        let request = payloads::subscribe_request(name)?;
        let mut reply = ctx.call(&request, false)?;
        ctx.observable().queue(PropertyUpdate::ObjectName(Some(name.to_owned())));

        if reply.status == StatusCode::ObjectNotFound {
            tracing::info!(name, "object not found");
            let subscription = Subscription { object: ObjectInfo::new(0, name), active: None };
            return Ok((subscription, true));
        }

        let object_id = reply.payload.read::<ObjectId>()?;
        ctx.observable().queue(PropertyUpdate::ObjectDeleted(false));
        ctx.subscription().start(object_id);
        tracing::info!(name, object_id, "subscribed");
        Ok((Subscription { object: ObjectInfo::new(object_id, name), active: Some(object_id) }, false))
    }

    /// The tracked object.
    pub fn object(&self) -> ObjectInfo {
        self.subscription.lock().object.clone()
    }

    /// Id the companion pushes notifications for, if the object exists.
    pub fn active_subscription(&self) -> Option<ObjectId> {
        self.subscription.lock().active
    }

    /// Returns true once the object was reported deleted.
    pub fn is_deletion_pending(&self) -> bool {
        self.deletion_pending.load(Ordering::Acquire)
    }

    pub(crate) fn process_command(
        &self,
        command: &Command,
        ctx: &StateContext,
    ) -> Result<Option<State>, ClientError> {
        match command {
            Command::Unsubscribe => Ok(Some(State::Connected(Connected::from_subscribed(self, ctx)?))),
            Command::SubscribeToObject(name) => self.resubscribe(name, ctx).map(|()| None),
            Command::EnableRenderingMode => self.enable_rendering(ctx),
            Command::UpdateObjectList => ctx.update_object_list().map(|()| None),
            _ => Ok(None),
        }
    }

    /// Replace the subscription in place without leaving the state.
    fn resubscribe(&self, name: &str, ctx: &StateContext) -> Result<(), ClientError> {
        ctx.subscription().stop();
        let previous = self.subscription.lock().active.take();
        if let Some(object_id) = previous {
            ctx.unsubscribe(object_id)?;
        }

        let (subscription, deletion_pending) = Self::handshake(name, ctx)?;
        *self.subscription.lock() = subscription;
        self.deletion_pending.store(deletion_pending, Ordering::Release);
        Ok(())
    }

    fn enable_rendering(&self, ctx: &StateContext) -> Result<Option<State>, ClientError> {
        let active = self.active_subscription();
        match active {
            Some(object_id) if !self.is_deletion_pending() => Ok(Some(State::OfflineRendering(
                OfflineRendering::from_subscribed(self, object_id, ctx)?,
            ))),
            _ => {
                tracing::debug!("no live object, rendering mode not enabled");
                Ok(None)
            },
        }
    }

    pub(crate) fn idle_poll(&self, ctx: &StateContext) -> Result<Option<State>, ClientError> {
        if self.is_deletion_pending() {
            return Ok(Some(State::ObjectDeleted(ObjectDeleted::from_subscribed(self, ctx))));
        }
        Ok(None)
    }

    pub(crate) fn on_push_notification(
        &self,
        kind: NotificationKind,
        reader: &mut Reader,
        ctx: &StateContext,
    ) -> Result<(), ClientError> {
        match kind {
            NotificationKind::PositionUpdated => {
                let position = reader.read::<CameraSpacePosition>()?;
                ctx.publish_sample(position.into());
            },
            NotificationKind::Renamed => {
                let name = payloads::decode_object_name(reader)?;
                tracing::info!(name, "object renamed");
                self.subscription.lock().object.name.clone_from(&name);
                ctx.observable().queue(PropertyUpdate::ObjectName(Some(name)));
            },
            NotificationKind::Deleted => {
                tracing::info!("object deleted");
                self.deletion_pending.store(true, Ordering::Release);
            },
        }
        Ok(())
    }

    pub(crate) fn on_shutdown(&self, ctx: &StateContext) -> Result<(), ClientError> {
        ctx.subscription().stop();
        match self.active_subscription() {
            Some(object_id) => ctx.unsubscribe(object_id),
            None => Ok(()),
        }
    }
}
