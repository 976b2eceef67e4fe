//! Shared context handed to every state method.
//!
//! States hold only their own data. Everything that outlives a single state
//! (the channels, the live-sample atomics, the observable store and the
//! subscription switch) lives here and is passed in by reference.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use ambilink_proto::{
    ObjectId, Opcode, ProtocolError, Reader, StatusCode, check_reply_status, encode_request,
    payloads,
};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    config::ClientConfig,
    error::ClientError,
    observable::{ObservableState, PropertyUpdate},
    state::StateId,
    transport::{NotificationChannel, RequestChannel, Transport, TransportError},
    types::{DirectionWithDistance, Telemetry},
};

/// Decoded reply with its status already checked.
#[derive(Debug)]
pub(crate) struct Reply {
    /// `Success`, or `ObjectNotFound` for lenient calls
    pub(crate) status: StatusCode,
    /// Bytes after the status
    pub(crate) payload: Reader,
}

/// Which object the subscription listener should deliver notifications for.
///
/// Starting and stopping only flips this switch; the listener thread itself
/// runs for the whole client lifetime.
#[derive(Debug)]
pub struct SubscriptionControl {
    active: AtomicU32,
}

impl SubscriptionControl {
    const NONE: u32 = u32::MAX;

    fn new() -> Self {
        Self { active: AtomicU32::new(Self::NONE) }
    }

    /// Deliver notifications for `object_id`.
    pub fn start(&self, object_id: ObjectId) {
        tracing::debug!(object_id, "subscription listener started");
        self.active.store(u32::from(object_id), Ordering::Release);
    }

    /// Stop delivering notifications.
    pub fn stop(&self) {
        if self.active.swap(Self::NONE, Ordering::AcqRel) != Self::NONE {
            tracing::debug!("subscription listener stopped");
        }
    }

    /// Object currently listened to.
    pub fn active(&self) -> Option<ObjectId> {
        ObjectId::try_from(self.active.load(Ordering::Acquire)).ok()
    }
}

/// Channels, atomics and stores shared by all states.
pub struct StateContext {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    requests: Mutex<Option<Box<dyn RequestChannel>>>,
    notifications: Mutex<Option<Box<dyn NotificationChannel>>>,
    telemetry: Telemetry,
    observable: Arc<ObservableState>,
    subscription: SubscriptionControl,
    channel_epoch: AtomicU64,
    last_ping: Mutex<Instant>,
    last_direction_publish: Mutex<Option<Instant>>,
}

impl StateContext {
    /// Create a context with both channels closed.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        observable: Arc<ObservableState>,
    ) -> Self {
        Self {
            config,
            transport,
            requests: Mutex::new(None),
            notifications: Mutex::new(None),
            telemetry: Telemetry::default(),
            observable,
            subscription: SubscriptionControl::new(),
            channel_epoch: AtomicU64::new(0),
            last_ping: Mutex::new(Instant::now()),
            last_direction_publish: Mutex::new(None),
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Observable store.
    pub fn observable(&self) -> &ObservableState {
        &self.observable
    }

    /// Shared handle to the observable store.
    pub fn observable_handle(&self) -> Arc<ObservableState> {
        Arc::clone(&self.observable)
    }

    /// Live-sample atomics.
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Subscription listener switch.
    pub fn subscription(&self) -> &SubscriptionControl {
        &self.subscription
    }

    /// Returns true while the request channel is open.
    pub fn is_connected(&self) -> bool {
        self.requests.lock().is_some()
    }

    /// Counter bumped whenever the channels are replaced or closed.
    ///
    /// Lets the subscription thread tag its errors with the channels they
    /// came from, so failures of a connection that is already gone are
    /// dropped instead of tearing down its successor.
    pub fn channel_epoch(&self) -> u64 {
        self.channel_epoch.load(Ordering::Acquire)
    }

    /// Open both channels, replacing any previous ones.
    pub(crate) fn dial(&self) -> Result<(), ClientError> {
        let requests = self.transport.dial_requests()?;
        let notifications = self.transport.dial_notifications()?;
        *self.requests.lock() = Some(requests);
        *self.notifications.lock() = Some(notifications);
        self.channel_epoch.fetch_add(1, Ordering::AcqRel);
        *self.last_ping.lock() = Instant::now();
        tracing::info!("connected to companion application");
        Ok(())
    }

    /// Close both channels.
    pub(crate) fn close_channels(&self) {
        let had_requests = self.requests.lock().take().is_some();
        self.notifications.lock().take();
        self.channel_epoch.fetch_add(1, Ordering::AcqRel);
        if had_requests {
            tracing::debug!("channels closed");
        }
    }

    /// Send a request and check the reply status.
    ///
    /// With `strict == false` an object-not-found reply is returned as a
    /// [`Reply`] instead of an error.
    pub(crate) fn call(&self, request: &[u8], strict: bool) -> Result<Reply, ClientError> {
        let reply = {
            let mut requests = self.requests.lock();
            let channel = requests.as_mut().ok_or(TransportError::NotConnected)?;
            channel.request(request)?
        };

        let mut payload = Reader::new(reply);
        let code = payload.read::<u8>()?;
        check_reply_status(code, strict)?;
        let status = StatusCode::from_u8(code).ok_or(ProtocolError::UnknownStatus(code))?;
        Ok(Reply { status, payload })
    }

    /// Send a payload-less request that must succeed.
    pub(crate) fn send(&self, opcode: Opcode) -> Result<(), ClientError> {
        self.call(&encode_request(opcode, &[])?, true).map(|_| ())
    }

    /// Wait for the next push notification.
    pub(crate) fn recv_notification(
        &self,
        timeout: Duration,
    ) -> Result<Option<Bytes>, ClientError> {
        let mut notifications = self.notifications.lock();
        let Some(channel) = notifications.as_mut() else {
            drop(notifications);
            thread::sleep(timeout);
            return Ok(None);
        };
        Ok(channel.recv(timeout)?)
    }

    /// Drop the remote subscription for `object_id`.
    pub(crate) fn unsubscribe(&self, object_id: ObjectId) -> Result<(), ClientError> {
        tracing::debug!(object_id, "unsubscribing");
        self.call(&payloads::unsubscribe_request(object_id)?, true).map(|_| ())
    }

    /// Stop listening and try to unsubscribe, logging instead of failing.
    ///
    /// Used when leaving a path that is already broken (deleted object, error
    /// state), where a failed cleanup must not mask the original cause.
    pub(crate) fn release_subscription(&self, active: Option<ObjectId>, leaving: StateId) {
        self.subscription.stop();
        let Some(object_id) = active else {
            return;
        };
        if let Err(error) = self.unsubscribe(object_id) {
            tracing::warn!(state = %leaving, object_id, %error, "best-effort unsubscribe failed");
        }
    }

    /// Fetch the trackable objects and announce them.
    pub(crate) fn update_object_list(&self) -> Result<(), ClientError> {
        let mut reply = self.call(&encode_request(Opcode::ObjectList, &[])?, true)?;
        let names = payloads::decode_object_list(&mut reply.payload)?;
        tracing::debug!(count = names.len(), "object list updated");
        self.observable.queue(PropertyUpdate::ObjectList(names));
        Ok(())
    }

    /// Send a keepalive if the ping interval has elapsed.
    pub(crate) fn ping_if_due(&self) -> Result<(), ClientError> {
        {
            let mut last_ping = self.last_ping.lock();
            if last_ping.elapsed() < self.config.ping_interval {
                return Ok(());
            }
            *last_ping = Instant::now();
        }
        tracing::trace!("ping");
        self.send(Opcode::Ping)
    }

    /// Store a live sample for the audio thread and mirror it if configured.
    pub(crate) fn publish_sample(&self, sample: DirectionWithDistance) {
        self.telemetry.store(sample);

        let Some(interval) = self.config.direction_publish_interval else {
            return;
        };
        let mut last = self.last_direction_publish.lock();
        if last.is_some_and(|at| at.elapsed() < interval) {
            return;
        }
        *last = Some(Instant::now());
        self.observable.queue(PropertyUpdate::CurrentDirection(sample));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[test]
    fn subscription_switch() {
        let control = SubscriptionControl::new();
        assert_eq!(control.active(), None);

        control.start(7);
        assert_eq!(control.active(), Some(7));
        control.start(ObjectId::MAX);
        assert_eq!(control.active(), Some(ObjectId::MAX));

        control.stop();
        assert_eq!(control.active(), None);
    }

    #[test]
    fn channel_epoch_advances_on_dial_and_close() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context(&transport);
        let dialed = ctx.channel_epoch();

        ctx.close_channels();
        assert!(ctx.channel_epoch() > dialed);
        assert!(!ctx.is_connected());
    }

    #[test]
    fn call_before_dial_is_not_connected() {
        let ctx = StateContext::new(
            ClientConfig::default(),
            Arc::new(ScriptedTransport::new()),
            Arc::new(ObservableState::new(8)),
        );
        let result = ctx.send(Opcode::Ping);
        assert_eq!(result, Err(ClientError::Transport(TransportError::NotConnected)));
        assert!(result.is_err_and(|e| e.is_reconnectable()));
    }

    #[test]
    fn lenient_call_returns_object_not_found() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context(&transport);
        transport.reply(StatusCode::ObjectNotFound, &[]);

        let reply = ctx.call(&[Opcode::Subscribe.to_u8()], false).unwrap();
        assert_eq!(reply.status, StatusCode::ObjectNotFound);
    }

    #[test]
    fn strict_call_raises_remote_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context(&transport);
        transport.reply(StatusCode::InternalError, &[]);

        assert_eq!(
            ctx.send(Opcode::PrepareToRender),
            Err(ClientError::Protocol(ProtocolError::InternalError))
        );
    }

    #[test]
    fn empty_reply_is_out_of_range() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context(&transport);
        transport.reply_raw(Bytes::new());

        assert!(matches!(
            ctx.send(Opcode::Ping),
            Err(ClientError::Protocol(ProtocolError::Codec(_)))
        ));
    }

    #[test]
    fn ping_is_rate_limited() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context_with(
            &transport,
            ClientConfig { ping_interval: Duration::from_secs(3600), ..Default::default() },
        );

        ctx.ping_if_due().unwrap();
        assert!(transport.sent_opcodes().is_empty());
    }

    #[test]
    fn best_effort_unsubscribe_swallows_failures() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context(&transport);
        ctx.subscription().start(3);
        transport.fail(TransportError::TimedOut);

        ctx.release_subscription(Some(3), StateId::Subscribed);
        assert_eq!(ctx.subscription().active(), None);
        assert_eq!(transport.sent_opcodes(), vec![Opcode::Unsubscribe.to_u8()]);
    }

    #[test]
    fn object_list_is_announced() {
        let transport = Arc::new(ScriptedTransport::new());
        let ctx = crate::testing::connected_context(&transport);
        transport.reply(StatusCode::Success, &[4, b'C', b'u', b'b', b'e', 3, b'C', b'a', b'm']);

        ctx.update_object_list().unwrap();
        ctx.observable().apply_pending();
        assert_eq!(ctx.observable().snapshot().object_list, vec!["Cube", "Cam"]);
    }
}
