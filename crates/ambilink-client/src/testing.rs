//! Scripted transport for state-level unit tests.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use ambilink_proto::{StatusCode, encode_reply};
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    config::ClientConfig,
    context::StateContext,
    observable::ObservableState,
    transport::{NotificationChannel, RequestChannel, Transport, TransportError},
};

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<Bytes, TransportError>>,
    sent: Vec<Bytes>,
    dial_failures: VecDeque<TransportError>,
}

/// Transport answering requests from a queue of canned replies.
///
/// A request with no queued reply fails with `TimedOut`.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(&self, status: StatusCode, payload: &[u8]) {
        let reply = encode_reply(status, payload).unwrap();
        self.script.lock().replies.push_back(Ok(reply));
    }

    pub(crate) fn reply_raw(&self, reply: Bytes) {
        self.script.lock().replies.push_back(Ok(reply));
    }

    pub(crate) fn fail(&self, error: TransportError) {
        self.script.lock().replies.push_back(Err(error));
    }

    pub(crate) fn fail_dial(&self, error: TransportError) {
        self.script.lock().dial_failures.push_back(error);
    }

    pub(crate) fn sent(&self) -> Vec<Bytes> {
        self.script.lock().sent.clone()
    }

    pub(crate) fn sent_opcodes(&self) -> Vec<u8> {
        self.sent().iter().filter_map(|m| m.first().copied()).collect()
    }

    pub(crate) fn clear_sent(&self) {
        self.script.lock().sent.clear();
    }
}

impl Transport for ScriptedTransport {
    fn dial_requests(&self) -> Result<Box<dyn RequestChannel>, TransportError> {
        if let Some(error) = self.script.lock().dial_failures.pop_front() {
            return Err(error);
        }
        Ok(Box::new(self.clone()))
    }

    fn dial_notifications(&self) -> Result<Box<dyn NotificationChannel>, TransportError> {
        Ok(Box::new(SilentNotifications))
    }
}

impl RequestChannel for ScriptedTransport {
    fn request(&mut self, message: &[u8]) -> Result<Bytes, TransportError> {
        let mut script = self.script.lock();
        script.sent.push(Bytes::copy_from_slice(message));
        script.replies.pop_front().unwrap_or(Err(TransportError::TimedOut))
    }
}

struct SilentNotifications;

impl NotificationChannel for SilentNotifications {
    fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        std::thread::sleep(timeout.min(Duration::from_millis(5)));
        Ok(None)
    }
}

/// Context with both channels dialed against `transport`.
pub(crate) fn connected_context(transport: &Arc<ScriptedTransport>) -> StateContext {
    connected_context_with(transport, ClientConfig::default())
}

/// Like [`connected_context`] with a custom configuration.
pub(crate) fn connected_context_with(
    transport: &Arc<ScriptedTransport>,
    config: ClientConfig,
) -> StateContext {
    let ctx = StateContext::new(
        config,
        Arc::clone(transport) as Arc<dyn Transport>,
        Arc::new(ObservableState::new(64)),
    );
    ctx.dial().unwrap();
    ctx
}
