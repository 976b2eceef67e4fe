//! In-process simulation of the companion application.
//!
//! [`SimCompanion`] implements the client's [`Transport`] trait on top of a
//! scene model: named objects with per-frame camera-space positions, the
//! animation parameters and the set of subscribed objects. Tests mutate the
//! scene (move, rename, delete objects) and the companion pushes the matching
//! notifications to every connected client.
//!
//! # Fault injection
//!
//! - [`SimCompanion::refuse_dials`]: the next dials fail as if nothing
//!   listened on the endpoint
//! - [`SimCompanion::fail_requests`]: the next requests fail at the channel
//!   level
//! - [`SimCompanion::inject_reply`]: the next request gets a canned reply
//! - [`SimCompanion::disconnect_all`]: every open channel starts failing with
//!   a shut connection, as when the companion restarts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod scene;

use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use ambilink_client::{
    ClientConfig, NotificationChannel, OfflineRenderingConfig, RequestChannel, Transport,
    TransportError,
};
use ambilink_proto::{AnimationInfo, CameraSpacePosition, ObjectId, Opcode};
use bytes::Bytes;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
pub use scene::SimObject;
use scene::Scene;

/// Simulated companion application. Clones share the same scene.
#[derive(Clone)]
pub struct SimCompanion {
    scene: Arc<Mutex<Scene>>,
}

impl SimCompanion {
    /// Empty scene with the given animation parameters.
    pub fn new(animation: AnimationInfo) -> Self {
        Self { scene: Arc::new(Mutex::new(Scene::new(animation))) }
    }

    /// Add an object and return its id.
    ///
    /// `frames` holds one position per animation frame; offline rendering
    /// reads past its end as the last position.
    pub fn add_object(&self, name: &str, frames: Vec<CameraSpacePosition>) -> ObjectId {
        self.scene.lock().add_object(name, frames)
    }

    /// Move an object live, notifying subscribers.
    pub fn move_object(&self, id: ObjectId, position: CameraSpacePosition) {
        self.scene.lock().move_object(id, position);
    }

    /// Rename an object, notifying subscribers.
    pub fn rename_object(&self, id: ObjectId, name: &str) {
        self.scene.lock().rename_object(id, name);
    }

    /// Delete an object, notifying subscribers.
    pub fn delete_object(&self, id: ObjectId) {
        self.scene.lock().delete_object(id);
    }

    /// Push raw bytes to every notification channel.
    pub fn publish_raw(&self, message: Bytes) {
        self.scene.lock().broadcast(&message);
    }

    /// Refuse the next `count` request-channel dials.
    pub fn refuse_dials(&self, count: usize) {
        self.scene.lock().refuse_dials += count;
    }

    /// Fail the next `count` requests with `error`.
    pub fn fail_requests(&self, count: usize, error: TransportError) {
        let mut scene = self.scene.lock();
        scene.failing_requests.extend(std::iter::repeat_n(error, count));
    }

    /// Answer the next well-formed request with `reply` instead of handling it.
    pub fn inject_reply(&self, reply: Bytes) {
        self.scene.lock().injected_replies.push_back(reply);
    }

    /// Break every open channel and forget all subscriptions.
    pub fn disconnect_all(&self) {
        self.scene.lock().disconnect_all();
    }

    /// Returns true if some client is subscribed to `id`.
    pub fn is_subscribed(&self, id: ObjectId) -> bool {
        self.scene.lock().subscriptions.contains(&id)
    }

    /// Returns true between prepare-to-render and render-finished.
    pub fn is_rendering(&self) -> bool {
        self.scene.lock().rendering
    }

    /// Opcodes of all handled requests, oldest first.
    pub fn request_log(&self) -> Vec<Opcode> {
        self.scene.lock().request_log.clone()
    }

    /// Number of handled requests with `opcode`.
    pub fn request_count(&self, opcode: Opcode) -> usize {
        self.scene.lock().request_log.iter().filter(|&&o| o == opcode).count()
    }

    /// Number of request-channel dials, refused ones included.
    pub fn dial_attempts(&self) -> usize {
        self.scene.lock().dial_attempts
    }
}

impl Transport for SimCompanion {
    fn dial_requests(&self) -> Result<Box<dyn RequestChannel>, TransportError> {
        let mut scene = self.scene.lock();
        scene.dial_attempts += 1;
        if scene.refuse_dials > 0 {
            scene.refuse_dials -= 1;
            return Err(TransportError::ConnectionRefused("simulated companion offline".into()));
        }
        Ok(Box::new(SimRequestChannel {
            scene: Arc::clone(&self.scene),
            generation: scene.generation,
        }))
    }

    fn dial_notifications(&self) -> Result<Box<dyn NotificationChannel>, TransportError> {
        let mut scene = self.scene.lock();
        let receiver = scene.add_subscriber();
        Ok(Box::new(SimNotificationChannel {
            scene: Arc::clone(&self.scene),
            generation: scene.generation,
            receiver,
        }))
    }
}

struct SimRequestChannel {
    scene: Arc<Mutex<Scene>>,
    generation: u64,
}

impl RequestChannel for SimRequestChannel {
    fn request(&mut self, message: &[u8]) -> Result<Bytes, TransportError> {
        let mut scene = self.scene.lock();
        if scene.generation != self.generation {
            return Err(TransportError::ConnectionShut);
        }
        scene.handle(message)
    }
}

struct SimNotificationChannel {
    scene: Arc<Mutex<Scene>>,
    generation: u64,
    receiver: Receiver<Bytes>,
}

impl NotificationChannel for SimNotificationChannel {
    fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        if self.scene.lock().generation != self.generation {
            return Err(TransportError::ConnectionShut);
        }
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::ConnectionShut),
        }
    }
}

/// Client configuration with millisecond-scale timings for tests.
pub fn fast_config() -> ClientConfig {
    ClientConfig {
        reconnect_delay: Duration::from_millis(2),
        idle_wait: Duration::from_millis(1),
        notification_poll_interval: Duration::from_millis(2),
        ping_interval: Duration::from_secs(3600),
        offline: OfflineRenderingConfig {
            first_fetch_delay: Duration::ZERO,
            busy_wait_step: Duration::from_millis(1),
            ..OfflineRenderingConfig::default()
        },
        ..ClientConfig::default()
    }
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
///
/// Returns the final value of the condition.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
}
