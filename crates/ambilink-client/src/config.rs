//! Client configuration.
//!
//! Every tunable has a documented default matching what the companion
//! application expects; [`ClientConfig::default`] is the production setup.

use std::{path::PathBuf, time::Duration};

use crate::types::DirectionWithDistance;

/// Default request/reply socket path.
pub const DEFAULT_REQUEST_ENDPOINT: &str = "/tmp/ambilink_reqrep";

/// Default push-notification socket path.
pub const DEFAULT_NOTIFICATION_ENDPOINT: &str = "/tmp/ambilink_pubsub";

/// Default timeout for writing a request (500ms).
pub const DEFAULT_REQUEST_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Default timeout for waiting on a reply (10 seconds).
///
/// Location-data requests make the companion evaluate the scene for a whole
/// slice of frames, which can take a while on heavy scenes.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default receive timeout of the subscription listener (100ms).
pub const DEFAULT_NOTIFICATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default pause between dial attempts while disconnected (250ms).
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Default keepalive interval (5 seconds).
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

/// Default wait between idle ticks when no command is queued (50ms).
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Default command queue capacity.
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 500;

/// Default property-update queue capacity.
pub const DEFAULT_PROPERTY_QUEUE_CAPACITY: usize = 100;

/// Default number of frames fetched per slice.
pub const DEFAULT_MAX_FRAMES_PER_SLICE: u64 = 250;

/// Default memory budget of the offline slice cache, in bytes.
pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 36_000;

/// Default delay before the first slice fetch (300ms).
///
/// Gives sibling plugin instances time to enter offline rendering as well, so
/// they do not all hit the companion with fetches at once.
pub const DEFAULT_FIRST_FETCH_DELAY: Duration = Duration::from_millis(300);

/// Default sleep between checks while the audio thread waits for a slice.
pub const DEFAULT_BUSY_WAIT_STEP: Duration = Duration::from_millis(100);

/// IPC client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Request/reply socket path
    pub request_endpoint: PathBuf,
    /// Push-notification socket path
    pub notification_endpoint: PathBuf,
    /// Timeout for writing a request
    pub request_send_timeout: Duration,
    /// Timeout for waiting on a reply
    pub reply_timeout: Duration,
    /// Receive timeout of the subscription listener
    pub notification_poll_interval: Duration,
    /// Pause between dial attempts while disconnected
    pub reconnect_delay: Duration,
    /// Keepalive interval
    pub ping_interval: Duration,
    /// Wait between idle ticks when no command is queued
    pub idle_wait: Duration,
    /// Command queue capacity
    pub command_queue_capacity: usize,
    /// Property-update queue capacity
    pub property_queue_capacity: usize,
    /// Mirror the live direction into the observable store at most this often
    pub direction_publish_interval: Option<Duration>,
    /// Offline rendering pipeline settings
    pub offline: OfflineRenderingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_endpoint: PathBuf::from(DEFAULT_REQUEST_ENDPOINT),
            notification_endpoint: PathBuf::from(DEFAULT_NOTIFICATION_ENDPOINT),
            request_send_timeout: DEFAULT_REQUEST_SEND_TIMEOUT,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            notification_poll_interval: DEFAULT_NOTIFICATION_POLL_INTERVAL,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            ping_interval: DEFAULT_PING_INTERVAL,
            idle_wait: DEFAULT_IDLE_WAIT,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            property_queue_capacity: DEFAULT_PROPERTY_QUEUE_CAPACITY,
            direction_publish_interval: None,
            offline: OfflineRenderingConfig::default(),
        }
    }
}

/// Offline rendering pipeline settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfflineRenderingConfig {
    /// Frames fetched per slice
    pub max_frames_per_slice: u64,
    /// Upper bound on resident slice memory
    pub memory_budget_bytes: usize,
    /// Delay before the first fetch
    pub first_fetch_delay: Duration,
    /// Sleep between checks while the audio thread waits for a slice
    pub busy_wait_step: Duration,
}

impl Default for OfflineRenderingConfig {
    fn default() -> Self {
        Self {
            max_frames_per_slice: DEFAULT_MAX_FRAMES_PER_SLICE,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            first_fetch_delay: DEFAULT_FIRST_FETCH_DELAY,
            busy_wait_step: DEFAULT_BUSY_WAIT_STEP,
        }
    }
}

impl OfflineRenderingConfig {
    /// Number of slices the memory budget allows to be resident (at least 1).
    pub fn max_cached_slices(&self) -> usize {
        let slice_bytes =
            (self.max_frames_per_slice.max(1) as usize) * size_of::<DirectionWithDistance>();
        (self.memory_budget_bytes / slice_bytes).max(1)
    }
}
