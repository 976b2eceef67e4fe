//! Per-block adapter between the audio processor and the client.
//!
//! The audio processor calls [`AudioBridge::process_block`] once per block
//! with the host's playhead and whether the host currently renders in real
//! time. The bridge switches the client in and out of offline rendering to
//! follow the host and forwards the resulting sample to the [`Encoder`].

use std::{
    thread,
    time::{Duration, Instant},
};

use crate::{
    client::IpcClient,
    command::Command,
    state::{OfflineRendering, StateId},
    types::{Direction, DirectionWithDistance, Distance},
};

/// Longest an offline block waits for the client to enter offline rendering.
pub const DEFAULT_RENDER_MODE_SWITCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Polling step while waiting for the switch.
pub const DEFAULT_SWITCH_POLL_STEP: Duration = Duration::from_millis(10);

/// Downstream consumer of direction and distance.
pub trait Encoder {
    /// Set the source direction for the next block.
    fn set_direction(&mut self, direction: Direction);

    /// Set the source distance for the next block.
    fn set_distance(&mut self, distance: Distance);
}

/// Bridge settings.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Bound on the wait for offline rendering after requesting it
    pub render_mode_switch_timeout: Duration,
    /// Sleep between state checks during that wait
    pub switch_poll_step: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            render_mode_switch_timeout: DEFAULT_RENDER_MODE_SWITCH_TIMEOUT,
            switch_poll_step: DEFAULT_SWITCH_POLL_STEP,
        }
    }
}

/// Audio-side adapter. One per audio processor.
#[derive(Debug, Default)]
pub struct AudioBridge {
    config: BridgeConfig,
    rendering_requested: bool,
}

impl AudioBridge {
    /// Create a bridge.
    pub fn new(config: BridgeConfig) -> Self {
        Self { config, rendering_requested: false }
    }

    /// Returns true while offline rendering has been requested for the
    /// current offline run of the host.
    pub fn rendering_requested(&self) -> bool {
        self.rendering_requested
    }

    /// Produce the sample for one block and hand it to `encoder`.
    ///
    /// Each mode switch is requested once and waited for at most the switch
    /// timeout: entering offline rendering on the first offline block of a
    /// run, leaving it on the first realtime block after one. Other realtime
    /// blocks never block. Offline lookups also wait until their slice is
    /// fetched.
    pub fn process_block(
        &mut self,
        client: &IpcClient,
        playhead_seconds: f64,
        realtime: bool,
        encoder: &mut dyn Encoder,
    ) -> DirectionWithDistance {
        let sample = if realtime {
            self.realtime_sample(client)
        } else {
            self.offline_sample(client, playhead_seconds)
        };
        encoder.set_direction(sample.direction);
        encoder.set_distance(sample.distance);
        sample
    }

    fn realtime_sample(&mut self, client: &IpcClient) -> DirectionWithDistance {
        let requested = std::mem::take(&mut self.rendering_requested);
        if requested || client.is_in_state(StateId::OfflineRendering) {
            tracing::debug!("host back in real time, leaving offline rendering");
            if client.send_command(Command::DisableRenderingMode) {
                self.wait_for(client, "leave offline rendering", |id| {
                    id != StateId::OfflineRendering
                });
            }
        }
        client.current_sample()
    }

    fn offline_sample(&mut self, client: &IpcClient, playhead_seconds: f64) -> DirectionWithDistance {
        if !self.rendering_requested && client.is_in_state(StateId::Subscribed) {
            self.rendering_requested = true;
            if client.send_command(Command::EnableRenderingMode) {
                self.wait_for(client, "enter offline rendering", |id| {
                    id == StateId::OfflineRendering
                });
            }
        }

        match client.scoped::<OfflineRendering>() {
            Some(offline) => offline.direction_and_distance_at(playhead_seconds),
            None => client.current_sample(),
        }
    }

    /// Poll the client state until `reached` holds or the switch timeout
    /// passes.
    fn wait_for(&self, client: &IpcClient, switch: &str, reached: impl Fn(StateId) -> bool) {
        let deadline = Instant::now() + self.config.render_mode_switch_timeout;
        while !reached(client.state_id()) {
            if Instant::now() >= deadline {
                tracing::warn!(state = %client.state_id(), switch, "rendering mode switch timed out");
                return;
            }
            thread::sleep(self.config.switch_poll_step);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::ClientConfig, observable::ObservableState, testing::ScriptedTransport,
        transport::Transport,
    };

    #[derive(Default)]
    struct RecordingEncoder {
        directions: Vec<Direction>,
        distances: Vec<Distance>,
    }

    impl Encoder for RecordingEncoder {
        fn set_direction(&mut self, direction: Direction) {
            self.directions.push(direction);
        }

        fn set_distance(&mut self, distance: Distance) {
            self.distances.push(distance);
        }
    }

    fn connected_client() -> IpcClient {
        let transport = Arc::new(ScriptedTransport::new()) as Arc<dyn Transport>;
        let config = ClientConfig {
            idle_wait: Duration::from_millis(1),
            ping_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let client =
            IpcClient::spawn(config, transport, Arc::new(ObservableState::new(16))).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !client.is_in_state(StateId::Connected) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        client
    }

    #[test]
    fn realtime_block_forwards_live_sample() {
        let client = connected_client();
        let mut bridge = AudioBridge::default();
        let mut encoder = RecordingEncoder::default();

        let sample = bridge.process_block(&client, 1.0, true, &mut encoder);
        assert_eq!(sample, DirectionWithDistance::default());
        assert_eq!(encoder.directions, vec![Direction::default()]);
        assert_eq!(encoder.distances, vec![0.0]);
    }

    #[test]
    fn offline_host_without_subscription_does_not_request_rendering() {
        let client = connected_client();
        let mut bridge = AudioBridge::new(BridgeConfig {
            render_mode_switch_timeout: Duration::from_millis(20),
            switch_poll_step: Duration::from_millis(1),
        });
        let mut encoder = RecordingEncoder::default();

        bridge.process_block(&client, 0.5, false, &mut encoder);
        assert!(!bridge.rendering_requested());
        assert_eq!(client.state_id(), StateId::Connected);
    }
}
