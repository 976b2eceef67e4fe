//! OfflineRendering: the host renders faster (or slower) than real time.
//!
//! Live push notifications are useless here because the host asks for
//! arbitrary playback times. Instead the request thread prefetches the
//! object's camera-space positions slice by slice and the audio thread looks
//! samples up by time through [`OfflineRendering::direction_and_distance_at`].
//!
//! The lookup may block until its slice arrives. Every failure path and every
//! transition out of this state sets the abort flag first, which makes a
//! waiting lookup return a zeroed sample immediately.

mod cache;
mod layout;

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use ambilink_proto::{
    AnimationInfo, NotificationKind, ObjectId, Opcode, Reader, StatusCode, encode_request,
    payloads,
};
pub use cache::{Slice, SliceCache};
pub use layout::SliceLayout;
use parking_lot::Mutex;

use super::{ObjectDeleted, State, Subscribed};
use crate::{
    command::Command,
    context::StateContext,
    error::ClientError,
    observable::PropertyUpdate,
    types::{DirectionWithDistance, ObjectInfo},
};

/// Offline rendering state.
#[derive(Debug)]
pub struct OfflineRendering {
    object: Mutex<ObjectInfo>,
    object_id: ObjectId,
    layout: SliceLayout,
    cache: SliceCache,
    fetch_after: Instant,
    busy_wait_step: Duration,
    aborted: AtomicBool,
    deletion_pending: AtomicBool,
}

impl OfflineRendering {
    /// Enter from Subscribed: announce the render and learn the animation.
    pub(crate) fn from_subscribed(
        previous: &Subscribed,
        object_id: ObjectId,
        ctx: &StateContext,
    ) -> Result<Self, ClientError> {
        ctx.send(Opcode::PrepareToRender)?;

        let mut reply = ctx.call(&encode_request(Opcode::GetAnimationInfo, &[])?, true)?;
        let info = AnimationInfo::decode(&mut reply.payload)?;

        let config = ctx.config().offline;
        let layout = SliceLayout::new(info.frame_count, info.fps, config.max_frames_per_slice);
        let cache = SliceCache::new(layout.num_slices(), config.max_cached_slices());
        tracing::info!(
            object_id,
            frames = info.frame_count,
            fps = info.fps,
            slices = layout.num_slices(),
            slice_secs = layout.slice_duration().as_secs_f64(),
            max_cached = cache.max_cached(),
            "offline rendering started"
        );

        Ok(Self {
            object: Mutex::new(previous.object()),
            object_id,
            layout,
            cache,
            fetch_after: Instant::now() + config.first_fetch_delay,
            busy_wait_step: config.busy_wait_step,
            aborted: AtomicBool::new(false),
            deletion_pending: AtomicBool::new(false),
        })
    }

    /// The rendered object.
    pub fn object(&self) -> ObjectInfo {
        self.object.lock().clone()
    }

    /// Id of the rendered object.
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    /// Slice layout of the animation.
    pub fn layout(&self) -> &SliceLayout {
        &self.layout
    }

    /// The slice cache.
    pub fn cache(&self) -> &SliceCache {
        &self.cache
    }

    /// Returns true once pending lookups have been told to give up.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Make waiting and future lookups return immediately.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            tracing::debug!("offline rendering lookups aborted");
        }
    }

    /// Sample shown at `seconds` of playback.
    ///
    /// Called from the audio thread. Blocks in `busy_wait_step` increments
    /// until the slice is fetched; returns a zeroed sample if the state is
    /// aborted, the animation is empty, or the slice was already evicted.
    pub fn direction_and_distance_at(&self, seconds: f64) -> DirectionWithDistance {
        let Some((slice, frame)) = self.layout.locate(seconds) else {
            return DirectionWithDistance::default();
        };

        self.cache.mark_being_read(slice);
        while !self.cache.is_fetched(slice) {
            if self.is_aborted() {
                return DirectionWithDistance::default();
            }
            thread::sleep(self.busy_wait_step);
        }

        self.cache.sample(slice, frame).unwrap_or_else(|| {
            tracing::warn!(slice, frame, "requested slice already evicted");
            DirectionWithDistance::default()
        })
    }

    pub(crate) fn process_command(
        &self,
        command: &Command,
        ctx: &StateContext,
    ) -> Result<Option<State>, ClientError> {
        match command {
            Command::DisableRenderingMode => {
                self.abort();
                Ok(Some(State::Subscribed(Subscribed::from_offline(self, ctx)?)))
            },
            Command::UpdateObjectList => self.abort_on_error(ctx.update_object_list()).map(|()| None),
            _ => Ok(None),
        }
    }

    pub(crate) fn idle_poll(
        &self,
        ctx: &StateContext,
        should_stop: &dyn Fn() -> bool,
    ) -> Result<Option<State>, ClientError> {
        if self.deletion_pending.load(Ordering::Acquire) {
            self.abort();
            return Ok(Some(State::ObjectDeleted(ObjectDeleted::from_offline(self, ctx))));
        }
        if Instant::now() < self.fetch_after {
            return Ok(None);
        }

        self.cache.evict_consumed();
        while self.cache.wants_fetch() && !should_stop() && !self.is_aborted() {
            let index = self.cache.next_to_fetch();
            self.abort_on_error(self.fetch_slice(index, ctx))?;
            self.cache.evict_consumed();
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
            NotificationKind::Deleted => {
                tracing::info!(object_id = self.object_id, "object deleted during offline render");
                self.abort();
                self.deletion_pending.store(true, Ordering::Release);
            },
            NotificationKind::Renamed => {
                let name = self.abort_on_error(
                    payloads::decode_object_name(reader).map_err(ClientError::from),
                )?;
                self.object.lock().name.clone_from(&name);
                ctx.observable().queue(PropertyUpdate::ObjectName(Some(name)));
            },
            NotificationKind::PositionUpdated => {},
        }
        Ok(())
    }

    pub(crate) fn send_ping(&self, ctx: &StateContext) -> Result<(), ClientError> {
        self.abort_on_error(ctx.ping_if_due())
    }

    pub(crate) fn on_shutdown(&self, ctx: &StateContext) -> Result<(), ClientError> {
        self.abort();
        ctx.unsubscribe(self.object_id)
    }

    fn fetch_slice(&self, index: usize, ctx: &StateContext) -> Result<(), ClientError> {
        let (first, last) = self.layout.frame_range(index);
        let request = payloads::location_data_request(self.object_id, first, last)?;
        let mut reply = ctx.call(&request, false)?;
        if reply.status == StatusCode::ObjectNotFound {
            tracing::info!(object_id = self.object_id, index, "object gone while prefetching");
            self.abort();
            self.deletion_pending.store(true, Ordering::Release);
            return Ok(());
        }

        let positions =
            payloads::decode_positions(&mut reply.payload, self.layout.frames_in_slice(index))?;
        let samples: Slice = positions.into_iter().map(DirectionWithDistance::from).collect();
        self.cache.store(index, samples);
        tracing::debug!(index, first, last, "slice fetched");
        Ok(())
    }

    fn abort_on_error<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if result.is_err() {
            self.abort();
        }
        result
    }
}
