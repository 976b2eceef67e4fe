//! Client orchestrator: worker threads, the current-state slot and the
//! real-time surface.
//!
//! # Threads
//!
//! - **request thread**: the only place where states are installed. Each
//!   tick it processes at most one command, runs the current state's idle
//!   poll, sends a keepalive if due, and then sleeps on a wakeup signal when
//!   the command queue is empty.
//! - **subscription thread**: receives push notifications and forwards the
//!   ones for the active object to the current state. Its errors are handed
//!   to the request thread through a deferred-error slot rather than handled
//!   in place.
//! - **audio thread** (caller-owned): reads the live-sample atomics, or in
//!   offline rendering borrows the current state through [`ScopedState`].
//!
//! # Failure policy
//!
//! Reconnectable errors drop the client to Disconnected, which redials on
//! its own. Everything else enters the error state exactly once; later
//! errors only replace the stored message.

use std::{
    marker::PhantomData,
    ops::Deref,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use ambilink_proto::{NotificationHeader, Reader};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::{
    command::{Command, CommandQueue},
    config::ClientConfig,
    context::StateContext,
    error::ClientError,
    observable::{ObservableState, PropertyUpdate},
    state::{Disconnected, ErrorState, State, StateId, StateVariant},
    transport::{Transport, UnixTransport},
    types::{Direction, DirectionWithDistance, Distance},
};

const REQUEST_THREAD_NAME: &str = "ambilink-requests";
const SUBSCRIPTION_THREAD_NAME: &str = "ambilink-notifications";

/// One slot per state kind; exactly one is occupied at a time.
struct StateSlots {
    slots: RwLock<[Option<Arc<State>>; StateId::COUNT]>,
    current: AtomicU8,
    transition: Mutex<()>,
}

impl StateSlots {
    fn new(initial: State) -> Self {
        let id = initial.id();
        let mut slots = [const { None }; StateId::COUNT];
        slots[id.index()] = Some(Arc::new(initial));
        Self {
            slots: RwLock::new(slots),
            current: AtomicU8::new(id as u8),
            transition: Mutex::new(()),
        }
    }

    fn current_id(&self) -> StateId {
        StateId::from_u8(self.current.load(Ordering::Acquire))
            .unwrap_or_else(|| unreachable!("current state id is always a valid discriminant"))
    }

    fn current(&self) -> Arc<State> {
        let slots = self.slots.read();
        slots[self.current_id().index()]
            .clone()
            .unwrap_or_else(|| unreachable!("current state slot is always occupied"))
    }

    /// Replace the current state. Blocks while scoped access is held.
    ///
    /// Returns the previous state so the caller drops it outside the locks.
    fn install(&self, next: State) -> Option<Arc<State>> {
        let _transition = self.transition.lock();
        let mut slots = self.slots.write();

        let next_id = next.id();
        let previous = slots[self.current_id().index()].take();
        slots[next_id.index()] = Some(Arc::new(next));
        self.current.store(next_id as u8, Ordering::Release);
        previous
    }
}

/// Sleep-until-signalled primitive for the request thread.
#[derive(Default)]
struct Wakeup {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl Wakeup {
    fn notify(&self) {
        *self.signalled.lock() = true;
        self.condvar.notify_one();
    }

    fn wait(&self, timeout: Duration) {
        let mut signalled = self.signalled.lock();
        if !*signalled {
            self.condvar.wait_for(&mut signalled, timeout);
        }
        *signalled = false;
    }
}

/// State shared between the handle and both worker threads.
struct Shared {
    ctx: StateContext,
    slots: StateSlots,
    commands: CommandQueue,
    wakeup: Wakeup,
    /// Subscription-thread failure tagged with the channel epoch it hit
    deferred_error: Mutex<Option<(u64, ClientError)>>,
    stop: AtomicBool,
}

impl Shared {
    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run_requests(&self) {
        tracing::debug!("request thread started");
        while !self.should_stop() {
            let deferred = self.deferred_error.lock().take();
            if let Some((epoch, error)) = deferred {
                if epoch == self.ctx.channel_epoch() {
                    self.handle_failure(error);
                } else {
                    tracing::debug!(%error, "dropping error from closed channels");
                }
            }

            if let Err(error) = self.tick() {
                self.handle_failure(error);
            }

            if self.commands.is_empty() && !self.should_stop() {
                self.wakeup.wait(self.ctx.config().idle_wait);
            }
        }
        tracing::debug!("request thread stopped");
    }

    fn tick(&self) -> Result<(), ClientError> {
        if let Some(command) = self.commands.pop() {
            let current = self.slots.current();
            tracing::debug!(state = %current.id(), command = command.name(), "processing command");
            let next = current.process_command(&command, &self.ctx)?;
            self.set_next_state(next);
        }

        let next = self.slots.current().idle_poll(&self.ctx, &|| self.should_stop())?;
        self.set_next_state(next);

        self.slots.current().send_ping(&self.ctx)
    }

    fn set_next_state(&self, next: Option<State>) {
        let Some(next) = next else {
            return;
        };

        let from = self.slots.current_id();
        let to = next.id();
        if from == to {
            debug_assert_ne!(from, to, "states never transition into their own kind");
            tracing::warn!(state = %to, "ignoring transition into the current state kind");
            return;
        }

        let previous = self.slots.install(next);
        drop(previous);
        tracing::info!(%from, %to, "state transition");
        self.ctx.observable().queue(PropertyUpdate::ClientState(to));
    }

    fn handle_failure(&self, error: ClientError) {
        let current = self.slots.current();
        current.interrupt();

        if error.is_reconnectable() {
            if current.id() == StateId::Disconnected {
                tracing::debug!(%error, "reconnectable error while disconnected");
                return;
            }
            tracing::warn!(state = %current.id(), %error, "connection lost");
            self.ctx.subscription().stop();
            self.ctx.close_channels();
            self.set_next_state(Some(State::Disconnected(Disconnected)));
            return;
        }

        if let State::Error(state) = &*current {
            state.set_error(error, &self.ctx);
            return;
        }
        let next = ErrorState::enter(error, &current, &self.ctx);
        self.set_next_state(Some(State::Error(next)));
    }

    fn run_notifications(&self) {
        tracing::debug!("subscription thread started");
        let poll = self.ctx.config().notification_poll_interval;
        while !self.should_stop() {
            if self.ctx.subscription().active().is_none() {
                thread::sleep(poll);
                continue;
            }
            let epoch = self.ctx.channel_epoch();
            if let Err(error) = self.receive_notification(poll) {
                self.defer_error(epoch, error);
                thread::sleep(poll);
            }
        }
        tracing::debug!("subscription thread stopped");
    }

    fn receive_notification(&self, timeout: Duration) -> Result<(), ClientError> {
        let Some(message) = self.ctx.recv_notification(timeout)? else {
            return Ok(());
        };

        let mut reader = Reader::new(message);
        let header = NotificationHeader::decode(&mut reader)?;
        if self.ctx.subscription().active() != Some(header.object_id) {
            tracing::trace!(object_id = header.object_id, "notification for another object");
            return Ok(());
        }
        self.slots.current().on_push_notification(header.kind, &mut reader, &self.ctx)
    }

    fn defer_error(&self, epoch: u64, error: ClientError) {
        {
            let mut slot = self.deferred_error.lock();
            if slot.is_none() {
                tracing::debug!(%error, "deferring subscription error");
                *slot = Some((epoch, error));
            }
        }
        self.wakeup.notify();
    }
}

/// Borrow of the current state, valid only while it is of kind `T`.
///
/// Holds the transition lock, so the state cannot be replaced until the
/// guard is dropped. Keep it for one lookup and release it.
pub struct ScopedState<'a, T: StateVariant> {
    _transition: MutexGuard<'a, ()>,
    state: Arc<State>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: StateVariant> Deref for ScopedState<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        T::project(&self.state)
            .unwrap_or_else(|| unreachable!("scoped state kind is checked on creation"))
    }
}

/// Handle to a running client.
///
/// Dropping the handle shuts the client down.
pub struct IpcClient {
    shared: Arc<Shared>,
    request_thread: Mutex<Option<JoinHandle<()>>>,
    subscription_thread: Mutex<Option<JoinHandle<()>>>,
}

impl IpcClient {
    /// Start a client over Unix sockets at the configured endpoints.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = Arc::new(UnixTransport::from_config(&config));
        let observable = Arc::new(ObservableState::new(config.property_queue_capacity));
        Self::spawn(config, transport, observable)
    }

    /// Start a client over `transport`, publishing into `observable`.
    ///
    /// The client starts Disconnected and dials in the background.
    pub fn spawn(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        observable: Arc<ObservableState>,
    ) -> Result<Self, ClientError> {
        let commands = CommandQueue::new(config.command_queue_capacity);
        let shared = Arc::new(Shared {
            ctx: StateContext::new(config, transport, observable),
            slots: StateSlots::new(State::Disconnected(Disconnected)),
            commands,
            wakeup: Wakeup::default(),
            deferred_error: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        let request_thread = spawn_worker(REQUEST_THREAD_NAME, &shared, Shared::run_requests)?;
        let subscription_thread =
            match spawn_worker(SUBSCRIPTION_THREAD_NAME, &shared, Shared::run_notifications) {
                Ok(handle) => handle,
                Err(error) => {
                    shared.stop.store(true, Ordering::Release);
                    shared.wakeup.notify();
                    let _ = request_thread.join();
                    return Err(error);
                },
            };

        tracing::info!("ipc client started");
        Ok(Self {
            shared,
            request_thread: Mutex::new(Some(request_thread)),
            subscription_thread: Mutex::new(Some(subscription_thread)),
        })
    }

    /// Queue a command for the request thread.
    ///
    /// Returns false if the queue is full and the command was dropped.
    pub fn send_command(&self, command: Command) -> bool {
        let queued = self.shared.commands.push(command);
        if queued {
            self.shared.wakeup.notify();
        }
        queued
    }

    /// Kind of the current state.
    pub fn state_id(&self) -> StateId {
        self.shared.slots.current_id()
    }

    /// Returns true if the current state is `id`.
    pub fn is_in_state(&self, id: StateId) -> bool {
        self.state_id() == id
    }

    /// Borrow the current state if it is of kind `T`.
    ///
    /// Blocks while a transition is being installed.
    pub fn scoped<T: StateVariant>(&self) -> Option<ScopedState<'_, T>> {
        let transition = self.shared.slots.transition.lock();
        let state = self.shared.slots.current();
        T::project(&state)?;
        Some(ScopedState { _transition: transition, state, _kind: PhantomData })
    }

    /// Latest live direction. Never blocks.
    pub fn current_direction(&self) -> Direction {
        self.shared.ctx.telemetry().direction()
    }

    /// Latest live distance. Never blocks.
    pub fn current_distance(&self) -> Distance {
        self.shared.ctx.telemetry().distance()
    }

    /// Latest live sample. Never blocks.
    pub fn current_sample(&self) -> DirectionWithDistance {
        self.shared.ctx.telemetry().sample()
    }

    /// The observable store the client publishes into.
    pub fn observable(&self) -> &ObservableState {
        self.shared.ctx.observable()
    }

    /// Shared handle to the observable store.
    pub fn observable_handle(&self) -> Arc<ObservableState> {
        self.shared.ctx.observable_handle()
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        self.shared.ctx.config()
    }

    /// Stop both threads, run the current state's shutdown and close the
    /// channels. Idempotent.
    pub fn shutdown(&self) {
        if self.shared.stop.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("ipc client shutting down");

        self.shared.slots.current().interrupt();
        self.shared.wakeup.notify();

        let handles = [self.request_thread.lock().take(), self.subscription_thread.lock().take()];
        for handle in handles.into_iter().flatten() {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            if handle.join().is_err() {
                tracing::error!(thread = %name, "worker thread panicked");
            }
        }

        {
            let _transition = self.shared.slots.transition.lock();
            let current = self.shared.slots.current();
            if let Err(error) = current.on_shutdown(&self.shared.ctx) {
                tracing::warn!(state = %current.id(), %error, "shutdown cleanup failed");
            }
        }
        self.shared.ctx.subscription().stop();
        self.shared.ctx.close_channels();
    }
}

impl Drop for IpcClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(
    name: &'static str,
    shared: &Arc<Shared>,
    body: fn(&Shared),
) -> Result<JoinHandle<()>, ClientError> {
    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || body(&shared))
        .map_err(|e| ClientError::Spawn { thread: name, reason: e.to_string() })
}
