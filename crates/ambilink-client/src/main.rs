//! Ambilink monitor binary.
//!
//! Connects to a running companion application and logs what the client
//! sees: state changes, the object list and the tracked object's direction.
//!
//! # Usage
//!
//! ```bash
//! # Watch a single object
//! ambilink-monitor --object Speaker
//!
//! # List trackable objects and exit after ten seconds
//! ambilink-monitor --list --duration 10
//! ```

use std::{
    path::PathBuf,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use ambilink_client::{
    ClientConfig, Command, IpcClient, ObservableState, PropertyUpdate, StateId, UnixTransport,
    config::{DEFAULT_NOTIFICATION_ENDPOINT, DEFAULT_REQUEST_ENDPOINT},
};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Ambilink IPC monitor
#[derive(Parser, Debug)]
#[command(name = "ambilink-monitor")]
#[command(about = "Watch an Ambilink companion application through the IPC client")]
#[command(version)]
struct Args {
    /// Request/reply socket path
    #[arg(long, default_value = DEFAULT_REQUEST_ENDPOINT)]
    request_endpoint: PathBuf,

    /// Push-notification socket path
    #[arg(long, default_value = DEFAULT_NOTIFICATION_ENDPOINT)]
    notification_endpoint: PathBuf,

    /// Object to subscribe to
    #[arg(short, long)]
    object: Option<String>,

    /// Request the object list once connected
    #[arg(short, long)]
    list: bool,

    /// Reporting interval in milliseconds
    #[arg(short, long, default_value = "500")]
    interval: u64,

    /// Exit after this many seconds (runs until killed if omitted)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let config = ClientConfig {
        request_endpoint: args.request_endpoint,
        notification_endpoint: args.notification_endpoint,
        ..Default::default()
    };
    tracing::info!(
        requests = %config.request_endpoint.display(),
        notifications = %config.notification_endpoint.display(),
        "ambilink monitor starting"
    );

    // A stored name is restored as a subscription once connected.
    let observable = Arc::new(ObservableState::new(config.property_queue_capacity));
    observable.set_object_name(args.object.clone());
    let transport = Arc::new(UnixTransport::from_config(&config));
    let client = IpcClient::spawn(config, transport, observable)?;

    let interval = Duration::from_millis(args.interval.max(1));
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut list_requested = false;

    while deadline.is_none_or(|at| Instant::now() < at) {
        for update in client.observable().apply_pending() {
            report(&update);
            if args.list
                && !list_requested
                && update == PropertyUpdate::ClientState(StateId::Connected)
            {
                list_requested = client.send_command(Command::UpdateObjectList);
            }
        }

        if client.is_in_state(StateId::Subscribed) {
            let sample = client.current_sample();
            tracing::info!(
                azimuth = sample.direction.azimuth,
                elevation = sample.direction.elevation,
                distance = sample.distance,
                "direction"
            );
        }
        thread::sleep(interval);
    }

    client.shutdown();
    tracing::info!("ambilink monitor stopped");
    Ok(())
}

fn report(update: &PropertyUpdate) {
    match update {
        PropertyUpdate::ClientState(state) => tracing::info!(%state, "client state"),
        PropertyUpdate::ObjectName(name) => tracing::info!(?name, "object name"),
        PropertyUpdate::ObjectDeleted(deleted) => tracing::info!(deleted, "object deleted flag"),
        PropertyUpdate::ObjectList(names) => tracing::info!(?names, "object list"),
        PropertyUpdate::IpcError(Some(error)) => tracing::error!(%error, "ipc error"),
        PropertyUpdate::IpcError(None) => tracing::info!("ipc error cleared"),
        PropertyUpdate::CurrentDirection(_) => {},
    }
}
