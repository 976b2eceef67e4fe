//! Value types handed to the encoder and their lock-free cells.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ambilink_proto::ObjectId;

/// Distance from the listener in scene units (never negative).
pub type Distance = f32;

/// Direction of a sound source relative to the listener, in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Direction {
    /// Horizontal angle; positive to the left
    pub azimuth: f32,
    /// Vertical angle; positive upwards
    pub elevation: f32,
}

impl Direction {
    /// Create a direction.
    pub const fn new(azimuth: f32, elevation: f32) -> Self {
        Self { azimuth, elevation }
    }
}

/// One encoder input sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DirectionWithDistance {
    /// Where the source is
    pub direction: Direction,
    /// How far away it is
    pub distance: Distance,
}

impl DirectionWithDistance {
    /// Create a sample.
    pub const fn new(direction: Direction, distance: Distance) -> Self {
        Self { direction, distance }
    }
}

/// A companion object the client is (or was) subscribed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Companion-assigned id
    pub id: ObjectId,
    /// Display name
    pub name: String,
}

impl ObjectInfo {
    /// Create an object description.
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// [`Direction`] packed into a single 64-bit atomic.
///
/// Both angles are always read together, so a reader never sees the azimuth of
/// one update paired with the elevation of another.
#[derive(Debug, Default)]
pub struct AtomicDirection(AtomicU64);

impl AtomicDirection {
    /// Load the current direction.
    pub fn load(&self) -> Direction {
        let bits = self.0.load(Ordering::Relaxed);
        Direction {
            azimuth: f32::from_bits(bits as u32),
            elevation: f32::from_bits((bits >> 32) as u32),
        }
    }

    /// Store a new direction.
    pub fn store(&self, direction: Direction) {
        let bits =
            u64::from(direction.azimuth.to_bits()) | (u64::from(direction.elevation.to_bits()) << 32);
        self.0.store(bits, Ordering::Relaxed);
    }
}

/// [`Distance`] stored as its bit pattern.
#[derive(Debug, Default)]
pub struct AtomicDistance(AtomicU32);

impl AtomicDistance {
    /// Load the current distance.
    pub fn load(&self) -> Distance {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Store a new distance.
    pub fn store(&self, distance: Distance) {
        self.0.store(distance.to_bits(), Ordering::Relaxed);
    }
}

/// Latest live sample, written by the subscription thread and read by the
/// audio thread.
#[derive(Debug, Default)]
pub struct Telemetry {
    direction: AtomicDirection,
    distance: AtomicDistance,
}

impl Telemetry {
    /// Store a new sample.
    pub fn store(&self, sample: DirectionWithDistance) {
        self.direction.store(sample.direction);
        self.distance.store(sample.distance);
    }

    /// Current direction.
    pub fn direction(&self) -> Direction {
        self.direction.load()
    }

    /// Current distance.
    pub fn distance(&self) -> Distance {
        self.distance.load()
    }

    /// Current direction and distance.
    pub fn sample(&self) -> DirectionWithDistance {
        DirectionWithDistance::new(self.direction(), self.distance())
    }
}
