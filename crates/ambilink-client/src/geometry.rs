//! Camera-space position to listener direction.
//!
//! The camera is the listener: it looks down +z with +y up, so azimuth is
//! measured in the x/z plane and elevation above it.

use ambilink_proto::CameraSpacePosition;

use crate::types::{Direction, DirectionWithDistance};

/// Convert a camera-space position into direction and distance.
///
/// Azimuth is `-atan2(x, z)` so sources to the right are negative. Elevation
/// is the angle above the horizontal plane, which stays defined (±90°) for
/// sources straight above or below. The origin maps to an all-zero sample.
pub fn direction_from_camera_space(position: CameraSpacePosition) -> DirectionWithDistance {
    let CameraSpacePosition { x, y, z } = position;
    let distance = (x * x + y * y + z * z).sqrt();
    if distance == 0.0 {
        return DirectionWithDistance::default();
    }

    let horizontal = x.hypot(z);
    let azimuth = if horizontal == 0.0 { 0.0 } else { -x.atan2(z).to_degrees() };
    let elevation = y.atan2(horizontal).to_degrees();

    DirectionWithDistance::new(Direction::new(azimuth, elevation), distance)
}

impl From<CameraSpacePosition> for DirectionWithDistance {
    fn from(position: CameraSpacePosition) -> Self {
        direction_from_camera_space(position)
    }
}
