//! Typed payloads carried inside requests, replies and push notifications.
//!
//! Each helper either builds a complete request message or decodes the part of
//! a reply that follows the status byte. Decoders take a [`Reader`] positioned
//! just past the status (or notification header) and leave any trailing bytes
//! untouched.

use bytes::Bytes;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    NotificationKind, Opcode, Reader, Writer,
    errors::{CodecError, ProtocolError, Result},
    protocol::encode_request,
};

/// Companion-assigned object identifier.
pub type ObjectId = u16;

/// Longest object name the companion application accepts, in characters.
pub const MAX_OBJECT_NAME_CHARS: usize = 63;

/// Longest animation the client accepts, in frames.
///
/// The companion's scene range tops out just below 2^20 frames. Anything
/// larger is a corrupt reply and must not size the offline slice cache.
pub const MAX_ANIMATION_FRAMES: u64 = 1 << 20;

/// Position of an object relative to the active camera.
///
/// Layout matches the companion's packed `3 x f32` vector, so values are
/// copied straight out of the message buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct CameraSpacePosition {
    /// Right of the camera
    pub x: f32,
    /// Above the camera
    pub y: f32,
    /// In front of the camera
    pub z: f32,
}

impl CameraSpacePosition {
    /// Size on the wire.
    pub const SIZE: usize = size_of::<Self>();

    /// Create a position.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Append a length-prefixed UTF-8 object name.
///
/// The prefix counts encoded bytes; the limit counts characters, so a name of
/// 63 four-byte characters still fits the one-byte prefix.
pub fn encode_object_name(writer: &mut Writer, name: &str) -> Result<()> {
    let chars = name.chars().count();
    if chars > MAX_OBJECT_NAME_CHARS {
        return Err(ProtocolError::NameTooLong { chars, max: MAX_OBJECT_NAME_CHARS });
    }

    let len = u8::try_from(name.len())
        .map_err(|_| ProtocolError::NameTooLong { chars, max: MAX_OBJECT_NAME_CHARS })?;
    writer.write(len).write_str(name);
    Ok(())
}

/// Read one length-prefixed UTF-8 object name.
pub fn decode_object_name(reader: &mut Reader) -> Result<String> {
    let len = reader.read::<u8>()?;
    let bytes = reader.read_bytes(usize::from(len))?;
    String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidName)
}

/// Read object names until the message is exhausted.
pub fn decode_object_list(reader: &mut Reader) -> Result<Vec<String>> {
    let mut names = Vec::new();
    while !reader.is_exhausted() {
        names.push(decode_object_name(reader)?);
    }
    Ok(names)
}

/// Build a subscribe request for the object called `name`.
pub fn subscribe_request(name: &str) -> Result<Bytes> {
    let mut payload = Writer::with_capacity(name.len() + 1);
    encode_object_name(&mut payload, name)?;
    encode_request(Opcode::Subscribe, &payload.finish())
}

/// Build an unsubscribe request for `object_id`.
pub fn unsubscribe_request(object_id: ObjectId) -> Result<Bytes> {
    encode_request(Opcode::Unsubscribe, object_id.as_bytes())
}

/// Build a location-data request for frames `first..=last` of `object_id`.
pub fn location_data_request(object_id: ObjectId, first: u64, last: u64) -> Result<Bytes> {
    let mut payload = Writer::with_capacity(18);
    payload.write(object_id).write(first).write(last);
    encode_request(Opcode::GetRenderingLocationData, &payload.finish())
}

/// Decode `frames` camera-space positions.
pub fn decode_positions(reader: &mut Reader, frames: usize) -> Result<Vec<CameraSpacePosition>> {
    let needed = frames.saturating_mul(CameraSpacePosition::SIZE);
    if reader.remaining() < needed {
        let remaining = reader.remaining();
        return Err(CodecError::OutOfRange { requested: needed, remaining }.into());
    }

    let mut positions = Vec::with_capacity(frames);
    for _ in 0..frames {
        positions.push(reader.read::<CameraSpacePosition>()?);
    }
    Ok(positions)
}

/// Scene animation parameters returned by [`Opcode::GetAnimationInfo`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationInfo {
    /// Number of frames in the animation
    pub frame_count: u64,
    /// Playback rate
    pub fps: f32,
}

impl AnimationInfo {
    /// Decode and validate the reply payload.
    pub fn decode(reader: &mut Reader) -> Result<Self> {
        let frame_count = reader.read::<u64>()?;
        let fps = reader.read::<f32>()?;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ProtocolError::InvalidAnimationInfo("frame rate must be positive"));
        }
        if frame_count > MAX_ANIMATION_FRAMES {
            return Err(ProtocolError::InvalidAnimationInfo("frame count out of range"));
        }
        Ok(Self { frame_count, fps })
    }

    /// Append the reply payload.
    pub fn encode(&self, writer: &mut Writer) {
        writer.write(self.frame_count).write(self.fps);
    }
}

/// Header of every push notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationHeader {
    /// Object the notification is about
    pub object_id: ObjectId,
    /// What happened to it
    pub kind: NotificationKind,
}

impl NotificationHeader {
    /// Encoded header size.
    pub const SIZE: usize = 3;

    /// Decode the header, leaving the reader at the payload.
    pub fn decode(reader: &mut Reader) -> Result<Self> {
        let object_id = reader.read::<ObjectId>()?;
        let kind = NotificationKind::from_u8(reader.read::<u8>()?)?;
        Ok(Self { object_id, kind })
    }

    /// Append the header.
    pub fn encode(&self, writer: &mut Writer) {
        writer.write(self.object_id).write(self.kind.to_u8());
    }
}
