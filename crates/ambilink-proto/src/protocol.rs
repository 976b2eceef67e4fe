//! Wire enumerations and request/reply framing.

use bytes::Bytes;

use crate::{
    Writer,
    errors::{ProtocolError, Result},
};

/// Largest message either side will send or accept (1 MiB).
///
/// Location-data replies dominate: a full slice of 250 frames is 3 KiB, so the
/// limit only ever trips on corrupted length prefixes.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Request opcodes understood by the companion application.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// List the names of every trackable object
    ObjectList = 0x01,
    /// Subscribe to position updates of a named object
    Subscribe = 0x02,
    /// Drop the subscription for an object id
    Unsubscribe = 0x03,
    /// Announce that an offline render is starting
    PrepareToRender = 0x04,
    /// Announce that an offline render has finished
    InformRenderFinished = 0x05,
    /// Fetch camera-space positions for a frame range
    GetRenderingLocationData = 0x06,
    /// Fetch frame count and frame rate of the scene animation
    GetAnimationInfo = 0x07,
    /// Keepalive
    Ping = 0xFF,
}

impl Opcode {
    /// Wire value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::ObjectList),
            0x02 => Some(Self::Subscribe),
            0x03 => Some(Self::Unsubscribe),
            0x04 => Some(Self::PrepareToRender),
            0x05 => Some(Self::InformRenderFinished),
            0x06 => Some(Self::GetRenderingLocationData),
            0x07 => Some(Self::GetAnimationInfo),
            0xFF => Some(Self::Ping),
            _ => None,
        }
    }
}

/// Reply status codes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Request handled
    Success = 0x00,
    /// Named or numbered object does not exist
    ObjectNotFound = 0x01,
    /// Payload could not be parsed
    InvalidRequestData = 0x02,
    /// Remote failed internally
    InternalError = 0xFE,
    /// Remote does not know the opcode
    UnknownCommand = 0xFF,
}

impl StatusCode {
    /// Wire value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::ObjectNotFound),
            0x02 => Some(Self::InvalidRequestData),
            0xFE => Some(Self::InternalError),
            0xFF => Some(Self::UnknownCommand),
            _ => None,
        }
    }
}

/// Push-notification kinds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Payload: one camera-space position
    PositionUpdated = 0x00,
    /// Payload: the new length-prefixed name
    Renamed = 0x01,
    /// No payload
    Deleted = 0x02,
}

impl NotificationKind {
    /// Wire value.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::PositionUpdated),
            0x01 => Ok(Self::Renamed),
            0x02 => Ok(Self::Deleted),
            other => Err(ProtocolError::UnknownNotification(other)),
        }
    }
}

/// Frame a request: one opcode byte followed by `payload`.
pub fn encode_request(opcode: Opcode, payload: &[u8]) -> Result<Bytes> {
    let size = 1 + payload.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size, max: MAX_MESSAGE_SIZE });
    }

    let mut writer = Writer::with_capacity(size);
    writer.write(opcode.to_u8()).write_bytes(payload);
    Ok(writer.finish())
}

/// Frame a reply: one status byte followed by `payload`.
///
/// Used by companion-side implementations and test doubles.
pub fn encode_reply(status: StatusCode, payload: &[u8]) -> Result<Bytes> {
    let size = 1 + payload.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge { size, max: MAX_MESSAGE_SIZE });
    }

    let mut writer = Writer::with_capacity(size);
    writer.write(status.to_u8()).write_bytes(payload);
    Ok(writer.finish())
}

/// Map a reply status byte to success or the matching error.
///
/// With `strict == false`, [`StatusCode::ObjectNotFound`] is treated as
/// success so the caller can inspect the status itself.
pub fn check_reply_status(code: u8, strict: bool) -> Result<()> {
    match StatusCode::from_u8(code) {
        Some(StatusCode::Success) => Ok(()),
        Some(StatusCode::ObjectNotFound) if !strict => Ok(()),
        Some(StatusCode::ObjectNotFound) => Err(ProtocolError::ObjectNotFound),
        Some(StatusCode::InvalidRequestData) => Err(ProtocolError::InvalidRequestData),
        Some(StatusCode::InternalError) => Err(ProtocolError::InternalError),
        Some(StatusCode::UnknownCommand) => Err(ProtocolError::UnknownCommand),
        None => Err(ProtocolError::UnknownStatus(code)),
    }
}
