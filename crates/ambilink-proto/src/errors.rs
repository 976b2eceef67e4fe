//! Error types for the wire codec and protocol helpers.
//!
//! [`CodecError`] covers raw buffer access; [`ProtocolError`] covers
//! everything the remote can get wrong (bad statuses, malformed payloads) plus
//! the limits this side enforces before sending.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised by [`Reader`](crate::Reader).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes remain than the read requires
    #[error("read out of range: requested {requested} bytes, {remaining} remaining")]
    OutOfRange {
        /// Bytes the read needed
        requested: usize,
        /// Bytes left in the message
        remaining: usize,
    },
}

/// Protocol-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Remote could not find the requested object
    #[error("object not found")]
    ObjectNotFound,

    /// Remote rejected the request payload
    #[error("invalid request data")]
    InvalidRequestData,

    /// Remote failed while handling the request
    #[error("internal error in companion application")]
    InternalError,

    /// Remote does not know the opcode
    #[error("unknown command")]
    UnknownCommand,

    /// Reply carried a status byte outside the protocol
    #[error("unrecognized reply status {0:#04x}")]
    UnknownStatus(u8),

    /// Push notification carried an unknown kind byte
    #[error("unrecognized notification kind {0:#04x}")]
    UnknownNotification(u8),

    /// Object name exceeds the protocol limit
    #[error("object name too long: {chars} characters (max {max})")]
    NameTooLong {
        /// Characters in the rejected name
        chars: usize,
        /// Maximum allowed characters
        max: usize,
    },

    /// Object name bytes are not valid UTF-8
    #[error("object name is not valid UTF-8")]
    InvalidName,

    /// Encoded message exceeds the transport budget
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Size of the rejected message
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Animation info reply is unusable
    #[error("invalid animation info: {0}")]
    InvalidAnimationInfo(&'static str),

    /// Short read while decoding a payload
    #[error(transparent)]
    Codec(#[from] CodecError),
}
