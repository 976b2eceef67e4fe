//! Ambilink companion IPC protocol.
//!
//! Byte-level contract between the audio plugin and the companion 3D
//! application. Both peers run on the same machine, so every fixed-width value
//! travels in native byte order with no framing beyond what the transport
//! provides.
//!
//! # Components
//!
//! - [`Writer`] / [`Reader`]: append-only builder and bounds-checked cursor
//!   over one message buffer
//! - [`Opcode`], [`StatusCode`], [`NotificationKind`]: the wire enumerations
//! - [`encode_request`] / [`check_reply_status`]: request framing and reply
//!   status mapping
//! - [`payloads`]: object names, object lists, animation info, location data
//!   and push-notification headers
//!
//! # Message layouts
//!
//! ```text
//! request:      [opcode:u8][payload...]
//! reply:        [status:u8][payload...]
//! notification: [object-id:u16][kind:u8][payload...]
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod errors;
pub mod payloads;
pub mod protocol;

pub use codec::{Reader, Writer};
pub use errors::{CodecError, ProtocolError, Result};
pub use payloads::{
    AnimationInfo, CameraSpacePosition, MAX_ANIMATION_FRAMES, MAX_OBJECT_NAME_CHARS,
    NotificationHeader, ObjectId,
};
pub use protocol::{
    MAX_MESSAGE_SIZE, NotificationKind, Opcode, StatusCode, check_reply_status, encode_reply,
    encode_request,
};
