//! Client error type and failure classification.
//!
//! Every state method returns [`ClientError`]; the orchestrator decides what
//! happens next from [`ClientError::is_reconnectable`] alone.

use ambilink_proto::{CodecError, ProtocolError};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by state methods and the orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Channel-level failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Remote reported an error or sent a malformed message
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Worker thread could not be started
    #[error("failed to spawn {thread} thread: {reason}")]
    Spawn {
        /// Which thread
        thread: &'static str,
        /// OS error description
        reason: String,
    },
}

impl From<CodecError> for ClientError {
    fn from(err: CodecError) -> Self {
        Self::Protocol(ProtocolError::Codec(err))
    }
}

impl ClientError {
    /// Returns true if the client should drop to Disconnected and redial.
    ///
    /// Only refused, timed-out or shut connections qualify. Protocol errors
    /// and other transport failures are fatal to the current state and route
    /// to the error state instead.
    pub fn is_reconnectable(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_reconnectable())
    }

    /// Returns true if this error came from the channel layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
