//! Local socket transport.
//!
//! The state machine talks to the companion through two channel traits so the
//! same code runs against Unix sockets in production and an in-process
//! companion in tests. [`UnixTransport`] frames every message with a
//! little-endian `u32` length prefix.

use std::{
    io::{self, ErrorKind, Read, Write},
    os::unix::net::UnixStream,
    path::PathBuf,
    time::Duration,
};

use ambilink_proto::MAX_MESSAGE_SIZE;
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

use crate::config::ClientConfig;

/// Smallest read timeout handed to the socket; zero would mean "block forever".
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// Length prefix size.
const FRAME_PREFIX_LEN: usize = 4;

/// Transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Nobody is listening on the endpoint
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// Send or receive did not complete in time
    #[error("timed out")]
    TimedOut,

    /// Peer closed the connection
    #[error("connection shut down")]
    ConnectionShut,

    /// Channel used before it was dialed
    #[error("not connected")]
    NotConnected,

    /// Peer announced a frame beyond the message budget
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Any other I/O failure
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// Error kind reported by the OS
        kind: ErrorKind,
        /// Error description
        message: String,
    },
}

impl TransportError {
    /// Returns true if redialing may fix this error.
    ///
    /// Refused, timed-out and shut connections mean the companion went away
    /// or is restarting. Everything else points at a broken peer or local
    /// setup and is not retried.
    pub fn is_reconnectable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(_) | Self::TimedOut | Self::ConnectionShut | Self::NotConnected
        )
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            ErrorKind::ConnectionRefused | ErrorKind::NotFound => {
                Self::ConnectionRefused(err.to_string())
            },
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => Self::ConnectionShut,
            kind => Self::Io { kind, message: err.to_string() },
        }
    }
}

/// Factory for the two companion channels.
pub trait Transport: Send + Sync {
    /// Open the request/reply channel.
    fn dial_requests(&self) -> Result<Box<dyn RequestChannel>, TransportError>;

    /// Open the push-notification channel.
    fn dial_notifications(&self) -> Result<Box<dyn NotificationChannel>, TransportError>;
}

/// Strict request/reply exchange.
pub trait RequestChannel: Send {
    /// Send one request and wait for its reply.
    fn request(&mut self, message: &[u8]) -> Result<Bytes, TransportError>;
}

/// One-way stream of push notifications.
pub trait NotificationChannel: Send {
    /// Wait up to `timeout` for the next notification.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError>;
}

/// Unix domain socket transport.
#[derive(Debug, Clone)]
pub struct UnixTransport {
    request_path: PathBuf,
    notification_path: PathBuf,
    send_timeout: Duration,
    reply_timeout: Duration,
}

impl UnixTransport {
    /// Transport for the endpoints and timeouts in `config`.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            request_path: config.request_endpoint.clone(),
            notification_path: config.notification_endpoint.clone(),
            send_timeout: config.request_send_timeout,
            reply_timeout: config.reply_timeout,
        }
    }
}

impl Transport for UnixTransport {
    fn dial_requests(&self) -> Result<Box<dyn RequestChannel>, TransportError> {
        let stream = UnixStream::connect(&self.request_path)?;
        stream.set_write_timeout(Some(self.send_timeout.max(MIN_SOCKET_TIMEOUT)))?;
        stream.set_read_timeout(Some(self.reply_timeout.max(MIN_SOCKET_TIMEOUT)))?;
        tracing::debug!(path = %self.request_path.display(), "request channel connected");
        Ok(Box::new(UnixRequestChannel { stream }))
    }

    fn dial_notifications(&self) -> Result<Box<dyn NotificationChannel>, TransportError> {
        let stream = UnixStream::connect(&self.notification_path)?;
        tracing::debug!(path = %self.notification_path.display(), "notification channel connected");
        Ok(Box::new(UnixNotificationChannel { stream, pending: BytesMut::new() }))
    }
}

/// Prefix `message` with its length.
pub fn encode_frame(message: &[u8]) -> Result<Bytes, TransportError> {
    if message.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::FrameTooLarge { size: message.len(), max: MAX_MESSAGE_SIZE });
    }
    let mut frame = BytesMut::with_capacity(FRAME_PREFIX_LEN + message.len());
    frame.extend_from_slice(&(message.len() as u32).to_le_bytes());
    frame.extend_from_slice(message);
    Ok(frame.freeze())
}

/// Split one complete frame off the front of `pending`, if present.
pub fn take_frame(pending: &mut BytesMut) -> Result<Option<Bytes>, TransportError> {
    let Some(prefix) = pending.get(..FRAME_PREFIX_LEN) else {
        return Ok(None);
    };
    let mut len_bytes = [0u8; FRAME_PREFIX_LEN];
    len_bytes.copy_from_slice(prefix);
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(TransportError::FrameTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    if pending.len() < FRAME_PREFIX_LEN + len {
        return Ok(None);
    }

    pending.advance(FRAME_PREFIX_LEN);
    Ok(Some(pending.split_to(len).freeze()))
}

struct UnixRequestChannel {
    stream: UnixStream,
}

impl RequestChannel for UnixRequestChannel {
    fn request(&mut self, message: &[u8]) -> Result<Bytes, TransportError> {
        let frame = encode_frame(message)?;
        self.stream.write_all(&frame)?;

        let mut prefix = [0u8; FRAME_PREFIX_LEN];
        self.stream.read_exact(&mut prefix)?;
        let len = u32::from_le_bytes(prefix) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(TransportError::FrameTooLarge { size: len, max: MAX_MESSAGE_SIZE });
        }

        let mut reply = vec![0u8; len];
        self.stream.read_exact(&mut reply)?;
        Ok(Bytes::from(reply))
    }
}

struct UnixNotificationChannel {
    stream: UnixStream,
    pending: BytesMut,
}

impl NotificationChannel for UnixNotificationChannel {
    fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>, TransportError> {
        if let Some(frame) = take_frame(&mut self.pending)? {
            return Ok(Some(frame));
        }

        self.stream.set_read_timeout(Some(timeout.max(MIN_SOCKET_TIMEOUT)))?;
        let mut chunk = [0u8; 4096];
        match self.stream.read(&mut chunk) {
            Ok(0) => Err(TransportError::ConnectionShut),
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                take_frame(&mut self.pending)
            },
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{os::unix::net::UnixListener, thread};

    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let refused: TransportError = io::Error::from(ErrorKind::ConnectionRefused).into();
        assert!(matches!(refused, TransportError::ConnectionRefused(_)));
        assert!(refused.is_reconnectable());

        let missing: TransportError = io::Error::from(ErrorKind::NotFound).into();
        assert!(missing.is_reconnectable());

        let shut: TransportError = io::Error::from(ErrorKind::BrokenPipe).into();
        assert_eq!(shut, TransportError::ConnectionShut);

        let timeout: TransportError = io::Error::from(ErrorKind::WouldBlock).into();
        assert_eq!(timeout, TransportError::TimedOut);

        let denied: TransportError = io::Error::from(ErrorKind::PermissionDenied).into();
        assert!(!denied.is_reconnectable());
    }

    #[test]
    fn frames_split_only_when_complete() {
        let mut pending = BytesMut::new();
        let frame = encode_frame(b"abc").unwrap();

        pending.extend_from_slice(&frame[..5]);
        assert_eq!(take_frame(&mut pending).unwrap(), None);

        pending.extend_from_slice(&frame[5..]);
        pending.extend_from_slice(&encode_frame(b"").unwrap());
        assert_eq!(take_frame(&mut pending).unwrap(), Some(Bytes::from_static(b"abc")));
        assert_eq!(take_frame(&mut pending).unwrap(), Some(Bytes::new()));
        assert!(pending.is_empty());
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let mut pending = BytesMut::new();
        pending.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(take_frame(&mut pending), Err(TransportError::FrameTooLarge { .. })));
    }

    #[test]
    fn missing_socket_is_refused() {
        let config = ClientConfig {
            request_endpoint: PathBuf::from("/nonexistent/ambilink_reqrep"),
            ..Default::default()
        };
        let result = UnixTransport::from_config(&config).dial_requests();
        assert!(matches!(result, Err(TransportError::ConnectionRefused(_))));
    }

    #[test]
    fn request_round_trip_over_socket_pair() {
        let dir = std::env::temp_dir().join(format!("ambilink-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("reqrep");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).unwrap();
            let mut request = vec![0u8; u32::from_le_bytes(prefix) as usize];
            stream.read_exact(&mut request).unwrap();
            request.reverse();
            stream.write_all(&encode_frame(&request).unwrap()).unwrap();
        });

        let config = ClientConfig { request_endpoint: path.clone(), ..Default::default() };
        let mut channel = UnixTransport::from_config(&config).dial_requests().unwrap();
        let reply = channel.request(&[1, 2, 3]).unwrap();
        assert_eq!(&reply[..], &[3, 2, 1]);

        server.join().unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
