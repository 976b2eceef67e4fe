//! Byte reader and writer over a single message buffer.
//!
//! Values are copied in their native in-memory layout through `zerocopy`, so
//! any type that is plain old data on both ends (integers, floats, `repr(C)`
//! structs of those) can cross the wire without a hand-written codec.

use bytes::{Buf, Bytes, BytesMut};
use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::errors::CodecError;

/// Append-only message builder.
///
/// Finalized with [`Writer::finish`], which consumes the writer so the bytes
/// cannot be modified after they are handed to the transport.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: BytesMut::with_capacity(capacity) }
    }

    /// Append a fixed-width value in native byte order.
    pub fn write<T: IntoBytes + Immutable>(&mut self, value: T) -> &mut Self {
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Append the UTF-8 bytes of `s` without a length prefix.
    pub fn write_str(&mut self, s: &str) -> &mut Self {
        self.write_bytes(s.as_bytes())
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finalize the message.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounds-checked cursor over one inbound message.
///
/// Owns the message buffer for its lifetime. A failed read consumes nothing,
/// so callers can report the exact position of a short message.
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
}

impl Reader {
    /// Take ownership of a received message.
    pub fn new(message: Bytes) -> Self {
        Self { buf: message }
    }

    /// Read a fixed-width value in native byte order.
    pub fn read<T: FromBytes>(&mut self) -> Result<T, CodecError> {
        let requested = size_of::<T>();
        let remaining = self.buf.len();
        let (value, _) = T::read_from_prefix(&self.buf[..])
            .map_err(|_| CodecError::OutOfRange { requested, remaining })?;
        self.buf.advance(requested);
        Ok(value)
    }

    /// Read exactly `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes, CodecError> {
        if n > self.buf.len() {
            return Err(CodecError::OutOfRange { requested: n, remaining: self.buf.len() });
        }
        Ok(self.buf.split_to(n))
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Returns true once every byte has been read.
    pub fn is_exhausted(&self) -> bool {
        self.buf.is_empty()
    }
}
