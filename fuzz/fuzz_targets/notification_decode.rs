//! Fuzz target for push notification decoding
//!
//! Decodes a notification header, then the body its kind announces. The
//! subscription thread runs exactly this path on untrusted bytes, so it
//! must never panic.

#![no_main]

use ambilink_proto::{CameraSpacePosition, NotificationHeader, NotificationKind, Reader, payloads};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = Reader::new(Bytes::copy_from_slice(data));
    let Ok(header) = NotificationHeader::decode(&mut reader) else {
        return;
    };

    match header.kind {
        NotificationKind::PositionUpdated => {
            let _ = reader.read::<CameraSpacePosition>();
        },
        NotificationKind::Renamed => {
            let _ = payloads::decode_object_name(&mut reader);
        },
        NotificationKind::Deleted => {},
    }
});
