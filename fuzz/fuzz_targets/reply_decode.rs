//! Fuzz target for reply decoding
//!
//! Feeds arbitrary bytes through every reply shape the client reads:
//! status check, object lists, subscribe ids, animation info and position
//! slices. Decoding must never panic; malformed input returns an error.

#![no_main]

use ambilink_proto::{AnimationInfo, ObjectId, Reader, check_reply_status, payloads};
use bytes::Bytes;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let message = Bytes::copy_from_slice(data);

    let mut reader = Reader::new(message.clone());
    if let Ok(status) = reader.read::<u8>() {
        let _ = check_reply_status(status, true);
        let _ = check_reply_status(status, false);
    }

    let _ = payloads::decode_object_list(&mut Reader::new(message.clone()));
    let _ = Reader::new(message.clone()).read::<ObjectId>();
    let _ = AnimationInfo::decode(&mut Reader::new(message.clone()));

    // Frame counts derived from the input exercise the length checks.
    let frames = data.first().copied().map_or(0, usize::from);
    let _ = payloads::decode_positions(&mut Reader::new(message), frames);
});
