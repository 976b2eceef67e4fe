//! Property-based tests for the client's pure building blocks.
//!
//! Covers the command queue against a `VecDeque` model, slice arithmetic for
//! arbitrary animations, the resident-slice bound of the cache under
//! arbitrary reader movement, and the ranges of the direction math.

use std::collections::VecDeque;

use ambilink_client::{
    Command, CommandQueue, DirectionWithDistance,
    geometry::direction_from_camera_space,
    state::offline::{SliceCache, SliceLayout},
};
use ambilink_proto::CameraSpacePosition;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum QueueOp {
    Push(Command),
    Pop,
}

fn arbitrary_command() -> impl Strategy<Value = Command> {
    prop_oneof![
        Just(Command::Connect),
        Just(Command::Unsubscribe),
        "[a-zA-Z]{0,8}".prop_map(Command::SubscribeToObject),
        Just(Command::UpdateObjectList),
        Just(Command::EnableRenderingMode),
        Just(Command::DisableRenderingMode),
    ]
}

fn arbitrary_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![arbitrary_command().prop_map(QueueOp::Push), Just(QueueOp::Pop)]
}

proptest! {
    #[test]
    fn prop_command_queue_matches_bounded_fifo(
        capacity in 1usize..16,
        ops in prop::collection::vec(arbitrary_op(), 0..200),
    ) {
        let queue = CommandQueue::new(capacity);
        let mut model = VecDeque::new();

        for op in ops {
            match op {
                QueueOp::Push(command) => {
                    let accepted = model.len() < capacity;
                    if accepted {
                        model.push_back(command.clone());
                    }
                    prop_assert_eq!(queue.push(command), accepted);
                },
                QueueOp::Pop => prop_assert_eq!(queue.pop(), model.pop_front()),
            }
            prop_assert_eq!(queue.len(), model.len());
        }
    }

    #[test]
    fn prop_slices_partition_the_animation(frames in 0u64..100_000, per_slice in 1u64..1000) {
        let layout = SliceLayout::new(frames, 24.0, per_slice);
        let mut expected_first = 0;
        let mut total = 0;

        for index in 0..layout.num_slices() {
            let (first, last) = layout.frame_range(index);
            prop_assert_eq!(first, expected_first);
            prop_assert!(last >= first);
            prop_assert!(layout.frames_in_slice(index) as u64 <= per_slice);
            expected_first = last + 1;
            total += layout.frames_in_slice(index) as u64;
        }

        prop_assert_eq!(total, frames);
        if frames > 0 {
            let last_index = layout.num_slices() - 1;
            prop_assert_eq!(layout.frames_in_slice(last_index) as u64, layout.last_slice_frames());
        }
    }

    #[test]
    fn prop_locate_stays_in_bounds(
        frames in 1u64..10_000,
        per_slice in 1u64..500,
        fps in 1.0f32..120.0,
        seconds in -100.0f64..10_000.0,
    ) {
        let layout = SliceLayout::new(frames, fps, per_slice);
        let (slice, frame) = layout.locate(seconds).unwrap();

        prop_assert!(slice < layout.num_slices());
        prop_assert!(frame < layout.frames_in_slice(slice));
    }

    #[test]
    fn prop_cache_respects_budget_for_monotonic_reader(
        slices in 1usize..64,
        max_cached in 1usize..8,
        steps in prop::collection::vec(0usize..3, 1..100),
    ) {
        let cache = SliceCache::new(slices, max_cached);
        let mut reading = 0;

        for step in steps {
            reading = (reading + step).min(slices - 1);
            cache.mark_being_read(reading);
            cache.evict_consumed();
            while cache.wants_fetch() {
                let index = cache.next_to_fetch();
                cache.store(index, vec![DirectionWithDistance::default(); 4].into_boxed_slice());
                cache.evict_consumed();
            }

            prop_assert!(cache.resident_count() <= max_cached);
            prop_assert!(cache.is_resident(reading));
        }
    }

    #[test]
    fn prop_direction_ranges(x in -1e3f32..1e3, y in -1e3f32..1e3, z in -1e3f32..1e3) {
        let sample = direction_from_camera_space(CameraSpacePosition::new(x, y, z));

        prop_assert!(sample.distance >= 0.0);
        prop_assert!((-180.0..=180.0).contains(&sample.direction.azimuth));
        prop_assert!((-90.0..=90.0).contains(&sample.direction.elevation));
        let expected = (x * x + y * y + z * z).sqrt();
        prop_assert!((sample.distance - expected).abs() <= expected * 1e-5 + 1e-6);
    }
}
