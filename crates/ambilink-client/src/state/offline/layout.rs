//! Slice arithmetic for an animation of known length.

use std::time::Duration;

/// How an animation's frames are split into fetchable slices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceLayout {
    frame_count: u64,
    fps: f32,
    frames_per_slice: u64,
}

impl SliceLayout {
    /// Layout for `frame_count` frames at `fps`, `frames_per_slice` per slice.
    pub fn new(frame_count: u64, fps: f32, frames_per_slice: u64) -> Self {
        Self { frame_count, fps, frames_per_slice: frames_per_slice.max(1) }
    }

    /// Total frames in the animation.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Playback rate.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Frames in every slice but the last.
    pub fn frames_per_slice(&self) -> u64 {
        self.frames_per_slice
    }

    /// Number of slices covering the animation.
    pub fn num_slices(&self) -> usize {
        self.frame_count.div_ceil(self.frames_per_slice) as usize
    }

    /// Frames in the last slice; a full slice when the count divides evenly.
    pub fn last_slice_frames(&self) -> u64 {
        match self.frame_count % self.frames_per_slice {
            0 if self.frame_count == 0 => 0,
            0 => self.frames_per_slice,
            rest => rest,
        }
    }

    /// Playback time covered by one full slice.
    ///
    /// Saturates at [`Duration::MAX`] for frame rates too small to express.
    pub fn slice_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.frames_per_slice as f64 / f64::from(self.fps))
            .unwrap_or(Duration::MAX)
    }

    /// First and last (inclusive) frame of slice `index`.
    pub fn frame_range(&self, index: usize) -> (u64, u64) {
        let first = (index as u64).saturating_mul(self.frames_per_slice);
        let end = first.saturating_add(self.frames_per_slice).min(self.frame_count);
        (first, end.saturating_sub(1))
    }

    /// Number of frames in slice `index`.
    pub fn frames_in_slice(&self, index: usize) -> usize {
        let (first, last) = self.frame_range(index);
        (last + 1).saturating_sub(first) as usize
    }

    /// Slice and in-slice frame shown at `seconds` of playback.
    ///
    /// Times past the end clamp to the final frame, negative times to the
    /// first. Returns `None` for an empty animation.
    pub fn locate(&self, seconds: f64) -> Option<(usize, usize)> {
        let last_frame = self.frame_count.checked_sub(1)?;
        let frame = if seconds > 0.0 { (seconds * f64::from(self.fps)).floor() as u64 } else { 0 };
        let frame = frame.min(last_frame);
        Some(((frame / self.frames_per_slice) as usize, (frame % self.frames_per_slice) as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_last_slice() {
        let layout = SliceLayout::new(875, 24.0, 250);
        assert_eq!(layout.num_slices(), 4);
        assert_eq!(layout.last_slice_frames(), 125);
        assert_eq!(layout.frame_range(3), (750, 874));
        assert_eq!(layout.frames_in_slice(3), 125);
    }

    #[test]
    fn full_last_slice() {
        let layout = SliceLayout::new(1000, 24.0, 250);
        assert_eq!(layout.num_slices(), 4);
        assert_eq!(layout.last_slice_frames(), 250);
        assert_eq!(layout.frame_range(3), (750, 999));
    }

    #[test]
    fn empty_animation() {
        let layout = SliceLayout::new(0, 24.0, 250);
        assert_eq!(layout.num_slices(), 0);
        assert_eq!(layout.last_slice_frames(), 0);
        assert_eq!(layout.locate(1.0), None);
    }

    #[test]
    fn locate_splits_global_frame() {
        let layout = SliceLayout::new(875, 25.0, 250);
        assert_eq!(layout.locate(0.0), Some((0, 0)));
        assert_eq!(layout.locate(9.99), Some((0, 249)));
        assert_eq!(layout.locate(10.0), Some((1, 0)));
        assert_eq!(layout.locate(31.0), Some((3, 25)));
    }

    #[test]
    fn locate_clamps_out_of_range_times() {
        let layout = SliceLayout::new(875, 25.0, 250);
        assert_eq!(layout.locate(3600.0), Some((3, 124)));
        assert_eq!(layout.locate(f64::INFINITY), Some((3, 124)));
        assert_eq!(layout.locate(-5.0), Some((0, 0)));
        assert_eq!(layout.locate(f64::NAN), Some((0, 0)));
    }

    #[test]
    fn slice_duration_follows_fps() {
        let layout = SliceLayout::new(1000, 25.0, 250);
        assert_eq!(layout.slice_duration(), Duration::from_secs(10));

        let crawling = SliceLayout::new(1000, f32::MIN_POSITIVE, 250);
        assert_eq!(crawling.slice_duration(), Duration::MAX);
    }

    #[test]
    fn frame_range_saturates_near_the_end_of_u64() {
        let layout = SliceLayout::new(u64::MAX, 24.0, 250);
        let last = layout.num_slices() - 1;
        assert_eq!(layout.frame_range(last), (last as u64 * 250, u64::MAX - 1));
        assert_eq!(layout.frame_range(usize::MAX).1, u64::MAX - 1);
    }
}
