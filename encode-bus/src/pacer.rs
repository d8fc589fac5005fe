//! Frame pacing: variable-rate input timestamps to a fixed output rate.
//!
//! Each call measures how many whole output ticks passed since the previous
//! accepted timestamp. The fractional remainder is folded back into the
//! stored timestamp so it counts toward the next call and the long-run rate
//! does not drift.

use std::ops::Range;

use crate::packet::FrameIndex;

/// Fraction of a tick treated as float noise. Input stamped at 0.0333s for a
/// 30 fps output lands on the tick rather than just short of it.
pub const TICK_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct FramePacer {
    frame_rate: f64,
    previous_timestamp: f64,
    next_index: FrameIndex,
    skipped: u64,
}

impl FramePacer {
    pub fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate: frame_rate as f64,
            previous_timestamp: 0.0,
            next_index: 0,
            skipped: 0,
        }
    }

    /// Indices of the output frames `timestamp` (seconds since the start of
    /// the recording) should be encoded as. Empty when the timestamp falls in
    /// an already emitted tick or goes backwards; the first finite call always
    /// yields at least one frame.
    pub fn schedule(&mut self, timestamp: f64) -> Range<FrameIndex> {
        let is_first = self.next_index == 0;
        let dt = timestamp - self.previous_timestamp;

        if !timestamp.is_finite() {
            return self.skip(timestamp, "is not finite");
        }
        if dt < 0.0 && !is_first {
            return self.skip(timestamp, "is before the previous frame");
        }

        let dt_frames = dt * self.frame_rate;
        let whole_frames = (dt_frames + TICK_TOLERANCE).floor().max(0.0);
        if whole_frames == 0.0 && !is_first {
            // previous_timestamp stays put, the whole interval carries over
            self.skipped += 1;
            return self.next_index..self.next_index;
        }

        let count = (whole_frames as FrameIndex).max(1);
        let Some(end) = self.next_index.checked_add(count) else {
            return self.skip(timestamp, "is too far ahead");
        };
        let carry = dt_frames - whole_frames;
        self.previous_timestamp = timestamp - carry / self.frame_rate;

        let start = self.next_index;
        self.next_index = end;
        start..end
    }

    fn skip(&mut self, timestamp: f64, reason: &str) -> Range<FrameIndex> {
        self.skipped += 1;
        log::debug!(
            "timestamp {:.6}s {} (previous {:.6}s), frame skipped",
            timestamp,
            reason,
            self.previous_timestamp
        );
        self.next_index..self.next_index
    }

    /// Index the next scheduled frame will receive; also the number of
    /// frames scheduled so far.
    pub fn next_index(&self) -> FrameIndex {
        self.next_index
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pacer: &mut FramePacer, timestamps: &[f64]) -> Vec<u64> {
        timestamps
            .iter()
            .map(|t| {
                let range = pacer.schedule(*t);
                range.end - range.start
            })
            .collect()
    }

    #[test]
    fn test_steady_input_yields_one_frame_each() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(counts(&mut pacer, &[0.0, 0.0333, 0.0667]), vec![1, 1, 1]);
        assert_eq!(pacer.next_index(), 3);
    }

    #[test]
    fn test_too_soon_is_skipped() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(counts(&mut pacer, &[0.0, 0.01]), vec![1, 0]);
        assert_eq!(pacer.skipped(), 1);
    }

    #[test]
    fn test_slow_source_repeats_frames() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(pacer.schedule(0.0), 0..1);
        assert_eq!(pacer.schedule(0.2), 1..7);
    }

    #[test]
    fn test_first_call_always_emits() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(pacer.schedule(0.0), 0..1);
        let mut pacer = FramePacer::new(30);
        assert_eq!(pacer.schedule(-1.0), 0..1);
    }

    #[test]
    fn test_duplicate_and_decreasing_timestamps() {
        let mut pacer = FramePacer::new(30);
        pacer.schedule(0.0);
        pacer.schedule(0.1);
        assert!(pacer.schedule(0.1).is_empty());
        assert!(pacer.schedule(0.05).is_empty());
        // going backwards does not move pacing state
        assert_eq!(pacer.schedule(0.1334), 4..5);
        assert_eq!(pacer.skipped(), 2);
    }

    #[test]
    fn test_sub_tick_first_frame_keeps_grid() {
        let mut pacer = FramePacer::new(30);
        assert_eq!(pacer.schedule(0.01), 0..1);
        assert_eq!(pacer.schedule(0.04), 1..2);
        assert_eq!(pacer.skipped(), 0);
    }

    #[test]
    fn test_unusable_timestamps_are_skipped() {
        let mut pacer = FramePacer::new(30);
        assert!(pacer.schedule(f64::NAN).is_empty());
        assert!(pacer.schedule(f64::INFINITY).is_empty());
        assert_eq!(pacer.schedule(0.0), 0..1);
        assert!(pacer.schedule(f64::INFINITY).is_empty());
        // would overflow the frame counter
        assert!(pacer.schedule(1e300).is_empty());
        assert_eq!(pacer.skipped(), 4);
        assert_eq!(pacer.schedule(1.0 / 30.0), 1..2);
    }

    #[test]
    fn test_indices_are_contiguous() {
        let mut pacer = FramePacer::new(24);
        let mut expected = 0;
        let mut t = 0.0;
        for step in 0..500 {
            // jittered source around 20 fps
            t += 0.05 + ((step * 7919) % 13) as f64 * 0.001;
            let range = pacer.schedule(t);
            assert_eq!(range.start, expected);
            expected = range.end;
        }
        assert_eq!(pacer.next_index(), expected);
    }

    #[test]
    fn test_remainder_carry_keeps_long_run_rate() {
        // 25 fps input into a 30 fps output
        let mut pacer = FramePacer::new(30);
        for i in 0..=250 {
            pacer.schedule(i as f64 / 25.0);
        }
        // 10 seconds at 30 fps, plus the first frame
        let total = pacer.next_index() as i64;
        assert!((total - 301).abs() <= 1, "total = {}", total);
    }
}
