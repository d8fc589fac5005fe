use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Index of one output frame. Assigned once, never reused, never skipped.
pub type FrameIndex = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// One tick per output frame at `frame_rate` frames per second.
    pub fn frame_time_base(frame_rate: u32) -> Self {
        Self::new(1, frame_rate as i32)
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// Encoded output of one frame, tagged with the index it was produced from.
#[derive(Clone, Debug)]
pub struct EncodedPacket {
    frame_index: FrameIndex,
    data: Bytes,
    pts: i64,
    dts: i64,
    duration: i64,
    time_base: Rational,
    is_key: bool,
}

impl EncodedPacket {
    pub fn new(data: impl Into<Bytes>, time_base: Rational) -> Self {
        Self {
            frame_index: 0,
            data: data.into(),
            pts: 0,
            dts: 0,
            duration: 0,
            time_base,
            is_key: false,
        }
    }

    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Tags the packet with `frame_index` and places it on the output tick
    /// grid: pts = dts = index, one tick long.
    pub fn stamp(&mut self, frame_index: FrameIndex) {
        self.frame_index = frame_index;
        self.pts = frame_index as i64;
        self.dts = frame_index as i64;
        self.duration = 1;
    }

    pub fn frame_index(&self) -> FrameIndex {
        self.frame_index
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn dts(&self) -> i64 {
        self.dts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> Bytes {
        self.data.clone()
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_uses_frame_ticks() {
        let mut packet = EncodedPacket::new(vec![1u8, 2, 3], Rational::frame_time_base(30));
        packet.stamp(42);
        assert_eq!(packet.frame_index(), 42);
        assert_eq!(packet.pts(), 42);
        assert_eq!(packet.dts(), 42);
        assert_eq!(packet.duration(), 1);
        assert_eq!(packet.time_base(), Rational::new(1, 30));
        assert_eq!(packet.size(), 3);
    }
}
