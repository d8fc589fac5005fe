use crate::{
    error::{RecorderError, Result},
    frame::{ImageBuffer, PixelFormat},
    packet::{EncodedPacket, FrameIndex, Rational},
    settings::EncodingSettings,
};

/// Encoder capability driven by one encode worker.
///
/// Frames handed to [`VideoEncoder::encode`] are already in
/// [`VideoEncoder::input_format`] at the encoder's resolution.
///
/// An encoder may hold frames back: each call returns the packets that
/// became ready, oldest first, and [`VideoEncoder::flush`] returns the rest
/// once no more frames will come. Packets must come out in the order their
/// frames went in. The worker restamps them onto the output tick grid.
pub trait VideoEncoder: Send {
    fn input_format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn time_base(&self) -> Rational;
    fn bit_rate(&self) -> u64;
    fn encode(
        &mut self,
        frame: &ImageBuffer,
        frame_index: FrameIndex,
    ) -> Result<Vec<EncodedPacket>>;

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> {
        Ok(Vec::new())
    }
}

/// Pass-through encoder for [`crate::media::Codec::Raw`]: the packet payload
/// is the RGBA frame itself.
pub struct RawEncoder {
    width: u32,
    height: u32,
    time_base: Rational,
    bit_rate: u64,
}

impl RawEncoder {
    pub fn new(settings: &EncodingSettings) -> Self {
        Self {
            width: settings.width,
            height: settings.height,
            time_base: settings.time_base(),
            bit_rate: settings.resolved_bit_rate(),
        }
    }
}

impl VideoEncoder for RawEncoder {
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn bit_rate(&self) -> u64 {
        self.bit_rate
    }

    fn encode(
        &mut self,
        frame: &ImageBuffer,
        frame_index: FrameIndex,
    ) -> Result<Vec<EncodedPacket>> {
        if frame.format() != PixelFormat::Rgba8 {
            return Err(RecorderError::Encode(format!(
                "raw encoder expects rgba8 input, got {:?}",
                frame.format()
            )));
        }
        log::trace!("raw encode frame {} ({} bytes)", frame_index, frame.size());
        Ok(vec![
            EncodedPacket::new(frame.bytes(), self.time_base).with_key(true),
        ])
    }
}
