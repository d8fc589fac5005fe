use serde::{Deserialize, Serialize};

use crate::error::{RecorderError, Result};
use crate::media::{Codec, ContainerFormat, Quality, bits_per_pixel, calc_bitrate};
use crate::packet::Rational;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncodingSettings {
    pub width: u32,
    pub height: u32,
    pub codec: Codec,
    pub format: ContainerFormat,
    /// Output frames per second.
    pub frame_rate: u32,
    /// bps; None = derive from `quality`
    pub bit_rate: Option<u64>,
    pub quality: Quality,
    pub worker_count: usize,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            codec: Codec::Mpeg4,
            format: ContainerFormat::Avi,
            frame_rate: 60,
            bit_rate: None,
            quality: Quality::VeryHigh,
            // more than one worker needs a codec that tolerates parallel
            // per-frame contexts
            worker_count: 1,
        }
    }
}

impl EncodingSettings {
    pub fn resolved_bit_rate(&self) -> u64 {
        match self.bit_rate {
            Some(bit_rate) => bit_rate,
            None => calc_bitrate(
                self.width,
                self.height,
                self.frame_rate,
                bits_per_pixel(self.quality),
            ),
        }
    }

    pub fn time_base(&self) -> Rational {
        Rational::frame_time_base(self.frame_rate)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::InvalidSettings(format!(
                "resolution must be > 0, got {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate == 0 || self.frame_rate > i32::MAX as u32 {
            return Err(RecorderError::InvalidSettings(format!(
                "invalid frame rate {}",
                self.frame_rate
            )));
        }
        if self.worker_count == 0 {
            return Err(RecorderError::NoWorkersAvailable);
        }
        if !self.format.supports(self.codec) {
            return Err(RecorderError::UnsupportedCodec {
                codec: self.codec,
                format: self.format,
            });
        }
        Ok(())
    }
}
