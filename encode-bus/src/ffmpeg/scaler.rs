use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context, Flags};

use crate::error::Result;

/// swscale context converting packed RGBA input into the encoder's layout.
pub struct Scaler {
    context: Context,
}

impl Scaler {
    pub fn new(src: Pixel, dst: Pixel, width: u32, height: u32) -> Result<Self> {
        let context = Context::get(src, width, height, dst, width, height, Flags::BILINEAR)?;
        Ok(Self { context })
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}
