//! Constant frame rate recording: paces irregular captures onto a fixed
//! output rate, encodes them on parallel workers and muxes the packets in
//! frame order.

/// Registers the FFmpeg codecs and formats. Call once at startup before
/// opening an output with [`ffmpeg::FfmpegBackend`].
#[cfg(feature = "ffmpeg")]
pub fn init() -> Result<()> {
    ffmpeg_next::init().map_err(RecorderError::from)
}

pub mod backend;
pub mod encoder;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod file;
pub mod frame;
pub mod media;
pub mod output;
pub mod pacer;
pub mod packet;
pub mod recorder;
pub mod selector;
pub mod settings;
pub mod sink;
pub mod worker;

#[cfg(test)]
mod test_util;

pub use backend::{MediaBackend, OpenedOutput, RawBackend};
pub use error::{RecorderError, Result};
pub use frame::{ImageBuffer, PixelFormat, SharedImage};
pub use media::{Codec, ContainerFormat, Quality};
pub use packet::{EncodedPacket, FrameIndex};
pub use recorder::{Recorder, RecordingState, RecordingStats};
pub use settings::EncodingSettings;
