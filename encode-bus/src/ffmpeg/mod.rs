//! libav based encoders and muxers, enabled with the `ffmpeg` feature.

mod encoder;
mod output;
mod scaler;

pub use encoder::{FfmpegEncoder, pixel_format_for_codec};
pub use output::FfmpegMuxer;

use crate::{
    backend::{MediaBackend, OpenedOutput},
    encoder::VideoEncoder,
    error::{RecorderError, Result},
    file::FileIo,
    media::{Codec, ContainerFormat},
    settings::EncodingSettings,
};

/// Backend driving libavcodec / libavformat. Call [`crate::init`] once
/// before opening the first output.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, format: ContainerFormat, codec: Codec) -> bool {
        format.supports(codec) && ffmpeg_next::encoder::find_by_name(codec.name()).is_some()
    }

    fn open(
        &self,
        output: &str,
        settings: &EncodingSettings,
        file: Option<FileIo>,
    ) -> Result<OpenedOutput> {
        if file.is_some() {
            return Err(RecorderError::InvalidSettings(
                "the ffmpeg backend opens outputs by name; custom file interfaces are not supported"
                    .to_string(),
            ));
        }

        let mut octx = ffmpeg_next::format::output_as(&output, settings.format.name())?;
        let global_header = octx
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let encoders = (0..settings.worker_count)
            .map(|_| FfmpegEncoder::new(settings, global_header))
            .collect::<Result<Vec<_>>>()?;
        let first = encoders.first().ok_or(RecorderError::NoWorkersAvailable)?;

        let codec = ffmpeg_next::encoder::find_by_name(settings.codec.name()).ok_or(
            RecorderError::UnsupportedCodec {
                codec: settings.codec,
                format: settings.format,
            },
        )?;
        let stream_index = {
            let mut ost = octx.add_stream(codec)?;
            ost.set_parameters(first.context());
            ost.set_time_base(encoder::to_av_rational(settings.time_base()));
            ost.index()
        };
        log::info!(
            "ffmpeg output opened: {} as {} ({} encoders)",
            output,
            settings.format.name(),
            encoders.len()
        );

        Ok(OpenedOutput {
            muxer: Box::new(FfmpegMuxer::new(octx, stream_index)),
            encoders: encoders
                .into_iter()
                .map(|e| Box::new(e) as Box<dyn VideoEncoder>)
                .collect(),
        })
    }
}
