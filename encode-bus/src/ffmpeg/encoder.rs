use ffmpeg_next::{Dictionary, format::Pixel};

use crate::{
    encoder::VideoEncoder,
    error::{RecorderError, Result},
    frame::{ImageBuffer, PixelFormat},
    media::Codec,
    packet::{EncodedPacket, FrameIndex, Rational},
    settings::EncodingSettings,
};

use super::scaler::Scaler;

/// Largest lambda accepted as global quality (FF_LAMBDA_MAX).
const LAMBDA_MAX: f64 = (256 * 128 - 1) as f64;
const CODEC_THREADS: usize = 4;

/// Layout the codec is fed after scaling.
pub fn pixel_format_for_codec(codec: Codec) -> Pixel {
    match codec {
        Codec::Raw => Pixel::RGBA,
        // full range yuv, the only 4:2:0 layout mjpeg accepts
        Codec::MotionJpeg => Pixel::YUVJ420P,
        _ => Pixel::YUV420P,
    }
}

fn codec_threads(codec: Codec) -> usize {
    match codec {
        Codec::MotionJpeg => 1,
        _ => CODEC_THREADS,
    }
}

pub(crate) fn to_av_rational(rational: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(rational.num, rational.den)
}

/// Opens a video encoder for `settings`. `global_header` must be set when
/// the container stores codec headers out of band.
pub(crate) fn open_video_encoder(
    settings: &EncodingSettings,
    global_header: bool,
) -> Result<ffmpeg_next::codec::encoder::Video> {
    let name = settings.codec.name();
    let codec = ffmpeg_next::encoder::find_by_name(name).ok_or_else(|| {
        RecorderError::Encode(format!("encoder not available in this ffmpeg build: {}", name))
    })?;

    let context = ffmpeg_next::codec::Context::new_with_codec(codec);
    let mut encoder = context.encoder().video()?;
    encoder.set_width(settings.width);
    encoder.set_height(settings.height);
    encoder.set_format(pixel_format_for_codec(settings.codec));
    encoder.set_frame_rate(Some(ffmpeg_next::Rational::new(settings.frame_rate as i32, 1)));
    encoder.set_time_base(to_av_rational(settings.time_base()));
    encoder.set_bit_rate(settings.resolved_bit_rate() as usize);
    encoder.set_quality((LAMBDA_MAX * settings.quality.global_quality_scale()) as usize);
    if global_header {
        encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
    }

    let mut opts = Dictionary::new();
    opts.set("preset", "ultrafast");
    opts.set("tune", "zerolatency");
    opts.set("threads", &codec_threads(settings.codec).to_string());
    let encoder = encoder.open_with(opts)?;
    log::info!(
        "encoder opened: {} {}x{} @ {} fps, {} bps",
        name,
        settings.width,
        settings.height,
        settings.frame_rate,
        settings.resolved_bit_rate()
    );
    Ok(encoder)
}

/// One libavcodec context, owned by a single encode worker.
pub struct FfmpegEncoder {
    inner: ffmpeg_next::codec::encoder::Video,
    scaler: Option<Scaler>,
    source: ffmpeg_next::frame::Video,
    converted: ffmpeg_next::frame::Video,
    time_base: Rational,
    bit_rate: u64,
}

impl FfmpegEncoder {
    pub fn new(settings: &EncodingSettings, global_header: bool) -> Result<Self> {
        let inner = open_video_encoder(settings, global_header)?;
        let target = inner.format();
        let scaler = match target {
            Pixel::RGBA => None,
            _ => Some(Scaler::new(
                Pixel::RGBA,
                target,
                settings.width,
                settings.height,
            )?),
        };
        Ok(Self {
            inner,
            scaler,
            source: ffmpeg_next::frame::Video::new(Pixel::RGBA, settings.width, settings.height),
            converted: ffmpeg_next::frame::Video::empty(),
            time_base: settings.time_base(),
            bit_rate: settings.resolved_bit_rate(),
        })
    }

    pub(crate) fn context(&self) -> &ffmpeg_next::codec::encoder::Video {
        &self.inner
    }

    fn fill_source(&mut self, frame: &ImageBuffer) {
        let row = frame.width() as usize * PixelFormat::Rgba8.bytes_per_pixel();
        let stride = self.source.stride(0);
        let dst = self.source.data_mut(0);
        for (y, src_row) in frame.data().chunks_exact(row).enumerate() {
            let offset = y * stride;
            dst[offset..offset + row].copy_from_slice(src_row);
        }
    }
}

// the codec context is only ever touched by the worker that owns it
unsafe impl Send for FfmpegEncoder {}

impl VideoEncoder for FfmpegEncoder {
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
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
        self.fill_source(frame);
        let pts = Some(frame_index as i64);
        match self.scaler.as_mut() {
            Some(scaler) => {
                scaler.run(&self.source, &mut self.converted)?;
                self.converted.set_pts(pts);
                self.inner.send_frame(&self.converted)?;
            }
            None => {
                self.source.set_pts(pts);
                self.inner.send_frame(&self.source)?;
            }
        }
        let packets = self.receive_packets()?;
        if packets.is_empty() {
            log::trace!("encoder buffered frame {}", frame_index);
        }
        Ok(packets)
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> {
        self.inner.send_eof()?;
        let packets = self.receive_packets()?;
        log::debug!("encoder flushed {} packets", packets.len());
        Ok(packets)
    }
}

impl FfmpegEncoder {
    /// Everything the codec has ready, until it asks for more input or
    /// reaches the end of the stream.
    fn receive_packets(&mut self) -> Result<Vec<EncodedPacket>> {
        let mut packets = Vec::new();
        let mut packet = ffmpeg_next::Packet::empty();
        loop {
            match self.inner.receive_packet(&mut packet) {
                Ok(()) => {
                    let data = packet.data().map(|d| d.to_vec()).unwrap_or_default();
                    packets.push(EncodedPacket::new(data, self.time_base).with_key(packet.is_key()));
                }
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN =>
                {
                    break;
                }
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(packets)
    }
}
