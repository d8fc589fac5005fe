use crate::{
    error::{RecorderError, Result},
    output::Muxer,
    packet::EncodedPacket,
};

use super::encoder::to_av_rational;

/// libavformat output with a single video stream.
pub struct FfmpegMuxer {
    inner: ffmpeg_next::format::context::Output,
    stream_index: usize,
    have_written_header: bool,
    have_written_trailer: bool,
}

impl FfmpegMuxer {
    pub fn new(inner: ffmpeg_next::format::context::Output, stream_index: usize) -> Self {
        Self {
            inner,
            stream_index,
            have_written_header: false,
            have_written_trailer: false,
        }
    }

    fn stream_time_base(&self) -> Result<ffmpeg_next::Rational> {
        self.inner
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| RecorderError::Mux(format!("stream {} not found", self.stream_index)))
    }
}

// written from the packet writer thread only
unsafe impl Send for FfmpegMuxer {}

impl Muxer for FfmpegMuxer {
    fn write_header(&mut self) -> Result<()> {
        if !self.have_written_header {
            self.inner.write_header()?;
            self.have_written_header = true;
        }
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        if !self.have_written_header {
            self.write_header()?;
        }
        if packet.is_empty() {
            return Ok(());
        }

        let mut p = ffmpeg_next::Packet::copy(&packet.data());
        p.set_pts(Some(packet.pts()));
        p.set_dts(Some(packet.dts()));
        p.set_duration(packet.duration());
        p.set_stream(self.stream_index);
        p.set_position(-1);
        if packet.is_key() {
            p.set_flags(ffmpeg_next::packet::Flags::KEY);
        }
        p.rescale_ts(to_av_rational(packet.time_base()), self.stream_time_base()?);
        p.write_interleaved(&mut self.inner)?;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        if self.have_written_header && !self.have_written_trailer {
            self.have_written_trailer = true;
            self.inner.write_trailer()?;
        }
        Ok(())
    }
}
