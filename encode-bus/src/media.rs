//! Codec, container and quality enumerations.
//!
//! Everything here is a pure mapping: names and the codec/container
//! compatibility table are `match` expressions, never process-wide state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Raw,
    Mpeg4,
    H264,
    OpenH264,
    Vp8,
    Vp9,
    Dirac,
    Av1,
    MotionJpeg,
    Mpeg1,
    Hevc,
}

impl Codec {
    pub const ALL: [Codec; 11] = [
        Codec::Raw,
        Codec::Mpeg4,
        Codec::H264,
        Codec::OpenH264,
        Codec::Vp8,
        Codec::Vp9,
        Codec::Dirac,
        Codec::Av1,
        Codec::MotionJpeg,
        Codec::Mpeg1,
        Codec::Hevc,
    ];

    pub fn all() -> Vec<Codec> {
        Self::ALL.to_vec()
    }

    /// Encoder name as FFmpeg knows it.
    pub fn name(&self) -> &'static str {
        match self {
            Codec::Raw => "rawvideo",
            Codec::Mpeg4 => "mpeg4",
            Codec::H264 => "libx264",
            Codec::OpenH264 => "libopenh264",
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
            Codec::Dirac => "dirac",
            Codec::Av1 => "av1",
            Codec::MotionJpeg => "mjpeg",
            Codec::Mpeg1 => "mpeg1video",
            Codec::Hevc => "hevc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Raw,
    WebM,
    Matroska,
    Flash,
    F4v,
    Swf,
    Vob,
    Ogg,
    Dirac,
    Gif,
    Avi,
    QuickTime,
    RealMedia,
    Mpeg4,
    Mpeg1,
    Mpeg2,
    M4v,
    ThreeGpp,
    ThreeGpp2,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 19] = [
        ContainerFormat::Raw,
        ContainerFormat::WebM,
        ContainerFormat::Matroska,
        ContainerFormat::Flash,
        ContainerFormat::F4v,
        ContainerFormat::Swf,
        ContainerFormat::Vob,
        ContainerFormat::Ogg,
        ContainerFormat::Dirac,
        ContainerFormat::Gif,
        ContainerFormat::Avi,
        ContainerFormat::QuickTime,
        ContainerFormat::RealMedia,
        ContainerFormat::Mpeg4,
        ContainerFormat::Mpeg1,
        ContainerFormat::Mpeg2,
        ContainerFormat::M4v,
        ContainerFormat::ThreeGpp,
        ContainerFormat::ThreeGpp2,
    ];

    pub fn all() -> Vec<ContainerFormat> {
        Self::ALL.to_vec()
    }

    /// Muxer short name as FFmpeg knows it.
    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Raw => "rawvideo",
            ContainerFormat::WebM => "webm",
            ContainerFormat::Matroska => "matroska",
            ContainerFormat::Flash => "flv",
            ContainerFormat::F4v => "f4v",
            ContainerFormat::Swf => "swf",
            ContainerFormat::Vob => "vob",
            ContainerFormat::Ogg => "ogg",
            ContainerFormat::Dirac => "dirac",
            ContainerFormat::Gif => "gif",
            ContainerFormat::Avi => "avi",
            ContainerFormat::QuickTime => "mov",
            ContainerFormat::RealMedia => "rm",
            ContainerFormat::Mpeg4 => "mp4",
            ContainerFormat::Mpeg1 => "mpeg",
            ContainerFormat::Mpeg2 => "mpeg2video",
            ContainerFormat::M4v => "m4v",
            ContainerFormat::ThreeGpp => "3gp",
            ContainerFormat::ThreeGpp2 => "3g2",
        }
    }

    /// Whether this container can carry a stream produced by `codec`.
    pub fn supports(&self, codec: Codec) -> bool {
        use Codec::*;
        match self {
            ContainerFormat::Raw | ContainerFormat::Matroska => true,
            ContainerFormat::WebM => matches!(codec, Vp8 | Vp9 | Av1),
            ContainerFormat::Flash | ContainerFormat::F4v => matches!(codec, H264 | OpenH264),
            ContainerFormat::Swf => matches!(codec, MotionJpeg),
            ContainerFormat::Vob | ContainerFormat::Mpeg1 | ContainerFormat::Mpeg2 => {
                matches!(codec, Mpeg1)
            }
            ContainerFormat::Ogg => matches!(codec, Vp8 | Dirac),
            ContainerFormat::Dirac => matches!(codec, Dirac),
            ContainerFormat::Gif | ContainerFormat::RealMedia => false,
            ContainerFormat::Avi => !matches!(codec, Av1 | Dirac),
            ContainerFormat::QuickTime => !matches!(codec, Vp8),
            ContainerFormat::Mpeg4 => !matches!(codec, Raw | Vp8 | Dirac),
            ContainerFormat::M4v => matches!(codec, Mpeg4),
            ContainerFormat::ThreeGpp | ContainerFormat::ThreeGpp2 => {
                matches!(codec, Mpeg4 | H264 | OpenH264 | Hevc)
            }
        }
    }
}

/// Codecs that `format` can carry, in declaration order.
pub fn supported_codecs(format: ContainerFormat) -> Vec<Codec> {
    Codec::ALL
        .iter()
        .copied()
        .filter(|codec| format.supports(*codec))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Quality {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

const LOWEST_BPP: f64 = 0.05;
const HIGHEST_BPP: f64 = 0.15;

impl Quality {
    /// Position on the linear quality scale, 0.0 for `VeryLow` to 1.0 for `VeryHigh`.
    fn level(&self) -> f64 {
        match self {
            Quality::VeryLow => 0.0,
            Quality::Low => 0.25,
            Quality::Medium => 0.5,
            Quality::High => 0.75,
            Quality::VeryHigh => 1.0,
        }
    }

    /// Fraction of the encoder's maximum lambda to use as global quality.
    /// `VeryHigh` maps to 0 (best), `VeryLow` to 1 (worst).
    pub fn global_quality_scale(&self) -> f64 {
        1.0 - self.level()
    }
}

pub fn bits_per_pixel(quality: Quality) -> f64 {
    match quality {
        Quality::VeryLow => LOWEST_BPP,
        Quality::VeryHigh => HIGHEST_BPP,
        _ => LOWEST_BPP + (HIGHEST_BPP - LOWEST_BPP) * quality.level(),
    }
}

pub fn calc_bitrate(width: u32, height: u32, frame_rate: u32, bits_per_pixel: f64) -> u64 {
    (width as f64 * height as f64 * frame_rate as f64 * bits_per_pixel) as u64
}
