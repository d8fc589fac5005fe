use thiserror::Error;

use crate::media::{Codec, ContainerFormat};
use crate::packet::FrameIndex;

/// Errors raised by a recording session and the threads it drives.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("codec '{}' is not supported by output format '{}'", .codec.name(), .format.name())]
    UnsupportedCodec {
        codec: Codec,
        format: ContainerFormat,
    },

    #[error("no encode workers have been allocated")]
    NoWorkersAvailable,

    #[error("invalid encoding settings: {0}")]
    InvalidSettings(String),

    #[error("unable to open output '{name}': {source}")]
    OpenOutput {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame {frame}: data size {actual} does not match expected size {expected}")]
    SizeMismatch {
        frame: FrameIndex,
        expected: usize,
        actual: usize,
    },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("mux error: {0}")]
    Mux(String),

    #[error("packet for frame {0} was already delivered")]
    DuplicatePacket(FrameIndex),

    #[error("packet writer has stopped after an earlier error")]
    WriterFailed,

    #[error("not recording")]
    NotRecording,

    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    #[cfg(feature = "ffmpeg")]
    #[error("ffmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),
}

impl RecorderError {
    /// Configuration faults are logic errors and never worth retrying.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RecorderError::UnsupportedCodec { .. }
                | RecorderError::NoWorkersAvailable
                | RecorderError::InvalidSettings(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_codec_names_both_sides() {
        let err = RecorderError::UnsupportedCodec {
            codec: Codec::Vp9,
            format: ContainerFormat::Avi,
        };
        let msg = err.to_string();
        assert!(msg.contains("vp9"));
        assert!(msg.contains("avi"));
        assert!(err.is_configuration());
    }

    #[test]
    fn size_mismatch_display() {
        let err = RecorderError::SizeMismatch {
            frame: 7,
            expected: 16,
            actual: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("frame 7"));
        assert!(msg.contains("16"));
        assert!(msg.contains("12"));
        assert!(!err.is_configuration());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = RecorderError::from(io_err);
        assert!(err.to_string().contains("file missing"));
    }
}
