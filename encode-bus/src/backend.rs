use std::fs::File;
use std::io::BufWriter;

use crate::{
    encoder::{RawEncoder, VideoEncoder},
    error::{RecorderError, Result},
    file::FileIo,
    media::{Codec, ContainerFormat},
    output::{Muxer, RawMuxer},
    settings::EncodingSettings,
};

/// Muxer plus one encoder per configured worker, ready for a recording.
pub struct OpenedOutput {
    pub muxer: Box<dyn Muxer>,
    pub encoders: Vec<Box<dyn VideoEncoder>>,
}

/// Factory for the external encode and mux capabilities.
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, format: ContainerFormat, codec: Codec) -> bool {
        format.supports(codec)
    }

    /// Opens `output` (through `file` when the caller supplied one) and
    /// `settings.worker_count` encoders. The header is written by the session.
    fn open(
        &self,
        output: &str,
        settings: &EncodingSettings,
        file: Option<FileIo>,
    ) -> Result<OpenedOutput>;
}

/// Raw RGBA frames in a headerless container. Needs no codec library.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBackend;

impl MediaBackend for RawBackend {
    fn name(&self) -> &str {
        "raw"
    }

    fn supports(&self, format: ContainerFormat, codec: Codec) -> bool {
        format == ContainerFormat::Raw && codec == Codec::Raw
    }

    fn open(
        &self,
        output: &str,
        settings: &EncodingSettings,
        file: Option<FileIo>,
    ) -> Result<OpenedOutput> {
        let muxer: Box<dyn Muxer> = match file {
            Some(io) => Box::new(RawMuxer::new(io)),
            None => {
                let file = File::create(output).map_err(|source| RecorderError::OpenOutput {
                    name: output.to_string(),
                    source,
                })?;
                Box::new(RawMuxer::new(BufWriter::new(file)))
            }
        };
        let encoders = (0..settings.worker_count)
            .map(|_| Box::new(RawEncoder::new(settings)) as Box<dyn VideoEncoder>)
            .collect();
        log::info!(
            "raw output opened: {} ({}x{} @ {} fps, {} encoders)",
            output,
            settings.width,
            settings.height,
            settings.frame_rate,
            settings.worker_count
        );
        Ok(OpenedOutput { muxer, encoders })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_backend_supports_only_raw() {
        let backend = RawBackend;
        assert!(backend.supports(ContainerFormat::Raw, Codec::Raw));
        assert!(!backend.supports(ContainerFormat::Raw, Codec::H264));
        assert!(!backend.supports(ContainerFormat::Avi, Codec::Raw));
    }

    #[test]
    fn test_raw_backend_opens_one_encoder_per_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.raw");
        let settings = EncodingSettings {
            codec: Codec::Raw,
            format: ContainerFormat::Raw,
            worker_count: 3,
            ..Default::default()
        };
        let opened = RawBackend
            .open(path.to_str().unwrap(), &settings, None)
            .unwrap();
        assert_eq!(opened.encoders.len(), 3);
        assert!(path.exists());
    }

    #[test]
    fn test_raw_backend_reports_unopenable_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.raw");
        let settings = EncodingSettings {
            codec: Codec::Raw,
            format: ContainerFormat::Raw,
            ..Default::default()
        };
        let result = RawBackend.open(path.to_str().unwrap(), &settings, None);
        assert!(matches!(result, Err(RecorderError::OpenOutput { .. })));
    }
}
