//! Recording session: paces incoming frames, spreads them over the encode
//! workers and drains everything through the ordered sink on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    backend::{MediaBackend, OpenedOutput},
    error::{RecorderError, Result},
    file::{FileIo, SharedFile},
    frame::SharedImage,
    pacer::FramePacer,
    packet::FrameIndex,
    selector::{WorkerIndex, select_worker},
    settings::EncodingSettings,
    sink::OrderedPacketSink,
    worker::EncodeWorker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    Idle,
    Recording,
    Draining,
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStats {
    /// Output frames handed to a worker.
    pub frames_submitted: u64,
    /// `write_frame` calls that produced no output frame.
    pub frames_skipped: u64,
    pub packets_written: u64,
}

struct ActiveRecording {
    output: String,
    settings: EncodingSettings,
    pacer: FramePacer,
    workers: Vec<EncodeWorker>,
    sink: Arc<OrderedPacketSink>,
    // every index below this was handed to a worker
    submitted: FrameIndex,
    started_at: Instant,
}

impl ActiveRecording {
    /// A worker or the writer hit an error; frames submitted from now on
    /// would never reach the output.
    fn has_failed(&self) -> bool {
        self.sink.has_error() || self.workers.iter().any(|worker| worker.has_error())
    }

    fn stats(&self) -> RecordingStats {
        RecordingStats {
            frames_submitted: self.submitted,
            frames_skipped: self.pacer.skipped(),
            packets_written: self.sink.packets_written(),
        }
    }
}

pub struct Recorder {
    backend: Arc<dyn MediaBackend>,
    file: Option<SharedFile>,
    state: RecordingState,
    active: Option<ActiveRecording>,
    encoding_duration: Duration,
    last_stats: RecordingStats,
}

impl Recorder {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            file: None,
            state: RecordingState::Idle,
            active: None,
            encoding_duration: Duration::ZERO,
            last_stats: RecordingStats::default(),
        }
    }

    /// Recorder writing through a caller supplied file instead of opening
    /// the output by name.
    pub fn with_file(backend: Arc<dyn MediaBackend>, file: SharedFile) -> Self {
        let mut recorder = Self::new(backend);
        recorder.file = Some(file);
        recorder
    }

    /// Opens `output` and starts the workers. A recording that is still
    /// active is ended first. On failure the recorder is left `Closed`.
    pub fn start_recording(&mut self, output: &str, settings: EncodingSettings) -> Result<()> {
        if self.active.is_some() {
            log::info!("ending previous recording before starting {}", output);
            if let Err(e) = self.end_recording() {
                log::warn!("previous recording ended with error: {}", e);
            }
        }

        self.encoding_duration = Duration::ZERO;
        self.last_stats = RecordingStats::default();

        match self.open(output, settings) {
            Ok(active) => {
                log::info!(
                    "recording started: {} ({}x{} @ {} fps, {} workers, backend {})",
                    active.output,
                    active.settings.width,
                    active.settings.height,
                    active.settings.frame_rate,
                    active.workers.len(),
                    self.backend.name()
                );
                self.active = Some(active);
                self.state = RecordingState::Recording;
                Ok(())
            }
            Err(e) => {
                log::error!("failed to start recording {}: {}", output, e);
                self.close_file();
                self.state = RecordingState::Closed;
                Err(e)
            }
        }
    }

    fn open(&self, output: &str, settings: EncodingSettings) -> Result<ActiveRecording> {
        settings.validate()?;
        if !self.backend.supports(settings.format, settings.codec) {
            return Err(RecorderError::UnsupportedCodec {
                codec: settings.codec,
                format: settings.format,
            });
        }

        let file_io = match &self.file {
            Some(file) => {
                file.lock()
                    .open(output)
                    .map_err(|source| RecorderError::OpenOutput {
                        name: output.to_string(),
                        source,
                    })?;
                Some(FileIo::new(output, Arc::clone(file)))
            }
            None => None,
        };

        let OpenedOutput {
            mut muxer,
            encoders,
        } = self.backend.open(output, &settings, file_io)?;
        if encoders.is_empty() {
            return Err(RecorderError::NoWorkersAvailable);
        }
        muxer.write_header()?;

        let sink = Arc::new(OrderedPacketSink::start(muxer)?);
        let workers = encoders
            .into_iter()
            .enumerate()
            .map(|(index, encoder)| EncodeWorker::spawn(index, encoder, Arc::clone(&sink)))
            .collect::<Result<Vec<_>>>()?;

        Ok(ActiveRecording {
            output: output.to_string(),
            pacer: FramePacer::new(settings.frame_rate),
            settings,
            workers,
            sink,
            submitted: 0,
            started_at: Instant::now(),
        })
    }

    /// Feeds one captured image stamped `timestamp` seconds after the start
    /// of the recording. Returns how many output frames it was encoded as:
    /// zero when it landed in an already emitted tick, more than one when the
    /// source fell behind the output rate.
    ///
    /// Once a worker or the writer has failed the recording is ended here and
    /// the error that stopped it is returned.
    pub fn write_frame(&mut self, image: &SharedImage, timestamp: f64) -> Result<u32> {
        let Some(active) = self.active.as_mut() else {
            return Err(RecorderError::NotRecording);
        };
        if active.has_failed() {
            log::warn!("recording {} failed, ending it", active.output);
            // end_recording reports the error that stopped the pipeline
            return match self.end_recording() {
                Err(e) => Err(e),
                Ok(()) => Err(RecorderError::WriterFailed),
            };
        }

        let frames = active.pacer.schedule(timestamp);
        if frames.is_empty() {
            log::debug!("frame at {:.4}s skipped", timestamp);
            return Ok(0);
        }

        let count = frames.end - frames.start;
        let started = Instant::now();
        for frame_index in frames {
            let worker = select_worker(&active.workers)?;
            active.workers[worker].encode_frame(frame_index, Arc::clone(image))?;
            active.submitted = frame_index + 1;
        }
        self.encoding_duration += started.elapsed();

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Worker the next frame would go to.
    pub fn start_frame(&self) -> Result<WorkerIndex> {
        let active = self.active.as_ref().ok_or(RecorderError::NotRecording)?;
        select_worker(&active.workers)
    }

    /// Drains every submitted frame, writes the trailer and closes the
    /// output. Does nothing when no recording is active.
    ///
    /// The first error raised by a worker or the writer is returned. In that
    /// case whatever was already in order is flushed but the trailer is not
    /// written.
    pub fn end_recording(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        self.state = RecordingState::Draining;
        log::info!(
            "draining recording {} ({} frames submitted)",
            active.output,
            active.submitted
        );

        let mut first_error: Option<RecorderError> = None;
        for worker in active.workers.iter_mut() {
            match worker.stop() {
                // follows from a writer error the sink reports itself
                Some(RecorderError::WriterFailed) | None => {}
                Some(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        // a failed worker leaves a gap the writer would wait on forever
        let wait_until = match first_error {
            None => Some(active.submitted),
            Some(_) => None,
        };
        let muxer = match active.sink.stop(wait_until) {
            Ok(muxer) => Some(muxer),
            Err(e) => {
                first_error.get_or_insert(e);
                None
            }
        };
        self.last_stats = active.stats();

        if let Some(mut muxer) = muxer {
            if first_error.is_none() {
                if let Err(e) = muxer.write_trailer() {
                    first_error = Some(e);
                }
            } else {
                log::warn!("recording {} failed, trailer not written", active.output);
            }
        }
        drop(active);
        self.close_file();
        self.state = RecordingState::Closed;

        match first_error {
            Some(e) => {
                log::error!("recording ended with error: {}", e);
                Err(e)
            }
            None => {
                log::info!(
                    "recording closed: {} frames, {} skipped",
                    self.last_stats.packets_written,
                    self.last_stats.frames_skipped
                );
                Ok(())
            }
        }
    }

    fn close_file(&self) {
        if let Some(file) = &self.file {
            file.lock().close();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Wall-clock time spent handing frames to workers, including the time
    /// blocked on busy ones.
    pub fn encoding_duration(&self) -> Duration {
        self.encoding_duration
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.active
            .as_ref()
            .map(|active| (active.settings.width, active.settings.height))
    }

    pub fn elapsed(&self) -> Option<Duration> {
        self.active.as_ref().map(|active| active.started_at.elapsed())
    }

    /// Counters of the active recording, or of the last one once closed.
    pub fn stats(&self) -> RecordingStats {
        match &self.active {
            Some(active) => active.stats(),
            None => self.last_stats,
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.end_recording() {
            log::error!("recording dropped with error: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "recorder_test.rs"]
mod recorder_test;
