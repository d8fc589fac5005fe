//! Encode workers: one thread and one encoder each, at most one frame in
//! flight.
//!
//! The caller hands a frame over with [`EncodeWorker::encode_frame`], which
//! only blocks while the previous frame is still being encoded. The worker
//! thread converts the frame to the encoder's input layout, encodes it, stamps
//! the packet with the frame index and forwards it to the packet sink.
//!
//! Encoders may return a frame's packet late. The worker keeps the indices
//! still waiting for a packet and hands them out in order; on stop it
//! flushes the encoder so every submitted index reaches the sink.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::{
    encoder::VideoEncoder,
    error::{RecorderError, Result},
    frame::{ImageBuffer, SharedImage},
    packet::{EncodedPacket, FrameIndex},
    selector::{WorkLoad, WorkerIndex},
    sink::OrderedPacketSink,
};

struct EncodeJob {
    frame_index: FrameIndex,
    image: SharedImage,
}

struct WorkerState {
    job: Option<EncodeJob>,
    busy: bool,
    started_at: Option<Instant>,
    frame_index: Option<FrameIndex>,
    running: bool,
    // first failure wins; later frames are dropped
    error: Option<RecorderError>,
    frames_encoded: u64,
}

struct WorkerShared {
    state: Mutex<WorkerState>,
    cond: Condvar,
}

pub struct EncodeWorker {
    index: WorkerIndex,
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl EncodeWorker {
    pub fn spawn(
        index: WorkerIndex,
        encoder: Box<dyn VideoEncoder>,
        sink: Arc<OrderedPacketSink>,
    ) -> Result<Self> {
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(WorkerState {
                job: None,
                busy: false,
                started_at: None,
                frame_index: None,
                running: true,
                error: None,
                frames_encoded: 0,
            }),
            cond: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("encode-worker-{}", index))
            .spawn(move || Self::run(index, thread_shared, encoder, sink))?;
        log::debug!("encode worker {} started", index);

        Ok(Self {
            index,
            shared,
            handle: Some(handle),
        })
    }

    pub fn index(&self) -> WorkerIndex {
        self.index
    }

    /// Queues `image` to be encoded as output frame `frame_index`.
    ///
    /// Blocks while the worker is still busy with its previous frame. A
    /// worker that already failed silently drops the frame; the failure is
    /// reported by [`EncodeWorker::stop`].
    pub fn encode_frame(&self, frame_index: FrameIndex, image: SharedImage) -> Result<()> {
        let mut state = self.shared.state.lock();
        while state.busy && state.running {
            self.shared.cond.wait(&mut state);
        }
        if !state.running {
            return Err(RecorderError::NotRecording);
        }
        if state.error.is_some() {
            log::debug!(
                "encode worker {} has failed, dropping frame {}",
                self.index,
                frame_index
            );
            return Ok(());
        }

        state.job = Some(EncodeJob { frame_index, image });
        state.busy = true;
        state.started_at = Some(Instant::now());
        state.frame_index = Some(frame_index);
        self.shared.cond.notify_all();
        Ok(())
    }

    pub fn is_busy(&self) -> bool {
        self.shared.state.lock().busy
    }

    /// Time spent on the frame currently in flight, zero when idle.
    pub fn work_duration(&self) -> Duration {
        self.shared
            .state
            .lock()
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Index of the frame in flight, or of the last frame taken if idle.
    pub fn frame_index(&self) -> Option<FrameIndex> {
        self.shared.state.lock().frame_index
    }

    pub fn frames_encoded(&self) -> u64 {
        self.shared.state.lock().frames_encoded
    }

    pub fn has_error(&self) -> bool {
        self.shared.state.lock().error.is_some()
    }

    /// Waits for the frame in flight, then stops and joins the thread.
    /// Returns the worker's first error, if any.
    pub fn stop(&mut self) -> Option<RecorderError> {
        {
            let mut state = self.shared.state.lock();
            while state.busy {
                self.shared.cond.wait(&mut state);
            }
            state.running = false;
            self.shared.cond.notify_all();
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("encode worker {} panicked", self.index);
                return Some(RecorderError::ThreadPanicked("encode worker"));
            }
            log::debug!("encode worker {} stopped", self.index);
        }
        self.shared.state.lock().error.take()
    }

    fn run(
        index: WorkerIndex,
        shared: Arc<WorkerShared>,
        mut encoder: Box<dyn VideoEncoder>,
        sink: Arc<OrderedPacketSink>,
    ) {
        // frames sent to the encoder whose packet has not come out yet
        let mut awaiting = VecDeque::new();
        loop {
            let job = {
                let mut state = shared.state.lock();
                while state.job.is_none() && state.running {
                    shared.cond.wait(&mut state);
                }
                match state.job.take() {
                    Some(job) => job,
                    None => break,
                }
            };

            let frame_index = job.frame_index;
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                encode_job(encoder.as_mut(), &sink, &mut awaiting, job)
            }))
            .unwrap_or_else(|_| Err(RecorderError::ThreadPanicked("encode worker")));

            let mut state = shared.state.lock();
            match result {
                Ok(()) => state.frames_encoded += 1,
                Err(e) => {
                    log::error!("encode worker {} frame {}: {}", index, frame_index, e);
                    if state.error.is_none() {
                        state.error = Some(e);
                    }
                }
            }
            state.busy = false;
            state.started_at = None;
            shared.cond.notify_all();
        }

        if shared.state.lock().error.is_some() {
            return;
        }
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            flush_encoder(encoder.as_mut(), &sink, &mut awaiting)
        }))
        .unwrap_or_else(|_| Err(RecorderError::ThreadPanicked("encode worker")));
        if let Err(e) = result {
            log::error!("encode worker {} flush: {}", index, e);
            shared.state.lock().error = Some(e);
        }
    }
}

fn encode_job(
    encoder: &mut dyn VideoEncoder,
    sink: &OrderedPacketSink,
    awaiting: &mut VecDeque<FrameIndex>,
    job: EncodeJob,
) -> Result<()> {
    let EncodeJob { frame_index, image } = job;

    let expected = image.format().frame_size(encoder.width(), encoder.height());
    if image.width() != encoder.width()
        || image.height() != encoder.height()
        || image.size() != expected
    {
        return Err(RecorderError::SizeMismatch {
            frame: frame_index,
            expected,
            actual: image.size(),
        });
    }

    // never touch the caller's buffer; convert into a private copy
    let converted: ImageBuffer;
    let frame = if image.format() == encoder.input_format() {
        &*image
    } else {
        converted = image.to_format(encoder.input_format());
        &converted
    };

    let packets = encoder.encode(frame, frame_index)?;
    awaiting.push_back(frame_index);
    forward(packets, sink, awaiting)
}

/// Stamps each packet with the oldest index still waiting and hands it to
/// the sink.
fn forward(
    packets: Vec<EncodedPacket>,
    sink: &OrderedPacketSink,
    awaiting: &mut VecDeque<FrameIndex>,
) -> Result<()> {
    for mut packet in packets {
        let Some(frame_index) = awaiting.pop_front() else {
            return Err(RecorderError::Encode(
                "encoder returned more packets than frames".into(),
            ));
        };
        packet.stamp(frame_index);
        sink.add_packet(packet)?;
    }
    Ok(())
}

/// Drains the frames the encoder still holds. Indices it never produced a
/// packet for get an empty one, so the sink sees no gap.
fn flush_encoder(
    encoder: &mut dyn VideoEncoder,
    sink: &OrderedPacketSink,
    awaiting: &mut VecDeque<FrameIndex>,
) -> Result<()> {
    let packets = encoder.flush()?;
    forward(packets, sink, awaiting)?;
    if !awaiting.is_empty() {
        log::warn!("encoder dropped {} frames on flush", awaiting.len());
    }
    while let Some(frame_index) = awaiting.pop_front() {
        let mut packet = EncodedPacket::new(Vec::<u8>::new(), encoder.time_base());
        packet.stamp(frame_index);
        sink.add_packet(packet)?;
    }
    Ok(())
}

impl WorkLoad for EncodeWorker {
    fn is_busy(&self) -> bool {
        EncodeWorker::is_busy(self)
    }

    fn work_duration(&self) -> Duration {
        EncodeWorker::work_duration(self)
    }
}

impl Drop for EncodeWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Some(e) = self.stop() {
                log::error!("encode worker {} stopped with error: {}", self.index, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use crate::settings::EncodingSettings;
    use crate::test_util::{
        DelayedEncoder, JitterEncoder, MemoryMuxer, PanickingEncoder, SharedMuxLog,
    };

    fn settings() -> EncodingSettings {
        EncodingSettings {
            width: 4,
            height: 2,
            ..Default::default()
        }
    }

    fn setup(max_delay_ms: u64) -> (EncodeWorker, Arc<OrderedPacketSink>, SharedMuxLog) {
        setup_with(Box::new(JitterEncoder::new(&settings(), 3, max_delay_ms)))
    }

    fn setup_with(
        encoder: Box<dyn VideoEncoder>,
    ) -> (EncodeWorker, Arc<OrderedPacketSink>, SharedMuxLog) {
        let log = SharedMuxLog::default();
        let sink = Arc::new(
            OrderedPacketSink::start(Box::new(MemoryMuxer::new(Arc::clone(&log)))).unwrap(),
        );
        let worker = EncodeWorker::spawn(0, encoder, Arc::clone(&sink)).unwrap();
        (worker, sink, log)
    }

    fn payload_index(packet: &EncodedPacket) -> FrameIndex {
        let bytes: [u8; 8] = packet.data().as_ref().try_into().unwrap();
        FrameIndex::from_le_bytes(bytes)
    }

    #[test]
    fn test_encodes_and_stamps_packets() {
        let (mut worker, sink, log) = setup(0);
        let image = ImageBuffer::filled(4, 2, PixelFormat::Rgba8, [1, 2, 3, 4]).shared();
        for index in 0..3 {
            worker.encode_frame(index, Arc::clone(&image)).unwrap();
        }
        assert!(worker.stop().is_none());
        sink.stop(Some(3)).unwrap();

        let log = log.lock();
        assert_eq!(log.indices(), vec![0, 1, 2]);
        for (i, packet) in log.packets.iter().enumerate() {
            assert_eq!(packet.pts(), i as i64);
            assert_eq!(packet.dts(), i as i64);
            assert_eq!(packet.duration(), 1);
        }
        assert_eq!(worker.frames_encoded(), 3);
    }

    #[test]
    fn test_converts_into_private_copy() {
        let (mut worker, sink, log) = setup(0);
        let image = ImageBuffer::filled(4, 2, PixelFormat::Bgra8, [9, 8, 7, 255]).shared();
        worker.encode_frame(0, Arc::clone(&image)).unwrap();
        assert!(worker.stop().is_none());
        sink.stop(Some(1)).unwrap();

        assert_eq!(log.lock().indices(), vec![0]);
        // caller's buffer untouched
        assert_eq!(image.format(), PixelFormat::Bgra8);
        assert_eq!(&image.data()[..4], &[7, 8, 9, 255]);
    }

    #[test]
    fn test_size_mismatch_is_sticky() {
        let (mut worker, sink, log) = setup(0);
        let short = ImageBuffer::new(4, 2, PixelFormat::Rgba8, vec![0u8; 10]).shared();
        let good = ImageBuffer::filled(4, 2, PixelFormat::Rgba8, [0; 4]).shared();
        worker.encode_frame(0, short).unwrap();
        worker.encode_frame(1, good).unwrap();

        match worker.stop() {
            Some(RecorderError::SizeMismatch {
                frame,
                expected,
                actual,
            }) => {
                assert_eq!(frame, 0);
                assert_eq!(expected, 32);
                assert_eq!(actual, 10);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        sink.stop(None).unwrap();
        assert!(log.lock().packets.is_empty());
    }

    #[test]
    fn test_wrong_resolution_rejected() {
        let (mut worker, sink, _log) = setup(0);
        // same byte count, transposed
        let image = ImageBuffer::filled(2, 4, PixelFormat::Rgba8, [0; 4]).shared();
        worker.encode_frame(0, image).unwrap();
        assert!(matches!(
            worker.stop(),
            Some(RecorderError::SizeMismatch { .. })
        ));
        sink.stop(None).unwrap();
    }

    #[test]
    fn test_busy_while_encoding() {
        let (mut worker, sink, _log) = setup(60);
        let image = ImageBuffer::filled(4, 2, PixelFormat::Rgba8, [0; 4]).shared();
        assert!(!worker.is_busy());
        assert_eq!(worker.work_duration(), Duration::ZERO);

        // the jittered delay may be zero for this seed, so submit a few
        let mut saw_busy = false;
        for index in 0..4 {
            worker.encode_frame(index, Arc::clone(&image)).unwrap();
            saw_busy |= worker.is_busy();
        }
        assert!(saw_busy);
        assert!(worker.stop().is_none());
        assert!(!worker.is_busy());
        sink.stop(Some(4)).unwrap();
    }

    #[test]
    fn test_stopped_worker_refuses_frames() {
        let (mut worker, sink, _log) = setup(0);
        assert!(worker.stop().is_none());
        let image = ImageBuffer::filled(4, 2, PixelFormat::Rgba8, [0; 4]).shared();
        assert!(matches!(
            worker.encode_frame(0, image),
            Err(RecorderError::NotRecording)
        ));
        sink.stop(None).unwrap();
    }

    #[test]
    fn test_delayed_packets_keep_their_frame_index() {
        let (mut worker, sink, log) = setup_with(Box::new(DelayedEncoder::new(&settings())));
        let image = ImageBuffer::filled(4, 2, PixelFormat::Rgba8, [0; 4]).shared();
        for index in 0..5 {
            worker.encode_frame(index, Arc::clone(&image)).unwrap();
        }
        assert!(worker.stop().is_none());
        // the last frame only comes out of the flush
        sink.stop(Some(5)).unwrap();

        let log = log.lock();
        assert_eq!(log.indices(), vec![0, 1, 2, 3, 4]);
        for packet in &log.packets {
            assert_eq!(payload_index(packet), packet.frame_index());
            assert_eq!(packet.pts(), packet.frame_index() as i64);
        }
    }

    #[test]
    fn test_encoder_panic_is_reported_by_stop() {
        let encoder = Box::new(PanickingEncoder {
            settings: settings(),
        });
        let (mut worker, sink, log) = setup_with(encoder);
        let image = ImageBuffer::filled(4, 2, PixelFormat::Rgba8, [0; 4]).shared();
        worker.encode_frame(0, Arc::clone(&image)).unwrap();
        // waits for the failed frame, then drops this one
        worker.encode_frame(1, image).unwrap();
        assert!(!worker.is_busy());
        assert!(worker.has_error());

        assert!(matches!(
            worker.stop(),
            Some(RecorderError::ThreadPanicked("encode worker"))
        ));
        sink.stop(None).unwrap();
        assert!(log.lock().packets.is_empty());
    }
}
