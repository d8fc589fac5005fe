use std::sync::Arc;

use anyhow::Context;
use encode_bus::{MediaBackend, RawBackend, Recorder, RecordingStats};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{BackendKind, RecorderConfig};
use crate::source::CapturedFrame;

mod config;
mod source;

/// Frames waiting for a worker. Small so capture feels encoder back-pressure.
const FRAME_QUEUE_BOUND: usize = 8;

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("encode_bus", log::LevelFilter::Debug)
        .filter_module("lite_recorder", log::LevelFilter::Debug)
        .init();
}

fn backend(kind: BackendKind) -> anyhow::Result<Arc<dyn MediaBackend>> {
    match kind {
        BackendKind::Raw => Ok(Arc::new(RawBackend)),
        #[cfg(feature = "ffmpeg")]
        BackendKind::Ffmpeg => {
            encode_bus::init().context("ffmpeg init")?;
            Ok(Arc::new(encode_bus::ffmpeg::FfmpegBackend))
        }
        #[cfg(not(feature = "ffmpeg"))]
        BackendKind::Ffmpeg => anyhow::bail!("built without the ffmpeg feature"),
    }
}

fn record(
    config: &RecorderConfig,
    backend: Arc<dyn MediaBackend>,
    mut rx: mpsc::Receiver<CapturedFrame>,
) -> anyhow::Result<RecordingStats> {
    let mut recorder = Recorder::new(backend);
    recorder
        .start_recording(&config.output, config.encoding.clone())
        .with_context(|| format!("start recording {}", config.output))?;

    while let Some(frame) = rx.blocking_recv() {
        let copies = recorder
            .write_frame(&frame.image, frame.timestamp)
            .context("write frame")?;
        log::trace!("frame at {:.3}s encoded {} times", frame.timestamp, copies);
    }

    let encoding = recorder.encoding_duration();
    recorder.end_recording().context("finish recording")?;
    log::info!("time spent submitting frames: {:?}", encoding);
    Ok(recorder.stats())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = config::config();
    let backend = backend(config.backend)?;

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(FRAME_QUEUE_BOUND);

    let recorder = tokio::task::spawn_blocking(move || record(config, backend, rx));
    let producer = tokio::spawn(source::produce(
        config.source.clone(),
        config.encoding.width,
        config.encoding.height,
        tx,
        cancel.clone(),
    ));

    tokio::select! {
        _ = cancel.cancelled() => {},
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupted, finishing recording");
            cancel.cancel();
        },
    }

    producer.await.context("capture task")?;
    let stats = recorder.await.context("recorder task")??;
    log::info!(
        "wrote {}: {} frames submitted, {} packets written, {} captures skipped",
        config.output,
        stats.frames_submitted,
        stats.packets_written,
        stats.frames_skipped
    );
    Ok(())
}
