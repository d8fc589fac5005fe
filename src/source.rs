use std::time::{Duration, Instant};

use bytes::BytesMut;
use encode_bus::{ImageBuffer, PixelFormat, SharedImage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SourceConfig;

/// One captured image and its capture time in seconds since the start.
pub struct CapturedFrame {
    pub image: SharedImage,
    pub timestamp: f64,
}

/// Test pattern generator: a vertical bar sweeping over a gradient.
pub struct TestPattern {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: 0,
        }
    }

    pub fn next_image(&mut self) -> SharedImage {
        let format = PixelFormat::Rgba8;
        let mut data = BytesMut::with_capacity(format.frame_size(self.width, self.height));
        let bar = (self.frame * 4 % self.width.max(1) as u64) as u32;
        for y in 0..self.height {
            for x in 0..self.width {
                if x.abs_diff(bar) < 4 {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    let r = (x * 255 / self.width.max(1)) as u8;
                    let g = (y * 255 / self.height.max(1)) as u8;
                    data.extend_from_slice(&[r, g, (self.frame % 256) as u8, 255]);
                }
            }
        }
        self.frame += 1;
        ImageBuffer::new(self.width, self.height, format, data.freeze()).shared()
    }
}

/// Linear congruential jitter, enough to make capture intervals irregular.
struct Jitter(u64);

impl Jitter {
    fn next_ms(&mut self, max_ms: u64) -> i64 {
        if max_ms == 0 {
            return 0;
        }
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let span = 2 * max_ms + 1;
        ((self.0 >> 33) % span) as i64 - max_ms as i64
    }
}

fn interval(config: &SourceConfig, jitter: &mut Jitter) -> Duration {
    let base_ms = (1000.0 / config.fps.max(0.1)) as i64;
    let ms = (base_ms + jitter.next_ms(config.jitter_ms)).max(1);
    Duration::from_millis(ms as u64)
}

/// Captures frames at a jittered rate until cancelled or the configured
/// duration ran out. Cancels `cancel` when it stops by itself.
pub async fn produce(
    config: SourceConfig,
    width: u32,
    height: u32,
    tx: mpsc::Sender<CapturedFrame>,
    cancel: CancellationToken,
) {
    let mut pattern = TestPattern::new(width, height);
    let mut jitter = Jitter(0x2545_F491_4F6C_DD1D);
    let start = Instant::now();
    let mut captured: u64 = 0;
    log::info!(
        "capture started: {}x{} at ~{} fps (+/- {} ms)",
        width,
        height,
        config.fps,
        config.jitter_ms
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = tokio::time::sleep(interval(&config, &mut jitter)) => {
                let timestamp = start.elapsed().as_secs_f64();
                if config.duration_secs > 0.0 && timestamp >= config.duration_secs {
                    cancel.cancel();
                    break;
                }
                let frame = CapturedFrame {
                    image: pattern.next_image(),
                    timestamp,
                };
                // back-pressure from busy encoders
                if tx.send(frame).await.is_err() {
                    log::warn!("recorder went away, stopping capture");
                    cancel.cancel();
                    break;
                }
                captured += 1;
            }
        }
    }
    log::info!("capture finished after {} frames", captured);
}
