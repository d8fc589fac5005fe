//! Shared fakes for unit tests.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::{
    backend::{MediaBackend, OpenedOutput},
    encoder::VideoEncoder,
    error::{RecorderError, Result},
    file::FileIo,
    frame::{ImageBuffer, PixelFormat},
    output::Muxer,
    packet::{EncodedPacket, FrameIndex, Rational},
    settings::EncodingSettings,
};

/// Everything a [`MemoryMuxer`] saw, shared with the test body.
#[derive(Default)]
pub struct MuxLog {
    pub header: bool,
    pub trailer: bool,
    pub packets: Vec<EncodedPacket>,
}

impl MuxLog {
    pub fn indices(&self) -> Vec<FrameIndex> {
        self.packets.iter().map(|p| p.frame_index()).collect()
    }
}

pub type SharedMuxLog = Arc<Mutex<MuxLog>>;

pub struct MemoryMuxer {
    log: SharedMuxLog,
    fail_at: Option<FrameIndex>,
}

impl MemoryMuxer {
    pub fn new(log: SharedMuxLog) -> Self {
        Self { log, fail_at: None }
    }

    pub fn failing_at(log: SharedMuxLog, index: FrameIndex) -> Self {
        Self {
            log,
            fail_at: Some(index),
        }
    }
}

impl Muxer for MemoryMuxer {
    fn write_header(&mut self) -> Result<()> {
        self.log.lock().header = true;
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        if self.fail_at == Some(packet.frame_index()) {
            return Err(RecorderError::Mux(format!(
                "refusing frame {}",
                packet.frame_index()
            )));
        }
        self.log.lock().packets.push(packet.clone());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.log.lock().trailer = true;
        Ok(())
    }
}

/// Small deterministic generator for jittered delays.
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn delay(&mut self, max_ms: u64) -> Duration {
        Duration::from_millis(self.next() % (max_ms + 1))
    }
}

pub fn packet(index: FrameIndex) -> EncodedPacket {
    let mut packet = EncodedPacket::new(index.to_le_bytes().to_vec(), Rational::new(1, 30));
    packet.stamp(index);
    packet
}

/// Encoder that sleeps a pseudo-random time per frame so several workers
/// finish out of submission order. Payload is the frame index.
pub struct JitterEncoder {
    settings: EncodingSettings,
    rng: XorShift,
    max_delay_ms: u64,
    fail_at: Option<FrameIndex>,
}

impl JitterEncoder {
    pub fn new(settings: &EncodingSettings, seed: u64, max_delay_ms: u64) -> Self {
        Self {
            settings: settings.clone(),
            rng: XorShift::new(seed),
            max_delay_ms,
            fail_at: None,
        }
    }
}

impl VideoEncoder for JitterEncoder {
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn width(&self) -> u32 {
        self.settings.width
    }

    fn height(&self) -> u32 {
        self.settings.height
    }

    fn time_base(&self) -> Rational {
        self.settings.time_base()
    }

    fn bit_rate(&self) -> u64 {
        self.settings.resolved_bit_rate()
    }

    fn encode(
        &mut self,
        frame: &ImageBuffer,
        frame_index: FrameIndex,
    ) -> Result<Vec<EncodedPacket>> {
        if self.fail_at == Some(frame_index) {
            return Err(RecorderError::Encode(format!("codec failure at {}", frame_index)));
        }
        assert_eq!(frame.format(), PixelFormat::Rgba8);
        std::thread::sleep(self.rng.delay(self.max_delay_ms));
        Ok(vec![EncodedPacket::new(
            frame_index.to_le_bytes().to_vec(),
            self.settings.time_base(),
        )])
    }
}

/// Encoder with one frame of delay: each call returns the packet of the
/// previous frame and `flush` the last one. Payload is the frame index.
pub struct DelayedEncoder {
    settings: EncodingSettings,
    held: Option<FrameIndex>,
}

impl DelayedEncoder {
    pub fn new(settings: &EncodingSettings) -> Self {
        Self {
            settings: settings.clone(),
            held: None,
        }
    }

    fn packet(&self, frame_index: FrameIndex) -> EncodedPacket {
        EncodedPacket::new(frame_index.to_le_bytes().to_vec(), self.settings.time_base())
    }
}

impl VideoEncoder for DelayedEncoder {
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn width(&self) -> u32 {
        self.settings.width
    }

    fn height(&self) -> u32 {
        self.settings.height
    }

    fn time_base(&self) -> Rational {
        self.settings.time_base()
    }

    fn bit_rate(&self) -> u64 {
        self.settings.resolved_bit_rate()
    }

    fn encode(
        &mut self,
        _frame: &ImageBuffer,
        frame_index: FrameIndex,
    ) -> Result<Vec<EncodedPacket>> {
        let ready = self.held.replace(frame_index);
        Ok(ready.map(|index| self.packet(index)).into_iter().collect())
    }

    fn flush(&mut self) -> Result<Vec<EncodedPacket>> {
        Ok(self.held.take().map(|index| self.packet(index)).into_iter().collect())
    }
}

/// Encoder that panics on every frame.
pub struct PanickingEncoder {
    pub settings: EncodingSettings,
}

impl VideoEncoder for PanickingEncoder {
    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgba8
    }

    fn width(&self) -> u32 {
        self.settings.width
    }

    fn height(&self) -> u32 {
        self.settings.height
    }

    fn time_base(&self) -> Rational {
        self.settings.time_base()
    }

    fn bit_rate(&self) -> u64 {
        self.settings.resolved_bit_rate()
    }

    fn encode(
        &mut self,
        _frame: &ImageBuffer,
        frame_index: FrameIndex,
    ) -> Result<Vec<EncodedPacket>> {
        panic!("codec crashed on frame {}", frame_index);
    }
}

/// Backend handing out [`JitterEncoder`]s and a [`MemoryMuxer`].
pub struct TestBackend {
    pub log: SharedMuxLog,
    pub max_delay_ms: u64,
    pub encoder_fail_at: Option<FrameIndex>,
    pub muxer_fail_at: Option<FrameIndex>,
    pub opened: Arc<Mutex<Vec<String>>>,
}

impl TestBackend {
    pub fn new(max_delay_ms: u64) -> Self {
        Self {
            log: SharedMuxLog::default(),
            max_delay_ms,
            encoder_fail_at: None,
            muxer_fail_at: None,
            opened: Arc::default(),
        }
    }
}

impl MediaBackend for TestBackend {
    fn name(&self) -> &str {
        "test"
    }

    fn open(
        &self,
        output: &str,
        settings: &EncodingSettings,
        _file: Option<FileIo>,
    ) -> Result<OpenedOutput> {
        self.opened.lock().push(output.to_string());
        let muxer = match self.muxer_fail_at {
            Some(index) => MemoryMuxer::failing_at(Arc::clone(&self.log), index),
            None => MemoryMuxer::new(Arc::clone(&self.log)),
        };
        let encoders = (0..settings.worker_count)
            .map(|i| {
                let mut encoder =
                    JitterEncoder::new(settings, 0x9E37_79B9 + i as u64, self.max_delay_ms);
                encoder.fail_at = self.encoder_fail_at;
                Box::new(encoder) as Box<dyn VideoEncoder>
            })
            .collect();
        Ok(OpenedOutput {
            muxer: Box::new(muxer),
            encoders,
        })
    }
}
