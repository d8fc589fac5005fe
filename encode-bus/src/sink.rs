//! Single-writer, index-ordered delivery of encoded packets to a muxer.
//!
//! Workers finish in any order. Packets wait in a map keyed by frame index
//! until the packet for `next_index` arrives; only then is it written and the
//! index advanced. The muxer is owned by the writer thread for the lifetime
//! of the sink and handed back by [`OrderedPacketSink::stop`].

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::{
    error::{RecorderError, Result},
    output::Muxer,
    packet::{EncodedPacket, FrameIndex},
};

struct SinkState {
    pending: BTreeMap<FrameIndex, EncodedPacket>,
    next_index: FrameIndex,
    running: bool,
    error: Option<RecorderError>,
    packets_written: u64,
}

struct SinkShared {
    state: Mutex<SinkState>,
    // signalled on every insert, write and stop request
    changed: Condvar,
}

pub struct OrderedPacketSink {
    shared: Arc<SinkShared>,
    handle: Mutex<Option<JoinHandle<Box<dyn Muxer>>>>,
}

impl OrderedPacketSink {
    /// Spawns the writer thread. The muxer's header must already be written.
    pub fn start(muxer: Box<dyn Muxer>) -> Result<Self> {
        let shared = Arc::new(SinkShared {
            state: Mutex::new(SinkState {
                pending: BTreeMap::new(),
                next_index: 0,
                running: true,
                error: None,
                packets_written: 0,
            }),
            changed: Condvar::new(),
        });

        let writer_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("packet-writer".to_string())
            .spawn(move || Self::writer_loop(writer_shared, muxer))?;
        log::debug!("packet writer started");

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queues `packet` for writing. Safe to call from any number of workers.
    ///
    /// Once the muxer has failed or the sink was stopped nothing drains the
    /// queue any more, so the packet is dropped and an error returned.
    pub fn add_packet(&self, packet: EncodedPacket) -> Result<()> {
        let index = packet.frame_index();
        let mut state = self.shared.state.lock();
        if index < state.next_index || state.pending.contains_key(&index) {
            return Err(RecorderError::DuplicatePacket(index));
        }
        if state.error.is_some() {
            return Err(RecorderError::WriterFailed);
        }
        if !state.running {
            return Err(RecorderError::NotRecording);
        }
        state.pending.insert(index, packet);
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Index of the next packet the writer is waiting for; every packet
    /// below it has been written.
    pub fn next_index(&self) -> FrameIndex {
        self.shared.state.lock().next_index
    }

    pub fn pending_len(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    pub fn packets_written(&self) -> u64 {
        self.shared.state.lock().packets_written
    }

    pub fn has_error(&self) -> bool {
        self.shared.state.lock().error.is_some()
    }

    /// Stops the writer and returns the muxer.
    ///
    /// With `Some(n)` this blocks until every packet below `n` has been
    /// written (or the muxer failed). With `None` only packets that are
    /// already contiguous with the written prefix are flushed. A sticky
    /// write error is returned instead of the muxer.
    pub fn stop(&self, wait_until: Option<FrameIndex>) -> Result<Box<dyn Muxer>> {
        {
            let mut state = self.shared.state.lock();
            if let Some(target) = wait_until {
                while state.next_index < target && state.error.is_none() {
                    self.shared.changed.wait(&mut state);
                }
            }
            state.running = false;
            self.shared.changed.notify_all();
        }

        let handle = self
            .handle
            .lock()
            .take()
            .ok_or(RecorderError::NotRecording)?;
        let muxer = handle
            .join()
            .map_err(|_| RecorderError::ThreadPanicked("packet writer"))?;

        let mut state = self.shared.state.lock();
        if !state.pending.is_empty() {
            log::warn!(
                "packet writer stopped at frame {} with {} packets still queued",
                state.next_index,
                state.pending.len()
            );
        }
        match state.error.take() {
            Some(e) => Err(e),
            None => Ok(muxer),
        }
    }

    fn writer_loop(shared: Arc<SinkShared>, mut muxer: Box<dyn Muxer>) -> Box<dyn Muxer> {
        loop {
            let packet = {
                let mut state = shared.state.lock();
                loop {
                    if state.error.is_some() {
                        break None;
                    }
                    let expected = state.next_index;
                    if let Some(entry) = state.pending.first_entry() {
                        if *entry.key() == expected {
                            break Some(entry.remove());
                        }
                    }
                    if !state.running {
                        break None;
                    }
                    shared.changed.wait(&mut state);
                }
            };
            let Some(packet) = packet else {
                break;
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| muxer.write_packet(&packet)))
                .unwrap_or_else(|_| Err(RecorderError::ThreadPanicked("packet writer")));

            let mut state = shared.state.lock();
            match result {
                Ok(()) => {
                    log::trace!("wrote packet for frame {}", packet.frame_index());
                    state.next_index += 1;
                    state.packets_written += 1;
                }
                Err(e) => {
                    log::error!(
                        "writing packet for frame {} failed: {}",
                        packet.frame_index(),
                        e
                    );
                    state.error = Some(e);
                    // nothing will be written any more
                    state.pending.clear();
                }
            }
            shared.changed.notify_all();
        }
        log::debug!("packet writer finished");
        muxer
    }
}

impl Drop for OrderedPacketSink {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            if let Err(e) = self.stop(None) {
                log::error!("packet writer stopped with error: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "sink_test.rs"]
mod sink_test;
