//! Playback sequencing for synthesized audio chunks.
//!
//! The player owns the chunk buffer and the output device handle, and runs
//! the drain loop that turns buffered chunks into ordered, pausable playback.
//! A single atomic flag guarantees at most one drain loop per player.

use crate::buffer::{AudioChunk, ChunkBuffer};
use crate::device::{AudioError, AudioOutput, DeviceState};
use crate::events::{EventEmitter, TtsEvent, TtsEventKind};
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Invoked with the utterance id once the buffer has fully drained.
pub type DrainCallback = Box<dyn FnOnce(String) + Send>;

/// Buffers synthesized chunks and writes them to the output device in
/// sequence order.
///
/// Invalid-state transport calls (`stop` while stopped, `pause` while paused,
/// `resume` while running) are benign: they return `Ok(false)` and change
/// nothing. `Err` always means a device fault.
pub struct Player {
    device: Box<dyn AudioOutput>,
    buffer: Mutex<ChunkBuffer>,
    /// Utterance the buffered chunks belong to.
    write_id: Mutex<Option<String>>,
    /// Set while a drain loop holds the single write slot.
    is_writing: AtomicBool,
    emitter: Arc<EventEmitter>,
}

impl Player {
    pub fn new(device: Box<dyn AudioOutput>, emitter: Arc<EventEmitter>) -> Self {
        Self {
            device,
            buffer: Mutex::new(ChunkBuffer::new()),
            write_id: Mutex::new(None),
            is_writing: AtomicBool::new(false),
            emitter,
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.device.state() == DeviceState::Prepared
    }

    pub fn is_running(&self) -> bool {
        self.device.state() == DeviceState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.device.state() == DeviceState::Paused
    }

    pub fn is_stopped(&self) -> bool {
        self.device.state() == DeviceState::Stopped
    }

    pub fn is_writing(&self) -> bool {
        self.is_writing.load(Ordering::SeqCst)
    }

    /// Utterance id of the most recently received chunk.
    pub fn current_utterance(&self) -> Option<String> {
        self.write_id.lock().expect("write id mutex poisoned").clone()
    }

    /// Number of chunks waiting to be played.
    pub fn queued_chunks(&self) -> usize {
        self.buffer.lock().expect("chunk buffer mutex poisoned").len()
    }

    /// Drops any stale device buffer and transitions the device to Running.
    pub async fn start(&self) -> Result<(), AudioError> {
        self.device.flush().await?;
        self.device.start().await
    }

    /// Stops and flushes the device and emits `tts-cancel`. Returns
    /// `Ok(false)` without side effects when the device is not running.
    pub async fn stop(&self) -> Result<bool, AudioError> {
        if !self.is_running() {
            return Ok(false);
        }
        self.device.stop().await?;
        self.device.flush().await?;
        self.emit(TtsEventKind::Cancel);
        Ok(true)
    }

    /// Pauses the device and releases the write slot so the drain loop exits
    /// at its next iteration boundary. The unwritten remainder of an
    /// in-flight chunk is discarded, so a pause/resume cycle restarts at the
    /// next whole chunk.
    pub async fn pause(&self) -> Result<bool, AudioError> {
        if !self.is_running() || self.is_paused() {
            return Ok(false);
        }
        self.device.pause().await?;
        self.is_writing.store(false, Ordering::SeqCst);
        self.emit(TtsEventKind::Pause);
        Ok(true)
    }

    /// Restarts the device and re-runs the drain loop with the last-known
    /// utterance id. Returns once the remaining chunks have drained or
    /// playback was interrupted again.
    pub async fn resume(&self, on_drained: Option<DrainCallback>) -> Result<bool, AudioError> {
        if !self.is_paused() || self.is_running() {
            return Ok(false);
        }
        self.device.start().await?;
        self.emit(TtsEventKind::Resume);
        let utterance_id = self.current_utterance().unwrap_or_default();
        self.process_queue(&utterance_id, on_drained).await?;
        Ok(true)
    }

    /// Drops device-buffered audio. The chunk buffer is untouched.
    pub async fn flush(&self) -> Result<(), AudioError> {
        self.device.flush().await
    }

    /// Audio-focus hint, forwarded to the device.
    pub async fn set_ducking(&self, enabled: bool) -> Result<(), AudioError> {
        self.device.set_ducking(enabled).await
    }

    /// Records the chunk's utterance as current and appends it. Never blocks.
    pub fn receive_data(&self, chunk: AudioChunk) {
        {
            let mut write_id = self.write_id.lock().expect("write id mutex poisoned");
            *write_id = Some(chunk.utterance_id.clone());
        }
        self.buffer
            .lock()
            .expect("chunk buffer mutex poisoned")
            .push(chunk);
    }

    /// Sorts buffered chunks by sequence number. Must run after the engine
    /// has finished producing and before the drain loop starts.
    pub fn sort_buffer_queue(&self) {
        self.buffer
            .lock()
            .expect("chunk buffer mutex poisoned")
            .sort();
    }

    /// Resets the buffer, the current utterance id, and the write slot.
    /// Called before a new utterance so residue from the previous one cannot
    /// leak into it.
    pub fn clear_cache_data(&self) {
        self.buffer
            .lock()
            .expect("chunk buffer mutex poisoned")
            .clear();
        *self.write_id.lock().expect("write id mutex poisoned") = None;
        self.is_writing.store(false, Ordering::SeqCst);
    }

    /// The drain loop. At most one runs per player; a second call while the
    /// write slot is held returns immediately.
    ///
    /// Chunks are popped FIFO from the pre-sorted buffer and written whole
    /// before the next pop. A pause or stop is observed at the next iteration
    /// or slice boundary. When the buffer empties the device is stopped and
    /// `on_drained` fires exactly once with the utterance id.
    pub async fn process_queue(
        &self,
        utterance_id: &str,
        on_drained: Option<DrainCallback>,
    ) -> Result<(), AudioError> {
        if self
            .is_writing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("drain already in progress, dropping request for {utterance_id}");
            return Ok(());
        }

        let result = self.drain().await;
        self.is_writing.store(false, Ordering::SeqCst);
        result?;

        let drained = self
            .buffer
            .lock()
            .expect("chunk buffer mutex poisoned")
            .is_empty();
        if drained {
            if self.is_running() {
                self.device.stop().await?;
            }
            if let Some(callback) = on_drained {
                callback(utterance_id.to_string());
            }
        }
        Ok(())
    }

    async fn drain(&self) -> Result<(), AudioError> {
        loop {
            // Pause and stop interrupt draining here.
            if !self.is_running() {
                break;
            }
            let chunk = self
                .buffer
                .lock()
                .expect("chunk buffer mutex poisoned")
                .pop_front();
            let Some(chunk) = chunk else {
                break;
            };
            self.write_chunk(&chunk).await?;
        }
        Ok(())
    }

    /// Writes one chunk in slices no larger than the device buffer. The
    /// remaining slices are abandoned if the device leaves Running mid-chunk.
    async fn write_chunk(&self, chunk: &AudioChunk) -> Result<(), AudioError> {
        let capacity = self.device.buffer_capacity().max(1);
        let payload = &chunk.payload;
        let mut offset = 0;

        while offset < payload.len() {
            if !self.is_running() {
                debug!(
                    "abandoning chunk {} of {} at byte {offset}",
                    chunk.sequence, chunk.utterance_id
                );
                break;
            }
            let end = usize::min(offset + capacity, payload.len());
            self.device.write(&payload[offset..end]).await?;
            offset = end;
        }
        Ok(())
    }

    fn emit(&self, kind: TtsEventKind) {
        let utterance_id = self.current_utterance().unwrap_or_default();
        self.emitter.emit(&TtsEvent::new(kind, utterance_id));
    }
}
