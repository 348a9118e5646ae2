//! rodio-backed audio output device.
//!
//! rodio's `OutputStream` is not `Send`, so a dedicated playback thread owns
//! the stream and sink and takes commands over a channel. Raw S16LE bytes are
//! converted to samples and appended to the sink; the bounded data channel is
//! what makes `write` suspend until the device accepts the audio.

use crate::config::{Encoding, SampleFormat, StreamConfig};
use crate::device::{AudioError, AudioOutput, DeviceState};
use async_trait::async_trait;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const STATE_PREPARED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Queued slices the playback thread will accept before `write` suspends.
const DATA_CHANNEL_BOUND: usize = 4;

/// Slice size handed out as the device buffer capacity: 20 ms of audio.
const CAPACITY_WINDOW_MS: usize = 20;

#[derive(Debug)]
enum DeviceCmd {
    Start,
    Pause,
    /// Stop and Flush both clear queued audio on the thread side; the caller
    /// keeps the state distinction.
    Clear,
    Shutdown,
}

/// [`AudioOutput`] implementation over the default system output via rodio.
///
/// `StreamUsage` has no equivalent in rodio; the default output device is
/// used regardless. The ducking hint is recorded but not enforced.
pub struct RodioOutput {
    state: Arc<AtomicU8>,
    capacity: usize,
    ctrl_tx: Sender<DeviceCmd>,
    data_tx: Sender<Vec<i16>>,
    ducking: AtomicBool,
}

impl RodioOutput {
    pub fn new(config: &StreamConfig) -> Result<Self, AudioError> {
        if config.sample_format != SampleFormat::S16Le || config.encoding != Encoding::RawPcm {
            return Err(AudioError::CreateError(
                "only raw s16le PCM streams are supported".to_string(),
            ));
        }

        let state = Arc::new(AtomicU8::new(STATE_PREPARED));
        let (ctrl_tx, ctrl_rx) = unbounded();
        let (data_tx, data_rx) = bounded(DATA_CHANNEL_BOUND);
        let (ready_tx, ready_rx) = bounded(1);

        let sample_rate = config.sample_rate;
        let channels = config.channels;
        let thread_state = Arc::clone(&state);
        thread::spawn(move || {
            playback_thread(sample_rate, channels, ctrl_rx, data_rx, thread_state, ready_tx)
        });

        ready_rx
            .recv()
            .map_err(|_| AudioError::CreateError("playback thread exited".to_string()))?
            .map_err(AudioError::CreateError)?;

        let frames_per_slice = (sample_rate as usize * CAPACITY_WINDOW_MS / 1000).max(1);
        Ok(Self {
            state,
            capacity: frames_per_slice * channels as usize * 2,
            ctrl_tx,
            data_tx,
            ducking: AtomicBool::new(false),
        })
    }

    /// Last ducking hint recorded via [`AudioOutput::set_ducking`].
    pub fn ducking(&self) -> bool {
        self.ducking.load(Ordering::SeqCst)
    }

    fn send(&self, cmd: DeviceCmd, err: fn(String) -> AudioError) -> Result<(), AudioError> {
        self.ctrl_tx
            .send(cmd)
            .map_err(|_| err("playback thread is gone".to_string()))
    }
}

#[async_trait]
impl AudioOutput for RodioOutput {
    fn state(&self) -> DeviceState {
        match self.state.load(Ordering::SeqCst) {
            STATE_RUNNING => DeviceState::Running,
            STATE_PAUSED => DeviceState::Paused,
            STATE_STOPPED => DeviceState::Stopped,
            _ => DeviceState::Prepared,
        }
    }

    fn buffer_capacity(&self) -> usize {
        self.capacity
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), AudioError> {
        if bytes.len() % 2 != 0 {
            return Err(AudioError::WriteError(
                "odd byte count for an s16le stream".to_string(),
            ));
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        // The bounded channel blocks when the thread is behind; hop onto the
        // blocking pool so the async caller only suspends.
        let tx = self.data_tx.clone();
        tokio::task::spawn_blocking(move || tx.send(samples))
            .await
            .map_err(|e| AudioError::WriteError(e.to_string()))?
            .map_err(|_| AudioError::WriteError("playback thread is gone".to_string()))
    }

    async fn start(&self) -> Result<(), AudioError> {
        self.state.store(STATE_RUNNING, Ordering::SeqCst);
        self.send(DeviceCmd::Start, AudioError::StartError)
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        self.send(DeviceCmd::Clear, AudioError::StopError)
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.state.store(STATE_PAUSED, Ordering::SeqCst);
        self.send(DeviceCmd::Pause, AudioError::PauseError)
    }

    async fn flush(&self) -> Result<(), AudioError> {
        self.send(DeviceCmd::Clear, AudioError::FlushError)
    }

    async fn set_ducking(&self, enabled: bool) -> Result<(), AudioError> {
        debug!("ducking hint set to {enabled}");
        self.ducking.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for RodioOutput {
    fn drop(&mut self) {
        let _ = self.ctrl_tx.send(DeviceCmd::Shutdown);
    }
}

fn playback_thread(
    sample_rate: u32,
    channels: u16,
    ctrl_rx: Receiver<DeviceCmd>,
    data_rx: Receiver<Vec<i16>>,
    state: Arc<AtomicU8>,
    ready_tx: Sender<Result<(), String>>,
) {
    // Created on this thread for the lifetime of the device.
    let (_stream, handle) = match OutputStream::try_default() {
        Ok(v) => v,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to open output stream: {e}")));
            return;
        }
    };
    let mut sink = match Sink::try_new(&handle) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("failed to create sink: {e}")));
            return;
        }
    };
    // Fresh sinks play immediately; hold playback until Start.
    sink.pause();
    let _ = ready_tx.send(Ok(()));

    loop {
        match ctrl_rx.recv_timeout(Duration::from_millis(20)) {
            Ok(DeviceCmd::Start) => sink.play(),
            Ok(DeviceCmd::Pause) => sink.pause(),
            Ok(DeviceCmd::Clear) => {
                // Discard samples still in flight, then swap in a fresh sink;
                // rodio cannot drop queued sources from a live one.
                while data_rx.try_recv().is_ok() {}
                sink.stop();
                match Sink::try_new(&handle) {
                    Ok(s) => sink = s,
                    Err(e) => {
                        error!("failed to recreate sink: {e}");
                        continue;
                    }
                }
                if state.load(Ordering::SeqCst) != STATE_RUNNING {
                    sink.pause();
                }
            }
            Ok(DeviceCmd::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        while let Ok(samples) = data_rx.try_recv() {
            sink.append(SamplesBuffer::new(channels, sample_rate, samples));
        }
    }
    debug!("playback thread shutting down");
}
