//! Test doubles for the external collaborators.
//!
//! `MockDevice` records writes and scripts its state transitions; the gated
//! variant blocks writes behind a semaphore so tests can hold a drain loop
//! mid-write. `MockEngine`/`MockProvider` record synthesis requests and let
//! tests drive the event channel by hand.

use crate::config::EngineConfig;
use crate::device::{AudioError, AudioOutput, DeviceState};
use crate::engine::{
    EngineError, EngineProvider, SpeakRequest, SynthesisEngine, SynthesisEvent,
    SynthesisEventSender, VoiceDescriptor, VoiceQuery,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

struct MockDeviceInner {
    state: Mutex<DeviceState>,
    capacity: usize,
    writes: Mutex<Vec<Vec<u8>>>,
    flushes: AtomicUsize,
    gate: Option<Semaphore>,
    fail_writes: AtomicBool,
    fail_start: AtomicBool,
    ducking: Mutex<Option<bool>>,
}

/// Cloneable handle to a scripted audio device; all clones share state so a
/// test can keep one and hand another to the player.
#[derive(Clone)]
pub struct MockDevice {
    inner: Arc<MockDeviceInner>,
}

impl MockDevice {
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Writes block until permits are granted with [`MockDevice::allow_writes`].
    pub fn gated(capacity: usize) -> Self {
        Self::build(capacity, Some(Semaphore::new(0)))
    }

    fn build(capacity: usize, gate: Option<Semaphore>) -> Self {
        Self {
            inner: Arc::new(MockDeviceInner {
                state: Mutex::new(DeviceState::Prepared),
                capacity,
                writes: Mutex::new(Vec::new()),
                flushes: AtomicUsize::new(0),
                gate,
                fail_writes: AtomicBool::new(false),
                fail_start: AtomicBool::new(false),
                ducking: Mutex::new(None),
            }),
        }
    }

    pub fn allow_writes(&self, count: usize) {
        if let Some(gate) = &self.inner.gate {
            gate.add_permits(count);
        }
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn state_snapshot(&self) -> DeviceState {
        *self.inner.state.lock().unwrap()
    }

    pub fn flush_count(&self) -> usize {
        self.inner.flushes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_start(&self, fail: bool) {
        self.inner.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn ducking(&self) -> Option<bool> {
        *self.inner.ducking.lock().unwrap()
    }

    fn set_state(&self, state: DeviceState) {
        *self.inner.state.lock().unwrap() = state;
    }
}

#[async_trait]
impl AudioOutput for MockDevice {
    fn state(&self) -> DeviceState {
        self.state_snapshot()
    }

    fn buffer_capacity(&self) -> usize {
        self.inner.capacity
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), AudioError> {
        if let Some(gate) = &self.inner.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(AudioError::WriteError("scripted write failure".into()));
        }
        self.inner.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn start(&self) -> Result<(), AudioError> {
        if self.inner.fail_start.load(Ordering::SeqCst) {
            return Err(AudioError::StartError("scripted start failure".into()));
        }
        self.set_state(DeviceState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AudioError> {
        self.set_state(DeviceState::Stopped);
        Ok(())
    }

    async fn pause(&self) -> Result<(), AudioError> {
        self.set_state(DeviceState::Paused);
        Ok(())
    }

    async fn flush(&self) -> Result<(), AudioError> {
        self.inner.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_ducking(&self, enabled: bool) -> Result<(), AudioError> {
        *self.inner.ducking.lock().unwrap() = Some(enabled);
        Ok(())
    }
}

struct MockEngineInner {
    busy: AtomicBool,
    listener: Mutex<Option<SynthesisEventSender>>,
    requests: Mutex<Vec<(String, SpeakRequest)>>,
    voices: Mutex<Vec<VoiceDescriptor>>,
    fail_speak: AtomicBool,
}

/// Cloneable handle to a scripted synthesis engine.
#[derive(Clone)]
pub struct MockEngine {
    inner: Arc<MockEngineInner>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockEngineInner {
                busy: AtomicBool::new(false),
                listener: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
                voices: Mutex::new(vec![VoiceDescriptor {
                    language: "zh-CN".to_string(),
                }]),
                fail_speak: AtomicBool::new(false),
            }),
        }
    }

    pub fn set_busy(&self, busy: bool) {
        self.inner.busy.store(busy, Ordering::SeqCst);
    }

    pub fn fail_speak(&self, fail: bool) {
        self.inner.fail_speak.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<(String, SpeakRequest)> {
        self.inner.requests.lock().unwrap().clone()
    }

    /// Pushes an event through the registered listener channel, as the
    /// platform engine would.
    pub fn emit(&self, event: SynthesisEvent) {
        let listener = self.inner.listener.lock().unwrap();
        if let Some(sender) = listener.as_ref() {
            let _ = sender.send(event);
        }
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    fn set_listener(&self, listener: SynthesisEventSender) {
        *self.inner.listener.lock().unwrap() = Some(listener);
    }

    fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }

    async fn speak(&self, utterance: &str, request: SpeakRequest) -> Result<(), EngineError> {
        if self.inner.fail_speak.load(Ordering::SeqCst) {
            return Err(EngineError::SpeakError("scripted speak failure".into()));
        }
        self.inner
            .requests
            .lock()
            .unwrap()
            .push((utterance.to_string(), request));
        Ok(())
    }

    async fn list_voices(&self, _query: VoiceQuery) -> Result<Vec<VoiceDescriptor>, EngineError> {
        Ok(self.inner.voices.lock().unwrap().clone())
    }
}

/// Engine factory whose failures can be scripted to exercise lazy re-init.
#[derive(Clone)]
pub struct MockProvider {
    engine: MockEngine,
    fail: Arc<AtomicBool>,
    created: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new(engine: MockEngine) -> Self {
        Self {
            engine,
            fail: Arc::new(AtomicBool::new(false)),
            created: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineProvider for MockProvider {
    async fn create_engine(
        &self,
        _config: &EngineConfig,
    ) -> Result<Box<dyn SynthesisEngine>, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::CreateError("scripted create failure".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.engine.clone()))
    }
}
