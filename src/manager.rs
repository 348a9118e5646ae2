//! Driver adapter between the synthesis engine and the player.
//!
//! Owns engine initialization (with lazy retry), the single active utterance
//! session, and the translation of engine events into buffered chunks, drain
//! runs, and host notifications.

use crate::buffer::AudioChunk;
use crate::config::{BridgeConfig, SpeakOverrides, SpeakParams};
use crate::device::{AudioError, AudioOutput};
use crate::engine::{
    EngineError, EngineProvider, SpeakRequest, SynthesisEngine, SynthesisEvent,
    SynthesisEventSender, VoiceDescriptor, VoiceQuery,
};
use crate::events::{EventEmitter, EventListener, ListenerHandle, TtsEvent, TtsEventKind};
use crate::player::{DrainCallback, Player};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SpeakError {
    #[error("Synthesis engine is not ready")]
    NotReady,
    #[error("Synthesis engine is busy with another utterance")]
    EngineBusy,
    #[error(transparent)]
    Audio(#[from] AudioError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Voice metadata in the shape the host application expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
    pub quality: u32,
    pub latency: u32,
    pub network_connection_required: bool,
    pub not_installed: bool,
}

impl From<VoiceDescriptor> for Voice {
    fn from(descriptor: VoiceDescriptor) -> Self {
        // The reference engine only reports the language; the remaining
        // fields keep their neutral defaults.
        Self {
            id: String::new(),
            name: String::new(),
            language: descriptor.language,
            quality: 0,
            latency: 0,
            network_connection_required: false,
            not_installed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

/// The single utterance currently owned by the bridge.
#[derive(Debug, Clone)]
pub struct UtteranceSession {
    pub utterance_id: String,
    pub is_active: bool,
}

impl UtteranceSession {
    fn new(utterance_id: impl Into<String>) -> Self {
        Self {
            utterance_id: utterance_id.into(),
            is_active: true,
        }
    }
}

struct ManagerInner {
    config: BridgeConfig,
    provider: Box<dyn EngineProvider>,
    engine: tokio::sync::Mutex<Option<Box<dyn SynthesisEngine>>>,
    init_state: Mutex<InitState>,
    player: Arc<Player>,
    emitter: Arc<EventEmitter>,
    defaults: Mutex<SpeakParams>,
    session: Mutex<Option<UtteranceSession>>,
    /// One-shot guard for the progress notification of the current utterance.
    progress_emitted: AtomicBool,
    events_tx: SynthesisEventSender,
}

/// Host-facing text-to-speech manager.
///
/// Must be created inside a Tokio runtime: the constructor spawns the engine
/// event pump and kicks off engine initialization. `speak` is rejected until
/// initialization completes; `get_init_status` waits for (or retries) it.
pub struct TtsManager {
    inner: Arc<ManagerInner>,
}

impl TtsManager {
    pub fn new(
        provider: Box<dyn EngineProvider>,
        device: Box<dyn AudioOutput>,
        config: BridgeConfig,
    ) -> Self {
        let emitter = Arc::new(EventEmitter::new());
        let player = Arc::new(Player::new(device, Arc::clone(&emitter)));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let defaults = config.defaults.clone();
        let inner = Arc::new(ManagerInner {
            config,
            provider,
            engine: tokio::sync::Mutex::new(None),
            init_state: Mutex::new(InitState::Uninitialized),
            player,
            emitter,
            defaults: Mutex::new(defaults),
            session: Mutex::new(None),
            progress_emitted: AtomicBool::new(false),
            events_tx,
        });

        let pump = Arc::clone(&inner);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                ManagerInner::handle_event(&pump, event).await;
            }
        });

        let init = Arc::clone(&inner);
        tokio::spawn(async move {
            if let Err(e) = ManagerInner::ensure_ready(&init).await {
                warn!("engine initialization failed, will retry lazily: {e}");
            }
        });

        Self { inner }
    }

    /// Idempotent readiness check: re-initializes the engine if an earlier
    /// attempt failed, and returns once the engine is usable.
    pub async fn get_init_status(&self) -> Result<(), EngineError> {
        ManagerInner::ensure_ready(&self.inner).await
    }

    /// Starts synthesis of one utterance and returns its id.
    ///
    /// Fails without side effects when the engine is not ready or still busy
    /// with a previous utterance; callers wait for completion or call `stop`
    /// before speaking again.
    pub async fn speak(
        &self,
        utterance: &str,
        overrides: SpeakOverrides,
    ) -> Result<String, SpeakError> {
        let inner = &self.inner;
        if !inner.is_ready() {
            return Err(SpeakError::NotReady);
        }
        let engine_slot = inner.engine.lock().await;
        let engine = engine_slot.as_deref().ok_or(SpeakError::NotReady)?;
        if engine.is_busy() {
            return Err(SpeakError::EngineBusy);
        }

        let utterance_id = Uuid::new_v4().to_string();
        let params = {
            let defaults = inner.defaults.lock().expect("speak params mutex poisoned");
            defaults.merged(&overrides)
        };

        inner.player.start().await?;
        inner.player.clear_cache_data();
        {
            let mut session = inner.session.lock().expect("session mutex poisoned");
            *session = Some(UtteranceSession::new(&utterance_id));
        }
        inner.progress_emitted.store(false, Ordering::SeqCst);

        let request = SpeakRequest {
            utterance_id: utterance_id.clone(),
            params,
        };
        if let Err(e) = engine.speak(utterance, request).await {
            *inner.session.lock().expect("session mutex poisoned") = None;
            return Err(e.into());
        }
        debug!("speaking utterance {utterance_id}");
        Ok(utterance_id)
    }

    /// Stops playback of the current utterance. `Ok(false)` when nothing is
    /// running.
    pub async fn stop(&self) -> Result<bool, AudioError> {
        let stopped = self.inner.player.stop().await?;
        if stopped {
            *self.inner.session.lock().expect("session mutex poisoned") = None;
        }
        Ok(stopped)
    }

    pub async fn pause(&self) -> Result<bool, AudioError> {
        self.inner.player.pause().await
    }

    /// Resumes paused playback. Validates state synchronously, then drains
    /// the remaining chunks on a background task.
    pub async fn resume(&self) -> Result<bool, AudioError> {
        let player = Arc::clone(&self.inner.player);
        if !player.is_paused() || player.is_running() {
            return Ok(false);
        }
        let callback = ManagerInner::finish_callback(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = player.resume(Some(callback)).await {
                error!("resumed playback failed: {e}");
            }
        });
        Ok(true)
    }

    pub fn set_default_rate(&self, rate: f32) {
        self.inner
            .defaults
            .lock()
            .expect("speak params mutex poisoned")
            .set_speed(rate);
    }

    pub fn set_default_pitch(&self, pitch: f32) {
        self.inner
            .defaults
            .lock()
            .expect("speak params mutex poisoned")
            .set_pitch(pitch);
    }

    /// Lists the engine's voices, re-initializing the engine first if needed.
    pub async fn voices(&self) -> Result<Vec<Voice>, EngineError> {
        ManagerInner::ensure_ready(&self.inner).await?;
        let engine_slot = self.inner.engine.lock().await;
        let engine = engine_slot
            .as_deref()
            .ok_or_else(|| EngineError::VoiceQueryError("engine unavailable".to_string()))?;
        let query = VoiceQuery {
            request_id: Uuid::new_v4().to_string(),
            offline_only: true,
        };
        let descriptors = engine.list_voices(query).await?;
        Ok(descriptors.into_iter().map(Voice::from).collect())
    }

    /// Audio-focus hint for the output stream.
    pub async fn set_ducking(&self, enabled: bool) -> Result<(), AudioError> {
        self.inner.player.set_ducking(enabled).await
    }

    pub fn is_playing(&self) -> bool {
        self.inner.player.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.player.is_paused()
    }

    pub fn add_event_listener(&self, kind: TtsEventKind, listener: EventListener) -> ListenerHandle {
        self.inner.emitter.add_listener(kind, listener)
    }

    /// Returns whether the listener existed.
    pub fn remove_event_listener(&self, handle: ListenerHandle) -> bool {
        self.inner.emitter.remove_listener(handle)
    }

    /// Feeds one engine event through the adapter. Events arriving on the
    /// engine's listener channel go through here as well.
    pub async fn handle_engine_event(&self, event: SynthesisEvent) {
        ManagerInner::handle_event(&self.inner, event).await;
    }
}

impl ManagerInner {
    fn is_ready(&self) -> bool {
        *self.init_state.lock().expect("init state mutex poisoned") == InitState::Ready
    }

    fn set_init_state(&self, state: InitState) {
        *self.init_state.lock().expect("init state mutex poisoned") = state;
    }

    async fn ensure_ready(inner: &Arc<Self>) -> Result<(), EngineError> {
        if inner.is_ready() {
            return Ok(());
        }
        let mut engine_slot = inner.engine.lock().await;
        // A concurrent initialization may have finished while we waited.
        if inner.is_ready() {
            return Ok(());
        }
        inner.set_init_state(InitState::Initializing);
        match inner.provider.create_engine(&inner.config.engine).await {
            Ok(engine) => {
                engine.set_listener(inner.events_tx.clone());
                *engine_slot = Some(engine);
                inner.set_init_state(InitState::Ready);
                Ok(())
            }
            Err(e) => {
                inner.set_init_state(InitState::Uninitialized);
                Err(e)
            }
        }
    }

    fn session_matches(&self, utterance_id: &str) -> bool {
        let session = self.session.lock().expect("session mutex poisoned");
        session
            .as_ref()
            .map(|s| s.is_active && s.utterance_id == utterance_id)
            .unwrap_or(false)
    }

    fn finish_callback(inner: &Arc<Self>) -> DrainCallback {
        let inner = Arc::clone(inner);
        Box::new(move |utterance_id: String| {
            {
                let mut session = inner.session.lock().expect("session mutex poisoned");
                if let Some(session) = session.as_mut() {
                    if session.utterance_id == utterance_id {
                        session.is_active = false;
                    }
                }
            }
            inner
                .emitter
                .emit(&TtsEvent::new(TtsEventKind::Finish, utterance_id));
        })
    }

    async fn handle_event(inner: &Arc<Self>, event: SynthesisEvent) {
        match event {
            SynthesisEvent::Started { utterance_id } => {
                debug!("synthesis started for {utterance_id}");
                inner.progress_emitted.store(false, Ordering::SeqCst);
            }
            SynthesisEvent::DataChunk {
                utterance_id,
                payload,
                sequence,
            } => {
                // Sequence 0 is a priming event with no audio.
                if sequence == 0 {
                    return;
                }
                if !inner.session_matches(&utterance_id) {
                    debug!("dropping chunk {sequence} from superseded utterance {utterance_id}");
                    return;
                }
                if !inner.progress_emitted.swap(true, Ordering::SeqCst) {
                    inner
                        .emitter
                        .emit(&TtsEvent::new(TtsEventKind::Progress, &utterance_id));
                }
                inner
                    .player
                    .receive_data(AudioChunk::new(payload, sequence, utterance_id));
            }
            SynthesisEvent::Completed { utterance_id } => {
                if !inner.session_matches(&utterance_id) {
                    debug!("ignoring completion of superseded utterance {utterance_id}");
                    return;
                }
                inner
                    .emitter
                    .emit(&TtsEvent::new(TtsEventKind::Start, &utterance_id));
                inner.player.sort_buffer_queue();
                let callback = Self::finish_callback(inner);
                if let Err(e) = inner.player.process_queue(&utterance_id, Some(callback)).await {
                    inner
                        .fail_playback(&utterance_id, &format!("playback failed: {e}"))
                        .await;
                }
            }
            SynthesisEvent::Stopped { utterance_id } => {
                debug!("synthesis stopped for {utterance_id}");
            }
            SynthesisEvent::Errored {
                utterance_id,
                code,
                message,
            } => {
                error!("engine error {code} for {utterance_id}: {message}");
                inner
                    .fail_playback(&utterance_id, &format!("engine error {code}: {message}"))
                    .await;
            }
        }
    }

    /// Tears playback down after a fault: notify the host, silence the
    /// device, and discard everything buffered for the utterance.
    async fn fail_playback(&self, utterance_id: &str, message: &str) {
        self.emitter.emit(&TtsEvent::with_message(
            TtsEventKind::Error,
            utterance_id,
            message,
        ));
        if let Err(e) = self.player.stop().await {
            warn!("device stop after error failed: {e}");
        }
        if let Err(e) = self.player.flush().await {
            warn!("device flush after error failed: {e}");
        }
        self.player.clear_cache_data();
        *self.session.lock().expect("session mutex poisoned") = None;
    }
}
