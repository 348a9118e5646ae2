//! Synthesis engine abstraction and the event messages it produces.
//!
//! The engine is a black-box asynchronous producer: it accepts one utterance
//! at a time and reports progress through discrete [`SynthesisEvent`]
//! messages delivered on a channel.

use crate::config::{EngineConfig, SpeakParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to create synthesis engine: {0}")]
    CreateError(String),
    #[error("Synthesis request failed: {0}")]
    SpeakError(String),
    #[error("Voice query failed: {0}")]
    VoiceQueryError(String),
}

/// Event messages emitted by the engine while synthesizing one utterance.
///
/// `DataChunk` carries the raw PCM payload and the engine's sequence number;
/// sequence 0 is a priming event with no audio and is discarded downstream.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    Started {
        utterance_id: String,
    },
    DataChunk {
        utterance_id: String,
        payload: Vec<u8>,
        sequence: u32,
    },
    Completed {
        utterance_id: String,
    },
    Stopped {
        utterance_id: String,
    },
    Errored {
        utterance_id: String,
        code: i32,
        message: String,
    },
}

/// Sending half of the engine's event channel.
pub type SynthesisEventSender = mpsc::UnboundedSender<SynthesisEvent>;

/// Receiving half, consumed by the driver's event pump.
pub type SynthesisEventReceiver = mpsc::UnboundedReceiver<SynthesisEvent>;

/// One synthesis request, tagged with the utterance id used to correlate
/// events, pause/stop calls, and notifications.
#[derive(Debug, Clone)]
pub struct SpeakRequest {
    pub utterance_id: String,
    pub params: SpeakParams,
}

/// Voice listing query.
#[derive(Debug, Clone, Default)]
pub struct VoiceQuery {
    pub request_id: String,
    /// Restrict to voices usable without a network connection.
    pub offline_only: bool,
}

/// Voice metadata as reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    pub language: String,
}

/// Handle to a created synthesis engine.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Routes subsequent synthesis events to the given sender.
    fn set_listener(&self, listener: SynthesisEventSender);

    /// One utterance in flight at a time; callers must check before `speak`.
    fn is_busy(&self) -> bool;

    async fn speak(&self, utterance: &str, request: SpeakRequest) -> Result<(), EngineError>;

    async fn list_voices(&self, query: VoiceQuery) -> Result<Vec<VoiceDescriptor>, EngineError>;
}

/// Factory for [`SynthesisEngine`] handles.
///
/// Engine creation is asynchronous and can fail (missing platform service,
/// unsupported locale); the driver retries lazily through this seam.
#[async_trait]
pub trait EngineProvider: Send + Sync {
    async fn create_engine(
        &self,
        config: &EngineConfig,
    ) -> Result<Box<dyn SynthesisEngine>, EngineError>;
}
