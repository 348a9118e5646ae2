//! Bridge between a platform text-to-speech engine and an audio output
//! device.
//!
//! The engine is treated as a black-box asynchronous producer of PCM chunks
//! and the output device as a black-box byte consumer. This crate supplies
//! the piece in between: ordered, gapless, pausable playback of one utterance
//! at a time, plus lifecycle notifications for the host application.
//!
//! Typical wiring: implement [`SynthesisEngine`]/[`EngineProvider`] over the
//! platform speech service, pick an [`AudioOutput`] (for example
//! [`RodioOutput`]), and drive everything through [`TtsManager`].

mod buffer;
mod config;
mod device;
mod engine;
mod events;
mod manager;
#[cfg(test)]
mod mock;
mod player;
mod rodio_device;

pub use buffer::{AudioChunk, ChunkBuffer};
pub use config::{
    BridgeConfig, Encoding, EngineConfig, PlayType, SampleFormat, SpeakOverrides, SpeakParams,
    StreamConfig, StreamUsage,
};
pub use device::{AudioError, AudioOutput, DeviceState};
pub use engine::{
    EngineError, EngineProvider, SpeakRequest, SynthesisEngine, SynthesisEvent,
    SynthesisEventReceiver, SynthesisEventSender, VoiceDescriptor, VoiceQuery,
};
pub use events::{EventEmitter, EventListener, ListenerHandle, TtsEvent, TtsEventKind};
pub use manager::{SpeakError, TtsManager, UtteranceSession, Voice};
pub use player::{DrainCallback, Player};
pub use rodio_device::RodioOutput;
