//! Configuration for the audio stream, the synthesis engine, and per-call
//! speech parameters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sample format of the PCM stream handed to the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// 16-bit signed little-endian
    S16Le,
}

/// Encoding of the audio payload. The engine delivers raw PCM only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    RawPcm,
}

/// How the platform should treat the output stream. Voice-communication
/// routing is the default; Media is the music-style variant some platforms
/// use instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamUsage {
    VoiceCommunication,
    Media,
}

/// Audio stream format consumed at device creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
    pub encoding: Encoding,
    pub usage: StreamUsage,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            sample_format: SampleFormat::S16Le,
            encoding: Encoding::RawPcm,
            usage: StreamUsage::VoiceCommunication,
        }
    }
}

/// Parameters for creating the synthesis engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// BCP-47 language tag. The reference engine supports a single locale.
    pub language: String,
    /// Speaker/voice index. Not changeable on the reference engine.
    pub speaker: u32,
    /// Offline synthesis only on the reference engine.
    pub offline: bool,
    /// Engine-specific extra parameters (style, region, engine name).
    pub extra: HashMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            language: "zh-CN".to_string(),
            speaker: 0,
            offline: true,
            extra: HashMap::new(),
        }
    }
}

/// Whether the engine should stream audio back or play it itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayType {
    /// Engine returns the audio stream; playback is ours.
    Stream,
    /// Engine plays the audio itself.
    EnginePlayback,
}

/// Default speech parameters merged into every `speak` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakParams {
    /// Speech rate, 0.5 - 2.0
    pub speed: f32,
    /// Pitch, 0.0 - 2.0
    pub pitch: f32,
    pub play_type: PlayType,
}

impl Default for SpeakParams {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            play_type: PlayType::Stream,
        }
    }
}

impl SpeakParams {
    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.clamp(0.5, 2.0);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(0.0, 2.0);
    }

    /// Merge per-call overrides on top of the defaults.
    pub fn merged(&self, overrides: &SpeakOverrides) -> SpeakParams {
        let mut params = self.clone();
        if let Some(speed) = overrides.speed {
            params.set_speed(speed);
        }
        if let Some(pitch) = overrides.pitch {
            params.set_pitch(pitch);
        }
        if let Some(play_type) = overrides.play_type {
            params.play_type = play_type;
        }
        params
    }
}

/// Per-call overrides for [`SpeakParams`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakOverrides {
    pub speed: Option<f32>,
    pub pitch: Option<f32>,
    pub play_type: Option<PlayType>,
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub stream: StreamConfig,
    pub engine: EngineConfig,
    pub defaults: SpeakParams,
}
