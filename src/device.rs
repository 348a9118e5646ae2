//! Audio output device abstraction.
//!
//! The platform renderer is an external collaborator; the player only needs
//! a small state enum, a write that suspends until the device accepts the
//! bytes, and the usual transport controls.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to create audio output device: {0}")]
    CreateError(String),
    #[error("Failed to start audio output: {0}")]
    StartError(String),
    #[error("Failed to stop audio output: {0}")]
    StopError(String),
    #[error("Failed to pause audio output: {0}")]
    PauseError(String),
    #[error("Failed to flush audio output: {0}")]
    FlushError(String),
    #[error("Failed to write audio data: {0}")]
    WriteError(String),
}

/// Reported state of the output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Prepared,
    Running,
    Paused,
    Stopped,
}

/// Handle to a platform audio output device.
///
/// `write` accepts at most `buffer_capacity()` bytes per call and suspends
/// until the device has accepted them. Transport controls report device
/// faults as errors; state checks are the caller's job.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    fn state(&self) -> DeviceState;

    /// Size of the device's internal buffer in bytes. Writes are sliced to
    /// this bound.
    fn buffer_capacity(&self) -> usize;

    async fn write(&self, bytes: &[u8]) -> Result<(), AudioError>;

    async fn start(&self) -> Result<(), AudioError>;

    async fn stop(&self) -> Result<(), AudioError>;

    async fn pause(&self) -> Result<(), AudioError>;

    /// Drops device-buffered audio that has not been rendered yet.
    async fn flush(&self) -> Result<(), AudioError>;

    /// Audio-focus hint: when enabled, other streams duck instead of being
    /// interrupted. Devices without focus control may ignore it.
    async fn set_ducking(&self, _enabled: bool) -> Result<(), AudioError> {
        Ok(())
    }
}
