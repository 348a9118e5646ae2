//! Typed publish/subscribe emitter for lifecycle notifications.
//!
//! Host applications subscribe per event kind; listeners run synchronously in
//! registration order. Event kinds serialize to the wire names the host
//! expects (`tts-start`, `tts-finish`, ...).

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Lifecycle notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TtsEventKind {
    #[serde(rename = "tts-start")]
    Start,
    #[serde(rename = "tts-progress")]
    Progress,
    #[serde(rename = "tts-finish")]
    Finish,
    #[serde(rename = "tts-error")]
    Error,
    #[serde(rename = "tts-cancel")]
    Cancel,
    #[serde(rename = "tts-pause")]
    Pause,
    #[serde(rename = "tts-resume")]
    Resume,
}

/// A lifecycle notification carrying the utterance it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct TtsEvent {
    pub kind: TtsEventKind,
    pub utterance_id: String,
    pub message: Option<String>,
}

impl TtsEvent {
    pub fn new(kind: TtsEventKind, utterance_id: impl Into<String>) -> Self {
        Self {
            kind,
            utterance_id: utterance_id.into(),
            message: None,
        }
    }

    pub fn with_message(
        kind: TtsEventKind,
        utterance_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            utterance_id: utterance_id.into(),
            message: Some(message.into()),
        }
    }
}

/// Subscriber callback.
pub type EventListener = Box<dyn Fn(&TtsEvent) + Send + Sync>;

/// Opaque handle returned by [`EventEmitter::add_listener`], used to remove
/// the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle {
    kind: TtsEventKind,
    id: u64,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: HashMap<TtsEventKind, Vec<(u64, EventListener)>>,
}

/// Maps event kinds to ordered subscriber lists.
#[derive(Default)]
pub struct EventEmitter {
    registry: Mutex<Registry>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, kind: TtsEventKind, listener: EventListener) -> ListenerHandle {
        let mut registry = self.registry.lock().expect("event registry poisoned");
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push((id, listener));
        ListenerHandle { kind, id }
    }

    /// Removes a previously registered listener. Returns whether it existed.
    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        let mut registry = self.registry.lock().expect("event registry poisoned");
        if let Some(list) = registry.listeners.get_mut(&handle.kind) {
            let before = list.len();
            list.retain(|(id, _)| *id != handle.id);
            return list.len() != before;
        }
        false
    }

    /// Invokes all listeners for the event's kind, in registration order.
    pub fn emit(&self, event: &TtsEvent) {
        let registry = self.registry.lock().expect("event registry poisoned");
        if let Some(list) = registry.listeners.get(&event.kind) {
            for (_, listener) in list {
                listener(event);
            }
        }
    }
}
