use serde::{Deserialize, Serialize};

/// Kind of audio attachment carried by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioKind {
    /// A recorded voice note (typically Opus-in-Ogg).
    Voice,
    /// A generic audio file attachment.
    File,
}

/// An audio attachment as described by the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRef {
    pub kind: AudioKind,
    /// Platform file identifier, resolvable via the file gateway.
    pub file_id: String,
    pub duration_secs: u32,
}

/// Platform-agnostic view of one inbound chat message.
///
/// Owned by the channel adapter; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: i64,
    pub message_id: i32,
    /// At most one audio attachment per message.
    pub audio: Option<AudioRef>,
}

/// A resolved, time-limited download location for an audio attachment.
///
/// Consumed exactly once by the fetcher; never cached or persisted.
#[derive(Debug, Clone)]
pub struct FetchableLocation {
    pub url: String,
}
