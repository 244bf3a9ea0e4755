use std::io;
use std::pin::Pin;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_stream::Stream;

use crate::message::FetchableLocation;
use crate::outcome::Transcription;

/// A stream of raw audio bytes. Memory use is bounded by the transport
/// buffer, not by clip duration.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// Source encoding of platform-native audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Opus in an Ogg container, the voice-note encoding.
    OggOpus,
    /// MP3, the common encoding of generic audio attachments.
    Mp3,
}

/// Input shape a transcription engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Mono, fixed-rate, signed 16-bit little-endian PCM.
    CanonicalPcm,
    /// The original encoded bytes, with an explicit encoding declaration.
    EncodedNative,
}

/// Audio handed to a transcription engine, matching its declared input kind.
#[derive(Debug, Clone)]
pub enum AudioPayload {
    Pcm {
        data: Vec<u8>,
        sample_rate: u32,
    },
    Encoded {
        data: Bytes,
        encoding: AudioEncoding,
        sample_rate: u32,
    },
}

/// Platform collaborator turning a file identifier into a download location.
#[async_trait]
pub trait FileGateway: Send + Sync {
    async fn resolve_file(&self, file_id: &str) -> Result<FetchableLocation>;
}

/// Retrieves audio bytes from a resolved location. One attempt, no retry.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, location: &FetchableLocation) -> Result<ByteStream>;
}

/// A transcription engine. Implementations are shared across concurrent
/// pipeline runs and must not keep per-call state.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &'static str;

    /// Which audio shape this engine expects from the pipeline.
    fn input_kind(&self) -> InputKind;

    /// Produce the final (non-partial) text hypothesis for one clip.
    async fn transcribe(&self, payload: AudioPayload) -> Result<Transcription>;
}
