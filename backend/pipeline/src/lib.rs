//! The per-message transcription pipeline.
//!
//! One [`Pipeline::run`] call per inbound message: resolve the attachment to a
//! download URL, fetch the bytes, normalize to canonical PCM where the engine
//! needs it, and transcribe. Every stage failure is contained at its own
//! boundary; one message can never corrupt or block another's run.

pub mod engines;
pub mod fetcher;
pub mod normalizer;
pub mod orchestrator;
pub mod resolver;

pub use engines::google::GoogleSpeechTranscriber;
#[cfg(feature = "vosk")]
pub use engines::vosk::VoskTranscriber;
pub use fetcher::HttpFetcher;
pub use normalizer::{FfmpegNormalizer, PcmStream};
pub use orchestrator::{Pipeline, PipelineConfig};
pub use resolver::Resolver;
