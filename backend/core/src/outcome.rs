use thiserror::Error;

use crate::error::{Stage, StageError};

/// Fixed user-facing reply for any pipeline failure. Internal diagnostics
/// stay in the logs.
pub const FAILURE_REPLY: &str = "failed to transcribe audio";

/// Final text hypothesis produced by a transcription engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcription {
    /// Engine output, verbatim. No trimming or casing applied.
    pub text: String,
    /// Engine confidence in [0, 1], where the engine reports one.
    pub confidence: Option<f32>,
}

/// Reason a message was silently ignored. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("no audio")]
    NoAudio,
    #[error("audio duration {duration_secs}s exceeds the {limit_secs}s cap")]
    TooLong { duration_secs: u32, limit_secs: u32 },
}

/// The single value produced by one pipeline run. Exactly one per message.
#[derive(Debug)]
pub enum Outcome {
    /// Transcription succeeded; reply with the text.
    Success(Transcription),
    /// Message is not eligible; send no reply at all.
    Skip(SkipReason),
    /// A stage failed; reply with [`FAILURE_REPLY`] and log the cause.
    Failure(StageError),
}

impl Outcome {
    /// Stage of the failure, if this outcome is one.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Outcome::Failure(err) => Some(err.stage),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Outcome::Skip(_))
    }
}

/// Maps an outcome to the reply the channel adapter should send, if any.
///
/// A `Skip` never generates a reply, and a `Failure` never exposes its cause.
pub fn reply_text_for(outcome: &Outcome) -> Option<&str> {
    match outcome {
        Outcome::Success(t) => Some(&t.text),
        Outcome::Skip(_) => None,
        Outcome::Failure(_) => Some(FAILURE_REPLY),
    }
}
