use std::fmt;

use thiserror::Error;

/// One discrete step of the transcription pipeline.
///
/// Stage names are stable: they appear as structured log fields and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Fetch,
    Normalize,
    Transcribe,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Normalize => "normalize",
            Stage::Transcribe => "transcribe",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-message pipeline failure, tagged with the stage it originated from.
///
/// The cause is logged internally and never rendered into a chat reply.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {cause}")]
pub struct StageError {
    pub stage: Stage,
    pub cause: anyhow::Error,
}

impl StageError {
    pub fn new(stage: Stage, cause: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}
