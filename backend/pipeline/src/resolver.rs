use std::sync::Arc;

use anyhow::Result;
use voxrelay_core::{AudioRef, FetchableLocation, FileGateway, InboundMessage, SkipReason};

/// Decides whether a message carries eligible audio and resolves its file
/// identifier into a fetchable location via the platform gateway.
pub struct Resolver {
    gateway: Arc<dyn FileGateway>,
    /// Maximum accepted clip duration in seconds. 0 disables the cap.
    max_clip_secs: u32,
}

impl Resolver {
    pub fn new(gateway: Arc<dyn FileGateway>, max_clip_secs: u32) -> Self {
        Self {
            gateway,
            max_clip_secs,
        }
    }

    /// Returns the message's audio attachment if it should be processed.
    ///
    /// A `SkipReason` is a non-error: the caller drops the message silently.
    pub fn eligible_audio<'m>(&self, message: &'m InboundMessage) -> Result<&'m AudioRef, SkipReason> {
        let audio = message.audio.as_ref().ok_or(SkipReason::NoAudio)?;
        if self.max_clip_secs > 0 && audio.duration_secs > self.max_clip_secs {
            return Err(SkipReason::TooLong {
                duration_secs: audio.duration_secs,
                limit_secs: self.max_clip_secs,
            });
        }
        Ok(audio)
    }

    /// Resolves the platform file identifier into a time-limited URL.
    pub async fn resolve(&self, audio: &AudioRef) -> Result<FetchableLocation> {
        self.gateway.resolve_file(&audio.file_id).await
    }
}
