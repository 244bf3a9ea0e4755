pub mod error;
pub mod message;
pub mod outcome;
pub mod traits;

pub use error::{Stage, StageError};
pub use message::{AudioKind, AudioRef, FetchableLocation, InboundMessage};
pub use outcome::{reply_text_for, Outcome, SkipReason, Transcription, FAILURE_REPLY};
pub use traits::{
    AudioEncoding, AudioFetcher, AudioPayload, ByteStream, FileGateway, InputKind, Transcriber,
};
