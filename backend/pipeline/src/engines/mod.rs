//! Transcription engine implementations behind the shared `Transcriber` trait.

pub mod google;
#[cfg(feature = "vosk")]
pub mod vosk;

/// Reinterprets canonical s16le PCM bytes as samples. A trailing odd byte is
/// dropped.
pub(crate) fn pcm_to_samples(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
