use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::debug;
use vosk::{Model, Recognizer};
use voxrelay_core::{AudioPayload, InputKind, Transcriber, Transcription};

use super::pcm_to_samples;

/// Local engine over a process-wide Vosk model.
///
/// The model is loaded once at startup and shared read-only across concurrent
/// runs; a fresh recognizer is created per call and never reused.
pub struct VoskTranscriber {
    model: Arc<Model>,
}

impl VoskTranscriber {
    /// Loads the model from disk. Failure here is fatal to startup.
    pub fn load(model_path: &str) -> Result<Self> {
        let model = Model::new(model_path)
            .ok_or_else(|| anyhow!("unable to load vosk model from {model_path:?}"))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Transcriber for VoskTranscriber {
    fn name(&self) -> &'static str {
        "vosk"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::CanonicalPcm
    }

    async fn transcribe(&self, payload: AudioPayload) -> Result<Transcription> {
        let AudioPayload::Pcm { data, sample_rate } = payload else {
            bail!("vosk engine requires canonical PCM input");
        };

        debug!(bytes = data.len(), sample_rate, "recognizing clip");
        let model = Arc::clone(&self.model);
        // Recognition is CPU-bound; keep it off the async workers.
        let text = tokio::task::spawn_blocking(move || -> Result<String> {
            let mut recognizer = Recognizer::new(&model, sample_rate as f32)
                .ok_or_else(|| anyhow!("failed to create recognizer"))?;
            recognizer.set_words(true);

            // Short voice clips: feeding the whole buffer at once is fine.
            let samples = pcm_to_samples(&data);
            recognizer
                .accept_waveform(&samples)
                .map_err(|err| anyhow!("recognizer rejected waveform: {err:?}"))?;

            let result = recognizer
                .final_result()
                .single()
                .ok_or_else(|| anyhow!("recognizer returned no final result"))?;
            Ok(result.text.to_string())
        })
        .await??;

        Ok(Transcription {
            text,
            confidence: None,
        })
    }
}
